pub mod dispatcher;
pub mod handler;
pub mod msg_cell_handler;
pub mod msg_drag_handler;
pub mod msg_users_handler;

pub use handler::websocket_handler;
