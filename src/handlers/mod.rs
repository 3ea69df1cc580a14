pub mod diagnostics;
pub mod health;
pub mod presence;

pub use diagnostics::*;
pub use health::*;
pub use presence::*;
