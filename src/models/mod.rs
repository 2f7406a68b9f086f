pub mod health;
pub mod ready;
pub mod diagnostics;
pub mod error;
pub mod messages;
pub mod room;

pub use health::*;
pub use ready::*;
pub use diagnostics::*;
pub use error::*;
pub use messages::*;
pub use room::*;
