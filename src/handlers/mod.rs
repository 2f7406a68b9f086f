pub mod health;
pub mod diagnostics;
pub mod repo_file;

pub use health::*;
pub use diagnostics::*;
pub use repo_file::*;
