pub mod config;
pub mod parse;
pub mod diagnostics;
pub mod progress;
pub mod engine;
pub mod errors;

pub use config::*;
pub use parse::*;
pub use diagnostics::*;
pub use progress::*;
pub use engine::*;
pub use errors::*;
