pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{ScsiMode, Settings};
