pub mod config;
pub mod error;
pub mod types;

pub use config::{FolioConfig, LlmProvider};
pub use error::{FolioError, Result};
pub use types::*;
