// Public modules
pub mod assets;
pub mod config;
pub mod defaults;
pub mod environment;
pub mod error;
pub mod project;
pub mod properties;
pub mod ssh;
pub mod tasks;
pub mod template;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
