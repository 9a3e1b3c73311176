pub mod cache;
pub mod cmd;
pub mod config;
mod error;
pub mod feed;

pub use error::{EngineError, Result};
