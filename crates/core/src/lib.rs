//! Core utilities shared by every forge crate.
//!
//! - Error types and result aliases
//! - Logging initialization
//! - Engine configuration (TOML)
//! - Frame timing

mod config;
mod error;
mod logging;
mod timer;

pub use config::{EngineConfig, GraphicsConfig, SceneConfig, WindowConfig};
pub use error::{Error, Result};
pub use logging::{DEFAULT_LOG_FILTER, LogFilterHandle, init_logging};
pub use timer::FrameTimer;
