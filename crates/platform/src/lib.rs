//! Platform layer for the engine.
//!
//! This crate provides:
//! - Window creation via winit
//! - Vulkan surface creation and the instance extensions it needs

mod window;

pub use window::{Surface, Window, aspect_ratio};

// Re-export winit types the application loop needs
pub use winit::application::ApplicationHandler;
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
pub use winit::window::WindowId;
