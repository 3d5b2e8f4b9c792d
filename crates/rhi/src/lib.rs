//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate wraps `ash` with owned, drop-ordered objects:
//! - Instance, physical device selection and logical device
//! - Swapchain, render pass and framebuffers
//! - Command buffers and one-time submission
//! - Buffers, images and samplers with their memory
//! - Descriptor layouts/pools and graphics pipelines
//! - Synchronization primitives

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod memory;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
