//! Frame loop and drawables on top of `forge-rhi`.
//!
//! This crate provides:
//! - [`Renderer`]: window-bound GPU objects and the per-frame call sequence
//! - [`FrameCycle`]: ring position and call-order enforcement
//! - [`RenderState`]: one drawable bound to a shared pipeline
//! - [`Mesh`] and [`Texture`] uploads

pub mod back_buffer;
pub mod frame_cycle;
pub mod mesh;
pub mod render_state;
pub mod renderer;
pub mod texture;
pub mod ubo;

pub use frame_cycle::{CameraMatrices, FrameBackend, FrameCycle, FramePhase};
pub use mesh::{Mesh, MeshData};
pub use render_state::{RenderState, RenderStateBuilder};
pub use renderer::{FrameOutcome, Renderer};
pub use texture::{PixelData, Texture};
pub use ubo::{MvpUniform, UniformRing};
