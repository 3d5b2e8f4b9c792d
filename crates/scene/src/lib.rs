//! Camera and transform math for the engine.

pub mod camera;
pub mod transform;

pub use camera::Camera;
pub use transform::Transform;
