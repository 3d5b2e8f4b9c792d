//! Uniform block shared with the bundled shaders.
//!
//! Must match the `Mvp` block at set 0, binding 0 in `shaders/quad.vert`.

use std::sync::Arc;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use forge_rhi::RhiResult;
use forge_rhi::buffer::{Buffer, BufferBuilder};
use forge_rhi::device::Device;

use crate::render_state::image_slot;

/// Model, view and projection matrices, column-major.
///
/// # Memory Layout
///
/// - Offset 0: model (64 bytes)
/// - Offset 64: view (64 bytes)
/// - Offset 128: proj (64 bytes)
/// - Total size: 192 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MvpUniform {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl MvpUniform {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(model: Mat4, view: Mat4, proj: Mat4) -> Self {
        Self { model, view, proj }
    }
}

impl Default for MvpUniform {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

/// One persistently mapped [`MvpUniform`] buffer per swapchain image.
pub struct UniformRing {
    buffers: Vec<Buffer>,
}

impl UniformRing {
    /// Creates `count` mapped buffers, each holding `initial`.
    pub fn new(device: &Arc<Device>, count: usize, initial: &MvpUniform) -> RhiResult<Self> {
        let mut buffers = Vec::with_capacity(count);
        for _ in 0..count {
            let mut buffer = BufferBuilder::uniform(MvpUniform::SIZE as vk::DeviceSize)
                .label("mvp uniform")
                .build(device)?;
            buffer.map()?;
            buffer.write_pod(0, initial)?;
            buffers.push(buffer);
        }
        Ok(Self { buffers })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn buffers(&self) -> &[Buffer] {
        &self.buffers
    }

    /// Overwrites the block of `image_index`; other slots are untouched.
    pub fn write(&mut self, image_index: u32, block: &MvpUniform) -> RhiResult<()> {
        let slot = image_slot(image_index, self.buffers.len())?;
        self.buffers[slot].write_pod(0, block)
    }

    pub fn read(&mut self, image_index: u32) -> RhiResult<MvpUniform> {
        let slot = image_slot(image_index, self.buffers.len())?;
        let bytes = self.buffers[slot].read(0, MvpUniform::SIZE)?;
        Ok(bytemuck::pod_read_unaligned(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use std::mem::offset_of;

    #[test]
    fn test_mvp_uniform_size() {
        assert_eq!(MvpUniform::SIZE, 192);
        assert_eq!(std::mem::align_of::<MvpUniform>(), 16);
    }

    #[test]
    fn test_mvp_uniform_offsets() {
        assert_eq!(offset_of!(MvpUniform, model), 0);
        assert_eq!(offset_of!(MvpUniform, view), 64);
        assert_eq!(offset_of!(MvpUniform, proj), 128);
    }

    #[test]
    fn test_mvp_uniform_bytes_are_column_major() {
        let model = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let ubo = MvpUniform::new(model, Mat4::IDENTITY, Mat4::IDENTITY);
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&ubo));

        // Translation lives in the fourth column.
        assert_eq!(&floats[12..16], &[1.0, 2.0, 3.0, 1.0]);
        assert_eq!(floats.len(), 48);
    }

    #[test]
    fn test_default_is_identity() {
        let ubo = MvpUniform::default();
        assert_eq!(ubo.model, Mat4::IDENTITY);
        assert_eq!(ubo.view, Mat4::IDENTITY);
        assert_eq!(ubo.proj, Mat4::IDENTITY);
    }
}
