//! GPU buffers built from a plain configuration.
//!
//! # Overview
//!
//! - [`BufferBuilder`] holds size, usage, memory properties and sharing mode;
//!   director presets cover the recognized combinations
//! - [`BufferBuilder::build`] creates the handle, queries requirements,
//!   allocates a matching memory type and binds it
//! - [`Buffer`] owns its handle and its dedicated allocation
//! - [`upload_device_local`] is the staging path for device-local data
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use forge_rhi::device::Device;
//! use forge_rhi::buffer::{BufferBuilder, upload_device_local};
//!
//! # fn example(device: Arc<Device>) -> Result<(), forge_rhi::RhiError> {
//! let vertices: [f32; 6] = [0.0, 0.5, -0.5, -0.5, 0.5, -0.5];
//! let bytes: &[u8] = bytemuck::cast_slice(&vertices);
//! let vertex_buffer = upload_device_local(&device, BufferBuilder::vertex(0), bytes)?;
//! # Ok(())
//! # }
//! ```

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory::{self, HOST_VISIBLE_COHERENT};

/// Buffer presets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Device-local vertex data, filled through staging
    Vertex,
    /// Device-local index data, filled through staging
    Index,
    /// Host-visible uniform data, updated every frame
    Uniform,
    /// Host-visible upload source
    Staging,
    /// Host-visible copy destination for reading results back
    Readback,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
            BufferUsage::Readback => vk::BufferUsageFlags::TRANSFER_DST,
        }
    }

    /// Memory properties the preset requires.
    pub fn memory_properties(self) -> vk::MemoryPropertyFlags {
        match self {
            BufferUsage::Vertex | BufferUsage::Index => vk::MemoryPropertyFlags::DEVICE_LOCAL,
            BufferUsage::Uniform | BufferUsage::Staging | BufferUsage::Readback => {
                HOST_VISIBLE_COHERENT
            }
        }
    }

    /// Returns a human-readable name for the buffer type.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Staging => "staging",
            BufferUsage::Readback => "readback",
        }
    }
}

/// Buffer configuration.
///
/// `build` does not consume the builder; call [`BufferBuilder::restart`]
/// before configuring an unrelated buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferBuilder {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub properties: vk::MemoryPropertyFlags,
    pub sharing_mode: vk::SharingMode,
    pub label: &'static str,
}

impl Default for BufferBuilder {
    fn default() -> Self {
        Self {
            size: 0,
            usage: vk::BufferUsageFlags::empty(),
            properties: vk::MemoryPropertyFlags::empty(),
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            label: "buffer",
        }
    }
}

impl BufferBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for one of the recognized presets.
    pub fn preset(kind: BufferUsage, size: vk::DeviceSize) -> Self {
        Self {
            size,
            usage: kind.to_vk_usage(),
            properties: kind.memory_properties(),
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            label: kind.name(),
        }
    }

    pub fn staging(size: vk::DeviceSize) -> Self {
        Self::preset(BufferUsage::Staging, size)
    }

    pub fn uniform(size: vk::DeviceSize) -> Self {
        Self::preset(BufferUsage::Uniform, size)
    }

    pub fn vertex(size: vk::DeviceSize) -> Self {
        Self::preset(BufferUsage::Vertex, size)
    }

    pub fn index(size: vk::DeviceSize) -> Self {
        Self::preset(BufferUsage::Index, size)
    }

    pub fn readback(size: vk::DeviceSize) -> Self {
        Self::preset(BufferUsage::Readback, size)
    }

    pub fn size(mut self, size: vk::DeviceSize) -> Self {
        self.size = size;
        self
    }

    pub fn usage(mut self, usage: vk::BufferUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    pub fn properties(mut self, properties: vk::MemoryPropertyFlags) -> Self {
        self.properties = properties;
        self
    }

    pub fn sharing_mode(mut self, sharing_mode: vk::SharingMode) -> Self {
        self.sharing_mode = sharing_mode;
        self
    }

    pub fn label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    /// Resets every field to its default.
    pub fn restart(&mut self) -> &mut Self {
        *self = Self::default();
        self
    }

    fn validate(&self) -> RhiResult<()> {
        if self.size == 0 {
            return Err(RhiError::InvalidConfig(format!(
                "{} buffer size must be greater than 0",
                self.label
            )));
        }
        if self.usage.is_empty() {
            return Err(RhiError::InvalidConfig(format!(
                "{} buffer has no usage flags",
                self.label
            )));
        }
        Ok(())
    }

    /// Creates the buffer, allocates dedicated memory and binds it.
    ///
    /// Nothing is leaked when a step fails: memory allocated so far is freed
    /// and the handle destroyed before the error is returned.
    pub fn build(&self, device: &Arc<Device>) -> RhiResult<Buffer> {
        self.validate()?;

        let buffer_info = vk::BufferCreateInfo::default()
            .size(self.size)
            .usage(self.usage)
            .sharing_mode(self.sharing_mode);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };

        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let memory = match memory::allocate(device, requirements, self.properties) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { device.handle().bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                device.handle().free_memory(memory, None);
                device.handle().destroy_buffer(buffer, None);
            }
            return Err(e.into());
        }

        debug!("Created {} buffer: {} bytes", self.label, self.size);

        Ok(Buffer {
            device: device.clone(),
            buffer,
            memory,
            size: self.size,
            usage: self.usage,
            properties: self.properties,
            label: self.label,
            mapped: None,
        })
    }
}

/// GPU buffer with its own memory allocation.
pub struct Buffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan buffer handle.
    buffer: vk::Buffer,
    /// Dedicated device memory.
    memory: vk::DeviceMemory,
    /// Buffer size in bytes.
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    properties: vk::MemoryPropertyFlags,
    label: &'static str,
    /// Persistent mapping, if any.
    mapped: Option<NonNull<c_void>>,
}

impl Buffer {
    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory
    }

    /// Returns the buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    #[inline]
    pub fn properties(&self) -> vk::MemoryPropertyFlags {
        self.properties
    }

    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.mapped.is_some()
    }

    fn check_range(&self, offset: vk::DeviceSize, len: usize) -> RhiResult<()> {
        if !self.properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            return Err(RhiError::InvalidConfig(format!(
                "{} buffer memory is not host visible",
                self.label
            )));
        }

        let end = offset.checked_add(len as vk::DeviceSize);
        if end.is_none_or(|end| end > self.size) {
            return Err(RhiError::InvalidConfig(format!(
                "Access exceeds buffer size: offset {} + data {} > buffer {}",
                offset, len, self.size
            )));
        }
        Ok(())
    }

    fn map_memory(&self) -> RhiResult<NonNull<c_void>> {
        let ptr = unsafe {
            self.device.handle().map_memory(
                self.memory,
                0,
                vk::WHOLE_SIZE,
                vk::MemoryMapFlags::empty(),
            )?
        };
        NonNull::new(ptr)
            .ok_or_else(|| RhiError::InvalidConfig("vkMapMemory returned null".to_string()))
    }

    /// Keeps the whole buffer mapped until [`Buffer::unmap`] or drop.
    pub fn map(&mut self) -> RhiResult<()> {
        if self.mapped.is_none() {
            self.check_range(0, 0)?;
            self.mapped = Some(self.map_memory()?);
        }
        Ok(())
    }

    pub fn unmap(&mut self) {
        if self.mapped.take().is_some() {
            unsafe { self.device.handle().unmap_memory(self.memory) };
        }
    }

    /// Copies `data` into the buffer at `offset`.
    ///
    /// Uses the persistent mapping when present, otherwise maps, copies and
    /// unmaps. Only host-coherent memory is written, so no flush is issued.
    pub fn write(&mut self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.check_range(offset, data.len())?;

        let (base, transient) = match self.mapped {
            Some(ptr) => (ptr, false),
            None => (self.map_memory()?, true),
        };

        unsafe {
            let dst = base.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
            if transient {
                self.device.handle().unmap_memory(self.memory);
            }
        }

        Ok(())
    }

    /// Writes a single `Pod` value at `offset`.
    pub fn write_pod<T: bytemuck::Pod>(&mut self, offset: vk::DeviceSize, value: &T) -> RhiResult<()> {
        self.write(offset, bytemuck::bytes_of(value))
    }

    /// Reads `len` bytes starting at `offset` from host-visible memory.
    pub fn read(&mut self, offset: vk::DeviceSize, len: usize) -> RhiResult<Vec<u8>> {
        self.check_range(offset, len)?;
        let mut out = vec![0u8; len];
        if len == 0 {
            return Ok(out);
        }

        let (base, transient) = match self.mapped {
            Some(ptr) => (ptr, false),
            None => (self.map_memory()?, true),
        };

        unsafe {
            let src = base.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(src, out.as_mut_ptr(), len);
            if transient {
                self.device.handle().unmap_memory(self.memory);
            }
        }

        Ok(out)
    }

    /// Copies the first `size` bytes into `dst` and waits for completion.
    pub fn copy_to(&self, dst: &Buffer, size: vk::DeviceSize) -> RhiResult<()> {
        if size > self.size || size > dst.size {
            return Err(RhiError::InvalidConfig(format!(
                "Copy of {} bytes exceeds source ({}) or destination ({})",
                size, self.size, dst.size
            )));
        }

        let region = vk::BufferCopy::default().size(size);
        self.device.submit_one_time(|cmd| {
            cmd.copy_buffer(self.buffer, dst.buffer, std::slice::from_ref(&region));
        })
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.unmap();

        // Free memory first, then destroy the handle
        unsafe {
            self.device.handle().free_memory(self.memory, None);
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed {} buffer", self.label);
    }
}

/// Uploads `data` into a new buffer configured by `builder` through a
/// host-visible staging buffer.
///
/// The builder's size is replaced by `data.len()` and `TRANSFER_DST` is added
/// to its usage. Blocks until the transfer has finished; the staging buffer
/// is released before returning.
pub fn upload_device_local(
    device: &Arc<Device>,
    builder: BufferBuilder,
    data: &[u8],
) -> RhiResult<Buffer> {
    let size = data.len() as vk::DeviceSize;

    let mut staging = BufferBuilder::staging(size).build(device)?;
    staging.write(0, data)?;

    let usage = builder.usage | vk::BufferUsageFlags::TRANSFER_DST;
    let destination = builder.size(size).usage(usage).build(device)?;

    if let Err(e) = staging.copy_to(&destination, size) {
        error!("Staging transfer of {} bytes failed: {}", size, e);
        return Err(e);
    }

    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_usage_to_vk_usage() {
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert!(
            BufferUsage::Index
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert_eq!(
            BufferUsage::Uniform.to_vk_usage(),
            vk::BufferUsageFlags::UNIFORM_BUFFER
        );
        assert_eq!(
            BufferUsage::Staging.to_vk_usage(),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
    }

    #[test]
    fn test_buffer_usage_memory_properties() {
        assert_eq!(
            BufferUsage::Vertex.memory_properties(),
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        );
        assert_eq!(
            BufferUsage::Index.memory_properties(),
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        );
        for kind in [BufferUsage::Uniform, BufferUsage::Staging, BufferUsage::Readback] {
            assert!(kind.memory_properties().contains(
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            ));
        }
    }

    #[test]
    fn test_preset_fills_configuration() {
        let builder = BufferBuilder::uniform(192);
        assert_eq!(builder.size, 192);
        assert_eq!(builder.usage, vk::BufferUsageFlags::UNIFORM_BUFFER);
        assert_eq!(builder.properties, HOST_VISIBLE_COHERENT);
        assert_eq!(builder.sharing_mode, vk::SharingMode::EXCLUSIVE);
        assert_eq!(builder.label, "uniform");
    }

    #[test]
    fn test_restart_clears_previous_configuration() {
        let mut builder = BufferBuilder::vertex(1024).sharing_mode(vk::SharingMode::CONCURRENT);
        builder.restart();
        assert_eq!(builder, BufferBuilder::default());

        let next = builder
            .clone()
            .size(64)
            .usage(vk::BufferUsageFlags::TRANSFER_SRC)
            .properties(HOST_VISIBLE_COHERENT);
        assert_eq!(next.size, 64);
        assert!(!next.usage.contains(vk::BufferUsageFlags::VERTEX_BUFFER));
        assert_eq!(next.sharing_mode, vk::SharingMode::EXCLUSIVE);
    }

    #[test]
    fn test_validate_rejects_empty_configuration() {
        assert!(matches!(
            BufferBuilder::new().validate(),
            Err(RhiError::InvalidConfig(_))
        ));
        assert!(matches!(
            BufferBuilder::new().size(16).validate(),
            Err(RhiError::InvalidConfig(_))
        ));
        assert!(BufferBuilder::staging(16).validate().is_ok());
    }
}
