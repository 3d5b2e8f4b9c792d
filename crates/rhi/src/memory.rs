//! Device memory type search and raw allocation.
//!
//! Every buffer and image owns exactly one `vk::DeviceMemory` allocation,
//! chosen by [`find_memory_type_index`].

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Host-visible and coherent: staging, uniform and readback memory.
pub const HOST_VISIBLE_COHERENT: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// Returns the lowest memory type index allowed by `type_bits` whose
/// property flags contain every flag in `properties`.
pub fn find_memory_type_index(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    let count = memory_properties
        .memory_type_count
        .min(vk::MAX_MEMORY_TYPES as u32);

    (0..count).find(|&i| {
        type_bits & (1 << i) != 0
            && memory_properties.memory_types[i as usize]
                .property_flags
                .contains(properties)
    })
}

/// Allocates memory matching `requirements` with the given properties.
pub(crate) fn allocate(
    device: &Device,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
) -> RhiResult<vk::DeviceMemory> {
    let type_index = device.find_memory_type(requirements.memory_type_bits, properties)?;

    let alloc_info = vk::MemoryAllocateInfo::default()
        .allocation_size(requirements.size)
        .memory_type_index(type_index);

    let memory = unsafe { device.handle().allocate_memory(&alloc_info, None)? };

    debug!(
        "Allocated {} bytes from memory type {} ({:?})",
        requirements.size, type_index, properties
    );

    Ok(memory)
}

pub(crate) fn no_memory_type(type_bits: u32, properties: vk::MemoryPropertyFlags) -> RhiError {
    RhiError::NoSuitableMemoryType {
        type_bits,
        properties,
    }
}
