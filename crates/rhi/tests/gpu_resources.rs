//! GPU resource tests against a headless device.
//!
//! Each test skips when no Vulkan implementation is available.

use std::sync::Arc;

use ash::vk;
use forge_rhi::buffer::{BufferBuilder, upload_device_local};
use forge_rhi::device::Device;
use forge_rhi::image::ImageBuilder;
use forge_rhi::instance::Instance;
use forge_rhi::physical_device::select_physical_device;
use forge_rhi::sampler::SamplerBuilder;
use forge_rhi::sync::Fence;
use forge_rhi::{RhiError, RhiResult};

/// Device first so it is destroyed before the instance.
struct Headless {
    device: Arc<Device>,
    _instance: Instance,
}

fn headless() -> RhiResult<Headless> {
    let instance = Instance::new(false, &[])?;
    let info = select_physical_device(instance.handle(), None)?;
    let device = Device::new(&instance, &info)?;
    Ok(Headless {
        device,
        _instance: instance,
    })
}

macro_rules! gpu_or_skip {
    () => {
        match headless() {
            Ok(gpu) => gpu,
            Err(e) => {
                eprintln!("Skipping test: Vulkan not available ({})", e);
                return;
            }
        }
    };
}

#[test]
fn test_buffers_get_distinct_handles() {
    let gpu = gpu_or_skip!();

    let builder = BufferBuilder::uniform(256);
    let a = builder.build(&gpu.device).unwrap();
    let b = builder.build(&gpu.device).unwrap();

    assert_ne!(a.handle(), b.handle());
    assert_ne!(a.memory(), b.memory());
    assert_eq!(a.size(), 256);
}

#[test]
fn test_images_get_distinct_handles() {
    let gpu = gpu_or_skip!();

    let extent = vk::Extent2D {
        width: 16,
        height: 16,
    };
    let builder = ImageBuilder::sampled_image_2d(extent, vk::Format::R8G8B8A8_SRGB);
    let a = builder.build(&gpu.device).unwrap();
    let b = builder.build(&gpu.device).unwrap();

    assert_ne!(a.handle(), b.handle());
    assert_ne!(a.memory(), b.memory());
    assert_ne!(a.view(), b.view());
    assert_eq!(a.extent(), b.extent());
}

#[test]
fn test_staging_upload_round_trip() {
    let gpu = gpu_or_skip!();

    let data: Vec<u8> = (0..=255).collect();
    let builder = BufferBuilder::vertex(0).usage(
        vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC,
    );
    let device_local = upload_device_local(&gpu.device, builder, &data).unwrap();
    assert_eq!(device_local.size(), data.len() as vk::DeviceSize);
    assert!(device_local.usage().contains(vk::BufferUsageFlags::TRANSFER_DST));

    let mut readback = BufferBuilder::readback(data.len() as vk::DeviceSize)
        .build(&gpu.device)
        .unwrap();
    device_local
        .copy_to(&readback, data.len() as vk::DeviceSize)
        .unwrap();

    assert_eq!(readback.read(0, data.len()).unwrap(), data);
}

#[test]
fn test_device_local_buffer_rejects_host_access() {
    let gpu = gpu_or_skip!();

    let mut buffer = BufferBuilder::vertex(64).build(&gpu.device).unwrap();
    let result = buffer.write(0, &[1, 2, 3]);
    assert!(matches!(result, Err(RhiError::InvalidConfig(_))));
}

#[test]
fn test_mapped_uniform_write_read() {
    let gpu = gpu_or_skip!();

    let mut buffer = BufferBuilder::uniform(64).build(&gpu.device).unwrap();
    buffer.map().unwrap();
    assert!(buffer.is_mapped());

    buffer.write_pod(16, &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
    let bytes = buffer.read(16, 16).unwrap();
    let values: &[f32] = bytemuck::cast_slice(&bytes);
    assert_eq!(values, &[1.0, 2.0, 3.0, 4.0]);

    let overflow = buffer.write(60, &[0u8; 8]);
    assert!(matches!(overflow, Err(RhiError::InvalidConfig(_))));
}

#[test]
fn test_builder_restart_between_builds() {
    let gpu = gpu_or_skip!();

    let mut builder = BufferBuilder::staging(128);
    let staging = builder.build(&gpu.device).unwrap();
    assert!(staging.usage().contains(vk::BufferUsageFlags::TRANSFER_SRC));

    builder.restart();
    assert!(builder.build(&gpu.device).is_err());

    let uniform = builder
        .clone()
        .size(32)
        .usage(vk::BufferUsageFlags::UNIFORM_BUFFER)
        .properties(
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .build(&gpu.device)
        .unwrap();
    assert_eq!(uniform.size(), 32);
}

#[test]
fn test_sampled_image_upload() {
    let gpu = gpu_or_skip!();

    let extent = vk::Extent2D {
        width: 4,
        height: 4,
    };
    let image = ImageBuilder::sampled_image_2d(extent, vk::Format::R8G8B8A8_SRGB)
        .build(&gpu.device)
        .unwrap();
    assert_ne!(image.view(), vk::ImageView::null());
    assert_eq!(image.extent().width, 4);

    let mut staging = BufferBuilder::staging(4 * 4 * 4).build(&gpu.device).unwrap();
    staging.write(0, &[255u8; 64]).unwrap();

    image
        .transition_layout(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
    image.copy_from_buffer(&staging).unwrap();
    image
        .transition_layout(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();

    let sampler = SamplerBuilder::with_filter(vk::Filter::NEAREST)
        .build(&gpu.device)
        .unwrap();
    assert_ne!(sampler.handle(), vk::Sampler::null());
}

#[test]
fn test_signaled_fence_passes_first_wait() {
    let gpu = gpu_or_skip!();

    let fence = Fence::new(Arc::clone(&gpu.device), true).unwrap();
    assert!(fence.is_signaled());
    fence.wait(u64::MAX).unwrap();
    fence.reset().unwrap();
    assert!(!fence.is_signaled());
}
