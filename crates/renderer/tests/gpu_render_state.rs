//! Texture upload and per-image uniform tests against a headless device.
//!
//! Each test skips when no Vulkan implementation is available.

use std::path::PathBuf;
use std::sync::Arc;

use ash::vk;
use glam::{Mat4, Vec3};

use forge_renderer::{
    Mesh, MeshData, MvpUniform, PixelData, RenderStateBuilder, Texture, UniformRing,
};
use forge_rhi::device::Device;
use forge_rhi::image::{DEPTH_FORMAT_CANDIDATES, ImageBuilder, select_depth_format};
use forge_rhi::instance::Instance;
use forge_rhi::physical_device::select_physical_device;
use forge_rhi::pipeline::GraphicsPipelineBuilder;
use forge_rhi::render_pass::RenderPassBuilder;
use forge_rhi::shader::{ShaderStage, shader_path};
use forge_rhi::{RhiError, RhiResult};

/// Device first so it is destroyed before the instance.
struct Headless {
    device: Arc<Device>,
    instance: Instance,
}

fn headless() -> RhiResult<Headless> {
    let instance = Instance::new(false, &[])?;
    let info = select_physical_device(instance.handle(), None)?;
    let device = Device::new(&instance, &info)?;
    Ok(Headless { device, instance })
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

fn shader_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../shaders")
}

fn camera() -> (Mat4, Mat4) {
    let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 2.0), Vec3::ZERO, Vec3::Y);
    let proj = Mat4::perspective_rh(45.0_f32.to_radians(), 1.0, 0.1, 100.0);
    (view, proj)
}

#[test]
fn test_checkerboard_texture_upload() {
    let gpu = gpu_or_skip!();

    let pixels = PixelData::checkerboard(8, 2, [255, 255, 255, 255], [0, 0, 0, 255]);
    let texture = Texture::from_pixels(&gpu.device, &pixels).unwrap();

    let extent = texture.image().extent();
    assert_eq!((extent.width, extent.height), (8, 8));
    assert_eq!(texture.image().format(), vk::Format::R8G8B8A8_SRGB);

    let info = texture.descriptor_info();
    assert_eq!(info.image_view, texture.image().view());
    assert_eq!(info.sampler, texture.sampler().handle());
    assert_eq!(
        info.image_layout,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    );
}

#[test]
fn test_rgba8_texture_checks_length() {
    let gpu = gpu_or_skip!();

    let short = Texture::from_rgba8(&gpu.device, 2, 2, &[0u8; 15]);
    assert!(matches!(short, Err(RhiError::InvalidConfig(_))));

    let texture = Texture::from_rgba8(&gpu.device, 2, 2, &[128u8; 16]).unwrap();
    assert_eq!(texture.image().extent().width, 2);
}

#[test]
fn test_uniform_ring_writes_only_target_slot() {
    let gpu = gpu_or_skip!();

    let initial = MvpUniform::default();
    let mut ring = UniformRing::new(&gpu.device, 3, &initial).unwrap();
    assert_eq!(ring.len(), 3);

    let (view, proj) = camera();
    let block = MvpUniform::new(Mat4::from_rotation_z(0.5), view, proj);
    ring.write(1, &block).unwrap();

    assert_eq!(ring.read(0).unwrap(), initial);
    assert_eq!(ring.read(1).unwrap(), block);
    assert_eq!(ring.read(2).unwrap(), initial);
    assert!(matches!(ring.write(3, &block), Err(RhiError::InvalidConfig(_))));
}

#[test]
fn test_render_state_updates_acquired_image_slot() {
    let gpu = gpu_or_skip!();

    let shaders = shader_dir();
    let vert = shader_path(&shaders, "quad", ShaderStage::Vertex);
    let frag = shader_path(&shaders, "quad", ShaderStage::Fragment);
    if !vert.exists() || !frag.exists() {
        eprintln!(
            "Skipping test: compiled shaders not found in {} (run shaders/build.sh)",
            shaders.display()
        );
        return;
    }

    let extent = vk::Extent2D {
        width: 64,
        height: 64,
    };
    let color_format = vk::Format::R8G8B8A8_UNORM;
    let targets: Vec<_> = (0..2)
        .map(|_| {
            ImageBuilder::image_2d(extent, color_format, vk::ImageUsageFlags::COLOR_ATTACHMENT)
                .build(&gpu.device)
                .unwrap()
        })
        .collect();
    let depth_format = select_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| unsafe {
        gpu.instance
            .handle()
            .get_physical_device_format_properties(gpu.device.physical_device(), format)
    })
    .unwrap();
    let depth = ImageBuilder::depth_image_2d(extent, depth_format)
        .build(&gpu.device)
        .unwrap();

    let color_views: Vec<_> = targets.iter().map(|image| image.view()).collect();
    let render_pass = RenderPassBuilder::new()
        .color_attachment(color_format)
        .depth_attachment(depth_format)
        .color_final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build_for_targets(&gpu.device, &color_views, Some(depth.view()), extent)
        .unwrap();
    assert_eq!(render_pass.framebuffer_count(), 2);

    let pipeline = GraphicsPipelineBuilder::color_depth_rasterizer(&render_pass, &shaders, "quad")
        .build(&gpu.device)
        .unwrap();
    let mesh = Mesh::new(&gpu.device, &MeshData::quad()).unwrap();
    let pixels = PixelData::checkerboard(16, 4, [255, 0, 0, 255], [0, 0, 255, 255]);
    let texture = Texture::from_pixels(&gpu.device, &pixels).unwrap();

    let model = Mat4::from_translation(Vec3::new(0.25, 0.0, 0.0));
    let mut state = RenderStateBuilder::textured_mesh(
        Arc::new(pipeline),
        Arc::new(mesh),
        Arc::new(texture),
        2,
    )
    .model(model)
    .build(&gpu.device)
    .unwrap();

    let (view, proj) = camera();
    state.update_uniforms(1, view, proj).unwrap();

    let untouched = state.read_uniforms(0).unwrap();
    assert_eq!(untouched, MvpUniform::new(model, Mat4::IDENTITY, Mat4::IDENTITY));
    assert_eq!(state.read_uniforms(1).unwrap(), MvpUniform::new(model, view, proj));
    assert!(state.update_uniforms(2, view, proj).is_err());
}
