//! Render pass and per-image framebuffers.
//!
//! Attachments are declared on a [`RenderPassBuilder`] before building. Each
//! declared attachment adds its stage and access bits to the single external
//! subpass dependency, so declaration order does not change the result.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::swapchain::Swapchain;

/// Accumulated masks for the `EXTERNAL -> 0` subpass dependency.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DependencyMasks {
    pub stage: vk::PipelineStageFlags,
    pub dst_access: vk::AccessFlags,
}

impl DependencyMasks {
    fn add(&mut self, stage: vk::PipelineStageFlags, dst_access: vk::AccessFlags) {
        self.stage |= stage;
        self.dst_access |= dst_access;
    }

    pub fn to_vk(self) -> vk::SubpassDependency {
        vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(self.stage)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(self.stage)
            .dst_access_mask(self.dst_access)
    }
}

/// Render pass configuration: one color attachment and an optional depth attachment.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderPassBuilder {
    pub color_format: Option<vk::Format>,
    pub depth_format: Option<vk::Format>,
    pub clear_color: [f32; 4],
    /// Layout the color attachment ends in; `PRESENT_SRC_KHR` when unset.
    pub color_final_layout: Option<vk::ImageLayout>,
    pub dependency: DependencyMasks,
}

impl RenderPassBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Color attachment cleared on load and transitioned for presentation.
    pub fn color_attachment(mut self, format: vk::Format) -> Self {
        self.color_format = Some(format);
        self.dependency.add(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        );
        self
    }

    /// Depth attachment cleared on load and discarded after the pass.
    pub fn depth_attachment(mut self, format: vk::Format) -> Self {
        self.depth_format = Some(format);
        self.dependency.add(
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        );
        self
    }

    pub fn clear_color(mut self, rgba: [f32; 4]) -> Self {
        self.clear_color = rgba;
        self
    }

    /// Overrides the color attachment's final layout for targets that are not presented.
    pub fn color_final_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.color_final_layout = Some(layout);
        self
    }

    /// Color and depth attachments matching `swapchain`.
    pub fn for_swapchain(swapchain: &Swapchain) -> Self {
        Self::new()
            .color_attachment(swapchain.format())
            .depth_attachment(swapchain.depth().format())
    }

    pub fn restart(&mut self) -> &mut Self {
        *self = Self::default();
        self
    }

    /// Attachment descriptions in framebuffer order: color, then depth.
    pub fn attachment_descriptions(&self) -> RhiResult<Vec<vk::AttachmentDescription>> {
        let color_format = self.color_format.ok_or_else(|| {
            RhiError::InvalidConfig("Render pass needs a color attachment".to_string())
        })?;

        let mut attachments = vec![
            vk::AttachmentDescription::default()
                .format(color_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(
                    self.color_final_layout
                        .unwrap_or(vk::ImageLayout::PRESENT_SRC_KHR),
                ),
        ];

        if let Some(depth_format) = self.depth_format {
            attachments.push(
                vk::AttachmentDescription::default()
                    .format(depth_format)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
            );
        }

        Ok(attachments)
    }

    fn clear_values(&self) -> Vec<vk::ClearValue> {
        let mut values = vec![vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];
        if self.depth_format.is_some() {
            values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            });
        }
        values
    }

    /// Builds the pass and one framebuffer per swapchain image.
    pub fn build(&self, swapchain: &Swapchain) -> RhiResult<RenderPass> {
        let depth_view = self.depth_format.map(|_| swapchain.depth().view());
        self.build_for_targets(
            swapchain.device(),
            swapchain.image_views(),
            depth_view,
            swapchain.extent(),
        )
    }

    /// Builds the pass and one framebuffer per entry of `color_views`, each
    /// sharing `depth_view`. Used directly for offscreen targets.
    pub fn build_for_targets(
        &self,
        device: &Arc<Device>,
        color_views: &[vk::ImageView],
        depth_view: Option<vk::ImageView>,
        extent: vk::Extent2D,
    ) -> RhiResult<RenderPass> {
        let attachments = self.attachment_descriptions()?;
        if color_views.is_empty() {
            return Err(RhiError::InvalidConfig(
                "Render pass needs at least one color target".to_string(),
            ));
        }
        if depth_view.is_some() != self.depth_format.is_some() {
            return Err(RhiError::InvalidConfig(
                "Depth view must be given exactly when a depth attachment is declared".to_string(),
            ));
        }
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::InvalidConfig(format!(
                "Render pass extent {}x{} is empty",
                extent.width, extent.height
            )));
        }

        let color_refs = [vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
        let depth_ref = vk::AttachmentReference::default()
            .attachment(1)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if self.depth_format.is_some() {
            subpass = subpass.depth_stencil_attachment(&depth_ref);
        }

        let dependencies = [self.dependency.to_vk()];
        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(&dependencies);

        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };

        let mut pass = RenderPass {
            device: Arc::clone(device),
            render_pass,
            framebuffers: Vec::with_capacity(color_views.len()),
            extent,
            clear_values: self.clear_values(),
        };

        for &color_view in color_views {
            let views: Vec<vk::ImageView> = std::iter::once(color_view).chain(depth_view).collect();
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&views)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            // On error, `pass` drops and releases what was created so far.
            let framebuffer =
                unsafe { pass.device.handle().create_framebuffer(&framebuffer_info, None)? };
            pass.framebuffers.push(framebuffer);
        }

        info!(
            "Render pass created with {} attachment(s) and {} framebuffer(s)",
            attachments.len(),
            pass.framebuffers.len()
        );

        Ok(pass)
    }
}

/// Render pass plus one framebuffer per swapchain image.
pub struct RenderPass {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    extent: vk::Extent2D,
    clear_values: Vec<vk::ClearValue>,
}

impl RenderPass {
    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn framebuffer(&self, image_index: u32) -> RhiResult<vk::Framebuffer> {
        self.framebuffers
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| {
                RhiError::InvalidConfig(format!(
                    "No framebuffer for image {} ({} available)",
                    image_index,
                    self.framebuffers.len()
                ))
            })
    }

    /// Begin info targeting the framebuffer of `image_index`.
    pub fn begin_info(&self, image_index: u32) -> RhiResult<vk::RenderPassBeginInfo<'_>> {
        let framebuffer = self.framebuffer(image_index)?;
        Ok(vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.extent,
            })
            .clear_values(&self.clear_values))
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.device.handle().destroy_framebuffer(framebuffer, None);
            }
            self.device.handle().destroy_render_pass(self.render_pass, None);
        }
        debug!("Render pass destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_independent_of_declaration_order() {
        let color_first = RenderPassBuilder::new()
            .color_attachment(vk::Format::B8G8R8A8_SRGB)
            .depth_attachment(vk::Format::D32_SFLOAT);
        let depth_first = RenderPassBuilder::new()
            .depth_attachment(vk::Format::D32_SFLOAT)
            .color_attachment(vk::Format::B8G8R8A8_SRGB);

        assert_eq!(color_first.dependency, depth_first.dependency);
        assert_eq!(
            color_first.dependency.stage,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
        );
        assert_eq!(
            color_first.dependency.dst_access,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        );
    }

    #[test]
    fn test_dependency_is_external_to_first_subpass() {
        let dependency = RenderPassBuilder::new()
            .color_attachment(vk::Format::B8G8R8A8_SRGB)
            .dependency
            .to_vk();
        assert_eq!(dependency.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dependency.dst_subpass, 0);
        assert_eq!(dependency.src_access_mask, vk::AccessFlags::empty());
        assert_eq!(
            dependency.dst_access_mask,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        );
    }

    #[test]
    fn test_attachment_descriptions() {
        let builder = RenderPassBuilder::new()
            .depth_attachment(vk::Format::D32_SFLOAT)
            .color_attachment(vk::Format::B8G8R8A8_SRGB);
        let attachments = builder.attachment_descriptions().unwrap();

        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0].format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(attachments[0].load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachments[0].store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(attachments[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(attachments[1].format, vk::Format::D32_SFLOAT);
        assert_eq!(attachments[1].store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(
            attachments[1].final_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
        assert_eq!(builder.clear_values().len(), 2);
    }

    #[test]
    fn test_color_attachment_required() {
        let builder = RenderPassBuilder::new().depth_attachment(vk::Format::D32_SFLOAT);
        assert!(matches!(
            builder.attachment_descriptions(),
            Err(RhiError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_restart_clears_attachments() {
        let mut builder = RenderPassBuilder::new()
            .color_attachment(vk::Format::B8G8R8A8_SRGB)
            .clear_color([1.0, 0.0, 0.0, 1.0]);
        builder.restart();
        assert_eq!(builder, RenderPassBuilder::default());
        assert_eq!(builder.dependency, DependencyMasks::default());
    }

    #[test]
    fn test_offscreen_color_final_layout() {
        let builder = RenderPassBuilder::new()
            .color_attachment(vk::Format::R8G8B8A8_UNORM)
            .color_final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        let attachments = builder.attachment_descriptions().unwrap();
        assert_eq!(
            attachments[0].final_layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
    }
}
