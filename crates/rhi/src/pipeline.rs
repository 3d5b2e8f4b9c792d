//! Graphics pipeline construction.
//!
//! [`GraphicsPipelineBuilder`] collects shader paths, the target render pass
//! and extent plus fixed-function state, then compiles an immutable
//! [`Pipeline`]. The pipeline owns its descriptor set layout (uniform buffer at
//! binding 0, combined image sampler at binding 1) and its pipeline layout.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use forge_rhi::device::Device;
//! use forge_rhi::pipeline::GraphicsPipelineBuilder;
//! use forge_rhi::render_pass::RenderPass;
//!
//! # fn example(device: &Arc<Device>, render_pass: &RenderPass) -> Result<(), forge_rhi::RhiError> {
//! let pipeline = GraphicsPipelineBuilder::color_depth_rasterizer(
//!     render_pass,
//!     Path::new("shaders"),
//!     "quad",
//! )
//! .build(device)?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::command::CommandBuffer;
use crate::descriptor::DescriptorSetLayout;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::render_pass::RenderPass;
use crate::shader::{Shader, ShaderStage, shader_path};
use crate::vertex::Vertex;

/// Pipeline layout wrapper.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    pub fn new(
        device: Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        debug!(
            "Created pipeline layout with {} descriptor set layout(s)",
            descriptor_set_layouts.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Pipeline layout destroyed");
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
    TriangleStrip,
    LineList,
}

impl PrimitiveTopology {
    pub fn to_vk(self) -> vk::PrimitiveTopology {
        match self {
            PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
            PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
}

impl PolygonMode {
    pub fn to_vk(self) -> vk::PolygonMode {
        match self {
            PolygonMode::Fill => vk::PolygonMode::FILL,
            PolygonMode::Line => vk::PolygonMode::LINE,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    None,
    #[default]
    Back,
    Front,
}

impl CullMode {
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Back => vk::CullModeFlags::BACK,
            CullMode::Front => vk::CullModeFlags::FRONT,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

impl FrontFace {
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompareOp {
    #[default]
    Less,
    LessOrEqual,
    Always,
}

impl CompareOp {
    pub fn to_vk(self) -> vk::CompareOp {
        match self {
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

/// Color blend state for the single color attachment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorBlend {
    pub blend_enable: bool,
    pub src_color_factor: vk::BlendFactor,
    pub dst_color_factor: vk::BlendFactor,
    pub src_alpha_factor: vk::BlendFactor,
    pub dst_alpha_factor: vk::BlendFactor,
}

impl Default for ColorBlend {
    fn default() -> Self {
        Self::opaque()
    }
}

impl ColorBlend {
    pub fn opaque() -> Self {
        Self {
            blend_enable: false,
            src_color_factor: vk::BlendFactor::ONE,
            dst_color_factor: vk::BlendFactor::ZERO,
            src_alpha_factor: vk::BlendFactor::ONE,
            dst_alpha_factor: vk::BlendFactor::ZERO,
        }
    }

    /// `src * src_alpha + dst * (1 - src_alpha)`
    pub fn alpha_blend() -> Self {
        Self {
            blend_enable: true,
            src_color_factor: vk::BlendFactor::SRC_ALPHA,
            dst_color_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            src_alpha_factor: vk::BlendFactor::ONE,
            dst_alpha_factor: vk::BlendFactor::ZERO,
        }
    }

    pub fn to_vk(&self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState {
            blend_enable: self.blend_enable.into(),
            src_color_blend_factor: self.src_color_factor,
            dst_color_blend_factor: self.dst_color_factor,
            color_blend_op: vk::BlendOp::ADD,
            src_alpha_blend_factor: self.src_alpha_factor,
            dst_alpha_blend_factor: self.dst_alpha_factor,
            alpha_blend_op: vk::BlendOp::ADD,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        }
    }
}

/// Full-extent viewport with the standard `0..1` depth range.
pub fn viewport_for(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn scissor_for(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Graphics pipeline configuration.
///
/// Shader stages, a render pass and a non-zero extent are required; every
/// other field has a usable default.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphicsPipelineBuilder {
    pub shader_stages: Vec<(ShaderStage, PathBuf)>,
    pub entry_point: String,
    pub render_pass: Option<vk::RenderPass>,
    pub extent: Option<vk::Extent2D>,
    pub topology: PrimitiveTopology,
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare_op: CompareOp,
    pub color_blend: ColorBlend,
}

impl Default for GraphicsPipelineBuilder {
    fn default() -> Self {
        Self {
            shader_stages: Vec::new(),
            entry_point: "main".to_string(),
            render_pass: None,
            extent: None,
            topology: PrimitiveTopology::TriangleList,
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            depth_test: true,
            depth_write: true,
            depth_compare_op: CompareOp::Less,
            color_blend: ColorBlend::opaque(),
        }
    }
}

impl GraphicsPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Depth-tested, alpha-blended triangle rasterizer reading
    /// `<shader_dir>/<name>.vert.spv` and `<shader_dir>/<name>.frag.spv`.
    pub fn color_depth_rasterizer(render_pass: &RenderPass, shader_dir: &Path, name: &str) -> Self {
        Self::new()
            .shader(ShaderStage::Vertex, shader_path(shader_dir, name, ShaderStage::Vertex))
            .shader(ShaderStage::Fragment, shader_path(shader_dir, name, ShaderStage::Fragment))
            .render_pass(render_pass.handle(), render_pass.extent())
            .topology(PrimitiveTopology::TriangleList)
            .polygon_mode(PolygonMode::Fill)
            .cull_mode(CullMode::Back)
            .front_face(FrontFace::CounterClockwise)
            .depth(true, true, CompareOp::Less)
            .color_blend(ColorBlend::alpha_blend())
    }

    /// Adds or replaces the module for `stage`.
    pub fn shader(mut self, stage: ShaderStage, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match self.shader_stages.iter_mut().find(|(s, _)| *s == stage) {
            Some(entry) => entry.1 = path,
            None => self.shader_stages.push((stage, path)),
        }
        self
    }

    pub fn entry_point(mut self, name: &str) -> Self {
        self.entry_point = name.to_string();
        self
    }

    pub fn render_pass(mut self, render_pass: vk::RenderPass, extent: vk::Extent2D) -> Self {
        self.render_pass = Some(render_pass);
        self.extent = Some(extent);
        self
    }

    pub fn topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn polygon_mode(mut self, mode: PolygonMode) -> Self {
        self.polygon_mode = mode;
        self
    }

    pub fn cull_mode(mut self, mode: CullMode) -> Self {
        self.cull_mode = mode;
        self
    }

    pub fn front_face(mut self, face: FrontFace) -> Self {
        self.front_face = face;
        self
    }

    pub fn depth(mut self, test: bool, write: bool, compare_op: CompareOp) -> Self {
        self.depth_test = test;
        self.depth_write = write;
        self.depth_compare_op = compare_op;
        self
    }

    pub fn color_blend(mut self, blend: ColorBlend) -> Self {
        self.color_blend = blend;
        self
    }

    pub fn restart(&mut self) -> &mut Self {
        *self = Self::default();
        self
    }

    /// Checks the required pieces and returns the render pass and extent.
    pub fn validate(&self) -> RhiResult<(vk::RenderPass, vk::Extent2D)> {
        for stage in [ShaderStage::Vertex, ShaderStage::Fragment] {
            if !self.shader_stages.iter().any(|(s, _)| *s == stage) {
                return Err(RhiError::PipelineError(format!(
                    "A {} shader is required",
                    stage
                )));
            }
        }

        let render_pass = self
            .render_pass
            .filter(|rp| *rp != vk::RenderPass::null())
            .ok_or_else(|| RhiError::PipelineError("A render pass is required".to_string()))?;

        let extent = self
            .extent
            .filter(|e| e.width > 0 && e.height > 0)
            .ok_or_else(|| RhiError::PipelineError("A non-zero extent is required".to_string()))?;

        Ok((render_pass, extent))
    }

    pub fn build(&self, device: &Arc<Device>) -> RhiResult<Pipeline> {
        let (render_pass, extent) = self.validate()?;

        // Modules only need to live until the pipeline is compiled.
        let shaders = self
            .shader_stages
            .iter()
            .map(|(stage, path)| {
                Shader::from_spirv_file(device.clone(), path, *stage, &self.entry_point)
            })
            .collect::<RhiResult<Vec<_>>>()?;
        let stages: Vec<_> = shaders.iter().map(|s| s.stage_create_info()).collect();

        let set_layout = DescriptorSetLayout::uniform_sampler(device.clone())?;
        let layout = PipelineLayout::new(device.clone(), &[set_layout.handle()], &[])?;

        let bindings = [Vertex::binding_description()];
        let attributes = Vertex::attribute_descriptions();
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(self.topology.to_vk())
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic; see `Pipeline::record_bind`.
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(self.polygon_mode.to_vk())
            .line_width(1.0)
            .cull_mode(self.cull_mode.to_vk())
            .front_face(self.front_face.to_vk());

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(self.depth_test)
            .depth_write_enable(self.depth_write)
            .depth_compare_op(self.depth_compare_op.to_vk())
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);

        let blend_attachments = [self.color_blend.to_vk()];
        let color_blend_state =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .render_pass(render_pass)
            .subpass(0);

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, result)| result)?
        };
        let pipeline = pipelines.into_iter().next().ok_or_else(|| {
            RhiError::PipelineError("Driver returned no pipeline".to_string())
        })?;

        info!(
            "Graphics pipeline created ({} stage(s), {}x{})",
            stages.len(),
            extent.width,
            extent.height
        );

        Ok(Pipeline {
            device: device.clone(),
            pipeline,
            layout,
            set_layout,
            extent,
        })
    }
}

/// Compiled graphics pipeline plus the layouts it was built against.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
    layout: PipelineLayout,
    set_layout: DescriptorSetLayout,
    extent: vk::Extent2D,
}

impl Pipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn layout(&self) -> &PipelineLayout {
        &self.layout
    }

    #[inline]
    pub fn set_layout(&self) -> &DescriptorSetLayout {
        &self.set_layout
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Binds the pipeline and sets the dynamic viewport and scissor.
    pub fn record_bind(&self, cmd: &CommandBuffer) {
        cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.pipeline);
        cmd.set_viewport(&viewport_for(self.extent));
        cmd.set_scissor(&scissor_for(self.extent));
    }

    /// Binds `set` at set index 0 of this pipeline's layout.
    pub fn record_bind_descriptor_set(&self, cmd: &CommandBuffer, set: vk::DescriptorSet) {
        cmd.bind_descriptor_sets(
            vk::PipelineBindPoint::GRAPHICS,
            self.layout.handle(),
            0,
            &[set],
        );
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        debug!("Graphics pipeline destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn fake_render_pass() -> vk::RenderPass {
        use ash::vk::Handle;
        vk::RenderPass::from_raw(0x1234)
    }

    fn complete_builder() -> GraphicsPipelineBuilder {
        GraphicsPipelineBuilder::new()
            .shader(ShaderStage::Vertex, "shaders/quad.vert.spv")
            .shader(ShaderStage::Fragment, "shaders/quad.frag.spv")
            .render_pass(fake_render_pass(), extent(800, 600))
    }

    #[test]
    fn test_defaults_match_rasterizer_state() {
        let builder = GraphicsPipelineBuilder::new();
        assert_eq!(builder.topology.to_vk(), vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(builder.polygon_mode.to_vk(), vk::PolygonMode::FILL);
        assert_eq!(builder.cull_mode.to_vk(), vk::CullModeFlags::BACK);
        assert_eq!(builder.front_face.to_vk(), vk::FrontFace::COUNTER_CLOCKWISE);
        assert_eq!(builder.depth_compare_op.to_vk(), vk::CompareOp::LESS);
        assert!(builder.depth_test && builder.depth_write);
        assert_eq!(builder.entry_point, "main");
    }

    #[test]
    fn test_validate_requires_shaders() {
        let builder = GraphicsPipelineBuilder::new().render_pass(fake_render_pass(), extent(1, 1));
        assert!(matches!(builder.validate(), Err(RhiError::PipelineError(_))));

        let vertex_only = builder.shader(ShaderStage::Vertex, "a.vert.spv");
        assert!(vertex_only.validate().is_err());
    }

    #[test]
    fn test_validate_requires_render_pass_and_extent() {
        let no_pass = GraphicsPipelineBuilder::new()
            .shader(ShaderStage::Vertex, "a.vert.spv")
            .shader(ShaderStage::Fragment, "a.frag.spv");
        assert!(no_pass.validate().is_err());

        let null_pass = no_pass.clone().render_pass(vk::RenderPass::null(), extent(1, 1));
        assert!(null_pass.validate().is_err());

        let zero_extent = no_pass.render_pass(fake_render_pass(), extent(0, 600));
        assert!(zero_extent.validate().is_err());
    }

    #[test]
    fn test_validate_complete_builder() {
        let (render_pass, ext) = complete_builder().validate().unwrap();
        assert_eq!(render_pass, fake_render_pass());
        assert_eq!(ext, extent(800, 600));
    }

    #[test]
    fn test_shader_replaces_same_stage() {
        let builder = complete_builder().shader(ShaderStage::Vertex, "other.vert.spv");
        assert_eq!(builder.shader_stages.len(), 2);
        assert_eq!(builder.shader_stages[0].1, PathBuf::from("other.vert.spv"));
    }

    #[test]
    fn test_restart_resets_to_default() {
        let mut builder = complete_builder().color_blend(ColorBlend::alpha_blend());
        builder.restart();
        assert_eq!(builder, GraphicsPipelineBuilder::default());
    }

    #[test]
    fn test_alpha_blend_factors() {
        let state = ColorBlend::alpha_blend().to_vk();
        assert_eq!(state.blend_enable, vk::TRUE);
        assert_eq!(state.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(
            state.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );
        assert_eq!(state.color_write_mask, vk::ColorComponentFlags::RGBA);

        assert_eq!(ColorBlend::opaque().to_vk().blend_enable, vk::FALSE);
    }

    #[test]
    fn test_viewport_and_scissor_cover_extent() {
        let viewport = viewport_for(extent(1280, 720));
        assert_eq!(viewport.width, 1280.0);
        assert_eq!(viewport.height, 720.0);
        assert_eq!(viewport.min_depth, 0.0);
        assert_eq!(viewport.max_depth, 1.0);

        let scissor = scissor_for(extent(1280, 720));
        assert_eq!(scissor.offset.x, 0);
        assert_eq!(scissor.extent, extent(1280, 720));
    }
}
