//! Renderer orchestration.
//!
//! [`Renderer`] builds the presentation chain for a window
//! (instance → surface → device → swapchain → render pass → back buffers),
//! holds the registered [`RenderState`]s and exposes the per-frame call
//! sequence:
//!
//! ```text
//! acquire_back_buffer → record_renderers → submit_back_buffer
//!     → present_back_buffer → swap_buffers
//! ```
//!
//! Calls out of that order fail with [`RhiError::FrameSequence`].

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{error, info};

use forge_core::EngineConfig;
use forge_platform::{Surface, Window};
use forge_rhi::device::Device;
use forge_rhi::instance::Instance;
use forge_rhi::physical_device::{PresentTarget, select_physical_device};
use forge_rhi::render_pass::{RenderPass, RenderPassBuilder};
use forge_rhi::swapchain::{AcquireStatus, PresentStatus, Swapchain};
use forge_rhi::{RhiError, RhiResult};

use crate::back_buffer::BackBuffer;
use crate::frame_cycle::{CameraMatrices, FrameBackend, FrameCycle, FramePhase};
use crate::render_state::RenderState;

/// What happened to one call of [`Renderer::render_frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented(PresentStatus),
    /// Acquire reported an out-of-date swapchain; nothing was drawn.
    Skipped,
}

/// Vulkan implementation of the frame steps over borrowed renderer parts.
struct VulkanFrameBackend<'a> {
    device: &'a Device,
    swapchain: &'a Swapchain,
    render_pass: &'a RenderPass,
    back_buffers: &'a [BackBuffer],
    render_states: &'a mut [RenderState],
}

impl VulkanFrameBackend<'_> {
    fn slot(&self, back_buffer: usize) -> RhiResult<&BackBuffer> {
        self.back_buffers.get(back_buffer).ok_or_else(|| {
            RhiError::FrameSequence(format!(
                "Back buffer {} out of range ({} allocated)",
                back_buffer,
                self.back_buffers.len()
            ))
        })
    }
}

impl FrameBackend for VulkanFrameBackend<'_> {
    fn wait_for_back_buffer(&mut self, back_buffer: usize) -> RhiResult<()> {
        self.slot(back_buffer)?.in_flight().wait(u64::MAX)
    }

    fn acquire_image(&mut self, back_buffer: usize) -> RhiResult<AcquireStatus> {
        let semaphore = self.slot(back_buffer)?.image_available().handle();
        self.swapchain.acquire_next_image(semaphore)
    }

    fn reset_back_buffer(&mut self, back_buffer: usize) -> RhiResult<()> {
        self.slot(back_buffer)?.in_flight().reset()
    }

    fn record(
        &mut self,
        back_buffer: usize,
        image_index: u32,
        camera: &CameraMatrices,
    ) -> RhiResult<()> {
        for state in self.render_states.iter_mut() {
            state.update_uniforms(image_index, camera.view, camera.proj)?;
        }

        let begin_info = self.render_pass.begin_info(image_index)?;
        let cmd = self.slot(back_buffer)?.command_buffer();
        cmd.reset()?;
        cmd.begin()?;
        cmd.begin_render_pass(&begin_info);
        for state in self.render_states.iter() {
            state.record_draw(cmd, image_index)?;
        }
        cmd.end_render_pass();
        cmd.end()
    }

    fn submit(&mut self, back_buffer: usize) -> RhiResult<()> {
        let slot = self.slot(back_buffer)?;

        let wait_semaphores = [slot.image_available().handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [slot.render_finished().handle()];
        let command_buffers = [slot.command_buffer().handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the command buffer was recorded this frame and its fence was
        // reset after acquire, so neither is in use by the GPU.
        unsafe {
            self.device
                .submit_graphics(std::slice::from_ref(&submit_info), slot.in_flight().handle())
        }
    }

    fn present(&mut self, back_buffer: usize, image_index: u32) -> RhiResult<PresentStatus> {
        let semaphore = self.slot(back_buffer)?.render_finished().handle();
        self.swapchain.present(image_index, semaphore)
    }
}

/// Owns every GPU object tied to the window.
///
/// # Resource Destruction Order
///
/// 1. Wait for the device to go idle
/// 2. Back buffers (command buffers, semaphores, fences)
/// 3. Render states (descriptor pools, uniform buffers, shared pipelines)
/// 4. Render pass and framebuffers
/// 5. Swapchain and its depth image
/// 6. Device
/// 7. Surface
/// 8. Instance
///
/// Pipelines, meshes and textures created by the application hold the device
/// too; drop them (or hand them to render states) before the renderer. If any
/// are still alive at drop, steps 6 to 8 are skipped and the roots are leaked.
pub struct Renderer {
    cycle: FrameCycle,
    back_buffers: Vec<BackBuffer>,
    render_states: Vec<RenderState>,
    render_pass: ManuallyDrop<RenderPass>,
    swapchain: ManuallyDrop<Swapchain>,
    device: ManuallyDrop<Arc<Device>>,
    surface: ManuallyDrop<Surface>,
    instance: ManuallyDrop<Instance>,
}

impl Renderer {
    pub fn new(window: &Window, config: &EngineConfig) -> RhiResult<Self> {
        let width = window.width();
        let height = window.height();
        info!("Initializing renderer ({}x{})", width, height);

        let surface_extensions = window
            .required_extensions()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;
        let instance = Instance::new(config.graphics.validation, &surface_extensions)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let physical_device = select_physical_device(
            instance.handle(),
            Some(PresentTarget {
                surface: surface.handle(),
                loader: surface.loader(),
            }),
        )?;
        let device = Device::new(&instance, &physical_device)?;

        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            surface.handle(),
            surface.loader(),
            width,
            height,
        )?;

        let render_pass = RenderPassBuilder::for_swapchain(&swapchain)
            .clear_color(config.graphics.clear_color)
            .build(&swapchain)?;

        let image_count = swapchain.image_count();
        let back_buffers = BackBuffer::create_ring(&device, image_count)?;
        let cycle = FrameCycle::new(image_count)?;

        info!(
            "Renderer ready: {} back buffer(s), {:?} {}x{}",
            image_count,
            swapchain.format(),
            swapchain.extent().width,
            swapchain.extent().height
        );

        Ok(Self {
            cycle,
            back_buffers,
            render_states: Vec::new(),
            render_pass: ManuallyDrop::new(render_pass),
            swapchain: ManuallyDrop::new(swapchain),
            device: ManuallyDrop::new(device),
            surface: ManuallyDrop::new(surface),
            instance: ManuallyDrop::new(instance),
        })
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Swapchain image count; per-image arrays must have this length.
    #[inline]
    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    #[inline]
    pub fn back_buffer_index(&self) -> usize {
        self.cycle.back_buffer_index()
    }

    #[inline]
    pub fn frame_phase(&self) -> FramePhase {
        self.cycle.phase()
    }

    pub fn render_states(&self) -> &[RenderState] {
        &self.render_states
    }

    pub fn render_states_mut(&mut self) -> &mut [RenderState] {
        &mut self.render_states
    }

    /// Adds a drawable. Its per-image arrays must match [`Self::image_count`].
    pub fn register(&mut self, state: RenderState) -> RhiResult<usize> {
        if state.image_count() != self.image_count() {
            return Err(RhiError::InvalidConfig(format!(
                "Render state has {} image slot(s), swapchain has {} image(s)",
                state.image_count(),
                self.image_count()
            )));
        }
        self.render_states.push(state);
        Ok(self.render_states.len() - 1)
    }

    fn split(&mut self) -> (&mut FrameCycle, VulkanFrameBackend<'_>) {
        let backend = VulkanFrameBackend {
            device: &self.device,
            swapchain: &self.swapchain,
            render_pass: &self.render_pass,
            back_buffers: &self.back_buffers,
            render_states: &mut self.render_states,
        };
        (&mut self.cycle, backend)
    }

    /// Waits for the current back buffer and acquires a swapchain image.
    pub fn acquire_back_buffer(&mut self) -> RhiResult<AcquireStatus> {
        let (cycle, mut backend) = self.split();
        cycle.acquire(&mut backend)
    }

    /// Updates uniforms and records every registered render state.
    pub fn record_renderers(&mut self, camera: &CameraMatrices) -> RhiResult<()> {
        let (cycle, mut backend) = self.split();
        cycle.record(&mut backend, camera)
    }

    pub fn submit_back_buffer(&mut self) -> RhiResult<()> {
        let (cycle, mut backend) = self.split();
        cycle.submit(&mut backend)
    }

    pub fn present_back_buffer(&mut self) -> RhiResult<PresentStatus> {
        let (cycle, mut backend) = self.split();
        cycle.present(&mut backend)
    }

    pub fn swap_buffers(&mut self) -> RhiResult<()> {
        self.cycle.swap()
    }

    /// Runs one full iteration of the frame sequence.
    pub fn render_frame(&mut self, camera: &CameraMatrices) -> RhiResult<FrameOutcome> {
        if self.acquire_back_buffer()? == AcquireStatus::OutOfDate {
            return Ok(FrameOutcome::Skipped);
        }
        self.record_renderers(camera)?;
        self.submit_back_buffer()?;
        let status = self.present_back_buffer()?;
        self.swap_buffers()?;
        Ok(FrameOutcome::Presented(status))
    }

    pub fn wait_idle(&self) -> RhiResult<()> {
        self.device.wait_idle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!(
                "Failed to wait for device idle during renderer drop: {:?}",
                e
            );
        }

        self.back_buffers.clear();
        self.render_states.clear();

        // SAFETY: each field is dropped exactly once, here, in dependency order.
        unsafe {
            ManuallyDrop::drop(&mut self.render_pass);
            ManuallyDrop::drop(&mut self.swapchain);
        }

        let outside_refs = Arc::strong_count(&self.device) - 1;
        // SAFETY: the roots are not touched again after this call.
        let released = unsafe {
            release_roots(
                outside_refs,
                &mut self.device,
                &mut self.surface,
                &mut self.instance,
            )
        };
        if !released {
            return;
        }

        info!("Renderer destroyed");
    }
}

/// Drops device, surface and instance in that order, or leaks all three when
/// `outside_refs` objects still hold the device. Returns whether they were
/// dropped.
///
/// Leaking keeps every handle valid for the outside holders: the device is
/// destroyed when its last `Arc` goes, and its parent instance never is.
///
/// # Safety
///
/// None of the three may be used after this returns `true`.
unsafe fn release_roots<D, S, I>(
    outside_refs: usize,
    device: &mut ManuallyDrop<D>,
    surface: &mut ManuallyDrop<S>,
    instance: &mut ManuallyDrop<I>,
) -> bool {
    if outside_refs > 0 {
        error!(
            "{} object(s) outside the renderer still reference the device; \
             leaking device, surface and instance",
            outside_refs
        );
        return false;
    }

    unsafe {
        ManuallyDrop::drop(device);
        ManuallyDrop::drop(surface);
        ManuallyDrop::drop(instance);
    }
    true
}
