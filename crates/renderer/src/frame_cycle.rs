//! Frame-ring bookkeeping and call-order enforcement.
//!
//! The application drives each frame through
//! `acquire → record → submit → present → swap`, once per iteration and in
//! that order. [`FrameCycle`] tracks where in that sequence the renderer is,
//! which back buffer is current and which swapchain image was acquired. The
//! GPU work behind each step goes through a [`FrameBackend`], so the protocol
//! can be exercised without a device.

use std::fmt;

use glam::Mat4;
use tracing::{trace, warn};

use forge_rhi::swapchain::{AcquireStatus, PresentStatus};
use forge_rhi::{RhiError, RhiResult};

/// Camera matrices refreshed once per recorded frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraMatrices {
    pub view: Mat4,
    pub proj: Mat4,
}

impl Default for CameraMatrices {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
        }
    }
}

/// Where the current iteration is in the frame sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    Acquired,
    Recorded,
    Submitted,
    Presented,
}

impl fmt::Display for FramePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FramePhase::Idle => "idle",
            FramePhase::Acquired => "acquired",
            FramePhase::Recorded => "recorded",
            FramePhase::Submitted => "submitted",
            FramePhase::Presented => "presented",
        };
        f.write_str(name)
    }
}

/// GPU side of each frame step.
///
/// `back_buffer` is the ring slot; `image_index` is the swapchain image handed
/// out by `acquire_image`. The two are unrelated in general.
pub trait FrameBackend {
    /// Blocks until the slot's previous submission has finished.
    fn wait_for_back_buffer(&mut self, back_buffer: usize) -> RhiResult<()>;

    /// Requests the next swapchain image, signaling the slot's acquire semaphore.
    fn acquire_image(&mut self, back_buffer: usize) -> RhiResult<AcquireStatus>;

    /// Unsignals the slot's fence once work is certain to be submitted.
    fn reset_back_buffer(&mut self, back_buffer: usize) -> RhiResult<()>;

    /// Updates per-image uniforms and re-records the slot's command buffer.
    fn record(
        &mut self,
        back_buffer: usize,
        image_index: u32,
        camera: &CameraMatrices,
    ) -> RhiResult<()>;

    fn submit(&mut self, back_buffer: usize) -> RhiResult<()>;

    fn present(&mut self, back_buffer: usize, image_index: u32) -> RhiResult<PresentStatus>;
}

/// Ring position and phase of the frame loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameCycle {
    back_buffer_count: usize,
    back_buffer_index: usize,
    image_index: Option<u32>,
    phase: FramePhase,
    frames_swapped: u64,
}

impl FrameCycle {
    pub fn new(back_buffer_count: usize) -> RhiResult<Self> {
        if back_buffer_count == 0 {
            return Err(RhiError::InvalidConfig(
                "Frame cycle needs at least one back buffer".to_string(),
            ));
        }
        Ok(Self {
            back_buffer_count,
            back_buffer_index: 0,
            image_index: None,
            phase: FramePhase::Idle,
            frames_swapped: 0,
        })
    }

    #[inline]
    pub fn back_buffer_count(&self) -> usize {
        self.back_buffer_count
    }

    #[inline]
    pub fn back_buffer_index(&self) -> usize {
        self.back_buffer_index
    }

    /// Image acquired in the current iteration, if any.
    #[inline]
    pub fn image_index(&self) -> Option<u32> {
        self.image_index
    }

    #[inline]
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    #[inline]
    pub fn frames_swapped(&self) -> u64 {
        self.frames_swapped
    }

    fn expect_phase(&self, expected: FramePhase, step: &str) -> RhiResult<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(RhiError::FrameSequence(format!(
                "{} called in phase '{}', expected '{}'",
                step, self.phase, expected
            )))
        }
    }

    fn acquired_image(&self) -> RhiResult<u32> {
        self.image_index.ok_or_else(|| {
            RhiError::FrameSequence("No swapchain image acquired this frame".to_string())
        })
    }

    /// Waits for the current slot, then acquires an image.
    ///
    /// An out-of-date swapchain skips the frame: the phase stays `Idle`, the
    /// ring does not advance and the slot's fence stays signaled.
    pub fn acquire<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> RhiResult<AcquireStatus> {
        self.expect_phase(FramePhase::Idle, "acquire")?;
        let slot = self.back_buffer_index;

        backend.wait_for_back_buffer(slot)?;
        let status = backend.acquire_image(slot)?;

        match status {
            AcquireStatus::Acquired {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    warn!("Acquired image {} from a suboptimal swapchain", image_index);
                }
                backend.reset_back_buffer(slot)?;
                self.image_index = Some(image_index);
                self.phase = FramePhase::Acquired;
                trace!("Back buffer {} acquired image {}", slot, image_index);
            }
            AcquireStatus::OutOfDate => {
                warn!("Swapchain out of date on acquire; skipping frame");
            }
        }

        Ok(status)
    }

    pub fn record<B: FrameBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        camera: &CameraMatrices,
    ) -> RhiResult<()> {
        self.expect_phase(FramePhase::Acquired, "record")?;
        let image_index = self.acquired_image()?;
        backend.record(self.back_buffer_index, image_index, camera)?;
        self.phase = FramePhase::Recorded;
        Ok(())
    }

    pub fn submit<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> RhiResult<()> {
        self.expect_phase(FramePhase::Recorded, "submit")?;
        backend.submit(self.back_buffer_index)?;
        self.phase = FramePhase::Submitted;
        Ok(())
    }

    pub fn present<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> RhiResult<PresentStatus> {
        self.expect_phase(FramePhase::Submitted, "present")?;
        let image_index = self.acquired_image()?;
        let status = backend.present(self.back_buffer_index, image_index)?;

        match status {
            PresentStatus::Optimal => {}
            PresentStatus::Suboptimal => warn!("Presented image {} suboptimally", image_index),
            PresentStatus::OutOfDate => warn!("Swapchain out of date on present"),
        }

        self.phase = FramePhase::Presented;
        Ok(status)
    }

    /// Moves to the next slot: `(index + 1) mod N`.
    pub fn swap(&mut self) -> RhiResult<()> {
        self.expect_phase(FramePhase::Presented, "swap")?;
        self.advance();
        self.image_index = None;
        self.phase = FramePhase::Idle;
        Ok(())
    }

    fn advance(&mut self) {
        self.back_buffer_index = (self.back_buffer_index + 1) % self.back_buffer_count;
        self.frames_swapped += 1;
    }
}
