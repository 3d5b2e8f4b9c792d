//! Per-frame synchronization slots.

use std::sync::Arc;

use tracing::debug;

use forge_rhi::RhiResult;
use forge_rhi::command::CommandBuffer;
use forge_rhi::device::Device;
use forge_rhi::sync::{Fence, Semaphore};

/// One slot of the frame ring.
///
/// # Synchronization Flow
///
/// ```text
/// 1. Wait on in_flight (CPU waits for the previous use of this slot)
/// 2. Acquire swapchain image (signals image_available)
/// 3. Reset in_flight, record command_buffer
/// 4. Submit command_buffer:
///    - Wait on image_available at COLOR_ATTACHMENT_OUTPUT
///    - Signal render_finished
///    - Signal in_flight
/// 5. Present (waits on render_finished)
/// ```
pub struct BackBuffer {
    command_buffer: CommandBuffer,
    image_available: Semaphore,
    render_finished: Semaphore,
    in_flight: Fence,
}

impl BackBuffer {
    pub fn new(device: &Arc<Device>) -> RhiResult<Self> {
        let command_buffer = CommandBuffer::allocate(device.clone(), device.command_pool())?;
        let image_available = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        // Signaled so the first wait returns immediately.
        let in_flight = Fence::new(device.clone(), true)?;

        Ok(Self {
            command_buffer,
            image_available,
            render_finished,
            in_flight,
        })
    }

    /// `count` independent slots.
    pub fn create_ring(device: &Arc<Device>, count: usize) -> RhiResult<Vec<Self>> {
        let ring = (0..count)
            .map(|_| Self::new(device))
            .collect::<RhiResult<Vec<_>>>()?;
        debug!("Created {} back buffer(s)", ring.len());
        Ok(ring)
    }

    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    #[inline]
    pub fn image_available(&self) -> &Semaphore {
        &self.image_available
    }

    #[inline]
    pub fn render_finished(&self) -> &Semaphore {
        &self.render_finished
    }

    #[inline]
    pub fn in_flight(&self) -> &Fence {
        &self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_back_buffer_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<BackBuffer>();
    }
}
