//! Vulkan logical device, queues, command pools and one-time submission.
//!
//! # Overview
//!
//! The [`Device`] owns:
//! - the logical device and its graphics queue (plus a present queue when
//!   the physical device was selected against a surface)
//! - a persistent command pool for resettable per-frame command buffers
//! - a transient command pool for one-shot transfer commands
//! - the memory properties used by [`Device::find_memory_type`]
//!
//! Every resource built from the device holds an `Arc<Device>` and releases
//! its GPU objects before the last reference goes away.
//!
//! # Example
//!
//! ```no_run
//! use forge_rhi::instance::Instance;
//! use forge_rhi::physical_device::select_physical_device;
//! use forge_rhi::device::Device;
//!
//! let instance = Instance::new(false, &[]).expect("Failed to create instance");
//! let physical_device_info = select_physical_device(instance.handle(), None)
//!     .expect("No suitable GPU found");
//! let device = Device::new(&instance, &physical_device_info)
//!     .expect("Failed to create logical device");
//!
//! device
//!     .submit_one_time(|cmd| {
//!         // record transfer commands
//!         let _ = cmd.handle();
//!     })
//!     .expect("Transfer failed");
//! ```

use std::ffi::{CStr, c_char};
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use crate::command::{CommandBuffer, CommandPool, CommandPoolKind};
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::memory;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices};

/// Extensions enabled when the device presents to a surface.
const PRESENT_DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Vulkan logical device wrapper.
pub struct Device {
    /// Vulkan logical device handle.
    device: ash::Device,
    /// Physical device handle.
    physical_device: vk::PhysicalDevice,
    /// Memory heaps and types of the physical device.
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Limits, used for sampler anisotropy.
    limits: vk::PhysicalDeviceLimits,
    /// Whether sampler anisotropy was enabled at creation.
    anisotropy_enabled: bool,
    /// Graphics queue handle.
    graphics_queue: vk::Queue,
    /// Presentation queue handle, only when created against a surface.
    present_queue: Option<vk::Queue>,
    /// Queue family indices.
    queue_families: QueueFamilyIndices,
    /// Pool for long-lived, individually resettable command buffers.
    command_pool: CommandPool,
    /// Pool for one-time-submit transfer command buffers.
    transient_pool: CommandPool,
}

impl Device {
    /// Creates a new logical device with both command pools.
    ///
    /// The swapchain extension and a present queue are enabled only when
    /// `physical_device_info` carries a present queue family.
    ///
    /// # Errors
    ///
    /// Returns an error if the physical device has no graphics family or if
    /// device or command pool creation fails.
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
    ) -> Result<Arc<Self>, RhiError> {
        let queue_families = physical_device_info.queue_families;
        let graphics_family = queue_families
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;

        let unique_families = queue_families.unique_families();
        let queue_priorities = [1.0f32];

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let anisotropy_enabled = physical_device_info.supports_anisotropy();
        let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(anisotropy_enabled);

        let extension_names: Vec<*const c_char> = if queue_families.present_family.is_some() {
            PRESENT_DEVICE_EXTENSIONS
                .iter()
                .map(|ext| ext.as_ptr())
                .collect()
        } else {
            Vec::new()
        };

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s), anisotropy {}",
            extension_names.len(),
            if anisotropy_enabled { "on" } else { "off" }
        );

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        debug!("Graphics queue retrieved from family {}", graphics_family);

        let present_queue = queue_families.present_family.map(|family| {
            let queue = unsafe { device.get_device_queue(family, 0) };
            debug!("Present queue retrieved from family {}", family);
            queue
        });

        let command_pool =
            match CommandPool::new(&device, graphics_family, CommandPoolKind::Persistent) {
                Ok(pool) => pool,
                Err(e) => {
                    unsafe { device.destroy_device(None) };
                    return Err(e);
                }
            };
        let transient_pool =
            match CommandPool::new(&device, graphics_family, CommandPoolKind::Transient) {
                Ok(pool) => pool,
                Err(e) => {
                    unsafe {
                        command_pool.destroy(&device);
                        device.destroy_device(None);
                    }
                    return Err(e);
                }
            };

        Ok(Arc::new(Self {
            device,
            physical_device: physical_device_info.device,
            memory_properties: physical_device_info.memory_properties,
            limits: physical_device_info.properties.limits,
            anisotropy_enabled,
            graphics_queue,
            present_queue,
            queue_families,
            command_pool,
            transient_pool,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the graphics queue handle.
    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Returns the presentation queue, if the device was created for a surface.
    #[inline]
    pub fn present_queue(&self) -> Option<vk::Queue> {
        self.present_queue
    }

    /// Returns the queue family indices.
    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    #[inline]
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    #[inline]
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.limits
    }

    #[inline]
    pub fn anisotropy_enabled(&self) -> bool {
        self.anisotropy_enabled
    }

    /// Pool for per-frame command buffers.
    #[inline]
    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    /// Finds a memory type for the given requirement bits and properties.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::NoSuitableMemoryType`] when nothing matches.
    pub fn find_memory_type(
        &self,
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> RhiResult<u32> {
        memory::find_memory_type_index(&self.memory_properties, type_bits, properties)
            .ok_or_else(|| memory::no_memory_type(type_bits, properties))
    }

    /// Waits for the device to become idle.
    pub fn wait_idle(&self) -> Result<(), RhiError> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits command buffers to the graphics queue.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - All command buffers are valid and recorded
    /// - Synchronization is properly handled
    /// - The fence (if provided) is not in use
    pub unsafe fn submit_graphics(
        &self,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> Result<(), RhiError> {
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submit_infos, fence)?;
        }
        Ok(())
    }

    /// Allocates a command buffer from the transient pool and begins it for
    /// a single submission.
    pub fn begin_one_time_commands(self: &Arc<Self>) -> RhiResult<CommandBuffer> {
        let cmd = CommandBuffer::allocate(self.clone(), &self.transient_pool)?;
        cmd.begin()?;
        Ok(cmd)
    }

    /// Ends `cmd`, submits it to the graphics queue and blocks until the
    /// queue is idle. The command buffer is freed when it drops.
    pub fn end_one_time_commands(&self, cmd: CommandBuffer) -> RhiResult<()> {
        cmd.end()?;

        let command_buffers = [cmd.handle()];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

        unsafe {
            self.submit_graphics(std::slice::from_ref(&submit_info), vk::Fence::null())?;
            self.device.queue_wait_idle(self.graphics_queue)?;
        }

        Ok(())
    }

    /// Records commands with `record` and runs them synchronously.
    pub fn submit_one_time<F>(self: &Arc<Self>, record: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer),
    {
        let cmd = self.begin_one_time_commands()?;
        record(&cmd);
        self.end_one_time_commands(cmd)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }

            self.transient_pool.destroy(&self.device);
            self.command_pool.destroy(&self.device);
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: ash::Device is Send+Sync, the remaining fields are plain handles
// and data. Command pools are only used from the thread driving the frame.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}
