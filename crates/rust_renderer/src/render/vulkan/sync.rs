//! Vulkan synchronization primitives for GPU/CPU coordination
//!
//! RAII wrappers for the binary semaphores and fences a frame slot needs.
//!
//! ## Frame slot objects
//! ```text
//! acquire ──signals──> image_available ──waited by──> submit
//! submit  ──signals──> render_finished ──waited by──> present
//! submit  ──signals──> in_flight (fence) ──waited by──> CPU before reusing the slot
//! ```
//!
//! The fence starts signalled so the very first wait on a fresh slot returns
//! immediately.

use ash::{vk, Device};

use super::context::{VulkanError, VulkanResult};

/// GPU-GPU synchronization primitive with automatic resource management
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new binary semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe { device.create_semaphore(&create_info, None) }
            .map_err(VulkanError::SyncObjectCreationFailure)?;

        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe { device.create_fence(&create_info, None) }
            .map_err(VulkanError::SyncObjectCreationFailure)?;

        Ok(Self { device, fence })
    }

    /// Block until the fence is signalled or `timeout` nanoseconds pass
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        unsafe { self.device.wait_for_fences(&[self.fence], true, timeout) }.map_err(VulkanError::Api)
    }

    /// Return the fence to the unsignalled state
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.fence]) }.map_err(VulkanError::Api)
    }

    /// Whether the fence is currently signalled
    pub fn is_signaled(&self) -> VulkanResult<bool> {
        unsafe { self.device.get_fence_status(self.fence) }.map_err(VulkanError::Api)
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization objects owned by one frame slot
pub struct FrameSync {
    /// Signalled by acquire, waited on by the submission
    pub image_available: Semaphore,
    /// Signalled by the submission, waited on by present
    pub render_finished: Semaphore,
    /// Signalled when the slot's submission completes; created signalled
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create both semaphores and a signalled fence
    pub fn new(device: Device) -> VulkanResult<Self> {
        let image_available = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        let in_flight = Fence::new(device, true)?;

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }
}
