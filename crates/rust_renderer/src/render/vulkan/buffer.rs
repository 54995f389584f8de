//! Buffer management
//!
//! A `Buffer` pairs a `vk::Buffer` with the memory bound to it and frees both
//! on drop. It shares ownership of the logical device, so the device is
//! never destroyed underneath it.

use ash::vk;
use std::sync::Arc;

use super::context::{VulkanContext, VulkanError, VulkanResult};
use super::device::LogicalDevice;

/// Buffer wrapper with memory management
pub struct Buffer {
    device: Arc<LogicalDevice>,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a buffer of `size` bytes backed by memory with `properties`
    pub fn new(
        context: &VulkanContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let device = context.shared_device();
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
            .map_err(VulkanError::BufferAllocationFailure)?;

        let mut this = Self {
            device,
            buffer,
            memory: vk::DeviceMemory::null(),
            size,
        };

        let requirements = unsafe { this.device.device.get_buffer_memory_requirements(buffer) };
        let memory_type_index = context.find_memory_type(requirements.memory_type_bits, properties)?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        this.memory = unsafe { this.device.device.allocate_memory(&alloc_info, None) }
            .map_err(VulkanError::BufferAllocationFailure)?;

        unsafe { this.device.device.bind_buffer_memory(buffer, this.memory, 0) }
            .map_err(VulkanError::BufferAllocationFailure)?;

        Ok(this)
    }

    /// Copy `bytes` to the start of a host-visible buffer
    ///
    /// The memory must be host-coherent; no flush is issued.
    pub fn write_data(&self, bytes: &[u8]) -> VulkanResult<()> {
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::BufferAllocationFailure(vk::Result::ERROR_MEMORY_MAP_FAILED));
        }

        unsafe {
            let data_ptr = self
                .device
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::BufferAllocationFailure)?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), data_ptr.cast::<u8>(), bytes.len());
            self.device.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Device the buffer was created on
    pub fn device(&self) -> &LogicalDevice {
        &self.device
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_buffer(self.buffer, None);
            self.device.device.free_memory(self.memory, None);
        }
    }
}
