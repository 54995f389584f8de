//! Mesh upload through staging buffers
//!
//! Each upload copies host data into a host-visible staging buffer, then
//! copies that into a device-local buffer with a one-shot command buffer and
//! waits for the graphics queue to go idle. Uploads are blocking and
//! serialised; they are meant for startup, not per frame.

use ash::vk;

use super::buffer::Buffer;
use super::commands::CommandPool;
use super::context::{VulkanContext, VulkanError, VulkanResult};
use super::frame::{DrawCall, Drawable};
use crate::render::mesh::{IndexType, Mesh};

impl From<IndexType> for vk::IndexType {
    fn from(index_type: IndexType) -> Self {
        match index_type {
            IndexType::U16 => vk::IndexType::UINT16,
            IndexType::U32 => vk::IndexType::UINT32,
        }
    }
}

/// An uploaded mesh: immutable device-local vertex and index buffers
///
/// Keeps the logical device alive, so it may outlive the [`Renderer`] that
/// created it. Dropping a model waits for the device to go idle first, since
/// a frame still in flight may be reading its buffers.
///
/// [`Renderer`]: super::renderer::Renderer
pub struct Model {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
    index_type: IndexType,
}

impl Model {
    /// Number of indices drawn per instance
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Width of the stored indices
    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    /// Device-local vertex buffer handle
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer.handle()
    }

    /// Device-local index buffer handle
    pub fn index_buffer(&self) -> vk::Buffer {
        self.index_buffer.handle()
    }
}

impl Drop for Model {
    fn drop(&mut self) {
        // Buffers are destroyed after this returns.
        if let Err(e) = unsafe { self.vertex_buffer.device().device.device_wait_idle() } {
            log::error!("Failed to wait for device idle before freeing model: {:?}", e);
        }
    }
}

impl Drawable for Model {
    fn draw_call(&self) -> DrawCall {
        DrawCall {
            vertex_buffer: self.vertex_buffer.handle(),
            index_buffer: self.index_buffer.handle(),
            index_count: self.index_count,
            index_type: self.index_type.into(),
        }
    }
}

/// Uploads meshes on the graphics queue using a transient command pool
pub struct ResourceUploader {
    command_pool: CommandPool,
}

impl ResourceUploader {
    /// Create the uploader's transient command pool on the graphics family
    pub fn new(context: &VulkanContext) -> VulkanResult<Self> {
        let command_pool = CommandPool::new(
            context.raw_device(),
            context.queue_families().graphics,
            vk::CommandPoolCreateFlags::TRANSIENT,
        )?;
        Ok(Self { command_pool })
    }

    /// Validate `mesh` and copy it into device-local buffers
    pub fn upload_mesh(&self, context: &VulkanContext, mesh: &Mesh) -> VulkanResult<Model> {
        mesh.validate()
            .map_err(|defect| VulkanError::InvalidMesh(defect.to_string()))?;

        let vertex_buffer = self.upload_bytes(context, mesh.vertex_bytes(), vk::BufferUsageFlags::VERTEX_BUFFER)?;
        let index_buffer = self.upload_bytes(context, mesh.indices.as_bytes(), vk::BufferUsageFlags::INDEX_BUFFER)?;

        log::debug!(
            "Uploaded mesh: {} vertices, {} {:?} indices",
            mesh.vertices.len(),
            mesh.indices.len(),
            mesh.indices.index_type(),
        );

        Ok(Model {
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count(),
            index_type: mesh.indices.index_type(),
        })
    }

    /// Stage `bytes` and copy them into a new device-local buffer with `usage`
    fn upload_bytes(&self, context: &VulkanContext, bytes: &[u8], usage: vk::BufferUsageFlags) -> VulkanResult<Buffer> {
        let size = bytes.len() as vk::DeviceSize;

        let staging = context.allocate_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging.write_data(bytes)?;

        let destination = context.allocate_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_DST | usage,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        self.copy_buffer(context, &staging, &destination, size)?;
        // Staging memory is released here; the copy has completed.
        Ok(destination)
    }

    fn copy_buffer(&self, context: &VulkanContext, src: &Buffer, dst: &Buffer, size: vk::DeviceSize) -> VulkanResult<()> {
        let mut recorder = self.command_pool.begin_single_time()?;
        recorder.cmd_copy_buffer(src.handle(), dst.handle(), size);
        let command_buffer = recorder.end()?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();

        let device = context.device();
        let result = unsafe {
            device
                .queue_submit(context.graphics_queue(), &[submit_info], vk::Fence::null())
                .and_then(|()| device.queue_wait_idle(context.graphics_queue()))
        };
        self.command_pool.free_command_buffers(&command_buffers);
        result.map_err(VulkanError::CommandRecordingFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_owns_its_device<T: Send + Sync + 'static>() {}

    #[test]
    fn test_models_hold_no_borrow_of_the_renderer() {
        // Models and their buffers carry shared device ownership rather than
        // a borrow, so they can be kept past the renderer's scope.
        assert_owns_its_device::<Model>();
        assert_owns_its_device::<Buffer>();
        assert_owns_its_device::<std::sync::Arc<crate::render::vulkan::LogicalDevice>>();
    }

    #[test]
    fn test_index_type_maps_to_vulkan() {
        assert_eq!(vk::IndexType::from(IndexType::U16), vk::IndexType::UINT16);
        assert_eq!(vk::IndexType::from(IndexType::U32), vk::IndexType::UINT32);
    }
}
