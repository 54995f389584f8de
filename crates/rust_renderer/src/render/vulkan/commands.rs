//! Command buffer management
//!
//! Recording is expressed through types: a `CommandRecorder` only exists
//! while its buffer is in the recording state, and an `ActiveRenderPass`
//! ends its pass when dropped.

use ash::{vk, Device};

use super::context::{VulkanError, VulkanResult};

/// Draw-time commands issued inside a render pass
///
/// The frame loop records through this trait so the command sequence can be
/// checked without a device.
pub trait DrawRecorder {
    fn bind_pipeline(&mut self, pipeline: vk::Pipeline);
    fn set_viewport(&mut self, viewport: vk::Viewport);
    fn set_scissor(&mut self, scissor: vk::Rect2D);
    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize);
    fn bind_index_buffer(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType);
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
}

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool on `queue_family_index`
    pub fn new(device: Device, queue_family_index: u32, flags: vk::CommandPoolCreateFlags) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(flags)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe { device.create_command_pool(&pool_create_info, None) }
            .map_err(VulkanError::SyncObjectCreationFailure)?;

        Ok(Self { device, command_pool })
    }

    /// Allocate primary command buffers
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.device.allocate_command_buffers(&alloc_info) }.map_err(VulkanError::CommandRecordingFailure)
    }

    /// Return command buffers to the pool
    pub fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        unsafe {
            self.device.free_command_buffers(self.command_pool, command_buffers);
        }
    }

    /// Get the command pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Allocate one buffer and begin it for a single submission
    pub fn begin_single_time(&self) -> VulkanResult<CommandRecorder> {
        let command_buffer = self
            .allocate_command_buffers(1)?
            .into_iter()
            .next()
            .ok_or(VulkanError::CommandRecordingFailure(vk::Result::ERROR_OUT_OF_HOST_MEMORY))?;

        match CommandRecorder::begin(
            self.device.clone(),
            command_buffer,
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
        ) {
            Ok(recorder) => Ok(recorder),
            Err(e) => {
                self.free_command_buffers(&[command_buffer]);
                Err(e)
            }
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            // Buffers from this pool may still be executing.
            let _ = self.device.device_wait_idle();
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// A command buffer in the recording state
pub struct CommandRecorder {
    command_buffer: vk::CommandBuffer,
    device: Device,
}

impl CommandRecorder {
    /// Begin recording into `command_buffer`
    pub fn begin(
        device: Device,
        command_buffer: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> VulkanResult<Self> {
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(flags);
        unsafe { device.begin_command_buffer(command_buffer, &begin_info) }
            .map_err(VulkanError::CommandRecordingFailure)?;

        Ok(Self { command_buffer, device })
    }

    /// Begin a render pass with inline contents
    pub fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) -> ActiveRenderPass<'_> {
        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(clear_values);

        unsafe {
            self.device
                .cmd_begin_render_pass(self.command_buffer, &render_pass_begin, vk::SubpassContents::INLINE);
        }

        ActiveRenderPass { recorder: self }
    }

    /// Record a whole-buffer copy region
    pub fn cmd_copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        let regions = [vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        }];
        unsafe {
            self.device.cmd_copy_buffer(self.command_buffer, src, dst, &regions);
        }
    }

    /// Finish recording and hand back the executable buffer
    pub fn end(self) -> VulkanResult<vk::CommandBuffer> {
        unsafe { self.device.end_command_buffer(self.command_buffer) }
            .map_err(VulkanError::CommandRecordingFailure)?;
        Ok(self.command_buffer)
    }

    /// Raw handle of the buffer being recorded
    pub fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }
}

/// Render pass scope; the pass ends when this is dropped
pub struct ActiveRenderPass<'a> {
    recorder: &'a mut CommandRecorder,
}

impl DrawRecorder for ActiveRenderPass<'_> {
    fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.recorder.device.cmd_bind_pipeline(
                self.recorder.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
    }

    fn set_viewport(&mut self, viewport: vk::Viewport) {
        unsafe {
            self.recorder
                .device
                .cmd_set_viewport(self.recorder.command_buffer, 0, &[viewport]);
        }
    }

    fn set_scissor(&mut self, scissor: vk::Rect2D) {
        unsafe {
            self.recorder
                .device
                .cmd_set_scissor(self.recorder.command_buffer, 0, &[scissor]);
        }
    }

    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize) {
        unsafe {
            self.recorder
                .device
                .cmd_bind_vertex_buffers(self.recorder.command_buffer, 0, &[buffer], &[offset]);
        }
    }

    fn bind_index_buffer(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType) {
        unsafe {
            self.recorder
                .device
                .cmd_bind_index_buffer(self.recorder.command_buffer, buffer, offset, index_type);
        }
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.recorder.device.cmd_draw_indexed(
                self.recorder.command_buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }
}

impl Drop for ActiveRenderPass<'_> {
    fn drop(&mut self) {
        unsafe {
            self.recorder.device.cmd_end_render_pass(self.recorder.command_buffer);
        }
    }
}
