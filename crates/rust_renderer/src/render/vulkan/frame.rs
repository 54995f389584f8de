//! Frame orchestration
//!
//! Each frame slot owns a command buffer, two semaphores and a fence. A frame
//! walks its slot through
//!
//! ```text
//! Idle -> Acquiring -> Recording -> Submitted -> Presenting -> Idle
//! ```
//!
//! and the slot index moves on once the frame has been submitted. The state
//! machine talks to the GPU through [`FrameBackend`]; the Vulkan
//! implementation is [`FrameContext`].
//!
//! Once a slot's fence has been reset, the frame must be submitted or the
//! fence never signals again. A failure in that window loses the slot and
//! every later frame reports [`VulkanError::FrameSlotLost`] instead of
//! blocking on the fence.

use ash::{vk, Device};

use super::commands::{CommandPool, CommandRecorder, DrawRecorder};
use super::context::{VulkanContext, VulkanError, VulkanResult};
use super::render_target::RenderTarget;
use super::shader::GraphicsPipeline;
use super::swapchain::Swapchain;
use super::sync::FrameSync;

/// Number of frames the CPU may record ahead of the GPU
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Everything needed to draw one uploaded model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    /// Vertex buffer bound at binding 0, offset 0
    pub vertex_buffer: vk::Buffer,
    /// Index buffer bound at offset 0
    pub index_buffer: vk::Buffer,
    /// Indices drawn for the single instance
    pub index_count: u32,
    /// Width of the indices in `index_buffer`
    pub index_type: vk::IndexType,
}

/// Something the frame loop can draw
pub trait Drawable {
    /// Buffers and counts for one indexed draw
    fn draw_call(&self) -> DrawCall;
}

/// Full-extent viewport with the standard 0..1 depth range
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Record the draw commands for one frame inside an active render pass
///
/// The pipeline and dynamic state are set once, then each draw binds its own
/// buffers in list order.
pub fn record_draws<R: DrawRecorder + ?Sized>(
    recorder: &mut R,
    pipeline: vk::Pipeline,
    extent: vk::Extent2D,
    draws: &[DrawCall],
) {
    recorder.bind_pipeline(pipeline);
    recorder.set_viewport(full_viewport(extent));
    recorder.set_scissor(vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    });

    for draw in draws {
        recorder.bind_vertex_buffer(draw.vertex_buffer, 0);
        recorder.bind_index_buffer(draw.index_buffer, 0, draw.index_type);
        recorder.draw_indexed(draw.index_count, 1, 0, 0, 0);
    }
}

/// Where a frame slot is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotPhase {
    /// Not in use by the CPU
    #[default]
    Idle,
    /// Waiting on the fence or acquiring an image
    Acquiring,
    /// Fence reset, command buffer being recorded
    Recording,
    /// Command buffer handed to the graphics queue
    Submitted,
    /// Presentation being queued
    Presenting,
}

/// GPU-side operations of one frame, addressed by slot
pub trait FrameBackend {
    /// Block until the slot's previous submission has finished
    fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()>;

    /// Acquire the next presentable image, signalling the slot's image-available semaphore
    ///
    /// Returns the image index and whether the swapchain is suboptimal. A
    /// suboptimal acquire still signals the semaphore.
    fn acquire_image(&mut self, slot: usize) -> VulkanResult<(u32, bool)>;

    /// Unsignal the slot fence and reset its command buffer
    fn reset_slot(&mut self, slot: usize) -> VulkanResult<()>;

    /// Record the render pass for `image_index` into the slot's command buffer
    fn record(&mut self, slot: usize, image_index: u32, draws: &[DrawCall]) -> VulkanResult<()>;

    /// Submit the slot's command buffer, signalling its fence on completion
    fn submit(&mut self, slot: usize) -> VulkanResult<()>;

    /// Queue presentation of `image_index`; `Ok(true)` means the swapchain is suboptimal
    fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<bool>;
}

/// Round-robin frame slot state machine
#[derive(Debug, Default)]
pub struct FrameOrchestrator {
    current_slot: usize,
    phases: [SlotPhase; MAX_FRAMES_IN_FLIGHT],
    frames_presented: u64,
    lost_slot: Option<usize>,
}

impl FrameOrchestrator {
    /// Start at slot 0 with every slot idle
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot the next frame will use
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// Phase of `slot`
    pub fn phase(&self, slot: usize) -> SlotPhase {
        self.phases[slot]
    }

    /// Slot whose fence can no longer signal, if a frame failed after reset
    pub fn lost_slot(&self) -> Option<usize> {
        self.lost_slot
    }

    /// Frames whose presentation has been queued
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Render one frame with `draws` and queue it for presentation
    ///
    /// Acquire errors are returned before the slot is touched and leave it
    /// retryable. A suboptimal swapchain, whether reported by acquire or by
    /// present, does not stop the frame: it is submitted and presented, the
    /// slot advances, and `SurfaceSuboptimal` is returned afterwards.
    pub fn render_frame<B: FrameBackend + ?Sized>(&mut self, backend: &mut B, draws: &[DrawCall]) -> VulkanResult<()> {
        if let Some(slot) = self.lost_slot {
            return Err(VulkanError::FrameSlotLost(slot));
        }
        let slot = self.current_slot;

        self.phases[slot] = SlotPhase::Acquiring;
        let (image_index, acquire_suboptimal) =
            match backend.wait_for_slot(slot).and_then(|()| backend.acquire_image(slot)) {
                Ok(acquired) => acquired,
                Err(e) => {
                    self.phases[slot] = SlotPhase::Idle;
                    return Err(e);
                }
            };

        if let Err(e) = self.record_and_submit(backend, slot, image_index, draws) {
            log::error!("Frame on slot {} failed after its fence was reset: {}", slot, e);
            self.phases[slot] = SlotPhase::Idle;
            self.lost_slot = Some(slot);
            return Err(e);
        }

        log::trace!("Presenting image {} from slot {}", image_index, slot);
        self.phases[slot] = SlotPhase::Presenting;
        let presented = backend.present(slot, image_index);
        self.phases[slot] = SlotPhase::Idle;

        // The submission will signal the fence whatever present reports.
        self.current_slot = (slot + 1) % MAX_FRAMES_IN_FLIGHT;

        let present_suboptimal = presented?;
        self.frames_presented += 1;

        if acquire_suboptimal || present_suboptimal {
            log::warn!("Swapchain suboptimal for frame {}", self.frames_presented);
            return Err(VulkanError::SurfaceSuboptimal);
        }
        Ok(())
    }

    fn record_and_submit<B: FrameBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        slot: usize,
        image_index: u32,
        draws: &[DrawCall],
    ) -> VulkanResult<()> {
        self.phases[slot] = SlotPhase::Recording;
        backend.reset_slot(slot)?;
        backend.record(slot, image_index, draws)?;
        backend.submit(slot)?;
        self.phases[slot] = SlotPhase::Submitted;
        Ok(())
    }
}

/// Per-slot GPU objects
pub struct FrameSlot {
    /// Semaphores and in-flight fence
    pub sync: FrameSync,
    /// Reset and re-recorded every time the slot is used
    pub command_buffer: vk::CommandBuffer,
}

/// Frame slots plus the pool their command buffers come from
///
/// Slots drop before the pool; the pool frees their command buffers.
pub struct FrameSlots {
    slots: Vec<FrameSlot>,
    orchestrator: FrameOrchestrator,
    _command_pool: CommandPool,
}

impl FrameSlots {
    /// Allocate `MAX_FRAMES_IN_FLIGHT` slots on the graphics family
    pub fn new(context: &VulkanContext) -> VulkanResult<Self> {
        let command_pool = CommandPool::new(
            context.raw_device(),
            context.queue_families().graphics,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        let command_buffers = command_pool.allocate_command_buffers(MAX_FRAMES_IN_FLIGHT as u32)?;

        let slots = command_buffers
            .into_iter()
            .map(|command_buffer| {
                Ok(FrameSlot {
                    sync: FrameSync::new(context.raw_device())?,
                    command_buffer,
                })
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        log::debug!("Created {} frame slots", slots.len());
        Ok(Self {
            slots,
            orchestrator: FrameOrchestrator::new(),
            _command_pool: command_pool,
        })
    }

    /// Render and present one frame
    pub fn render(&mut self, resources: FrameResources<'_>, draws: &[DrawCall]) -> VulkanResult<()> {
        let mut backend = FrameContext {
            resources,
            slots: &self.slots,
        };
        self.orchestrator.render_frame(&mut backend, draws)
    }

    /// Slot state machine
    pub fn orchestrator(&self) -> &FrameOrchestrator {
        &self.orchestrator
    }
}

/// Long-lived objects a frame renders with
pub struct FrameResources<'a> {
    /// Logical device
    pub device: &'a Device,
    /// Queue for frame submissions
    pub graphics_queue: vk::Queue,
    /// Queue for presentation
    pub present_queue: vk::Queue,
    /// Swapchain images are acquired from
    pub swapchain: &'a Swapchain,
    /// Render pass and per-image framebuffers
    pub target: &'a RenderTarget,
    /// Pipeline bound once per frame
    pub pipeline: &'a GraphicsPipeline,
    /// Colour attachment clear value, RGBA
    pub clear_color: [f32; 4],
}

/// Vulkan implementation of [`FrameBackend`]
pub struct FrameContext<'a> {
    resources: FrameResources<'a>,
    slots: &'a [FrameSlot],
}

impl FrameContext<'_> {
    fn clear_values(&self) -> [vk::ClearValue; 2] {
        [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.resources.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ]
    }
}

impl FrameBackend for FrameContext<'_> {
    fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()> {
        self.slots[slot].sync.in_flight.wait(u64::MAX)
    }

    fn acquire_image(&mut self, slot: usize) -> VulkanResult<(u32, bool)> {
        let swapchain = self.resources.swapchain;
        let result = unsafe {
            swapchain.loader().acquire_next_image(
                swapchain.handle(),
                u64::MAX,
                self.slots[slot].sync.image_available.handle(),
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    log::warn!("Swapchain suboptimal during acquire");
                }
                Ok((index, suboptimal))
            }
            Err(e) => {
                let error = VulkanError::from_surface_result(e, VulkanError::Api);
                if error.is_surface_mismatch() {
                    log::warn!("Swapchain out of date during acquire");
                }
                Err(error)
            }
        }
    }

    fn reset_slot(&mut self, slot: usize) -> VulkanResult<()> {
        let frame = &self.slots[slot];
        frame.sync.in_flight.reset()?;
        unsafe {
            self.resources
                .device
                .reset_command_buffer(frame.command_buffer, vk::CommandBufferResetFlags::empty())
        }
        .map_err(VulkanError::CommandRecordingFailure)
    }

    fn record(&mut self, slot: usize, image_index: u32, draws: &[DrawCall]) -> VulkanResult<()> {
        let target = self.resources.target;
        let extent = self.resources.swapchain.extent();
        let framebuffer = target
            .framebuffer(image_index)
            .ok_or(VulkanError::CommandRecordingFailure(vk::Result::ERROR_UNKNOWN))?;
        let clear_values = self.clear_values();

        let mut recorder = CommandRecorder::begin(
            self.resources.device.clone(),
            self.slots[slot].command_buffer,
            vk::CommandBufferUsageFlags::empty(),
        )?;
        {
            let mut pass = recorder.begin_render_pass(
                target.render_pass(),
                framebuffer,
                vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                },
                &clear_values,
            );
            record_draws(&mut pass, self.resources.pipeline.handle(), extent, draws);
        }
        recorder.end()?;
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> VulkanResult<()> {
        let frame = &self.slots[slot];
        let wait_semaphores = [frame.sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [frame.command_buffer];
        let signal_semaphores = [frame.sync.render_finished.handle()];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.resources.device.queue_submit(
                self.resources.graphics_queue,
                &[submit_info],
                frame.sync.in_flight.handle(),
            )
        }
        .map_err(VulkanError::CommandRecordingFailure)
    }

    fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<bool> {
        let swapchain = self.resources.swapchain;
        let wait_semaphores = [self.slots[slot].sync.render_finished.handle()];
        let swapchains = [swapchain.handle()];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { swapchain.loader().queue_present(self.resources.present_queue, &present_info) }.map_err(|e| {
            let error = VulkanError::from_surface_result(e, VulkanError::Api);
            if error.is_surface_mismatch() {
                log::warn!("Swapchain out of date during present");
            }
            error
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[derive(Debug, Clone, PartialEq)]
    enum Command {
        BindPipeline(u64),
        Viewport(vk::Extent2D),
        Scissor(vk::Extent2D),
        BindVertex(u64, vk::DeviceSize),
        BindIndex(u64, vk::DeviceSize, vk::IndexType),
        DrawIndexed(u32, u32, u32, i32, u32),
    }

    #[derive(Default)]
    struct CommandLog {
        commands: Vec<Command>,
    }

    impl DrawRecorder for CommandLog {
        fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
            self.commands.push(Command::BindPipeline(pipeline.as_raw()));
        }

        fn set_viewport(&mut self, viewport: vk::Viewport) {
            assert_eq!((viewport.x, viewport.y), (0.0, 0.0));
            assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
            self.commands.push(Command::Viewport(vk::Extent2D {
                width: viewport.width as u32,
                height: viewport.height as u32,
            }));
        }

        fn set_scissor(&mut self, scissor: vk::Rect2D) {
            assert_eq!((scissor.offset.x, scissor.offset.y), (0, 0));
            self.commands.push(Command::Scissor(scissor.extent));
        }

        fn bind_vertex_buffer(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize) {
            self.commands.push(Command::BindVertex(buffer.as_raw(), offset));
        }

        fn bind_index_buffer(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType) {
            self.commands.push(Command::BindIndex(buffer.as_raw(), offset, index_type));
        }

        fn draw_indexed(&mut self, index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32) {
            self.commands.push(Command::DrawIndexed(
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            ));
        }
    }

    fn quad_draw(vertex: u64, index: u64) -> DrawCall {
        DrawCall {
            vertex_buffer: vk::Buffer::from_raw(vertex),
            index_buffer: vk::Buffer::from_raw(index),
            index_count: 6,
            index_type: vk::IndexType::UINT16,
        }
    }

    #[test]
    fn test_two_quads_record_in_list_order() {
        let extent = vk::Extent2D { width: 800, height: 600 };
        let mut log = CommandLog::default();
        let draws = [quad_draw(10, 11), quad_draw(20, 21)];

        record_draws(&mut log, vk::Pipeline::from_raw(7), extent, &draws);

        assert_eq!(
            log.commands,
            vec![
                Command::BindPipeline(7),
                Command::Viewport(extent),
                Command::Scissor(extent),
                Command::BindVertex(10, 0),
                Command::BindIndex(11, 0, vk::IndexType::UINT16),
                Command::DrawIndexed(6, 1, 0, 0, 0),
                Command::BindVertex(20, 0),
                Command::BindIndex(21, 0, vk::IndexType::UINT16),
                Command::DrawIndexed(6, 1, 0, 0, 0),
            ]
        );
    }

    #[test]
    fn test_empty_draw_list_still_sets_state() {
        let extent = vk::Extent2D { width: 4, height: 2 };
        let mut log = CommandLog::default();
        record_draws(&mut log, vk::Pipeline::from_raw(1), extent, &[]);
        assert_eq!(log.commands.len(), 3);
    }

    #[test]
    fn test_index_type_is_taken_from_each_draw() {
        let mut log = CommandLog::default();
        let wide = DrawCall {
            index_type: vk::IndexType::UINT32,
            index_count: 3,
            ..quad_draw(1, 2)
        };
        record_draws(&mut log, vk::Pipeline::from_raw(1), vk::Extent2D { width: 1, height: 1 }, &[wide]);
        assert!(log.commands.contains(&Command::BindIndex(2, 0, vk::IndexType::UINT32)));
        assert!(log.commands.contains(&Command::DrawIndexed(3, 1, 0, 0, 0)));
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum FenceState {
        Signaled,
        Unsignaled,
        Pending,
    }

    /// Simulated device: submitted work completes when the fence is waited on
    ///
    /// Tracks each slot's image-available semaphore as well, and records any
    /// signal of a semaphore that is already signalled.
    struct MockBackend {
        fences: [FenceState; MAX_FRAMES_IN_FLIGHT],
        image_available: [bool; MAX_FRAMES_IN_FLIGHT],
        semaphore_violations: Vec<usize>,
        events: Vec<(&'static str, usize)>,
        next_image: u32,
        image_count: u32,
        fail_acquire: Option<VulkanError>,
        fail_submit: Option<VulkanError>,
        fail_present: Option<VulkanError>,
        suboptimal_acquire: bool,
        suboptimal_present: bool,
        recorded_draws: usize,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                fences: [FenceState::Signaled; MAX_FRAMES_IN_FLIGHT],
                image_available: [false; MAX_FRAMES_IN_FLIGHT],
                semaphore_violations: Vec::new(),
                events: Vec::new(),
                next_image: 0,
                image_count: 3,
                fail_acquire: None,
                fail_submit: None,
                fail_present: None,
                suboptimal_acquire: false,
                suboptimal_present: false,
                recorded_draws: 0,
            }
        }

        fn slots_used(&self, event: &str) -> Vec<usize> {
            self.events
                .iter()
                .filter(|(name, _)| *name == event)
                .map(|&(_, slot)| slot)
                .collect()
        }
    }

    impl FrameBackend for MockBackend {
        fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()> {
            self.events.push(("wait", slot));
            assert_ne!(self.fences[slot], FenceState::Unsignaled, "wait would never return");
            self.fences[slot] = FenceState::Signaled;
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> VulkanResult<(u32, bool)> {
            self.events.push(("acquire", slot));
            if let Some(error) = self.fail_acquire.take() {
                return Err(error);
            }
            if self.image_available[slot] {
                self.semaphore_violations.push(slot);
            }
            self.image_available[slot] = true;

            let index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok((index, std::mem::take(&mut self.suboptimal_acquire)))
        }

        fn reset_slot(&mut self, slot: usize) -> VulkanResult<()> {
            self.events.push(("reset", slot));
            assert_eq!(self.fences[slot], FenceState::Signaled, "reset of an in-flight slot");
            self.fences[slot] = FenceState::Unsignaled;
            Ok(())
        }

        fn record(&mut self, slot: usize, image_index: u32, draws: &[DrawCall]) -> VulkanResult<()> {
            self.events.push(("record", slot));
            assert!(image_index < self.image_count);
            self.recorded_draws += draws.len();
            Ok(())
        }

        fn submit(&mut self, slot: usize) -> VulkanResult<()> {
            self.events.push(("submit", slot));
            if let Some(error) = self.fail_submit.take() {
                return Err(error);
            }
            assert_eq!(self.fences[slot], FenceState::Unsignaled);
            self.fences[slot] = FenceState::Pending;
            // The submission waits on, and so unsignals, image-available.
            self.image_available[slot] = false;
            Ok(())
        }

        fn present(&mut self, slot: usize, _image_index: u32) -> VulkanResult<bool> {
            self.events.push(("present", slot));
            if let Some(error) = self.fail_present.take() {
                return Err(error);
            }
            Ok(self.suboptimal_present)
        }
    }

    #[test]
    fn test_slots_cycle_round_robin() {
        let mut orchestrator = FrameOrchestrator::new();
        let mut backend = MockBackend::new();
        let draws = [quad_draw(1, 2), quad_draw(3, 4)];

        for _ in 0..5 {
            orchestrator.render_frame(&mut backend, &draws).unwrap();
        }

        assert_eq!(backend.slots_used("submit"), vec![0, 1, 0, 1, 0]);
        assert_eq!(backend.slots_used("present"), vec![0, 1, 0, 1, 0]);
        assert_eq!(orchestrator.current_slot(), 1);
        assert_eq!(orchestrator.frames_presented(), 5);
        assert_eq!(backend.recorded_draws, 10);
        assert!(backend.semaphore_violations.is_empty());
    }

    #[test]
    fn test_frame_steps_run_in_order() {
        let mut orchestrator = FrameOrchestrator::new();
        let mut backend = MockBackend::new();
        orchestrator.render_frame(&mut backend, &[]).unwrap();

        let names: Vec<&str> = backend.events.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["wait", "acquire", "reset", "record", "submit", "present"]);
        assert_eq!(orchestrator.phase(0), SlotPhase::Idle);
    }

    #[test]
    fn test_slot_is_waited_before_every_reset() {
        let mut orchestrator = FrameOrchestrator::new();
        let mut backend = MockBackend::new();
        for _ in 0..6 {
            orchestrator.render_frame(&mut backend, &[]).unwrap();
        }

        // The mock asserts the fence state on reset; also check ordering per slot.
        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            let per_slot: Vec<&str> = backend
                .events
                .iter()
                .filter(|(_, s)| *s == slot)
                .map(|(name, _)| *name)
                .collect();
            for window in per_slot.windows(3) {
                if window[2] == "reset" {
                    assert_eq!(window[..2], ["wait", "acquire"]);
                }
            }
        }
    }

    #[test]
    fn test_acquire_errors_leave_slot_unchanged() {
        let mut orchestrator = FrameOrchestrator::new();
        let mut backend = MockBackend::new();
        orchestrator.render_frame(&mut backend, &[]).unwrap();
        assert_eq!(orchestrator.current_slot(), 1);

        backend.fail_acquire = Some(VulkanError::SurfaceOutOfDate);
        let result = orchestrator.render_frame(&mut backend, &[]);
        assert!(matches!(result, Err(VulkanError::SurfaceOutOfDate)));
        assert_eq!(orchestrator.current_slot(), 1);
        assert_eq!(orchestrator.phase(1), SlotPhase::Idle);
        assert!(!backend.slots_used("reset").contains(&1));

        // The slot's fence was never reset, so the retry can wait on it again.
        orchestrator.render_frame(&mut backend, &[]).unwrap();
        assert_eq!(backend.slots_used("submit"), vec![0, 1]);
        assert_eq!(orchestrator.current_slot(), 0);
    }

    #[test]
    fn test_suboptimal_acquire_still_completes_the_frame() {
        let mut orchestrator = FrameOrchestrator::new();
        let mut backend = MockBackend::new();
        backend.suboptimal_acquire = true;

        let result = orchestrator.render_frame(&mut backend, &[]);
        assert!(matches!(result, Err(VulkanError::SurfaceSuboptimal)));
        assert_eq!(backend.slots_used("submit"), vec![0]);
        assert_eq!(backend.slots_used("present"), vec![0]);
        assert_eq!(orchestrator.current_slot(), 1);
        assert_eq!(orchestrator.frames_presented(), 1);

        // Keep going past the report; slot 0's semaphore was consumed by the submit.
        for _ in 0..3 {
            orchestrator.render_frame(&mut backend, &[]).unwrap();
        }
        assert!(backend.semaphore_violations.is_empty());
    }

    #[test]
    fn test_suboptimal_present_advances_then_reports() {
        let mut orchestrator = FrameOrchestrator::new();
        let mut backend = MockBackend::new();
        backend.suboptimal_present = true;

        let result = orchestrator.render_frame(&mut backend, &[]);
        assert!(matches!(result, Err(VulkanError::SurfaceSuboptimal)));
        assert_eq!(orchestrator.current_slot(), 1);
        assert_eq!(orchestrator.frames_presented(), 1);
    }

    #[test]
    fn test_failed_submit_loses_the_slot_instead_of_blocking() {
        let mut orchestrator = FrameOrchestrator::new();
        let mut backend = MockBackend::new();
        orchestrator.render_frame(&mut backend, &[]).unwrap();

        backend.fail_submit = Some(VulkanError::CommandRecordingFailure(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        let result = orchestrator.render_frame(&mut backend, &[]);
        assert!(matches!(
            result,
            Err(VulkanError::CommandRecordingFailure(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))
        ));
        assert_eq!(orchestrator.phase(1), SlotPhase::Idle);
        assert_eq!(orchestrator.lost_slot(), Some(1));

        // Slot 1's fence is unsignalled; the mock would panic if it were waited on.
        let events_before = backend.events.len();
        for _ in 0..2 {
            let result = orchestrator.render_frame(&mut backend, &[]);
            assert!(matches!(result, Err(VulkanError::FrameSlotLost(1))));
        }
        assert_eq!(backend.events.len(), events_before);
        assert_eq!(orchestrator.frames_presented(), 1);
    }

    #[test]
    fn test_failed_present_still_advances_past_the_submitted_slot() {
        let mut orchestrator = FrameOrchestrator::new();
        let mut backend = MockBackend::new();
        backend.fail_present = Some(VulkanError::SurfaceOutOfDate);

        let result = orchestrator.render_frame(&mut backend, &[]);
        assert!(matches!(result, Err(VulkanError::SurfaceOutOfDate)));
        assert_eq!(orchestrator.current_slot(), 1);
        assert_eq!(orchestrator.frames_presented(), 0);
        assert_eq!(orchestrator.lost_slot(), None);

        // Slot 0's submission signals its fence, so the loop can continue.
        orchestrator.render_frame(&mut backend, &[]).unwrap();
        orchestrator.render_frame(&mut backend, &[]).unwrap();
        assert_eq!(backend.slots_used("submit"), vec![0, 1, 0]);
    }

    #[test]
    fn test_full_viewport_spans_extent() {
        let viewport = full_viewport(vk::Extent2D { width: 800, height: 600 });
        assert_eq!((viewport.width, viewport.height), (800.0, 600.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
    }
}
