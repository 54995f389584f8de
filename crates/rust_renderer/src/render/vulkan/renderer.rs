//! High-level Vulkan renderer
//!
//! Builds the backend in dependency order
//!
//! ```text
//! context -> swapchain -> render target -> pipeline -> frame slots / uploader
//! ```
//!
//! and tears it down in reverse. Uploaded [`Model`]s share ownership of the
//! logical device, so they may be dropped before or after the renderer; the
//! device is destroyed when its last owner goes away.

use ash::vk;
use std::path::Path;

use super::context::{VulkanContext, VulkanResult};
use super::frame::{DrawCall, Drawable, FrameResources, FrameSlots};
use super::render_target::RenderTarget;
use super::shader::GraphicsPipeline;
use super::surface::SurfaceSource;
use super::swapchain::Swapchain;
use super::uploader::{Model, ResourceUploader};
use crate::config::RendererConfig;
use crate::render::mesh::Mesh;

/// Owns every long-lived Vulkan object needed to draw meshes to one window
///
/// Field order is teardown order.
pub struct Renderer {
    frames: FrameSlots,
    uploader: ResourceUploader,
    pipeline: GraphicsPipeline,
    target: RenderTarget,
    swapchain: Swapchain,
    clear_color: [f32; 4],
    context: VulkanContext,
}

impl Renderer {
    /// Initialise the backend for `window`
    pub fn new(config: &RendererConfig, window: &dyn SurfaceSource) -> VulkanResult<Self> {
        log::debug!("Creating renderer '{}'", config.application_name);

        let context = VulkanContext::new(window, &config.application_name, config.enable_validation)?;
        let swapchain = Swapchain::new(&context, window.framebuffer_extent())?;
        let target = RenderTarget::new(&context, &swapchain)?;
        let pipeline = GraphicsPipeline::from_files(
            context.raw_device(),
            target.render_pass(),
            Path::new(&config.shaders.vertex_shader_path),
            Path::new(&config.shaders.fragment_shader_path),
        )?;
        let frames = FrameSlots::new(&context)?;
        let uploader = ResourceUploader::new(&context)?;

        log::info!("Renderer initialised");
        Ok(Self {
            frames,
            uploader,
            pipeline,
            target,
            swapchain,
            clear_color: config.clear_color,
            context,
        })
    }

    /// Copy a mesh into device-local buffers; blocks until the copy completes
    pub fn upload_mesh(&self, mesh: &Mesh) -> VulkanResult<Model> {
        self.uploader.upload_mesh(&self.context, mesh)
    }

    /// Draw `models` in order and queue the frame for presentation
    pub fn draw_frame<D: Drawable>(&mut self, models: &[D]) -> VulkanResult<()> {
        let draws: Vec<DrawCall> = models.iter().map(Drawable::draw_call).collect();
        let resources = FrameResources {
            device: self.context.device(),
            graphics_queue: self.context.graphics_queue(),
            present_queue: self.context.present_queue(),
            swapchain: &self.swapchain,
            target: &self.target,
            pipeline: &self.pipeline,
            clear_color: self.clear_color,
        };
        self.frames.render(resources, &draws)
    }

    /// Block until the GPU has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.context.wait_idle()
    }

    /// Swapchain image size in pixels
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Colour format and colour space of the swapchain images
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.swapchain.format()
    }

    /// Format of the depth attachment
    pub fn depth_format(&self) -> vk::Format {
        self.target.depth_format()
    }

    /// Frames queued for presentation so far
    pub fn frames_presented(&self) -> u64 {
        self.frames.orchestrator().frames_presented()
    }

    /// Device, queues and surface the renderer was built on
    pub fn context(&self) -> &VulkanContext {
        &self.context
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.context.wait_idle() {
            log::error!("Failed to wait for device idle during shutdown: {}", e);
        }
        log::debug!("Destroying renderer after {} frames", self.frames_presented());
    }
}
