//! Render target setup
//!
//! Ties the render pass, the shared depth buffer and the per-image
//! framebuffers together for one swapchain.

use ash::vk;

use super::context::{VulkanContext, VulkanResult};
use super::framebuffer::{pick_depth_format, DepthBuffer, Framebuffer};
use super::render_pass::RenderPass;
use super::swapchain::Swapchain;

/// Everything the frame loop draws into
///
/// Framebuffers drop before the depth view they reference, and both before
/// the render pass.
pub struct RenderTarget {
    framebuffers: Vec<Framebuffer>,
    depth: DepthBuffer,
    render_pass: RenderPass,
}

impl RenderTarget {
    /// Build the render pass, depth buffer and one framebuffer per swapchain image
    pub fn new(context: &VulkanContext, swapchain: &Swapchain) -> VulkanResult<Self> {
        let depth_format = pick_depth_format(|format| context.optimal_tiling_features(format))?;
        let render_pass = RenderPass::new(context.raw_device(), swapchain.format().format, depth_format)?;
        let depth = DepthBuffer::new(context, depth_format, swapchain.extent())?;

        let framebuffers = swapchain
            .image_views()
            .iter()
            .map(|&view| {
                Framebuffer::new(
                    context.raw_device(),
                    render_pass.handle(),
                    &[view, depth.image_view()],
                    swapchain.extent(),
                )
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        debug_assert_eq!(framebuffers.len(), swapchain.image_count());
        log::debug!("Created {} framebuffers", framebuffers.len());

        Ok(Self {
            framebuffers,
            depth,
            render_pass,
        })
    }

    /// Render pass handle
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    /// Framebuffer for the swapchain image at `image_index`
    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).map(Framebuffer::handle)
    }

    /// One framebuffer per swapchain image
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Format chosen for the shared depth attachment
    pub fn depth_format(&self) -> vk::Format {
        self.depth.format()
    }
}
