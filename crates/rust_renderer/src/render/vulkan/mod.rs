//! Vulkan rendering backend
//!
//! RAII wrappers over the Vulkan objects the renderer needs, plus the frame
//! loop and mesh uploader built on top of them.

pub mod buffer;
pub mod commands;
pub mod context;
pub mod device;
pub mod frame;
pub mod framebuffer;
pub mod render_pass;
pub mod render_target;
pub mod renderer;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod uploader;
pub mod vertex_layout;
pub mod window;

pub use buffer::Buffer;
pub use commands::{ActiveRenderPass, CommandPool, CommandRecorder, DrawRecorder};
pub use context::{LogValidationSink, ValidationSink, VulkanContext, VulkanError, VulkanInstance, VulkanResult};
pub use device::{LogicalDevice, MemoryTypeTable, PhysicalDeviceInfo, QueueFamilyIndices};
pub use frame::{DrawCall, Drawable, FrameBackend, FrameOrchestrator, SlotPhase, MAX_FRAMES_IN_FLIGHT};
pub use framebuffer::{DepthBuffer, Framebuffer};
pub use render_pass::RenderPass;
pub use render_target::RenderTarget;
pub use renderer::Renderer;
pub use shader::{FixedFunctionState, GraphicsPipeline, ShaderModule};
pub use surface::{Surface, SurfaceSource};
pub use swapchain::Swapchain;
pub use sync::{Fence, FrameSync, Semaphore};
pub use uploader::{Model, ResourceUploader};
pub use vertex_layout::VulkanVertexLayout;
pub use window::{Window, WindowError, WindowResult};
