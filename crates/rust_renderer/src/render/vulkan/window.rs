//! Window management using GLFW
//!
//! Provides the window the renderer presents into and the surface hooks the
//! Vulkan backend needs from it.

use ash::vk;
use thiserror::Error;

use super::context::{VulkanError, VulkanResult};
use super::surface::SurfaceSource;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialised
    #[error("GLFW initialization failed")]
    InitializationFailed,

    /// GLFW refused to open the window
    #[error("Window creation failed")]
    CreationFailed,

    /// Any other GLFW failure, such as missing Vulkan support
    #[error("GLFW error: {0}")]
    GlfwError(String),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// GLFW window wrapper with proper resource management
pub struct Window {
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
    glfw: glfw::Glfw,
}

impl Window {
    /// Open a fixed-size window without a client API
    pub fn new(title: &str, width: u32, height: u32) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors).map_err(|_| WindowError::InitializationFailed)?;

        if !glfw.vulkan_supported() {
            return Err(WindowError::GlfwError("Vulkan is not supported by GLFW".to_string()));
        }

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        // The swapchain is never rebuilt, so the window must keep its size.
        glfw.window_hint(glfw::WindowHint::Resizable(false));

        let (mut window, events) = glfw
            .create_window(width, height, title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);

        log::debug!("Window '{}' opened at {}x{}", title, width, height);
        Ok(Self { window, events, glfw })
    }

    /// Whether the user or the application asked the window to close
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Pump the event queue, closing on Escape
    pub fn poll_events(&mut self) {
        self.glfw.poll_events();
        for (_, event) in glfw::flush_messages(&self.events) {
            if let glfw::WindowEvent::Key(glfw::Key::Escape, _, glfw::Action::Press, _) = event {
                self.window.set_should_close(true);
            }
        }
    }

    /// Framebuffer size in pixels, which may differ from the window size
    pub fn get_framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }

    /// Request or cancel closing the window
    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }
}

impl SurfaceSource for Window {
    fn required_instance_extensions(&self) -> VulkanResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or_else(|| VulkanError::SurfaceCreationFailure("GLFW reported no instance extensions".to_string()))
    }

    fn create_surface(&self, instance: vk::Instance) -> VulkanResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self.window.create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(VulkanError::SurfaceCreationFailure(format!("{:?}", result)))
        }
    }

    fn framebuffer_extent(&self) -> vk::Extent2D {
        let (width, height) = self.get_framebuffer_size();
        vk::Extent2D { width, height }
    }
}
