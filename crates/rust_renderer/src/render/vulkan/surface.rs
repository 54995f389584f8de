//! Vulkan surface management
//!
//! Handles window surface creation and management for presentation

use ash::{extensions::khr, vk, Entry, Instance};

use super::context::{VulkanError, VulkanResult};

/// Something that can host a Vulkan presentation surface
///
/// Implemented by the GLFW window; the backend never talks to the window
/// system directly.
pub trait SurfaceSource {
    /// Instance extensions the window system needs for surface creation
    fn required_instance_extensions(&self) -> VulkanResult<Vec<String>>;

    /// Create a surface for this window on `instance`
    fn create_surface(&self, instance: vk::Instance) -> VulkanResult<vk::SurfaceKHR>;

    /// Current framebuffer size in pixels
    fn framebuffer_extent(&self) -> vk::Extent2D;
}

/// Vulkan surface wrapper for presentation
pub struct Surface {
    surface_loader: khr::Surface,
    surface: vk::SurfaceKHR,
}

impl Surface {
    /// Create a new surface from a window
    pub fn new(entry: &Entry, instance: &Instance, source: &dyn SurfaceSource) -> VulkanResult<Self> {
        let surface_loader = khr::Surface::new(entry, instance);
        let surface = source.create_surface(instance.handle())?;

        Ok(Self {
            surface_loader,
            surface,
        })
    }

    /// Get the underlying surface handle
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Get surface capabilities for a physical device
    pub fn capabilities(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
                .map_err(|e| VulkanError::SurfaceCreationFailure(format!("capabilities: {:?}", e)))
        }
    }

    /// Get surface formats for a physical device
    pub fn formats(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(physical_device, self.surface)
                .map_err(|e| VulkanError::SurfaceCreationFailure(format!("formats: {:?}", e)))
        }
    }

    /// Get surface present modes for a physical device
    pub fn present_modes(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)
                .map_err(|e| VulkanError::SurfaceCreationFailure(format!("present modes: {:?}", e)))
        }
    }

    /// Check if a queue family supports presentation to this surface
    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, queue_family_index: u32) -> VulkanResult<bool> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(physical_device, queue_family_index, self.surface)
                .map_err(|e| VulkanError::SurfaceCreationFailure(format!("present support: {:?}", e)))
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}
