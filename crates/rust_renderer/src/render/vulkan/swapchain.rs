//! Vulkan swapchain management
//!
//! Negotiates format, present mode, extent and image count against what the
//! surface reports, then owns the swapchain and one view per image.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use super::context::{VulkanContext, VulkanError, VulkanResult};
use super::device::QueueFamilyIndices;

/// Preferred format, falling back to whatever the surface lists first
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|sf| sf.format == vk::Format::B8G8R8A8_SRGB && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
}

/// MAILBOX when offered, otherwise FIFO (always available)
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Surface-dictated extent, or the window size clamped into the supported range
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window_extent: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: window_extent
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: window_extent
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// One more than the minimum; a `max_image_count` of zero means unbounded
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        desired.min(caps.max_image_count)
    } else {
        desired
    }
}

/// Sharing mode and the families that must be named for it
pub fn choose_sharing(families: QueueFamilyIndices) -> (vk::SharingMode, Vec<u32>) {
    if families.is_shared() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (vk::SharingMode::CONCURRENT, vec![families.graphics, families.present])
    }
}

/// Swapchain management wrapper with RAII cleanup
pub struct Swapchain {
    device: Device,
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain for the context's surface
    ///
    /// `window_extent` is only consulted when the surface leaves the size to
    /// the application.
    pub fn new(context: &VulkanContext, window_extent: vk::Extent2D) -> VulkanResult<Self> {
        let physical_device = context.physical_device().device;
        let surface = context.surface();
        let to_swapchain_error = |e: VulkanError| match e {
            VulkanError::SurfaceCreationFailure(reason) => {
                log::error!("Surface query failed: {}", reason);
                VulkanError::SwapchainCreationFailure(vk::Result::ERROR_INITIALIZATION_FAILED)
            }
            other => other,
        };

        let caps = surface.capabilities(physical_device).map_err(to_swapchain_error)?;
        let formats = surface.formats(physical_device).map_err(to_swapchain_error)?;
        let present_modes = surface.present_modes(physical_device).map_err(to_swapchain_error)?;

        let format = choose_surface_format(&formats)
            .ok_or(VulkanError::SwapchainCreationFailure(vk::Result::ERROR_FORMAT_NOT_SUPPORTED))?;
        let present_mode = choose_present_mode(&present_modes);
        let extent = choose_extent(&caps, window_extent);
        let image_count = choose_image_count(&caps);
        let (sharing_mode, family_indices) = choose_sharing(context.queue_families());

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle())
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&family_indices)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let device = context.raw_device();
        let swapchain_loader = SwapchainLoader::new(context.instance(), &device);
        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(VulkanError::SwapchainCreationFailure)?;

        // From here on `Drop` owns cleanup of whatever has been created.
        let mut this = Self {
            device,
            swapchain_loader,
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            format,
            present_mode,
            extent,
        };

        this.images = unsafe { this.swapchain_loader.get_swapchain_images(swapchain) }
            .map_err(VulkanError::SwapchainCreationFailure)?;

        for &image in &this.images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = unsafe { this.device.create_image_view(&view_info, None) }
                .map_err(VulkanError::SwapchainCreationFailure)?;
            this.image_views.push(view);
        }

        log::info!(
            "Swapchain: {} images, {:?}/{:?}, {:?}, {}x{}",
            this.images.len(),
            format.format,
            format.color_space,
            present_mode,
            extent.width,
            extent.height,
        );
        Ok(this)
    }

    /// Get swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Negotiated present mode
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Get image views, one per swapchain image in image order
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Get swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Get swapchain loader
    pub fn loader(&self) -> &SwapchainLoader {
        &self.swapchain_loader
    }

    /// Number of images the driver actually created
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &image_view in &self.image_views {
                self.device.destroy_image_view(image_view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32, current: vk::Extent2D) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: current,
            min_image_extent: vk::Extent2D { width: 100, height: 50 },
            max_image_extent: vk::Extent2D { width: 1920, height: 1080 },
            ..Default::default()
        }
    }

    fn undefined_extent() -> vk::Extent2D {
        vk::Extent2D { width: u32::MAX, height: u32::MAX }
    }

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    #[test]
    fn test_preferred_surface_format_is_chosen() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn test_surface_format_falls_back_to_first() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats).unwrap().format, vk::Format::R8G8B8A8_UNORM);
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn test_present_mode_prefers_mailbox() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);

        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO_RELAXED];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_fixed_current_extent_is_used_verbatim() {
        let current = vk::Extent2D { width: 800, height: 600 };
        let caps = caps(2, 3, current);
        let window = vk::Extent2D { width: 5000, height: 1 };
        assert_eq!(choose_extent(&caps, window), current);
    }

    #[test]
    fn test_window_extent_is_clamped_into_range() {
        let caps = caps(2, 3, undefined_extent());

        let in_range = vk::Extent2D { width: 800, height: 600 };
        assert_eq!(choose_extent(&caps, in_range), in_range);

        let too_small = vk::Extent2D { width: 10, height: 10 };
        assert_eq!(choose_extent(&caps, too_small), vk::Extent2D { width: 100, height: 50 });

        let mixed = vk::Extent2D { width: 4000, height: 20 };
        assert_eq!(choose_extent(&caps, mixed), vk::Extent2D { width: 1920, height: 50 });
    }

    #[test]
    fn test_image_count_is_min_plus_one_capped_by_max() {
        let extent = vk::Extent2D { width: 1, height: 1 };
        assert_eq!(choose_image_count(&caps(2, 8, extent)), 3);
        assert_eq!(choose_image_count(&caps(3, 3, extent)), 3);
        assert_eq!(choose_image_count(&caps(2, 0, extent)), 3);

        for min in 1..6 {
            for max in [0, min, min + 1, min + 4] {
                let count = choose_image_count(&caps(min, max, extent));
                assert!(count >= min);
                if max > 0 {
                    assert!(count <= max);
                }
            }
        }
    }

    #[test]
    fn test_sharing_follows_queue_families() {
        let (mode, families) = choose_sharing(QueueFamilyIndices { graphics: 0, present: 0 });
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(families.is_empty());

        let (mode, families) = choose_sharing(QueueFamilyIndices { graphics: 0, present: 2 });
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(families, vec![0, 2]);
    }
}
