//! Framebuffer and depth buffer management

use ash::{vk, Device};

use super::context::{VulkanContext, VulkanError, VulkanResult};

/// Depth formats in order of preference
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 5] = [
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D32_SFLOAT,
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D16_UNORM_S8_UINT,
    vk::Format::D16_UNORM,
];

/// First candidate whose optimal-tiling features allow depth/stencil attachments
pub fn pick_depth_format<F>(mut optimal_tiling_features: F) -> VulkanResult<vk::Format>
where
    F: FnMut(vk::Format) -> vk::FormatFeatureFlags,
{
    DEPTH_FORMAT_CANDIDATES
        .iter()
        .copied()
        .find(|&format| {
            optimal_tiling_features(format).contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or(VulkanError::NoSupportedDepthFormat)
}

/// Whether the format carries a stencil component
pub fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::S8_UINT
    )
}

/// Aspect mask for a view of a depth image in `format`
pub fn depth_aspect_mask(format: vk::Format) -> vk::ImageAspectFlags {
    if has_stencil(format) {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::DEPTH
    }
}

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Create a new framebuffer
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.create_framebuffer(&create_info, None) }
            .map_err(VulkanError::PipelineCreationFailure)?;

        Ok(Self { device, framebuffer })
    }

    /// Get the framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}

/// Depth buffer wrapper with RAII cleanup
pub struct DepthBuffer {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    image_view: vk::ImageView,
    format: vk::Format,
}

impl DepthBuffer {
    /// Create a device-local depth image and view sized to `extent`
    pub fn new(context: &VulkanContext, format: vk::Format, extent: vk::Extent2D) -> VulkanResult<Self> {
        let device = context.raw_device();

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe { device.create_image(&image_info, None) }
            .map_err(VulkanError::BufferAllocationFailure)?;

        // Null handles are ignored by the destroy calls in `Drop`.
        let mut this = Self {
            device,
            image,
            memory: vk::DeviceMemory::null(),
            image_view: vk::ImageView::null(),
            format,
        };

        let requirements = unsafe { this.device.get_image_memory_requirements(image) };
        let memory_type_index =
            context.find_memory_type(requirements.memory_type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        this.memory = unsafe { this.device.allocate_memory(&alloc_info, None) }
            .map_err(VulkanError::BufferAllocationFailure)?;
        unsafe { this.device.bind_image_memory(image, this.memory, 0) }
            .map_err(VulkanError::BufferAllocationFailure)?;

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: depth_aspect_mask(format),
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        this.image_view = unsafe { this.device.create_image_view(&view_info, None) }
            .map_err(VulkanError::BufferAllocationFailure)?;

        log::debug!("Depth buffer {:?} {}x{}", format, extent.width, extent.height);
        Ok(this)
    }

    /// Get the image view handle
    pub fn image_view(&self) -> vk::ImageView {
        self.image_view
    }

    /// Depth format in use
    pub fn format(&self) -> vk::Format {
        self.format
    }
}

impl Drop for DepthBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.image_view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}
