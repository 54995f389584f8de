//! Physical device selection, logical device creation and memory type lookup

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device, Instance};
use std::ffi::CStr;
use std::sync::Arc;

use super::context::{VulkanError, VulkanInstance, VulkanResult};
use super::surface::Surface;

/// Queue family indices for graphics and presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family used for draw and transfer submissions
    pub graphics: u32,
    /// Family used for presentation
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Scan queue families once, preferring a family that can both draw and present
    ///
    /// Falls back to the first graphics family paired with the first present
    /// family when no single family does both.
    pub fn find<F>(families: &[vk::QueueFamilyProperties], mut supports_present: F) -> VulkanResult<Option<Self>>
    where
        F: FnMut(u32) -> VulkanResult<bool>,
    {
        let mut graphics = None;
        let mut present = None;

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;
            let is_graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let is_present = supports_present(index)?;

            if is_graphics && is_present {
                return Ok(Some(Self { graphics: index, present: index }));
            }
            if is_graphics && graphics.is_none() {
                graphics = Some(index);
            }
            if is_present && present.is_none() {
                present = Some(index);
            }
        }

        Ok(graphics
            .zip(present)
            .map(|(graphics, present)| Self { graphics, present }))
    }

    /// Whether one family serves both roles
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, graphics first
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// What a physical device offers for rendering to a particular surface
#[derive(Debug, Clone, Default)]
pub struct DeviceSupport {
    /// Graphics/present families, if both exist
    pub queue_families: Option<QueueFamilyIndices>,
    /// Whether `VK_KHR_swapchain` is exposed
    pub has_swapchain_extension: bool,
    /// Number of surface formats reported
    pub format_count: usize,
    /// Number of present modes reported
    pub present_mode_count: usize,
}

impl DeviceSupport {
    /// Queue families found, swapchain exposed, and at least one format and present mode
    pub fn is_suitable(&self) -> bool {
        self.queue_families.is_some()
            && self.has_swapchain_extension
            && self.format_count > 0
            && self.present_mode_count > 0
    }
}

/// Pick the first candidate whose support is suitable
///
/// Candidates are evaluated lazily, in enumeration order.
pub fn select_device<T, I>(candidates: I) -> VulkanResult<(T, QueueFamilyIndices)>
where
    I: IntoIterator<Item = (T, DeviceSupport)>,
{
    candidates
        .into_iter()
        .find_map(|(device, support)| {
            if support.is_suitable() {
                support.queue_families.map(|families| (device, families))
            } else {
                None
            }
        })
        .ok_or(VulkanError::NoSuitableDevice)
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Graphics and present family indices
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Select the first enumerated device that can render to `surface`
    pub fn select_suitable_device(instance: &Instance, surface: &Surface) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .map_err(|e| VulkanError::DeviceCreationFailure(format!("enumerate devices: {:?}", e)))?;

        if devices.is_empty() {
            log::error!("No GPUs with Vulkan support");
            return Err(VulkanError::NoSuitableDevice);
        }

        let candidates = devices.into_iter().map(|device| {
            let support = Self::evaluate_device(instance, device, surface).unwrap_or_else(|e| {
                log::debug!("Skipping device {:?}: {}", device, e);
                DeviceSupport::default()
            });
            (device, support)
        });

        let (device, queue_families) = select_device(candidates)?;
        let properties = unsafe { instance.get_physical_device_properties(device) };

        log::info!(
            "Selected GPU: {} (graphics family {}, present family {})",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy(),
            queue_families.graphics,
            queue_families.present,
        );

        Ok(Self {
            device,
            properties,
            queue_families,
        })
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: &Surface,
    ) -> VulkanResult<DeviceSupport> {
        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
        let queue_families = QueueFamilyIndices::find(&families, |index| surface.supports_present(device, index))?;

        let extensions = unsafe { instance.enumerate_device_extension_properties(device) }
            .map_err(VulkanError::Api)?;
        let has_swapchain_extension = extensions.iter().any(|available| {
            let name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
            name == SwapchainLoader::name()
        });

        // Surface queries are only meaningful once the extension is known to exist.
        let (format_count, present_mode_count) = if has_swapchain_extension {
            (surface.formats(device)?.len(), surface.present_modes(device)?.len())
        } else {
            (0, 0)
        };

        Ok(DeviceSupport {
            queue_families,
            has_swapchain_extension,
            format_count,
            present_mode_count,
        })
    }
}

/// Logical device wrapper with RAII cleanup
///
/// Holds the instance it was created from, which therefore outlives it.
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    _instance: Arc<VulkanInstance>,
}

impl LogicalDevice {
    /// Create a logical device with one queue per distinct family
    pub fn new(
        instance: &Arc<VulkanInstance>,
        physical_device: &PhysicalDeviceInfo,
        enable_validation: bool,
    ) -> VulkanResult<Self> {
        let families = physical_device.queue_families;
        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extensions = [SwapchainLoader::name().as_ptr()];
        // Device layers are deprecated but older loaders still read them.
        let layer_name = unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };
        let layers = if enable_validation { vec![layer_name.as_ptr()] } else { Vec::new() };
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .instance
                .create_device(physical_device.device, &create_info, None)
        }
            .map_err(|e| VulkanError::DeviceCreationFailure(format!("logical device: {:?}", e)))?;

        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(families.present, 0) };

        log::debug!("Logical device created with {} queue famil(ies)", queue_infos.len());
        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            _instance: Arc::clone(instance),
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Memory types reported by the physical device, captured once at startup
#[derive(Clone, Copy)]
pub struct MemoryTypeTable {
    properties: vk::PhysicalDeviceMemoryProperties,
}

impl MemoryTypeTable {
    /// Wrap the device's memory properties
    pub fn new(properties: vk::PhysicalDeviceMemoryProperties) -> Self {
        Self { properties }
    }

    /// Find the first memory type allowed by `type_mask` that has all of `required`
    pub fn find(&self, type_mask: u32, required: vk::MemoryPropertyFlags) -> VulkanResult<u32> {
        find_memory_type(&self.properties, type_mask, required)
    }

    /// Number of memory types the device reports
    pub fn len(&self) -> usize {
        self.properties.memory_type_count as usize
    }

    /// Whether the device reports no memory types
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Find memory type with required properties
pub fn find_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_mask: u32,
    required: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    let count = properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);
    (0..count)
        .find(|&i| {
            (type_mask & (1 << i)) != 0
                && properties.memory_types[i as usize].property_flags.contains(required)
        })
        .ok_or(VulkanError::NoSuitableMemoryType { type_mask, required })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties::default();
        properties.memory_type_count = types.len() as u32;
        for (i, flags) in types.iter().enumerate() {
            properties.memory_types[i].property_flags = *flags;
        }
        properties
    }

    fn suitable() -> DeviceSupport {
        DeviceSupport {
            queue_families: Some(QueueFamilyIndices { graphics: 0, present: 0 }),
            has_swapchain_extension: true,
            format_count: 1,
            present_mode_count: 1,
        }
    }

    #[test]
    fn test_combined_family_is_preferred() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        // Family 1 presents, family 2 does everything.
        let found = QueueFamilyIndices::find(&families, |i| Ok(i >= 1)).unwrap().unwrap();
        assert_eq!(found, QueueFamilyIndices { graphics: 2, present: 2 });
        assert!(found.is_shared());
        assert_eq!(found.unique(), vec![2]);
    }

    #[test]
    fn test_disjoint_families_are_accepted() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::TRANSFER)];
        let found = QueueFamilyIndices::find(&families, |i| Ok(i == 1)).unwrap().unwrap();
        assert_eq!(found, QueueFamilyIndices { graphics: 0, present: 1 });
        assert!(!found.is_shared());
        assert_eq!(found.unique(), vec![0, 1]);
    }

    #[test]
    fn test_missing_present_family_yields_none() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let found = QueueFamilyIndices::find(&families, |_| Ok(false)).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_present_query_errors_propagate() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let result = QueueFamilyIndices::find(&families, |_| Err(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR)));
        assert!(matches!(result, Err(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR))));
    }

    #[test]
    fn test_select_device_skips_unsuitable_candidates() {
        let no_swapchain = DeviceSupport { has_swapchain_extension: false, ..suitable() };
        let no_formats = DeviceSupport { format_count: 0, ..suitable() };
        let no_modes = DeviceSupport { present_mode_count: 0, ..suitable() };
        let no_queues = DeviceSupport { queue_families: None, ..suitable() };
        let good = DeviceSupport {
            queue_families: Some(QueueFamilyIndices { graphics: 1, present: 3 }),
            ..suitable()
        };

        let candidates = vec![
            ("integrated", no_swapchain),
            ("virtual", no_formats),
            ("cpu", no_modes),
            ("headless", no_queues),
            ("discrete", good),
            ("second", suitable()),
        ];

        let (chosen, families) = select_device(candidates).unwrap();
        assert_eq!(chosen, "discrete");
        assert_eq!(families, QueueFamilyIndices { graphics: 1, present: 3 });
    }

    #[test]
    fn test_select_device_without_candidates_fails() {
        let result = select_device(Vec::<(u32, DeviceSupport)>::new());
        assert!(matches!(result, Err(VulkanError::NoSuitableDevice)));

        let result = select_device(vec![(0u32, DeviceSupport::default())]);
        assert!(matches!(result, Err(VulkanError::NoSuitableDevice)));
    }

    #[test]
    fn test_find_memory_type_respects_mask_and_properties() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let properties = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            host | vk::MemoryPropertyFlags::HOST_CACHED,
            vk::MemoryPropertyFlags::DEVICE_LOCAL | host,
        ]);

        assert_eq!(find_memory_type(&properties, 0b1111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(), 0);
        assert_eq!(find_memory_type(&properties, 0b1110, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(), 3);
        assert_eq!(find_memory_type(&properties, 0b1111, host).unwrap(), 2);
        assert_eq!(find_memory_type(&properties, 0b0010, vk::MemoryPropertyFlags::empty()).unwrap(), 1);
    }

    #[test]
    fn test_find_memory_type_result_satisfies_request() {
        let properties = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE,
        ]);
        let requests = [
            vk::MemoryPropertyFlags::empty(),
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE,
        ];

        for mask in 1u32..8 {
            for required in requests {
                let has_solution = (0..3).any(|i| {
                    mask & (1 << i) != 0 && properties.memory_types[i].property_flags.contains(required)
                });
                match find_memory_type(&properties, mask, required) {
                    Ok(index) => {
                        assert!(has_solution);
                        assert_ne!(mask & (1 << index), 0);
                        assert!(properties.memory_types[index as usize].property_flags.contains(required));
                    }
                    Err(VulkanError::NoSuitableMemoryType { type_mask, .. }) => {
                        assert!(!has_solution);
                        assert_eq!(type_mask, mask);
                    }
                    Err(other) => panic!("unexpected error: {other}"),
                }
            }
        }
    }

    #[test]
    fn test_memory_table_ignores_types_beyond_count() {
        let mut properties = memory_properties(&[vk::MemoryPropertyFlags::HOST_VISIBLE]);
        properties.memory_types[1].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        let table = MemoryTypeTable::new(properties);

        assert_eq!(table.len(), 1);
        assert!(matches!(
            table.find(0b11, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Err(VulkanError::NoSuitableMemoryType { .. })
        ));
    }
}
