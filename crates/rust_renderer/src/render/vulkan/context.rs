//! Vulkan context management
//!
//! Owns the connection to the GPU: instance and validation messenger, the
//! presentation surface handle, the selected physical device and the logical
//! device with its queues. Everything else in the backend borrows from here.

use ash::extensions::ext::DebugUtils;
use ash::{vk, Device, Entry, Instance};
use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::sync::Arc;
use thiserror::Error;

use super::buffer::Buffer;
use super::device::{LogicalDevice, MemoryTypeTable, PhysicalDeviceInfo, QueueFamilyIndices};
use super::surface::{Surface, SurfaceSource};

/// Closed set of failures the renderer core can report
#[derive(Error, Debug)]
pub enum VulkanError {
    /// The Vulkan loader library could not be found or opened
    #[error("Failed to load Vulkan: {0}")]
    Loader(String),

    /// Instance or logical device creation was rejected
    #[error("Device creation failed: {0}")]
    DeviceCreationFailure(String),

    /// No enumerated GPU meets the queue, extension and surface requirements
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// No memory type matches the requested mask and property flags
    #[error("No suitable memory type (type mask {type_mask:#x}, required {required:?})")]
    NoSuitableMemoryType {
        /// Bitmask of acceptable memory type indices
        type_mask: u32,
        /// Property flags the memory type had to provide
        required: vk::MemoryPropertyFlags,
    },

    /// The window system could not produce a surface, or a surface query failed
    #[error("Surface creation failed: {0}")]
    SurfaceCreationFailure(String),

    /// Swapchain or swapchain image view creation failed
    #[error("Swapchain creation failed: {0:?}")]
    SwapchainCreationFailure(vk::Result),

    /// No depth format in the candidate list supports optimal-tiling depth attachments
    #[error("No supported depth format")]
    NoSupportedDepthFormat,

    /// A shader binary could not be read or is not valid SPIR-V
    #[error("Failed to load shader {path}: {reason}")]
    ShaderLoad {
        /// Path of the shader binary
        path: String,
        /// What went wrong
        reason: String,
    },

    /// Render pass, framebuffer, pipeline layout or pipeline creation was rejected
    #[error("Pipeline creation failed: {0:?}")]
    PipelineCreationFailure(vk::Result),

    /// Semaphore, fence or command pool creation failed
    #[error("Synchronization object creation failed: {0:?}")]
    SyncObjectCreationFailure(vk::Result),

    /// The surface no longer matches the swapchain
    #[error("Surface is out of date")]
    SurfaceOutOfDate,

    /// The swapchain still works but no longer matches the surface exactly
    #[error("Surface is suboptimal")]
    SurfaceSuboptimal,

    /// Command buffer allocation, recording or submission failed
    #[error("Command recording failed: {0:?}")]
    CommandRecordingFailure(vk::Result),

    /// Buffer or image creation, allocation, binding or mapping failed
    #[error("Buffer allocation failed: {0:?}")]
    BufferAllocationFailure(vk::Result),

    /// Mesh data handed to the uploader is unusable
    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    /// Any other Vulkan result (device loss during a wait, for instance)
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// A frame failed after its slot was reset; the slot's fence will never signal
    #[error("Frame slot {0} was lost after a failed submission")]
    FrameSlotLost(usize),
}

impl VulkanError {
    /// Map a result from acquire/present, routing surface mismatches to their own variants
    pub fn from_surface_result(result: vk::Result, fallback: fn(vk::Result) -> Self) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_DATE_KHR => Self::SurfaceOutOfDate,
            vk::Result::SUBOPTIMAL_KHR => Self::SurfaceSuboptimal,
            other => fallback(other),
        }
    }

    /// Whether recovery needs the surface and swapchain to be rebuilt
    pub fn is_surface_mismatch(&self) -> bool {
        matches!(self, Self::SurfaceOutOfDate | Self::SurfaceSuboptimal)
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Receives validation layer diagnostics
///
/// Installed on the debug messenger as user data. Diagnostics are advisory:
/// whatever the sink does, the callback tells the driver to continue.
pub trait ValidationSink: Send + Sync {
    /// Handle one validation message
    fn message(
        &self,
        severity: vk::DebugUtilsMessageSeverityFlagsEXT,
        kind: vk::DebugUtilsMessageTypeFlagsEXT,
        message: &str,
    );
}

/// Forwards validation messages to the `log` facade by severity
#[derive(Debug, Default, Clone, Copy)]
pub struct LogValidationSink;

impl ValidationSink for LogValidationSink {
    fn message(
        &self,
        severity: vk::DebugUtilsMessageSeverityFlagsEXT,
        kind: vk::DebugUtilsMessageTypeFlagsEXT,
        message: &str,
    ) {
        if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
            log::error!("[Vulkan] {:?} - {}", kind, message);
        } else if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
            log::warn!("[Vulkan] {:?} - {}", kind, message);
        } else {
            log::debug!("[Vulkan] {:?} - {}", kind, message);
        }
    }
}

const VALIDATION_LAYER: &CStr =
    unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

struct DebugMessenger {
    loader: DebugUtils,
    messenger: vk::DebugUtilsMessengerEXT,
}

/// Owns a validation sink at a stable address the driver can call back into
struct SinkHandle {
    // Double boxing gives the callback a thin pointer.
    sink: Box<Box<dyn ValidationSink>>,
}

impl SinkHandle {
    fn new(sink: Box<dyn ValidationSink>) -> Self {
        Self { sink: Box::new(sink) }
    }

    fn user_data(&self) -> *mut c_void {
        &*self.sink as *const Box<dyn ValidationSink> as *mut c_void
    }
}

/// Vulkan instance wrapper with RAII cleanup
///
/// The sink is a plain field, so it is released only after `Drop` has
/// destroyed the instance; the messenger chained into instance creation can
/// fire during `vkDestroyInstance`.
pub struct VulkanInstance {
    debug: Option<DebugMessenger>,
    /// Vulkan instance handle
    pub instance: Instance,
    /// Vulkan entry point
    pub entry: Entry,
    _sink: SinkHandle,
}

impl VulkanInstance {
    /// Create a new instance with the window system's extensions, optionally with validation
    pub fn new(
        source: &dyn SurfaceSource,
        app_name: &str,
        enable_validation: bool,
        sink: Box<dyn ValidationSink>,
    ) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::Loader(format!("{:?}", e)))?;

        let app_name_cstr = CString::new(app_name)
            .map_err(|_| VulkanError::DeviceCreationFailure("application name contains NUL".to_string()))?;
        let engine_name_cstr = CString::new("RustRenderer").unwrap_or_default();
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let required_extensions = source.required_instance_extensions()?;
        let cstr_extensions = required_extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| VulkanError::DeviceCreationFailure("extension name contains NUL".to_string()))?;

        let mut extensions: Vec<*const c_char> = cstr_extensions.iter().map(|ext| ext.as_ptr()).collect();
        let mut layers: Vec<*const c_char> = Vec::new();
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
            layers.push(VALIDATION_LAYER.as_ptr());
        }

        let sink = SinkHandle::new(sink);
        let sink_ptr = sink.user_data();

        // Chained into instance creation so create/destroy of the instance itself is covered.
        let mut instance_debug_info = messenger_create_info(sink_ptr);

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        if enable_validation {
            create_info = create_info.push_next(&mut instance_debug_info);
        }

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(|e| VulkanError::DeviceCreationFailure(format!("instance: {:?}", e)))?;

        let debug = if enable_validation {
            let loader = DebugUtils::new(&entry, &instance);
            let info = messenger_create_info(sink_ptr);
            match unsafe { loader.create_debug_utils_messenger(&info, None) } {
                Ok(messenger) => Some(DebugMessenger { loader, messenger }),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(VulkanError::DeviceCreationFailure(format!("debug messenger: {:?}", e)));
                }
            }
        } else {
            None
        };

        log::debug!("Vulkan instance created (validation: {})", enable_validation);
        Ok(Self {
            debug,
            instance,
            entry,
            _sink: sink,
        })
    }

    /// Whether a validation messenger is installed
    pub fn validation_enabled(&self) -> bool {
        self.debug.is_some()
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some(debug) = self.debug.take() {
                debug.loader.destroy_debug_utils_messenger(debug.messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn messenger_create_info(user_data: *mut c_void) -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .user_data(user_data)
        .build()
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    kind: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    user_data: *mut c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || user_data.is_null() {
        return vk::FALSE;
    }
    let sink = &*(user_data as *const Box<dyn ValidationSink>);
    let callback_data = *callback_data;
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("")
    } else {
        CStr::from_ptr(callback_data.p_message).to_string_lossy()
    };
    sink.message(severity, kind, &message);
    vk::FALSE
}

/// Main Vulkan context that owns all core Vulkan resources
///
/// The logical device and instance are shared: uploaded buffers hold the
/// device, and the device holds the instance, so neither can be destroyed
/// while something created from it is still alive.
pub struct VulkanContext {
    device: Arc<LogicalDevice>,
    surface: Surface,
    physical_device: PhysicalDeviceInfo,
    memory_types: MemoryTypeTable,
    instance: Arc<VulkanInstance>,
}

impl VulkanContext {
    /// Create a context for the given window, logging validation output
    pub fn new(source: &dyn SurfaceSource, app_name: &str, enable_validation: bool) -> VulkanResult<Self> {
        Self::with_validation_sink(source, app_name, enable_validation, Box::new(LogValidationSink))
    }

    /// Create a context with a custom validation sink
    pub fn with_validation_sink(
        source: &dyn SurfaceSource,
        app_name: &str,
        enable_validation: bool,
        sink: Box<dyn ValidationSink>,
    ) -> VulkanResult<Self> {
        let instance = Arc::new(VulkanInstance::new(source, app_name, enable_validation, sink)?);
        let surface = Surface::new(&instance.entry, &instance.instance, source)?;

        let physical_device = PhysicalDeviceInfo::select_suitable_device(&instance.instance, &surface)?;
        let device = Arc::new(LogicalDevice::new(&instance, &physical_device, enable_validation)?);
        let memory_types = MemoryTypeTable::new(unsafe {
            instance.instance.get_physical_device_memory_properties(physical_device.device)
        });

        Ok(Self {
            device,
            surface,
            physical_device,
            memory_types,
            instance,
        })
    }

    /// Get a reference to the Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// Get the surface wrapper
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Get the selected physical device
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Get the logical device handle
    pub fn device(&self) -> &Device {
        &self.device.device
    }

    /// Clone the logical device handle for an RAII wrapper
    pub fn raw_device(&self) -> Device {
        self.device.device.clone()
    }

    /// Shared ownership of the logical device, for objects that may outlive the context
    pub fn shared_device(&self) -> Arc<LogicalDevice> {
        Arc::clone(&self.device)
    }

    /// Graphics and present queue family indices
    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.physical_device.queue_families
    }

    /// Get the graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Get the present queue
    pub fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Memory types reported by the device at startup
    pub fn memory_types(&self) -> &MemoryTypeTable {
        &self.memory_types
    }

    /// Find the first memory type allowed by `type_mask` that has all of `required`
    pub fn find_memory_type(&self, type_mask: u32, required: vk::MemoryPropertyFlags) -> VulkanResult<u32> {
        self.memory_types.find(type_mask, required)
    }

    /// Allocate a buffer of exactly `size` bytes backed by memory with `properties`
    pub fn allocate_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Buffer> {
        Buffer::new(self, size, usage, properties)
    }

    /// Format features for optimal tiling
    pub fn optimal_tiling_features(&self, format: vk::Format) -> vk::FormatFeatureFlags {
        unsafe {
            self.instance()
                .get_physical_device_format_properties(self.physical_device.device, format)
                .optimal_tiling_features
        }
    }

    /// Whether the instance was created with validation
    pub fn validation_enabled(&self) -> bool {
        self.instance.validation_enabled()
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device.device_wait_idle().map_err(VulkanError::Api) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct RecordingSink {
        messages: Arc<Mutex<Vec<String>>>,
    }

    impl ValidationSink for RecordingSink {
        fn message(
            &self,
            _severity: vk::DebugUtilsMessageSeverityFlagsEXT,
            _kind: vk::DebugUtilsMessageTypeFlagsEXT,
            message: &str,
        ) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }

    #[test]
    fn test_surface_results_map_to_surface_errors() {
        let out_of_date = VulkanError::from_surface_result(vk::Result::ERROR_OUT_OF_DATE_KHR, VulkanError::Api);
        assert!(matches!(out_of_date, VulkanError::SurfaceOutOfDate));
        assert!(out_of_date.is_surface_mismatch());

        let suboptimal = VulkanError::from_surface_result(vk::Result::SUBOPTIMAL_KHR, VulkanError::Api);
        assert!(matches!(suboptimal, VulkanError::SurfaceSuboptimal));

        let lost = VulkanError::from_surface_result(
            vk::Result::ERROR_DEVICE_LOST,
            VulkanError::CommandRecordingFailure,
        );
        assert!(matches!(lost, VulkanError::CommandRecordingFailure(vk::Result::ERROR_DEVICE_LOST)));
        assert!(!lost.is_surface_mismatch());
    }

    #[test]
    fn test_debug_callback_forwards_to_sink_and_never_aborts() {
        let recording = RecordingSink::default();
        let sink = SinkHandle::new(Box::new(recording.clone()));
        let sink_ptr = sink.user_data();
        let text = CString::new("object leaked").unwrap();
        let data = vk::DebugUtilsMessengerCallbackDataEXT::builder()
            .message(&text)
            .build();

        let verdict = unsafe {
            debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                &data,
                sink_ptr,
            )
        };

        assert_eq!(verdict, vk::FALSE);
        assert_eq!(recording.messages.lock().unwrap().as_slice(), ["object leaked"]);
    }

    #[test]
    fn test_sink_address_survives_moves_of_its_owner() {
        struct Owner {
            _padding: [u64; 4],
            sink: SinkHandle,
        }

        let recording = RecordingSink::default();
        let handle = SinkHandle::new(Box::new(recording.clone()));
        let before = handle.user_data();

        // The instance wrapper is moved into an `Arc` after the messenger is
        // created; the pointer handed to the driver must not change.
        let owner = Owner {
            _padding: [0; 4],
            sink: handle,
        };
        let moved = vec![owner];
        assert_eq!(moved[0].sink.user_data(), before);

        let text = CString::new("still reachable").unwrap();
        let data = vk::DebugUtilsMessengerCallbackDataEXT::builder().message(&text).build();
        unsafe {
            debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL,
                &data,
                before,
            );
        }
        assert_eq!(recording.messages.lock().unwrap().as_slice(), ["still reachable"]);
    }

    #[test]
    fn test_debug_callback_ignores_null_user_data() {
        let data = vk::DebugUtilsMessengerCallbackDataEXT::default();
        let verdict = unsafe {
            debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL,
                &data,
                std::ptr::null_mut(),
            )
        };
        assert_eq!(verdict, vk::FALSE);
    }
}
