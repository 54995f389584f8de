//! Shader loading and graphics pipeline creation
//!
//! SPIR-V modules are short-lived: they exist only until the pipeline that
//! uses them has been created.

use ash::{vk, Device};
use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;

use super::context::{VulkanError, VulkanResult};
use super::vertex_layout::VulkanVertexLayout;

const ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create shader module from SPIR-V bytecode
    ///
    /// `origin` names the blob in errors.
    pub fn from_bytes(device: Device, bytes: &[u8], origin: &str) -> VulkanResult<Self> {
        let code = ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| VulkanError::ShaderLoad {
            path: origin.to_string(),
            reason: e.to_string(),
        })?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);
        let module = unsafe { device.create_shader_module(&create_info, None) }.map_err(|e| {
            VulkanError::ShaderLoad {
                path: origin.to_string(),
                reason: format!("{:?}", e),
            }
        })?;

        Ok(Self { device, module })
    }

    /// Load shader from SPIR-V file
    pub fn from_file<P: AsRef<Path>>(device: Device, path: P) -> VulkanResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| VulkanError::ShaderLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        log::debug!("Loaded shader {} ({} bytes)", path.display(), bytes.len());
        Self::from_bytes(device, &bytes, &path.display().to_string())
    }

    /// Get shader module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Stage info using the `main` entry point
    pub fn create_stage_info(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(ENTRY_POINT)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Plain description of the fixed-function state baked into the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct FixedFunctionState {
    pub topology: vk::PrimitiveTopology,
    pub primitive_restart: bool,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub polygon_mode: vk::PolygonMode,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare_op: vk::CompareOp,
    pub stencil_test: bool,
    pub blend_enable: bool,
    pub color_write_mask: vk::ColorComponentFlags,
    pub samples: vk::SampleCountFlags,
    pub dynamic_states: Vec<vk::DynamicState>,
}

impl Default for FixedFunctionState {
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart: false,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
            polygon_mode: vk::PolygonMode::FILL,
            depth_test: true,
            depth_write: true,
            // Equal depths pass so later draws at the same depth win.
            depth_compare_op: vk::CompareOp::LESS_OR_EQUAL,
            stencil_test: false,
            blend_enable: false,
            color_write_mask: vk::ColorComponentFlags::RGBA,
            samples: vk::SampleCountFlags::TYPE_1,
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
        }
    }
}

/// Graphics pipeline wrapper with RAII cleanup
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Load both shader stages from disk and build the pipeline for `render_pass`
    pub fn from_files(
        device: Device,
        render_pass: vk::RenderPass,
        vertex_path: &Path,
        fragment_path: &Path,
    ) -> VulkanResult<Self> {
        let vertex_shader = ShaderModule::from_file(device.clone(), vertex_path)?;
        let fragment_shader = ShaderModule::from_file(device.clone(), fragment_path)?;
        // Modules drop at the end of this scope, after pipeline creation.
        Self::new(
            device,
            render_pass,
            &vertex_shader,
            &fragment_shader,
            &FixedFunctionState::default(),
        )
    }

    /// Create graphics pipeline
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        vertex_shader: &ShaderModule,
        fragment_shader: &ShaderModule,
        state: &FixedFunctionState,
    ) -> VulkanResult<Self> {
        let shader_stages = [
            vertex_shader.create_stage_info(vk::ShaderStageFlags::VERTEX),
            fragment_shader.create_stage_info(vk::ShaderStageFlags::FRAGMENT),
        ];

        let bindings = [VulkanVertexLayout::get_binding_description()];
        let attributes = VulkanVertexLayout::get_attribute_descriptions();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(state.topology)
            .primitive_restart_enable(state.primitive_restart);

        // Viewport and scissor are dynamic; only the counts are fixed here.
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(state.polygon_mode)
            .line_width(1.0)
            .cull_mode(state.cull_mode)
            .front_face(state.front_face)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(state.samples);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(state.depth_test)
            .depth_write_enable(state.depth_write)
            .depth_compare_op(state.depth_compare_op)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(state.stencil_test);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(state.color_write_mask)
            .blend_enable(state.blend_enable)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&state.dynamic_states);

        let layout_info = vk::PipelineLayoutCreateInfo::builder();
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
            .map_err(VulkanError::PipelineCreationFailure)?;

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
        };
        let pipeline = match pipelines {
            Ok(pipelines) => pipelines[0],
            Err((_, err)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(VulkanError::PipelineCreationFailure(err));
            }
        };

        log::debug!("Graphics pipeline created");
        Ok(Self {
            device,
            pipeline,
            layout,
        })
    }

    /// Get pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get layout handle
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}
