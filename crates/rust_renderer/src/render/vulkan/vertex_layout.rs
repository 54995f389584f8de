//! Vulkan-specific vertex layout definitions
//!
//! Keeps the mesh types free of Vulkan types; offsets come straight from the
//! struct layout.

use ash::vk;
use std::mem::{offset_of, size_of};

use crate::render::mesh::Vertex;

/// Vulkan vertex layout implementation for the mesh `Vertex` type
pub struct VulkanVertexLayout;

impl VulkanVertexLayout {
    /// Single interleaved binding advancing per vertex
    pub fn get_binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Position (x, y, depth) at location 0, colour at location 1
    pub fn get_attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, pos) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, color) as u32,
            },
        ]
    }
}
