//! # Rendering System
//!
//! Backend-agnostic mesh data in [`mesh`], the Vulkan implementation in
//! [`vulkan`].

pub mod mesh;
pub mod vulkan;

pub use mesh::{IndexType, Indices, Mesh, MeshDefect, Vertex};
pub use vulkan::{Model, Renderer};
