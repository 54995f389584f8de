//! # Rust Renderer
//!
//! Draws indexed triangle meshes to a GLFW window with Vulkan, keeping two
//! frames in flight.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rust_renderer::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RendererConfig::default();
//!     let mut window = Window::new(&config.window.title, config.window.width, config.window.height)?;
//!     let mut renderer = Renderer::new(&config, &window)?;
//!
//!     let quad = Mesh::quad([-0.5, -0.5], [0.5, 0.5], 0.5, [[1.0, 1.0, 1.0]; 4]);
//!     let models = vec![renderer.upload_mesh(&quad)?];
//!
//!     while !window.should_close() {
//!         window.poll_events();
//!         renderer.draw_frame(&models)?;
//!     }
//!     renderer.wait_idle()?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod foundation;
pub mod render;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::config::{Config, ConfigError, RendererConfig, ShaderConfig, WindowConfig};
    pub use crate::render::mesh::{IndexType, Indices, Mesh, Vertex};
    pub use crate::render::vulkan::{Model, Renderer, VulkanError, VulkanResult, Window, WindowError};
}
