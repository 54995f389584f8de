//! Quad demo application
//!
//! Draws two overlapping colour-interpolated quads until the window is
//! closed. The nearer quad is uploaded first, so the depth test rather than
//! draw order keeps it on top where they overlap.
//!
//! Usage: `quad_demo [config.toml | config.ron]`

use rust_renderer::foundation::logging;
use rust_renderer::prelude::*;

const RED: [f32; 3] = [1.0, 0.0, 0.0];
const GREEN: [f32; 3] = [0.0, 1.0, 0.0];
const BLUE: [f32; 3] = [0.0, 0.0, 1.0];
const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

const NEAR_DEPTH: f32 = 0.25;
const FAR_DEPTH: f32 = 0.75;

fn load_config() -> Result<RendererConfig, ConfigError> {
    let config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading configuration from {}", path);
            RendererConfig::load_from_file(path)?
        }
        None => RendererConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;

    log::info!("Creating window...");
    let mut window = Window::new(&config.window.title, config.window.width, config.window.height)?;

    log::info!("Creating Vulkan renderer...");
    let mut renderer = Renderer::new(&config, &window)?;

    let meshes = [
        Mesh::quad([-0.5, -0.5], [0.5, 0.5], NEAR_DEPTH, [RED, GREEN, BLUE, WHITE]),
        Mesh::quad([-0.75, -0.75], [0.25, 0.25], FAR_DEPTH, [RED, GREEN, BLUE, WHITE]),
    ];
    let models = meshes
        .iter()
        .map(|mesh| renderer.upload_mesh(mesh))
        .collect::<VulkanResult<Vec<_>>>()?;
    log::info!("Uploaded {} models", models.len());

    while !window.should_close() {
        window.poll_events();
        match renderer.draw_frame(&models) {
            Ok(()) => {}
            Err(e) if e.is_surface_mismatch() => {
                log::warn!("Surface no longer matches the swapchain ({}), stopping", e);
                break;
            }
            Err(e) => {
                renderer.wait_idle()?;
                return Err(e.into());
            }
        }
    }

    renderer.wait_idle()?;
    log::info!("Rendered {} frames", renderer.frames_presented());

    Ok(())
}

fn main() {
    logging::init(log::LevelFilter::Info);

    if let Err(e) = run() {
        log::error!("Quad demo failed: {}", e);
        std::process::exit(1);
    }
}
