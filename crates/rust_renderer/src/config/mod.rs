//! Configuration system
//!
//! Renderer settings with defaults, builder-style setters and validation,
//! loadable from `.toml` or `.ron` files through the [`Config`] trait.

pub use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            ConfigFormat::Ron => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?,
            ConfigFormat::Ron => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value is out of range or missing
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Ron,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// SPIR-V shader locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex_path: impl Into<String>, fragment_path: impl Into<String>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
        }
    }

    /// Look for both shaders in the usual output directories
    ///
    /// The first directory holding each file wins; unresolved files fall back
    /// to the build script's output directory.
    pub fn with_path_resolution(vertex_file: &str, fragment_file: &str) -> Self {
        const SHADER_DIRS: [&str; 4] = ["target/shaders", "shaders", "resources/shaders", "../target/shaders"];

        let resolve = |file: &str| {
            SHADER_DIRS
                .iter()
                .map(|dir| Path::new(dir).join(file))
                .find(|candidate| candidate.exists())
                .map(|found| found.display().to_string())
                .unwrap_or_else(|| format!("{}/{}", SHADER_DIRS[0], file))
        };

        Self::new(resolve(vertex_file), resolve(fragment_file))
    }

    /// Paths must be non-empty
    ///
    /// File existence is checked when the shaders are loaded.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vertex_shader_path.trim().is_empty() {
            return Err(ConfigError::Invalid("vertex shader path is empty".to_string()));
        }
        if self.fragment_shader_path.trim().is_empty() {
            return Err(ConfigError::Invalid("fragment shader path is empty".to_string()));
        }
        Ok(())
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::with_path_resolution("passthru.vert.spv", "passthru.frag.spv")
    }
}

/// Window title and size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Title bar text
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
}

impl WindowConfig {
    /// Both dimensions must be non-zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size {}x{} has a zero dimension",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan".to_string(),
            width: 800,
            height: 600,
        }
    }
}

/// Everything the renderer needs at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Whether to enable Vulkan validation layers
    pub enable_validation: bool,
    /// Background colour, linear RGBA in 0..=1
    pub clear_color: [f32; 4],
    /// Shader configuration
    pub shaders: ShaderConfig,
    /// Window configuration
    pub window: WindowConfig,
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            ..Self::default()
        }
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = enabled;
        self
    }

    /// Set custom shader configuration
    pub fn with_shaders(mut self, shaders: ShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    /// Set window title and size
    pub fn with_window(mut self, title: impl Into<String>, width: u32, height: u32) -> Self {
        self.window = WindowConfig {
            title: title.into(),
            width,
            height,
        };
        self
    }

    /// Set the background colour
    pub fn with_clear_color(mut self, clear_color: [f32; 4]) -> Self {
        self.clear_color = clear_color;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("application name cannot be empty".to_string()));
        }
        if self.application_name.contains('\0') {
            return Err(ConfigError::Invalid("application name contains NUL".to_string()));
        }
        if let Some(component) = self
            .clear_color
            .iter()
            .find(|c| !c.is_finite() || !(0.0..=1.0).contains(*c))
        {
            return Err(ConfigError::Invalid(format!(
                "clear colour component {} outside 0..=1",
                component
            )));
        }
        self.shaders.validate()?;
        self.window.validate()
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: "Hello, Vulkan!".to_string(),
            enable_validation: cfg!(debug_assertions),
            clear_color: [0.0, 0.0, 0.2, 1.0],
            shaders: ShaderConfig::default(),
            window: WindowConfig::default(),
        }
    }
}

impl Config for RendererConfig {}
