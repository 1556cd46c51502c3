//! RenderStream configuration
//!
//! # Configuration Sources (in priority order)
//!
//! 1. Environment variables: `RENDERSTREAM_LIBRARY`, `RENDERSTREAM_TIMEOUT_MS`,
//!    `RENDERSTREAM_SCENE_CONTROL`
//! 2. Config file: `renderstream.toml`, then `config/renderstream.toml`
//! 3. Defaults
//!
//! # Example Config File
//!
//! ```toml
//! library_path = "C:/Program Files/d3 Production Suite/build/msvc/d3renderstream.dll"
//! await_timeout_ms = 500
//! stream_poll_interval_ms = 1000
//! scene_control = "selection"  # manual, selection
//! forward_logs = true
//! gpu_interop = ["dx11_resource", "none"]
//! follower = false
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use void_renderstream_sys::{LoaderOptions, LIBRARY_ENV};

/// Config files tried in order
pub const CONFIG_FILES: [&str; 2] = ["renderstream.toml", "config/renderstream.toml"];

/// How the host selects scenes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneControl {
    /// One schema scene holding every exposed parameter; the host cannot switch scenes
    #[default]
    Manual,
    /// One schema scene per engine scene; the host picks the active one
    Selection,
}

impl std::fmt::Display for SceneControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Selection => write!(f, "selection"),
        }
    }
}

impl std::str::FromStr for SceneControl {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" | "" => Ok(Self::Manual),
            "selection" | "select" => Ok(Self::Selection),
            _ => Err(format!("Unknown scene control: {}", s)),
        }
    }
}

fn default_gpu_interop() -> Vec<String> {
    ["dx11_resource", "dx11_device", "dx12", "opengl", "vulkan", "none"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Complete RenderStream configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderStreamConfig {
    /// Explicit plugin library, skipping the installation lookup
    pub library_path: Option<PathBuf>,
    /// Timeout of each frame wait
    pub await_timeout_ms: u32,
    /// Backoff while waiting for the first streams
    pub stream_poll_interval_ms: u64,
    pub scene_control: SceneControl,
    /// Forward engine log records to the host console
    pub forward_logs: bool,
    /// GPU interop backends to try, first success wins
    pub gpu_interop: Vec<String>,
    /// Run as a follower of another render node
    pub follower: bool,
    /// File this config was read from
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for RenderStreamConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            await_timeout_ms: 500,
            stream_poll_interval_ms: 1000,
            scene_control: SceneControl::Manual,
            forward_logs: true,
            gpu_interop: default_gpu_interop(),
            follower: false,
            config_path: None,
        }
    }
}

impl RenderStreamConfig {
    /// Load from the first readable config file, then apply environment overrides
    pub fn load() -> Self {
        let mut config = Self::default();

        for path in CONFIG_FILES {
            let path = Path::new(path);
            if !path.exists() {
                continue;
            }
            match Self::load_from_file(path) {
                Ok(loaded) => {
                    config = loaded;
                    log::info!("Loaded RenderStream config from {}", path.display());
                    break;
                }
                Err(err) => log::warn!("Ignoring {}: {}", path.display(), err),
            }
        }

        config.apply_env_overrides(|name| std::env::var(name).ok());
        config
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Apply overrides from an environment lookup
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(library) = var(LIBRARY_ENV).filter(|value| !value.is_empty()) {
            log::info!("RenderStream library from env: {}", library);
            self.library_path = Some(PathBuf::from(library));
        }

        if let Some(timeout) = var("RENDERSTREAM_TIMEOUT_MS") {
            match timeout.parse() {
                Ok(ms) => self.await_timeout_ms = ms,
                Err(_) => log::warn!("Ignoring RENDERSTREAM_TIMEOUT_MS={}", timeout),
            }
        }

        if let Some(control) = var("RENDERSTREAM_SCENE_CONTROL") {
            match control.parse() {
                Ok(control) => {
                    self.scene_control = control;
                    log::info!("Scene control from env: {}", self.scene_control);
                }
                Err(err) => log::warn!("{}", err),
            }
        }
    }

    pub fn await_timeout(&self) -> Duration {
        Duration::from_millis(self.await_timeout_ms as u64)
    }

    /// Timeout as the plugin takes it
    pub fn await_timeout_ms_i32(&self) -> i32 {
        self.await_timeout_ms.min(i32::MAX as u32) as i32
    }

    pub fn stream_poll_interval(&self) -> Duration {
        Duration::from_millis(self.stream_poll_interval_ms)
    }

    pub fn loader_options(&self) -> LoaderOptions {
        LoaderOptions {
            library_path: self.library_path.clone(),
        }
    }
}
