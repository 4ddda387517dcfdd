// SPDX-License-Identifier: CEPL-1.0
use std::{fs, io, path::Path};

use serde::Deserialize;
use tracing::{debug, warn};

pub const DEFAULT_CONFIG_PATH: &str = "swapframe.toml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum VsyncMode {
    #[default]
    Mailbox,
    Fifo,
}

impl From<VsyncMode> for swapframe_vk::VsyncMode {
    fn from(mode: VsyncMode) -> Self {
        match mode {
            VsyncMode::Mailbox => swapframe_vk::VsyncMode::Mailbox,
            VsyncMode::Fifo => swapframe_vk::VsyncMode::Fifo,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WindowCfg {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RenderCfg {
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
    #[serde(default = "default_frames_in_flight")]
    pub frames_in_flight: usize,
    #[serde(default)]
    pub vsync_mode: VsyncMode,
    #[serde(default = "default_spin")]
    pub spin_degrees_per_second: f32,
    #[serde(default = "default_validation")]
    pub validation: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AppCfg {
    #[serde(default)]
    pub window: WindowCfg,
    #[serde(default)]
    pub render: RenderCfg,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: default_title(),
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            frames_in_flight: default_frames_in_flight(),
            vsync_mode: VsyncMode::Mailbox,
            spin_degrees_per_second: default_spin(),
            validation: default_validation(),
        }
    }
}

fn default_title() -> String {
    "swapframe".into()
}
fn default_width() -> u32 {
    800
}
fn default_height() -> u32 {
    600
}
fn default_clear() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}
fn default_frames_in_flight() -> usize {
    2
}
fn default_spin() -> f32 {
    90.0
}
fn default_validation() -> bool {
    true
}

impl AppCfg {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str::<AppCfg>(text).map(AppCfg::normalized)
    }

    /// Read `path`. A missing file gives the defaults; an unreadable or
    /// malformed one logs a warning and gives the defaults.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text).unwrap_or_else(|e| {
                warn!("{}: {e}; using defaults", path.display());
                AppCfg::default()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{} not found; using defaults", path.display());
                AppCfg::default()
            }
            Err(e) => {
                warn!("reading {}: {e}; using defaults", path.display());
                AppCfg::default()
            }
        }
    }

    /// Command line values win over the file.
    pub fn with_overrides(mut self, frames_in_flight: Option<usize>, vsync: Option<VsyncMode>) -> Self {
        if let Some(n) = frames_in_flight {
            self.render.frames_in_flight = n;
        }
        if let Some(mode) = vsync {
            self.render.vsync_mode = mode;
        }
        self.normalized()
    }

    fn normalized(mut self) -> Self {
        self.render.frames_in_flight = self.render.frames_in_flight.max(1);
        self.window.width = self.window.width.max(1);
        self.window.height = self.window.height.max(1);
        self
    }
}
