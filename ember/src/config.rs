
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::*;
use crate::tonemapping::ToneMapMode;
use crate::auto_spp::{MIN_SPP, MAX_SPP};

pub const DEFAULT_CONFIG_FILE: &str = "ember.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderPaths
{
    /// Compute shader with the `trace_main` entry point.
    pub trace: PathBuf,
    /// Fullscreen blit with `vert_main`/`frag_main` entry points.
    pub present: PathBuf,
}

impl Default for ShaderPaths
{
    fn default() -> Self
    {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("shaders");
        return Self {
            trace: dir.join("trace.wgsl"),
            present: dir.join("present.wgsl"),
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSppConfig
{
    pub enabled: bool,
    pub target_fps: f32,
    /// Frames averaged before each adjustment. Larger windows oscillate
    /// less but take longer to react to load changes.
    pub adjust_window_frames: u32,
    /// Window used right after a resize or an explicit setting change.
    pub fast_adapt_frames: u32,
}

impl Default for AutoSppConfig
{
    fn default() -> Self
    {
        return Self {
            enabled: false,
            target_fps: 60.0,
            adjust_window_frames: 30,
            fast_adapt_frames: 4,
        };
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig
{
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub vsync: bool,
    pub frames_in_flight: u32,

    pub samples_per_pixel: u32,
    pub max_bounces: u32,
    pub tonemap: ToneMapMode,

    pub shaders: ShaderPaths,
    pub auto_spp: AutoSppConfig,
}

impl Default for RendererConfig
{
    fn default() -> Self
    {
        return Self {
            width: 1600,
            height: 900,
            title: String::from("Ember"),
            vsync: false,
            frames_in_flight: 2,
            samples_per_pixel: 4,
            max_bounces: 6,
            tonemap: ToneMapMode::Aces,
            shaders: ShaderPaths::default(),
            auto_spp: AutoSppConfig::default(),
        };
    }
}

pub const MAX_FRAMES_IN_FLIGHT: u32 = 3;
pub const MAX_BOUNCES: u32 = 64;

impl RendererConfig
{
    /// Reads a JSON config. A missing file yields the defaults,
    /// a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self>
    {
        let text = match std::fs::read_to_string(path)
        {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound =>
            {
                log::info!("No config at '{}', using defaults", path.display());
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };

        let config: RendererConfig = serde_json::from_str(&text)?;
        return Ok(config.validated());
    }

    pub fn save(&self, path: &Path) -> Result<()>
    {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        return Ok(());
    }

    /// Clamps every field into its supported range.
    pub fn validated(mut self) -> Self
    {
        self.width  = self.width.max(1);
        self.height = self.height.max(1);
        self.frames_in_flight  = self.frames_in_flight.clamp(1, MAX_FRAMES_IN_FLIGHT);
        self.samples_per_pixel = self.samples_per_pixel.clamp(MIN_SPP, MAX_SPP);
        self.max_bounces       = self.max_bounces.clamp(1, MAX_BOUNCES);

        if !self.auto_spp.target_fps.is_finite() || self.auto_spp.target_fps <= 0.0 {
            self.auto_spp.target_fps = AutoSppConfig::default().target_fps;
        }
        self.auto_spp.adjust_window_frames = self.auto_spp.adjust_window_frames.max(1);
        self.auto_spp.fast_adapt_frames    = self.auto_spp.fast_adapt_frames.max(1);
        return self;
    }
}
