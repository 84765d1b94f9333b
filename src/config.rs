use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use serde::de::{self, Deserializer};
use tracing::warn;

/// Screen orientation profile selector.
///
/// The wire labels mirror the aspect-ratio strings accepted in the
/// configuration file: `"16:9"` for landscape panels and `"6:19"` for
/// portrait totems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Orientation {
    Landscape,
    Portrait,
}

impl Orientation {
    const ALL: &'static [Self] = &[Self::Landscape, Self::Portrait];
    const NAMES: &'static [&'static str] = &["16:9", "6:19"];

    pub fn label(self) -> &'static str {
        match self {
            Self::Landscape => "16:9",
            Self::Portrait => "6:19",
        }
    }

    /// Decide the orientation from the active display's reported size.
    /// Width >= height selects the landscape profile.
    pub fn detect(width: u32, height: u32) -> Self {
        if width >= height {
            Self::Landscape
        } else {
            Self::Portrait
        }
    }

    pub const fn default_resolution(self) -> (u32, u32) {
        match self {
            Self::Landscape => (1920, 1080),
            Self::Portrait => (1080, 1920),
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Orientation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        for orientation in Self::ALL {
            if raw == orientation.label() {
                return Ok(*orientation);
            }
        }
        Err(de::Error::unknown_variant(&raw, Self::NAMES))
    }
}

/// Per-orientation overrides under `orientation_specific`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OrientationOverrides {
    /// Per-item display duration in seconds for this orientation.
    pub display_duration: Option<f64>,
    /// Target resolution as `[width, height]`.
    pub resolution: Option<(u32, u32)>,
}

/// Video delegate enable flags under `raspberry_pi`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RaspberryPiOptions {
    pub use_omxplayer: bool,
    pub use_vlc: bool,
}

impl Default for RaspberryPiOptions {
    fn default() -> Self {
        Self {
            use_omxplayer: true,
            use_vlc: true,
        }
    }
}

/// Resolved duration/resolution defaults for the active orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationProfile {
    pub orientation: Orientation,
    pub display_duration: Duration,
    pub resolution: (u32, u32),
}

/// Flat player configuration, loaded once at startup from a JSON file.
/// Unrecognized fields are ignored; missing fields fall back to the
/// documented defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Flat media directory scanned non-recursively.
    pub ads_directory: PathBuf,
    /// Per-item display duration in seconds.
    pub display_duration: f64,
    /// Explicit orientation override; wins over detection when set.
    pub force_orientation: Option<Orientation>,
    /// Run the viewer window fullscreen with the cursor hidden.
    pub fullscreen: bool,
    /// Shuffle the catalog after each scan.
    pub shuffle_ads: bool,
    /// Prefer the hardware-accelerated video delegate when available.
    pub hardware_acceleration: bool,
    /// Letterbox and idle-screen fill color.
    pub background_color: [u8; 3],
    /// Event-loop poll cadence ceiling in frames per second.
    pub fps: u32,
    /// Per-orientation overrides keyed by orientation label.
    pub orientation_specific: BTreeMap<Orientation, OrientationOverrides>,
    /// Video delegate enable flags.
    pub raspberry_pi: RaspberryPiOptions,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            ads_directory: PathBuf::from("ads"),
            display_duration: Self::default_display_duration(),
            force_orientation: None,
            fullscreen: true,
            shuffle_ads: false,
            hardware_acceleration: true,
            background_color: [0, 0, 0],
            fps: Self::default_fps(),
            orientation_specific: BTreeMap::new(),
            raspberry_pi: RaspberryPiOptions::default(),
        }
    }
}

impl Configuration {
    const fn default_display_duration() -> f64 {
        10.0
    }

    const fn default_fps() -> u32 {
        30
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("reading config file {}", path.as_ref().display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.as_ref().display()))
    }

    /// Load the configuration, falling back to defaults on any failure.
    /// A malformed or missing config file is a warning, never fatal.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::from_json_file(path.as_ref()).and_then(Self::validated) {
            Ok(cfg) => cfg,
            Err(err) => {
                warn!(
                    config = %path.as_ref().display(),
                    "falling back to default configuration: {err:#}"
                );
                Self::default()
            }
        }
    }

    /// Validate runtime invariants that cannot be expressed via serde
    /// defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            self.display_duration > 0.0 && self.display_duration.is_finite(),
            "display_duration must be a positive number of seconds"
        );
        ensure!(self.fps >= 1, "fps must be at least 1");
        for (orientation, overrides) in &self.orientation_specific {
            if let Some(duration) = overrides.display_duration {
                ensure!(
                    duration > 0.0 && duration.is_finite(),
                    "orientation_specific.{orientation}.display_duration must be positive"
                );
            }
            if let Some((w, h)) = overrides.resolution {
                ensure!(
                    w > 0 && h > 0,
                    "orientation_specific.{orientation}.resolution must be non-zero"
                );
            }
        }
        Ok(self)
    }

    /// The orientation to use for the given display size. An explicit
    /// `force_orientation` always wins over detection.
    pub fn orientation_for(&self, width: u32, height: u32) -> Orientation {
        self.force_orientation
            .unwrap_or_else(|| Orientation::detect(width, height))
    }

    /// Resolve the duration/resolution profile for an orientation, applying
    /// any `orientation_specific` overrides on top of the flat defaults.
    pub fn profile(&self, orientation: Orientation) -> OrientationProfile {
        let overrides = self.orientation_specific.get(&orientation);
        let seconds = overrides
            .and_then(|o| o.display_duration)
            .unwrap_or(self.display_duration);
        let resolution = overrides
            .and_then(|o| o.resolution)
            .unwrap_or_else(|| orientation.default_resolution());
        OrientationProfile {
            orientation,
            display_duration: Duration::from_secs_f64(seconds),
            resolution,
        }
    }

    /// Minimum tick interval derived from the configured fps ceiling.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
    }
}
