use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::stream::StreamKind;
use crate::throttle::ThrottleInterval;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 60;
const DEFAULT_RELAY_BIND: &str = "0.0.0.0:9999";

#[derive(Debug)]
pub enum ConfigError {
    /// Throttle interval outside 50..=1000 ms or not a multiple of 50.
    InvalidInterval { stream: &'static str, millis: u64 },
    Parse(toml::de::Error),
    Io(std::io::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInterval { stream, millis } => write!(
                f,
                "invalid {} interval {}ms (must be 50..=1000 and a multiple of 50)",
                stream, millis
            ),
            Self::Parse(e) => write!(f, "config parse error: {}", e),
            Self::Io(e) => write!(f, "config read error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Parse(e)
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    throttle: ThrottleFile,
    #[serde(default)]
    locks: LocksFile,
    #[serde(default)]
    relay: RelayFile,
}

#[derive(Deserialize, Default)]
struct ThrottleFile {
    region_drag_ms: Option<u64>,
    note_drag_ms: Option<u64>,
    track_property_ms: Option<u64>,
    effect_chain_ms: Option<u64>,
    synth_params_ms: Option<u64>,
    recording_preview_ms: Option<u64>,
}

#[derive(Deserialize, Default)]
struct LocksFile {
    timeout_secs: Option<u64>,
}

#[derive(Deserialize, Default)]
struct RelayFile {
    bind: Option<String>,
}

/// Per-stream flush intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleConfig {
    pub region_drag: ThrottleInterval,
    pub note_drag: ThrottleInterval,
    pub track_property: ThrottleInterval,
    pub effect_chain: ThrottleInterval,
    pub synth_params: ThrottleInterval,
    pub recording_preview: ThrottleInterval,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        let d = ThrottleInterval::default();
        Self {
            region_drag: d,
            note_drag: d,
            track_property: d,
            effect_chain: d,
            synth_params: d,
            recording_preview: d,
        }
    }
}

impl ThrottleConfig {
    pub fn interval(&self, kind: StreamKind) -> ThrottleInterval {
        match kind {
            StreamKind::RegionDrag => self.region_drag,
            StreamKind::NoteDrag => self.note_drag,
            StreamKind::TrackProperty => self.track_property,
            StreamKind::EffectChain => self.effect_chain,
            StreamKind::SynthParams => self.synth_params,
            StreamKind::RecordingPreview => self.recording_preview,
        }
    }

    /// Override one stream's interval, validating it first.
    pub fn set_interval(&mut self, kind: StreamKind, millis: u64) -> Result<(), ConfigError> {
        let interval = ThrottleInterval::for_stream(kind, millis)?;
        match kind {
            StreamKind::RegionDrag => self.region_drag = interval,
            StreamKind::NoteDrag => self.note_drag = interval,
            StreamKind::TrackProperty => self.track_property = interval,
            StreamKind::EffectChain => self.effect_chain = interval,
            StreamKind::SynthParams => self.synth_params = interval,
            StreamKind::RecordingPreview => self.recording_preview = interval,
        }
        Ok(())
    }
}

/// Synchronization settings: embedded defaults overlaid with the user file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub throttle: ThrottleConfig,
    lock_timeout_secs: u64,
    relay_bind: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            throttle: ThrottleConfig::default(),
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
            relay_bind: DEFAULT_RELAY_BIND.to_string(),
        }
    }
}

impl SyncConfig {
    /// Load embedded defaults, then the user's `sync.toml` if present.
    pub fn load() -> Self {
        match user_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Self::embedded(),
        }
    }

    /// Load embedded defaults overlaid with a specific file. Unreadable or
    /// malformed files are logged and ignored.
    pub fn load_from(path: &Path) -> Self {
        let mut config = Self::embedded();
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                Ok(user) => config.overlay(user),
                Err(e) => {
                    log::warn!(
                        target: "config",
                        "ignoring malformed config {}: {}",
                        path.display(),
                        e
                    )
                }
            },
            Err(e) => {
                log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
            }
        }
        config
    }

    /// Parse a complete config from a string, rejecting invalid intervals.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(contents)?;
        let mut config = Self::default();
        for (kind, millis) in file.throttle.entries() {
            if let Some(millis) = millis {
                config.throttle.set_interval(kind, millis)?;
            }
        }
        if let Some(secs) = file.locks.timeout_secs {
            config.lock_timeout_secs = secs;
        }
        if let Some(bind) = file.relay.bind {
            config.relay_bind = bind;
        }
        Ok(config)
    }

    fn embedded() -> Self {
        match Self::from_toml_str(DEFAULT_CONFIG) {
            Ok(config) => config,
            Err(e) => {
                log::error!(target: "config", "embedded config invalid: {}", e);
                Self::default()
            }
        }
    }

    fn overlay(&mut self, user: ConfigFile) {
        for (kind, millis) in user.throttle.entries() {
            let Some(millis) = millis else { continue };
            if let Err(e) = self.throttle.set_interval(kind, millis) {
                log::warn!(
                    target: "config",
                    "{}; keeping {}ms",
                    e,
                    self.throttle.interval(kind).millis()
                );
            }
        }
        if let Some(secs) = user.locks.timeout_secs {
            self.lock_timeout_secs = secs;
        }
        if let Some(bind) = user.relay.bind {
            self.relay_bind = bind;
        }
    }

    /// Age after which a lock record is considered abandoned; `None` if disabled.
    pub fn lock_timeout(&self) -> Option<Duration> {
        match self.lock_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn set_lock_timeout(&mut self, timeout: Option<Duration>) {
        self.lock_timeout_secs = timeout.map(|d| d.as_secs()).unwrap_or(0);
    }

    pub fn relay_bind(&self) -> &str {
        &self.relay_bind
    }
}

impl ThrottleFile {
    fn entries(&self) -> [(StreamKind, Option<u64>); 6] {
        [
            (StreamKind::RegionDrag, self.region_drag_ms),
            (StreamKind::NoteDrag, self.note_drag_ms),
            (StreamKind::TrackProperty, self.track_property_ms),
            (StreamKind::EffectChain, self.effect_chain_ms),
            (StreamKind::SynthParams, self.synth_params_ms),
            (StreamKind::RecordingPreview, self.recording_preview_ms),
        ]
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("arrange").join("sync.toml"))
}
