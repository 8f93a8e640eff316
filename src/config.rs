//! Configuration management for emokiosk
//!
//! Provides persistent settings storage with schema versioning and migrations.
//! Configuration is stored in `~/.emokiosk/config.json`; every field has a
//! default so a missing or partial file never prevents startup.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Current config schema version
const CURRENT_VERSION: u32 = 1;

/// Global config instance for caching
static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Schema version for migrations
    pub version: u32,
    /// Detection backend settings
    pub backend: BackendConfig,
    /// Interaction timing settings
    pub interaction: InteractionConfig,
    /// Special ambient event settings
    pub special: SpecialEventConfig,
    /// Face rendering settings
    pub render: RenderConfig,
    /// External video player settings
    pub player: PlayerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            backend: BackendConfig::default(),
            interaction: InteractionConfig::default(),
            special: SpecialEventConfig::default(),
            render: RenderConfig::default(),
            player: PlayerConfig::default(),
        }
    }
}

/// Detection backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the detection server
    pub base_url: String,
    /// Detection status poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            poll_interval_ms: 500,
            request_timeout_secs: 10,
        }
    }
}

/// Interaction timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// How long the frozen snapshot is shown before audio starts (ms)
    pub snapshot_hold_ms: u64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            snapshot_hold_ms: 2000,
        }
    }
}

/// Special ambient event configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecialEventConfig {
    /// Lower bound of the random trigger window (seconds)
    pub min_interval_secs: u64,
    /// Upper bound of the random trigger window (seconds)
    pub max_interval_secs: u64,
    /// Retry delay when the machine was busy at trigger time (seconds)
    pub retry_backoff_secs: u64,
    /// Asset path or URL for the special interlude
    pub asset: String,
    /// Whether to notify the backend when a special event starts
    pub notify_backend: bool,
}

impl Default for SpecialEventConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: 120,
            max_interval_secs: 300,
            retry_backoff_secs: 30,
            asset: "/static/special/event.mp4".to_string(),
            notify_backend: true,
        }
    }
}

/// Face rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Target frames per second for the face animation
    pub fps: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { fps: 30 }
    }
}

/// External video player configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Program used for fullscreen video playback
    pub video_command: String,
    /// Arguments passed before the asset URL
    pub video_args: Vec<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            video_command: "mpv".to_string(),
            video_args: vec!["--fullscreen".to_string(), "--really-quiet".to_string()],
        }
    }
}

/// Get the path to the config file (~/.emokiosk/config.json)
pub fn get_config_path() -> PathBuf {
    home_dir_or_fallback().join(".emokiosk").join("config.json")
}

/// Get the path to the config directory (~/.emokiosk)
fn get_config_dir() -> PathBuf {
    home_dir_or_fallback().join(".emokiosk")
}

/// Get the home directory, falling back to /tmp if unavailable
fn home_dir_or_fallback() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        tracing::error!("Could not determine home directory, using /tmp");
        PathBuf::from("/tmp")
    })
}

/// Ensure the config directory exists
fn ensure_config_dir() -> anyhow::Result<()> {
    let dir = get_config_dir();
    if !dir.exists() {
        fs::create_dir_all(&dir)?;
    }
    Ok(())
}

/// Load configuration from the given file.
///
/// A missing file yields defaults; an older schema is migrated and the
/// migrated form is written back to the same path.
pub fn load_from_path(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        tracing::info!("Config file not found, using defaults");
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&contents)?;

    let original_version = config.version;
    let migrated = migrate_config(config)?;
    if migrated.version != original_version {
        save_to_path(path, &migrated)?;
    }

    Ok(migrated)
}

/// Save configuration to the given file, creating parent directories.
pub fn save_to_path(path: &Path, config: &Config) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let contents = serde_json::to_string_pretty(config)?;
    fs::write(path, contents)?;

    tracing::info!("Config saved to disk: base_url={}", config.backend.base_url);
    Ok(())
}

/// Load configuration from the default location
fn load_from_disk() -> anyhow::Result<Config> {
    load_from_path(&get_config_path())
}

/// Save configuration to the default location
fn save_to_disk(config: &Config) -> anyhow::Result<()> {
    ensure_config_dir()?;
    save_to_path(&get_config_path(), config)
}

/// Migrate configuration from older schema versions
fn migrate_config(mut config: Config) -> anyhow::Result<Config> {
    let original_version = config.version;

    // Apply migrations sequentially
    while config.version < CURRENT_VERSION {
        config = apply_migration(config)?;
    }

    if config.version != original_version {
        tracing::info!(
            "Migrated config from version {} to {}",
            original_version,
            config.version
        );
    }

    Ok(config)
}

/// Apply a single migration step
fn apply_migration(config: Config) -> anyhow::Result<Config> {
    match config.version {
        // Version 0 -> 1: Initial migration (add any new fields)
        0 => {
            let mut migrated = config;
            migrated.version = 1;
            Ok(migrated)
        }
        v => anyhow::bail!("Unknown config version: {}", v),
    }
}

/// Get the global config instance
fn get_config_instance() -> &'static RwLock<Config> {
    CONFIG.get_or_init(|| {
        let config = load_from_disk().unwrap_or_else(|e| {
            tracing::error!("Failed to load config, using defaults: {}", e);
            Config::default()
        });
        tracing::info!("Config loaded from disk: base_url={}", config.backend.base_url);
        RwLock::new(config)
    })
}

/// Get the current configuration
///
/// The config is cached in memory and loaded from disk on first access.
pub fn get_config() -> Config {
    get_config_instance().read().clone()
}

/// Update the configuration
///
/// Replaces the current configuration with the provided config and persists
/// it to disk. The version field is automatically updated to the current schema.
///
/// The kiosk itself only reads its config; this is the entry point for
/// operator tooling that adjusts a running installation.
pub fn set_config(mut config: Config) -> anyhow::Result<()> {
    config.version = CURRENT_VERSION;

    // Save to disk first
    save_to_disk(&config)?;

    // Update cached config
    let mut cached = get_config_instance().write();
    *cached = config;

    tracing::info!("Configuration updated (base_url: {})", cached.backend.base_url);
    Ok(())
}

/// Reset configuration to defaults
///
/// Resets all settings to their default values and persists to disk. Like
/// [`set_config`], meant for operator tooling rather than the kiosk loop.
pub fn reset_config() -> anyhow::Result<Config> {
    let default_config = Config::default();

    save_to_disk(&default_config)?;

    let mut cached = get_config_instance().write();
    *cached = default_config.clone();

    tracing::info!("Configuration reset to defaults");
    Ok(default_config)
}
