//! Configuration management for patchbay
//!
//! Handles loading, parsing, validation and hot-reloading of the YAML
//! configuration file.

pub mod watcher;

use crate::group::{GridLayout, SnapRules};
use crate::state::ChannelPreset;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tokio::fs;

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub mixer: MixerConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    /// Applied once at startup, in one batch
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub presets: Vec<ChannelPreset>,
}

/// Which gain backend drives the hardware
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process model, no hardware
    #[default]
    Memory,
    /// ALSA simple controls through the `amixer` utility
    Amixer,
}

/// Gain backend configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
    /// ALSA card index (amixer only)
    #[serde(default = "default_card")]
    pub card: u32,
    /// Seed inventory for the memory backend
    #[serde(default)]
    pub controls: Vec<ControlSeed>,
    /// Bound on one amixer invocation
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Memory,
            card: default_card(),
            controls: default_controls(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl BackendConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// One memory-backend control and its starting level
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ControlSeed {
    pub name: String,
    #[serde(default)]
    pub level: u8,
}

/// Mute/solo state machine configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MixerConfig {
    /// Control-name prefixes classified as output channels
    #[serde(default = "default_output_prefixes")]
    pub output_prefixes: Vec<String>,
    #[serde(default = "default_flash_interval_ms")]
    pub flash_interval_ms: u64,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            output_prefixes: default_output_prefixes(),
            flash_interval_ms: default_flash_interval_ms(),
        }
    }
}

impl MixerConfig {
    pub fn flash_interval(&self) -> Duration {
        Duration::from_millis(self.flash_interval_ms)
    }
}

/// Hardware level poller configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PollerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    /// Controls to watch; empty watches every control
    #[serde(default)]
    pub watch: Vec<String>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_poll_interval_ms(),
            watch: Vec::new(),
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Patch surface geometry and snapping
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LayoutConfig {
    #[serde(default = "default_block_width")]
    pub block_width: f64,
    #[serde(default = "default_block_height")]
    pub block_height: f64,
    #[serde(default = "default_columns")]
    pub columns: usize,
    #[serde(default = "default_spacing")]
    pub spacing: f64,
    /// Largest gap between touching edges
    #[serde(default = "default_one")]
    pub snap_tolerance: f64,
    /// Smallest shared span along the touching edge
    #[serde(default = "default_one")]
    pub min_overlap: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            block_width: default_block_width(),
            block_height: default_block_height(),
            columns: default_columns(),
            spacing: default_spacing(),
            snap_tolerance: default_one(),
            min_overlap: default_one(),
        }
    }
}

impl LayoutConfig {
    pub fn grid(&self) -> GridLayout {
        GridLayout {
            block_width: self.block_width,
            block_height: self.block_height,
            columns: self.columns,
            spacing: self.spacing,
        }
    }

    pub fn snap_rules(&self) -> SnapRules {
        SnapRules {
            tolerance: self.snap_tolerance,
            min_overlap: self.min_overlap,
        }
    }
}

/// Poll interval bounds (milliseconds)
pub const MIN_POLL_INTERVAL_MS: u64 = 50;
pub const MAX_POLL_INTERVAL_MS: u64 = 10_000;

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file: {}", path))?;

        Ok(config)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        // Backend
        if self.backend.kind == BackendKind::Memory {
            let mut seen = HashSet::new();
            for seed in &self.backend.controls {
                if seed.name.trim().is_empty() {
                    anyhow::bail!("Memory backend control name cannot be empty");
                }
                if !seen.insert(seed.name.as_str()) {
                    anyhow::bail!("Duplicate memory backend control '{}'", seed.name);
                }
                if seed.level > 100 {
                    anyhow::bail!(
                        "Control '{}' has invalid level {} (must be 0-100)",
                        seed.name,
                        seed.level
                    );
                }
            }
        }

        if self.backend.command_timeout_ms == 0 {
            anyhow::bail!("backend.command_timeout_ms must be greater than 0");
        }

        // Mixer
        if self.mixer.output_prefixes.iter().any(|p| p.is_empty()) {
            anyhow::bail!("Output prefixes cannot be empty strings");
        }
        if self.mixer.flash_interval_ms == 0 {
            anyhow::bail!("mixer.flash_interval_ms must be greater than 0");
        }

        // Poller
        if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&self.poller.interval_ms) {
            anyhow::bail!(
                "poller.interval_ms {} is out of range ({}-{})",
                self.poller.interval_ms,
                MIN_POLL_INTERVAL_MS,
                MAX_POLL_INTERVAL_MS
            );
        }

        // Layout
        let layout = &self.layout;
        if !(layout.block_width > 0.0 && layout.block_height > 0.0) {
            anyhow::bail!("Block width and height must be greater than 0");
        }
        if layout.columns == 0 {
            anyhow::bail!("layout.columns must be at least 1");
        }
        if !(layout.spacing >= 0.0) {
            anyhow::bail!("layout.spacing cannot be negative");
        }
        if !(layout.snap_tolerance >= 0.0) {
            anyhow::bail!("layout.snap_tolerance cannot be negative");
        }
        if !(layout.min_overlap >= 0.0) {
            anyhow::bail!("layout.min_overlap cannot be negative");
        }

        // Presets
        for preset in &self.presets {
            if preset.name.is_empty() {
                anyhow::bail!("Preset channel name cannot be empty");
            }
            if let Some(level) = preset.level {
                if level > 100 {
                    anyhow::bail!(
                        "Preset '{}' has invalid level {} (must be 0-100)",
                        preset.name,
                        level
                    );
                }
            }
        }

        Ok(())
    }

    /// Whether moving from `self` to `other` touches settings that only take
    /// effect on restart (backend, poller, output classification, grid)
    pub fn restart_required(&self, other: &AppConfig) -> bool {
        self.backend != other.backend
            || self.poller != other.poller
            || self.mixer.output_prefixes != other.mixer.output_prefixes
            || self.layout.grid() != other.layout.grid()
    }
}

// Default value functions
fn default_card() -> u32 { 1 }
fn default_command_timeout_ms() -> u64 { 2000 }
fn default_true() -> bool { true }
fn default_output_prefixes() -> Vec<String> { vec!["Main-Out".to_string()] }
fn default_flash_interval_ms() -> u64 { 250 }
fn default_poll_interval_ms() -> u64 { 400 }
fn default_block_width() -> f64 { 120.0 }
fn default_block_height() -> f64 { 300.0 }
fn default_columns() -> usize { 8 }
fn default_spacing() -> f64 { 20.0 }
fn default_one() -> f64 { 1.0 }

fn default_controls() -> Vec<ControlSeed> {
    [
        ("Mic-AN1", 80),
        ("Mic-AN2", 40),
        ("PCM-AN1-AN1", 70),
        ("PCM-AN2-AN2", 70),
        ("Main-Out AN1", 90),
        ("Main-Out AN2", 90),
    ]
    .into_iter()
    .map(|(name, level)| ControlSeed {
        name: name.to_string(),
        level,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FULL: &str = r#"
backend:
  kind: amixer
  card: 2
mixer:
  output_prefixes: ["Main-Out", "Line-Out"]
  flash_interval_ms: 300
poller:
  enabled: false
  interval_ms: 500
  watch: ["Mic-AN1"]
layout:
  block_width: 100
  block_height: 250
  columns: 4
  spacing: 10
  snap_tolerance: 2.5
  min_overlap: 5
presets:
  - { name: "Mic-AN1", level: 60, muted: true }
"#;

    #[test]
    fn test_parse_full_config() {
        let config = AppConfig::from_yaml(FULL).unwrap();
        assert_eq!(config.backend.kind, BackendKind::Amixer);
        assert_eq!(config.backend.card, 2);
        assert!(config.backend.controls.is_empty());
        assert_eq!(config.backend.command_timeout(), Duration::from_millis(2000));
        assert_eq!(config.mixer.output_prefixes.len(), 2);
        assert_eq!(config.mixer.flash_interval(), Duration::from_millis(300));
        assert!(!config.poller.enabled);
        assert_eq!(config.poller.watch, vec!["Mic-AN1".to_string()]);
        assert_eq!(config.layout.grid().columns, 4);
        assert_eq!(
            config.layout.snap_rules(),
            SnapRules {
                tolerance: 2.5,
                min_overlap: 5.0
            }
        );
        assert_eq!(config.presets[0].level, Some(60));
        assert!(config.presets[0].muted);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::from_yaml("{}").unwrap();
        assert_eq!(config.backend.kind, BackendKind::Memory);
        assert_eq!(config.mixer.output_prefixes, vec!["Main-Out".to_string()]);
        assert_eq!(config.mixer.flash_interval_ms, 250);
        assert_eq!(config.poller.interval_ms, 400);
        assert_eq!(config.layout, LayoutConfig::default());
        assert!(config.presets.is_empty());
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.backend.controls.len(), 6);
    }

    #[test]
    fn test_validation_failures() {
        let cases = [
            "poller: { interval_ms: 10 }",
            "poller: { interval_ms: 60000 }",
            "mixer: { flash_interval_ms: 0 }",
            "mixer: { output_prefixes: [\"\"] }",
            "layout: { columns: 0 }",
            "layout: { block_width: 0 }",
            "layout: { snap_tolerance: -1 }",
            "backend: { controls: [{ name: A }, { name: A }] }",
            "backend: { controls: [{ name: A, level: 101 }] }",
            "presets: [{ name: A, level: 150 }]",
            "backend: { kind: amixer, command_timeout_ms: 0 }",
        ];
        for case in cases {
            assert!(AppConfig::from_yaml(case).is_err(), "accepted: {}", case);
        }
    }

    #[test]
    fn test_restart_required() {
        let base = AppConfig::default();

        let mut live = base.clone();
        live.layout.snap_tolerance = 3.0;
        live.mixer.flash_interval_ms = 100;
        assert!(!base.restart_required(&live));

        let mut restart = base.clone();
        restart.poller.interval_ms = 1000;
        assert!(base.restart_required(&restart));

        let mut restart = base.clone();
        restart.layout.columns = 2;
        assert!(base.restart_required(&restart));
    }

    #[tokio::test]
    async fn test_load_and_save() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("patchbay.yaml");
        let path = path.to_string_lossy().to_string();

        assert!(AppConfig::load(&path).await.is_err());

        let config = AppConfig::from_yaml(FULL)?;
        config.save(&path).await?;
        let loaded = AppConfig::load(&path).await?;
        assert_eq!(loaded, config);

        Ok(())
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = AppConfig::from_yaml(include_str!("../patchbay.example.yaml")).unwrap();
        assert_eq!(config.backend.controls.len(), 6);
        assert_eq!(config.presets.len(), 1);
        assert!(config.presets[0].muted);
        assert_eq!(config.presets[0].level, None);
        assert!(!config.restart_required(&AppConfig::default()));
    }
}
