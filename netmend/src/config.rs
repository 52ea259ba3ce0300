//! Reconciliation configuration.
//!
//! Everything that used to be a literal in the reconciliation loop lives
//! here: per-device-class timing, settle periods after reload and boot, the
//! prompts that end a command, the category matchers, and the device list.
//!
//! ```toml
//! artifacts_dir = "captures"
//! cycle_timeout_secs = 900
//!
//! [profiles.iosv]
//! reload_settle_secs = 70
//!
//! [[devices]]
//! name = "IOU1"
//! host = "92.81.55.146"
//! port = 5021
//! class = "iou"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::diff::CategoryRules;
use crate::error::{ConfigError, Result};

/// Timing policy for one conversation.
///
/// The settle delays are the minimum wait before probing a device that
/// gives no reliable completion marker; every blocking read additionally
/// carries its own deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingProfile {
    /// Wait before probing after a wizard or capture step.
    pub settle_ms: u64,

    /// Wait after each replayed configuration command.
    pub command_settle_ms: u64,

    /// Wait after wizard answers that trigger slow work on the device.
    pub long_settle_ms: u64,

    /// Upper bound on a single probe read.
    pub probe_timeout_ms: u64,

    /// Upper bound on a read-until-prompt.
    pub read_timeout_ms: u64,

    /// How many unrecognized outputs a wizard state tolerates.
    pub max_unrecognized: usize,

    /// Bytes from the end of the output searched for prompts.
    pub search_depth: usize,
}

impl TimingProfile {
    /// Zero-delay profile for scripted sessions.
    pub fn immediate() -> Self {
        Self {
            settle_ms: 0,
            command_settle_ms: 0,
            long_settle_ms: 0,
            probe_timeout_ms: 0,
            read_timeout_ms: 0,
            ..Self::default()
        }
    }

    /// Settle delay as a [`Duration`].
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Per-command settle delay as a [`Duration`].
    pub fn command_settle(&self) -> Duration {
        Duration::from_millis(self.command_settle_ms)
    }

    /// Long settle delay as a [`Duration`].
    pub fn long_settle(&self) -> Duration {
        Duration::from_millis(self.long_settle_ms)
    }

    /// Probe read bound as a [`Duration`].
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Read-until bound as a [`Duration`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for TimingProfile {
    fn default() -> Self {
        Self {
            settle_ms: 2_000,
            command_settle_ms: 300,
            long_settle_ms: 15_000,
            probe_timeout_ms: 1_000,
            read_timeout_ms: 30_000,
            max_unrecognized: 30,
            search_depth: 1000,
        }
    }
}

/// Constants for one class of device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceProfile {
    /// Wait after answering the reload prompts.
    pub reload_settle_secs: u64,

    /// Wait after the first-boot dialog before the device is usable.
    pub boot_settle_secs: u64,

    /// Wait before reconnecting after a reload.
    pub reconnect_delay_secs: u64,

    /// Read budget for one `show running-config`.
    pub capture_read_bytes: usize,

    /// Prompt that ends a global configuration command.
    pub config_prompt: String,

    /// Read budget for the echo of one command inside a block.
    pub echo_read_bytes: usize,

    /// Conversation timing.
    pub timing: TimingProfile,
}

impl DeviceProfile {
    /// Reload settle as a [`Duration`].
    pub fn reload_settle(&self) -> Duration {
        Duration::from_secs(self.reload_settle_secs)
    }

    /// Boot settle as a [`Duration`].
    pub fn boot_settle(&self) -> Duration {
        Duration::from_secs(self.boot_settle_secs)
    }

    /// Reconnect delay as a [`Duration`].
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// Profile with every wait set to zero.
    pub fn immediate() -> Self {
        Self {
            reload_settle_secs: 0,
            boot_settle_secs: 0,
            reconnect_delay_secs: 0,
            timing: TimingProfile::immediate(),
            ..Self::default()
        }
    }
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            reload_settle_secs: 20,
            boot_settle_secs: 30,
            reconnect_delay_secs: 5,
            capture_read_bytes: 50_000,
            config_prompt: String::from("(config)#"),
            echo_read_bytes: 1000,
            timing: TimingProfile::default(),
        }
    }
}

/// Identity of one device, supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Name used in logs and artifact file names.
    pub name: String,

    /// Console server host.
    pub host: String,

    /// Console port.
    pub port: u16,

    /// Device class, a key of [`ReconcileConfig::profiles`].
    #[serde(default = "default_class")]
    pub class: String,

    /// Extra category matchers for this device only.
    #[serde(default)]
    pub categories: Option<CategoryRules>,
}

fn default_class() -> String {
    String::from("iou")
}

impl DeviceDescriptor {
    /// Describe a device of the default class.
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            class: default_class(),
            categories: None,
        }
    }

    /// Set the device class.
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = class.into();
        self
    }
}

/// Top-level reconciliation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Where capture artifacts are written; `None` keeps everything in memory.
    pub artifacts_dir: Option<PathBuf>,

    /// Deadline for one device's whole cycle.
    pub cycle_timeout_secs: Option<u64>,

    /// Device-class profiles. A profile read from a file is layered over
    /// the built-in profile of the same name, field by field.
    #[serde(deserialize_with = "deserialize_profiles")]
    pub profiles: IndexMap<String, DeviceProfile>,

    /// Category matchers shared by all devices.
    pub categories: CategoryRules,

    /// Devices to reconcile.
    pub devices: Vec<DeviceDescriptor>,
}

impl ReconcileConfig {
    /// Parse a TOML document. Built-in profiles are kept, and any field a
    /// document sets for one of them replaces only that field.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ReconcileConfig = toml::from_str(text).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check that every device names a known profile.
    pub fn validate(&self) -> Result<()> {
        for device in &self.devices {
            self.profile_for(device)?;
        }
        Ok(())
    }

    /// The profile of `device`'s class.
    pub fn profile_for(&self, device: &DeviceDescriptor) -> Result<&DeviceProfile> {
        self.profiles.get(&device.class).ok_or_else(|| {
            ConfigError::UnknownProfile {
                device: device.name.clone(),
                class: device.class.clone(),
            }
            .into()
        })
    }

    /// Category matchers for `device`: shared rules plus its own extras.
    pub fn categories_for(&self, device: &DeviceDescriptor) -> CategoryRules {
        match &device.categories {
            Some(extra) => self.categories.merged(extra),
            None => self.categories.clone(),
        }
    }

    /// Cycle deadline as a [`Duration`].
    pub fn cycle_timeout(&self) -> Option<Duration> {
        self.cycle_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: None,
            cycle_timeout_secs: None,
            profiles: builtin_profiles(),
            categories: CategoryRules::default(),
            devices: Vec::new(),
        }
    }
}

/// `iou` and `iosv` profiles. IOSv takes noticeably longer to come back
/// from a reload.
fn builtin_profiles() -> IndexMap<String, DeviceProfile> {
    let mut profiles = IndexMap::new();
    profiles.insert(String::from("iou"), DeviceProfile::default());
    profiles.insert(
        String::from("iosv"),
        DeviceProfile {
            reload_settle_secs: 70,
            ..DeviceProfile::default()
        },
    );
    profiles
}

/// Read `profiles` as partial tables and layer each over its built-in
/// profile, or over [`DeviceProfile::default`] for a new class.
fn deserialize_profiles<'de, D>(
    deserializer: D,
) -> std::result::Result<IndexMap<String, DeviceProfile>, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = IndexMap::<String, toml::Table>::deserialize(deserializer)?;
    let mut profiles = builtin_profiles();
    for (name, overlay) in overrides {
        let base = profiles.get(&name).cloned().unwrap_or_default();
        let profile = layer_profile(&base, overlay)
            .map_err(|e| D::Error::custom(format!("profile '{}': {}", name, e)))?;
        profiles.insert(name, profile);
    }
    Ok(profiles)
}

fn layer_profile(
    base: &DeviceProfile,
    overlay: toml::Table,
) -> std::result::Result<DeviceProfile, String> {
    let mut table = match toml::Value::try_from(base).map_err(|e| e.to_string())? {
        toml::Value::Table(table) => table,
        _ => return Err(String::from("profile is not a table")),
    };
    merge_tables(&mut table, overlay);
    toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| e.to_string())
}

/// Overwrite `base` with `overlay`, descending into nested tables.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(inner)), toml::Value::Table(nested)) => {
                merge_tables(inner, nested)
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::Category;

    #[test]
    fn test_default_profiles() {
        let config = ReconcileConfig::default();
        assert_eq!(config.profiles["iou"].reload_settle_secs, 20);
        assert_eq!(config.profiles["iosv"].reload_settle_secs, 70);
        assert_eq!(config.profiles["iou"].config_prompt, "(config)#");
    }

    #[test]
    fn test_parse_devices_and_overrides() {
        let config = ReconcileConfig::from_toml_str(
            r#"
            artifacts_dir = "captures"
            cycle_timeout_secs = 600

            [profiles.iosv]
            reload_settle_secs = 90

            [profiles.iosv.timing]
            command_settle_ms = 100

            [[devices]]
            name = "IOU1"
            host = "10.0.0.1"
            port = 5021

            [[devices]]
            name = "IOSv"
            host = "10.0.0.1"
            port = 5012
            class = "iosv"
            "#,
        )
        .unwrap();

        assert_eq!(config.artifacts_dir, Some(PathBuf::from("captures")));
        assert_eq!(config.cycle_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.devices[0].class, "iou");

        let iosv = config.profile_for(&config.devices[1]).unwrap();
        assert_eq!(iosv.reload_settle_secs, 90);
        assert_eq!(iosv.timing.command_settle_ms, 100);
        // Unspecified fields keep their defaults
        assert_eq!(iosv.timing.settle_ms, 2_000);
        assert_eq!(iosv.boot_settle_secs, 30);

        // Built-in profile still present
        assert!(config.profiles.contains_key("iou"));
    }

    #[test]
    fn test_partial_override_keeps_builtin_values() {
        let config = ReconcileConfig::from_toml_str(
            r#"
            [profiles.iosv]
            boot_settle_secs = 10

            [profiles.iosv.timing]
            settle_ms = 500
            "#,
        )
        .unwrap();

        let iosv = &config.profiles["iosv"];
        assert_eq!(iosv.boot_settle_secs, 10);
        assert_eq!(iosv.reload_settle_secs, 70);
        assert_eq!(iosv.timing.settle_ms, 500);
        assert_eq!(iosv.timing.read_timeout_ms, 30_000);
        assert_eq!(config.profiles["iou"], DeviceProfile::default());
    }

    #[test]
    fn test_new_class_starts_from_defaults() {
        let config = ReconcileConfig::from_toml_str(
            r#"
            [profiles.csr]
            reload_settle_secs = 120
            "#,
        )
        .unwrap();

        let csr = &config.profiles["csr"];
        assert_eq!(csr.reload_settle_secs, 120);
        assert_eq!(csr.boot_settle_secs, 30);
        assert_eq!(config.profiles.len(), 3);
    }

    #[test]
    fn test_bad_profile_value_is_parse_error() {
        let err = ReconcileConfig::from_toml_str("[profiles.iosv]\nreload_settle_secs = \"slow\"\n")
            .unwrap_err();
        assert!(matches!(err, crate::Error::Config(ConfigError::Parse(_))));
        assert!(err.to_string().contains("iosv"));
    }

    #[test]
    fn test_unknown_class_is_rejected() {
        let err = ReconcileConfig::from_toml_str(
            r#"
            [[devices]]
            name = "R9"
            host = "10.0.0.9"
            port = 23
            class = "nexus"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("nexus"));
    }

    #[test]
    fn test_device_category_extras() {
        let config = ReconcileConfig::from_toml_str(
            r#"
            [[devices]]
            name = "IOU1"
            host = "10.0.0.1"
            port = 5021

            [devices.categories]
            line = ["line aux"]
            "#,
        )
        .unwrap();

        let rules = config.categories_for(&config.devices[0]);
        assert_eq!(rules.classify("line aux 0"), Some(Category::Line));
        assert_eq!(rules.classify("line vty 0 4"), Some(Category::Line));
    }

    #[test]
    fn test_malformed_toml() {
        let err = ReconcileConfig::from_toml_str("devices = 3").unwrap_err();
        assert!(matches!(err, crate::Error::Config(ConfigError::Parse(_))));
    }
}
