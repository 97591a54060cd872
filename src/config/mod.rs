//! Configuration management.
//!
//! Handles loading and merging of configuration from an optional TOML file
//! and CLI flags, following the same `load` / `default_config` /
//! `validate` / `with_overrides` shape this crate's configuration layer has
//! always used, trimmed to the daemon's actual surface (spec §6).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Daemon configuration: defaulted paths and tunables the CLI surface in
/// spec §6 can override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Virtio serial port device path (`-s`).
    pub virtio_port_path: PathBuf,
    /// Agent-facing stream socket path (`-S`).
    pub agent_socket_path: PathBuf,
    /// uinput device path (`-u`).
    pub uinput_device_path: PathBuf,
    /// Pidfile path, written on daemonize.
    pub pidfile_path: PathBuf,
    /// Don't issue real uinput ioctls (`-f`).
    #[serde(default)]
    pub fake_uinput: bool,
    /// Stay attached to the controlling terminal (`-x`).
    #[serde(default)]
    pub foreground: bool,
    /// Exit after the host channel has been up once and closes (`-o`).
    #[serde(default)]
    pub one_shot: bool,
    /// Disable session-info integration; fall back to connect/disconnect
    /// counting (`-X`).
    #[serde(default)]
    pub disable_session_info: bool,
    /// Debug verbosity, incremented once per `-d`.
    #[serde(default)]
    pub debug_level: u8,
    /// Keep a statically-open, always-on tablet (never destroyed by the
    /// coupler); mirrors the original's `WITH_STATIC_UINPUT` build flag.
    #[serde(default)]
    pub static_tablet: bool,
    /// Where to persist the host's last `MONITORS_CONFIG` as a plain-text
    /// display-config file (spec §4.3, §6). `None` disables the write.
    #[serde(default)]
    pub display_config_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("failed to read config file: {path}"))?;
        let config: Config = toml::from_str(&content).context("failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// The daemon's built-in defaults (spec §6's implied defaults).
    pub fn default_config() -> Result<Self> {
        Ok(Self {
            virtio_port_path: PathBuf::from("/dev/virtio-ports/com.redhat.guestrelay.0"),
            agent_socket_path: PathBuf::from("/run/guestrelayd/agent.sock"),
            uinput_device_path: PathBuf::from("/dev/uinput"),
            pidfile_path: PathBuf::from("/run/guestrelayd.pid"),
            fake_uinput: false,
            foreground: false,
            one_shot: false,
            disable_session_info: false,
            debug_level: 0,
            static_tablet: false,
            display_config_path: Some(PathBuf::from("/run/guestrelayd/display.conf")),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.agent_socket_path.as_os_str().is_empty() {
            anyhow::bail!("agent_socket_path must not be empty");
        }
        if self.virtio_port_path.as_os_str().is_empty() {
            anyhow::bail!("virtio_port_path must not be empty");
        }
        Ok(())
    }

    /// Apply CLI overrides on top of a loaded (or default) config.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(mut self, overrides: CliOverrides) -> Self {
        if let Some(path) = overrides.virtio_port_path {
            self.virtio_port_path = path;
        }
        if let Some(path) = overrides.agent_socket_path {
            self.agent_socket_path = path;
        }
        if let Some(path) = overrides.uinput_device_path {
            self.uinput_device_path = path;
        }
        if overrides.fake_uinput {
            self.fake_uinput = true;
        }
        if overrides.foreground {
            self.foreground = true;
        }
        if overrides.one_shot {
            self.one_shot = true;
        }
        if overrides.disable_session_info {
            self.disable_session_info = true;
        }
        self.debug_level = self.debug_level.saturating_add(overrides.debug_level);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config().expect("default config must be internally consistent")
    }
}

/// Overrides parsed from CLI flags, applied over a loaded/default [`Config`].
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub virtio_port_path: Option<PathBuf>,
    pub agent_socket_path: Option<PathBuf>,
    pub uinput_device_path: Option<PathBuf>,
    pub fake_uinput: bool,
    pub foreground: bool,
    pub one_shot: bool,
    pub disable_session_info: bool,
    pub debug_level: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default_config().unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let config = Config::default_config().unwrap();
        let overrides = CliOverrides {
            fake_uinput: true,
            debug_level: 2,
            ..Default::default()
        };
        let config = config.with_overrides(overrides);
        assert!(config.fake_uinput);
        assert_eq!(config.debug_level, 2);
    }

    #[test]
    fn rejects_empty_socket_path() {
        let mut config = Config::default_config().unwrap();
        config.agent_socket_path = PathBuf::new();
        assert!(config.validate().is_err());
    }
}
