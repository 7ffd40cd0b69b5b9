//! Configuration for tss.
//!
//! Loaded from `~/.config/tss/config.toml` (or `--config <path>`) once
//! privileges have been dropped. Missing keys take their defaults, and
//! command line options override whatever the file says.
//!
//! # Configuration File
//!
//! ```toml
//! # Frame delay in milliseconds
//! delay_ms = 120
//!
//! # Speeds in cells per frame (0.001 - 1.0)
//! object_speed = 1.0
//! uname_speed = 0.5
//! info_speed = 0.1
//!
//! mirror = true
//! scrollbar = false
//! random = false
//!
//! # Fixed art file; otherwise picked from the first readable directory
//! # ascii = "~/.tss/daemon"
//! ascii_dirs = ["/etc/tss/", "~/.tss/"]
//!
//! # Seconds between load average refreshes
//! scroll_interval_secs = 5
//!
//! [lock]
//! timeout_secs = 30
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cli::{Cli, SPEED_RANGE};
use crate::lock::Dropped;
use crate::saver::SaverSettings;

/// System-wide art directory.
pub const SYSTEM_ART_DIR: &str = "/etc/tss/";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Frame delay in milliseconds
    pub delay_ms: u64,
    pub object_speed: f32,
    pub uname_speed: f32,
    pub info_speed: f32,
    /// Mirror the art when it bounces off a side
    pub mirror: bool,
    /// Show the load average box
    pub scrollbar: bool,
    /// Pick a random art file instead of `default`
    pub random: bool,
    pub ascii: Option<PathBuf>,
    /// Art directories, first readable one wins
    pub ascii_dirs: Vec<PathBuf>,
    pub scroll_interval_secs: u64,
    /// Lock settings
    pub lock: LockConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut ascii_dirs = vec![PathBuf::from(SYSTEM_ART_DIR)];
        if let Some(home) = home_dir() {
            ascii_dirs.push(home.join(".tss"));
        }
        Self {
            delay_ms: 120,
            object_speed: 1.0,
            uname_speed: 0.5,
            info_speed: 0.1,
            mirror: true,
            scrollbar: false,
            random: false,
            ascii: None,
            ascii_dirs,
            scroll_interval_secs: 5,
            lock: LockConfig::default(),
        }
    }
}

/// Lock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Seconds allowed to type the password
    pub timeout_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location.
    ///
    /// The file is user controlled, hence the [`Dropped`] token. A missing
    /// file yields the defaults; an unreadable or invalid one is logged and
    /// ignored.
    pub fn load(path: Option<&Path>, _dropped: &Dropped) -> Self {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::default_path) else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return Self::default();
            }
        };
        match Self::from_toml(&content) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Ignoring invalid configuration {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse and sanitize a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: Config = toml::from_str(content)?;
        config.sanitize();
        Ok(config)
    }

    /// `~/.config/tss/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Out-of-range values fall back to their defaults; `~/` is expanded.
    fn sanitize(&mut self) {
        let defaults = Config::default();
        for (name, speed, default) in [
            ("object_speed", &mut self.object_speed, defaults.object_speed),
            ("uname_speed", &mut self.uname_speed, defaults.uname_speed),
            ("info_speed", &mut self.info_speed, defaults.info_speed),
        ] {
            if !SPEED_RANGE.contains(speed) {
                warn!("{} = {} is out of range, using {}", name, speed, default);
                *speed = default;
            }
        }
        if self.lock.timeout_secs == 0 {
            warn!("lock.timeout_secs must be positive, using {}", defaults.lock.timeout_secs);
            self.lock.timeout_secs = defaults.lock.timeout_secs;
        }

        self.ascii = self.ascii.as_deref().map(expand_home);
        self.ascii_dirs = self.ascii_dirs.iter().map(|d| expand_home(d)).collect();
    }

    /// Command line options win over the file.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if cli.no_mirror {
            self.mirror = false;
        }
        if cli.scrollbar {
            self.scrollbar = true;
        }
        if cli.random {
            self.random = true;
        }
        if let Some(delay) = cli.delay {
            self.delay_ms = delay;
        }
        if let Some(ref ascii) = cli.ascii {
            self.ascii = Some(ascii.clone());
        }
        if let Some(speed) = cli.object_speed {
            self.object_speed = speed;
        }
        if let Some(speed) = cli.uname_speed {
            self.uname_speed = speed;
        }
        if let Some(speed) = cli.info_speed {
            self.info_speed = speed;
        }
    }

    pub fn saver_settings(&self) -> SaverSettings {
        SaverSettings {
            delay: Duration::from_millis(self.delay_ms),
            object_speed: self.object_speed,
            uname_speed: self.uname_speed,
            info_speed: self.info_speed,
            mirror: self.mirror,
            scrollbar: self.scrollbar,
            scroll_interval: Duration::from_secs(self.scroll_interval_secs),
        }
    }

    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_secs(self.lock.timeout_secs)
    }
}

/// Per-user directory for configuration and the log file.
pub fn config_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| home_dir().map(|home| home.join(".config")))
        .map(|dir| dir.join("tss"))
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.delay_ms, 120);
        assert_eq!(config.object_speed, 1.0);
        assert_eq!(config.uname_speed, 0.5);
        assert_eq!(config.info_speed, 0.1);
        assert!(config.mirror);
        assert!(!config.scrollbar);
        assert_eq!(config.ascii_dirs[0], PathBuf::from("/etc/tss/"));
        assert_eq!(config.prompt_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml("delay_ms = 50\n[lock]\ntimeout_secs = 10\n").unwrap();
        assert_eq!(config.delay_ms, 50);
        assert_eq!(config.prompt_timeout(), Duration::from_secs(10));
        assert_eq!(config.uname_speed, 0.5);
    }

    #[test]
    fn test_out_of_range_values_fall_back() {
        let config = Config::from_toml("object_speed = 4.0\ninfo_speed = 0.0\n[lock]\ntimeout_secs = 0\n").unwrap();
        assert_eq!(config.object_speed, 1.0);
        assert_eq!(config.info_speed, 0.1);
        assert_eq!(config.lock.timeout_secs, 30);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(Config::from_toml("delay_ms = \"soon\"").is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut config = Config::from_toml("mirror = true\ndelay_ms = 50\n").unwrap();
        let cli = Cli::try_parse_from(["tss", "-n", "-d", "200", "-o", "0.3", "-a", "/tmp/art"]).unwrap();
        config.apply_cli(&cli);

        assert!(!config.mirror);
        assert_eq!(config.delay_ms, 200);
        assert_eq!(config.object_speed, 0.3);
        assert_eq!(config.ascii, Some(PathBuf::from("/tmp/art")));

        let settings = config.saver_settings();
        assert_eq!(settings.delay, Duration::from_millis(200));
        assert!(!settings.mirror);
    }

    #[test]
    fn test_load_reads_given_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "scrollbar = true\n").unwrap();

        let config = Config::load(Some(&path), &Dropped::assume());
        assert!(config.scrollbar);

        fs::write(&path, "scrollbar = [").unwrap();
        let config = Config::load(Some(&path), &Dropped::assume());
        assert!(!config.scrollbar);

        let config = Config::load(Some(&dir.path().join("missing.toml")), &Dropped::assume());
        assert_eq!(config.delay_ms, 120);
    }

    #[test]
    fn test_home_is_expanded() {
        if let Some(home) = home_dir() {
            assert_eq!(expand_home(Path::new("~/.tss")), home.join(".tss"));
        }
        assert_eq!(expand_home(Path::new("/etc/tss")), PathBuf::from("/etc/tss"));
    }
}
