use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::logging::LogLevel;

pub const ENV_DATA: &str = "GOSSIP_TOMOGRAPHY_DATA";
pub const ENV_SPEED: &str = "GOSSIP_TOMOGRAPHY_SPEED";
pub const ENV_CANVAS: &str = "GOSSIP_TOMOGRAPHY_CANVAS";
pub const ENV_LOG: &str = "GOSSIP_TOMOGRAPHY_LOG";
pub const ENV_DERIVE_LEAKS: &str = "GOSSIP_TOMOGRAPHY_DERIVE_LEAKS";

/// Top-level dashboard configuration
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    pub source: DataSource,
    pub fetch: FetchPolicy,
    pub canvas: CanvasSize,
    pub replay: ReplayPolicy,
    pub leaks: LeakPolicy,
    pub log_level: LogLevel,
    /// Message to replay once the snapshot is loaded (binary only).
    pub replay_message: Option<String>,
}

impl DashboardConfig {
    /// Snapshot in `./data`, default canvas and real-time replay
    pub fn local_snapshot() -> Self {
        Self {
            source: DataSource::Directory(PathBuf::from("data")),
            fetch: FetchPolicy::default(),
            canvas: CanvasSize::default(),
            replay: ReplayPolicy::default(),
            leaks: LeakPolicy::default(),
            log_level: LogLevel::default(),
            replay_message: None,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from any key lookup, so tests need not touch
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::local_snapshot();
        if let Some(data) = lookup(ENV_DATA) {
            config.source = DataSource::parse(&data);
        }
        if let Some(speed) = lookup(ENV_SPEED) {
            config.replay.speed = parse_speed(ENV_SPEED, &speed)?;
        }
        if let Some(canvas) = lookup(ENV_CANVAS) {
            config.canvas = CanvasSize::parse(&canvas).ok_or_else(|| invalid(ENV_CANVAS, &canvas))?;
        }
        if let Some(level) = lookup(ENV_LOG) {
            config.log_level = LogLevel::parse(&level).ok_or_else(|| invalid(ENV_LOG, &level))?;
        }
        if let Some(flag) = lookup(ENV_DERIVE_LEAKS) {
            config.leaks.derive_when_missing = parse_flag(ENV_DERIVE_LEAKS, &flag)?;
        }
        Ok(config)
    }

    /// Applies command-line flags on top of `self`.
    pub fn with_args<I>(mut self, args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--data" => {
                    let value = next_value(&mut args, "--data")?;
                    self.source = DataSource::parse(&value);
                }
                "--speed" => {
                    let value = next_value(&mut args, "--speed")?;
                    self.replay.speed = parse_speed("--speed", &value)?;
                }
                "--canvas" => {
                    let value = next_value(&mut args, "--canvas")?;
                    self.canvas = CanvasSize::parse(&value).ok_or_else(|| invalid("--canvas", &value))?;
                }
                "--log" => {
                    let value = next_value(&mut args, "--log")?;
                    self.log_level = LogLevel::parse(&value).ok_or_else(|| invalid("--log", &value))?;
                }
                "--replay" => {
                    self.replay_message = Some(next_value(&mut args, "--replay")?);
                }
                "--derive-leaks" => self.leaks.derive_when_missing = true,
                other => return Err(invalid("argument", other)),
            }
        }
        Ok(self)
    }

    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        Self::from_env()?.with_args(args)
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self::local_snapshot()
    }
}

/// Where the seven snapshot resources live
#[derive(Debug, Clone, PartialEq)]
pub enum DataSource {
    Directory(PathBuf),
    Http { base_url: String },
}

impl DataSource {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.starts_with("http://") || value.starts_with("https://") {
            DataSource::Http {
                base_url: value.to_string(),
            }
        } else {
            DataSource::Directory(PathBuf::from(value))
        }
    }
}

/// Per-request timeout and retry budget for HTTP sources
#[derive(Debug, Clone, PartialEq)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub attempts: u32,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            attempts: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

impl CanvasSize {
    /// Parses `WIDTHxHEIGHT`, e.g. `1200x800`.
    pub fn parse(value: &str) -> Option<Self> {
        let (w, h) = value.trim().split_once(['x', 'X'])?;
        let width: f64 = w.trim().parse().ok()?;
        let height: f64 = h.trim().parse().ok()?;
        if width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0 {
            Some(Self { width, height })
        } else {
            None
        }
    }
}

impl Default for CanvasSize {
    fn default() -> Self {
        Self {
            width: 1200.0,
            height: 800.0,
        }
    }
}

/// Replay clock tuning
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayPolicy {
    pub speed: f64,
    pub frame_interval: Duration,
    /// Playback keeps running this long past the spread before completing.
    pub completion_tail_ms: f64,
    /// A lit peer's glow fades to zero over this window.
    pub fade_window_ms: f64,
}

impl Default for ReplayPolicy {
    fn default() -> Self {
        Self {
            speed: 1.0,
            frame_interval: Duration::from_millis(16),
            completion_tail_ms: 500.0,
            fade_window_ms: 2000.0,
        }
    }
}

impl ReplayPolicy {
    /// Wall-clock time a full playback of `spread_ms` should take, plus
    /// `grace`. `None` when the clock would never reach the end.
    pub fn playback_budget(&self, spread_ms: f64, grace: Duration) -> Option<Duration> {
        if self.speed.is_nan() || self.speed <= 0.0 {
            return None;
        }
        let secs = (spread_ms.max(0.0) + self.completion_tail_ms.max(0.0)) / self.speed / 1000.0;
        let wall = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
        Some(wall.saturating_add(grace))
    }
}

/// Leak records are pre-computed upstream; re-deriving them is opt-in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeakPolicy {
    pub derive_when_missing: bool,
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn next_value<I: Iterator<Item = String>>(args: &mut I, flag: &str) -> Result<String, ConfigError> {
    args.next().ok_or_else(|| ConfigError::MissingValue(flag.to_string()))
}

fn parse_speed(key: &str, value: &str) -> Result<f64, ConfigError> {
    match value.trim().parse::<f64>() {
        Ok(speed) if speed.is_finite() => Ok(speed),
        _ => Err(invalid(key, value)),
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = DashboardConfig::default();
        assert_eq!(config.source, DataSource::Directory(PathBuf::from("data")));
        assert_eq!(config.fetch.attempts, 2);
        assert_eq!(config.canvas, CanvasSize { width: 1200.0, height: 800.0 });
        assert_eq!(config.replay.speed, 1.0);
        assert_eq!(config.replay.completion_tail_ms, 500.0);
        assert!(!config.leaks.derive_when_missing);
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = DashboardConfig::from_lookup(lookup(&[
            (ENV_DATA, "https://example.org/snapshot"),
            (ENV_SPEED, "4"),
            (ENV_CANVAS, "800x600"),
            (ENV_LOG, "debug"),
            (ENV_DERIVE_LEAKS, "yes"),
        ]))
        .unwrap();
        assert_eq!(
            config.source,
            DataSource::Http {
                base_url: "https://example.org/snapshot".to_string()
            }
        );
        assert_eq!(config.replay.speed, 4.0);
        assert_eq!(config.canvas.width, 800.0);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert!(config.leaks.derive_when_missing);
    }

    #[test]
    fn speed_must_be_finite_but_is_otherwise_unchecked() {
        assert!(DashboardConfig::from_lookup(lookup(&[(ENV_SPEED, "NaN")])).is_err());
        assert!(DashboardConfig::from_lookup(lookup(&[(ENV_SPEED, "fast")])).is_err());
        let config = DashboardConfig::from_lookup(lookup(&[(ENV_SPEED, "0.25")])).unwrap();
        assert_eq!(config.replay.speed, 0.25);
    }

    #[test]
    fn playback_budget_requires_a_forward_clock() {
        let grace = Duration::from_secs(1);
        let mut policy = ReplayPolicy::default();
        assert_eq!(policy.playback_budget(1000.0, grace), Some(Duration::from_millis(2500)));

        policy.speed = 4.0;
        assert_eq!(policy.playback_budget(1500.0, grace), Some(Duration::from_millis(1500)));

        policy.speed = 0.0;
        assert_eq!(policy.playback_budget(1000.0, grace), None);
        policy.speed = -2.0;
        assert_eq!(policy.playback_budget(1000.0, grace), None);

        policy.speed = 1e-300;
        assert_eq!(policy.playback_budget(1000.0, grace), Some(Duration::MAX));
    }

    #[test]
    fn arguments_apply_on_top() {
        let config = DashboardConfig::default()
            .with_args(args(&["--data", "/srv/snap", "--canvas", "640X480", "--derive-leaks", "--replay", "abc"]))
            .unwrap();
        assert_eq!(config.source, DataSource::Directory(PathBuf::from("/srv/snap")));
        assert_eq!(config.canvas, CanvasSize { width: 640.0, height: 480.0 });
        assert!(config.leaks.derive_when_missing);
        assert_eq!(config.replay_message.as_deref(), Some("abc"));
    }

    #[test]
    fn bad_arguments_are_reported() {
        assert_eq!(
            DashboardConfig::default().with_args(args(&["--speed"])),
            Err(ConfigError::MissingValue("--speed".to_string()))
        );
        assert!(DashboardConfig::default().with_args(args(&["--canvas", "wide"])).is_err());
        assert!(DashboardConfig::default().with_args(args(&["--bogus"])).is_err());
    }
}
