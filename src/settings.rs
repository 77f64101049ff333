//! Per-invocation settings, built once from the command line and passed down.

use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_STATE_FILENAME: &str = "terraform.tfstate";
pub const DEFAULT_BACKUP_EXTENSION: &str = ".backup";
pub const DEFAULT_PARALLELISM: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BackupPolicy {
    /// State-out path with `.backup` appended.
    #[default]
    Default,
    Path(PathBuf),
    Disabled,
}

impl BackupPolicy {
    /// `-` disables backups, anything else is a path.
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            None | Some("") => BackupPolicy::Default,
            Some("-") => BackupPolicy::Disabled,
            Some(path) => BackupPolicy::Path(PathBuf::from(path)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub config_dir: PathBuf,
    /// Explicit `--state`; `None` defers to the backend block, then the default file.
    pub state_path: Option<PathBuf>,
    pub state_out_path: Option<PathBuf>,
    pub backup: BackupPolicy,
    pub lock: bool,
    pub lock_timeout: Duration,
    /// `--provider` override, e.g. `cloudflare.staging`.
    pub provider: Option<String>,
    pub parallelism: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("."),
            state_path: None,
            state_out_path: None,
            backup: BackupPolicy::Default,
            lock: true,
            lock_timeout: Duration::ZERO,
            provider: None,
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

impl Settings {
    /// Path state is read from, given the local backend's configured path (if any).
    pub fn state_path_or(&self, configured: Option<&Path>) -> PathBuf {
        self.state_path
            .clone()
            .or_else(|| configured.map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILENAME))
    }

    pub fn state_out_path_or(&self, configured: Option<&Path>) -> PathBuf {
        self.state_out_path
            .clone()
            .unwrap_or_else(|| self.state_path_or(configured))
    }

    pub fn backup_path_or(&self, configured: Option<&Path>) -> Option<PathBuf> {
        match &self.backup {
            BackupPolicy::Disabled => None,
            BackupPolicy::Path(path) => Some(path.clone()),
            BackupPolicy::Default => {
                let mut out = self.state_out_path_or(configured).into_os_string();
                out.push(DEFAULT_BACKUP_EXTENSION);
                Some(PathBuf::from(out))
            }
        }
    }
}

/// Parses durations such as `0`, `250ms`, `10s`, `1m30s` or `2h`.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }
    if input == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("missing unit in duration {:?}", input))?;
        if digits_end == 0 {
            return Err(format!("invalid duration {:?}", input));
        }
        let value: u64 = rest[..digits_end]
            .parse()
            .map_err(|e| format!("invalid duration {:?}: {}", input, e))?;
        rest = &rest[digits_end..];

        let unit_end = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = match &rest[..unit_end] {
            "ms" => Some(Duration::from_millis(value)),
            "s" => Some(Duration::from_secs(value)),
            "m" => value.checked_mul(60).map(Duration::from_secs),
            "h" => value.checked_mul(60 * 60).map(Duration::from_secs),
            other => return Err(format!("unknown unit {:?} in duration {:?}", other, input)),
        };
        total = unit
            .and_then(|unit| total.checked_add(unit))
            .ok_or_else(|| format!("duration out of range: {:?}", input))?;
        rest = &rest[unit_end..];
    }
    Ok(total)
}
