use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const CONFIG_FILE_NAME: &str = ".gatorconfig.toml";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_db_url")]
    pub db_url: String,
    /// Name of the user commands run as
    #[serde(default)]
    pub current_user_name: Option<String>,
    /// Per-request timeout for feed fetches, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// How long an in-flight cycle may keep running after a stop request, in seconds
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_db_url() -> String {
    "sqlite:gator.db?mode=rwc".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_shutdown_grace() -> u64 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_url: default_db_url(),
            current_user_name: None,
            request_timeout_secs: default_request_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load the config file, falling back to defaults when it does not exist yet
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn set_user<P: AsRef<Path>>(&mut self, path: P, user_name: &str) -> anyhow::Result<()> {
        self.current_user_name = Some(user_name.to_string());
        self.save(path)
    }

    /// `$GATOR_CONFIG`, else `~/.gatorconfig.toml`
    pub fn default_path() -> anyhow::Result<PathBuf> {
        if let Some(path) = std::env::var_os("GATOR_CONFIG") {
            return Ok(PathBuf::from(path));
        }
        let home = std::env::var_os("HOME")
            .ok_or_else(|| anyhow::anyhow!("HOME is not set; pass --config explicitly"))?;
        Ok(PathBuf::from(home).join(CONFIG_FILE_NAME))
    }

    /// `DATABASE_URL` takes precedence over the file's `db_url`
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.db_url.clone())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Parse a polling interval such as `"30s"`, `"1m"`, `"1h30m"` or `"1.5s"`.
///
/// Accepts the units `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`, and a bare
/// `"0"`. A zero result is returned as-is; rejecting it is up to the caller.
pub fn parse_interval(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    let invalid = |reason: &str| Error::Config(format!("invalid interval {:?}: {}", input, reason));

    let (negative, mut rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(invalid("empty"));
    }

    let mut total_secs = 0.0_f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        if number.is_empty() || number == "." {
            return Err(invalid("expected a number"));
        }
        let value: f64 = number.parse().map_err(|_| invalid("bad number"))?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);
        let scale = match unit {
            "ns" => 1e-9,
            "us" | "µs" | "μs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "" => return Err(invalid("missing unit")),
            _ => return Err(invalid("unknown unit")),
        };

        total_secs += value * scale;
        rest = next;
    }

    if negative && total_secs > 0.0 {
        return Err(invalid("must not be negative"));
    }

    Duration::try_from_secs_f64(total_secs).map_err(|_| invalid("out of range"))
}
