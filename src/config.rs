use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_API_URL: &str = "http://192.168.29.231/silab-v4/input_ari_from_python.php";
pub const DEFAULT_PORT: &str = "COM5";
pub const DEFAULT_BAUD: u32 = 9600;

pub const BAUD_RATES: &[u32] = &[9600, 19200, 38400, 57600, 115200, 230400];

#[derive(Clone, Debug)]
pub struct Config {
    pub api_url: String,
    pub preferred_port: String,
    pub baud_rate: u32,
    pub serial_timeout: Duration,
    pub http_timeout: Duration,
    pub log_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            preferred_port: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD,
            serial_timeout: Duration::from_secs(1),
            http_timeout: Duration::from_secs(5),
            log_dir: env::temp_dir(),
        }
    }
}

impl Config {
    /// Defaults with `ARI_*` environment overrides applied.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup("ARI_API_URL").filter(|v| !v.trim().is_empty()) {
            config.api_url = url.trim().to_string();
        }
        if let Some(port) = lookup("ARI_PORT").filter(|v| !v.trim().is_empty()) {
            config.preferred_port = port.trim().to_string();
        }
        if let Some(baud) = parse_override::<u32>("ARI_BAUD", lookup("ARI_BAUD")) {
            if BAUD_RATES.contains(&baud) {
                config.baud_rate = baud;
            } else {
                warn!(baud, supported = ?BAUD_RATES, "ignoring unsupported ARI_BAUD");
            }
        }
        if let Some(dir) = lookup("ARI_LOG_DIR").filter(|v| !v.trim().is_empty()) {
            config.log_dir = PathBuf::from(dir);
        }
        config
    }
}

fn parse_override<T: FromStr>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.serial_timeout, Duration::from_secs(1));
        assert_eq!(config.http_timeout, Duration::from_secs(5));
    }

    #[test]
    fn overrides_apply() {
        let config = Config::from_lookup(|key| match key {
            "ARI_API_URL" => Some(" http://localhost/ari.php ".into()),
            "ARI_BAUD" => Some("19200".into()),
            "ARI_PORT" => Some("/dev/ttyUSB0".into()),
            _ => None,
        });
        assert_eq!(config.api_url, "http://localhost/ari.php");
        assert_eq!(config.baud_rate, 19200);
        assert_eq!(config.preferred_port, "/dev/ttyUSB0");
    }

    #[test]
    fn bad_baud_falls_back() {
        let config = Config::from_lookup(|key| (key == "ARI_BAUD").then(|| "fast".to_string()));
        assert_eq!(config.baud_rate, DEFAULT_BAUD);
    }

    #[test]
    fn unsupported_baud_falls_back() {
        for raw in ["0", "12345"] {
            let config = Config::from_lookup(|key| (key == "ARI_BAUD").then(|| raw.to_string()));
            assert_eq!(config.baud_rate, DEFAULT_BAUD, "ARI_BAUD={raw}");
        }
        let config = Config::from_lookup(|key| (key == "ARI_BAUD").then(|| "115200".to_string()));
        assert_eq!(config.baud_rate, 115200);
    }
}
