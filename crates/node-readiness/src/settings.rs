use crate::evaluator::Thresholds;
use crate::server::Mode;
use config::{Config, File, FileFormat};
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_ETH_URL: &str = "http://localhost:8545";
pub const DEFAULT_MAX_SECONDS_BEHIND: u64 = 60;
pub const DEFAULT_MIN_PEERS: u64 = 3;
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;

/// Looked up in the working directory when no file is given explicitly.
const DEFAULT_CONFIG_FILE: &str = "config";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("configuration file {} not found", .0.display())]
    MissingFile(PathBuf),

    #[error("invalid eth-url {url:?}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("invalid listen-addr {addr:?}: {source}")]
    InvalidListenAddr {
        addr: String,
        #[source]
        source: AddrParseError,
    },

    #[error("request-timeout-secs must be greater than zero")]
    ZeroTimeout,
}

/// Values given on the command line or through the environment. They take
/// precedence over the configuration file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub eth_url: Option<String>,
    pub max_seconds_behind: Option<u64>,
    pub min_peers: Option<u64>,
    pub listen_addr: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub nodename: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    pub eth_url: String,
    pub max_seconds_behind: u64,
    pub min_peers: u64,
    pub listen_addr: String,
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
    #[serde(default)]
    pub nodename: Option<String>,
}

impl Settings {
    /// Layers built-in defaults, the YAML file and `overrides`, in that
    /// order, and validates the result.
    pub fn load(config_file: Option<&Path>, overrides: Overrides) -> Result<Self, SettingsError> {
        let mut builder = Config::builder()
            .set_default("eth-url", DEFAULT_ETH_URL)?
            .set_default("max-seconds-behind", DEFAULT_MAX_SECONDS_BEHIND)?
            .set_default("min-peers", DEFAULT_MIN_PEERS)?
            .set_default("listen-addr", DEFAULT_LISTEN_ADDR)?
            .set_default("request-timeout-secs", DEFAULT_REQUEST_TIMEOUT_SECS)?;

        builder = match config_file {
            Some(path) => {
                if !path.exists() {
                    return Err(SettingsError::MissingFile(path.to_path_buf()));
                }
                builder.add_source(File::from(path).format(FileFormat::Yaml))
            }
            None => builder.add_source(
                File::with_name(DEFAULT_CONFIG_FILE)
                    .format(FileFormat::Yaml)
                    .required(false),
            ),
        };

        let settings: Settings = builder
            .set_override_option("eth-url", overrides.eth_url)?
            .set_override_option("max-seconds-behind", overrides.max_seconds_behind)?
            .set_override_option("min-peers", overrides.min_peers)?
            .set_override_option("listen-addr", overrides.listen_addr)?
            .set_override_option("request-timeout-secs", overrides.request_timeout_secs)?
            .set_override_option("poll-interval-secs", overrides.poll_interval_secs)?
            .set_override_option("nodename", overrides.nodename)?
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        self.endpoint()?;
        self.listen_addr()?;
        if self.request_timeout_secs == 0 {
            return Err(SettingsError::ZeroTimeout);
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Result<Url, SettingsError> {
        let invalid = |reason: String| SettingsError::InvalidEndpoint {
            url: self.eth_url.clone(),
            reason,
        };

        let url = Url::parse(&self.eth_url).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(invalid(format!("unsupported scheme {scheme}"))),
        }
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, SettingsError> {
        self.listen_addr
            .parse()
            .map_err(|source| SettingsError::InvalidListenAddr {
                addr: self.listen_addr.clone(),
                source,
            })
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            max_seconds_behind: self.max_seconds_behind,
            min_peers: self.min_peers,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn mode(&self) -> Mode {
        match self.poll_interval_secs {
            Some(secs) if secs > 0 => Mode::Polling(Duration::from_secs(secs)),
            _ => Mode::OnDemand,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("node-readiness-{}.yaml", name));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::load(None, Overrides::default()).unwrap();

        assert_eq!(settings.eth_url, DEFAULT_ETH_URL);
        assert_eq!(
            settings.thresholds(),
            Thresholds {
                max_seconds_behind: 60,
                min_peers: 3
            }
        );
        assert_eq!(settings.listen_addr().unwrap(), "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(settings.request_timeout(), Duration::from_secs(5));
        assert_eq!(settings.mode(), Mode::OnDemand);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = write_config(
            "file",
            "eth-url: http://nethermind:8545\nmax-seconds-behind: 30\nmin-peers: 10\npoll-interval-secs: 5\n",
        );

        let settings = Settings::load(Some(&path), Overrides::default()).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(settings.endpoint().unwrap().as_str(), "http://nethermind:8545/");
        assert_eq!(settings.max_seconds_behind, 30);
        assert_eq!(settings.min_peers, 10);
        assert_eq!(settings.mode(), Mode::Polling(Duration::from_secs(5)));
        // untouched keys keep their default
        assert_eq!(settings.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn test_overrides_beat_file() {
        let path = write_config("overrides", "eth-url: http://from-file:8545\nmin-peers: 10\n");

        let overrides = Overrides {
            eth_url: Some("http://from-flag:8545".to_string()),
            max_seconds_behind: Some(45),
            ..Default::default()
        };
        let settings = Settings::load(Some(&path), overrides).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(settings.eth_url, "http://from-flag:8545");
        assert_eq!(settings.max_seconds_behind, 45);
        assert_eq!(settings.min_peers, 10);
    }

    #[test]
    fn test_missing_explicit_file() {
        let path = std::env::temp_dir().join("node-readiness-does-not-exist.yaml");
        let err = Settings::load(Some(&path), Overrides::default()).unwrap_err();
        assert!(matches!(err, SettingsError::MissingFile(_)), "got {err:?}");
    }

    #[test]
    fn test_invalid_endpoint() {
        for url in ["not a url", "ws://localhost:8546"] {
            let overrides = Overrides {
                eth_url: Some(url.to_string()),
                ..Default::default()
            };
            let err = Settings::load(None, overrides).unwrap_err();
            assert!(matches!(err, SettingsError::InvalidEndpoint { .. }), "{url}: {err:?}");
        }
    }

    #[test]
    fn test_invalid_listen_addr_and_timeout() {
        let overrides = Overrides {
            listen_addr: Some(":8080".to_string()),
            ..Default::default()
        };
        let err = Settings::load(None, overrides).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidListenAddr { .. }), "got {err:?}");

        let overrides = Overrides {
            request_timeout_secs: Some(0),
            ..Default::default()
        };
        let err = Settings::load(None, overrides).unwrap_err();
        assert!(matches!(err, SettingsError::ZeroTimeout), "got {err:?}");
    }

    #[test]
    fn test_zero_poll_interval_is_on_demand() {
        let overrides = Overrides {
            poll_interval_secs: Some(0),
            ..Default::default()
        };
        let settings = Settings::load(None, overrides).unwrap();
        assert_eq!(settings.mode(), Mode::OnDemand);
    }
}
