use courier::Credentials;
use gateway::config::{Config as GatewayConfig, Listener};
use serde::Deserialize;
use std::fs::File;
use std::str::FromStr;
use url::Url;

const DEFAULT_STATSD_PORT: u16 = 8125;

#[derive(Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    #[serde(default = "default_statsd_port")]
    pub statsd_port: u16,
}

fn default_statsd_port() -> u16 {
    DEFAULT_STATSD_PORT
}

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: Option<String>,
    /// Filter directive such as `info` or `courier=debug`. `RUST_LOG` wins
    /// when set.
    pub level: Option<String>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub gateway: GatewayConfig,
    pub platform: Credentials,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    /// Builds the configuration from environment variables, after loading a
    /// `.env` file if one is found.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is not an error.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvSource(lookup);

        let mut platform = Credentials::new(
            env.require("VK_ACCESS_TOKEN")?,
            env.require("VK_PEER_ID")?,
        );
        platform.wall_access_token = env.get("VK_WALL_ACCESS_TOKEN");
        platform.group_id = env.get("VK_GROUP_ID");
        if let Some(api_version) = env.get("VK_API_VERSION") {
            platform.api_version = api_version;
        }
        if let Some(api_url) = env.parse::<Url>("VK_API_URL")? {
            platform.api_url = api_url;
        }
        if let Some(timeout) = env.parse::<f64>("VK_REQUEST_TIMEOUT")? {
            platform.request_timeout_secs = timeout;
        }

        let mut gateway = GatewayConfig::new(env.require("INTERNAL_TOKEN")?);
        env.override_listener(&mut gateway.listener, "RELAY_HOST", "RELAY_PORT")?;
        env.override_listener(&mut gateway.admin_listener, "ADMIN_HOST", "ADMIN_PORT")?;

        let metrics = match env.get("STATSD_HOST") {
            Some(statsd_host) => Some(MetricsConfig {
                statsd_host,
                statsd_port: env.parse("STATSD_PORT")?.unwrap_or(DEFAULT_STATSD_PORT),
            }),
            None => None,
        };
        let logging = env.get("SENTRY_DSN").map(|dsn| LoggingConfig {
            sentry_dsn: Some(dsn),
            level: None,
        });

        Ok(Config {
            common: CommonConfig { metrics, logging },
            gateway,
            platform,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gateway.validate()?;
        self.platform.validate()?;
        Ok(())
    }
}

struct EnvSource<F>(F);

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Empty values count as unset.
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|value| !value.trim().is_empty())
    }

    fn require(&self, name: &'static str) -> Result<String, ConfigError> {
        self.get(name).ok_or(ConfigError::Missing(name))
    }

    fn parse<T: FromStr>(&self, name: &'static str) -> Result<Option<T>, ConfigError> {
        self.get(name)
            .map(|value| {
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::Invalid { name, value })
            })
            .transpose()
    }

    fn override_listener(
        &self,
        listener: &mut Listener,
        host_var: &'static str,
        port_var: &'static str,
    ) -> Result<(), ConfigError> {
        if let Some(host) = self.get(host_var) {
            listener.host = host;
        }
        if let Some(port) = self.parse(port_var)? {
            listener.port = port;
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error("invalid platform settings: {0}")]
    Platform(#[from] courier::errors::ConfigError),
    #[error("invalid gateway settings: {0}")]
    Gateway(#[from] gateway::config::ValidationError),
}
