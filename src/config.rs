use std::net::SocketAddr;
use std::time::Duration;

/// Process configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub poke_api_url: String,
    pub todos_api_url: String,
    /// How long a query nobody subscribes to stays cached.
    pub keep_unused_for: Duration,
    pub sweep_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_addr = std::env::var("DUX_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("DUX_LISTEN_ADDR", "must be a valid socket address")
            })?;

        let poke_api_url = std::env::var("DUX_POKE_API_URL")
            .unwrap_or_else(|_| "https://pokeapi.co/api/v2".to_string());

        let todos_api_url = std::env::var("DUX_TODOS_API_URL")
            .unwrap_or_else(|_| "https://jsonplaceholder.typicode.com".to_string());

        let keep_unused_for = Self::parse_secs("DUX_KEEP_UNUSED_SECS", 60)?;
        let sweep_interval = Self::parse_secs("DUX_SWEEP_INTERVAL_SECS", 10)?;
        if sweep_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "DUX_SWEEP_INTERVAL_SECS",
                "must be greater than zero",
            ));
        }

        Ok(Config {
            listen_addr,
            poke_api_url,
            todos_api_url,
            keep_unused_for,
            sweep_interval,
        })
    }

    fn parse_secs(var: &'static str, default: u64) -> Result<Duration, ConfigError> {
        match std::env::var(var) {
            Ok(s) => s
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::Invalid(var, "must be a whole number of seconds")),
            Err(_) => Ok(Duration::from_secs(default)),
        }
    }

    /// Configuration pointing both upstreams at `base_url`.
    pub fn for_testing(base_url: &str) -> Self {
        Config {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            poke_api_url: base_url.to_string(),
            todos_api_url: base_url.to_string(),
            keep_unused_for: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Invalid(&'static str, &'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid(var, msg) => write!(f, "Invalid value for {}: {}", var, msg),
        }
    }
}

impl std::error::Error for ConfigError {}
