use crate::types::env_parse;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Process-level settings (game rules live in `GameConfig`)
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_address: IpAddr,
    pub port: u16,
    pub max_sessions: usize,
    /// How often the phase driver re-checks every room
    pub tick_interval: Duration,
    /// Base URL used in join links
    pub public_url: String,
}

// 6866 is ascii for "DB"
const DEFAULT_PORT: u16 = 6866;

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            max_sessions: 100,
            tick_interval: Duration::from_millis(250),
            public_url: format!("http://localhost:{}", DEFAULT_PORT),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_address = match std::env::var("BIND_ADDRESS") {
            Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!("Invalid BIND_ADDRESS '{}', using {}", raw, defaults.bind_address);
                defaults.bind_address
            }),
            Err(_) => defaults.bind_address,
        };
        let port = env_parse("PORT", defaults.port);
        let tick_ms = env_parse("TICK_MS", 250u64).max(10);

        let public_url = std::env::var("PUBLIC_URL")
            .ok()
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| format!("http://localhost:{}", port));

        Self {
            bind_address,
            port,
            max_sessions: env_parse("MAX_SESSIONS", defaults.max_sessions).max(1),
            tick_interval: Duration::from_millis(tick_ms),
            public_url,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_server_config_from_env() {
        std::env::set_var("BIND_ADDRESS", "127.0.0.1");
        std::env::set_var("PORT", "7000");
        std::env::set_var("TICK_MS", "1");
        std::env::set_var("MAX_SESSIONS", "oops");

        let config = ServerConfig::from_env();
        assert_eq!(config.addr().to_string(), "127.0.0.1:7000");
        assert_eq!(config.tick_interval, Duration::from_millis(10));
        assert_eq!(config.max_sessions, 100);
        assert_eq!(config.public_url, "http://localhost:7000");

        for key in ["BIND_ADDRESS", "PORT", "TICK_MS", "MAX_SESSIONS"] {
            std::env::remove_var(key);
        }
        assert_eq!(ServerConfig::from_env(), ServerConfig::default());
    }
}
