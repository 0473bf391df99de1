use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use tracing::{info, warn};

pub const DEFAULT_PORT: u16 = 9001;
pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Server configuration, read from the environment (and `.env`).
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// SQLite database location; people are kept in memory when unset.
    pub database_url: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: parse_host(env::var("HOST").ok()),
            port: parse_port(env::var("PORT").ok()),
            database_url: parse_database_url(env::var("DATABASE_URL").ok()),
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_port(raw: Option<String>) -> u16 {
    match raw {
        Some(port_str) => match u16::from_str(&port_str) {
            Ok(port_num) => {
                info!("Using port {} from environment variable PORT.", port_num);
                port_num
            }
            Err(_) => {
                warn!(
                    "Invalid PORT value '{}' in environment variable. Using default port {}.",
                    port_str, DEFAULT_PORT
                );
                DEFAULT_PORT
            }
        },
        None => {
            info!(
                "PORT environment variable not set. Using default port {}.",
                DEFAULT_PORT
            );
            DEFAULT_PORT
        }
    }
}

fn parse_host(raw: Option<String>) -> IpAddr {
    match raw {
        Some(host_str) => IpAddr::from_str(&host_str).unwrap_or_else(|_| {
            warn!(
                "Invalid HOST value '{}' in environment variable. Using default host {}.",
                host_str, DEFAULT_HOST
            );
            DEFAULT_HOST
        }),
        None => DEFAULT_HOST,
    }
}

fn parse_database_url(raw: Option<String>) -> Option<String> {
    raw.map(|url| url.trim().to_string()).filter(|url| !url.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_falls_back_to_default() {
        assert_eq!(parse_port(None), DEFAULT_PORT);
        assert_eq!(parse_port(Some("not-a-port".to_string())), DEFAULT_PORT);
        assert_eq!(parse_port(Some("70000".to_string())), DEFAULT_PORT);
        assert_eq!(parse_port(Some("8080".to_string())), 8080);
    }

    #[test]
    fn host_falls_back_to_default() {
        assert_eq!(parse_host(None), DEFAULT_HOST);
        assert_eq!(parse_host(Some("localhost".to_string())), DEFAULT_HOST);
        assert_eq!(
            parse_host(Some("127.0.0.1".to_string())),
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        );
    }

    #[test]
    fn blank_database_url_means_in_memory() {
        assert_eq!(parse_database_url(None), None);
        assert_eq!(parse_database_url(Some("  ".to_string())), None);
        assert_eq!(
            parse_database_url(Some(" sqlite://people.db ".to_string())),
            Some("sqlite://people.db".to_string())
        );
    }

    #[test]
    fn socket_addr_combines_host_and_port() {
        let config = ServerConfig {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 9001,
            database_url: None,
        };
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:9001");
    }
}
