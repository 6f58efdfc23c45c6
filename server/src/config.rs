use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerConfigError {
    #[error("PORT must be a valid port number, got '{0}'")]
    InvalidPort(String),

    #[error("Invalid HOST address '{host}': {source}")]
    InvalidHost {
        host: String,
        #[source]
        source: std::net::AddrParseError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// Processing settings live in the JSON file named by `CONFIG_PATH`; this
/// struct only covers the transport.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `5001`).
    pub port: u16,
    /// Core config file. Defaults apply when unset.
    pub config_path: Option<PathBuf>,
    /// Directory served for every path outside the API (default: `static`).
    pub static_dir: PathBuf,
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var       | Default   |
    /// |---------------|-----------|
    /// | `HOST`        | `0.0.0.0` |
    /// | `PORT`        | `5001`    |
    /// | `CONFIG_PATH` | unset     |
    /// | `STATIC_DIR`  | `static`  |
    /// | `LOG_FORMAT`  | `text`    |
    pub fn from_env() -> Result<Self, ServerConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let raw_port = std::env::var("PORT").unwrap_or_else(|_| "5001".into());
        let port: u16 = raw_port
            .trim()
            .parse()
            .map_err(|_| ServerConfigError::InvalidPort(raw_port.clone()))?;

        let config_path = std::env::var("CONFIG_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        let static_dir = std::env::var("STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("static"));

        let log_format = std::env::var("LOG_FORMAT")
            .map(|f| LogFormat::parse(&f))
            .unwrap_or_default();

        Ok(Self {
            host,
            port,
            config_path,
            static_dir,
            log_format,
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ServerConfigError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|e| ServerConfigError::InvalidHost {
                host: self.host.clone(),
                source: e,
            })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(host: &str) -> ServerConfig {
        ServerConfig {
            host: host.to_string(),
            port: 5001,
            config_path: None,
            static_dir: PathBuf::from("static"),
            log_format: LogFormat::Text,
        }
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::parse("text"), LogFormat::Text);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Text);
    }

    #[test]
    fn test_socket_addr() {
        let addr = config("127.0.0.1").socket_addr().unwrap();
        assert_eq!(addr.port(), 5001);
        assert!(addr.ip().is_loopback());

        assert!(matches!(
            config("localhost:80").socket_addr(),
            Err(ServerConfigError::InvalidHost { .. })
        ));
    }
}
