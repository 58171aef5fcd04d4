use std::net::SocketAddr;

use anyhow::Context;
use serde::Deserialize;

/// One week, the lifetime of every issued token unless overridden.
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 60 * 24 * 7;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// HMAC signing secret. `None` keeps the server up but every token
    /// operation fails with a configuration error.
    pub secret: Option<String>,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Postgres connection string; when absent users live in memory.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub bind_addr: SocketAddr,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = non_empty_var("DATABASE_URL");
        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);
        let bind_addr = bind_addr(
            std::env::var("APP_HOST").ok().as_deref(),
            std::env::var("APP_PORT").ok().as_deref(),
        )?;
        let jwt = JwtConfig {
            secret: non_empty_var("JWT_SECRET"),
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "userauth".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "userauth-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_TOKEN_TTL_MINUTES),
        };
        Ok(Self {
            database_url,
            max_connections,
            bind_addr,
            jwt,
        })
    }
}

fn bind_addr(host: Option<&str>, port: Option<&str>) -> anyhow::Result<SocketAddr> {
    let host = host.unwrap_or("0.0.0.0");
    let port = port.unwrap_or("8080");
    format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid APP_HOST/APP_PORT: {host}:{port}"))
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
impl JwtConfig {
    pub(crate) fn for_tests(secret: Option<&str>) -> Self {
        Self {
            secret: secret.map(str::to_string),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_minutes: DEFAULT_TOKEN_TTL_MINUTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_addr_defaults_to_all_interfaces() {
        let addr = bind_addr(None, None).unwrap();
        assert_eq!(addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        let addr = bind_addr(Some("127.0.0.1"), Some("3000")).unwrap();
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn bind_addr_rejects_bad_port() {
        assert!(bind_addr(None, Some("http")).is_err());
    }
}
