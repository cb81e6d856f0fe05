//! # Configuration Management
//!
//! This module handles loading configuration from environment variables.
//! It uses the "12-factor app" methodology where configuration comes from the environment.
//!
//! ## Environment Variables
//! - `HOST`: Server bind address (default: 127.0.0.1)
//! - `PORT`: Server port (default: 4000)
//! - `DATABASE_URL`: SQLite database connection string
//! - `SESSION_BACKEND`: `sqlite` (default) or `memory`
//! - `SESSION_LIFETIME_HOURS`: Session inactivity lifetime (default: 12)
//! - `COOKIE_SECURE`: Whether the session cookie is HTTPS-only (default: true)
//! - `STATIC_DIR`: Directory served under `/static` (default: ./ui/static)
//! - `TLS_CERT_PATH` / `TLS_KEY_PATH`: PEM files; set both to serve HTTPS directly

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};

use crate::middleware::SessionConfig;

/// Where session records live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBackendKind {
    /// The `tower_sessions` table in the application database
    Sqlite,
    /// Process memory; sessions vanish on restart
    Memory,
}

impl FromStr for SessionBackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow!("unknown session backend {:?} (expected sqlite or memory)", other)),
        }
    }
}

/// Certificate and key for serving HTTPS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Application configuration
///
/// This struct holds all configuration values needed to run the server.
/// All fields are public for easy access from other modules.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host/IP address to bind to
    /// Examples: "127.0.0.1" (localhost only), "0.0.0.0" (all interfaces)
    pub host: String,

    /// Server port number (1-65535)
    /// Default: 4000
    pub port: u16,

    /// SQLite database connection URL
    /// Format: "sqlite:filename.db?mode=rwc"
    /// The "mode=rwc" means: read, write, create if not exists
    pub database_url: String,

    /// Session store selection
    pub session_backend: SessionBackendKind,

    /// How long an idle session stays valid
    pub session_lifetime_hours: i64,

    /// Send the session cookie with `Secure`
    /// Turn off only for plain-HTTP local development
    pub cookie_secure: bool,

    /// Static assets directory
    pub static_dir: PathBuf,

    /// Present when the server terminates TLS itself
    pub tls: Option<TlsConfig>,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads variables from .env file (if present) using dotenvy
    /// 2. Reads each configuration value from environment
    /// 3. Falls back to sensible defaults if variables aren't set
    /// 4. Returns an error if a value doesn't parse or the TLS pair is incomplete
    ///
    /// ## Example .env file
    /// ```text
    /// HOST=127.0.0.1
    /// PORT=4000
    /// DATABASE_URL=sqlite:snippetbox.db?mode=rwc
    /// SESSION_BACKEND=sqlite
    /// SESSION_LIFETIME_HOURS=12
    /// COOKIE_SECURE=true
    /// TLS_CERT_PATH=./tls/cert.pem
    /// TLS_KEY_PATH=./tls/key.pem
    /// ```
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (dotenvy doesn't error if file missing)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup
    ///
    /// `from_env` passes the process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset, so `PORT=` in a .env file means the default
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match var("PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("PORT={:?} is not a valid port", raw))?,
            None => 4000,
        };

        let session_backend = match var("SESSION_BACKEND") {
            Some(raw) => raw.parse()?,
            None => SessionBackendKind::Sqlite,
        };

        let session_lifetime_hours = match var("SESSION_LIFETIME_HOURS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("SESSION_LIFETIME_HOURS={:?} is not a number", raw))?,
            None => 12,
        };
        if session_lifetime_hours < 1 {
            bail!("SESSION_LIFETIME_HOURS must be at least 1");
        }

        let cookie_secure = match var("COOKIE_SECURE") {
            Some(raw) => parse_bool(&raw)
                .with_context(|| format!("COOKIE_SECURE={:?} is not a boolean", raw))?,
            None => true,
        };

        // Both paths or neither; half a TLS setup is a mistake, not plain HTTP
        let tls = match (var("TLS_CERT_PATH"), var("TLS_KEY_PATH")) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: cert.into(),
                key_path: key.into(),
            }),
            (None, None) => None,
            _ => bail!("TLS_CERT_PATH and TLS_KEY_PATH must be set together"),
        };

        Ok(Config {
            host: var("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:snippetbox.db?mode=rwc".to_string()),
            session_backend,
            session_lifetime_hours,
            cookie_secure,
            static_dir: var("STATIC_DIR")
                .unwrap_or_else(|| "./ui/static".to_string())
                .into(),
            tls,
        })
    }

    /// Get the socket address to bind the server to
    ///
    /// Combines host and port into a format suitable for TCP binding.
    /// Example: "127.0.0.1:4000"
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Cookie settings for the session interceptor
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            lifetime: time::Duration::hours(self.session_lifetime_hours),
            secure: self.cookie_secure,
            ..SessionConfig::default()
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
