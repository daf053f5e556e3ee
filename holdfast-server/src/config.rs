// Copyright 2026 Holdfast Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration management for the Holdfast server.
//!
//! All settings come from `HOLDFAST_*` environment variables with sensible
//! defaults, so a bare `holdfast-server` serves a throwaway repository out
//! of the temp directory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bind address (e.g. "0.0.0.0:8000").
    /// Set via `HOLDFAST_BIND`.
    pub bind: String,
    /// Root directory all repositories live under.
    /// Set via `HOLDFAST_DATA_DIR`.
    pub data_dir: PathBuf,
    /// Path of the htpasswd file.
    /// Set via `HOLDFAST_HTPASSWD`; defaults to `<data_dir>/.htpasswd`.
    pub htpasswd_path: Option<PathBuf>,
    /// Maximum total size of the data root in bytes; 0 means unlimited.
    /// Set via `HOLDFAST_MAX_REPO_SIZE` ("10GB", "512MB", plain bytes).
    pub max_repo_size: i64,
    /// Disable authentication (`HOLDFAST_NO_AUTH`).
    pub no_auth: bool,
    /// Header carrying the username from an authenticating front proxy
    /// (`HOLDFAST_PROXY_AUTH_HEADER`).
    pub proxy_auth_header: Option<String>,
    /// Permit only creation, and deletion of locks (`HOLDFAST_APPEND_ONLY`).
    pub append_only: bool,
    /// Refuse reads of data blobs (`HOLDFAST_WRITE_ONLY`).
    pub write_only: bool,
    /// Users may only access their own repository (`HOLDFAST_PRIVATE_REPOS`).
    pub private_repos: bool,
    /// Skip SHA-256 verification of uploads (`HOLDFAST_NO_VERIFY_UPLOAD`).
    pub no_verify_upload: bool,
    /// Let the filesystem group access repositories
    /// (`HOLDFAST_GROUP_ACCESSIBLE`).
    pub group_accessible_repos: bool,
    /// Abort on internal errors instead of answering 500
    /// (`HOLDFAST_PANIC_ON_ERROR`); meant for test setups.
    pub panic_on_error: bool,
    /// Verbose per-request logging (`HOLDFAST_DEBUG`).
    pub debug: bool,
    /// Metrics configuration.
    pub metrics: MetricsConfig,
    /// TLS configuration.
    pub tls: TlsConfig,
}

/// Prometheus metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Record and expose metrics at `/metrics` (`HOLDFAST_METRICS`).
    pub enabled: bool,
    /// Serve `/metrics` without authentication
    /// (`HOLDFAST_METRICS_NO_AUTH`).
    pub no_auth: bool,
}

/// TLS/HTTPS configuration.
///
/// TLS is enabled by pointing `HOLDFAST_TLS_CERT` and `HOLDFAST_TLS_KEY`
/// at PEM-encoded certificate and private key files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Whether TLS is enabled; true when both paths are provided.
    pub enabled: bool,
    /// Path to the PEM-encoded certificate.
    pub cert_path: Option<PathBuf>,
    /// Path to the PEM-encoded private key.
    pub key_path: Option<PathBuf>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        let cert_path = std::env::var("HOLDFAST_TLS_CERT").ok().map(PathBuf::from);
        let key_path = std::env::var("HOLDFAST_TLS_KEY").ok().map(PathBuf::from);
        let enabled = cert_path.is_some() && key_path.is_some();
        Self {
            enabled,
            cert_path,
            key_path,
        }
    }
}

impl TlsConfig {
    /// Rejects half-configured TLS.
    pub fn validate(&self) -> Result<(), String> {
        if self.cert_path.is_some() != self.key_path.is_some() {
            return Err(
                "TLS requires both HOLDFAST_TLS_CERT and HOLDFAST_TLS_KEY".to_string()
            );
        }
        Ok(())
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: env_bool("HOLDFAST_METRICS"),
            no_auth: env_bool("HOLDFAST_METRICS_NO_AUTH"),
        }
    }
}

impl Config {
    /// Loads configuration from the environment.
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self::default())
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = std::env::var("HOLDFAST_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("holdfast"));

        Self {
            bind: std::env::var("HOLDFAST_BIND").unwrap_or_else(|_| "127.0.0.1:8000".to_string()),
            data_dir,
            htpasswd_path: std::env::var("HOLDFAST_HTPASSWD").ok().map(PathBuf::from),
            max_repo_size: std::env::var("HOLDFAST_MAX_REPO_SIZE")
                .ok()
                .and_then(|s| parse_size(&s).ok())
                .unwrap_or(0),
            no_auth: env_bool("HOLDFAST_NO_AUTH"),
            proxy_auth_header: std::env::var("HOLDFAST_PROXY_AUTH_HEADER").ok(),
            append_only: env_bool("HOLDFAST_APPEND_ONLY"),
            write_only: env_bool("HOLDFAST_WRITE_ONLY"),
            private_repos: env_bool("HOLDFAST_PRIVATE_REPOS"),
            no_verify_upload: env_bool("HOLDFAST_NO_VERIFY_UPLOAD"),
            group_accessible_repos: env_bool("HOLDFAST_GROUP_ACCESSIBLE"),
            panic_on_error: env_bool("HOLDFAST_PANIC_ON_ERROR"),
            debug: env_bool("HOLDFAST_DEBUG"),
            metrics: MetricsConfig::default(),
            tls: TlsConfig::default(),
        }
    }
}

/// Reads a boolean environment variable ("1" or "true", case-insensitive).
fn env_bool(name: &str) -> bool {
    std::env::var(name)
        .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Parses a size string like "10GB", "100MB", "1024KB" or "5000" into bytes.
///
/// Supported suffixes (case-insensitive): GB/G, MB/M, KB/K, B or none.
pub fn parse_size(s: &str) -> Result<i64, String> {
    let s = s.trim().to_uppercase();
    if s.is_empty() {
        return Err("empty size string".to_string());
    }

    let num_end = s
        .chars()
        .position(|c| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (num_str, suffix) = s.split_at(num_end);
    let suffix = suffix.trim();

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("invalid number: {}", num_str))?;

    let multiplier: i64 = match suffix {
        "GB" | "G" => 1024 * 1024 * 1024,
        "MB" | "M" => 1024 * 1024,
        "KB" | "K" => 1024,
        "B" | "" => 1,
        _ => return Err(format!("unknown size suffix: {}", suffix)),
    };

    Ok((num * multiplier as f64) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_size_bytes() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("0").unwrap(), 0);
    }

    #[test]
    fn parse_size_suffixes() {
        assert_eq!(parse_size("1KB").unwrap(), 1024);
        assert_eq!(parse_size("1K").unwrap(), 1024);
        assert_eq!(parse_size("100mb").unwrap(), 100 * 1024 * 1024);
        assert_eq!(parse_size("5gb").unwrap(), 5 * 1024 * 1024 * 1024);
        assert_eq!(parse_size("1.5GB").unwrap(), (1.5 * 1024.0 * 1024.0 * 1024.0) as i64);
    }

    #[test]
    fn parse_size_invalid() {
        assert!(parse_size("").is_err());
        assert!(parse_size("abc").is_err());
        assert!(parse_size("1TB").is_err());
    }

    #[test]
    fn tls_validation() {
        let tls = TlsConfig {
            enabled: false,
            cert_path: None,
            key_path: None,
        };
        assert!(tls.validate().is_ok());

        let tls = TlsConfig {
            enabled: false,
            cert_path: Some(PathBuf::from("/cert.pem")),
            key_path: None,
        };
        assert!(tls.validate().is_err());

        let tls = TlsConfig {
            enabled: true,
            cert_path: Some(PathBuf::from("/cert.pem")),
            key_path: Some(PathBuf::from("/key.pem")),
        };
        assert!(tls.validate().is_ok());
    }
}
