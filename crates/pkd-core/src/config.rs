//! Environment-driven configuration.
//!
//! Unknown enum values are rejected at startup, not at use.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Default upload processing deadline (30 minutes).
pub const DEFAULT_UPLOAD_TIMEOUT_MS: u64 = 1_800_000;

/// Configuration errors surfaced during startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required variable absent.
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    /// Variable present but not parseable.
    #[error("invalid value for {var}: {value}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Relational backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    /// PostgreSQL.
    Postgres,
    /// Oracle.
    Oracle,
}

impl FromStr for DbType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(DbType::Postgres),
            "oracle" => Ok(DbType::Oracle),
            other => Err(format!("unknown db type: {other}")),
        }
    }
}

/// Reconciliation scope item. DSC_NC is excluded by policy and is not
/// representable here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReconScope {
    /// Country signing CAs (link certificates included).
    Csca,
    /// Document signers.
    Dsc,
    /// Revocation lists.
    Crl,
}

impl FromStr for ReconScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CSCA" => Ok(ReconScope::Csca),
            "DSC" => Ok(ReconScope::Dsc),
            "CRL" => Ok(ReconScope::Crl),
            other => Err(format!("unknown reconciliation scope item: {other}")),
        }
    }
}

/// Relational store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Backend dialect.
    pub db_type: DbType,
    /// Host name.
    pub host: String,
    /// Port (5432 for postgres, 1521 for oracle by default).
    pub port: u16,
    /// Database/service name.
    pub name: String,
    /// User.
    pub user: String,
    /// Password.
    pub password: String,
    /// Pool floor.
    pub pool_min: u32,
    /// Pool ceiling.
    pub pool_max: u32,
    /// Acquire timeout in milliseconds.
    pub acquire_timeout_ms: u64,
}

impl DbConfig {
    /// Postgres connection URL.
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

/// Directory connection settings. Writes go to `write_host`; reads may be
/// balanced across `host`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// Read endpoint.
    pub host: String,
    /// Primary write endpoint.
    pub write_host: String,
    /// Port.
    pub port: u16,
    /// Bind DN.
    pub bind_dn: String,
    /// Bind password.
    pub bind_password: String,
    /// Suffix under which `dc=download` lives.
    pub base_dn: String,
    /// Legacy DN mode: subject DN carried as a second cn value.
    pub use_legacy_dn: bool,
    /// Pool floor.
    pub pool_min: u32,
    /// Pool ceiling.
    pub pool_max: u32,
    /// Acquire timeout in milliseconds.
    pub acquire_timeout_ms: u64,
}

impl LdapConfig {
    /// ldap:// URL of the read endpoint.
    pub fn read_url(&self) -> String {
        format!("ldap://{}:{}", self.host, self.port)
    }

    /// ldap:// URL of the write endpoint.
    pub fn write_url(&self) -> String {
        format!("ldap://{}:{}", self.write_host, self.port)
    }
}

/// Complete subsystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Relational store settings.
    pub db: DbConfig,
    /// Directory settings.
    pub ldap: LdapConfig,
    /// Types reconciled to the directory.
    pub reconciliation_scope: Vec<ReconScope>,
    /// Whether the in-memory CSCA cache is used.
    pub csca_cache_enabled: bool,
    /// Upload processing deadline in milliseconds.
    pub upload_timeout_ms: u64,
}

fn var(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid { var: name, value: v }),
    }
}

impl Config {
    /// Read configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_type: DbType = match var("DB_TYPE") {
            None => DbType::Postgres,
            Some(v) => {
                v.parse().map_err(|_| ConfigError::Invalid { var: "DB_TYPE", value: v })?
            }
        };
        let db = DbConfig {
            db_type,
            host: var("DB_HOST").unwrap_or_else(|| "localhost".into()),
            port: parse_var(
                "DB_PORT",
                if db_type == DbType::Oracle { 1521 } else { 5432 },
            )?,
            name: var("DB_NAME").unwrap_or_else(|| "pkd".into()),
            user: var("DB_USER").unwrap_or_else(|| "pkd".into()),
            password: var("DB_PASSWORD").ok_or(ConfigError::Missing("DB_PASSWORD"))?,
            pool_min: 5,
            pool_max: 20,
            acquire_timeout_ms: 5_000,
        };

        let ldap_host = var("LDAP_HOST").unwrap_or_else(|| "localhost".into());
        let ldap = LdapConfig {
            write_host: var("LDAP_WRITE_HOST").unwrap_or_else(|| ldap_host.clone()),
            host: ldap_host,
            port: parse_var("LDAP_PORT", 389)?,
            bind_dn: var("LDAP_BIND_DN").ok_or(ConfigError::Missing("LDAP_BIND_DN"))?,
            bind_password: var("LDAP_BIND_PASSWORD")
                .ok_or(ConfigError::Missing("LDAP_BIND_PASSWORD"))?,
            base_dn: var("LDAP_BASE_DN").ok_or(ConfigError::Missing("LDAP_BASE_DN"))?,
            use_legacy_dn: parse_var("USE_LEGACY_DN", false)?,
            pool_min: 2,
            pool_max: 10,
            acquire_timeout_ms: 5_000,
        };

        let reconciliation_scope = match var("RECONCILIATION_SCOPE") {
            None => vec![ReconScope::Csca, ReconScope::Dsc, ReconScope::Crl],
            Some(v) => {
                let mut scope = Vec::new();
                for item in v.split(',').filter(|s| !s.trim().is_empty()) {
                    scope.push(item.parse().map_err(|_| ConfigError::Invalid {
                        var: "RECONCILIATION_SCOPE",
                        value: item.trim().to_string(),
                    })?);
                }
                scope
            }
        };

        Ok(Self {
            db,
            ldap,
            reconciliation_scope,
            csca_cache_enabled: parse_var("CSCA_CACHE_ENABLED", true)?,
            upload_timeout_ms: parse_var("UPLOAD_TIMEOUT_MS", DEFAULT_UPLOAD_TIMEOUT_MS)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_rejects_dsc_nc() {
        assert!("DSC_NC".parse::<ReconScope>().is_err());
        assert_eq!("csca".parse::<ReconScope>().unwrap(), ReconScope::Csca);
    }

    #[test]
    fn db_type_parses() {
        assert_eq!("postgres".parse::<DbType>().unwrap(), DbType::Postgres);
        assert_eq!("Oracle".parse::<DbType>().unwrap(), DbType::Oracle);
        assert!("mysql".parse::<DbType>().is_err());
    }
}
