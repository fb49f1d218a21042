//! Configuration management for Drive Server

use serde::Deserialize;
use std::env;
use thiserror::Error;

/// Default maximum number of audit entries returned by a change summary
pub const DEFAULT_CHANGE_LIMIT: usize = 1000;

/// Default number of (user, repository) root sets kept in memory
pub const DEFAULT_ROOTS_CACHE_CAPACITY: usize = 1024;

/// Largest change limit whose look-ahead row still fits a SQL `LIMIT`
pub const MAX_CHANGE_LIMIT: usize = (i64::MAX - 1) as usize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub drive: DriveConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriveConfig {
    /// Repository used when a request does not name one
    pub repository: String,
    /// Change finder result limit; exceeding it reports `too_many_changes`
    pub change_limit: usize,
    /// Principals granted every permission on every document
    pub administrators: Vec<String>,
    /// Root sets cached before the least recently used is evicted
    pub roots_cache_capacity: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: "sqlite:./drive.db".to_string(),
            },
            drive: DriveConfig::default(),
        }
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        DriveConfig {
            repository: "default".to_string(),
            change_limit: DEFAULT_CHANGE_LIMIT,
            administrators: vec!["Administrator".to_string()],
            roots_cache_capacity: DEFAULT_ROOTS_CACHE_CAPACITY,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let change_limit = match env::var("DRIVE_CHANGE_LIMIT") {
            Ok(value) => parse_count("DRIVE_CHANGE_LIMIT", value, MAX_CHANGE_LIMIT)?,
            Err(_) => DEFAULT_CHANGE_LIMIT,
        };
        let roots_cache_capacity = match env::var("DRIVE_ROOTS_CACHE_CAPACITY") {
            Ok(value) => parse_count("DRIVE_ROOTS_CACHE_CAPACITY", value, usize::MAX)?,
            Err(_) => DEFAULT_ROOTS_CACHE_CAPACITY,
        };

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .unwrap_or(3000),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./drive.db".to_string()),
            },
            drive: DriveConfig {
                repository: env::var("DRIVE_REPOSITORY").unwrap_or_else(|_| "default".to_string()),
                change_limit,
                administrators: env::var("DRIVE_ADMINISTRATORS")
                    .map(|v| parse_list(&v))
                    .unwrap_or_else(|_| vec!["Administrator".to_string()]),
                roots_cache_capacity,
            },
        })
    }
}

/// Parse a count in `1..=max`
fn parse_count(name: &'static str, value: String, max: usize) -> Result<usize, ConfigError> {
    match value.trim().parse::<usize>() {
        Ok(n) if (1..=max).contains(&n) => Ok(n),
        _ => Err(ConfigError::Invalid { name, value }),
    }
}

/// Split a comma separated list, dropping blanks
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list("admin, ops ,,"), vec!["admin", "ops"]);
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_default_drive_config() {
        let config = Config::default();
        assert_eq!(config.drive.repository, "default");
        assert_eq!(config.drive.change_limit, DEFAULT_CHANGE_LIMIT);
        assert_eq!(config.drive.administrators, vec!["Administrator"]);
        assert_eq!(config.drive.roots_cache_capacity, DEFAULT_ROOTS_CACHE_CAPACITY);
    }

    #[test]
    fn test_change_limit_range() {
        let limit = |v: &str| parse_count("DRIVE_CHANGE_LIMIT", v.to_string(), MAX_CHANGE_LIMIT);

        assert_eq!(limit("250").unwrap(), 250);
        assert_eq!(limit(&MAX_CHANGE_LIMIT.to_string()).unwrap(), MAX_CHANGE_LIMIT);
        assert!(limit("0").is_err());
        assert!(limit("-1").is_err());
        assert!(limit("many").is_err());
        assert!(limit(&(i64::MAX as usize).to_string()).is_err());
        assert!(matches!(
            limit(&usize::MAX.to_string()),
            Err(ConfigError::Invalid { name: "DRIVE_CHANGE_LIMIT", .. })
        ));
    }
}
