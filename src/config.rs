use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::domain::GeoPoint;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    /// Deadline for every storage call, also used as the pool acquire timeout.
    pub storage_timeout: Duration,
    /// Lot location assumed for dealers that have not registered one.
    pub default_lot: GeoPoint,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

const DEFAULT_LOT_LAT: f64 = 34.0522;
const DEFAULT_LOT_LNG: f64 = -118.2437;

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let storage_timeout_ms = env_map
            .get("STORAGE_TIMEOUT_MS")
            .map(|s| s.as_str())
            .unwrap_or("5000")
            .parse::<u64>()
            .ok()
            .filter(|ms| *ms > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "STORAGE_TIMEOUT_MS".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?;

        let lat = parse_coordinate(&env_map, "DEFAULT_LOT_LAT", DEFAULT_LOT_LAT)?;
        let lng = parse_coordinate(&env_map, "DEFAULT_LOT_LNG", DEFAULT_LOT_LNG)?;
        let default_lot = GeoPoint::new(lat, lng).map_err(|e| {
            ConfigError::InvalidValue("DEFAULT_LOT_LAT/DEFAULT_LOT_LNG".to_string(), e.to_string())
        })?;

        Ok(Config {
            port,
            database_path,
            storage_timeout: Duration::from_millis(storage_timeout_ms),
            default_lot,
        })
    }
}

fn parse_coordinate(
    env_map: &HashMap<String, String>,
    key: &str,
    default: f64,
) -> Result<f64, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<f64>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), "must be a decimal number".to_string())
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.storage_timeout, Duration::from_millis(5000));
        assert_eq!(config.default_lot, GeoPoint { lat: 34.0522, lng: -118.2437 });
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_zero_storage_timeout_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("STORAGE_TIMEOUT_MS".to_string(), "0".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "STORAGE_TIMEOUT_MS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_custom_lot_location() {
        let mut env_map = setup_required_env();
        env_map.insert("DEFAULT_LOT_LAT".to_string(), "40.7128".to_string());
        env_map.insert("DEFAULT_LOT_LNG".to_string(), "-74.0060".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.default_lot, GeoPoint { lat: 40.7128, lng: -74.006 });
    }

    #[test]
    fn test_out_of_range_lot_location() {
        let mut env_map = setup_required_env();
        env_map.insert("DEFAULT_LOT_LAT".to_string(), "95".to_string());
        assert!(matches!(
            Config::from_env_map(env_map),
            Err(ConfigError::InvalidValue(_, _))
        ));
    }
}
