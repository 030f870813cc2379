//! Domain primitives: TimeMs, WalletAddress, Vin, GeoPoint.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }

    pub fn plus_days(&self, days: i64) -> Self {
        TimeMs(self.0.saturating_add(days.saturating_mul(MS_PER_DAY)))
    }

    pub fn minus_days(&self, days: i64) -> Self {
        TimeMs(self.0.saturating_sub(days.saturating_mul(MS_PER_DAY)))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PrimitiveParseError {
    #[error("wallet address must be 0x followed by hex digits, got {0:?}")]
    WalletAddress(String),
    #[error("VIN must be 17 characters from [A-HJ-NPR-Z0-9], got {0:?}")]
    Vin(String),
    #[error("coordinates out of range: lat {lat}, lng {lng}")]
    Coordinates { lat: f64, lng: f64 },
}

/// A stored or submitted status string that names no known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(kind: &'static str, value: &str) -> Self {
        UnknownVariant {
            kind,
            value: value.to_string(),
        }
    }
}

/// Dealer wallet address (0x-prefixed hex string), stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Get the address as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for WalletAddress {
    type Err = PrimitiveParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| PrimitiveParseError::WalletAddress(s.to_string()))?;
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PrimitiveParseError::WalletAddress(s.to_string()));
        }
        Ok(WalletAddress(format!("0x{}", hex.to_ascii_lowercase())))
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = PrimitiveParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WalletAddress> for String {
    fn from(value: WalletAddress) -> Self {
        value.0
    }
}

impl std::fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Vehicle identification number, globally unique across dealers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Vin(String);

impl Vin {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Vin {
    type Err = PrimitiveParseError;

    /// Accepts 17 characters, uppercases them, and rejects I, O and Q.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let valid = upper.len() == 17
            && upper
                .chars()
                .all(|c| c.is_ascii_alphanumeric() && !matches!(c, 'I' | 'O' | 'Q'));
        if !valid {
            return Err(PrimitiveParseError::Vin(s.to_string()));
        }
        Ok(Vin(upper))
    }
}

impl TryFrom<String> for Vin {
    type Error = PrimitiveParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Vin> for String {
    fn from(value: Vin) -> Self {
        value.0
    }
}

impl std::fmt::Display for Vin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// GPS coordinates in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Build a point, rejecting non-finite or out-of-range coordinates.
    pub fn new(lat: f64, lng: f64) -> Result<Self, PrimitiveParseError> {
        let in_range = lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);
        if !in_range {
            return Err(PrimitiveParseError::Coordinates { lat, lng });
        }
        Ok(GeoPoint { lat, lng })
    }

    /// Combined absolute latitude and longitude difference, in degrees.
    ///
    /// A coarse Manhattan-style proximity measure, not a geodesic distance.
    pub fn manhattan_degrees(&self, other: &GeoPoint) -> f64 {
        (self.lat - other.lat).abs() + (self.lng - other.lng).abs()
    }
}
