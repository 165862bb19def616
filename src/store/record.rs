use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::error::StoreError;

/// A persisted fix. Never modified after insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LocationRecord {
    pub id: i64,
    pub owner_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// Insert payload, the store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NewLocation {
    pub owner_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: i64,
}

impl NewLocation {
    pub fn new(owner_id: impl Into<String>, latitude: f64, longitude: f64, timestamp: i64) -> Self {
        Self {
            owner_id: owner_id.into(),
            latitude,
            longitude,
            timestamp,
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.owner_id.trim().is_empty() {
            return Err(StoreError::InvalidRecord("empty owner_id".into()));
        }
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(StoreError::InvalidRecord(format!(
                "latitude {} out of range",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(StoreError::InvalidRecord(format!(
                "longitude {} out of range",
                self.longitude
            )));
        }
        if self.timestamp < 0 {
            return Err(StoreError::InvalidRecord(format!(
                "negative timestamp {}",
                self.timestamp
            )));
        }
        Ok(())
    }

    pub(crate) fn into_record(self, id: i64) -> LocationRecord {
        LocationRecord {
            id,
            owner_id: self.owner_id,
            latitude: self.latitude,
            longitude: self.longitude,
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub(crate) fn keyword(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_bounds() {
        assert!(NewLocation::new("u", 90.0, 180.0, 0).validate().is_ok());
        assert!(NewLocation::new("u", -90.0, -180.0, 0).validate().is_ok());
        assert!(NewLocation::new("u", 90.01, 0.0, 0).validate().is_err());
        assert!(NewLocation::new("u", 0.0, 180.5, 0).validate().is_err());
        assert!(NewLocation::new("u", f64::NAN, 0.0, 0).validate().is_err());
        assert!(NewLocation::new("u", 0.0, 0.0, -1).validate().is_err());
    }

    #[test]
    fn test_validate_owner() {
        let err = NewLocation::new("  ", 0.0, 0.0, 0).validate().unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord(_)));
    }
}
