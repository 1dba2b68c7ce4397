use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Brand registry entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Brand {
    pub id: Uuid,
    pub name: String,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating a brand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandDto {
    pub name: String,
    pub comment: Option<String>,
}

impl BrandDto {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Brand name must not be empty".to_string());
        }
        Ok(())
    }
}

/// Monthly revenue target for a brand. `period` is "YYYY-MM".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandTarget {
    pub brand: String,
    pub period: String,
    pub target_revenue: f64,
}

/// Request to delete a brand, optionally moving its facts to another brand
/// instead of dropping them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteBrandRequest {
    pub name: String,
    pub reassign_to: Option<String>,
}
