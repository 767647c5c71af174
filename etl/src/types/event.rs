use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identity of a property across all of its versions.
///
/// Ordering is by tenant first, matching the sort key of the collapsing table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub tenant_id: String,
    pub entity_id: String,
}

impl EntityKey {
    pub fn new(tenant_id: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            entity_id: entity_id.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.entity_id)
    }
}

/// Attribute snapshot of a property at one version.
///
/// Every field is optional: an absent field stays `None` instead of being defaulted, so a
/// cancellation row reproduces exactly what was persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyAttributes {
    pub id: Option<String>,
    pub survey_id: Option<String>,
    pub account_id: Option<String>,
    pub old_property_id: Option<String>,
    pub property_type: Option<String>,
    pub usage_category: Option<String>,
    pub ownership_category: Option<String>,
    pub status: Option<String>,
    pub acknowledgement_number: Option<String>,
    pub creation_reason: Option<String>,
    pub no_of_floors: Option<i32>,
    pub source: Option<String>,
    pub channel: Option<String>,
    pub land_area: Option<f64>,
    pub super_built_up_area: Option<f64>,
    pub created_by: Option<String>,
    pub last_modified_by: Option<String>,
}

/// One parsed change notification for a property.
///
/// Timestamps have millisecond resolution. `None` stands for a missing or zero timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub key: EntityKey,
    /// Producer-assigned version, positive and not necessarily contiguous.
    pub version: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub attributes: PropertyAttributes,
}
