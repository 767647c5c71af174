use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{Value, json};

use crate::types::{ChangeEvent, EntityKey, PropertyAttributes};

/// Fixed reference instant used by tests: 2024-01-12T00:00:00Z.
pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_705_017_600, 0).unwrap()
}

/// Returns [`t0`] shifted by `minutes`.
pub fn minutes_after_t0(minutes: i64) -> DateTime<Utc> {
    t0() + TimeDelta::minutes(minutes)
}

/// Builder of raw staging payloads in the producer format.
#[derive(Debug, Clone)]
pub struct PropertyPayload {
    tenant_id: String,
    property_id: String,
    version: u64,
    created_ms: i64,
    modified_ms: i64,
    status: Option<String>,
    usage_category: Option<String>,
    land_area: Option<Value>,
}

impl PropertyPayload {
    /// Creates an insert payload at version 1 created and modified at [`t0`].
    pub fn new(tenant_id: &str, property_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            property_id: property_id.to_string(),
            version: 1,
            created_ms: t0().timestamp_millis(),
            modified_ms: t0().timestamp_millis(),
            status: Some("ACTIVE".to_string()),
            usage_category: None,
            land_area: None,
        }
    }

    pub fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Moves the modification time `minutes` after the creation time, making it an update.
    pub fn modified_after(mut self, minutes: i64) -> Self {
        self.modified_ms = self.created_ms + minutes * 60_000;
        self
    }

    pub fn status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    pub fn usage(mut self, usage_category: &str) -> Self {
        self.usage_category = Some(usage_category.to_string());
        self
    }

    /// Sets the land area as the producer sends it, a string.
    pub fn land_area(mut self, land_area: &str) -> Self {
        self.land_area = Some(Value::String(land_area.to_string()));
        self
    }

    pub fn to_json(&self) -> String {
        let mut property = json!({
            "propertyId": self.property_id,
            "version": self.version,
            "auditDetails": {
                "createdBy": "tester",
                "createdTime": self.created_ms,
                "lastModifiedBy": "tester",
                "lastModifiedTime": self.modified_ms,
            },
        });

        if let Some(status) = &self.status {
            property["status"] = json!(status);
        }
        if let Some(usage_category) = &self.usage_category {
            property["usageCategory"] = json!(usage_category);
        }
        if let Some(land_area) = &self.land_area {
            property["landArea"] = land_area.clone();
        }

        json!({
            "tenantId": self.tenant_id,
            "property": property,
        })
        .to_string()
    }
}

/// Builds a parsed event. `modified_after_minutes == 0` makes it an insert.
pub fn change_event(
    key: &EntityKey,
    version: u64,
    modified_after_minutes: i64,
    usage_category: &str,
) -> ChangeEvent {
    ChangeEvent {
        key: key.clone(),
        version,
        created_at: Some(t0()),
        modified_at: Some(t0() + TimeDelta::minutes(modified_after_minutes)),
        attributes: PropertyAttributes {
            status: Some("ACTIVE".to_string()),
            usage_category: Some(usage_category.to_string()),
            ..Default::default()
        },
    }
}
