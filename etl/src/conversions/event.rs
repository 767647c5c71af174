//! Parsing of raw property change payloads.
//!
//! Payloads follow the upstream producer format:
//!
//! ```json
//! { "tenantId": "pb.amritsar",
//!   "property": { "propertyId": "PT-1", "version": 2, "status": "ACTIVE",
//!                 "auditDetails": { "createdTime": 1705000000000, "lastModifiedTime": 1705000000000 } } }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::types::{ChangeEvent, EntityKey, PropertyAttributes};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPropertyEvent {
    tenant_id: Option<String>,
    property: Option<RawProperty>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProperty {
    property_id: Option<String>,
    version: Option<u64>,
    id: Option<String>,
    survey_id: Option<String>,
    account_id: Option<String>,
    old_property_id: Option<String>,
    property_type: Option<String>,
    usage_category: Option<String>,
    ownership_category: Option<String>,
    status: Option<String>,
    // The producer spells this key without the "e".
    #[serde(rename = "acknowldgementNumber", alias = "acknowledgementNumber")]
    acknowledgement_number: Option<String>,
    creation_reason: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    no_of_floors: Option<f64>,
    source: Option<String>,
    channel: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    land_area: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    super_built_up_area: Option<f64>,
    audit_details: Option<RawAuditDetails>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAuditDetails {
    created_by: Option<String>,
    created_time: Option<i64>,
    last_modified_by: Option<String>,
    last_modified_time: Option<i64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    String(String),
}

/// Accepts numbers, numeric strings (the producer sends areas as strings) and blank strings.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(value)) => Ok(Some(value)),
        Some(NumberOrString::String(value)) if value.trim().is_empty() => Ok(None),
        Some(NumberOrString::String(value)) => value
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Parses one raw staging payload into a [`ChangeEvent`].
///
/// Identity fields are mandatory: a missing or blank tenant or property id, or a version
/// below 1, is rejected with [`ErrorKind::InvalidData`]. Malformed JSON yields
/// [`ErrorKind::DeserializationError`]. Timestamps equal to zero are treated as absent.
pub fn parse_change_event(payload: &str) -> EtlResult<ChangeEvent> {
    let raw: RawPropertyEvent = serde_json::from_str(payload)?;

    let Some(tenant_id) = non_blank(raw.tenant_id) else {
        bail!(ErrorKind::InvalidData, "Payload has no tenant id");
    };
    let Some(property) = raw.property else {
        bail!(
            ErrorKind::InvalidData,
            "Payload has no property object",
            format!("tenant {tenant_id}")
        );
    };
    let Some(entity_id) = non_blank(property.property_id) else {
        bail!(
            ErrorKind::InvalidData,
            "Payload has no property id",
            format!("tenant {tenant_id}")
        );
    };

    let key = EntityKey::new(tenant_id, entity_id);

    let version = match property.version {
        Some(version) if version >= 1 => version,
        other => bail!(
            ErrorKind::InvalidData,
            "Payload has no valid version",
            format!("key {key}, version {other:?}")
        ),
    };

    let audit = property.audit_details.unwrap_or_default();
    let created_at = timestamp_from_millis(&key, "createdTime", audit.created_time)?;
    let modified_at = timestamp_from_millis(&key, "lastModifiedTime", audit.last_modified_time)?;

    if let (Some(created), Some(modified)) = (created_at, modified_at) {
        if modified < created {
            bail!(
                ErrorKind::InvalidData,
                "Payload was modified before it was created",
                format!("key {key}, created {created}, modified {modified}")
            );
        }
    }

    let no_of_floors = match property.no_of_floors {
        None => None,
        Some(floors) if floors.fract() == 0.0 && floors >= 0.0 && floors <= f64::from(i32::MAX) => {
            Some(floors as i32)
        }
        Some(floors) => bail!(
            ErrorKind::InvalidData,
            "Payload has an invalid floor count",
            format!("key {key}, noOfFloors {floors}")
        ),
    };

    Ok(ChangeEvent {
        key,
        version,
        created_at,
        modified_at,
        attributes: PropertyAttributes {
            id: property.id,
            survey_id: property.survey_id,
            account_id: property.account_id,
            old_property_id: property.old_property_id,
            property_type: property.property_type,
            usage_category: property.usage_category,
            ownership_category: property.ownership_category,
            status: property.status,
            acknowledgement_number: property.acknowledgement_number,
            creation_reason: property.creation_reason,
            no_of_floors,
            source: property.source,
            channel: property.channel,
            land_area: property.land_area,
            super_built_up_area: property.super_built_up_area,
            created_by: audit.created_by,
            last_modified_by: audit.last_modified_by,
        },
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// Converts epoch milliseconds, mapping absent or zero to `None`.
fn timestamp_from_millis(
    key: &EntityKey,
    field: &'static str,
    millis: Option<i64>,
) -> EtlResult<Option<DateTime<Utc>>> {
    match millis {
        None | Some(0) => Ok(None),
        Some(millis) if millis < 0 => bail!(
            ErrorKind::InvalidData,
            "Payload has a negative timestamp",
            format!("key {key}, {field} {millis}")
        ),
        Some(millis) => match DateTime::from_timestamp_millis(millis) {
            Some(timestamp) => Ok(Some(timestamp)),
            None => bail!(
                ErrorKind::InvalidData,
                "Payload timestamp is out of range",
                format!("key {key}, {field} {millis}")
            ),
        },
    }
}
