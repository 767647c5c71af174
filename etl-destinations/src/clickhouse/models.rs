use chrono::{DateTime, Utc};
use clickhouse::Row;
use etl::error::{ErrorKind, EtlError};
use etl::etl_error;
use etl::state::{ProcessingWindowState, WindowStatus};
use etl::types::{CollapsingRow, EntityKey, PropertyAttributes, Sign, Window, WindowFingerprint};
use serde::{Deserialize, Serialize};

/// Row of the collapsing table. Field order matches the table's column order.
#[derive(Debug, Clone, PartialEq, Row, Serialize, Deserialize)]
pub struct PropertyCollapsingRow {
    pub tenant_id: String,
    pub property_id: String,
    pub sign: i8,
    pub version: u64,
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis::option")]
    pub created_time: Option<DateTime<Utc>>,
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis::option")]
    pub last_modified_time: Option<DateTime<Utc>>,
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

impl From<&CollapsingRow> for PropertyCollapsingRow {
    fn from(row: &CollapsingRow) -> Self {
        let attributes = row.attributes.clone();

        Self {
            tenant_id: row.key.tenant_id.clone(),
            property_id: row.key.entity_id.clone(),
            sign: row.sign.as_i8(),
            version: row.version,
            created_time: row.created_at,
            last_modified_time: row.modified_at,
            id: attributes.id,
            survey_id: attributes.survey_id,
            account_id: attributes.account_id,
            old_property_id: attributes.old_property_id,
            property_type: attributes.property_type,
            usage_category: attributes.usage_category,
            ownership_category: attributes.ownership_category,
            status: attributes.status,
            acknowledgement_number: attributes.acknowledgement_number,
            creation_reason: attributes.creation_reason,
            no_of_floors: attributes.no_of_floors,
            source: attributes.source,
            channel: attributes.channel,
            land_area: attributes.land_area,
            super_built_up_area: attributes.super_built_up_area,
            created_by: attributes.created_by,
            last_modified_by: attributes.last_modified_by,
        }
    }
}

impl TryFrom<PropertyCollapsingRow> for CollapsingRow {
    type Error = EtlError;

    fn try_from(row: PropertyCollapsingRow) -> Result<Self, Self::Error> {
        let sign = Sign::try_from(row.sign).map_err(|sign| {
            etl_error!(
                ErrorKind::InvalidData,
                "Collapsing row has an invalid sign",
                format!("{}/{} has sign {sign}", row.tenant_id, row.property_id)
            )
        })?;

        Ok(CollapsingRow {
            key: EntityKey::new(row.tenant_id, row.property_id),
            version: row.version,
            sign,
            created_at: row.created_time,
            modified_at: row.last_modified_time,
            attributes: PropertyAttributes {
                id: row.id,
                survey_id: row.survey_id,
                account_id: row.account_id,
                old_property_id: row.old_property_id,
                property_type: row.property_type,
                usage_category: row.usage_category,
                ownership_category: row.ownership_category,
                status: row.status,
                acknowledgement_number: row.acknowledgement_number,
                creation_reason: row.creation_reason,
                no_of_floors: row.no_of_floors,
                source: row.source,
                channel: row.channel,
                land_area: row.land_area,
                super_built_up_area: row.super_built_up_area,
                created_by: row.created_by,
                last_modified_by: row.last_modified_by,
            },
        })
    }
}

/// Row of the window processing state table.
#[derive(Debug, Clone, PartialEq, Row, Serialize, Deserialize)]
pub struct ProcessingStateRow {
    pub pipeline_name: String,
    pub fingerprint: String,
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub window_start: DateTime<Utc>,
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub window_end: DateTime<Utc>,
    pub status: String,
    pub records_processed: u64,
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub started_at: DateTime<Utc>,
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis::option")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Version column of the replacing table.
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub updated_at: DateTime<Utc>,
}

impl ProcessingStateRow {
    pub fn from_state(state: &ProcessingWindowState, updated_at: DateTime<Utc>) -> Self {
        Self {
            pipeline_name: state.pipeline_name.clone(),
            fingerprint: state.fingerprint.as_str().to_string(),
            window_start: state.window.start(),
            window_end: state.window.end(),
            status: state.status.as_str().to_string(),
            records_processed: state.records_processed,
            started_at: state.started_at,
            completed_at: state.completed_at,
            updated_at,
        }
    }
}

impl TryFrom<ProcessingStateRow> for ProcessingWindowState {
    type Error = EtlError;

    fn try_from(row: ProcessingStateRow) -> Result<Self, Self::Error> {
        let status: WindowStatus = row.status.parse()?;
        let window = Window::new(row.window_start, row.window_end)?;

        Ok(ProcessingWindowState {
            pipeline_name: row.pipeline_name,
            window,
            fingerprint: WindowFingerprint::from_stored(row.fingerprint),
            status,
            records_processed: row.records_processed,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

/// Single payload column of the staging table.
#[derive(Debug, Clone, PartialEq, Row, Deserialize)]
pub struct StagingPayloadRow {
    pub payload: String,
}
