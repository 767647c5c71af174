use chrono::{DateTime, Utc};

use crate::types::{ChangeEvent, EntityKey, PropertyAttributes};

/// Sign of a collapsing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum Sign {
    /// Cancels a previously written state row.
    Cancel = -1,
    /// Carries the live state of a key.
    State = 1,
}

impl Sign {
    pub fn as_i8(self) -> i8 {
        self as i8
    }
}

impl TryFrom<i8> for Sign {
    type Error = i8;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Sign::Cancel),
            1 => Ok(Sign::State),
            other => Err(other),
        }
    }
}

/// A sign-annotated row persisted to the collapsing table.
///
/// A state row mirrors the payload of the event it was built from. A cancel row is an
/// exact copy of a previously persisted state row with the sign flipped.
#[derive(Debug, Clone, PartialEq)]
pub struct CollapsingRow {
    pub key: EntityKey,
    pub version: u64,
    pub sign: Sign,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub attributes: PropertyAttributes,
}

impl CollapsingRow {
    /// Builds the `+1` row representing `event`.
    pub fn state_of(event: &ChangeEvent) -> Self {
        Self {
            key: event.key.clone(),
            version: event.version,
            sign: Sign::State,
            created_at: event.created_at,
            modified_at: event.modified_at,
            attributes: event.attributes.clone(),
        }
    }

    /// Returns the `-1` row cancelling this one.
    pub fn cancellation(&self) -> Self {
        Self {
            sign: Sign::Cancel,
            ..self.clone()
        }
    }

    pub fn is_state(&self) -> bool {
        self.sign == Sign::State
    }
}
