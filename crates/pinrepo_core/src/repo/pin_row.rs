//! Row mapping between `PinStatus` and the persisted `pins` layout.
//!
//! # Responsibility
//! - Translate domain records into storage rows and back.
//! - Split create-only defaults (request id, creation time) from the row.
//!
//! # Invariants
//! - Mapping is pure: no I/O, no clock reads, no id generation.
//! - A create row never carries a request id; the store fills it only when a
//!   row is actually inserted.
//! - Read paths reject unknown status labels and malformed JSON columns.

use crate::model::pin::{OwnerId, Pin, PinState, PinStatus};
use crate::repo::pin_repo::{RepoError, RepoResult};
use rusqlite::Row;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

/// Column list shared by every `pins` read.
pub(crate) const PIN_COLUMNS: &str = "id,
    owner_id,
    cid,
    request_id,
    name,
    status,
    origins,
    meta,
    delegates,
    info,
    created_at";

/// Persisted representation of one pin record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinRow {
    /// Store-assigned row id. `None` before insertion.
    pub id: Option<i64>,
    pub owner_id: OwnerId,
    pub cid: String,
    /// `None` on the create path.
    pub request_id: Option<String>,
    pub name: Option<String>,
    /// Status label, stored verbatim.
    pub status: String,
    /// JSON array text.
    pub origins: String,
    /// JSON object text.
    pub meta: String,
    /// JSON array text.
    pub delegates: String,
    /// JSON object text.
    pub info: String,
    /// Epoch milliseconds. `None` before insertion.
    pub created_at: Option<i64>,
}

/// Attributes applied only when a new row is inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowDefaults {
    /// Candidate request id; the store generates one when absent.
    pub request_id: Option<String>,
    /// Candidate creation time; the store clock is used when absent.
    pub created_at: Option<i64>,
}

impl PinRow {
    /// Builds the create-path row for `owner` plus its insert-only defaults.
    pub fn for_create(owner: OwnerId, status: &PinStatus) -> RepoResult<(Self, RowDefaults)> {
        let mut row = Self::from_status(owner, status)?;
        let defaults = RowDefaults {
            request_id: row.request_id.take(),
            created_at: row.created_at.take(),
        };
        Ok((row, defaults))
    }

    /// Maps a domain record to a full row without touching identity fields.
    pub fn from_status(owner: OwnerId, status: &PinStatus) -> RepoResult<Self> {
        Ok(Self {
            id: None,
            owner_id: owner,
            cid: status.pin.cid.clone(),
            request_id: Some(status.request_id.clone()).filter(|id| !id.is_empty()),
            name: status.pin.name.clone(),
            status: status.status.as_str().to_string(),
            origins: encode_json("origins", &status.pin.origins)?,
            meta: encode_json("meta", &status.pin.meta)?,
            delegates: encode_json("delegates", &status.delegates)?,
            info: encode_json("info", &status.info)?,
            created_at: Some(status.created).filter(|created| *created > 0),
        })
    }

    /// Rebuilds the domain record from a stored row.
    pub fn into_status(self) -> RepoResult<PinStatus> {
        let status = PinState::parse(&self.status).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid pin status `{}` in pins.status",
                self.status
            ))
        })?;
        let request_id = self.request_id.ok_or_else(|| {
            RepoError::InvalidData("missing request id in pins.request_id".to_string())
        })?;

        Ok(PinStatus {
            request_id,
            status,
            created: self.created_at.unwrap_or_default(),
            pin: Pin {
                cid: self.cid,
                name: self.name,
                origins: decode_json::<Vec<String>>("origins", &self.origins)?,
                meta: decode_json::<BTreeMap<String, String>>("meta", &self.meta)?,
            },
            delegates: decode_json::<Vec<String>>("delegates", &self.delegates)?,
            info: decode_json::<BTreeMap<String, String>>("info", &self.info)?,
        })
    }

    /// Reads one row selected with [`PIN_COLUMNS`].
    pub(crate) fn from_sql_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            cid: row.get("cid")?,
            request_id: row.get("request_id")?,
            name: row.get("name")?,
            status: row.get("status")?,
            origins: row.get("origins")?,
            meta: row.get("meta")?,
            delegates: row.get("delegates")?,
            info: row.get("info")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub(crate) fn encode_json<T: Serialize>(column: &str, value: &T) -> RepoResult<String> {
    serde_json::to_string(value)
        .map_err(|err| RepoError::InvalidData(format!("encode pins.{column}: {err}")))
}

fn decode_json<T: DeserializeOwned>(column: &str, text: &str) -> RepoResult<T> {
    serde_json::from_str(text)
        .map_err(|err| RepoError::InvalidData(format!("decode pins.{column}: {err}")))
}
