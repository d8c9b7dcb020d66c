//! Partial update descriptor for pin rows.
//!
//! # Invariants
//! - Only fields that are set become `SET` assignments.
//! - Owner, CID, request id and creation time are not updatable.

use crate::model::pin::PinState;
use crate::repo::pin_repo::RepoResult;
use crate::repo::pin_row::encode_json;
use rusqlite::types::Value;
use std::collections::BTreeMap;

/// Set of field updates applied by `PinStore::update`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinPatch {
    pub status: Option<PinState>,
    /// `Some(None)` clears the name.
    pub name: Option<Option<String>>,
    pub origins: Option<Vec<String>>,
    pub meta: Option<BTreeMap<String, String>>,
    pub delegates: Option<Vec<String>>,
    pub info: Option<BTreeMap<String, String>>,
}

impl PinPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: PinState) -> Self {
        self.status = Some(status);
        self
    }

    pub fn name(mut self, name: Option<String>) -> Self {
        self.name = Some(name);
        self
    }

    pub fn origins(mut self, origins: Vec<String>) -> Self {
        self.origins = Some(origins);
        self
    }

    pub fn meta(mut self, meta: BTreeMap<String, String>) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn delegates(mut self, delegates: Vec<String>) -> Self {
        self.delegates = Some(delegates);
        self
    }

    pub fn info(mut self, info: BTreeMap<String, String>) -> Self {
        self.info = Some(info);
        self
    }

    /// Returns whether no field is set.
    pub fn is_empty(&self) -> bool {
        self.assigned_columns().is_empty()
    }

    /// Column names this patch writes, in assignment order.
    pub fn assigned_columns(&self) -> Vec<&'static str> {
        let mut columns = Vec::new();
        if self.status.is_some() {
            columns.push("status");
        }
        if self.name.is_some() {
            columns.push("name");
        }
        if self.origins.is_some() {
            columns.push("origins");
        }
        if self.meta.is_some() {
            columns.push("meta");
        }
        if self.delegates.is_some() {
            columns.push("delegates");
        }
        if self.info.is_some() {
            columns.push("info");
        }
        columns
    }

    /// `column = ?` assignments with their bind values.
    pub(crate) fn assignments(&self) -> RepoResult<Vec<(&'static str, Value)>> {
        let mut out = Vec::new();
        if let Some(status) = self.status {
            out.push(("status", Value::Text(status.as_str().to_string())));
        }
        if let Some(name) = &self.name {
            let value = name.clone().map_or(Value::Null, Value::Text);
            out.push(("name", value));
        }
        if let Some(origins) = &self.origins {
            out.push(("origins", Value::Text(encode_json("origins", origins)?)));
        }
        if let Some(meta) = &self.meta {
            out.push(("meta", Value::Text(encode_json("meta", meta)?)));
        }
        if let Some(delegates) = &self.delegates {
            out.push(("delegates", Value::Text(encode_json("delegates", delegates)?)));
        }
        if let Some(info) = &self.info {
            out.push(("info", Value::Text(encode_json("info", info)?)));
        }
        Ok(out)
    }
}
