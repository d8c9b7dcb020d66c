//! Filter/paginate query builder for pin listings.
//!
//! # Responsibility
//! - Collect optional listing criteria in one value.
//! - Compose the SQL `WHERE` clause and bind values for count and page reads.
//!
//! # Invariants
//! - Criteria combine with `AND`; an absent or empty criterion adds nothing.
//! - Count runs over the filtered set before the page limit.
//! - Pages are ordered `created_at DESC, id DESC`, stable for equal timestamps.

use crate::model::pin::{OwnerId, OwnerScope, PinState};
use crate::repo::pin_row::PIN_COLUMNS;
use rusqlite::types::Value;

/// Name matching strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextMatch {
    /// Case-sensitive equality.
    #[default]
    Exact,
    /// Case-insensitive equality, folding Unicode case.
    IExact,
    /// Case-sensitive substring.
    Partial,
    /// Case-insensitive substring, folding Unicode case.
    IPartial,
}

impl TextMatch {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::IExact => "iexact",
            Self::Partial => "partial",
            Self::IPartial => "ipartial",
        }
    }

    /// Parses a strategy label. Unknown labels fall back to `Exact`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "iexact" => Self::IExact,
            "partial" => Self::Partial,
            "ipartial" => Self::IPartial,
            _ => Self::Exact,
        }
    }
}

/// Listing criteria for pins.
///
/// There is no `Default`: every query names its owner scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinQuery {
    pub owner: OwnerScope,
    /// CID membership. Empty means any CID.
    pub cids: Vec<String>,
    /// Status membership. Empty means any status.
    pub statuses: Vec<PinState>,
    /// Name filter. `None` or empty means any name.
    pub name: Option<String>,
    pub name_match: TextMatch,
    /// Strict upper bound on `created`, epoch milliseconds.
    pub before: Option<i64>,
    /// Strict lower bound on `created`, epoch milliseconds.
    pub after: Option<i64>,
    /// Page size. `None` returns every match.
    pub limit: Option<u32>,
}

impl PinQuery {
    /// Query scoped to one owner.
    pub fn for_owner(owner: OwnerId) -> Self {
        Self::with_scope(OwnerScope::Owner(owner))
    }

    /// Query across every owner.
    pub fn any_owner() -> Self {
        Self::with_scope(OwnerScope::Any)
    }

    pub fn with_scope(owner: OwnerScope) -> Self {
        Self {
            owner,
            cids: Vec::new(),
            statuses: Vec::new(),
            name: None,
            name_match: TextMatch::Exact,
            before: None,
            after: None,
            limit: None,
        }
    }

    pub fn cids<I, S>(mut self, cids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cids = cids.into_iter().map(Into::into).collect();
        self
    }

    pub fn statuses(mut self, statuses: impl IntoIterator<Item = PinState>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    pub fn name(mut self, name: impl Into<String>, strategy: TextMatch) -> Self {
        self.name = Some(name.into());
        self.name_match = strategy;
        self
    }

    pub fn before(mut self, epoch_ms: i64) -> Self {
        self.before = Some(epoch_ms);
        self
    }

    pub fn after(mut self, epoch_ms: i64) -> Self {
        self.after = Some(epoch_ms);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Builds the `WHERE` clause and binds for the active criteria.
    pub fn filter(&self) -> SqlFilter {
        let mut filter = SqlFilter::default();

        if !self.cids.is_empty() {
            filter.push_in(
                "cid",
                self.cids.iter().map(|cid| Value::Text(cid.clone())),
            );
        }

        if let Some(name) = self.name.as_deref().filter(|name| !name.is_empty()) {
            let predicate = match self.name_match {
                TextMatch::Exact => "name = ?",
                TextMatch::IExact => "pin_fold(name) = pin_fold(?)",
                TextMatch::Partial => "instr(name, ?) > 0",
                TextMatch::IPartial => "instr(pin_fold(name), pin_fold(?)) > 0",
            };
            filter.push(predicate, [Value::Text(name.to_string())]);
        }

        if !self.statuses.is_empty() {
            filter.push_in(
                "status",
                self.statuses
                    .iter()
                    .map(|status| Value::Text(status.as_str().to_string())),
            );
        }

        if let Some(owner) = self.owner.owner() {
            filter.push("owner_id = ?", [Value::Integer(owner)]);
        }

        if let Some(before) = self.before.filter(|value| *value != 0) {
            filter.push("created_at < ?", [Value::Integer(before)]);
        }

        if let Some(after) = self.after.filter(|value| *value != 0) {
            filter.push("created_at > ?", [Value::Integer(after)]);
        }

        filter
    }
}

/// SQL predicate list with positional binds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFilter {
    predicates: Vec<String>,
    binds: Vec<Value>,
}

impl SqlFilter {
    fn push(&mut self, predicate: &str, binds: impl IntoIterator<Item = Value>) {
        self.predicates.push(predicate.to_string());
        self.binds.extend(binds);
    }

    fn push_in(&mut self, column: &str, values: impl IntoIterator<Item = Value>) {
        let start = self.binds.len();
        self.binds.extend(values);
        let placeholders = vec!["?"; self.binds.len() - start].join(", ");
        self.predicates.push(format!("{column} IN ({placeholders})"));
    }

    /// ` WHERE ...` or an empty string when no criterion is active.
    pub fn where_clause(&self) -> String {
        if self.predicates.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.predicates.join(" AND "))
        }
    }

    pub fn binds(&self) -> &[Value] {
        &self.binds
    }

    /// Count over the filtered set.
    pub fn count_sql(&self) -> String {
        format!("SELECT COUNT(*) FROM pins{}", self.where_clause())
    }

    /// Page read and its binds, newest first.
    pub fn page_sql(&self, limit: Option<u32>) -> (String, Vec<Value>) {
        let mut sql = format!(
            "SELECT {PIN_COLUMNS} FROM pins{} ORDER BY created_at DESC, id DESC",
            self.where_clause()
        );
        let mut binds = self.binds.clone();
        if let Some(limit) = limit {
            sql.push_str(" LIMIT ?");
            binds.push(Value::Integer(i64::from(limit)));
        }
        (sql, binds)
    }
}
