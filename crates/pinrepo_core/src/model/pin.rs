//! Pin domain model.
//!
//! # Responsibility
//! - Define the pin status record shared by every repository read path.
//! - Provide the status lifecycle enum and owner scoping types.
//!
//! # Invariants
//! - `request_id` is assigned once when the record is first stored and never
//!   changes afterwards.
//! - `pin.cid` and the owning account are fixed for the record lifetime.
//!
//! # See also
//! - docs/architecture/pin-model.md

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Account identifier that scopes pin visibility and mutation.
pub type OwnerId = i64;

/// Externally visible pin request identifier (UUID text).
pub type RequestId = String;

/// Pin lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinState {
    /// Accepted, waiting for a worker.
    Queued,
    /// Content retrieval in progress.
    Pinning,
    /// Content is stored and pinned.
    Pinned,
    /// Pinning gave up.
    Failed,
}

impl PinState {
    /// All states in lifecycle order.
    pub const ALL: [PinState; 4] = [
        PinState::Queued,
        PinState::Pinning,
        PinState::Pinned,
        PinState::Failed,
    ];

    /// Storage/wire label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Pinning => "pinning",
            Self::Pinned => "pinned",
            Self::Failed => "failed",
        }
    }

    /// Parses a storage/wire label. Matching is exact.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(Self::Queued),
            "pinning" => Some(Self::Pinning),
            "pinned" => Some(Self::Pinned),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl Display for PinState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner restriction applied to listing queries.
///
/// `Any` is a deliberate global search mode; callers must opt into it
/// explicitly instead of passing a sentinel owner value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerScope {
    /// Only records belonging to this owner.
    Owner(OwnerId),
    /// Records of every owner.
    Any,
}

impl OwnerScope {
    /// Returns the owner restriction, if any.
    pub fn owner(self) -> Option<OwnerId> {
        match self {
            Self::Owner(owner) => Some(owner),
            Self::Any => None,
        }
    }
}

impl From<OwnerId> for OwnerScope {
    fn from(value: OwnerId) -> Self {
        Self::Owner(value)
    }
}

/// Pin request body: what to pin and how to find it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pin {
    /// Content identifier to pin.
    pub cid: String,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Multiaddrs known to provide the content.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub origins: Vec<String>,
    /// Free-form client metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

impl Pin {
    /// Creates a pin body for `cid` with no name, origins or metadata.
    pub fn new(cid: impl Into<String>) -> Self {
        Self {
            cid: cid.into(),
            ..Self::default()
        }
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Canonical pin status record returned by the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinStatus {
    /// Serialized as `requestid` to match the pinning service wire shape.
    /// Empty on a candidate that has not been stored yet.
    #[serde(rename = "requestid")]
    pub request_id: RequestId,
    pub status: PinState,
    /// Creation time in epoch milliseconds. `0` on a candidate lets the
    /// store clock decide.
    pub created: i64,
    pub pin: Pin,
    #[serde(default)]
    pub delegates: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub info: BTreeMap<String, String>,
}

impl PinStatus {
    /// Creates a queued candidate record without a request id.
    pub fn queued(pin: Pin) -> Self {
        Self {
            request_id: RequestId::new(),
            status: PinState::Queued,
            created: 0,
            pin,
            delegates: Vec::new(),
            info: BTreeMap::new(),
        }
    }

    /// Returns the pinned content identifier.
    pub fn cid(&self) -> &str {
        self.pin.cid.as_str()
    }
}

/// Listing envelope: total match count plus one page of records.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PinResults {
    /// Matches before the page limit was applied.
    pub count: u64,
    /// Page ordered by creation time, newest first.
    pub results: Vec<PinStatus>,
}
