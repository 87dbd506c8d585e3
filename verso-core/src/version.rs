use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Opaque identifier for one immutable build of the dataset.
///
/// Tags are random 128-bit tokens rendered as strings. They carry no
/// ordering and no provenance; equality is the only meaningful
/// comparison. A tag is minted once, published at most once, and never
/// reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionTag(String);

impl VersionTag {
    /// Mint a fresh, globally unique tag.
    pub fn mint() -> Self {
        VersionTag(Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VersionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VersionTag {
    fn from(value: String) -> Self {
        VersionTag(value)
    }
}

impl From<&str> for VersionTag {
    fn from(value: &str) -> Self {
        VersionTag(value.to_string())
    }
}

/// The one cluster-wide record naming the currently active version.
///
/// Updates replace the record wholesale; concurrent writers race under
/// last-write-wins and the record is never merged field by field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveVersionRecord {
    pub tag: VersionTag,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

impl ActiveVersionRecord {
    pub fn new(tag: VersionTag, updated_by: &str) -> Self {
        Self {
            tag,
            updated_at: Utc::now(),
            updated_by: updated_by.to_string(),
        }
    }
}

/// Result of a version-disable request.
///
/// Disabling is advisory bookkeeping for retired versions, not part of
/// the switch itself; a version that was never disabled is still
/// superseded the moment the active record stops naming it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableOutcome {
    /// A retirement marker was written for the tag.
    Disabled,
    /// The tag is currently active or already retired; nothing was written.
    Ignored,
}
