//! Craft history export with BLAKE3 hashing.
//!
//! Provides [`HistoryExport`] -- a serializable copy of the whole craft
//! ledger, in creation order, with a BLAKE3 content hash so a saved log can
//! be checked for truncation or hand edits.
//!
//! # Format
//!
//! ```text
//! {
//!   "exported_at": "2020-05-17T20:10:00Z",
//!   "session_count": 2,
//!   "sessions": {
//!     "<session id>": { "id", "timestamp", "recipe", "summary", "history" },
//!     ...
//!   },
//!   "hash": "<64 hex chars>"
//! }
//! ```
//!
//! `sessions` is an ordered mapping, oldest session first. `summary` and each
//! `history` entry use the display field names (`Progress`, `Quality`,
//! `CurrentCondition`, ...).

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::Serializer;
use serde::Serialize;

use craftlog_state::craft::{CraftSession, CraftStep, Recipe};
use craftlog_state::ledger::CraftLedger;

// ---------------------------------------------------------------------------
// CraftRecord
// ---------------------------------------------------------------------------

/// One exported craft session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CraftRecord {
    pub id: String,
    /// Local, human-readable creation time.
    pub timestamp: String,
    pub recipe: Recipe,
    /// Display projection of the session's latest state.
    pub summary: CraftStep,
    /// Every accepted step, oldest first.
    pub history: Vec<CraftStep>,
}

impl CraftRecord {
    pub fn from_session(session: &CraftSession) -> Self {
        Self {
            id: session.id(),
            timestamp: session.timestamp(),
            recipe: session.recipe().clone(),
            summary: session.info(),
            history: session.history().to_vec(),
        }
    }
}

/// Serializes records as a map keyed by session id, preserving order.
struct RecordMap<'a>(&'a [CraftRecord]);

impl Serialize for RecordMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|record| (&record.id, record)))
    }
}

fn serialize_records<S: Serializer>(
    records: &[CraftRecord],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    RecordMap(records).serialize(serializer)
}

// ---------------------------------------------------------------------------
// HistoryExport
// ---------------------------------------------------------------------------

/// The full craft ledger, ready to be written out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryExport {
    pub exported_at: DateTime<Utc>,
    pub session_count: usize,
    #[serde(serialize_with = "serialize_records")]
    pub sessions: Vec<CraftRecord>,
    /// BLAKE3 hex digest (64 lowercase hex chars) of `exported_at` and
    /// `sessions`.
    pub hash: String,
}

/// Compute the BLAKE3 hex digest over the exported content.
///
/// The hash field itself is not included (it is derived).
fn compute_hash(
    exported_at: &DateTime<Utc>,
    sessions: &[CraftRecord],
) -> Result<String, serde_json::Error> {
    #[derive(Serialize)]
    struct HashableExport<'a> {
        exported_at: &'a DateTime<Utc>,
        sessions: RecordMap<'a>,
    }

    let hashable = HashableExport {
        exported_at,
        sessions: RecordMap(sessions),
    };

    let json_bytes = serde_json::to_vec(&hashable)?;
    Ok(blake3::hash(&json_bytes).to_hex().to_string())
}

impl HistoryExport {
    /// Capture every session of `ledger`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the records cannot be serialized for hashing.
    pub fn from_ledger(
        ledger: &CraftLedger,
        exported_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        let sessions: Vec<CraftRecord> = ledger.iter().map(CraftRecord::from_session).collect();
        let hash = compute_hash(&exported_at, &sessions)?;
        Ok(Self {
            exported_at,
            session_count: sessions.len(),
            sessions,
            hash,
        })
    }

    /// Recompute the hash and compare it with the recorded one. Content that
    /// can no longer be serialized does not verify.
    pub fn verify(&self) -> bool {
        self.session_count == self.sessions.len()
            && compute_hash(&self.exported_at, &self.sessions)
                .is_ok_and(|hash| hash == self.hash)
    }

    /// Pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Default file name, e.g. `craftlog-2020-05-17T20-10-00.000Z.json`.
    pub fn file_name(&self) -> String {
        let stamp = self
            .exported_at
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace(':', "-");
        format!("craftlog-{stamp}.json")
    }

    /// Write the export into `dir` under [`file_name`](Self::file_name).
    ///
    /// Writes to a temporary file then renames it, so a partially written log
    /// never appears under the final name. Creates `dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization, directory creation, writing, or
    /// renaming fails.
    pub fn write_to_dir(&self, dir: &Path) -> Result<PathBuf, anyhow::Error> {
        std::fs::create_dir_all(dir)
            .map_err(|e| anyhow::anyhow!("failed to create {}: {e}", dir.display()))?;

        let path = dir.join(self.file_name());
        let tmp_path = dir.join(format!("{}.tmp", self.file_name()));
        let json = self.to_json_pretty()?;

        std::fs::write(&tmp_path, json)
            .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &path)
            .map_err(|e| anyhow::anyhow!("failed to move export into place: {e}"))?;

        tracing::info!(
            path = %path.display(),
            sessions = self.session_count,
            "craft history exported"
        );
        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
