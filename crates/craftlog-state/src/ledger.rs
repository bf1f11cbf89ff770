//! Chronological ledger of every craft session seen by this process.
//!
//! The ledger owns the sessions. The "current" session (receiving steps) and
//! the "selected" session (being inspected by the user) are stored as keys,
//! never as separate copies.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::craft::{CraftSession, CraftingInfo};

/// All craft sessions in creation order, plus the current/selected pointers.
#[derive(Debug, Clone, Default)]
pub struct CraftLedger {
    sessions: Vec<CraftSession>,
    index: HashMap<String, usize>,
    current: Option<String>,
    selected: Option<String>,
}

impl CraftLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new session from `info` and make it current.
    ///
    /// Session ids are derived from the creation time. If `created_at` would
    /// produce an id already in the ledger, it is advanced one millisecond at
    /// a time until the id is free.
    pub fn open_session(
        &mut self,
        info: &CraftingInfo,
        created_at: DateTime<Utc>,
    ) -> &mut CraftSession {
        let mut created_at = created_at;
        while self.index.contains_key(&CraftSession::id_for(created_at)) {
            created_at += Duration::milliseconds(1);
        }

        let session = CraftSession::new(info, created_at);
        let id = session.id();
        tracing::info!(
            session = %id,
            recipe = %session.recipe().name,
            recipe_id = session.recipe().id,
            "craft session started"
        );

        let position = self.sessions.len();
        self.sessions.push(session);
        self.index.insert(id.clone(), position);
        self.current = Some(id);
        &mut self.sessions[position]
    }

    // -- current ------------------------------------------------------------

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current(&self) -> Option<&CraftSession> {
        self.current.as_deref().and_then(|id| self.get(id))
    }

    pub fn current_mut(&mut self) -> Option<&mut CraftSession> {
        let position = *self.index.get(self.current.as_deref()?)?;
        self.sessions.get_mut(position)
    }

    /// Detach the current session. The session itself stays in the ledger.
    ///
    /// Returns the id of the session that was current, if any.
    pub fn end_current(&mut self) -> Option<String> {
        let ended = self.current.take();
        if let Some(id) = &ended {
            tracing::info!(session = %id, "craft session no longer current");
        }
        ended
    }

    // -- selection ----------------------------------------------------------

    /// Select the session `id` for inspection.
    ///
    /// Unknown ids leave the selection unchanged and return `false`.
    pub fn select(&mut self, id: &str) -> bool {
        if !self.index.contains_key(id) {
            tracing::debug!(session = %id, "ignoring selection of unknown session");
            return false;
        }
        self.selected = Some(id.to_owned());
        true
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected(&self) -> Option<&CraftSession> {
        self.selected.as_deref().and_then(|id| self.get(id))
    }

    // -- queries ------------------------------------------------------------

    pub fn get(&self, id: &str) -> Option<&CraftSession> {
        self.index.get(id).map(|&position| &self.sessions[position])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sessions in creation order, oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &CraftSession> {
        self.sessions.iter()
    }

    /// Sessions newest first, for listing.
    pub fn recent_first(&self) -> impl Iterator<Item = &CraftSession> {
        self.sessions.iter().rev()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
