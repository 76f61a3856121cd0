/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Data model for the navigation tracker.
//!
//! Core structures:
//! - `Node`: one visited page, owned by exactly one `Session`
//! - `Session`: a forest of nodes stored as a flat id-keyed table
//! - `StoreState`: every session plus the ephemeral tab bookkeeping

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod session;

pub use session::{Node, Session};

/// Stable node identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable session identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Browser tab identity, as handed out by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub i32);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persisted user settings, read by retention and the node cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub max_sessions: usize,
    pub max_nodes_per_session: usize,
    pub auto_clean_old_sessions: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_sessions: 50,
            max_nodes_per_session: 500,
            auto_clean_old_sessions: true,
        }
    }
}

/// Partial settings change. Absent fields are left alone; zero caps reset to
/// the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsUpdate {
    pub max_sessions: Option<usize>,
    pub max_nodes_per_session: Option<usize>,
    pub auto_clean_old_sessions: Option<bool>,
}

impl Settings {
    pub fn apply(&mut self, update: SettingsUpdate) {
        let defaults = Settings::default();
        if let Some(max) = update.max_sessions {
            self.max_sessions = if max == 0 { defaults.max_sessions } else { max };
        }
        if let Some(max) = update.max_nodes_per_session {
            self.max_nodes_per_session = if max == 0 {
                defaults.max_nodes_per_session
            } else {
                max
            };
        }
        if let Some(auto_clean) = update.auto_clean_old_sessions {
            self.auto_clean_old_sessions = auto_clean;
        }
    }
}

/// The single shared mutable resource.
///
/// `tab_to_node` and `pending_source_tab` are scoped to open tabs and are
/// pruned when a tab closes. `tab_to_node` additionally only ever points into
/// the current session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreState {
    pub sessions: HashMap<SessionId, Session>,
    pub current_session: Option<SessionId>,
    pub tab_to_node: HashMap<TabId, NodeId>,
    pub pending_source_tab: HashMap<TabId, TabId>,
    pub settings: Settings,
}

impl StoreState {
    pub fn current(&self) -> Option<&Session> {
        self.current_session.and_then(|id| self.sessions.get(&id))
    }

    pub fn current_mut(&mut self) -> Option<&mut Session> {
        let id = self.current_session?;
        self.sessions.get_mut(&id)
    }

    /// Node currently mapped to `tab`, if it still exists in the current session.
    pub fn mapped_node(&self, tab: TabId) -> Option<&Node> {
        let node_id = self.tab_to_node.get(&tab)?;
        self.current()?.node(*node_id)
    }

    /// Drop tab mappings whose node no longer exists in the current session.
    pub(crate) fn prune_dangling_tab_mappings(&mut self) {
        let current = self.current_session.and_then(|id| self.sessions.get(&id));
        match current {
            Some(session) => self
                .tab_to_node
                .retain(|_, node_id| session.contains(*node_id)),
            None => self.tab_to_node.clear(),
        }
    }

    /// Check the structural invariants of every session.
    pub fn check_invariants(&self) -> Result<(), String> {
        for (id, session) in &self.sessions {
            if session.id != *id {
                return Err(format!("session {id} stored under a different key"));
            }
            session.check_invariants()?;
        }
        if let Some(current) = self.current_session
            && !self.sessions.contains_key(&current)
        {
            return Err(format!("current session {current} does not exist"));
        }
        Ok(())
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
