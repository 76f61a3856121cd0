/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Session lifecycle: lazy creation, naming, switching and retention.
//!
//! `tab_to_node` only ever points into the current session, so every
//! operation that changes which session is current also clears it. Pending
//! source hints belong to tabs, not sessions, and survive.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::macros::format_description;

use crate::errors::TrackerError;
use crate::model::{Session, SessionId, StoreState};

pub const DEFAULT_NAME_PREFIX: &str = "Browsing session";

/// Auto-derived names are cut to this many characters.
pub const AUTO_NAME_MAX_CHARS: usize = 30;

pub fn default_session_name(now_ms: u64) -> String {
    let format = format_description!("[month repr:short] [day padding:none], [hour]:[minute]");
    let stamp = OffsetDateTime::from_unix_timestamp_nanos(now_ms as i128 * 1_000_000)
        .ok()
        .and_then(|at| at.format(&format).ok());
    match stamp {
        Some(stamp) => format!("{DEFAULT_NAME_PREFIX} {stamp}"),
        None => DEFAULT_NAME_PREFIX.to_string(),
    }
}

fn set_current(state: &mut StoreState, id: Option<SessionId>) {
    if state.current_session != id {
        state.current_session = id;
        state.tab_to_node.clear();
    }
}

/// The current session, created on demand.
pub fn ensure_current_session(state: &mut StoreState, now_ms: u64) -> SessionId {
    if let Some(id) = state.current_session
        && state.sessions.contains_key(&id)
    {
        return id;
    }
    let session = Session::new(default_session_name(now_ms), false, now_ms);
    let id = session.id;
    state.sessions.insert(id, session);
    set_current(state, Some(id));
    log::info!("sessions: started session {id}");
    id
}

/// Create a session and make it current. An explicit name counts as a user
/// rename and disables auto-naming.
pub fn create_session(state: &mut StoreState, name: Option<String>, now_ms: u64) -> SessionId {
    let name = name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    let session = match name {
        Some(name) => Session::new(name, true, now_ms),
        None => Session::new(default_session_name(now_ms), false, now_ms),
    };
    let id = session.id;
    state.sessions.insert(id, session);
    set_current(state, Some(id));
    log::info!("sessions: created session {id}");
    id
}

/// Name the session after its first root page, once.
pub(crate) fn adopt_first_root_title(session: &mut Session, title: Option<&str>) {
    if session.name_locked || session.auto_named || session.root_nodes.len() != 1 {
        return;
    }
    let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) else {
        return;
    };
    session.name = title.chars().take(AUTO_NAME_MAX_CHARS).collect();
    session.auto_named = true;
    log::debug!("sessions: auto-named {} as {:?}", session.id, session.name);
}

pub fn rename_session(
    state: &mut StoreState,
    id: SessionId,
    name: String,
) -> Result<(), TrackerError> {
    let session = state
        .sessions
        .get_mut(&id)
        .ok_or(TrackerError::SessionNotFound(id))?;
    session.name = name;
    session.name_locked = true;
    Ok(())
}

pub fn switch_session(state: &mut StoreState, id: SessionId) -> Result<(), TrackerError> {
    if !state.sessions.contains_key(&id) {
        return Err(TrackerError::SessionNotFound(id));
    }
    set_current(state, Some(id));
    Ok(())
}

pub fn delete_session(state: &mut StoreState, id: SessionId) -> Result<(), TrackerError> {
    if state.sessions.remove(&id).is_none() {
        return Err(TrackerError::SessionNotFound(id));
    }
    if state.current_session == Some(id) {
        set_current(state, None);
    }
    Ok(())
}

pub fn clear_all_sessions(state: &mut StoreState) {
    state.sessions.clear();
    state.current_session = None;
    state.tab_to_node.clear();
    state.pending_source_tab.clear();
}

/// Evict every session beyond `max_sessions`, newest-by-creation first.
///
/// Pure LRU-by-creation: the current session gets no special protection.
pub fn sweep_retention(state: &mut StoreState) -> Vec<SessionId> {
    let settings = state.settings;
    if !settings.auto_clean_old_sessions || state.sessions.len() <= settings.max_sessions {
        return Vec::new();
    }
    let mut ordered: Vec<(u64, SessionId)> = state
        .sessions
        .values()
        .map(|s| (s.start_time_ms, s.id))
        .collect();
    ordered.sort_by(|a, b| b.cmp(a));

    let evicted: Vec<SessionId> = ordered
        .into_iter()
        .skip(settings.max_sessions)
        .map(|(_, id)| id)
        .collect();
    for id in &evicted {
        state.sessions.remove(id);
    }
    if let Some(current) = state.current_session
        && !state.sessions.contains_key(&current)
    {
        set_current(state, None);
    }
    evicted
}

/// Read projection for session listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: SessionId,
    pub name: String,
    pub start_time: u64,
    pub node_count: usize,
    pub root_count: usize,
    pub is_current: bool,
}

/// All sessions, newest first.
pub fn session_summaries(state: &StoreState) -> Vec<SessionSummary> {
    let mut summaries: Vec<SessionSummary> = state
        .sessions
        .values()
        .map(|s| SessionSummary {
            id: s.id,
            name: s.name.clone(),
            start_time: s.start_time_ms,
            node_count: s.node_count(),
            root_count: s.root_nodes.len(),
            is_current: state.current_session == Some(s.id),
        })
        .collect();
    summaries.sort_by(|a, b| (b.start_time, b.id).cmp(&(a.start_time, a.id)));
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeId, TabId};
    use proptest::prelude::*;

    #[test]
    fn default_name_is_dated() {
        let name = default_session_name(0);
        assert_eq!(name, "Browsing session Jan 1, 00:00");
    }

    #[test]
    fn ensure_reuses_current_and_recreates_after_delete() {
        let mut state = StoreState::default();
        let first = ensure_current_session(&mut state, 10);
        assert_eq!(ensure_current_session(&mut state, 20), first);

        delete_session(&mut state, first).unwrap();
        assert_eq!(state.current_session, None);
        let second = ensure_current_session(&mut state, 30);
        assert_ne!(second, first);
        assert_eq!(state.sessions.len(), 1);
    }

    #[test]
    fn switching_sessions_clears_tab_mappings_but_keeps_hints() {
        let mut state = StoreState::default();
        let a = create_session(&mut state, None, 1);
        let b = create_session(&mut state, None, 2);
        assert_eq!(state.current_session, Some(b));
        state.tab_to_node.insert(TabId(1), NodeId::new());
        state.pending_source_tab.insert(TabId(2), TabId(1));

        switch_session(&mut state, a).unwrap();
        assert!(state.tab_to_node.is_empty());
        assert_eq!(state.pending_source_tab.len(), 1);
        assert_eq!(state.current_session, Some(a));
    }

    #[test]
    fn missing_sessions_are_reported() {
        let mut state = StoreState::default();
        let ghost = SessionId::new();
        assert_eq!(
            rename_session(&mut state, ghost, "x".into()),
            Err(TrackerError::SessionNotFound(ghost))
        );
        assert_eq!(switch_session(&mut state, ghost), Err(TrackerError::SessionNotFound(ghost)));
        assert_eq!(delete_session(&mut state, ghost), Err(TrackerError::SessionNotFound(ghost)));
    }

    #[test]
    fn explicit_name_and_rename_lock_auto_naming() {
        let mut state = StoreState::default();
        let named = create_session(&mut state, Some("Research".into()), 1);
        assert!(state.sessions[&named].name_locked);

        let auto = create_session(&mut state, Some("   ".into()), 2);
        assert!(!state.sessions[&auto].name_locked);
        assert!(state.sessions[&auto].name.starts_with(DEFAULT_NAME_PREFIX));

        rename_session(&mut state, auto, "Mine".into()).unwrap();
        let session = state.sessions.get_mut(&auto).unwrap();
        session.root_nodes.push(NodeId::new());
        adopt_first_root_title(session, Some("Page title"));
        assert_eq!(session.name, "Mine");
    }

    #[test]
    fn auto_name_truncates_and_happens_once() {
        let mut session = Session::new("x".into(), false, 0);
        session.root_nodes.push(NodeId::new());
        adopt_first_root_title(&mut session, Some("An extraordinarily long page title indeed"));
        assert_eq!(session.name.chars().count(), AUTO_NAME_MAX_CHARS);

        session.root_nodes.clear();
        session.root_nodes.push(NodeId::new());
        adopt_first_root_title(&mut session, Some("Other"));
        assert_ne!(session.name, "Other");
    }

    #[test]
    fn sweep_respects_auto_clean_flag() {
        let mut state = StoreState::default();
        state.settings.max_sessions = 1;
        state.settings.auto_clean_old_sessions = false;
        create_session(&mut state, None, 1);
        create_session(&mut state, None, 2);
        assert!(sweep_retention(&mut state).is_empty());
        assert_eq!(state.sessions.len(), 2);
    }

    #[test]
    fn sweep_can_evict_the_current_session() {
        let mut state = StoreState::default();
        state.settings.max_sessions = 1;
        let old = create_session(&mut state, None, 1);
        let new = create_session(&mut state, None, 2);
        switch_session(&mut state, old).unwrap();
        state.tab_to_node.insert(TabId(1), NodeId::new());

        assert_eq!(sweep_retention(&mut state), vec![old]);
        assert_eq!(state.current_session, None);
        assert!(state.tab_to_node.is_empty());
        assert!(state.sessions.contains_key(&new));
    }

    proptest! {
        #[test]
        fn sweep_keeps_exactly_the_newest(
            starts in proptest::collection::vec(0u64..1_000, 0..20),
            max in 0usize..8,
        ) {
            let mut state = StoreState::default();
            state.settings.max_sessions = max;
            for start in &starts {
                create_session(&mut state, None, *start);
            }
            let mut expected: Vec<(u64, SessionId)> =
                state.sessions.values().map(|s| (s.start_time_ms, s.id)).collect();
            expected.sort_by(|a, b| b.cmp(a));
            expected.truncate(max);

            sweep_retention(&mut state);

            prop_assert!(state.sessions.len() <= max);
            let mut kept: Vec<(u64, SessionId)> =
                state.sessions.values().map(|s| (s.start_time_ms, s.id)).collect();
            kept.sort_by(|a, b| b.cmp(a));
            prop_assert_eq!(kept, expected);
            prop_assert!(state.check_invariants().is_ok());
        }
    }
}
