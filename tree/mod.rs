/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Tree mutation: node creation with dedup, moves, and cascading deletes.
//!
//! Every function takes the store state by `&mut` and either applies its whole
//! change or returns an error having changed nothing structural. The store
//! actor is the only caller that touches the authoritative state.

use serde::{Deserialize, Serialize};

use crate::errors::TrackerError;
use crate::model::{Node, NodeId, Session, SessionId, StoreState, TabId};
use crate::navigation::{TabInfo, is_trackable_url};
use crate::sessions;

mod debounce;

pub use debounce::{DEFAULT_DEBOUNCE_WINDOW, NavigationDebouncer};

/// Search space used to decide whether a navigation revisits an existing node.
///
/// `Global` collapses every visit to a URL onto one node anywhere in the
/// session. `Scoped` only looks at the candidate parent's direct children (or
/// the root list), so the same URL can appear at several tree positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupScope {
    Global,
    #[default]
    Scoped,
}

impl std::str::FromStr for DedupScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(DedupScope::Global),
            "scoped" => Ok(DedupScope::Scoped),
            other => Err(format!("unknown dedup scope '{other}' (expected global or scoped)")),
        }
    }
}

/// A page about to be recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageVisit {
    pub url: String,
    pub title: Option<String>,
    pub fav_icon_url: Option<String>,
    pub tab_id: Option<TabId>,
}

impl PageVisit {
    pub fn from_tab(tab_id: TabId, info: &TabInfo) -> Self {
        Self {
            url: info.url.clone(),
            title: info.title.clone(),
            fav_icon_url: info.fav_icon_url.clone(),
            tab_id: Some(tab_id),
        }
    }
}

/// Existing node for `url` within the dedup scope of `parent`.
pub fn find_existing(
    session: &Session,
    scope: DedupScope,
    parent: Option<NodeId>,
    url: &str,
) -> Option<NodeId> {
    let matches = |id: &NodeId| session.node(*id).is_some_and(|n| n.url == url);
    match scope {
        DedupScope::Global => session.preorder().into_iter().find(|id| matches(id)),
        DedupScope::Scoped => session.children_of(parent).iter().copied().find(|id| matches(id)),
    }
}

/// Revisit or create a node inside one session. Does not touch tab mappings.
fn upsert_in_session(
    session: &mut Session,
    scope: DedupScope,
    visit: &PageVisit,
    parent: Option<NodeId>,
    max_nodes: usize,
    now_ms: u64,
) -> Result<NodeId, TrackerError> {
    let parent = parent.filter(|p| session.contains(*p));

    if let Some(existing) = find_existing(session, scope, parent, &visit.url) {
        if let Some(node) = session.node_mut(existing) {
            node.visit_count = node.visit_count.saturating_add(1);
            node.timestamp_ms = now_ms;
            if let Some(title) = visit.title.as_deref().filter(|t| !t.is_empty()) {
                node.title = title.to_string();
            }
            if visit.fav_icon_url.is_some() {
                node.fav_icon_url = visit.fav_icon_url.clone();
            }
            log::debug!(
                "tree: revisited {} ({} visits)",
                node.url,
                node.visit_count
            );
        }
        return Ok(existing);
    }

    if session.node_count() >= max_nodes {
        log::warn!(
            "tree: session {} is at its {max_nodes}-node cap, dropping {}",
            session.id,
            visit.url
        );
        return Err(TrackerError::SessionFull(session.id));
    }

    let node = Node::new(
        visit.url.clone(),
        visit.title.clone(),
        visit.fav_icon_url.clone(),
        parent,
        now_ms,
    );
    let id = node.id;
    session.all_nodes.insert(id, node);
    session.attach(id, parent);
    if parent.is_none() {
        sessions::adopt_first_root_title(session, visit.title.as_deref());
    }
    match parent {
        Some(parent) => log::debug!("tree: added {} under {parent}", visit.url),
        None => log::debug!("tree: added root {}", visit.url),
    }
    Ok(id)
}

/// Record a navigation in the current session, creating the session if needed.
///
/// Fails closed on out-of-scope URLs and on a repeat of the tab's previous
/// navigation inside the debounce window.
pub fn create_or_update(
    state: &mut StoreState,
    debouncer: &mut NavigationDebouncer,
    scope: DedupScope,
    visit: &PageVisit,
    parent: Option<NodeId>,
    now_ms: u64,
) -> Result<NodeId, TrackerError> {
    if !is_trackable_url(&visit.url) {
        return Err(TrackerError::OutOfScopeUrl(visit.url.clone()));
    }
    if let Some(tab) = visit.tab_id
        && debouncer.is_duplicate(tab, &visit.url, now_ms)
    {
        return Err(TrackerError::DuplicateNavigation(visit.url.clone()));
    }

    let session_id = sessions::ensure_current_session(state, now_ms);
    let max_nodes = state.settings.max_nodes_per_session;
    let session = state
        .sessions
        .get_mut(&session_id)
        .ok_or(TrackerError::SessionNotFound(session_id))?;
    let id = upsert_in_session(session, scope, visit, parent, max_nodes, now_ms)?;

    if let Some(tab) = visit.tab_id {
        state.tab_to_node.insert(tab, id);
    }
    Ok(id)
}

/// Node for the page currently shown in `source_tab`, created as a root if
/// that tab has not been mapped yet.
pub fn resolve_source_node(
    state: &mut StoreState,
    debouncer: &mut NavigationDebouncer,
    scope: DedupScope,
    source_tab: TabId,
    source_page: Option<&TabInfo>,
    now_ms: u64,
) -> Option<NodeId> {
    if let Some(node) = state.mapped_node(source_tab) {
        return Some(node.id);
    }
    let page = source_page?;
    let visit = PageVisit::from_tab(source_tab, page);
    match create_or_update(state, debouncer, scope, &visit, None, now_ms) {
        Ok(id) => Some(id),
        Err(e) => {
            log::debug!("tree: no node for source tab {source_tab}: {e}");
            None
        },
    }
}

/// Reload of the mapped page: refresh timestamp and title, nothing else.
pub fn refresh_in_place(
    state: &mut StoreState,
    node_id: NodeId,
    title: Option<&str>,
    now_ms: u64,
) -> Result<NodeId, TrackerError> {
    let node = state
        .current_mut()
        .and_then(|s| s.node_mut(node_id))
        .ok_or(TrackerError::NodeNotFound(node_id))?;
    node.timestamp_ms = now_ms;
    if let Some(title) = title.filter(|t| !t.is_empty()) {
        node.title = title.to_string();
    }
    Ok(node_id)
}

/// Single-page-app route change within a tab.
///
/// Needs an already mapped node. A route back to a page already in the dedup
/// scope only moves the tab pointer; a new route becomes a child of the mapped
/// node. Returns `None` when there was nothing to do.
pub fn apply_route_update(
    state: &mut StoreState,
    debouncer: &mut NavigationDebouncer,
    scope: DedupScope,
    visit: &PageVisit,
    now_ms: u64,
) -> Result<Option<NodeId>, TrackerError> {
    if !is_trackable_url(&visit.url) {
        return Err(TrackerError::OutOfScopeUrl(visit.url.clone()));
    }
    let Some(tab) = visit.tab_id else {
        return Ok(None);
    };
    let Some(mapped) = state.mapped_node(tab) else {
        return Ok(None);
    };
    if mapped.url == visit.url {
        return Ok(None);
    }
    let mapped_id = mapped.id;

    let existing = state
        .current()
        .and_then(|s| find_existing(s, scope, Some(mapped_id), &visit.url))
        .filter(|id| *id != mapped_id);
    if let Some(existing) = existing {
        state.tab_to_node.insert(tab, existing);
        log::debug!("tree: tab {tab} routed back to {existing}");
        return Ok(Some(existing));
    }

    create_or_update(state, debouncer, scope, visit, Some(mapped_id), now_ms).map(Some)
}

/// Explicit add into a named session, bypassing the debounce.
pub fn add_node(
    state: &mut StoreState,
    scope: DedupScope,
    session_id: SessionId,
    visit: &PageVisit,
    parent: Option<NodeId>,
    now_ms: u64,
) -> Result<NodeId, TrackerError> {
    if !is_trackable_url(&visit.url) {
        return Err(TrackerError::OutOfScopeUrl(visit.url.clone()));
    }
    let max_nodes = state.settings.max_nodes_per_session;
    let session = state
        .sessions
        .get_mut(&session_id)
        .ok_or(TrackerError::SessionNotFound(session_id))?;
    if let Some(parent) = parent
        && !session.contains(parent)
    {
        return Err(TrackerError::NodeNotFound(parent));
    }
    let id = upsert_in_session(session, scope, visit, parent, max_nodes, now_ms)?;

    if let Some(tab) = visit.tab_id
        && state.current_session == Some(session_id)
    {
        state.tab_to_node.insert(tab, id);
    }
    Ok(id)
}

fn session_mut(state: &mut StoreState, id: SessionId) -> Result<&mut Session, TrackerError> {
    state
        .sessions
        .get_mut(&id)
        .ok_or(TrackerError::SessionNotFound(id))
}

/// Re-parent `node` (with its subtree) under `new_parent`, or make it a root.
pub fn move_node(
    state: &mut StoreState,
    session_id: SessionId,
    node: NodeId,
    new_parent: Option<NodeId>,
) -> Result<(), TrackerError> {
    let session = session_mut(state, session_id)?;
    if !session.contains(node) {
        return Err(TrackerError::NodeNotFound(node));
    }
    if let Some(target) = new_parent {
        if !session.contains(target) {
            return Err(TrackerError::NodeNotFound(target));
        }
        if session.is_self_or_descendant(target, node) {
            return Err(TrackerError::InvalidMove { node, target });
        }
    }
    session.detach(node);
    session.attach(node, new_parent);
    Ok(())
}

/// Move `node` so it becomes the sibling directly before `before`.
pub fn move_node_before(
    state: &mut StoreState,
    session_id: SessionId,
    node: NodeId,
    before: NodeId,
) -> Result<(), TrackerError> {
    let session = session_mut(state, session_id)?;
    if !session.contains(node) {
        return Err(TrackerError::NodeNotFound(node));
    }
    let Some(anchor) = session.node(before) else {
        return Err(TrackerError::NodeNotFound(before));
    };
    if session.is_self_or_descendant(before, node) {
        return Err(TrackerError::InvalidMove {
            node,
            target: before,
        });
    }
    let parent = anchor.parent_id;
    session.detach(node);
    session.attach_before(node, parent, before);
    Ok(())
}

/// Delete `node` and everything below it. Returns the removed ids.
pub fn delete_node(
    state: &mut StoreState,
    session_id: SessionId,
    node: NodeId,
) -> Result<Vec<NodeId>, TrackerError> {
    let session = session_mut(state, session_id)?;
    if !session.contains(node) {
        return Err(TrackerError::NodeNotFound(node));
    }
    let mut removed = vec![node];
    removed.extend(session.descendants(node));

    session.detach(node);
    for id in &removed {
        session.all_nodes.remove(id);
    }
    state.tab_to_node.retain(|_, mapped| !removed.contains(mapped));
    Ok(removed)
}
