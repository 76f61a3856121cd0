/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{NodeId, SessionId};

/// A visited page in a session tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,

    /// Full URL of the page.
    pub url: String,

    /// Page title (or URL if no title was known at creation).
    pub title: String,

    #[serde(default)]
    pub fav_icon_url: Option<String>,

    /// Back-reference only; ownership lives in `Session::all_nodes`.
    #[serde(default)]
    pub parent_id: Option<NodeId>,

    #[serde(default)]
    pub children: Vec<NodeId>,

    /// Last visit, in ms since the epoch.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,

    pub visit_count: u32,
}

impl Node {
    pub fn new(
        url: String,
        title: Option<String>,
        fav_icon_url: Option<String>,
        parent_id: Option<NodeId>,
        now_ms: u64,
    ) -> Self {
        let title = title.filter(|t| !t.is_empty()).unwrap_or_else(|| url.clone());
        Self {
            id: NodeId::new(),
            url,
            title,
            fav_icon_url,
            parent_id,
            children: Vec::new(),
            timestamp_ms: now_ms,
            visit_count: 1,
        }
    }
}

/// One browsing exploration episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,

    #[serde(rename = "startTime")]
    pub start_time_ms: u64,

    pub name: String,

    /// Set once the user names the session; auto-naming never runs afterwards.
    #[serde(default)]
    pub name_locked: bool,

    /// The name has already been taken from the first root's title.
    #[serde(default)]
    pub auto_named: bool,

    #[serde(default)]
    pub root_nodes: Vec<NodeId>,

    #[serde(default)]
    pub all_nodes: HashMap<NodeId, Node>,
}

impl Session {
    pub fn new(name: String, name_locked: bool, now_ms: u64) -> Self {
        Self {
            id: SessionId::new(),
            start_time_ms: now_ms,
            name,
            name_locked,
            auto_named: false,
            root_nodes: Vec::new(),
            all_nodes: HashMap::new(),
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.all_nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.all_nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.all_nodes.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.all_nodes.len()
    }

    /// Direct children of `parent`, or the root list for `None`.
    pub fn children_of(&self, parent: Option<NodeId>) -> &[NodeId] {
        match parent {
            Some(id) => self
                .all_nodes
                .get(&id)
                .map(|n| n.children.as_slice())
                .unwrap_or(&[]),
            None => &self.root_nodes,
        }
    }

    fn sibling_list_mut(&mut self, parent: Option<NodeId>) -> Option<&mut Vec<NodeId>> {
        match parent {
            Some(id) => self.all_nodes.get_mut(&id).map(|n| &mut n.children),
            None => Some(&mut self.root_nodes),
        }
    }

    /// Remove `id` from whichever list currently holds it. The node itself
    /// stays in `all_nodes` with its subtree intact.
    pub(crate) fn detach(&mut self, id: NodeId) {
        let parent = self.all_nodes.get(&id).and_then(|n| n.parent_id);
        let parent = parent.filter(|p| self.all_nodes.contains_key(p));
        if let Some(list) = self.sibling_list_mut(parent) {
            list.retain(|c| *c != id);
        }
        if let Some(node) = self.all_nodes.get_mut(&id) {
            node.parent_id = None;
        }
    }

    /// Append `id` under `parent` (or as a root) and fix the back-reference.
    /// Falls back to the root list when `parent` is not in this session.
    pub(crate) fn attach(&mut self, id: NodeId, parent: Option<NodeId>) {
        let parent = parent.filter(|p| self.all_nodes.contains_key(p));
        if let Some(list) = self.sibling_list_mut(parent) {
            list.push(id);
        }
        if let Some(node) = self.all_nodes.get_mut(&id) {
            node.parent_id = parent;
        }
    }

    /// Insert `id` into `parent`'s list directly before `before`, or append if
    /// `before` is not in that list.
    pub(crate) fn attach_before(&mut self, id: NodeId, parent: Option<NodeId>, before: NodeId) {
        let parent = parent.filter(|p| self.all_nodes.contains_key(p));
        if let Some(list) = self.sibling_list_mut(parent) {
            match list.iter().position(|c| *c == before) {
                Some(index) => list.insert(index, id),
                None => list.push(id),
            }
        }
        if let Some(node) = self.all_nodes.get_mut(&id) {
            node.parent_id = parent;
        }
    }

    /// All strict descendants of `id`, collected with an explicit worklist.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children_of(Some(id)).iter().rev().copied().collect();
        let mut seen = HashSet::new();
        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                continue;
            }
            out.push(next);
            if let Some(node) = self.all_nodes.get(&next) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Whether `candidate` is `ancestor` itself or lies somewhere below it.
    ///
    /// Walks parent links upward, bounded by the node count.
    pub fn is_self_or_descendant(&self, candidate: NodeId, ancestor: NodeId) -> bool {
        let mut cursor = Some(candidate);
        let mut hops = 0;
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            if hops > self.all_nodes.len() {
                return false;
            }
            hops += 1;
            cursor = self.all_nodes.get(&id).and_then(|n| n.parent_id);
        }
        false
    }

    /// Nodes in display order: roots first, each followed by its subtree.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.all_nodes.len());
        let mut stack: Vec<NodeId> = self.root_nodes.iter().rev().copied().collect();
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            out.push(id);
            if let Some(node) = self.all_nodes.get(&id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Verify placement, back-references, and acyclicity.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut placements: HashMap<NodeId, usize> = HashMap::new();
        for root in &self.root_nodes {
            *placements.entry(*root).or_default() += 1;
            match self.all_nodes.get(root) {
                Some(node) if node.parent_id.is_none() => {},
                Some(_) => return Err(format!("root {root} has a parent")),
                None => return Err(format!("root {root} missing from allNodes")),
            }
        }
        for (id, node) in &self.all_nodes {
            if node.id != *id {
                return Err(format!("node {id} stored under a different key"));
            }
            if node.visit_count == 0 {
                return Err(format!("node {id} has zero visits"));
            }
            for child in &node.children {
                *placements.entry(*child).or_default() += 1;
                match self.all_nodes.get(child) {
                    Some(c) if c.parent_id == Some(*id) => {},
                    Some(_) => return Err(format!("child {child} does not point back to {id}")),
                    None => return Err(format!("child {child} missing from allNodes")),
                }
            }
        }
        for id in self.all_nodes.keys() {
            match placements.get(id).copied().unwrap_or(0) {
                1 => {},
                0 => return Err(format!("node {id} is orphaned")),
                n => return Err(format!("node {id} placed {n} times")),
            }
        }
        for id in self.all_nodes.keys() {
            let mut cursor = self.all_nodes.get(id).and_then(|n| n.parent_id);
            let mut hops = 0;
            while let Some(parent) = cursor {
                hops += 1;
                if hops > self.all_nodes.len() {
                    return Err(format!("cycle above node {id}"));
                }
                cursor = self.all_nodes.get(&parent).and_then(|n| n.parent_id);
            }
        }
        Ok(())
    }
}
