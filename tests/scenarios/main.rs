/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::sync::Arc;
use std::time::Duration;

use navtrail::navigation::{BrowserEvent, TransitionQualifier, TransitionType};
use navtrail::runtime::{NavigationTracker, StaticTabQuery, UiCommand, commands};
use navtrail::store::{MemoryStateStorage, RedbStateStorage, StoreConfig, StoreHandle};
use navtrail::tree::DedupScope;
use navtrail::{StoreState, TabId};

struct Harness {
    tracker: NavigationTracker<Arc<StaticTabQuery>>,
    tabs: Arc<StaticTabQuery>,
    storage: Arc<MemoryStateStorage>,
}

impl Harness {
    async fn new(config: StoreConfig) -> Self {
        let storage = Arc::new(MemoryStateStorage::new());
        let store = StoreHandle::spawn(storage.clone(), config).await.unwrap();
        let tabs = Arc::new(StaticTabQuery::new());
        Self {
            tracker: NavigationTracker::new(store, Arc::clone(&tabs)),
            tabs,
            storage,
        }
    }

    fn send(&self, event: BrowserEvent) {
        self.tabs.observe(&event);
        self.tracker.dispatch(event);
    }

    fn navigate(&self, tab: i32, url: &str, transition: &str, qualifiers: &[&str]) {
        self.send(BrowserEvent::NavigationCommitted {
            tab_id: TabId(tab),
            frame_id: 0,
            url: url.to_string(),
            transition_type: TransitionType::from(transition),
            transition_qualifiers: qualifiers.iter().map(|q| TransitionQualifier::from(*q)).collect(),
            title: Some(format!("Page {url}")),
            fav_icon_url: None,
        });
    }

    async fn settle(&self) -> Arc<StoreState> {
        self.tracker.flush().await;
        let state = self.tracker.store().snapshot();
        assert!(state.check_invariants().is_ok(), "{:?}", state.check_invariants());
        state
    }
}

#[tokio::test]
async fn typed_navigation_starts_a_session_with_one_root() {
    let h = Harness::new(StoreConfig::default()).await;
    h.navigate(1, "https://a.example", "typed", &[]);
    let state = h.settle().await;

    assert_eq!(state.sessions.len(), 1);
    let session = state.current().unwrap();
    assert_eq!(session.root_nodes.len(), 1);
    let root = session.node(session.root_nodes[0]).unwrap();
    assert_eq!(root.url, "https://a.example");
    assert_eq!(root.visit_count, 1);
    assert_eq!(session.name, "Page https://a.example");
}

#[tokio::test]
async fn link_in_same_tab_becomes_a_child() {
    let h = Harness::new(StoreConfig::default()).await;
    h.navigate(1, "https://a.example", "typed", &[]);
    h.navigate(1, "https://a.example/page2", "link", &[]);
    let state = h.settle().await;

    let session = state.current().unwrap();
    assert_eq!(session.root_nodes.len(), 1);
    assert_eq!(session.node_count(), 2);
    let root = session.root_nodes[0];
    let child = session.children_of(Some(root))[0];
    assert_eq!(session.node(child).unwrap().url, "https://a.example/page2");
}

#[tokio::test]
async fn explicit_origin_tab_links_new_tab_to_opener() {
    let h = Harness::new(StoreConfig::default()).await;
    h.navigate(1, "https://a.example", "typed", &[]);
    h.settle().await;
    h.send(BrowserEvent::TabCreated {
        tab_id: TabId(2),
        opener_tab_id: Some(TabId(1)),
    });
    h.navigate(2, "https://b.example", "link", &["from_1"]);
    let state = h.settle().await;

    let session = state.current().unwrap();
    let opener = state.tab_to_node[&TabId(1)];
    let opened = state.tab_to_node[&TabId(2)];
    assert_eq!(session.node(opened).unwrap().url, "https://b.example");
    assert_eq!(session.node(opened).unwrap().parent_id, Some(opener));
    assert_eq!(session.root_nodes.len(), 1);
}

#[tokio::test]
async fn concurrent_tabs_lose_no_update() {
    let h = Harness::new(StoreConfig::default()).await;
    h.storage.set_write_delay(Duration::from_millis(5));
    h.navigate(1, "https://one.example", "typed", &[]);
    h.navigate(2, "https://two.example", "typed", &[]);
    let state = h.settle().await;

    let session = state.current().unwrap();
    let urls: Vec<&str> = session
        .root_nodes
        .iter()
        .map(|id| session.node(*id).unwrap().url.as_str())
        .collect();
    assert_eq!(urls.len(), 2);
    assert!(urls.contains(&"https://one.example"));
    assert!(urls.contains(&"https://two.example"));
    assert_eq!(h.storage.saved().as_ref(), Some(state.as_ref()));
}

#[tokio::test]
async fn reload_and_duplicate_signals_do_not_grow_the_tree() {
    let h = Harness::new(StoreConfig::default()).await;
    h.navigate(1, "https://a.example", "typed", &[]);
    h.navigate(1, "https://a.example", "link", &[]);
    h.send(BrowserEvent::HistoryStateUpdated {
        tab_id: TabId(1),
        frame_id: 0,
        url: "https://a.example".into(),
        title: None,
        fav_icon_url: None,
    });
    h.navigate(1, "https://a.example", "reload", &[]);
    let state = h.settle().await;

    let session = state.current().unwrap();
    assert_eq!(session.node_count(), 1);
    assert_eq!(session.node(session.root_nodes[0]).unwrap().visit_count, 1);
}

#[tokio::test]
async fn spa_routes_become_children_of_the_loaded_page() {
    let h = Harness::new(StoreConfig::default()).await;
    h.navigate(1, "https://app.example/", "typed", &[]);
    h.send(BrowserEvent::HistoryStateUpdated {
        tab_id: TabId(1),
        frame_id: 0,
        url: "https://app.example/inbox".into(),
        title: Some("Inbox".into()),
        fav_icon_url: None,
    });
    let state = h.settle().await;

    let session = state.current().unwrap();
    let root = session.root_nodes[0];
    let inbox = state.tab_to_node[&TabId(1)];
    assert_eq!(session.node(inbox).unwrap().parent_id, Some(root));
    assert_eq!(session.node(inbox).unwrap().title, "Inbox");
}

#[tokio::test]
async fn global_dedup_collapses_repeat_visits_across_the_tree() {
    let config = StoreConfig {
        dedup_scope: DedupScope::Global,
        ..StoreConfig::default()
    };
    let h = Harness::new(config).await;
    h.navigate(1, "https://hub.example", "typed", &[]);
    h.navigate(1, "https://hub.example/a", "link", &[]);
    h.navigate(1, "https://hub.example", "link", &[]);
    let state = h.settle().await;

    let session = state.current().unwrap();
    assert_eq!(session.node_count(), 2);
    let hub = session.root_nodes[0];
    assert_eq!(session.node(hub).unwrap().visit_count, 2);
    assert_eq!(state.tab_to_node[&TabId(1)], hub);
}

#[tokio::test]
async fn scoped_dedup_keeps_separate_occurrences() {
    let h = Harness::new(StoreConfig::default()).await;
    h.navigate(1, "https://hub.example", "typed", &[]);
    h.navigate(1, "https://hub.example/a", "link", &[]);
    h.navigate(1, "https://hub.example", "link", &[]);
    let state = h.settle().await;

    let session = state.current().unwrap();
    assert_eq!(session.node_count(), 3);
    assert_eq!(session.root_nodes.len(), 1);
}

#[tokio::test]
async fn closing_a_tab_mid_session_leaves_no_dangling_keys() {
    let h = Harness::new(StoreConfig::default()).await;
    h.send(BrowserEvent::NavigationTargetCreated {
        source_tab_id: TabId(1),
        tab_id: TabId(2),
    });
    h.navigate(2, "https://b.example", "typed", &[]);
    h.send(BrowserEvent::TabRemoved { tab_id: TabId(2) });
    h.send(BrowserEvent::TabRemoved { tab_id: TabId(2) });
    let state = h.settle().await;

    assert!(state.tab_to_node.is_empty());
    assert!(state.pending_source_tab.is_empty());
}

#[tokio::test]
async fn ui_commands_edit_the_tree() {
    let h = Harness::new(StoreConfig::default()).await;
    h.navigate(1, "https://a.example", "typed", &[]);
    h.navigate(1, "https://a.example/b", "link", &[]);
    h.navigate(2, "https://c.example", "typed", &[]);
    let state = h.settle().await;
    let store = h.tracker.store();
    let session_id = state.current_session.unwrap();
    let a = state.current().unwrap().root_nodes[0];
    let b = state.current().unwrap().children_of(Some(a))[0];
    let c = state.tab_to_node[&TabId(2)];

    let invalid = commands::execute(
        store,
        UiCommand::MoveNode {
            session_id,
            node_id: a,
            new_parent_id: Some(b),
        },
    )
    .await;
    assert!(!invalid.success);
    assert_eq!(store.snapshot().as_ref(), state.as_ref());

    let moved = commands::execute(
        store,
        UiCommand::MoveNode {
            session_id,
            node_id: a,
            new_parent_id: Some(c),
        },
    )
    .await;
    assert!(moved.success);

    let deleted = commands::execute(
        store,
        UiCommand::DeleteNode {
            session_id,
            node_id: c,
        },
    )
    .await;
    assert_eq!(deleted.removed.map(|r| r.len()), Some(3));
    let after = store.snapshot();
    assert_eq!(after.current().unwrap().node_count(), 0);
    assert!(after.tab_to_node.is_empty());
}

#[tokio::test]
async fn redb_state_survives_a_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    {
        let storage = Arc::new(RedbStateStorage::open(dir.path()).unwrap());
        let store = StoreHandle::spawn(storage, StoreConfig::default()).await.unwrap();
        store.create_session(Some("Before restart".into())).await.unwrap();
        store.shutdown().await;
    }

    let storage = Arc::new(RedbStateStorage::open(dir.path()).unwrap());
    let store = StoreHandle::spawn(storage, StoreConfig::default()).await.unwrap();
    let listed = commands::execute(&store, UiCommand::GetSessions).await;
    let sessions = listed.sessions.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].name, "Before restart");
}
