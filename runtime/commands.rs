/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! UI command surface. Mutations answer `{success, error?}`; reads never fail
//! and answer with an empty value when the target is absent.

use serde::{Deserialize, Serialize};

use crate::errors::TrackerError;
use crate::model::{NodeId, Session, SessionId, Settings, SettingsUpdate, TabId, now_millis};
use crate::ranking::{self, SortMode};
use crate::sessions::{self, SessionSummary};
use crate::store::StoreHandle;
use crate::tree::PageVisit;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum UiCommand {
    GetSessions,
    GetSessionTree {
        #[serde(default)]
        session_id: Option<SessionId>,
    },
    GetSortedSessionTree {
        #[serde(default)]
        session_id: Option<SessionId>,
        #[serde(default)]
        sort_mode: SortMode,
    },
    #[serde(alias = "createNewSession")]
    CreateSession {
        #[serde(default)]
        name: Option<String>,
    },
    SwitchSession {
        session_id: SessionId,
    },
    RenameSession {
        session_id: SessionId,
        name: String,
    },
    DeleteSession {
        session_id: SessionId,
    },
    AddNode {
        session_id: SessionId,
        url: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        fav_icon_url: Option<String>,
        #[serde(default)]
        parent_id: Option<NodeId>,
        #[serde(default)]
        tab_id: Option<TabId>,
    },
    DeleteNode {
        session_id: SessionId,
        node_id: NodeId,
    },
    MoveNode {
        session_id: SessionId,
        node_id: NodeId,
        #[serde(default)]
        new_parent_id: Option<NodeId>,
    },
    MoveNodeBefore {
        session_id: SessionId,
        node_id: NodeId,
        target_node_id: NodeId,
    },
    ClearAllSessions,
    GetSettings,
    UpdateSettings {
        settings: SettingsUpdate,
    },
    Ping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions: Option<Vec<SessionSummary>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_session: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed: Option<Vec<NodeId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Settings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl CommandResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failed(error: &TrackerError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }

    fn from_result<T>(result: Result<T, TrackerError>, fill: impl FnOnce(&mut Self, T)) -> Self {
        match result {
            Ok(value) => {
                let mut response = Self::ok();
                fill(&mut response, value);
                response
            },
            Err(e) => {
                log::debug!("commands: {e}");
                Self::failed(&e)
            },
        }
    }
}

/// Run one UI command against the store.
pub async fn execute(store: &StoreHandle, command: UiCommand) -> CommandResponse {
    match command {
        UiCommand::GetSessions => {
            let snapshot = store.snapshot();
            CommandResponse {
                sessions: Some(sessions::session_summaries(&snapshot)),
                current_session: snapshot.current_session,
                ..CommandResponse::ok()
            }
        },
        UiCommand::GetSessionTree { session_id } => {
            let snapshot = store.snapshot();
            let id = session_id.or(snapshot.current_session);
            CommandResponse {
                session: id.and_then(|id| snapshot.sessions.get(&id).cloned()),
                ..CommandResponse::ok()
            }
        },
        UiCommand::GetSortedSessionTree {
            session_id,
            sort_mode,
        } => {
            let snapshot = store.snapshot();
            let id = session_id.or(snapshot.current_session);
            let now = now_millis();
            CommandResponse {
                session: id
                    .and_then(|id| snapshot.sessions.get(&id))
                    .map(|s| ranking::sorted_session(s, sort_mode, now)),
                ..CommandResponse::ok()
            }
        },
        UiCommand::CreateSession { name } => {
            CommandResponse::from_result(store.create_session(name).await, |r, id| {
                r.session_id = Some(id)
            })
        },
        UiCommand::SwitchSession { session_id } => {
            CommandResponse::from_result(store.switch_session(session_id).await, |_, ()| {})
        },
        UiCommand::RenameSession { session_id, name } => {
            CommandResponse::from_result(store.rename_session(session_id, name).await, |_, ()| {})
        },
        UiCommand::DeleteSession { session_id } => {
            CommandResponse::from_result(store.delete_session(session_id).await, |_, ()| {})
        },
        UiCommand::AddNode {
            session_id,
            url,
            title,
            fav_icon_url,
            parent_id,
            tab_id,
        } => {
            let visit = PageVisit {
                url,
                title,
                fav_icon_url,
                tab_id,
            };
            CommandResponse::from_result(store.add_node(session_id, visit, parent_id).await, |r, id| {
                r.node_id = Some(id)
            })
        },
        UiCommand::DeleteNode {
            session_id,
            node_id,
        } => CommandResponse::from_result(store.delete_node(session_id, node_id).await, |r, removed| {
            r.removed = Some(removed)
        }),
        UiCommand::MoveNode {
            session_id,
            node_id,
            new_parent_id,
        } => CommandResponse::from_result(
            store.move_node(session_id, node_id, new_parent_id).await,
            |_, ()| {},
        ),
        UiCommand::MoveNodeBefore {
            session_id,
            node_id,
            target_node_id,
        } => CommandResponse::from_result(
            store.move_node_before(session_id, node_id, target_node_id).await,
            |_, ()| {},
        ),
        UiCommand::ClearAllSessions => {
            CommandResponse::from_result(store.clear_all_sessions().await, |_, ()| {})
        },
        UiCommand::GetSettings => CommandResponse {
            settings: Some(store.snapshot().settings),
            ..CommandResponse::ok()
        },
        UiCommand::UpdateSettings { settings } => {
            CommandResponse::from_result(store.update_settings(settings).await, |r, s| {
                r.settings = Some(s)
            })
        },
        UiCommand::Ping => CommandResponse {
            version: Some(crate::VERSION.to_string()),
            ..CommandResponse::ok()
        },
    }
}
