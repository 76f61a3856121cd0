/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Platform navigation events and the metadata attached to them.
//!
//! Everything here is plain data: parsing of the platform's transition strings,
//! the URL scope check, and the event envelope consumed by the runtime.

use serde::{Deserialize, Serialize};

use crate::model::TabId;

pub mod classifier;
pub mod tabs;

pub use classifier::{ClassifierInput, ClassifierPolicy, Decision, MappedNode, classify};

const TRACKED_SCHEMES: &[&str] = &["http", "https"];

/// Whether a URL belongs to the trackable scope.
///
/// Only well-formed `http`/`https` URLs qualify. Internal browser pages,
/// extension pages, `file:`, `data:`, `javascript:` and unparsable input are
/// all rejected.
pub fn is_trackable_url(url: &str) -> bool {
    let url = url.trim();
    if url.is_empty() {
        return false;
    }
    match url::Url::parse(url) {
        Ok(parsed) => TRACKED_SCHEMES.contains(&parsed.scheme()) && parsed.host().is_some(),
        Err(_) => false,
    }
}

/// How a navigation was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransitionType {
    Link,
    Typed,
    AutoBookmark,
    AutoSubframe,
    ManualSubframe,
    Generated,
    AutoToplevel,
    FormSubmit,
    Reload,
    Keyword,
    KeywordGenerated,
    Unknown,
}

impl TransitionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransitionType::Link => "link",
            TransitionType::Typed => "typed",
            TransitionType::AutoBookmark => "auto_bookmark",
            TransitionType::AutoSubframe => "auto_subframe",
            TransitionType::ManualSubframe => "manual_subframe",
            TransitionType::Generated => "generated",
            TransitionType::AutoToplevel => "auto_toplevel",
            TransitionType::FormSubmit => "form_submit",
            TransitionType::Reload => "reload",
            TransitionType::Keyword => "keyword",
            TransitionType::KeywordGenerated => "keyword_generated",
            TransitionType::Unknown => "unknown",
        }
    }

    /// Address-bar entries: typed URLs, omnibox searches and keyword searches.
    pub fn is_address_bar_entry(self) -> bool {
        matches!(
            self,
            TransitionType::Typed
                | TransitionType::Generated
                | TransitionType::Keyword
                | TransitionType::KeywordGenerated
        )
    }
}

impl From<&str> for TransitionType {
    fn from(value: &str) -> Self {
        match value {
            "link" => TransitionType::Link,
            "typed" => TransitionType::Typed,
            "auto_bookmark" => TransitionType::AutoBookmark,
            "auto_subframe" => TransitionType::AutoSubframe,
            "manual_subframe" => TransitionType::ManualSubframe,
            "generated" => TransitionType::Generated,
            "auto_toplevel" => TransitionType::AutoToplevel,
            "form_submit" => TransitionType::FormSubmit,
            "reload" => TransitionType::Reload,
            "keyword" => TransitionType::Keyword,
            "keyword_generated" => TransitionType::KeywordGenerated,
            _ => TransitionType::Unknown,
        }
    }
}

impl From<String> for TransitionType {
    fn from(value: String) -> Self {
        TransitionType::from(value.as_str())
    }
}

impl From<TransitionType> for String {
    fn from(value: TransitionType) -> Self {
        value.as_str().to_string()
    }
}

/// Modifier attached to a transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransitionQualifier {
    /// The navigation started from the address bar (in-page search).
    FromAddressBar,
    /// Explicit origin tab: "opened from tab X".
    FromTab(TabId),
    ForwardBack,
    ClientRedirect,
    ServerRedirect,
    Other(String),
}

impl From<&str> for TransitionQualifier {
    fn from(value: &str) -> Self {
        match value {
            "from_address_bar" => TransitionQualifier::FromAddressBar,
            "forward_back" => TransitionQualifier::ForwardBack,
            "client_redirect" => TransitionQualifier::ClientRedirect,
            "server_redirect" => TransitionQualifier::ServerRedirect,
            other => match other
                .strip_prefix("from_")
                .and_then(|tab| tab.parse::<i32>().ok())
            {
                Some(tab) => TransitionQualifier::FromTab(TabId(tab)),
                None => TransitionQualifier::Other(other.to_string()),
            },
        }
    }
}

impl From<String> for TransitionQualifier {
    fn from(value: String) -> Self {
        TransitionQualifier::from(value.as_str())
    }
}

impl From<TransitionQualifier> for String {
    fn from(value: TransitionQualifier) -> Self {
        match value {
            TransitionQualifier::FromAddressBar => "from_address_bar".to_string(),
            TransitionQualifier::FromTab(tab) => format!("from_{tab}"),
            TransitionQualifier::ForwardBack => "forward_back".to_string(),
            TransitionQualifier::ClientRedirect => "client_redirect".to_string(),
            TransitionQualifier::ServerRedirect => "server_redirect".to_string(),
            TransitionQualifier::Other(s) => s,
        }
    }
}

/// The explicit origin tab named by a qualifier list, if any.
pub fn origin_tab(qualifiers: &[TransitionQualifier]) -> Option<TabId> {
    qualifiers.iter().find_map(|q| match q {
        TransitionQualifier::FromTab(tab) => Some(*tab),
        _ => None,
    })
}

/// Live page metadata for an open tab, as reported by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub fav_icon_url: Option<String>,
}

/// Events consumed from the browser platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BrowserEvent {
    NavigationCommitted {
        tab_id: TabId,
        #[serde(default)]
        frame_id: i64,
        url: String,
        transition_type: TransitionType,
        #[serde(default)]
        transition_qualifiers: Vec<TransitionQualifier>,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        fav_icon_url: Option<String>,
    },
    HistoryStateUpdated {
        tab_id: TabId,
        #[serde(default)]
        frame_id: i64,
        url: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        fav_icon_url: Option<String>,
    },
    TabCreated {
        tab_id: TabId,
        #[serde(default)]
        opener_tab_id: Option<TabId>,
    },
    NavigationTargetCreated {
        source_tab_id: TabId,
        tab_id: TabId,
    },
    TabRemoved {
        tab_id: TabId,
    },
}

impl BrowserEvent {
    /// The tab whose queue this event is sequenced on.
    pub fn tab_id(&self) -> TabId {
        match self {
            BrowserEvent::NavigationCommitted { tab_id, .. }
            | BrowserEvent::HistoryStateUpdated { tab_id, .. }
            | BrowserEvent::TabCreated { tab_id, .. }
            | BrowserEvent::NavigationTargetCreated { tab_id, .. }
            | BrowserEvent::TabRemoved { tab_id } => *tab_id,
        }
    }
}
