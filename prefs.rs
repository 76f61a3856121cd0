/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Process configuration: an optional TOML file overridden by command-line
//! flags. Nothing here is persisted in the session store.

use std::path::{Path, PathBuf};

use bpaf::Bpaf;
use serde::{Deserialize, Serialize};

use crate::tree::DedupScope;

const CONFIG_FILE: &str = "navtrail.toml";
const APP_DIR: &str = "navtrail";
const DEFAULT_LOG_FILTER: &str = "navtrail=info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Redb,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Prefs {
    /// Directory holding the redb database.
    pub data_dir: PathBuf,
    pub dedup_scope: DedupScope,
    pub debounce_ms: u64,
    /// Period of the retention sweep.
    pub sweep_interval_secs: u64,
    pub consume_pending_hint: bool,
    pub storage: StorageKind,
    pub log_filter: String,
}

impl Default for Prefs {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            dedup_scope: DedupScope::Scoped,
            debounce_ms: 2_000,
            sweep_interval_secs: 60,
            consume_pending_hint: true,
            storage: StorageKind::Redb,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}

#[derive(Debug, thiserror::Error)]
pub enum PrefsError {
    #[error("failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Parse(String),
}

/// Command-line flags. Every flag overrides the matching config entry.
#[derive(Debug, Clone, Default, Bpaf)]
#[bpaf(options, version)]
pub struct CliArgs {
    /// Read configuration from PATH instead of the default location
    #[bpaf(long, argument("PATH"))]
    pub config: Option<PathBuf>,

    /// Store the session database in DIR
    #[bpaf(long("data-dir"), argument("DIR"))]
    pub data_dir: Option<PathBuf>,

    /// Dedup scope for revisits: global or scoped
    #[bpaf(long("dedup"), argument("SCOPE"))]
    pub dedup: Option<DedupScope>,

    /// Keep all state in memory; nothing is written to disk
    #[bpaf(long, switch)]
    pub memory: bool,

    /// Log filter directive, e.g. "navtrail=debug"
    #[bpaf(long("log-filter"), argument("FILTER"))]
    pub log_filter: Option<String>,
}

impl Prefs {
    pub fn from_toml_str(source: &str) -> Result<Self, PrefsError> {
        toml::from_str(source).map_err(|e| PrefsError::Parse(format!("{e}")))
    }

    pub fn load(path: &Path) -> Result<Self, PrefsError> {
        let source = std::fs::read_to_string(path).map_err(|e| PrefsError::Read {
            path: path.to_path_buf(),
            message: format!("{e}"),
        })?;
        Self::from_toml_str(&source)
    }

    /// Explicit `--config` must exist; the default location is optional.
    pub fn resolve(cli: &CliArgs) -> Result<Self, PrefsError> {
        let mut prefs = match &cli.config {
            Some(path) => Self::load(path)?,
            None => match default_config_path().filter(|p| p.is_file()) {
                Some(path) => Self::load(&path)?,
                None => Self::default(),
            },
        };
        prefs.apply_cli(cli);
        Ok(prefs)
    }

    pub fn apply_cli(&mut self, cli: &CliArgs) {
        if let Some(dir) = &cli.data_dir {
            self.data_dir = dir.clone();
        }
        if let Some(scope) = cli.dedup {
            self.dedup_scope = scope;
        }
        if cli.memory {
            self.storage = StorageKind::Memory;
        }
        if let Some(filter) = &cli.log_filter {
            self.log_filter = filter.clone();
        }
    }
}
