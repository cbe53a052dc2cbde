use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// One newline-delimited request from the portal shell. `params` defaults to
/// null so bare calls like `health` need no payload.
#[derive(Debug, Deserialize)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Daemon-wide mutable state: the selected workspace directory and the open
/// handle to its database, if any.
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}
