//! Append-only session store: one JSON object per line, one line per turn.
//!
//! The context subsystem never touches this; it receives a borrowed history
//! snapshot loaded here once per process.

use chrono::Utc;
use color_eyre::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use crate::services::notebooks::{ConversationTurn, TurnRole};

/// A turn as persisted on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTurn {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_id: Option<String>,
    pub timestamp: String,
}

impl StoredTurn {
    fn from_turn(turn: &ConversationTurn) -> Self {
        Self {
            role: turn.role.label().to_string(),
            content: turn.content.clone(),
            notebook_id: turn.notebook_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    fn into_turn(self) -> Option<ConversationTurn> {
        let role = match self.role.as_str() {
            "user" => TurnRole::User,
            "assistant" => TurnRole::Assistant,
            _ => return None,
        };
        Some(ConversationTurn {
            role,
            content: self.content,
            notebook_id: self.notebook_id,
        })
    }
}

/// File-backed conversation store for one chat session stream
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Opens the default store under the user data directory
    pub fn open_default() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("", "", "workos")
            .ok_or_else(|| color_eyre::eyre::eyre!("Could not determine data directory"))?;
        let dir = proj_dirs.data_dir().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            path: dir.join("session.jsonl"),
        })
    }

    /// Opens a store at an explicit path (used by tests)
    #[must_use]
    pub fn open(path: PathBuf) -> Self {
        Self { path }
    }

    /// Loads all stored turns in insertion order. Malformed lines and
    /// unknown roles are skipped rather than failing the whole load.
    pub fn load_turns(&self) -> Result<Vec<ConversationTurn>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        let turns = contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str::<StoredTurn>(line).ok())
            .filter_map(StoredTurn::into_turn)
            .collect();
        Ok(turns)
    }

    /// Appends one turn to the store
    pub fn append_turn(&self, turn: &ConversationTurn) -> Result<()> {
        let stored = StoredTurn::from_turn(turn);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(&stored)?)?;
        Ok(())
    }
}
