//! User directory and FAQ table backing the identity and FAQ shortcuts.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub role: String,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Lookup of users by id. A missing user is a normal outcome.
pub trait UserDirectory: Send + Sync {
    fn lookup(&self, user_id: &str) -> Option<UserRecord>;
}

#[derive(Debug, Deserialize)]
struct MockDatabase {
    #[serde(default)]
    users_table: HashMap<String, UserRecord>,
}

/// Directory read once from a `{"users_table": {uid: {...}}}` JSON file.
#[derive(Debug, Default)]
pub struct JsonUserDirectory {
    users: HashMap<String, UserRecord>,
}

impl JsonUserDirectory {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read user directory {}", path.display()))?;
        let directory = Self::from_json(&content)?;
        tracing::info!(users = directory.len(), path = %path.display(), "Loaded user directory");
        Ok(directory)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let db: MockDatabase =
            serde_json::from_str(content).context("Failed to parse user directory")?;
        Ok(Self {
            users: db.users_table,
        })
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserDirectory for JsonUserDirectory {
    fn lookup(&self, user_id: &str) -> Option<UserRecord> {
        self.users.get(user_id).cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
}

/// Ordered FAQ list; the first entry whose question occurs in the query wins.
#[derive(Debug, Clone, Default)]
pub struct FaqTable {
    entries: Vec<FaqEntry>,
}

impl FaqTable {
    pub fn new(entries: Vec<FaqEntry>) -> Self {
        let entries: Vec<FaqEntry> = entries
            .into_iter()
            .filter(|e| !e.question.trim().is_empty())
            .collect();
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read FAQ file {}", path.display()))?;
        let entries: Vec<FaqEntry> =
            serde_json::from_str(&content).context("Failed to parse FAQ file")?;
        let table = Self::new(entries);
        tracing::info!(entries = table.len(), "Loaded FAQ table");
        Ok(table)
    }

    pub fn find_match(&self, query: &str) -> Option<&FaqEntry> {
        self.entries.iter().find(|e| query.contains(e.question.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
