//! Document repository data types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::millis_to_datetime;

/// Principal every user belongs to
pub const EVERYONE: &str = "Everyone";

/// Reference to a document by id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentRef(pub String);

impl DocumentRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentRef {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Snapshot of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentModel {
    pub id: String,
    pub repository: String,
    pub parent_id: Option<String>,
    pub path: String,
    pub name: String,
    pub doc_type: String,
    pub folderish: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_by: Option<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl DocumentModel {
    pub fn reference(&self) -> DocumentRef {
        DocumentRef(self.id.clone())
    }

    /// Whether `other` lies strictly below this document
    pub fn is_ancestor_of(&self, other: &DocumentModel) -> bool {
        is_strict_descendant(&other.path, &self.path)
    }
}

/// Permission levels, each implying the ones before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Permission {
    Read,
    Write,
    Everything,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "Read",
            Permission::Write => "Write",
            Permission::Everything => "Everything",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Read" => Ok(Permission::Read),
            "Write" => Ok(Permission::Write),
            "Everything" => Ok(Permission::Everything),
            other => Err(format!("unknown permission: {}", other)),
        }
    }
}

/// Document creation request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDocument {
    pub parent_id: String,
    pub name: String,
    pub doc_type: String,
    #[serde(default)]
    pub folderish: bool,
}

#[derive(sqlx::FromRow)]
pub(crate) struct DocumentRow {
    id: String,
    repository: String,
    parent_id: Option<String>,
    path: String,
    name: String,
    doc_type: String,
    folderish: bool,
    locked_by: Option<String>,
    deleted: bool,
    created_at: i64,
    modified_at: i64,
}

impl From<DocumentRow> for DocumentModel {
    fn from(row: DocumentRow) -> Self {
        Self {
            id: row.id,
            repository: row.repository,
            parent_id: row.parent_id,
            path: row.path,
            name: row.name,
            doc_type: row.doc_type,
            folderish: row.folderish,
            locked_by: row.locked_by,
            deleted: row.deleted,
            created_at: millis_to_datetime(row.created_at),
            modified_at: millis_to_datetime(row.modified_at),
        }
    }
}

/// Path of a child named `name` under `parent`
pub fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// `/`, then every prefix of `path` down to the path itself
pub fn ancestor_paths(path: &str) -> Vec<String> {
    let mut paths = vec!["/".to_string()];
    let mut current = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        current.push('/');
        current.push_str(segment);
        paths.push(current.clone());
    }
    paths
}

/// Whether `path` lies strictly below `ancestor`
pub fn is_strict_descendant(path: &str, ancestor: &str) -> bool {
    if ancestor == "/" {
        return path != "/" && path.starts_with('/');
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

/// Reject names that cannot form a path segment
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("name must not be empty".to_string());
    }
    if name.contains('/') {
        return Err(format!("name must not contain '/': {}", name));
    }
    if name == "." || name == ".." {
        return Err(format!("reserved name: {}", name));
    }
    Ok(())
}
