// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace and repository references carried by a build

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where a build's files live on the node running it
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Workspace {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phases_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_context_path: Option<PathBuf>,
}

impl Workspace {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            phases_path: None,
            build_context_path: None,
        }
    }

    pub fn with_phases_path(self, path: impl Into<PathBuf>) -> Self {
        Self {
            phases_path: Some(path.into()),
            ..self
        }
    }
}

/// Version-control system backing a repository
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepositoryKind {
    #[default]
    None,
    Fs,
    Git,
    MultiGit,
    P4,
    MultiP4,
}

/// Source repository of a build
///
/// Multi-repository kinds carry their members in `children`; a child is
/// identified by its URI.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Repository {
    #[serde(rename = "type", default)]
    pub kind: RepositoryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Repository>,
}

impl Repository {
    /// A build without source checkout
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(kind: RepositoryKind, uri: impl Into<String>) -> Self {
        Self {
            kind,
            uri: Some(uri.into()),
            ..Self::default()
        }
    }

    pub fn with_branch(self, branch: impl Into<String>) -> Self {
        Self {
            branch: Some(branch.into()),
            ..self
        }
    }

    pub fn with_metadata(self, metadata: impl Into<String>) -> Self {
        Self {
            metadata: Some(metadata.into()),
            ..self
        }
    }

    pub fn with_child(mut self, child: Repository) -> Self {
        self.children.push(child);
        self
    }

    /// Replace the child with the same URI, or append it
    pub fn update_child(&mut self, child: Repository) {
        match self
            .children
            .iter_mut()
            .find(|existing| existing.uri.is_some() && existing.uri == child.uri)
        {
            Some(existing) => *existing = child,
            None => self.children.push(child),
        }
    }
}

#[cfg(test)]
#[path = "repository_tests.rs"]
mod tests;
