// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Tags with Merge Priority
//!
//! Tags are applied at several levels (unit-wide defaults, per-resource project
//! tags). Each tag carries a priority; a tag only replaces an existing value for
//! the same key when its priority is equal or higher.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Priority used for unit-wide default tags
pub const DEFAULT_TAG_PRIORITY: u32 = 100;

/// Priority used for the project identity tags
pub const PROJECT_TAG_PRIORITY: u32 = 300;

/// A single tag with its merge priority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
    pub priority: u32,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>, priority: u32) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            priority,
        }
    }
}

/// Key-ordered tag collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeMap<String, Tag>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a tag; returns whether it took effect
    pub fn apply(&mut self, tag: Tag) -> bool {
        match self.0.get(&tag.key) {
            Some(existing) if existing.priority > tag.priority => false,
            _ => {
                self.0.insert(tag.key.clone(), tag);
                true
            }
        }
    }

    /// Merge every tag of `other` under the priority rule
    pub fn merge(&mut self, other: &TagSet) {
        for tag in other.0.values() {
            self.apply(tag.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|t| t.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.values()
    }

    /// Render as the provider's `[{Key, Value}]` list
    pub fn to_provider_list(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.0
                .values()
                .map(|t| serde_json::json!({ "Key": t.key, "Value": t.value }))
                .collect(),
        )
    }
}

/// Anything that carries tags
pub trait Taggable {
    fn tags_mut(&mut self) -> &mut TagSet;
}
