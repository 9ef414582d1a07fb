// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resources and read-only resource handles

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{ResourceType, TagSet, Taggable};

/// What happens to a resource when its stack is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionPolicy {
    Delete,
    Retain,
    Snapshot,
}

impl DeletionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "Delete",
            Self::Retain => "Retain",
            Self::Snapshot => "Snapshot",
        }
    }
}

/// A provider-managed resource declared by a stack definition
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    logical_id: String,
    resource_type: ResourceType,
    properties: Map<String, Value>,
    tags: TagSet,
    depends_on: BTreeSet<String>,
    deletion_policy: Option<DeletionPolicy>,
}

impl Resource {
    pub fn new(logical_id: impl Into<String>, resource_type: ResourceType) -> Self {
        Self {
            logical_id: logical_id.into(),
            resource_type,
            properties: Map::new(),
            tags: TagSet::new(),
            depends_on: BTreeSet::new(),
            deletion_policy: None,
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Merge every key of a JSON object into the properties
    ///
    /// Non-object values are ignored.
    pub fn with_properties(mut self, properties: Value) -> Self {
        if let Value::Object(map) = properties {
            self.properties.extend(map);
        }
        self
    }

    pub fn with_depends_on(mut self, logical_id: impl Into<String>) -> Self {
        self.depends_on.insert(logical_id.into());
        self
    }

    pub fn with_deletion_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self
    }

    pub fn set_property(&mut self, key: &str, value: impl Into<Value>) {
        self.properties.insert(key.to_string(), value.into());
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn depends_on(&self) -> impl Iterator<Item = &str> {
        self.depends_on.iter().map(String::as_str)
    }

    pub fn deletion_policy(&self) -> Option<DeletionPolicy> {
        self.deletion_policy
    }

    /// Render the template entry, merging `defaults` below the resource's own tags
    pub(crate) fn render(&self, defaults: &TagSet) -> Value {
        let mut tags = self.tags.clone();
        tags.merge(defaults);

        let mut properties = self.properties.clone();
        if self.resource_type.supports_tags() && !tags.is_empty() {
            properties.insert("Tags".to_string(), tags.to_provider_list());
        }

        let mut entry = Map::new();
        entry.insert(
            "Type".to_string(),
            Value::String(self.resource_type.cfn_type().to_string()),
        );
        if !properties.is_empty() {
            entry.insert("Properties".to_string(), Value::Object(properties));
        }
        if !self.depends_on.is_empty() {
            entry.insert(
                "DependsOn".to_string(),
                Value::Array(
                    self.depends_on
                        .iter()
                        .map(|id| Value::String(id.clone()))
                        .collect(),
                ),
            );
        }
        if let Some(policy) = self.deletion_policy {
            entry.insert(
                "DeletionPolicy".to_string(),
                Value::String(policy.as_str().to_string()),
            );
        }
        Value::Object(entry)
    }
}

impl Taggable for Resource {
    fn tags_mut(&mut self) -> &mut TagSet {
        &mut self.tags
    }
}

/// Read-only reference to a resource owned by some deployable unit
///
/// Holding a handle never grants ownership: a consuming unit can only reach
/// attributes the owner exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    stack_id: String,
    logical_id: String,
    resource_type: ResourceType,
    exports: BTreeMap<String, String>,
}

impl ResourceHandle {
    pub(crate) fn new(
        stack_id: impl Into<String>,
        logical_id: impl Into<String>,
        resource_type: ResourceType,
    ) -> Self {
        Self {
            stack_id: stack_id.into(),
            logical_id: logical_id.into(),
            resource_type,
            exports: BTreeMap::new(),
        }
    }

    pub(crate) fn record_export(&mut self, attribute: &str, export_name: String) {
        self.exports.insert(attribute.to_string(), export_name);
    }

    /// Canonical id of the owning unit
    pub fn stack_id(&self) -> &str {
        &self.stack_id
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// Export name under which `attribute` was published, if any
    pub fn export_name(&self, attribute: &str) -> Option<&str> {
        self.exports.get(attribute).map(String::as_str)
    }
}
