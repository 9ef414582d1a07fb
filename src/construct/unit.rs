// Copyright (c) 2025 - Cowboy AI, Inc.
//! Deployable Unit
//!
//! One environment-scoped collection of resources tracked as a single
//! lifecycle group. The unit owns its resources; other units reach them only
//! through exported attributes.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

use super::resource::{Resource, ResourceHandle};
use super::tokens::{fn_get_att, fn_import_value, fn_ref, logical_id, REF};
use crate::domain::{
    ParameterPath, ResourceType, StackIdentity, Tag, TagSet, DEFAULT_TAG_PRIORITY,
};
use crate::errors::{StackError, StackResult};

const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// A named template output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub logical_id: String,
    pub value: Value,
    pub description: Option<String>,
    pub export_name: Option<String>,
}

impl Output {
    fn render(&self) -> Value {
        let mut entry = Map::new();
        entry.insert("Value".to_string(), self.value.clone());
        if let Some(description) = &self.description {
            entry.insert("Description".to_string(), json!(description));
        }
        if let Some(name) = &self.export_name {
            entry.insert("Export".to_string(), json!({ "Name": name }));
        }
        Value::Object(entry)
    }
}

/// A value published to the parameter store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedParameter {
    pub path: ParameterPath,
    pub logical_id: String,
}

/// One stack
#[derive(Debug, Clone)]
pub struct DeployableUnit {
    identity: StackIdentity,
    description: Option<String>,
    resources: Vec<Resource>,
    logical_ids: HashSet<String>,
    outputs: Vec<Output>,
    parameters: Vec<PublishedParameter>,
    dependencies: BTreeSet<String>,
    default_tags: TagSet,
}

impl DeployableUnit {
    pub fn new(identity: StackIdentity) -> Self {
        Self {
            identity,
            description: None,
            resources: Vec::new(),
            logical_ids: HashSet::new(),
            outputs: Vec::new(),
            parameters: Vec::new(),
            dependencies: BTreeSet::new(),
            default_tags: TagSet::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Canonical stack id
    pub fn id(&self) -> String {
        self.identity.stack_id()
    }

    pub fn identity(&self) -> &StackIdentity {
        &self.identity
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Add a unit-wide tag at default priority
    ///
    /// Tags set on individual resources at a higher priority win.
    pub fn add_default_tag(&mut self, key: &str, value: &str) {
        self.default_tags
            .apply(Tag::new(key, value, DEFAULT_TAG_PRIORITY));
    }

    /// Take ownership of a resource, tag it and return its handle
    pub fn add(&mut self, mut resource: Resource) -> StackResult<ResourceHandle> {
        let id = resource.logical_id().to_string();

        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StackError::configuration(format!(
                "Logical id '{}' must be non-empty and alphanumeric",
                id
            )));
        }
        if !self.logical_ids.insert(id.clone()) {
            return Err(StackError::DuplicateResource {
                stack_id: self.id(),
                logical_id: id,
            });
        }

        self.identity.tag(&mut resource);
        debug!(
            stack_id = %self.id(),
            logical_id = %id,
            resource_type = %resource.resource_type(),
            "Resource added"
        );

        let handle = ResourceHandle::new(self.id(), id, resource.resource_type());
        self.resources.push(resource);
        Ok(handle)
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources
            .iter()
            .find(|r| r.logical_id() == logical_id)
    }

    pub fn resource_mut(&mut self, logical_id: &str) -> Option<&mut Resource> {
        self.resources
            .iter_mut()
            .find(|r| r.logical_id() == logical_id)
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn owns(&self, handle: &ResourceHandle) -> bool {
        handle.stack_id() == self.id() && self.logical_ids.contains(handle.logical_id())
    }

    /// Token for `attribute` of `handle` usable inside this unit
    ///
    /// Local handles resolve to `Ref` / `Fn::GetAtt`. Handles owned by another
    /// unit resolve to `Fn::ImportValue` of the exported attribute and record a
    /// dependency on the producing unit.
    pub fn reference(&mut self, handle: &ResourceHandle, attribute: &str) -> StackResult<Value> {
        if self.owns(handle) {
            return Ok(local_token(handle.logical_id(), attribute));
        }

        match handle.export_name(attribute) {
            Some(export_name) => {
                self.dependencies.insert(handle.stack_id().to_string());
                Ok(fn_import_value(export_name))
            }
            None => Err(StackError::UnresolvedReference {
                stack_id: handle.stack_id().to_string(),
                logical_id: handle.logical_id().to_string(),
                attribute: attribute.to_string(),
            }),
        }
    }

    /// Export `attribute` of an owned resource under `{stack_id}-{suffix}`
    pub fn export(
        &mut self,
        handle: &mut ResourceHandle,
        attribute: &str,
        suffix: &str,
    ) -> StackResult<String> {
        if !self.owns(handle) {
            return Err(StackError::configuration(format!(
                "Stack {} cannot export '{}' owned by {}",
                self.id(),
                handle.logical_id(),
                handle.stack_id()
            )));
        }

        let export_name = self.identity.export_name(suffix);
        self.outputs.push(Output {
            logical_id: logical_id(&[suffix, "Export"]),
            value: local_token(handle.logical_id(), attribute),
            description: None,
            export_name: Some(export_name.clone()),
        });
        handle.record_export(attribute, export_name.clone());
        Ok(export_name)
    }

    /// Plain output, optionally exported under an explicit name
    pub fn output(
        &mut self,
        name: &str,
        value: Value,
        description: Option<&str>,
        export_name: Option<String>,
    ) {
        self.outputs.push(Output {
            logical_id: logical_id(&[name]),
            value,
            description: description.map(str::to_string),
            export_name,
        });
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    /// Publish a string value to the parameter store
    ///
    /// The parameter name is exported as `{logical_id}ParameterName`.
    pub fn publish_parameter(
        &mut self,
        path: ParameterPath,
        value: Value,
        description: &str,
    ) -> StackResult<ResourceHandle> {
        let id = logical_id(&[path.as_str(), "Parameter"]);
        let handle = self.add(
            Resource::new(id.clone(), ResourceType::SsmParameter)
                .with_property("Name", path.as_str())
                .with_property("Type", "String")
                .with_property("Value", value)
                .with_property("Description", description),
        )?;

        self.outputs.push(Output {
            logical_id: logical_id(&[&id, "ParameterName", "Output"]),
            value: fn_ref(&id),
            description: Some(description.to_string()),
            export_name: Some(format!("{}ParameterName", id)),
        });
        self.parameters.push(PublishedParameter {
            path,
            logical_id: id,
        });
        Ok(handle)
    }

    pub fn parameters(&self) -> &[PublishedParameter] {
        &self.parameters
    }

    /// Declare a dependency on another unit by canonical id
    pub fn add_dependency(&mut self, stack_id: impl Into<String>) {
        let stack_id = stack_id.into();
        if stack_id != self.id() {
            self.dependencies.insert(stack_id);
        }
    }

    /// Canonical ids of units this unit imports from
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.dependencies.iter().map(String::as_str)
    }

    /// Render the unit as a template document
    pub fn template(&self) -> Value {
        let mut resources = Map::new();
        for resource in &self.resources {
            resources.insert(
                resource.logical_id().to_string(),
                resource.render(&self.default_tags),
            );
        }

        let mut template = Map::new();
        template.insert(
            "AWSTemplateFormatVersion".to_string(),
            json!(TEMPLATE_FORMAT_VERSION),
        );
        if let Some(description) = &self.description {
            template.insert("Description".to_string(), json!(description));
        }
        template.insert("Resources".to_string(), Value::Object(resources));
        if !self.outputs.is_empty() {
            let outputs = self
                .outputs
                .iter()
                .map(|o| (o.logical_id.clone(), o.render()))
                .collect();
            template.insert("Outputs".to_string(), Value::Object(outputs));
        }
        Value::Object(template)
    }
}

fn local_token(logical_id: &str, attribute: &str) -> Value {
    if attribute == REF {
        fn_ref(logical_id)
    } else {
        fn_get_att(logical_id, attribute)
    }
}
