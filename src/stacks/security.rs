// Copyright (c) 2025 - Cowboy AI, Inc.
//! Security groups and IAM roles shared by the stack definitions

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::construct::{DeployableUnit, Resource, ResourceHandle};
use crate::domain::{Peer, PortRange, Protocol, ResourceType, RuleDirection};
use crate::errors::StackResult;

/// One ingress or egress rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityRule {
    pub peer: Peer,
    pub ports: PortRange,
    pub description: String,
}

impl SecurityRule {
    fn render(&self, direction: RuleDirection) -> Value {
        let mut rule = match self.peer.rule_fields(direction) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        rule.insert("IpProtocol".to_string(), json!(self.ports.protocol().as_str()));
        if self.ports.protocol() != Protocol::All {
            rule.insert("FromPort".to_string(), json!(self.ports.from_port()));
            rule.insert("ToPort".to_string(), json!(self.ports.to_port()));
        }
        rule.insert("Description".to_string(), json!(self.description));
        Value::Object(rule)
    }
}

/// Security group declaration
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityGroupSpec {
    name: String,
    description: String,
    vpc_id: Value,
    allow_all_outbound: bool,
    ingress: Vec<SecurityRule>,
    egress: Vec<SecurityRule>,
}

impl SecurityGroupSpec {
    /// Group with no ingress and unrestricted egress
    pub fn new(name: impl Into<String>, description: impl Into<String>, vpc_id: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            vpc_id,
            allow_all_outbound: true,
            ingress: Vec::new(),
            egress: Vec::new(),
        }
    }

    pub fn allow_all_outbound(mut self, allow: bool) -> Self {
        self.allow_all_outbound = allow;
        self
    }

    pub fn ingress(mut self, peer: Peer, ports: PortRange, description: &str) -> Self {
        self.ingress.push(SecurityRule {
            peer,
            ports,
            description: description.to_string(),
        });
        self
    }

    /// Explicit egress rule; ignored while all outbound traffic is allowed
    pub fn egress(mut self, peer: Peer, ports: PortRange, description: &str) -> Self {
        self.egress.push(SecurityRule {
            peer,
            ports,
            description: description.to_string(),
        });
        self
    }

    pub fn add_to(&self, unit: &mut DeployableUnit, logical_id: &str) -> StackResult<ResourceHandle> {
        let egress: Vec<Value> = if self.allow_all_outbound {
            vec![SecurityRule {
                peer: Peer::any_ipv4(),
                ports: PortRange::all_traffic(),
                description: "Allow all outbound traffic by default".to_string(),
            }
            .render(RuleDirection::Egress)]
        } else {
            self.egress
                .iter()
                .map(|rule| rule.render(RuleDirection::Egress))
                .collect()
        };

        let mut resource = Resource::new(logical_id, ResourceType::SecurityGroup)
            .with_property("GroupName", self.name.as_str())
            .with_property("GroupDescription", self.description.as_str())
            .with_property("VpcId", self.vpc_id.clone())
            .with_property("SecurityGroupEgress", egress);
        if !self.ingress.is_empty() {
            resource = resource.with_property(
                "SecurityGroupIngress",
                self.ingress
                    .iter()
                    .map(|rule| rule.render(RuleDirection::Ingress))
                    .collect::<Vec<_>>(),
            );
        }
        unit.add(resource)
    }
}

/// IAM policy statement (always `Allow`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyStatement {
    pub actions: Vec<String>,
    pub resources: Vec<Value>,
    pub conditions: Option<Value>,
}

impl PolicyStatement {
    pub fn allow<A: AsRef<str>>(actions: &[A], resources: Vec<Value>) -> Self {
        Self {
            actions: actions.iter().map(|a| a.as_ref().to_string()).collect(),
            resources,
            conditions: None,
        }
    }

    pub fn with_condition(mut self, condition: Value) -> Self {
        self.conditions = Some(condition);
        self
    }

    pub fn render(&self) -> Value {
        let mut statement = json!({
            "Effect": "Allow",
            "Action": self.actions,
            "Resource": self.resources
        });
        if let Some(condition) = &self.conditions {
            statement["Condition"] = condition.clone();
        }
        statement
    }
}

/// IAM policy document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub statements: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn new(statements: Vec<PolicyStatement>) -> Self {
        Self { statements }
    }

    pub fn render(&self) -> Value {
        json!({
            "Version": "2012-10-17",
            "Statement": self.statements.iter().map(PolicyStatement::render).collect::<Vec<_>>()
        })
    }
}

/// IAM role declaration
#[derive(Debug, Clone, PartialEq)]
pub struct RoleSpec {
    role_name: Option<String>,
    description: Option<String>,
    service_principals: Vec<String>,
    arn_principals: Vec<Value>,
    managed_policy_arns: Vec<Value>,
    inline_policies: Vec<(String, PolicyDocument)>,
}

impl RoleSpec {
    /// Role assumable by one service principal, e.g. `lambda.amazonaws.com`
    pub fn assumed_by(principal: &str) -> Self {
        Self {
            role_name: None,
            description: None,
            service_principals: vec![principal.to_string()],
            arn_principals: Vec::new(),
            managed_policy_arns: Vec::new(),
            inline_policies: Vec::new(),
        }
    }

    pub fn also_assumed_by(mut self, principal: &str) -> Self {
        self.service_principals.push(principal.to_string());
        self
    }

    /// Let another role, by ARN, assume this one
    pub fn trusted_by_arn(mut self, arn: Value) -> Self {
        self.arn_principals.push(arn);
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn named(mut self, role_name: impl Into<String>) -> Self {
        self.role_name = Some(role_name.into());
        self
    }

    pub fn managed_policy(mut self, arn: impl Into<Value>) -> Self {
        self.managed_policy_arns.push(arn.into());
        self
    }

    pub fn inline_policy(mut self, name: &str, document: PolicyDocument) -> Self {
        self.inline_policies.push((name.to_string(), document));
        self
    }

    pub fn add_to(&self, unit: &mut DeployableUnit, logical_id: &str) -> StackResult<ResourceHandle> {
        let mut statements = vec![json!({
            "Effect": "Allow",
            "Principal": { "Service": self.service_principals },
            "Action": "sts:AssumeRole"
        })];
        if !self.arn_principals.is_empty() {
            statements.push(json!({
                "Effect": "Allow",
                "Principal": { "AWS": self.arn_principals },
                "Action": "sts:AssumeRole"
            }));
        }

        let mut resource = Resource::new(logical_id, ResourceType::Role).with_property(
            "AssumeRolePolicyDocument",
            json!({ "Version": "2012-10-17", "Statement": statements }),
        );
        if let Some(name) = &self.role_name {
            resource = resource.with_property("RoleName", name.as_str());
        }
        if let Some(description) = &self.description {
            resource = resource.with_property("Description", description.as_str());
        }
        if !self.managed_policy_arns.is_empty() {
            resource = resource.with_property("ManagedPolicyArns", self.managed_policy_arns.clone());
        }
        if !self.inline_policies.is_empty() {
            let policies: Vec<Value> = self
                .inline_policies
                .iter()
                .map(|(name, document)| {
                    json!({ "PolicyName": name, "PolicyDocument": document.render() })
                })
                .collect();
            resource = resource.with_property("Policies", policies);
        }
        unit.add(resource)
    }
}
