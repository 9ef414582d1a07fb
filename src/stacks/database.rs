// Copyright (c) 2025 - Cowboy AI, Inc.
//! PostgreSQL database stack
//!
//! Declares a private, encrypted instance with generated credentials and
//! publishes a ready-to-use connection string for every application role.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::network::VpcReference;
use super::security::{RoleSpec, SecurityGroupSpec};
use super::ResourceStack;
use crate::construct::{
    fn_join, fn_ref, secret_value, DeletionPolicy, DeployableUnit, Resource, ResourceHandle, REF,
};
use crate::domain::invariants::{require_non_empty, require_non_empty_list, require_range};
use crate::domain::{to_pascal_case, AppType, CidrBlock, Peer, PortRange, ResourceType, StackIdentity, ValidationError};
use crate::errors::StackResult;

/// Parameter store category for connection strings
pub const CONNECTION_STRING_CATEGORY: &str = "Database/ConnectionStrings";

const MAINTENANCE_WINDOW: &str = "Sun:03:00-Sun:04:00";
const MONITORING_INTERVALS: [u32; 7] = [0, 1, 5, 10, 15, 30, 60];

/// Rules for the generated master password
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordPolicy {
    pub length: u32,
    /// Characters never generated, so the password needs no escaping
    pub exclude_characters: String,
    pub generate_key: String,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            length: 30,
            exclude_characters: "\"@/\\ ';:,=*!()$".to_string(),
            generate_key: "password".to_string(),
        }
    }
}

impl PasswordPolicy {
    /// Whether `candidate` could have been produced under this policy
    pub fn accepts(&self, candidate: &str) -> bool {
        candidate.chars().count() == self.length as usize
            && !candidate
                .chars()
                .any(|c| self.exclude_characters.contains(c))
    }

    /// `GenerateSecretString` block storing `username` next to the password
    pub fn render(&self, username: &str) -> Value {
        json!({
            "SecretStringTemplate": json!({ "username": username }).to_string(),
            "GenerateStringKey": self.generate_key,
            "PasswordLength": self.length,
            "ExcludeCharacters": self.exclude_characters
        })
    }
}

/// Semicolon-delimited PostgreSQL connection string
///
/// Every part is a template value: a literal string or a token resolved at
/// deploy time. `sslmode=require` is always appended.
///
/// ```rust
/// use iac_stacks::stacks::ConnectionString;
/// use serde_json::json;
///
/// let conn = ConnectionString::new("h", "u", "d", "p", "pw");
/// assert_eq!(
///     conn.to_value(),
///     json!("host=h;user=u;dbname=d;port=p;password=pw;sslmode=require;")
/// );
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionString {
    host: Value,
    user: Value,
    database: Value,
    port: Value,
    password: Value,
}

impl ConnectionString {
    pub fn new(
        host: impl Into<Value>,
        user: impl Into<Value>,
        database: impl Into<Value>,
        port: impl Into<Value>,
        password: impl Into<Value>,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            database: database.into(),
            port: port.into(),
            password: password.into(),
        }
    }

    /// Plain string when every part is literal, otherwise an `Fn::Join`
    pub fn to_value(&self) -> Value {
        let fields = [
            ("host", &self.host),
            ("user", &self.user),
            ("dbname", &self.database),
            ("port", &self.port),
            ("password", &self.password),
        ];

        let mut parts: Vec<Value> = Vec::new();
        let mut literal = String::new();
        for (key, value) in fields {
            literal.push_str(key);
            literal.push('=');
            match value {
                Value::String(text) => literal.push_str(text),
                token => {
                    parts.push(Value::String(std::mem::take(&mut literal)));
                    parts.push(token.clone());
                }
            }
            literal.push(';');
        }
        literal.push_str("sslmode=require;");

        if parts.is_empty() {
            return Value::String(literal);
        }
        parts.push(Value::String(literal));
        fn_join("", parts)
    }
}

/// Database settings
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseProps {
    pub vpc: VpcReference,
    pub database_name: String,
    pub user_name: String,
    pub backup_retention_days: u32,
    pub storage_size_gb: u32,
    pub monitoring_interval_seconds: u32,
    pub engine_version: String,
    pub instance_class: String,
    /// Defaults to on
    pub deletion_protection: Option<bool>,
    pub password: PasswordPolicy,
}

impl DatabaseProps {
    pub fn new(
        vpc: VpcReference,
        database_name: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Self {
        Self {
            vpc,
            database_name: database_name.into(),
            user_name: user_name.into(),
            backup_retention_days: 7,
            storage_size_gb: 20,
            monitoring_interval_seconds: 0,
            engine_version: "17.4".to_string(),
            instance_class: "db.t3.micro".to_string(),
            deletion_protection: None,
            password: PasswordPolicy::default(),
        }
    }

    pub fn validate(&self) -> StackResult<()> {
        require_non_empty("database_name", &self.database_name)?;
        require_non_empty("user_name", &self.user_name)?;
        require_non_empty("engine_version", &self.engine_version)?;
        require_non_empty("instance_class", &self.instance_class)?;
        require_non_empty_list("vpc.private_subnets", &self.vpc.private_subnets)?;
        require_range("backup_retention_days", i64::from(self.backup_retention_days), 0, 35)?;
        require_range("storage_size_gb", i64::from(self.storage_size_gb), 20, 65_536)?;
        require_range("password.length", i64::from(self.password.length), 8, 128)?;
        if !MONITORING_INTERVALS.contains(&self.monitoring_interval_seconds) {
            return Err(ValidationError::BusinessRule(format!(
                "Monitoring interval must be one of {:?} seconds, got {}",
                MONITORING_INTERVALS, self.monitoring_interval_seconds
            ))
            .into());
        }
        Ok(())
    }

    /// Storage autoscaling ceiling: ten percent above the allocation, rounded up
    pub fn max_allocated_storage(&self) -> u32 {
        (self.storage_size_gb * 11).div_ceil(10)
    }

    /// Parameter group family, e.g. `postgres17`
    pub fn parameter_group_family(&self) -> String {
        let major = self
            .engine_version
            .split('.')
            .next()
            .unwrap_or(&self.engine_version);
        format!("postgres{}", major)
    }
}

pub struct DatabaseStack {
    unit: DeployableUnit,
    instance: ResourceHandle,
    security_group: ResourceHandle,
    secret: ResourceHandle,
}

impl DatabaseStack {
    pub fn new(identity: StackIdentity, props: &DatabaseProps) -> StackResult<Self> {
        props.validate()?;

        let mut unit = DeployableUnit::new(identity).with_description("PostgreSQL database");
        props.vpc.bind(&mut unit);
        let project = unit.identity().project_id().to_string();
        let environment = unit.identity().environment();
        let stack_id = unit.id();
        let postgres = PortRange::postgres();

        let group_name = format!("{}Database", project);
        let mut security_group = SecurityGroupSpec::new(
            group_name.clone(),
            group_name,
            props.vpc.vpc_id.clone(),
        )
        .ingress(
            Peer::Ipv4(props.vpc.cidr_block.clone()),
            postgres,
            "Allow PostgreSQL inbound from VPC",
        )
        .ingress(
            Peer::Ipv4(CidrBlock::legacy()),
            postgres,
            "Allow PostgreSQL inbound from legacy VPC",
        )
        .add_to(&mut unit, "DatabaseSecurityGroup")?;
        let group_id = unit.reference(&security_group, "GroupId")?;

        // Self-referencing rule has to live outside the group
        unit.add(
            Resource::new("DatabaseSecurityGroupSelfIngress", ResourceType::SecurityGroupIngress)
                .with_properties(json!({
                    "GroupId": group_id,
                    "SourceSecurityGroupId": group_id,
                    "IpProtocol": "tcp",
                    "FromPort": postgres.from_port(),
                    "ToPort": postgres.to_port(),
                    "Description": "tcp5432 PostgreSQL"
                })),
        )?;

        let subnet_group = unit.add(
            Resource::new("DatabaseSubnetGroup", ResourceType::DbSubnetGroup).with_properties(
                json!({
                    "DBSubnetGroupName": format!("{}-subnet-group", stack_id),
                    "DBSubnetGroupDescription": format!("{} subnet group", stack_id),
                    "SubnetIds": props.vpc.private_subnets
                }),
            ),
        )?;

        let mut secret = unit.add(
            Resource::new("PostgresqlCredentials", ResourceType::Secret).with_properties(json!({
                "Name": format!("{}PostgresqlCredentials{}", props.database_name, environment),
                "Description": format!("{} PostgreSQL Database Credentials", props.database_name),
                "GenerateSecretString": props.password.render(&props.user_name)
            })),
        )?;
        let secret_ref = unit.reference(&secret, REF)?;

        let parameter_group = unit.add(
            Resource::new("ParameterGroup", ResourceType::DbParameterGroup).with_properties(json!({
                "Family": props.parameter_group_family(),
                "Description": format!("Parameter group for {}", props.database_name)
            })),
        )?;

        let mut instance = Resource::new("PostgresDatabase", ResourceType::DbInstance)
            .with_properties(json!({
                "DBName": props.database_name,
                "DBInstanceIdentifier": props.database_name,
                "Engine": "postgres",
                "EngineVersion": props.engine_version,
                "DBInstanceClass": props.instance_class,
                "AllocatedStorage": props.storage_size_gb.to_string(),
                "MaxAllocatedStorage": props.max_allocated_storage(),
                "BackupRetentionPeriod": props.backup_retention_days,
                "MasterUsername": props.user_name,
                "MasterUserPassword": secret_value(secret_ref.clone(), &props.password.generate_key),
                "VPCSecurityGroups": [group_id],
                "DBSubnetGroupName": fn_ref(subnet_group.logical_id()),
                "DBParameterGroupName": fn_ref(parameter_group.logical_id()),
                "StorageEncrypted": true,
                "PubliclyAccessible": false,
                "AllowMajorVersionUpgrade": false,
                "AutoMinorVersionUpgrade": true,
                "DeletionProtection": props.deletion_protection.unwrap_or(true),
                "PreferredMaintenanceWindow": MAINTENANCE_WINDOW,
                "MonitoringInterval": props.monitoring_interval_seconds
            }))
            .with_deletion_policy(DeletionPolicy::Delete);

        if props.monitoring_interval_seconds > 0 {
            let monitoring_role = RoleSpec::assumed_by("monitoring.rds.amazonaws.com")
                .managed_policy(
                    "arn:aws:iam::aws:policy/service-role/AmazonRDSEnhancedMonitoringRole",
                )
                .add_to(&mut unit, "MonitoringRole")?;
            instance = instance.with_property(
                "MonitoringRoleArn",
                unit.reference(&monitoring_role, "Arn")?,
            );
        }
        let mut instance = unit.add(instance)?;

        unit.export(&mut secret, REF, "SecretArn")?;
        unit.export(&mut security_group, "GroupId", "DatabaseSecurityGroupId")?;
        unit.export(&mut instance, "Endpoint.Address", "PostgresEndPoint")?;
        let user_export = unit.identity().export_name("PostgresUserName");
        unit.output("PostgresUserName", json!(props.user_name), None, Some(user_export));
        let db_export = unit.identity().export_name("PostgresDbName");
        unit.output("PostgresDbName", json!(props.database_name), None, Some(db_export));

        let connection = ConnectionString::new(
            unit.reference(&instance, "Endpoint.Address")?,
            props.user_name.as_str(),
            props.database_name.as_str(),
            unit.reference(&instance, "Endpoint.Port")?,
            secret_value(secret_ref, &props.password.generate_key),
        );
        let key = format!("{}Postgres", props.database_name);
        let description = format!(
            "PostgreSQL string connection {} DB {}",
            to_pascal_case(unit.identity().project_id()),
            environment.pascal_name()
        );
        for app_type in AppType::ALL {
            let path = unit
                .identity()
                .parameter_path(app_type, CONNECTION_STRING_CATEGORY, &key);
            unit.publish_parameter(path, connection.to_value(), &description)?;
        }

        Ok(Self {
            unit,
            instance,
            security_group,
            secret,
        })
    }

    pub fn instance(&self) -> &ResourceHandle {
        &self.instance
    }

    /// Security group admitting PostgreSQL traffic, `GroupId` exported
    pub fn security_group(&self) -> &ResourceHandle {
        &self.security_group
    }

    pub fn secret(&self) -> &ResourceHandle {
        &self.secret
    }
}

impl ResourceStack for DatabaseStack {
    fn unit(&self) -> &DeployableUnit {
        &self.unit
    }

    fn into_unit(self) -> DeployableUnit {
        self.unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AppEnvironment;
    use crate::errors::StackError;
    use pretty_assertions::assert_eq;

    fn props() -> DatabaseProps {
        let vpc = VpcReference::lookup(
            "vpc-1",
            CidrBlock::new("172.31.0.0/16").unwrap(),
            &["subnet-a".to_string(), "subnet-b".to_string()],
            &[],
        );
        let mut props = DatabaseProps::new(vpc, "workshop", "masteruser");
        props.storage_size_gb = 100;
        props.backup_retention_days = 14;
        props.monitoring_interval_seconds = 60;
        props
    }

    fn identity() -> StackIdentity {
        StackIdentity::new("M47", "my-repo", "RdsPostgres", AppEnvironment::Production).unwrap()
    }

    #[test]
    fn test_literal_connection_string() {
        let conn = ConnectionString::new("h", "u", "d", "p", "pw");
        assert_eq!(
            conn.to_value(),
            json!("host=h;user=u;dbname=d;port=p;password=pw;sslmode=require;")
        );
    }

    #[test]
    fn test_tokenized_connection_string() {
        let conn = ConnectionString::new(
            json!({ "Fn::GetAtt": ["Db", "Endpoint.Address"] }),
            "u",
            "d",
            "5432",
            "pw",
        );
        assert_eq!(
            conn.to_value(),
            fn_join(
                "",
                vec![
                    json!("host="),
                    json!({ "Fn::GetAtt": ["Db", "Endpoint.Address"] }),
                    json!(";user=u;dbname=d;port=5432;password=pw;sslmode=require;"),
                ]
            )
        );
    }

    #[test]
    fn test_password_policy() {
        let policy = PasswordPolicy::default();
        assert!(policy.accepts("abcdefghijklmnopqrstuvwxyz0123"));
        assert!(!policy.accepts("abcdefghijklmnopqrstuvwxyz012;"));
        assert!(!policy.accepts("short"));
    }

    #[test]
    fn test_instance_settings() {
        let stack = DatabaseStack::new(identity(), &props()).unwrap();
        let instance = stack.unit().resource("PostgresDatabase").unwrap();

        assert_eq!(instance.property("MaxAllocatedStorage"), Some(&json!(110)));
        assert_eq!(instance.property("DeletionProtection"), Some(&json!(true)));
        assert_eq!(
            instance.property("PreferredMaintenanceWindow"),
            Some(&json!("Sun:03:00-Sun:04:00"))
        );
        assert!(instance.property("MonitoringRoleArn").is_some());
        assert_eq!(
            stack.unit().resource("ParameterGroup").unwrap().property("Family"),
            Some(&json!("postgres17"))
        );
    }

    #[test]
    fn test_connection_string_published_for_both_app_types() {
        let stack = DatabaseStack::new(identity(), &props()).unwrap();
        let paths: Vec<&str> = stack
            .unit()
            .parameters()
            .iter()
            .map(|p| p.path.as_str())
            .collect();
        assert_eq!(
            paths,
            vec![
                "/M47.MyRepo.Apps.Minimal.Api/Production/Database/ConnectionStrings/WorkshopPostgres",
                "/M47.MyRepo.Apps.WorkerService/Production/Database/ConnectionStrings/WorkshopPostgres",
            ]
        );

        let parameter = stack
            .unit()
            .resource(&stack.unit().parameters()[0].logical_id)
            .unwrap();
        assert_eq!(
            parameter.property("Description"),
            Some(&json!("PostgreSQL string connection MyRepo DB Production"))
        );
        let exports: Vec<&str> = stack
            .unit()
            .outputs()
            .iter()
            .filter_map(|o| o.export_name.as_deref())
            .filter(|name| name.ends_with("ParameterName"))
            .collect();
        assert_eq!(exports.len(), 2);
    }

    #[test]
    fn test_unsupported_monitoring_interval() {
        let mut props = props();
        props.monitoring_interval_seconds = 7;
        let err = DatabaseStack::new(identity(), &props).err().unwrap();
        assert!(matches!(err, StackError::Validation(_)));
    }
}
