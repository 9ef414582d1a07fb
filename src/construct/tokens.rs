// Copyright (c) 2025 - Cowboy AI, Inc.
//! Template intrinsic functions
//!
//! Tokens are plain JSON values resolved by the provider at deploy time.

use serde_json::{json, Value};

/// `Ref` attribute name used for handles and exports
pub const REF: &str = "Ref";

/// `{ "Ref": logical_id }`
pub fn fn_ref(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

/// `{ "Fn::GetAtt": [logical_id, attribute] }`
pub fn fn_get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

/// `{ "Fn::ImportValue": export_name }`
pub fn fn_import_value(export_name: &str) -> Value {
    json!({ "Fn::ImportValue": export_name })
}

/// `{ "Fn::Sub": template }`
pub fn fn_sub(template: &str) -> Value {
    json!({ "Fn::Sub": template })
}

/// `{ "Fn::Join": [delimiter, parts] }`
pub fn fn_join(delimiter: &str, parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": [delimiter, parts] })
}

/// Current region pseudo parameter
pub fn aws_region() -> Value {
    fn_ref("AWS::Region")
}

/// Current account pseudo parameter
pub fn aws_account_id() -> Value {
    fn_ref("AWS::AccountId")
}

/// Dynamic reference to a JSON key of a generated secret
pub fn secret_value(secret: Value, json_key: &str) -> Value {
    fn_join(
        "",
        vec![
            json!("{{resolve:secretsmanager:"),
            secret,
            json!(format!(":SecretString:{}::}}}}", json_key)),
        ],
    )
}

/// Build a template-legal logical id from name fragments
///
/// Non-alphanumeric characters are dropped and each fragment starts uppercase.
///
/// ```rust
/// use iac_stacks::construct::logical_id;
///
/// assert_eq!(logical_id(&["work-queue", "Dlq"]), "WorkqueueDlq");
/// assert_eq!(logical_id(&["api", "SecurityGroup"]), "ApiSecurityGroup");
/// ```
pub fn logical_id(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| {
            let cleaned: String = part.chars().filter(char::is_ascii_alphanumeric).collect();
            let mut chars = cleaned.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intrinsics() {
        assert_eq!(fn_ref("Vpc"), json!({ "Ref": "Vpc" }));
        assert_eq!(
            fn_get_att("Db", "Endpoint.Address"),
            json!({ "Fn::GetAtt": ["Db", "Endpoint.Address"] })
        );
        assert_eq!(
            fn_import_value("stack-Arn"),
            json!({ "Fn::ImportValue": "stack-Arn" })
        );
    }

    #[test]
    fn test_secret_value() {
        let value = secret_value(fn_ref("DbSecret"), "password");
        assert_eq!(
            value,
            json!({ "Fn::Join": ["", [
                "{{resolve:secretsmanager:",
                { "Ref": "DbSecret" },
                ":SecretString:password::}}"
            ]] })
        );
    }

    #[test]
    fn test_logical_id_drops_symbols() {
        assert_eq!(logical_id(&["my db", "Postgres"]), "MydbPostgres");
        assert_eq!(logical_id(&["", "x"]), "X");
    }
}
