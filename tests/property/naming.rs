// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Naming
//!
//! Whatever a repository is called, the names derived from it must be
//! accepted by the provider.

use iac_stacks::domain::{
    format_identifier, to_pascal_case, AppEnvironment, CloudFormationName, StackIdentity,
};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

/// Arbitrary repository-ish names, including symbols and digits up front
fn raw_name() -> impl Strategy<Value = String> {
    "[ -~]{0,40}"
}

/// Names with at least one alphanumeric character
fn meaningful_name() -> impl Strategy<Value = String> {
    "[ _.-]{0,3}[A-Za-z0-9][A-Za-z0-9 _.-]{0,20}"
}

fn environment() -> impl Strategy<Value = AppEnvironment> {
    prop_oneof![
        Just(AppEnvironment::Production),
        Just(AppEnvironment::Development),
    ]
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Property: formatted identifiers are valid CloudFormation names
    #[test]
    fn prop_formatted_identifier_is_valid_name(raw in raw_name()) {
        let formatted = format_identifier(&raw);
        prop_assert!(CloudFormationName::new(formatted.clone()).is_ok(), "{:?} -> {:?}", raw, formatted);
        prop_assert!(!formatted.contains("--"));
        prop_assert!(!formatted.ends_with('-'));
    }

    /// Property: formatting is idempotent
    #[test]
    fn prop_format_identifier_idempotent(raw in raw_name()) {
        let once = format_identifier(&raw);
        prop_assert_eq!(format_identifier(&once), once);
    }

    /// Property: stack ids match `{org}-{project}-{unit}-{env}-stack`
    #[test]
    fn prop_stack_id_is_canonical(
        org in meaningful_name(),
        project in meaningful_name(),
        unit in meaningful_name(),
        env in environment(),
    ) {
        let identity = StackIdentity::new(org.clone(), project.clone(), unit.clone(), env)
            .expect("non-empty segments");
        let stack_id = identity.stack_id();

        let expected = format!(
            "{}-{}-{}-{}-stack",
            format_identifier(&org),
            format_identifier(&project),
            format_identifier(&unit),
            env.as_str()
        );
        prop_assert_eq!(&stack_id, &expected);
        prop_assert_eq!(stack_id.to_lowercase(), stack_id.clone());
        prop_assert!(CloudFormationName::new(stack_id).is_ok());
    }

    /// Property: PascalCase conversion is idempotent
    #[test]
    fn prop_pascal_case_idempotent(raw in "[A-Za-z0-9 _-]{0,30}") {
        let once = to_pascal_case(&raw);
        prop_assert_eq!(to_pascal_case(&once), once.clone());
        prop_assert!(!once.contains(|c: char| c == ' ' || c == '_' || c == '-'));
    }
}
