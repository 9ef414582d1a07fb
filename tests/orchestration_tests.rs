// Copyright (c) 2025 - Cowboy AI, Inc.
//! Orchestration Tests
//!
//! Runs the stack builder end to end with scripted parts and with the
//! workshop deployment, checking skip and halt behaviour and what observers see.

mod fixtures;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;
use fixtures::{config, write_workshop_tree, Script, ScriptedPart};
use iac_stacks::assembly::Assembly;
use iac_stacks::composition::{BuildEvent, EventLevel, RecordingObserver, StackBuilder};
use iac_stacks::config::NetworkSettings;
use iac_stacks::domain::CidrBlock;
use iac_stacks::errors::StackError;
use iac_stacks::stacks::VpcProps;
use iac_stacks::state_machine::BuildPhase;
use iac_stacks::workshop::{workshop_parts, ModulePaths};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

#[test]
fn test_missing_asset_skips_part_and_run_completes() -> Result<()> {
    let observer = Arc::new(RecordingObserver::new());
    let builder = StackBuilder::new(&config(), observer.clone())?;
    let props = builder.props().clone();

    let backend = ScriptedPart::new(&props, "backend", Script::Units(vec!["ApiLambda"]));
    let frontend = ScriptedPart::new(
        &props,
        "frontend",
        Script::MissingAsset("workshop/src/apps/frontend/dist"),
    );

    let report = builder.build(vec![backend.boxed(), frontend.boxed()])?;

    assert_eq!(report.built_parts(), vec!["backend"]);
    assert_eq!(report.skipped_parts(), vec!["frontend"]);
    assert_eq!(report.phase, BuildPhase::Completed { built: 1, skipped: 1 });

    let warnings = observer.warnings();
    assert_eq!(warnings.len(), 1);
    match &warnings[0] {
        BuildEvent::PartSkipped { part, reason } => {
            assert_eq!(part, "frontend");
            assert!(reason.contains("Cannot find asset"));
        }
        other => panic!("unexpected warning {:?}", other),
    }

    Ok(())
}

#[test]
fn test_external_error_halts_run() -> Result<()> {
    let observer = Arc::new(RecordingObserver::new());
    let builder = StackBuilder::new(&config(), observer.clone())?;
    let props = builder.props().clone();

    let first = ScriptedPart::new(&props, "first", Script::Units(vec!["Queue"]));
    let denied = ScriptedPart::new(&props, "denied", Script::External("Access Denied"));
    let last = ScriptedPart::new(&props, "last", Script::Units(vec!["Storage"]));
    let last_calls = last.calls();

    let err = builder
        .build(vec![first.boxed(), denied.boxed(), last.boxed()])
        .unwrap_err();

    assert!(matches!(err, StackError::External(ref message) if message == "Access Denied"));
    assert_eq!(last_calls.load(Ordering::SeqCst), 0);

    let names: Vec<&str> = observer
        .events()
        .iter()
        .map(|recorded| recorded.event.name())
        .collect();
    assert!(names.contains(&"part_failed"));
    assert!(!names.contains(&"run_completed"));

    Ok(())
}

#[test]
fn test_parts_run_in_dependency_order() -> Result<()> {
    let observer = Arc::new(RecordingObserver::new());
    let builder = StackBuilder::new(&config(), observer.clone())?;
    let props = builder.props().clone();

    let frontend = ScriptedPart::new(&props, "frontend", Script::Units(vec!["Site"])).after("backend");
    let backend = ScriptedPart::new(&props, "backend", Script::Units(vec!["ApiLambda"]));

    let report = builder.build(vec![frontend.boxed(), backend.boxed()])?;
    assert_eq!(report.built_parts(), vec!["backend", "frontend"]);

    let started: Vec<String> = observer
        .events()
        .into_iter()
        .filter_map(|recorded| match recorded.event {
            BuildEvent::PartStarted { part } => Some(part),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec!["backend", "frontend"]);

    Ok(())
}

#[test]
fn test_dependency_cycle_is_rejected_before_any_build() -> Result<()> {
    let builder = StackBuilder::new(&config(), Arc::new(RecordingObserver::new()))?;
    let props = builder.props().clone();

    let a = ScriptedPart::new(&props, "a", Script::Units(vec!["A"])).after("b");
    let b = ScriptedPart::new(&props, "b", Script::Units(vec!["B"])).after("a");
    let a_calls = a.calls();

    let err = builder.build(vec![a.boxed(), b.boxed()]).unwrap_err();
    assert!(matches!(err, StackError::DependencyCycle { .. }));
    assert_eq!(a_calls.load(Ordering::SeqCst), 0);

    Ok(())
}

#[test]
fn test_every_event_is_info_except_warnings() -> Result<()> {
    let observer = Arc::new(RecordingObserver::new());
    let builder = StackBuilder::new(&config(), observer.clone())?;
    let props = builder.props().clone();
    let part = ScriptedPart::new(&props, "backend", Script::Units(vec!["ApiLambda"]));

    builder.build(vec![part.boxed()])?;

    let events = observer.events();
    assert!(events.iter().all(|recorded| recorded.level == EventLevel::Info));
    assert_eq!(events.first().map(|r| r.event.name()), Some("run_started"));
    assert_eq!(events.last().map(|r| r.event.name()), Some("run_completed"));

    Ok(())
}

#[test]
fn test_provisioned_network_is_shared_with_parts() -> Result<()> {
    let mut config = config().with_org_prefix("acme");
    config.network = NetworkSettings::Provision(VpcProps::standard("workshop", CidrBlock::legacy()));
    let builder = StackBuilder::new(&config, Arc::new(RecordingObserver::new()))?;
    assert!(builder.props().network.stack_id.is_some());

    let props = builder.props().clone();
    let part = ScriptedPart::new(&props, "backend", Script::Units(vec!["ApiLambda"]));
    let report = builder.build(vec![part.boxed()])?;

    let ids: Vec<String> = report.units().map(|unit| unit.id()).collect();
    assert_eq!(
        ids,
        vec![
            "acme-cdk-intro-workshop-vpcstack-production-stack",
            "acme-cdk-intro-workshop-apilambda-production-stack",
        ]
    );

    Ok(())
}

#[test]
fn test_workshop_deployment_end_to_end() -> Result<()> {
    let dir = TempDir::new()?;
    write_workshop_tree(dir.path());
    let config = config()
        .with_source_root(dir.path())
        .with_context("private-subnets", "subnet-a,subnet-b")
        .with_context("public-subnets", "subnet-c");

    let builder = StackBuilder::new(&config, Arc::new(RecordingObserver::new()))?;
    let paths = ModulePaths::workshop(builder.props().source_root.clone());
    let parts = workshop_parts(builder.props(), &paths);
    let report = builder.build(parts)?;

    assert_eq!(report.built_parts(), vec!["production-backend", "production-shared"]);

    let assembly = Assembly::from_report(&report)?;
    assert_eq!(
        assembly.stack_ids(),
        vec![
            "m47-cdk-intro-workshop-apilambda-production-stack",
            "m47-cdk-intro-workshop-apigateway-production-stack",
            "m47-cdk-intro-workshop-rdspostgres-production-stack",
            "m47-cdk-intro-workshop-pipeline-production-stack",
            "m47-cdk-intro-workshop-bastion-production-stack",
        ]
    );

    Ok(())
}

/// Image URI of the API function in one workshop synthesis under `config`
fn synthesize_api_image(config: &iac_stacks::config::DeploymentConfig) -> Result<serde_json::Value> {
    let builder = StackBuilder::new(config, Arc::new(RecordingObserver::new()))?;
    let paths = ModulePaths::workshop(builder.props().source_root.clone());
    let parts = workshop_parts(builder.props(), &paths);
    let assembly = Assembly::from_report(&builder.build(parts)?)?;
    assembly.write(&config.out_dir)?;

    let template = assembly
        .template("m47-cdk-intro-workshop-apilambda-production-stack")
        .expect("api function stack");
    Ok(template["Resources"]["Function"]["Properties"]["Code"]["ImageUri"].clone())
}

#[test]
fn test_repeated_synthesis_into_source_root_keeps_image_uri() -> Result<()> {
    let dir = TempDir::new()?;
    write_workshop_tree(dir.path());
    let config = config()
        .with_source_root(dir.path())
        .with_out_dir(dir.path().join("cdk.out"))
        .with_context("private-subnets", "subnet-a,subnet-b")
        .with_context("public-subnets", "subnet-c");

    let first = synthesize_api_image(&config)?;
    assert!(dir.path().join("cdk.out/manifest.json").is_file());
    let second = synthesize_api_image(&config)?;

    assert!(!first.is_null());
    assert_eq!(first, second);

    Ok(())
}

#[test]
fn test_workshop_without_dockerfile_still_builds_shared_stacks() -> Result<()> {
    let dir = TempDir::new()?;
    let config = config()
        .with_source_root(dir.path())
        .with_context("private-subnets", "subnet-a")
        .with_context("public-subnets", "subnet-c");

    let observer = Arc::new(RecordingObserver::new());
    let builder = StackBuilder::new(&config, observer.clone())?;
    let paths = ModulePaths::workshop(builder.props().source_root.clone());
    let parts = workshop_parts(builder.props(), &paths);
    let report = builder.build(parts)?;

    assert_eq!(report.skipped_parts(), vec!["production-backend"]);
    assert_eq!(report.built_parts(), vec!["production-shared"]);
    assert_eq!(observer.warnings().len(), 1);

    Ok(())
}
