// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Queue-Depth Scaling
//!
//! Workers scale out as soon as one message is visible and scale in only
//! after the queue has been idle for the whole evaluation window.

use iac_stacks::scaling::{queue_depth_policies, ScalingDecision, DEFAULT_MAX_CAPACITY};
use proptest::prelude::*;

/// Queue depth samples, one per period, oldest first
fn depths(min_len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec((0u32..50).prop_map(f64::from), min_len..20)
}

proptest! {
    /// Property: scale out tracks the newest datapoint only
    #[test]
    fn prop_scale_out_follows_latest_depth(samples in depths(1)) {
        let policies = queue_depth_policies("workshop-work", None);
        let decision = policies.scale_out.evaluate(&samples);

        let latest = samples[samples.len() - 1];
        if latest >= 1.0 {
            prop_assert_eq!(decision, ScalingDecision::Change(1));
        } else {
            prop_assert_eq!(decision, ScalingDecision::NoChange);
        }
    }

    /// Property: scale in needs three idle periods in a row
    #[test]
    fn prop_scale_in_requires_idle_window(samples in depths(3)) {
        let policies = queue_depth_policies("workshop-work", None);
        let decision = policies.scale_in.evaluate(&samples);

        let idle = samples[samples.len() - 3..].iter().all(|depth| *depth == 0.0);
        if idle {
            prop_assert_eq!(decision, ScalingDecision::Change(-1));
        } else {
            prop_assert_eq!(decision, ScalingDecision::NoChange);
        }
    }

    /// Property: a short history never triggers scale in
    #[test]
    fn prop_scale_in_short_history_is_insufficient(
        samples in prop::collection::vec(Just(0.0f64), 0..3)
    ) {
        let policies = queue_depth_policies("workshop-work", None);
        prop_assert_eq!(
            policies.scale_in.evaluate(&samples),
            ScalingDecision::InsufficientData
        );
    }

    /// Property: capacity bounds are zero to the requested maximum
    #[test]
    fn prop_capacity_bounds(max in prop::option::of(1u32..20)) {
        let policies = queue_depth_policies("workshop-work", max);
        prop_assert_eq!(policies.min_capacity, 0);
        prop_assert_eq!(policies.max_capacity, max.unwrap_or(DEFAULT_MAX_CAPACITY));
    }
}
