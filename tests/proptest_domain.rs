//! Property-Based Tests — Domain Layer Invariants
//!
//! Uses `proptest` to verify that the naming grammar, CIDR matching,
//! label ordering, and health aggregation hold across random inputs.

use proptest::prelude::*;

use telemetry_gateway::domain::health::{HealthCheckReport, HealthCheckResult, HealthStatus};
use telemetry_gateway::domain::ip_filter::IpPattern;
use telemetry_gateway::domain::metrics::{validate_metric_name, LabelSet};

// ── Naming Grammar Properties ───────────────────────────────

proptest! {
    /// Every name drawn from the grammar must validate.
    #[test]
    fn grammar_conforming_names_accepted(
        name in "[a-zA-Z_:][a-zA-Z0-9_:]{0,100}",
    ) {
        // Skip the reserved namespace; it is rejected by design.
        prop_assume!(
            !["system_", "process_", "prometheus_", "opentelemetry_"]
                .iter()
                .any(|p| name.starts_with(p))
        );
        prop_assert!(
            validate_metric_name(&name, &[]).is_ok(),
            "{name} should validate"
        );
    }

    /// A name containing any character outside the grammar must fail.
    #[test]
    fn names_with_invalid_interior_rejected(
        prefix in "[a-z_]{1,10}",
        bad in "[^a-zA-Z0-9_:]",
        suffix in "[a-z0-9_]{0,10}",
    ) {
        let name = format!("{prefix}{bad}{suffix}");
        prop_assert!(
            validate_metric_name(&name, &[]).is_err(),
            "{name:?} should be rejected"
        );
    }

    /// Names over 255 characters always fail.
    #[test]
    fn overlong_names_rejected(extra in 1usize..100) {
        let name = "a".repeat(255 + extra);
        prop_assert!(validate_metric_name(&name, &[]).is_err());
    }
}

// ── CIDR Matching Properties ────────────────────────────────

proptest! {
    /// Any address sharing the masked prefix bits matches the range;
    /// any address differing inside the prefix does not.
    #[test]
    fn cidr_v4_mask_semantics(
        base in any::<u32>(),
        candidate in any::<u32>(),
        prefix_len in 1u8..=32,
    ) {
        let network = std::net::Ipv4Addr::from(base);
        let pattern = IpPattern::parse(&format!("{network}/{prefix_len}")).unwrap();

        let addr = std::net::Ipv4Addr::from(candidate);
        let mask = u32::MAX << (32 - u32::from(prefix_len));
        let expected = (base & mask) == (candidate & mask);

        prop_assert_eq!(
            pattern.matches(&addr.to_string()),
            expected,
            "{}/{} vs {}",
            network,
            prefix_len,
            addr
        );
    }

    /// An exact pattern matches only itself.
    #[test]
    fn exact_pattern_is_equality(a in any::<u32>(), b in any::<u32>()) {
        let ip_a = std::net::Ipv4Addr::from(a).to_string();
        let ip_b = std::net::Ipv4Addr::from(b).to_string();
        let pattern = IpPattern::parse(&ip_a).unwrap();
        prop_assert_eq!(pattern.matches(&ip_b), ip_a == ip_b);
    }
}

// ── Label Ordering Properties ───────────────────────────────

proptest! {
    /// Insertion order never affects the serialized label key.
    #[test]
    fn label_storage_key_order_independent(
        pairs in proptest::collection::vec(("[a-z]{1,8}", "[a-z0-9]{0,8}"), 0..8),
    ) {
        let forward = LabelSet::from_pairs(pairs.clone());
        let mut reversed_pairs = pairs;
        reversed_pairs.reverse();
        // Reversal flips which duplicate wins, so only compare keys.
        let reversed = LabelSet::from_pairs(reversed_pairs);
        let keys_a: Vec<_> = forward.iter().map(|(k, _)| k.to_string()).collect();
        let keys_b: Vec<_> = reversed.iter().map(|(k, _)| k.to_string()).collect();
        prop_assert_eq!(keys_a, keys_b);
    }
}

// ── Health Aggregation Properties ───────────────────────────

fn arb_status() -> impl Strategy<Value = HealthStatus> {
    prop_oneof![
        Just(HealthStatus::Healthy),
        Just(HealthStatus::Degraded),
        Just(HealthStatus::Unhealthy),
    ]
}

proptest! {
    /// The aggregate is Unhealthy iff any child is Unhealthy, else
    /// Degraded iff any child is Degraded, else Healthy.
    #[test]
    fn report_status_is_worst_of_children(
        statuses in proptest::collection::vec(arb_status(), 0..10),
    ) {
        let results: Vec<_> = statuses
            .iter()
            .enumerate()
            .map(|(i, status)| {
                let name = format!("probe_{i}");
                match status {
                    HealthStatus::Healthy => HealthCheckResult::healthy(
                        &name, "ok", std::time::Duration::ZERO,
                    ),
                    HealthStatus::Degraded => HealthCheckResult::degraded(
                        &name, "slow", std::time::Duration::ZERO,
                    ),
                    HealthStatus::Unhealthy => HealthCheckResult::unhealthy(
                        &name, "down", std::time::Duration::ZERO,
                    ),
                }
            })
            .collect();

        let report = HealthCheckReport::aggregate(results, std::time::Duration::ZERO);

        let expected = if statuses.contains(&HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else if statuses.contains(&HealthStatus::Degraded) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
        prop_assert_eq!(report.status, expected);
    }
}
