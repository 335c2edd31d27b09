//! Human-readable conflict reports and rule-table summaries.

use std::fmt::Write as _;

use crate::types::{ChangeType, CompatibilityRule, ConflictRegion, MergeStrategy};

/// Render a multi-line report for one conflict region.
pub fn explain_conflict(region: &ConflictRegion) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Conflict in {} at {}", region.file_path, region.location);
    let _ = writeln!(out, "Tasks involved: {}", region.tasks_involved.join(", "));
    let _ = writeln!(out, "Severity: {}", region.severity);

    let types: Vec<String> = region.change_types.iter().map(|ct| ct.to_string()).collect();
    let _ = writeln!(out, "Change types: {}", types.join(", "));

    if region.can_auto_merge {
        let strategy = region
            .merge_strategy
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unspecified".into());
        let _ = writeln!(out, "Can be auto-merged using strategy: {}", strategy);
    } else {
        let _ = writeln!(out, "Cannot be auto-merged");
        if region.merge_strategy == Some(MergeStrategy::HumanRequired) {
            let _ = writeln!(out, "Requires human review");
        }
    }
    let _ = write!(out, "Reason: {}", region.reason);

    out
}

/// The compatible pairs of `rules` with their strategies.
pub fn get_compatible_pairs(
    rules: &[CompatibilityRule],
) -> Vec<(ChangeType, ChangeType, Option<MergeStrategy>)> {
    rules
        .iter()
        .filter(|r| r.compatible)
        .map(|r| (r.change_type_a, r.change_type_b, r.strategy))
        .collect()
}

/// Operator-facing summary of a rule table.
pub fn format_compatibility_summary(rules: &[CompatibilityRule]) -> String {
    let (compatible, incompatible): (Vec<&CompatibilityRule>, Vec<&CompatibilityRule>) =
        rules.iter().partition(|r| r.compatible);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "Compatibility rules: {} total, {} compatible, {} incompatible",
        rules.len(),
        compatible.len(),
        incompatible.len()
    );

    let _ = writeln!(out);
    let _ = writeln!(out, "Compatible pairs:");
    for rule in &compatible {
        let strategy = rule
            .strategy
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unspecified".into());
        let _ = writeln!(
            out,
            "  {} + {} -> {}: {}",
            rule.change_type_a, rule.change_type_b, strategy, rule.reason
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Incompatible pairs:");
    for rule in &incompatible {
        let _ = writeln!(
            out,
            "  {} + {}: {}",
            rule.change_type_a, rule.change_type_b, rule.reason
        );
    }

    out
}
