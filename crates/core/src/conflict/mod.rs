//! Conflict detection and explanation.
//!
//! The conflict subsystem is responsible for:
//! 1. **Detection** -- grouping concurrent tasks' changes to one file into
//!    regions and deciding, via the rule engine, whether each region merges.
//! 2. **Explanation** -- rendering regions and rule tables for operators.

pub mod detector;
pub mod explain;

pub use detector::{assess_severity, changes_by_task, detect_regions};
pub use explain::{explain_conflict, format_compatibility_summary, get_compatible_pairs};
