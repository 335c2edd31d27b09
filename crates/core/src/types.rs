//! Vocabulary shared by every taskweave component.
//!
//! Change-type and merge-strategy tags, conflict severities, and the
//! records built from them (rules, semantic changes, task snapshots, file
//! evolutions, conflict regions). Timeline records live in
//! [`crate::timeline::model`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Change types
// ---------------------------------------------------------------------------

/// Category of one atomic semantic edit, as tagged by the external
/// classifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    // Imports
    AddImport,
    RemoveImport,
    ModifyImport,

    // Functions
    AddFunction,
    RemoveFunction,
    ModifyFunction,
    RenameFunction,

    // React / JSX
    AddHookCall,
    RemoveHookCall,
    WrapJsx,
    UnwrapJsx,
    AddJsxElement,
    ModifyJsxProps,

    // Variables
    AddVariable,
    RemoveVariable,
    ModifyVariable,
    AddConstant,

    // Classes
    AddClass,
    RemoveClass,
    ModifyClass,
    AddMethod,
    RemoveMethod,
    ModifyMethod,
    AddProperty,

    // Types
    AddType,
    ModifyType,
    AddInterface,
    ModifyInterface,

    // Decorators
    AddDecorator,
    RemoveDecorator,

    // Generic
    AddComment,
    ModifyComment,
    FormattingOnly,
    Unknown,
}

impl ChangeType {
    /// Every change type, in declaration order.
    pub const ALL: [ChangeType; 34] = [
        Self::AddImport,
        Self::RemoveImport,
        Self::ModifyImport,
        Self::AddFunction,
        Self::RemoveFunction,
        Self::ModifyFunction,
        Self::RenameFunction,
        Self::AddHookCall,
        Self::RemoveHookCall,
        Self::WrapJsx,
        Self::UnwrapJsx,
        Self::AddJsxElement,
        Self::ModifyJsxProps,
        Self::AddVariable,
        Self::RemoveVariable,
        Self::ModifyVariable,
        Self::AddConstant,
        Self::AddClass,
        Self::RemoveClass,
        Self::ModifyClass,
        Self::AddMethod,
        Self::RemoveMethod,
        Self::ModifyMethod,
        Self::AddProperty,
        Self::AddType,
        Self::ModifyType,
        Self::AddInterface,
        Self::ModifyInterface,
        Self::AddDecorator,
        Self::RemoveDecorator,
        Self::AddComment,
        Self::ModifyComment,
        Self::FormattingOnly,
        Self::Unknown,
    ];

    /// The snake_case tag used on the wire and in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddImport => "add_import",
            Self::RemoveImport => "remove_import",
            Self::ModifyImport => "modify_import",
            Self::AddFunction => "add_function",
            Self::RemoveFunction => "remove_function",
            Self::ModifyFunction => "modify_function",
            Self::RenameFunction => "rename_function",
            Self::AddHookCall => "add_hook_call",
            Self::RemoveHookCall => "remove_hook_call",
            Self::WrapJsx => "wrap_jsx",
            Self::UnwrapJsx => "unwrap_jsx",
            Self::AddJsxElement => "add_jsx_element",
            Self::ModifyJsxProps => "modify_jsx_props",
            Self::AddVariable => "add_variable",
            Self::RemoveVariable => "remove_variable",
            Self::ModifyVariable => "modify_variable",
            Self::AddConstant => "add_constant",
            Self::AddClass => "add_class",
            Self::RemoveClass => "remove_class",
            Self::ModifyClass => "modify_class",
            Self::AddMethod => "add_method",
            Self::RemoveMethod => "remove_method",
            Self::ModifyMethod => "modify_method",
            Self::AddProperty => "add_property",
            Self::AddType => "add_type",
            Self::ModifyType => "modify_type",
            Self::AddInterface => "add_interface",
            Self::ModifyInterface => "modify_interface",
            Self::AddDecorator => "add_decorator",
            Self::RemoveDecorator => "remove_decorator",
            Self::AddComment => "add_comment",
            Self::ModifyComment => "modify_comment",
            Self::FormattingOnly => "formatting_only",
            Self::Unknown => "unknown",
        }
    }

    /// Pure additions never rewrite existing code.
    pub fn is_additive(&self) -> bool {
        matches!(
            self,
            Self::AddImport
                | Self::AddFunction
                | Self::AddHookCall
                | Self::AddJsxElement
                | Self::AddVariable
                | Self::AddConstant
                | Self::AddClass
                | Self::AddMethod
                | Self::AddProperty
                | Self::AddType
                | Self::AddInterface
                | Self::AddDecorator
                | Self::AddComment
        )
    }

    pub fn is_removal(&self) -> bool {
        matches!(
            self,
            Self::RemoveImport
                | Self::RemoveFunction
                | Self::RemoveHookCall
                | Self::RemoveVariable
                | Self::RemoveClass
                | Self::RemoveMethod
                | Self::RemoveDecorator
        )
    }

    /// Edits to the body of an existing symbol.
    pub fn is_modification(&self) -> bool {
        matches!(
            self,
            Self::ModifyImport
                | Self::ModifyFunction
                | Self::ModifyJsxProps
                | Self::ModifyVariable
                | Self::ModifyClass
                | Self::ModifyMethod
                | Self::ModifyType
                | Self::ModifyInterface
                | Self::ModifyComment
        )
    }

    /// Changes that reshape the surrounding code (renames, JSX wrapping).
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::RenameFunction | Self::WrapJsx | Self::UnwrapJsx)
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|ct| ct.as_str() == normalized)
            .ok_or_else(|| format!("unknown change type '{}'", s))
    }
}

// ---------------------------------------------------------------------------
// Merge strategies
// ---------------------------------------------------------------------------

/// A named automatic-merge procedure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    CombineImports,
    HooksFirst,
    HooksThenWrap,
    AppendFunctions,
    AppendMethods,
    CombineProps,
    OrderByDependency,
    OrderByTime,
    AppendStatements,
    /// No automatic strategy exists; hand the region to an AI resolver.
    AiRequired,
    /// No automatic strategy exists and the region must go to a human.
    HumanRequired,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CombineImports => "combine_imports",
            Self::HooksFirst => "hooks_first",
            Self::HooksThenWrap => "hooks_then_wrap",
            Self::AppendFunctions => "append_functions",
            Self::AppendMethods => "append_methods",
            Self::CombineProps => "combine_props",
            Self::OrderByDependency => "order_by_dependency",
            Self::OrderByTime => "order_by_time",
            Self::AppendStatements => "append_statements",
            Self::AiRequired => "ai_required",
            Self::HumanRequired => "human_required",
        }
    }

    /// Whether this names a procedure that can run without a resolver.
    pub fn is_automatic(&self) -> bool {
        !matches!(self, Self::AiRequired | Self::HumanRequired)
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// How bad a conflict region is, ordered from harmless to critical.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ConflictSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

// ---------------------------------------------------------------------------
// Compatibility rules
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

/// Whether a change of type A and a change of type B in overlapping scope
/// can be merged automatically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompatibilityRule {
    pub change_type_a: ChangeType,
    pub change_type_b: ChangeType,
    pub compatible: bool,
    pub strategy: Option<MergeStrategy>,
    pub reason: String,
    /// Also applies with A and B swapped.
    #[serde(default = "default_true")]
    pub bidirectional: bool,
}

impl CompatibilityRule {
    /// A bidirectional rule that can be merged with `strategy`.
    pub fn compatible(
        a: ChangeType,
        b: ChangeType,
        strategy: MergeStrategy,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            change_type_a: a,
            change_type_b: b,
            compatible: true,
            strategy: Some(strategy),
            reason: reason.into(),
            bidirectional: true,
        }
    }

    /// A bidirectional rule that needs a resolver (`strategy` is normally
    /// one of the sentinels).
    pub fn incompatible(
        a: ChangeType,
        b: ChangeType,
        strategy: MergeStrategy,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            change_type_a: a,
            change_type_b: b,
            compatible: false,
            strategy: Some(strategy),
            reason: reason.into(),
            bidirectional: true,
        }
    }

    /// Restrict the rule to the `(a, b)` ordering.
    pub fn one_way(mut self) -> Self {
        self.bidirectional = false;
        self
    }
}

// ---------------------------------------------------------------------------
// Semantic changes and task snapshots
// ---------------------------------------------------------------------------

/// One classified edit, produced outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SemanticChange {
    pub change_type: ChangeType,
    /// Symbol or identifier the change applies to.
    pub target: String,
    /// Region key, e.g. `function:parse` or `src/utils.ts:12`.
    pub location: String,
    pub line_start: u32,
    pub line_end: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_after: Option<String>,
}

impl SemanticChange {
    pub fn new(
        change_type: ChangeType,
        target: impl Into<String>,
        location: impl Into<String>,
        line_start: u32,
        line_end: u32,
    ) -> Self {
        Self {
            change_type,
            target: target.into(),
            location: location.into(),
            line_start,
            line_end,
            content_before: None,
            content_after: None,
        }
    }

    /// Whether the two changes touch at least one common line.
    pub fn overlaps(&self, other: &SemanticChange) -> bool {
        self.line_start <= other.line_end && other.line_start <= self.line_end
    }
}

/// One task's recorded interaction with one file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub task_intent: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub content_hash_before: String,
    pub content_hash_after: Option<String>,
    #[serde(default)]
    pub semantic_changes: Vec<SemanticChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_diff: Option<String>,
}

impl TaskSnapshot {
    /// A fresh, active snapshot with no recorded outcome.
    pub fn new(
        task_id: impl Into<String>,
        task_intent: impl Into<String>,
        content_hash_before: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            task_intent: task_intent.into(),
            started_at,
            completed_at: None,
            content_hash_before: content_hash_before.into(),
            content_hash_after: None,
            semantic_changes: Vec::new(),
            raw_diff: None,
        }
    }

    /// A task is active on a file until it is marked completed.
    pub fn is_active(&self) -> bool {
        self.completed_at.is_none()
    }

    /// Whether the task actually changed the file (not a no-op touch).
    pub fn has_modifications(&self) -> bool {
        match &self.content_hash_after {
            Some(after) => after != &self.content_hash_before,
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// File evolution
// ---------------------------------------------------------------------------

/// The full per-file record: its baseline plus every task snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEvolution {
    pub file_path: String,
    pub baseline_commit: String,
    pub baseline_captured_at: DateTime<Utc>,
    pub baseline_content_hash: String,
    /// Baseline snapshot location, relative to the state directory.
    pub baseline_snapshot_path: String,
    #[serde(default)]
    pub task_snapshots: Vec<TaskSnapshot>,
}

impl FileEvolution {
    pub fn new(
        file_path: impl Into<String>,
        baseline_commit: impl Into<String>,
        baseline_content_hash: impl Into<String>,
        baseline_snapshot_path: impl Into<String>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            baseline_commit: baseline_commit.into(),
            baseline_captured_at: captured_at,
            baseline_content_hash: baseline_content_hash.into(),
            baseline_snapshot_path: baseline_snapshot_path.into(),
            task_snapshots: Vec::new(),
        }
    }

    pub fn snapshot(&self, task_id: &str) -> Option<&TaskSnapshot> {
        self.task_snapshots.iter().find(|s| s.task_id == task_id)
    }

    pub fn snapshot_mut(&mut self, task_id: &str) -> Option<&mut TaskSnapshot> {
        self.task_snapshots.iter_mut().find(|s| s.task_id == task_id)
    }

    /// Insert `snapshot`, replacing any existing one for the same task in
    /// place so a task never appears twice.
    pub fn upsert_snapshot(&mut self, snapshot: TaskSnapshot) {
        match self
            .task_snapshots
            .iter_mut()
            .find(|s| s.task_id == snapshot.task_id)
        {
            Some(existing) => *existing = snapshot,
            None => self.task_snapshots.push(snapshot),
        }
    }

    /// Remove the task's snapshot. Returns whether one was present.
    pub fn remove_snapshot(&mut self, task_id: &str) -> bool {
        let before = self.task_snapshots.len();
        self.task_snapshots.retain(|s| s.task_id != task_id);
        self.task_snapshots.len() != before
    }

    /// Snapshots that actually changed the file.
    pub fn modifying_snapshots(&self) -> impl Iterator<Item = &TaskSnapshot> {
        self.task_snapshots.iter().filter(|s| s.has_modifications())
    }
}

// ---------------------------------------------------------------------------
// Conflict regions
// ---------------------------------------------------------------------------

/// A computed grouping of overlapping changes from several tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictRegion {
    pub file_path: String,
    pub location: String,
    pub tasks_involved: Vec<String>,
    pub change_types: Vec<ChangeType>,
    pub severity: ConflictSeverity,
    pub can_auto_merge: bool,
    pub merge_strategy: Option<MergeStrategy>,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_type_tags_roundtrip_through_from_str() {
        for ct in ChangeType::ALL {
            assert_eq!(ct.as_str().parse::<ChangeType>().unwrap(), ct);
        }
        assert_eq!("add-import".parse::<ChangeType>().unwrap(), ChangeType::AddImport);
        assert!("add_everything".parse::<ChangeType>().is_err());
    }

    #[test]
    fn test_serde_tag_matches_display() {
        let json = serde_json::to_string(&ChangeType::ModifyJsxProps).unwrap();
        assert_eq!(json, "\"modify_jsx_props\"");
        let json = serde_json::to_string(&MergeStrategy::AiRequired).unwrap();
        assert_eq!(json, "\"ai_required\"");
        assert_eq!(ConflictSeverity::Critical.to_string(), "critical");
    }

    #[test]
    fn test_strategy_sentinels_are_not_automatic() {
        assert!(MergeStrategy::CombineImports.is_automatic());
        assert!(!MergeStrategy::AiRequired.is_automatic());
        assert!(!MergeStrategy::HumanRequired.is_automatic());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(ConflictSeverity::None < ConflictSeverity::Low);
        assert!(ConflictSeverity::High < ConflictSeverity::Critical);
    }

    #[test]
    fn test_snapshot_modification_requires_different_hash() {
        let now = Utc::now();
        let mut snap = TaskSnapshot::new("t1", "intent", "aaaa", now);
        assert!(!snap.has_modifications());
        snap.content_hash_after = Some("aaaa".into());
        assert!(!snap.has_modifications());
        snap.content_hash_after = Some("bbbb".into());
        assert!(snap.has_modifications());
        assert!(snap.is_active());
    }

    #[test]
    fn test_upsert_never_duplicates() {
        let now = Utc::now();
        let mut evo = FileEvolution::new("a.rs", "c1", "h0", "baselines/a.rs.baseline", now);
        evo.upsert_snapshot(TaskSnapshot::new("t1", "first", "h0", now));
        evo.upsert_snapshot(TaskSnapshot::new("t1", "second", "h0", now));
        assert_eq!(evo.task_snapshots.len(), 1);
        assert_eq!(evo.task_snapshots[0].task_intent, "second");
        assert!(evo.remove_snapshot("t1"));
        assert!(!evo.remove_snapshot("t1"));
    }

    #[test]
    fn test_rule_defaults_to_bidirectional_when_field_missing() {
        let json = r#"{
            "change_type_a": "add_import",
            "change_type_b": "add_import",
            "compatible": true,
            "strategy": "combine_imports",
            "reason": "imports combine"
        }"#;
        let rule: CompatibilityRule = serde_json::from_str(json).unwrap();
        assert!(rule.bidirectional);
    }

    #[test]
    fn test_line_overlap() {
        let a = SemanticChange::new(ChangeType::ModifyFunction, "parse", "function:parse", 10, 20);
        let b = SemanticChange::new(ChangeType::ModifyFunction, "parse", "function:parse", 20, 30);
        let c = SemanticChange::new(ChangeType::ModifyFunction, "parse", "function:parse", 31, 40);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }
}
