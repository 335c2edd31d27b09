//! Compatibility rule engine.
//!
//! A rule states whether a change of type A and a change of type B, landing
//! in the same scope, can be merged without a resolver. Rules are plain
//! data; the only derived state is the [`RuleIndex`] built from them.
//!
//! Pairs with no rule are never treated as mergeable: [`analyze_compatibility`]
//! reports them as incompatible with [`MergeStrategy::AiRequired`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{ChangeType, CompatibilityRule, MergeStrategy};

// ---------------------------------------------------------------------------
// Default rule table
// ---------------------------------------------------------------------------

/// Build the fixed, hand-authored rule set.
pub fn build_default_rules() -> Vec<CompatibilityRule> {
    use ChangeType::*;
    use MergeStrategy::*;

    vec![
        // Imports
        CompatibilityRule::compatible(
            AddImport,
            AddImport,
            CombineImports,
            "Adding different imports is always compatible",
        ),
        CompatibilityRule::compatible(
            AddImport,
            RemoveImport,
            CombineImports,
            "Import additions and removals combine unless they name the same import",
        ),
        CompatibilityRule::incompatible(
            RemoveImport,
            RemoveImport,
            AiRequired,
            "Both tasks removed imports; check nothing still depends on them",
        ),
        CompatibilityRule::incompatible(
            ModifyImport,
            ModifyImport,
            AiRequired,
            "Both tasks rewrote the same import statement",
        ),
        CompatibilityRule::compatible(
            AddImport,
            AddFunction,
            AppendFunctions,
            "New imports and new functions occupy separate regions",
        ),
        // Functions
        CompatibilityRule::compatible(
            AddFunction,
            AddFunction,
            AppendFunctions,
            "Adding different functions is compatible",
        ),
        CompatibilityRule::compatible(
            AddFunction,
            ModifyFunction,
            AppendFunctions,
            "A new function can be appended next to a modified one",
        ),
        CompatibilityRule::incompatible(
            ModifyFunction,
            ModifyFunction,
            AiRequired,
            "Multiple modifications to the same function need analysis",
        ),
        CompatibilityRule::incompatible(
            RemoveFunction,
            ModifyFunction,
            HumanRequired,
            "One task removed a function another task modified",
        ),
        CompatibilityRule::incompatible(
            RenameFunction,
            ModifyFunction,
            AiRequired,
            "A renamed function was also modified; call sites must be reconciled",
        ),
        CompatibilityRule::incompatible(
            RenameFunction,
            RenameFunction,
            HumanRequired,
            "Both tasks renamed the same function",
        ),
        // React hooks and JSX
        CompatibilityRule::compatible(
            AddHookCall,
            AddHookCall,
            OrderByDependency,
            "Multiple hooks can be added in dependency order",
        ),
        CompatibilityRule::compatible(
            AddHookCall,
            WrapJsx,
            HooksThenWrap,
            "Hooks are added at the top of the component, wrapping applies to the return",
        ),
        CompatibilityRule::compatible(
            AddHookCall,
            ModifyFunction,
            HooksFirst,
            "Hooks go first, then the remaining function changes",
        ),
        CompatibilityRule::compatible(
            AddHookCall,
            AddJsxElement,
            HooksThenWrap,
            "Hooks are independent of new JSX children",
        ),
        CompatibilityRule::incompatible(
            RemoveHookCall,
            AddHookCall,
            AiRequired,
            "Hook removal next to hook addition may break hook ordering",
        ),
        CompatibilityRule::compatible(
            WrapJsx,
            WrapJsx,
            OrderByTime,
            "Wrappers can be nested in the order the tasks completed",
        ),
        CompatibilityRule::incompatible(
            WrapJsx,
            UnwrapJsx,
            AiRequired,
            "One task wrapped JSX another task unwrapped",
        ),
        CompatibilityRule::compatible(
            AddJsxElement,
            AddJsxElement,
            AppendStatements,
            "Sibling JSX elements can be appended",
        ),
        CompatibilityRule::compatible(
            ModifyJsxProps,
            ModifyJsxProps,
            CombineProps,
            "Prop changes combine unless they set the same prop",
        ),
        CompatibilityRule::compatible(
            WrapJsx,
            ModifyJsxProps,
            HooksThenWrap,
            "Props on the inner element survive wrapping",
        ),
        // Variables
        CompatibilityRule::compatible(
            AddVariable,
            AddVariable,
            AppendStatements,
            "Adding different variables is compatible",
        ),
        CompatibilityRule::compatible(
            AddConstant,
            AddVariable,
            AppendStatements,
            "Constants and variables are independent declarations",
        ),
        CompatibilityRule::compatible(
            AddConstant,
            AddConstant,
            AppendStatements,
            "Adding different constants is compatible",
        ),
        CompatibilityRule::incompatible(
            ModifyVariable,
            ModifyVariable,
            AiRequired,
            "Both tasks changed the same variable",
        ),
        CompatibilityRule::incompatible(
            RemoveVariable,
            ModifyVariable,
            HumanRequired,
            "One task removed a variable another task modified",
        ),
        // Classes and methods
        CompatibilityRule::compatible(
            AddMethod,
            AddMethod,
            AppendMethods,
            "Adding different methods is compatible",
        ),
        CompatibilityRule::compatible(
            AddMethod,
            ModifyMethod,
            AppendMethods,
            "A new method can be appended next to a modified one",
        ),
        CompatibilityRule::incompatible(
            ModifyMethod,
            ModifyMethod,
            AiRequired,
            "Multiple modifications to the same method need analysis",
        ),
        CompatibilityRule::incompatible(
            RemoveMethod,
            ModifyMethod,
            HumanRequired,
            "One task removed a method another task modified",
        ),
        CompatibilityRule::compatible(
            AddProperty,
            AddProperty,
            AppendStatements,
            "Adding different properties is compatible",
        ),
        CompatibilityRule::compatible(
            AddProperty,
            AddMethod,
            AppendMethods,
            "Properties and methods are independent class members",
        ),
        CompatibilityRule::compatible(
            AddClass,
            AddClass,
            AppendFunctions,
            "Adding different classes is compatible",
        ),
        CompatibilityRule::incompatible(
            ModifyClass,
            ModifyClass,
            AiRequired,
            "Both tasks changed the same class definition",
        ),
        CompatibilityRule::incompatible(
            RemoveClass,
            ModifyClass,
            HumanRequired,
            "One task removed a class another task modified",
        ),
        // Types and interfaces
        CompatibilityRule::compatible(
            AddType,
            AddType,
            AppendStatements,
            "Adding different types is compatible",
        ),
        CompatibilityRule::compatible(
            AddInterface,
            AddInterface,
            AppendStatements,
            "Adding different interfaces is compatible",
        ),
        CompatibilityRule::compatible(
            AddType,
            AddInterface,
            AppendStatements,
            "Type aliases and interfaces are independent declarations",
        ),
        CompatibilityRule::incompatible(
            ModifyType,
            ModifyType,
            AiRequired,
            "Both tasks changed the same type",
        ),
        CompatibilityRule::incompatible(
            ModifyInterface,
            ModifyInterface,
            AiRequired,
            "Both tasks changed the same interface",
        ),
        // Decorators
        CompatibilityRule::compatible(
            AddDecorator,
            AddDecorator,
            OrderByTime,
            "Decorators stack in the order the tasks completed",
        ),
        CompatibilityRule::incompatible(
            RemoveDecorator,
            AddDecorator,
            AiRequired,
            "Decorator removal next to decorator addition needs review",
        ),
        // Comments and formatting
        CompatibilityRule::compatible(
            AddComment,
            AddComment,
            AppendStatements,
            "Comments never change behaviour",
        ),
        CompatibilityRule::compatible(
            AddComment,
            ModifyFunction,
            AppendStatements,
            "A comment does not interfere with a function body change",
        ),
        CompatibilityRule::incompatible(
            ModifyComment,
            ModifyComment,
            AiRequired,
            "Both tasks rewrote the same comment",
        ),
        CompatibilityRule::compatible(
            FormattingOnly,
            FormattingOnly,
            OrderByTime,
            "Formatting changes can be replayed in order",
        ),
        // Unknown changes never merge automatically
        CompatibilityRule::incompatible(
            Unknown,
            Unknown,
            AiRequired,
            "Unclassified changes on both sides need analysis",
        ),
    ]
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// O(1) lookup from an ordered change-type pair to its rule.
#[derive(Debug, Clone, Default)]
pub struct RuleIndex {
    entries: HashMap<(ChangeType, ChangeType), CompatibilityRule>,
}

impl RuleIndex {
    /// The rule for `(a, b)`, or `None` when the table has a gap.
    pub fn lookup(&self, a: ChangeType, b: ChangeType) -> Option<&CompatibilityRule> {
        self.entries.get(&(a, b))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Index `rules` by ordered pair.
///
/// Each rule is stored under `(a, b)`; a bidirectional rule with `a != b`
/// is also stored under `(b, a)`. A later rule for the same key replaces
/// the earlier one.
pub fn index_rules(rules: &[CompatibilityRule]) -> RuleIndex {
    let mut entries = HashMap::with_capacity(rules.len() * 2);
    for rule in rules {
        let (a, b) = (rule.change_type_a, rule.change_type_b);
        entries.insert((a, b), rule.clone());
        if rule.bidirectional && a != b {
            entries.insert((b, a), rule.clone());
        }
    }
    debug!(rules = rules.len(), entries = entries.len(), "indexed compatibility rules");
    RuleIndex { entries }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Outcome of checking one change-type pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Compatibility {
    pub compatible: bool,
    pub strategy: Option<MergeStrategy>,
    pub reason: String,
}

/// Decide whether `a` and `b` can be merged automatically.
///
/// A missing rule is reported as incompatible with `ai_required`.
pub fn analyze_compatibility(index: &RuleIndex, a: ChangeType, b: ChangeType) -> Compatibility {
    match index.lookup(a, b) {
        Some(rule) => Compatibility {
            compatible: rule.compatible,
            strategy: rule.strategy,
            reason: rule.reason.clone(),
        },
        None => Compatibility {
            compatible: false,
            strategy: Some(MergeStrategy::AiRequired),
            reason: format!("no compatibility rule for {} + {}", a, b),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bidirectional_rule_is_symmetric() {
        let index = index_rules(&build_default_rules());
        for rule in build_default_rules().iter().filter(|r| r.bidirectional) {
            let forward = index.lookup(rule.change_type_a, rule.change_type_b);
            let backward = index.lookup(rule.change_type_b, rule.change_type_a);
            assert_eq!(forward, backward, "asymmetric rule {:?}", rule);
        }
    }

    #[test]
    fn test_one_way_rule_only_indexes_forward() {
        let rule = CompatibilityRule::compatible(
            ChangeType::AddHookCall,
            ChangeType::WrapJsx,
            MergeStrategy::HooksThenWrap,
            "hooks before wrap",
        )
        .one_way();
        let index = index_rules(&[rule]);
        assert!(index.lookup(ChangeType::AddHookCall, ChangeType::WrapJsx).is_some());
        assert!(index.lookup(ChangeType::WrapJsx, ChangeType::AddHookCall).is_none());
    }

    #[test]
    fn test_same_type_rule_indexes_once() {
        let rule = CompatibilityRule::compatible(
            ChangeType::AddImport,
            ChangeType::AddImport,
            MergeStrategy::CombineImports,
            "imports combine",
        );
        let index = index_rules(&[rule]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_later_rule_replaces_earlier() {
        let first = CompatibilityRule::compatible(
            ChangeType::AddVariable,
            ChangeType::AddVariable,
            MergeStrategy::AppendStatements,
            "first",
        );
        let second = CompatibilityRule::incompatible(
            ChangeType::AddVariable,
            ChangeType::AddVariable,
            MergeStrategy::AiRequired,
            "second",
        );
        let index = index_rules(&[first, second]);
        let rule = index
            .lookup(ChangeType::AddVariable, ChangeType::AddVariable)
            .unwrap();
        assert_eq!(rule.reason, "second");
        assert!(!rule.compatible);
    }

    #[test]
    fn test_default_rules_contain_canonical_pairs() {
        let index = index_rules(&build_default_rules());

        let imports = index.lookup(ChangeType::AddImport, ChangeType::AddImport).unwrap();
        assert!(imports.compatible);
        assert_eq!(imports.strategy, Some(MergeStrategy::CombineImports));

        let funcs = index
            .lookup(ChangeType::ModifyFunction, ChangeType::ModifyFunction)
            .unwrap();
        assert!(!funcs.compatible);
        assert_eq!(funcs.strategy, Some(MergeStrategy::AiRequired));

        let removal = index
            .lookup(ChangeType::ModifyFunction, ChangeType::RemoveFunction)
            .unwrap();
        assert_eq!(removal.strategy, Some(MergeStrategy::HumanRequired));
    }

    #[test]
    fn test_every_compatible_default_rule_has_automatic_strategy() {
        for rule in build_default_rules() {
            if rule.compatible {
                assert!(
                    rule.strategy.map(|s| s.is_automatic()).unwrap_or(false),
                    "compatible rule without automatic strategy: {:?}",
                    rule
                );
            }
        }
    }

    #[test]
    fn test_gap_defaults_to_incompatible() {
        let index = index_rules(&[]);
        let result = analyze_compatibility(&index, ChangeType::AddClass, ChangeType::FormattingOnly);
        assert!(!result.compatible);
        assert_eq!(result.strategy, Some(MergeStrategy::AiRequired));
        assert_eq!(result.reason, "no compatibility rule for add_class + formatting_only");
    }
}
