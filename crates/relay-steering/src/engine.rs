//! Rule compilation and evaluation.
//!
//! A rule set compiles once: regexes are built, ids checked unique, typed
//! operands verified, and rules ordered by priority with insertion order
//! preserved on ties. Evaluation is a pure function of (compiled set,
//! context) apart from log emission.

use crate::path;
use crate::rules::{
    Action, Condition, ConditionOperator, LogLevel, Rule, RuleOperator, RuleSet, TransformOp,
};
use regex::Regex;
use relay_core::RelayError;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Routing directive produced by `route` actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDirective {
    /// Target provider
    pub provider: String,
    /// Target model, when the rule pinned one
    pub model: Option<String>,
}

/// Per-rule evaluation record.
#[derive(Debug, Clone)]
pub struct RuleOutcome {
    /// The rule that was evaluated
    pub rule_id: String,
    /// Whether its conditions held
    pub matched: bool,
    /// How many actions were applied
    pub actions_applied: usize,
}

/// The result of evaluating a context against a compiled rule set.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    /// The transformed context
    pub context: Value,
    /// The winning routing directive, if any rule routed
    pub route: Option<RouteDirective>,
    /// A terminal rejection, if any rule rejected
    pub rejection: Option<(u16, String)>,
    /// Per-rule records in evaluation order
    pub results: Vec<RuleOutcome>,
    /// Whether any rule matched
    pub matched_any: bool,
}

impl EvaluationOutcome {
    /// True when a rule terminated the request.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.rejection.is_some()
    }
}

struct CompiledCondition {
    condition: Condition,
    regex: Option<Regex>,
}

struct CompiledRule {
    rule: Rule,
    conditions: Vec<CompiledCondition>,
}

/// An immutable, validated, pre-ordered rule set.
pub struct CompiledRuleSet {
    version: String,
    name: String,
    rules: Vec<CompiledRule>,
    default_actions: Vec<Action>,
}

impl CompiledRuleSet {
    /// Compile and validate a rule set.
    ///
    /// # Errors
    /// Returns `RuleSetInvalid` when ids collide, a regex does not compile,
    /// or an operand's type does not fit its operator.
    pub fn compile(set: RuleSet) -> Result<Self, RelayError> {
        let mut seen = std::collections::HashSet::new();
        for rule in &set.rules {
            if !seen.insert(rule.id.clone()) {
                return Err(RelayError::RuleSetInvalid {
                    message: format!("duplicate rule id '{}'", rule.id),
                });
            }
        }

        // Stable sort preserves insertion order between equal priorities
        let mut ordered = set.rules;
        ordered.sort_by_key(|rule| rule.priority);

        let mut rules = Vec::with_capacity(ordered.len());
        for rule in ordered {
            let mut conditions = Vec::with_capacity(rule.conditions.len());
            for condition in &rule.conditions {
                conditions.push(compile_condition(&rule.id, condition)?);
            }
            rules.push(CompiledRule { rule, conditions });
        }

        info!(
            name = %set.name,
            version = %set.version,
            rules = rules.len(),
            "Rule set compiled"
        );

        Ok(Self {
            version: set.version,
            name: set.name,
            rules,
            default_actions: set.default_actions,
        })
    }

    /// Rule set version tag.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Rule set name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate a context.
    ///
    /// The caller's context is never mutated; actions apply to a copy that
    /// only replaces the working context once the whole rule succeeds.
    ///
    /// # Errors
    /// Returns `TransformTypeMismatch` when a transform targets an
    /// incompatible field.
    pub fn evaluate(&self, context: &Value) -> Result<EvaluationOutcome, RelayError> {
        let mut working = context.clone();
        let mut route: Option<RouteDirective> = None;
        let mut rejection: Option<(u16, String)> = None;
        let mut results = Vec::new();
        let mut matched_any = false;

        for compiled in &self.rules {
            if !compiled.rule.enabled {
                continue;
            }

            let matched = match compiled.rule.operator {
                RuleOperator::And => compiled
                    .conditions
                    .iter()
                    .all(|c| evaluate_condition(&working, c)),
                RuleOperator::Or => {
                    !compiled.conditions.is_empty()
                        && compiled
                            .conditions
                            .iter()
                            .any(|c| evaluate_condition(&working, c))
                }
            };

            if !matched {
                results.push(RuleOutcome {
                    rule_id: compiled.rule.id.clone(),
                    matched: false,
                    actions_applied: 0,
                });
                continue;
            }

            matched_any = true;

            // Apply to a scratch copy; commit only when every action succeeds
            let mut scratch = working.clone();
            let mut applied = 0usize;
            for action in &compiled.rule.actions {
                apply_action(
                    &mut scratch,
                    &compiled.rule.id,
                    action,
                    &mut route,
                    &mut rejection,
                )?;
                applied += 1;
            }
            working = scratch;

            results.push(RuleOutcome {
                rule_id: compiled.rule.id.clone(),
                matched: true,
                actions_applied: applied,
            });

            debug!(
                rule = %compiled.rule.id,
                actions = applied,
                "Steering rule matched"
            );

            // Rejections are terminal within the current evaluation
            if rejection.is_some() || !compiled.rule.continue_eval {
                break;
            }
        }

        if !matched_any {
            let mut scratch = working.clone();
            for action in &self.default_actions {
                apply_action(&mut scratch, "default", action, &mut route, &mut rejection)?;
            }
            working = scratch;
        }

        Ok(EvaluationOutcome {
            context: working,
            route,
            rejection,
            results,
            matched_any,
        })
    }
}

fn compile_condition(
    rule_id: &str,
    condition: &Condition,
) -> Result<CompiledCondition, RelayError> {
    let regex = if condition.operator == ConditionOperator::Regex {
        let pattern = condition.value.as_str().ok_or_else(|| {
            RelayError::RuleSetInvalid {
                message: format!("rule '{rule_id}': regex value must be a string"),
            }
        })?;
        Some(Regex::new(pattern).map_err(|e| RelayError::RuleSetInvalid {
            message: format!("rule '{rule_id}': invalid regex: {e}"),
        })?)
    } else {
        None
    };

    if condition.operator.is_numeric() && !condition.value.is_number() {
        return Err(RelayError::RuleSetInvalid {
            message: format!(
                "rule '{rule_id}': operator on '{}' requires a numeric value",
                condition.field
            ),
        });
    }

    if condition.operator.is_membership() && !condition.value.is_array() {
        return Err(RelayError::RuleSetInvalid {
            message: format!(
                "rule '{rule_id}': membership operator on '{}' requires a set",
                condition.field
            ),
        });
    }

    Ok(CompiledCondition {
        condition: condition.clone(),
        regex,
    })
}

fn evaluate_condition(context: &Value, compiled: &CompiledCondition) -> bool {
    let condition = &compiled.condition;
    let field = path::resolve(context, &condition.field);

    match condition.operator {
        ConditionOperator::Exists => field.is_some(),
        ConditionOperator::NotExists => field.is_none(),
        ConditionOperator::Equals => field.map_or(false, |v| values_equal(v, &condition.value)),
        ConditionOperator::NotEquals => field.map_or(true, |v| !values_equal(v, &condition.value)),
        ConditionOperator::Contains => field.map_or(false, |v| contains(v, &condition.value)),
        ConditionOperator::NotContains => field.map_or(true, |v| !contains(v, &condition.value)),
        ConditionOperator::Regex => field
            .and_then(Value::as_str)
            .zip(compiled.regex.as_ref())
            .map_or(false, |(text, regex)| regex.is_match(text)),
        ConditionOperator::Gt => compare(field, &condition.value).map_or(false, |o| o.is_gt()),
        ConditionOperator::Lt => compare(field, &condition.value).map_or(false, |o| o.is_lt()),
        ConditionOperator::Gte => compare(field, &condition.value).map_or(false, |o| o.is_ge()),
        ConditionOperator::Lte => compare(field, &condition.value).map_or(false, |o| o.is_le()),
        ConditionOperator::In => field.map_or(false, |v| member_of(v, &condition.value)),
        ConditionOperator::NotIn => field.map_or(true, |v| !member_of(v, &condition.value)),
    }
}

fn values_equal(field: &Value, expected: &Value) -> bool {
    match (field.as_f64(), expected.as_f64()) {
        // Numbers compare numerically so 5 == 5.0
        (Some(a), Some(b)) => a == b,
        _ => field == expected,
    }
}

fn contains(field: &Value, needle: &Value) -> bool {
    match field {
        Value::String(text) => needle.as_str().map_or(false, |n| text.contains(n)),
        Value::Array(items) => items.iter().any(|item| values_equal(item, needle)),
        _ => false,
    }
}

fn member_of(field: &Value, set: &Value) -> bool {
    set.as_array()
        .map_or(false, |items| items.iter().any(|item| values_equal(item, field)))
}

fn compare(field: Option<&Value>, expected: &Value) -> Option<std::cmp::Ordering> {
    let a = field?.as_f64()?;
    let b = expected.as_f64()?;
    a.partial_cmp(&b)
}

fn apply_action(
    context: &mut Value,
    rule_id: &str,
    action: &Action,
    route: &mut Option<RouteDirective>,
    rejection: &mut Option<(u16, String)>,
) -> Result<(), RelayError> {
    match action {
        Action::Route { provider, model } => {
            path::set(context, "routing.provider", Value::String(provider.clone()));
            if let Some(model) = model {
                path::set(context, "routing.model", Value::String(model.clone()));
            }
            *route = Some(RouteDirective {
                provider: provider.clone(),
                model: model.clone(),
            });
        }
        Action::Transform {
            field,
            operation,
            value,
        } => apply_transform(context, field, *operation, value)?,
        Action::Inject { field, value } => {
            path::set(context, field, value.clone());
        }
        Action::Reject { status, message } => {
            path::set(context, "reject.status", Value::from(*status));
            path::set(context, "reject.message", Value::String(message.clone()));
            *rejection = Some((*status, message.clone()));
        }
        Action::Log { level, message } => match level {
            LogLevel::Debug => debug!(rule = %rule_id, "{message}"),
            LogLevel::Info => info!(rule = %rule_id, "{message}"),
            LogLevel::Warn => warn!(rule = %rule_id, "{message}"),
        },
    }
    Ok(())
}

fn apply_transform(
    context: &mut Value,
    field: &str,
    operation: TransformOp,
    operand: &Value,
) -> Result<(), RelayError> {
    let mismatch = || RelayError::TransformTypeMismatch {
        path: field.to_string(),
        operation: operation.as_str().to_string(),
    };

    match operation {
        TransformOp::Replace => {
            path::set(context, field, operand.clone());
            Ok(())
        }
        TransformOp::Delete => {
            path::delete(context, field);
            Ok(())
        }
        TransformOp::Append | TransformOp::Prepend => {
            let current = path::resolve(context, field).cloned().ok_or_else(mismatch)?;
            let updated = match current {
                Value::String(text) => {
                    let operand = operand.as_str().ok_or_else(mismatch)?;
                    if operation == TransformOp::Append {
                        Value::String(format!("{text}{operand}"))
                    } else {
                        Value::String(format!("{operand}{text}"))
                    }
                }
                Value::Array(mut items) => {
                    let mut extension = match operand {
                        Value::Array(values) => values.clone(),
                        single => vec![single.clone()],
                    };
                    if operation == TransformOp::Append {
                        items.append(&mut extension);
                        Value::Array(items)
                    } else {
                        extension.extend(items);
                        Value::Array(extension)
                    }
                }
                _ => return Err(mismatch()),
            };
            path::set(context, field, updated);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(yaml: &str) -> CompiledRuleSet {
        CompiledRuleSet::compile(RuleSet::from_yaml(yaml).expect("parse")).expect("compile")
    }

    fn context() -> Value {
        json!({
            "request": {
                "body": {"prompt": "please shutdown the reactor"},
                "metadata": {"task_type": "ops", "priority": 7}
            },
            "tokens": {"input": 12}
        })
    }

    #[test]
    fn test_reject_rule_terminates() {
        let set = compile(
            r#"
version: "1"
name: t
rules:
  - id: block
    name: block
    priority: 1
    conditions:
      - field: request.body.prompt
        operator: contains
        value: shutdown
    actions:
      - type: reject
        status: 403
        message: forbidden
  - id: later
    name: never reached
    priority: 2
    conditions: []
    actions:
      - type: inject
        field: marker
        value: true
"#,
        );

        let outcome = set.evaluate(&context()).expect("evaluate");
        assert_eq!(outcome.rejection, Some((403, "forbidden".to_string())));
        // The rejection is terminal: the later rule never ran
        assert!(path::resolve(&outcome.context, "marker").is_none());
        assert_eq!(
            path::resolve(&outcome.context, "reject.status"),
            Some(&json!(403))
        );
    }

    #[test]
    fn test_priority_order_and_last_route_wins() {
        let set = compile(
            r#"
version: "1"
name: t
rules:
  - id: second
    name: runs second
    priority: 20
    conditions: []
    actions:
      - type: route
        provider: anthropic
    continue: false
  - id: first
    name: runs first
    priority: 10
    conditions: []
    actions:
      - type: route
        provider: openai
        model: gpt-4-turbo
    continue: true
"#,
        );

        let outcome = set.evaluate(&json!({})).expect("evaluate");
        let route = outcome.route.expect("route");
        // The last matching rule before the non-continue stop wins
        assert_eq!(route.provider, "anthropic");
    }

    #[test]
    fn test_and_or_operators() {
        let set = compile(
            r#"
version: "1"
name: t
rules:
  - id: and-rule
    name: and
    priority: 1
    operator: and
    conditions:
      - field: request.metadata.task_type
        operator: equals
        value: ops
      - field: request.metadata.priority
        operator: gt
        value: 10
    actions:
      - type: inject
        field: and_hit
        value: true
    continue: true
  - id: or-rule
    name: or
    priority: 2
    operator: or
    conditions:
      - field: request.metadata.task_type
        operator: equals
        value: nope
      - field: request.metadata.priority
        operator: gte
        value: 7
    actions:
      - type: inject
        field: or_hit
        value: true
"#,
        );

        let outcome = set.evaluate(&context()).expect("evaluate");
        assert!(path::resolve(&outcome.context, "and_hit").is_none());
        assert_eq!(path::resolve(&outcome.context, "or_hit"), Some(&json!(true)));
    }

    #[test]
    fn test_disabled_rule_skipped() {
        let set = compile(
            r#"
version: "1"
name: t
rules:
  - id: off
    name: off
    priority: 1
    enabled: false
    conditions: []
    actions:
      - type: inject
        field: marker
        value: true
"#,
        );

        let outcome = set.evaluate(&json!({})).expect("evaluate");
        assert!(!outcome.matched_any);
        assert!(path::resolve(&outcome.context, "marker").is_none());
    }

    #[test]
    fn test_default_actions_when_nothing_matches() {
        let set = compile(
            r#"
version: "1"
name: t
rules:
  - id: never
    name: never
    priority: 1
    conditions:
      - field: missing.field
        operator: exists
    actions:
      - type: inject
        field: rule_hit
        value: true
defaultActions:
  - type: route
    provider: openai
"#,
        );

        let outcome = set.evaluate(&json!({})).expect("evaluate");
        assert!(!outcome.matched_any);
        assert_eq!(outcome.route.expect("route").provider, "openai");
    }

    #[test]
    fn test_transform_append_string_and_list() {
        let set = compile(
            r#"
version: "1"
name: t
rules:
  - id: t1
    name: t1
    priority: 1
    conditions: []
    actions:
      - type: transform
        field: text
        operation: append
        value: " world"
      - type: transform
        field: items
        operation: prepend
        value: first
"#,
        );

        let outcome = set
            .evaluate(&json!({"text": "hello", "items": ["second"]}))
            .expect("evaluate");
        assert_eq!(path::resolve(&outcome.context, "text"), Some(&json!("hello world")));
        assert_eq!(
            path::resolve(&outcome.context, "items"),
            Some(&json!(["first", "second"]))
        );
    }

    #[test]
    fn test_transform_mismatch_errors_and_preserves_caller_context() {
        let set = compile(
            r#"
version: "1"
name: t
rules:
  - id: t1
    name: t1
    priority: 1
    conditions: []
    actions:
      - type: transform
        field: number
        operation: append
        value: "x"
"#,
        );

        let ctx = json!({"number": 42});
        let result = set.evaluate(&ctx);
        assert!(matches!(
            result,
            Err(RelayError::TransformTypeMismatch { .. })
        ));
        // Caller's context untouched
        assert_eq!(ctx, json!({"number": 42}));
    }

    #[test]
    fn test_membership_and_regex() {
        let set = compile(
            r#"
version: "1"
name: t
rules:
  - id: member
    name: member
    priority: 1
    conditions:
      - field: request.metadata.task_type
        operator: in
        value: [ops, sre]
      - field: request.body.prompt
        operator: regex
        value: "shut\\w+"
    actions:
      - type: inject
        field: hit
        value: true
"#,
        );

        let outcome = set.evaluate(&context()).expect("evaluate");
        assert_eq!(path::resolve(&outcome.context, "hit"), Some(&json!(true)));
    }

    #[test]
    fn test_invalid_regex_rejected_at_compile() {
        let result = CompiledRuleSet::compile(
            RuleSet::from_yaml(
                r#"
version: "1"
name: t
rules:
  - id: bad
    name: bad
    priority: 1
    conditions:
      - field: x
        operator: regex
        value: "("
    actions: []
"#,
            )
            .expect("parse"),
        );
        assert!(matches!(result, Err(RelayError::RuleSetInvalid { .. })));
    }

    #[test]
    fn test_duplicate_ids_rejected_at_compile() {
        let result = CompiledRuleSet::compile(
            RuleSet::from_yaml(
                r#"
version: "1"
name: t
rules:
  - id: dup
    name: a
    priority: 1
    conditions: []
    actions: []
  - id: dup
    name: b
    priority: 2
    conditions: []
    actions: []
"#,
            )
            .expect("parse"),
        );
        assert!(matches!(result, Err(RelayError::RuleSetInvalid { .. })));
    }

    #[test]
    fn test_numeric_operator_requires_numeric_value() {
        let result = CompiledRuleSet::compile(
            RuleSet::from_yaml(
                r#"
version: "1"
name: t
rules:
  - id: bad
    name: bad
    priority: 1
    conditions:
      - field: x
        operator: gt
        value: "ten"
    actions: []
"#,
            )
            .expect("parse"),
        );
        assert!(matches!(result, Err(RelayError::RuleSetInvalid { .. })));
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let set = compile(
            r#"
version: "1"
name: t
rules:
  - id: r1
    name: r1
    priority: 1
    conditions:
      - field: request.metadata.priority
        operator: lte
        value: 7
    actions:
      - type: route
        provider: openai
      - type: inject
        field: touched
        value: true
"#,
        );

        let ctx = context();
        let first = set.evaluate(&ctx).expect("first");
        let second = set.evaluate(&ctx).expect("second");
        assert_eq!(first.context, second.context);
        assert_eq!(first.route, second.route);
    }
}
