//! The steering rule set model and its declarative file format.
//!
//! Rule sets are YAML mappings with sequences of rules, conditions, and
//! actions. Serializing and parsing a rule set round-trips exactly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A versioned, named, ordered collection of steering rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    /// Rule set version tag
    pub version: String,

    /// Human-readable name
    pub name: String,

    /// Ordered rules
    pub rules: Vec<Rule>,

    /// Actions applied once when no rule matched
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_actions: Vec<Action>,
}

impl RuleSet {
    /// Parse a rule set from YAML text.
    ///
    /// # Errors
    /// Returns the underlying parse error; callers map it to `RuleSetInvalid`.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Render the rule set as YAML text.
    ///
    /// # Errors
    /// Returns the underlying serialization error.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// One steering rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique identifier within the set
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Evaluation order; lower runs earlier
    pub priority: i32,

    /// Disabled rules are skipped
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How conditions combine
    #[serde(default)]
    pub operator: RuleOperator,

    /// Conditions evaluated against the request context
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Actions applied when the rule matches
    pub actions: Vec<Action>,

    /// When false, a match stops evaluation
    #[serde(rename = "continue", default)]
    pub continue_eval: bool,

    /// Free-form tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// How a rule combines its conditions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleOperator {
    /// Every condition must hold
    #[default]
    And,
    /// At least one condition must hold
    Or,
}

/// One condition over a dotted field path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Dotted path into the request context
    pub field: String,

    /// Comparison operator
    pub operator: ConditionOperator,

    /// Comparison value; unused by `exists`/`not_exists`
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
}

/// Condition operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    /// Field equals the value
    Equals,
    /// Field does not equal the value
    NotEquals,
    /// String contains a substring, or list contains the value
    Contains,
    /// Negation of `contains`
    NotContains,
    /// Field matches a pre-compiled regular expression
    Regex,
    /// Numeric greater-than
    Gt,
    /// Numeric less-than
    Lt,
    /// Numeric greater-or-equal
    Gte,
    /// Numeric less-or-equal
    Lte,
    /// Field is a member of the value set
    In,
    /// Field is not a member of the value set
    NotIn,
    /// Field is present
    Exists,
    /// Field is absent
    NotExists,
}

impl ConditionOperator {
    /// Operators whose value must be numeric.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Gt | Self::Lt | Self::Gte | Self::Lte)
    }

    /// Operators whose value must be a set.
    #[must_use]
    pub fn is_membership(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }
}

/// Transform operations on a dotted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformOp {
    /// Overwrite the field
    Replace,
    /// Concatenate onto a string, or extend a list
    Append,
    /// Prepend onto a string or list
    Prepend,
    /// Remove the field
    Delete,
}

impl TransformOp {
    /// Stable string form for error messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Append => "append",
            Self::Prepend => "prepend",
            Self::Delete => "delete",
        }
    }
}

/// Log levels a `log` action may request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Debug-level record
    Debug,
    /// Informational record
    #[default]
    Info,
    /// Warning record
    Warn,
}

/// One steering action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    /// Route the request to a provider, and optionally a model
    Route {
        /// Target provider
        provider: String,
        /// Target model, when pinned
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },

    /// Transform a field in place
    Transform {
        /// Dotted path of the field
        field: String,
        /// The operation to apply
        operation: TransformOp,
        /// Operand for `replace`/`append`/`prepend`
        #[serde(default, skip_serializing_if = "Value::is_null")]
        value: Value,
    },

    /// Write a literal into a field, creating intermediate maps
    Inject {
        /// Dotted path of the field
        field: String,
        /// Literal to write
        value: Value,
    },

    /// Terminate the request
    Reject {
        /// Status surfaced to the caller
        #[serde(default = "default_reject_status")]
        status: u16,
        /// Message surfaced to the caller
        message: String,
    },

    /// Emit a structured log record
    Log {
        /// Level to log at
        #[serde(default)]
        level: LogLevel,
        /// Message to log
        message: String,
    },
}

fn default_reject_status() -> u16 {
    400
}
