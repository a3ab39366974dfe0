//! # Relay Steering
//!
//! Declarative request steering for the gateway.
//!
//! This crate provides:
//! - The rule set model and its YAML file format
//! - A presence-aware dotted-path resolver over the request context
//! - A compiled, side-effect-free rule evaluator
//! - Atomic rule set reload with an optional file watcher

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod path;
pub mod reload;
pub mod rules;

// Re-export main types
pub use engine::{CompiledRuleSet, EvaluationOutcome, RouteDirective, RuleOutcome};
pub use reload::{RuleFileWatcher, SteeringEngine};
pub use rules::{Action, Condition, ConditionOperator, LogLevel, Rule, RuleSet, TransformOp};
