//! Error taxonomy for the gateway.
//!
//! Every failure surfaced by the core maps onto one of these kinds, each with
//! a stable reason code and a deterministic status. `Internal` details are
//! never leaked verbatim to callers.

use crate::types::{ModelId, ProviderId};
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the gateway.
pub type RelayResult<T> = Result<T, RelayError>;

/// Classification of a provider adapter failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    /// Transient; a single retry or a fallback may succeed
    Retryable,
    /// Permanent for this request
    Fatal,
    /// The upstream did not answer within the deadline
    Timeout,
    /// The upstream rejected on quota grounds
    Quota,
    /// The upstream rejected on content policy grounds
    PolicyViolation,
}

impl ProviderErrorKind {
    /// Stable reason code fragment.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retryable => "retryable",
            Self::Fatal => "fatal",
            Self::Timeout => "timeout",
            Self::Quota => "quota",
            Self::PolicyViolation => "policy",
        }
    }
}

/// The gateway error taxonomy.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Schema or type problem in the inbound request.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Human-readable description
        message: String,
        /// Offending field, when known
        field: Option<String>,
    },

    /// A new rule set was rejected; the previous set remains in service.
    #[error("rule set invalid: {message}")]
    RuleSetInvalid {
        /// What failed validation
        message: String,
    },

    /// A transform action was applied to an incompatible field.
    #[error("transform type mismatch at '{path}': cannot {operation} this value")]
    TransformTypeMismatch {
        /// Dotted path the transform targeted
        path: String,
        /// The transform operation that failed
        operation: String,
    },

    /// A steering rule terminated the request.
    #[error("rejected by steering rule: {message}")]
    Rejected {
        /// Status the rule asked for
        status: u16,
        /// Message the rule asked for
        message: String,
    },

    /// The aggregated budget constraint outcome denied the request.
    #[error("budget denied: {reason}")]
    BudgetDenied {
        /// Why the budgets denied this request
        reason: String,
        /// True when the denial came from an unapproved `RequireApproval`
        requires_approval: bool,
    },

    /// No enabled provider profile matches the named model.
    #[error("unknown model: {model}")]
    UnknownModel {
        /// The model that could not be resolved
        model: ModelId,
    },

    /// The candidate set is empty after capability and health filtering.
    #[error("no eligible model: {reason}")]
    NoEligibleModel {
        /// Why no candidate survived filtering
        reason: String,
    },

    /// A provider adapter failed.
    #[error("provider '{provider}' error ({}): {message}", kind.as_str())]
    Provider {
        /// The provider that failed
        provider: ProviderId,
        /// Classification of the failure
        kind: ProviderErrorKind,
        /// Upstream message
        message: String,
        /// Upstream HTTP status, when available
        status_code: Option<u16>,
    },

    /// Every candidate in the fallback chain failed.
    #[error("provider unavailable for model '{model}' after {} attempts", attempted.len())]
    ProviderUnavailable {
        /// The model originally requested
        model: ModelId,
        /// Models actually attempted, in order
        attempted: Vec<ModelId>,
    },

    /// A concurrency cap was reached before steering.
    #[error("overloaded: {scope}")]
    Overloaded {
        /// Which cap rejected the request (global or a provider id)
        scope: String,
    },

    /// The deadline expired or the caller cancelled.
    #[error("cancelled after {elapsed:?}")]
    Cancelled {
        /// Time spent before cancellation
        elapsed: Duration,
    },

    /// Startup or reload configuration problem.
    #[error("configuration error: {message}")]
    Configuration {
        /// What is misconfigured
        message: String,
    },

    /// Invariant violation. The message is logged, never surfaced verbatim.
    #[error("internal error")]
    Internal {
        /// Diagnostic detail for logs only
        message: String,
    },
}

impl RelayError {
    /// Schema/type problem in the input.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>, field: Option<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            field,
        }
    }

    /// A rejected rule outcome with the rule's status (default 400).
    #[must_use]
    pub fn rejected(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Rejected {
            status: status.unwrap_or(400),
            message: message.into(),
        }
    }

    /// A budget denial.
    #[must_use]
    pub fn budget_denied(reason: impl Into<String>, requires_approval: bool) -> Self {
        Self::BudgetDenied {
            reason: reason.into(),
            requires_approval,
        }
    }

    /// A provider adapter failure.
    #[must_use]
    pub fn provider(
        provider: impl Into<ProviderId>,
        kind: ProviderErrorKind,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            kind,
            message: message.into(),
            status_code,
        }
    }

    /// A configuration failure.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// An invariant violation.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable reason code for this error kind.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::RuleSetInvalid { .. } => "rule_set_invalid",
            Self::TransformTypeMismatch { .. } => "transform_type_mismatch",
            Self::Rejected { .. } => "rejected",
            Self::BudgetDenied { .. } => "budget_denied",
            Self::UnknownModel { .. } => "unknown_model",
            Self::NoEligibleModel { .. } => "no_eligible_model",
            Self::Provider { kind, .. } => match kind {
                ProviderErrorKind::Retryable => "provider_retryable",
                ProviderErrorKind::Fatal => "provider_fatal",
                ProviderErrorKind::Timeout => "provider_timeout",
                ProviderErrorKind::Quota => "provider_quota",
                ProviderErrorKind::PolicyViolation => "provider_policy",
            },
            Self::ProviderUnavailable { .. } => "provider_unavailable",
            Self::Overloaded { .. } => "overloaded",
            Self::Cancelled { .. } => "cancelled",
            Self::Configuration { .. } => "configuration",
            Self::Internal { .. } => "internal",
        }
    }

    /// Deterministic status for the surfaced error kinds.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidRequest { .. } | Self::UnknownModel { .. } => 400,
            Self::Rejected { status, .. } => *status,
            Self::BudgetDenied {
                requires_approval, ..
            } => {
                if *requires_approval {
                    403
                } else {
                    402
                }
            }
            Self::NoEligibleModel { .. } | Self::Overloaded { .. } => 503,
            Self::Provider { status_code, .. } => status_code.unwrap_or(502),
            Self::ProviderUnavailable { .. } => 502,
            Self::Cancelled { .. } => 408,
            Self::RuleSetInvalid { .. }
            | Self::TransformTypeMismatch { .. }
            | Self::Configuration { .. }
            | Self::Internal { .. } => 500,
        }
    }

    /// True when a single retry or a fallback may recover this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider {
                kind: ProviderErrorKind::Retryable | ProviderErrorKind::Timeout,
                ..
            }
        )
    }

    /// Message safe to show a caller. Internal detail is replaced.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal { .. } => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}
