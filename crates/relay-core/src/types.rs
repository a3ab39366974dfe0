//! Validated domain types (newtypes) shared across the gateway.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Create a request ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random request ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("req_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation identifier carried across services for one logical operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Create a correlation ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh correlation ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("corr_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an upstream provider (e.g. "openai", "anthropic").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    /// Create a provider ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier of a model within a provider (e.g. "gpt-4-turbo").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    /// Create a model ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier of a budget definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BudgetId(String);

impl BudgetId {
    /// Create a budget ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh budget ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("bud_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BudgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capability a model can advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// General text generation
    TextGeneration,
    /// Code generation and completion
    CodeGeneration,
    /// Multi-step reasoning
    Reasoning,
    /// Image understanding
    Vision,
    /// Vector embeddings
    Embeddings,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TextGeneration => "text-generation",
            Self::CodeGeneration => "code-generation",
            Self::Reasoning => "reasoning",
            Self::Vision => "vision",
            Self::Embeddings => "embeddings",
        };
        f.write_str(s)
    }
}

/// Quality tier a request may ask for.
///
/// Ordering matters: `Economy < Standard < Premium`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    /// Cheapest models that can do the job
    Economy,
    /// Balanced cost and quality
    #[default]
    Standard,
    /// Highest quality regardless of cost
    Premium,
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Economy => "economy",
            Self::Standard => "standard",
            Self::Premium => "premium",
        };
        f.write_str(s)
    }
}

/// The kind of scope a budget or request is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    /// An entire organization
    Organization,
    /// A team within an organization
    Team,
    /// A single user
    User,
    /// A project
    Project,
}

impl ScopeKind {
    /// Stable string form used in persisted records.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Team => "team",
            Self::User => "user",
            Self::Project => "project",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The scope tuple identifying who a request is billed to.
///
/// Any subset of the four dimensions may be present; budget checks apply to
/// every dimension that is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeTuple {
    /// User identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Team identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    /// Organization identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    /// Project identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl ScopeTuple {
    /// A scope tuple with only a user dimension.
    #[must_use]
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            user_id: Some(id.into()),
            ..Self::default()
        }
    }

    /// A scope tuple with only an organization dimension.
    #[must_use]
    pub fn organization(id: impl Into<String>) -> Self {
        Self {
            organization_id: Some(id.into()),
            ..Self::default()
        }
    }

    /// True when no dimension is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.user_id.is_none()
            && self.team_id.is_none()
            && self.organization_id.is_none()
            && self.project_id.is_none()
    }

    /// Iterate the present dimensions as `(kind, id)` pairs.
    pub fn dimensions(&self) -> impl Iterator<Item = (ScopeKind, &str)> {
        [
            (ScopeKind::Organization, self.organization_id.as_deref()),
            (ScopeKind::Team, self.team_id.as_deref()),
            (ScopeKind::User, self.user_id.as_deref()),
            (ScopeKind::Project, self.project_id.as_deref()),
        ]
        .into_iter()
        .filter_map(|(kind, id)| id.map(|id| (kind, id)))
    }

    /// Get the identifier for one scope kind, if present.
    #[must_use]
    pub fn get(&self, kind: ScopeKind) -> Option<&str> {
        match kind {
            ScopeKind::Organization => self.organization_id.as_deref(),
            ScopeKind::Team => self.team_id.as_deref(),
            ScopeKind::User => self.user_id.as_deref(),
            ScopeKind::Project => self.project_id.as_deref(),
        }
    }
}

/// Health of a budget relative to its thresholds.
///
/// Ordering matters: statuses only escalate as percent used grows.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BudgetHealth {
    /// Below the warning threshold
    #[default]
    Normal,
    /// At or above the warning threshold
    Warning,
    /// At or above the critical threshold
    Critical,
    /// At or above 100% of the limit
    Exceeded,
}

impl fmt::Display for BudgetHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Exceeded => "exceeded",
        };
        f.write_str(s)
    }
}
