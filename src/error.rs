//! Error types shared by validation, storage, and the service layer.

use serde::Serialize;
use uuid::Uuid;

use crate::catalog::CatalogError;
use crate::store::StoreError;

/// The validation pass that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Parse,
    Node,
    Condition,
    Graph,
    Stability,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Parse => write!(f, "Parse"),
            Phase::Node => write!(f, "Node"),
            Phase::Condition => write!(f, "Condition"),
            Phase::Graph => write!(f, "Graph"),
            Phase::Stability => write!(f, "Stability"),
        }
    }
}

/// Category of a validation defect, surfaced to the UI as the diagnostic `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed JSON, missing/duplicate/invalid ids, unknown fields, node cardinality.
    Structural,
    /// Dangling `next`/`nextTrue`/`nextFalse`/`conditionRule.nodeId`.
    Reference,
    /// Source/question-type mismatch, invalid regex, cross-form question.
    Semantic,
    Reachability,
    Ordering,
    IdStability,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub code: &'static str,
    pub kind: ErrorKind,
    pub phase: Phase,
    pub message: String,
    /// The node the defect belongs to, when it can be pinned to one.
    pub node_id: Option<Uuid>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}", self.phase, self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    pub fn parse(code: &'static str, message: impl Into<String>) -> Self {
        ValidationError {
            code,
            kind: ErrorKind::Structural,
            phase: Phase::Parse,
            message: message.into(),
            node_id: None,
        }
    }

    pub fn node(
        code: &'static str,
        kind: ErrorKind,
        message: impl Into<String>,
        node_id: Option<Uuid>,
    ) -> Self {
        ValidationError {
            code,
            kind,
            phase: Phase::Node,
            message: message.into(),
            node_id,
        }
    }

    pub fn condition(
        code: &'static str,
        kind: ErrorKind,
        message: impl Into<String>,
        node_id: Uuid,
    ) -> Self {
        ValidationError {
            code,
            kind,
            phase: Phase::Condition,
            message: message.into(),
            node_id: Some(node_id),
        }
    }

    pub fn graph(
        code: &'static str,
        kind: ErrorKind,
        message: impl Into<String>,
        node_id: Option<Uuid>,
    ) -> Self {
        ValidationError {
            code,
            kind,
            phase: Phase::Graph,
            message: message.into(),
            node_id,
        }
    }

    pub fn stability(code: &'static str, message: impl Into<String>, node_id: Option<Uuid>) -> Self {
        ValidationError {
            code,
            kind: ErrorKind::IdStability,
            phase: Phase::Stability,
            message: message.into(),
            node_id,
        }
    }
}

/// Every defect found by one validation call, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "workflow validation failed:")?;
        for error in &self.0 {
            write!(f, "\n{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl ValidationErrors {
    /// `Ok(())` when nothing was collected, otherwise the joined aggregate.
    pub fn check(errors: Vec<ValidationError>) -> Result<(), ValidationErrors> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(errors))
        }
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.0.iter().any(|e| e.code == code)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Crate-level error returned by validation entry points and the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("question catalog lookup failed: {0}")]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode workflow: {0}")]
    Encode(#[from] serde_json::Error),
}

impl Error {
    /// Client-facing validation failure, as opposed to an infrastructure fault.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Error::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
