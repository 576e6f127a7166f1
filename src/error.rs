//! Error types for the fact store

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FactbaseError>;

#[derive(Error, Debug)]
pub enum FactbaseError {
    #[error("Broken syntax ({reason}) in '{query}', tokens: {tokens:?}")]
    Syntax {
        query: String,
        tokens: Vec<String>,
        reason: String,
    },

    #[error("Wrong number of operands for '{operator}': {expected} expected, {actual} given")]
    Arity {
        operator: String,
        expected: usize,
        actual: usize,
    },

    #[error("Type error: {0}")]
    Type(String),

    #[error("Unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("Arithmetic error: {0}")]
    Arithmetic(String),

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("{source} at {term}")]
    Evaluation {
        term: String,
        #[source]
        source: Box<FactbaseError>,
    },

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Transaction rolled back")]
    Rollback,

    #[error("Transaction is already finished")]
    Closed,

    #[error("Environment variable '{0}' is not set and no default given")]
    Env(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

impl FactbaseError {
    /// Stable error code, for embedders that map errors onto their own protocol
    pub fn code(&self) -> &'static str {
        match self {
            FactbaseError::Syntax { .. } => "SYNTAX",
            FactbaseError::Arity { .. } => "ARITY",
            FactbaseError::Type(_) => "TYPE",
            FactbaseError::UnknownOperator(_) => "UNKNOWN_OPERATOR",
            FactbaseError::Arithmetic(_) => "ARITHMETIC",
            FactbaseError::Assertion(_) => "ASSERTION",
            FactbaseError::Evaluation { source, .. } => source.code(),
            FactbaseError::Invariant(_) => "INVARIANT",
            FactbaseError::Rollback => "ROLLBACK",
            FactbaseError::Closed => "CLOSED",
            FactbaseError::Env(_) => "ENV",
            FactbaseError::Serialization(_) => "SERIALIZATION",
        }
    }

    /// True for the rollback signal, which is control flow rather than a failure
    pub fn is_rollback(&self) -> bool {
        matches!(self, FactbaseError::Rollback)
    }

    /// Innermost error, skipping `Evaluation` wrappers
    pub fn root(&self) -> &FactbaseError {
        match self {
            FactbaseError::Evaluation { source, .. } => source.root(),
            other => other,
        }
    }

    pub(crate) fn syntax(query: &str, tokens: &[String], reason: impl Into<String>) -> Self {
        FactbaseError::Syntax {
            query: query.to_string(),
            tokens: tokens.to_vec(),
            reason: reason.into(),
        }
    }

    /// Wrap with the printed form of the term being evaluated.
    ///
    /// Already-wrapped errors and the rollback signal pass through untouched,
    /// so the innermost term is the one reported.
    pub(crate) fn at(self, term: impl std::fmt::Display) -> Self {
        match self {
            FactbaseError::Evaluation { .. } | FactbaseError::Rollback | FactbaseError::Closed => self,
            other => FactbaseError::Evaluation {
                term: term.to_string(),
                source: Box::new(other),
            },
        }
    }
}
