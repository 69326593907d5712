//! Runtime errors

use thiserror::Error;

use crate::{Symbol, Value};

/// Everything that can interrupt an instruction.
///
/// The interpreter turns every variant into a heap `Exception` (or, for
/// [`RuntimeError::Thrown`], keeps the raised value as is) before unwinding,
/// so catchers only ever see values.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("no such member: {member} on {receiver}")]
    NoSuchMember { receiver: String, member: Symbol },

    #[error("unbound variable: {0}")]
    UnboundVariable(Symbol),

    #[error("value of type {0} is not callable")]
    NotCallable(String),

    #[error("wrong number of arguments: expected {expected}, got {got}")]
    WrongArgumentCount { expected: String, got: usize },

    #[error("{0}")]
    TypeError(String),

    #[error("division by zero")]
    DivideByZero,

    #[error("{0}")]
    RangeError(String),

    #[error("{0}")]
    IteratorStateError(String),

    #[error("malformed command: {0}")]
    MalformedCommand(String),

    #[error("raised {0:?}")]
    Thrown(Value),
}

impl RuntimeError {
    pub fn arity(expected: usize, got: usize) -> Self {
        Self::WrongArgumentCount {
            expected: expected.to_string(),
            got,
        }
    }

    pub fn arity_at_least(expected: usize, got: usize) -> Self {
        Self::WrongArgumentCount {
            expected: format!("at least {expected}"),
            got,
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::TypeError(message.into())
    }

    pub fn range(message: impl Into<String>) -> Self {
        Self::RangeError(message.into())
    }

    pub fn iterator(message: impl Into<String>) -> Self {
        Self::IteratorStateError(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedCommand(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_parts() {
        let err = RuntimeError::NoSuchMember {
            receiver: "Array".into(),
            member: Symbol::intern("frobnicate"),
        };
        assert_eq!(err.to_string(), "no such member: frobnicate on Array");
        assert_eq!(
            RuntimeError::arity_at_least(2, 1).to_string(),
            "wrong number of arguments: expected at least 2, got 1"
        );
    }
}
