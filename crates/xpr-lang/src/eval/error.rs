use smol_str::SmolStr;
use thiserror::Error;

type Name = SmolStr;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum EvalError {
    #[error("undefined variable: {0}")]
    UndefinedVariable(Name),
    #[error("{0} is not a function")]
    NotAFunction(String),
    #[error("member access is not permitted")]
    MemberAccessNotPermitted,
    #[error("prototype access detected")]
    PrototypeAccess(Name),
    #[error("unknown type: {0}")]
    UnknownType(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("cannot assign to \"{0}\": \"{1}\" is not an object")]
    InvalidMemberAssignment(Name, Name),
    #[error("unknown operator: {0}")]
    UnknownOperator(Name),
    #[error("invalid Expression (parity)")]
    Parity,
    #[error("invalid Expression")]
    StackUnderflow,
    #[error("maximum call depth of {0} exceeded")]
    RecursionError(u32),
    #[error("{0}")]
    Custom(String),
}

impl EvalError {
    pub fn custom(message: impl Into<String>) -> Self {
        EvalError::Custom(message.into())
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        EvalError::InvalidArgument(message.into())
    }

    /// The name the error is about, if any.
    #[cold]
    pub fn name(&self) -> Option<&str> {
        match self {
            EvalError::UndefinedVariable(name) => Some(name),
            EvalError::PrototypeAccess(name) => Some(name),
            EvalError::InvalidMemberAssignment(name, _) => Some(name),
            EvalError::UnknownOperator(name) => Some(name),
            _ => None,
        }
    }
}
