//! Bridge error kinds
//!
//! Every failure that can occur while crossing the runtime boundary is one of
//! the kinds below. None of them crosses into a runtime as-is: the interop
//! layer translates each into the destination runtime's own catchable error.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Which runtime a value, error or call originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Runtime {
    Host,
    Guest,
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Runtime::Host => write!(f, "host"),
            Runtime::Guest => write!(f, "guest"),
        }
    }
}

/// A value cannot be represented in the destination runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    UnsupportedKey { kind: String },
    DepthExceeded { limit: usize },
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedKey { kind } => {
                write!(f, "cannot convert dict with {} keys to an array", kind)
            }
            Self::DepthExceeded { limit } => {
                write!(f, "aggregate nesting exceeds conversion depth limit of {}", limit)
            }
        }
    }
}

impl std::error::Error for ConversionError {}

/// Guest module resolution failed; `message` is the guest's own text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportError {
    pub module: String,
    pub message: String,
}

impl ImportError {
    pub fn new(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self { module: module.into(), message: message.into() }
    }
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ImportError {}

/// Embedded source was rejected at the embedding call site
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingError {
    NotExactlyOneFunction { operation: &'static str, runtime: Runtime, found: usize },
    Compile { operation: &'static str, message: String },
    MissingReceiver { operation: &'static str, function: String },
    UnknownClass { operation: &'static str, name: String },
}

impl fmt::Display for EmbeddingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotExactlyOneFunction { operation, runtime, .. } => {
                write!(f, "{}: {} source must define exactly one function", operation, runtime)
            }
            Self::Compile { operation, message } => write!(f, "{}: {}", operation, message),
            Self::MissingReceiver { operation, function } => {
                write!(
                    f,
                    "{}: method '{}' must take the instance as its first parameter",
                    operation, function
                )
            }
            Self::UnknownClass { operation, name } => {
                write!(f, "{}: class '{}' does not exist", operation, name)
            }
        }
    }
}

impl std::error::Error for EmbeddingError {}

/// Native error object carried through the other runtime so it can be
/// restored when it crosses back.
#[derive(Clone)]
pub struct ErrorPayload(pub Rc<dyn Any>);

impl fmt::Debug for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErrorPayload({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

/// Argument binding failed, or the destination callable raised
#[derive(Debug, Clone)]
pub enum CallError {
    TooManyPositional { callee: String, expected: usize, got: usize },
    MissingArgument { callee: String, name: String },
    UnknownNamed { callee: String, name: String },
    DuplicateArgument { callee: String, name: String },
    NamedUnsupported { callee: String },
    NotCallable { type_name: String },
    Raised { runtime: Runtime, type_name: String, message: String, payload: ErrorPayload },
    /// The destination runtime failed with an uncatchable error
    Aborted { runtime: Runtime, message: String },
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyPositional { callee, expected, got } => {
                write!(
                    f,
                    "{}() takes {} positional argument{} but {} were given",
                    callee,
                    expected,
                    if *expected == 1 { "" } else { "s" },
                    got
                )
            }
            Self::MissingArgument { callee, name } => {
                write!(f, "{}() missing required argument '{}'", callee, name)
            }
            Self::UnknownNamed { callee, name } => {
                write!(f, "{}() got an unexpected keyword argument '{}'", callee, name)
            }
            Self::DuplicateArgument { callee, name } => {
                write!(f, "{}() got multiple values for argument '{}'", callee, name)
            }
            Self::NamedUnsupported { callee } => {
                write!(f, "{}() does not accept named arguments", callee)
            }
            Self::NotCallable { type_name } => write!(f, "'{}' object is not callable", type_name),
            Self::Raised { message, .. } => write!(f, "{}", message),
            Self::Aborted { runtime, message } => write!(f, "{} runtime aborted: {}", runtime, message),
        }
    }
}

impl std::error::Error for CallError {}

/// Internal invariant violation in the identity registry. Never recoverable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityRegistryError {
    Uninitialized,
    Reentrant,
    StaleToken { slot: usize, generation: u32 },
    Detached,
}

impl fmt::Display for IdentityRegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "identity registry used before initialization"),
            Self::Reentrant => write!(f, "identity registry accessed reentrantly"),
            Self::StaleToken { slot, generation } => {
                write!(f, "stale registry token: slot {} generation {}", slot, generation)
            }
            Self::Detached => write!(f, "proxy outlived its bridge"),
        }
    }
}

impl std::error::Error for IdentityRegistryError {}

/// Umbrella over every bridge error kind
#[derive(Debug, Clone)]
pub enum BridgeError {
    Conversion(ConversionError),
    Import(ImportError),
    Embedding(EmbeddingError),
    Call(CallError),
    Registry(IdentityRegistryError),
}

impl BridgeError {
    /// Registry corruption and runtime aborts are unrecoverable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::Registry(_) | BridgeError::Call(CallError::Aborted { .. }))
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conversion(e) => write!(f, "{}", e),
            Self::Import(e) => write!(f, "{}", e),
            Self::Embedding(e) => write!(f, "{}", e),
            Self::Call(e) => write!(f, "{}", e),
            Self::Registry(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Conversion(e) => Some(e),
            Self::Import(e) => Some(e),
            Self::Embedding(e) => Some(e),
            Self::Call(e) => Some(e),
            Self::Registry(e) => Some(e),
        }
    }
}

impl From<ConversionError> for BridgeError {
    fn from(e: ConversionError) -> Self {
        BridgeError::Conversion(e)
    }
}

impl From<ImportError> for BridgeError {
    fn from(e: ImportError) -> Self {
        BridgeError::Import(e)
    }
}

impl From<EmbeddingError> for BridgeError {
    fn from(e: EmbeddingError) -> Self {
        BridgeError::Embedding(e)
    }
}

impl From<CallError> for BridgeError {
    fn from(e: CallError) -> Self {
        BridgeError::Call(e)
    }
}

impl From<IdentityRegistryError> for BridgeError {
    fn from(e: IdentityRegistryError) -> Self {
        BridgeError::Registry(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_message_names_operation() {
        let err = EmbeddingError::NotExactlyOneFunction {
            operation: "embed_guest_func",
            runtime: Runtime::Guest,
            found: 2,
        };
        assert_eq!(
            err.to_string(),
            "embed_guest_func: guest source must define exactly one function"
        );
    }

    #[test]
    fn test_raised_message_is_verbatim() {
        let err = CallError::Raised {
            runtime: Runtime::Guest,
            type_name: "ValueError".to_string(),
            message: "bad value".to_string(),
            payload: ErrorPayload(Rc::new(())),
        };
        assert_eq!(BridgeError::from(err).to_string(), "bad value");
    }

    #[test]
    fn test_only_registry_errors_and_aborts_are_fatal() {
        assert!(BridgeError::from(IdentityRegistryError::Uninitialized).is_fatal());
        let abort = CallError::Aborted { runtime: Runtime::Host, message: "boom".into() };
        assert!(BridgeError::from(abort).is_fatal());
        let arity = CallError::NotCallable { type_name: "int".into() };
        assert!(!BridgeError::from(arity).is_fatal());
        assert!(!BridgeError::from(ImportError::new("x", "No module named x")).is_fatal());
        assert!(!BridgeError::from(ConversionError::DepthExceeded { limit: 3 }).is_fatal());
    }
}
