//! Error taxonomy for the double engine and the object model it patches.
//!
//! Every violation is surfaced synchronously as a [`DoubleError`] at the point where it
//! is detected. The only exception is call-count *under*-shoot, which can only be observed
//! by [`verify`](crate::verify) at the end of a test.

use std::fmt;

use strum::{Display, IntoStaticStr};

/// Result alias used throughout the crate.
pub type DoubleResult<T> = Result<T, DoubleError>;

/// Which flavour of argument mismatch was detected.
///
/// `UnverifiableBuiltin` is the one kind that can be suppressed via
/// [`Config::ignore_builtin_verification`](crate::Config): some callables carry no
/// introspectable signature and blanket verification would only produce false positives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum MismatchKind {
    /// The arguments cannot bind to the declared parameters.
    Signature,
    /// The callable exposes no signature at all.
    UnverifiableBuiltin,
}

/// Discriminant of a [`DoubleError`], convenient for `matches!`-free assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum ErrorKind {
    VerifyingDoubleImport,
    VerifyingDouble,
    ArgumentMismatch,
    UnverifiableBuiltin,
    ConstructorDouble,
    UnallowedMethodCall,
    MockExpectation,
    NoSpace,
    ArgumentsRedeclared,
    Attribute,
    NotCallable,
    NotAwaitable,
    Raised,
    InvalidCount,
    InvalidSignature,
    EmptyReturn,
}

/// A user-level exception, raised by doubled code or by an `and_raise` effect.
///
/// This is deliberately tiny: a type name and an optional message, mirroring how
/// exceptions cross the host boundary as a `(type, arg)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    type_name: String,
    message: Option<String>,
}

impl Exception {
    /// Creates an exception of the given type with a message.
    #[must_use]
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: Some(message.into()),
        }
    }

    /// Creates an exception carrying no message, e.g. `KeyError()`.
    #[must_use]
    pub fn bare(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: None,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {message}", self.type_name),
            None => f.write_str(&self.type_name),
        }
    }
}

impl std::error::Error for Exception {}

/// Every failure the library can raise.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DoubleError {
    /// A dotted path does not resolve to a live object.
    #[error("VerifyingDoubleImportError: {0}")]
    VerifyingDoubleImport(String),

    /// The named attribute does not exist, is not callable, or a class-level/instance-level
    /// mismatch was detected.
    #[error("VerifyingDoubleError: {0}")]
    VerifyingDouble(String),

    /// Declared or actual arguments cannot bind to the real signature.
    #[error("VerifyingDoubleArgumentError: {message}")]
    ArgumentMismatch { kind: MismatchKind, message: String },

    /// A constructor allowance was requested on something other than a class double.
    #[error("ConstructorDoubleError: {0}")]
    ConstructorDouble(String),

    /// A call arrived that no allowance accepted.
    #[error("UnallowedMethodCallError: {0}")]
    UnallowedMethodCall(String),

    /// A call-count bound was violated.
    #[error("MockExpectationError: {0}")]
    MockExpectation(String),

    /// Verification was attempted after teardown.
    #[error("NoSpaceError: {0}")]
    NoSpace(String),

    /// `with_args`/`with_no_args`/a custom matcher was declared twice on one allowance.
    #[error("VerifyingDoubleError: arguments for '{0}' were already declared")]
    ArgumentsRedeclared(String),

    #[error("AttributeError: {object} has no attribute '{name}'")]
    Attribute { object: String, name: String },

    #[error("TypeError: {0} is not callable")]
    NotCallable(String),

    #[error("TypeError: object {0} can't be used in 'await' expression")]
    NotAwaitable(String),

    /// An exception raised by user code or by a configured effect.
    #[error("{0}")]
    Raised(Exception),

    /// A call-count builder received a negative or unrepresentable count.
    #[error("TypeError: {0} requires one positive integer argument")]
    InvalidCount(&'static str),

    #[error("SyntaxError: invalid signature '{source_text}': {reason}")]
    InvalidSignature { source_text: String, reason: String },

    #[error("TypeError: and_return() expected at least 1 return value")]
    EmptyReturn,
}

impl DoubleError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::VerifyingDoubleImport(_) => ErrorKind::VerifyingDoubleImport,
            Self::VerifyingDouble(_) => ErrorKind::VerifyingDouble,
            Self::ArgumentMismatch {
                kind: MismatchKind::Signature,
                ..
            } => ErrorKind::ArgumentMismatch,
            Self::ArgumentMismatch {
                kind: MismatchKind::UnverifiableBuiltin,
                ..
            } => ErrorKind::UnverifiableBuiltin,
            Self::ConstructorDouble(_) => ErrorKind::ConstructorDouble,
            Self::UnallowedMethodCall(_) => ErrorKind::UnallowedMethodCall,
            Self::MockExpectation(_) => ErrorKind::MockExpectation,
            Self::NoSpace(_) => ErrorKind::NoSpace,
            Self::ArgumentsRedeclared(_) => ErrorKind::ArgumentsRedeclared,
            Self::Attribute { .. } => ErrorKind::Attribute,
            Self::NotCallable(_) => ErrorKind::NotCallable,
            Self::NotAwaitable(_) => ErrorKind::NotAwaitable,
            Self::Raised(_) => ErrorKind::Raised,
            Self::InvalidCount(_) => ErrorKind::InvalidCount,
            Self::InvalidSignature { .. } => ErrorKind::InvalidSignature,
            Self::EmptyReturn => ErrorKind::EmptyReturn,
        }
    }

    /// Returns true for both argument-mismatch sub-kinds.
    #[must_use]
    pub fn is_argument_mismatch(&self) -> bool {
        matches!(self, Self::ArgumentMismatch { .. })
    }

    pub(crate) fn signature_mismatch(message: impl Into<String>) -> Self {
        Self::ArgumentMismatch {
            kind: MismatchKind::Signature,
            message: message.into(),
        }
    }

    pub(crate) fn unverifiable_builtin(message: impl Into<String>) -> Self {
        Self::ArgumentMismatch {
            kind: MismatchKind::UnverifiableBuiltin,
            message: message.into(),
        }
    }

    pub(crate) fn no_matching_method(method_name: &str, doubled: &str) -> Self {
        Self::VerifyingDouble(format!("No matching method '{method_name}' on {doubled}."))
    }

    pub(crate) fn not_callable(method_name: &str, doubled: &str) -> Self {
        Self::VerifyingDouble(format!(
            "Cannot double '{method_name}' on {doubled} because it is not a callable attribute."
        ))
    }

    pub(crate) fn requires_instance(method_name: &str, doubled: &str) -> Self {
        Self::VerifyingDouble(format!(
            "Cannot double instance method '{method_name}' on {doubled}; double an instance of the class instead."
        ))
    }

    pub(crate) fn attribute(object: impl Into<String>, name: &str) -> Self {
        Self::Attribute {
            object: object.into(),
            name: name.to_owned(),
        }
    }
}

impl From<Exception> for DoubleError {
    fn from(exception: Exception) -> Self {
        Self::Raised(exception)
    }
}
