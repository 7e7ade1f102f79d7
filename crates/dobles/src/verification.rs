//! Checks that a double's declared interface matches the real target.
//!
//! Two questions are answered here: does the attribute exist and is it something a
//! double may replace ([`verify_method`]), and would a call of a given shape bind to
//! the real callable's signature ([`verify_arguments`]). Signatures come from a
//! pluggable [`SignatureProvider`], so the matching logic never assumes where they
//! were declared.

use crate::{
    config::config,
    error::{DoubleError, DoubleResult, MismatchKind},
    object::{Container, Member},
    signature::{CallShape, Signature},
    target::{AttributeKind, Target},
    value::Value,
};

/// Marker method name standing for a class double's constructor.
pub const CONSTRUCTOR: &str = "__new__";

/// Result of asking a provider for a callable's signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureLookup {
    /// The callable declares this signature (as seen by a caller, receivers excluded
    /// only where the value is already bound).
    Declared(Signature),
    /// The value is callable but exposes no signature.
    Opaque,
    NotCallable,
}

/// Resolves the signature of a callable value.
///
/// The default [`DeclaredSignatures`] reads the signatures functions declare when they
/// are built. Install another provider through [`Config::with_signature_provider`]
/// to source signatures elsewhere.
///
/// [`Config::with_signature_provider`]: crate::Config::with_signature_provider
pub trait SignatureProvider {
    fn signature_of(&self, callable: &Value) -> SignatureLookup;
}

/// Reads signatures declared on the object model itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredSignatures;

impl SignatureProvider for DeclaredSignatures {
    fn signature_of(&self, callable: &Value) -> SignatureLookup {
        match callable {
            Value::Function(f) => f
                .signature()
                .cloned()
                .map_or(SignatureLookup::Opaque, SignatureLookup::Declared),
            Value::Class(class) => match class.lookup("__init__") {
                Some((Member::Method(init), _)) => init
                    .signature()
                    .map_or(SignatureLookup::Opaque, |s| SignatureLookup::Declared(s.bound())),
                Some(_) => SignatureLookup::Opaque,
                None => SignatureLookup::Declared(container_signature(class.container())),
            },
            Value::Instance(instance) => match instance.class().lookup("__call__") {
                Some((Member::Method(call), _)) => call
                    .signature()
                    .map_or(SignatureLookup::Opaque, |s| SignatureLookup::Declared(s.bound())),
                Some(_) => SignatureLookup::Opaque,
                None => SignatureLookup::NotCallable,
            },
            Value::Double(_) => SignatureLookup::Declared(Signature::variadic()),
            _ => SignatureLookup::NotCallable,
        }
    }
}

fn container_signature(container: Container) -> Signature {
    let (var_args, var_kwargs) = match container {
        Container::None => (None, None),
        Container::Sequence => (Some("iterable".to_owned()), None),
        Container::Mapping => (None, Some("kwargs".to_owned())),
    };
    Signature::new(Vec::new(), 0, Vec::new(), 0, var_args, Vec::new(), Vec::new(), var_kwargs)
}

/// Verifies that `method_name` exists on the target and may be doubled.
///
/// # Errors
/// `VerifyingDouble` when the attribute is missing, is non-callable data, or is a
/// plain instance method requested at class level (`class_level`).
pub fn verify_method(target: &Target, method_name: &str, class_level: bool) -> DoubleResult<()> {
    let doubled = target.doubled().to_value().repr();
    let Some(info) = target.get_attr(method_name) else {
        return Err(DoubleError::no_matching_method(method_name, &doubled));
    };

    if info.kind == AttributeKind::Data && !info.object.is_callable() {
        return Err(DoubleError::not_callable(method_name, &doubled));
    }

    if class_level && info.kind == AttributeKind::InstanceMethod && method_name != CONSTRUCTOR {
        return Err(DoubleError::requires_instance(method_name, &doubled));
    }

    Ok(())
}

/// Verifies that a call of `shape` to `method_name` would bind to the real signature.
///
/// Unverifiable-builtin mismatches are downgraded to a warning when
/// [`Config::ignore_builtin_verification`](crate::Config) is set.
pub fn verify_arguments(target: &Target, method_name: &str, shape: &CallShape) -> DoubleResult<()> {
    match check_arguments(target, method_name, shape) {
        Err(DoubleError::ArgumentMismatch {
            kind: MismatchKind::UnverifiableBuiltin,
            message,
        }) if config().ignore_builtin_verification => {
            tracing::warn!(method = method_name, %message, "builtin verification skipped");
            Ok(())
        }
        result => result,
    }
}

fn check_arguments(target: &Target, method_name: &str, shape: &CallShape) -> DoubleResult<()> {
    if method_name == CONSTRUCTOR {
        return verify_constructor(target, shape);
    }

    let Some(info) = target.get_attr(method_name) else {
        return Err(DoubleError::no_matching_method(
            method_name,
            &target.doubled().to_value().repr(),
        ));
    };

    match info.kind {
        AttributeKind::Property => {
            if shape.is_empty() {
                Ok(())
            } else {
                Err(DoubleError::signature_mismatch("Properties do not accept arguments."))
            }
        }
        AttributeKind::InstanceMethod => bind(&info.object, method_name, &shape.clone().with_receiver(), false),
        AttributeKind::ClassMethod => bind(&info.object, method_name, shape, true),
        AttributeKind::StaticMethod
        | AttributeKind::Data
        | AttributeKind::ToplevelFunction
        | AttributeKind::Callable => bind(&info.object, method_name, shape, false),
    }
}

/// Constructor calls verify against `__init__` with a `self` placeholder. Classes that
/// inherit construction from a container accept any arguments of the matching kind.
fn verify_constructor(target: &Target, shape: &CallShape) -> DoubleResult<()> {
    let Some(class) = target.doubled_type() else {
        return Err(DoubleError::no_matching_method(
            CONSTRUCTOR,
            &target.doubled().to_value().repr(),
        ));
    };

    if let Some((Member::Method(init), _)) = class.lookup("__init__") {
        return bind(&Value::Function(init), "__init__", &shape.clone().with_receiver(), false);
    }

    let positional = shape.positional() > 0;
    let keywords = !shape.keywords().is_empty();
    match class.container() {
        Container::Sequence if positional && !keywords => Ok(()),
        Container::Mapping if keywords && !positional => Ok(()),
        _ if positional || keywords => Err(DoubleError::signature_mismatch(format!(
            "__init__() takes exactly 1 arguments ({} given)",
            1 + shape.positional() + shape.keywords().len()
        ))),
        _ => Ok(()),
    }
}

fn bind(callable: &Value, method_name: &str, shape: &CallShape, bound_to_class: bool) -> DoubleResult<()> {
    match config().signature_provider.signature_of(callable) {
        SignatureLookup::Declared(signature) => {
            let signature = if bound_to_class { signature.bound() } else { signature };
            signature.bind(shape).map_err(DoubleError::signature_mismatch)
        }
        SignatureLookup::Opaque => Err(DoubleError::unverifiable_builtin(format!(
            "no signature found for builtin {}",
            callable.repr()
        ))),
        SignatureLookup::NotCallable => Err(DoubleError::not_callable(method_name, &callable.repr())),
    }
}
