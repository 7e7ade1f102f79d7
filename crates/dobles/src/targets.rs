//! The entry points tests use: `allow`, `expect`, constructors and patches.
//!
//! ```
//! use dobles::{Class, Function, Signature, Value, allow, args};
//!
//! let user = Class::builder("app", "User")
//!     .method(Function::new("get_name", Signature::parse("self").unwrap(), |_| Ok("Alice".into())))
//!     .build()
//!     .instantiate(args!())
//!     .unwrap();
//!
//! let scope = dobles::scope();
//! allow(&user).method("get_name").unwrap().and_return("Bob");
//! assert_eq!(user.call_method("get_name", args!()).unwrap(), Value::from("Bob"));
//! scope.finish().unwrap();
//!
//! assert_eq!(user.call_method("get_name", args!()).unwrap(), Value::from("Alice"));
//! ```

use std::panic::Location;

use crate::{
    allowance::{Allowance, CreationSite},
    doubles::{ClassDouble, DoubleKind},
    error::{DoubleError, DoubleResult},
    lifecycle::with_current_space,
    path,
    target::Subject,
    value::Value,
    verification::CONSTRUCTOR,
};

/// A subject ready to have methods allowed or expected on it.
#[derive(Debug, Clone)]
pub struct AllowanceTarget {
    subject: Subject,
    is_expectation: bool,
}

impl AllowanceTarget {
    /// Creates an allowance (or expectation) for `method_name` on the subject.
    ///
    /// # Errors
    /// `VerifyingDouble` when the subject has no such callable attribute, or when a
    /// plain instance method is requested on a class.
    #[track_caller]
    pub fn method(&self, method_name: &str) -> DoubleResult<Allowance> {
        let site = CreationSite::from_location(Location::caller());
        add_allowance(self.subject.clone(), method_name, site, self.is_expectation)
    }

    #[must_use]
    pub fn subject(&self) -> &Subject {
        &self.subject
    }
}

fn add_allowance(subject: Subject, method_name: &str, site: CreationSite, is_expectation: bool) -> DoubleResult<Allowance> {
    with_current_space(|space| space.add_allowance(subject, method_name, site, is_expectation))
}

/// Prepares `subject` for stubbing: `allow(&user).method("get_name")?.and_return("Bob")`.
pub fn allow(subject: impl Into<Subject>) -> AllowanceTarget {
    AllowanceTarget {
        subject: subject.into(),
        is_expectation: false,
    }
}

/// Like [`allow`], but every rule created must be satisfied by the end of the test.
pub fn expect(subject: impl Into<Subject>) -> AllowanceTarget {
    AllowanceTarget {
        subject: subject.into(),
        is_expectation: true,
    }
}

/// [`allow`] on the object at a dotted path.
pub fn allow_path(path: &str) -> DoubleResult<AllowanceTarget> {
    Ok(allow(Subject::try_from(path::resolve(path)?)?))
}

/// [`expect`] on the object at a dotted path.
pub fn expect_path(path: &str) -> DoubleResult<AllowanceTarget> {
    Ok(expect(Subject::try_from(path::resolve(path)?)?))
}

/// Allows the constructor of a class double, controlling what construction returns.
///
/// # Errors
/// `ConstructorDouble` when `subject` is not a [`ClassDouble`].
#[track_caller]
pub fn allow_constructor(subject: impl Into<Subject>) -> DoubleResult<Allowance> {
    let site = CreationSite::from_location(Location::caller());
    constructor_allowance(subject.into(), site, false)
}

/// Expects the constructor of a class double to be called.
#[track_caller]
pub fn expect_constructor(subject: impl Into<Subject>) -> DoubleResult<Allowance> {
    let site = CreationSite::from_location(Location::caller());
    constructor_allowance(subject.into(), site, true)
}

fn constructor_allowance(subject: Subject, site: CreationSite, is_expectation: bool) -> DoubleResult<Allowance> {
    let verb = if is_expectation { "expect_constructor" } else { "allow_constructor" };
    match &subject {
        Subject::Double(double) if double.kind() == DoubleKind::Class => {
            add_allowance(subject, CONSTRUCTOR, site, is_expectation)
        }
        _ => Err(DoubleError::ConstructorDouble(format!(
            "Cannot {verb} of {subject} since it is not a ClassDouble."
        ))),
    }
}

/// Replaces the object at `path` with `value` until teardown.
pub fn patch(path: &str, value: impl Into<Value>) -> DoubleResult<()> {
    let (module, name) = path::resolve_parent(path)?;
    if module.get(&name).is_none() {
        return Err(DoubleError::VerifyingDoubleImport(format!("No object at path: {path}.")));
    }
    let value = value.into();
    with_current_space(|space| space.patch_module_attr(&module, &name, value));
    Ok(())
}

/// Replaces the class at `path` with a [`ClassDouble`] until teardown and returns it.
///
/// Code that constructs the class through its module now calls the double's
/// constructor, which can be stubbed with [`allow_constructor`].
pub fn patch_class(path: &str) -> DoubleResult<ClassDouble> {
    let double = ClassDouble::new(path)?;
    patch(path, double.clone())?;
    Ok(double)
}
