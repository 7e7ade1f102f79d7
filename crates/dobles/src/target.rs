//! The object being doubled, and the classification of its attributes.
//!
//! A [`Target`] wraps a [`Subject`] and answers the questions the engine asks before
//! touching anything: does this attribute exist, what kind of attribute is it, which
//! class defines it, is it a coroutine function, and must it be overridden at the
//! class level because the runtime looks it up there.

use std::{cell::RefCell, fmt};

use indexmap::IndexMap;
use strum::{Display, IntoStaticStr};

use crate::{
    doubles::ObjectDouble,
    error::{DoubleError, DoubleResult},
    function::Function,
    hijack,
    object::{Class, Instance, Member, Module},
    value::Value,
    verification::CONSTRUCTOR,
};

/// Stable identity of a subject for the lifetime of a test.
///
/// Derived from the address of the subject's shared allocation, so two handles to the
/// same object share an id while equal-looking objects do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubjectId(usize);

impl SubjectId {
    /// Returns the raw identifier.
    #[must_use]
    pub fn raw(self) -> usize {
        self.0
    }
}

/// Anything that can be handed to `allow`/`expect`.
#[derive(Debug, Clone)]
pub enum Subject {
    Instance(Instance),
    Class(Class),
    Module(Module),
    Double(ObjectDouble),
}

impl Subject {
    #[must_use]
    pub fn id(&self) -> SubjectId {
        SubjectId(match self {
            Self::Instance(i) => i.id(),
            Self::Class(c) => c.id(),
            Self::Module(m) => m.id(),
            Self::Double(d) => d.id(),
        })
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Instance(i) => Value::Instance(i.clone()),
            Self::Class(c) => Value::Class(c.clone()),
            Self::Module(m) => Value::Module(m.clone()),
            Self::Double(d) => Value::Double(d.clone()),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_value().repr())
    }
}

impl From<Instance> for Subject {
    fn from(v: Instance) -> Self {
        Self::Instance(v)
    }
}

impl From<&Instance> for Subject {
    fn from(v: &Instance) -> Self {
        Self::Instance(v.clone())
    }
}

impl From<Class> for Subject {
    fn from(v: Class) -> Self {
        Self::Class(v)
    }
}

impl From<&Class> for Subject {
    fn from(v: &Class) -> Self {
        Self::Class(v.clone())
    }
}

impl From<Module> for Subject {
    fn from(v: Module) -> Self {
        Self::Module(v)
    }
}

impl From<&Module> for Subject {
    fn from(v: &Module) -> Self {
        Self::Module(v.clone())
    }
}

impl From<ObjectDouble> for Subject {
    fn from(v: ObjectDouble) -> Self {
        Self::Double(v)
    }
}

impl From<&ObjectDouble> for Subject {
    fn from(v: &ObjectDouble) -> Self {
        Self::Double(v.clone())
    }
}

impl TryFrom<Value> for Subject {
    type Error = DoubleError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Instance(i) => Ok(Self::Instance(i)),
            Value::Class(c) => Ok(Self::Class(c)),
            Value::Module(m) => Ok(Self::Module(m)),
            Value::Double(d) => Ok(Self::Double(d)),
            other => Err(DoubleError::VerifyingDouble(format!(
                "Cannot double {}: only instances, classes, modules and doubles can be doubled.",
                other.repr()
            ))),
        }
    }
}

/// How an attribute behaves on lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum AttributeKind {
    InstanceMethod,
    ClassMethod,
    StaticMethod,
    Property,
    Data,
    /// A callable attribute of a module.
    ToplevelFunction,
    /// A callable found by runtime lookup rather than class classification, e.g. a
    /// function stored in an instance's own attributes.
    Callable,
}

/// Classification of one attribute of a target.
#[derive(Debug, Clone)]
pub struct AttributeInfo {
    /// The underlying callable (or data value) as stored, unbound.
    pub object: Value,
    pub kind: AttributeKind,
    /// The class or module that defines the attribute.
    pub defining: Value,
}

/// The object verification runs against: for a pure double, the class or instance it
/// stands in for.
#[derive(Debug, Clone)]
pub enum Doubled {
    Instance(Instance),
    Class(Class),
    Module(Module),
}

impl Doubled {
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Instance(i) => Value::Instance(i.clone()),
            Self::Class(c) => Value::Class(c.clone()),
            Self::Module(m) => Value::Module(m.clone()),
        }
    }
}

/// A subject plus the lazily built index of its attributes.
#[derive(Debug)]
pub struct Target {
    subject: Subject,
    doubled: Doubled,
    attrs: RefCell<IndexMap<String, AttributeInfo>>,
}

impl Target {
    /// Wraps `subject` and classifies every attribute currently visible on it.
    #[must_use]
    pub fn new(subject: Subject) -> Self {
        let doubled = match &subject {
            Subject::Instance(i) => Doubled::Instance(i.clone()),
            Subject::Class(c) => Doubled::Class(c.clone()),
            Subject::Module(m) => Doubled::Module(m.clone()),
            Subject::Double(d) => match d.target() {
                Value::Instance(i) => Doubled::Instance(i),
                Value::Class(c) => Doubled::Class(c),
                _ => Doubled::Class(d.target_class().clone()),
            },
        };
        let target = Self {
            subject,
            doubled,
            attrs: RefCell::new(IndexMap::new()),
        };
        target.generate_attrs();
        target
    }

    fn generate_attrs(&self) {
        let mut attrs = self.attrs.borrow_mut();
        match &self.doubled {
            Doubled::Module(module) => {
                for (name, value) in module.attrs() {
                    if value.is_callable() {
                        attrs.insert(
                            name,
                            AttributeInfo {
                                object: value,
                                kind: AttributeKind::ToplevelFunction,
                                defining: Value::Module(module.clone()),
                            },
                        );
                    }
                }
            }
            Doubled::Instance(_) | Doubled::Class(_) => {
                if let Some(class) = self.doubled_type() {
                    for (name, (member, defining)) in class.members() {
                        attrs.insert(name, classify(&member, &defining));
                    }
                }
            }
        }
        if let Subject::Double(double) = &self.subject
            && double.is_class()
        {
            attrs.insert(
                CONSTRUCTOR.to_owned(),
                AttributeInfo {
                    object: Value::Function(double.constructor()),
                    kind: AttributeKind::ClassMethod,
                    defining: Value::Class(double.target_class().clone()),
                },
            );
        }
    }

    #[must_use]
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    #[must_use]
    pub fn doubled(&self) -> &Doubled {
        &self.doubled
    }

    /// The class of the doubled object; `None` for modules.
    #[must_use]
    pub fn doubled_type(&self) -> Option<&Class> {
        match &self.doubled {
            Doubled::Instance(i) => Some(i.class()),
            Doubled::Class(c) => Some(c),
            Doubled::Module(_) => None,
        }
    }

    /// Class- or module-level subjects cannot double plain instance methods.
    #[must_use]
    pub fn is_class_or_module(&self) -> bool {
        match &self.subject {
            Subject::Double(d) => d.is_class(),
            _ => matches!(self.doubled, Doubled::Class(_) | Doubled::Module(_)),
        }
    }

    /// Returns the cached classification of `name`, classifying it on first request.
    #[must_use]
    pub fn get_attr(&self, name: &str) -> Option<AttributeInfo> {
        if let Some(info) = self.attrs.borrow().get(name) {
            return Some(info.clone());
        }
        let info = self.get_callable_attr(name)?;
        self.attrs.borrow_mut().insert(name.to_owned(), info.clone());
        Some(info)
    }

    /// Runtime lookup for attributes added after the target was wrapped.
    fn get_callable_attr(&self, name: &str) -> Option<AttributeInfo> {
        match &self.doubled {
            Doubled::Module(module) => module
                .get(name)
                .filter(Value::is_callable)
                .map(|object| AttributeInfo {
                    object,
                    kind: AttributeKind::Callable,
                    defining: Value::Module(module.clone()),
                }),
            Doubled::Instance(instance) => instance
                .own_attr(name)
                .filter(Value::is_callable)
                .map(|object| AttributeInfo {
                    object,
                    kind: AttributeKind::Callable,
                    defining: Value::Class(instance.class().clone()),
                })
                .or_else(|| self.classify_class_member(name)),
            Doubled::Class(_) => self.classify_class_member(name),
        }
    }

    fn classify_class_member(&self, name: &str) -> Option<AttributeInfo> {
        let (member, defining) = self.doubled_type()?.lookup(name)?;
        Some(classify(&member, &defining))
    }

    /// Whether the attribute ultimately resolves to a coroutine function.
    ///
    /// Looks through decorators, bound methods and installed dispatchers, and through
    /// `__call__` for callable instances.
    #[must_use]
    pub fn is_async(&self, name: &str) -> bool {
        self.get_attr(name).is_some_and(|info| value_is_async(&info.object))
    }

    /// Whether overriding `name` on this subject needs a class-level trampoline.
    ///
    /// Protocol methods are looked up on the class by the runtime and properties shadow
    /// instance attributes, so for instances neither can be overridden by setting an
    /// own attribute.
    #[must_use]
    pub fn requires_hijack(&self, name: &str) -> bool {
        matches!(self.subject, Subject::Instance(_))
            && (is_protocol_name(name)
                || self
                    .get_attr(name)
                    .is_some_and(|info| info.kind == AttributeKind::Property))
    }

    /// Routes `name` on the subject instance to `override_fn`.
    pub fn hijack(&self, name: &str, override_fn: Function) -> DoubleResult<()> {
        match &self.subject {
            Subject::Instance(instance) => {
                hijack::install(instance, name, override_fn);
                Ok(())
            }
            _ => Err(DoubleError::VerifyingDouble(format!(
                "Cannot hijack '{name}' on {}: only instances can be hijacked.",
                self.subject
            ))),
        }
    }

    /// Removes the subject's override for `name`; a no-op when none was installed.
    pub fn restore(&self, name: &str) -> bool {
        match &self.subject {
            Subject::Instance(instance) => hijack::remove(instance, name),
            _ => false,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.subject, f)
    }
}

fn classify(member: &Member, defining: &Class) -> AttributeInfo {
    let kind = match member {
        Member::Method(_) => AttributeKind::InstanceMethod,
        Member::ClassMethod(_) => AttributeKind::ClassMethod,
        Member::StaticMethod(_) => AttributeKind::StaticMethod,
        Member::Property(_) => AttributeKind::Property,
        Member::Data(_) => AttributeKind::Data,
    };
    AttributeInfo {
        object: member.to_value(),
        kind,
        defining: Value::Class(defining.clone()),
    }
}

fn value_is_async(value: &Value) -> bool {
    match value {
        Value::Function(f) => f.is_async(),
        Value::Instance(i) => i
            .class()
            .lookup("__call__")
            .and_then(|(member, _)| member.function().map(Function::is_async))
            .unwrap_or(false),
        _ => false,
    }
}

/// `__x__` names other than the constructor pair.
#[must_use]
pub fn is_protocol_name(name: &str) -> bool {
    name.len() > 4
        && name.starts_with("__")
        && name.ends_with("__")
        && name != "__init__"
        && name != "__new__"
}
