//! Pure doubles: synthetic stand-ins verified against a real class.
//!
//! A double never allocates an instance of the class it stands for. It carries the
//! class (or the live object, for [`ObjectDouble`]) it is verified against plus its
//! own attribute table, which is where stubs registered on the double live.

use std::{cell::RefCell, fmt, ops::Deref, rc::Rc};

use indexmap::IndexMap;
use strum::Display;

use crate::{
    error::{DoubleError, DoubleResult},
    function::Function,
    object::{Class, Member},
    signature::Signature,
    target::{Subject, Target},
    value::{Args, Value},
    verification::{CONSTRUCTOR, verify_arguments},
};

/// Which kind of pure double this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DoubleKind {
    /// Stands in for a specific live object.
    #[strum(serialize = "ObjectDouble")]
    Object,
    /// Stands in for some instance of a class.
    #[strum(serialize = "InstanceDouble")]
    Instance,
    /// Stands in for the class itself, including its constructor.
    #[strum(serialize = "ClassDouble")]
    Class,
}

/// A pure double. See [`InstanceDouble`] and [`ClassDouble`] for the usual entry points.
#[derive(Clone)]
pub struct ObjectDouble(Rc<DoubleData>);

struct DoubleData {
    kind: DoubleKind,
    /// The object verification runs against: a live instance or a class.
    target: Value,
    class: Class,
    attrs: RefCell<IndexMap<String, Value>>,
    /// Getters for stubbed properties, evaluated on lookup ahead of plain attributes.
    properties: RefCell<IndexMap<String, Function>>,
    constructor: Function,
}

impl ObjectDouble {
    /// Doubles a live instance or class.
    pub fn new(object: impl Into<Value>) -> DoubleResult<Self> {
        match object.into() {
            Value::Instance(instance) => {
                let class = instance.class().clone();
                Ok(Self::from_parts(DoubleKind::Object, Value::Instance(instance), class))
            }
            Value::Class(class) => Ok(Self::from_parts(DoubleKind::Object, Value::Class(class.clone()), class)),
            other => Err(DoubleError::VerifyingDouble(format!(
                "Cannot create an ObjectDouble of {}: only instances and classes can be doubled.",
                other.repr()
            ))),
        }
    }

    fn from_parts(kind: DoubleKind, target: Value, class: Class) -> Self {
        let constructor = Function::new(CONSTRUCTOR, Signature::variadic(), |_| {
            Err(DoubleError::UnallowedMethodCall(
                "Cannot call __new__ on a ClassDouble without stubbing it".to_owned(),
            ))
        });
        Self(Rc::new(DoubleData {
            kind,
            target,
            class,
            attrs: RefCell::new(IndexMap::new()),
            properties: RefCell::new(IndexMap::new()),
            constructor,
        }))
    }

    #[must_use]
    pub fn kind(&self) -> DoubleKind {
        self.0.kind
    }

    /// Whether the double stands in for a class rather than an instance.
    #[must_use]
    pub fn is_class(&self) -> bool {
        match self.0.kind {
            DoubleKind::Class => true,
            DoubleKind::Instance => false,
            DoubleKind::Object => matches!(self.0.target, Value::Class(_)),
        }
    }

    /// The object verification runs against.
    #[must_use]
    pub fn target(&self) -> Value {
        self.0.target.clone()
    }

    #[must_use]
    pub fn target_class(&self) -> &Class {
        &self.0.class
    }

    /// The placeholder constructor, failing until a constructor allowance replaces it.
    pub(crate) fn constructor(&self) -> Function {
        self.0.constructor.clone()
    }

    #[must_use]
    pub fn own_attr(&self, name: &str) -> Option<Value> {
        self.0.attrs.borrow().get(name).cloned()
    }

    /// Sets an attribute on the double, returning the previous one.
    pub fn set_attr(&self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.attrs.borrow_mut().insert(name.into(), value.into())
    }

    pub fn remove_attr(&self, name: &str) -> Option<Value> {
        self.0.attrs.borrow_mut().shift_remove(name)
    }

    /// Installs a property getter, returning the previous one. The getter is called
    /// with no arguments.
    pub fn set_property(&self, name: impl Into<String>, getter: Function) -> Option<Function> {
        self.0.properties.borrow_mut().insert(name.into(), getter)
    }

    pub fn remove_property(&self, name: &str) -> Option<Function> {
        self.0.properties.borrow_mut().shift_remove(name)
    }

    /// Looks up an attribute: the double's properties, then its own attributes, then
    /// class-level overrides that the current test installed on the target class.
    pub fn get_attr(&self, name: &str) -> DoubleResult<Value> {
        let getter = self.0.properties.borrow().get(name).cloned();
        if let Some(getter) = getter {
            return getter.call(Args::new());
        }
        if let Some(value) = self.own_attr(name) {
            return Ok(value);
        }
        match self.0.class.lookup(name) {
            Some((Member::StaticMethod(f), _)) if f.is_dispatcher() => return Ok(Value::Function(f)),
            Some((Member::ClassMethod(f), _)) if f.is_dispatcher() => {
                return Ok(Value::Function(f.bind(Value::Class(self.0.class.clone()))));
            }
            Some((Member::Property(f), _)) if f.is_dispatcher() && !self.is_class() => {
                return f.call(Args::new().prepend(Value::Double(self.clone())));
            }
            _ => {}
        }
        if name == CONSTRUCTOR && self.is_class() {
            return Ok(Value::Function(self.constructor()));
        }
        Err(DoubleError::attribute(self.to_string(), name))
    }

    /// Calls a method of the double.
    pub fn call(&self, name: &str, args: Args) -> DoubleResult<Value> {
        self.get_attr(name)?.call(args)
    }

    /// Calls the double itself: class doubles construct, others dispatch `__call__`.
    pub fn invoke(&self, args: Args) -> DoubleResult<Value> {
        if self.is_class() {
            self.construct(args)
        } else {
            match self.own_attr("__call__") {
                Some(call) => call.call(args),
                None => Err(DoubleError::NotCallable(self.to_string())),
            }
        }
    }

    /// Verifies `args` against the class's `__init__`, then dispatches the stubbed
    /// constructor.
    pub fn construct(&self, args: Args) -> DoubleResult<Value> {
        let target = Target::new(Subject::Double(self.clone()));
        verify_arguments(&target, CONSTRUCTOR, &args.shape())?;
        self.call(CONSTRUCTOR, args)
    }

    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.0).addr()
    }
}

impl fmt::Debug for ObjectDouble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectDouble")
            .field("kind", &self.0.kind)
            .field("target", &self.0.target)
            .field("attrs", &self.0.attrs.borrow().keys().collect::<Vec<_>>())
            .field("properties", &self.0.properties.borrow().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ObjectDouble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} of {}>", self.0.kind, self.0.target.repr())
    }
}

impl PartialEq for ObjectDouble {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

// ============================================================================
// Instance and class doubles
// ============================================================================

/// A pure double of an instance of a class.
///
/// ```
/// use dobles::{Class, InstanceDouble, Value};
///
/// let user = Class::builder("app", "User").build();
/// let double = InstanceDouble::of(&user, [("name", Value::from("Bob"))]);
/// assert_eq!(double.get_attr("name").unwrap(), Value::from("Bob"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceDouble(ObjectDouble);

impl InstanceDouble {
    /// Doubles an instance of the class at `path`; `attrs` become plain attributes.
    pub fn new<'a>(path: &str, attrs: impl IntoIterator<Item = (&'a str, Value)>) -> DoubleResult<Self> {
        let class = crate::path::resolve_class(path)?;
        Ok(Self::of(&class, attrs))
    }

    pub fn of<'a>(class: &Class, attrs: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        let double = ObjectDouble::from_parts(DoubleKind::Instance, Value::Class(class.clone()), class.clone());
        for (name, value) in attrs {
            double.set_attr(name, value);
        }
        Self(double)
    }

    #[must_use]
    pub fn into_inner(self) -> ObjectDouble {
        self.0
    }
}

/// A pure double of a class, including its constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDouble(ObjectDouble);

impl ClassDouble {
    /// Doubles the class at `path`.
    pub fn new(path: &str) -> DoubleResult<Self> {
        let class = crate::path::resolve_class(path)?;
        Ok(Self::of(&class))
    }

    #[must_use]
    pub fn of(class: &Class) -> Self {
        Self(ObjectDouble::from_parts(
            DoubleKind::Class,
            Value::Class(class.clone()),
            class.clone(),
        ))
    }

    #[must_use]
    pub fn into_inner(self) -> ObjectDouble {
        self.0
    }
}

impl Deref for InstanceDouble {
    type Target = ObjectDouble;

    fn deref(&self) -> &ObjectDouble {
        &self.0
    }
}

impl Deref for ClassDouble {
    type Target = ObjectDouble;

    fn deref(&self) -> &ObjectDouble {
        &self.0
    }
}

impl From<InstanceDouble> for Subject {
    fn from(v: InstanceDouble) -> Self {
        Self::Double(v.0)
    }
}

impl From<&InstanceDouble> for Subject {
    fn from(v: &InstanceDouble) -> Self {
        Self::Double(v.0.clone())
    }
}

impl From<ClassDouble> for Subject {
    fn from(v: ClassDouble) -> Self {
        Self::Double(v.0)
    }
}

impl From<&ClassDouble> for Subject {
    fn from(v: &ClassDouble) -> Self {
        Self::Double(v.0.clone())
    }
}

impl From<InstanceDouble> for Value {
    fn from(v: InstanceDouble) -> Self {
        Self::Double(v.0)
    }
}

impl From<ClassDouble> for Value {
    fn from(v: ClassDouble) -> Self {
        Self::Double(v.0)
    }
}

impl TryFrom<ObjectDouble> for ClassDouble {
    type Error = ObjectDouble;

    fn try_from(double: ObjectDouble) -> Result<Self, Self::Error> {
        if double.kind() == DoubleKind::Class {
            Ok(Self(double))
        } else {
            Err(double)
        }
    }
}
