//! Classes, instances and modules of the dynamic object model.
//!
//! Attribute tables are insertion ordered and mutable through shared handles, which
//! is what lets a double patch a live class or module and later restore the exact
//! prior entry. All handles are `Rc`-based: cloning one yields the same object.

use std::{cell::RefCell, fmt, rc::Rc};

use indexmap::IndexMap;
use strum::{Display, EnumString};

use crate::{
    args,
    error::{DoubleError, DoubleResult, Exception},
    function::Function,
    value::{Args, Value},
};

/// One entry of a class's attribute table, classified the way descriptor lookup sees it.
#[derive(Debug, Clone)]
pub enum Member {
    /// A plain function: bound to the instance on lookup.
    Method(Function),
    /// Bound to the class on lookup, from instances and classes alike.
    ClassMethod(Function),
    /// Never bound.
    StaticMethod(Function),
    /// A getter evaluated on instance lookup. It takes precedence over instance attributes.
    Property(Function),
    /// Anything else stored on the class.
    Data(Value),
}

impl Member {
    /// The function behind a method-like member, `None` for data.
    #[must_use]
    pub fn function(&self) -> Option<&Function> {
        match self {
            Self::Method(f) | Self::ClassMethod(f) | Self::StaticMethod(f) | Self::Property(f) => Some(f),
            Self::Data(_) => None,
        }
    }

    /// The member as a plain value, the way a caller holding it would see it unbound.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Data(v) => v.clone(),
            _ => self.function().cloned().map_or(Value::None, Value::Function),
        }
    }

    #[must_use]
    pub fn is_property(&self) -> bool {
        matches!(self, Self::Property(_))
    }
}

/// Built-in construction behaviour of a class that declares no `__init__`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Container {
    /// Like `object`: construction takes no arguments.
    #[default]
    None,
    /// Like `list`/`tuple`/`set`: construction accepts positional arguments.
    Sequence,
    /// Like `dict`: construction accepts keyword arguments.
    Mapping,
}

// ============================================================================
// Classes
// ============================================================================

#[derive(Clone)]
pub struct Class(Rc<ClassData>);

struct ClassData {
    name: String,
    module: String,
    bases: Vec<Class>,
    members: RefCell<IndexMap<String, Member>>,
    container: Container,
}

impl Class {
    /// Starts building a class named `name` defined in module `module`.
    pub fn builder(module: impl Into<String>, name: impl Into<String>) -> ClassBuilder {
        ClassBuilder {
            module: module.into(),
            name: name.into(),
            bases: Vec::new(),
            members: IndexMap::new(),
            container: Container::None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[must_use]
    pub fn module(&self) -> &str {
        &self.0.module
    }

    /// `module.Name`
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.0.module, self.0.name)
    }

    #[must_use]
    pub fn bases(&self) -> &[Self] {
        &self.0.bases
    }

    #[must_use]
    pub fn container(&self) -> Container {
        self.0.container
    }

    /// Method resolution order: the class, then its bases depth-first, each class once.
    #[must_use]
    pub fn mro(&self) -> Vec<Self> {
        let mut order: Vec<Self> = vec![self.clone()];
        for base in &self.0.bases {
            for class in base.mro() {
                if !order.iter().any(|c| c.id() == class.id()) {
                    order.push(class);
                }
            }
        }
        order
    }

    #[must_use]
    pub fn is_subclass_of(&self, other: &Self) -> bool {
        self.mro().iter().any(|c| c.id() == other.id())
    }

    /// Finds `name` along the MRO, returning the member and the class defining it.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<(Member, Self)> {
        self.mro()
            .into_iter()
            .find_map(|class| class.own_member(name).map(|member| (member, class)))
    }

    /// The member this class itself defines under `name`, ignoring bases.
    #[must_use]
    pub fn own_member(&self, name: &str) -> Option<Member> {
        self.0.members.borrow().get(name).cloned()
    }

    /// Every visible member with its defining class, nearest definition first.
    #[must_use]
    pub fn members(&self) -> IndexMap<String, (Member, Self)> {
        let mut members = IndexMap::new();
        for class in self.mro() {
            for (name, member) in class.0.members.borrow().iter() {
                if !members.contains_key(name) {
                    members.insert(name.clone(), (member.clone(), class.clone()));
                }
            }
        }
        members
    }

    /// Replaces the class's own member, returning what was there before.
    pub fn set_member(&self, name: impl Into<String>, member: Member) -> Option<Member> {
        self.0.members.borrow_mut().insert(name.into(), member)
    }

    pub fn remove_member(&self, name: &str) -> Option<Member> {
        self.0.members.borrow_mut().shift_remove(name)
    }

    /// Class-level attribute access: class methods bind to the class, everything else is
    /// returned unbound.
    pub fn get_attr(&self, name: &str) -> DoubleResult<Value> {
        match self.lookup(name) {
            Some((Member::ClassMethod(f), _)) => Ok(Value::Function(f.bind(Value::Class(self.clone())))),
            Some((member, _)) => Ok(member.to_value()),
            None => Err(DoubleError::attribute(format!("type object '{}'", self.0.name), name)),
        }
    }

    /// Calls a class-level attribute.
    pub fn call(&self, name: &str, args: Args) -> DoubleResult<Value> {
        self.get_attr(name)?.call(args)
    }

    /// Creates an instance and runs `__init__`, or the container construction when the
    /// class declares none.
    pub fn instantiate(&self, args: Args) -> DoubleResult<Instance> {
        let instance = Instance::new(self);
        match self.lookup("__init__") {
            Some((Member::Method(init), _)) => {
                init.call(args.prepend(Value::Instance(instance.clone())))?;
            }
            Some((member, _)) => {
                member.to_value().call(args)?;
            }
            None => self.construct_container(&instance, args)?,
        }
        Ok(instance)
    }

    fn construct_container(&self, instance: &Instance, args: Args) -> DoubleResult<()> {
        match self.0.container {
            _ if args.is_empty() => Ok(()),
            Container::Sequence if args.keywords().is_empty() => {
                instance.set_attr("items", Value::List(args.positional().to_vec()));
                Ok(())
            }
            Container::Mapping if args.positional().is_empty() => {
                instance.set_attr("items", Value::Dict(args.keywords().clone()));
                Ok(())
            }
            _ => Err(Exception::new("TypeError", format!("{}() takes no arguments", self.0.name)).into()),
        }
    }

    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.0).addr()
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.qualified_name())
            .field("members", &self.0.members.borrow().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<class '{}'>", self.qualified_name())
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Collects the members of a class before it is shared.
#[derive(Debug)]
#[must_use]
pub struct ClassBuilder {
    module: String,
    name: String,
    bases: Vec<Class>,
    members: IndexMap<String, Member>,
    container: Container,
}

impl ClassBuilder {
    pub fn base(mut self, base: &Class) -> Self {
        self.bases.push(base.clone());
        self
    }

    /// Adds an instance method named after the function.
    pub fn method(self, function: Function) -> Self {
        let name = function.name().to_owned();
        self.member(name, Member::Method(function))
    }

    pub fn class_method(self, function: Function) -> Self {
        let name = function.name().to_owned();
        self.member(name, Member::ClassMethod(function))
    }

    pub fn static_method(self, function: Function) -> Self {
        let name = function.name().to_owned();
        self.member(name, Member::StaticMethod(function))
    }

    /// Adds a property whose getter receives the instance.
    pub fn property(self, getter: Function) -> Self {
        let name = getter.name().to_owned();
        self.member(name, Member::Property(getter))
    }

    pub fn data(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.member(name, Member::Data(value.into()))
    }

    pub fn member(mut self, name: impl Into<String>, member: Member) -> Self {
        self.members.insert(name.into(), member);
        self
    }

    pub fn container(mut self, container: Container) -> Self {
        self.container = container;
        self
    }

    #[must_use]
    pub fn build(self) -> Class {
        let container = match self.container {
            Container::None => self
                .bases
                .iter()
                .map(Class::container)
                .find(|c| *c != Container::None)
                .unwrap_or_default(),
            other => other,
        };
        Class(Rc::new(ClassData {
            name: self.name,
            module: self.module,
            bases: self.bases,
            members: RefCell::new(self.members),
            container,
        }))
    }
}

// ============================================================================
// Instances
// ============================================================================

#[derive(Clone)]
pub struct Instance(Rc<InstanceData>);

struct InstanceData {
    class: Class,
    attrs: RefCell<IndexMap<String, Value>>,
}

impl Instance {
    /// Allocates an instance without running `__init__`.
    #[must_use]
    pub fn new(class: &Class) -> Self {
        Self(Rc::new(InstanceData {
            class: class.clone(),
            attrs: RefCell::new(IndexMap::new()),
        }))
    }

    /// Allocates an instance with the given own attributes.
    #[must_use]
    pub fn with_attrs(class: &Class, attrs: impl IntoIterator<Item = (String, Value)>) -> Self {
        let instance = Self::new(class);
        instance.0.attrs.borrow_mut().extend(attrs);
        instance
    }

    #[must_use]
    pub fn class(&self) -> &Class {
        &self.0.class
    }

    #[must_use]
    pub fn own_attr(&self, name: &str) -> Option<Value> {
        self.0.attrs.borrow().get(name).cloned()
    }

    /// Sets an own attribute, returning the previous one.
    pub fn set_attr(&self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.attrs.borrow_mut().insert(name.into(), value.into())
    }

    pub fn remove_attr(&self, name: &str) -> Option<Value> {
        self.0.attrs.borrow_mut().shift_remove(name)
    }

    /// Attribute lookup: properties first, then own attributes, then class members.
    pub fn get_attr(&self, name: &str) -> DoubleResult<Value> {
        let member = self.0.class.lookup(name).map(|(member, _)| member);
        if let Some(Member::Property(getter)) = &member {
            return getter.call(args!(Value::Instance(self.clone())));
        }
        if let Some(value) = self.own_attr(name) {
            return Ok(value);
        }
        match member {
            Some(member) => Ok(self.bind_member(member)),
            None => Err(DoubleError::attribute(format!("'{}' object", self.0.class.name()), name)),
        }
    }

    /// Calls `name` as a method, e.g. `user.get_name()`.
    pub fn call_method(&self, name: &str, args: Args) -> DoubleResult<Value> {
        self.get_attr(name)?.call(args)
    }

    /// Invokes a protocol method the way the runtime does: looked up on the class only,
    /// so per-instance attributes of the same name are ignored.
    pub fn call_protocol(&self, name: &str, args: Args) -> DoubleResult<Value> {
        match self.0.class.lookup(name) {
            Some((Member::Property(getter), _)) => getter.call(args!(Value::Instance(self.clone())))?.call(args),
            Some((member, _)) => self.bind_member(member).call(args),
            None if name == "__call__" => Err(DoubleError::NotCallable(format!("'{}' object", self.0.class.name()))),
            None => Err(DoubleError::attribute(format!("'{}' object", self.0.class.name()), name)),
        }
    }

    fn bind_member(&self, member: Member) -> Value {
        match member {
            Member::Method(f) => Value::Function(f.bind(Value::Instance(self.clone()))),
            Member::ClassMethod(f) => Value::Function(f.bind(Value::Class(self.0.class.clone()))),
            Member::StaticMethod(f) | Member::Property(f) => Value::Function(f),
            Member::Data(v) => v,
        }
    }

    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.0).addr()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.0.class.qualified_name())
            .field("attrs", &self.0.attrs.borrow())
            .finish()
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} object at {:#x}>", self.0.class.qualified_name(), self.id())
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

// ============================================================================
// Modules
// ============================================================================

#[derive(Clone)]
pub struct Module(Rc<ModuleData>);

struct ModuleData {
    name: String,
    attrs: RefCell<IndexMap<String, Value>>,
}

impl Module {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(Rc::new(ModuleData {
            name: name.into(),
            attrs: RefCell::new(IndexMap::new()),
        }))
    }

    /// Builder-style [`set`](Self::set).
    #[must_use]
    pub fn with(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.attrs.borrow().get(name).cloned()
    }

    /// Sets an attribute, returning the previous one.
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.attrs.borrow_mut().insert(name.into(), value.into())
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.0.attrs.borrow_mut().shift_remove(name)
    }

    /// Snapshot of every attribute, in definition order.
    #[must_use]
    pub fn attrs(&self) -> Vec<(String, Value)> {
        self.0.attrs.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Calls a module-level function, e.g. `testing.top_level_function(...)`.
    pub fn call(&self, name: &str, args: Args) -> DoubleResult<Value> {
        self.get(name)
            .ok_or_else(|| DoubleError::attribute(format!("module '{}'", self.0.name), name))?
            .call(args)
    }

    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.0).addr()
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.0.name)
            .field("attrs", &self.0.attrs.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<module '{}'>", self.0.name)
    }
}

impl PartialEq for Module {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
