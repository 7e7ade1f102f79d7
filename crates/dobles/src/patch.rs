//! The undo log: every attribute a double replaces, with exactly what was there before.

use crate::{
    doubles::ObjectDouble,
    error::DoubleResult,
    function::Function,
    hijack,
    object::{Class, Instance, Member, Module},
    target::{AttributeKind, Subject, Target},
    value::{Args, Value},
};

/// One reversible replacement. `prior` is `None` when the attribute did not exist.
#[derive(Debug)]
pub(crate) enum Patch {
    ModuleAttr {
        module: Module,
        name: String,
        prior: Option<Value>,
    },
    ClassMember {
        class: Class,
        name: String,
        prior: Option<Member>,
    },
    InstanceAttr {
        instance: Instance,
        name: String,
        prior: Option<Value>,
    },
    DoubleAttr {
        double: ObjectDouble,
        name: String,
        prior: Option<Value>,
    },
    DoubleProperty {
        double: ObjectDouble,
        name: String,
        prior: Option<Function>,
    },
    Hijack {
        instance: Instance,
        name: String,
    },
}

impl Patch {
    /// Replaces a module attribute.
    pub(crate) fn module_attr(module: &Module, name: &str, value: Value) -> Self {
        let prior = module.set(name, value);
        Self::ModuleAttr {
            module: module.clone(),
            name: name.to_owned(),
            prior,
        }
    }

    /// Routes `name` on the target's subject to `dispatcher`.
    ///
    /// Classes keep the member's kind: properties and class methods get a
    /// receiver-dropping wrapper, everything else a static member. Instances get an own
    /// attribute, or a class trampoline for names the runtime resolves on the class.
    /// Modules and doubles get an attribute of their own, and doubles a property entry
    /// for properties.
    pub(crate) fn install(target: &Target, name: &str, dispatcher: Function) -> DoubleResult<Self> {
        let kind = target.get_attr(name).map(|info| info.kind);
        let patch = match target.subject() {
            Subject::Module(module) => Self::module_attr(module, name, Value::Function(dispatcher)),
            Subject::Double(double) if kind == Some(AttributeKind::Property) => {
                let prior = double.set_property(name, dispatcher);
                Self::DoubleProperty {
                    double: double.clone(),
                    name: name.to_owned(),
                    prior,
                }
            }
            Subject::Double(double) => {
                let prior = double.set_attr(name, Value::Function(dispatcher));
                Self::DoubleAttr {
                    double: double.clone(),
                    name: name.to_owned(),
                    prior,
                }
            }
            Subject::Class(class) => {
                let member = match kind {
                    Some(AttributeKind::Property) => Member::Property(dropping_receiver(name, dispatcher)),
                    Some(AttributeKind::ClassMethod) => Member::ClassMethod(dropping_receiver(name, dispatcher)),
                    _ => Member::StaticMethod(dispatcher),
                };
                let prior = class.set_member(name, member);
                Self::ClassMember {
                    class: class.clone(),
                    name: name.to_owned(),
                    prior,
                }
            }
            Subject::Instance(instance) => {
                if target.requires_hijack(name) {
                    target.hijack(name, dispatcher)?;
                    Self::Hijack {
                        instance: instance.clone(),
                        name: name.to_owned(),
                    }
                } else {
                    let prior = instance.set_attr(name, Value::Function(dispatcher));
                    Self::InstanceAttr {
                        instance: instance.clone(),
                        name: name.to_owned(),
                        prior,
                    }
                }
            }
        };
        tracing::debug!(subject = %target, name, "attribute patched");
        Ok(patch)
    }

    /// Puts the prior attribute back, or removes the replacement if there was none.
    pub(crate) fn restore(self) {
        match self {
            Self::ModuleAttr { module, name, prior } => {
                match prior {
                    Some(value) => module.set(&name, value),
                    None => module.remove(&name),
                };
                tracing::debug!(module = module.name(), name = %name, "module attribute restored");
            }
            Self::ClassMember { class, name, prior } => {
                match prior {
                    Some(member) => class.set_member(&name, member),
                    None => class.remove_member(&name),
                };
                tracing::debug!(class = %class.qualified_name(), name = %name, "class member restored");
            }
            Self::InstanceAttr { instance, name, prior } => {
                match prior {
                    Some(value) => instance.set_attr(&name, value),
                    None => instance.remove_attr(&name),
                };
                tracing::debug!(%instance, name = %name, "instance attribute restored");
            }
            Self::DoubleAttr { double, name, prior } => {
                match prior {
                    Some(value) => double.set_attr(&name, value),
                    None => double.remove_attr(&name),
                };
                tracing::debug!(%double, name = %name, "double attribute restored");
            }
            Self::DoubleProperty { double, name, prior } => {
                match prior {
                    Some(getter) => double.set_property(&name, getter),
                    None => double.remove_property(&name),
                };
                tracing::debug!(%double, name = %name, "double property restored");
            }
            Self::Hijack { instance, name } => {
                hijack::remove(&instance, &name);
            }
        }
    }
}

/// Wraps `dispatcher` for a class slot whose lookup prepends a receiver.
fn dropping_receiver(name: &str, dispatcher: Function) -> Function {
    let inner = dispatcher.clone();
    Function::dispatcher(name, Some(dispatcher), move |args: Args| inner.call(args.without_receiver()))
}
