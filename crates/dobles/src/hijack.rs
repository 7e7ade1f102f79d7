//! Per-instance overrides of attributes the runtime resolves on the class.
//!
//! Protocol methods (`__call__`, `__enter__`, ...) and properties are looked up on an
//! instance's class, so setting an instance attribute cannot override them. Instead a
//! single trampoline is installed on the class per `(class, name)`; it forwards each
//! call to the receiving instance's override when one is registered and to the
//! original member otherwise. The trampoline is removed again once the last
//! instance's override is gone.

use std::cell::RefCell;

use ahash::AHashMap;

use crate::{
    error::{DoubleError, DoubleResult},
    function::Function,
    object::{Class, Instance, Member},
    value::{Args, Value},
};

struct Hijack {
    class: Class,
    /// The class's own member before the trampoline replaced it.
    original: Option<Member>,
    /// Overrides keyed by instance identity.
    overrides: AHashMap<usize, Function>,
}

thread_local! {
    static HIJACKS: RefCell<AHashMap<(usize, String), Hijack>> = RefCell::new(AHashMap::new());
}

/// Registers `override_fn` for `name` on `instance`, installing the class trampoline
/// if this is the first override for that class and name.
pub(crate) fn install(instance: &Instance, name: &str, override_fn: Function) {
    let class = instance.class().clone();
    let key = (class.id(), name.to_owned());
    let installed = HIJACKS.with(|h| {
        let mut hijacks = h.borrow_mut();
        if let Some(entry) = hijacks.get_mut(&key) {
            entry.overrides.insert(instance.id(), override_fn.clone());
            return true;
        }
        false
    });
    if installed {
        tracing::trace!(class = %class.qualified_name(), name, "hijack reused");
        return;
    }

    let fallback = class.lookup(name).map(|(member, _)| member);
    let trampoline = trampoline(&class, name, fallback.clone());
    let member = match fallback {
        Some(Member::Property(_)) => Member::Property(trampoline),
        _ => Member::Method(trampoline),
    };
    let original = class.set_member(name, member);

    let mut overrides = AHashMap::new();
    overrides.insert(instance.id(), override_fn);
    HIJACKS.with(|h| {
        h.borrow_mut().insert(
            key,
            Hijack {
                class: class.clone(),
                original,
                overrides,
            },
        );
    });
    tracing::debug!(class = %class.qualified_name(), name, "hijack installed");
}

/// Drops `instance`'s override for `name`. Returns false when none was registered.
pub(crate) fn remove(instance: &Instance, name: &str) -> bool {
    let key = (instance.class().id(), name.to_owned());
    let removed = HIJACKS.with(|h| {
        let mut hijacks = h.borrow_mut();
        let entry = hijacks.get_mut(&key)?;
        entry.overrides.remove(&instance.id())?;
        if entry.overrides.is_empty() {
            Some(hijacks.remove(&key))
        } else {
            Some(None)
        }
    });
    let Some(last) = removed else {
        return false;
    };
    if let Some(hijack) = last {
        match hijack.original {
            Some(member) => {
                hijack.class.set_member(name, member);
            }
            None => {
                hijack.class.remove_member(name);
            }
        }
        tracing::debug!(class = %hijack.class.qualified_name(), name, "hijack removed");
    }
    true
}

/// Number of instances currently overriding `name` on `class`.
#[must_use]
pub fn override_count(class: &Class, name: &str) -> usize {
    HIJACKS.with(|h| {
        h.borrow()
            .get(&(class.id(), name.to_owned()))
            .map_or(0, |entry| entry.overrides.len())
    })
}

fn trampoline(class: &Class, name: &str, fallback: Option<Member>) -> Function {
    let class_id = class.id();
    let owned_name = name.to_owned();
    let wrapped = fallback.as_ref().and_then(Member::function).cloned();
    Function::dispatcher(name, wrapped, move |args: Args| {
        let receiver = args.get(0).cloned().unwrap_or_default();
        let override_fn = match &receiver {
            Value::Instance(instance) => HIJACKS.with(|h| {
                h.borrow()
                    .get(&(class_id, owned_name.clone()))
                    .and_then(|entry| entry.overrides.get(&instance.id()).cloned())
            }),
            _ => None,
        };
        match override_fn {
            Some(f) => f.call(args.without_receiver()),
            None => call_fallback(fallback.as_ref(), &owned_name, &receiver, args),
        }
    })
}

fn call_fallback(fallback: Option<&Member>, name: &str, receiver: &Value, args: Args) -> DoubleResult<Value> {
    match fallback {
        Some(Member::Method(f) | Member::Property(f)) => f.call(args),
        Some(Member::ClassMethod(f)) => {
            let class = match receiver {
                Value::Instance(instance) => Value::Class(instance.class().clone()),
                other => other.clone(),
            };
            f.call(args.without_receiver().prepend(class))
        }
        Some(Member::StaticMethod(f)) => f.call(args.without_receiver()),
        Some(Member::Data(value)) => value.call(args.without_receiver()),
        None => Err(DoubleError::attribute(format!("'{}' object", receiver.type_name()), name)),
    }
}
