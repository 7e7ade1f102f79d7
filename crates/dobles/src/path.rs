//! Module registry and dotted-path resolution.
//!
//! Modules are registered per thread under their dotted name; a path such as
//! `myapp.models.User` names attribute `User` of module `myapp.models`.

use std::cell::RefCell;

use indexmap::IndexMap;

use crate::{
    error::{DoubleError, DoubleResult},
    object::{Class, Module},
    value::Value,
};

thread_local! {
    static MODULES: RefCell<IndexMap<String, Module>> = RefCell::new(IndexMap::new());
}

/// Makes `module` importable under its name, replacing any module of the same name.
pub fn register_module(module: &Module) -> Option<Module> {
    MODULES.with(|m| m.borrow_mut().insert(module.name().to_owned(), module.clone()))
}

pub fn unregister_module(name: &str) -> Option<Module> {
    MODULES.with(|m| m.borrow_mut().shift_remove(name))
}

#[must_use]
pub fn import_module(name: &str) -> Option<Module> {
    MODULES.with(|m| m.borrow().get(name).cloned())
}

/// Splits `a.b.C` into `("a.b", "C")`.
pub fn path_components(path: &str) -> DoubleResult<(&str, &str)> {
    match path.rsplit_once('.') {
        Some((module_path, name)) if !module_path.is_empty() && !name.is_empty() => Ok((module_path, name)),
        _ => Err(DoubleError::VerifyingDoubleImport(format!("Invalid import path: {path}."))),
    }
}

fn get_module(module_path: &str, full_path: &str) -> DoubleResult<Module> {
    import_module(module_path)
        .ok_or_else(|| DoubleError::VerifyingDoubleImport(format!("Cannot import object from path: {full_path}.")))
}

/// Resolves a path to its module and attribute name without requiring the attribute.
pub fn resolve_parent(path: &str) -> DoubleResult<(Module, String)> {
    let (module_path, name) = path_components(path)?;
    Ok((get_module(module_path, path)?, name.to_owned()))
}

/// Resolves a dotted path to the live object it names.
pub fn resolve(path: &str) -> DoubleResult<Value> {
    let (module, name) = resolve_parent(path)?;
    module
        .get(&name)
        .ok_or_else(|| DoubleError::VerifyingDoubleImport(format!("No object at path: {path}.")))
}

/// Resolves a dotted path to a class. A class double at the path stands for its class.
pub fn resolve_class(path: &str) -> DoubleResult<Class> {
    match resolve(path)? {
        Value::Class(class) => Ok(class),
        Value::Double(double) => Ok(double.target_class().clone()),
        _ => Err(DoubleError::VerifyingDoubleImport(format!(
            "Path does not point to a class: {path}."
        ))),
    }
}
