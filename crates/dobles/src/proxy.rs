//! The per-subject record of doubled methods.
//!
//! A [`Proxy`] owns one [`MethodDouble`] per doubled method name. The first
//! allowance for a name saves the original attribute and installs a dispatcher in its
//! place; every later allowance for that name only joins the dispatcher's list. The
//! replacement is recorded in the owning space's undo log, not on the proxy, so
//! teardown can undo every change in exact reverse order.

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use indexmap::IndexMap;
use strum::Display;

use crate::{
    allowance::{Allowance, CreationSite},
    error::{DoubleError, DoubleResult},
    function::Function,
    patch::Patch,
    target::{Subject, Target},
    value::{Args, Value},
    verification::verify_method,
};

/// Lifecycle of a proxy within one test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ProxyState {
    /// Created, nothing doubled yet.
    Uninitialized,
    /// At least one attribute replaced by a dispatcher.
    Active,
    /// Every rule passed verification.
    Verified,
    /// Every replaced attribute is back.
    Restored,
}

/// The allowances registered for one method of one subject, in declaration order.
pub struct MethodDouble {
    name: String,
    target: Rc<Target>,
    allowances: RefCell<Vec<Allowance>>,
}

impl MethodDouble {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn allowances(&self) -> Vec<Allowance> {
        self.allowances.borrow().clone()
    }

    /// Dispatches a call to the first allowance whose matcher accepts it.
    pub fn call(&self, args: Args) -> DoubleResult<Value> {
        let allowances = self.allowances();
        match allowances.iter().find(|allowance| allowance.accepts(&args)) {
            Some(allowance) => {
                tracing::trace!(method = %self.name, %args, "dispatching to allowance");
                allowance.invoke(args)
            }
            None => Err(unallowed_call(&self.name, &self.target.to_string(), &args)),
        }
    }
}

fn unallowed_call(method_name: &str, target: &str, args: &Args) -> DoubleError {
    DoubleError::UnallowedMethodCall(format!(
        "Received unexpected call to '{method_name}' on {target}.  The supplied arguments {args} do not match any available allowances."
    ))
}

/// Everything doubled on one subject.
pub struct Proxy {
    target: Rc<Target>,
    method_doubles: IndexMap<String, Rc<MethodDouble>>,
    state: ProxyState,
}

impl Proxy {
    pub(crate) fn new(subject: Subject) -> Self {
        let target = Rc::new(Target::new(subject));
        tracing::debug!(subject = %target, "proxy created");
        Self {
            target,
            method_doubles: IndexMap::new(),
            state: ProxyState::Uninitialized,
        }
    }

    #[must_use]
    pub fn target(&self) -> &Target {
        &self.target
    }

    #[must_use]
    pub fn state(&self) -> ProxyState {
        self.state
    }

    #[must_use]
    pub fn method_double(&self, name: &str) -> Option<&MethodDouble> {
        self.method_doubles.get(name).map(AsRef::as_ref)
    }

    /// Registers a new allowance (or expectation) for `method_name`, pushing any
    /// attribute replacement onto `undo_log`.
    ///
    /// # Errors
    /// `VerifyingDouble` when the attribute is missing, not callable, or a plain
    /// instance method requested on a class-level subject.
    pub(crate) fn add_allowance(
        &mut self,
        method_name: &str,
        site: CreationSite,
        is_expectation: bool,
        undo_log: &mut Vec<Patch>,
    ) -> DoubleResult<Allowance> {
        verify_method(&self.target, method_name, self.target.is_class_or_module())?;

        let method_double = match self.method_doubles.get(method_name) {
            Some(existing) => Rc::clone(existing),
            None => self.double_method(method_name, undo_log)?,
        };

        let allowance = Allowance::new(Rc::clone(&self.target), method_name, site, is_expectation);
        method_double.allowances.borrow_mut().push(allowance.clone());
        tracing::debug!(
            subject = %self.target,
            method = method_name,
            expectation = is_expectation,
            %site,
            "allowance registered"
        );
        Ok(allowance)
    }

    fn double_method(&mut self, method_name: &str, undo_log: &mut Vec<Patch>) -> DoubleResult<Rc<MethodDouble>> {
        let method_double = Rc::new(MethodDouble {
            name: method_name.to_owned(),
            target: Rc::clone(&self.target),
            allowances: RefCell::new(Vec::new()),
        });

        let original = self
            .target
            .get_attr(method_name)
            .and_then(|info| match info.object {
                Value::Function(f) => Some(f),
                _ => None,
            });
        let dispatcher = dispatcher(method_name, original, Rc::downgrade(&method_double), &self.target);
        let patch = Patch::install(&self.target, method_name, dispatcher)?;

        undo_log.push(patch);
        self.method_doubles
            .insert(method_name.to_owned(), Rc::clone(&method_double));
        self.state = ProxyState::Active;
        Ok(method_double)
    }

    /// Fails with the first rule whose call count is outside its bounds.
    pub fn verify(&mut self) -> DoubleResult<()> {
        for method_double in self.method_doubles.values() {
            for allowance in method_double.allowances.borrow().iter() {
                if !allowance.is_satisfied() {
                    return Err(allowance.failure());
                }
            }
        }
        if self.state == ProxyState::Active {
            self.state = ProxyState::Verified;
        }
        Ok(())
    }

    /// Drops every rule once the space has undone this proxy's replacements.
    pub(crate) fn mark_restored(&mut self) {
        self.method_doubles.clear();
        if self.state != ProxyState::Uninitialized {
            self.state = ProxyState::Restored;
        }
    }
}

/// Builds the function installed in place of the real attribute.
///
/// It holds the method double weakly: once the space is discarded, any dispatcher
/// that escaped restoration rejects calls instead of keeping stale rules alive.
fn dispatcher(name: &str, original: Option<Function>, method_double: Weak<MethodDouble>, target: &Target) -> Function {
    let method_name = name.to_owned();
    let target_repr = target.to_string();
    Function::dispatcher(name, original, move |args: Args| match method_double.upgrade() {
        Some(method_double) => method_double.call(args),
        None => Err(unallowed_call(&method_name, &target_repr, &args)),
    })
}
