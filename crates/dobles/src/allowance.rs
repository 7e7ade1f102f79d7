//! One stub rule for one doubled method.
//!
//! An [`Allowance`] is a shared handle: the proxy that dispatches calls keeps one
//! clone and the test configures another through the chainable builders below.
//! Allowances created through `expect` are expectations and must be called at least
//! once unless a count policy says otherwise.

use std::{cell::RefCell, fmt, future::Future, panic::Location, rc::Rc};

use crate::{
    call_count::CallCountAccumulator,
    error::{DoubleError, DoubleResult, Exception},
    function::{Coroutine, LocalFuture},
    matchers::{ArgPattern, ArgsPredicate},
    target::Target,
    value::{Args, Value},
    verification::verify_arguments,
};

/// Where an allowance was declared, reported in expectation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreationSite {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl CreationSite {
    pub(crate) fn from_location(location: &Location<'static>) -> Self {
        Self {
            file: location.file(),
            line: location.line(),
            column: location.column(),
        }
    }
}

impl fmt::Display for CreationSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Which calls an allowance accepts.
#[derive(Debug, Clone, Default)]
pub enum DeclaredArgs {
    #[default]
    Any,
    Exact(ArgPattern),
    Custom(ArgsPredicate),
}

type Computed = Rc<dyn Fn(&Args) -> DoubleResult<Value>>;
type ComputedAsync = Rc<dyn Fn(Args) -> LocalFuture>;

/// What a matching call produces.
#[derive(Clone)]
enum Effect {
    /// Values handed out in order; the last one repeats.
    Return { values: Vec<Value>, served: usize },
    Computed(Computed),
    ComputedAsync(ComputedAsync),
    Raise(Exception),
}

impl Default for Effect {
    fn default() -> Self {
        Self::Return {
            values: vec![Value::None],
            served: 0,
        }
    }
}

/// A declared rule for calls to one method: accepted arguments, effect and call count.
#[derive(Clone)]
pub struct Allowance(Rc<RefCell<AllowanceState>>);

struct AllowanceState {
    target: Rc<Target>,
    method_name: String,
    declared: DeclaredArgs,
    args_declared: bool,
    effect: Effect,
    is_async: bool,
    is_expectation: bool,
    counter: CallCountAccumulator,
    site: CreationSite,
}

impl Allowance {
    pub(crate) fn new(target: Rc<Target>, method_name: &str, site: CreationSite, is_expectation: bool) -> Self {
        let is_async = target.is_async(method_name);
        Self(Rc::new(RefCell::new(AllowanceState {
            target,
            method_name: method_name.to_owned(),
            declared: DeclaredArgs::Any,
            args_declared: false,
            effect: Effect::default(),
            is_async,
            is_expectation,
            counter: CallCountAccumulator::new(),
            site,
        })))
    }

    // ========================================================================
    // Argument declarations
    // ========================================================================

    /// Accepts only calls whose arguments match `pattern`.
    ///
    /// The pattern is verified against the real signature right away, so a stub that
    /// could never be called fails here rather than at the first call.
    pub fn with_args(self, pattern: impl Into<ArgPattern>) -> DoubleResult<Self> {
        let pattern = pattern.into();
        self.ensure_args_undeclared()?;
        {
            let state = self.0.borrow();
            verify_arguments(&state.target, &state.method_name, &pattern.shape())?;
        }
        self.declare(DeclaredArgs::Exact(pattern));
        Ok(self)
    }

    /// Accepts only calls without arguments.
    pub fn with_no_args(self) -> DoubleResult<Self> {
        self.with_args(ArgPattern::new())
    }

    /// Accepts calls for which `predicate` returns true.
    pub fn with_custom_matcher(
        self,
        name: impl Into<String>,
        predicate: impl Fn(&Args) -> bool + 'static,
    ) -> DoubleResult<Self> {
        self.ensure_args_undeclared()?;
        self.declare(DeclaredArgs::Custom(ArgsPredicate::new(name, predicate)));
        Ok(self)
    }

    fn ensure_args_undeclared(&self) -> DoubleResult<()> {
        let state = self.0.borrow();
        if state.args_declared {
            return Err(DoubleError::ArgumentsRedeclared(state.method_name.clone()));
        }
        Ok(())
    }

    fn declare(&self, declared: DeclaredArgs) {
        let mut state = self.0.borrow_mut();
        state.declared = declared;
        state.args_declared = true;
    }

    // ========================================================================
    // Effects
    // ========================================================================

    /// Every matching call returns `value`.
    pub fn and_return(self, value: impl Into<Value>) -> Self {
        self.set_effect(Effect::Return {
            values: vec![value.into()],
            served: 0,
        });
        self
    }

    /// Matching calls return the values in order; once exhausted the last one repeats.
    pub fn and_return_values<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> DoubleResult<Self> {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Err(DoubleError::EmptyReturn);
        }
        self.set_effect(Effect::Return { values, served: 0 });
        Ok(self)
    }

    /// Every matching call returns the result of `f` applied to the actual arguments.
    ///
    /// For an async method the function runs when the returned coroutine is awaited.
    pub fn and_return_computed(self, f: impl Fn(&Args) -> DoubleResult<Value> + 'static) -> Self {
        self.set_effect(Effect::Computed(Rc::new(f)));
        self
    }

    /// Every matching call returns a coroutine driving the future `f` produces.
    pub fn and_return_async<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Args) -> Fut + 'static,
        Fut: Future<Output = DoubleResult<Value>> + 'static,
    {
        let f = move |args: Args| -> LocalFuture { Box::pin(f(args)) };
        self.set_effect(Effect::ComputedAsync(Rc::new(f)));
        self
    }

    /// Every matching call raises `exception` (when awaited, for async methods).
    pub fn and_raise(self, exception: Exception) -> Self {
        self.set_effect(Effect::Raise(exception));
        self
    }

    fn set_effect(&self, effect: Effect) {
        self.0.borrow_mut().effect = effect;
    }

    // ========================================================================
    // Call-count policy
    // ========================================================================

    pub fn exactly<N: TryInto<usize>>(self, n: N) -> DoubleResult<Self> {
        let n = count("exactly", n)?;
        self.0.borrow_mut().counter.set_exact(n);
        Ok(self)
    }

    pub fn at_least<N: TryInto<usize>>(self, n: N) -> DoubleResult<Self> {
        let n = count("at_least", n)?;
        self.0.borrow_mut().counter.set_minimum(n);
        Ok(self)
    }

    pub fn at_most<N: TryInto<usize>>(self, n: N) -> DoubleResult<Self> {
        let n = count("at_most", n)?;
        self.0.borrow_mut().counter.set_maximum(n);
        Ok(self)
    }

    /// Any matching call fails immediately.
    pub fn never(self) -> Self {
        self.0.borrow_mut().counter.set_exact(0);
        self
    }

    pub fn once(self) -> Self {
        self.0.borrow_mut().counter.set_exact(1);
        self
    }

    pub fn twice(self) -> Self {
        self.0.borrow_mut().counter.set_exact(2);
        self
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    #[must_use]
    pub fn method_name(&self) -> String {
        self.0.borrow().method_name.clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.0.borrow().counter.count()
    }

    /// Whether calls return coroutines; decided from the real attribute when created.
    #[must_use]
    pub fn is_async(&self) -> bool {
        self.0.borrow().is_async
    }

    #[must_use]
    pub fn is_expectation(&self) -> bool {
        self.0.borrow().is_expectation
    }

    #[must_use]
    pub fn creation_site(&self) -> CreationSite {
        self.0.borrow().site
    }

    /// Stubs are always satisfied; bounded rules and expectations only when called
    /// as declared.
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        let state = self.0.borrow();
        if state.counter.is_bounded() {
            state.counter.has_correct_call_count()
        } else if state.is_expectation {
            state.counter.count() > 0
        } else {
            true
        }
    }

    /// Describes the accepted arguments: `any args`, `(1, 'a')` or `custom matcher: 'name'`.
    #[must_use]
    pub fn expected_argument_string(&self) -> String {
        match &self.0.borrow().declared {
            DeclaredArgs::Any => "any args".to_owned(),
            DeclaredArgs::Exact(pattern) => pattern.to_string(),
            DeclaredArgs::Custom(predicate) => format!("custom matcher: '{}'", predicate.name()),
        }
    }

    /// The `MockExpectation` error describing how this rule's count went wrong.
    #[must_use]
    pub fn failure(&self) -> DoubleError {
        let state = self.0.borrow();
        let prefix = if state.is_expectation { "Expected" } else { "Allowed" };
        let error_string = if !state.counter.is_bounded() && state.is_expectation {
            format!("at least 1 time instead of {} ", state.counter.count_string())
        } else {
            state.counter.error_string()
        };
        let subject = state.target.to_string();
        let method_name = state.method_name.clone();
        let site = state.site;
        drop(state);
        DoubleError::MockExpectation(format!(
            "{prefix} '{method_name}' to be called {error_string}on {subject} with {}, but was not. ({site})",
            self.expected_argument_string(),
        ))
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    pub(crate) fn accepts(&self, args: &Args) -> bool {
        let declared = self.0.borrow().declared.clone();
        match declared {
            DeclaredArgs::Any => true,
            DeclaredArgs::Exact(pattern) => pattern.matches(args),
            DeclaredArgs::Custom(predicate) => predicate.matches(args),
        }
    }

    /// Handles one call this allowance was chosen for.
    ///
    /// The actual arguments are verified against the real signature, then the call is
    /// counted (failing at once past the maximum), then the effect is produced.
    pub(crate) fn invoke(&self, args: Args) -> DoubleResult<Value> {
        {
            let state = self.0.borrow();
            verify_arguments(&state.target, &state.method_name, &args.shape())?;
        }

        let too_many = self.0.borrow_mut().counter.called().has_too_many_calls();
        if too_many {
            return Err(self.failure());
        }

        let (effect, is_async, name) = {
            let mut state = self.0.borrow_mut();
            let effect = match &mut state.effect {
                Effect::Return { values, served } => {
                    let value = values[(*served).min(values.len() - 1)].clone();
                    *served += 1;
                    Resolved::Value(value)
                }
                Effect::Computed(f) => Resolved::Computed(Rc::clone(f)),
                Effect::ComputedAsync(f) => Resolved::ComputedAsync(Rc::clone(f)),
                Effect::Raise(exception) => Resolved::Raise(exception.clone()),
            };
            (effect, state.is_async, state.method_name.clone())
        };

        match (effect, is_async) {
            (Resolved::ComputedAsync(f), _) => Ok(Value::Coroutine(Coroutine::new(name, f(args)))),
            (Resolved::Value(value), false) => Ok(value),
            (Resolved::Computed(f), false) => f(&args),
            (Resolved::Raise(exception), false) => Err(DoubleError::Raised(exception)),
            (Resolved::Value(value), true) => Ok(Value::Coroutine(Coroutine::new(name, async move { Ok(value) }))),
            (Resolved::Computed(f), true) => Ok(Value::Coroutine(Coroutine::new(name, async move { f(&args) }))),
            (Resolved::Raise(exception), true) => Ok(Value::Coroutine(Coroutine::new(name, async move {
                Err(DoubleError::Raised(exception))
            }))),
        }
    }
}

enum Resolved {
    Value(Value),
    Computed(Computed),
    ComputedAsync(ComputedAsync),
    Raise(Exception),
}

fn count<N: TryInto<usize>>(builder: &'static str, n: N) -> DoubleResult<usize> {
    n.try_into().map_err(|_| DoubleError::InvalidCount(builder))
}

impl fmt::Debug for Allowance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.borrow();
        f.debug_struct("Allowance")
            .field("method_name", &state.method_name)
            .field("declared", &state.declared)
            .field("is_async", &state.is_async)
            .field("is_expectation", &state.is_expectation)
            .field("counter", &state.counter)
            .field("site", &state.site)
            .finish_non_exhaustive()
    }
}
