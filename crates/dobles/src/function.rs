use std::{
    cell::RefCell,
    fmt,
    future::{Future, IntoFuture, ready},
    pin::Pin,
    rc::Rc,
};

use crate::{
    error::{DoubleError, DoubleResult, Exception},
    signature::Signature,
    value::{Args, Value},
};

/// The boxed, thread-local future behind a [`Coroutine`].
pub type LocalFuture = Pin<Box<dyn Future<Output = DoubleResult<Value>>>>;

type SyncBody = dyn Fn(Args) -> DoubleResult<Value>;
type AsyncBody = dyn Fn(Args) -> LocalFuture;

/// A callable of the object model.
///
/// A function carries its declared [`Signature`] (or none, for opaque builtins) and a
/// native body. Calling an async function returns a [`Value::Coroutine`] that the
/// caller awaits; the body only runs when awaited.
///
/// # Wrapping
///
/// `wrapped` links a function to the callable it decorates. Signature lookup follows
/// the link when the wrapper declares none, and async detection follows it always,
/// so a decorator around a coroutine function is still treated as async. Dispatchers
/// installed by a double wrap the attribute they replaced in the same way.
#[derive(Clone)]
pub struct Function(Rc<FunctionData>);

struct FunctionData {
    /// The function name (used for error messages and repr).
    name: String,
    /// Declared parameters; `None` means the callable exposes no signature.
    signature: Option<Signature>,
    body: Body,
    wrapped: Option<Function>,
    /// Set for call dispatchers installed by a double.
    dispatcher: bool,
}

enum Body {
    Sync(Box<SyncBody>),
    Async(Box<AsyncBody>),
}

impl Function {
    /// Creates a synchronous function with a declared signature.
    pub fn new(
        name: impl Into<String>,
        signature: Signature,
        body: impl Fn(Args) -> DoubleResult<Value> + 'static,
    ) -> Self {
        Self::from_data(name.into(), Some(signature), Body::Sync(Box::new(body)), None, false)
    }

    /// Creates a synchronous function from parameter-list text such as `"self, name"`.
    pub fn with_params(
        name: impl Into<String>,
        params: &str,
        body: impl Fn(Args) -> DoubleResult<Value> + 'static,
    ) -> DoubleResult<Self> {
        Ok(Self::new(name, Signature::parse(params)?, body))
    }

    /// Creates a coroutine function: calling it returns a [`Coroutine`] to await.
    pub fn new_async<F, Fut>(name: impl Into<String>, signature: Signature, body: F) -> Self
    where
        F: Fn(Args) -> Fut + 'static,
        Fut: Future<Output = DoubleResult<Value>> + 'static,
    {
        let body = move |args: Args| -> LocalFuture { Box::pin(body(args)) };
        Self::from_data(name.into(), Some(signature), Body::Async(Box::new(body)), None, false)
    }

    /// Creates a natively implemented function that exposes no signature.
    ///
    /// Such functions cannot be verified: doubling them surfaces an unverifiable
    /// builtin mismatch unless builtin verification is switched off.
    pub fn builtin(name: impl Into<String>, body: impl Fn(Args) -> DoubleResult<Value> + 'static) -> Self {
        Self::from_data(name.into(), None, Body::Sync(Box::new(body)), None, false)
    }

    /// Creates a decorator around `inner`, keeping its name and signature.
    ///
    /// `body` receives the wrapped function and the call arguments.
    pub fn wraps(inner: &Self, body: impl Fn(&Self, Args) -> DoubleResult<Value> + 'static) -> Self {
        let target = inner.clone();
        let body = move |args: Args| body(&target, args);
        Self::from_data(inner.name().to_owned(), None, Body::Sync(Box::new(body)), Some(inner.clone()), false)
    }

    pub(crate) fn dispatcher(
        name: &str,
        original: Option<Self>,
        body: impl Fn(Args) -> DoubleResult<Value> + 'static,
    ) -> Self {
        Self::from_data(name.to_owned(), None, Body::Sync(Box::new(body)), original, true)
    }

    fn from_data(
        name: String,
        signature: Option<Signature>,
        body: Body,
        wrapped: Option<Self>,
        dispatcher: bool,
    ) -> Self {
        Self(Rc::new(FunctionData {
            name,
            signature,
            body,
            wrapped,
            dispatcher,
        }))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// The signature this function declares itself, ignoring anything it wraps.
    #[must_use]
    pub fn own_signature(&self) -> Option<&Signature> {
        self.0.signature.as_ref()
    }

    /// The signature callers see: the declared one, else the one of the wrapped callable.
    #[must_use]
    pub fn signature(&self) -> Option<&Signature> {
        match &self.0.signature {
            Some(signature) => Some(signature),
            None => self.0.wrapped.as_ref().and_then(Self::signature),
        }
    }

    #[must_use]
    pub fn wrapped(&self) -> Option<&Self> {
        self.0.wrapped.as_ref()
    }

    /// Whether the function, or anything it wraps, is a coroutine function.
    #[must_use]
    pub fn is_async(&self) -> bool {
        matches!(self.0.body, Body::Async(_)) || self.0.wrapped.as_ref().is_some_and(Self::is_async)
    }

    #[must_use]
    pub fn is_dispatcher(&self) -> bool {
        self.0.dispatcher
    }

    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.0).addr()
    }

    /// Calls the function, checking the arguments against its own signature first.
    pub fn call(&self, args: Args) -> DoubleResult<Value> {
        if let Some(signature) = &self.0.signature {
            signature
                .bind(&args.shape())
                .map_err(|message| Exception::new("TypeError", format!("{}() {message}", self.0.name)))?;
        }
        match &self.0.body {
            Body::Sync(body) => body(args),
            Body::Async(body) => Ok(Value::Coroutine(Coroutine::from_boxed(&self.0.name, body(args)))),
        }
    }

    /// Returns this function bound to `receiver`: the receiver is passed as the first argument.
    #[must_use]
    pub fn bind(&self, receiver: Value) -> Self {
        let target = self.clone();
        let body = move |args: Args| target.call(args.prepend(receiver.clone()));
        Self::from_data(
            self.0.name.clone(),
            self.signature().map(Signature::bound),
            Body::Sync(Box::new(body)),
            Some(self.clone()),
            false,
        )
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.0.name)
            .field("signature", &self.0.signature)
            .field("async", &self.is_async())
            .field("dispatcher", &self.0.dispatcher)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.0.name)
    }
}

// ============================================================================
// Coroutines
// ============================================================================

/// The pending result of an async call. It can be awaited exactly once.
#[derive(Clone)]
pub struct Coroutine(Rc<CoroutineData>);

struct CoroutineData {
    name: String,
    future: RefCell<Option<LocalFuture>>,
}

impl Coroutine {
    pub fn new(name: impl Into<String>, future: impl Future<Output = DoubleResult<Value>> + 'static) -> Self {
        let name: String = name.into();
        Self::from_boxed(&name, Box::pin(future))
    }

    fn from_boxed(name: &str, future: LocalFuture) -> Self {
        Self(Rc::new(CoroutineData {
            name: name.to_owned(),
            future: RefCell::new(Some(future)),
        }))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Whether the coroutine has already been handed out for awaiting.
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.0.future.borrow().is_none()
    }

    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.0).addr()
    }
}

impl IntoFuture for Coroutine {
    type Output = DoubleResult<Value>;
    type IntoFuture = LocalFuture;

    fn into_future(self) -> Self::IntoFuture {
        match self.0.future.borrow_mut().take() {
            Some(future) => future,
            None => Box::pin(ready(Err(DoubleError::Raised(Exception::new(
                "RuntimeError",
                "cannot reuse already awaited coroutine",
            ))))),
        }
    }
}

impl fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coroutine")
            .field("name", &self.0.name)
            .field("consumed", &self.is_consumed())
            .finish()
    }
}
