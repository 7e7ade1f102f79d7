//! Values of the dynamic object model and the argument lists passed to callables.
//!
//! Plain data (`None`, booleans, numbers, strings, tuples, lists, dicts) compares
//! structurally. Callables, classes, instances, modules and doubles are reference
//! types: they compare by identity, the way the code under test sees them.

use std::{
    fmt::{self, Write},
    future::{IntoFuture, ready},
};

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::{
    doubles::ObjectDouble,
    error::{DoubleError, DoubleResult},
    function::{Coroutine, Function, LocalFuture},
    object::{Class, Instance, Module},
    signature::CallShape,
};

/// A value that flows through doubled code: arguments, return values and attributes.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Tuple(Vec<Value>),
    List(Vec<Value>),
    /// A string-keyed mapping, insertion ordered.
    Dict(IndexMap<String, Value>),
    Function(Function),
    /// The pending result of calling an async callable.
    Coroutine(Coroutine),
    Class(Class),
    Instance(Instance),
    Module(Module),
    Double(ObjectDouble),
}

impl Value {
    /// Returns the Python-style representation, e.g. `'abc'`, `(1,)` or `<class 'm.User'>`.
    #[must_use]
    pub fn repr(&self) -> String {
        let mut s = String::new();
        // writing into a String never fails
        let _ = self.repr_fmt(&mut s);
        s
    }

    fn repr_fmt(&self, f: &mut impl Write) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => {
                let s = v.to_string();
                f.write_str(&s)?;
                if !s.contains('.') && v.is_finite() {
                    f.write_str(".0")?;
                }
                Ok(())
            }
            Self::Str(s) => string_repr_fmt(s, f),
            Self::Tuple(t) => {
                f.write_char('(')?;
                write_items(t, f)?;
                if t.len() == 1 {
                    f.write_char(',')?;
                }
                f.write_char(')')
            }
            Self::List(l) => {
                f.write_char('[')?;
                write_items(l, f)?;
                f.write_char(']')
            }
            Self::Dict(d) => {
                f.write_char('{')?;
                let mut first = true;
                for (k, v) in d {
                    if !first {
                        f.write_str(", ")?;
                    }
                    first = false;
                    string_repr_fmt(k, f)?;
                    f.write_str(": ")?;
                    v.repr_fmt(f)?;
                }
                f.write_char('}')
            }
            Self::Function(func) => write!(f, "{func}"),
            Self::Coroutine(c) => write!(f, "<coroutine object {}>", c.name()),
            Self::Class(c) => write!(f, "{c}"),
            Self::Instance(i) => write!(f, "{i}"),
            Self::Module(m) => write!(f, "{m}"),
            Self::Double(d) => write!(f, "{d}"),
        }
    }

    /// Name of the value's type, as used in error messages.
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            Self::None => "NoneType".to_owned(),
            Self::Bool(_) => "bool".to_owned(),
            Self::Int(_) => "int".to_owned(),
            Self::Float(_) => "float".to_owned(),
            Self::Str(_) => "str".to_owned(),
            Self::Tuple(_) => "tuple".to_owned(),
            Self::List(_) => "list".to_owned(),
            Self::Dict(_) => "dict".to_owned(),
            Self::Function(_) => "function".to_owned(),
            Self::Coroutine(_) => "coroutine".to_owned(),
            Self::Class(_) => "type".to_owned(),
            Self::Instance(i) => i.class().name().to_owned(),
            Self::Module(_) => "module".to_owned(),
            Self::Double(d) => d.kind().to_string(),
        }
    }

    /// Identity of a reference value, `None` for plain data.
    pub(crate) fn identity(&self) -> Option<usize> {
        match self {
            Self::Function(f) => Some(f.id()),
            Self::Coroutine(c) => Some(c.id()),
            Self::Class(c) => Some(c.id()),
            Self::Instance(i) => Some(i.id()),
            Self::Module(m) => Some(m.id()),
            Self::Double(d) => Some(d.id()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Looks up an attribute, binding methods and evaluating properties.
    pub fn get_attr(&self, name: &str) -> DoubleResult<Self> {
        match self {
            Self::Instance(i) => i.get_attr(name),
            Self::Class(c) => c.get_attr(name),
            Self::Module(m) => m.get(name).ok_or_else(|| DoubleError::attribute(m.to_string(), name)),
            Self::Double(d) => d.get_attr(name),
            other => Err(DoubleError::attribute(other.repr(), name)),
        }
    }

    /// Calls the value: functions run, classes construct, instances dispatch `__call__`.
    pub fn call(&self, args: Args) -> DoubleResult<Self> {
        match self {
            Self::Function(f) => f.call(args),
            Self::Class(c) => c.instantiate(args).map(Self::Instance),
            Self::Instance(i) => i.call_protocol("__call__", args),
            Self::Double(d) => d.invoke(args),
            other => Err(DoubleError::NotCallable(format!("'{}' object", other.type_name()))),
        }
    }

    /// Shorthand for `get_attr(name)?.call(args)`, with doubles dispatching their stubs.
    pub fn call_method(&self, name: &str, args: Args) -> DoubleResult<Self> {
        match self {
            Self::Double(d) => d.call(name, args),
            Self::Instance(i) => i.call_method(name, args),
            _ => self.get_attr(name)?.call(args),
        }
    }

    /// Whether calling this value is possible at all.
    #[must_use]
    pub fn is_callable(&self) -> bool {
        match self {
            Self::Function(_) | Self::Class(_) | Self::Double(_) => true,
            Self::Instance(i) => i.class().lookup("__call__").is_some(),
            _ => false,
        }
    }
}

fn write_items(items: &[Value], f: &mut impl Write) -> fmt::Result {
    let mut iter = items.iter();
    if let Some(first) = iter.next() {
        first.repr_fmt(f)?;
        for item in iter {
            f.write_str(", ")?;
            item.repr_fmt(f)?;
        }
    }
    Ok(())
}

/// Writes a string literal the way the host quotes it: single quotes unless the
/// string contains a single quote and no double quote.
fn string_repr_fmt(s: &str, f: &mut impl Write) -> fmt::Result {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    f.write_char(quote)?;
    for c in s.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if c == quote => {
                f.write_char('\\')?;
                f.write_char(c)?;
            }
            c => f.write_char(c)?,
        }
    }
    f.write_char(quote)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            _ => self.repr_fmt(f),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => int_eq_float(*a, *b),
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Tuple(a), Self::Tuple(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Dict(a), Self::Dict(b)) => a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v)),
            _ => match (self.identity(), other.identity()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

#[expect(clippy::cast_precision_loss, reason = "mirrors numeric promotion")]
fn int_eq_float(a: i64, b: f64) -> bool {
    a as f64 == b
}

// ============================================================================
// Conversions
// ============================================================================

impl From<()> for Value {
    fn from((): ()) -> Self {
        Self::None
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

macro_rules! from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Self::Int(i64::from(v))
                }
            }
        )*
    };
}

from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<Self>> for Value {
    fn from(v: Vec<Self>) -> Self {
        Self::List(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::None, Into::into)
    }
}

impl From<Function> for Value {
    fn from(v: Function) -> Self {
        Self::Function(v)
    }
}

impl From<Coroutine> for Value {
    fn from(v: Coroutine) -> Self {
        Self::Coroutine(v)
    }
}

impl From<Class> for Value {
    fn from(v: Class) -> Self {
        Self::Class(v)
    }
}

impl From<Instance> for Value {
    fn from(v: Instance) -> Self {
        Self::Instance(v)
    }
}

impl From<Module> for Value {
    fn from(v: Module) -> Self {
        Self::Module(v)
    }
}

impl From<ObjectDouble> for Value {
    fn from(v: ObjectDouble) -> Self {
        Self::Double(v)
    }
}

impl From<&Self> for Value {
    fn from(v: &Self) -> Self {
        v.clone()
    }
}

/// Awaiting a value awaits the coroutine it holds; anything else is not awaitable.
impl IntoFuture for Value {
    type Output = DoubleResult<Self>;
    type IntoFuture = LocalFuture;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Self::Coroutine(c) => c.into_future(),
            other => Box::pin(ready(Err(DoubleError::NotAwaitable(other.type_name())))),
        }
    }
}

// ============================================================================
// Arguments
// ============================================================================

/// Positional and keyword arguments of one call.
///
/// Build with the [`args!`](crate::args) macro: `args!(1, "a"; key = 2)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    positional: SmallVec<[Value; 4]>,
    keywords: IndexMap<String, Value>,
}

impl Args {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_positional(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            positional: values.into_iter().collect(),
            keywords: IndexMap::new(),
        }
    }

    /// Appends a positional argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Sets a keyword argument, replacing an earlier one of the same name.
    #[must_use]
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keywords.insert(name.into(), value.into());
        self
    }

    /// Returns the arguments with `receiver` inserted as the first positional.
    #[must_use]
    pub fn prepend(mut self, receiver: Value) -> Self {
        self.positional.insert(0, receiver);
        self
    }

    /// Drops the first positional argument, if any.
    #[must_use]
    pub fn without_receiver(mut self) -> Self {
        if !self.positional.is_empty() {
            self.positional.remove(0);
        }
        self
    }

    #[must_use]
    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    #[must_use]
    pub fn keywords(&self) -> &IndexMap<String, Value> {
        &self.keywords
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    #[must_use]
    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keywords.get(name)
    }

    /// Looks up a parameter passed either positionally at `index` or by keyword.
    #[must_use]
    pub fn param(&self, index: usize, name: &str) -> Option<&Value> {
        self.get(index).or_else(|| self.keyword(name))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.positional.len() + self.keywords.len()
    }

    #[must_use]
    pub fn shape(&self) -> CallShape {
        CallShape::new(self.positional.len(), self.keywords.keys().cloned())
    }
}

/// Formats as the host would print a call's arguments: `(1, 'a', key=2)`.
impl fmt::Display for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .positional
            .iter()
            .map(Value::repr)
            .chain(self.keywords.iter().map(|(k, v)| format!("{k}={}", v.repr())))
            .collect();
        write!(f, "({})", parts.join(", "))
    }
}

/// Builds an [`Args`]: positional values first, then `; name = value` keywords.
///
/// ```
/// use dobles::{args, Value};
///
/// let a = args!(1, "two"; three = 3.0);
/// assert_eq!(a.get(1), Some(&Value::from("two")));
/// assert_eq!(a.to_string(), "(1, 'two', three=3.0)");
/// ```
#[macro_export]
macro_rules! args {
    () => {
        $crate::Args::new()
    };
    ($($arg:expr),* $(,)? $(; $($key:ident = $val:expr),* $(,)?)?) => {
        $crate::Args::new()
            $(.arg($arg))*
            $($(.kwarg(stringify!($key), $val))*)?
    };
}
