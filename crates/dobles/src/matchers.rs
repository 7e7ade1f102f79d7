//! Argument matchers for declared allowance arguments.
//!
//! A declared argument is either a plain value compared by equality or a
//! [`ValueMatcher`] that decides for itself. Matchers are a separate variant rather
//! than values with a custom equality, so matching is never asymmetric by accident.

use std::{fmt, rc::Rc};

use indexmap::IndexMap;

use crate::{
    object::Class,
    signature::CallShape,
    value::{Args, Value},
};

/// A named predicate over a single argument.
#[derive(Clone)]
pub struct ValueMatcher {
    name: String,
    predicate: Rc<dyn Fn(&Value) -> bool>,
}

impl ValueMatcher {
    pub fn new(name: impl Into<String>, predicate: impl Fn(&Value) -> bool + 'static) -> Self {
        Self {
            name: name.into(),
            predicate: Rc::new(predicate),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn matches(&self, value: &Value) -> bool {
        (self.predicate)(value)
    }
}

impl fmt::Debug for ValueMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ValueMatcher").field(&self.name).finish()
    }
}

impl fmt::Display for ValueMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Matches every value.
#[must_use]
pub fn any() -> ValueMatcher {
    ValueMatcher::new("ANY", |_| true)
}

/// Matches instances of `class` or of a subclass.
#[must_use]
pub fn instance_of(class: &Class) -> ValueMatcher {
    let class = class.clone();
    ValueMatcher::new(format!("<instance of {}>", class.qualified_name()), move |value| {
        matches!(value, Value::Instance(i) if i.class().is_subclass_of(&class))
    })
}

/// Matches values accepted by `predicate`.
pub fn predicate(name: impl Into<String>, predicate: impl Fn(&Value) -> bool + 'static) -> ValueMatcher {
    ValueMatcher::new(name, predicate)
}

/// One declared argument.
#[derive(Debug, Clone)]
pub enum ArgMatcher {
    Equals(Value),
    Matches(ValueMatcher),
}

impl ArgMatcher {
    #[must_use]
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Equals(expected) => expected == value,
            Self::Matches(matcher) => matcher.matches(value),
        }
    }
}

impl fmt::Display for ArgMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(value) => f.write_str(&value.repr()),
            Self::Matches(matcher) => fmt::Display::fmt(matcher, f),
        }
    }
}

impl<T: Into<Value>> From<T> for ArgMatcher {
    fn from(value: T) -> Self {
        Self::Equals(value.into())
    }
}

impl From<ValueMatcher> for ArgMatcher {
    fn from(matcher: ValueMatcher) -> Self {
        Self::Matches(matcher)
    }
}

/// The exact arguments an allowance accepts.
///
/// A call matches when it has the same number of positional and keyword arguments
/// and every declared matcher accepts the corresponding actual argument.
#[derive(Debug, Clone, Default)]
pub struct ArgPattern {
    positional: Vec<ArgMatcher>,
    keywords: IndexMap<String, ArgMatcher>,
}

impl ArgPattern {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn arg(mut self, matcher: impl Into<ArgMatcher>) -> Self {
        self.positional.push(matcher.into());
        self
    }

    #[must_use]
    pub fn kwarg(mut self, name: impl Into<String>, matcher: impl Into<ArgMatcher>) -> Self {
        self.keywords.insert(name.into(), matcher.into());
        self
    }

    #[must_use]
    pub fn matches(&self, args: &Args) -> bool {
        if self.positional.len() != args.positional().len() || self.keywords.len() != args.keywords().len() {
            return false;
        }
        self.positional
            .iter()
            .zip(args.positional())
            .all(|(matcher, value)| matcher.matches(value))
            && self
                .keywords
                .iter()
                .all(|(name, matcher)| args.keyword(name).is_some_and(|value| matcher.matches(value)))
    }

    #[must_use]
    pub fn shape(&self) -> CallShape {
        CallShape::new(self.positional.len(), self.keywords.keys().cloned())
    }
}

impl From<Args> for ArgPattern {
    fn from(args: Args) -> Self {
        Self {
            positional: args.positional().iter().cloned().map(ArgMatcher::Equals).collect(),
            keywords: args
                .keywords()
                .iter()
                .map(|(k, v)| (k.clone(), ArgMatcher::Equals(v.clone())))
                .collect(),
        }
    }
}

impl fmt::Display for ArgPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .positional
            .iter()
            .map(ToString::to_string)
            .chain(self.keywords.iter().map(|(k, m)| format!("{k}={m}")))
            .collect();
        write!(f, "({})", parts.join(", "))
    }
}

/// A custom predicate over a whole call's arguments.
#[derive(Clone)]
pub struct ArgsPredicate {
    name: String,
    predicate: Rc<dyn Fn(&Args) -> bool>,
}

impl ArgsPredicate {
    pub fn new(name: impl Into<String>, predicate: impl Fn(&Args) -> bool + 'static) -> Self {
        Self {
            name: name.into(),
            predicate: Rc::new(predicate),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn matches(&self, args: &Args) -> bool {
        (self.predicate)(args)
    }
}

impl fmt::Debug for ArgsPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ArgsPredicate").field(&self.name).finish()
    }
}
