//! Declared callable signatures and the argument-binding check.
//!
//! A signature records every parameter group a callable can declare:
//! positional-only, positional-or-keyword, `*args`, keyword-only and `**kwargs`,
//! plus which parameters carry defaults. Doubles never execute the real callable
//! while verifying, so binding here only answers "would these arguments bind?" and
//! produces the same failure messages as native parameter binding.
//!
//! Signatures are usually written as parameter-list text:
//!
//! ```
//! use dobles::Signature;
//!
//! let sig: Signature = "self, name, greeting='hi', /, *rest, loud=False, **extra".parse().unwrap();
//! assert_eq!(sig.to_string(), "(self, name, greeting=..., /, *rest, loud=..., **extra)");
//! ```

use std::{fmt, str::FromStr};

use crate::error::{DoubleError, DoubleResult};

/// Represents a callable signature with all parameter types.
///
/// # Default Values
///
/// Defaults are tracked by count per parameter group. The `*_defaults_count` fields
/// indicate how many parameters (from the end of each group) have defaults. For example,
/// if `args = [a, b, c]` and `arg_defaults_count = 2`, then `b` and `c` have defaults.
/// Keyword-only parameters may carry defaults in any order, so they keep one flag each.
///
/// Only the structure is recorded: default *values* belong to the real callable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    /// Positional-only parameters, e.g. `a, b` in `def f(a, b, /): ...`
    pos_args: Option<Vec<String>>,

    /// Number of positional-only parameters with defaults (from the end).
    pos_defaults_count: usize,

    /// Positional-or-keyword parameters, e.g. `a, b` in `def f(a, b): ...`
    args: Option<Vec<String>>,

    /// Number of positional-or-keyword parameters with defaults (from the end).
    arg_defaults_count: usize,

    /// Variable positional parameter name, e.g. `args` in `def f(*args): ...`
    var_args: Option<String>,

    /// Keyword-only parameters, e.g. `c` in `def f(*, c): ...` or `def f(*args, c): ...`
    kwargs: Option<Vec<String>>,

    /// Whether each keyword-only parameter has a default, index-aligned with `kwargs`.
    kwarg_default_map: Option<Vec<bool>>,

    /// Variable keyword parameter name, e.g. `kwargs` in `def f(**kwargs): ...`
    var_kwargs: Option<String>,

    /// How simple the signature is, used for a fast path when binding.
    bind_mode: BindMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum BindMode {
    /// No defaults, no positional-only, no `*args`/`**kwargs`, no keyword-only params.
    ///
    /// Purely positional calls to such a signature bind iff the count matches exactly.
    #[default]
    Simple,
    Complex,
}

/// The shape of a call: how many positional arguments and which keyword names.
///
/// Values are irrelevant to binding, so verification works on shapes. This lets
/// declared argument patterns (which may hold matchers rather than values) and
/// actual call arguments go through the same check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallShape {
    positional: usize,
    keywords: Vec<String>,
}

impl CallShape {
    #[must_use]
    pub fn new(positional: usize, keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            positional,
            keywords: keywords.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the same shape with an implicit receiver (`self`/`cls`) in front.
    #[must_use]
    pub fn with_receiver(mut self) -> Self {
        self.positional += 1;
        self
    }

    #[must_use]
    pub fn positional(&self) -> usize {
        self.positional
    }

    #[must_use]
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positional == 0 && self.keywords.is_empty()
    }
}

impl Signature {
    /// Creates a full signature with all parameter types. Callers outside the crate go
    /// through [`Signature::parse`], which guarantees the default counts fit.
    ///
    /// # Arguments
    /// * `pos_args` - Positional-only parameter names
    /// * `pos_defaults_count` - Number of pos_args with defaults (from end)
    /// * `args` - Positional-or-keyword parameter names
    /// * `arg_defaults_count` - Number of args with defaults (from end)
    /// * `var_args` - Variable positional parameter name (*args)
    /// * `kwargs` - Keyword-only parameter names
    /// * `kwarg_default_map` - Whether each keyword-only parameter has a default
    /// * `var_kwargs` - Variable keyword parameter name (**kwargs)
    #[expect(clippy::too_many_arguments, reason = "one argument per parameter group")]
    #[must_use]
    pub(crate) fn new(
        pos_args: Vec<String>,
        pos_defaults_count: usize,
        args: Vec<String>,
        arg_defaults_count: usize,
        var_args: Option<String>,
        kwargs: Vec<String>,
        kwarg_default_map: Vec<bool>,
        var_kwargs: Option<String>,
    ) -> Self {
        debug_assert!(pos_defaults_count <= pos_args.len());
        debug_assert!(arg_defaults_count <= args.len());
        debug_assert!(pos_defaults_count == 0 || arg_defaults_count == args.len());
        debug_assert_eq!(kwargs.len(), kwarg_default_map.len());
        let pos_args = if pos_args.is_empty() { None } else { Some(pos_args) };
        let has_kwonly = !kwargs.is_empty();
        let kwargs = if has_kwonly { Some(kwargs) } else { None };

        let bind_mode = if pos_args.is_none()
            && pos_defaults_count == 0
            && arg_defaults_count == 0
            && var_args.is_none()
            && kwargs.is_none()
            && var_kwargs.is_none()
        {
            BindMode::Simple
        } else {
            BindMode::Complex
        };

        Self {
            pos_args,
            pos_defaults_count,
            args: if args.is_empty() { None } else { Some(args) },
            arg_defaults_count,
            var_args,
            kwargs,
            kwarg_default_map: if has_kwonly { Some(kwarg_default_map) } else { None },
            var_kwargs,
            bind_mode,
        }
    }

    /// A signature that takes no parameters at all.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A signature that accepts anything: `(*args, **kwargs)`.
    #[must_use]
    pub fn variadic() -> Self {
        Self::new(
            Vec::new(),
            0,
            Vec::new(),
            0,
            Some("args".to_owned()),
            Vec::new(),
            Vec::new(),
            Some("kwargs".to_owned()),
        )
    }

    /// Parses a parameter list such as `"self, a, b=1, /, c, *args, d, **kw"`.
    ///
    /// Annotations (`a: int`) are accepted and ignored; default expressions are
    /// recorded only as "has a default".
    pub fn parse(source: &str) -> DoubleResult<Self> {
        SignatureParser::new(source).parse()
    }

    /// Returns the signature as seen through a bound receiver: the first positional
    /// parameter is consumed. A signature whose first positional slot is `*args`
    /// keeps absorbing the receiver and is returned unchanged.
    #[must_use]
    pub fn bound(&self) -> Self {
        let mut pos_args = self.pos_args.clone().unwrap_or_default();
        let mut args = self.args.clone().unwrap_or_default();
        let mut pos_defaults_count = self.pos_defaults_count;
        let mut arg_defaults_count = self.arg_defaults_count;

        if !pos_args.is_empty() {
            if pos_defaults_count == pos_args.len() {
                pos_defaults_count -= 1;
            }
            pos_args.remove(0);
        } else if !args.is_empty() {
            if arg_defaults_count == args.len() {
                arg_defaults_count -= 1;
            }
            args.remove(0);
        } else {
            return self.clone();
        }

        Self::new(
            pos_args,
            pos_defaults_count,
            args,
            arg_defaults_count,
            self.var_args.clone(),
            self.kwargs.clone().unwrap_or_default(),
            self.kwarg_default_map.clone().unwrap_or_default(),
            self.var_kwargs.clone(),
        )
    }

    /// Checks whether a call of the given shape binds to this signature.
    ///
    /// The binding follows native parameter binding:
    /// 1. Bind positional args to pos_args, then args (in order)
    /// 2. Excess positional args go to `*args`, or fail
    /// 3. Bind keyword args to args and kwargs (never to pos_args)
    /// 4. Excess keyword args go to `**kwargs`, or fail
    /// 5. Every parameter without a default must have been bound
    ///
    /// # Errors
    /// Returns the binding failure message:
    /// - `too many positional arguments`
    /// - `multiple values for argument 'x'`
    /// - `'x' parameter is positional only, but was passed as a keyword`
    /// - `missing a required argument: 'x'`
    /// - `got an unexpected keyword argument 'x'`
    pub fn bind(&self, shape: &CallShape) -> Result<(), String> {
        if self.bind_mode == BindMode::Simple && shape.keywords.is_empty() {
            let param_count = self.arg_count();
            return match shape.positional.cmp(&param_count) {
                std::cmp::Ordering::Equal => Ok(()),
                std::cmp::Ordering::Greater => Err("too many positional arguments".to_owned()),
                std::cmp::Ordering::Less => Err(missing(&self.positional_names()[shape.positional])),
            };
        }

        let positional_names = self.positional_names();
        let pos_param_count = self.pos_arg_count();

        // 1 + 2: consume positional arguments
        let bound_positionally = shape.positional.min(positional_names.len());
        if shape.positional > positional_names.len() && self.var_args.is_none() {
            return Err("too many positional arguments".to_owned());
        }
        for (i, name) in positional_names.iter().enumerate().take(bound_positionally) {
            if i >= pos_param_count && shape.keywords.iter().any(|k| k == *name) {
                return Err(format!("multiple values for argument '{name}'"));
            }
        }

        // 3: remaining named parameters, in declaration order
        let mut consumed = vec![false; shape.keywords.len()];
        let mut take_keyword = |name: &str| {
            let found = shape.keywords.iter().position(|k| k == name);
            if let Some(i) = found {
                consumed[i] = true;
            }
            found.is_some()
        };

        for (i, name) in positional_names.iter().enumerate().skip(bound_positionally) {
            let has_default = self.positional_has_default(i);
            if i < pos_param_count {
                if self.var_kwargs.is_none() && shape.keywords.iter().any(|k| k == *name) {
                    return Err(format!("'{name}' parameter is positional only, but was passed as a keyword"));
                }
                if !has_default {
                    return Err(missing(name));
                }
            } else if !take_keyword(name.as_str()) && !has_default {
                return Err(missing(name));
            }
        }

        if let Some(kwargs) = &self.kwargs {
            for (i, name) in kwargs.iter().enumerate() {
                let has_default = self.kwarg_default_map.as_ref().is_some_and(|m| m[i]);
                if !take_keyword(name.as_str()) && !has_default {
                    return Err(missing(name));
                }
            }
        }

        // 4: leftovers
        if self.var_kwargs.is_none()
            && let Some(i) = consumed.iter().position(|c| !c)
        {
            let name = &shape.keywords[i];
            // a positional-or-keyword parameter bound positionally was already reported above,
            // so anything left here is genuinely unknown
            return Err(format!("got an unexpected keyword argument '{name}'"));
        }

        Ok(())
    }

    /// Returns the total number of named parameters (excluding *args/**kwargs slots).
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.pos_arg_count() + self.arg_count() + self.kwarg_count()
    }

    #[must_use]
    pub fn accepts_var_args(&self) -> bool {
        self.var_args.is_some()
    }

    #[must_use]
    pub fn accepts_var_kwargs(&self) -> bool {
        self.var_kwargs.is_some()
    }

    /// Returns the minimum number of positional arguments required.
    #[must_use]
    pub fn required_positional_count(&self) -> usize {
        self.pos_arg_count() + self.arg_count() - self.pos_defaults_count - self.arg_defaults_count
    }

    fn positional_has_default(&self, index: usize) -> bool {
        let pos = self.pos_arg_count();
        if index < pos {
            index >= pos - self.pos_defaults_count
        } else {
            index - pos >= self.arg_count() - self.arg_defaults_count
        }
    }

    fn positional_names(&self) -> Vec<&String> {
        self.pos_args.iter().flatten().chain(self.args.iter().flatten()).collect()
    }

    /// Returns the number of positional-only parameters.
    fn pos_arg_count(&self) -> usize {
        self.pos_args.as_ref().map_or(0, Vec::len)
    }

    /// Returns the number of positional-or-keyword parameters.
    fn arg_count(&self) -> usize {
        self.args.as_ref().map_or(0, Vec::len)
    }

    /// Returns the number of keyword-only parameters.
    fn kwarg_count(&self) -> usize {
        self.kwargs.as_ref().map_or(0, Vec::len)
    }
}

fn missing(name: &str) -> String {
    format!("missing a required argument: '{name}'")
}

impl FromStr for Signature {
    type Err = DoubleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        let pos = self.pos_arg_count();
        for (i, name) in self.positional_names().into_iter().enumerate() {
            if self.positional_has_default(i) {
                parts.push(format!("{name}=..."));
            } else {
                parts.push(name.clone());
            }
            if pos > 0 && i + 1 == pos {
                parts.push("/".to_owned());
            }
        }
        match &self.var_args {
            Some(name) => parts.push(format!("*{name}")),
            None if self.kwargs.is_some() => parts.push("*".to_owned()),
            None => {}
        }
        if let (Some(kwargs), Some(defaults)) = (&self.kwargs, &self.kwarg_default_map) {
            for (name, has_default) in kwargs.iter().zip(defaults) {
                if *has_default {
                    parts.push(format!("{name}=..."));
                } else {
                    parts.push(name.clone());
                }
            }
        }
        if let Some(name) = &self.var_kwargs {
            parts.push(format!("**{name}"));
        }
        write!(f, "({})", parts.join(", "))
    }
}

// ============================================================================
// Parameter-list parser
// ============================================================================

struct SignatureParser<'a> {
    source: &'a str,
    pos_args: Vec<String>,
    pos_defaults_count: usize,
    args: Vec<(String, bool)>,
    var_args: Option<String>,
    kwargs: Vec<String>,
    kwarg_defaults: Vec<bool>,
    var_kwargs: Option<String>,
    keyword_only: bool,
}

impl<'a> SignatureParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            pos_args: Vec::new(),
            pos_defaults_count: 0,
            args: Vec::new(),
            var_args: None,
            kwargs: Vec::new(),
            kwarg_defaults: Vec::new(),
            var_kwargs: None,
            keyword_only: false,
        }
    }

    fn error(&self, reason: impl Into<String>) -> DoubleError {
        DoubleError::InvalidSignature {
            source_text: self.source.to_owned(),
            reason: reason.into(),
        }
    }

    fn parse(mut self) -> DoubleResult<Signature> {
        let source = self.source.trim();
        let source = source
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .unwrap_or(source);

        for token in split_top_level(source) {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            if self.var_kwargs.is_some() {
                return Err(self.error("parameter after **kwargs"));
            }
            self.push_token(token)?;
        }

        let mut seen: Vec<&str> = Vec::new();
        let all_names = self
            .pos_args
            .iter()
            .map(String::as_str)
            .chain(self.args.iter().map(|(n, _)| n.as_str()))
            .chain(self.var_args.as_deref())
            .chain(self.kwargs.iter().map(String::as_str))
            .chain(self.var_kwargs.as_deref());
        for name in all_names {
            if seen.contains(&name) {
                return Err(self.error(format!("duplicate parameter '{name}'")));
            }
            seen.push(name);
        }

        let arg_defaults_count = self.args.iter().filter(|(_, d)| *d).count();
        Ok(Signature::new(
            self.pos_args,
            self.pos_defaults_count,
            self.args.into_iter().map(|(n, _)| n).collect(),
            arg_defaults_count,
            self.var_args,
            self.kwargs,
            self.kwarg_defaults,
            self.var_kwargs,
        ))
    }

    fn push_token(&mut self, token: &str) -> DoubleResult<()> {
        if token == "/" {
            if self.keyword_only || !self.pos_args.is_empty() || self.args.is_empty() {
                return Err(self.error("misplaced '/'"));
            }
            self.pos_defaults_count = self.args.iter().filter(|(_, d)| *d).count();
            self.pos_args = self.args.drain(..).map(|(n, _)| n).collect();
            return Ok(());
        }
        if let Some(name) = token.strip_prefix("**") {
            self.var_kwargs = Some(self.identifier(name)?);
            return Ok(());
        }
        if let Some(name) = token.strip_prefix('*') {
            if self.keyword_only {
                return Err(self.error("multiple '*' markers"));
            }
            self.keyword_only = true;
            let name = name.trim();
            if !name.is_empty() {
                self.var_args = Some(self.identifier(name)?);
            }
            return Ok(());
        }

        let (head, has_default) = match token.split_once('=') {
            Some((head, _default)) => (head, true),
            None => (token, false),
        };
        let name = head.split_once(':').map_or(head, |(name, _annotation)| name);
        let name = self.identifier(name)?;

        if self.keyword_only {
            self.kwargs.push(name);
            self.kwarg_defaults.push(has_default);
        } else {
            let previous_default = self.args.last().map_or(self.pos_defaults_count > 0, |(_, d)| *d);
            if previous_default && !has_default {
                return Err(self.error("parameter without a default follows parameter with a default"));
            }
            self.args.push((name, has_default));
        }
        Ok(())
    }

    fn identifier(&self, name: &str) -> DoubleResult<String> {
        let name = name.trim();
        let mut chars = name.chars();
        let valid = chars.next().is_some_and(|c| c == '_' || c.is_alphabetic())
            && chars.all(|c| c == '_' || c.is_alphanumeric());
        if valid {
            Ok(name.to_owned())
        } else {
            Err(self.error(format!("invalid parameter name '{name}'")))
        }
    }
}

/// Splits on commas that are not nested inside brackets or string literals.
fn split_top_level(source: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in source.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(&source[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&source[start..]);
    parts
}
