//! Bookkeeping of how often a double was called against its declared bounds.

/// Tracks observed calls against an optional exact, minimum or maximum count.
///
/// Setting an exact count clears the range and vice versa, so the last declaration
/// wins. With no bounds set, every count is acceptable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCountAccumulator {
    count: usize,
    exact: Option<usize>,
    minimum: Option<usize>,
    maximum: Option<usize>,
}

impl CallCountAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_exact(&mut self, n: usize) {
        self.exact = Some(n);
        self.minimum = None;
        self.maximum = None;
    }

    pub fn set_minimum(&mut self, n: usize) {
        self.minimum = Some(n);
        self.exact = None;
    }

    pub fn set_maximum(&mut self, n: usize) {
        self.maximum = Some(n);
        self.exact = None;
    }

    /// Records one call.
    pub fn called(&mut self) -> &mut Self {
        self.count += 1;
        self
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Whether any bound has been declared.
    #[must_use]
    pub fn is_bounded(&self) -> bool {
        self.exact.is_some() || self.minimum.is_some() || self.maximum.is_some()
    }

    #[must_use]
    pub fn has_too_many_calls(&self) -> bool {
        match self.exact {
            Some(exact) => self.count > exact,
            None => self.maximum.is_some_and(|max| self.count > max),
        }
    }

    #[must_use]
    pub fn has_too_few_calls(&self) -> bool {
        match self.exact {
            Some(exact) => self.count < exact,
            None => self.minimum.is_some_and(|min| self.count < min),
        }
    }

    #[must_use]
    pub fn has_correct_call_count(&self) -> bool {
        !self.has_too_few_calls() && !self.has_too_many_calls()
    }

    /// Describes the declared bound, e.g. `at least 2 times`.
    #[must_use]
    pub fn restriction_string(&self) -> String {
        let (prefix, n) = if let Some(exact) = self.exact {
            ("", exact)
        } else if self.has_too_few_calls() {
            ("at least ", self.minimum.unwrap_or_default())
        } else if let Some(max) = self.maximum {
            ("at most ", max)
        } else if let Some(min) = self.minimum {
            ("at least ", min)
        } else {
            return String::new();
        };
        format!("{prefix}{}", times(n))
    }

    /// Describes the observed count, e.g. `0 times`.
    #[must_use]
    pub fn count_string(&self) -> String {
        times(self.count)
    }

    /// `"{restriction} instead of {count} "`, or empty when the count is acceptable.
    #[must_use]
    pub fn error_string(&self) -> String {
        if self.has_correct_call_count() {
            return String::new();
        }
        format!("{} instead of {} ", self.restriction_string(), self.count_string())
    }
}

fn times(n: usize) -> String {
    if n == 1 {
        "1 time".to_owned()
    } else {
        format!("{n} times")
    }
}
