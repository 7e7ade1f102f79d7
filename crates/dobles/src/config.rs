//! Per-thread configuration.
//!
//! Configuration is read once per thread from the environment and can then be
//! replaced programmatically. Tests on different threads never observe each other's
//! settings.

use std::{cell::RefCell, env, fmt, rc::Rc};

use crate::verification::{DeclaredSignatures, SignatureProvider};

/// Environment variable that switches off verification of callables without a signature.
pub const IGNORE_BUILTIN_VERIFICATION_ENV: &str = "DOBLES_IGNORE_BUILTIN_VERIFICATION";

/// Settings consulted by the verification engine.
#[derive(Clone)]
pub struct Config {
    /// Suppress `UnverifiableBuiltin` argument mismatches instead of failing.
    pub ignore_builtin_verification: bool,
    /// Resolves the signature of any callable value.
    pub signature_provider: Rc<dyn SignatureProvider>,
}

impl Config {
    /// Builds the configuration from the process environment.
    ///
    /// `DOBLES_IGNORE_BUILTIN_VERIFICATION` accepts `1`, `true`, `yes` or `on`
    /// (case insensitive); anything else leaves verification on.
    #[must_use]
    pub fn from_env() -> Self {
        let ignore = env::var(IGNORE_BUILTIN_VERIFICATION_ENV).is_ok_and(|v| {
            matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
        });
        Self::default().with_ignore_builtin_verification(ignore)
    }

    #[must_use]
    pub fn with_ignore_builtin_verification(mut self, ignore: bool) -> Self {
        self.ignore_builtin_verification = ignore;
        self
    }

    #[must_use]
    pub fn with_signature_provider(mut self, provider: impl SignatureProvider + 'static) -> Self {
        self.signature_provider = Rc::new(provider);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ignore_builtin_verification: false,
            signature_provider: Rc::new(DeclaredSignatures),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("ignore_builtin_verification", &self.ignore_builtin_verification)
            .finish_non_exhaustive()
    }
}

thread_local! {
    static CONFIG: RefCell<Config> = RefCell::new(Config::from_env());
}

/// Returns a snapshot of the current thread's configuration.
#[must_use]
pub fn config() -> Config {
    CONFIG.with(|c| c.borrow().clone())
}

/// Replaces the current thread's configuration, returning the previous one.
pub fn set_config(config: Config) -> Config {
    CONFIG.with(|c| c.replace(config))
}

/// Runs `f` with `config` installed, restoring the previous configuration afterwards.
pub fn with_config<R>(config: Config, f: impl FnOnce() -> R) -> R {
    let _guard = ConfigGuard(Some(set_config(config)));
    f()
}

/// Switches builtin verification off until the returned guard is dropped.
///
/// ```
/// let _guard = dobles::no_builtin_verification();
/// assert!(dobles::config().ignore_builtin_verification);
/// ```
#[must_use = "builtin verification is restored when the guard is dropped"]
pub fn no_builtin_verification() -> ConfigGuard {
    let previous = set_config(config().with_ignore_builtin_verification(true));
    ConfigGuard(Some(previous))
}

/// Restores the configuration that was active when the guard was created.
#[derive(Debug)]
pub struct ConfigGuard(Option<Config>);

impl Drop for ConfigGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.0.take() {
            set_config(previous);
        }
    }
}
