//! The test-scoped registry of proxies.

use indexmap::IndexMap;

use crate::{
    allowance::{Allowance, CreationSite},
    error::DoubleResult,
    object::Module,
    patch::Patch,
    proxy::Proxy,
    target::{Subject, SubjectId},
    value::Value,
};

/// All proxies and module patches created during one test.
///
/// Proxies are keyed by subject identity, so two handles to the same object share a
/// proxy while two equal-looking objects do not. Every attribute replacement, whether
/// made for a proxy or by [`patch`](crate::patch), goes onto one undo log.
#[derive(Default)]
pub struct Space {
    proxies: IndexMap<SubjectId, Proxy>,
    undo_log: Vec<Patch>,
}

impl Space {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the proxy for `subject`, creating it on first use.
    pub fn proxy_for(&mut self, subject: Subject) -> &mut Proxy {
        self.proxies
            .entry(subject.id())
            .or_insert_with(|| Proxy::new(subject))
    }

    /// Registers an allowance for `method_name` on the proxy of `subject`.
    pub(crate) fn add_allowance(
        &mut self,
        subject: Subject,
        method_name: &str,
        site: CreationSite,
        is_expectation: bool,
    ) -> DoubleResult<Allowance> {
        let proxy = self
            .proxies
            .entry(subject.id())
            .or_insert_with(|| Proxy::new(subject));
        proxy.add_allowance(method_name, site, is_expectation, &mut self.undo_log)
    }

    #[must_use]
    pub fn proxy(&self, id: SubjectId) -> Option<&Proxy> {
        self.proxies.get(&id)
    }

    #[must_use]
    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    /// Number of attribute replacements teardown will undo.
    #[must_use]
    pub fn undo_len(&self) -> usize {
        self.undo_log.len()
    }

    /// Replaces `module.name` with `value` until teardown.
    pub fn patch_module_attr(&mut self, module: &Module, name: &str, value: Value) {
        self.undo_log.push(Patch::module_attr(module, name, value));
        tracing::debug!(module = module.name(), name, "module attribute patched");
    }

    /// Checks every rule of every proxy, failing on the first unsatisfied one.
    ///
    /// Proxies are checked in creation order and rules in declaration order. Checking
    /// only reads call counts, so verifying twice without calls in between gives the
    /// same answer.
    pub fn verify(&mut self) -> DoubleResult<()> {
        for proxy in self.proxies.values_mut() {
            proxy.verify()?;
        }
        Ok(())
    }

    /// Undoes every replacement, newest first, then discards the proxies. Idempotent.
    pub fn teardown(&mut self) {
        while let Some(patch) = self.undo_log.pop() {
            patch.restore();
        }
        for (_, mut proxy) in self.proxies.drain(..) {
            proxy.mark_restored();
        }
        tracing::debug!("space torn down");
    }
}

impl Drop for Space {
    fn drop(&mut self) {
        if !self.proxies.is_empty() || !self.undo_log.is_empty() {
            self.teardown();
        }
    }
}
