#![doc = include_str!("../../../README.md")]
#![expect(clippy::needless_pass_by_value, reason = "call APIs pass arguments by value consistently")]

mod allowance;
pub mod call_count;
mod config;
mod doubles;
mod error;
mod function;
mod hijack;
pub mod lifecycle;
pub mod matchers;
mod object;
mod patch;
pub mod path;
mod proxy;
mod signature;
mod space;
mod target;
mod targets;
mod value;
pub mod verification;

pub use crate::{
    allowance::{Allowance, CreationSite, DeclaredArgs},
    call_count::CallCountAccumulator,
    config::{
        Config, ConfigGuard, IGNORE_BUILTIN_VERIFICATION_ENV, config, no_builtin_verification, set_config, with_config,
    },
    doubles::{ClassDouble, DoubleKind, InstanceDouble, ObjectDouble},
    error::{DoubleError, DoubleResult, ErrorKind, Exception, MismatchKind},
    function::{Coroutine, Function, LocalFuture},
    hijack::override_count,
    lifecycle::{DoubleScope, TestFailure, clear, run_test, scope, teardown, verify, with_current_space},
    matchers::{ArgMatcher, ArgPattern, ArgsPredicate, ValueMatcher},
    object::{Class, ClassBuilder, Container, Instance, Member, Module},
    path::register_module,
    proxy::{MethodDouble, Proxy, ProxyState},
    signature::{CallShape, Signature},
    space::Space,
    target::{AttributeInfo, AttributeKind, Doubled, Subject, SubjectId, Target, is_protocol_name},
    targets::{
        AllowanceTarget, allow, allow_constructor, allow_path, expect, expect_constructor, expect_path, patch,
        patch_class,
    },
    value::{Args, Value},
    verification::{CONSTRUCTOR, DeclaredSignatures, SignatureLookup, SignatureProvider},
};
