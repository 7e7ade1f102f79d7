//! Runner hooks, teardown semantics and configuration.

use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::common::testing;
use dobles::{
    Config, ErrorKind, ProxyState, Signature, SignatureLookup, SignatureProvider, Subject, Value, allow, args, config,
    expect, no_builtin_verification, run_test, with_config, with_current_space,
};
use pretty_assertions::assert_eq;

#[test]
fn run_test_verifies_then_restores() {
    let t = testing();
    let alice = t.alice();

    let name = run_test(|| {
        allow(&alice).method("get_name").unwrap().and_return("Bob");
        alice.call_method("get_name", args!()).unwrap()
    })
    .unwrap();
    assert_eq!(name, Value::from("Bob"));
    assert_eq!(alice.call_method("get_name", args!()).unwrap(), Value::from("Alice"));
}

#[test]
fn run_test_reports_verification_failure() {
    let t = testing();
    let alice = t.alice();

    let failure = run_test(|| {
        expect(&alice).method("instance_method").unwrap();
    })
    .unwrap_err();
    assert!(failure.panic_message().is_none());
    assert_eq!(failure.verification().map(dobles::DoubleError::kind), Some(ErrorKind::MockExpectation));
    assert_eq!(alice.call_method("instance_method", args!()).unwrap(), Value::from("instance_method"));
}

#[test]
fn run_test_reports_body_and_verification_failures_together() {
    let t = testing();
    let alice = t.alice();

    let failure = run_test(|| {
        expect(&alice).method("instance_method").unwrap();
        panic!("body failed");
    })
    .unwrap_err();
    assert_eq!(failure.panic_message(), Some("body failed"));
    assert!(failure.verification().is_some());
    let report = failure.to_string();
    assert!(report.starts_with("test panicked: body failed\nverification also failed: MockExpectationError:"), "{report}");
    assert_eq!(alice.call_method("instance_method", args!()).unwrap(), Value::from("instance_method"));
}

#[test]
fn teardown_is_idempotent_and_blocks_verification() {
    let t = testing();
    let alice = t.alice();

    dobles::clear();
    allow(&alice).method("get_name").unwrap().and_return("Bob");
    dobles::teardown();
    dobles::teardown();

    assert_eq!(alice.call_method("get_name", args!()).unwrap(), Value::from("Alice"));
    let error = dobles::verify().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NoSpace);
    assert_eq!(
        error.to_string(),
        "NoSpaceError: Cannot verify doubles: the space has already been torn down."
    );

    allow(&alice).method("get_name").unwrap();
    dobles::verify().unwrap();
    dobles::teardown();
}

#[test]
fn clear_allows_later_verification() {
    let t = testing();
    let alice = t.alice();

    allow(&alice).method("get_name").unwrap();
    dobles::clear();
    assert!(!dobles::lifecycle::has_current_space());
    dobles::verify().unwrap();
    dobles::clear();
}

#[test]
fn dropped_scope_panics_on_unmet_expectation() {
    let t = testing();
    let alice = t.alice();

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let _scope = dobles::scope();
        expect(&alice).method("instance_method").unwrap();
    }));
    assert!(outcome.is_err());
    assert_eq!(alice.call_method("instance_method", args!()).unwrap(), Value::from("instance_method"));
}

#[test]
fn stale_dispatcher_rejects_calls_after_teardown() {
    let t = testing();
    let alice = t.alice();

    let scope = dobles::scope();
    allow(&alice).method("get_name").unwrap().and_return("Bob");
    let stubbed = alice.get_attr("get_name").unwrap();
    scope.finish().unwrap();

    let error = stubbed.call(args!()).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::UnallowedMethodCall);
}

#[test]
fn space_tracks_one_proxy_per_subject() {
    let t = testing();
    let alice = t.alice();
    let bob = t.user_named("Bob", 30);

    let _scope = dobles::scope();
    allow(&alice).method("get_name").unwrap();
    allow(&alice).method("instance_method").unwrap();
    allow(alice.clone()).method("get_name").unwrap();
    allow(&bob).method("get_name").unwrap();

    let alice_id = Subject::from(&alice).id();
    let (count, state, rules) = with_current_space(|space| {
        let proxy = space.proxy(alice_id).unwrap();
        let rules = proxy.method_double("get_name").map(|m| m.allowances().len());
        (space.proxy_count(), proxy.state(), rules)
    });
    assert_eq!(count, 2);
    assert_eq!(state, ProxyState::Active);
    assert_eq!(rules, Some(2));

    dobles::verify().unwrap();
    let state = with_current_space(|space| space.proxy(alice_id).map(dobles::Proxy::state));
    assert_eq!(state, Some(ProxyState::Verified));
}

#[test]
fn builtin_verification_can_be_switched_off() {
    let t = testing();

    let _scope = dobles::scope();
    assert!(!config().ignore_builtin_verification);
    {
        let _guard = no_builtin_verification();
        assert!(config().ignore_builtin_verification);
        assert!(allow(&t.module).method("builtin_function").unwrap().with_args(args!(1, 2)).is_ok());
    }
    assert!(!config().ignore_builtin_verification);

    let error = allow(&t.module)
        .method("builtin_function")
        .unwrap()
        .with_args(args!(1))
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::UnverifiableBuiltin);
    assert!(error.to_string().contains("no signature found for builtin <function builtin_function>"));
}

struct AcceptEverything;

impl SignatureProvider for AcceptEverything {
    fn signature_of(&self, _callable: &Value) -> SignatureLookup {
        SignatureLookup::Declared(Signature::variadic())
    }
}

#[test]
fn signature_provider_is_pluggable() {
    let t = testing();
    let alice = t.alice();

    let _scope = dobles::scope();
    let custom = Config::default().with_signature_provider(AcceptEverything);
    with_config(custom, || {
        assert!(
            allow(&alice)
                .method("method_with_positional_arguments")
                .unwrap()
                .with_args(args!(1, 2, 3; extra = 4))
                .is_ok()
        );
    });
    assert!(
        allow(&alice)
            .method("method_with_positional_arguments")
            .unwrap()
            .with_args(args!(1, 2, 3))
            .is_err()
    );
}

#[test]
fn logs_through_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .finish();
    let _default = tracing::subscriber::set_default(subscriber);

    let t = testing();
    let alice = t.alice();
    run_test(|| {
        allow(&alice).method("__call__").unwrap().and_return(1);
        Value::Instance(alice.clone()).call(args!()).unwrap()
    })
    .unwrap();
}

#[test]
fn teardown_undoes_stub_then_patch_of_one_attribute() {
    let t = testing();
    let original = t.module.get("top_level_function");

    let scope = dobles::scope();
    allow(&t.module).method("top_level_function").unwrap();
    dobles::patch("dobles.testing.top_level_function", "patched").unwrap();
    assert_eq!(t.module.get("top_level_function"), Some(Value::from("patched")));
    with_current_space(|space| assert_eq!(space.undo_len(), 2));
    scope.finish().unwrap();

    assert_eq!(t.module.get("top_level_function"), original);
    let restored = t.module.call("top_level_function", args!(1)).unwrap();
    assert_eq!(restored, Value::from("1 -- default"));
}

#[test]
fn teardown_undoes_interleaved_class_and_instance_stubs() {
    let t = testing();
    let alice = t.alice();
    let bob = t.user_named("Bob", 30);

    let scope = dobles::scope();
    allow(&alice).method("get_name").unwrap().and_return("Stubbed");
    allow(&t.user).method("some_property").unwrap().and_return("class");
    allow(&alice).method("some_property").unwrap().and_return("alice");
    assert_eq!(alice.get_attr("some_property").unwrap(), Value::from("alice"));
    assert_eq!(bob.get_attr("some_property").unwrap(), Value::from("class"));
    scope.finish().unwrap();

    assert_eq!(bob.get_attr("some_property").unwrap(), Value::from("some_property"));
    assert_eq!(alice.get_attr("some_property").unwrap(), Value::from("some_property"));
    assert_eq!(alice.call_method("get_name", args!()).unwrap(), Value::from("Alice"));
    assert!(matches!(t.user.own_member("some_property"), Some(dobles::Member::Property(f)) if !f.is_dispatcher()));
}
