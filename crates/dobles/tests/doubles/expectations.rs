//! Expectations and call-count policies.

use crate::common::testing;
use dobles::{ErrorKind, allow, args, expect};
use pretty_assertions::assert_eq;

#[test]
fn unmet_expectation_names_method_target_arguments_and_site() {
    let t = testing();

    let scope = dobles::scope();
    let expectation = expect(&t.user)
        .method("class_method")
        .unwrap()
        .with_args(args!("test_one"))
        .unwrap()
        .once();
    let site = expectation.creation_site();
    assert!(site.file.ends_with("expectations.rs"), "{}", site.file);

    let error = scope.finish().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::MockExpectation);
    assert_eq!(
        error.to_string(),
        format!(
            "MockExpectationError: Expected 'class_method' to be called 1 time instead of 0 times on \
             <class 'dobles.testing.User'> with ('test_one'), but was not. ({site})"
        )
    );
}

#[test]
fn expectation_without_count_requires_one_call() {
    let t = testing();
    let alice = t.alice();

    let scope = dobles::scope();
    let expectation = expect(&alice).method("instance_method").unwrap();
    assert!(!expectation.is_satisfied());
    let message = dobles::verify().unwrap_err().to_string();
    assert!(
        message.contains("Expected 'instance_method' to be called at least 1 time instead of 0 times on <dobles.testing.User object at"),
        "{message}"
    );
    assert!(message.contains("with any args, but was not."), "{message}");

    alice.call_method("instance_method", args!()).unwrap();
    assert!(expectation.is_satisfied());
    assert_eq!(expectation.call_count(), 1);
    scope.finish().unwrap();
}

#[test]
fn exceeding_exact_count_fails_at_call_time() {
    let t = testing();
    let alice = t.alice();

    let scope = dobles::scope();
    expect(&alice).method("instance_method").unwrap().and_return(1).twice();

    assert_eq!(alice.call_method("instance_method", args!()).unwrap(), dobles::Value::from(1));
    assert_eq!(alice.call_method("instance_method", args!()).unwrap(), dobles::Value::from(1));
    let error = alice.call_method("instance_method", args!()).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::MockExpectation);
    assert!(error.to_string().contains("to be called 2 times instead of 3 times on"));

    assert!(scope.finish().is_err());
}

#[test]
fn bounded_allowances_are_verified_too() {
    let t = testing();
    let alice = t.alice();

    let scope = dobles::scope();
    allow(&alice).method("get_name").unwrap().exactly(1).unwrap();
    let message = scope.finish().unwrap_err().to_string();
    assert!(message.contains("Allowed 'get_name' to be called 1 time instead of 0 times on"), "{message}");
}

#[test]
fn at_least_reports_the_minimum() {
    let t = testing();
    let alice = t.alice();

    let scope = dobles::scope();
    expect(&alice).method("instance_method").unwrap().at_least(2).unwrap();
    alice.call_method("instance_method", args!()).unwrap();
    let message = scope.finish().unwrap_err().to_string();
    assert!(message.contains("to be called at least 2 times instead of 1 time on"), "{message}");
}

#[test]
fn at_most_fails_on_the_extra_call() {
    let t = testing();
    let alice = t.alice();

    let scope = dobles::scope();
    allow(&alice).method("instance_method").unwrap().at_most(1).unwrap();
    alice.call_method("instance_method", args!()).unwrap();
    let error = alice.call_method("instance_method", args!()).unwrap_err();
    assert!(error.to_string().contains("Allowed 'instance_method' to be called at most 1 time instead of 2 times on"));
    assert!(scope.finish().is_err());
}

#[test]
fn never_rejects_any_call() {
    let t = testing();

    let scope = dobles::scope();
    allow(&t.module).method("top_level_function").unwrap().never();
    let error = t.module.call("top_level_function", args!("a")).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::MockExpectation);
    assert!(error.to_string().contains("to be called 0 times instead of 1 time on <module 'dobles.testing'>"));
    assert!(scope.finish().is_err());
}

#[test]
fn negative_counts_are_rejected() {
    let t = testing();
    let alice = t.alice();

    let _scope = dobles::scope();
    let error = allow(&alice).method("instance_method").unwrap().exactly(-1).unwrap_err();
    assert_eq!(error.to_string(), "TypeError: exactly requires one positive integer argument");
    let error = allow(&alice).method("instance_method").unwrap().at_least(-2).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidCount);
}

#[test]
fn argument_descriptions_in_failures() {
    let t = testing();

    let scope = dobles::scope();
    expect(&t.module)
        .method("top_level_function")
        .unwrap()
        .with_args(args!("a"; arg2 = "b"))
        .unwrap();
    let message = dobles::verify().unwrap_err().to_string();
    assert!(message.contains("with ('a', arg2='b'), but was not."), "{message}");
    dobles::clear();

    let alice = t.alice();
    expect(&alice)
        .method("method_with_varargs")
        .unwrap()
        .with_custom_matcher("is_even", |args| args.get(0).and_then(dobles::Value::as_int).is_some_and(|n| n % 2 == 0))
        .unwrap();
    let message = dobles::verify().unwrap_err().to_string();
    assert!(message.contains("with custom matcher: 'is_even', but was not."), "{message}");
    dobles::clear();
    scope.finish().unwrap();
}

#[test]
fn verification_reports_the_first_unsatisfied_rule() {
    let t = testing();
    let alice = t.alice();

    let scope = dobles::scope();
    expect(&alice).method("instance_method").unwrap();
    expect(&t.user).method("class_method").unwrap();
    let message = scope.finish().unwrap_err().to_string();
    assert!(message.contains("'instance_method'"), "{message}");
}

#[test]
fn successful_verification_is_repeatable() {
    let t = testing();
    let alice = t.alice();

    let scope = dobles::scope();
    expect(&alice).method("instance_method").unwrap().once();
    alice.call_method("instance_method", args!()).unwrap();
    dobles::verify().unwrap();
    dobles::verify().unwrap();
    scope.finish().unwrap();
}

#[test]
fn verification_sees_count_changes_made_after_it_passed() {
    let t = testing();
    let alice = t.alice();

    let scope = dobles::scope();
    let expectation = expect(&alice).method("instance_method").unwrap().once();
    alice.call_method("instance_method", args!()).unwrap();
    dobles::verify().unwrap();

    expectation.twice();
    let error = dobles::verify().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::MockExpectation);
    assert!(error.to_string().contains("to be called 2 times instead of 1 time"), "{error}");

    alice.call_method("instance_method", args!()).unwrap();
    dobles::verify().unwrap();
    scope.finish().unwrap();
}
