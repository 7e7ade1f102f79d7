//! Doubling coroutine functions: results are awaited, effects run on await.

use std::{cell::Cell, rc::Rc};

use crate::common::testing;
use dobles::{Args, ErrorKind, Exception, Value, allow, args, expect};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn stubbed_async_method_returns_awaitable() {
    let t = testing();
    let user = t.async_user();

    let scope = dobles::scope();
    let allowance = allow(&user).method("instance_method").unwrap().and_return("stubbed");
    assert!(allowance.is_async());

    let pending = user.call_method("instance_method", args!()).unwrap();
    assert!(matches!(pending, Value::Coroutine(_)));
    assert_eq!(pending.await.unwrap(), Value::from("stubbed"));
    scope.finish().unwrap();

    let real = user.call_method("instance_method", args!()).unwrap().await.unwrap();
    assert_eq!(real, Value::from("async instance_method"));
}

#[tokio::test]
async fn raised_exception_surfaces_on_await() {
    let t = testing();
    let user = t.async_user();

    let _scope = dobles::scope();
    allow(&user)
        .method("instance_method")
        .unwrap()
        .and_raise(Exception::new("ConnectionError", "offline"));

    let pending = user.call_method("instance_method", args!()).unwrap();
    let error = pending.await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Raised);
    assert_eq!(error.to_string(), "ConnectionError: offline");
}

#[tokio::test]
async fn computed_result_runs_when_awaited() {
    let t = testing();
    let user = t.async_user();
    let ran = Rc::new(Cell::new(false));

    let _scope = dobles::scope();
    let flag = Rc::clone(&ran);
    allow(&user).method("instance_method").unwrap().and_return_computed(move |_| {
        flag.set(true);
        Ok(Value::from("computed"))
    });

    let pending = user.call_method("instance_method", args!()).unwrap();
    assert!(!ran.get());
    assert_eq!(pending.await.unwrap(), Value::from("computed"));
    assert!(ran.get());
}

#[tokio::test]
async fn async_effect_receives_arguments() {
    let t = testing();

    let _scope = dobles::scope();
    allow(&t.module)
        .method("async_top_level_function")
        .unwrap()
        .and_return_async(|args: Args| async move { Ok(args.get(0).cloned().unwrap_or_default()) });

    let pending = t.module.call("async_top_level_function", args!("echo")).unwrap();
    assert_eq!(pending.await.unwrap(), Value::from("echo"));
}

#[tokio::test]
async fn async_class_method_on_class() {
    let t = testing();

    let scope = dobles::scope();
    allow(&t.async_user)
        .method("class_method")
        .unwrap()
        .with_args(args!("x"))
        .unwrap()
        .and_return(5);

    let pending = t.async_user.call("class_method", args!("x")).unwrap();
    assert_eq!(pending.await.unwrap(), Value::from(5));
    scope.finish().unwrap();
}

#[tokio::test]
async fn calls_are_counted_before_awaiting() {
    let t = testing();
    let user = t.async_user();

    let scope = dobles::scope();
    expect(&user).method("instance_method").unwrap().once();
    let _pending = user.call_method("instance_method", args!()).unwrap();
    scope.finish().unwrap();
}

#[tokio::test]
async fn coroutine_cannot_be_awaited_twice() {
    let t = testing();
    let user = t.async_user();

    let _scope = dobles::scope();
    allow(&user).method("instance_method").unwrap();

    let pending = user.call_method("instance_method", args!()).unwrap();
    let again = pending.clone();
    assert_eq!(pending.await.unwrap(), Value::None);
    let error = again.await.unwrap_err();
    assert_eq!(error.to_string(), "RuntimeError: cannot reuse already awaited coroutine");
}

#[tokio::test]
async fn plain_values_are_not_awaitable() {
    let error = Value::from(1).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotAwaitable);
}
