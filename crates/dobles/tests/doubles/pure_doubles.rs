//! Instance, class and object doubles, constructors and class patching.

use crate::common::testing;
use dobles::{
    ClassDouble, DoubleKind, ErrorKind, InstanceDouble, ObjectDouble, Value, allow, allow_constructor, args, expect,
    expect_constructor, patch_class,
};
use pretty_assertions::assert_eq;

#[test]
fn instance_double_carries_attributes() {
    let _t = testing();

    let double = InstanceDouble::new("dobles.testing.User", [("name", Value::from("Bob"))]).unwrap();
    assert_eq!(double.kind(), DoubleKind::Instance);
    assert_eq!(double.get_attr("name").unwrap(), Value::from("Bob"));
    assert_eq!(
        double.get_attr("age").unwrap_err().to_string(),
        "AttributeError: <InstanceDouble of <class 'dobles.testing.User'>> has no attribute 'age'"
    );
}

#[test]
fn instance_double_methods_are_verified_and_stubbed() {
    let _t = testing();
    let double = InstanceDouble::new("dobles.testing.User", []).unwrap();

    let scope = dobles::scope();
    allow(&double)
        .method("method_with_default_args")
        .unwrap()
        .with_args(args!("foo"; bar = "qux"))
        .unwrap()
        .and_return("stubbed");
    assert_eq!(
        double.call("method_with_default_args", args!("foo"; bar = "qux")).unwrap(),
        Value::from("stubbed")
    );
    assert_eq!(
        Value::from(double.clone())
            .call_method("method_with_default_args", args!("foo"; bar = "qux"))
            .unwrap(),
        Value::from("stubbed")
    );

    let error = allow(&double).method("not_a_method").unwrap_err();
    assert_eq!(
        error.to_string(),
        "VerifyingDoubleError: No matching method 'not_a_method' on <class 'dobles.testing.User'>."
    );
    let error = allow(&double).method("get_name").unwrap().with_args(args!(1)).unwrap_err();
    assert!(error.is_argument_mismatch());
    scope.finish().unwrap();

    assert_eq!(
        double.call("method_with_default_args", args!("foo")).unwrap_err().kind(),
        ErrorKind::Attribute
    );
}

#[test]
fn instance_double_property_returns_the_stubbed_value() {
    let t = testing();
    let double = InstanceDouble::of(&t.user, []);

    let scope = dobles::scope();
    expect(&double).method("some_property").unwrap().and_return("stubbed").once();
    assert_eq!(double.get_attr("some_property").unwrap(), Value::from("stubbed"));
    assert!(allow(&double).method("some_property").unwrap().with_args(args!(1)).is_err());
    scope.finish().unwrap();

    assert_eq!(double.get_attr("some_property").unwrap_err().kind(), ErrorKind::Attribute);
}

#[test]
fn class_level_property_stub_reaches_instance_doubles() {
    let t = testing();
    let double = InstanceDouble::of(&t.user, []);

    let scope = dobles::scope();
    allow(&t.user).method("some_property").unwrap().and_return("everyone");
    allow(&t.user).method("class_method").unwrap().and_return("class");
    assert_eq!(double.get_attr("some_property").unwrap(), Value::from("everyone"));
    assert_eq!(double.call("class_method", args!("x")).unwrap(), Value::from("class"));
    scope.finish().unwrap();
}

#[test]
fn double_paths_must_name_classes() {
    let _t = testing();

    let error = InstanceDouble::new("dobles.testing.Missing", []).unwrap_err();
    assert_eq!(
        error.to_string(),
        "VerifyingDoubleImportError: No object at path: dobles.testing.Missing."
    );
    let error = ClassDouble::new("dobles.testing.top_level_function").unwrap_err();
    assert_eq!(
        error.to_string(),
        "VerifyingDoubleImportError: Path does not point to a class: dobles.testing.top_level_function."
    );
    let error = ClassDouble::new("nowhere.User").unwrap_err();
    assert_eq!(error.kind(), ErrorKind::VerifyingDoubleImport);
}

#[test]
fn class_double_stubs_class_level_methods_only() {
    let t = testing();
    let double = ClassDouble::of(&t.user);

    let _scope = dobles::scope();
    allow(&double).method("class_method").unwrap().and_return(1);
    assert_eq!(double.call("class_method", args!("x")).unwrap(), Value::from(1));

    let error = allow(&double).method("instance_method").unwrap_err();
    assert_eq!(error.kind(), ErrorKind::VerifyingDouble);
    assert!(error.to_string().contains("Cannot double instance method 'instance_method'"));
}

#[test]
fn constructor_is_verified_then_dispatched() {
    let t = testing();
    let alice = t.alice();
    let double = ClassDouble::new("dobles.testing.User").unwrap();

    let scope = dobles::scope();
    allow_constructor(&double).unwrap().and_return(Value::Instance(alice.clone()));

    assert_eq!(double.construct(args!("Alice", 25)).unwrap(), Value::Instance(alice.clone()));
    assert_eq!(
        Value::from(double.clone()).call(args!("Bob"; age = 30)).unwrap(),
        Value::Instance(alice)
    );
    assert!(double.construct(args!("Alice")).unwrap_err().is_argument_mismatch());

    let error = allow_constructor(&double)
        .unwrap()
        .with_args(args!(1, 2, 3))
        .unwrap_err();
    assert!(error.is_argument_mismatch());
    scope.finish().unwrap();

    let error = double.construct(args!("Alice", 25)).unwrap_err();
    assert_eq!(
        error.to_string(),
        "UnallowedMethodCallError: Cannot call __new__ on a ClassDouble without stubbing it"
    );
}

#[test]
fn constructor_of_container_classes() {
    let t = testing();
    let list_like = ClassDouble::of(&t.list_like);
    let dict_like = ClassDouble::of(&t.dict_like);
    let empty = ClassDouble::of(&t.empty);

    let _scope = dobles::scope();
    assert!(allow_constructor(&list_like).unwrap().with_args(args!(1, 2, 3)).is_ok());
    assert!(allow_constructor(&dict_like).unwrap().with_args(args!(; a = 1)).is_ok());
    assert!(allow_constructor(&empty).unwrap().with_no_args().is_ok());

    let error = allow_constructor(&list_like).unwrap().with_args(args!(; a = 1)).unwrap_err();
    assert_eq!(
        error.to_string(),
        "VerifyingDoubleArgumentError: __init__() takes exactly 1 arguments (2 given)"
    );
    let error = allow_constructor(&empty).unwrap().with_args(args!(1)).unwrap_err();
    assert!(error.is_argument_mismatch());
}

#[test]
fn constructor_rules_require_a_class_double() {
    let t = testing();
    let instance_double = InstanceDouble::of(&t.user, []);

    let _scope = dobles::scope();
    let error = allow_constructor(&t.user).unwrap_err();
    assert_eq!(
        error.to_string(),
        "ConstructorDoubleError: Cannot allow_constructor of <class 'dobles.testing.User'> since it is not a ClassDouble."
    );
    let error = expect_constructor(&instance_double).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::ConstructorDouble);
    assert!(error.to_string().starts_with("ConstructorDoubleError: Cannot expect_constructor of <InstanceDouble of"));
}

#[test]
fn patched_class_is_constructed_through_its_module() {
    let t = testing();

    let scope = dobles::scope();
    let double = patch_class("dobles.testing.User").unwrap();
    assert!(matches!(t.module.get("User"), Some(Value::Double(_))));
    expect_constructor(&double)
        .unwrap()
        .with_args(args!("Zed", 99))
        .unwrap()
        .and_return("constructed")
        .once();

    let user_class = t.module.get("User").unwrap();
    assert_eq!(user_class.call(args!("Zed", 99)).unwrap(), Value::from("constructed"));
    assert_eq!(ClassDouble::new("dobles.testing.User").unwrap().target_class(), &t.user);
    scope.finish().unwrap();

    assert_eq!(t.module.get("User"), Some(Value::Class(t.user.clone())));
}

#[test]
fn unmet_constructor_expectation_fails_verification() {
    let t = testing();
    let double = ClassDouble::of(&t.user);

    let scope = dobles::scope();
    expect_constructor(&double).unwrap();
    let message = scope.finish().unwrap_err().to_string();
    assert!(message.contains("Expected '__new__' to be called at least 1 time instead of 0 times"), "{message}");
}

#[test]
fn object_double_wraps_a_live_object() {
    let t = testing();
    let alice = t.alice();

    let double = ObjectDouble::new(alice.clone()).unwrap();
    assert_eq!(double.kind(), DoubleKind::Object);
    assert!(!double.is_class());
    assert!(ObjectDouble::new(1).is_err());

    let scope = dobles::scope();
    expect(&double).method("get_name").unwrap().and_return("Object Bob");
    assert_eq!(double.call("get_name", args!()).unwrap(), Value::from("Object Bob"));
    assert_eq!(alice.call_method("get_name", args!()).unwrap(), Value::from("Alice"));
    scope.finish().unwrap();
}

#[test]
fn class_doubles_convert_from_object_doubles() {
    let t = testing();
    let class_double = ClassDouble::of(&t.user);
    let object = class_double.clone().into_inner();
    assert_eq!(ClassDouble::try_from(object).unwrap(), class_double);

    let instance = InstanceDouble::of(&t.user, []).into_inner();
    assert!(ClassDouble::try_from(instance).is_err());
}
