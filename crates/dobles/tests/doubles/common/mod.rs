//! The `dobles.testing` module shared by the integration tests.
//!
//! Every call to [`testing`] builds fresh classes and registers them on the current
//! thread, so tests never observe each other's patches.

use dobles::{Class, Container, Function, Instance, Module, Signature, Value, args, register_module};

pub const MODULE: &str = "dobles.testing";

pub struct Testing {
    pub module: Module,
    pub user: Class,
    pub async_user: Class,
    pub empty: Class,
    pub list_like: Class,
    pub dict_like: Class,
}

impl Testing {
    pub fn user_named(&self, name: &str, age: i64) -> Instance {
        self.user.instantiate(args!(name, age)).expect("User() accepts name and age")
    }

    pub fn alice(&self) -> Instance {
        self.user_named("Alice", 25)
    }

    pub fn async_user(&self) -> Instance {
        self.async_user.instantiate(args!()).expect("AsyncUser() takes no arguments")
    }
}

fn sig(params: &str) -> Signature {
    params.parse().expect("fixture signature")
}

/// A function returning its own name.
fn returns_name(name: &'static str, params: &str) -> Function {
    Function::new(name, sig(params), move |_| Ok(Value::from(name)))
}

fn user_class() -> Class {
    Class::builder(MODULE, "User")
        .method(Function::new("__init__", sig("self, name, age"), |args| {
            if let Some(Value::Instance(this)) = args.get(0) {
                this.set_attr("name", args.param(1, "name").cloned().unwrap_or_default());
                this.set_attr("age", args.param(2, "age").cloned().unwrap_or_default());
            }
            Ok(Value::None)
        }))
        .method(Function::new("get_name", sig("self"), |args| match args.get(0) {
            Some(this) => this.get_attr("name"),
            None => Ok(Value::None),
        }))
        .method(returns_name("instance_method", "self"))
        .method(returns_name("method_with_varargs", "self, *args"))
        .method(returns_name("method_with_default_args", "self, foo, bar='baz'"))
        .method(returns_name("method_with_varkwargs", "self, **kwargs"))
        .method(returns_name("method_with_positional_arguments", "self, foo"))
        .method(returns_name("method_with_keyword_only", "self, *, flag=False"))
        .class_method(returns_name("class_method", "cls, arg"))
        .static_method(returns_name("static_method", "arg"))
        .property(returns_name("some_property", "self"))
        .method(Function::new("__call__", sig("self, *args"), |_| Ok("user was called".into())))
        .method(Function::new("__enter__", sig("self"), |args| {
            Ok(args.get(0).cloned().unwrap_or_default())
        }))
        .method(returns_name("__exit__", "self, exc_type, value, traceback"))
        .method(Function::builtin("builtin_method", |_| Ok("builtin".into())))
        .data("class_attribute", "foo")
        .build()
}

fn async_user_class() -> Class {
    Class::builder(MODULE, "AsyncUser")
        .method(Function::new_async("instance_method", sig("self"), |_| async {
            Ok(Value::from("async instance_method"))
        }))
        .class_method(Function::new_async("class_method", sig("cls, arg"), |_| async {
            Ok(Value::from("async class_method"))
        }))
        .build()
}

/// Builds the `dobles.testing` module and registers it on this thread.
pub fn testing() -> Testing {
    let user = user_class();
    let async_user = async_user_class();
    let empty = Class::builder(MODULE, "EmptyClass").build();
    let list_like = Class::builder(MODULE, "ListSubclass").container(Container::Sequence).build();
    let dict_like = Class::builder(MODULE, "DictSubclass").container(Container::Mapping).build();

    let top_level_function = Function::new("top_level_function", sig("arg1, arg2='default'"), |args| {
        let arg1 = args.param(0, "arg1").map(Value::repr).unwrap_or_default();
        let arg2 = args.param(1, "arg2").map_or_else(|| "default".to_owned(), |v| v.as_str().unwrap_or_default().to_owned());
        Ok(Value::from(format!("{arg1} -- {arg2}")))
    });
    let decorated_function = Function::wraps(
        &Function::new("decorated_function", sig("arg1"), |_| Ok(Value::from("decorated"))),
        |inner, args| inner.call(args),
    );
    let async_top_level_function = Function::new_async(
        "async_top_level_function",
        sig("arg1, arg2='default'"),
        |_| async { Ok(Value::from("async top level")) },
    );

    let module = Module::new(MODULE)
        .with("User", user.clone())
        .with("AsyncUser", async_user.clone())
        .with("EmptyClass", empty.clone())
        .with("ListSubclass", list_like.clone())
        .with("DictSubclass", dict_like.clone())
        .with("top_level_function", top_level_function)
        .with("decorated_function", decorated_function)
        .with("async_top_level_function", async_top_level_function)
        .with("builtin_function", Function::builtin("builtin_function", |_| Ok(Value::None)))
        .with("module_attribute", 42);
    register_module(&module);

    Testing {
        module,
        user,
        async_user,
        empty,
        list_like,
        dict_like,
    }
}
