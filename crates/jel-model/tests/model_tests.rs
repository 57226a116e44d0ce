//! Host object model integration tests.
//!
//! Hosts define their own classes on top of the built-ins and the model
//! must resolve members, generics and overloads through them.

use std::collections::HashMap;

use jel_model::lang;
use jel_model::{
    callable, select, setter, ClassDef, ClassId, ClassRegistry, ConstructorDef, FieldDef,
    HostError, HostObject, Invocation, Lookup, MethodDef, Primitive, Type, Value,
};
use jel_types::ErrorCode;

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

struct Counter {
    count: i32,
}

/// `com.acme.Counter` with an int field, an overloaded `add` and a
/// private `reset`.
fn registry_with_counter() -> (ClassRegistry, ClassId) {
    let mut r = ClassRegistry::with_builtins();
    let count_field = FieldDef {
        name: "count".into(),
        ty: Type::int(),
        is_static: false,
        is_final: false,
        public: true,
        getter: callable(|inv| {
            let Some(Value::Object(o)) = inv.receiver else {
                return Err(HostError::null_pointer("no counter"));
            };
            Ok(Value::Int(o.with(|c: &Counter| c.count).unwrap_or_default()))
        }),
        setter: Some(setter(|inv, value| {
            let Some(Value::Object(o)) = inv.receiver else {
                return Err(HostError::null_pointer("no counter"));
            };
            let v = value.as_i64().unwrap_or_default() as i32;
            o.with_mut(|c: &mut Counter| c.count = v);
            Ok(())
        })),
    };
    let add = |params: Vec<Type>| {
        MethodDef::new(
            "add",
            params,
            Type::int(),
            callable(|inv| {
                let Some(Value::Object(o)) = inv.receiver else {
                    return Err(HostError::null_pointer("no counter"));
                };
                let delta: i64 = inv.args.iter().filter_map(Value::as_i64).sum();
                Ok(Value::Int(
                    o.with_mut(|c: &mut Counter| {
                        c.count += delta as i32;
                        c.count
                    })
                    .unwrap_or_default(),
                ))
            }),
        )
    };
    let def = ClassDef::class("com.acme.Counter")
        .field(count_field)
        .field(FieldDef::constant("LIMIT", Type::int(), Value::Int(10)))
        .constructor(ConstructorDef::new(
            vec![],
            callable(|inv| {
                Ok(Value::Object(HostObject::new(
                    inv.class,
                    Counter { count: 0 },
                )))
            }),
        ))
        .method(add(vec![Type::int()]))
        .method(add(vec![Type::int(), Type::int()]))
        .method(
            MethodDef::new(
                "reset",
                vec![],
                Type::void(),
                callable(|_| Ok(Value::Null)),
            )
            .private(),
        );
    let id = r.define(def).unwrap();
    (r, id)
}

fn construct(r: &ClassRegistry, id: ClassId) -> Value {
    let ctor = &r.get(id).constructors[0];
    (ctor.invoke)(&Invocation {
        registry: r,
        class: id,
        receiver: None,
        args: &[],
    })
    .unwrap()
}

// ══════════════════════════════════════════════════════════════════════════════
// Host classes
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_host_class_fields_and_methods() {
    let (r, id) = registry_with_counter();
    let counter = construct(&r, id);

    let (_, field) = r.field(id, "count").unwrap();
    let setter = field.setter.clone().unwrap();
    let inv = Invocation {
        registry: &r,
        class: id,
        receiver: Some(&counter),
        args: &[],
    };
    setter(&inv, Value::Int(4)).unwrap();
    assert_eq!((field.getter)(&inv).unwrap(), Value::Int(4));

    let candidates = r.methods(id, "add");
    let selected = select(
        &r,
        "add",
        &candidates,
        &[Type::int(), Type::primitive(Primitive::Short)],
        Some(&Type::object(id)),
        Lookup::default(),
    )
    .unwrap();
    assert_eq!(selected.params.len(), 2);
    let invoke = selected.member.invoke.clone().unwrap();
    let result = invoke(&Invocation {
        registry: &r,
        class: selected.owner,
        receiver: Some(&counter),
        args: &[Value::Int(1), Value::Int(2)],
    })
    .unwrap();
    assert_eq!(result, Value::Int(7));
}

#[test]
fn test_public_only_hides_private_members() {
    let (r, id) = registry_with_counter();
    let candidates = r.methods(id, "reset");
    let hidden = select(
        &r,
        "reset",
        &candidates,
        &[],
        None,
        Lookup {
            public_only: true,
            static_context: false,
        },
    )
    .unwrap_err();
    assert_eq!(hidden.code(), ErrorCode::INACCESSIBLE);
    assert!(select(&r, "reset", &candidates, &[], None, Lookup::default()).is_ok());
}

#[test]
fn test_host_class_inherits_object_members() {
    let (r, id) = registry_with_counter();
    let counter = construct(&r, id);
    let text = r.to_display(&counter).unwrap();
    assert!(text.starts_with("com.acme.Counter@"), "{text}");
    assert!(r.values_equal(&counter, &counter).unwrap());
    assert!(!r.values_equal(&counter, &construct(&r, id)).unwrap());
    assert!(r.static_members(id).contains("LIMIT"));
    assert!(r.has_package("com.acme"));
}

#[test]
fn test_subclass_of_host_class() {
    let (mut r, counter) = registry_with_counter();
    let special = r
        .define(ClassDef::class("com.acme.SpecialCounter").extends(Type::object(counter)))
        .unwrap();
    assert!(r.is_subclass(special, counter));
    assert!(Type::object(counter).is_assignable_from(&Type::object(special), &r));
    let inherited = r.methods(special, "add");
    assert_eq!(inherited.len(), 2);
    assert!(inherited.iter().all(|(owner, _)| *owner == counter));
}

// ══════════════════════════════════════════════════════════════════════════════
// Generics through the built-ins
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_map_member_types_resolve_through_receiver() {
    let r = ClassRegistry::with_builtins();
    let receiver = Type::generic(
        lang::HASH_MAP,
        vec![Type::string(), Type::object(ClassId::INTEGER)],
    );
    let (owner, get) = r.methods(lang::HASH_MAP, "get")[0];
    let ret = receiver.resolve(&get.ret, owner, &HashMap::new(), &r);
    assert_eq!(ret, Type::object(ClassId::INTEGER));
    let (owner, keys) = r.methods(lang::HASH_MAP, "keySet")[0];
    let ret = receiver.resolve(&keys.ret, owner, &HashMap::new(), &r);
    assert_eq!(ret.display(&r), "Collection<String>");
}

#[test]
fn test_iterator_walks_a_list() {
    let r = ClassRegistry::with_builtins();
    let list = lang::new_list(vec![Value::Int(1), Value::Int(2)]);
    let (owner, iterator) = r.methods(lang::ARRAY_LIST, "iterator")[0];
    let call = |owner: ClassId, m: &MethodDef, this: &Value| {
        (m.invoke.clone().unwrap())(&Invocation {
            registry: &r,
            class: owner,
            receiver: Some(this),
            args: &[],
        })
        .unwrap()
    };
    let it = call(owner, iterator, &list);
    let (owner, has_next) = r.methods(lang::ITERATOR, "hasNext")[0];
    let (_, next) = r.methods(lang::ITERATOR, "next")[0];
    let mut seen = Vec::new();
    while call(owner, has_next, &it) == Value::Boolean(true) {
        seen.push(call(owner, next, &it));
    }
    assert_eq!(seen, vec![Value::Int(1), Value::Int(2)]);
}

#[test]
fn test_values_equal_uses_host_equals() {
    let r = ClassRegistry::with_builtins();
    let a = lang::new_list(vec![Value::str("x")]);
    let b = lang::new_list(vec![Value::str("x")]);
    assert!(!a.identical(&b));
    assert!(r.values_equal(&a, &b).unwrap());
    assert!(r.values_equal(&Value::Int(3), &Value::Int(3)).unwrap());
    assert!(!r.values_equal(&Value::Int(3), &Value::Long(3)).unwrap());
}

#[test]
fn test_host_errors_become_exception_objects() {
    let r = ClassRegistry::with_builtins();
    let error = HostError::arithmetic("/ by zero");
    let value = r.new_exception(&error.exception, error.message.clone());
    let Value::Object(o) = &value else {
        panic!("expected an object");
    };
    assert_eq!(o.class, lang::ARITHMETIC_EXCEPTION);
    assert!(r.is_subclass(o.class, ClassId::THROWABLE));
}

// ══════════════════════════════════════════════════════════════════════════════
// Determinism
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_overload_selection_is_deterministic() {
    let r = ClassRegistry::with_builtins();
    let first = select(
        &r,
        "abs",
        &r.methods(lang::MATH, "abs"),
        &[Type::primitive(Primitive::Long)],
        None,
        Lookup::default(),
    )
    .unwrap()
    .params;
    for _ in 0..100 {
        let candidates = r.methods(lang::MATH, "abs");
        let params = select(
            &r,
            "abs",
            &candidates,
            &[Type::primitive(Primitive::Long)],
            None,
            Lookup::default(),
        )
        .unwrap()
        .params;
        assert_eq!(params, first);
    }
}
