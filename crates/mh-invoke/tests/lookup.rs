mod support;

use mh_core::host::{AccessCheck, AccessModes};
use mh_core::member::ResolutionState;
use mh_core::{
    classes, native, ClassBuilder, ClassRef, Error, Modifiers, RefKind, Result, SymbolicMember,
    Value,
};
use mh_invoke::{HostServices, Lookup};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use support::{demo, int, ty};

fn new_counter(class: &ClassRef, start: i32) -> Value {
    let ctor = Lookup::new(class)
        .find_constructor(class, &ty(classes::void(), &[int()]))
        .unwrap();
    ctor.invoke_exact(&ty(class, &[int()]), &[Value::Int(start)])
        .unwrap()
}

#[test]
fn constructors_return_the_new_instance() {
    let d = demo();
    let ctor = Lookup::new(&d.math)
        .find_constructor(&d.counter, &ty(classes::void(), &[int()]))
        .unwrap();
    assert_eq!(ctor.ty(), &ty(&d.counter, &[int()]));
    let counter = ctor
        .invoke_exact(ctor.ty(), &[Value::Int(7)])
        .unwrap();
    let get = Lookup::new(&d.math)
        .find_virtual(&d.counter, "get", &ty(&int(), &[]))
        .unwrap();
    assert_eq!(
        get.invoke_exact(&ty(&int(), &[d.counter.clone()]), &[counter])
            .unwrap(),
        Value::Int(7)
    );
    assert!(matches!(
        Lookup::new(&d.math).find_constructor(&d.counter, &ty(&int(), &[int()])),
        Err(Error::NoSuchMethod(_))
    ));
}

#[test]
fn protected_access_from_another_package_narrows_the_receiver() {
    let d = demo();
    let lookup = Lookup::new(&d.sub_counter);
    let bump = lookup
        .find_virtual(&d.counter, "bump", &ty(&int(), &[]))
        .unwrap();
    let narrowed = ty(&int(), &[d.sub_counter.clone()]);
    assert_eq!(bump.ty(), &narrowed);
    let sub = new_counter(&d.sub_counter, 2);
    assert_eq!(bump.invoke_exact(&narrowed, &[sub]).unwrap(), Value::Int(21));

    let same_package = Lookup::new(&d.math)
        .find_virtual(&d.counter, "bump", &ty(&int(), &[]))
        .unwrap();
    assert_eq!(same_package.ty(), &ty(&int(), &[d.counter.clone()]));
}

#[test]
fn package_private_members_stay_in_their_package() {
    let d = demo();
    let peek = ty(&int(), &[]);
    assert!(matches!(
        Lookup::new(&d.sub_counter).find_virtual(&d.counter, "peek", &peek),
        Err(Error::IllegalAccess(_))
    ));
    let handle = Lookup::new(&d.math)
        .find_virtual(&d.counter, "peek", &peek)
        .unwrap();
    let counter = new_counter(&d.counter, 4);
    assert_eq!(
        handle.invoke_exact(handle.ty(), &[counter]).unwrap(),
        Value::Int(4)
    );
}

#[test]
fn package_private_classes_hide_their_members() {
    let d = demo();
    let secret = ty(&int(), &[]);
    assert!(matches!(
        Lookup::new(&d.sub_counter).find_static(&d.hidden, "secret", &secret),
        Err(Error::IllegalAccess(_))
    ));
    let handle = Lookup::new(&d.math)
        .find_static(&d.hidden, "secret", &secret)
        .unwrap();
    assert_eq!(handle.invoke_exact(&secret, &[]).unwrap(), Value::Int(42));
    assert!(Lookup::new(&d.math)
        .in_class(&d.sub_counter)
        .find_static(&d.hidden, "secret", &secret)
        .is_err());
}

#[test]
fn private_fields_need_full_access() {
    let d = demo();
    assert!(matches!(
        Lookup::public_lookup().find_getter(&d.counter, "count", &int()),
        Err(Error::IllegalAccess(_))
    ));
    assert!(matches!(
        Lookup::new(&d.math).find_getter(&d.counter, "count", &int()),
        Err(Error::IllegalAccess(_))
    ));
    let own = Lookup::new(&d.counter);
    let getter = own.find_getter(&d.counter, "count", &int()).unwrap();
    let setter = own.find_setter(&d.counter, "count", &int()).unwrap();
    assert_eq!(getter.ty(), &ty(&int(), &[d.counter.clone()]));
    let counter = new_counter(&d.counter, 1);
    setter
        .invoke_exact(
            &ty(classes::void(), &[d.counter.clone(), int()]),
            &[counter.clone(), Value::Int(12)],
        )
        .unwrap();
    assert_eq!(
        getter.invoke_exact(getter.ty(), &[counter]).unwrap(),
        Value::Int(12)
    );
}

#[test]
fn static_fields_are_read_and_written_through_handles() {
    let d = demo();
    let lookup = Lookup::new(&d.math);
    let set = lookup
        .find_static_setter(&d.counter, "total", &int())
        .unwrap();
    let get = lookup
        .find_static_getter(&d.counter, "total", &int())
        .unwrap();
    assert_eq!(
        set.invoke_exact(&ty(classes::void(), &[int()]), &[Value::Int(5)])
            .unwrap(),
        Value::Void
    );
    assert_eq!(
        get.invoke_exact(&ty(&int(), &[]), &[]).unwrap(),
        Value::Int(5)
    );
    assert!(matches!(
        lookup.find_getter(&d.counter, "total", &int()),
        Err(Error::IllegalAccess(_))
    ));
}

#[test]
fn virtual_handles_dispatch_on_the_receiver() {
    let d = demo();
    let describe = Lookup::new(&d.math)
        .find_virtual(&d.counter, "describe", &ty(classes::string(), &[]))
        .unwrap();
    let sub = new_counter(&d.sub_counter, 1);
    let plain = new_counter(&d.counter, 1);
    let as_text = |value: Value| value.as_str().unwrap_or_default().to_string();
    assert_eq!(
        as_text(describe.invoke_exact(describe.ty(), &[sub]).unwrap()),
        "sub"
    );
    assert_eq!(
        as_text(describe.invoke_exact(describe.ty(), &[plain]).unwrap()),
        "counter"
    );
}

#[test]
fn special_calls_skip_overrides() {
    let d = demo();
    let lookup = Lookup::new(&d.sub_counter);
    let describe_ty = ty(classes::string(), &[]);
    let special = lookup
        .find_special(&d.counter, "describe", &describe_ty, &d.sub_counter)
        .unwrap();
    assert_eq!(
        special.ty(),
        &ty(classes::string(), &[d.sub_counter.clone()])
    );
    let sub = new_counter(&d.sub_counter, 1);
    let result = special.invoke_exact(special.ty(), &[sub]).unwrap();
    assert_eq!(result.as_str(), Some("counter"));

    assert!(matches!(
        lookup.find_special(&d.counter, "describe", &describe_ty, &d.counter),
        Err(Error::IllegalAccess(_))
    ));
    assert!(matches!(
        lookup
            .drop_lookup_mode(AccessModes::PRIVATE)
            .find_special(&d.counter, "describe", &describe_ty, &d.sub_counter),
        Err(Error::IllegalAccess(_))
    ));
}

#[test]
fn caller_sensitive_members_see_the_lookup_class() {
    let d = demo();
    let name_ty = ty(classes::string(), &[]);
    for class in [&d.counter, &d.sub_counter] {
        let handle = Lookup::new(class)
            .find_static(&d.math, "callerName", &name_ty)
            .unwrap();
        let name = handle.invoke_exact(&name_ty, &[]).unwrap();
        assert_eq!(name.as_str(), Some(class.name()));
    }
}

#[test]
fn public_direct_handles_are_shared() {
    let d = demo();
    let max_ty = ty(&int(), &[int(), int()]);
    let first = Lookup::new(&d.math)
        .find_static(&d.math, "max", &max_ty)
        .unwrap();
    let second = Lookup::new(&d.counter)
        .find_static(&d.math, "max", &max_ty)
        .unwrap();
    assert!(first.ptr_eq(&second));

    let name_ty = ty(classes::string(), &[]);
    let a = Lookup::new(&d.math)
        .find_static(&d.math, "callerName", &name_ty)
        .unwrap();
    let b = Lookup::new(&d.math)
        .find_static(&d.math, "callerName", &name_ty)
        .unwrap();
    assert!(!a.ptr_eq(&b));
}

#[test]
fn symbolic_members_resolve_once() {
    let d = demo();
    let max = SymbolicMember::method(
        &d.math,
        "max",
        ty(&int(), &[int(), int()]),
        RefKind::InvokeStatic,
    );
    assert_eq!(max.resolution_state(), ResolutionState::Unresolved);
    let handle = Lookup::new(&d.counter).resolve_member(&max).unwrap();
    assert_eq!(max.resolution_state(), ResolutionState::Resolved);
    assert_eq!(
        handle
            .invoke_exact(handle.ty(), &[Value::Int(2), Value::Int(9)])
            .unwrap(),
        Value::Int(9)
    );

    let missing = SymbolicMember::method(&d.math, "min", ty(&int(), &[]), RefKind::InvokeStatic);
    assert!(matches!(
        Lookup::new(&d.math).resolve_member(&missing),
        Err(Error::NoSuchMethod(_))
    ));
    assert_eq!(missing.resolution_state(), ResolutionState::Failed);
    assert!(matches!(
        Lookup::new(&d.math).resolve_member(&missing),
        Err(Error::NoSuchMethod(_))
    ));
}

#[test]
fn resolved_members_are_still_access_checked() {
    let d = demo();
    let peek = SymbolicMember::method(&d.counter, "peek", ty(&int(), &[]), RefKind::InvokeVirtual);
    assert!(Lookup::new(&d.math).resolve_member(&peek).is_ok());
    assert_eq!(peek.resolution_state(), ResolutionState::Resolved);
    assert!(matches!(
        Lookup::new(&d.sub_counter).resolve_member(&peek),
        Err(Error::IllegalAccess(_))
    ));
}

#[test]
fn bind_fixes_the_receiver() {
    let d = demo();
    let counter = new_counter(&d.counter, 7);
    let add = Lookup::new(&d.math)
        .bind(&counter, "add", &ty(&int(), &[int()]))
        .unwrap();
    assert_eq!(add.ty(), &ty(&int(), &[int()]));
    assert_eq!(
        add.invoke_exact(add.ty(), &[Value::Int(3)]).unwrap(),
        Value::Int(10)
    );
    assert_eq!(
        add.invoke_exact(add.ty(), &[Value::Int(1)]).unwrap(),
        Value::Int(11)
    );
    assert!(matches!(
        Lookup::new(&d.math).bind(&Value::Null, "add", &ty(&int(), &[int()])),
        Err(Error::NullPointer(_))
    ));
}

fn returning(text: &'static str) -> mh_core::NativeMethod {
    native(move |_, _| Ok(Value::string(text)))
}

#[test]
fn private_methods_are_never_overridden() {
    let name_ty = ty(classes::string(), &[]);
    let base = ClassBuilder::new("dispatch.Base")
        .method("who", name_ty.clone(), Modifiers::PRIVATE, returning("base-private"))
        .method("call", name_ty.clone(), Modifiers::PUBLIC, returning("base-call"))
        .build();
    let sub = ClassBuilder::new("dispatch.Sub")
        .superclass(&base)
        .method("who", name_ty.clone(), Modifiers::PUBLIC, returning("sub-public"))
        .method("call", name_ty.clone(), Modifiers::PRIVATE, returning("sub-private"))
        .build();
    let instance = Value::Ref(mh_core::Object::new_instance(&sub));
    let lookup = Lookup::new(&base);

    let who = lookup.find_virtual(&base, "who", &name_ty).unwrap();
    let result = who.invoke_exact(who.ty(), &[instance.clone()]).unwrap();
    assert_eq!(result.as_str(), Some("base-private"));

    let call = lookup.find_virtual(&base, "call", &name_ty).unwrap();
    let result = call.invoke_exact(call.ty(), &[instance.clone()]).unwrap();
    assert_eq!(result.as_str(), Some("base-call"));

    let own = Lookup::new(&sub).find_virtual(&sub, "who", &name_ty).unwrap();
    let result = own.invoke_exact(own.ty(), &[instance]).unwrap();
    assert_eq!(result.as_str(), Some("sub-public"));
}

struct SamePackageOnly;

impl AccessCheck for SamePackageOnly {
    fn check(
        &self,
        context: &ClassRef,
        declaring: &ClassRef,
        _modifiers: Modifiers,
        _requested: AccessModes,
    ) -> Result<bool> {
        Ok(context.same_package(declaring))
    }
}

#[test]
fn host_access_policy_can_veto() {
    let d = demo();
    let services = HostServices {
        access: Arc::new(SamePackageOnly),
        ..HostServices::default()
    };
    let strict = Lookup::with_services(&d.sub_counter, services);
    assert!(matches!(
        strict.find_virtual(&d.counter, "describe", &ty(classes::string(), &[])),
        Err(Error::IllegalAccess(_))
    ));
    assert!(strict
        .find_virtual(&d.sub_counter, "describe", &ty(classes::string(), &[]))
        .is_ok());
}
