use mh_core::{classes, ClassBuilder, Error, Modifiers, Object, Value};
use pretty_assertions::assert_eq;

#[test]
fn arrays_are_covariant_for_references_only() {
    let strings = classes::string().array_type();
    let objects = classes::object().array_type();
    let ints = classes::int().array_type();
    assert!(objects.is_assignable_from(&strings));
    assert!(!strings.is_assignable_from(&objects));
    assert!(!objects.is_assignable_from(&ints));
    assert!(classes::object().is_assignable_from(&ints));
    assert_eq!(strings.component_type(), Some(classes::string()));
}

#[test]
fn array_stores_check_the_component_type() {
    let strings = classes::string().array_type();
    let array = Object::new_array(&strings, 2).unwrap();
    assert_eq!(array.array_load(0).unwrap(), Value::Null);
    array.array_store(1, Value::string("b")).unwrap();
    assert!(matches!(
        array.array_store(0, Value::Int(3)),
        Err(Error::ArrayStore(_))
    ));
    assert!(array.array_load(2).is_err());
    assert_eq!(array.array_length().unwrap(), 2);
}

#[test]
fn user_classes_join_the_hierarchy() {
    let base = ClassBuilder::new("zoo.Animal").build();
    let cat = ClassBuilder::new("zoo.Cat").superclass(&base).build();
    let stray = ClassBuilder::new("street.Stray")
        .modifiers(Modifiers::empty())
        .superclass(&cat)
        .build();
    assert!(base.is_assignable_from(&stray));
    assert!(!stray.is_assignable_from(&base));
    assert!(cat.same_package(&base));
    assert!(!stray.same_package(&cat));
    assert!(!stray.is_public());
    let instance = Value::Ref(Object::new_instance(&stray));
    assert!(base.is_instance(&instance));
    assert!(!base.is_instance(&Value::Null));
    assert!(matches!(
        instance.check_cast(classes::string()),
        Err(Error::ClassCast(_))
    ));
}

#[test]
fn thrown_errors_keep_their_class() {
    let custom = ClassBuilder::new("zoo.EscapedException")
        .superclass(classes::runtime_exception())
        .build();
    let err = Error::throw(&custom, "gone");
    assert!(err.is_instance_of(classes::runtime_exception()));
    assert!(err.is_instance_of(&custom));
    assert!(!err.is_instance_of(classes::arithmetic_exception()));
    let back = Error::from_throwable(err.to_throwable());
    assert_eq!(back.exception_class(), custom);
    assert_eq!(
        Error::NullPointer("x".into()).exception_class(),
        classes::null_pointer_exception().clone()
    );
}
