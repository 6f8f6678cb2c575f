#![allow(dead_code)]

use mh_core::{
    classes, native, ClassBuilder, ClassRef, Error, MemberDef, Modifiers, TypeDescriptor, Value,
};
use once_cell::sync::Lazy;

pub struct Demo {
    /// `demo.MathOps`: static helpers.
    pub math: ClassRef,
    /// `demo.Counter`: an int field behind members of every access level.
    pub counter: ClassRef,
    /// `other.SubCounter extends demo.Counter`.
    pub sub_counter: ClassRef,
    /// `demo.Hidden`: package-private class.
    pub hidden: ClassRef,
}

pub static DEMO: Lazy<Demo> = Lazy::new(build);

pub fn demo() -> &'static Demo {
    &DEMO
}

pub fn int() -> ClassRef {
    classes::int().clone()
}

pub fn ty(ret: &ClassRef, params: &[ClassRef]) -> TypeDescriptor {
    TypeDescriptor::of(ret, params).unwrap()
}

fn int_arg(args: &[Value], index: usize) -> i32 {
    args.get(index).and_then(Value::as_int).unwrap_or_default()
}

fn static_method(name: &str, ty: TypeDescriptor, body: mh_core::NativeMethod) -> MemberDef {
    MemberDef::method(name, ty, Modifiers::PUBLIC | Modifiers::STATIC, body)
}

fn build() -> Demo {
    let int = int();
    let object_array = classes::object().array_type();
    let math = ClassBuilder::new("demo.MathOps")
        .member(static_method(
            "max",
            ty(&int, &[int.clone(), int.clone()]),
            native(|args, _| Ok(Value::Int(int_arg(args, 0).max(int_arg(args, 1))))),
        ))
        .member(static_method(
            "negate",
            ty(&int, &[int.clone()]),
            native(|args, _| Ok(Value::Int(-int_arg(args, 0)))),
        ))
        .member(static_method(
            "isNegative",
            ty(classes::boolean(), &[int.clone()]),
            native(|args, _| Ok(Value::boolean(int_arg(args, 0) < 0))),
        ))
        .member(static_method(
            "divide",
            ty(&int, &[int.clone(), int.clone()]),
            native(|args, _| {
                let divisor = int_arg(args, 1);
                if divisor == 0 {
                    return Err(Error::throw(classes::arithmetic_exception(), "/ by zero"));
                }
                Ok(Value::Int(int_arg(args, 0) / divisor))
            }),
        ))
        .member(static_method(
            "returnZero",
            ty(&int, &[classes::arithmetic_exception().clone()]),
            native(|_, _| Ok(Value::Int(0))),
        ))
        .member(static_method(
            "digits",
            ty(&int, &[int.clone(), int.clone(), int.clone()]),
            native(|args, _| {
                Ok(Value::Int(
                    int_arg(args, 0) * 100 + int_arg(args, 1) * 10 + int_arg(args, 2),
                ))
            }),
        ))
        .member(static_method(
            "concat",
            ty(
                classes::string(),
                &[classes::string().clone(), classes::string().clone()],
            ),
            native(|args, _| {
                let left = args.first().and_then(Value::as_str).unwrap_or("null");
                let right = args.get(1).and_then(Value::as_str).unwrap_or("null");
                Ok(Value::string(format!("{}{}", left, right)))
            }),
        ))
        .member(MemberDef::method(
            "count",
            ty(&int, &[object_array]),
            Modifiers::PUBLIC | Modifiers::STATIC | Modifiers::VARARGS,
            native(|args, _| {
                let length = match args.first() {
                    Some(Value::Ref(array)) => array.array_length()?,
                    _ => 0,
                };
                Ok(Value::Int(length as i32))
            }),
        ))
        .member(
            static_method(
                "callerName",
                ty(classes::string(), &[]),
                native(|_, caller| {
                    Ok(Value::string(
                        caller.map(|class| class.name().to_string()).unwrap_or_default(),
                    ))
                }),
            )
            .caller_sensitive(),
        )
        .build();

    let counter = ClassBuilder::new("demo.Counter")
        .field("count", &int, Modifiers::PRIVATE)
        .field("total", &int, Modifiers::PUBLIC | Modifiers::STATIC)
        .constructor(
            ty(classes::void(), &[int.clone()]),
            Modifiers::PUBLIC,
            native(|args, _| {
                args[0]
                    .require_object("this")?
                    .set_field(0, Value::Int(int_arg(args, 1)))?;
                Ok(Value::Void)
            }),
        )
        .method(
            "get",
            ty(&int, &[]),
            Modifiers::PUBLIC,
            native(|args, _| args[0].require_object("this")?.get_field(0)),
        )
        .method(
            "add",
            ty(&int, &[int.clone()]),
            Modifiers::PUBLIC,
            native(|args, _| {
                let this = args[0].require_object("this")?;
                let value = this.get_field(0)?.as_int().unwrap_or_default() + int_arg(args, 1);
                this.set_field(0, Value::Int(value))?;
                Ok(Value::Int(value))
            }),
        )
        .method(
            "bump",
            ty(&int, &[]),
            Modifiers::PROTECTED,
            native(|args, _| {
                let this = args[0].require_object("this")?;
                let value = this.get_field(0)?.as_int().unwrap_or_default() + 1;
                this.set_field(0, Value::Int(value))?;
                Ok(Value::Int(value))
            }),
        )
        .method(
            "peek",
            ty(&int, &[]),
            Modifiers::empty(),
            native(|args, _| args[0].require_object("this")?.get_field(0)),
        )
        .method(
            "describe",
            ty(classes::string(), &[]),
            Modifiers::PUBLIC,
            native(|_, _| Ok(Value::string("counter"))),
        )
        .build();

    let sub_counter = ClassBuilder::new("other.SubCounter")
        .superclass(&counter)
        .constructor(
            ty(classes::void(), &[int.clone()]),
            Modifiers::PUBLIC,
            native(|args, _| {
                args[0]
                    .require_object("this")?
                    .set_field(0, Value::Int(int_arg(args, 1) * 10))?;
                Ok(Value::Void)
            }),
        )
        .method(
            "describe",
            ty(classes::string(), &[]),
            Modifiers::PUBLIC,
            native(|_, _| Ok(Value::string("sub"))),
        )
        .build();

    let hidden = ClassBuilder::new("demo.Hidden")
        .modifiers(Modifiers::empty())
        .method(
            "secret",
            ty(&int, &[]),
            Modifiers::PUBLIC | Modifiers::STATIC,
            native(|_, _| Ok(Value::Int(42))),
        )
        .build();

    Demo {
        math,
        counter,
        sub_counter,
        hidden,
    }
}
