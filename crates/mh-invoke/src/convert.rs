//! Argument and return value conversions used by `asType` and
//! `explicitCastArguments`.

use crate::form::{Argument, FormBuilder, FormKind, Intrinsic, NamedFunction};
use crate::handle::CallHandle;
use crate::species::SpeciesRegistry;
use mh_core::value::{box_primitive, convert_primitive, unbox_any, unbox_exact, unbox_widening};
use mh_core::{
    internal, wrong_type, BasicType, ClassRef, Error, PrimitiveKind, Result, TypeDescriptor,
    Value,
};
use std::fmt::{Display, Formatter};

/// One step converting a value between two classes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueConversion {
    /// Checked reference cast.
    Cast(ClassRef),
    Primitive {
        from: PrimitiveKind,
        to: PrimitiveKind,
    },
    Box(PrimitiveKind),
    /// Unboxes a wrapper of exactly this kind.
    Unbox(PrimitiveKind),
    /// Unboxes any wrapper that widens to this kind.
    UnboxWiden(PrimitiveKind),
    /// Unboxes any wrapper with an explicit conversion; null becomes zero.
    UnboxExplicit(PrimitiveKind),
    /// Unboxes any wrapper into the carrier of a basic type.
    UnboxBasic(BasicType),
}

impl ValueConversion {
    pub fn input_type(&self) -> BasicType {
        match self {
            ValueConversion::Primitive { from, .. } => from.basic_type(),
            ValueConversion::Box(kind) => kind.basic_type(),
            _ => BasicType::L,
        }
    }

    pub fn output_type(&self) -> BasicType {
        match self {
            ValueConversion::Cast(_) | ValueConversion::Box(_) => BasicType::L,
            ValueConversion::Primitive { to, .. } => to.basic_type(),
            ValueConversion::Unbox(kind)
            | ValueConversion::UnboxWiden(kind)
            | ValueConversion::UnboxExplicit(kind) => kind.basic_type(),
            ValueConversion::UnboxBasic(ty) => *ty,
        }
    }

    pub fn apply(&self, value: &Value) -> Result<Value> {
        match self {
            ValueConversion::Cast(class) => value.check_cast(class),
            ValueConversion::Primitive { from, to } => Ok(convert_primitive(value, *from, *to)),
            ValueConversion::Box(kind) => Ok(box_primitive(*kind, value.clone())),
            ValueConversion::Unbox(kind) => unbox_exact(value, *kind),
            ValueConversion::UnboxWiden(kind) => unbox_widening(value, *kind),
            ValueConversion::UnboxExplicit(kind) => unbox_explicit(value, *kind),
            ValueConversion::UnboxBasic(ty) => unbox_basic(value, *ty),
        }
    }
}

impl Display for ValueConversion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueConversion::Cast(class) => write!(f, "cast.{}", class.simple_name()),
            ValueConversion::Primitive { from, to } => write!(f, "{}2{}", from, to),
            ValueConversion::Box(kind) => write!(f, "box.{}", kind),
            ValueConversion::Unbox(kind) => write!(f, "unbox.{}", kind),
            ValueConversion::UnboxWiden(kind) => write!(f, "unboxWiden.{}", kind),
            ValueConversion::UnboxExplicit(kind) => write!(f, "unboxCast.{}", kind),
            ValueConversion::UnboxBasic(ty) => write!(f, "unbox.{}", ty),
        }
    }
}

/// Explicit unboxing: null is zero, any wrapper converts.
pub fn unbox_explicit(value: &Value, kind: PrimitiveKind) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::zero(kind.basic_type()));
    }
    match unbox_any(value)? {
        Some((from, inner)) => Ok(convert_primitive(&inner, from, kind)),
        None => Err(Error::ClassCast(format!(
            "{} cannot be converted to {}",
            value.class().map(|class| class.name()).unwrap_or("?"),
            kind
        ))),
    }
}

/// The carrier of basic type `ty` for a boxed value; references pass.
pub fn unbox_basic(value: &Value, ty: BasicType) -> Result<Value> {
    if ty == BasicType::L {
        return Ok(value.clone());
    }
    match unbox_any(value)? {
        Some((_, inner)) if inner.basic_type() == ty => Ok(inner),
        Some((kind, inner)) => match ty.primitive_kind() {
            Some(target) => Ok(convert_primitive(&inner, kind, target)),
            None => internal!("cannot unbox {:?} to {}", value, ty),
        },
        None => Err(Error::ClassCast(format!(
            "{:?} is not a wrapper of {}",
            value, ty
        ))),
    }
}

/// Boxes a carrier value by its basic type; references pass and `Void`
/// becomes null.
pub fn box_basic(value: Value, ty: BasicType) -> Value {
    match (ty.primitive_kind(), &value) {
        (_, Value::Void) => Value::Null,
        (Some(kind), _) if !ty.is_reference() => box_primitive(kind, value),
        _ => value,
    }
}

/// Boxes any primitive carrier by its own basic type.
pub fn box_value(value: Value) -> Value {
    let ty = value.basic_type();
    box_basic(value, ty)
}

/// The steps converting a value of class `src` into class `dst`. In strict
/// mode only `asType` conversions are allowed; otherwise the explicit-cast
/// matrix applies.
pub fn value_conversions(
    src: &ClassRef,
    dst: &ClassRef,
    strict: bool,
) -> Result<Vec<ValueConversion>> {
    if src == dst {
        return Ok(Vec::new());
    }
    let fail = || {
        Err(Error::WrongMethodType(format!(
            "cannot convert {} to {}",
            src.name(),
            dst.name()
        )))
    };
    match (src.primitive_kind(), dst.primitive_kind()) {
        (Some(PrimitiveKind::Void), _) | (_, Some(PrimitiveKind::Void)) => {
            internal!("void conversion {} to {}", src.name(), dst.name())
        }
        (Some(from), Some(to)) => {
            let widening = to.is_convertible_from(from);
            if strict && !widening {
                return fail();
            }
            if widening && from.basic_type() == to.basic_type() {
                Ok(Vec::new())
            } else {
                Ok(vec![ValueConversion::Primitive { from, to }])
            }
        }
        (Some(from), None) => {
            let wrapper = mh_core::classes::wrapper(from);
            if dst.is_assignable_from(wrapper) {
                Ok(vec![ValueConversion::Box(from)])
            } else if strict {
                fail()
            } else {
                match dst.wrapper_kind() {
                    Some(to) => Ok(vec![
                        ValueConversion::Primitive { from, to },
                        ValueConversion::Box(to),
                    ]),
                    None => Ok(vec![
                        ValueConversion::Box(from),
                        ValueConversion::Cast(dst.clone()),
                    ]),
                }
            }
        }
        (None, Some(to)) => {
            if !strict {
                return Ok(vec![ValueConversion::UnboxExplicit(to)]);
            }
            match src.wrapper_kind() {
                Some(from) if from == to => Ok(vec![ValueConversion::Unbox(to)]),
                Some(from) if to.is_convertible_from(from) => {
                    Ok(vec![ValueConversion::UnboxWiden(to)])
                }
                Some(_) => fail(),
                None if src.is_assignable_from(mh_core::classes::wrapper(to)) => {
                    Ok(vec![ValueConversion::UnboxWiden(to)])
                }
                None => fail(),
            }
        }
        (None, None) => {
            if dst.is_assignable_from(src) || (!strict && dst.is_interface()) {
                Ok(Vec::new())
            } else {
                Ok(vec![ValueConversion::Cast(dst.clone())])
            }
        }
    }
}

/// A handle of type `new_ty` converting its arguments to `target`'s
/// parameter types, invoking `target`, and converting the result back.
pub fn make_pairwise_convert(
    target: &CallHandle,
    new_ty: &TypeDescriptor,
    strict: bool,
) -> Result<CallHandle> {
    let old_ty = target.ty();
    if old_ty.parameter_count() != new_ty.parameter_count() {
        wrong_type!("cannot convert {} to {}: arity differs", old_ty, new_ty);
    }
    if strict && !old_ty.is_convertible_to(new_ty) {
        wrong_type!("cannot convert {} to {}", old_ty, new_ty);
    }
    let species = SpeciesRegistry::global().get("L")?;
    let mut b = FormBuilder::for_handle_type(new_ty);
    let callee = b.add(species.getter(0)?, vec![b.param(0)]);
    let mut call_args = vec![Argument::Name(callee)];
    for (i, (src, dst)) in new_ty
        .parameter_types()
        .iter()
        .zip(old_ty.parameter_types())
        .enumerate()
    {
        let mut current = i + 1;
        for conversion in value_conversions(src, dst, strict)? {
            current = b.add(Intrinsic::Convert(conversion), vec![Argument::Name(current)]);
        }
        call_args.push(Argument::Name(current));
    }
    let call = b.add(NamedFunction::InvokeBasic(old_ty.basic_type()), call_args);
    let result = match (old_ty.return_type().is_void(), new_ty.return_type().is_void()) {
        (_, true) => None,
        (true, false) => Some(b.add(
            Intrinsic::Zero(new_ty.return_basic_type()),
            Vec::new(),
        )),
        (false, false) => {
            let mut current = call;
            for conversion in value_conversions(old_ty.return_type(), new_ty.return_type(), strict)? {
                current = b.add(Intrinsic::Convert(conversion), vec![Argument::Name(current)]);
            }
            Some(current)
        }
    };
    let form = b.build(result, FormKind::Convert)?;
    species.construct(new_ty.clone(), form, vec![target.as_value()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use mh_core::classes;
    use pretty_assertions::assert_eq;

    #[test]
    fn strict_conversions_follow_widening_rules() {
        assert_eq!(
            value_conversions(classes::int(), classes::long(), true).unwrap(),
            vec![ValueConversion::Primitive {
                from: PrimitiveKind::Int,
                to: PrimitiveKind::Long
            }]
        );
        assert!(value_conversions(classes::long(), classes::int(), true).is_err());
        assert_eq!(
            value_conversions(classes::int(), classes::object(), true).unwrap(),
            vec![ValueConversion::Box(PrimitiveKind::Int)]
        );
        assert_eq!(
            value_conversions(classes::object(), classes::int(), true).unwrap(),
            vec![ValueConversion::UnboxWiden(PrimitiveKind::Int)]
        );
        assert_eq!(
            value_conversions(classes::string(), classes::object(), true).unwrap(),
            vec![]
        );
        assert_eq!(
            value_conversions(classes::object(), classes::string(), true).unwrap(),
            vec![ValueConversion::Cast(classes::string().clone())]
        );
    }

    #[test]
    fn explicit_conversions_allow_narrowing_and_null() {
        assert_eq!(
            value_conversions(classes::long(), classes::int(), false).unwrap(),
            vec![ValueConversion::Primitive {
                from: PrimitiveKind::Long,
                to: PrimitiveKind::Int
            }]
        );
        let unbox = ValueConversion::UnboxExplicit(PrimitiveKind::Int);
        assert_eq!(unbox.apply(&Value::Null).unwrap(), Value::Int(0));
        let boxed = box_primitive(PrimitiveKind::Double, Value::Double(7.9));
        assert_eq!(unbox.apply(&boxed).unwrap(), Value::Int(7));
        assert!(value_conversions(classes::comparable(), classes::string(), false)
            .unwrap()
            .len()
            == 1);
        assert!(value_conversions(classes::object(), classes::comparable(), false)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn strict_unboxing_failures_are_runtime_errors() {
        let unbox = ValueConversion::UnboxWiden(PrimitiveKind::Int);
        assert!(matches!(unbox.apply(&Value::Null), Err(Error::NullPointer(_))));
        assert!(matches!(
            unbox.apply(&Value::string("x")),
            Err(Error::ClassCast(_))
        ));
    }
}
