//! Handle combinators.
//!
//! Each combinator validates its inputs, then either picks a canonical
//! form for a fresh handle or edits the form of a rebound target so that
//! handles built the same way share forms.

use crate::convert::{box_value, make_pairwise_convert, ValueConversion};
use crate::form::{
    add_argument_form, canonical_form, collect_arguments_form, filter_argument_form,
    filter_return_form, fold_arguments_form, permute_arguments_form, Argument, FormBuilder,
    FormKind, FormRef, Intrinsic, NamedFunction,
};
use crate::handle::{make_counting, CallHandle};
use crate::species::{Species, SpeciesRegistry};
use mh_core::collections::ConcurrentMap;
use mh_core::value::unbox_widening;
use mh_core::{
    classes, ensure_arg, illegal_argument, internal, wrong_type, BasicType, ClassRef, Result,
    TypeDescriptor, Value,
};
use once_cell::sync::Lazy;
use std::sync::Arc;

fn returns(ty: &TypeDescriptor, result: usize) -> Option<usize> {
    (!ty.return_type().is_void()).then_some(result)
}

/// Coerces a caller-supplied value to `class`: references are cast,
/// primitives unboxed and widened.
fn coerce_value(value: Value, class: &ClassRef) -> Result<Value> {
    match class.primitive_kind() {
        Some(kind) => match value {
            Value::Ref(_) | Value::Null => unbox_widening(&value, kind),
            carrier if carrier.basic_type() == kind.basic_type() => Ok(carrier),
            carrier => unbox_widening(&box_value(carrier), kind),
        },
        None => box_value(value).check_cast(class),
    }
}

/// `(T)T` returning its argument.
pub fn identity(class: &ClassRef) -> Result<CallHandle> {
    ensure_arg!(!class.is_void(), "identity of void");
    let ty = TypeDescriptor::of(class, &[class.clone()])?;
    let bt = class.basic_type();
    let form = canonical_form(FormKind::Identity, ty.basic_signature(), || {
        let mut b = FormBuilder::new(&[BasicType::L, bt]);
        let result = b.add(Intrinsic::Identity(bt), vec![b.param(1)]);
        b.build(Some(result), FormKind::Identity)
    })?;
    CallHandle::simple(ty, form)
}

/// `()T` returning `value` converted to `class`.
pub fn constant(class: &ClassRef, value: Value) -> Result<CallHandle> {
    ensure_arg!(!class.is_void(), "constant of void");
    let value = coerce_value(value, class)?;
    let bt = class.basic_type();
    let species = SpeciesRegistry::global().get(&bt.as_char().to_string())?;
    let ty = TypeDescriptor::of(class, &[])?;
    let form = canonical_form(FormKind::Constant, ty.basic_signature(), || {
        let mut b = FormBuilder::new(&[BasicType::L]);
        let result = b.add(species.getter(0)?, vec![b.param(0)]);
        b.build(Some(result), FormKind::Constant)
    })?;
    species.construct(ty, form, vec![value])
}

/// `()T` returning the zero of `class`; for void, returning nothing.
pub fn zero(class: &ClassRef) -> Result<CallHandle> {
    let ty = TypeDescriptor::of(class, &[])?;
    let bt = class.basic_type();
    let form = canonical_form(FormKind::Zero, ty.basic_signature(), || {
        let mut b = FormBuilder::new(&[BasicType::L]);
        let result = b.add(Intrinsic::Zero(bt), Vec::new());
        b.build(returns(&ty, result), FormKind::Zero)
    })?;
    CallHandle::simple(ty, form)
}

/// Ignores its arguments and returns the zero of the return type.
pub fn empty(ty: &TypeDescriptor) -> Result<CallHandle> {
    drop_arguments(&zero(ty.return_type())?, 0, ty.parameter_types())
}

/// `(E)R` throwing its argument.
pub fn throw_exception(rtype: &ClassRef, exception: &ClassRef) -> Result<CallHandle> {
    ensure_arg!(exception.is_throwable(), "not a throwable type: {}", exception);
    let ty = TypeDescriptor::of(rtype, &[exception.clone()])?;
    let bt = rtype.basic_type();
    let form = canonical_form(FormKind::Throw, ty.basic_signature(), || {
        let mut b = FormBuilder::new(&[BasicType::L, BasicType::L]);
        let result = b.add(Intrinsic::Throw(bt), vec![b.param(1)]);
        b.build(returns(&ty, result), FormKind::Throw)
    })?;
    CallHandle::simple(ty, form)
}

/// Fixes the parameters starting at `pos` to `values`.
pub fn insert_arguments(target: &CallHandle, pos: usize, values: &[Value]) -> Result<CallHandle> {
    let ty = target.ty();
    ensure_arg!(
        pos + values.len() <= ty.parameter_count(),
        "too many values to insert: {} at {} into {}",
        values.len(),
        pos,
        ty
    );
    let mut result = target.clone();
    for (i, value) in values.iter().enumerate() {
        let value = coerce_value(value.clone(), ty.parameter_type(pos + i))?;
        result = result.bind_argument(pos, value)?;
    }
    Ok(result)
}

/// Accepts and ignores extra parameters of `types` before parameter `pos`.
pub fn drop_arguments(target: &CallHandle, pos: usize, types: &[ClassRef]) -> Result<CallHandle> {
    let ty = target.ty();
    ensure_arg!(
        pos <= ty.parameter_count(),
        "no argument position {} in {}",
        pos,
        ty
    );
    let new_ty = ty.insert_parameter_types(pos, types)?;
    if types.is_empty() {
        return Ok(target.clone());
    }
    let this = target.rebind()?;
    let mut form: FormRef = this.base_form().clone();
    for (i, class) in types.iter().enumerate() {
        form = add_argument_form(&form, pos + 1 + i, class.basic_type())?;
    }
    this.copy_with(new_ty, form)
}

/// Passes the arguments starting at `pos` through unary `filters`; `None`
/// leaves an argument unchanged.
pub fn filter_arguments(
    target: &CallHandle,
    pos: usize,
    filters: &[Option<CallHandle>],
) -> Result<CallHandle> {
    let ty = target.ty();
    ensure_arg!(
        pos + filters.len() <= ty.parameter_count(),
        "too many filters: {} at {} for {}",
        filters.len(),
        pos,
        ty
    );
    let mut result = target.clone();
    for (i, filter) in filters.iter().enumerate() {
        let Some(filter) = filter else {
            continue;
        };
        let fty = filter.ty();
        ensure_arg!(
            fty.parameter_count() == 1 && fty.return_type() == ty.parameter_type(pos + i),
            "target and filter types do not match: {}, {}",
            ty,
            fty
        );
        result = filter_argument(&result, pos + i, filter)?;
    }
    Ok(result)
}

fn filter_argument(target: &CallHandle, pos: usize, filter: &CallHandle) -> Result<CallHandle> {
    let new_ty = target
        .ty()
        .change_parameter_type(pos, filter.ty().parameter_type(0))?;
    let this = target.rebind()?;
    let species = bound_species(&this)?.extend_with(BasicType::L)?;
    let form = filter_argument_form(this.base_form(), pos + 1, &filter.ty().basic_type(), &species)?;
    this.copy_with_extend_l(new_ty, form, filter.as_value())
}

fn bound_species(handle: &CallHandle) -> Result<Arc<Species>> {
    match handle.captured() {
        Some(captured) => Ok(captured.species().clone()),
        None => internal!("{:?} is not bound", handle),
    }
}

/// Passes the result of `target` through `filter`.
pub fn filter_return_value(target: &CallHandle, filter: &CallHandle) -> Result<CallHandle> {
    let ty = target.ty();
    let fty = filter.ty();
    let fits = if ty.return_type().is_void() {
        fty.parameter_count() == 0
    } else {
        fty.parameter_count() == 1 && fty.parameter_type(0) == ty.return_type()
    };
    ensure_arg!(fits, "target and filter types do not match: {}, {}", ty, fty);
    let new_ty = ty.change_return_type(fty.return_type());
    let this = target.rebind()?;
    let species = bound_species(&this)?.extend_with(BasicType::L)?;
    let form = filter_return_form(this.base_form(), &fty.basic_type(), &species)?;
    this.copy_with_extend_l(new_ty, form, filter.as_value())
}

/// Runs `combiner` on the leading arguments and, unless it returns void,
/// passes its result as an extra leading argument.
pub fn fold_arguments(target: &CallHandle, combiner: &CallHandle) -> Result<CallHandle> {
    fold_arguments_at(target, 0, combiner)
}

pub fn fold_arguments_at(target: &CallHandle, pos: usize, combiner: &CallHandle) -> Result<CallHandle> {
    let ty = target.ty();
    let cty = combiner.ty();
    let produces = !cty.return_type().is_void();
    let first = pos + usize::from(produces);
    let fits = first + cty.parameter_count() <= ty.parameter_count()
        && (!produces || cty.return_type() == ty.parameter_type(pos))
        && cty.parameter_types() == &ty.parameter_types()[first..first + cty.parameter_count()];
    ensure_arg!(fits, "target and combiner types do not match: {}, {}", ty, cty);
    let new_ty = if produces {
        ty.drop_parameter_types(pos, pos + 1)?
    } else {
        ty.clone()
    };
    let this = target.rebind()?;
    let species = bound_species(&this)?.extend_with(BasicType::L)?;
    let form = fold_arguments_form(this.base_form(), pos + 1, &cty.basic_type(), &species)?;
    this.copy_with_extend_l(new_ty, form, combiner.as_value())
}

/// Replaces parameter `pos` by the parameters of `filter`, whose result
/// becomes the argument. A void filter only inserts its parameters.
pub fn collect_arguments(target: &CallHandle, pos: usize, filter: &CallHandle) -> Result<CallHandle> {
    let ty = target.ty();
    let fty = filter.ty();
    let new_ty = if fty.return_type().is_void() {
        ensure_arg!(pos <= ty.parameter_count(), "no argument position {} in {}", pos, ty);
        ty.insert_parameter_types(pos, fty.parameter_types())?
    } else {
        ensure_arg!(
            pos < ty.parameter_count() && fty.return_type() == ty.parameter_type(pos),
            "target and filter types do not match: {}, {}",
            ty,
            fty
        );
        ty.replace_parameter_types(pos, pos + 1, fty.parameter_types())?
    };
    let this = target.rebind()?;
    let species = bound_species(&this)?.extend_with(BasicType::L)?;
    let form = collect_arguments_form(this.base_form(), pos + 1, &fty.basic_type(), &species)?;
    this.copy_with_extend_l(new_ty, form, filter.as_value())
}

/// A handle of `new_ty` passing its argument `reorder[i]` as argument `i`
/// of `target`. Arguments may be duplicated or dropped.
pub fn permute_arguments(
    target: &CallHandle,
    new_ty: &TypeDescriptor,
    reorder: &[usize],
) -> Result<CallHandle> {
    let ty = target.ty();
    ensure_arg!(
        reorder.len() == ty.parameter_count(),
        "bad reorder array: {:?} for {}",
        reorder,
        ty
    );
    ensure_arg!(
        new_ty.return_type() == ty.return_type(),
        "return types do not match: {}, {}",
        ty,
        new_ty
    );
    for (i, source) in reorder.iter().enumerate() {
        ensure_arg!(
            *source < new_ty.parameter_count(),
            "index is out of bounds for new type: {} {}",
            source,
            new_ty
        );
        ensure_arg!(
            new_ty.parameter_type(*source) == ty.parameter_type(i),
            "parameter types do not match after reorder: {}, {}",
            ty,
            new_ty
        );
    }
    let this = target.rebind()?;
    let form = permute_arguments_form(
        this.base_form(),
        1,
        reorder,
        &new_ty.parameter_basic_types(),
    )?;
    this.copy_with(new_ty.clone(), form)
}

/// Like `as_type`, but with the explicit-cast conversions: narrowing,
/// unboxing null to zero and casts to interfaces always succeed.
pub fn explicit_cast_arguments(target: &CallHandle, new_ty: &TypeDescriptor) -> Result<CallHandle> {
    if target.ty().parameter_count() != new_ty.parameter_count() {
        wrong_type!("cannot convert {} to {}: arity differs", target.ty(), new_ty);
    }
    if target.ty() == new_ty {
        return Ok(target.clone());
    }
    make_pairwise_convert(target, new_ty, false)
}

/// Runs `target` if `test` holds for the leading arguments, `fallback`
/// otherwise.
pub fn guard_with_test(
    test: &CallHandle,
    target: &CallHandle,
    fallback: &CallHandle,
) -> Result<CallHandle> {
    let ty = target.ty();
    let tty = test.ty();
    ensure_arg!(
        ty == fallback.ty(),
        "target and fallback types must match: {}, {}",
        ty,
        fallback.ty()
    );
    ensure_arg!(
        tty.return_type() == classes::boolean(),
        "guard type is not a predicate: {}",
        tty
    );
    let k = tty.parameter_count();
    ensure_arg!(
        k <= ty.parameter_count() && tty.parameter_types() == &ty.parameter_types()[..k],
        "target and test types must match: {}, {}",
        ty,
        tty
    );
    let test = drop_arguments(test, k, &ty.parameter_types()[k..])?;
    let target = make_counting(target)?;
    let fallback = make_counting(fallback)?;

    let basic = ty.basic_type();
    let species = SpeciesRegistry::global().get("LLL")?;
    let form = canonical_form(FormKind::GuardWithTest, basic.basic_signature(), || {
        let test_ty = basic.change_return_type(classes::int());
        let mut b = FormBuilder::for_handle_type(&basic);
        let handle = b.param(0);
        let test = b.add(species.getter(0)?, vec![handle.clone()]);
        let target = b.add(species.getter(1)?, vec![handle.clone()]);
        let fallback = b.add(species.getter(2)?, vec![handle]);
        let mut args = vec![Argument::Name(test)];
        args.extend(b.params(1..b.arity()));
        let outcome = b.add(NamedFunction::InvokeBasic(test_ty), args);
        let chosen = b.add(
            Intrinsic::SelectAlternative,
            vec![
                Argument::Name(outcome),
                Argument::Name(target),
                Argument::Name(fallback),
            ],
        );
        let mut args = vec![Argument::Name(chosen)];
        args.extend(b.params(1..b.arity()));
        let result = b.add(NamedFunction::InvokeBasic(basic.clone()), args);
        b.build(returns(&basic, result), FormKind::GuardWithTest)
    })?;
    species.construct(
        ty.clone(),
        form,
        vec![test.as_value(), target.as_value(), fallback.as_value()],
    )
}

/// Runs `target`; if it fails with an instance of `exception`, runs
/// `handler` on the throwable followed by the leading arguments.
pub fn catch_exception(
    target: &CallHandle,
    exception: &ClassRef,
    handler: &CallHandle,
) -> Result<CallHandle> {
    let ty = target.ty();
    let hty = handler.ty();
    ensure_arg!(exception.is_throwable(), "not a throwable type: {}", exception);
    ensure_arg!(
        hty.return_type() == ty.return_type(),
        "target and handler return types must match: {}, {}",
        ty,
        hty
    );
    let k = hty.parameter_count();
    ensure_arg!(
        k >= 1
            && hty.parameter_type(0).is_assignable_from(exception)
            && k - 1 <= ty.parameter_count()
            && hty.parameter_types()[1..] == ty.parameter_types()[..k - 1],
        "handler does not accept the exception and leading arguments: {}, {}",
        hty,
        ty
    );
    let handler = drop_arguments(handler, k, &ty.parameter_types()[k - 1..])?;

    let basic = ty.basic_type();
    let rt = basic.return_basic_type();
    let species = SpeciesRegistry::global().get("LLL")?;
    let form = canonical_form(FormKind::GuardWithCatch, basic.basic_signature(), || {
        let mut b = FormBuilder::for_handle_type(&basic);
        let handle = b.param(0);
        let target = b.add(species.getter(0)?, vec![handle.clone()]);
        let caught = b.add(species.getter(1)?, vec![handle.clone()]);
        let handler = b.add(species.getter(2)?, vec![handle]);
        let mut boxed = Vec::new();
        for i in 1..b.arity() {
            let arg = match b.ty(i).primitive_kind() {
                Some(kind) => Argument::Name(b.add(
                    Intrinsic::Convert(ValueConversion::Box(kind)),
                    vec![b.param(i)],
                )),
                None => b.param(i),
            };
            boxed.push(arg);
        }
        let array = b.add(
            Intrinsic::NewArray {
                array: classes::object().array_type(),
                count: boxed.len(),
            },
            boxed,
        );
        let outcome = b.add(
            Intrinsic::GuardWithCatch(rt),
            vec![
                Argument::Name(target),
                Argument::Name(caught),
                Argument::Name(handler),
                Argument::Name(array),
            ],
        );
        let result = match rt {
            BasicType::V => None,
            BasicType::L => Some(outcome),
            _ => Some(b.add(
                Intrinsic::Convert(ValueConversion::UnboxBasic(rt)),
                vec![Argument::Name(outcome)],
            )),
        };
        b.build(result, FormKind::GuardWithCatch)
    })?;
    species.construct(
        ty.clone(),
        form,
        vec![
            target.as_value(),
            Value::class_object(exception),
            handler.as_value(),
        ],
    )
}

fn component_of(array: &ClassRef) -> Result<ClassRef> {
    match array.component_type() {
        Some(component) => Ok(component.clone()),
        None => illegal_argument!("not an array type: {}", array),
    }
}

fn array_form(
    op: &str,
    array: &ClassRef,
    params: &[BasicType],
    make: impl FnOnce(&mut FormBuilder) -> Intrinsic,
) -> Result<FormRef> {
    canonical_form(FormKind::ArrayOp, format!("{}:{}", op, array.name()), || {
        let mut b = FormBuilder::new(params);
        let intrinsic = make(&mut b);
        let void = intrinsic.return_type().is_void();
        let args = b.params(1..b.arity());
        let result = b.add(intrinsic, args);
        b.build((!void).then_some(result), FormKind::ArrayOp)
    })
}

/// `(int)A[]` allocating a zeroed array.
pub fn array_constructor(array: &ClassRef) -> Result<CallHandle> {
    component_of(array)?;
    let ty = TypeDescriptor::of(array, &[classes::int().clone()])?;
    let form = array_form("new", array, &[BasicType::L, BasicType::I], |_| {
        Intrinsic::AllocArray {
            array: array.clone(),
        }
    })?;
    CallHandle::simple(ty, form)
}

/// `(A[], int)A`.
pub fn array_element_getter(array: &ClassRef) -> Result<CallHandle> {
    let component = component_of(array)?;
    let ty = TypeDescriptor::of(&component, &[array.clone(), classes::int().clone()])?;
    let params = [BasicType::L, BasicType::L, BasicType::I];
    let form = array_form("get", array, &params, |_| Intrinsic::ArrayLoad {
        array: array.clone(),
    })?;
    CallHandle::simple(ty, form)
}

/// `(A[], int, A)void`.
pub fn array_element_setter(array: &ClassRef) -> Result<CallHandle> {
    let component = component_of(array)?;
    let ty = TypeDescriptor::of(
        classes::void(),
        &[array.clone(), classes::int().clone(), component.clone()],
    )?;
    let params = [BasicType::L, BasicType::L, BasicType::I, component.basic_type()];
    let form = array_form("set", array, &params, |_| Intrinsic::ArrayStore {
        array: array.clone(),
    })?;
    CallHandle::simple(ty, form)
}

/// `(A[])int`.
pub fn array_length(array: &ClassRef) -> Result<CallHandle> {
    component_of(array)?;
    let ty = TypeDescriptor::of(classes::int(), &[array.clone()])?;
    let form = array_form("length", array, &[BasicType::L, BasicType::L], |_| {
        Intrinsic::ArrayLength
    })?;
    CallHandle::simple(ty, form)
}

static COLLECTORS: Lazy<ConcurrentMap<(ClassRef, usize), CallHandle>> =
    Lazy::new(ConcurrentMap::new);

/// `(A, A, ..)A[]` packing `count` arguments into a new array.
pub fn array_collector(array: &ClassRef, count: usize) -> Result<CallHandle> {
    let component = component_of(array)?;
    COLLECTORS.try_get_or_insert_with((array.clone(), count), || {
        let ty = TypeDescriptor::of(array, &vec![component.clone(); count])?;
        let mut params = vec![BasicType::L];
        params.extend(ty.parameter_basic_types());
        let form = canonical_form(
            FormKind::Collector,
            format!("{}:{}", count, array.name()),
            || {
                let mut b = FormBuilder::new(&params);
                let result = b.add(
                    Intrinsic::NewArray {
                        array: array.clone(),
                        count,
                    },
                    b.params(1..b.arity()),
                );
                b.build(Some(result), FormKind::Collector)
            },
        )?;
        CallHandle::simple(ty, form)
    })
}

fn invoker_handle(ty: &TypeDescriptor, kind: FormKind, check: Intrinsic) -> Result<CallHandle> {
    let invoker_ty = ty.insert_parameter_types(0, &[classes::method_handle().clone()])?;
    let form = canonical_form(kind, ty.to_descriptor_string(), || {
        let mut b = FormBuilder::for_handle_type(&invoker_ty);
        let callee = b.add(check, vec![b.param(1)]);
        let mut args = vec![Argument::Name(callee)];
        args.extend(b.params(2..b.arity()));
        let result = b.add(NamedFunction::InvokeBasic(ty.basic_type()), args);
        b.build(returns(ty, result), kind)
    })?;
    CallHandle::simple(invoker_ty, form)
}

/// `(MethodHandle, args..)R` invoking a handle whose type must be exactly
/// `ty`.
pub fn exact_invoker(ty: &TypeDescriptor) -> Result<CallHandle> {
    invoker_handle(ty, FormKind::ExactInvoker, Intrinsic::CheckExactType(ty.clone()))
}

/// `(MethodHandle, args..)R` adapting the handle to `ty` before invoking.
pub fn invoker(ty: &TypeDescriptor) -> Result<CallHandle> {
    invoker_handle(ty, FormKind::Invoker, Intrinsic::AsType(ty.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mh_core::value::box_primitive;
    use mh_core::{Error, PrimitiveKind};
    use pretty_assertions::assert_eq;

    fn int_ty(n: usize) -> TypeDescriptor {
        TypeDescriptor::of(classes::int(), &vec![classes::int().clone(); n]).unwrap()
    }

    #[test]
    fn identity_forms_are_shared_by_basic_type() {
        let ints = identity(classes::int()).unwrap();
        let strings = identity(classes::string()).unwrap();
        let objects = identity(classes::object()).unwrap();
        assert!(Arc::ptr_eq(&strings.form(), &objects.form()));
        assert!(!Arc::ptr_eq(&ints.form(), &objects.form()));
        assert!(identity(classes::void()).is_err());
    }

    #[test]
    fn constants_are_converted_to_their_type() {
        let widened = constant(classes::long(), Value::Int(3)).unwrap();
        assert_eq!(widened.invoke_exact(widened.ty(), &[]).unwrap(), Value::Long(3));
        let boxed = constant(classes::int(), box_primitive(PrimitiveKind::Int, Value::Int(4))).unwrap();
        assert_eq!(boxed.invoke_exact(boxed.ty(), &[]).unwrap(), Value::Int(4));
        assert!(matches!(
            constant(classes::string(), Value::Int(1)),
            Err(Error::ClassCast(_))
        ));
    }

    #[test]
    fn empty_and_zero_return_defaults() {
        let ty = TypeDescriptor::of(classes::double(), &[classes::string().clone()]).unwrap();
        let handle = empty(&ty).unwrap();
        assert_eq!(
            handle.invoke_exact(&ty, &[Value::string("x")]).unwrap(),
            Value::Double(0.0)
        );
        let void = zero(classes::void()).unwrap();
        assert_eq!(void.invoke_exact(void.ty(), &[]).unwrap(), Value::Void);
    }

    #[test]
    fn permute_checks_types_and_can_duplicate() {
        let second = permute_arguments(&identity(classes::int()).unwrap(), &int_ty(2), &[1]).unwrap();
        assert_eq!(
            second.invoke_exact(&int_ty(2), &[Value::Int(1), Value::Int(2)]).unwrap(),
            Value::Int(2)
        );
        let long_ty = TypeDescriptor::of(classes::int(), &[classes::long().clone()]).unwrap();
        assert!(matches!(
            permute_arguments(&identity(classes::int()).unwrap(), &long_ty, &[0]),
            Err(Error::IllegalArgument(_))
        ));
    }

    #[test]
    fn guard_validates_its_parts() {
        let target = identity(classes::int()).unwrap();
        let fallback = identity(classes::long()).unwrap();
        let test = constant(classes::boolean(), Value::boolean(true)).unwrap();
        assert!(matches!(
            guard_with_test(&test, &target, &fallback),
            Err(Error::IllegalArgument(_))
        ));
        let not_boolean = constant(classes::int(), Value::Int(1)).unwrap();
        assert!(matches!(
            guard_with_test(&not_boolean, &target, &target),
            Err(Error::IllegalArgument(_))
        ));
    }

    #[test]
    fn array_handles_share_forms_per_array_class() {
        let ints = classes::int().array_type();
        let a = array_element_getter(&ints).unwrap();
        let b = array_element_getter(&ints).unwrap();
        assert!(Arc::ptr_eq(&a.form(), &b.form()));
        let collector = array_collector(&ints, 2).unwrap();
        assert!(collector.ptr_eq(&array_collector(&ints, 2).unwrap()));
        let array = collector
            .invoke_exact(collector.ty(), &[Value::Int(5), Value::Int(6)])
            .unwrap();
        assert_eq!(
            a.invoke_exact(a.ty(), &[array.clone(), Value::Int(1)]).unwrap(),
            Value::Int(6)
        );
        let length = array_length(&ints).unwrap();
        assert_eq!(length.invoke_exact(length.ty(), &[array]).unwrap(), Value::Int(2));
        assert!(array_constructor(classes::int()).is_err());
    }

    #[test]
    fn exact_invoker_rejects_other_types() {
        let ty = int_ty(1);
        let invoker = exact_invoker(&ty).unwrap();
        let id = identity(classes::int()).unwrap();
        assert_eq!(
            invoker.invoke_exact(invoker.ty(), &[id.as_value(), Value::Int(8)]).unwrap(),
            Value::Int(8)
        );
        let other = identity(classes::long()).unwrap();
        assert!(matches!(
            invoker.invoke_exact(invoker.ty(), &[other.as_value(), Value::Int(8)]),
            Err(Error::WrongMethodType(_))
        ));
    }
}
