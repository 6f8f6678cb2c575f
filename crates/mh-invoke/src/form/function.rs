use crate::convert::{box_basic, unbox_basic, ValueConversion};
use crate::handle::direct::MemberCall;
use crate::handle::CallHandle;
use crate::species::Species;
use itertools::Itertools;
use mh_core::{
    internal, BasicType, ClassRef, Error, Object, Result, TypeDescriptor, Value,
};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// The operation a non-parameter [`super::Name`] applies.
#[derive(Clone)]
pub enum NamedFunction {
    /// Direct access to a resolved member with fixed call semantics.
    Member(Arc<MemberCall>),
    /// A constant handle invoked with its basic type.
    Handle(CallHandle),
    /// Invokes the handle in argument 0 with the remaining arguments.
    InvokeBasic(TypeDescriptor),
    /// Reads a captured slot out of the bound handle in argument 0.
    Getter { species: Arc<Species>, slot: usize },
    Intrinsic(Intrinsic),
}

/// Runtime support operations with fixed semantics. The code generator
/// lowers most of them to dedicated instructions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    /// `(L, args..)` with argument 0 a direct handle of type `ty`.
    LinkToMember {
        ref_kind: mh_core::RefKind,
        ty: TypeDescriptor,
    },
    /// The target of the delegating handle in argument 0.
    DelegateTarget,
    /// Counts down the counting handle in argument 0.
    CountDown,
    /// `(test, then, else)`: picks a handle by the test result.
    SelectAlternative,
    /// `(target, exception class, handler, boxed args)`; boxes the result of
    /// a target returning the given basic type.
    GuardWithCatch(BasicType),
    Convert(ValueConversion),
    NewArray { array: ClassRef, count: usize },
    AllocArray { array: ClassRef },
    ArrayLoad { array: ClassRef },
    ArrayStore { array: ClassRef },
    ArrayLength,
    /// Fails with `IllegalArgument` unless the array has exactly `len`
    /// elements; null counts as empty.
    CheckSpreadLength { len: usize },
    Identity(BasicType),
    Zero(BasicType),
    /// Throws argument 0; typed as returning the given basic type.
    Throw(BasicType),
    CheckExactType(TypeDescriptor),
    AsType(TypeDescriptor),
}

fn component_basic_type(array: &ClassRef) -> BasicType {
    array
        .component_type()
        .map(|component| component.basic_type())
        .unwrap_or(BasicType::L)
}

impl Intrinsic {
    pub fn parameter_types(&self) -> Vec<BasicType> {
        use BasicType::*;
        match self {
            Intrinsic::LinkToMember { ty, .. } => {
                let mut params = vec![L];
                params.extend(ty.parameter_basic_types());
                params
            }
            Intrinsic::DelegateTarget
            | Intrinsic::CountDown
            | Intrinsic::ArrayLength
            | Intrinsic::CheckSpreadLength { .. }
            | Intrinsic::Throw(_)
            | Intrinsic::CheckExactType(_)
            | Intrinsic::AsType(_) => vec![L],
            Intrinsic::SelectAlternative => vec![I, L, L],
            Intrinsic::GuardWithCatch(_) => vec![L, L, L, L],
            Intrinsic::Convert(conversion) => vec![conversion.input_type()],
            Intrinsic::NewArray { array, count } => vec![component_basic_type(array); *count],
            Intrinsic::AllocArray { .. } => vec![I],
            Intrinsic::ArrayLoad { .. } => vec![L, I],
            Intrinsic::ArrayStore { array } => vec![L, I, component_basic_type(array)],
            Intrinsic::Identity(ty) => vec![*ty],
            Intrinsic::Zero(_) => vec![],
        }
    }

    pub fn return_type(&self) -> BasicType {
        use BasicType::*;
        match self {
            Intrinsic::LinkToMember { ty, .. } => ty.return_basic_type(),
            Intrinsic::DelegateTarget
            | Intrinsic::SelectAlternative
            | Intrinsic::GuardWithCatch(_)
            | Intrinsic::NewArray { .. }
            | Intrinsic::AllocArray { .. }
            | Intrinsic::CheckExactType(_)
            | Intrinsic::AsType(_) => L,
            Intrinsic::CountDown
            | Intrinsic::ArrayStore { .. }
            | Intrinsic::CheckSpreadLength { .. } => V,
            Intrinsic::Convert(conversion) => conversion.output_type(),
            Intrinsic::ArrayLoad { array } => component_basic_type(array),
            Intrinsic::ArrayLength => I,
            Intrinsic::Identity(ty) | Intrinsic::Zero(ty) | Intrinsic::Throw(ty) => *ty,
        }
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value> {
        match self {
            Intrinsic::LinkToMember { .. } => {
                let handle = CallHandle::from_value(arg(args, 0)?)?;
                let Some(call) = handle.direct_call() else {
                    internal!("{:?} is not a direct handle", handle);
                };
                call.invoke(&args[1..])
            }
            Intrinsic::DelegateTarget => {
                let handle = CallHandle::from_value(arg(args, 0)?)?;
                Ok(handle.delegate_target()?.as_value())
            }
            Intrinsic::CountDown => {
                CallHandle::from_value(arg(args, 0)?)?.count_down()?;
                Ok(Value::Void)
            }
            Intrinsic::SelectAlternative => {
                let test = arg(args, 0)?;
                match test.as_bool() {
                    Some(true) => Ok(arg(args, 1)?.clone()),
                    Some(false) => Ok(arg(args, 2)?.clone()),
                    None => internal!("guard test produced {:?}", test),
                }
            }
            Intrinsic::GuardWithCatch(ty) => guard_with_catch(*ty, args),
            Intrinsic::Convert(conversion) => conversion.apply(arg(args, 0)?),
            Intrinsic::NewArray { array, .. } => {
                Ok(Value::Ref(Object::array_from(array, args.to_vec())?))
            }
            Intrinsic::AllocArray { array } => {
                let length = int_arg(args, 0)?;
                Ok(Value::Ref(Object::new_array(array, length)?))
            }
            Intrinsic::ArrayLoad { .. } => {
                let array = arg(args, 0)?.require_object("array")?;
                array.array_load(int_arg(args, 1)?)
            }
            Intrinsic::ArrayStore { .. } => {
                let array = arg(args, 0)?.require_object("array")?;
                array.array_store(int_arg(args, 1)?, arg(args, 2)?.clone())?;
                Ok(Value::Void)
            }
            Intrinsic::ArrayLength => {
                let array = arg(args, 0)?.require_object("array")?;
                Ok(Value::Int(array.array_length()? as i32))
            }
            Intrinsic::CheckSpreadLength { len } => {
                check_spread_length(arg(args, 0)?, *len)?;
                Ok(Value::Void)
            }
            Intrinsic::Identity(_) => Ok(arg(args, 0)?.clone()),
            Intrinsic::Zero(ty) => Ok(Value::zero(*ty)),
            Intrinsic::Throw(_) => {
                let throwable = arg(args, 0)?.require_object("exception")?;
                Err(Error::from_throwable(throwable.clone()))
            }
            Intrinsic::CheckExactType(ty) => {
                let handle = CallHandle::from_value(arg(args, 0)?)?;
                if handle.ty() != ty {
                    mh_core::wrong_type!("expected {} but found {}", handle.ty(), ty);
                }
                Ok(handle.as_value())
            }
            Intrinsic::AsType(ty) => {
                let handle = CallHandle::from_value(arg(args, 0)?)?;
                Ok(handle.as_type(ty)?.as_value())
            }
        }
    }
}

fn arg(args: &[Value], index: usize) -> Result<&Value> {
    args.get(index)
        .ok_or_else(|| Error::Internal(format!("missing argument {}", index)))
}

fn int_arg(args: &[Value], index: usize) -> Result<i32> {
    let value = arg(args, index)?;
    value
        .as_int()
        .ok_or_else(|| Error::Internal(format!("argument {} is not an int: {:?}", index, value)))
}

pub(crate) fn check_spread_length(array: &Value, len: usize) -> Result<()> {
    let actual = match array {
        Value::Null => 0,
        other => other.require_object("spread array")?.array_length()?,
    };
    if actual != len {
        mh_core::illegal_argument!("array is not of length {}", len);
    }
    Ok(())
}

/// Runs `target` on the unboxed arguments; if it fails with an instance of
/// the caught class, runs `handler` on the throwable followed by the same
/// arguments. The result comes back boxed.
fn guard_with_catch(ty: BasicType, args: &[Value]) -> Result<Value> {
    let target = CallHandle::from_value(arg(args, 0)?)?;
    let Some(caught) = arg(args, 1)?.as_class().cloned() else {
        internal!("guardWithCatch expects a class mirror, got {:?}", args[1]);
    };
    let handler = CallHandle::from_value(arg(args, 2)?)?;
    let boxed = arg(args, 3)?.require_object("arguments")?.array_elements()?;
    let unboxed = target
        .ty()
        .parameter_basic_types()
        .into_iter()
        .zip(&boxed)
        .map(|(ty, value)| unbox_basic(value, ty))
        .collect::<Result<Vec<_>>>()?;
    match target.invoke_basic(&unboxed) {
        Ok(value) => Ok(box_basic(value, ty)),
        Err(err) if err.is_instance_of(&caught) => {
            let mut handler_args = Vec::with_capacity(unboxed.len() + 1);
            handler_args.push(Value::Ref(err.to_throwable()));
            handler_args.extend(unboxed);
            Ok(box_basic(handler.invoke_basic(&handler_args)?, ty))
        }
        Err(err) => Err(err),
    }
}

impl NamedFunction {
    pub fn parameter_types(&self) -> Vec<BasicType> {
        match self {
            NamedFunction::Member(call) => call.ty().parameter_basic_types(),
            NamedFunction::Handle(handle) => handle.ty().parameter_basic_types(),
            NamedFunction::InvokeBasic(ty) => {
                let mut params = vec![BasicType::L];
                params.extend(ty.parameter_basic_types());
                params
            }
            NamedFunction::Getter { .. } => vec![BasicType::L],
            NamedFunction::Intrinsic(intrinsic) => intrinsic.parameter_types(),
        }
    }

    pub fn return_type(&self) -> BasicType {
        match self {
            NamedFunction::Member(call) => call.ty().return_basic_type(),
            NamedFunction::Handle(handle) => handle.ty().return_basic_type(),
            NamedFunction::InvokeBasic(ty) => ty.return_basic_type(),
            NamedFunction::Getter { species, slot } => {
                species.slot_type(*slot).unwrap_or(BasicType::V)
            }
            NamedFunction::Intrinsic(intrinsic) => intrinsic.return_type(),
        }
    }

    pub fn check_arguments(&self, types: &[BasicType]) -> Result<()> {
        if let NamedFunction::Getter { species, slot } = self {
            if species.slot_type(*slot).is_none() {
                internal!("{} has no slot {}", species, slot);
            }
        }
        let expected = self.parameter_types();
        if expected != types {
            internal!(
                "{} takes ({}), applied to ({})",
                self,
                expected.iter().join(""),
                types.iter().join("")
            );
        }
        Ok(())
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value> {
        match self {
            NamedFunction::Member(call) => call.invoke(args),
            NamedFunction::Handle(handle) => handle.invoke_basic(args),
            NamedFunction::InvokeBasic(_) => {
                let handle = CallHandle::from_value(arg(args, 0)?)?;
                handle.invoke_basic(&args[1..])
            }
            NamedFunction::Getter { slot, .. } => {
                let handle = CallHandle::from_value(arg(args, 0)?)?;
                handle.captured_value(*slot)
            }
            NamedFunction::Intrinsic(intrinsic) => intrinsic.invoke(args),
        }
    }
}

impl From<Intrinsic> for NamedFunction {
    fn from(intrinsic: Intrinsic) -> Self {
        NamedFunction::Intrinsic(intrinsic)
    }
}

impl PartialEq for NamedFunction {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (NamedFunction::Member(a), NamedFunction::Member(b)) => a == b,
            (NamedFunction::Handle(a), NamedFunction::Handle(b)) => a.ptr_eq(b),
            (NamedFunction::InvokeBasic(a), NamedFunction::InvokeBasic(b)) => a == b,
            (
                NamedFunction::Getter { species: a, slot: i },
                NamedFunction::Getter { species: b, slot: j },
            ) => Arc::ptr_eq(a, b) && i == j,
            (NamedFunction::Intrinsic(a), NamedFunction::Intrinsic(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for NamedFunction {}

impl Hash for NamedFunction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            NamedFunction::Member(call) => call.hash(state),
            NamedFunction::Handle(handle) => handle.addr().hash(state),
            NamedFunction::InvokeBasic(ty) => ty.hash(state),
            NamedFunction::Getter { species, slot } => {
                species.signature().hash(state);
                slot.hash(state);
            }
            NamedFunction::Intrinsic(intrinsic) => intrinsic.hash(state),
        }
    }
}
