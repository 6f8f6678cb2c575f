//! Call handles and their kinds.

pub mod bound;
mod customize;
pub mod direct;

use crate::combinators;
use crate::convert::{self, box_value};
use crate::form::{
    canonical_form, spread_arguments_form, FormBuilder, FormKind, FormRef, Intrinsic,
    NamedFunction,
};
use crate::species::{CapturedValues, SpeciesRegistry};
use direct::MemberCall;
use mh_core::{
    classes, config, debug, ensure_arg, internal, warn, wrong_type, BasicType, ClassRef, Error,
    Result, TypeDescriptor, Value,
};
use parking_lot::Mutex;
use std::fmt::{Debug, Display, Formatter};
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock, Weak};

const AS_TYPE_CACHE_LIMIT: usize = 8;

/// A typed, immutable reference to an invocable behavior.
#[derive(Clone)]
pub struct CallHandle(Arc<HandleData>);

struct HandleData {
    ty: TypeDescriptor,
    form: FormRef,
    kind: HandleKind,
    as_type_cache: Mutex<Vec<(TypeDescriptor, Weak<HandleData>)>>,
    // Published once a counting wrapper warms up.
    updated_form: OnceLock<FormRef>,
    customized: OnceLock<FormRef>,
    invocations: AtomicU32,
}

pub enum HandleKind {
    /// Everything the form needs is in the form itself.
    Simple,
    /// Accesses one resolved member.
    Direct(Arc<MemberCall>),
    /// Carries captured values laid out by a species.
    Bound(CapturedValues),
    /// Variable-arity view of a fixed-arity target.
    Varargs(VarargsCollector),
    /// Forwards to its target and counts invocations until warmed up.
    Counting(CountingWrapper),
}

pub struct VarargsCollector {
    target: CallHandle,
    array_type: ClassRef,
    // Collector built for the most recent trailing arity.
    collector: Mutex<Option<(usize, CallHandle)>>,
}

pub struct CountingWrapper {
    target: CallHandle,
    remaining: AtomicI32,
}

impl CallHandle {
    pub(crate) fn new(ty: TypeDescriptor, form: FormRef, kind: HandleKind) -> Result<CallHandle> {
        let max_arity = config::global().max_arity;
        if ty.parameter_slot_count() > max_arity {
            mh_core::illegal_argument!(
                "{} needs {} argument slots, limit is {}",
                ty,
                ty.parameter_slot_count(),
                max_arity
            );
        }
        let mut expected = vec![BasicType::L];
        expected.extend(ty.parameter_basic_types());
        if form.parameter_types() != expected || form.return_type() != ty.return_basic_type() {
            internal!("form {} does not fit handle type {}", form.debug_name(), ty);
        }
        Ok(CallHandle(Arc::new(HandleData {
            ty,
            form,
            kind,
            as_type_cache: Mutex::new(Vec::new()),
            updated_form: OnceLock::new(),
            customized: OnceLock::new(),
            invocations: AtomicU32::new(0),
        })))
    }

    pub(crate) fn simple(ty: TypeDescriptor, form: FormRef) -> Result<CallHandle> {
        CallHandle::new(ty, form, HandleKind::Simple)
    }

    pub fn ty(&self) -> &TypeDescriptor {
        &self.0.ty
    }

    /// The form invocations currently run through.
    pub fn form(&self) -> FormRef {
        if let Some(form) = self.0.updated_form.get() {
            return form.clone();
        }
        if let Some(form) = self.0.customized.get() {
            return form.clone();
        }
        self.0.form.clone()
    }

    /// The shared form this handle was built with; edits start from it.
    pub(crate) fn base_form(&self) -> &FormRef {
        &self.0.form
    }

    pub fn kind(&self) -> &HandleKind {
        &self.0.kind
    }

    pub fn is_customized(&self) -> bool {
        self.0.customized.get().is_some()
    }

    pub fn ptr_eq(&self, other: &CallHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn captured(&self) -> Option<&CapturedValues> {
        match &self.0.kind {
            HandleKind::Bound(captured) => Some(captured),
            _ => None,
        }
    }

    pub fn captured_value(&self, slot: usize) -> Result<Value> {
        match self.captured() {
            Some(captured) => captured.get(slot),
            None => internal!("{:?} has no captured values", self),
        }
    }

    pub fn direct_call(&self) -> Option<&Arc<MemberCall>> {
        match &self.0.kind {
            HandleKind::Direct(call) => Some(call),
            _ => None,
        }
    }

    pub fn delegate_target(&self) -> Result<CallHandle> {
        match &self.0.kind {
            HandleKind::Varargs(collector) => Ok(collector.target.clone()),
            HandleKind::Counting(counting) => Ok(counting.target.clone()),
            _ => internal!("{:?} does not delegate", self),
        }
    }

    /// The handle as a runtime value, e.g. to capture it in another handle.
    pub fn as_value(&self) -> Value {
        Value::native(classes::method_handle(), self.0.clone())
    }

    pub fn from_value(value: &Value) -> Result<CallHandle> {
        let object = value.require_object("method handle")?;
        let not_a_handle = || {
            Error::ClassCast(format!(
                "{} cannot be cast to {}",
                object.class().name(),
                classes::method_handle().name()
            ))
        };
        let payload = object.native_payload().ok_or_else(not_a_handle)?;
        payload
            .clone()
            .downcast::<HandleData>()
            .map(CallHandle)
            .map_err(|_| not_a_handle())
    }

    /// Runs the form on `args` with this handle prepended. Arguments must
    /// already be in their basic-type carriers.
    pub fn invoke_basic(&self, args: &[Value]) -> Result<Value> {
        let form = match (self.0.updated_form.get(), self.0.customized.get()) {
            (Some(form), _) | (None, Some(form)) => form.clone(),
            (None, None) => {
                self.maybe_customize();
                self.0.form.clone()
            }
        };
        let mut frame = Vec::with_capacity(args.len() + 1);
        frame.push(self.as_value());
        frame.extend_from_slice(args);
        form.invoke(&frame)
    }

    fn maybe_customize(&self) {
        if !matches!(self.0.kind, HandleKind::Direct(_) | HandleKind::Bound(_)) {
            return;
        }
        let threshold = config::global().customize_threshold;
        if threshold < 0 {
            return;
        }
        let count = self.0.invocations.fetch_add(1, Ordering::Relaxed);
        if i64::from(count) != i64::from(threshold) {
            return;
        }
        match customize::customized_form(self) {
            Ok(form) => {
                debug!("customized {:?} as {}", self, form.debug_name());
                let _ = self.0.customized.set(form);
            }
            Err(err) => warn!("customization of {:?} failed: {}", self, err),
        }
    }

    /// Counts one invocation of a counting wrapper; the last one swaps in a
    /// plain delegating form.
    pub(crate) fn count_down(&self) -> Result<()> {
        let HandleKind::Counting(counting) = &self.0.kind else {
            internal!("{:?} is not a counting wrapper", self);
        };
        if counting.remaining.fetch_sub(1, Ordering::Relaxed) == 1 {
            let form = delegate_form(&self.0.ty)?;
            if self.0.updated_form.set(form).is_ok() {
                debug!("counting wrapper {:?} warmed up", self);
            }
        }
        Ok(())
    }

    fn check_actuals(&self, args: &[Value]) -> Result<()> {
        let params = self.0.ty.parameter_types();
        if args.len() != params.len() {
            wrong_type!(
                "{} takes {} arguments, got {}",
                self.0.ty,
                params.len(),
                args.len()
            );
        }
        for (i, (value, param)) in args.iter().zip(params).enumerate() {
            if value.basic_type() != param.basic_type() {
                wrong_type!("argument {} of {} is {:?}", i, self.0.ty, value);
            }
            if !param.is_primitive() && !value.is_null() && !param.is_instance(value) {
                return Err(Error::ClassCast(format!(
                    "argument {} of {} cannot be cast to {}",
                    i,
                    self.0.ty,
                    param.name()
                )));
            }
        }
        Ok(())
    }

    /// Invokes with a caller type that must equal this handle's type.
    pub fn invoke_exact(&self, caller_ty: &TypeDescriptor, args: &[Value]) -> Result<Value> {
        if caller_ty != &self.0.ty {
            wrong_type!("expected {} but found {}", self.0.ty, caller_ty);
        }
        self.check_actuals(args)?;
        self.invoke_basic(args)
    }

    /// Invokes with any caller type this handle can be adapted to.
    pub fn invoke(&self, caller_ty: &TypeDescriptor, args: &[Value]) -> Result<Value> {
        if caller_ty == &self.0.ty {
            return self.invoke_exact(caller_ty, args);
        }
        self.as_type(caller_ty)?.invoke_exact(caller_ty, args)
    }

    /// Invokes with boxed arguments and a boxed result; primitive carriers
    /// in `args` are boxed by their own basic type.
    pub fn invoke_with_arguments(&self, args: &[Value]) -> Result<Value> {
        let generic = TypeDescriptor::generic(args.len())?;
        let boxed = args.iter().cloned().map(box_value).collect::<Vec<_>>();
        self.as_type(&generic)?.invoke_exact(&generic, &boxed)
    }

    pub fn as_type(&self, new_ty: &TypeDescriptor) -> Result<CallHandle> {
        if new_ty == &self.0.ty {
            return Ok(self.clone());
        }
        if let HandleKind::Varargs(collector) = &self.0.kind {
            return self.varargs_as_type(collector, new_ty);
        }
        if let Some(found) = self.cached_as_type(new_ty) {
            return Ok(found);
        }
        let adapted = convert::make_pairwise_convert(self, new_ty, true)?;
        let mut cache = self.0.as_type_cache.lock();
        cache.retain(|(_, weak)| weak.strong_count() > 0);
        if cache.len() >= AS_TYPE_CACHE_LIMIT {
            cache.remove(0);
        }
        cache.push((new_ty.clone(), Arc::downgrade(&adapted.0)));
        Ok(adapted)
    }

    fn cached_as_type(&self, new_ty: &TypeDescriptor) -> Option<CallHandle> {
        self.0
            .as_type_cache
            .lock()
            .iter()
            .find(|(ty, _)| ty == new_ty)
            .and_then(|(_, weak)| weak.upgrade())
            .map(CallHandle)
    }

    fn varargs_as_type(
        &self,
        collector: &VarargsCollector,
        new_ty: &TypeDescriptor,
    ) -> Result<CallHandle> {
        let ty = &self.0.ty;
        let last = ty.parameter_count() - 1;
        let new_arity = new_ty.parameter_count();
        if new_arity == ty.parameter_count()
            && ty
                .parameter_type(last)
                .is_assignable_from(new_ty.parameter_type(last))
        {
            return collector.target.as_type(new_ty);
        }
        if new_arity < last {
            wrong_type!("cannot convert {} to {}", ty, new_ty);
        }
        let count = new_arity - last;
        let cached = match &*collector.collector.lock() {
            Some((arity, handle)) if *arity == count => Some(handle.clone()),
            _ => None,
        };
        let collecting = match cached {
            Some(handle) => handle,
            None => {
                let handle = collector.target.as_collector(&collector.array_type, count)?;
                *collector.collector.lock() = Some((count, handle.clone()));
                handle
            }
        };
        collecting.as_type(new_ty)
    }

    /// Binds the leading reference parameter to `value`.
    pub fn bind_to(&self, value: Value) -> Result<CallHandle> {
        let ty = &self.0.ty;
        if ty.parameter_count() == 0 || ty.parameter_type(0).is_primitive() {
            mh_core::illegal_argument!("no leading reference parameter in {}", ty);
        }
        let value = box_value(value).check_cast(ty.parameter_type(0))?;
        self.bind_argument_l(0, value)
    }

    pub fn is_varargs_collector(&self) -> bool {
        matches!(self.0.kind, HandleKind::Varargs(_))
    }

    pub fn as_varargs_collector(&self, array_type: &ClassRef) -> Result<CallHandle> {
        ensure_arg!(array_type.is_array(), "not an array type: {}", array_type);
        let ty = &self.0.ty;
        let Some(last) = ty.last_parameter_type() else {
            mh_core::illegal_argument!("no trailing array parameter in {}", ty);
        };
        ensure_arg!(
            last.is_assignable_from(array_type),
            "array type not assignable to trailing argument: {}, {}",
            self,
            array_type
        );
        if let HandleKind::Varargs(collector) = &self.0.kind {
            if collector.array_type == *array_type {
                return Ok(self.clone());
            }
        }
        let target = self.as_fixed_arity();
        CallHandle::new(
            ty.clone(),
            delegate_form(ty)?,
            HandleKind::Varargs(VarargsCollector {
                target,
                array_type: array_type.clone(),
                collector: Mutex::new(None),
            }),
        )
    }

    pub fn as_fixed_arity(&self) -> CallHandle {
        match &self.0.kind {
            HandleKind::Varargs(collector) => collector.target.clone(),
            _ => self.clone(),
        }
    }

    /// Collects the trailing `count` arguments into an array of
    /// `array_type` passed as the last parameter.
    pub fn as_collector(&self, array_type: &ClassRef, count: usize) -> Result<CallHandle> {
        ensure_arg!(array_type.is_array(), "not an array type: {}", array_type);
        let ty = &self.0.ty;
        let Some(last) = ty.last_parameter_type() else {
            mh_core::illegal_argument!("no trailing array parameter in {}", ty);
        };
        ensure_arg!(
            last.is_assignable_from(array_type),
            "array type not assignable to trailing argument: {}, {}",
            self,
            array_type
        );
        let collector = combinators::array_collector(array_type, count)?;
        combinators::collect_arguments(&self.as_fixed_arity(), ty.parameter_count() - 1, &collector)
    }

    /// Spreads one trailing array of `array_type` over the last `count`
    /// parameters, checking its length at call time.
    pub fn as_spreader(&self, array_type: &ClassRef, count: usize) -> Result<CallHandle> {
        let Some(component) = array_type.component_type() else {
            mh_core::illegal_argument!("not an array type: {}", array_type);
        };
        let ty = &self.0.ty;
        ensure_arg!(
            count <= ty.parameter_count(),
            "bad spread array length {} for {}",
            count,
            ty
        );
        let pos = ty.parameter_count() - count;
        let needed = ty.replace_parameter_types(pos, ty.parameter_count(), &vec![component.clone(); count])?;
        let adapted = self.as_fixed_arity().as_type(&needed)?;
        let this = adapted.rebind()?;
        let form = spread_arguments_form(this.base_form(), pos + 1, array_type, count)?;
        let new_ty = ty.replace_parameter_types(pos, ty.parameter_count(), &[array_type.clone()])?;
        this.copy_with(new_ty, form)
    }
}

/// `(mh, args..) -> target(args..)` for handles whose kind delegates.
pub(crate) fn delegate_form(ty: &TypeDescriptor) -> Result<FormRef> {
    let basic = ty.basic_type();
    canonical_form(FormKind::Delegate, basic.basic_signature(), || {
        let mut b = FormBuilder::for_handle_type(&basic);
        let target = b.add(Intrinsic::DelegateTarget, vec![b.param(0)]);
        let mut args = vec![crate::form::Argument::Name(target)];
        args.extend(b.params(1..b.arity()));
        let result = b.add(NamedFunction::InvokeBasic(basic.clone()), args);
        b.build(
            (!basic.return_type().is_void()).then_some(result),
            FormKind::Delegate,
        )
    })
}

fn counting_form(ty: &TypeDescriptor) -> Result<FormRef> {
    let basic = ty.basic_type();
    canonical_form(FormKind::Counting, basic.basic_signature(), || {
        let mut b = FormBuilder::for_handle_type(&basic);
        b.add(Intrinsic::CountDown, vec![b.param(0)]);
        let target = b.add(Intrinsic::DelegateTarget, vec![b.param(0)]);
        let mut args = vec![crate::form::Argument::Name(target)];
        args.extend(b.params(1..b.arity()));
        let result = b.add(NamedFunction::InvokeBasic(basic.clone()), args);
        b.build(
            (!basic.return_type().is_void()).then_some(result),
            FormKind::Counting,
        )
    })
}

/// Wraps `target` in a counting wrapper when the don't-inline threshold is
/// enabled.
pub(crate) fn make_counting(target: &CallHandle) -> Result<CallHandle> {
    let threshold = config::global().dont_inline_threshold;
    if threshold <= 0 {
        return Ok(target.clone());
    }
    CallHandle::new(
        target.ty().clone(),
        counting_form(target.ty())?,
        HandleKind::Counting(CountingWrapper {
            target: target.clone(),
            remaining: AtomicI32::new(threshold),
        }),
    )
}

/// Wraps `target` in a single-slot bound handle that reinvokes it.
pub(crate) fn reinvoker(target: &CallHandle) -> Result<CallHandle> {
    let species = SpeciesRegistry::global().get("L")?;
    let basic = target.ty().basic_type();
    let form = canonical_form(FormKind::Reinvoker, basic.basic_signature(), || {
        let mut b = FormBuilder::for_handle_type(&basic);
        let callee = b.add(species.getter(0)?, vec![b.param(0)]);
        let mut args = vec![crate::form::Argument::Name(callee)];
        args.extend(b.params(1..b.arity()));
        let result = b.add(NamedFunction::InvokeBasic(basic.clone()), args);
        b.build(
            (!basic.return_type().is_void()).then_some(result),
            FormKind::Reinvoker,
        )
    })?;
    species.construct(target.ty().clone(), form, vec![target.as_value()])
}

impl Debug for CallHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.0.kind {
            HandleKind::Simple => "",
            HandleKind::Direct(_) => "Direct",
            HandleKind::Bound(_) => "Bound",
            HandleKind::Varargs(_) => "Varargs",
            HandleKind::Counting(_) => "Counting",
        };
        write!(f, "{}MethodHandle{}", kind, self.0.ty)
    }
}

impl Display for CallHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MethodHandle{}", self.0.ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinators::identity;
    use mh_core::classes;

    #[test]
    fn handles_round_trip_through_values() {
        let handle = identity(classes::int()).unwrap();
        let back = CallHandle::from_value(&handle.as_value()).unwrap();
        assert!(back.ptr_eq(&handle));
        assert_eq!(handle.as_value(), back.as_value());
        assert!(matches!(
            CallHandle::from_value(&Value::string("x")),
            Err(Error::ClassCast(_))
        ));
        assert!(matches!(
            CallHandle::from_value(&Value::Null),
            Err(Error::NullPointer(_))
        ));
    }

    #[test]
    fn as_type_results_are_cached_while_alive() {
        let handle = identity(classes::int()).unwrap();
        let ty = TypeDescriptor::of(classes::object(), &[classes::object().clone()]).unwrap();
        let first = handle.as_type(&ty).unwrap();
        let second = handle.as_type(&ty).unwrap();
        assert!(first.ptr_eq(&second));
        assert!(handle.as_type(handle.ty()).unwrap().ptr_eq(&handle));
    }

    #[test]
    fn display_shows_the_type() {
        let handle = identity(classes::int()).unwrap();
        assert_eq!(handle.to_string(), "MethodHandle(int)int");
    }
}
