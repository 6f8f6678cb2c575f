//! Direct handles: fixed-semantics access to one resolved member.

use super::{CallHandle, HandleKind};
use crate::form::{canonical_form, FormBuilder, FormKind, Intrinsic};
use mh_core::{
    internal, ClassRef, Error, MemberType, Object, RefKind, ResolvedMember, Result,
    TypeDescriptor, Value,
};
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// A resolved member together with how it is accessed.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MemberCall {
    member: ResolvedMember,
    ref_kind: RefKind,
    ty: TypeDescriptor,
    /// Passed to caller-sensitive members.
    caller: Option<ClassRef>,
    /// Class the leading argument is checked against, if there is one.
    receiver: ClassRef,
}

impl MemberCall {
    pub fn new(member: ResolvedMember, ref_kind: RefKind, caller: Option<ClassRef>) -> Result<Self> {
        let def = member.def();
        let consistent = match ref_kind {
            _ if ref_kind.is_field() => def.is_field() && def.is_static() == ref_kind.is_static(),
            RefKind::NewInvokeSpecial => def.is_constructor(),
            RefKind::InvokeStatic => def.is_method() && def.is_static(),
            _ => def.is_method() && !def.is_static(),
        };
        if !consistent {
            internal!("{} cannot be accessed as {}", member, ref_kind);
        }
        let receiver = member.declaring_class().clone();
        let ty = member.handle_type(ref_kind, &receiver)?;
        Ok(Self {
            member,
            ref_kind,
            ty,
            caller,
            receiver,
        })
    }

    /// Narrows the receiver parameter to `receiver`, a subclass of the
    /// declaring class.
    pub fn with_receiver(self, receiver: &ClassRef) -> Result<Self> {
        if !self.ref_kind.has_receiver() {
            internal!("{} takes no receiver", self);
        }
        if !self.member.declaring_class().is_assignable_from(receiver) {
            internal!("{} is not a receiver of {}", receiver, self);
        }
        let ty = self.member.handle_type(self.ref_kind, receiver)?;
        Ok(Self {
            ty,
            receiver: receiver.clone(),
            ..self
        })
    }

    pub fn member(&self) -> &ResolvedMember {
        &self.member
    }

    pub fn ref_kind(&self) -> RefKind {
        self.ref_kind
    }

    pub fn ty(&self) -> &TypeDescriptor {
        &self.ty
    }

    pub fn caller(&self) -> Option<&ClassRef> {
        self.caller.as_ref()
    }

    fn field_slot(&self) -> Result<usize> {
        self.member
            .def()
            .field_slot()
            .ok_or_else(|| Error::Internal(format!("{} has no field slot", self.member)))
    }

    fn receiver<'a>(&self, args: &'a [Value]) -> Result<&'a Value> {
        let Some(receiver) = args.first() else {
            internal!("{} invoked without a receiver", self);
        };
        receiver.require_object(&format!("receiver of {}", self.member))?;
        receiver.check_cast(&self.receiver)?;
        Ok(receiver)
    }

    fn arg<'a>(&self, args: &'a [Value], index: usize) -> Result<&'a Value> {
        args.get(index)
            .ok_or_else(|| Error::Internal(format!("{} is missing argument {}", self, index)))
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value> {
        let declaring = self.member.declaring_class();
        let caller = self.caller.as_ref();
        match self.ref_kind {
            RefKind::GetStatic => declaring.static_value(self.field_slot()?),
            RefKind::PutStatic => {
                declaring.set_static_value(self.field_slot()?, self.arg(args, 0)?.clone())?;
                Ok(Value::Void)
            }
            RefKind::GetField => {
                let receiver = self.receiver(args)?.require_object("receiver")?;
                receiver.get_field(self.field_slot()?)
            }
            RefKind::PutField => {
                let receiver = self.receiver(args)?.require_object("receiver")?;
                receiver.set_field(self.field_slot()?, self.arg(args, 1)?.clone())?;
                Ok(Value::Void)
            }
            RefKind::InvokeStatic => self.member.def().call(args, caller),
            RefKind::InvokeSpecial => {
                self.receiver(args)?;
                self.member.def().call(args, caller)
            }
            RefKind::InvokeVirtual | RefKind::InvokeInterface => {
                let class = self.receiver(args)?.require_object("receiver")?.class().clone();
                let MemberType::Method(ty) = self.member.def().ty() else {
                    internal!("{} is not a method", self.member);
                };
                match class.find_method_impl(self.member.name(), ty) {
                    Some((_, def)) => def.call(args, caller),
                    None => Err(Error::Linkage(format!(
                        "no implementation of {} in {}",
                        self.member,
                        class.name()
                    ))),
                }
            }
            RefKind::NewInvokeSpecial => {
                let object = Value::Ref(Object::new_instance(declaring));
                let mut frame = Vec::with_capacity(args.len() + 1);
                frame.push(object.clone());
                frame.extend_from_slice(args);
                self.member.def().call(&frame, caller)?;
                Ok(object)
            }
        }
    }
}

impl Display for MemberCall {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}:{}", self.ref_kind, self.member, self.member.def().ty())
    }
}

impl Debug for MemberCall {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

/// A handle of type `call.ty()` that performs `call`.
pub(crate) fn make_direct(call: MemberCall) -> Result<CallHandle> {
    let ref_kind = call.ref_kind;
    let basic = call.ty.basic_type();
    let kind = FormKind::DirectInvoke(ref_kind);
    let form = canonical_form(kind, basic.basic_signature(), || {
        let mut b = FormBuilder::for_handle_type(&basic);
        let result = b.add(
            Intrinsic::LinkToMember {
                ref_kind,
                ty: basic.clone(),
            },
            b.params(0..b.arity()),
        );
        b.build((!basic.return_type().is_void()).then_some(result), kind)
    })?;
    CallHandle::new(call.ty.clone(), form, HandleKind::Direct(Arc::new(call)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mh_core::{classes, native, ClassBuilder, Modifiers};

    fn counter() -> ClassRef {
        let get = TypeDescriptor::of(classes::int(), &[]).unwrap();
        ClassBuilder::new("test.Counter")
            .field("count", classes::int(), Modifiers::PUBLIC)
            .method(
                "get",
                get,
                Modifiers::PUBLIC,
                native(|args, _| args[0].require_object("this")?.get_field(0)),
            )
            .build()
    }

    fn member(class: &ClassRef, name: &str, ty: MemberType) -> ResolvedMember {
        ResolvedMember::new(class.clone(), class.find_declared(name, &ty).unwrap())
    }

    #[test]
    fn field_access_goes_through_the_receiver() {
        let class = counter();
        let field = member(&class, "count", MemberType::Field(classes::int().clone()));
        let put = MemberCall::new(field.clone(), RefKind::PutField, None).unwrap();
        let get = MemberCall::new(field, RefKind::GetField, None).unwrap();
        let object = Value::Ref(Object::new_instance(&class));
        put.invoke(&[object.clone(), Value::Int(7)]).unwrap();
        assert_eq!(get.invoke(&[object]).unwrap(), Value::Int(7));
        assert!(matches!(get.invoke(&[Value::Null]), Err(Error::NullPointer(_))));
    }

    #[test]
    fn static_kind_must_match_the_member() {
        let class = counter();
        let get = member(
            &class,
            "get",
            MemberType::Method(TypeDescriptor::of(classes::int(), &[]).unwrap()),
        );
        assert!(MemberCall::new(get.clone(), RefKind::InvokeStatic, None).is_err());
        let call = MemberCall::new(get, RefKind::InvokeVirtual, None).unwrap();
        assert_eq!(call.ty().to_string(), "(Counter)int");
        assert_eq!(call.to_string(), "invokeVirtual test.Counter.get:()int");
    }
}
