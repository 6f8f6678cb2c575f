//! Member definitions and symbolic member references.

use crate::class::{ClassRef, Modifiers};
use crate::config;
use crate::descriptor::TypeDescriptor;
use crate::error::{Error, Result};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};
use std::sync::{Arc, OnceLock};

/// How a member is accessed, numbered like the JVM's `REF_*` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RefKind {
    GetField = 1,
    GetStatic = 2,
    PutField = 3,
    PutStatic = 4,
    InvokeVirtual = 5,
    InvokeStatic = 6,
    InvokeSpecial = 7,
    NewInvokeSpecial = 8,
    InvokeInterface = 9,
}

impl RefKind {
    pub fn from_u8(value: u8) -> Option<RefKind> {
        Some(match value {
            1 => RefKind::GetField,
            2 => RefKind::GetStatic,
            3 => RefKind::PutField,
            4 => RefKind::PutStatic,
            5 => RefKind::InvokeVirtual,
            6 => RefKind::InvokeStatic,
            7 => RefKind::InvokeSpecial,
            8 => RefKind::NewInvokeSpecial,
            9 => RefKind::InvokeInterface,
            _ => return None,
        })
    }

    pub fn is_field(self) -> bool {
        (self as u8) <= RefKind::PutStatic as u8
    }

    pub fn is_getter(self) -> bool {
        matches!(self, RefKind::GetField | RefKind::GetStatic)
    }

    pub fn is_setter(self) -> bool {
        matches!(self, RefKind::PutField | RefKind::PutStatic)
    }

    /// Whether the member accessed must be static.
    pub fn is_static(self) -> bool {
        matches!(
            self,
            RefKind::GetStatic | RefKind::PutStatic | RefKind::InvokeStatic
        )
    }

    /// Whether the handle takes a leading receiver argument.
    pub fn has_receiver(self) -> bool {
        !self.is_static() && self != RefKind::NewInvokeSpecial
    }

    pub fn name(self) -> &'static str {
        match self {
            RefKind::GetField => "getField",
            RefKind::GetStatic => "getStatic",
            RefKind::PutField => "putField",
            RefKind::PutStatic => "putStatic",
            RefKind::InvokeVirtual => "invokeVirtual",
            RefKind::InvokeStatic => "invokeStatic",
            RefKind::InvokeSpecial => "invokeSpecial",
            RefKind::NewInvokeSpecial => "newInvokeSpecial",
            RefKind::InvokeInterface => "invokeInterface",
        }
    }
}

impl Display for RefKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub enum MemberType {
    Method(TypeDescriptor),
    Field(ClassRef),
}

impl Display for MemberType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberType::Method(ty) => write!(f, "{}", ty),
            MemberType::Field(ty) => write!(f, "{}", ty.name()),
        }
    }
}

impl Debug for MemberType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

/// Host implementation of a method or constructor. Receives the receiver
/// (for instance members and constructors) followed by the arguments, and
/// the caller context for caller-sensitive members.
pub type NativeMethod = Arc<dyn Fn(&[Value], Option<&ClassRef>) -> Result<Value> + Send + Sync>;

/// Wraps a closure as a [`NativeMethod`].
pub fn native<F>(body: F) -> NativeMethod
where
    F: Fn(&[Value], Option<&ClassRef>) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(body)
}

#[derive(Clone)]
pub enum MemberBody {
    Native(NativeMethod),
    Field { slot: usize },
    Abstract,
}

pub const CONSTRUCTOR_NAME: &str = "<init>";

#[derive(Clone)]
pub struct MemberDef {
    name: String,
    ty: MemberType,
    modifiers: Modifiers,
    body: MemberBody,
    caller_sensitive: bool,
}

impl MemberDef {
    pub fn method(name: &str, ty: TypeDescriptor, modifiers: Modifiers, body: NativeMethod) -> Self {
        Self {
            name: name.to_string(),
            ty: MemberType::Method(ty),
            modifiers,
            body: MemberBody::Native(body),
            caller_sensitive: false,
        }
    }

    pub fn abstract_method(name: &str, ty: TypeDescriptor, modifiers: Modifiers) -> Self {
        Self {
            name: name.to_string(),
            ty: MemberType::Method(ty),
            modifiers: modifiers | Modifiers::ABSTRACT,
            body: MemberBody::Abstract,
            caller_sensitive: false,
        }
    }

    /// `ty` lists the constructor parameters; its return type should be void.
    pub fn constructor(ty: TypeDescriptor, modifiers: Modifiers, body: NativeMethod) -> Self {
        Self::method(CONSTRUCTOR_NAME, ty, modifiers, body)
    }

    pub fn field(name: &str, ty: ClassRef, modifiers: Modifiers, slot: usize) -> Self {
        Self {
            name: name.to_string(),
            ty: MemberType::Field(ty),
            modifiers,
            body: MemberBody::Field { slot },
            caller_sensitive: false,
        }
    }

    pub fn caller_sensitive(mut self) -> Self {
        self.caller_sensitive = true;
        self
    }

    pub(crate) fn with_slot(mut self, slot: usize) -> Self {
        if let MemberBody::Field { slot: old } = &mut self.body {
            *old = slot;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &MemberType {
        &self.ty
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn body(&self) -> &MemberBody {
        &self.body
    }

    pub fn method_type(&self) -> Option<&TypeDescriptor> {
        match &self.ty {
            MemberType::Method(ty) => Some(ty),
            MemberType::Field(_) => None,
        }
    }

    pub fn field_type(&self) -> Option<&ClassRef> {
        match &self.ty {
            MemberType::Field(ty) => Some(ty),
            MemberType::Method(_) => None,
        }
    }

    pub fn field_slot(&self) -> Option<usize> {
        match self.body {
            MemberBody::Field { slot } => Some(slot),
            _ => None,
        }
    }

    pub fn is_field(&self) -> bool {
        matches!(self.ty, MemberType::Field(_))
    }

    pub fn is_method(&self) -> bool {
        !self.is_field() && !self.is_constructor()
    }

    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    pub fn is_static(&self) -> bool {
        self.modifiers.contains(Modifiers::STATIC)
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self.body, MemberBody::Abstract) || self.modifiers.contains(Modifiers::ABSTRACT)
    }

    pub fn is_private(&self) -> bool {
        self.modifiers.contains(Modifiers::PRIVATE)
    }

    pub fn is_varargs(&self) -> bool {
        self.modifiers.contains(Modifiers::VARARGS)
    }

    pub fn is_flagged_caller_sensitive(&self) -> bool {
        self.caller_sensitive
    }

    /// Runs the native body.
    pub fn call(&self, args: &[Value], caller: Option<&ClassRef>) -> Result<Value> {
        match &self.body {
            MemberBody::Native(body) => body(args, caller),
            MemberBody::Abstract => Err(Error::Linkage(format!(
                "abstract method {} has no implementation",
                self.name
            ))),
            MemberBody::Field { .. } => Err(Error::Internal(format!(
                "field {} is not callable",
                self.name
            ))),
        }
    }
}

impl Debug for MemberDef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.ty)
    }
}

/// A member definition together with the class that declares it.
#[derive(Clone)]
pub struct ResolvedMember {
    declaring: ClassRef,
    def: Arc<MemberDef>,
}

impl ResolvedMember {
    pub fn new(declaring: ClassRef, def: Arc<MemberDef>) -> Self {
        Self { declaring, def }
    }

    pub fn declaring_class(&self) -> &ClassRef {
        &self.declaring
    }

    pub fn def(&self) -> &Arc<MemberDef> {
        &self.def
    }

    pub fn name(&self) -> &str {
        self.def.name()
    }

    pub fn modifiers(&self) -> Modifiers {
        self.def.modifiers()
    }

    pub fn is_static(&self) -> bool {
        self.def.is_static()
    }

    /// Flagged on the definition or listed in the configured
    /// caller-sensitive set.
    pub fn is_caller_sensitive(&self) -> bool {
        self.def.is_flagged_caller_sensitive()
            || config::global().is_caller_sensitive(self.declaring.name(), self.def.name())
    }

    /// The handle type for accessing this member with `ref_kind`, taking
    /// `receiver` as the leading parameter where one is needed.
    pub fn handle_type(&self, ref_kind: RefKind, receiver: &ClassRef) -> Result<TypeDescriptor> {
        use crate::class::classes;
        match (&self.def.ty, ref_kind) {
            (MemberType::Field(ty), RefKind::GetField) => TypeDescriptor::of(ty, &[receiver.clone()]),
            (MemberType::Field(ty), RefKind::GetStatic) => TypeDescriptor::of(ty, &[]),
            (MemberType::Field(ty), RefKind::PutField) => {
                TypeDescriptor::of(classes::void(), &[receiver.clone(), ty.clone()])
            }
            (MemberType::Field(ty), RefKind::PutStatic) => {
                TypeDescriptor::of(classes::void(), &[ty.clone()])
            }
            (MemberType::Method(ty), RefKind::InvokeStatic) => Ok(ty.clone()),
            (MemberType::Method(ty), RefKind::NewInvokeSpecial) => {
                Ok(ty.change_return_type(&self.declaring))
            }
            (
                MemberType::Method(ty),
                RefKind::InvokeVirtual | RefKind::InvokeInterface | RefKind::InvokeSpecial,
            ) => ty.insert_parameter_types(0, &[receiver.clone()]),
            (ty, kind) => Err(Error::Internal(format!(
                "{} cannot be accessed as {}",
                ty, kind
            ))),
        }
    }
}

impl PartialEq for ResolvedMember {
    fn eq(&self, other: &Self) -> bool {
        self.declaring == other.declaring && Arc::ptr_eq(&self.def, &other.def)
    }
}

impl Eq for ResolvedMember {}

impl std::hash::Hash for ResolvedMember {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.declaring.hash(state);
        (Arc::as_ptr(&self.def) as usize).hash(state);
    }
}

impl Debug for ResolvedMember {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:?}", self.declaring.name(), self.def)
    }
}

impl Display for ResolvedMember {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.declaring.name(), self.def.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    Unresolved,
    Resolved,
    Failed,
}

/// An unresolved reference to a member, as it appears in program code.
/// Resolution happens at most once; a failure is recorded and re-raised.
pub struct SymbolicMember {
    owner: ClassRef,
    name: String,
    ty: MemberType,
    ref_kind: RefKind,
    resolution: OnceLock<Result<ResolvedMember>>,
}

impl SymbolicMember {
    pub fn new(owner: &ClassRef, name: &str, ty: MemberType, ref_kind: RefKind) -> Self {
        Self {
            owner: owner.clone(),
            name: name.to_string(),
            ty,
            ref_kind,
            resolution: OnceLock::new(),
        }
    }

    pub fn method(owner: &ClassRef, name: &str, ty: TypeDescriptor, ref_kind: RefKind) -> Self {
        Self::new(owner, name, MemberType::Method(ty), ref_kind)
    }

    pub fn field(owner: &ClassRef, name: &str, ty: &ClassRef, ref_kind: RefKind) -> Self {
        Self::new(owner, name, MemberType::Field(ty.clone()), ref_kind)
    }

    pub fn owner(&self) -> &ClassRef {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &MemberType {
        &self.ty
    }

    pub fn ref_kind(&self) -> RefKind {
        self.ref_kind
    }

    /// Modifier bits of the resolved member, once resolved.
    pub fn modifiers(&self) -> Option<Modifiers> {
        match self.resolution.get() {
            Some(Ok(member)) => Some(member.modifiers()),
            _ => None,
        }
    }

    pub fn resolution_state(&self) -> ResolutionState {
        match self.resolution.get() {
            None => ResolutionState::Unresolved,
            Some(Ok(_)) => ResolutionState::Resolved,
            Some(Err(_)) => ResolutionState::Failed,
        }
    }

    /// Resolves with `resolver` on first call; later calls return the
    /// recorded outcome without consulting `resolver`.
    pub fn resolve_with<F>(&self, resolver: F) -> Result<ResolvedMember>
    where
        F: FnOnce(&SymbolicMember) -> Result<ResolvedMember>,
    {
        self.resolution.get_or_init(|| resolver(self)).clone()
    }
}

impl Debug for SymbolicMember {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}.{}:{} ({:?})",
            self.ref_kind,
            self.owner.name(),
            self.name,
            self.ty,
            self.resolution_state()
        )
    }
}
