//! The class table consulted by handles.
//!
//! Classes are created once through [`ClassBuilder`] and never freed; a
//! [`ClassRef`] compares by class identity. Methods and constructors may be
//! added after the class exists so their signatures can mention the class
//! itself; the instance field layout is fixed at build time.

use crate::basic_type::{BasicType, PrimitiveKind};
use crate::collections::ConcurrentMap;
use crate::descriptor::TypeDescriptor;
use crate::error::{Error, Result};
use crate::member::{MemberDef, MemberType, NativeMethod};
use crate::value::Value;
use bitflags::bitflags;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Modifiers: u32 {
        const PUBLIC       = 0x0001;
        const PRIVATE      = 0x0002;
        const PROTECTED    = 0x0004;
        const STATIC       = 0x0008;
        const FINAL        = 0x0010;
        const VARARGS      = 0x0080;
        const NATIVE       = 0x0100;
        const INTERFACE    = 0x0200;
        const ABSTRACT     = 0x0400;
    }
}

impl Modifiers {
    /// Neither public, protected nor private.
    pub fn is_package_private(self) -> bool {
        !self.intersects(Modifiers::PUBLIC | Modifiers::PROTECTED | Modifiers::PRIVATE)
    }
}

pub type ClassRef = Arc<ClassInfo>;

#[derive(Clone)]
pub enum ClassKind {
    Primitive(PrimitiveKind),
    Class,
    Interface,
    Array(ClassRef),
}

static NEXT_CLASS_ID: AtomicU32 = AtomicU32::new(1);

pub struct ClassInfo {
    id: u32,
    name: String,
    kind: ClassKind,
    modifiers: Modifiers,
    superclass: Option<ClassRef>,
    interfaces: Vec<ClassRef>,
    wrapper_of: Option<PrimitiveKind>,
    instance_fields: Vec<BasicType>,
    members: RwLock<Vec<Arc<MemberDef>>>,
    statics: RwLock<Vec<Value>>,
}

impl ClassInfo {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// The package a class belongs to. Arrays live in their element's package.
    pub fn package_name(&self) -> &str {
        match &self.kind {
            ClassKind::Primitive(_) => "java.lang",
            ClassKind::Array(component) => component.package_name(),
            _ => match self.name.rfind('.') {
                Some(pos) => &self.name[..pos],
                None => "",
            },
        }
    }

    pub fn same_package(&self, other: &ClassInfo) -> bool {
        self.package_name() == other.package_name()
    }

    pub fn kind(&self) -> &ClassKind {
        &self.kind
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn is_public(&self) -> bool {
        self.modifiers.contains(Modifiers::PUBLIC)
    }

    pub fn is_interface(&self) -> bool {
        matches!(self.kind, ClassKind::Interface)
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, ClassKind::Primitive(_))
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind, ClassKind::Primitive(PrimitiveKind::Void))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, ClassKind::Array(_))
    }

    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match self.kind {
            ClassKind::Primitive(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn component_type(&self) -> Option<&ClassRef> {
        match &self.kind {
            ClassKind::Array(component) => Some(component),
            _ => None,
        }
    }

    pub fn superclass(&self) -> Option<&ClassRef> {
        self.superclass.as_ref()
    }

    pub fn interfaces(&self) -> &[ClassRef] {
        &self.interfaces
    }

    /// The primitive this class boxes, for the wrapper classes.
    pub fn wrapper_kind(&self) -> Option<PrimitiveKind> {
        self.wrapper_of
    }

    pub fn basic_type(&self) -> BasicType {
        match self.kind {
            ClassKind::Primitive(kind) => kind.basic_type(),
            _ => BasicType::L,
        }
    }

    pub fn is_object(&self) -> bool {
        self.id == classes::object().id
    }

    pub fn is_throwable(&self) -> bool {
        self.is_subclass_of(classes::throwable())
    }

    /// Walks superclasses and implemented interfaces.
    pub fn is_subclass_of(&self, other: &ClassInfo) -> bool {
        if self.id == other.id {
            return true;
        }
        if let Some(superclass) = &self.superclass {
            if superclass.is_subclass_of(other) {
                return true;
            }
        }
        self.interfaces.iter().any(|iface| iface.is_subclass_of(other))
    }

    /// Whether a value of static type `other` can be stored in a location of
    /// type `self` without a conversion.
    pub fn is_assignable_from(&self, other: &ClassInfo) -> bool {
        if self.id == other.id {
            return true;
        }
        if self.is_primitive() || other.is_primitive() {
            return false;
        }
        if self.is_object() {
            return true;
        }
        match (&self.kind, &other.kind) {
            (ClassKind::Array(mine), ClassKind::Array(theirs)) => {
                if mine.is_primitive() || theirs.is_primitive() {
                    mine.id == theirs.id
                } else {
                    mine.is_assignable_from(theirs)
                }
            }
            (_, ClassKind::Array(_)) => false,
            _ => other.is_subclass_of(self),
        }
    }

    /// Runtime type test; `null` is never an instance.
    pub fn is_instance(&self, value: &Value) -> bool {
        match value {
            Value::Ref(object) => self.is_assignable_from(object.class()),
            _ => false,
        }
    }

    pub fn array_type(self: &Arc<Self>) -> ClassRef {
        array_of(self)
    }

    pub fn instance_field_types(&self) -> &[BasicType] {
        &self.instance_fields
    }

    pub fn members(&self) -> Vec<Arc<MemberDef>> {
        self.members.read().clone()
    }

    /// Looks up a member declared directly on this class.
    pub fn find_declared(&self, name: &str, ty: &MemberType) -> Option<Arc<MemberDef>> {
        self.members
            .read()
            .iter()
            .find(|member| member.name() == name && member.ty() == ty)
            .cloned()
    }

    /// Selects the implementation a virtual call on an instance of this class
    /// dispatches to: the closest concrete override along the superclass
    /// chain, then default methods from interfaces. Private methods never
    /// override.
    pub fn find_method_impl(
        self: &Arc<Self>,
        name: &str,
        ty: &TypeDescriptor,
    ) -> Option<(ClassRef, Arc<MemberDef>)> {
        let wanted = MemberType::Method(ty.clone());
        let mut current = Some(self.clone());
        while let Some(class) = current {
            if let Some(member) = class.find_declared(name, &wanted) {
                if !member.is_static() && !member.is_abstract() && !member.is_private() {
                    return Some((class, member));
                }
            }
            current = class.superclass.clone();
        }
        let mut pending: Vec<ClassRef> = Vec::new();
        let mut cursor = Some(self.clone());
        while let Some(class) = cursor {
            pending.extend(class.interfaces.iter().cloned());
            cursor = class.superclass.clone();
        }
        while let Some(iface) = pending.pop() {
            if let Some(member) = iface.find_declared(name, &wanted) {
                if !member.is_static() && !member.is_abstract() && !member.is_private() {
                    return Some((iface, member));
                }
            }
            pending.extend(iface.interfaces.iter().cloned());
        }
        None
    }

    /// Adds a method, constructor or static field after the class was built.
    pub fn add_member(&self, member: MemberDef) -> Result<Arc<MemberDef>> {
        if member.is_field() && !member.is_static() {
            return Err(Error::IllegalArgument(format!(
                "instance field {} must be declared before {} is built",
                member.name(),
                self.name
            )));
        }
        let member = if member.is_field() {
            let mut statics = self.statics.write();
            let slot = statics.len();
            statics.push(Value::zero_of(member.field_type().unwrap_or(classes::object())));
            Arc::new(member.with_slot(slot))
        } else {
            Arc::new(member)
        };
        let mut members = self.members.write();
        if members
            .iter()
            .any(|existing| existing.name() == member.name() && existing.ty() == member.ty())
        {
            return Err(Error::IllegalArgument(format!(
                "duplicate member {} on {}",
                member.name(),
                self.name
            )));
        }
        members.push(member.clone());
        Ok(member)
    }

    pub fn add_method(
        &self,
        name: &str,
        ty: TypeDescriptor,
        modifiers: Modifiers,
        body: NativeMethod,
    ) -> Result<Arc<MemberDef>> {
        self.add_member(MemberDef::method(name, ty, modifiers, body))
    }

    pub fn static_value(&self, slot: usize) -> Result<Value> {
        self.statics.read().get(slot).cloned().ok_or_else(|| {
            Error::Internal(format!("static slot {} out of range on {}", slot, self.name))
        })
    }

    pub fn set_static_value(&self, slot: usize, value: Value) -> Result<()> {
        let mut statics = self.statics.write();
        let target = statics.get_mut(slot).ok_or_else(|| {
            Error::Internal(format!("static slot {} out of range on {}", slot, self.name))
        })?;
        *target = value;
        Ok(())
    }
}

impl PartialEq for ClassInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ClassInfo {}

impl Hash for ClassInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Debug for ClassInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "class {}", self.name)
    }
}

impl Display for ClassInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

enum PendingMember {
    Field {
        name: String,
        ty: ClassRef,
        modifiers: Modifiers,
    },
    Other(MemberDef),
}

/// Builds a [`ClassInfo`]. Instance fields are laid out after the
/// superclass's fields in declaration order.
pub struct ClassBuilder {
    name: String,
    kind: ClassKind,
    modifiers: Modifiers,
    superclass: Option<ClassRef>,
    root: bool,
    interfaces: Vec<ClassRef>,
    wrapper_of: Option<PrimitiveKind>,
    members: Vec<PendingMember>,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ClassKind::Class,
            modifiers: Modifiers::PUBLIC,
            superclass: None,
            root: false,
            interfaces: Vec::new(),
            wrapper_of: None,
            members: Vec::new(),
        }
    }

    pub fn interface(name: impl Into<String>) -> Self {
        let mut builder = Self::new(name);
        builder.kind = ClassKind::Interface;
        builder.modifiers |= Modifiers::INTERFACE | Modifiers::ABSTRACT;
        builder
    }

    fn primitive(kind: PrimitiveKind) -> Self {
        let mut builder = Self::new(kind.name());
        builder.kind = ClassKind::Primitive(kind);
        builder.modifiers = Modifiers::PUBLIC | Modifiers::FINAL | Modifiers::ABSTRACT;
        builder.root = true;
        builder
    }

    fn root_class(name: &str) -> Self {
        let mut builder = Self::new(name);
        builder.root = true;
        builder
    }

    fn wraps(mut self, kind: PrimitiveKind) -> Self {
        self.wrapper_of = Some(kind);
        self.modifiers |= Modifiers::FINAL;
        self
    }

    pub fn modifiers(mut self, modifiers: Modifiers) -> Self {
        let structural = self.modifiers & (Modifiers::INTERFACE | Modifiers::ABSTRACT);
        self.modifiers = modifiers | structural;
        self
    }

    pub fn superclass(mut self, superclass: &ClassRef) -> Self {
        self.superclass = Some(superclass.clone());
        self
    }

    pub fn implements(mut self, iface: &ClassRef) -> Self {
        self.interfaces.push(iface.clone());
        self
    }

    pub fn field(mut self, name: &str, ty: &ClassRef, modifiers: Modifiers) -> Self {
        self.members.push(PendingMember::Field {
            name: name.to_string(),
            ty: ty.clone(),
            modifiers,
        });
        self
    }

    pub fn method(
        mut self,
        name: &str,
        ty: TypeDescriptor,
        modifiers: Modifiers,
        body: NativeMethod,
    ) -> Self {
        self.members
            .push(PendingMember::Other(MemberDef::method(name, ty, modifiers, body)));
        self
    }

    pub fn abstract_method(mut self, name: &str, ty: TypeDescriptor, modifiers: Modifiers) -> Self {
        self.members
            .push(PendingMember::Other(MemberDef::abstract_method(name, ty, modifiers)));
        self
    }

    pub fn constructor(mut self, ty: TypeDescriptor, modifiers: Modifiers, body: NativeMethod) -> Self {
        self.members
            .push(PendingMember::Other(MemberDef::constructor(ty, modifiers, body)));
        self
    }

    pub fn member(mut self, member: MemberDef) -> Self {
        self.members.push(PendingMember::Other(member));
        self
    }

    pub fn build(self) -> ClassRef {
        let superclass = match (&self.kind, self.superclass, self.root) {
            (_, Some(superclass), _) => Some(superclass),
            (ClassKind::Class, None, false) => Some(classes::object().clone()),
            _ => None,
        };
        let mut instance_fields: Vec<BasicType> = superclass
            .as_ref()
            .map(|superclass| superclass.instance_fields.clone())
            .unwrap_or_default();
        let mut statics = Vec::new();
        let mut members = Vec::with_capacity(self.members.len());
        for pending in self.members {
            match pending {
                PendingMember::Field {
                    name,
                    ty,
                    modifiers,
                } => {
                    let slot = if modifiers.contains(Modifiers::STATIC) {
                        statics.push(Value::zero_of(&ty));
                        statics.len() - 1
                    } else {
                        instance_fields.push(ty.basic_type());
                        instance_fields.len() - 1
                    };
                    members.push(Arc::new(MemberDef::field(&name, ty, modifiers, slot)));
                }
                PendingMember::Other(member) => members.push(Arc::new(member)),
            }
        }
        Arc::new(ClassInfo {
            id: NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed),
            name: self.name,
            kind: self.kind,
            modifiers: self.modifiers,
            superclass,
            interfaces: self.interfaces,
            wrapper_of: self.wrapper_of,
            instance_fields,
            members: RwLock::new(members),
            statics: RwLock::new(statics),
        })
    }
}

static ARRAY_CLASSES: Lazy<ConcurrentMap<u32, ClassRef>> = Lazy::new(ConcurrentMap::new);

fn array_of(component: &ClassRef) -> ClassRef {
    ARRAY_CLASSES.get_or_insert_with(component.id, || {
        let visibility = component.modifiers & Modifiers::PUBLIC;
        Arc::new(ClassInfo {
            id: NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed),
            name: format!("{}[]", component.name),
            kind: ClassKind::Array(component.clone()),
            modifiers: visibility | Modifiers::FINAL | Modifiers::ABSTRACT,
            superclass: Some(classes::object().clone()),
            interfaces: Vec::new(),
            wrapper_of: None,
            instance_fields: Vec::new(),
            members: RwLock::new(Vec::new()),
            statics: RwLock::new(Vec::new()),
        })
    })
}

/// Classes the invocation core itself needs to name.
pub mod classes {
    use super::*;

    pub(super) struct WellKnown {
        object: ClassRef,
        primitives: Vec<ClassRef>,
        wrappers: Vec<ClassRef>,
        number: ClassRef,
        comparable: ClassRef,
        string: ClassRef,
        class: ClassRef,
        method_handle: ClassRef,
        throwable: ClassRef,
        exception: ClassRef,
        runtime_exception: ClassRef,
        error: ClassRef,
        arithmetic_exception: ClassRef,
        class_cast_exception: ClassRef,
        null_pointer_exception: ClassRef,
        illegal_argument_exception: ClassRef,
        wrong_method_type_exception: ClassRef,
        index_out_of_bounds_exception: ClassRef,
        array_store_exception: ClassRef,
        security_exception: ClassRef,
        reflective_operation_exception: ClassRef,
        illegal_access_exception: ClassRef,
        no_such_method_exception: ClassRef,
        no_such_field_exception: ClassRef,
        linkage_error: ClassRef,
        internal_error: ClassRef,
    }

    fn subclass(name: &str, parent: &ClassRef) -> ClassRef {
        ClassBuilder::new(name).superclass(parent).build()
    }

    impl WellKnown {
        fn link() -> Self {
            let object = ClassBuilder::root_class("java.lang.Object").build();
            let with_object = |builder: ClassBuilder| builder.superclass(&object).build();
            let primitives = PrimitiveKind::ALL
                .iter()
                .map(|kind| ClassBuilder::primitive(*kind).build())
                .collect::<Vec<_>>();
            let comparable = ClassBuilder::interface("java.lang.Comparable").build();
            let number = with_object(
                ClassBuilder::new("java.lang.Number")
                    .modifiers(Modifiers::PUBLIC | Modifiers::ABSTRACT),
            );
            let wrappers = PrimitiveKind::ALL
                .iter()
                .map(|kind| {
                    let parent = if kind.is_numeric() { &number } else { &object };
                    let mut builder = ClassBuilder::new(kind.wrapper_name())
                        .superclass(parent)
                        .wraps(*kind);
                    if *kind != PrimitiveKind::Void {
                        builder = builder.implements(&comparable);
                    }
                    builder.build()
                })
                .collect::<Vec<_>>();
            let string = with_object(
                ClassBuilder::new("java.lang.String")
                    .modifiers(Modifiers::PUBLIC | Modifiers::FINAL)
                    .implements(&comparable),
            );
            let class = with_object(
                ClassBuilder::new("java.lang.Class").modifiers(Modifiers::PUBLIC | Modifiers::FINAL),
            );
            let method_handle = with_object(
                ClassBuilder::new("java.lang.invoke.MethodHandle")
                    .modifiers(Modifiers::PUBLIC | Modifiers::ABSTRACT),
            );
            let throwable = with_object(ClassBuilder::new("java.lang.Throwable"));
            let exception = subclass("java.lang.Exception", &throwable);
            let runtime_exception = subclass("java.lang.RuntimeException", &exception);
            let error = subclass("java.lang.Error", &throwable);
            let reflective_operation_exception =
                subclass("java.lang.ReflectiveOperationException", &exception);
            let linkage_error = subclass("java.lang.LinkageError", &error);
            let index_out_of_bounds =
                subclass("java.lang.IndexOutOfBoundsException", &runtime_exception);
            WellKnown {
                arithmetic_exception: subclass("java.lang.ArithmeticException", &runtime_exception),
                class_cast_exception: subclass("java.lang.ClassCastException", &runtime_exception),
                null_pointer_exception: subclass(
                    "java.lang.NullPointerException",
                    &runtime_exception,
                ),
                illegal_argument_exception: subclass(
                    "java.lang.IllegalArgumentException",
                    &runtime_exception,
                ),
                wrong_method_type_exception: subclass(
                    "java.lang.invoke.WrongMethodTypeException",
                    &runtime_exception,
                ),
                index_out_of_bounds_exception: subclass(
                    "java.lang.ArrayIndexOutOfBoundsException",
                    &index_out_of_bounds,
                ),
                array_store_exception: subclass("java.lang.ArrayStoreException", &runtime_exception),
                security_exception: subclass("java.lang.SecurityException", &runtime_exception),
                illegal_access_exception: subclass(
                    "java.lang.IllegalAccessException",
                    &reflective_operation_exception,
                ),
                no_such_method_exception: subclass(
                    "java.lang.NoSuchMethodException",
                    &reflective_operation_exception,
                ),
                no_such_field_exception: subclass(
                    "java.lang.NoSuchFieldException",
                    &reflective_operation_exception,
                ),
                internal_error: subclass("java.lang.InternalError", &error),
                linkage_error,
                reflective_operation_exception,
                object,
                primitives,
                wrappers,
                number,
                comparable,
                string,
                class,
                method_handle,
                throwable,
                exception,
                runtime_exception,
                error,
            }
        }
    }

    static WELL_KNOWN: Lazy<WellKnown> = Lazy::new(WellKnown::link);

    pub fn object() -> &'static ClassRef {
        &WELL_KNOWN.object
    }

    pub fn primitive(kind: PrimitiveKind) -> &'static ClassRef {
        &WELL_KNOWN.primitives[kind as usize]
    }

    pub fn wrapper(kind: PrimitiveKind) -> &'static ClassRef {
        &WELL_KNOWN.wrappers[kind as usize]
    }

    pub fn boolean() -> &'static ClassRef {
        primitive(PrimitiveKind::Boolean)
    }

    pub fn int() -> &'static ClassRef {
        primitive(PrimitiveKind::Int)
    }

    pub fn long() -> &'static ClassRef {
        primitive(PrimitiveKind::Long)
    }

    pub fn float() -> &'static ClassRef {
        primitive(PrimitiveKind::Float)
    }

    pub fn double() -> &'static ClassRef {
        primitive(PrimitiveKind::Double)
    }

    pub fn void() -> &'static ClassRef {
        primitive(PrimitiveKind::Void)
    }

    /// The class used to carry a value of the given basic type.
    pub fn for_basic_type(ty: BasicType) -> &'static ClassRef {
        match ty.primitive_kind() {
            Some(kind) => primitive(kind),
            None => object(),
        }
    }

    pub fn number() -> &'static ClassRef {
        &WELL_KNOWN.number
    }

    pub fn comparable() -> &'static ClassRef {
        &WELL_KNOWN.comparable
    }

    pub fn string() -> &'static ClassRef {
        &WELL_KNOWN.string
    }

    pub fn class() -> &'static ClassRef {
        &WELL_KNOWN.class
    }

    pub fn method_handle() -> &'static ClassRef {
        &WELL_KNOWN.method_handle
    }

    pub fn throwable() -> &'static ClassRef {
        &WELL_KNOWN.throwable
    }

    pub fn exception() -> &'static ClassRef {
        &WELL_KNOWN.exception
    }

    pub fn runtime_exception() -> &'static ClassRef {
        &WELL_KNOWN.runtime_exception
    }

    pub fn error() -> &'static ClassRef {
        &WELL_KNOWN.error
    }

    pub fn arithmetic_exception() -> &'static ClassRef {
        &WELL_KNOWN.arithmetic_exception
    }

    pub fn class_cast_exception() -> &'static ClassRef {
        &WELL_KNOWN.class_cast_exception
    }

    pub fn null_pointer_exception() -> &'static ClassRef {
        &WELL_KNOWN.null_pointer_exception
    }

    pub fn illegal_argument_exception() -> &'static ClassRef {
        &WELL_KNOWN.illegal_argument_exception
    }

    pub fn wrong_method_type_exception() -> &'static ClassRef {
        &WELL_KNOWN.wrong_method_type_exception
    }

    pub fn index_out_of_bounds_exception() -> &'static ClassRef {
        &WELL_KNOWN.index_out_of_bounds_exception
    }

    pub fn array_store_exception() -> &'static ClassRef {
        &WELL_KNOWN.array_store_exception
    }

    pub fn security_exception() -> &'static ClassRef {
        &WELL_KNOWN.security_exception
    }

    pub fn reflective_operation_exception() -> &'static ClassRef {
        &WELL_KNOWN.reflective_operation_exception
    }

    pub fn illegal_access_exception() -> &'static ClassRef {
        &WELL_KNOWN.illegal_access_exception
    }

    pub fn no_such_method_exception() -> &'static ClassRef {
        &WELL_KNOWN.no_such_method_exception
    }

    pub fn no_such_field_exception() -> &'static ClassRef {
        &WELL_KNOWN.no_such_field_exception
    }

    pub fn linkage_error() -> &'static ClassRef {
        &WELL_KNOWN.linkage_error
    }

    pub fn internal_error() -> &'static ClassRef {
        &WELL_KNOWN.internal_error
    }

    /// Finds a well-known class by its fully qualified or primitive name.
    pub fn by_name(name: &str) -> Option<ClassRef> {
        if let Some(component) = name.strip_suffix("[]") {
            return by_name(component).map(|component| component.array_type());
        }
        if let Some(kind) = PrimitiveKind::from_name(name) {
            return Some(primitive(kind).clone());
        }
        let known = &*WELL_KNOWN;
        std::iter::once(&known.object)
            .chain(known.wrappers.iter())
            .chain([
                &known.number,
                &known.comparable,
                &known.string,
                &known.class,
                &known.method_handle,
                &known.throwable,
                &known.exception,
                &known.runtime_exception,
                &known.error,
                &known.arithmetic_exception,
                &known.class_cast_exception,
                &known.null_pointer_exception,
                &known.illegal_argument_exception,
                &known.wrong_method_type_exception,
                &known.index_out_of_bounds_exception,
                &known.array_store_exception,
                &known.security_exception,
                &known.reflective_operation_exception,
                &known.illegal_access_exception,
                &known.no_such_method_exception,
                &known.no_such_field_exception,
                &known.linkage_error,
                &known.internal_error,
            ])
            .find(|class| class.name() == name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrappers_and_primitives_are_distinct() {
        let int = classes::int();
        let integer = classes::wrapper(PrimitiveKind::Int);
        assert!(int.is_primitive());
        assert_eq!(integer.wrapper_kind(), Some(PrimitiveKind::Int));
        assert!(!int.is_assignable_from(integer));
        assert!(classes::number().is_assignable_from(integer));
        assert!(classes::comparable().is_assignable_from(integer));
        assert!(classes::object().is_assignable_from(integer));
    }

    #[test]
    fn array_classes_are_unique_and_covariant() {
        let strings = classes::string().array_type();
        assert!(Arc::ptr_eq(&strings, &classes::string().array_type()));
        let objects = classes::object().array_type();
        assert!(objects.is_assignable_from(&strings));
        assert!(!strings.is_assignable_from(&objects));
        let ints = classes::int().array_type();
        assert!(!objects.is_assignable_from(&ints));
        assert!(classes::object().is_assignable_from(&ints));
        assert_eq!(ints.name(), "int[]");
        assert_eq!(
            classes::by_name("java.lang.String[]").map(|class| class.id()),
            Some(strings.id())
        );
    }

    #[test]
    fn throwable_hierarchy_is_linked() {
        assert!(classes::arithmetic_exception().is_throwable());
        assert!(classes::runtime_exception().is_assignable_from(classes::class_cast_exception()));
        assert!(!classes::runtime_exception().is_assignable_from(classes::linkage_error()));
        assert_eq!(classes::string().package_name(), "java.lang");
    }

    #[test]
    fn private_methods_do_not_override() {
        let ty = TypeDescriptor::of(classes::int(), &[]).unwrap();
        let body = || crate::member::native(|_, _| Ok(Value::Int(0)));
        let base = ClassBuilder::new("dispatch.Base")
            .method("run", ty.clone(), Modifiers::PUBLIC, body())
            .build();
        let sub = ClassBuilder::new("dispatch.Sub")
            .superclass(&base)
            .method("run", ty.clone(), Modifiers::PRIVATE, body())
            .build();
        let (owner, _) = sub.find_method_impl("run", &ty).unwrap();
        assert_eq!(owner, base);
    }
}
