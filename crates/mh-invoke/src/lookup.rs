//! Access-checked resolution of members into direct handles.
//!
//! A [`Lookup`] carries the class it acts for and the access modes it
//! holds. Every `find_*` call checks that the owner class is accessible,
//! asks the host's [`mh_core::host::MemberLookup`] for the member, checks the member's
//! modifiers against the lookup class, consults the host's
//! [`mh_core::host::AccessCheck`] policy for anything non-public or
//! cross-package, and builds a direct handle. Protected instance members
//! reached from a subclass in another package get their receiver narrowed
//! to the lookup class.

use crate::handle::direct::{make_direct, MemberCall};
use crate::handle::CallHandle;
use crate::runtime::{self, HostServices};
use mh_core::collections::ConcurrentMap;
use mh_core::host::AccessModes;
use mh_core::member::CONSTRUCTOR_NAME;
use mh_core::{
    classes, config, debug, ClassRef, Error, MemberType, RefKind, ResolvedMember, Result,
    SymbolicMember, TypeDescriptor, Value,
};
use once_cell::sync::Lazy;
use std::fmt::{Debug, Formatter};

/// Handles for public members that do not depend on the caller.
static DIRECT_HANDLES: Lazy<ConcurrentMap<(ResolvedMember, RefKind), CallHandle>> =
    Lazy::new(ConcurrentMap::new);

#[derive(Clone)]
pub struct Lookup {
    lookup_class: ClassRef,
    modes: AccessModes,
    services: HostServices,
}

impl Lookup {
    /// Full-power lookup for `lookup_class` using the installed services.
    pub fn new(lookup_class: &ClassRef) -> Self {
        Self::with_services(lookup_class, runtime::services().clone())
    }

    pub fn with_services(lookup_class: &ClassRef, services: HostServices) -> Self {
        Self {
            lookup_class: lookup_class.clone(),
            modes: AccessModes::all(),
            services,
        }
    }

    /// Lookup that only sees public members of public classes.
    pub fn public_lookup() -> Self {
        Self {
            lookup_class: classes::object().clone(),
            modes: AccessModes::PUBLIC,
            services: runtime::services().clone(),
        }
    }

    pub fn lookup_class(&self) -> &ClassRef {
        &self.lookup_class
    }

    pub fn lookup_modes(&self) -> AccessModes {
        self.modes
    }

    /// The same lookup acting for `class`, with whatever modes survive the
    /// move: private and protected access stay with the original class,
    /// package access stays within its package.
    pub fn in_class(&self, class: &ClassRef) -> Lookup {
        if *class == self.lookup_class {
            return self.clone();
        }
        let mut modes = self.modes - (AccessModes::PRIVATE | AccessModes::PROTECTED);
        if !class.same_package(&self.lookup_class) {
            modes.remove(AccessModes::PACKAGE);
        }
        if !class.is_public() && !class.same_package(&self.lookup_class) {
            modes = AccessModes::empty();
        }
        Lookup {
            lookup_class: class.clone(),
            modes,
            services: self.services.clone(),
        }
    }

    /// Drops `mode` and every mode implying it.
    pub fn drop_lookup_mode(&self, mode: AccessModes) -> Lookup {
        let dropped = if mode.contains(AccessModes::PUBLIC) {
            AccessModes::all()
        } else if mode.contains(AccessModes::PACKAGE) {
            AccessModes::PACKAGE | AccessModes::PROTECTED | AccessModes::PRIVATE
        } else if mode.contains(AccessModes::PROTECTED) {
            AccessModes::PROTECTED | AccessModes::PRIVATE
        } else {
            mode
        };
        Lookup {
            modes: self.modes - dropped,
            ..self.clone()
        }
    }

    pub fn find_static(&self, refc: &ClassRef, name: &str, ty: &TypeDescriptor) -> Result<CallHandle> {
        self.resolve(RefKind::InvokeStatic, refc, name, MemberType::Method(ty.clone()))
    }

    pub fn find_virtual(&self, refc: &ClassRef, name: &str, ty: &TypeDescriptor) -> Result<CallHandle> {
        let ref_kind = if refc.is_interface() {
            RefKind::InvokeInterface
        } else {
            RefKind::InvokeVirtual
        };
        self.resolve(ref_kind, refc, name, MemberType::Method(ty.clone()))
    }

    /// `ty` lists the constructor parameters and returns void; the handle
    /// returns the new instance.
    pub fn find_constructor(&self, refc: &ClassRef, ty: &TypeDescriptor) -> Result<CallHandle> {
        if !ty.return_type().is_void() {
            return Err(Error::NoSuchMethod(format!(
                "constructor type must return void: {}",
                ty
            )));
        }
        self.resolve(
            RefKind::NewInvokeSpecial,
            refc,
            CONSTRUCTOR_NAME,
            MemberType::Method(ty.clone()),
        )
    }

    /// Calls `name` without virtual dispatch, as `special_caller` would
    /// call a superclass method. The receiver must be a `special_caller`.
    pub fn find_special(
        &self,
        refc: &ClassRef,
        name: &str,
        ty: &TypeDescriptor,
        special_caller: &ClassRef,
    ) -> Result<CallHandle> {
        if !self.modes.contains(AccessModes::PRIVATE) || *special_caller != self.lookup_class {
            return Err(Error::IllegalAccess(format!(
                "no private access for invokespecial: {}, from {}",
                special_caller.name(),
                self
            )));
        }
        self.check_class(refc)?;
        let member = self.find_member(RefKind::InvokeSpecial, refc, name, &MemberType::Method(ty.clone()))?;
        self.check_member(RefKind::InvokeSpecial, &member)?;
        let call = self.member_call(&member, RefKind::InvokeSpecial)?;
        let call = if member.declaring_class().is_assignable_from(special_caller) {
            call.with_receiver(special_caller)?
        } else {
            call
        };
        self.finish(&member, make_direct(call)?)
    }

    pub fn find_getter(&self, refc: &ClassRef, name: &str, ty: &ClassRef) -> Result<CallHandle> {
        self.resolve(RefKind::GetField, refc, name, MemberType::Field(ty.clone()))
    }

    pub fn find_setter(&self, refc: &ClassRef, name: &str, ty: &ClassRef) -> Result<CallHandle> {
        self.resolve(RefKind::PutField, refc, name, MemberType::Field(ty.clone()))
    }

    pub fn find_static_getter(&self, refc: &ClassRef, name: &str, ty: &ClassRef) -> Result<CallHandle> {
        self.resolve(RefKind::GetStatic, refc, name, MemberType::Field(ty.clone()))
    }

    pub fn find_static_setter(&self, refc: &ClassRef, name: &str, ty: &ClassRef) -> Result<CallHandle> {
        self.resolve(RefKind::PutStatic, refc, name, MemberType::Field(ty.clone()))
    }

    /// The virtual method `name` of `receiver`'s class with the receiver
    /// bound. A varargs method stays varargs.
    pub fn bind(&self, receiver: &Value, name: &str, ty: &TypeDescriptor) -> Result<CallHandle> {
        let Some(class) = receiver.class() else {
            return Err(Error::NullPointer(format!("cannot bind {} to null", name)));
        };
        let handle = self.find_virtual(class, name, ty)?;
        let bound = handle.as_fixed_arity().bind_to(receiver.clone())?;
        if !handle.is_varargs_collector() {
            return Ok(bound);
        }
        match bound.ty().last_parameter_type().cloned() {
            Some(array) => bound.as_varargs_collector(&array),
            None => Ok(bound),
        }
    }

    /// Resolves and access-checks `name` in `refc`, then builds its direct
    /// handle.
    pub fn resolve(
        &self,
        ref_kind: RefKind,
        refc: &ClassRef,
        name: &str,
        ty: MemberType,
    ) -> Result<CallHandle> {
        self.check_class(refc)?;
        let member = self.find_member(ref_kind, refc, name, &ty)?;
        self.handle_for(ref_kind, member)
    }

    /// Like [`Lookup::resolve`], but the member search runs at most once per
    /// symbolic member; its outcome is remembered, failures included.
    /// Access is checked on every call since it depends on the lookup.
    pub fn resolve_member(&self, symbolic: &SymbolicMember) -> Result<CallHandle> {
        self.check_class(symbolic.owner())?;
        let member = symbolic.resolve_with(|s| {
            self.find_member(s.ref_kind(), s.owner(), s.name(), s.ty())
        })?;
        self.handle_for(symbolic.ref_kind(), member)
    }

    fn handle_for(&self, ref_kind: RefKind, member: ResolvedMember) -> Result<CallHandle> {
        // Private methods are not selected by the receiver's class.
        let ref_kind = match ref_kind {
            RefKind::InvokeVirtual | RefKind::InvokeInterface if member.def().is_private() => {
                RefKind::InvokeSpecial
            }
            other => other,
        };
        let narrow = self.check_member(ref_kind, &member)?;
        let cacheable = !narrow
            && config::global().cache_direct_handles
            && member.declaring_class().is_public()
            && member.modifiers().contains(mh_core::Modifiers::PUBLIC)
            && !member.is_caller_sensitive();
        if cacheable {
            let key = (member.clone(), ref_kind);
            if let Some(handle) = DIRECT_HANDLES.get_cloned(&key) {
                debug!("direct handle cache hit for {}", member);
                return Ok(handle);
            }
            debug!("direct handle cache miss for {}", member);
            return DIRECT_HANDLES.try_get_or_insert_with(key, || {
                let call = self.member_call(&member, ref_kind)?;
                self.finish(&member, make_direct(call)?)
            });
        }
        let call = self.member_call(&member, ref_kind)?;
        let call = if narrow {
            call.with_receiver(&self.lookup_class)?
        } else {
            call
        };
        self.finish(&member, make_direct(call)?)
    }

    fn member_call(&self, member: &ResolvedMember, ref_kind: RefKind) -> Result<MemberCall> {
        let caller = member
            .is_caller_sensitive()
            .then(|| self.lookup_class.clone());
        MemberCall::new(member.clone(), ref_kind, caller)
    }

    fn finish(&self, member: &ResolvedMember, handle: CallHandle) -> Result<CallHandle> {
        if !member.def().is_varargs() {
            return Ok(handle);
        }
        match handle.ty().last_parameter_type().cloned() {
            Some(array) if array.is_array() => handle.as_varargs_collector(&array),
            _ => Ok(handle),
        }
    }

    fn find_member(
        &self,
        ref_kind: RefKind,
        refc: &ClassRef,
        name: &str,
        ty: &MemberType,
    ) -> Result<ResolvedMember> {
        let search_supers = ref_kind != RefKind::NewInvokeSpecial;
        let found = self
            .services
            .members
            .find_members(refc, name, ty, search_supers);
        let Some(member) = found.into_iter().next() else {
            let missing = format!("no such member: {}.{}{}", refc.name(), name, ty);
            return Err(match ty {
                MemberType::Field(_) => Error::NoSuchField(missing),
                MemberType::Method(_) => Error::NoSuchMethod(missing),
            });
        };
        if ref_kind.is_static() != member.is_static() {
            return Err(Error::IllegalAccess(format!(
                "expected {} member for {}: {}",
                if ref_kind.is_static() { "a static" } else { "an instance" },
                ref_kind,
                member
            )));
        }
        if ref_kind.is_field() != member.def().is_field() {
            let missing = format!("{} is not accessible as {}", member, ref_kind);
            return Err(match ty {
                MemberType::Field(_) => Error::NoSuchField(missing),
                MemberType::Method(_) => Error::NoSuchMethod(missing),
            });
        }
        Ok(member)
    }

    fn check_class(&self, refc: &ClassRef) -> Result<()> {
        let accessible = !self.modes.is_empty()
            && (refc.is_public()
                || (self.modes.contains(AccessModes::PACKAGE)
                    && refc.same_package(&self.lookup_class)));
        if !accessible {
            return Err(Error::IllegalAccess(format!(
                "class is not accessible: {}, from {}",
                refc.name(),
                self
            )));
        }
        Ok(())
    }

    /// Checks the member's modifiers; returns whether the receiver has to
    /// be narrowed to the lookup class.
    fn check_member(&self, ref_kind: RefKind, member: &ResolvedMember) -> Result<bool> {
        let declaring = member.declaring_class();
        let modifiers = member.modifiers();
        let requested = AccessModes::required_for(modifiers);
        let same_package = declaring.same_package(&self.lookup_class);
        let subclass = self.lookup_class.is_subclass_of(declaring);
        let allowed = if requested == AccessModes::PUBLIC {
            !self.modes.is_empty()
        } else if requested == AccessModes::PRIVATE {
            self.modes.contains(AccessModes::PRIVATE) && *declaring == self.lookup_class
        } else if requested == AccessModes::PROTECTED {
            (self.modes.contains(AccessModes::PACKAGE) && same_package)
                || (self.modes.contains(AccessModes::PROTECTED) && subclass)
        } else {
            self.modes.contains(AccessModes::PACKAGE) && same_package
        };
        if !allowed {
            return Err(Error::IllegalAccess(format!(
                "member is not accessible: {}, from {}",
                member, self
            )));
        }
        if requested != AccessModes::PUBLIC || !same_package {
            let permitted =
                self.services
                    .access
                    .check(&self.lookup_class, declaring, modifiers, requested)?;
            if !permitted {
                return Err(Error::IllegalAccess(format!(
                    "access to {} denied from {}",
                    member, self
                )));
            }
        }
        let narrow = requested == AccessModes::PROTECTED
            && ref_kind.has_receiver()
            && ref_kind != RefKind::NewInvokeSpecial
            && !same_package
            && *declaring != self.lookup_class;
        Ok(narrow)
    }
}

impl std::fmt::Display for Lookup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.modes.is_empty() {
            write!(f, "{}/noaccess", self.lookup_class.name())
        } else if self.modes == AccessModes::PUBLIC {
            write!(f, "{}/public", self.lookup_class.name())
        } else {
            write!(f, "{}", self.lookup_class.name())
        }
    }
}

impl Debug for Lookup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Lookup({}, {:?})", self, self.modes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mh_core::{native, ClassBuilder, Modifiers};

    fn counter() -> ClassRef {
        ClassBuilder::new("lookuptest.Counter")
            .modifiers(Modifiers::PUBLIC)
            .field("count", classes::int(), Modifiers::PRIVATE)
            .method(
                "twice",
                TypeDescriptor::of(classes::int(), &[classes::int().clone()]).unwrap(),
                Modifiers::PUBLIC | Modifiers::STATIC,
                native(|args, _| Ok(Value::Int(args[0].as_int().unwrap_or(0) * 2))),
            )
            .build()
    }

    #[test]
    fn private_members_need_the_declaring_class() {
        let class = counter();
        let own = Lookup::new(&class);
        assert!(own.find_getter(&class, "count", classes::int()).is_ok());
        let other = Lookup::new(classes::string());
        assert!(matches!(
            other.find_getter(&class, "count", classes::int()),
            Err(Error::IllegalAccess(_))
        ));
    }

    #[test]
    fn mode_changes_only_drop_access() {
        let class = counter();
        let lookup = Lookup::new(&class);
        assert_eq!(lookup.lookup_modes(), AccessModes::all());
        let moved = lookup.in_class(classes::string());
        assert!(!moved.lookup_modes().contains(AccessModes::PRIVATE));
        assert!(!moved.lookup_modes().contains(AccessModes::PACKAGE));
        let dropped = lookup.drop_lookup_mode(AccessModes::PACKAGE);
        assert_eq!(dropped.lookup_modes(), AccessModes::PUBLIC);
        assert!(lookup
            .drop_lookup_mode(AccessModes::PUBLIC)
            .lookup_modes()
            .is_empty());
    }

    #[test]
    fn static_kind_mismatch_is_an_access_error() {
        let class = counter();
        let ty = TypeDescriptor::of(classes::int(), &[classes::int().clone()]).unwrap();
        let lookup = Lookup::new(&class);
        assert!(matches!(
            lookup.find_virtual(&class, "twice", &ty),
            Err(Error::IllegalAccess(_))
        ));
        let handle = lookup.find_static(&class, "twice", &ty).unwrap();
        assert_eq!(handle.invoke_exact(&ty, &[Value::Int(4)]).unwrap(), Value::Int(8));
        assert!(matches!(
            lookup.find_static(&class, "thrice", &ty),
            Err(Error::NoSuchMethod(_))
        ));
    }
}
