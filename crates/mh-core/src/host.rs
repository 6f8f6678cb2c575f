//! Collaborators the embedding runtime supplies to member resolution.

use crate::class::{ClassRef, Modifiers};
use crate::error::Result;
use crate::member::{MemberType, ResolvedMember};
use bitflags::bitflags;

bitflags! {
    /// Access a lookup context holds, or requests for one member.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessModes: u32 {
        const PUBLIC    = 0x1;
        const PRIVATE   = 0x2;
        const PROTECTED = 0x4;
        const PACKAGE   = 0x8;
    }
}

impl AccessModes {
    /// The single mode needed to reach a member with `modifiers`.
    pub fn required_for(modifiers: Modifiers) -> AccessModes {
        if modifiers.contains(Modifiers::PUBLIC) {
            AccessModes::PUBLIC
        } else if modifiers.contains(Modifiers::PRIVATE) {
            AccessModes::PRIVATE
        } else if modifiers.contains(Modifiers::PROTECTED) {
            AccessModes::PROTECTED
        } else {
            AccessModes::PACKAGE
        }
    }
}

/// Security policy consulted before exposing a non-public or cross-package
/// member. `Ok(false)` denies with an access error; implementations may
/// also fail with `SecurityDenied`.
pub trait AccessCheck: Send + Sync {
    fn check(
        &self,
        context: &ClassRef,
        declaring: &ClassRef,
        modifiers: Modifiers,
        requested: AccessModes,
    ) -> Result<bool>;
}

/// Grants everything the language rules allow.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermitAll;

impl AccessCheck for PermitAll {
    fn check(
        &self,
        _context: &ClassRef,
        _declaring: &ClassRef,
        _modifiers: Modifiers,
        _requested: AccessModes,
    ) -> Result<bool> {
        Ok(true)
    }
}

/// Member table search used by resolution.
pub trait MemberLookup: Send + Sync {
    /// Candidates named `name` with type `ty` visible from `owner`,
    /// closest declaration first. With `search_supers` the superclass chain
    /// and then the implemented interfaces are searched as well.
    fn find_members(
        &self,
        owner: &ClassRef,
        name: &str,
        ty: &MemberType,
        search_supers: bool,
    ) -> Vec<ResolvedMember>;
}

/// Searches the members registered on [`crate::ClassInfo`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ClassTableLookup;

impl MemberLookup for ClassTableLookup {
    fn find_members(
        &self,
        owner: &ClassRef,
        name: &str,
        ty: &MemberType,
        search_supers: bool,
    ) -> Vec<ResolvedMember> {
        let mut found = Vec::new();
        let mut visited: Vec<u32> = Vec::new();
        let mut probe = |class: &ClassRef, found: &mut Vec<ResolvedMember>| {
            if visited.contains(&class.id()) {
                return;
            }
            visited.push(class.id());
            if let Some(def) = class.find_declared(name, ty) {
                found.push(ResolvedMember::new(class.clone(), def));
            }
        };
        probe(owner, &mut found);
        if !search_supers {
            return found;
        }
        let mut chain = Vec::new();
        let mut cursor = owner.superclass().cloned();
        while let Some(class) = cursor {
            probe(&class, &mut found);
            cursor = class.superclass().cloned();
            chain.push(class);
        }
        let mut pending: Vec<ClassRef> = std::iter::once(owner)
            .chain(chain.iter())
            .flat_map(|class| class.interfaces().iter().cloned())
            .collect();
        while !pending.is_empty() {
            let iface = pending.remove(0);
            probe(&iface, &mut found);
            pending.extend(iface.interfaces().iter().cloned());
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{classes, ClassBuilder};
    use crate::descriptor::TypeDescriptor;
    use crate::member::native;
    use crate::value::Value;

    #[test]
    fn lookup_walks_superclasses_then_interfaces() {
        let ty = TypeDescriptor::of(classes::int(), &[]).unwrap();
        let shape = ClassBuilder::interface("test.Shape")
            .method("sides", ty.clone(), Modifiers::PUBLIC, native(|_, _| Ok(Value::Int(0))))
            .build();
        let base = ClassBuilder::new("test.Base")
            .method("size", ty.clone(), Modifiers::PUBLIC, native(|_, _| Ok(Value::Int(1))))
            .build();
        let square = ClassBuilder::new("test.Square")
            .superclass(&base)
            .implements(&shape)
            .build();
        let method = MemberType::Method(ty);
        let size = ClassTableLookup.find_members(&square, "size", &method, true);
        assert_eq!(size.len(), 1);
        assert_eq!(size[0].declaring_class(), &base);
        let sides = ClassTableLookup.find_members(&square, "sides", &method, true);
        assert_eq!(sides[0].declaring_class(), &shape);
        assert!(ClassTableLookup
            .find_members(&square, "size", &method, false)
            .is_empty());
    }

    #[test]
    fn required_mode_matches_modifiers() {
        assert_eq!(
            AccessModes::required_for(Modifiers::PROTECTED | Modifiers::STATIC),
            AccessModes::PROTECTED
        );
        assert_eq!(AccessModes::required_for(Modifiers::empty()), AccessModes::PACKAGE);
    }
}
