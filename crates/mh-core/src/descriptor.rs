//! Interned method type descriptors.
//!
//! Two descriptors with the same return and parameter classes are the same
//! allocation for as long as either is alive, so equality is pointer
//! equality. The intern table only holds weak references; a descriptor is
//! removed from it when its last strong reference goes away.

use crate::basic_type::{BasicType, PrimitiveKind};
use crate::class::{classes, ClassKind, ClassRef};
use crate::error::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use itertools::Itertools;
use once_cell::sync::Lazy;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock, Weak};

/// Hard limit on argument slots; `long` and `double` take two.
pub const MAX_SLOTS: usize = 255;

type InternKey = Box<[u32]>;

static INTERNED: Lazy<DashMap<InternKey, Weak<DescriptorData>>> = Lazy::new(DashMap::new);

struct DescriptorData {
    key: InternKey,
    rtype: ClassRef,
    ptypes: Box<[ClassRef]>,
    slots: usize,
    // `None` means the variant is the descriptor itself.
    erased: OnceLock<Option<TypeDescriptor>>,
    basic: OnceLock<Option<TypeDescriptor>>,
}

impl Drop for DescriptorData {
    fn drop(&mut self) {
        INTERNED.remove_if(&self.key, |_, weak| weak.strong_count() == 0);
    }
}

#[derive(Clone)]
pub struct TypeDescriptor(Arc<DescriptorData>);

impl TypeDescriptor {
    /// Returns the canonical descriptor for `(ptypes) -> rtype`.
    pub fn of(rtype: &ClassRef, ptypes: &[ClassRef]) -> Result<TypeDescriptor> {
        if let Some(void) = ptypes.iter().position(|ty| ty.is_void()) {
            return Err(Error::IllegalArgument(format!(
                "parameter {} has type void",
                void
            )));
        }
        let slots = slot_count(ptypes);
        if slots > MAX_SLOTS {
            return Err(Error::IllegalArgument(format!(
                "descriptor needs {} argument slots, limit is {}",
                slots, MAX_SLOTS
            )));
        }
        Ok(Self::intern(rtype, ptypes))
    }

    /// `(Object, ...) -> Object` with `n` parameters.
    pub fn generic(n: usize) -> Result<TypeDescriptor> {
        let object = classes::object();
        Self::of(object, &vec![object.clone(); n])
    }

    /// The erased descriptor carrying exactly the given basic types.
    pub fn of_basic(rtype: BasicType, ptypes: &[BasicType]) -> Result<TypeDescriptor> {
        let params = ptypes
            .iter()
            .map(|ty| classes::for_basic_type(*ty).clone())
            .collect::<Vec<_>>();
        Self::of(classes::for_basic_type(rtype), &params)
    }

    fn intern(rtype: &ClassRef, ptypes: &[ClassRef]) -> TypeDescriptor {
        let key: InternKey = std::iter::once(rtype.id())
            .chain(ptypes.iter().map(|ty| ty.id()))
            .collect();
        let make = |key: InternKey| {
            Arc::new(DescriptorData {
                key,
                rtype: rtype.clone(),
                ptypes: ptypes.to_vec().into_boxed_slice(),
                slots: slot_count(ptypes),
                erased: OnceLock::new(),
                basic: OnceLock::new(),
            })
        };
        match INTERNED.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if let Some(existing) = entry.get().upgrade() {
                    return TypeDescriptor(existing);
                }
                let fresh = make(key);
                entry.insert(Arc::downgrade(&fresh));
                TypeDescriptor(fresh)
            }
            Entry::Vacant(entry) => {
                let fresh = make(key);
                entry.insert(Arc::downgrade(&fresh));
                TypeDescriptor(fresh)
            }
        }
    }

    pub fn return_type(&self) -> &ClassRef {
        &self.0.rtype
    }

    pub fn parameter_types(&self) -> &[ClassRef] {
        &self.0.ptypes
    }

    /// Panics if `index` is out of range.
    pub fn parameter_type(&self, index: usize) -> &ClassRef {
        &self.0.ptypes[index]
    }

    pub fn parameter_count(&self) -> usize {
        self.0.ptypes.len()
    }

    pub fn last_parameter_type(&self) -> Option<&ClassRef> {
        self.0.ptypes.last()
    }

    pub fn parameter_slot_count(&self) -> usize {
        self.0.slots
    }

    pub fn parameter_basic_types(&self) -> Vec<BasicType> {
        self.0.ptypes.iter().map(|ty| ty.basic_type()).collect()
    }

    pub fn return_basic_type(&self) -> BasicType {
        self.0.rtype.basic_type()
    }

    /// Compact erased signature such as `LII_I`.
    pub fn basic_signature(&self) -> String {
        let params = BasicType::signature(&self.parameter_basic_types());
        format!("{}_{}", params, self.return_basic_type())
    }

    fn map_all(&self, f: impl Fn(&ClassRef) -> ClassRef) -> TypeDescriptor {
        let ptypes = self.0.ptypes.iter().map(&f).collect::<Vec<_>>();
        Self::intern(&f(&self.0.rtype), &ptypes)
    }

    fn cached_variant(
        &self,
        cell: &OnceLock<Option<TypeDescriptor>>,
        f: impl Fn(&ClassRef) -> ClassRef,
    ) -> TypeDescriptor {
        let variant = cell.get_or_init(|| {
            let variant = self.map_all(f);
            if variant == *self {
                None
            } else {
                Some(variant)
            }
        });
        variant.clone().unwrap_or_else(|| self.clone())
    }

    /// Every reference type becomes `Object`; primitives are kept.
    pub fn erase(&self) -> TypeDescriptor {
        self.cached_variant(&self.0.erased, |ty| {
            if ty.is_primitive() {
                ty.clone()
            } else {
                classes::object().clone()
            }
        })
    }

    /// Collapses to the basic types: `Object`, `int`, `long`, `float`,
    /// `double` and `void`.
    pub fn basic_type(&self) -> TypeDescriptor {
        self.cached_variant(&self.0.basic, |ty| {
            classes::for_basic_type(ty.basic_type()).clone()
        })
    }

    /// Primitives become their wrapper classes.
    pub fn wrap(&self) -> TypeDescriptor {
        self.map_all(|ty| match ty.primitive_kind() {
            Some(kind) => classes::wrapper(kind).clone(),
            None => ty.clone(),
        })
    }

    /// Wrapper classes become their primitives.
    pub fn unwrap(&self) -> TypeDescriptor {
        self.map_all(|ty| match ty.wrapper_kind() {
            Some(kind) => classes::primitive(kind).clone(),
            None => ty.clone(),
        })
    }

    fn with_parameters(&self, ptypes: Vec<ClassRef>) -> Result<TypeDescriptor> {
        Self::of(&self.0.rtype, &ptypes)
    }

    fn check_index(&self, index: usize, limit: usize) -> Result<()> {
        if index > limit {
            return Err(Error::IllegalArgument(format!(
                "parameter index {} out of range for {}",
                index, self
            )));
        }
        Ok(())
    }

    pub fn change_parameter_type(&self, index: usize, ty: &ClassRef) -> Result<TypeDescriptor> {
        if index >= self.parameter_count() {
            return Err(Error::IllegalArgument(format!(
                "parameter index {} out of range for {}",
                index, self
            )));
        }
        let mut ptypes = self.0.ptypes.to_vec();
        ptypes[index] = ty.clone();
        self.with_parameters(ptypes)
    }

    pub fn insert_parameter_types(&self, index: usize, types: &[ClassRef]) -> Result<TypeDescriptor> {
        self.check_index(index, self.parameter_count())?;
        let mut ptypes = self.0.ptypes.to_vec();
        ptypes.splice(index..index, types.iter().cloned());
        self.with_parameters(ptypes)
    }

    /// Removes parameters `start..end`.
    pub fn drop_parameter_types(&self, start: usize, end: usize) -> Result<TypeDescriptor> {
        if start > end || end > self.parameter_count() {
            return Err(Error::IllegalArgument(format!(
                "bad parameter range {}..{} for {}",
                start, end, self
            )));
        }
        let mut ptypes = self.0.ptypes.to_vec();
        ptypes.drain(start..end);
        self.with_parameters(ptypes)
    }

    /// Replaces parameters `start..end` with `types`.
    pub fn replace_parameter_types(
        &self,
        start: usize,
        end: usize,
        types: &[ClassRef],
    ) -> Result<TypeDescriptor> {
        if start > end || end > self.parameter_count() {
            return Err(Error::IllegalArgument(format!(
                "bad parameter range {}..{} for {}",
                start, end, self
            )));
        }
        let mut ptypes = self.0.ptypes.to_vec();
        ptypes.splice(start..end, types.iter().cloned());
        self.with_parameters(ptypes)
    }

    pub fn change_return_type(&self, ty: &ClassRef) -> TypeDescriptor {
        Self::intern(ty, &self.0.ptypes)
    }

    /// Whether a handle of this type can be adapted to `target` by
    /// `asType`: arguments flow from `target`'s parameters into ours, our
    /// return value flows out to `target`'s return type.
    pub fn is_convertible_to(&self, target: &TypeDescriptor) -> bool {
        if self == target {
            return true;
        }
        if self.parameter_count() != target.parameter_count() {
            return false;
        }
        if !can_convert(self.return_type(), target.return_type()) {
            return false;
        }
        target
            .parameter_types()
            .iter()
            .zip(self.parameter_types())
            .all(|(src, dst)| can_convert(src, dst))
    }

    /// JVM-style descriptor, e.g. `(IJ)Ljava/lang/Object;`.
    pub fn to_descriptor_string(&self) -> String {
        let mut out = String::from("(");
        for ty in self.parameter_types() {
            push_class_descriptor(&mut out, ty);
        }
        out.push(')');
        push_class_descriptor(&mut out, self.return_type());
        out
    }

    /// Parses a JVM-style descriptor, resolving class names (in dotted
    /// form) with `resolver`.
    pub fn from_descriptor_string(
        text: &str,
        resolver: impl Fn(&str) -> Option<ClassRef>,
    ) -> Result<TypeDescriptor> {
        let bad = || Error::IllegalArgument(format!("malformed descriptor {:?}", text));
        let body = text.strip_prefix('(').ok_or_else(bad)?;
        let (params, ret) = body.split_once(')').ok_or_else(bad)?;
        let mut ptypes = Vec::new();
        let mut rest = params;
        while !rest.is_empty() {
            let (ty, tail) = parse_class_descriptor(rest, &resolver)?;
            ptypes.push(ty);
            rest = tail;
        }
        let (rtype, tail) = parse_class_descriptor(ret, &resolver)?;
        if !tail.is_empty() {
            return Err(bad());
        }
        Self::of(&rtype, &ptypes)
    }
}

fn slot_count(ptypes: &[ClassRef]) -> usize {
    ptypes.iter().map(|ty| ty.basic_type().slot_count()).sum()
}

/// Single-value conversion check used by [`TypeDescriptor::is_convertible_to`].
pub fn can_convert(src: &ClassRef, dst: &ClassRef) -> bool {
    if src == dst || src.is_object() || dst.is_object() {
        return true;
    }
    match (src.primitive_kind(), dst.primitive_kind()) {
        (Some(PrimitiveKind::Void), _) => true,
        (Some(from), Some(to)) => to.is_convertible_from(from),
        (Some(from), None) => dst.is_assignable_from(classes::wrapper(from)),
        (None, Some(PrimitiveKind::Void)) => true,
        (None, Some(to)) => {
            if src.is_assignable_from(classes::wrapper(to)) {
                return true;
            }
            match src.wrapper_kind() {
                Some(from) => to.is_convertible_from(from),
                None => false,
            }
        }
        (None, None) => true,
    }
}

fn push_class_descriptor(out: &mut String, ty: &ClassRef) {
    match ty.kind() {
        ClassKind::Primitive(kind) => out.push(kind.descriptor_char()),
        ClassKind::Array(component) => {
            out.push('[');
            push_class_descriptor(out, component);
        }
        _ => {
            out.push('L');
            out.push_str(&ty.name().replace('.', "/"));
            out.push(';');
        }
    }
}

fn parse_class_descriptor<'a>(
    text: &'a str,
    resolver: &impl Fn(&str) -> Option<ClassRef>,
) -> Result<(ClassRef, &'a str)> {
    let mut chars = text.chars();
    let head = chars
        .next()
        .ok_or_else(|| Error::IllegalArgument("truncated descriptor".to_string()))?;
    match head {
        '[' => {
            let (component, rest) = parse_class_descriptor(&text[1..], resolver)?;
            Ok((component.array_type(), rest))
        }
        'L' => {
            let end = text
                .find(';')
                .ok_or_else(|| Error::IllegalArgument(format!("unterminated class in {:?}", text)))?;
            let name = text[1..end].replace('/', ".");
            let class = resolver(&name)
                .ok_or_else(|| Error::IllegalArgument(format!("unknown class {}", name)))?;
            Ok((class, &text[end + 1..]))
        }
        other => {
            let kind = PrimitiveKind::from_descriptor_char(other).ok_or_else(|| {
                Error::IllegalArgument(format!("bad descriptor character {:?}", other))
            })?;
            Ok((classes::primitive(kind).clone(), &text[1..]))
        }
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.key.hash(state);
    }
}

impl Display for TypeDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}){}",
            self.0.ptypes.iter().map(|ty| ty.simple_name()).join(","),
            self.0.rtype.simple_name()
        )
    }
}

impl Debug for TypeDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassBuilder;

    fn int() -> ClassRef {
        classes::int().clone()
    }

    #[test]
    fn equal_components_share_one_descriptor() {
        let a = TypeDescriptor::of(&int(), &[int(), int()]).unwrap();
        let b = TypeDescriptor::of(&int(), &[int(), int()]).unwrap();
        assert!(Arc::ptr_eq(&a.0, &b.0));
        let c = a.change_return_type(classes::long());
        assert_ne!(a, c);
        assert_eq!(c.change_return_type(classes::int()), a);
    }

    #[test]
    fn unreferenced_descriptors_leave_the_table() {
        let holder = ClassBuilder::new("test.Transient").build();
        let key: InternKey = vec![holder.id(), holder.id()].into_boxed_slice();
        {
            let ty = TypeDescriptor::of(&holder, &[holder.clone()]).unwrap();
            assert!(INTERNED.contains_key(&key));
            drop(ty);
        }
        assert!(!INTERNED.contains_key(&key));
    }

    #[test]
    fn void_parameters_and_slot_overflow_are_rejected() {
        assert!(matches!(
            TypeDescriptor::of(&int(), &[classes::void().clone()]),
            Err(Error::IllegalArgument(_))
        ));
        let longs = vec![classes::long().clone(); 128];
        assert!(matches!(
            TypeDescriptor::of(&int(), &longs),
            Err(Error::IllegalArgument(_))
        ));
        let ints = vec![int(); 255];
        assert!(TypeDescriptor::of(&int(), &ints).is_ok());
    }

    #[test]
    fn erasure_variants() {
        let ty = TypeDescriptor::of(
            classes::string(),
            &[classes::boolean().clone(), classes::string().clone(), classes::long().clone()],
        )
        .unwrap();
        assert_eq!(ty.erase().to_string(), "(boolean,Object,long)Object");
        assert_eq!(ty.basic_type().to_string(), "(int,Object,long)Object");
        assert_eq!(ty.basic_signature(), "ILJ_L");
        assert_eq!(ty.wrap().to_string(), "(Boolean,String,Long)String");
        assert_eq!(ty.wrap().unwrap(), ty);
        assert_eq!(ty.basic_type().basic_type(), ty.basic_type());
    }

    #[test]
    fn convertibility_follows_as_type_rules() {
        let int_int = TypeDescriptor::of(&int(), &[int()]).unwrap();
        let long_long = TypeDescriptor::of(classes::long(), &[classes::long().clone()]).unwrap();
        // int parameter cannot accept a long argument
        assert!(!int_int.is_convertible_to(&long_long));
        let long_int = TypeDescriptor::of(classes::long(), &[int()]).unwrap();
        assert!(int_int.is_convertible_to(&long_int));
        let boxed = TypeDescriptor::of(classes::object(), &[classes::number().clone()]).unwrap();
        assert!(int_int.is_convertible_to(&boxed));
        let string = TypeDescriptor::of(&int(), &[classes::string().clone()]).unwrap();
        assert!(!int_int.is_convertible_to(&string));
        let void = int_int.change_return_type(classes::void());
        assert!(int_int.is_convertible_to(&void));
        assert!(void.is_convertible_to(&int_int));
    }

    #[test]
    fn descriptor_strings() {
        let ty = TypeDescriptor::of(
            classes::object(),
            &[int(), classes::long().clone(), classes::string().array_type()],
        )
        .unwrap();
        let text = ty.to_descriptor_string();
        assert_eq!(text, "(IJ[Ljava/lang/String;)Ljava/lang/Object;");
        let parsed = TypeDescriptor::from_descriptor_string(&text, classes::by_name).unwrap();
        assert_eq!(parsed, ty);
        assert!(TypeDescriptor::from_descriptor_string("(Q)V", classes::by_name).is_err());
    }
}
