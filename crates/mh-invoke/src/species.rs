//! Captured-value storage shapes.
//!
//! A [`Species`] is the layout of a bound handle's captured values, named by
//! its slot signature over `LIJFD`. The registry hands out exactly one
//! species per signature and every species is reachable from the empty root
//! by [`Species::extend_with`].

use crate::form::{FormRef, NamedFunction};
use crate::handle::{CallHandle, HandleKind};
use mh_core::collections::ConcurrentMap;
use mh_core::{debug, internal, BasicType, Error, Result, TypeDescriptor, Value};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::fmt::{Debug, Display, Formatter};
use std::sync::{Arc, OnceLock};

pub struct Species {
    signature: String,
    slots: Box<[BasicType]>,
    extensions: [OnceLock<Arc<Species>>; 5],
}

impl Species {
    fn new(signature: &str, slots: Vec<BasicType>) -> Self {
        Self {
            signature: signature.to_string(),
            slots: slots.into_boxed_slice(),
            extensions: Default::default(),
        }
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn slot_types(&self) -> &[BasicType] {
        &self.slots
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot_type(&self, slot: usize) -> Option<BasicType> {
        self.slots.get(slot).copied()
    }

    pub fn is_root(&self) -> bool {
        self.slots.is_empty()
    }

    /// The species with one more slot of type `ty`. Cached on this species
    /// so the extension graph stays deduplicated.
    pub fn extend_with(&self, ty: BasicType) -> Result<Arc<Species>> {
        let Some(ordinal) = ty.ordinal() else {
            internal!("cannot extend species {} with {}", self.signature, ty);
        };
        if let Some(next) = self.extensions[ordinal].get() {
            return Ok(next.clone());
        }
        let signature = format!("{}{}", self.signature, ty.as_char());
        let next = SpeciesRegistry::global().get(&signature)?;
        Ok(self.extensions[ordinal].get_or_init(|| next).clone())
    }

    /// The named function reading `slot` out of a handle of this species.
    pub fn getter(self: &Arc<Self>, slot: usize) -> Result<NamedFunction> {
        if slot >= self.slots.len() {
            internal!("species {} has no slot {}", self.signature, slot);
        }
        Ok(NamedFunction::Getter {
            species: self.clone(),
            slot,
        })
    }

    /// Builds a bound handle of this species.
    pub fn construct(
        self: &Arc<Self>,
        ty: TypeDescriptor,
        form: FormRef,
        values: Vec<Value>,
    ) -> Result<CallHandle> {
        let captured = CapturedValues::new(self.clone(), values)?;
        CallHandle::new(ty, form, HandleKind::Bound(captured))
    }
}

impl PartialEq for Species {
    fn eq(&self, other: &Self) -> bool {
        self.signature == other.signature
    }
}

impl Eq for Species {}

impl std::hash::Hash for Species {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.signature.hash(state);
    }
}

impl Debug for Species {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Species[{}]", self.signature)
    }
}

impl Display for Species {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Species[{}]", self.signature)
    }
}

/// The captured values of one bound handle.
#[derive(Clone)]
pub struct CapturedValues {
    species: Arc<Species>,
    values: Arc<[Value]>,
}

impl CapturedValues {
    pub fn new(species: Arc<Species>, values: Vec<Value>) -> Result<Self> {
        if values.len() != species.slot_count() {
            internal!(
                "species {} takes {} values, got {}",
                species.signature(),
                species.slot_count(),
                values.len()
            );
        }
        for (slot, (value, ty)) in values.iter().zip(species.slot_types()).enumerate() {
            if value.basic_type() != *ty {
                internal!(
                    "slot {} of species {} is {}, got {:?}",
                    slot,
                    species.signature(),
                    ty,
                    value
                );
            }
        }
        Ok(Self {
            species,
            values: values.into(),
        })
    }

    pub fn species(&self) -> &Arc<Species> {
        &self.species
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, slot: usize) -> Result<Value> {
        self.values
            .get(slot)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("no captured slot {}", slot)))
    }

    /// These values followed by `value`, in the species extended by its type.
    pub fn extend(&self, value: Value) -> Result<CapturedValues> {
        let species = self.species.extend_with(value.basic_type())?;
        let mut values = self.values.to_vec();
        values.push(value);
        CapturedValues::new(species, values)
    }
}

impl Debug for CapturedValues {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{:?}", self.species, &*self.values)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    Uninitialized,
    Linked,
}

pub struct SpeciesRegistry {
    state: RwLock<RegistryState>,
    species: ConcurrentMap<String, Arc<Species>>,
}

static REGISTRY: Lazy<SpeciesRegistry> = Lazy::new(|| {
    let registry = SpeciesRegistry::new();
    registry.link();
    registry
});

impl SpeciesRegistry {
    /// An empty registry; it serves no lookups until [`SpeciesRegistry::link`].
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::Uninitialized),
            species: ConcurrentMap::new(),
        }
    }

    pub fn global() -> &'static SpeciesRegistry {
        &REGISTRY
    }

    pub fn state(&self) -> RegistryState {
        *self.state.read()
    }

    /// Creates the root and the common reference shapes, then opens the
    /// registry for lookups.
    pub fn link(&self) {
        let mut state = self.state.write();
        if *state == RegistryState::Linked {
            return;
        }
        for signature in ["", "L", "LL", "LLL"] {
            self.create(signature);
        }
        *state = RegistryState::Linked;
    }

    fn create(&self, signature: &str) -> Arc<Species> {
        self.species.get_or_insert_with(signature.to_string(), || {
            debug!("new species {:?}", signature);
            let slots = BasicType::parse_signature(signature).unwrap_or_default();
            Arc::new(Species::new(signature, slots))
        })
    }

    pub fn get(&self, signature: &str) -> Result<Arc<Species>> {
        if self.state() != RegistryState::Linked {
            internal!("species registry used before it was linked");
        }
        let valid = signature
            .chars()
            .all(|c| matches!(BasicType::from_char(c), Some(ty) if !ty.is_void()));
        if !valid {
            internal!("bad species signature {:?}", signature);
        }
        if let Some(species) = self.species.get_cloned(&signature.to_string()) {
            return Ok(species);
        }
        Ok(self.create(signature))
    }

    pub fn root(&self) -> Result<Arc<Species>> {
        self.get("")
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }
}

impl Default for SpeciesRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_rejects_lookups_until_linked() {
        let registry = SpeciesRegistry::new();
        assert_eq!(registry.state(), RegistryState::Uninitialized);
        assert!(registry.get("L").is_err());
        registry.link();
        assert_eq!(registry.state(), RegistryState::Linked);
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.get("LL").unwrap().slot_count(), 2);
    }

    #[test]
    fn extension_reaches_the_registered_species() {
        let root = SpeciesRegistry::global().root().unwrap();
        assert!(root.is_root());
        let li = root
            .extend_with(BasicType::L)
            .unwrap()
            .extend_with(BasicType::I)
            .unwrap();
        assert_eq!(li.signature(), "LI");
        assert!(Arc::ptr_eq(&li, &SpeciesRegistry::global().get("LI").unwrap()));
        let again = SpeciesRegistry::global()
            .get("L")
            .unwrap()
            .extend_with(BasicType::I)
            .unwrap();
        assert!(Arc::ptr_eq(&li, &again));
        assert!(root.extend_with(BasicType::V).is_err());
    }

    #[test]
    fn captured_values_must_match_slot_types() {
        let species = SpeciesRegistry::global().get("IL").unwrap();
        assert!(CapturedValues::new(species.clone(), vec![Value::Int(1), Value::Null]).is_ok());
        assert!(CapturedValues::new(species.clone(), vec![Value::Null, Value::Int(1)]).is_err());
        assert!(CapturedValues::new(species, vec![Value::Int(1)]).is_err());
    }
}
