//! Method handles: typed, composable references to host members.
//!
//! A [`CallHandle`] pairs a [`mh_core::TypeDescriptor`] with a
//! [`LambdaForm`], a small straight-line program over its arguments. Forms
//! are interpreted until they get hot, then lowered to bytecode by
//! [`codegen`] and linked through the host's [`linker::ExecutableLinker`].
//! Handles with captured state store it in [`species::Species`]-shaped
//! storage so one form can be shared by every handle of the same shape.

pub mod codegen;
pub mod combinators;
pub mod convert;
pub mod form;
pub mod handle;
pub mod linker;
pub mod lookup;
pub mod runtime;
pub mod species;

pub use form::{FormBuilder, FormKind, FormRef, LambdaForm};
pub use handle::{CallHandle, HandleKind};
pub use linker::{ExecutableLinker, ExecutableRef, Patch};
pub use lookup::Lookup;
pub use mh_core::{Error, Result};
pub use runtime::HostServices;
pub use species::{CapturedValues, Species, SpeciesRegistry};
