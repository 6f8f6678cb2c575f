//! Host-side data model for the method-handle runtime.
//!
//! This crate holds everything the invocation core treats as "supplied by the
//! host": the class table, runtime values, member descriptors, the interned
//! [`TypeDescriptor`], the collaborator traits consulted during resolution,
//! and the shared error and configuration types.

#[macro_use]
pub mod macros;

pub mod basic_type;
pub mod class;
pub mod collections;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod host;
pub mod member;
pub mod value;

// Re-export commonly used items for convenience
pub use tracing;

pub use basic_type::{BasicType, PrimitiveKind};
pub use class::{classes, ClassBuilder, ClassInfo, ClassKind, ClassRef, Modifiers};
pub use descriptor::TypeDescriptor;
pub use member::{
    native, MemberBody, MemberDef, MemberType, NativeMethod, RefKind, ResolvedMember, SymbolicMember,
};
pub use value::{Object, ObjectRef, Payload, Value};

// Alias for error types
pub type Error = crate::error::Error;
pub type Result<T> = crate::error::Result<T>;
