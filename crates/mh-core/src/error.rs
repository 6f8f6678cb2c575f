use crate::class::{classes, ClassRef};
use crate::value::{Object, ObjectRef, Payload};
use std::result;
use thiserror::Error;

/// Failures surfaced by handle construction, resolution and invocation.
///
/// Every variant corresponds to a host exception class; see
/// [`Error::exception_class`]. Exceptions raised by user code travel as
/// [`Error::Thrown`].
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("wrong method type: {0}")]
    WrongMethodType(String),
    #[error("class cast: {0}")]
    ClassCast(String),
    #[error("null pointer: {0}")]
    NullPointer(String),
    #[error("illegal argument: {0}")]
    IllegalArgument(String),
    #[error("index out of bounds: {0}")]
    IndexOutOfBounds(String),
    #[error("array store: {0}")]
    ArrayStore(String),
    #[error("no such method: {0}")]
    NoSuchMethod(String),
    #[error("no such field: {0}")]
    NoSuchField(String),
    #[error("illegal access: {0}")]
    IllegalAccess(String),
    #[error("security: {0}")]
    SecurityDenied(String),
    #[error("linkage: {0}")]
    Linkage(String),
    #[error("internal: {0}")]
    Internal(String),
    #[error("{}", describe_thrown(.0))]
    Thrown(ObjectRef),
}

fn describe_thrown(object: &ObjectRef) -> String {
    match object.throwable_message() {
        Some(message) => format!("{}: {}", object.class().name(), message),
        None => object.class().name().to_string(),
    }
}

pub type Result<T> = result::Result<T, Error>;

impl Error {
    pub fn exception_class(&self) -> ClassRef {
        match self {
            Error::WrongMethodType(_) => classes::wrong_method_type_exception().clone(),
            Error::ClassCast(_) => classes::class_cast_exception().clone(),
            Error::NullPointer(_) => classes::null_pointer_exception().clone(),
            Error::IllegalArgument(_) => classes::illegal_argument_exception().clone(),
            Error::IndexOutOfBounds(_) => classes::index_out_of_bounds_exception().clone(),
            Error::ArrayStore(_) => classes::array_store_exception().clone(),
            Error::NoSuchMethod(_) => classes::no_such_method_exception().clone(),
            Error::NoSuchField(_) => classes::no_such_field_exception().clone(),
            Error::IllegalAccess(_) => classes::illegal_access_exception().clone(),
            Error::SecurityDenied(_) => classes::security_exception().clone(),
            Error::Linkage(_) => classes::linkage_error().clone(),
            Error::Internal(_) => classes::internal_error().clone(),
            Error::Thrown(object) => object.class().clone(),
        }
    }

    fn message(&self) -> Option<String> {
        match self {
            Error::WrongMethodType(m)
            | Error::ClassCast(m)
            | Error::NullPointer(m)
            | Error::IllegalArgument(m)
            | Error::IndexOutOfBounds(m)
            | Error::ArrayStore(m)
            | Error::NoSuchMethod(m)
            | Error::NoSuchField(m)
            | Error::IllegalAccess(m)
            | Error::SecurityDenied(m)
            | Error::Linkage(m)
            | Error::Internal(m) => Some(m.clone()),
            Error::Thrown(object) => object.throwable_message(),
        }
    }

    /// Materializes this error as a throwable object, e.g. so a catch
    /// handler can receive it. [`Error::from_throwable`] recovers the
    /// original error.
    pub fn to_throwable(&self) -> ObjectRef {
        match self {
            Error::Thrown(object) => object.clone(),
            other => Object::new(
                other.exception_class(),
                Payload::Throwable {
                    message: other.message(),
                    origin: Some(Box::new(other.clone())),
                },
            ),
        }
    }

    pub fn from_throwable(object: ObjectRef) -> Error {
        match object.payload() {
            Payload::Throwable {
                origin: Some(origin),
                ..
            } => (**origin).clone(),
            _ => Error::Thrown(object),
        }
    }

    /// A user-level exception of class `class`.
    pub fn throw(class: &ClassRef, message: impl Into<String>) -> Error {
        Error::Thrown(Object::new(
            class.clone(),
            Payload::Throwable {
                message: Some(message.into()),
                origin: None,
            },
        ))
    }

    pub fn is_instance_of(&self, class: &ClassRef) -> bool {
        class.is_assignable_from(&self.exception_class())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throwable_materialization_preserves_the_error() {
        let err = Error::ClassCast("java.lang.String cannot be cast to int".into());
        let object = err.to_throwable();
        assert_eq!(object.class().name(), "java.lang.ClassCastException");
        let back = Error::from_throwable(object);
        assert!(matches!(back, Error::ClassCast(ref m) if m.contains("cannot be cast")));
    }

    #[test]
    fn user_exceptions_round_trip_as_thrown() {
        let err = Error::throw(classes::arithmetic_exception(), "/ by zero");
        assert!(err.is_instance_of(classes::runtime_exception()));
        assert_eq!(err.to_string(), "java.lang.ArithmeticException: / by zero");
        let object = err.to_throwable();
        assert!(matches!(Error::from_throwable(object), Error::Thrown(_)));
    }
}
