//! Runtime values passed through handles.
//!
//! Sub-word primitives (`boolean`, `byte`, `short`, `char`) travel as
//! [`Value::Int`], matching their `I` basic type.

use crate::basic_type::{BasicType, PrimitiveKind};
use crate::class::{classes, ClassRef};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub type ObjectRef = Arc<Object>;

#[derive(Clone)]
pub enum Value {
    Void,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Null,
    Ref(ObjectRef),
}

impl Value {
    pub fn int(value: i32) -> Value {
        Value::Int(value)
    }

    pub fn boolean(value: bool) -> Value {
        Value::Int(value as i32)
    }

    pub fn long(value: i64) -> Value {
        Value::Long(value)
    }

    pub fn float(value: f32) -> Value {
        Value::Float(value)
    }

    pub fn double(value: f64) -> Value {
        Value::Double(value)
    }

    pub fn string(text: impl Into<String>) -> Value {
        Value::Ref(Object::new(
            classes::string().clone(),
            Payload::Str(text.into()),
        ))
    }

    /// The runtime mirror of `class`.
    pub fn class_object(class: &ClassRef) -> Value {
        Value::Ref(Object::new(
            classes::class().clone(),
            Payload::Class(class.clone()),
        ))
    }

    pub fn native(class: &ClassRef, payload: Arc<dyn Any + Send + Sync>) -> Value {
        Value::Ref(Object::new(class.clone(), Payload::Native(payload)))
    }

    /// The default value of a basic type; `Void` for `V`.
    pub fn zero(ty: BasicType) -> Value {
        match ty {
            BasicType::L => Value::Null,
            BasicType::I => Value::Int(0),
            BasicType::J => Value::Long(0),
            BasicType::F => Value::Float(0.0),
            BasicType::D => Value::Double(0.0),
            BasicType::V => Value::Void,
        }
    }

    pub fn zero_of(class: &ClassRef) -> Value {
        Value::zero(class.basic_type())
    }

    pub fn basic_type(&self) -> BasicType {
        match self {
            Value::Void => BasicType::V,
            Value::Int(_) => BasicType::I,
            Value::Long(_) => BasicType::J,
            Value::Float(_) => BasicType::F,
            Value::Double(_) => BasicType::D,
            Value::Null | Value::Ref(_) => BasicType::L,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_int().map(|v| v != 0)
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Ref(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Ref(object) => match object.payload() {
                Payload::Str(text) => Some(text.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    /// The class a `Class` mirror stands for.
    pub fn as_class(&self) -> Option<&ClassRef> {
        match self {
            Value::Ref(object) => match object.payload() {
                Payload::Class(class) => Some(class),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Dynamic class of a reference; `None` for null and primitives.
    pub fn class(&self) -> Option<&ClassRef> {
        self.as_object().map(|object| object.class())
    }

    /// The object, or `NullPointer` naming what was being dereferenced.
    pub fn require_object(&self, what: &str) -> Result<&ObjectRef> {
        match self {
            Value::Ref(object) => Ok(object),
            Value::Null => Err(Error::NullPointer(format!("{} is null", what))),
            other => Err(Error::Internal(format!(
                "{} expected a reference, found {:?}",
                what, other
            ))),
        }
    }

    /// Reference cast: null passes, other values must be instances of `class`.
    pub fn check_cast(&self, class: &ClassRef) -> Result<Value> {
        match self {
            Value::Null => Ok(Value::Null),
            Value::Ref(object) if class.is_assignable_from(object.class()) => Ok(self.clone()),
            Value::Ref(object) => Err(Error::ClassCast(format!(
                "{} cannot be cast to {}",
                object.class().name(),
                class.name()
            ))),
            other => Err(Error::Internal(format!(
                "cast of non-reference {:?} to {}",
                other,
                class.name()
            ))),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) | (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Ref(a), Value::Ref(b)) => Arc::ptr_eq(a, b) || a.content_eq(b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Int(v) => v.hash(state),
            Value::Long(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Double(v) => v.to_bits().hash(state),
            Value::Ref(object) => object.content_hash(state),
            Value::Void | Value::Null => {}
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}L", v),
            Value::Float(v) => write!(f, "{}f", v),
            Value::Double(v) => write!(f, "{}d", v),
            Value::Null => write!(f, "null"),
            Value::Ref(object) => write!(f, "{:?}", object),
        }
    }
}

/// What an object holds besides its class.
pub enum Payload {
    Boxed(Value),
    Str(String),
    Array(RwLock<Vec<Value>>),
    Fields(RwLock<Vec<Value>>),
    Throwable {
        message: Option<String>,
        origin: Option<Box<Error>>,
    },
    Class(ClassRef),
    Native(Arc<dyn Any + Send + Sync>),
}

pub struct Object {
    class: ClassRef,
    payload: Payload,
}

impl Object {
    pub fn new(class: ClassRef, payload: Payload) -> ObjectRef {
        Arc::new(Object { class, payload })
    }

    /// A fresh instance with every field at its zero value.
    pub fn new_instance(class: &ClassRef) -> ObjectRef {
        let fields = class
            .instance_field_types()
            .iter()
            .map(|ty| Value::zero(*ty))
            .collect();
        Object::new(class.clone(), Payload::Fields(RwLock::new(fields)))
    }

    pub fn new_array(array_class: &ClassRef, length: i32) -> Result<ObjectRef> {
        let component = array_class.component_type().ok_or_else(|| {
            Error::IllegalArgument(format!("not an array class: {}", array_class.name()))
        })?;
        if length < 0 {
            return Err(Error::IllegalArgument(format!("negative array size {}", length)));
        }
        let zero = Value::zero_of(component);
        Ok(Object::new(
            array_class.clone(),
            Payload::Array(RwLock::new(vec![zero; length as usize])),
        ))
    }

    /// Builds an array from `values`, applying the component store check.
    pub fn array_from(array_class: &ClassRef, values: Vec<Value>) -> Result<ObjectRef> {
        let component = array_class.component_type().ok_or_else(|| {
            Error::IllegalArgument(format!("not an array class: {}", array_class.name()))
        })?;
        for value in &values {
            check_store(component, value)?;
        }
        Ok(Object::new(
            array_class.clone(),
            Payload::Array(RwLock::new(values)),
        ))
    }

    pub fn boxed(kind: PrimitiveKind, value: Value) -> ObjectRef {
        Object::new(classes::wrapper(kind).clone(), Payload::Boxed(value))
    }

    pub fn class(&self) -> &ClassRef {
        &self.class
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn throwable_message(&self) -> Option<String> {
        match &self.payload {
            Payload::Throwable { message, .. } => message.clone(),
            _ => None,
        }
    }

    pub fn native_payload(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        match &self.payload {
            Payload::Native(payload) => Some(payload),
            _ => None,
        }
    }

    fn array(&self) -> Result<&RwLock<Vec<Value>>> {
        match &self.payload {
            Payload::Array(items) => Ok(items),
            _ => Err(Error::ClassCast(format!(
                "{} is not an array",
                self.class.name()
            ))),
        }
    }

    pub fn array_length(&self) -> Result<usize> {
        Ok(self.array()?.read().len())
    }

    pub fn array_elements(&self) -> Result<Vec<Value>> {
        Ok(self.array()?.read().clone())
    }

    pub fn array_load(&self, index: i32) -> Result<Value> {
        let items = self.array()?.read();
        usize::try_from(index)
            .ok()
            .and_then(|i| items.get(i).cloned())
            .ok_or_else(|| {
                Error::IndexOutOfBounds(format!(
                    "Index {} out of bounds for length {}",
                    index,
                    items.len()
                ))
            })
    }

    pub fn array_store(&self, index: i32, value: Value) -> Result<()> {
        let component = self.class.component_type().ok_or_else(|| {
            Error::ClassCast(format!("{} is not an array", self.class.name()))
        })?;
        check_store(component, &value)?;
        let mut items = self.array()?.write();
        let len = items.len();
        let slot = usize::try_from(index)
            .ok()
            .and_then(|i| items.get_mut(i))
            .ok_or_else(|| {
                Error::IndexOutOfBounds(format!(
                    "Index {} out of bounds for length {}",
                    index, len
                ))
            })?;
        *slot = value;
        Ok(())
    }

    fn fields(&self) -> Result<&RwLock<Vec<Value>>> {
        match &self.payload {
            Payload::Fields(fields) => Ok(fields),
            _ => Err(Error::Internal(format!(
                "{} instance has no field storage",
                self.class.name()
            ))),
        }
    }

    pub fn get_field(&self, slot: usize) -> Result<Value> {
        self.fields()?
            .read()
            .get(slot)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("field slot {} out of range", slot)))
    }

    pub fn set_field(&self, slot: usize, value: Value) -> Result<()> {
        let mut fields = self.fields()?.write();
        let target = fields
            .get_mut(slot)
            .ok_or_else(|| Error::Internal(format!("field slot {} out of range", slot)))?;
        *target = value;
        Ok(())
    }

    /// Value semantics for immutable payloads; identity for the rest.
    fn content_eq(&self, other: &Object) -> bool {
        if self.class.id() != other.class.id() {
            return false;
        }
        match (&self.payload, &other.payload) {
            (Payload::Boxed(a), Payload::Boxed(b)) => a == b,
            (Payload::Str(a), Payload::Str(b)) => a == b,
            (Payload::Class(a), Payload::Class(b)) => a.id() == b.id(),
            (Payload::Native(a), Payload::Native(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            _ => std::ptr::eq(self, other),
        }
    }

    fn content_hash<H: Hasher>(&self, state: &mut H) {
        self.class.id().hash(state);
        match &self.payload {
            Payload::Boxed(value) => value.hash(state),
            Payload::Str(text) => text.hash(state),
            Payload::Class(class) => class.id().hash(state),
            Payload::Native(payload) => (Arc::as_ptr(payload) as *const () as usize).hash(state),
            _ => (self as *const Object as usize).hash(state),
        }
    }
}

fn check_store(component: &ClassRef, value: &Value) -> Result<()> {
    let ok = if component.is_primitive() {
        value.basic_type() == component.basic_type()
    } else {
        match value {
            Value::Null => true,
            Value::Ref(object) => component.is_assignable_from(object.class()),
            _ => false,
        }
    };
    if ok {
        Ok(())
    } else {
        Err(Error::ArrayStore(format!(
            "{:?} cannot be stored in {}[]",
            value,
            component.name()
        )))
    }
}

impl Debug for Object {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.payload {
            Payload::Boxed(value) => write!(f, "{}({:?})", self.class.simple_name(), value),
            Payload::Str(text) => write!(f, "{:?}", text),
            Payload::Array(items) => write!(f, "{}{:?}", self.class.name(), &*items.read()),
            Payload::Fields(_) => write!(f, "{}@{:p}", self.class.name(), self),
            Payload::Throwable { message, .. } => match message {
                Some(message) => write!(f, "{}: {}", self.class.name(), message),
                None => write!(f, "{}", self.class.name()),
            },
            Payload::Class(class) => write!(f, "class {}", class.name()),
            Payload::Native(_) => write!(f, "{}@native", self.class.name()),
        }
    }
}

/// Boxes a primitive value held in its carrier representation.
pub fn box_primitive(kind: PrimitiveKind, value: Value) -> Value {
    Value::Ref(Object::boxed(kind, value))
}

/// Unboxes a wrapper of exactly `kind`. Null fails with `NullPointer`, other
/// classes with `ClassCast`.
pub fn unbox_exact(value: &Value, kind: PrimitiveKind) -> Result<Value> {
    match unbox_any(value)? {
        Some((found, inner)) if found == kind => Ok(inner),
        _ => Err(Error::ClassCast(format!(
            "{} cannot be cast to {}",
            describe_class(value),
            kind.wrapper_name()
        ))),
    }
}

/// Unboxes any wrapper; `Ok(None)` for non-wrapper references.
pub fn unbox_any(value: &Value) -> Result<Option<(PrimitiveKind, Value)>> {
    match value {
        Value::Null => Err(Error::NullPointer("cannot unbox null value".to_string())),
        Value::Ref(object) => match (object.class().wrapper_kind(), object.payload()) {
            (Some(kind), Payload::Boxed(inner)) => Ok(Some((kind, inner.clone()))),
            _ => Ok(None),
        },
        other => Err(Error::Internal(format!(
            "unbox of non-reference {:?}",
            other
        ))),
    }
}

/// Unboxes and widens to `to`, the conversion an `asType` from a reference to
/// a primitive performs.
pub fn unbox_widening(value: &Value, to: PrimitiveKind) -> Result<Value> {
    match unbox_any(value)? {
        Some((from, inner)) if to.is_convertible_from(from) => {
            Ok(convert_primitive(&inner, from, to))
        }
        _ => Err(Error::ClassCast(format!(
            "{} cannot be converted to {}",
            describe_class(value),
            to
        ))),
    }
}

fn describe_class(value: &Value) -> String {
    match value.class() {
        Some(class) => class.name().to_string(),
        None => format!("{:?}", value),
    }
}

enum Numeric {
    Integral(i64),
    Floating(f64),
}

/// Primitive conversion between any two non-void kinds with the host's
/// explicit-cast semantics: integral narrowing truncates, float-to-integral
/// saturates, and `boolean` is the low bit.
pub fn convert_primitive(value: &Value, from: PrimitiveKind, to: PrimitiveKind) -> Value {
    if from == to {
        return value.clone();
    }
    let source = match value {
        Value::Int(v) => Numeric::Integral(*v as i64),
        Value::Long(v) => Numeric::Integral(*v),
        Value::Float(v) => Numeric::Floating(*v as f64),
        Value::Double(v) => Numeric::Floating(*v),
        _ => return Value::zero(to.basic_type()),
    };
    let as_int = |source: &Numeric| -> i32 {
        match source {
            Numeric::Integral(v) => *v as i32,
            Numeric::Floating(v) => *v as i32,
        }
    };
    match to {
        PrimitiveKind::Boolean => Value::Int(as_int(&source) & 1),
        PrimitiveKind::Byte => Value::Int(as_int(&source) as i8 as i32),
        PrimitiveKind::Short => Value::Int(as_int(&source) as i16 as i32),
        PrimitiveKind::Char => Value::Int(as_int(&source) as u16 as i32),
        PrimitiveKind::Int => Value::Int(as_int(&source)),
        PrimitiveKind::Long => Value::Long(match source {
            Numeric::Integral(v) => v,
            Numeric::Floating(v) => v as i64,
        }),
        PrimitiveKind::Float => Value::Float(match source {
            Numeric::Integral(v) => v as f32,
            Numeric::Floating(v) => v as f32,
        }),
        PrimitiveKind::Double => Value::Double(match source {
            Numeric::Integral(v) => v as f64,
            Numeric::Floating(v) => v,
        }),
        PrimitiveKind::Void => Value::Void,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrowing_truncates_and_saturates() {
        use PrimitiveKind::*;
        assert_eq!(convert_primitive(&Value::Int(300), Int, Byte), Value::Int(44));
        assert_eq!(convert_primitive(&Value::Int(-1), Int, Char), Value::Int(65535));
        assert_eq!(convert_primitive(&Value::Int(6), Int, Boolean), Value::Int(0));
        assert_eq!(
            convert_primitive(&Value::Double(1e20), Double, Int),
            Value::Int(i32::MAX)
        );
        assert_eq!(
            convert_primitive(&Value::Float(f32::NAN), Float, Long),
            Value::Long(0)
        );
        assert_eq!(
            convert_primitive(&Value::Long(1 << 40), Long, Int),
            Value::Int(0)
        );
    }

    #[test]
    fn unboxing_checks_the_wrapper_class() {
        let boxed = box_primitive(PrimitiveKind::Int, Value::Int(7));
        assert_eq!(unbox_exact(&boxed, PrimitiveKind::Int).ok(), Some(Value::Int(7)));
        assert!(matches!(
            unbox_exact(&boxed, PrimitiveKind::Long),
            Err(Error::ClassCast(_))
        ));
        assert_eq!(
            unbox_widening(&boxed, PrimitiveKind::Long).ok(),
            Some(Value::Long(7))
        );
        assert!(matches!(
            unbox_exact(&Value::Null, PrimitiveKind::Int),
            Err(Error::NullPointer(_))
        ));
    }

    #[test]
    fn array_stores_are_type_checked() {
        let array = Object::new_array(&classes::string().array_type(), 2).unwrap();
        array.array_store(0, Value::string("a")).unwrap();
        assert!(matches!(
            array.array_store(1, box_primitive(PrimitiveKind::Int, Value::Int(1))),
            Err(Error::ArrayStore(_))
        ));
        assert!(matches!(
            array.array_load(2),
            Err(Error::IndexOutOfBounds(_))
        ));
        assert_eq!(array.array_load(1).unwrap(), Value::Null);
    }

    #[test]
    fn strings_and_boxes_compare_by_content() {
        assert_eq!(Value::string("x"), Value::string("x"));
        assert_ne!(Value::string("x"), Value::string("y"));
        let a = Value::Ref(Object::new_instance(classes::object()));
        let b = Value::Ref(Object::new_instance(classes::object()));
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}
