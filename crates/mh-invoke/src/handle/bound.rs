//! Bound handles: handles whose form reads captured values.
//!
//! Binding an argument extends the captured values by one slot and edits
//! the shared form so the parameter is read from that slot instead.

use super::{reinvoker, CallHandle, HandleKind};
use crate::form::{bind_argument_form, drop_arguments_form, FormRef};
use mh_core::{config, internal, BasicType, Result, TypeDescriptor, Value};

impl CallHandle {
    /// A bound handle with room for one more captured value: this handle
    /// if it is bound and below the configured limits, otherwise a
    /// reinvoker around it.
    pub fn rebind(&self) -> Result<CallHandle> {
        if let Some(captured) = self.captured() {
            let config = config::global();
            if captured.species().slot_count() < config.field_count_threshold
                && self.base_form().expression_count() < config.form_expression_threshold
            {
                return Ok(self.clone());
            }
        }
        reinvoker(self)
    }

    /// Same captured values, new type and form.
    pub fn copy_with(&self, ty: TypeDescriptor, form: FormRef) -> Result<CallHandle> {
        let Some(captured) = self.captured() else {
            internal!("{:?} is not bound", self);
        };
        CallHandle::new(ty, form, HandleKind::Bound(captured.clone()))
    }

    /// The captured values extended by `value`, which must be carried as
    /// `ty`.
    pub fn copy_with_extend(
        &self,
        ty: TypeDescriptor,
        form: FormRef,
        slot_type: BasicType,
        value: Value,
    ) -> Result<CallHandle> {
        let Some(captured) = self.captured() else {
            internal!("{:?} is not bound", self);
        };
        if value.basic_type() != slot_type {
            internal!("cannot capture {:?} as {}", value, slot_type);
        }
        CallHandle::new(ty, form, HandleKind::Bound(captured.extend(value)?))
    }

    pub fn copy_with_extend_l(&self, ty: TypeDescriptor, form: FormRef, value: Value) -> Result<CallHandle> {
        self.copy_with_extend(ty, form, BasicType::L, value)
    }

    pub fn copy_with_extend_i(&self, ty: TypeDescriptor, form: FormRef, value: i32) -> Result<CallHandle> {
        self.copy_with_extend(ty, form, BasicType::I, Value::Int(value))
    }

    pub fn copy_with_extend_j(&self, ty: TypeDescriptor, form: FormRef, value: i64) -> Result<CallHandle> {
        self.copy_with_extend(ty, form, BasicType::J, Value::Long(value))
    }

    pub fn copy_with_extend_f(&self, ty: TypeDescriptor, form: FormRef, value: f32) -> Result<CallHandle> {
        self.copy_with_extend(ty, form, BasicType::F, Value::Float(value))
    }

    pub fn copy_with_extend_d(&self, ty: TypeDescriptor, form: FormRef, value: f64) -> Result<CallHandle> {
        self.copy_with_extend(ty, form, BasicType::D, Value::Double(value))
    }

    /// Fixes parameter `pos` to `value`, already in the parameter's
    /// basic-type carrier.
    pub fn bind_argument(&self, pos: usize, value: Value) -> Result<CallHandle> {
        let ty = self.ty();
        if pos >= ty.parameter_count() {
            internal!("{} has no argument {}", ty, pos);
        }
        let slot_type = ty.parameter_type(pos).basic_type();
        if value.basic_type() != slot_type {
            internal!("cannot bind {:?} to {} argument {}", value, ty, pos);
        }
        let new_ty = ty.drop_parameter_types(pos, pos + 1)?;
        let this = self.rebind()?;
        let form = this.base_form();
        if !form.is_used(pos + 1) {
            return this.copy_with(new_ty, drop_arguments_form(form, pos + 1, 1)?);
        }
        let Some(captured) = this.captured() else {
            internal!("rebind of {:?} produced an unbound handle", self);
        };
        let species = captured.species().extend_with(slot_type)?;
        let form = bind_argument_form(form, pos + 1, &species)?;
        this.copy_with_extend(new_ty, form, slot_type, value)
    }

    pub fn bind_argument_l(&self, pos: usize, value: Value) -> Result<CallHandle> {
        self.bind_argument(pos, value)
    }

    pub fn bind_argument_i(&self, pos: usize, value: i32) -> Result<CallHandle> {
        self.bind_argument(pos, Value::Int(value))
    }

    pub fn bind_argument_j(&self, pos: usize, value: i64) -> Result<CallHandle> {
        self.bind_argument(pos, Value::Long(value))
    }

    pub fn bind_argument_f(&self, pos: usize, value: f32) -> Result<CallHandle> {
        self.bind_argument(pos, Value::Float(value))
    }

    pub fn bind_argument_d(&self, pos: usize, value: f64) -> Result<CallHandle> {
        self.bind_argument(pos, Value::Double(value))
    }
}

#[cfg(test)]
mod tests {
    use crate::combinators::{constant, identity};
    use mh_core::{classes, TypeDescriptor, Value};

    #[test]
    fn used_arguments_are_captured_in_an_extended_species() {
        let max = crate::combinators::permute_arguments(
            &identity(classes::int()).unwrap(),
            &TypeDescriptor::of(classes::int(), &[classes::int().clone(), classes::int().clone()])
                .unwrap(),
            &[1],
        )
        .unwrap();
        let first = max.bind_argument_i(0, 3).unwrap();
        let second = first.bind_argument_i(0, 4).unwrap();
        assert_eq!(second.ty().to_string(), "()int");
        let captured = second.captured().unwrap();
        assert_eq!(captured.species().signature(), "LI");
        assert_eq!(second.invoke_basic(&[]).unwrap(), Value::Int(4));
    }

    #[test]
    fn unused_arguments_are_dropped_instead_of_captured() {
        let five = constant(classes::int(), Value::Int(5)).unwrap();
        let widened = crate::combinators::drop_arguments(&five, 0, &[classes::long().clone()]).unwrap();
        let bound = widened.bind_argument_j(0, 9).unwrap();
        assert_eq!(bound.ty().to_string(), "()int");
        assert_eq!(bound.captured().unwrap().values().len(), 1);
        assert_eq!(bound.invoke_basic(&[]).unwrap(), Value::Int(5));
    }
}
