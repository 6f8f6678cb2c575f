//! The stack machine behind [`crate::linker::BytecodeLinker`].

use crate::convert::{unbox_basic, unbox_explicit};
use crate::form::check_spread_length;
use crate::handle::CallHandle;
use crate::linker::Patch;
use mh_bytecode::{BytecodeConst, BytecodeFunction, Instr, UnboxMode};
use mh_core::value::{box_primitive, convert_primitive, unbox_exact, unbox_widening};
use mh_core::{internal, ClassRef, Error, Object, Result, Value};

enum Flow {
    Next,
    Jump(u32),
    Return(Value),
}

struct Frame<'a> {
    function: &'a BytecodeFunction,
    patches: &'a [Patch],
    locals: Vec<Value>,
    stack: Vec<Value>,
}

pub(crate) fn execute(
    function: &BytecodeFunction,
    patches: &[Patch],
    args: &[Value],
) -> Result<Value> {
    if args.len() != function.params as usize {
        internal!(
            "{} expects {} arguments but got {}",
            function.name,
            function.params,
            args.len()
        );
    }
    let mut locals = vec![Value::Void; function.locals.max(function.params) as usize];
    locals[..args.len()].clone_from_slice(args);
    let mut frame = Frame {
        function,
        patches,
        locals,
        stack: Vec::with_capacity(function.max_stack as usize),
    };
    let mut pc = 0u32;
    loop {
        let instr = function
            .code
            .get(pc as usize)
            .ok_or_else(|| Error::Internal(format!("{} fell off at {}", function.name, pc)))?;
        match frame.step(instr) {
            Ok(Flow::Next) => pc += 1,
            Ok(Flow::Jump(target)) => pc = target,
            Ok(Flow::Return(value)) => return Ok(value),
            Err(err) => {
                let Some(handler) = function
                    .handlers
                    .iter()
                    .find(|h| h.start <= pc && pc < h.end)
                else {
                    return Err(err);
                };
                frame.stack.clear();
                frame.stack.push(Value::Ref(err.to_throwable()));
                pc = handler.handler;
            }
        }
    }
}

impl Frame<'_> {
    fn pop(&mut self) -> Result<Value> {
        self.stack
            .pop()
            .ok_or_else(|| Error::Internal(format!("stack underflow in {}", self.function.name)))
    }

    fn pop_n(&mut self, count: u32) -> Result<Vec<Value>> {
        let count = count as usize;
        if self.stack.len() < count {
            internal!("stack underflow in {}", self.function.name);
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    fn pop_int(&mut self) -> Result<i32> {
        let value = self.pop()?;
        value
            .as_int()
            .ok_or_else(|| Error::Internal(format!("expected an int, found {:?}", value)))
    }

    fn push_result(&mut self, value: Value, returns: bool) {
        if returns {
            self.stack.push(value);
        }
    }

    fn patch(&self, index: u32) -> Result<&Patch> {
        self.patches
            .get(index as usize)
            .ok_or_else(|| Error::Internal(format!("missing patch {}", index)))
    }

    fn class_patch(&self, index: u32) -> Result<ClassRef> {
        match self.patch(index)? {
            Patch::Class(class) => Ok(class.clone()),
            other => internal!("patch {} is not a class: {:?}", index, other),
        }
    }

    fn local(&self, index: u32) -> Result<Value> {
        self.locals
            .get(index as usize)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("missing local {}", index)))
    }

    fn step(&mut self, instr: &Instr) -> Result<Flow> {
        match instr {
            Instr::LoadLocal(index) => {
                let value = self.local(*index)?;
                self.stack.push(value);
            }
            Instr::StoreLocal(index) => {
                let value = self.pop()?;
                let slot = self
                    .locals
                    .get_mut(*index as usize)
                    .ok_or_else(|| Error::Internal(format!("missing local {}", index)))?;
                *slot = value;
            }
            Instr::LoadConst(id) => {
                let constant = self
                    .function
                    .const_pool
                    .get(*id as usize)
                    .ok_or_else(|| Error::Internal(format!("missing const {}", id)))?;
                self.stack.push(convert_const(constant));
            }
            Instr::LoadPatch(index) => {
                let value = match self.patch(*index)? {
                    Patch::Value(value) => value.clone(),
                    Patch::Class(class) => Value::class_object(class),
                    Patch::Handle(handle) => handle.as_value(),
                    other => internal!("patch {} cannot be loaded: {:?}", index, other),
                };
                self.stack.push(value);
            }
            Instr::Pop => {
                self.pop()?;
            }
            Instr::Dup => {
                let value = self.pop()?;
                self.stack.push(value.clone());
                self.stack.push(value);
            }
            Instr::GetCaptured(slot) => {
                let handle = CallHandle::from_value(&self.pop()?)?;
                let value = handle.captured_value(*slot as usize)?;
                self.stack.push(value);
            }
            Instr::CheckCast(index) => {
                let class = self.class_patch(*index)?;
                let value = self.pop()?.check_cast(&class)?;
                self.stack.push(value);
            }
            Instr::IsInstance => {
                let mirror = self.pop()?;
                let value = self.pop()?;
                let Some(class) = mirror.as_class() else {
                    internal!("expected a class mirror, found {:?}", mirror);
                };
                self.stack.push(Value::Int(class.is_instance(&value) as i32));
            }
            Instr::Box(kind) => {
                let value = self.pop()?;
                self.stack.push(box_primitive(*kind, value));
            }
            Instr::Unbox { kind, mode } => {
                let value = self.pop()?;
                let unboxed = match mode {
                    UnboxMode::Exact => unbox_exact(&value, *kind)?,
                    UnboxMode::Widen => unbox_widening(&value, *kind)?,
                    UnboxMode::Explicit => unbox_explicit(&value, *kind)?,
                };
                self.stack.push(unboxed);
            }
            Instr::UnboxBasic(ty) => {
                let value = self.pop()?;
                self.stack.push(unbox_basic(&value, *ty)?);
            }
            Instr::PrimConvert { from, to } => {
                let value = self.pop()?;
                self.stack.push(convert_primitive(&value, *from, *to));
            }
            Instr::InvokeHandle { argc, returns } => {
                let args = self.pop_n(*argc)?;
                let handle = CallHandle::from_value(&self.pop()?)?;
                let value = handle.invoke_basic(&args)?;
                self.push_result(value, *returns);
            }
            Instr::InvokeFunction {
                patch,
                argc,
                returns,
            } => {
                let args = self.pop_n(*argc)?;
                let value = match self.patch(*patch)? {
                    Patch::Function(function) => function.invoke(&args)?,
                    other => internal!("patch {} is not a function: {:?}", patch, other),
                };
                self.push_result(value, *returns);
            }
            Instr::InvokeInterpreter {
                patch,
                argc,
                returns,
            } => {
                let args = self.pop_n(*argc)?;
                let value = match self.patch(*patch)? {
                    Patch::Form(form) => form.invoke(&args)?,
                    other => internal!("patch {} is not a form: {:?}", patch, other),
                };
                self.push_result(value, *returns);
            }
            Instr::NewArray { patch, count } => {
                let class = self.class_patch(*patch)?;
                let elements = self.pop_n(*count)?;
                self.stack.push(Value::Ref(Object::array_from(&class, elements)?));
            }
            Instr::AllocArray(patch) => {
                let class = self.class_patch(*patch)?;
                let length = self.pop_int()?;
                self.stack.push(Value::Ref(Object::new_array(&class, length)?));
            }
            Instr::ArrayLoad => {
                let index = self.pop_int()?;
                let array = self.pop()?;
                let value = array.require_object("array")?.array_load(index)?;
                self.stack.push(value);
            }
            Instr::ArrayStore => {
                let value = self.pop()?;
                let index = self.pop_int()?;
                let array = self.pop()?;
                array.require_object("array")?.array_store(index, value)?;
            }
            Instr::ArrayLength => {
                let array = self.pop()?;
                let length = array.require_object("array")?.array_length()?;
                self.stack.push(Value::Int(length as i32));
            }
            Instr::CheckArrayLength(len) => {
                let array = self.pop()?;
                check_spread_length(&array, *len as usize)?;
            }
            Instr::Jump(target) => return Ok(Flow::Jump(*target)),
            Instr::JumpIfZero(target) => {
                if self.pop_int()? == 0 {
                    return Ok(Flow::Jump(*target));
                }
            }
            Instr::Return => return Ok(Flow::Return(self.pop()?)),
            Instr::ReturnVoid => return Ok(Flow::Return(Value::Void)),
            Instr::Throw => {
                let thrown = self.pop()?;
                return Err(Error::from_throwable(
                    thrown.require_object("exception")?.clone(),
                ));
            }
        }
        Ok(Flow::Next)
    }
}

fn convert_const(constant: &BytecodeConst) -> Value {
    match constant {
        BytecodeConst::Null => Value::Null,
        BytecodeConst::Int(v) => Value::Int(*v),
        BytecodeConst::Long(v) => Value::Long(*v),
        BytecodeConst::Float(bits) => Value::Float(f32::from_bits(*bits)),
        BytecodeConst::Double(bits) => Value::Double(f64::from_bits(*bits)),
        BytecodeConst::Str(text) => Value::string(text.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mh_bytecode::{ExceptionHandler, PatchKind};
    use mh_core::classes;

    fn function(code: Vec<Instr>, handlers: Vec<ExceptionHandler>) -> BytecodeFunction {
        BytecodeFunction {
            name: "test".to_string(),
            signature: "LL_I".to_string(),
            params: 2,
            locals: 3,
            max_stack: 3,
            code,
            const_pool: vec![BytecodeConst::Int(7), BytecodeConst::Int(-1)],
            patch_kinds: vec![PatchKind::Class],
            handlers,
        }
    }

    #[test]
    fn handlers_catch_failures_in_range() {
        let code = vec![
            Instr::LoadLocal(1),
            Instr::Throw,
            Instr::StoreLocal(2),
            Instr::LoadConst(1),
            Instr::Return,
        ];
        let f = function(
            code,
            vec![ExceptionHandler {
                start: 0,
                end: 2,
                handler: 2,
            }],
        );
        let thrown = Value::Ref(Error::throw(classes::runtime_exception(), "boom").to_throwable());
        let patches = [Patch::Class(classes::object().clone())];
        assert_eq!(
            execute(&f, &patches, &[Value::Null, thrown]).unwrap(),
            Value::Int(-1)
        );
    }

    #[test]
    fn failures_outside_handlers_propagate() {
        let code = vec![Instr::LoadLocal(1), Instr::Throw];
        let f = function(code, vec![]);
        let thrown = Value::Ref(Error::throw(classes::runtime_exception(), "boom").to_throwable());
        let patches = [Patch::Class(classes::object().clone())];
        let err = execute(&f, &patches, &[Value::Null, thrown]).unwrap_err();
        assert!(err.is_instance_of(classes::runtime_exception()));
    }

    #[test]
    fn is_instance_tests_against_class_patches() {
        let code = vec![
            Instr::LoadLocal(1),
            Instr::LoadPatch(0),
            Instr::IsInstance,
            Instr::JumpIfZero(6),
            Instr::LoadConst(0),
            Instr::Return,
            Instr::LoadConst(1),
            Instr::Return,
        ];
        let f = function(code, vec![]);
        let patches = [Patch::Class(classes::string().clone())];
        assert_eq!(
            execute(&f, &patches, &[Value::Null, Value::string("x")]).unwrap(),
            Value::Int(7)
        );
        assert_eq!(
            execute(&f, &patches, &[Value::Null, Value::Null]).unwrap(),
            Value::Int(-1)
        );
    }
}
