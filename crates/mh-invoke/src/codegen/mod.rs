//! Lowers lambda forms to stack-machine bytecode.
//!
//! Every name gets a local of its own, numbered like the name; one extra
//! scratch local follows. Each name is evaluated with an empty operand
//! stack and stored to its local, so the stack depth only grows inside a
//! single name. Two shapes get dedicated lowering: a `SelectAlternative`
//! feeding one invocation becomes a conditional branch, and a
//! `GuardWithCatch` over freshly boxed arguments becomes a protected
//! region with an exception handler.

pub(crate) mod exec;

use crate::convert::ValueConversion;
use crate::form::{Argument, Intrinsic, LambdaForm, Name, NamedFunction};
use crate::linker::{ExecutableLinker, ExecutableRef, Patch};
use crate::runtime;
use mh_bytecode::{
    encode_function, BytecodeConst, BytecodeFunction, ExceptionHandler, Instr, PatchKind,
    UnboxMode,
};
use mh_core::{config, debug, internal, trace, BasicType, Error, Result, Value};
use std::collections::HashSet;

/// Compiles and links with the installed linker.
pub fn compile(form: &LambdaForm) -> Result<ExecutableRef> {
    compile_with(form, runtime::services().linker.as_ref())
}

pub fn compile_with(form: &LambdaForm, linker: &dyn ExecutableLinker) -> Result<ExecutableRef> {
    let (function, patches) = generate(form)?;
    trace!("{}", function);
    let bytes = encode_function(&function).map_err(|err| Error::Internal(err.to_string()))?;
    linker.define_and_link(&bytes, patches)
}

/// The artifact for `form` and the patch values it refers to. Forms with
/// more names than the configured limit get a stub that interprets them.
pub fn generate(form: &LambdaForm) -> Result<(BytecodeFunction, Vec<Patch>)> {
    let limit = config::global().max_compiled_names;
    if form.names().len() > limit {
        debug!(
            "{} has {} names, linking an interpreter stub",
            form.debug_name(),
            form.names().len()
        );
        return Ok(interpreter_stub(form));
    }
    Generator::new(form).run()
}

fn interpreter_stub(form: &LambdaForm) -> (BytecodeFunction, Vec<Patch>) {
    let arity = form.arity() as u32;
    let returns = !form.return_type().is_void();
    let mut code: Vec<Instr> = (0..arity).map(Instr::LoadLocal).collect();
    code.push(Instr::InvokeInterpreter {
        patch: 0,
        argc: arity,
        returns,
    });
    code.push(if returns {
        Instr::Return
    } else {
        Instr::ReturnVoid
    });
    let function = BytecodeFunction {
        name: form.debug_name(),
        signature: form.basic_signature(),
        params: arity,
        locals: arity,
        max_stack: arity.max(1),
        code,
        const_pool: Vec::new(),
        patch_kinds: vec![PatchKind::Form],
        handlers: Vec::new(),
    };
    (function, vec![Patch::Form(form.interpreted_copy())])
}

struct Generator<'a> {
    form: &'a LambdaForm,
    code: Vec<Instr>,
    consts: Vec<BytecodeConst>,
    patches: Vec<Patch>,
    handlers: Vec<ExceptionHandler>,
    depth: u32,
    max_stack: u32,
    uses: Vec<usize>,
    // Names evaluated as part of another name's lowering.
    folded: HashSet<usize>,
}

impl<'a> Generator<'a> {
    fn new(form: &'a LambdaForm) -> Self {
        Self {
            form,
            code: Vec::new(),
            consts: Vec::new(),
            patches: Vec::new(),
            handlers: Vec::new(),
            depth: 0,
            max_stack: 1,
            uses: form.use_counts(),
            folded: HashSet::new(),
        }
    }

    fn scratch(&self) -> u32 {
        self.form.names().len() as u32
    }

    fn run(mut self) -> Result<(BytecodeFunction, Vec<Patch>)> {
        let names = self.form.names();
        for name in &names[self.form.arity()..] {
            self.plan_catch(name);
        }
        let mut index = self.form.arity();
        while index < names.len() {
            if !self.folded.contains(&index) {
                index = self.emit_name(index)?;
            }
            index += 1;
        }
        match self.form.result() {
            Some(result) => {
                self.emit(Instr::LoadLocal(result as u32));
                self.emit(Instr::Return);
            }
            None => self.emit(Instr::ReturnVoid),
        }
        let patch_kinds = self.patches.iter().map(Patch::kind).collect();
        let function = BytecodeFunction {
            name: self.form.debug_name(),
            signature: self.form.basic_signature(),
            params: self.form.arity() as u32,
            locals: self.scratch() + 1,
            max_stack: self.max_stack,
            code: self.code,
            const_pool: self.consts,
            patch_kinds,
            handlers: self.handlers,
        };
        Ok((function, self.patches))
    }

    fn emit(&mut self, instr: Instr) {
        let (pops, pushes) = instr.stack_effect();
        self.depth = self.depth.saturating_sub(pops) + pushes;
        self.max_stack = self.max_stack.max(self.depth);
        self.code.push(instr);
    }

    fn pc(&self) -> u32 {
        self.code.len() as u32
    }

    fn patch_jump(&mut self, at: usize, target: u32) -> Result<()> {
        match self.code.get_mut(at) {
            Some(Instr::Jump(slot)) | Some(Instr::JumpIfZero(slot)) => {
                *slot = target;
                Ok(())
            }
            other => internal!("no jump at {}: {:?}", at, other),
        }
    }

    fn add_patch(&mut self, patch: Patch) -> u32 {
        self.patches.push(patch);
        (self.patches.len() - 1) as u32
    }

    fn class_patch(&mut self, class: &mh_core::ClassRef) -> u32 {
        let found = self
            .patches
            .iter()
            .position(|patch| matches!(patch, Patch::Class(c) if c == class));
        match found {
            Some(index) => index as u32,
            None => self.add_patch(Patch::Class(class.clone())),
        }
    }

    fn push_const(&mut self, value: &Value) -> Result<()> {
        let constant = match value {
            Value::Null => BytecodeConst::Null,
            Value::Int(v) => BytecodeConst::Int(*v),
            Value::Long(v) => BytecodeConst::Long(*v),
            Value::Float(v) => BytecodeConst::Float(v.to_bits()),
            Value::Double(v) => BytecodeConst::Double(v.to_bits()),
            Value::Ref(_) => {
                let patch = self.add_patch(Patch::Value(value.clone()));
                self.emit(Instr::LoadPatch(patch));
                return Ok(());
            }
            Value::Void => internal!("void constant in {}", self.form.debug_name()),
        };
        let id = match self.consts.iter().position(|c| *c == constant) {
            Some(id) => id,
            None => {
                self.consts.push(constant);
                self.consts.len() - 1
            }
        };
        self.emit(Instr::LoadConst(id as u32));
        Ok(())
    }

    fn push_arg(&mut self, arg: &Argument) -> Result<()> {
        match arg {
            Argument::Name(index) => {
                self.emit(Instr::LoadLocal(*index as u32));
                Ok(())
            }
            Argument::Const(value) => self.push_const(value),
        }
    }

    fn push_args(&mut self, args: &[Argument]) -> Result<()> {
        args.iter().try_for_each(|arg| self.push_arg(arg))
    }

    fn store(&mut self, name: &Name) {
        if !name.ty().is_void() {
            self.emit(Instr::StoreLocal(name.index() as u32));
        }
    }

    /// Lowers name `index` and returns the last index it consumed.
    fn emit_name(&mut self, index: usize) -> Result<usize> {
        let names = self.form.names();
        let name = &names[index];
        let Some(function) = name.function() else {
            internal!("parameter {} after the parameters", index);
        };
        let returns = !name.ty().is_void();
        let argc = name.arguments().len() as u32;
        match function {
            NamedFunction::Getter { slot, .. } => {
                self.push_args(name.arguments())?;
                self.emit(Instr::GetCaptured(*slot as u32));
            }
            NamedFunction::InvokeBasic(_) => {
                self.push_args(name.arguments())?;
                self.emit(Instr::InvokeHandle {
                    argc: argc - 1,
                    returns,
                });
            }
            NamedFunction::Handle(handle) => {
                let patch = self.add_patch(Patch::Handle(handle.clone()));
                self.emit(Instr::LoadPatch(patch));
                self.push_args(name.arguments())?;
                self.emit(Instr::InvokeHandle { argc, returns });
            }
            NamedFunction::Intrinsic(Intrinsic::SelectAlternative) => {
                if let Some(call) = self.selected_call(index) {
                    self.emit_branch(name, call)?;
                    return Ok(call);
                }
                self.emit_call(name)?;
            }
            NamedFunction::Intrinsic(Intrinsic::GuardWithCatch(rt)) => {
                if self.catch_shape(name).is_some() {
                    self.emit_catch(name, *rt)?;
                    return Ok(index);
                }
                self.emit_call(name)?;
            }
            NamedFunction::Intrinsic(intrinsic) => {
                if self.emit_intrinsic(name, intrinsic)? {
                    return Ok(index);
                }
            }
            NamedFunction::Member(_) => self.emit_call(name)?,
        }
        self.store(name);
        Ok(index)
    }

    /// Generic lowering through the function's own `invoke`.
    fn emit_call(&mut self, name: &Name) -> Result<()> {
        let Some(function) = name.function() else {
            internal!("name {} has no function", name.index());
        };
        self.push_args(name.arguments())?;
        let patch = self.add_patch(Patch::Function(function.clone()));
        self.emit(Instr::InvokeFunction {
            patch,
            argc: name.arguments().len() as u32,
            returns: !name.ty().is_void(),
        });
        Ok(())
    }

    /// Pushes the value of `name`; returns true when control does not
    /// continue past it.
    fn emit_intrinsic(&mut self, name: &Name, intrinsic: &Intrinsic) -> Result<bool> {
        let args = name.arguments();
        match intrinsic {
            Intrinsic::Identity(_) => self.push_args(args)?,
            Intrinsic::Zero(ty) => {
                if !ty.is_void() {
                    self.push_const(&Value::zero(*ty))?;
                }
            }
            Intrinsic::Throw(_) => {
                self.push_args(args)?;
                self.emit(Instr::Throw);
                self.depth = 0;
                return Ok(true);
            }
            Intrinsic::Convert(conversion) => {
                self.push_args(args)?;
                let instr = match conversion {
                    ValueConversion::Cast(class) => Instr::CheckCast(self.class_patch(class)),
                    ValueConversion::Primitive { from, to } => Instr::PrimConvert {
                        from: *from,
                        to: *to,
                    },
                    ValueConversion::Box(kind) => Instr::Box(*kind),
                    ValueConversion::Unbox(kind) => Instr::Unbox {
                        kind: *kind,
                        mode: UnboxMode::Exact,
                    },
                    ValueConversion::UnboxWiden(kind) => Instr::Unbox {
                        kind: *kind,
                        mode: UnboxMode::Widen,
                    },
                    ValueConversion::UnboxExplicit(kind) => Instr::Unbox {
                        kind: *kind,
                        mode: UnboxMode::Explicit,
                    },
                    ValueConversion::UnboxBasic(ty) => Instr::UnboxBasic(*ty),
                };
                self.emit(instr);
            }
            Intrinsic::NewArray { array, count } => {
                self.push_args(args)?;
                let patch = self.class_patch(array);
                self.emit(Instr::NewArray {
                    patch,
                    count: *count as u32,
                });
            }
            Intrinsic::AllocArray { array } => {
                self.push_args(args)?;
                let patch = self.class_patch(array);
                self.emit(Instr::AllocArray(patch));
            }
            Intrinsic::ArrayLoad { .. } => {
                self.push_args(args)?;
                self.emit(Instr::ArrayLoad);
            }
            Intrinsic::ArrayStore { .. } => {
                self.push_args(args)?;
                self.emit(Instr::ArrayStore);
            }
            Intrinsic::ArrayLength => {
                self.push_args(args)?;
                self.emit(Instr::ArrayLength);
            }
            Intrinsic::CheckSpreadLength { len } => {
                self.push_args(args)?;
                self.emit(Instr::CheckArrayLength(*len as u32));
            }
            _ => self.emit_call(name)?,
        }
        Ok(false)
    }

    /// The invocation consuming selector `index`, if it is the only use
    /// and directly follows.
    fn selected_call(&self, index: usize) -> Option<usize> {
        let next = self.form.name(index + 1)?;
        let selects = matches!(next.function(), Some(NamedFunction::InvokeBasic(_)))
            && next.arguments().first() == Some(&Argument::Name(index));
        (self.uses[index] == 1 && selects).then_some(index + 1)
    }

    fn emit_branch(&mut self, selector: &Name, call: usize) -> Result<()> {
        let [test, then, otherwise] = selector.arguments() else {
            internal!("selector {} takes three arguments", selector.index());
        };
        let call = &self.form.names()[call];
        let rest = &call.arguments()[1..];
        let returns = !call.ty().is_void();
        let argc = rest.len() as u32;

        self.push_arg(test)?;
        let branch = self.code.len();
        self.emit(Instr::JumpIfZero(0));
        self.push_arg(then)?;
        self.push_args(rest)?;
        self.emit(Instr::InvokeHandle { argc, returns });
        self.store(call);
        let exit = self.code.len();
        self.emit(Instr::Jump(0));

        self.depth = 0;
        let alternative = self.pc();
        self.patch_jump(branch, alternative)?;
        self.push_arg(otherwise)?;
        self.push_args(rest)?;
        self.emit(Instr::InvokeHandle { argc, returns });
        self.store(call);
        let join = self.pc();
        self.patch_jump(exit, join)
    }

    /// The boxing names and the unboxed originals of a catch whose argument
    /// array is built only for it.
    fn catch_shape(&self, name: &Name) -> Option<(usize, Vec<usize>, Vec<Argument>)> {
        let Argument::Name(array) = name.arguments().get(3)? else {
            return None;
        };
        let array_name = self.form.name(*array)?;
        if self.uses[*array] != 1
            || !matches!(
                array_name.function(),
                Some(NamedFunction::Intrinsic(Intrinsic::NewArray { .. }))
            )
        {
            return None;
        }
        let mut boxes = Vec::new();
        let mut originals = Vec::new();
        for arg in array_name.arguments() {
            match arg {
                Argument::Name(index) if *index >= self.form.arity() => {
                    let boxing = self.form.name(*index)?;
                    let is_box = matches!(
                        boxing.function(),
                        Some(NamedFunction::Intrinsic(Intrinsic::Convert(ValueConversion::Box(_))))
                    );
                    if !is_box || self.uses[*index] != 1 {
                        return None;
                    }
                    boxes.push(*index);
                    originals.push(boxing.arguments().first()?.clone());
                }
                other => originals.push(other.clone()),
            }
        }
        Some((*array, boxes, originals))
    }

    fn plan_catch(&mut self, name: &Name) {
        if !matches!(
            name.function(),
            Some(NamedFunction::Intrinsic(Intrinsic::GuardWithCatch(_)))
        ) {
            return;
        }
        if let Some((array, boxes, _)) = self.catch_shape(name) {
            self.folded.insert(array);
            self.folded.extend(boxes);
        }
    }

    fn box_result(&mut self, rt: BasicType) -> Result<()> {
        match rt {
            BasicType::V => self.push_const(&Value::Null),
            BasicType::L => Ok(()),
            _ => {
                if let Some(kind) = rt.primitive_kind() {
                    self.emit(Instr::Box(kind));
                }
                Ok(())
            }
        }
    }

    fn emit_catch(&mut self, name: &Name, rt: BasicType) -> Result<()> {
        let Some((_, _, originals)) = self.catch_shape(name) else {
            internal!("guardWithCatch {} is not in lowering shape", name.index());
        };
        let [target, caught, handler, _] = name.arguments() else {
            internal!("guardWithCatch {} takes four arguments", name.index());
        };
        let returns = !rt.is_void();
        let argc = originals.len() as u32;

        let start = self.pc();
        self.push_arg(target)?;
        self.push_args(&originals)?;
        self.emit(Instr::InvokeHandle { argc, returns });
        let end = self.pc();
        self.box_result(rt)?;
        self.store(name);
        let exit = self.code.len();
        self.emit(Instr::Jump(0));

        self.depth = 1;
        let entry = self.pc();
        self.handlers.push(ExceptionHandler {
            start,
            end,
            handler: entry,
        });
        self.emit(Instr::Dup);
        self.push_arg(caught)?;
        self.emit(Instr::IsInstance);
        let rethrow = self.code.len();
        self.emit(Instr::JumpIfZero(0));
        let scratch = self.scratch();
        self.emit(Instr::StoreLocal(scratch));
        self.push_arg(handler)?;
        self.emit(Instr::LoadLocal(scratch));
        self.push_args(&originals)?;
        self.emit(Instr::InvokeHandle {
            argc: argc + 1,
            returns,
        });
        self.box_result(rt)?;
        self.store(name);
        let handled = self.code.len();
        self.emit(Instr::Jump(0));

        self.depth = 1;
        let rethrow_at = self.pc();
        self.patch_jump(rethrow, rethrow_at)?;
        self.emit(Instr::Throw);

        self.depth = 0;
        let join = self.pc();
        self.patch_jump(exit, join)?;
        self.patch_jump(handled, join)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinators::{catch_exception, guard_with_test, identity, throw_exception};
    use crate::form::{FormBuilder, FormKind};
    use mh_bytecode::verify_function;
    use mh_core::{classes, TypeDescriptor};

    fn add_one() -> crate::FormRef {
        let mut b = FormBuilder::new(&[BasicType::L, BasicType::I]);
        let boxed = b.add(
            Intrinsic::Convert(ValueConversion::Box(mh_core::PrimitiveKind::Int)),
            vec![b.param(1)],
        );
        let back = b.add(
            Intrinsic::Convert(ValueConversion::UnboxBasic(BasicType::I)),
            vec![Argument::Name(boxed)],
        );
        b.build(Some(back), FormKind::Identity).unwrap()
    }

    #[test]
    fn straight_line_forms_verify_and_run() {
        let form = add_one();
        let (function, patches) = generate(&form).unwrap();
        assert_eq!(verify_function(&function), Ok(()));
        assert!(patches.is_empty());
        assert_eq!(function.locals, 5);
        let executable = crate::linker::BytecodeLinker
            .define_and_link(&encode_function(&function).unwrap(), patches)
            .unwrap();
        assert_eq!(
            executable.invoke(&[Value::Null, Value::Int(41)]).unwrap(),
            Value::Int(41)
        );
    }

    #[test]
    fn guards_lower_to_branches() {
        let test = crate::combinators::constant(classes::boolean(), Value::boolean(true)).unwrap();
        let test = crate::combinators::drop_arguments(&test, 0, &[classes::int().clone()]).unwrap();
        let id = identity(classes::int()).unwrap();
        let guard = guard_with_test(&test, &id, &id).unwrap();
        let (function, _) = generate(&guard.form()).unwrap();
        assert_eq!(verify_function(&function), Ok(()));
        assert!(function
            .code
            .iter()
            .any(|instr| matches!(instr, Instr::JumpIfZero(_))));
        assert!(!function
            .code
            .iter()
            .any(|instr| matches!(instr, Instr::InvokeFunction { .. })));
    }

    #[test]
    fn catches_lower_to_handlers() {
        let ty = TypeDescriptor::of(classes::int(), &[classes::throwable().clone()]).unwrap();
        let thrower = throw_exception(classes::int(), classes::throwable()).unwrap();
        let handler = crate::combinators::drop_arguments(
            &crate::combinators::constant(classes::int(), Value::Int(-1)).unwrap(),
            0,
            &[classes::throwable().clone(), classes::throwable().clone()],
        )
        .unwrap();
        let guarded = catch_exception(&thrower, classes::throwable(), &handler).unwrap();
        assert_eq!(guarded.ty(), &ty);
        let (function, _) = generate(&guarded.form()).unwrap();
        assert_eq!(verify_function(&function), Ok(()));
        assert_eq!(function.handlers.len(), 1);
        assert!(!function
            .code
            .iter()
            .any(|instr| matches!(instr, Instr::NewArray { .. })));
    }
}
