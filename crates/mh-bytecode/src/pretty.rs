use crate::{BytecodeConst, BytecodeFunction, Instr, UnboxMode};
use itertools::Itertools;
use std::fmt::{Display, Formatter};

pub fn format_function(function: &BytecodeFunction) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "fn {} {} (params: {}, locals: {}, max_stack: {})\n",
        function.name, function.signature, function.params, function.locals, function.max_stack
    ));
    if !function.const_pool.is_empty() {
        output.push_str("  const_pool:\n");
        for (index, constant) in function.const_pool.iter().enumerate() {
            output.push_str(&format!("    [{}] {}\n", index, format_const(constant)));
        }
    }
    if !function.patch_kinds.is_empty() {
        output.push_str(&format!(
            "  patches: [{}]\n",
            function
                .patch_kinds
                .iter()
                .map(|kind| format!("{:?}", kind))
                .join(", ")
        ));
    }
    for (pc, instr) in function.code.iter().enumerate() {
        output.push_str(&format!("  {:>4}: {}\n", pc, format_instr(instr)));
    }
    for handler in &function.handlers {
        output.push_str(&format!(
            "  catch {}..{} -> {}\n",
            handler.start, handler.end, handler.handler
        ));
    }
    output
}

fn format_const(constant: &BytecodeConst) -> String {
    match constant {
        BytecodeConst::Null => "null".to_string(),
        BytecodeConst::Int(value) => format!("int {}", value),
        BytecodeConst::Long(value) => format!("long {}", value),
        BytecodeConst::Float(bits) => format!("float {}", f32::from_bits(*bits)),
        BytecodeConst::Double(bits) => format!("double {}", f64::from_bits(*bits)),
        BytecodeConst::Str(value) => format!("str {:?}", value),
    }
}

fn format_instr(instr: &Instr) -> String {
    match instr {
        Instr::LoadLocal(id) => format!("load.local {}", id),
        Instr::StoreLocal(id) => format!("store.local {}", id),
        Instr::LoadConst(id) => format!("load.const {}", id),
        Instr::LoadPatch(id) => format!("load.patch {}", id),
        Instr::Pop => "pop".to_string(),
        Instr::Dup => "dup".to_string(),
        Instr::GetCaptured(slot) => format!("get.captured {}", slot),
        Instr::CheckCast(patch) => format!("checkcast patch {}", patch),
        Instr::IsInstance => "instanceof".to_string(),
        Instr::Box(kind) => format!("box {}", kind),
        Instr::Unbox { kind, mode } => {
            let mode = match mode {
                UnboxMode::Exact => "exact",
                UnboxMode::Widen => "widen",
                UnboxMode::Explicit => "explicit",
            };
            format!("unbox.{} {}", mode, kind)
        }
        Instr::UnboxBasic(ty) => format!("unbox.basic {}", ty),
        Instr::PrimConvert { from, to } => format!("convert {} -> {}", from, to),
        Instr::InvokeHandle { argc, returns } => {
            format!("invoke.handle {}{}", argc, if *returns { "" } else { " void" })
        }
        Instr::InvokeFunction {
            patch,
            argc,
            returns,
        } => format!(
            "invoke.function patch {} {}{}",
            patch,
            argc,
            if *returns { "" } else { " void" }
        ),
        Instr::InvokeInterpreter {
            patch,
            argc,
            returns,
        } => format!(
            "invoke.interpreter patch {} {}{}",
            patch,
            argc,
            if *returns { "" } else { " void" }
        ),
        Instr::NewArray { patch, count } => format!("new.array patch {} {}", patch, count),
        Instr::AllocArray(patch) => format!("alloc.array patch {}", patch),
        Instr::ArrayLoad => "array.load".to_string(),
        Instr::ArrayStore => "array.store".to_string(),
        Instr::ArrayLength => "array.length".to_string(),
        Instr::CheckArrayLength(len) => format!("array.checklen {}", len),
        Instr::Jump(target) => format!("jump {}", target),
        Instr::JumpIfZero(target) => format!("jump_if_zero {}", target),
        Instr::Return => "return".to_string(),
        Instr::ReturnVoid => "return.void".to_string(),
        Instr::Throw => "throw".to_string(),
    }
}

impl Display for BytecodeFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_function(self))
    }
}

impl Display for Instr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_instr(self))
    }
}
