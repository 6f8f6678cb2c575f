//! Artifact format produced by the form compiler and consumed by the linker.
//!
//! A [`BytecodeFunction`] is a flat stack-machine program over runtime
//! values. Locals hold the incoming arguments first. Object constants that
//! cannot be written into the artifact (classes, handles, captured values,
//! functions, forms) are referenced through a patch table whose entry kinds
//! are declared in [`BytecodeFunction::patch_kinds`] and supplied at link
//! time.

use mh_core::{BasicType, PrimitiveKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod pretty;
pub mod verify;

pub use pretty::format_function;
pub use verify::{verify_function, VerifyError};

pub const BYTECODE_MAGIC: [u8; 4] = *b"MHBC";
pub const BYTECODE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BytecodeFile {
    pub version: u32,
    pub function: BytecodeFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BytecodeFunction {
    pub name: String,
    /// Erased signature of the entry point, e.g. `LII_I`.
    pub signature: String,
    pub params: u32,
    pub locals: u32,
    pub max_stack: u32,
    pub code: Vec<Instr>,
    pub const_pool: Vec<BytecodeConst>,
    pub patch_kinds: Vec<PatchKind>,
    pub handlers: Vec<ExceptionHandler>,
}

/// Catches anything raised by instructions in `start..end` and continues at
/// `handler` with the stack reset to the materialized throwable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionHandler {
    pub start: u32,
    pub end: u32,
    pub handler: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatchKind {
    Value,
    Class,
    Handle,
    Function,
    Form,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BytecodeConst {
    Null,
    Int(i32),
    Long(i64),
    /// Raw bits, so NaN payloads survive encoding.
    Float(u32),
    Double(u64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnboxMode {
    /// The wrapper must be exactly the target kind.
    Exact,
    /// Any wrapper widening to the target kind.
    Widen,
    /// Any wrapper, explicit conversion; null becomes zero.
    Explicit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instr {
    LoadLocal(u32),
    StoreLocal(u32),
    LoadConst(u32),
    LoadPatch(u32),
    Pop,
    Dup,
    /// Pops a bound handle, pushes its captured slot.
    GetCaptured(u32),
    /// Checked reference cast to the class in the given patch.
    CheckCast(u32),
    /// Pops a class mirror and a value, pushes 1 if the value is an instance.
    IsInstance,
    Box(PrimitiveKind),
    Unbox {
        kind: PrimitiveKind,
        mode: UnboxMode,
    },
    /// Unboxes any wrapper into the carrier of a basic type.
    UnboxBasic(BasicType),
    PrimConvert {
        from: PrimitiveKind,
        to: PrimitiveKind,
    },
    /// Stack: handle, then `argc` arguments.
    InvokeHandle {
        argc: u32,
        returns: bool,
    },
    /// Applies the function in the given patch to `argc` arguments.
    InvokeFunction {
        patch: u32,
        argc: u32,
        returns: bool,
    },
    /// Runs the form in the given patch through the interpreter.
    InvokeInterpreter {
        patch: u32,
        argc: u32,
        returns: bool,
    },
    /// Pops `count` elements, pushes a new array of the class in `patch`.
    NewArray {
        patch: u32,
        count: u32,
    },
    /// Pops a length, pushes a zeroed array of the class in the patch.
    AllocArray(u32),
    ArrayLoad,
    ArrayStore,
    ArrayLength,
    /// Pops an array and fails unless its length is exactly the operand.
    CheckArrayLength(u32),
    Jump(u32),
    JumpIfZero(u32),
    Return,
    ReturnVoid,
    Throw,
}

impl Instr {
    /// Operand stack effect as `(pops, pushes)`.
    pub fn stack_effect(&self) -> (u32, u32) {
        match self {
            Instr::LoadLocal(_) | Instr::LoadConst(_) | Instr::LoadPatch(_) => (0, 1),
            Instr::StoreLocal(_) | Instr::Pop => (1, 0),
            Instr::Dup => (1, 2),
            Instr::GetCaptured(_)
            | Instr::CheckCast(_)
            | Instr::Box(_)
            | Instr::Unbox { .. }
            | Instr::UnboxBasic(_)
            | Instr::PrimConvert { .. }
            | Instr::AllocArray(_)
            | Instr::ArrayLength => (1, 1),
            Instr::IsInstance => (2, 1),
            Instr::InvokeHandle { argc, returns } => (argc + 1, *returns as u32),
            Instr::InvokeFunction { argc, returns, .. }
            | Instr::InvokeInterpreter { argc, returns, .. } => (*argc, *returns as u32),
            Instr::NewArray { count, .. } => (*count, 1),
            Instr::ArrayLoad => (2, 1),
            Instr::ArrayStore => (3, 0),
            Instr::CheckArrayLength(_) => (1, 0),
            Instr::Jump(_) => (0, 0),
            Instr::JumpIfZero(_) => (1, 0),
            Instr::Return | Instr::Throw => (1, 0),
            Instr::ReturnVoid => (0, 0),
        }
    }

    /// Control never falls through to the next instruction.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instr::Jump(_) | Instr::Return | Instr::ReturnVoid | Instr::Throw
        )
    }

    pub fn branch_target(&self) -> Option<u32> {
        match self {
            Instr::Jump(target) | Instr::JumpIfZero(target) => Some(*target),
            _ => None,
        }
    }

    /// The patch kind an instruction operand must refer to, if any.
    pub fn patch_operand(&self) -> Option<(u32, Option<PatchKind>)> {
        match self {
            Instr::LoadPatch(patch) => Some((*patch, None)),
            Instr::CheckCast(patch) | Instr::AllocArray(patch) => {
                Some((*patch, Some(PatchKind::Class)))
            }
            Instr::NewArray { patch, .. } => Some((*patch, Some(PatchKind::Class))),
            Instr::InvokeFunction { patch, .. } => Some((*patch, Some(PatchKind::Function))),
            Instr::InvokeInterpreter { patch, .. } => Some((*patch, Some(PatchKind::Form))),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum BytecodeError {
    #[error("bytecode encode failed: {0}")]
    Encode(#[from] bincode::Error),
    #[error("bytecode decode failed: {0}")]
    Decode(bincode::Error),
    #[error("bytecode format error: {message}")]
    Format { message: String },
    #[error("bytecode verification failed: {0}")]
    Verify(#[from] VerifyError),
}

pub fn encode_function(function: &BytecodeFunction) -> Result<Vec<u8>, BytecodeError> {
    let file = BytecodeFile {
        version: BYTECODE_VERSION,
        function: function.clone(),
    };
    let mut encoded = Vec::new();
    encoded.extend_from_slice(&BYTECODE_MAGIC);
    encoded.extend_from_slice(&BYTECODE_VERSION.to_le_bytes());
    encoded.extend_from_slice(&bincode::serialize(&file)?);
    Ok(encoded)
}

/// Decodes an artifact. The function is not verified; see
/// [`verify_function`].
pub fn decode_function(bytes: &[u8]) -> Result<BytecodeFunction, BytecodeError> {
    if bytes.len() < 8 {
        return Err(BytecodeError::Format {
            message: "bytecode header too short".to_string(),
        });
    }
    let magic = &bytes[..4];
    if magic != BYTECODE_MAGIC {
        return Err(BytecodeError::Format {
            message: "invalid bytecode magic".to_string(),
        });
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != BYTECODE_VERSION {
        return Err(BytecodeError::Format {
            message: format!(
                "unsupported bytecode version {}, expected {}",
                version, BYTECODE_VERSION
            ),
        });
    }
    let file: BytecodeFile = bincode::deserialize(&bytes[8..]).map_err(BytecodeError::Decode)?;
    if file.version != BYTECODE_VERSION {
        return Err(BytecodeError::Format {
            message: format!(
                "bytecode payload version {} does not match expected {}",
                file.version, BYTECODE_VERSION
            ),
        });
    }
    Ok(file.function)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> BytecodeFunction {
        BytecodeFunction {
            name: "identity".to_string(),
            signature: "LI_I".to_string(),
            params: 2,
            locals: 2,
            max_stack: 1,
            code: vec![Instr::LoadLocal(1), Instr::Return],
            const_pool: vec![],
            patch_kinds: vec![],
            handlers: vec![],
        }
    }

    #[test]
    fn header_is_checked() {
        let mut bytes = encode_function(&identity()).unwrap();
        assert_eq!(&bytes[..4], b"MHBC");
        bytes[0] = b'X';
        assert!(matches!(
            decode_function(&bytes),
            Err(BytecodeError::Format { .. })
        ));
        assert!(matches!(
            decode_function(&bytes[..3]),
            Err(BytecodeError::Format { .. })
        ));
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let mut bytes = encode_function(&identity()).unwrap();
        bytes[4] = 9;
        let err = decode_function(&bytes).unwrap_err();
        assert!(err.to_string().contains("unsupported bytecode version 9"));
    }
}
