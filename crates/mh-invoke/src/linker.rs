//! Turning encoded artifacts into invocable executables.
//!
//! The code generator hands the linker an encoded [`BytecodeFunction`]
//! together with the patch values its `LoadPatch`-style operands refer to.
//! A linker may reject an artifact; the form then stays interpreted.

use crate::codegen::exec;
use crate::form::{FormRef, NamedFunction};
use crate::handle::CallHandle;
use derive_more::From;
use mh_bytecode::{decode_function, verify_function, BytecodeFunction, PatchKind};
use mh_core::{debug, ClassRef, Error, Result, Value};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// A runtime object an artifact refers to by index.
#[derive(Clone, From)]
pub enum Patch {
    Value(Value),
    Class(ClassRef),
    Handle(CallHandle),
    Function(NamedFunction),
    Form(FormRef),
}

impl Patch {
    pub fn kind(&self) -> PatchKind {
        match self {
            Patch::Value(_) => PatchKind::Value,
            Patch::Class(_) => PatchKind::Class,
            Patch::Handle(_) => PatchKind::Handle,
            Patch::Function(_) => PatchKind::Function,
            Patch::Form(_) => PatchKind::Form,
        }
    }
}

impl Debug for Patch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Patch::Value(value) => write!(f, "{:?}", value),
            Patch::Class(class) => write!(f, "{}", class.name()),
            Patch::Handle(handle) => write!(f, "{:?}", handle),
            Patch::Function(function) => write!(f, "{}", function),
            Patch::Form(form) => write!(f, "{}", form.debug_name()),
        }
    }
}

pub struct LinkedExecutable {
    function: BytecodeFunction,
    patches: Box<[Patch]>,
}

/// A linked artifact ready to run.
#[derive(Clone)]
pub struct ExecutableRef(Arc<LinkedExecutable>);

impl ExecutableRef {
    pub fn new(function: BytecodeFunction, patches: Vec<Patch>) -> Self {
        ExecutableRef(Arc::new(LinkedExecutable {
            function,
            patches: patches.into_boxed_slice(),
        }))
    }

    pub fn function(&self) -> &BytecodeFunction {
        &self.0.function
    }

    pub fn patches(&self) -> &[Patch] {
        &self.0.patches
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value> {
        exec::execute(&self.0.function, &self.0.patches, args)
    }
}

impl Debug for ExecutableRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Executable({})", self.0.function.name)
    }
}

/// Defines compiled artifacts in the host.
pub trait ExecutableLinker: Send + Sync {
    /// Links an encoded artifact with its patch values. Failures are
    /// reported as [`Error::Linkage`].
    fn define_and_link(&self, bytes: &[u8], patches: Vec<Patch>) -> Result<ExecutableRef>;

    fn invoke_native(&self, executable: &ExecutableRef, args: &[Value]) -> Result<Value> {
        executable.invoke(args)
    }
}

/// Decodes and verifies artifacts and runs them on the built-in stack
/// machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytecodeLinker;

impl ExecutableLinker for BytecodeLinker {
    fn define_and_link(&self, bytes: &[u8], patches: Vec<Patch>) -> Result<ExecutableRef> {
        let function = decode_function(bytes).map_err(|err| Error::Linkage(err.to_string()))?;
        verify_function(&function).map_err(|err| Error::Linkage(err.to_string()))?;
        if function.patch_kinds.len() != patches.len() {
            return Err(Error::Linkage(format!(
                "{} declares {} patches, {} supplied",
                function.name,
                function.patch_kinds.len(),
                patches.len()
            )));
        }
        for (index, (declared, patch)) in function.patch_kinds.iter().zip(&patches).enumerate() {
            if *declared != patch.kind() {
                return Err(Error::Linkage(format!(
                    "{} patch {} is {:?}, supplied {:?}",
                    function.name, index, declared, patch
                )));
            }
        }
        debug!(
            "linked {} ({} bytes, {} patches)",
            function.name,
            bytes.len(),
            patches.len()
        );
        Ok(ExecutableRef::new(function, patches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mh_bytecode::{encode_function, Instr};

    fn returns_patch() -> BytecodeFunction {
        BytecodeFunction {
            name: "patched".to_string(),
            signature: "L_L".to_string(),
            params: 1,
            locals: 1,
            max_stack: 1,
            code: vec![Instr::LoadPatch(0), Instr::Return],
            const_pool: vec![],
            patch_kinds: vec![PatchKind::Value],
            handlers: vec![],
        }
    }

    #[test]
    fn links_and_runs_with_patches() {
        let bytes = encode_function(&returns_patch()).unwrap();
        let executable = BytecodeLinker
            .define_and_link(&bytes, vec![Value::Int(3).into()])
            .unwrap();
        assert_eq!(executable.invoke(&[Value::Null]).unwrap(), Value::Int(3));
    }

    #[test]
    fn rejects_bad_artifacts_and_patches() {
        assert!(matches!(
            BytecodeLinker.define_and_link(b"nope", vec![]),
            Err(Error::Linkage(_))
        ));
        let bytes = encode_function(&returns_patch()).unwrap();
        assert!(matches!(
            BytecodeLinker.define_and_link(&bytes, vec![]),
            Err(Error::Linkage(_))
        ));
        let class: Patch = mh_core::classes::object().clone().into();
        assert!(matches!(
            BytecodeLinker.define_and_link(&bytes, vec![class]),
            Err(Error::Linkage(_))
        ));
    }
}
