//! Structural verification of a [`BytecodeFunction`].
//!
//! Checks operand bounds (locals, constants, patches, jump targets, handler
//! ranges) and runs a stack-depth dataflow over the code: every reachable
//! instruction must be entered with one consistent depth, never underflow,
//! never exceed `max_stack`, and control must not fall off the end.

use crate::{BytecodeFunction, Instr};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{function}@{pc}: {message}")]
pub struct VerifyError {
    pub function: String,
    pub pc: usize,
    pub message: String,
}

struct Verifier<'a> {
    function: &'a BytecodeFunction,
}

impl<'a> Verifier<'a> {
    fn error(&self, pc: usize, message: impl Into<String>) -> VerifyError {
        VerifyError {
            function: self.function.name.clone(),
            pc,
            message: message.into(),
        }
    }

    fn check_operands(&self, pc: usize, instr: &Instr) -> Result<(), VerifyError> {
        let function = self.function;
        match instr {
            Instr::LoadLocal(local) | Instr::StoreLocal(local) => {
                if *local >= function.locals {
                    return Err(self.error(pc, format!("local {} out of bounds", local)));
                }
            }
            Instr::LoadConst(id) => {
                if (*id as usize) >= function.const_pool.len() {
                    return Err(self.error(pc, format!("const id {} out of bounds", id)));
                }
            }
            _ => {}
        }
        if let Some((patch, expected)) = instr.patch_operand() {
            let declared = function
                .patch_kinds
                .get(patch as usize)
                .ok_or_else(|| self.error(pc, format!("patch {} out of bounds", patch)))?;
            if let Some(expected) = expected {
                if *declared != expected {
                    return Err(self.error(
                        pc,
                        format!("patch {} is {:?}, expected {:?}", patch, declared, expected),
                    ));
                }
            }
        }
        if let Some(target) = instr.branch_target() {
            if (target as usize) >= function.code.len() {
                return Err(self.error(pc, format!("jump target {} out of bounds", target)));
            }
        }
        Ok(())
    }

    fn run(&self) -> Result<(), VerifyError> {
        let function = self.function;
        if function.params > function.locals {
            return Err(self.error(
                0,
                format!(
                    "{} params but only {} locals",
                    function.params, function.locals
                ),
            ));
        }
        if function.code.is_empty() {
            return Err(self.error(0, "empty code"));
        }
        let len = function.code.len() as u32;
        for handler in &function.handlers {
            if handler.start >= handler.end || handler.end > len || handler.handler >= len {
                return Err(self.error(
                    handler.handler as usize,
                    format!(
                        "bad handler range {}..{} -> {}",
                        handler.start, handler.end, handler.handler
                    ),
                ));
            }
        }
        for (pc, instr) in function.code.iter().enumerate() {
            self.check_operands(pc, instr)?;
        }

        let mut depth_at: Vec<Option<u32>> = vec![None; function.code.len()];
        let mut worklist = vec![(0usize, 0u32)];
        for handler in &function.handlers {
            worklist.push((handler.handler as usize, 1));
        }
        while let Some((pc, depth)) = worklist.pop() {
            if pc >= function.code.len() {
                return Err(self.error(pc, "control falls off the end of the code"));
            }
            match depth_at[pc] {
                Some(seen) if seen == depth => continue,
                Some(seen) => {
                    return Err(self.error(
                        pc,
                        format!("inconsistent stack depth {} vs {}", seen, depth),
                    ))
                }
                None => depth_at[pc] = Some(depth),
            }
            let instr = &function.code[pc];
            let (pops, pushes) = instr.stack_effect();
            if pops > depth {
                return Err(self.error(
                    pc,
                    format!("stack underflow: {:?} needs {} values, has {}", instr, pops, depth),
                ));
            }
            let next = depth - pops + pushes;
            if next > function.max_stack {
                return Err(self.error(
                    pc,
                    format!("stack depth {} exceeds max_stack {}", next, function.max_stack),
                ));
            }
            if matches!(instr, Instr::Return | Instr::Throw | Instr::ReturnVoid) {
                continue;
            }
            if let Some(target) = instr.branch_target() {
                worklist.push((target as usize, next));
            }
            if !instr.is_terminator() {
                worklist.push((pc + 1, next));
            }
        }
        Ok(())
    }
}

pub fn verify_function(function: &BytecodeFunction) -> Result<(), VerifyError> {
    Verifier { function }.run()
}
