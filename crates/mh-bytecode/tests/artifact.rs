use mh_bytecode::{
    decode_function, encode_function, format_function, verify_function, BytecodeConst,
    BytecodeFunction, ExceptionHandler, Instr, PatchKind, UnboxMode,
};
use mh_core::PrimitiveKind;
use pretty_assertions::assert_eq;

fn guarded_divide() -> BytecodeFunction {
    BytecodeFunction {
        name: "guarded".to_string(),
        signature: "LII_I".to_string(),
        params: 3,
        locals: 4,
        max_stack: 3,
        code: vec![
            Instr::LoadPatch(0),
            Instr::LoadLocal(1),
            Instr::LoadLocal(2),
            Instr::InvokeHandle {
                argc: 2,
                returns: true,
            },
            Instr::Return,
            Instr::StoreLocal(3),
            Instr::LoadConst(0),
            Instr::Return,
        ],
        const_pool: vec![BytecodeConst::Int(0)],
        patch_kinds: vec![PatchKind::Handle],
        handlers: vec![ExceptionHandler {
            start: 0,
            end: 4,
            handler: 5,
        }],
    }
}

#[test]
fn encoded_artifacts_decode_to_the_same_function() {
    let function = guarded_divide();
    let bytes = encode_function(&function).unwrap();
    let decoded = decode_function(&bytes).unwrap();
    assert_eq!(decoded, function);
    assert_eq!(verify_function(&decoded), Ok(()));
}

#[test]
fn disassembly_lists_code_and_handlers() {
    let text = format_function(&guarded_divide());
    assert!(text.starts_with("fn guarded LII_I (params: 3, locals: 4, max_stack: 3)"));
    assert!(text.contains("   3: invoke.handle 2\n"));
    assert!(text.contains("catch 0..4 -> 5"));
    assert!(text.contains("[0] int 0"));
}

#[test]
fn conversions_keep_their_stack_shape() {
    let function = BytecodeFunction {
        name: "unbox".to_string(),
        signature: "LL_J".to_string(),
        params: 2,
        locals: 2,
        max_stack: 1,
        code: vec![
            Instr::LoadLocal(1),
            Instr::Unbox {
                kind: PrimitiveKind::Int,
                mode: UnboxMode::Widen,
            },
            Instr::PrimConvert {
                from: PrimitiveKind::Int,
                to: PrimitiveKind::Long,
            },
            Instr::Return,
        ],
        const_pool: vec![],
        patch_kinds: vec![],
        handlers: vec![],
    };
    assert_eq!(verify_function(&function), Ok(()));
    let mut too_small = function.clone();
    too_small.max_stack = 0;
    assert!(verify_function(&too_small).is_err());
}
