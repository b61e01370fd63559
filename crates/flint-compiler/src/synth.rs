//! Compiler-emitted method bodies.
//!
//! Delegate constructors, delegate invocation thunks, and the startup stub
//! have no source implementation. Their bodies are emitted directly in
//! image tokens and bypass the rewriter.

use flint_image::{MethodFlags, Token};

/// Opcode bytes used by the generators.
mod op {
    pub const LDARG_0: u8 = 0x02;
    pub const LDARG_1: u8 = 0x03;
    pub const LDARG_2: u8 = 0x04;
    pub const LDARG_3: u8 = 0x05;
    pub const LDARG_S: u8 = 0x0E;
    pub const LDC_I4_0: u8 = 0x16;
    pub const POP: u8 = 0x26;
    pub const CALL: u8 = 0x28;
    pub const CALLI: u8 = 0x29;
    pub const RET: u8 = 0x2A;
    pub const LDFLD: u8 = 0x7B;
    pub const NEWARR: u8 = 0x8D;
}

fn emit_call(code: &mut Vec<u8>, target: Token) {
    code.push(op::CALL);
    code.extend_from_slice(&target.as_u32().to_le_bytes());
}

fn emit_ldfld(code: &mut Vec<u8>, field: Token) {
    code.push(op::LDFLD);
    code.extend_from_slice(&field.as_u32().to_le_bytes());
}

fn emit_ldarg(code: &mut Vec<u8>, index: u8) {
    match index {
        0 => code.push(op::LDARG_0),
        1 => code.push(op::LDARG_1),
        2 => code.push(op::LDARG_2),
        3 => code.push(op::LDARG_3),
        n => {
            code.push(op::LDARG_S);
            code.push(n);
        }
    }
}

/// Delegate constructor: forward (this, target, pointer) to the canonical
/// closed-static binding helper on the delegate base.
pub fn delegate_ctor(helper: Token) -> Vec<u8> {
    let mut code = Vec::with_capacity(9);
    emit_ldarg(&mut code, 0);
    emit_ldarg(&mut code, 1);
    emit_ldarg(&mut code, 2);
    emit_call(&mut code, helper);
    code.push(op::RET);
    code
}

/// Delegate invocation thunk: push the stored target object, the user
/// arguments, then the stored method pointer, and call through it.
///
/// The indirect call carries a zeroed signature operand; the device engine
/// takes the callee from the evaluation stack and ignores the operand.
pub fn delegate_invoke(target_field: Token, pointer_field: Token, arg_count: u8) -> Vec<u8> {
    let mut code = Vec::new();
    emit_ldarg(&mut code, 0);
    emit_ldfld(&mut code, target_field);
    for i in 0..arg_count {
        emit_ldarg(&mut code, i + 1);
    }
    emit_ldarg(&mut code, 0);
    emit_ldfld(&mut code, pointer_field);
    code.push(op::CALLI);
    code.extend_from_slice(&[0, 0, 0, 0]);
    code.push(op::RET);
    code
}

/// Flags of a synthesized delegate invoke: dispatched virtually, void when
/// the delegate's return is void.
pub fn delegate_invoke_flags(returns_void: bool) -> MethodFlags {
    MethodFlags {
        is_virtual: true,
        returns_void,
        is_synthesized: true,
        ..Default::default()
    }
}

/// The image's unique entry: run every initializer in sequence order, then
/// hand control to the user entry.
pub struct StartupStub {
    pub initializers: Vec<Token>,
    pub user_entry: Token,
    /// The user entry takes a string-array argument.
    pub entry_takes_args: bool,
    /// Token of the string carrier type, for constructing the empty
    /// argument array.
    pub string_type: Token,
    /// The user entry returns a value that must be discarded.
    pub entry_returns_value: bool,
}

impl StartupStub {
    pub fn emit(&self) -> Vec<u8> {
        let mut code = Vec::new();
        for &init in &self.initializers {
            emit_call(&mut code, init);
        }
        if self.entry_takes_args {
            code.push(op::LDC_I4_0);
            code.push(op::NEWARR);
            code.extend_from_slice(&self.string_type.as_u32().to_le_bytes());
        }
        emit_call(&mut code, self.user_entry);
        if self.entry_returns_value {
            code.push(op::POP);
        }
        code.push(op::RET);
        code
    }

    pub fn flags() -> MethodFlags {
        MethodFlags {
            is_static: true,
            returns_void: true,
            is_synthesized: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flint_image::TokenKind;

    fn tok(kind: TokenKind, index: u32) -> Token {
        Token::new(kind, index)
    }

    #[test]
    fn delegate_ctor_shape() {
        let helper = tok(TokenKind::Method, 3);
        let code = delegate_ctor(helper);
        assert_eq!(code[0..3], [op::LDARG_0, op::LDARG_1, op::LDARG_2]);
        assert_eq!(code[3], op::CALL);
        assert_eq!(
            u32::from_le_bytes(code[4..8].try_into().unwrap()),
            helper.as_u32()
        );
        assert_eq!(*code.last().unwrap(), op::RET);
    }

    #[test]
    fn delegate_invoke_loads_target_then_args_then_pointer() {
        let target = tok(TokenKind::Field, 0);
        let pointer = tok(TokenKind::Field, 1);
        let code = delegate_invoke(target, pointer, 2);
        assert_eq!(code[0], op::LDARG_0);
        assert_eq!(code[1], op::LDFLD);
        // two user arguments follow the stored target
        assert_eq!(code[6], op::LDARG_1);
        assert_eq!(code[7], op::LDARG_2);
        assert_eq!(code[8], op::LDARG_0);
        assert_eq!(code[9], op::LDFLD);
        assert_eq!(code[14], op::CALLI);
        assert_eq!(*code.last().unwrap(), op::RET);
    }

    #[test]
    fn startup_stub_calls_initializers_in_order() {
        let stub = StartupStub {
            initializers: vec![tok(TokenKind::Method, 1), tok(TokenKind::Method, 2)],
            user_entry: tok(TokenKind::Method, 0),
            entry_takes_args: false,
            string_type: tok(TokenKind::Type, 0),
            entry_returns_value: true,
        };
        let code = stub.emit();
        assert_eq!(code[0], op::CALL);
        assert_eq!(
            u32::from_le_bytes(code[1..5].try_into().unwrap()),
            tok(TokenKind::Method, 1).as_u32()
        );
        assert_eq!(code[5], op::CALL);
        // user entry call, then pop of the return value, then ret
        assert_eq!(code[10], op::CALL);
        assert_eq!(code[15], op::POP);
        assert_eq!(code[16], op::RET);
    }

    #[test]
    fn startup_stub_builds_empty_args_array() {
        let stub = StartupStub {
            initializers: vec![],
            user_entry: tok(TokenKind::Method, 0),
            entry_takes_args: true,
            string_type: tok(TokenKind::Type, 4),
            entry_returns_value: false,
        };
        let code = stub.emit();
        assert_eq!(code[0], op::LDC_I4_0);
        assert_eq!(code[1], op::NEWARR);
        assert_eq!(
            u32::from_le_bytes(code[2..6].try_into().unwrap()),
            tok(TokenKind::Type, 4).as_u32()
        );
    }
}
