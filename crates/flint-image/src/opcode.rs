//! Operand-form table for the stack-machine instruction set.
//!
//! Each opcode maps to exactly one operand form; the rewriter advances
//! through a method body using nothing else. Two-byte opcodes are reached
//! through the [`PREFIX`] sentinel. A small named subset of forms is
//! rejected outright rather than coerced (tail-call plumbing, unmanaged
//! block ops, typed references); the device engine has no counterpart for
//! them.

/// First byte of every two-byte opcode.
pub const PREFIX: u8 = 0xFE;

/// Immediate-operand forms.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum OperandForm {
    /// No operand.
    None,
    /// 1-byte signed immediate.
    ShortI,
    /// 1-byte local/argument index.
    ShortVar,
    /// 1-byte branch displacement.
    ShortBranch,
    /// 2-byte local/argument index.
    Var,
    /// 4-byte immediate.
    I4,
    /// 8-byte immediate.
    I8,
    /// 4-byte float immediate.
    R4,
    /// 8-byte float immediate.
    R8,
    /// 4-byte branch displacement.
    Branch,
    /// 4-byte string-literal token.
    StringTok,
    /// 4-byte method token.
    MethodTok,
    /// 4-byte field token.
    FieldTok,
    /// 4-byte type token.
    TypeTok,
    /// 4-byte token of any kind (ldtoken).
    AnyTok,
    /// 4-byte standalone-signature token. Rejected.
    Signature,
    /// Count-prefixed jump table, 4 + 4*n bytes.
    Switch,
}

impl OperandForm {
    /// Fixed operand length in bytes; `None` for [`OperandForm::Switch`],
    /// whose length depends on the count word.
    pub fn fixed_len(self) -> Option<usize> {
        match self {
            Self::None => Some(0),
            Self::ShortI | Self::ShortVar | Self::ShortBranch => Some(1),
            Self::Var => Some(2),
            Self::I4 | Self::R4 | Self::Branch | Self::StringTok | Self::MethodTok
            | Self::FieldTok | Self::TypeTok | Self::AnyTok | Self::Signature => Some(4),
            Self::I8 | Self::R8 => Some(8),
            Self::Switch => None,
        }
    }

    /// Whether the operand is a metadata token the rewriter must patch.
    pub fn bears_token(self) -> bool {
        matches!(
            self,
            Self::StringTok | Self::MethodTok | Self::FieldTok | Self::TypeTok | Self::AnyTok
        )
    }
}

/// Operand form of a one-byte opcode. `None` for undefined encodings and
/// for [`PREFIX`] itself.
pub fn operand_form(op: u8) -> Option<OperandForm> {
    use OperandForm::*;
    let form = match op {
        // nop, break, ldarg.0-3, ldloc.0-3, stloc.0-3
        0x00..=0x0D => None,
        // ldarg.s, ldarga.s, starg.s, ldloc.s, ldloca.s, stloc.s
        0x0E..=0x13 => ShortVar,
        // ldnull, ldc.i4.m1, ldc.i4.0-8
        0x14..=0x1E => None,
        0x1F => ShortI,  // ldc.i4.s
        0x20 => I4,      // ldc.i4
        0x21 => I8,      // ldc.i8
        0x22 => R4,      // ldc.r4
        0x23 => R8,      // ldc.r8
        0x25..=0x26 => None, // dup, pop
        0x27 => MethodTok,   // jmp (rejected downstream)
        0x28 => MethodTok,   // call
        0x29 => Signature,   // calli (rejected)
        0x2A => None,        // ret
        // br.s .. blt.un.s
        0x2B..=0x37 => ShortBranch,
        // br .. blt.un
        0x38..=0x44 => Branch,
        0x45 => Switch,
        // ldind.* / stind.*
        0x46..=0x57 => None,
        // add .. conv.u8 arithmetic/conversion block
        0x58..=0x6E => None,
        0x6F => MethodTok, // callvirt
        0x70 => TypeTok,   // cpobj
        0x71 => TypeTok,   // ldobj
        0x72 => StringTok, // ldstr
        0x73 => MethodTok, // newobj
        0x74 => TypeTok,   // castclass
        0x75 => TypeTok,   // isinst
        0x76 => None,      // conv.r.un
        0x79 => TypeTok,   // unbox
        0x7A => None,      // throw
        0x7B..=0x7D => FieldTok, // ldfld, ldflda, stfld
        0x7E..=0x80 => FieldTok, // ldsfld, ldsflda, stsfld
        0x81 => TypeTok,   // stobj
        // conv.ovf.*.un
        0x82..=0x8B => None,
        0x8C => TypeTok, // box
        0x8D => TypeTok, // newarr
        0x8E => None,    // ldlen
        0x8F => TypeTok, // ldelema
        // ldelem.i1 .. ldelem.ref
        0x90..=0x9A => None,
        // stelem.i .. stelem.ref
        0x9B..=0xA2 => None,
        0xA3 => TypeTok, // ldelem
        0xA4 => TypeTok, // stelem
        0xA5 => TypeTok, // unbox.any
        // conv.ovf.* signed block
        0xB3..=0xBA => None,
        0xC2 => TypeTok, // refanyval (rejected)
        0xC3 => None,    // ckfinite
        0xC6 => TypeTok, // mkrefany (rejected)
        0xD0 => AnyTok,  // ldtoken
        // conv.u2 .. conv.ovf.u, add.ovf .. sub.ovf.un, endfinally
        0xD1..=0xDC => None,
        0xDD => Branch,      // leave
        0xDE => ShortBranch, // leave.s
        0xDF => None,        // stind.i
        0xE0 => None,        // conv.u
        _ => return Option::None,
    };
    Some(form)
}

/// Operand form of the second byte of a two-byte opcode.
pub fn extended_form(op: u8) -> Option<OperandForm> {
    use OperandForm::*;
    let form = match op {
        0x00 => None, // arglist (rejected)
        // ceq, cgt, cgt.un, clt, clt.un
        0x01..=0x05 => None,
        0x06 => MethodTok, // ldftn
        0x07 => MethodTok, // ldvirtftn
        // ldarg, ldarga, starg, ldloc, ldloca, stloc
        0x09..=0x0E => Var,
        0x0F => None,   // localloc (rejected)
        0x11 => None,   // endfilter
        0x12 => ShortI, // unaligned. (rejected)
        0x13 => None,   // volatile.
        0x14 => None,   // tail. (rejected)
        0x15 => TypeTok, // initobj
        0x16 => TypeTok, // constrained.
        0x17 => None,   // cpblk (rejected)
        0x18 => None,   // initblk (rejected)
        0x19 => ShortI, // no. (rejected)
        0x1A => None,   // rethrow
        0x1C => TypeTok, // sizeof
        0x1D => None,   // refanytype (rejected)
        0x1E => None,   // readonly.
        _ => return Option::None,
    };
    Some(form)
}

/// If the opcode belongs to the rejected subset, its mnemonic; otherwise
/// `None`. `extended` selects the two-byte page.
pub fn rejected_name(op: u8, extended: bool) -> Option<&'static str> {
    if extended {
        match op {
            0x00 => Some("arglist"),
            0x0F => Some("localloc"),
            0x12 => Some("unaligned."),
            0x14 => Some("tail."),
            0x17 => Some("cpblk"),
            0x18 => Some("initblk"),
            0x19 => Some("no."),
            0x1D => Some("refanytype"),
            _ => None,
        }
    } else {
        match op {
            0x27 => Some("jmp"),
            0x29 => Some("calli"),
            0xC2 => Some("refanyval"),
            0xC6 => Some("mkrefany"),
            _ => None,
        }
    }
}
