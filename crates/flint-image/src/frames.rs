//! Wire frames streamed to the device.
//!
//! One frame per item, little-endian throughout. The transport that carries
//! these frames is out of scope; this module only fixes the payload layout
//! the device engine decodes.
//!
//! Order on the wire: class declarations → special-type list → constant
//! blobs → string blobs → method declarations → method bodies → image
//! header. Lifecycle commands are their own frame family.

use crate::kind::Slot;
use crate::token::Token;

/// Version of the image data layout. Bumped whenever any frame layout
/// changes; the device refuses mismatched images.
pub const DATA_VERSION: u32 = 7;

/// Length of the kernel content hash (SHA-256).
pub const KERNEL_HASH_LEN: usize = 32;

/// Class flag bits.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct ClassFlags {
    pub value_type: bool,
    pub enumeration: bool,
    pub array: bool,
}

impl ClassFlags {
    pub fn to_bits(self) -> u8 {
        (self.value_type as u8) | (self.enumeration as u8) << 1 | (self.array as u8) << 2
    }

    pub fn from_bits(bits: u8) -> Self {
        Self {
            value_type: bits & 0x1 != 0,
            enumeration: bits & 0x2 != 0,
            array: bits & 0x4 != 0,
        }
    }
}

/// Method flag bits as the device sees them.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct MethodFlags {
    pub is_static: bool,
    pub is_virtual: bool,
    pub is_ctor: bool,
    pub returns_void: bool,
    /// Body supplied by a built-in device implementation.
    pub is_native: bool,
    /// Emitted by the compiler, no source counterpart.
    pub is_synthesized: bool,
}

impl MethodFlags {
    pub fn to_bits(self) -> u16 {
        (self.is_static as u16)
            | (self.is_virtual as u16) << 1
            | (self.is_ctor as u16) << 2
            | (self.returns_void as u16) << 3
            | (self.is_native as u16) << 4
            | (self.is_synthesized as u16) << 5
    }

    pub fn from_bits(bits: u16) -> Self {
        Self {
            is_static: bits & 0x01 != 0,
            is_virtual: bits & 0x02 != 0,
            is_ctor: bits & 0x04 != 0,
            returns_void: bits & 0x08 != 0,
            is_native: bits & 0x10 != 0,
            is_synthesized: bits & 0x20 != 0,
        }
    }
}

/// One member entry in a class declaration: a field slot, a constructor,
/// or a virtual-dispatch slot with the base methods it services.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MemberEntry {
    pub slot: Slot,
    pub token: Token,
    /// For dispatch slots: tokens of the base/interface methods this member
    /// overrides. Empty for fields and constructors.
    pub base_tokens: Vec<Token>,
}

impl MemberEntry {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + 4 * self.base_tokens.len());
        out.extend_from_slice(&self.slot.to_bytes());
        out.push(self.base_tokens.len() as u8);
        out.extend_from_slice(&self.token.as_u32().to_le_bytes());
        for base in &self.base_tokens {
            out.extend_from_slice(&base.as_u32().to_le_bytes());
        }
        out
    }
}

/// Class declaration frame.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ClassDecl {
    pub token: Token,
    /// Parent type token; `None` for roots and interfaces without a base.
    pub parent: Option<Token>,
    pub instance_size: u32,
    pub static_size: u32,
    pub flags: ClassFlags,
    /// Fields first in layout order, then constructors, then dispatch slots.
    pub members: Vec<MemberEntry>,
    pub interfaces: Vec<Token>,
}

impl ClassDecl {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.token.as_u32().to_le_bytes());
        out.extend_from_slice(&self.parent.map_or(0, Token::as_u32).to_le_bytes());
        out.extend_from_slice(&self.instance_size.to_le_bytes());
        out.extend_from_slice(&self.static_size.to_le_bytes());
        out.push(self.flags.to_bits());
        out.push(self.interfaces.len() as u8);
        out.extend_from_slice(&(self.members.len() as u16).to_le_bytes());
        for iface in &self.interfaces {
            out.extend_from_slice(&iface.as_u32().to_le_bytes());
        }
        for member in &self.members {
            out.extend_from_slice(&member.to_bytes());
        }
        out
    }
}

/// Method declaration frame. The body follows in its own frame.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MethodDecl {
    pub token: Token,
    pub flags: MethodFlags,
    pub max_stack: u16,
    /// Positive selector of a built-in device implementation; 0 when the
    /// body is uploaded.
    pub native_selector: u16,
    pub locals: Vec<Slot>,
    pub args: Vec<Slot>,
}

impl MethodDecl {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.token.as_u32().to_le_bytes());
        out.extend_from_slice(&self.flags.to_bits().to_le_bytes());
        out.extend_from_slice(&self.max_stack.to_le_bytes());
        out.extend_from_slice(&self.native_selector.to_le_bytes());
        out.push(self.locals.len() as u8);
        out.push(self.args.len() as u8);
        for slot in self.locals.iter().chain(&self.args) {
            out.extend_from_slice(&slot.to_bytes());
        }
        out
    }
}

/// Ordered list of type tokens the device recognizes by position.
#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct SpecialTypeList {
    pub tokens: Vec<Token>,
}

impl SpecialTypeList {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + 4 * self.tokens.len());
        out.extend_from_slice(&(self.tokens.len() as u16).to_le_bytes());
        for tok in &self.tokens {
            out.extend_from_slice(&tok.as_u32().to_le_bytes());
        }
        out
    }
}

/// Image header, written last. 44 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ImageHeader {
    pub data_version: u32,
    pub kernel_hash: [u8; KERNEL_HASH_LEN],
    pub startup_token: Token,
    pub startup_flags: u32,
}

impl ImageHeader {
    pub const LEN: usize = 4 + KERNEL_HASH_LEN + 4 + 4;

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut bytes = [0u8; Self::LEN];
        bytes[0..4].copy_from_slice(&self.data_version.to_le_bytes());
        bytes[4..36].copy_from_slice(&self.kernel_hash);
        bytes[36..40].copy_from_slice(&self.startup_token.as_u32().to_le_bytes());
        bytes[40..44].copy_from_slice(&self.startup_flags.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::LEN {
            return None;
        }
        let mut kernel_hash = [0u8; KERNEL_HASH_LEN];
        kernel_hash.copy_from_slice(&bytes[4..36]);
        Some(Self {
            data_version: u32::from_le_bytes(bytes[0..4].try_into().ok()?),
            kernel_hash,
            startup_token: Token::from_raw(u32::from_le_bytes(bytes[36..40].try_into().ok()?))?,
            startup_flags: u32::from_le_bytes(bytes[40..44].try_into().ok()?),
        })
    }
}

/// Startup flag bits carried in the image header.
pub mod startup_flags {
    /// Launch the program from flash at boot.
    pub const LAUNCH_FROM_FLASH: u32 = 0x1;
    /// Restart the program automatically after an abort.
    pub const AUTO_RESTART: u32 = 0x2;
}

/// Lifecycle commands addressed to the execution engine.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Command {
    ResetEngine,
    ClearFlash,
    CopyToFlash,
    KillTask(Token),
    Execute {
        method: Token,
        task_id: u32,
        args: Vec<u32>,
    },
    QueryCapabilities,
    SetDebugging(bool),
    /// Mark a previously uploaded type immutable (kernel prefix).
    MarkReadOnly(Token),
}

impl Command {
    /// Command id byte, first on the wire.
    pub fn id(&self) -> u8 {
        match self {
            Self::ResetEngine => 0x01,
            Self::ClearFlash => 0x02,
            Self::CopyToFlash => 0x03,
            Self::KillTask(_) => 0x04,
            Self::Execute { .. } => 0x05,
            Self::QueryCapabilities => 0x06,
            Self::SetDebugging(_) => 0x07,
            Self::MarkReadOnly(_) => 0x08,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![self.id()];
        match self {
            Self::ResetEngine | Self::ClearFlash | Self::CopyToFlash
            | Self::QueryCapabilities => {}
            Self::KillTask(tok) | Self::MarkReadOnly(tok) => {
                out.extend_from_slice(&tok.as_u32().to_le_bytes());
            }
            Self::Execute {
                method,
                task_id,
                args,
            } => {
                out.extend_from_slice(&method.as_u32().to_le_bytes());
                out.extend_from_slice(&task_id.to_le_bytes());
                out.push(args.len() as u8);
                for arg in args {
                    out.extend_from_slice(&arg.to_le_bytes());
                }
            }
            Self::SetDebugging(on) => out.push(*on as u8),
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::{Slot, SlotKind};
    use crate::token::TokenKind;

    #[test]
    fn class_flags_roundtrip() {
        let flags = ClassFlags {
            value_type: true,
            enumeration: false,
            array: true,
        };
        assert_eq!(ClassFlags::from_bits(flags.to_bits()), flags);
    }

    #[test]
    fn method_flags_roundtrip() {
        let flags = MethodFlags {
            is_static: true,
            returns_void: true,
            is_synthesized: true,
            ..Default::default()
        };
        assert_eq!(MethodFlags::from_bits(flags.to_bits()), flags);
    }

    #[test]
    fn class_decl_layout() {
        let decl = ClassDecl {
            token: Token::new(TokenKind::Type, 2),
            parent: Some(Token::new(TokenKind::Type, 1)),
            instance_size: 12,
            static_size: 0,
            flags: ClassFlags::default(),
            members: vec![MemberEntry {
                slot: Slot::of(SlotKind::I32),
                token: Token::new(TokenKind::Field, 0),
                base_tokens: vec![],
            }],
            interfaces: vec![Token::new(TokenKind::Type, 0)],
        };
        let bytes = decl.to_bytes();
        assert_eq!(&bytes[0..4], &Token::new(TokenKind::Type, 2).as_u32().to_le_bytes());
        assert_eq!(bytes[16], 0); // flags
        assert_eq!(bytes[17], 1); // interface count
        assert_eq!(u16::from_le_bytes([bytes[18], bytes[19]]), 1); // member count
    }

    #[test]
    fn image_header_roundtrip() {
        let header = ImageHeader {
            data_version: DATA_VERSION,
            kernel_hash: [7u8; KERNEL_HASH_LEN],
            startup_token: Token::new(TokenKind::Method, 9),
            startup_flags: startup_flags::LAUNCH_FROM_FLASH,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), ImageHeader::LEN);
        assert_eq!(ImageHeader::from_bytes(&bytes), Some(header));
    }

    #[test]
    fn execute_command_encodes_args() {
        let cmd = Command::Execute {
            method: Token::new(TokenKind::Method, 1),
            task_id: 3,
            args: vec![10, 20],
        };
        let bytes = cmd.to_bytes();
        assert_eq!(bytes[0], 0x05);
        assert_eq!(bytes[9], 2); // arg count
        assert_eq!(bytes.len(), 1 + 4 + 4 + 1 + 8);
    }
}
