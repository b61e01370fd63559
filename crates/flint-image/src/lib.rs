//! Image format primitives shared by the compiler and the device driver.
//!
//! This crate contains:
//! - The flat token space (`Token`, `TokenKind`)
//! - Slot kinds with intrinsic sizes (`SlotKind`, `Slot`)
//! - The operand-form table for the stack-machine instruction set (`opcode`)
//! - Wire frame definitions streamed to the device (`frames`)

pub mod frames;
pub mod kind;
pub mod opcode;
pub mod token;

pub use frames::{
    startup_flags, ClassDecl, ClassFlags, Command, ImageHeader, MemberEntry, MethodDecl,
    MethodFlags, SpecialTypeList, DATA_VERSION, KERNEL_HASH_LEN,
};
pub use kind::{Slot, SlotKind, POINTER_WIDTH};
pub use opcode::{extended_form, operand_form, rejected_name, OperandForm, PREFIX};
pub use token::{Token, TokenKind};
