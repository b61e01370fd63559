//! Compile-phase error taxonomy.
//!
//! The pipeline fails fast on the first fatal condition. Non-fatal
//! conditions (a missing body that is never invoked, an ambiguous field
//! name on a replacement type) are logged, not raised.

use flint_image::Token;

/// Errors that abort a compile.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompileError {
    /// A token-required instruction operand resolved to nothing.
    #[error("unresolved reference 0x{raw:08x} in {method}")]
    UnresolvedReference { method: String, raw: u32 },

    /// A substitute names a member that does not exist in the target.
    #[error("substitute {substitute} has no match for {member} in {target}")]
    MissingReplacementTarget {
        substitute: String,
        target: String,
        member: String,
    },

    /// A concrete method with no bytecode was actually invoked.
    #[error("no implementation for invoked method {method}")]
    MissingImplementation { method: String },

    /// Bytecode beyond what a method declaration can carry.
    #[error("method {method} body is {size} bytes (limit {limit})")]
    OversizedMethod {
        method: String,
        size: usize,
        limit: usize,
    },

    /// Entry method is not a valid program entry.
    #[error("bad entry point {method}: {reason}")]
    BadEntryPoint { method: String, reason: String },

    /// An instruction whose operand form the rewriter does not handle.
    #[error("unsupported instruction `{mnemonic}` in {method}")]
    UnsupportedOpcode { method: String, mnemonic: &'static str },

    /// An undefined opcode byte. Distinct from the named rejected subset.
    #[error("undefined opcode 0x{opcode:02x} at offset {offset} in {method}")]
    UndefinedOpcode {
        method: String,
        opcode: u8,
        offset: usize,
    },

    /// A caller expected a method token that was never assigned.
    #[error("no token assigned for {what}")]
    TokenNotAssigned { what: String },

    /// Inverse lookup of a token that names nothing in the set.
    #[error("token {0} not present in execution set")]
    UnknownToken(Token),

    /// A generic reference could not be classified without its context.
    #[error("unbound generic parameter in {context}")]
    UnboundGeneric { context: String },

    /// A slot whose type cannot occupy storage (void, open generic).
    #[error("cannot lay out {what}")]
    Unsizeable { what: String },

    /// Device failure while the image was being streamed.
    #[error("device error during upload: {0}")]
    Device(String),
}

pub type Result<T> = std::result::Result<T, CompileError>;
