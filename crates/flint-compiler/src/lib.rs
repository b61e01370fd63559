//! Flint compiler: bytecode-to-image compilation pipeline.
//!
//! This crate turns a program expressed as stack-machine bytecode into a
//! self-contained device image:
//! - `meta` - metadata model and the program-image reader seam
//! - `replace` - platform-type substitution registry
//! - `tokens` - flat token allocation with inverse lookup
//! - `rewrite` - linear bytecode parsing and token patching
//! - `layout` - slot classification, instance/static sizing
//! - `dispatch` - virtual-dispatch override resolution
//! - `walk` - entry-rooted dependency discovery
//! - `synth` - compiler-emitted method bodies
//! - `init_order` - static-initializer sequencing
//! - `set` - the execution set, finalization, snapshots
//! - `dump` - human-readable rendering of a finalized set

pub mod dispatch;
pub mod dump;
pub mod error;
pub mod init_order;
pub mod layout;
pub mod meta;
pub mod replace;
pub mod rewrite;
pub mod set;
pub mod settings;
pub mod synth;
pub mod tokens;
pub mod walk;

#[cfg(any(test, feature = "fixtures"))]
pub mod test_utils;

#[cfg(test)]
mod layout_tests;
#[cfg(test)]
mod replace_tests;
#[cfg(test)]
mod walk_tests;

pub use error::{CompileError, Result};
pub use meta::{
    FieldInfo, GenericContext, ImageReader, MethodAttrs, MethodBody, MethodInfo, Signature,
    SrcFieldId, SrcMethodId, SrcRef, SrcTypeId, TypeAttrs, TypeInfo, TypeSig,
};
pub use replace::ReplacementRegistry;
pub use set::{ExecutionSet, Snapshot};
pub use settings::CompileSettings;
pub use tokens::TokenAllocator;
pub use walk::DependencyWalker;
