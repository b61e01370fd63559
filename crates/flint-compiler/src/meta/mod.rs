//! Metadata model and the program-image reader seam.
//!
//! The compiler never touches metadata tables directly; everything comes
//! through the [`ImageReader`] trait. Any implementation that can parse the
//! standard managed metadata tables is acceptable.

mod reader;
mod resolver;
mod sig;
pub mod well_known;

pub use reader::{
    FieldInfo, ImageReader, MethodAttrs, MethodBody, MethodInfo, SrcFieldId, SrcMethodId, SrcRef,
    SrcTypeId, TypeAttrs, TypeInfo,
};
pub(crate) use reader::{find_method_by_name, has_static_fields};
pub use resolver::{method_context, resolve_operand};
pub use sig::{sig_matches, type_sig_matches, GenericContext, Signature, TypeSig};
