//! Raw-token resolution under generic context.
//!
//! Bytecode operands are opaque 32-bit values until resolved against the
//! metadata, carrying the generic arguments of the method being scanned.
//! Resolution never fails hard: the rewriter probes operands that may not
//! be tokens at all.

use super::reader::{ImageReader, SrcMethodId, SrcRef};
use super::sig::GenericContext;

/// Build the generic context in force inside `method`'s body: the
/// declaring type's bound arguments plus the method's own.
///
/// Open definitions carry no bound arguments, so their parameters survive
/// [`GenericContext::instantiate`] unchanged and classify as unresolvable
/// downstream, which is the documented behavior for generic definitions.
pub fn method_context(reader: &dyn ImageReader, method: SrcMethodId) -> GenericContext {
    let info = reader.method_info(method);
    GenericContext {
        type_args: reader.type_generic_args(info.declaring).to_vec(),
        method_args: reader.method_generic_args(method).to_vec(),
    }
}

/// Resolve one raw operand. `None` means "not a token", which the caller
/// tolerates except where the instruction form requires one.
pub fn resolve_operand(
    reader: &dyn ImageReader,
    ctx: &GenericContext,
    raw: u32,
) -> Option<SrcRef> {
    reader.resolve(raw, ctx)
}
