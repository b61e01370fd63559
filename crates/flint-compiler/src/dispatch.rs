//! Virtual-dispatch override resolution.
//!
//! For a concrete method, computes the base-class and interface methods it
//! stands in for. The type's explicit interface map is authoritative:
//! where it mentions an interface method, name-based matching must not run
//! for that method, even when the mapped implementation is something else.

use indexmap::IndexSet;

use crate::meta::{sig_matches, ImageReader, MethodInfo, SrcMethodId, SrcTypeId};

/// Methods `method` (declared on `ty`) overrides or implements.
///
/// Interfaces in `suppressed` contribute no override obligation.
pub fn overrides_of(
    reader: &dyn ImageReader,
    ty: SrcTypeId,
    method: SrcMethodId,
    suppressed: &IndexSet<SrcTypeId>,
) -> Vec<SrcMethodId> {
    let info = reader.method_info(method);
    // A static method never dispatches virtually.
    if info.attrs.is_static {
        return Vec::new();
    }

    let mut overridden = Vec::new();
    let type_info = reader.type_info(ty);

    // Explicit interface map first. Entries are authoritative even when
    // the names differ.
    let mut mapped: IndexSet<SrcMethodId> = IndexSet::new();
    for &(iface_method, impl_method) in &type_info.interface_map {
        mapped.insert(iface_method);
        if impl_method != method {
            continue;
        }
        let iface = reader.method_info(iface_method).declaring;
        if suppressed.contains(&iface) {
            continue;
        }
        overridden.push(iface_method);
    }

    // Base chain: classic name-and-signature overriding.
    if !info.attrs.is_newslot && !info.attrs.is_private {
        let mut current = type_info.base;
        while let Some(base) = current {
            for &candidate in &reader.type_info(base).methods {
                let cand = reader.method_info(candidate);
                if cand.name != info.name {
                    continue;
                }
                if !(cand.attrs.is_virtual || cand.attrs.is_abstract) || cand.attrs.is_private {
                    continue;
                }
                if matches(reader, info, cand) {
                    overridden.push(candidate);
                }
            }
            current = reader.type_info(base).base;
        }
    }

    // Interface methods the map did not claim, matched by name.
    for &iface in &type_info.interfaces {
        if suppressed.contains(&iface) {
            continue;
        }
        for &iface_method in &reader.type_info(iface).methods {
            if mapped.contains(&iface_method) {
                continue;
            }
            let cand = reader.method_info(iface_method);
            if cand.name == info.name && matches(reader, info, cand) {
                overridden.push(iface_method);
            }
        }
    }

    overridden
}

/// Parameter signatures equal, or operator methods sharing a name.
fn matches(reader: &dyn ImageReader, a: &MethodInfo, b: &MethodInfo) -> bool {
    if a.is_operator() && b.is_operator() {
        return true;
    }
    sig_matches(reader, &a.sig, &b.sig)
}
