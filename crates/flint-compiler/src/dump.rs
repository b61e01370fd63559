//! Human-readable rendering of a finalized execution set.
//!
//! Output is stable across runs: everything prints in token order, which
//! is allocation order. Intended for golden-file assertions and for eyes.

use std::fmt::Write;

use crate::set::ExecutionSet;

/// Render the set as text.
pub fn dump(set: &ExecutionSet) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "== types");
    for ty in set.types_by_token() {
        let _ = writeln!(
            out,
            "{} {} instance={} static={} members={} interfaces={}",
            ty.token,
            ty.full_name,
            ty.instance_size,
            ty.static_size,
            ty.members.len(),
            ty.interfaces.len(),
        );
    }

    let _ = writeln!(out, "== methods");
    for m in set.methods_by_token() {
        let body = match (&m.code, m.native_selector) {
            (_, n) if n > 0 => format!("native:{n}"),
            (Some(code), _) => format!("{}b", code.len()),
            (None, _) => "abstract".to_owned(),
        };
        let _ = writeln!(out, "{} {} {}", m.token, m.full_name, body);
    }

    let _ = writeln!(out, "== strings");
    for (tok, s) in set.allocator().strings() {
        let _ = writeln!(out, "{} {:?}", tok, s);
    }

    let _ = writeln!(out, "== constants");
    for (tok, b) in set.allocator().blobs() {
        let _ = writeln!(out, "{} {}b", tok, b.len());
    }

    let _ = writeln!(out, "== boot");
    for init in set.initializer_order() {
        let _ = writeln!(out, "{}", init.full_name);
    }
    if let Some(startup) = set.startup_token() {
        let _ = writeln!(out, "startup {}", startup);
    }

    out
}
