//! Static-initializer sequencing.
//!
//! The comparator is a heuristic over declared dependencies and calls; it
//! is not proven acyclic, so a curated override list is applied after the
//! sort. Pulling new platform types into a program can require extending
//! the overrides; they are settings, not constants.

use indexmap::IndexSet;
use tracing::debug;

use crate::meta::well_known;
use crate::meta::{ImageReader, SrcMethodId, SrcTypeId};
use crate::settings::SequencerOverrides;

/// One type initializer awaiting its slot in the boot sequence.
#[derive(Clone, Debug)]
pub struct InitRecord {
    pub ty: SrcTypeId,
    pub method: SrcMethodId,
    pub full_name: String,
    /// Types this initializer declares a dependency on.
    pub dependencies: Vec<SrcTypeId>,
    /// Methods the initializer body calls.
    pub calls: IndexSet<SrcMethodId>,
}

/// Pairwise ordering: `Before` means x runs before y.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Order {
    Before,
    After,
    Tie,
}

fn compare(reader: &dyn ImageReader, x: &InitRecord, y: &InitRecord) -> Order {
    if x.ty == y.ty {
        return Order::Tie;
    }
    if depends_on(reader, x, y) {
        return Order::After;
    }
    if depends_on(reader, y, x) {
        return Order::Before;
    }
    // Equality comparers are common leaf dependencies.
    let x_cmp = x.full_name.contains("EqualityComparer");
    let y_cmp = y.full_name.contains("EqualityComparer");
    if x_cmp != y_cmp {
        return if x_cmp { Order::Before } else { Order::After };
    }
    let x_sys = x.full_name.starts_with(well_known::PLATFORM_NAMESPACE);
    let y_sys = y.full_name.starts_with(well_known::PLATFORM_NAMESPACE);
    if x_sys != y_sys {
        return if x_sys { Order::Before } else { Order::After };
    }
    Order::Tie
}

/// Whether x's initializer needs y's to have run: y's type is in x's
/// dependency list, or x calls a method declared on y's type.
fn depends_on(reader: &dyn ImageReader, x: &InitRecord, y: &InitRecord) -> bool {
    if x.dependencies.contains(&y.ty) {
        return true;
    }
    x.calls
        .iter()
        .any(|&m| reader.method_info(m).declaring == y.ty)
}

/// Order the initializers: heuristic pairwise sort, then the curated
/// overrides.
pub fn sequence(
    reader: &dyn ImageReader,
    mut records: Vec<InitRecord>,
    overrides: &SequencerOverrides,
) -> Vec<InitRecord> {
    // The comparator is not a total order, so std's sort (which requires
    // one) is off the table. Insertion sort honors the pairwise relation
    // and is stable; initializer counts are small.
    let mut ordered: Vec<InitRecord> = Vec::with_capacity(records.len());
    for record in records.drain(..) {
        let mut at = ordered.len();
        for (i, placed) in ordered.iter().enumerate() {
            if compare(reader, &record, placed) == Order::Before {
                at = i;
                break;
            }
        }
        ordered.insert(at, record);
    }

    // Bring-to-front: each named type pushed to index 0 in declared order,
    // so the last entry wins the very first slot.
    for name in &overrides.bring_to_front {
        if let Some(i) = ordered.iter().position(|r| &r.full_name == name) {
            let record = ordered.remove(i);
            ordered.insert(0, record);
        }
    }
    for name in &overrides.send_to_back {
        if let Some(i) = ordered.iter().position(|r| &r.full_name == name) {
            let record = ordered.remove(i);
            ordered.push(record);
        }
    }

    debug!(
        order = ?ordered.iter().map(|r| r.full_name.as_str()).collect::<Vec<_>>(),
        "initializer sequence"
    );
    ordered
}
