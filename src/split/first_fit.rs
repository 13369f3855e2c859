use crate::codec::RecordId;
use crate::node::Node;

use super::group_overhead;

/// Greedy packing in document order.
///
/// A child starts a new run when adding it would bring the group to the
/// page capacity or beyond. The first child of a run is always accepted, so
/// an oversized child ends up alone.
pub fn pack<I: RecordId>(
    children: Vec<Node<I>>,
    sizes: &[usize],
    capacity: usize,
) -> Vec<Vec<Node<I>>> {
    let base = group_overhead::<I>();
    let mut runs = Vec::new();
    let mut current = Vec::new();
    let mut current_size = base;

    for (child, &size) in children.into_iter().zip(sizes) {
        if !current.is_empty() && current_size + size >= capacity {
            runs.push(std::mem::take(&mut current));
            current_size = base;
        }
        current_size += size;
        current.push(child);
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}
