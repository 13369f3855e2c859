use crate::codec::RecordId;
use crate::node::Node;

use super::group_overhead;

/// Recursive bisection.
///
/// A run that does not fit is cut where the left part first reaches
/// `ratio` times the size of the right part; both halves are packed again.
/// With `ratio = 1.0` runs are cut into halves by size.
pub fn pack<I: RecordId>(
    children: Vec<Node<I>>,
    sizes: &[usize],
    capacity: usize,
    ratio: f64,
) -> Vec<Vec<Node<I>>> {
    let mut runs = Vec::new();
    bisect(children, sizes, capacity, ratio, &mut runs);
    runs
}

fn bisect<I: RecordId>(
    mut children: Vec<Node<I>>,
    sizes: &[usize],
    capacity: usize,
    ratio: f64,
    runs: &mut Vec<Vec<Node<I>>>,
) {
    let total: usize = sizes.iter().sum();
    if children.len() <= 1 || group_overhead::<I>() + total < capacity {
        if !children.is_empty() {
            runs.push(children);
        }
        return;
    }

    let mut left = 0usize;
    let mut cut = 1;
    for (i, size) in sizes.iter().enumerate() {
        left += size;
        cut = i + 1;
        if left as f64 >= ratio * (total - left) as f64 {
            break;
        }
    }
    let cut = cut.clamp(1, children.len() - 1);

    let right = children.split_off(cut);
    bisect(children, &sizes[..cut], capacity, ratio, runs);
    bisect(right, &sizes[cut..], capacity, ratio, runs);
}
