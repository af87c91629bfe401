//! Myers diff algorithm.
//!
//! Myers' algorithm finds the shortest edit script (SES) between two
//! sequences in O(ND) time, where N is the combined length and D the number of
//! differences. It is efficient when the two sides are similar, which is the
//! common case for a proposed edit of an existing file.
//!
//! The common prefix and suffix are stripped before the search. The trace kept
//! for backtracking grows with D², so scripts needing more than roughly
//! [`MAX_TRACE_CELLS`] cells fall back to replacing the differing middle
//! wholesale. The result is still a valid script, just not a minimal one.

/// Upper bound on trace cells kept for backtracking (about D = 2000).
pub const MAX_TRACE_CELLS: usize = 4_000_000;

/// A single step of an edit script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
    /// Element present on both sides.
    Keep,
    /// Element only present on the base side.
    Delete,
    /// Element only present on the target side.
    Insert,
}

/// Myers diff algorithm.
#[derive(Debug, Clone, Copy, Default)]
pub struct MyersDiff;

impl MyersDiff {
    /// Creates new instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes an edit script that turns `base` into `target`.
    ///
    /// Every element of `base` maps to exactly one `Keep` or `Delete`, every
    /// element of `target` to exactly one `Keep` or `Insert`, in order.
    #[must_use]
    pub fn edit_script<T: PartialEq>(&self, base: &[T], target: &[T]) -> Vec<EditOp> {
        compute_ses(base, target)
    }
}

pub(crate) fn compute_ses<T: PartialEq>(base: &[T], target: &[T]) -> Vec<EditOp> {
    let prefix = base
        .iter()
        .zip(target)
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = base[prefix..]
        .iter()
        .rev()
        .zip(target[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let mid_base = &base[prefix..base.len() - suffix];
    let mid_target = &target[prefix..target.len() - suffix];

    let mut edits = Vec::with_capacity(base.len() + target.len());
    edits.extend(std::iter::repeat_n(EditOp::Keep, prefix));
    edits.extend(middle_ses(mid_base, mid_target));
    edits.extend(std::iter::repeat_n(EditOp::Keep, suffix));
    edits
}

fn replace_all(n: usize, m: usize) -> Vec<EditOp> {
    let mut edits = vec![EditOp::Delete; n];
    edits.extend(std::iter::repeat_n(EditOp::Insert, m));
    edits
}

#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn middle_ses<T: PartialEq>(base: &[T], target: &[T]) -> Vec<EditOp> {
    let (n, m) = (base.len(), target.len());
    if n == 0 {
        return vec![EditOp::Insert; m];
    }
    if m == 0 {
        return vec![EditOp::Delete; n];
    }

    let max_d = (n + m) as isize;
    let offset = max_d + 1;
    let idx = |k: isize| (k + offset) as usize;
    let mut v: Vec<isize> = vec![0; 2 * (n + m) + 3];
    // trace[d] holds diagonals -(d-1)..=(d-1) as they were before round d.
    let mut trace: Vec<Vec<isize>> = Vec::new();
    let mut cells = 0usize;

    for d in 0..=max_d {
        if d > 0 {
            cells += (2 * d - 1) as usize;
            if cells > MAX_TRACE_CELLS {
                return replace_all(n, m);
            }
            trace.push(v[idx(-(d - 1))..=idx(d - 1)].to_vec());
        } else {
            trace.push(Vec::new());
        }

        let mut k = -d;
        while k <= d {
            let mut x = if k == -d || (k != d && v[idx(k - 1)] < v[idx(k + 1)]) {
                v[idx(k + 1)]
            } else {
                v[idx(k - 1)] + 1
            };
            let mut y = x - k;
            while x < n as isize
                && y < m as isize
                && y >= 0
                && base[x as usize] == target[y as usize]
            {
                x += 1;
                y += 1;
            }
            v[idx(k)] = x;
            if x >= n as isize && y >= m as isize {
                return backtrack(&trace, n, m);
            }
            k += 2;
        }
    }

    replace_all(n, m)
}

#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn backtrack(trace: &[Vec<isize>], n: usize, m: usize) -> Vec<EditOp> {
    let mut edits = Vec::with_capacity(n + m);
    let (mut x, mut y) = (n as isize, m as isize);

    for d in (1..trace.len()).rev() {
        let d = d as isize;
        let snapshot = &trace[d as usize];
        let at = |k: isize| snapshot[(k + d - 1) as usize];
        let k = x - y;
        let prev_k = if k == -d || (k != d && at(k - 1) < at(k + 1)) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = at(prev_k);
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            edits.push(EditOp::Keep);
            x -= 1;
            y -= 1;
        }
        if prev_k == k + 1 {
            edits.push(EditOp::Insert);
        } else {
            edits.push(EditOp::Delete);
        }
        x = prev_x;
        y = prev_y;
    }

    while x > 0 && y > 0 {
        edits.push(EditOp::Keep);
        x -= 1;
        y -= 1;
    }

    edits.reverse();
    edits
}
