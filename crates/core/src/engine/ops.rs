//! Pixel geometry shared by the edit actions (PRD-03).
//!
//! Every function here works on a single label slice with prevalidated
//! coordinates; the engine owns parameter checking, snapshotting, and
//! metadata bookkeeping. Connectivity is 4-neighbor throughout.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::frame::Buffer2D;
use crate::types::{LabelId, Point};

/// Inclusive pixel rectangle, normalized so `left <= right`, `top <= bottom`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Rect {
    pub left: usize,
    pub top: usize,
    pub right: usize,
    pub bottom: usize,
}

impl Rect {
    pub(crate) fn normalized(ax: usize, ay: usize, bx: usize, by: usize) -> Self {
        Self {
            left: ax.min(bx),
            top: ay.min(by),
            right: ax.max(bx),
            bottom: ay.max(by),
        }
    }
}

fn push_neighbors(width: usize, len: usize, idx: usize, mut visit: impl FnMut(usize)) {
    let x = idx % width;
    if x > 0 {
        visit(idx - 1);
    }
    if x + 1 < width {
        visit(idx + 1);
    }
    if idx >= width {
        visit(idx - width);
    }
    if idx + width < len {
        visit(idx + width);
    }
}

/// Flat indices of the 4-connected component sharing the seed's value.
fn component_indices(labels: &Buffer2D<LabelId>, seed: Point) -> Vec<usize> {
    let width = labels.width();
    let data = labels.as_slice();
    let len = data.len();
    let Some(target) = labels.get(seed.x, seed.y) else {
        return Vec::new();
    };
    let start = labels.index(seed.x, seed.y);
    let mut visited = vec![false; len];
    visited[start] = true;
    let mut stack = vec![start];
    let mut component = Vec::new();
    while let Some(idx) = stack.pop() {
        component.push(idx);
        push_neighbors(width, len, idx, |n| {
            if !visited[n] && data[n] == target {
                visited[n] = true;
                stack.push(n);
            }
        });
    }
    component
}

// ---------------------------------------------------------------------------
// Brush
// ---------------------------------------------------------------------------

/// Stamp a disk of radius `brush_size` (strict `dx^2 + dy^2 < r^2`, so size 1
/// is a single pixel) at every trace point, rewriting `from` pixels to `to`.
pub(crate) fn stamp_trace(
    labels: &mut Buffer2D<LabelId>,
    trace: &[Point],
    brush_size: usize,
    from: LabelId,
    to: LabelId,
) -> bool {
    if from == to {
        return false;
    }
    let r = brush_size as isize;
    let mut changed = false;
    for p in trace {
        for dy in (-r + 1)..r {
            for dx in (-r + 1)..r {
                if dx * dx + dy * dy >= r * r {
                    continue;
                }
                let x = p.x as isize + dx;
                let y = p.y as isize + dy;
                if x < 0 || y < 0 {
                    continue;
                }
                let (x, y) = (x as usize, y as usize);
                if labels.get(x, y) == Some(from) {
                    labels.set(x, y, to);
                    changed = true;
                }
            }
        }
    }
    changed
}

// ---------------------------------------------------------------------------
// Region fills
// ---------------------------------------------------------------------------

/// Fill the component under the seed with `fill`. Returns pixels written.
pub(crate) fn flood(labels: &mut Buffer2D<LabelId>, seed: Point, fill: LabelId) -> usize {
    let component = component_indices(labels, seed);
    let data = labels.as_mut_slice();
    let mut filled = 0;
    for &idx in &component {
        if data[idx] != fill {
            data[idx] = fill;
            filled += 1;
        }
    }
    filled
}

/// Zero every pixel of `label` outside the component under the seed.
/// The seed must sit on `label`. Returns pixels removed.
pub(crate) fn trim(labels: &mut Buffer2D<LabelId>, label: LabelId, seed: Point) -> usize {
    let keep = component_indices(labels, seed);
    let mut keep_mask = vec![false; labels.as_slice().len()];
    for &idx in &keep {
        keep_mask[idx] = true;
    }
    let data = labels.as_mut_slice();
    let mut removed = 0;
    for (idx, v) in data.iter_mut().enumerate() {
        if *v == label && !keep_mask[idx] {
            *v = 0;
            removed += 1;
        }
    }
    removed
}

/// Fill the background component under the seed with `label`. The component
/// must touch `label` somewhere; `None` reports a component that does not.
pub(crate) fn fill_hole(
    labels: &mut Buffer2D<LabelId>,
    label: LabelId,
    seed: Point,
) -> Option<usize> {
    let width = labels.width();
    let len = labels.as_slice().len();
    let component = component_indices(labels, seed);
    if component.is_empty() {
        return None;
    }
    let data = labels.as_slice();
    let touches = component.iter().any(|&idx| {
        let mut found = false;
        push_neighbors(width, len, idx, |n| {
            if data[n] == label {
                found = true;
            }
        });
        found
    });
    if !touches {
        return None;
    }
    let data = labels.as_mut_slice();
    for &idx in &component {
        data[idx] = label;
    }
    Some(component.len())
}

// ---------------------------------------------------------------------------
// Morphology
// ---------------------------------------------------------------------------

/// Zero the morphological boundary of `label`: pixels with any 4-neighbor
/// holding a different value, or sitting on the image edge.
pub(crate) fn erode(labels: &mut Buffer2D<LabelId>, label: LabelId) -> bool {
    let width = labels.width();
    let height = labels.height();
    let data = labels.as_slice();
    let mut removed = Vec::new();
    for (idx, &v) in data.iter().enumerate() {
        if v != label {
            continue;
        }
        let x = idx % width;
        let y = idx / width;
        let boundary = x == 0
            || y == 0
            || x + 1 == width
            || y + 1 == height
            || data[idx - 1] != label
            || data[idx + 1] != label
            || data[idx - width] != label
            || data[idx + width] != label;
        if boundary {
            removed.push(idx);
        }
    }
    let data = labels.as_mut_slice();
    for &idx in &removed {
        data[idx] = 0;
    }
    !removed.is_empty()
}

/// Grow `label` by one pixel, claiming background only.
pub(crate) fn dilate(labels: &mut Buffer2D<LabelId>, label: LabelId) -> bool {
    let width = labels.width();
    let data = labels.as_slice();
    let len = data.len();
    let mut grown = Vec::new();
    for (idx, &v) in data.iter().enumerate() {
        if v != 0 {
            continue;
        }
        let mut adjacent = false;
        push_neighbors(width, len, idx, |n| {
            if data[n] == label {
                adjacent = true;
            }
        });
        if adjacent {
            grown.push(idx);
        }
    }
    let data = labels.as_mut_slice();
    for &idx in &grown {
        data[idx] = label;
    }
    !grown.is_empty()
}

// ---------------------------------------------------------------------------
// Threshold
// ---------------------------------------------------------------------------

/// Claim bright pixels inside the rectangle for `label`, writing over
/// background only. The cutoff is mean + population standard deviation of
/// the raw intensities in the rectangle; pixels at or above it qualify.
pub(crate) fn threshold(
    labels: &mut Buffer2D<LabelId>,
    raw: &Buffer2D<f32>,
    rect: Rect,
    label: LabelId,
) -> bool {
    let raw_data = raw.as_slice();
    let mut sum = 0.0_f64;
    let mut count = 0_usize;
    for y in rect.top..=rect.bottom {
        for x in rect.left..=rect.right {
            sum += f64::from(raw_data[raw.index(x, y)]);
            count += 1;
        }
    }
    let mean = sum / count as f64;
    let mut sq = 0.0_f64;
    for y in rect.top..=rect.bottom {
        for x in rect.left..=rect.right {
            let v = f64::from(raw_data[raw.index(x, y)]);
            sq += (v - mean) * (v - mean);
        }
    }
    let cutoff = mean + (sq / count as f64).sqrt();

    let mut changed = false;
    for y in rect.top..=rect.bottom {
        for x in rect.left..=rect.right {
            let idx = labels.index(x, y);
            let bright = f64::from(raw_data[raw.index(x, y)]) >= cutoff;
            if bright && labels.as_slice()[idx] == 0 {
                labels.as_mut_slice()[idx] = label;
                changed = true;
            }
        }
    }
    changed
}

// ---------------------------------------------------------------------------
// Watershed
// ---------------------------------------------------------------------------

/// Split `label` by simultaneous breadth-first growth from two seeds. Pixels
/// reached first from `seed2` take `new_id`; ties go to `seed1` because it
/// is enqueued first. Pixels of `label` unreachable from either seed keep
/// their value.
pub(crate) fn watershed_split(
    labels: &mut Buffer2D<LabelId>,
    label: LabelId,
    seed1: Point,
    seed2: Point,
    new_id: LabelId,
) -> bool {
    const UNCLAIMED: u8 = 0;
    const BASIN1: u8 = 1;
    const BASIN2: u8 = 2;

    let width = labels.width();
    let len = labels.as_slice().len();
    let s1 = labels.index(seed1.x, seed1.y);
    let s2 = labels.index(seed2.x, seed2.y);

    let mut owner = vec![UNCLAIMED; len];
    let mut queue = VecDeque::new();
    owner[s1] = BASIN1;
    queue.push_back(s1);
    owner[s2] = BASIN2;
    queue.push_back(s2);

    let data = labels.as_slice();
    while let Some(idx) = queue.pop_front() {
        let basin = owner[idx];
        push_neighbors(width, len, idx, |n| {
            if owner[n] == UNCLAIMED && data[n] == label {
                owner[n] = basin;
                queue.push_back(n);
            }
        });
    }

    let data = labels.as_mut_slice();
    let mut changed = false;
    for (idx, &o) in owner.iter().enumerate() {
        if o == BASIN2 {
            data[idx] = new_id;
            changed = true;
        }
    }
    changed
}

// ---------------------------------------------------------------------------
// Identity rewrites
// ---------------------------------------------------------------------------

/// Rewrite every pixel of `from` to `to`.
pub(crate) fn replace_value(labels: &mut Buffer2D<LabelId>, from: LabelId, to: LabelId) -> bool {
    let mut changed = false;
    for v in labels.as_mut_slice() {
        if *v == from {
            *v = to;
            changed = true;
        }
    }
    changed
}

/// Exchange two values in place.
pub(crate) fn swap_values(labels: &mut Buffer2D<LabelId>, a: LabelId, b: LabelId) -> bool {
    let mut changed = false;
    for v in labels.as_mut_slice() {
        if *v == a {
            *v = b;
            changed = true;
        } else if *v == b {
            *v = a;
            changed = true;
        }
    }
    changed
}

/// Relabel `cur` so ids persist from `prev` by maximal pixel overlap.
///
/// Overlap pairs are matched greedily (largest count first, ties broken by
/// ascending current then previous id); ids left unmatched receive fresh
/// ids from `allocate` in ascending id order. The rewrite is simultaneous,
/// so chains and swaps cannot cascade.
pub(crate) fn overlap_relabel(
    prev: &Buffer2D<LabelId>,
    cur: &mut Buffer2D<LabelId>,
    mut allocate: impl FnMut() -> LabelId,
) -> bool {
    let mut overlaps: BTreeMap<(LabelId, LabelId), usize> = BTreeMap::new();
    let mut cur_ids: BTreeSet<LabelId> = BTreeSet::new();
    let prev_data = prev.as_slice();
    for (idx, &c) in cur.as_slice().iter().enumerate() {
        if c == 0 {
            continue;
        }
        cur_ids.insert(c);
        let p = prev_data[idx];
        if p != 0 {
            *overlaps.entry((c, p)).or_insert(0) += 1;
        }
    }

    let mut pairs: Vec<((LabelId, LabelId), usize)> = overlaps.into_iter().collect();
    pairs.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then(a.0 .0.cmp(&b.0 .0))
            .then(a.0 .1.cmp(&b.0 .1))
    });

    let mut mapping: BTreeMap<LabelId, LabelId> = BTreeMap::new();
    let mut taken: BTreeSet<LabelId> = BTreeSet::new();
    for ((c, p), _) in pairs {
        if mapping.contains_key(&c) || taken.contains(&p) {
            continue;
        }
        mapping.insert(c, p);
        taken.insert(p);
    }
    for &c in &cur_ids {
        if !mapping.contains_key(&c) {
            let fresh = allocate();
            mapping.insert(c, fresh);
        }
    }

    let mut changed = false;
    for v in cur.as_mut_slice().iter_mut() {
        if *v == 0 {
            continue;
        }
        if let Some(&to) = mapping.get(v) {
            if *v != to {
                *v = to;
                changed = true;
            }
        }
    }
    changed
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(width: usize, height: usize, data: Vec<LabelId>) -> Buffer2D<LabelId> {
        Buffer2D::from_vec(width, height, data).unwrap()
    }

    fn at(x: usize, y: usize) -> Point {
        Point { x, y }
    }

    // -- stamp_trace ----

    #[test]
    fn brush_size_one_paints_single_pixels() {
        let mut labels = grid(3, 3, vec![0; 9]);
        let changed = stamp_trace(&mut labels, &[at(1, 1)], 1, 0, 5);
        assert!(changed);
        assert_eq!(labels.as_slice(), &[0, 0, 0, 0, 5, 0, 0, 0, 0]);
    }

    #[test]
    fn brush_skips_pixels_not_matching_background() {
        let mut labels = grid(3, 1, vec![7, 0, 7]);
        stamp_trace(&mut labels, &[at(1, 0)], 2, 0, 5);
        // Radius 2 covers all three pixels but only background is claimed.
        assert_eq!(labels.as_slice(), &[7, 5, 7]);
    }

    #[test]
    fn brush_clips_at_edges() {
        let mut labels = grid(2, 2, vec![0; 4]);
        let changed = stamp_trace(&mut labels, &[at(0, 0)], 3, 0, 4);
        assert!(changed);
        // No panic and only in-bounds pixels written.
        assert_eq!(labels.get(0, 0), Some(4));
    }

    #[test]
    fn erase_rewrites_foreground_to_background() {
        let mut labels = grid(3, 1, vec![5, 5, 0]);
        stamp_trace(&mut labels, &[at(0, 0)], 1, 5, 0);
        assert_eq!(labels.as_slice(), &[0, 5, 0]);
    }

    // -- flood / trim / fill_hole ----

    #[test]
    fn flood_fills_component_only() {
        // Two separate background regions split by a wall of 1s.
        let mut labels = grid(3, 3, vec![0, 1, 0, 0, 1, 0, 0, 1, 0]);
        let filled = flood(&mut labels, at(0, 1), 9);
        assert_eq!(filled, 3);
        assert_eq!(labels.as_slice(), &[9, 1, 0, 9, 1, 0, 9, 1, 0]);
    }

    #[test]
    fn trim_removes_disconnected_pixels() {
        let mut labels = grid(5, 1, vec![2, 2, 0, 2, 2]);
        let removed = trim(&mut labels, 2, at(0, 0));
        assert_eq!(removed, 2);
        assert_eq!(labels.as_slice(), &[2, 2, 0, 0, 0]);
    }

    #[test]
    fn fill_hole_fills_enclosed_background() {
        #[rustfmt::skip]
        let mut labels = grid(3, 3, vec![
            4, 4, 4,
            4, 0, 4,
            4, 4, 4,
        ]);
        let filled = fill_hole(&mut labels, 4, at(1, 1));
        assert_eq!(filled, Some(1));
        assert_eq!(labels.get(1, 1), Some(4));
    }

    #[test]
    fn fill_hole_rejects_detached_background() {
        // The background pocket touches only label 7, not label 4.
        #[rustfmt::skip]
        let mut labels = grid(5, 3, vec![
            4, 0, 7, 7, 7,
            4, 0, 7, 0, 7,
            4, 0, 7, 7, 7,
        ]);
        assert_eq!(fill_hole(&mut labels, 4, at(3, 1)), None);
        assert_eq!(labels.get(3, 1), Some(0));
    }

    // -- erode / dilate ----

    #[test]
    fn erode_strips_boundary() {
        #[rustfmt::skip]
        let mut labels = grid(5, 5, vec![
            0, 0, 0, 0, 0,
            0, 3, 3, 3, 0,
            0, 3, 3, 3, 0,
            0, 3, 3, 3, 0,
            0, 0, 0, 0, 0,
        ]);
        assert!(erode(&mut labels, 3));
        let remaining: usize = labels.as_slice().iter().filter(|&&v| v == 3).count();
        assert_eq!(remaining, 1);
        assert_eq!(labels.get(2, 2), Some(3));
    }

    #[test]
    fn erode_removes_pixels_on_image_edge() {
        let mut labels = grid(2, 1, vec![3, 3]);
        assert!(erode(&mut labels, 3));
        assert_eq!(labels.as_slice(), &[0, 0]);
    }

    #[test]
    fn dilate_grows_into_background_only() {
        #[rustfmt::skip]
        let mut labels = grid(3, 3, vec![
            0, 0, 0,
            7, 3, 0,
            0, 0, 0,
        ]);
        assert!(dilate(&mut labels, 3));
        // Cross around (1, 1) claimed except the pixel already holding 7.
        assert_eq!(labels.get(1, 0), Some(3));
        assert_eq!(labels.get(2, 1), Some(3));
        assert_eq!(labels.get(1, 2), Some(3));
        assert_eq!(labels.get(0, 1), Some(7));
    }

    // -- threshold ----

    #[test]
    fn threshold_claims_bright_background() {
        let raw = Buffer2D::from_vec(4, 1, vec![0.0_f32, 0.0, 0.0, 10.0]).unwrap();
        let mut labels = grid(4, 1, vec![0, 0, 6, 0]);
        // mean 2.5, std sqrt(18.75) ~ 4.33, cutoff ~ 6.83: only the 10.
        let changed = threshold(&mut labels, &raw, Rect::normalized(0, 0, 3, 0), 9);
        assert!(changed);
        assert_eq!(labels.as_slice(), &[0, 0, 6, 9]);
    }

    #[test]
    fn threshold_never_overwrites_labels() {
        let raw = Buffer2D::from_vec(2, 1, vec![1.0_f32, 1.0]).unwrap();
        let mut labels = grid(2, 1, vec![6, 6]);
        // Uniform intensities put every pixel at the cutoff, but none are
        // background.
        assert!(!threshold(&mut labels, &raw, Rect::normalized(0, 0, 1, 0), 9));
        assert_eq!(labels.as_slice(), &[6, 6]);
    }

    // -- watershed ----

    #[test]
    fn watershed_partitions_toward_each_seed() {
        let mut labels = grid(4, 1, vec![2, 2, 2, 2]);
        assert!(watershed_split(&mut labels, 2, at(0, 0), at(3, 0), 9));
        assert_eq!(labels.as_slice(), &[2, 2, 9, 9]);
    }

    #[test]
    fn watershed_tie_goes_to_first_seed() {
        let mut labels = grid(3, 1, vec![2, 2, 2]);
        watershed_split(&mut labels, 2, at(0, 0), at(2, 0), 9);
        // The middle pixel is equidistant; seed 1 is enqueued first.
        assert_eq!(labels.as_slice(), &[2, 2, 9]);
    }

    #[test]
    fn watershed_leaves_detached_pixels_alone() {
        let mut labels = grid(5, 1, vec![2, 2, 0, 2, 2]);
        watershed_split(&mut labels, 2, at(0, 0), at(1, 0), 9);
        assert_eq!(labels.as_slice(), &[2, 9, 0, 2, 2]);
    }

    // -- identity rewrites ----

    #[test]
    fn replace_and_swap_rewrite_values() {
        let mut labels = grid(4, 1, vec![1, 2, 1, 0]);
        assert!(replace_value(&mut labels, 2, 1));
        assert_eq!(labels.as_slice(), &[1, 1, 1, 0]);

        let mut labels = grid(4, 1, vec![1, 2, 1, 0]);
        assert!(swap_values(&mut labels, 1, 2));
        assert_eq!(labels.as_slice(), &[2, 1, 2, 0]);
    }

    #[test]
    fn overlap_relabel_keeps_persistent_ids() {
        let prev = grid(4, 1, vec![5, 5, 0, 0]);
        // The same cell drifted right and was numbered 8 by the segmenter.
        let mut cur = grid(4, 1, vec![0, 8, 8, 0]);
        let mut next = 10;
        let changed = overlap_relabel(&prev, &mut cur, || {
            next += 1;
            next
        });
        assert!(changed);
        assert_eq!(cur.as_slice(), &[0, 5, 5, 0]);
    }

    #[test]
    fn overlap_relabel_allocates_for_new_cells() {
        let prev = grid(4, 1, vec![5, 5, 0, 0]);
        let mut cur = grid(4, 1, vec![5, 5, 0, 3]);
        let mut next = 10;
        overlap_relabel(&prev, &mut cur, || {
            next += 1;
            next
        });
        // 5 keeps its overlap match; the unmatched 3 gets a fresh id.
        assert_eq!(cur.as_slice(), &[5, 5, 0, 11]);
    }

    #[test]
    fn overlap_relabel_prefers_larger_overlap() {
        // Two current cells both overlap previous id 4; the bigger one wins,
        // and the loser is allocated fresh rather than stealing the id.
        let prev = grid(5, 1, vec![4, 4, 4, 4, 0]);
        let mut cur = grid(5, 1, vec![1, 1, 1, 2, 2]);
        let mut next = 10;
        overlap_relabel(&prev, &mut cur, || {
            next += 1;
            next
        });
        assert_eq!(cur.as_slice(), &[4, 4, 4, 11, 11]);
    }

    #[test]
    fn overlap_relabel_resolves_swaps_simultaneously() {
        let prev = grid(4, 1, vec![1, 1, 2, 2]);
        let mut cur = grid(4, 1, vec![2, 2, 1, 1]);
        let changed = overlap_relabel(&prev, &mut cur, || unreachable!());
        assert!(changed);
        assert_eq!(cur.as_slice(), &[1, 1, 2, 2]);
    }
}
