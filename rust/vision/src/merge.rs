// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Segment merging and orthogonalization
//!
//! Raw Hough output contains many short, overlapping fragments per wall.
//! Fragments that are parallel, close and end-to-end are clustered with a
//! disjoint-set forest and each cluster is replaced by its spanning
//! segment, which is then snapped to the axes.

use crate::line_ops::point_line_distance;
use nalgebra::Vector2;
use plancad_geometry::{Point2D, Segment2D};
use rustc_hash::FxHashSet;

/// Tolerances for one merge pass. Lengths are pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeParams {
    pub angle_tol_deg: f64,
    pub dist_tol_px: f64,
    pub gap_tol_px: f64,
    pub min_len_px: f64,
}

/// Disjoint-set forest over `0..n` with path halving and union by rank
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        if self.rank[ra] < self.rank[rb] {
            self.parent[ra] = rb;
        } else if self.rank[ra] > self.rank[rb] {
            self.parent[rb] = ra;
        } else {
            self.parent[rb] = ra;
            self.rank[ra] = self.rank[ra].saturating_add(1);
        }
    }
}

/// Undirected angle difference in degrees, in `[0, 90]`
fn angle_diff(a: f64, b: f64) -> f64 {
    let d = (a - b).abs();
    d.min(180.0 - d)
}

fn to_vec(p: &Point2D) -> Vector2<f64> {
    Vector2::new(p.x, p.y)
}

/// Normalize `v`, returning `fallback` when it is (nearly) zero
fn normalize_or(v: Vector2<f64>, fallback: Vector2<f64>) -> Vector2<f64> {
    let n = v.norm();
    if n < 1e-6 {
        fallback
    } else {
        v / n
    }
}

struct Fragment {
    segment: Segment2D,
    p1: Vector2<f64>,
    p2: Vector2<f64>,
    dir: Vector2<f64>,
    angle: f64,
}

fn should_join(a: &Fragment, b: &Fragment, params: &MergeParams) -> bool {
    if angle_diff(a.angle, b.angle) > params.angle_tol_deg {
        return false;
    }

    let (sa, sb) = (&a.segment, &b.segment);
    let min_d = point_line_distance(&sa.start, &sb.start, &sb.end)
        .min(point_line_distance(&sa.end, &sb.start, &sb.end))
        .min(point_line_distance(&sb.start, &sa.start, &sa.end))
        .min(point_line_distance(&sb.end, &sa.start, &sa.end));
    if min_d > params.dist_tol_px {
        return false;
    }

    let dir_b = if a.dir.dot(&b.dir) < 0.0 { -b.dir } else { b.dir };
    let u = normalize_or(a.dir + dir_b, a.dir);

    let (ta1, ta2) = (a.p1.dot(&u), a.p2.dot(&u));
    let (tb1, tb2) = (b.p1.dot(&u), b.p2.dot(&u));
    let (a0, a1) = (ta1.min(ta2), ta1.max(ta2));
    let (b0, b1) = (tb1.min(tb2), tb1.max(tb2));
    let gap = (a0.max(b0) - a1.min(b1)).max(0.0);
    gap <= params.gap_tol_px
}

/// Cluster near-collinear fragments and replace each cluster by its
/// spanning segment.
///
/// Output order follows the first member of each cluster. Results that
/// round to the same coordinates (at 2 px) are deduplicated.
pub fn merge_segments(segments: &[Segment2D], params: &MergeParams) -> Vec<Segment2D> {
    let min_keep = (params.min_len_px * 0.25).max(1e-6);
    let fragments: Vec<Fragment> = segments
        .iter()
        .filter(|s| s.length() > min_keep)
        .filter_map(|s| {
            let dir = s.direction()?;
            Some(Fragment {
                segment: *s,
                p1: to_vec(&s.start),
                p2: to_vec(&s.end),
                dir,
                angle: s.angle_deg(),
            })
        })
        .collect();
    let n = fragments.len();
    if n == 0 {
        return Vec::new();
    }

    let mut forest = UnionFind::new(n);
    for i in 0..n {
        for j in (i + 1)..n {
            if should_join(&fragments[i], &fragments[j], params) {
                forest.union(i, j);
            }
        }
    }

    // Clusters in order of their first member
    let mut cluster_of_root: Vec<Option<usize>> = vec![None; n];
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    for i in 0..n {
        let root = forest.find(i);
        match cluster_of_root[root] {
            Some(c) => clusters[c].push(i),
            None => {
                cluster_of_root[root] = Some(clusters.len());
                clusters.push(vec![i]);
            }
        }
    }

    let mut merged = Vec::with_capacity(clusters.len());
    for members in &clusters {
        let reference = fragments[members[0]].dir;
        let sum = members.iter().fold(Vector2::zeros(), |acc, &i| {
            let d = fragments[i].dir;
            if d.dot(&reference) < 0.0 {
                acc - d
            } else {
                acc + d
            }
        });
        let u = normalize_or(sum / members.len() as f64, reference);
        let normal = Vector2::new(-u.y, u.x);

        let rho = members
            .iter()
            .map(|&i| ((fragments[i].p1 + fragments[i].p2) * 0.5).dot(&normal))
            .sum::<f64>()
            / members.len() as f64;
        let p0 = normal * rho;

        let mut tmin = f64::INFINITY;
        let mut tmax = f64::NEG_INFINITY;
        for &i in members {
            for p in [fragments[i].p1, fragments[i].p2] {
                let t = (p - p0).dot(&u);
                tmin = tmin.min(t);
                tmax = tmax.max(t);
            }
        }
        if tmax - tmin < params.min_len_px {
            continue;
        }
        let s = p0 + u * tmin;
        let e = p0 + u * tmax;
        merged.push(Segment2D::from_coords(s.x, s.y, e.x, e.y));
    }

    dedup_segments(merged)
}

/// Keep the first of every group of segments whose coordinates round to
/// the same values at a 2 px grid.
pub fn dedup_segments(segments: Vec<Segment2D>) -> Vec<Segment2D> {
    let key = |v: f64| (v / 2.0).round_ties_even() as i64;
    let mut seen: FxHashSet<[i64; 4]> = FxHashSet::default();
    segments
        .into_iter()
        .filter(|s| seen.insert([key(s.start.x), key(s.start.y), key(s.end.x), key(s.end.y)]))
        .collect()
}

/// Snap near-horizontal and near-vertical segments onto the axes.
///
/// A segment within `tol_deg` of horizontal gets both y set to their mean;
/// within `tol_deg` of vertical, both x. Anything else is unchanged.
pub fn orthogonalize(segments: &[Segment2D], tol_deg: f64) -> Vec<Segment2D> {
    segments
        .iter()
        .map(|s| {
            let (x1, y1, x2, y2) = (s.start.x, s.start.y, s.end.x, s.end.y);
            let mut ang = (y2 - y1).atan2(x2 - x1).to_degrees().abs() % 180.0;
            if ang > 90.0 {
                ang = 180.0 - ang;
            }
            if ang <= tol_deg {
                let y = (y1 + y2) * 0.5;
                Segment2D::from_coords(x1, y, x2, y)
            } else if (90.0 - ang).abs() <= tol_deg {
                let x = (x1 + x2) * 0.5;
                Segment2D::from_coords(x, y1, x, y2)
            } else {
                *s
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params() -> MergeParams {
        MergeParams {
            angle_tol_deg: 5.0,
            dist_tol_px: 10.0,
            gap_tol_px: 25.0,
            min_len_px: 10.0,
        }
    }

    #[test]
    fn test_union_find() {
        let mut uf = UnionFind::new(5);
        uf.union(0, 1);
        uf.union(3, 4);
        uf.union(1, 4);
        assert_eq!(uf.find(0), uf.find(3));
        assert_ne!(uf.find(0), uf.find(2));
    }

    #[test]
    fn test_union_find_long_chain_has_no_recursion_limit() {
        let n = 200_000;
        let mut uf = UnionFind::new(n);
        for i in 1..n {
            uf.union(i - 1, i);
        }
        assert_eq!(uf.find(0), uf.find(n - 1));
    }

    #[test]
    fn test_fragments_merge_into_span() {
        let segs = vec![
            Segment2D::from_coords(0.0, 100.0, 50.0, 100.0),
            Segment2D::from_coords(60.0, 101.0, 120.0, 101.0),
            // reversed direction, same wall
            Segment2D::from_coords(200.0, 100.0, 130.0, 100.0),
        ];
        let merged = merge_segments(&segs, &params());
        assert_eq!(merged.len(), 1);
        let m = merged[0];
        assert_relative_eq!(m.start.x.min(m.end.x), 0.0, epsilon = 0.5);
        assert_relative_eq!(m.start.x.max(m.end.x), 200.0, epsilon = 0.5);
        assert_relative_eq!((m.start.y + m.end.y) / 2.0, 100.0 + 1.0 / 3.0, epsilon = 0.1);
    }

    #[test]
    fn test_perpendicular_and_distant_stay_apart() {
        let segs = vec![
            Segment2D::from_coords(0.0, 0.0, 100.0, 0.0),
            Segment2D::from_coords(100.0, 0.0, 100.0, 100.0),
            Segment2D::from_coords(0.0, 50.0, 100.0, 50.0),
            // same line, too far along it
            Segment2D::from_coords(300.0, 0.0, 400.0, 0.0),
        ];
        assert_eq!(merge_segments(&segs, &params()).len(), 4);
    }

    #[test]
    fn test_short_fragments_dropped() {
        let segs = vec![
            Segment2D::from_coords(0.0, 0.0, 2.0, 0.0),
            Segment2D::from_coords(0.0, 50.0, 8.0, 50.0),
        ];
        // 2 px is under the 0.25 * min floor; 8 px survives clustering but
        // its cluster is shorter than min_len
        assert!(merge_segments(&segs, &params()).is_empty());
    }

    #[test]
    fn test_merge_is_idempotent() {
        let segs = vec![
            Segment2D::from_coords(10.0, 10.0, 90.0, 11.0),
            Segment2D::from_coords(95.0, 11.0, 190.0, 10.0),
            Segment2D::from_coords(190.0, 12.0, 191.0, 150.0),
            Segment2D::from_coords(10.0, 150.0, 190.0, 150.0),
            Segment2D::from_coords(10.0, 10.0, 11.0, 150.0),
        ];
        let once = merge_segments(&segs, &params());
        let twice = merge_segments(&once, &params());
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(&twice) {
            assert_relative_eq!(a.start.x, b.start.x, epsilon = 1e-6);
            assert_relative_eq!(a.start.y, b.start.y, epsilon = 1e-6);
            assert_relative_eq!(a.end.x, b.end.x, epsilon = 1e-6);
            assert_relative_eq!(a.end.y, b.end.y, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_dedup_rounding() {
        let segs = vec![
            Segment2D::from_coords(0.0, 0.0, 100.0, 0.0),
            Segment2D::from_coords(0.4, 0.3, 100.2, 0.6),
            Segment2D::from_coords(0.0, 10.0, 100.0, 10.0),
        ];
        let out = dedup_segments(segs);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].start.y, 10.0);
    }

    #[test]
    fn test_orthogonalize() {
        let segs = vec![
            Segment2D::from_coords(0.0, 0.0, 100.0, 4.0),
            Segment2D::from_coords(0.0, 0.0, 3.0, 100.0),
            Segment2D::from_coords(0.0, 0.0, 100.0, 100.0),
            Segment2D::from_coords(100.0, 4.0, 0.0, 0.0),
        ];
        let out = orthogonalize(&segs, 5.0);
        assert_eq!(out[0], Segment2D::from_coords(0.0, 2.0, 100.0, 2.0));
        assert_eq!(out[1], Segment2D::from_coords(1.5, 0.0, 1.5, 100.0));
        assert_eq!(out[2], segs[2]);
        assert_eq!(out[3], Segment2D::from_coords(100.0, 2.0, 0.0, 2.0));
    }
}
