//! Split one triangle along the intersection edges that cross it.
//!
//! Local indices `0..3` are the triangle corners and `3..` are the
//! intersection points in the order they were handed in. Edges form open
//! polylines that run from one side of the triangle to another, and closed
//! loops strictly inside it. Polylines cut the triangle into sub-polygons by
//! walking its boundary ring; loops become holes in whichever polygon holds
//! them and are filled in their own right.

use crate::errors::TriangulateError;
use crate::float_types::{Real, tolerance};
use crate::math::{distance_to_segment_2d, project_to_2d, signed_area_2d};
use crate::mesh::triangulate::earcut_2d;
use geo::{Contains, Coord, LineString, Point, Polygon as GeoPolygon};
use log::debug;
use nalgebra::{Point2, Point3, Vector3};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Adjacency between local point indices.
pub type NeighborMap = BTreeMap<usize, BTreeSet<usize>>;

#[derive(Clone, Copy, Debug)]
enum Slot {
    Corner(usize),
    End { polyline: usize, at_front: bool },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Parent {
    Outer(usize),
    Inner(usize),
}

pub struct ReTriangulator {
    corners: [Point3<Real>; 3],
    normal: Vector3<Real>,
}

impl ReTriangulator {
    pub const fn new(corners: [Point3<Real>; 3], normal: Vector3<Real>) -> Self {
        Self { corners, normal }
    }

    /// Triangulate the triangle so every edge in `neighbors` becomes a mesh
    /// edge. `points` are the intersection points (local index `3 + i`).
    ///
    /// Output triangles use local indices and keep the source winding.
    pub fn re_triangulate(
        &self,
        points: &[Point3<Real>],
        neighbors: &NeighborMap,
    ) -> Result<Vec<[usize; 3]>, TriangulateError> {
        let axis = (self.corners[1] - self.corners[0])
            .try_normalize(Real::EPSILON)
            .ok_or(TriangulateError::DegeneratePolygon(3))?;
        if self.normal.norm_squared() < 0.5 {
            return Err(TriangulateError::DegeneratePolygon(3));
        }
        let origin = self.corners[0];
        let points_2d: Vec<Point2<Real>> = self
            .corners
            .iter()
            .chain(points.iter())
            .map(|point| project_to_2d(point, &self.normal, &axis, &origin))
            .collect();

        let (polylines, inner_polygons) = split_edge_graph(neighbors)?;

        let outer_polygons = if polylines.is_empty() {
            vec![vec![0, 1, 2]]
        } else {
            self.walk_ring(&points_2d, &polylines)?
        };

        let parents = polygon_hierarchy(&points_2d, &outer_polygons, &inner_polygons);

        let mut triangles = Vec::new();
        for (outer_index, outer) in outer_polygons.iter().enumerate() {
            let holes: Vec<&Vec<usize>> = inner_polygons
                .iter()
                .zip(parents.iter())
                .filter(|(_, parent)| **parent == Parent::Outer(outer_index))
                .map(|(inner, _)| inner)
                .collect();
            fill_polygon(&points_2d, outer, &holes, &mut triangles)?;
        }
        for (inner_index, inner) in inner_polygons.iter().enumerate() {
            let holes: Vec<&Vec<usize>> = inner_polygons
                .iter()
                .zip(parents.iter())
                .filter(|(_, parent)| **parent == Parent::Inner(inner_index))
                .map(|(child, _)| child)
                .collect();
            fill_polygon(&points_2d, inner, &holes, &mut triangles)?;
        }
        Ok(triangles)
    }

    /// Cut the triangle into sub-polygons along the open polylines.
    ///
    /// The boundary ring is `corner 0, ends on edge 0, corner 1, ends on edge 1,
    /// corner 2, ends on edge 2`. A walk emits corners as it passes them; on
    /// reaching a polyline end it emits the polyline, queues the next slot as
    /// a fresh start, and resumes right after the partner end.
    fn walk_ring(
        &self,
        points_2d: &[Point2<Real>],
        polylines: &[Vec<usize>],
    ) -> Result<Vec<Vec<usize>>, TriangulateError> {
        // (edge, parameter along edge, turn key, slot)
        let mut attached: Vec<(usize, Real, Real, Slot)> = Vec::with_capacity(polylines.len() * 2);
        for (polyline_index, polyline) in polylines.iter().enumerate() {
            for at_front in [true, false] {
                let (end, inward) = if at_front {
                    (polyline[0], polyline[1])
                } else {
                    (polyline[polyline.len() - 1], polyline[polyline.len() - 2])
                };
                let (edge, t) = attach_to_edge(points_2d, end);
                let edge_direction = points_2d[(edge + 1) % 3] - points_2d[edge];
                let inward_direction = points_2d[inward] - points_2d[end];
                let turn = edge_direction.perp(&inward_direction).atan2(edge_direction.dot(&inward_direction));
                attached.push((
                    edge,
                    t,
                    -turn,
                    Slot::End {
                        polyline: polyline_index,
                        at_front,
                    },
                ));
            }
        }
        attached.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then(a.1.total_cmp(&b.1))
                .then(a.2.total_cmp(&b.2))
        });

        let mut slots = Vec::with_capacity(attached.len() + 3);
        for edge in 0..3 {
            slots.push(Slot::Corner(edge));
            slots.extend(attached.iter().filter(|item| item.0 == edge).map(|item| item.3));
        }

        let mut partner = vec![usize::MAX; slots.len()];
        let mut end_slots: BTreeMap<(usize, bool), usize> = BTreeMap::new();
        for (slot_index, slot) in slots.iter().enumerate() {
            if let Slot::End { polyline, at_front } = *slot {
                end_slots.insert((polyline, at_front), slot_index);
            }
        }
        for (&(polyline, at_front), &slot_index) in &end_slots {
            if let Some(&other) = end_slots.get(&(polyline, !at_front)) {
                partner[slot_index] = other;
            }
        }

        let slot_count = slots.len();
        let mut emitted = vec![false; slot_count];
        let mut starts = VecDeque::from([0usize]);
        let mut polygons = Vec::new();
        while let Some(start) = starts.pop_front() {
            if emitted[start] {
                continue;
            }
            let mut polygon: Vec<usize> = Vec::new();
            let mut position = start;
            let mut steps = 0;
            loop {
                steps += 1;
                if steps > slot_count * 2 + 2 {
                    return Err(TriangulateError::Unresolved(format!(
                        "Boundary walk from slot {} did not close",
                        start
                    )));
                }
                emitted[position] = true;
                match slots[position] {
                    Slot::Corner(corner) => {
                        polygon.push(corner);
                        position = (position + 1) % slot_count;
                    },
                    Slot::End { polyline, at_front } => {
                        if at_front {
                            polygon.extend(polylines[polyline].iter().copied());
                        } else {
                            polygon.extend(polylines[polyline].iter().rev().copied());
                        }
                        starts.push_back((position + 1) % slot_count);
                        position = (partner[position] + 1) % slot_count;
                    },
                }
                if position == start {
                    break;
                }
            }
            polygon.dedup();
            while polygon.len() > 1 && polygon.first() == polygon.last() {
                polygon.pop();
            }
            if polygon.len() >= 3 {
                polygons.push(polygon);
            }
        }
        Ok(polygons)
    }
}

/// Edge (`k` runs from corner `k` to corner `k + 1`) closest to `point`, and
/// the parameter of the closest point along it. Corners attach to the edge
/// they start.
fn attach_to_edge(points_2d: &[Point2<Real>], point: usize) -> (usize, Real) {
    if point < 3 {
        return (point, 0.0);
    }
    let mut best = (0usize, 0.0, Real::MAX);
    for edge in 0..3 {
        let (distance, t) = distance_to_segment_2d(&points_2d[point], &points_2d[edge], &points_2d[(edge + 1) % 3]);
        if distance < best.2 {
            best = (edge, t, distance);
        }
    }
    (best.0, best.1)
}

/// Split the edge graph into polylines, which end at corners or degree-one
/// points, and closed loops of the remaining points.
fn split_edge_graph(neighbors: &NeighborMap) -> Result<(Vec<Vec<usize>>, Vec<Vec<usize>>), TriangulateError> {
    if let Some((&point, _)) = neighbors.iter().find(|(_, linked)| linked.len() > 2) {
        return Err(TriangulateError::Branching(point));
    }
    let is_boundary = |point: usize| point < 3 || neighbors.get(&point).is_none_or(|linked| linked.len() <= 1);
    let edge_key = |a: usize, b: usize| if a < b { (a, b) } else { (b, a) };
    let mut visited: BTreeSet<(usize, usize)> = BTreeSet::new();

    let mut polylines = Vec::new();
    for (&start, linked) in neighbors {
        if !is_boundary(start) {
            continue;
        }
        for &first in linked {
            if visited.contains(&edge_key(start, first)) {
                continue;
            }
            visited.insert(edge_key(start, first));
            let mut polyline = vec![start];
            let mut previous = start;
            let mut current = first;
            loop {
                polyline.push(current);
                if is_boundary(current) {
                    break;
                }
                let next = neighbors[&current].iter().copied().find(|&candidate| candidate != previous);
                match next {
                    Some(next) if !visited.contains(&edge_key(current, next)) => {
                        visited.insert(edge_key(current, next));
                        previous = current;
                        current = next;
                    },
                    _ => break,
                }
            }
            polylines.push(polyline);
        }
    }

    let mut loops = Vec::new();
    for (&start, linked) in neighbors {
        let Some(&first) = linked.iter().find(|&&next| !visited.contains(&edge_key(start, next))) else {
            continue;
        };
        visited.insert(edge_key(start, first));
        let mut polygon = vec![start];
        let mut previous = start;
        let mut current = first;
        while current != start {
            polygon.push(current);
            let next = neighbors[&current].iter().copied().find(|&candidate| candidate != previous);
            match next {
                Some(next) if !visited.contains(&edge_key(current, next)) || next == start => {
                    visited.insert(edge_key(current, next));
                    previous = current;
                    current = next;
                },
                _ => break,
            }
        }
        if current == start && polygon.len() >= 3 {
            loops.push(polygon);
        } else {
            debug!("Dropped an open intersection chain of {} points", polygon.len());
        }
    }
    Ok((polylines, loops))
}

fn to_geo(points_2d: &[Point2<Real>], polygon: &[usize]) -> GeoPolygon<Real> {
    let coords: Vec<Coord<Real>> = polygon
        .iter()
        .map(|&index| Coord {
            x: points_2d[index].x,
            y: points_2d[index].y,
        })
        .collect();
    GeoPolygon::new(LineString::from(coords), vec![])
}

fn polygon_area(points_2d: &[Point2<Real>], polygon: &[usize]) -> Real {
    let origin = points_2d[polygon[0]];
    let mut area = 0.0;
    for i in 1..polygon.len().saturating_sub(1) {
        area += signed_area_2d(&origin, &points_2d[polygon[i]], &points_2d[polygon[i + 1]]);
    }
    area.abs() / 2.0
}

/// For every inner loop, the smallest polygon that contains it.
fn polygon_hierarchy(points_2d: &[Point2<Real>], outer: &[Vec<usize>], inner: &[Vec<usize>]) -> Vec<Parent> {
    let outer_geo: Vec<GeoPolygon<Real>> = outer.iter().map(|polygon| to_geo(points_2d, polygon)).collect();
    let inner_geo: Vec<GeoPolygon<Real>> = inner.iter().map(|polygon| to_geo(points_2d, polygon)).collect();
    let inner_area: Vec<Real> = inner.iter().map(|polygon| polygon_area(points_2d, polygon)).collect();

    inner
        .iter()
        .enumerate()
        .map(|(index, polygon)| {
            let sample = points_2d[polygon[0]];
            let sample = Point::new(sample.x, sample.y);
            let mut parent: Option<(usize, Real)> = None;
            for (candidate, candidate_geo) in inner_geo.iter().enumerate() {
                if candidate == index || !candidate_geo.contains(&sample) {
                    continue;
                }
                if parent.is_none_or(|(_, area)| inner_area[candidate] < area) {
                    parent = Some((candidate, inner_area[candidate]));
                }
            }
            if let Some((candidate, _)) = parent {
                return Parent::Inner(candidate);
            }
            let outer_index = outer_geo
                .iter()
                .position(|candidate_geo| candidate_geo.contains(&sample))
                .unwrap_or(0);
            Parent::Outer(outer_index)
        })
        .collect()
}

/// Ear-clip `polygon` with `holes` and append the result. Boundary points the
/// ear clipper filtered out as collinear are put back by splitting the edge
/// they sit on, so neighbouring triangles keep matching edges.
fn fill_polygon(
    points_2d: &[Point2<Real>],
    polygon: &[usize],
    holes: &[&Vec<usize>],
    triangles: &mut Vec<[usize; 3]>,
) -> Result<(), TriangulateError> {
    let outer: Vec<Point2<Real>> = polygon.iter().map(|&index| points_2d[index]).collect();
    let hole_points: Vec<Vec<Point2<Real>>> = holes
        .iter()
        .map(|hole| hole.iter().map(|&index| points_2d[index]).collect())
        .collect();
    let mut local_to_index: Vec<usize> = polygon.to_vec();
    for hole in holes {
        local_to_index.extend(hole.iter().copied());
    }

    let mut filled: Vec<[usize; 3]> = earcut_2d(&outer, &hole_points)?
        .into_iter()
        .map(|[a, b, c]| [local_to_index[a], local_to_index[b], local_to_index[c]])
        .collect();

    let used: BTreeSet<usize> = filled.iter().flatten().copied().collect();
    let missing: BTreeSet<usize> = local_to_index.iter().copied().filter(|index| !used.contains(index)).collect();
    let eps = tolerance() * 10.0;
    for point in missing {
        let mut split = None;
        'search: for (triangle_index, triangle) in filled.iter().enumerate() {
            for k in 0..3 {
                let (a, b) = (triangle[k], triangle[(k + 1) % 3]);
                let (distance, t) = distance_to_segment_2d(&points_2d[point], &points_2d[a], &points_2d[b]);
                if distance <= eps && t > 0.0 && t < 1.0 {
                    split = Some((triangle_index, k));
                    break 'search;
                }
            }
        }
        match split {
            Some((triangle_index, k)) => {
                let triangle = filled[triangle_index];
                let (a, b, c) = (triangle[k], triangle[(k + 1) % 3], triangle[(k + 2) % 3]);
                filled[triangle_index] = [a, point, c];
                filled.push([point, b, c]);
            },
            None => debug!("Point {} was dropped by triangulation", point),
        }
    }
    triangles.extend(filled);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn link(neighbors: &mut NeighborMap, a: usize, b: usize) {
        neighbors.entry(a).or_default().insert(b);
        neighbors.entry(b).or_default().insert(a);
    }

    fn corners() -> [Point3<Real>; 3] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(4.0, 0.0, 0.0),
            Point3::new(0.0, 4.0, 0.0),
        ]
    }

    fn total_area(points: &[Point3<Real>], triangles: &[[usize; 3]]) -> Real {
        triangles
            .iter()
            .map(|t| {
                let (a, b, c) = (points[t[0]], points[t[1]], points[t[2]]);
                (b - a).cross(&(c - a)).z / 2.0
            })
            .sum()
    }

    #[test]
    fn chord_splits_triangle_in_two_regions() {
        let retriangulator = ReTriangulator::new(corners(), Vector3::z());
        let points = vec![Point3::new(2.0, 0.0, 0.0), Point3::new(0.0, 2.0, 0.0)];
        let mut neighbors = NeighborMap::new();
        link(&mut neighbors, 3, 4);
        let triangles = retriangulator.re_triangulate(&points, &neighbors).unwrap();

        let mut all: Vec<Point3<Real>> = corners().to_vec();
        all.extend(points.iter().copied());
        // Every triangle keeps the source winding and the area is conserved.
        for t in &triangles {
            let (a, b, c) = (all[t[0]], all[t[1]], all[t[2]]);
            assert!((b - a).cross(&(c - a)).z > 0.0);
        }
        assert!((total_area(&all, &triangles) - 8.0).abs() < 1e-9);
        // The chord is an edge of the result.
        assert!(triangles.iter().any(|t| {
            (0..3).any(|k| (t[k] == 3 && t[(k + 1) % 3] == 4) || (t[k] == 4 && t[(k + 1) % 3] == 3))
        }));
    }

    #[test]
    fn interior_loop_becomes_hole_and_fill() {
        let retriangulator = ReTriangulator::new(corners(), Vector3::z());
        let points = vec![
            Point3::new(0.5, 0.5, 0.0),
            Point3::new(1.5, 0.5, 0.0),
            Point3::new(0.5, 1.5, 0.0),
        ];
        let mut neighbors = NeighborMap::new();
        link(&mut neighbors, 3, 4);
        link(&mut neighbors, 4, 5);
        link(&mut neighbors, 5, 3);
        let triangles = retriangulator.re_triangulate(&points, &neighbors).unwrap();
        let mut all: Vec<Point3<Real>> = corners().to_vec();
        all.extend(points.iter().copied());
        assert!((total_area(&all, &triangles) - 8.0).abs() < 1e-9);
        assert!(triangles.contains(&[3, 4, 5]) || triangles.contains(&[4, 5, 3]) || triangles.contains(&[5, 3, 4]));
    }

    #[test]
    fn bent_polyline_keeps_all_points() {
        let retriangulator = ReTriangulator::new(corners(), Vector3::z());
        let points = vec![
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(3.0, 1.0, 0.0),
        ];
        let mut neighbors = NeighborMap::new();
        link(&mut neighbors, 3, 4);
        link(&mut neighbors, 4, 5);
        let triangles = retriangulator.re_triangulate(&points, &neighbors).unwrap();
        let used: BTreeSet<usize> = triangles.iter().flatten().copied().collect();
        assert_eq!(used, (0..6).collect());
        let mut all: Vec<Point3<Real>> = corners().to_vec();
        all.extend(points.iter().copied());
        assert!((total_area(&all, &triangles) - 8.0).abs() < 1e-9);
    }

    #[test]
    fn branching_points_are_rejected() {
        let retriangulator = ReTriangulator::new(corners(), Vector3::z());
        let points = vec![
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
            Point3::new(2.0, 2.0, 0.0),
        ];
        let mut neighbors = NeighborMap::new();
        link(&mut neighbors, 3, 4);
        link(&mut neighbors, 3, 5);
        link(&mut neighbors, 3, 6);
        assert!(matches!(
            retriangulator.re_triangulate(&points, &neighbors),
            Err(TriangulateError::Branching(3))
        ));
    }
}
