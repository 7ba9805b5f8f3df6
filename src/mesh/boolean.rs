//! Boolean operations between two closed triangle meshes.
//!
//! The operation runs in stages:
//! 1. the two bounding-volume trees yield candidate triangle pairs;
//! 2. each pair is intersected exactly and the crossing segment is recorded
//!    against both triangles;
//! 3. every crossed triangle is re-triangulated so its segments become edges,
//!    with new points welded through [`PositionKey`];
//! 4. the segments of the first mesh are chained into closed loops, and the
//!    loops cut each mesh into face groups;
//! 5. each group is classified as inside or outside the other mesh by ray
//!    parity voting;
//! 6. groups are kept, dropped, or flipped according to the requested
//!    [`Method`].

use crate::aabb::Aabb;
use crate::errors::CombineError;
use crate::float_types::{Real, tolerance};
use crate::math::{
    intersect_segment_and_plane, intersect_triangles, point_in_triangle, triangle_area2,
    triangle_centroid, triangle_normal,
};
use crate::mesh::retriangulate::{NeighborMap, ReTriangulator};
use crate::mesh::solid::SolidMesh;
use crate::position_key::PositionKey;
use hashbrown::HashMap;
use log::{debug, trace};
use nalgebra::{Point3, Vector3};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Which boolean to assemble from the classified face groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Union,
    Difference,
    Intersection,
}

/// Where a face group lies relative to the other solid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Outside,
    Inside,
    /// On the other surface, facing the same way.
    Shared,
    /// On the other surface, facing against it.
    Opposed,
}

/// Ray directions for inside tests. Slightly off the coordinate axes so rays
/// rarely graze the edges of axis-aligned geometry.
const TEST_AXES: [[Real; 3]; 3] = [
    [0.9981, 0.0437, 0.0423],
    [0.0391, 0.9987, 0.0329],
    [0.0353, 0.0417, 0.9985],
];

/// Intersection points and segment edges collected for one triangle.
#[derive(Default, Debug)]
struct IntersectedContext {
    points: Vec<Point3<Real>>,
    position_map: HashMap<PositionKey, usize>,
    neighbors: NeighborMap,
}

impl IntersectedContext {
    /// Local index of `point`: a corner (`0..3`) when it coincides with one,
    /// otherwise `3 + i` into the deduplicated point list.
    fn add_point(&mut self, corner_keys: &[PositionKey; 3], point: Point3<Real>) -> usize {
        let key = PositionKey::from(&point);
        if let Some(corner) = corner_keys.iter().position(|corner_key| *corner_key == key) {
            return corner;
        }
        let next = self.points.len();
        let index = *self.position_map.entry(key).or_insert(next);
        if index == next {
            self.points.push(point);
        }
        3 + index
    }

    fn add_segment(&mut self, corner_keys: &[PositionKey; 3], segment: &(Point3<Real>, Point3<Real>)) {
        let from = self.add_point(corner_keys, segment.0);
        let to = self.add_point(corner_keys, segment.1);
        if from != to {
            self.neighbors.entry(from).or_default().insert(to);
            self.neighbors.entry(to).or_default().insert(from);
        }
    }
}

pub type HalfEdgeMap = HashMap<(usize, usize), usize>;

pub struct BooleanOperation<'a> {
    first: &'a SolidMesh,
    second: &'a SolidMesh,
    new_vertices: Vec<Point3<Real>>,
    new_triangles: Vec<[usize; 3]>,
    new_position_map: HashMap<PositionKey, usize>,
    first_groups: Vec<Vec<usize>>,
    second_groups: Vec<Vec<usize>>,
    first_sides: Vec<Side>,
    second_sides: Vec<Side>,
}

impl<'a> BooleanOperation<'a> {
    pub fn new(first: &'a SolidMesh, second: &'a SolidMesh) -> Self {
        Self {
            first,
            second,
            new_vertices: Vec::new(),
            new_triangles: Vec::new(),
            new_position_map: HashMap::new(),
            first_groups: Vec::new(),
            second_groups: Vec::new(),
            first_sides: Vec::new(),
            second_sides: Vec::new(),
        }
    }

    /// Run intersection, re-triangulation, grouping and classification.
    /// Must succeed before any `fetch`.
    pub fn combine(&mut self) -> Result<(), CombineError> {
        let mut pairs = Vec::new();
        self.first.tree().test(self.second.tree(), &mut pairs);
        trace!("{} candidate triangle pairs", pairs.len());

        let (first_contexts, second_contexts) = self.intersect_pairs(&pairs);
        trace!(
            "{} + {} intersected triangles",
            first_contexts.len(),
            second_contexts.len()
        );

        let first_offset = 0;
        let second_offset = self.first.vertices().len();
        self.register_corner_snaps(self.first, first_offset, &first_contexts);
        self.register_corner_snaps(self.second, second_offset, &second_contexts);
        let first_weld = self.vertex_weld(self.first, first_offset);
        let second_weld = self.vertex_weld(self.second, second_offset);

        let mut first_half_edges = HalfEdgeMap::new();
        let mut second_half_edges = HalfEdgeMap::new();
        let mut first_triangles =
            self.add_unintersected_triangles(self.first, &first_weld, &first_contexts, &mut first_half_edges);
        let mut second_triangles =
            self.add_unintersected_triangles(self.second, &second_weld, &second_contexts, &mut second_half_edges);

        let mut first_edges: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        let mut second_edges: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        self.re_triangulate(
            self.first,
            &first_weld,
            &first_contexts,
            &mut first_half_edges,
            &mut first_triangles,
            &mut first_edges,
        )?;
        self.re_triangulate(
            self.second,
            &second_weld,
            &second_contexts,
            &mut second_half_edges,
            &mut second_triangles,
            &mut second_edges,
        )?;
        trace!(
            "{} intersection edges on the second mesh",
            second_edges.values().map(BTreeSet::len).sum::<usize>() / 2
        );

        let intersections = build_polygons_from_edges(&first_edges)?;
        trace!("{} intersection loops", intersections.len());
        ensure_loops_owned(&intersections, &first_half_edges, "first")?;
        ensure_loops_owned(&intersections, &second_half_edges, "second")?;

        self.first_groups = build_face_groups(&intersections, &first_half_edges, &self.new_triangles, &first_triangles);
        self.second_groups =
            build_face_groups(&intersections, &second_half_edges, &self.new_triangles, &second_triangles);
        trace!(
            "{} + {} face groups",
            self.first_groups.len(),
            self.second_groups.len()
        );

        self.first_sides = self.decide_group_sides(&self.first_groups, self.second);
        self.second_sides = self.decide_group_sides(&self.second_groups, self.first);
        Ok(())
    }

    fn intersect_pairs(
        &self,
        pairs: &[(usize, usize)],
    ) -> (
        BTreeMap<usize, IntersectedContext>,
        BTreeMap<usize, IntersectedContext>,
    ) {
        let intersect = |&(i, j): &(usize, usize)| {
            let a = self.first.triangle_positions(i);
            let b = self.second.triangle_positions(j);
            intersect_triangles(
                &a,
                &self.first.triangle_normals()[i],
                &b,
                &self.second.triangle_normals()[j],
            )
            .map(|segment| (i, j, segment))
        };

        #[cfg(feature = "parallel")]
        let segments: Vec<_> = pairs.par_iter().filter_map(intersect).collect();

        #[cfg(not(feature = "parallel"))]
        let segments: Vec<_> = pairs.iter().filter_map(intersect).collect();

        let mut first_contexts: BTreeMap<usize, IntersectedContext> = BTreeMap::new();
        let mut second_contexts: BTreeMap<usize, IntersectedContext> = BTreeMap::new();
        for (i, j, segment) in &segments {
            let first_keys = corner_keys(&self.first.triangle_positions(*i));
            first_contexts.entry(*i).or_default().add_segment(&first_keys, segment);
            let second_keys = corner_keys(&self.second.triangle_positions(*j));
            second_contexts.entry(*j).or_default().add_segment(&second_keys, segment);
        }
        (first_contexts, second_contexts)
    }

    /// Intersection points that landed on a corner reuse that corner's
    /// vertex. Registering them in the weld map lets the other mesh pick up
    /// the same index when the point falls inside one of its triangles.
    fn register_corner_snaps(
        &mut self,
        mesh: &SolidMesh,
        offset: usize,
        contexts: &BTreeMap<usize, IntersectedContext>,
    ) {
        for (&triangle_index, context) in contexts {
            let triangle = mesh.triangles()[triangle_index];
            for corner in context.neighbors.keys().copied().filter(|&local| local < 3) {
                let vertex = triangle[corner];
                self.new_position_map
                    .entry(PositionKey::from(&mesh.vertices()[vertex]))
                    .or_insert(offset + vertex);
            }
        }
    }

    /// Output index of every vertex of `mesh`. A vertex sitting on a corner
    /// registered by an earlier mesh takes that corner's index, so the loops
    /// of touching solids resolve to the same half-edges in both meshes.
    fn vertex_weld(&self, mesh: &SolidMesh, offset: usize) -> Vec<usize> {
        mesh.vertices()
            .iter()
            .enumerate()
            .map(|(vertex, position)| {
                self.new_position_map
                    .get(&PositionKey::from(position))
                    .copied()
                    .filter(|&index| index < offset)
                    .unwrap_or(offset + vertex)
            })
            .collect()
    }

    /// Copy every vertex of `mesh` and every triangle without intersections.
    /// Returns the new indices of the copied triangles.
    fn add_unintersected_triangles(
        &mut self,
        mesh: &SolidMesh,
        weld: &[usize],
        contexts: &BTreeMap<usize, IntersectedContext>,
        half_edges: &mut HalfEdgeMap,
    ) -> Vec<usize> {
        self.new_vertices.extend_from_slice(mesh.vertices());
        let mut added = Vec::with_capacity(mesh.triangles().len());
        for (triangle_index, triangle) in mesh.triangles().iter().enumerate() {
            if contexts.contains_key(&triangle_index) {
                continue;
            }
            let new_triangle = triangle.map(|vertex| weld[vertex]);
            let new_index = self.push_triangle(new_triangle, half_edges);
            added.push(new_index);
        }
        added
    }

    fn push_triangle(&mut self, triangle: [usize; 3], half_edges: &mut HalfEdgeMap) -> usize {
        let new_index = self.new_triangles.len();
        self.new_triangles.push(triangle);
        for k in 0..3 {
            let half_edge = (triangle[k], triangle[(k + 1) % 3]);
            if half_edges.insert(half_edge, new_index).is_some() {
                debug!("Found repeated halfedge: {},{}", half_edge.0, half_edge.1);
            }
        }
        new_index
    }

    fn add_new_point(&mut self, point: &Point3<Real>) -> usize {
        let next = self.new_vertices.len();
        let index = *self.new_position_map.entry(PositionKey::from(point)).or_insert(next);
        if index == next {
            self.new_vertices.push(*point);
        }
        index
    }

    fn re_triangulate(
        &mut self,
        mesh: &SolidMesh,
        weld: &[usize],
        contexts: &BTreeMap<usize, IntersectedContext>,
        half_edges: &mut HalfEdgeMap,
        mesh_triangles: &mut Vec<usize>,
        edges: &mut BTreeMap<usize, BTreeSet<usize>>,
    ) -> Result<(), CombineError> {
        for (&triangle_index, context) in contexts {
            let triangle = mesh.triangles()[triangle_index];
            let re_triangulator = ReTriangulator::new(
                mesh.triangle_positions(triangle_index),
                mesh.triangle_normals()[triangle_index],
            );
            let local_triangles = re_triangulator
                .re_triangulate(&context.points, &context.neighbors)
                .map_err(|error| {
                    debug!("Retriangulate failed on triangle {}: {}", triangle_index, error);
                    CombineError::Geometric(format!(
                        "Triangle {} could not be split along its intersections: {}",
                        triangle_index, error
                    ))
                })?;

            let mut new_indices = Vec::with_capacity(3 + context.points.len());
            new_indices.extend(triangle.iter().map(|&vertex| weld[vertex]));
            for point in &context.points {
                let index = self.add_new_point(point);
                new_indices.push(index);
            }

            for local in local_triangles {
                let new_triangle = [new_indices[local[0]], new_indices[local[1]], new_indices[local[2]]];
                if new_triangle[0] == new_triangle[1]
                    || new_triangle[1] == new_triangle[2]
                    || new_triangle[2] == new_triangle[0]
                {
                    continue;
                }
                let new_index = self.push_triangle(new_triangle, half_edges);
                mesh_triangles.push(new_index);
            }

            for (&from, linked) in &context.neighbors {
                for &to in linked {
                    let (from, to) = (new_indices[from], new_indices[to]);
                    if from == to {
                        continue;
                    }
                    edges.entry(from).or_default().insert(to);
                    edges.entry(to).or_default().insert(from);
                }
            }
        }
        Ok(())
    }

    /// Side of `target` each group lies on.
    fn decide_group_sides(&self, groups: &[Vec<usize>], target: &SolidMesh) -> Vec<Side> {
        groups
            .iter()
            .map(|group| {
                let Some(&picked) = group.iter().max_by(|&&a, &&b| {
                    self.area2(a).total_cmp(&self.area2(b)).then(b.cmp(&a))
                }) else {
                    return Side::Outside;
                };
                let triangle = self.new_triangles[picked];
                let [a, b, c] = triangle.map(|index| self.new_vertices[index]);
                let center = triangle_centroid(&a, &b, &c);
                let normal = triangle_normal(&a, &b, &c);

                if let Some(surface_normal) = surface_normal_at(&center, target) {
                    return if normal.dot(&surface_normal) < 0.0 {
                        Side::Opposed
                    } else {
                        Side::Shared
                    };
                }

                let inside_votes = TEST_AXES
                    .iter()
                    .filter(|axis| is_point_in_mesh(&center, target, &Vector3::new(axis[0], axis[1], axis[2])))
                    .count();
                if inside_votes * 2 > TEST_AXES.len() {
                    Side::Inside
                } else {
                    Side::Outside
                }
            })
            .collect()
    }

    fn area2(&self, triangle_index: usize) -> Real {
        let [a, b, c] = self.new_triangles[triangle_index].map(|index| self.new_vertices[index]);
        triangle_area2(&a, &b, &c)
    }

    /// Triangles kept by `method`, before vertex compaction.
    ///
    /// A surface both solids share is kept once, from the first mesh. Where
    /// the solids touch face to face, only a difference keeps the first
    /// mesh's side of the contact.
    fn select(&self, method: Method) -> Vec<[usize; 3]> {
        let mut result = Vec::new();
        let mut keep = |groups: &[Vec<usize>], sides: &[Side], wanted: &[Side], flip: bool| {
            for (group, side) in groups.iter().zip(sides.iter()) {
                if !wanted.contains(side) {
                    continue;
                }
                for &triangle_index in group {
                    let t = self.new_triangles[triangle_index];
                    result.push(if flip { [t[2], t[1], t[0]] } else { t });
                }
            }
        };
        match method {
            Method::Union => {
                keep(&self.first_groups, &self.first_sides, &[Side::Outside, Side::Shared], false);
                keep(&self.second_groups, &self.second_sides, &[Side::Outside], false);
            },
            Method::Difference => {
                keep(&self.first_groups, &self.first_sides, &[Side::Outside, Side::Opposed], false);
                keep(&self.second_groups, &self.second_sides, &[Side::Inside], true);
            },
            Method::Intersection => {
                keep(&self.first_groups, &self.first_sides, &[Side::Inside, Side::Shared], false);
                keep(&self.second_groups, &self.second_sides, &[Side::Inside], false);
            },
        }
        result
    }

    /// Assemble the result of `method`. Vertices no triangle references are
    /// dropped; the rest keep their relative order (first mesh, second mesh,
    /// then new intersection points in discovery order).
    pub fn fetch(&self, method: Method) -> Result<(Vec<Point3<Real>>, Vec<[usize; 3]>), CombineError> {
        let triangles = self.select(method);
        if triangles.is_empty() {
            return Err(CombineError::EmptyResult);
        }
        let mut remap = vec![usize::MAX; self.new_vertices.len()];
        for triangle in &triangles {
            for &index in triangle {
                remap[index] = 0;
            }
        }
        let mut vertices = Vec::new();
        for (old, slot) in remap.iter_mut().enumerate() {
            if *slot == 0 {
                *slot = vertices.len();
                vertices.push(self.new_vertices[old]);
            }
        }
        let triangles = triangles
            .into_iter()
            .map(|t| [remap[t[0]], remap[t[1]], remap[t[2]]])
            .collect();
        Ok((vertices, triangles))
    }

    pub fn fetch_union(&self) -> Result<(Vec<Point3<Real>>, Vec<[usize; 3]>), CombineError> {
        self.fetch(Method::Union)
    }

    pub fn fetch_difference(&self) -> Result<(Vec<Point3<Real>>, Vec<[usize; 3]>), CombineError> {
        self.fetch(Method::Difference)
    }

    pub fn fetch_intersection(&self) -> Result<(Vec<Point3<Real>>, Vec<[usize; 3]>), CombineError> {
        self.fetch(Method::Intersection)
    }
}

fn corner_keys(positions: &[Point3<Real>; 3]) -> [PositionKey; 3] {
    [
        PositionKey::from(&positions[0]),
        PositionKey::from(&positions[1]),
        PositionKey::from(&positions[2]),
    ]
}

/// Chain the intersection edges into closed loops.
///
/// Every start point is taken in ascending order and every step moves to the
/// lowest unvisited neighbor. A chain that cannot close fails the operation.
pub fn build_polygons_from_edges(edges: &BTreeMap<usize, BTreeSet<usize>>) -> Result<Vec<Vec<usize>>, CombineError> {
    let mut visited: BTreeSet<usize> = BTreeSet::new();
    let mut polygons = Vec::new();
    for &start in edges.keys() {
        if visited.contains(&start) {
            continue;
        }
        let mut polygon = Vec::new();
        let mut current = start;
        loop {
            visited.insert(current);
            polygon.push(current);
            let next = edges
                .get(&current)
                .and_then(|linked| linked.iter().copied().find(|neighbor| !visited.contains(neighbor)));
            match next {
                Some(next) => current = next,
                None => break,
            }
        }
        if polygon.len() <= 2 {
            return Err(CombineError::Geometric(format!(
                "Intersection chain from {} has only {} points",
                start,
                polygon.len()
            )));
        }
        let closes = polygon
            .last()
            .and_then(|last| edges.get(last))
            .is_some_and(|linked| linked.contains(&start));
        if !closes {
            return Err(CombineError::Geometric(format!(
                "Intersection chain from {} does not close",
                start
            )));
        }
        polygons.push(polygon);
    }
    Ok(polygons)
}

/// Every loop edge must be a mesh edge with a triangle on both sides,
/// otherwise flood fill would leak across the loop.
fn ensure_loops_owned(intersections: &[Vec<usize>], half_edges: &HalfEdgeMap, mesh: &str) -> Result<(), CombineError> {
    for intersection in intersections {
        for i in 0..intersection.len() {
            let (from, to) = (intersection[i], intersection[(i + 1) % intersection.len()]);
            if !half_edges.contains_key(&(from, to)) || !half_edges.contains_key(&(to, from)) {
                return Err(CombineError::Geometric(format!(
                    "Intersection edge {}-{} is not an edge of the {} mesh",
                    from, to, mesh
                )));
            }
        }
    }
    Ok(())
}

/// Partition `mesh_triangles` into groups bounded by the intersection loops.
///
/// Each loop seeds two groups, one per side: the triangle owning half-edge
/// `i → j` and the triangle owning `j → i`. Flood fill never crosses a loop
/// edge. Triangles the loops do not reach start groups of their own.
pub fn build_face_groups(
    intersections: &[Vec<usize>],
    half_edges: &HalfEdgeMap,
    triangles: &[[usize; 3]],
    mesh_triangles: &[usize],
) -> Vec<Vec<usize>> {
    let mut half_edge_groups: HashMap<(usize, usize), usize> = HashMap::new();
    let mut queue: VecDeque<(usize, usize)> = VecDeque::new();
    let mut group_count = 0;
    for intersection in intersections {
        for i in 0..intersection.len() {
            let j = (i + 1) % intersection.len();
            for (half_edge, group) in [
                ((intersection[i], intersection[j]), group_count),
                ((intersection[j], intersection[i]), group_count + 1),
            ] {
                half_edge_groups.entry(half_edge).or_insert(group);
                if let Some(&triangle) = half_edges.get(&half_edge) {
                    queue.push_back((triangle, group));
                }
            }
        }
        group_count += 2;
    }

    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); group_count];
    let mut visited = vec![false; triangles.len()];
    let mut flood = FloodFill {
        half_edges,
        triangles,
        half_edge_groups,
        visited: &mut visited,
    };
    flood.run(&mut queue, &mut groups);

    for &triangle_index in mesh_triangles {
        if flood.visited[triangle_index] {
            continue;
        }
        groups.push(Vec::new());
        queue.push_back((triangle_index, groups.len() - 1));
        flood.run(&mut queue, &mut groups);
    }
    groups
}

struct FloodFill<'a> {
    half_edges: &'a HalfEdgeMap,
    triangles: &'a [[usize; 3]],
    half_edge_groups: HashMap<(usize, usize), usize>,
    visited: &'a mut [bool],
}

impl FloodFill<'_> {
    /// Spread each queued group across shared edges until a claimed
    /// half-edge stops it.
    fn run(&mut self, queue: &mut VecDeque<(usize, usize)>, groups: &mut [Vec<usize>]) {
        while let Some((triangle_index, group)) = queue.pop_front() {
            if self.visited[triangle_index] {
                continue;
            }
            self.visited[triangle_index] = true;
            groups[group].push(triangle_index);
            let triangle = self.triangles[triangle_index];
            for k in 0..3 {
                let half_edge = (triangle[k], triangle[(k + 1) % 3]);
                if self.half_edge_groups.contains_key(&half_edge) {
                    continue;
                }
                self.half_edge_groups.insert(half_edge, group);
                if let Some(&neighbor) = self.half_edges.get(&(half_edge.1, half_edge.0)) {
                    queue.push_back((neighbor, group));
                }
            }
        }
    }
}

/// Normal of a `target` triangle that `point` lies on, if any.
fn surface_normal_at(point: &Point3<Real>, target: &SolidMesh) -> Option<Vector3<Real>> {
    let eps = tolerance();
    let nearby = Aabb::new(
        Point3::new(point.x - eps, point.y - eps, point.z - eps),
        Point3::new(point.x + eps, point.y + eps, point.z + eps),
    );
    target.tree().query(&nearby).into_iter().find_map(|candidate| {
        let normal = target.triangle_normals()[candidate];
        if normal.norm_squared() < 0.5 {
            return None;
        }
        let positions = target.triangle_positions(candidate);
        let distance = normal.dot(&(point - positions[0])).abs();
        (distance <= eps && point_in_triangle(point, &positions, &normal)).then_some(normal)
    })
}

/// Ray parity test: cast from `point` along `direction` past the far side of
/// `target` and count distinct crossings.
pub fn is_point_in_mesh(point: &Point3<Real>, target: &SolidMesh, direction: &Vector3<Real>) -> bool {
    let Some(direction) = direction.try_normalize(Real::EPSILON) else {
        return false;
    };
    let bounds = target.bounding_box();
    let reach = bounds.diagonal_length() + (point - bounds.center()).norm();
    let end = point + direction * (2.0 * reach + 1.0);
    let ray_box = Aabb::from_points([point, &end]);

    let mut hits: BTreeSet<PositionKey> = BTreeSet::new();
    for candidate in target.tree().query(&ray_box) {
        let normal = target.triangle_normals()[candidate];
        if normal.norm_squared() < 0.5 {
            continue;
        }
        let positions = target.triangle_positions(candidate);
        if let Some(intersection) = intersect_segment_and_plane(point, &end, &positions[0], &normal) {
            if point_in_triangle(&intersection, &positions, &normal) {
                hits.insert(PositionKey::from(&intersection));
            }
        }
    }
    hits.len() % 2 == 1
}
