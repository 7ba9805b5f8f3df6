//! Seam recombination.
//!
//! A boolean result leaves a ring of freshly created vertices where the two
//! inputs crossed, usually surrounded by thin slivers. The recombiner finds
//! the faces touching each such seam, pulls the boundary of that area back to
//! one clean edge loop per side, and bridges the two loops with a fresh strip
//! of triangles. Seams that cannot be bridged keep their original faces.

use crate::float_types::Real;
use crate::math::angle_between;
use crate::mesh::combiner::{Source, VertexSource};
use log::{debug, trace};
use nalgebra::{Point3, Vector2};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Display;

/// Longest boundary loop followed before giving up on it.
pub const MAX_EDGE_LOOP_LENGTH: usize = 1000;

/// Bridging triangle positions and their seam UVs.
pub type SeamTriangleUv = ([Point3<Real>; 3], [Vector2<Real>; 3]);

/// Why a recombination result should not replace the combined mesh
#[derive(Debug, Clone, PartialEq)]
pub enum RecombineDegraded {
    /// (DuplicateHalfEdge) Two faces walk the same directed edge
    DuplicateHalfEdge { from: usize, to: usize },
    /// (InvalidInput) Faces or sources do not match the vertex array
    InvalidInput { vertex_count: usize, source_count: usize },
}

impl Display for RecombineDegraded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecombineDegraded::DuplicateHalfEdge { from, to } => {
                write!(f, "(DuplicateHalfEdge) Halfedge {},{} belongs to more than one face", from, to)
            },
            RecombineDegraded::InvalidInput { vertex_count, source_count } => write!(
                f,
                "(InvalidInput) {} vertices with {} sources, or a face outside the vertex range",
                vertex_count, source_count
            ),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Recombined {
    pub vertices: Vec<Point3<Real>>,
    pub sources: Vec<VertexSource>,
    pub faces: Vec<Vec<usize>>,
    /// One list per bridged seam
    pub seam_triangle_uvs: Vec<Vec<SeamTriangleUv>>,
}

#[derive(Default)]
struct Island {
    half_edges: [Vec<(usize, usize)>; 2],
    edge_loops: [Vec<Vec<usize>>; 2],
}

pub struct MeshRecombiner<'a> {
    vertices: &'a [Point3<Real>],
    sources: &'a [VertexSource],
    faces: &'a [Vec<usize>],
    half_edge_to_face: BTreeMap<(usize, usize), usize>,
    faces_in_seam_area: BTreeMap<usize, usize>,
    good_seams: BTreeSet<usize>,
    regenerated_faces: Vec<Vec<usize>>,
    seam_uvs: BTreeMap<usize, Vec<SeamTriangleUv>>,
}

impl<'a> MeshRecombiner<'a> {
    pub fn new(vertices: &'a [Point3<Real>], sources: &'a [VertexSource], faces: &'a [Vec<usize>]) -> Self {
        Self {
            vertices,
            sources,
            faces,
            half_edge_to_face: BTreeMap::new(),
            faces_in_seam_area: BTreeMap::new(),
            good_seams: BTreeSet::new(),
            regenerated_faces: Vec::new(),
            seam_uvs: BTreeMap::new(),
        }
    }

    fn is_seam_vertex(&self, index: usize) -> bool {
        self.sources[index].source == Source::None
    }

    /// Rebuild the faces around every seam.
    ///
    /// `Err` means the input itself is unfit; the caller should keep the
    /// mesh it already has.
    pub fn recombine(mut self) -> Result<Recombined, RecombineDegraded> {
        if self.sources.len() != self.vertices.len()
            || self.faces.iter().flatten().any(|&index| index >= self.vertices.len())
        {
            return Err(RecombineDegraded::InvalidInput {
                vertex_count: self.vertices.len(),
                source_count: self.sources.len(),
            });
        }
        self.build_half_edge_to_face_map()?;

        let mut seam_link: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        for face in self.faces {
            for i in 0..face.len() {
                let (index, next) = (face[i], face[(i + 1) % face.len()]);
                if self.is_seam_vertex(index) && self.is_seam_vertex(next) {
                    seam_link.entry(index).or_default().insert(next);
                    seam_link.entry(next).or_default().insert(index);
                }
            }
        }
        let (seam_vertex_to_island, island_count) = split_seam_vertices_to_islands(&seam_link);
        trace!("{} seam islands", island_count);

        let mut edges_in_seam_area: BTreeMap<(usize, usize), (usize, bool)> = BTreeMap::new();
        for (face_index, face) in self.faces.iter().enumerate() {
            let mut island = None;
            let mut in_first_group = false;
            for &index in face {
                match self.sources[index].source {
                    Source::None => {
                        if let Some(&found) = seam_vertex_to_island.get(&index) {
                            island = Some(found);
                        }
                    },
                    Source::First => in_first_group = true,
                    Source::Second => {},
                }
            }
            let Some(island) = island else {
                continue;
            };
            self.faces_in_seam_area.insert(face_index, island);
            for i in 0..face.len() {
                edges_in_seam_area
                    .entry((face[i], face[(i + 1) % face.len()]))
                    .or_insert((island, in_first_group));
            }
        }

        let mut islands: BTreeMap<usize, Island> = BTreeMap::new();
        for (&(from, to), &(island, in_first_group)) in &edges_in_seam_area {
            if !edges_in_seam_area.contains_key(&(to, from)) {
                let side = if in_first_group { 0 } else { 1 };
                islands.entry(island).or_default().half_edges[side].push((from, to));
            }
        }
        for (island_index, island) in islands.iter_mut() {
            for side in 0..2 {
                match convert_half_edges_to_edge_loops(&island.half_edges[side]) {
                    Some(loops) => island.edge_loops[side] = loops,
                    None => debug!("Seam {} side {} has no closed boundary", island_index, side),
                }
            }
        }

        for (&island_index, island) in islands.iter_mut() {
            for edge_loop in island.edge_loops.iter_mut().flatten() {
                while self.adjust_triangles_from_seam(edge_loop, island_index) > 0 {}
            }
        }

        for (&island_index, island) in &islands {
            if let ([first], [second]) = (island.edge_loops[0].as_slice(), island.edge_loops[1].as_slice()) {
                if self.bridge(first, second, island_index) {
                    self.good_seams.insert(island_index);
                }
            }
        }
        trace!("{} of {} seams bridged", self.good_seams.len(), islands.len());

        self.copy_non_seam_faces_as_regenerated();
        Ok(self.remove_reluctant_vertices())
    }

    fn build_half_edge_to_face_map(&mut self) -> Result<(), RecombineDegraded> {
        let mut duplicate = None;
        for (face_index, face) in self.faces.iter().enumerate() {
            for i in 0..face.len() {
                let half_edge = (face[i], face[(i + 1) % face.len()]);
                if self.half_edge_to_face.contains_key(&half_edge) {
                    duplicate.get_or_insert(half_edge);
                } else {
                    self.half_edge_to_face.insert(half_edge, face_index);
                }
            }
        }
        match duplicate {
            Some((from, to)) => Err(RecombineDegraded::DuplicateHalfEdge { from, to }),
            None => Ok(()),
        }
    }

    /// Drop loop vertices whose two loop edges border the same outside
    /// triangle; that triangle moves into the seam area. Returns how many
    /// vertices were dropped.
    fn adjust_triangles_from_seam(&mut self, edge_loop: &mut Vec<usize>, seam_index: usize) -> usize {
        if edge_loop.len() <= 3 {
            return 0;
        }

        let mut half_edge_faces = Vec::with_capacity(edge_loop.len());
        for i in 0..edge_loop.len() {
            let j = (i + 1) % edge_loop.len();
            match self.half_edge_to_face.get(&(edge_loop[j], edge_loop[i])) {
                Some(&face) => half_edge_faces.push(face),
                None => return 0,
            }
        }

        let mut removed_faces = Vec::new();
        let mut ignored: BTreeSet<usize> = BTreeSet::new();
        let mut i = 0;
        while i < edge_loop.len() {
            let j = (i + 1) % edge_loop.len();
            if half_edge_faces[i] == half_edge_faces[j] {
                removed_faces.push(half_edge_faces[i]);
                ignored.insert(edge_loop[j]);
                i += 1;
            }
            i += 1;
        }

        if !ignored.is_empty() {
            let tightened: Vec<usize> = edge_loop.iter().copied().filter(|v| !ignored.contains(v)).collect();
            if tightened.len() < 3 {
                return 0;
            }
            *edge_loop = tightened;
            for face in removed_faces {
                self.faces_in_seam_area.insert(face, seam_index);
            }
        }
        ignored.len()
    }

    fn nearest_index(&self, position: &Point3<Real>, edge_loop: &[usize]) -> usize {
        let mut min_distance2 = Real::MAX;
        let mut chosen = 0;
        for (i, &vertex) in edge_loop.iter().enumerate() {
            let distance2 = (self.vertices[vertex] - position).norm_squared();
            if distance2 < min_distance2 {
                min_distance2 = distance2;
                chosen = i;
            }
        }
        chosen
    }

    /// Stitch the two loops of a seam together between mutually nearest
    /// vertex pairs.
    fn bridge(&mut self, first: &[usize], second: &[usize], seam_index: usize) -> bool {
        let (large, small) = if first.len() < second.len() {
            (second, first)
        } else {
            (first, second)
        };

        let mut matched_pairs: Vec<(usize, usize)> = Vec::new();
        let mut nearest_from_large: BTreeMap<usize, usize> = BTreeMap::new();
        for (i, &vertex) in small.iter().enumerate() {
            let nearest_on_large = self.nearest_index(&self.vertices[vertex], large);
            let nearest_on_small = *nearest_from_large
                .entry(nearest_on_large)
                .or_insert_with(|| self.nearest_index(&self.vertices[large[nearest_on_large]], small));
            if nearest_on_small == i {
                matched_pairs.push((i, nearest_on_large));
            }
        }
        if matched_pairs.is_empty() {
            return false;
        }

        let segment_count = matched_pairs.len();
        for i in 0..segment_count {
            let j = (i + 1) % segment_count;
            let small_side = walk_loop(small, matched_pairs[i].0, matched_pairs[j].0);
            let mut large_side = walk_loop(large, matched_pairs[j].1, matched_pairs[i].1);
            large_side.reverse();
            self.fill_pairs(&small_side, &large_side, seam_index, (i, segment_count));
        }
        true
    }

    /// Arc-length coordinate of each point of `side`, mapped into this
    /// segment's share of `[0, 1]`.
    fn side_coordinates(&self, side: &[usize], (segment, segment_count): (usize, usize)) -> Vec<Real> {
        let mut distances = Vec::with_capacity(side.len());
        let mut total = 0.0;
        distances.push(0.0);
        for pair in side.windows(2) {
            total += (self.vertices[pair[1]] - self.vertices[pair[0]]).norm();
            distances.push(total);
        }
        let last = (side.len().max(2) - 1) as Real;
        distances
            .iter()
            .enumerate()
            .map(|(k, distance)| {
                let fraction = if total > 0.0 { distance / total } else { k as Real / last };
                (segment as Real + fraction) / segment_count as Real
            })
            .collect()
    }

    fn fill_pairs(&mut self, small: &[usize], large: &[usize], seam_index: usize, segment: (usize, usize)) {
        let small_u = self.side_coordinates(small, segment);
        let large_u = self.side_coordinates(large, segment);
        let mut uvs = Vec::new();
        let mut small_index = 0;
        let mut large_index = 0;
        while small_index + 1 < small.len() || large_index + 1 < large.len() {
            let advance_small = if small_index + 1 < small.len() && large_index + 1 < large.len() {
                let on_small = &self.vertices[small[small_index]];
                let on_large = &self.vertices[large[large_index]];
                let angle_on_small = angle_between(
                    &(on_large - on_small),
                    &(self.vertices[small[small_index + 1]] - on_small),
                );
                let angle_on_large = angle_between(
                    &(on_small - on_large),
                    &(self.vertices[large[large_index + 1]] - on_large),
                );
                angle_on_small < angle_on_large
            } else {
                large_index + 1 >= large.len()
            };

            let (face, uv) = if advance_small {
                let face = [small[small_index], small[small_index + 1], large[large_index]];
                let uv = [
                    Vector2::new(small_u[small_index], 0.0),
                    Vector2::new(small_u[small_index + 1], 0.0),
                    Vector2::new(large_u[large_index], 1.0),
                ];
                small_index += 1;
                (face, uv)
            } else {
                let face = [large[large_index + 1], large[large_index], small[small_index]];
                let uv = [
                    Vector2::new(large_u[large_index + 1], 1.0),
                    Vector2::new(large_u[large_index], 1.0),
                    Vector2::new(small_u[small_index], 0.0),
                ];
                large_index += 1;
                (face, uv)
            };
            self.regenerated_faces.push(face.to_vec());
            uvs.push((face.map(|index| self.vertices[index]), uv));
        }
        self.seam_uvs.entry(seam_index).or_default().extend(uvs);
    }

    fn copy_non_seam_faces_as_regenerated(&mut self) {
        for (face_index, face) in self.faces.iter().enumerate() {
            let in_good_seam = self
                .faces_in_seam_area
                .get(&face_index)
                .is_some_and(|seam| self.good_seams.contains(seam));
            if !in_good_seam {
                self.regenerated_faces.push(face.clone());
            }
        }
    }

    /// Keep only referenced vertices, numbered in order of first use.
    fn remove_reluctant_vertices(self) -> Recombined {
        let mut old_to_new: BTreeMap<usize, usize> = BTreeMap::new();
        let mut vertices = Vec::new();
        let mut sources = Vec::new();
        let faces: Vec<Vec<usize>> = self
            .regenerated_faces
            .iter()
            .map(|face| {
                face.iter()
                    .map(|&index| {
                        *old_to_new.entry(index).or_insert_with(|| {
                            vertices.push(self.vertices[index]);
                            sources.push(self.sources[index]);
                            vertices.len() - 1
                        })
                    })
                    .collect()
            })
            .collect();
        let seam_triangle_uvs = self
            .good_seams
            .iter()
            .filter_map(|seam| self.seam_uvs.get(seam).cloned())
            .collect();
        Recombined {
            vertices,
            sources,
            faces,
            seam_triangle_uvs,
        }
    }
}

/// Loop positions from `from` to `to` inclusive, stepping forward at least
/// once so a single matched pair walks the whole loop.
fn walk_loop(edge_loop: &[usize], from: usize, to: usize) -> Vec<usize> {
    let mut side = vec![edge_loop[from]];
    let mut index = from;
    loop {
        index = (index + 1) % edge_loop.len();
        side.push(edge_loop[index]);
        if index == to {
            break;
        }
    }
    side
}

/// Breadth-first islands over the seam links, started from each vertex in
/// ascending order. Returns the island of every linked vertex and the count.
fn split_seam_vertices_to_islands(seam_link: &BTreeMap<usize, BTreeSet<usize>>) -> (BTreeMap<usize, usize>, usize) {
    let mut vertex_to_island: BTreeMap<usize, usize> = BTreeMap::new();
    let mut next_island = 0;
    for &start in seam_link.keys() {
        if vertex_to_island.contains_key(&start) {
            continue;
        }
        let mut queue = VecDeque::from([start]);
        while let Some(vertex) = queue.pop_front() {
            if vertex_to_island.contains_key(&vertex) {
                continue;
            }
            vertex_to_island.insert(vertex, next_island);
            if let Some(neighbors) = seam_link.get(&vertex) {
                queue.extend(neighbors.iter().copied());
            }
        }
        next_island += 1;
    }
    (vertex_to_island, next_island)
}

/// Chain directed boundary half-edges into closed loops. `None` on a repeated
/// start vertex, an open chain, a loop shorter than three, or one longer than
/// [`MAX_EDGE_LOOP_LENGTH`].
pub fn convert_half_edges_to_edge_loops(half_edges: &[(usize, usize)]) -> Option<Vec<Vec<usize>>> {
    let mut link: BTreeMap<usize, usize> = BTreeMap::new();
    for &(from, to) in half_edges {
        if link.insert(from, to).is_some() {
            return None;
        }
    }
    let mut edge_loops = Vec::new();
    while let Some((&head, _)) = link.first_key_value() {
        let mut edge_loop = Vec::new();
        let mut vertex = head;
        let mut closed = false;
        for _ in 0..MAX_EDGE_LOOP_LENGTH {
            edge_loop.push(vertex);
            let Some(&next) = link.get(&vertex) else {
                break;
            };
            vertex = next;
            if vertex == head {
                closed = true;
                break;
            }
        }
        if !closed || edge_loop.len() < 3 {
            return None;
        }
        for vertex in &edge_loop {
            link.remove(vertex);
        }
        edge_loops.push(edge_loop);
    }
    Some(edge_loops)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn half_edges_chain_into_loops() {
        let loops = convert_half_edges_to_edge_loops(&[(7, 8), (3, 4), (8, 9), (4, 5), (9, 7), (5, 3)]).unwrap();
        assert_eq!(loops, vec![vec![3, 4, 5], vec![7, 8, 9]]);
    }

    #[test]
    fn open_or_forked_chains_are_rejected() {
        assert!(convert_half_edges_to_edge_loops(&[(1, 2), (2, 3)]).is_none());
        assert!(convert_half_edges_to_edge_loops(&[(1, 2), (1, 3), (2, 1)]).is_none());
        assert!(convert_half_edges_to_edge_loops(&[(1, 2), (2, 1)]).is_none());
    }

    #[test]
    fn islands_follow_links() {
        let mut link: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        for (a, b) in [(1, 2), (2, 3), (10, 11)] {
            link.entry(a).or_default().insert(b);
            link.entry(b).or_default().insert(a);
        }
        let (islands, count) = split_seam_vertices_to_islands(&link);
        assert_eq!(count, 2);
        assert_eq!(islands[&3], 0);
        assert_eq!(islands[&11], 1);
    }

    #[test]
    fn walk_covers_whole_loop_for_single_pair() {
        assert_eq!(walk_loop(&[4, 5, 6], 1, 1), vec![5, 6, 4, 5]);
        assert_eq!(walk_loop(&[4, 5, 6, 7], 3, 1), vec![7, 4, 5]);
    }

    /// Two coaxial squares: an inner ring at z = 0 and an outer ring at z = 1,
    /// joined by a fan of sliver faces through four seam vertices.
    #[test]
    fn bridges_rings_between_sides() {
        let mut vertices = Vec::new();
        let mut sources = Vec::new();
        for (k, (x, y)) in [(1.0, 0.0), (0.0, 1.0), (-1.0, 0.0), (0.0, -1.0)].into_iter().enumerate() {
            vertices.push(Point3::new(x, y, 0.0));
            sources.push(VertexSource::new(Source::First, k));
        }
        for (k, (x, y)) in [(1.0, 0.0), (0.0, 1.0), (-1.0, 0.0), (0.0, -1.0)].into_iter().enumerate() {
            vertices.push(Point3::new(x, y, 1.0));
            sources.push(VertexSource::new(Source::Second, k));
        }
        for (x, y) in [(1.0, 0.0), (0.0, 1.0), (-1.0, 0.0), (0.0, -1.0)] {
            vertices.push(Point3::new(x, y, 0.5));
            sources.push(VertexSource::default());
        }
        // Band of quads: first ring to seam ring, seam ring to second ring.
        let mut faces = Vec::new();
        for i in 0..4 {
            let j = (i + 1) % 4;
            faces.push(vec![i, j, 8 + j]);
            faces.push(vec![i, 8 + j, 8 + i]);
            faces.push(vec![8 + i, 8 + j, 4 + j]);
            faces.push(vec![8 + i, 4 + j, 4 + i]);
        }

        let recombined = MeshRecombiner::new(&vertices, &sources, &faces).recombine().unwrap();
        assert!(recombined.sources.iter().all(|s| s.source != Source::None));
        assert_eq!(recombined.vertices.len(), 8);
        assert_eq!(recombined.faces.len(), 8);
        assert_eq!(recombined.seam_triangle_uvs.len(), 1);
        for (_, uv) in &recombined.seam_triangle_uvs[0] {
            for coordinate in uv {
                assert!((0.0..=1.0).contains(&coordinate.x));
                assert!(coordinate.y == 0.0 || coordinate.y == 1.0);
            }
        }
    }

    #[test]
    fn duplicate_half_edge_degrades() {
        let vertices = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)];
        let sources = vec![VertexSource::default(); 3];
        let faces = vec![vec![0, 1, 2], vec![0, 1, 2]];
        assert_eq!(
            MeshRecombiner::new(&vertices, &sources, &faces).recombine().unwrap_err(),
            RecombineDegraded::DuplicateHalfEdge { from: 0, to: 1 }
        );
    }
}
