use crate::float_types::Real;
use crate::mesh::Mesh;
use crate::position_key::PositionKey;
use hashbrown::HashMap;
use nalgebra::Point3;
use std::collections::{BTreeMap, BTreeSet};

/// Checks that indexed faces close up
///
/// ### Returns
/// Returns `true` if every directed edge appears once and its reverse is
/// present too.
///
/// ### Notes:
/// - Faces may have any number of indices; edges wrap around the face.
/// - Consistent winding is implied: two neighbors walking a shared edge the
///   same way produce a duplicated directed edge.
pub fn is_watertight<F: AsRef<[usize]>>(faces: &[F]) -> bool {
    let mut half_edges: BTreeSet<(usize, usize)> = BTreeSet::new();
    for face in faces {
        let face = face.as_ref();
        for i in 0..face.len() {
            let j = (i + 1) % face.len();
            if !half_edges.insert((face[i], face[j])) {
                return false;
            }
        }
    }
    half_edges
        .iter()
        .all(|&(from, to)| half_edges.contains(&(to, from)))
}

/// Position keys of every triangle touching a directed edge that is either
/// repeated or missing its reverse.
pub fn broken_triangles(vertices: &[Point3<Real>], triangles: &[[usize; 3]]) -> BTreeSet<[PositionKey; 3]> {
    let mut counts: HashMap<(usize, usize), usize> = HashMap::new();
    for triangle in triangles {
        for k in 0..3 {
            *counts.entry((triangle[k], triangle[(k + 1) % 3])).or_insert(0) += 1;
        }
    }
    let is_broken = |from: usize, to: usize| {
        counts.get(&(from, to)).copied().unwrap_or(0) != 1 || !counts.contains_key(&(to, from))
    };
    triangles
        .iter()
        .filter(|triangle| (0..3).any(|k| is_broken(triangle[k], triangle[(k + 1) % 3])))
        .map(|triangle| triangle.map(|index| PositionKey::from(&vertices[index])))
        .collect()
}

/// Diagonals of every quad face, as position key pairs.
///
/// Quads are split along a diagonal when triangulated; these pairs let
/// [`recover_quads`] merge the two halves back after combination.
pub fn collect_shared_quad_edges(
    vertices: &[Point3<Real>],
    faces: &[Vec<usize>],
    shared_quad_edges: &mut BTreeSet<(PositionKey, PositionKey)>,
) {
    for face in faces.iter().filter(|face| face.len() == 4) {
        shared_quad_edges.insert((PositionKey::from(&vertices[face[0]]), PositionKey::from(&vertices[face[2]])));
        shared_quad_edges.insert((PositionKey::from(&vertices[face[1]]), PositionKey::from(&vertices[face[3]])));
    }
}

/// Merge triangle pairs that share a recorded quad diagonal back into quads.
/// Triangles that find no partner pass through unchanged, after the quads.
pub fn recover_quads(
    vertices: &[Point3<Real>],
    triangles: &[[usize; 3]],
    shared_quad_edges: &BTreeSet<(PositionKey, PositionKey)>,
) -> Vec<Vec<usize>> {
    let keys: Vec<PositionKey> = vertices.iter().map(PositionKey::from).collect();

    // Directed edge -> (triangle, opposite corner)
    let mut edge_map: BTreeMap<(usize, usize), (usize, usize)> = BTreeMap::new();
    for (index, t) in triangles.iter().enumerate() {
        edge_map.insert((t[0], t[1]), (index, t[2]));
        edge_map.insert((t[1], t[2]), (index, t[0]));
        edge_map.insert((t[2], t[0]), (index, t[1]));
    }

    let mut merged = vec![false; triangles.len()];
    let mut faces = Vec::new();
    for (&(from, to), &(triangle, opposite)) in &edge_map {
        if merged[triangle] || !shared_quad_edges.contains(&(keys[from], keys[to])) {
            continue;
        }
        if let Some(&(other, other_opposite)) = edge_map.get(&(to, from)) {
            if merged[other] || other == triangle {
                continue;
            }
            merged[triangle] = true;
            merged[other] = true;
            faces.push(vec![opposite, from, other_opposite, to]);
        }
    }
    faces.extend(
        triangles
            .iter()
            .zip(merged.iter())
            .filter(|(_, merged)| !**merged)
            .map(|(triangle, _)| triangle.to_vec()),
    );
    faces
}

impl Mesh {
    /// Checks if the mesh is manifold by position
    ///
    /// ### Returns
    /// Returns `true` if every undirected edge, keyed by quantized corner
    /// positions, is used by exactly two triangles.
    ///
    /// ### Notes:
    /// - Unlike [`is_watertight`] this ignores vertex identity, so seams made
    ///   of duplicated vertices still count as closed.
    pub fn is_manifold(&self) -> bool {
        let mut edge_counts: HashMap<(PositionKey, PositionKey), u32> = HashMap::new();
        for triangle in self.triangles() {
            for &(i0, i1) in &[(0, 1), (1, 2), (2, 0)] {
                let p0 = PositionKey::from(&self.vertices()[triangle[i0]]);
                let p1 = PositionKey::from(&self.vertices()[triangle[i1]]);
                let key = if p0 < p1 { (p0, p1) } else { (p1, p0) };
                *edge_counts.entry(key).or_insert(0) += 1;
            }
        }
        edge_counts.values().all(|&count| count == 2)
    }

    pub fn is_watertight(&self) -> bool {
        is_watertight(self.triangles())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::shapes;

    #[test]
    fn open_fan_is_not_watertight() {
        let faces = vec![[0, 1, 2], [0, 2, 3]];
        assert!(!is_watertight(&faces));
    }

    #[test]
    fn flipped_face_is_not_watertight() {
        let (_, mut faces) = shapes::octahedron(1.0);
        assert!(is_watertight(&faces));
        faces[0].reverse();
        assert!(!is_watertight(&faces));
    }

    #[test]
    fn broken_triangles_follow_the_hole() {
        let (vertices, faces) = shapes::octahedron(1.0);
        let mut triangles: Vec<[usize; 3]> = faces.iter().map(|f| [f[0], f[1], f[2]]).collect();
        assert!(broken_triangles(&vertices, &triangles).is_empty());
        triangles.remove(0);
        // The three neighbors of the removed face lose one reverse edge each.
        assert_eq!(broken_triangles(&vertices, &triangles).len(), 3);
    }

    #[test]
    fn cube_quads_are_recovered() {
        let (vertices, faces) = shapes::cube(2.0);
        let mesh = Mesh::new(vertices.clone(), &faces).unwrap();
        assert!(mesh.is_manifold());
        let mut shared = BTreeSet::new();
        collect_shared_quad_edges(&vertices, &faces, &mut shared);
        let recovered = recover_quads(mesh.vertices(), mesh.triangles(), &shared);
        assert_eq!(recovered.len(), 6);
        assert!(recovered.iter().all(|face| face.len() == 4));
        assert!(is_watertight(&recovered));
    }
}
