//! Polygon face triangulation.
//!
//! Triangles pass through, quads split along their `0-2` diagonal, and larger
//! polygons are projected onto their average plane and ear-clipped.

use crate::errors::{CombineError, TriangulateError};
use crate::float_types::Real;
use crate::math::{project_to_2d, signed_area_2d, triangle_normal};
use log::warn;
use nalgebra::{Point2, Point3, Vector3};

/// Ear-clip a 2D polygon with holes.
///
/// Returned indices address the concatenation `outer ++ holes[0] ++ holes[1] ...`.
/// Every triangle is wound counter-clockwise and zero-area ears are dropped.
pub fn earcut_2d(outer: &[Point2<Real>], holes: &[Vec<Point2<Real>>]) -> Result<Vec<[usize; 3]>, TriangulateError> {
    let mut data: Vec<Real> = Vec::with_capacity(2 * (outer.len() + holes.iter().map(Vec::len).sum::<usize>()));
    let mut hole_indices = Vec::with_capacity(holes.len());
    let mut points: Vec<Point2<Real>> = Vec::with_capacity(data.capacity() / 2);

    for point in outer {
        data.extend_from_slice(&[point.x, point.y]);
        points.push(*point);
    }
    for hole in holes {
        hole_indices.push(points.len());
        for point in hole {
            data.extend_from_slice(&[point.x, point.y]);
            points.push(*point);
        }
    }

    let indices = earcutr::earcut(&data, &hole_indices, 2).map_err(|error| {
        warn!("Earcut rejected a polygon of {} points: {:?}", points.len(), error);
        TriangulateError::Earcut(format!("{:?}", error))
    })?;

    let mut triangles = Vec::with_capacity(indices.len() / 3);
    for chunk in indices.chunks_exact(3) {
        let (a, b, c) = (chunk[0], chunk[1], chunk[2]);
        let area = signed_area_2d(&points[a], &points[b], &points[c]);
        if area > 0.0 {
            triangles.push([a, b, c]);
        } else if area < 0.0 {
            triangles.push([a, c, b]);
        }
    }
    Ok(triangles)
}

/// Newell-style average normal of a polygon: the sum of the normals of every
/// consecutive corner triple.
pub fn polygon_normal(vertices: &[Point3<Real>], face: &[usize]) -> Vector3<Real> {
    let mut normal = Vector3::zeros();
    for i in 0..face.len() {
        let j = (i + 1) % face.len();
        let k = (i + 2) % face.len();
        normal += triangle_normal(&vertices[face[i]], &vertices[face[j]], &vertices[face[k]]);
    }
    normal.try_normalize(Real::EPSILON).unwrap_or_else(Vector3::zeros)
}

/// Triangulate a single face and append the triangles to `triangles`.
pub fn triangulate_face(
    vertices: &[Point3<Real>],
    face: &[usize],
    triangles: &mut Vec<[usize; 3]>,
) -> Result<(), TriangulateError> {
    match face.len() {
        0..=2 => {
            warn!("Skipped a face with only {} indices", face.len());
            Ok(())
        },
        3 => {
            triangles.push([face[0], face[1], face[2]]);
            Ok(())
        },
        4 => {
            triangles.push([face[0], face[1], face[2]]);
            triangles.push([face[2], face[3], face[0]]);
            Ok(())
        },
        _ => {
            let normal = polygon_normal(vertices, face);
            let axis = (vertices[face[1]] - vertices[face[0]])
                .try_normalize(Real::EPSILON)
                .ok_or(TriangulateError::DegeneratePolygon(face.len()))?;
            if normal == Vector3::zeros() {
                return Err(TriangulateError::DegeneratePolygon(face.len()));
            }
            let origin = vertices[face[0]];
            let projected: Vec<Point2<Real>> = face
                .iter()
                .map(|&index| project_to_2d(&vertices[index], &normal, &axis, &origin))
                .collect();
            for [a, b, c] in earcut_2d(&projected, &[])? {
                triangles.push([face[a], face[b], face[c]]);
            }
            Ok(())
        },
    }
}

/// Triangulate every face, validating indices first.
pub fn triangulate(vertices: &[Point3<Real>], faces: &[Vec<usize>]) -> Result<Vec<[usize; 3]>, CombineError> {
    for (face_index, face) in faces.iter().enumerate() {
        if let Some(&index) = face.iter().find(|&&index| index >= vertices.len()) {
            return Err(CombineError::InvalidInput {
                face: face_index,
                index,
                vertex_count: vertices.len(),
            });
        }
    }
    let mut triangles = Vec::with_capacity(faces.len() * 2);
    for face in faces {
        triangulate_face(vertices, face, &mut triangles)?;
    }
    Ok(triangles)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn quad_splits_on_first_diagonal() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let triangles = triangulate(&vertices, &[vec![0, 1, 2, 3]]).unwrap();
        assert_eq!(triangles, vec![[0, 1, 2], [2, 3, 0]]);
    }

    #[test]
    fn pentagon_keeps_winding() {
        let vertices: Vec<Point3<Real>> = (0..5)
            .map(|i| {
                let angle = i as Real * crate::float_types::TAU / 5.0;
                Point3::new(angle.cos(), angle.sin(), 2.0)
            })
            .collect();
        let triangles = triangulate(&vertices, &[vec![0, 1, 2, 3, 4]]).unwrap();
        assert_eq!(triangles.len(), 3);
        for [a, b, c] in triangles {
            let normal = triangle_normal(&vertices[a], &vertices[b], &vertices[c]);
            assert!(normal.z > 0.99);
        }
    }

    #[test]
    fn out_of_range_face_is_invalid_input() {
        let vertices = vec![Point3::origin(); 3];
        assert!(matches!(
            triangulate(&vertices, &[vec![0, 1, 7]]),
            Err(CombineError::InvalidInput { index: 7, .. })
        ));
    }

    #[test]
    fn earcut_with_hole() {
        let outer = vec![
            Point2::new(0.0, 0.0),
            Point2::new(4.0, 0.0),
            Point2::new(4.0, 4.0),
            Point2::new(0.0, 4.0),
        ];
        let hole = vec![
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 3.0),
            Point2::new(3.0, 3.0),
            Point2::new(3.0, 1.0),
        ];
        let triangles = earcut_2d(&outer, &[hole]).unwrap();
        let points: Vec<Point2<Real>> = outer
            .iter()
            .chain([Point2::new(1.0, 1.0), Point2::new(1.0, 3.0), Point2::new(3.0, 3.0), Point2::new(3.0, 1.0)].iter())
            .copied()
            .collect();
        let area: Real = triangles
            .iter()
            .map(|t| signed_area_2d(&points[t[0]], &points[t[1]], &points[t[2]]) / 2.0)
            .sum();
        assert!((area - 12.0).abs() < 1e-9);
    }
}
