//! Static bounding-volume hierarchy over a fixed array of boxes.
//!
//! Nodes live in a flat arena and refer to their children by index, so the
//! tree is plain data: built once, never mutated, and safe to query from
//! several threads at the same time.

use crate::aabb::Aabb;
use crate::float_types::Real;
use nalgebra::Point3;

/// Nodes holding at most this many boxes are not split further.
pub const LEAF_CAPACITY: usize = 20;

#[derive(Clone, Debug)]
pub struct Node {
    pub bbox: Aabb,
    /// Mean of the member box centers
    pub center: Point3<Real>,
    /// Member box indices. Cleared on internal nodes once they are split.
    pub indices: Vec<usize>,
    /// Number of boxes below this node
    pub len: usize,
    pub children: Option<[usize; 2]>,
}

impl Node {
    #[inline]
    pub const fn is_leaf(&self) -> bool {
        self.children.is_none()
    }
}

#[derive(Clone, Debug)]
pub struct AabbTree {
    boxes: Vec<Aabb>,
    nodes: Vec<Node>,
}

impl AabbTree {
    /// Build a tree over every box in `boxes`.
    pub fn from_boxes(boxes: Vec<Aabb>) -> Self {
        let mut outer = Aabb::empty();
        for aabb in &boxes {
            outer.merge(aabb);
        }
        outer.update_center();
        let indices = (0..boxes.len()).collect();
        Self::new(boxes, indices, outer)
    }

    /// Build a tree over the boxes named by `indices`, bounded by `outer`.
    pub fn new(boxes: Vec<Aabb>, indices: Vec<usize>, outer: Aabb) -> Self {
        let center = mean_center(&boxes, &indices);
        let root = Node {
            bbox: outer,
            center,
            len: indices.len(),
            indices,
            children: None,
        };
        let mut tree = Self {
            boxes,
            nodes: vec![root],
        };
        tree.build();
        tree
    }

    fn build(&mut self) {
        let mut stack = vec![0usize];
        while let Some(node_id) = stack.pop() {
            if self.nodes[node_id].indices.len() <= LEAF_CAPACITY {
                continue;
            }
            let axis = self.nodes[node_id].bbox.longest_axis();
            let split = self.nodes[node_id].center[axis];
            let indices = std::mem::take(&mut self.nodes[node_id].indices);

            let (mut left, mut right): (Vec<usize>, Vec<usize>) = indices
                .into_iter()
                .partition(|&index| self.boxes[index].center()[axis] < split);

            // Everything fell on one side of the mean; fall back to an even split.
            if left.is_empty() {
                let half = right.len() / 2;
                left = right.drain(..half).collect();
            } else if right.is_empty() {
                let half = left.len() / 2;
                right = left.drain(..half).collect();
            }

            let left_id = self.push_node(left);
            let right_id = self.push_node(right);
            self.nodes[node_id].children = Some([left_id, right_id]);
            stack.push(right_id);
            stack.push(left_id);
        }
    }

    fn push_node(&mut self, indices: Vec<usize>) -> usize {
        let mut bbox = Aabb::empty();
        for &index in &indices {
            let member = &self.boxes[index];
            bbox.update(member.lower_bound());
            bbox.update(member.upper_bound());
        }
        bbox.update_center();
        let node = Node {
            bbox,
            center: mean_center(&self.boxes, &indices),
            len: indices.len(),
            indices,
            children: None,
        };
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    #[inline]
    pub fn boxes(&self) -> &[Aabb] {
        &self.boxes
    }

    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[inline]
    pub fn root(&self) -> &Node {
        &self.nodes[0]
    }

    /// Collect every `(i, j)` where `self.boxes()[i]` overlaps `other.boxes()[j]`.
    ///
    /// Node pairs are only descended when their bounds overlap. Between two
    /// internal nodes the one holding more boxes is split first, and the
    /// leaf level runs exact box tests, so the result has neither false
    /// negatives nor false positives.
    pub fn test(&self, other: &AabbTree, pairs: &mut Vec<(usize, usize)>) {
        let mut stack = vec![(0usize, 0usize)];
        while let Some((first_id, second_id)) = stack.pop() {
            let first = &self.nodes[first_id];
            let second = &other.nodes[second_id];
            if !first.bbox.intersects(&second.bbox) {
                continue;
            }
            match (first.children, second.children) {
                (None, None) => {
                    for &i in &first.indices {
                        for &j in &second.indices {
                            if self.boxes[i].intersects(&other.boxes[j]) {
                                pairs.push((i, j));
                            }
                        }
                    }
                },
                (None, Some([left, right])) => {
                    stack.push((first_id, right));
                    stack.push((first_id, left));
                },
                (Some([left, right]), None) => {
                    stack.push((right, second_id));
                    stack.push((left, second_id));
                },
                (Some([first_left, first_right]), Some([second_left, second_right])) => {
                    if first.len < second.len {
                        stack.push((first_id, second_right));
                        stack.push((first_id, second_left));
                    } else {
                        stack.push((first_right, second_id));
                        stack.push((first_left, second_id));
                    }
                },
            }
        }
    }

    /// Indices of every box overlapping `bbox`.
    pub fn query(&self, bbox: &Aabb) -> Vec<usize> {
        let mut found = Vec::new();
        let mut stack = vec![0usize];
        while let Some(node_id) = stack.pop() {
            let node = &self.nodes[node_id];
            if !node.bbox.intersects(bbox) {
                continue;
            }
            match node.children {
                None => found.extend(
                    node.indices
                        .iter()
                        .copied()
                        .filter(|&index| self.boxes[index].intersects(bbox)),
                ),
                Some([left, right]) => {
                    stack.push(right);
                    stack.push(left);
                },
            }
        }
        found
    }
}

fn mean_center(boxes: &[Aabb], indices: &[usize]) -> Point3<Real> {
    if indices.is_empty() {
        return Point3::origin();
    }
    let sum = indices
        .iter()
        .fold(nalgebra::Vector3::zeros(), |sum, &index| sum + boxes[index].center().coords);
    Point3::from(sum / indices.len() as Real)
}

#[cfg(test)]
mod test {
    use super::*;

    fn grid_boxes(count: usize, offset: Real) -> Vec<Aabb> {
        (0..count)
            .map(|i| {
                let x = (i % 10) as Real + offset;
                let y = (i / 10) as Real + offset;
                Aabb::new(Point3::new(x, y, 0.0), Point3::new(x + 0.6, y + 0.6, 0.6))
            })
            .collect()
    }

    #[test]
    fn leaves_respect_capacity() {
        let tree = AabbTree::from_boxes(grid_boxes(100, 0.0));
        let mut seen = 0;
        for node in tree.nodes() {
            if node.is_leaf() {
                assert!(node.indices.len() <= LEAF_CAPACITY);
                seen += node.indices.len();
            }
        }
        assert_eq!(seen, 100);
    }

    #[test]
    fn identical_centers_still_split() {
        let boxes = vec![Aabb::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0)); 64];
        let tree = AabbTree::from_boxes(boxes);
        assert!(tree.nodes().len() > 1);
        for node in tree.nodes().iter().filter(|node| node.is_leaf()) {
            assert!(node.indices.len() <= LEAF_CAPACITY);
        }
    }

    #[test]
    fn test_matches_brute_force() {
        let first_boxes = grid_boxes(60, 0.0);
        let second_boxes = grid_boxes(45, 0.5);
        let first = AabbTree::from_boxes(first_boxes.clone());
        let second = AabbTree::from_boxes(second_boxes.clone());
        let mut pairs = Vec::new();
        first.test(&second, &mut pairs);
        pairs.sort();

        let mut expected = Vec::new();
        for (i, a) in first_boxes.iter().enumerate() {
            for (j, b) in second_boxes.iter().enumerate() {
                if a.intersects(b) {
                    expected.push((i, j));
                }
            }
        }
        assert_eq!(pairs, expected);
    }

    #[test]
    fn query_finds_overlaps() {
        let tree = AabbTree::from_boxes(grid_boxes(30, 0.0));
        let window = Aabb::new(Point3::new(2.7, 0.3, 0.1), Point3::new(3.1, 0.5, 0.2));
        let mut found = tree.query(&window);
        found.sort();
        assert_eq!(found, vec![3]);
    }
}
