//! Layout collaborator.
//!
//! The bootstrap coordinator asks a `LayoutEngine` for positions of nodes
//! that arrive from the backend without coordinates. Real geometry (collision
//! avoidance, balanced radial trees) lives outside this crate; `RadialLayout`
//! is a small deterministic engine that is good enough for seeding.

use std::collections::{HashMap, HashSet, VecDeque};
use std::f64::consts::TAU;

/// Node as seen by the layout engine
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutInput {
    pub id: String,
    pub parent_id: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
}

/// Computed position of one node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutPosition<'a> {
    pub id: &'a str,
    pub x: f64,
    pub y: f64,
}

/// Position provider.
///
/// Implementations return a position for every input id, keep nodes that
/// already have both coordinates where they are, and give the same answer
/// for the same input.
pub trait LayoutEngine: Send + Sync {
    fn compute_layout<'a>(&self, nodes: &'a [LayoutInput]) -> Vec<LayoutPosition<'a>>;
}

/// Places roots in a row and children on a ring around their parent
#[derive(Debug, Clone)]
pub struct RadialLayout {
    pub center: (f64, f64),
    pub radius: f64,
}

impl Default for RadialLayout {
    fn default() -> Self {
        Self {
            center: (2500.0, 2500.0),
            radius: 200.0,
        }
    }
}

impl RadialLayout {
    pub fn new(center: (f64, f64), radius: f64) -> Self {
        Self { center, radius }
    }
}

impl LayoutEngine for RadialLayout {
    fn compute_layout<'a>(&self, nodes: &'a [LayoutInput]) -> Vec<LayoutPosition<'a>> {
        let ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        let mut children: HashMap<&str, Vec<&LayoutInput>> = HashMap::new();
        let mut roots: Vec<&LayoutInput> = Vec::new();
        for node in nodes {
            match node.parent_id.as_deref().filter(|p| ids.contains(p) && *p != node.id) {
                Some(parent) => children.entry(parent).or_default().push(node),
                None => roots.push(node),
            }
        }
        roots.sort_by(|a, b| a.id.cmp(&b.id));
        for list in children.values_mut() {
            list.sort_by(|a, b| a.id.cmp(&b.id));
        }

        let mut placed: HashMap<&str, (f64, f64)> = HashMap::new();
        let mut queue: VecDeque<(&LayoutInput, usize)> = VecDeque::new();
        let spacing = self.radius * 3.0;
        let first = self.center.0 - spacing * (roots.len().saturating_sub(1)) as f64 / 2.0;
        for (index, root) in roots.iter().enumerate() {
            let position = match (root.x, root.y) {
                (Some(x), Some(y)) => (x, y),
                _ => (first + spacing * index as f64, self.center.1),
            };
            placed.insert(root.id.as_str(), position);
            queue.push_back((*root, 1));
        }

        while let Some((parent, depth)) = queue.pop_front() {
            let Some(kids) = children.get(parent.id.as_str()) else {
                continue;
            };
            let origin = placed.get(parent.id.as_str()).copied().unwrap_or(self.center);
            let count = kids.len().max(1) as f64;
            for (index, child) in kids.iter().enumerate() {
                if placed.contains_key(child.id.as_str()) {
                    continue;
                }
                let position = match (child.x, child.y) {
                    (Some(x), Some(y)) => (x, y),
                    _ => {
                        let angle = TAU * index as f64 / count;
                        let ring = self.radius * depth as f64;
                        (origin.0 + ring * angle.cos(), origin.1 + ring * angle.sin())
                    }
                };
                placed.insert(child.id.as_str(), position);
                queue.push_back((*child, depth + 1));
            }
        }

        nodes
            .iter()
            .map(|node| {
                // Unplaced here means the node hangs off a parent cycle
                let (x, y) = placed
                    .get(node.id.as_str())
                    .copied()
                    .or_else(|| node.x.zip(node.y))
                    .unwrap_or(self.center);
                LayoutPosition {
                    id: node.id.as_str(),
                    x,
                    y,
                }
            })
            .collect()
    }
}

/// Clamp a coordinate to `0..=max`
pub fn clamp_coordinate(value: f64, max: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, max)
}
