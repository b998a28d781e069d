//! Per-course content graph: ordered node arena plus prerequisite adjacency.
//!
//! Nodes are stored sorted by `order` so "every item before this one" is a
//! prefix of the arena. Edges point from a content item to its prerequisites.

use std::collections::{HashMap, HashSet};

use crate::model::{ContentItem, Course};
use crate::storage::PrerequisiteEdge;

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: String,
    pub order: i64,
    pub required: bool,
}

/// Sequencing flags of the course the graph belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequencePolicy {
    pub sequential_required: bool,
    pub allow_skipping: bool,
}

impl From<&Course> for SequencePolicy {
    fn from(course: &Course) -> Self {
        Self {
            sequential_required: course.sequential_required,
            allow_skipping: course.allow_skipping,
        }
    }
}

impl SequencePolicy {
    /// Whether order restricts access at all.
    pub fn enforces_order(&self) -> bool {
        self.sequential_required && !self.allow_skipping
    }
}

#[derive(Debug, Clone)]
pub struct CourseGraph {
    pub course_id: String,
    pub policy: SequencePolicy,
    nodes: Vec<GraphNode>,
    index: HashMap<String, usize>,
    prerequisites: Vec<Vec<usize>>,
    /// Position of the first node whose order equals `nodes[i].order`.
    order_start: Vec<usize>,
}

impl CourseGraph {
    /// Builds the graph from the course items and stored edges.
    ///
    /// Edges naming items outside the course are ignored.
    pub fn build(course: &Course, items: &[ContentItem], edges: &[PrerequisiteEdge]) -> Self {
        let mut sorted: Vec<&ContentItem> = items.iter().collect();
        sorted.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));

        let nodes: Vec<GraphNode> = sorted
            .iter()
            .map(|item| GraphNode {
                id: item.id.clone(),
                order: item.order,
                required: item.required,
            })
            .collect();

        let index: HashMap<String, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.clone(), i))
            .collect();

        let mut prerequisites = vec![Vec::new(); nodes.len()];
        for edge in edges {
            if let (Some(&from), Some(&to)) = (
                index.get(&edge.content_item_id),
                index.get(&edge.prerequisite_id),
            ) {
                if !prerequisites[from].contains(&to) {
                    prerequisites[from].push(to);
                }
            }
        }

        let mut order_start = Vec::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            let start = match i {
                0 => 0,
                _ if nodes[i - 1].order == node.order => order_start[i - 1],
                _ => i,
            };
            order_start.push(start);
        }

        Self {
            course_id: course.id.clone(),
            policy: SequencePolicy::from(course),
            nodes,
            index,
            prerequisites,
            order_start,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Direct prerequisites of an item.
    pub fn prerequisites_of(&self, id: &str) -> Vec<&str> {
        self.index
            .get(id)
            .map(|&i| {
                self.prerequisites[i]
                    .iter()
                    .map(|&p| self.nodes[p].id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether an item is reachable for a user with the given completions.
    pub fn is_unlocked(&self, id: &str, completed: &HashSet<String>) -> bool {
        let Some(&idx) = self.index.get(id) else {
            return false;
        };

        let prerequisites_met = self.prerequisites[idx]
            .iter()
            .all(|&p| completed.contains(&self.nodes[p].id));
        if !prerequisites_met {
            return false;
        }

        if !self.policy.enforces_order() {
            return true;
        }

        // Items with strictly lower order are exactly the prefix before the
        // first node sharing this node's order.
        self.nodes[..self.order_start[idx]]
            .iter()
            .all(|node| !node.required || completed.contains(&node.id))
    }

    /// The first item whose order is strictly greater than `id`'s.
    pub fn next_after(&self, id: &str) -> Option<&GraphNode> {
        let &idx = self.index.get(id)?;
        let order = self.nodes[idx].order;
        self.nodes[idx + 1..].iter().find(|node| node.order > order)
    }

    /// Whether `to` is reachable from `from` following prerequisite edges.
    pub fn reaches(&self, from: &str, to: &str) -> bool {
        match (self.index.get(from), self.index.get(to)) {
            (Some(&from), Some(&to)) => self.reaches_idx(from, to, None),
            _ => false,
        }
    }

    /// Whether setting `target`'s prerequisites to `proposed` would close a
    /// cycle. The target's current edges are ignored.
    pub fn would_cycle(&self, target: &str, proposed: &[String]) -> bool {
        let Some(&target_idx) = self.index.get(target) else {
            return false;
        };
        proposed.iter().any(|p| match self.index.get(p) {
            Some(&p_idx) => p_idx == target_idx || self.reaches_idx(p_idx, target_idx, Some(target_idx)),
            None => false,
        })
    }

    /// Whether adding the single edge `target -> prerequisite` closes a cycle.
    pub fn edge_would_cycle(&self, target: &str, prerequisite: &str) -> bool {
        target == prerequisite || self.reaches(prerequisite, target)
    }

    /// Iterative DFS over prerequisite edges. Edges out of `skip_edges_of`
    /// are not followed.
    fn reaches_idx(&self, from: usize, to: usize, skip_edges_of: Option<usize>) -> bool {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if seen[current] {
                continue;
            }
            seen[current] = true;
            if skip_edges_of == Some(current) {
                continue;
            }
            stack.extend(self.prerequisites[current].iter().copied());
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContentType;

    fn item(id: &str, order: i64) -> ContentItem {
        ContentItem::new(id, "c1", ContentType::Pdf, order)
    }

    fn edge(from: &str, to: &str) -> PrerequisiteEdge {
        PrerequisiteEdge {
            content_item_id: from.to_string(),
            prerequisite_id: to.to_string(),
        }
    }

    fn done(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_non_sequential_course_unlocks_everything() {
        let items = vec![item("a", 1), item("b", 2)];
        let graph = CourseGraph::build(&Course::new("c1"), &items, &[]);
        assert!(graph.is_unlocked("b", &done(&[])));
        assert!(!graph.is_unlocked("missing", &done(&[])));
    }

    #[test]
    fn test_sequential_course_requires_earlier_required_items() {
        let items = vec![item("c", 3), item("a", 1), item("b", 2).optional()];
        let graph = CourseGraph::build(&Course::new("c1").sequential(false), &items, &[]);

        assert!(graph.is_unlocked("a", &done(&[])));
        // Optional "b" never blocks.
        assert!(graph.is_unlocked("b", &done(&["a"])));
        assert!(!graph.is_unlocked("c", &done(&[])));
        assert!(graph.is_unlocked("c", &done(&["a"])));
    }

    #[test]
    fn test_equal_order_items_do_not_block_each_other() {
        let items = vec![item("a", 1), item("b", 1), item("c", 2)];
        let graph = CourseGraph::build(&Course::new("c1").sequential(false), &items, &[]);
        assert!(graph.is_unlocked("b", &done(&[])));
        assert!(!graph.is_unlocked("c", &done(&["a"])));
        assert!(graph.is_unlocked("c", &done(&["a", "b"])));
    }

    #[test]
    fn test_allow_skipping_lifts_order_but_not_edges() {
        let items = vec![item("a", 1), item("b", 2), item("c", 3)];
        let graph = CourseGraph::build(
            &Course::new("c1").sequential(true),
            &items,
            &[edge("c", "a")],
        );
        assert!(graph.is_unlocked("b", &done(&[])));
        assert!(!graph.is_unlocked("c", &done(&["b"])));
        assert!(graph.is_unlocked("c", &done(&["a"])));
    }

    #[test]
    fn test_next_after_skips_equal_order() {
        let items = vec![item("a", 1), item("b", 1), item("c", 2)];
        let graph = CourseGraph::build(&Course::new("c1"), &items, &[]);
        assert_eq!(graph.next_after("a").map(|n| n.id.as_str()), Some("c"));
        assert!(graph.next_after("c").is_none());
    }

    #[test]
    fn test_cycle_detection() {
        let items = vec![item("a", 1), item("b", 2), item("c", 3)];
        let graph = CourseGraph::build(
            &Course::new("c1"),
            &items,
            &[edge("b", "a"), edge("c", "b")],
        );

        assert!(graph.reaches("c", "a"));
        assert!(graph.edge_would_cycle("a", "c"));
        assert!(graph.edge_would_cycle("a", "a"));
        assert!(!graph.edge_would_cycle("c", "a"));

        assert!(graph.would_cycle("a", &["b".to_string()]));
        // Replacing b's own edges cannot cycle through them.
        assert!(!graph.would_cycle("b", &["a".to_string()]));
        assert!(graph.would_cycle("b", &["c".to_string()]));
    }

    #[test]
    fn test_foreign_edges_ignored() {
        let items = vec![item("a", 1)];
        let graph = CourseGraph::build(&Course::new("c1"), &items, &[edge("a", "elsewhere")]);
        assert!(graph.prerequisites_of("a").is_empty());
        assert!(graph.is_unlocked("a", &done(&[])));
    }
}
