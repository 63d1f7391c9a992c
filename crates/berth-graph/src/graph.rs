//! Image ancestry graph using `petgraph`.
//!
//! Nodes are image records in the order the engine listed them; an edge points
//! from a parent image to each image built on top of it. Sibling order is
//! therefore listing order, which keeps traversal deterministic.

use std::collections::{HashMap, HashSet};

use berth_common::error::{BerthError, Result};
use berth_common::types::{ImageId, ImageRecord};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

/// The image forest known at resolution time, indexed by id.
#[derive(Debug, Default)]
pub struct ImageGraph {
    graph: DiGraph<ImageRecord, ()>,
    index: HashMap<ImageId, NodeIndex>,
}

impl ImageGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph from an engine listing.
    ///
    /// Parent references that name an image outside the listing are kept on
    /// the record but produce no edge. Duplicate ids keep the first record.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = ImageRecord>) -> Self {
        let mut graph = Self::new();
        for record in records {
            if graph.index.contains_key(&record.id) {
                tracing::warn!(id = %record.id, "duplicate image in listing, keeping first");
                continue;
            }
            let id = record.id.clone();
            let idx = graph.graph.add_node(record);
            let _ = graph.index.insert(id, idx);
        }
        graph.link_parents();
        graph
    }

    fn link_parents(&mut self) {
        let edges: Vec<(NodeIndex, NodeIndex)> = self
            .graph
            .node_indices()
            .filter_map(|child| {
                let parent = self.graph[child].parent_id.as_ref()?;
                self.index.get(parent).map(|&p| (p, child))
            })
            .collect();
        for (parent, child) in edges {
            let _ = self.graph.add_edge(parent, child, ());
        }
    }

    /// Returns the number of images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns whether the graph holds no images.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Looks up a record by exact id.
    #[must_use]
    pub fn get(&self, id: &ImageId) -> Option<&ImageRecord> {
        self.index.get(id).map(|&idx| &self.graph[idx])
    }

    /// Iterates over records in listing order.
    pub fn records(&self) -> impl Iterator<Item = &ImageRecord> {
        self.graph.node_indices().map(|idx| &self.graph[idx])
    }

    /// Returns records whose id starts with `prefix` or that carry `prefix`
    /// as an exact repo tag.
    #[must_use]
    pub fn find_by_prefix(&self, prefix: &str) -> Vec<&ImageRecord> {
        if let Some(tagged) = self
            .records()
            .find(|r| r.repo_tags.iter().any(|t| t == prefix))
        {
            return vec![tagged];
        }
        self.records()
            .filter(|r| r.id.matches_prefix(prefix))
            .collect()
    }

    /// Returns whether image ancestry contains no loop anywhere in the graph.
    #[must_use]
    pub fn is_acyclic(&self) -> bool {
        !petgraph::algo::is_cyclic_directed(&self.graph)
    }

    /// Returns the direct children of `id`, in listing order.
    ///
    /// An id that is not in the graph is not an error: the result is the set
    /// of records naming it as parent, usually empty.
    #[must_use]
    pub fn find_children(&self, id: &ImageId) -> Vec<ImageId> {
        self.child_indices_of(id)
            .into_iter()
            .map(|idx| self.graph[idx].id.clone())
            .collect()
    }

    /// Returns every descendant of `id` in discovery order.
    ///
    /// The children of a node are appended as one group in listing order, then
    /// each child is expanded in turn, so a parent always precedes its own
    /// descendants. `id` itself is never part of the result.
    ///
    /// # Errors
    ///
    /// Returns [`BerthError::CyclicGraph`] if an image is reached twice.
    pub fn crawl(&self, id: &ImageId) -> Result<Vec<ImageId>> {
        let mut visited = HashSet::new();
        if let Some(&start) = self.index.get(id) {
            let _ = visited.insert(start);
        }

        let mut discovered = Vec::new();
        let first = self.child_indices_of(id);
        self.visit_group(&first, &mut visited, &mut discovered)?;

        let mut pending = vec![first.into_iter()];
        while let Some(group) = pending.last_mut() {
            match group.next() {
                Some(child) => {
                    let grandchildren = self.child_indices(child);
                    self.visit_group(&grandchildren, &mut visited, &mut discovered)?;
                    pending.push(grandchildren.into_iter());
                }
                None => {
                    let _ = pending.pop();
                }
            }
        }

        Ok(discovered
            .into_iter()
            .map(|idx| self.graph[idx].id.clone())
            .collect())
    }

    /// Returns the ancestry chain of `id`, nearest parent first.
    ///
    /// The chain stops at a root or at a parent missing from the graph.
    ///
    /// # Errors
    ///
    /// Returns [`BerthError::CyclicGraph`] if the chain loops.
    pub fn ancestry(&self, id: &ImageId) -> Result<Vec<ImageId>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([id.clone()]);
        let mut current = self.get(id).and_then(|r| r.parent_id.clone());
        while let Some(parent) = current {
            if !seen.insert(parent.clone()) {
                return Err(BerthError::CyclicGraph {
                    id: parent.to_string(),
                });
            }
            current = self.get(&parent).and_then(|r| r.parent_id.clone());
            chain.push(parent);
        }
        Ok(chain)
    }

    fn visit_group(
        &self,
        group: &[NodeIndex],
        visited: &mut HashSet<NodeIndex>,
        discovered: &mut Vec<NodeIndex>,
    ) -> Result<()> {
        for &idx in group {
            if !visited.insert(idx) {
                return Err(BerthError::CyclicGraph {
                    id: self.graph[idx].id.to_string(),
                });
            }
            discovered.push(idx);
        }
        Ok(())
    }

    fn child_indices(&self, parent: NodeIndex) -> Vec<NodeIndex> {
        let mut children: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(parent, Direction::Outgoing)
            .collect();
        // petgraph yields neighbors newest edge first
        children.sort_unstable();
        children
    }

    fn child_indices_of(&self, id: &ImageId) -> Vec<NodeIndex> {
        match self.index.get(id) {
            Some(&idx) => self.child_indices(idx),
            None => self
                .graph
                .node_indices()
                .filter(|&idx| self.graph[idx].parent_id.as_ref() == Some(id))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<ImageId> {
        values.iter().map(|v| ImageId::new(*v)).collect()
    }

    fn scenario() -> ImageGraph {
        ImageGraph::from_records([
            ImageRecord::new("A", None),
            ImageRecord::new("B", Some("A")),
            ImageRecord::new("C", Some("B")),
            ImageRecord::new("D", Some("A")),
        ])
    }

    #[test]
    fn empty_graph_has_no_children() {
        let graph = ImageGraph::new();
        assert!(graph.is_empty());
        assert!(graph.find_children(&ImageId::new("x")).is_empty());
        assert!(graph.crawl(&ImageId::new("x")).expect("crawl").is_empty());
    }

    #[test]
    fn children_in_listing_order() {
        let graph = scenario();
        assert_eq!(graph.find_children(&ImageId::new("A")), ids(&["B", "D"]));
        assert_eq!(graph.find_children(&ImageId::new("B")), ids(&["C"]));
        assert!(graph.find_children(&ImageId::new("C")).is_empty());
    }

    #[test]
    fn absent_id_has_no_children() {
        let graph = scenario();
        assert!(graph.find_children(&ImageId::new("Z")).is_empty());
    }

    #[test]
    fn children_of_unlisted_parent_are_found_by_reference() {
        let graph = ImageGraph::from_records([
            ImageRecord::new("B", Some("hidden")),
            ImageRecord::new("C", Some("hidden")),
        ]);
        assert_eq!(
            graph.find_children(&ImageId::new("hidden")),
            ids(&["B", "C"])
        );
    }

    #[test]
    fn crawl_groups_siblings_before_descending() {
        let graph = scenario();
        let order = graph.crawl(&ImageId::new("A")).expect("crawl");
        assert_eq!(order, ids(&["B", "D", "C"]));
    }

    #[test]
    fn crawl_visits_every_sibling_subtree() {
        let graph = ImageGraph::from_records([
            ImageRecord::new("root", None),
            ImageRecord::new("a", Some("root")),
            ImageRecord::new("b", Some("root")),
            ImageRecord::new("a1", Some("a")),
            ImageRecord::new("b1", Some("b")),
            ImageRecord::new("b2", Some("b1")),
        ]);
        let order = graph.crawl(&ImageId::new("root")).expect("crawl");
        assert_eq!(order, ids(&["a", "b", "a1", "b1", "b2"]));
    }

    #[test]
    fn crawl_of_leaf_is_empty() {
        let graph = scenario();
        assert!(graph.crawl(&ImageId::new("D")).expect("crawl").is_empty());
    }

    #[test]
    fn crawl_detects_self_parent() {
        let graph = ImageGraph::from_records([ImageRecord::new("A", Some("A"))]);
        let err = graph.crawl(&ImageId::new("A")).unwrap_err();
        assert!(matches!(err, BerthError::CyclicGraph { .. }));
        assert!(!graph.is_acyclic());
    }

    #[test]
    fn crawl_detects_two_node_cycle() {
        let graph = ImageGraph::from_records([
            ImageRecord::new("A", Some("B")),
            ImageRecord::new("B", Some("A")),
        ]);
        let err = graph.crawl(&ImageId::new("A")).unwrap_err();
        assert!(err.to_string().contains("cyclic"), "got: {err}");
    }

    #[test]
    fn cycle_elsewhere_does_not_block_unrelated_crawl() {
        let graph = ImageGraph::from_records([
            ImageRecord::new("A", None),
            ImageRecord::new("B", Some("A")),
            ImageRecord::new("X", Some("Y")),
            ImageRecord::new("Y", Some("X")),
        ]);
        assert_eq!(graph.crawl(&ImageId::new("A")).expect("crawl"), ids(&["B"]));
        assert!(!graph.is_acyclic());
    }

    #[test]
    fn ancestry_walks_to_root() {
        let graph = scenario();
        let chain = graph.ancestry(&ImageId::new("C")).expect("ancestry");
        assert_eq!(chain, ids(&["B", "A"]));
    }

    #[test]
    fn ancestry_detects_loop() {
        let graph = ImageGraph::from_records([
            ImageRecord::new("A", Some("B")),
            ImageRecord::new("B", Some("A")),
        ]);
        assert!(graph.ancestry(&ImageId::new("A")).is_err());
    }

    #[test]
    fn duplicate_ids_keep_first() {
        let graph = ImageGraph::from_records([
            ImageRecord::new("A", None),
            ImageRecord::new("A", Some("Z")),
        ]);
        assert_eq!(graph.len(), 1);
        assert!(graph.get(&ImageId::new("A")).expect("A").is_root());
    }

    #[test]
    fn prefix_lookup_prefers_exact_tag() {
        let mut tagged = ImageRecord::new("sha256:ffff0000", None);
        tagged.repo_tags = vec!["fedora:20".into()];
        let graph = ImageGraph::from_records([
            tagged,
            ImageRecord::new("sha256:feed0000", None),
        ]);
        let hits = graph.find_by_prefix("fedora:20");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id.as_str(), "sha256:ffff0000");
        assert_eq!(graph.find_by_prefix("f").len(), 2);
        assert_eq!(graph.find_by_prefix("fee").len(), 1);
    }
}
