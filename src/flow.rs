//! Layered flow graph (e.g. origin → hotel → status) over the booking table.
//!
//! The builder counts every full path once. Edge weights and every sub-total
//! used by annotations are sums over those path counts, so a number quoted in
//! a takeaway is always the sum of the edges drawn for it.

use crate::error::{PipelineError, Result};
use crate::types::{BookingTable, Dimension};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// What to do when the same value shows up at two different levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelPolicy {
    #[default]
    Reject,
    /// Prefix colliding labels with their level's column name.
    QualifyWithLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowNode {
    pub index: usize,
    pub level: usize,
    pub dimension: Dimension,
    pub value: String,
    /// Display label, unique across the whole graph.
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowEdge {
    pub source: usize,
    pub target: usize,
    pub weight: u64,
}

#[derive(Debug, Clone)]
pub struct FlowGraphBuilder {
    levels: Vec<Dimension>,
    policy: LabelPolicy,
}

impl FlowGraphBuilder {
    pub fn new(levels: &[Dimension]) -> Self {
        Self {
            levels: levels.to_vec(),
            policy: LabelPolicy::default(),
        }
    }

    pub fn label_policy(mut self, policy: LabelPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(&self, table: &BookingTable) -> Result<FlowGraph> {
        if self.levels.len() < 2 {
            return Err(PipelineError::Config(
                "a flow graph needs at least two levels".into(),
            ));
        }

        let mut paths: BTreeMap<Vec<String>, u64> = BTreeMap::new();
        for r in &table.records {
            let key: Vec<String> = self.levels.iter().map(|d| table.key_value(r, *d)).collect();
            *paths.entry(key).or_insert(0) += 1;
        }

        let mut values: Vec<BTreeSet<String>> = vec![BTreeSet::new(); self.levels.len()];
        for key in paths.keys() {
            for (level, v) in key.iter().enumerate() {
                values[level].insert(v.clone());
            }
        }

        let colliding = self.colliding_values(&values)?;

        let mut nodes: Vec<FlowNode> = Vec::new();
        let mut index: BTreeMap<(usize, String), usize> = BTreeMap::new();
        for (level, set) in values.iter().enumerate() {
            let dimension = self.levels[level];
            for value in set {
                let label = if colliding.contains(value) {
                    format!("{}: {}", dimension.column_name(), value)
                } else {
                    value.clone()
                };
                let idx = nodes.len();
                index.insert((level, value.clone()), idx);
                nodes.push(FlowNode {
                    index: idx,
                    level,
                    dimension,
                    value: value.clone(),
                    label,
                });
            }
        }

        self.check_unique_labels(&nodes)?;

        let mut edges: Vec<FlowEdge> = Vec::new();
        for level in 0..self.levels.len() - 1 {
            let mut weights: BTreeMap<(usize, usize), u64> = BTreeMap::new();
            for (key, count) in &paths {
                let source = index[&(level, key[level].clone())];
                let target = index[&(level + 1, key[level + 1].clone())];
                *weights.entry((source, target)).or_insert(0) += count;
            }
            edges.extend(
                weights
                    .into_iter()
                    .filter(|(_, w)| *w > 0)
                    .map(|((source, target), weight)| FlowEdge {
                        source,
                        target,
                        weight,
                    }),
            );
        }

        debug!(
            nodes = nodes.len(),
            edges = edges.len(),
            paths = paths.len(),
            "flow graph built"
        );

        Ok(FlowGraph {
            levels: self.levels.clone(),
            nodes,
            index,
            edges,
            paths,
        })
    }

    /// Values present at more than one level. Empty unless the policy allows
    /// qualification; otherwise the first collision is an error.
    fn colliding_values(&self, values: &[BTreeSet<String>]) -> Result<BTreeSet<String>> {
        let mut seen: BTreeMap<&String, Vec<usize>> = BTreeMap::new();
        for (level, set) in values.iter().enumerate() {
            for v in set {
                seen.entry(v).or_default().push(level);
            }
        }
        let mut colliding = BTreeSet::new();
        for (value, levels) in seen {
            if levels.len() < 2 {
                continue;
            }
            match self.policy {
                LabelPolicy::Reject => {
                    return Err(PipelineError::AmbiguousNodeLabel {
                        label: value.clone(),
                        levels: levels
                            .iter()
                            .map(|l| self.levels[*l].column_name().to_string())
                            .collect(),
                    });
                }
                LabelPolicy::QualifyWithLevel => {
                    colliding.insert(value.clone());
                }
            }
        }
        Ok(colliding)
    }

    /// A qualified label can still clash with a raw value at another level.
    fn check_unique_labels(&self, nodes: &[FlowNode]) -> Result<()> {
        let mut seen: BTreeMap<&str, &FlowNode> = BTreeMap::new();
        for node in nodes {
            if let Some(first) = seen.insert(node.label.as_str(), node) {
                return Err(PipelineError::AmbiguousNodeLabel {
                    label: node.label.clone(),
                    levels: vec![
                        first.dimension.column_name().to_string(),
                        node.dimension.column_name().to_string(),
                    ],
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FlowGraph {
    levels: Vec<Dimension>,
    nodes: Vec<FlowNode>,
    index: BTreeMap<(usize, String), usize>,
    edges: Vec<FlowEdge>,
    paths: BTreeMap<Vec<String>, u64>,
}

impl FlowGraph {
    pub fn levels(&self) -> &[Dimension] {
        &self.levels
    }

    pub fn nodes(&self) -> &[FlowNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[FlowEdge] {
        &self.edges
    }

    pub fn node_index(&self, level: usize, value: &str) -> Option<usize> {
        self.index.get(&(level, value.to_string())).copied()
    }

    pub fn outgoing(&self, node: usize) -> u64 {
        self.edges
            .iter()
            .filter(|e| e.source == node)
            .map(|e| e.weight)
            .sum()
    }

    pub fn incoming(&self, node: usize) -> u64 {
        self.edges
            .iter()
            .filter(|e| e.target == node)
            .map(|e| e.weight)
            .sum()
    }

    /// Records matching `pattern`, one optional value per level (`None` is a
    /// wildcard; a short pattern leaves the remaining levels open).
    pub fn path_total(&self, pattern: &[Option<&str>]) -> u64 {
        self.paths
            .iter()
            .filter(|(key, _)| path_matches(pattern, key))
            .map(|(_, n)| n)
            .sum()
    }

    /// Records carrying `value` at `level`.
    pub fn node_total(&self, level: usize, value: &str) -> u64 {
        let mut pattern: Vec<Option<&str>> = vec![None; self.levels.len()];
        if let Some(slot) = pattern.get_mut(level) {
            *slot = Some(value);
        }
        self.path_total(&pattern)
    }

    /// The heaviest full path matching `pattern`; ties go to the first in key order.
    pub fn dominant_path(&self, pattern: &[Option<&str>]) -> Option<(&[String], u64)> {
        let mut best: Option<(&[String], u64)> = None;
        for (key, n) in &self.paths {
            if !path_matches(pattern, key) {
                continue;
            }
            if best.map_or(true, |(_, b)| *n > b) {
                best = Some((key.as_slice(), *n));
            }
        }
        best
    }
}

fn path_matches(pattern: &[Option<&str>], key: &[String]) -> bool {
    pattern
        .iter()
        .zip(key.iter())
        .all(|(p, v)| p.map_or(true, |p| p == v.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::{booking, table};
    use crate::types::BookingRecord;
    use proptest::prelude::*;

    const LEVELS: [Dimension; 3] = [Dimension::Origin, Dimension::Hotel, Dimension::Status];

    fn sample() -> BookingTable {
        let mut rows = Vec::new();
        for i in 0..6 {
            rows.push(booking("City Hotel", "PRT", 2016, i < 4));
        }
        for i in 0..3 {
            rows.push(booking("Resort Hotel", "PRT", 2016, i < 1));
        }
        for i in 0..5 {
            rows.push(booking("City Hotel", "GBR", 2016, i < 1));
        }
        table(rows)
    }

    #[test]
    fn test_nodes_sorted_per_level_with_global_indices() {
        let g = FlowGraphBuilder::new(&LEVELS).build(&sample()).unwrap();
        let labels: Vec<&str> = g.nodes().iter().map(|n| n.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "International",
                "Local (PRT)",
                "City Hotel",
                "Resort Hotel",
                "Canceled",
                "Not canceled"
            ]
        );
        for (i, n) in g.nodes().iter().enumerate() {
            assert_eq!(n.index, i);
        }
        assert_eq!(g.node_index(1, "Resort Hotel"), Some(3));
        let last: Vec<&str> = g
            .nodes()
            .iter()
            .filter(|n| n.level == 2)
            .map(|n| n.value.as_str())
            .collect();
        assert_eq!(last, vec!["Canceled", "Not canceled"]);
    }

    #[test]
    fn test_edges_only_between_adjacent_levels() {
        let g = FlowGraphBuilder::new(&LEVELS).build(&sample()).unwrap();
        for e in g.edges() {
            let s = &g.nodes()[e.source];
            let t = &g.nodes()[e.target];
            assert_eq!(s.level + 1, t.level);
            assert!(e.weight > 0);
        }
        // International never books the resort: no zero-weight edge is emitted
        let intl = g.node_index(0, "International").unwrap();
        let resort = g.node_index(1, "Resort Hotel").unwrap();
        assert!(!g.edges().iter().any(|e| e.source == intl && e.target == resort));
    }

    #[test]
    fn test_subtotals_match_edges() {
        let g = FlowGraphBuilder::new(&LEVELS).build(&sample()).unwrap();
        let local = g.node_index(0, "Local (PRT)").unwrap();
        assert_eq!(g.node_total(0, "Local (PRT)"), 9);
        assert_eq!(g.outgoing(local), 9);
        assert_eq!(
            g.path_total(&[Some("Local (PRT)"), Some("City Hotel"), Some("Canceled")]),
            4
        );
        assert_eq!(g.path_total(&[Some("Local (PRT)"), None, Some("Canceled")]), 5);
        let canceled = g.node_index(2, "Canceled").unwrap();
        assert_eq!(g.incoming(canceled), g.node_total(2, "Canceled"));
        assert_eq!(g.outgoing(canceled), 0);
    }

    #[test]
    fn test_dominant_path() {
        let g = FlowGraphBuilder::new(&LEVELS).build(&sample()).unwrap();
        let (path, n) = g
            .dominant_path(&[Some("Local (PRT)"), None, Some("Canceled")])
            .unwrap();
        assert_eq!(path, ["Local (PRT)", "City Hotel", "Canceled"]);
        assert_eq!(n, 4);
        assert!(g.dominant_path(&[Some("Nowhere")]).is_none());
    }

    fn colliding_table() -> BookingTable {
        let mut r: BookingRecord = booking("Other", "GBR", 2016, false);
        r.deposit_type = "Other".to_string();
        table(vec![r])
    }

    #[test]
    fn test_ambiguous_label_rejected() {
        let err = FlowGraphBuilder::new(&[Dimension::Hotel, Dimension::DepositType])
            .build(&colliding_table())
            .unwrap_err();
        match err {
            PipelineError::AmbiguousNodeLabel { label, levels } => {
                assert_eq!(label, "Other");
                assert_eq!(levels, vec!["hotel", "deposit_type"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_ambiguous_label_qualified() {
        let g = FlowGraphBuilder::new(&[Dimension::Hotel, Dimension::DepositType])
            .label_policy(LabelPolicy::QualifyWithLevel)
            .build(&colliding_table())
            .unwrap();
        let labels: Vec<&str> = g.nodes().iter().map(|n| n.label.as_str()).collect();
        assert_eq!(labels, vec!["hotel: Other", "deposit_type: Other"]);
        assert_eq!(g.edges().len(), 1);
    }

    #[test]
    fn test_qualified_label_clashing_with_raw_value_rejected() {
        let mut a = booking("Other", "GBR", 2016, false);
        a.deposit_type = "Other".to_string();
        let mut b = booking("deposit_type: Other", "GBR", 2016, false);
        b.deposit_type = "No Deposit".to_string();
        let err = FlowGraphBuilder::new(&[Dimension::Hotel, Dimension::DepositType])
            .label_policy(LabelPolicy::QualifyWithLevel)
            .build(&table(vec![a, b]))
            .unwrap_err();
        match err {
            PipelineError::AmbiguousNodeLabel { label, levels } => {
                assert_eq!(label, "deposit_type: Other");
                assert_eq!(levels, vec!["hotel", "deposit_type"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_single_level_rejected() {
        assert!(FlowGraphBuilder::new(&[Dimension::Hotel]).build(&sample()).is_err());
    }

    proptest! {
        #[test]
        fn prop_flow_is_conserved(spec in prop::collection::vec((0usize..3, 0usize..2, any::<bool>()), 1..150)) {
            let hotels = ["City Hotel", "Resort Hotel", "Airport Hotel"];
            let countries = ["PRT", "GBR"];
            let t = table(spec.into_iter().map(|(h, c, x)| booking(hotels[h], countries[c], 2016, x)).collect());
            let g = FlowGraphBuilder::new(&LEVELS).build(&t).unwrap();
            for n in g.nodes() {
                if n.level == 1 {
                    prop_assert_eq!(g.incoming(n.index), g.outgoing(n.index));
                }
                if n.level == 0 {
                    let count = t.records.iter().filter(|r| r.origin == n.value).count() as u64;
                    prop_assert_eq!(g.outgoing(n.index), count);
                }
            }
            let total: u64 = g.edges().iter().filter(|e| g.nodes()[e.source].level == 0).map(|e| e.weight).sum();
            prop_assert_eq!(total, t.len() as u64);
        }
    }
}
