// Act 4: booking flow from origin through hotel to final status.
use super::composer::{ChartComposer, BOOKING_FLOW};
use super::spec::{Annotation, ChartKind, ChartSpec, SankeyData, SankeyLink, SankeyNode};
use crate::flow::FlowGraph;
use crate::types::Dimension;
use crate::util::{format_int, format_pct, pct};
use tracing::debug;

impl ChartComposer<'_> {
    /// Link widths are booking counts; each link takes its source node's color.
    pub fn booking_flow(&self, graph: &FlowGraph) -> ChartSpec {
        let mut spec = ChartSpec::new(
            BOOKING_FLOW,
            4,
            ChartKind::Sankey,
            "Booking flow: origin, hotel, outcome".to_string(),
            "Link width is the number of bookings following that path",
        );

        let nodes: Vec<SankeyNode> = graph
            .nodes()
            .iter()
            .map(|n| SankeyNode {
                label: n.label.clone(),
                color: self.enc.color_of(&n.value).to_string(),
                // first level has no inflow
                total: graph.incoming(n.index).max(graph.outgoing(n.index)),
            })
            .collect();
        let links: Vec<SankeyLink> = graph
            .edges()
            .iter()
            .map(|e| SankeyLink {
                source: e.source,
                target: e.target,
                value: e.weight,
                color: nodes[e.source].color.clone(),
                label: format!(
                    "{} → {}: {}",
                    nodes[e.source].label,
                    nodes[e.target].label,
                    format_int(e.weight)
                ),
            })
            .collect();
        spec.flow = Some(SankeyData { nodes, links });

        let levels = graph.levels();
        let origin_level = levels.iter().position(|d| *d == Dimension::Origin);
        let status_level = levels.iter().position(|d| *d == Dimension::Status);
        if let (Some(ol), Some(sl)) = (origin_level, status_level) {
            self.flow_takeaways(graph, ol, sl, &mut spec);
        }
        debug!(
            chart = BOOKING_FLOW,
            nodes = graph.nodes().len(),
            links = graph.edges().len(),
            "chart composed"
        );
        spec
    }

    fn flow_takeaways(&self, graph: &FlowGraph, ol: usize, sl: usize, spec: &mut ChartSpec) {
        let canceled = self.config.status.canceled_label.as_str();
        let [local, intl] = self.config.origin_order();
        if graph.node_index(ol, local).is_none() {
            return;
        }
        let canceled_share = |origin: &str| -> Option<f64> {
            let total = graph.node_total(ol, origin);
            if total == 0 {
                return None;
            }
            let mut pattern: Vec<Option<&str>> = vec![None; graph.levels().len()];
            pattern[ol] = Some(origin);
            pattern[sl] = Some(canceled);
            let n = graph.path_total(&pattern);
            Some(pct(n, total))
        };

        if let Some(local_rate) = canceled_share(local) {
            let text = match canceled_share(intl) {
                Some(intl_rate) => format!(
                    "{} of local bookings are canceled vs {} of international",
                    format_pct(local_rate),
                    format_pct(intl_rate)
                ),
                None => format!("{} of local bookings are canceled", format_pct(local_rate)),
            };
            spec.annotations.push(Annotation::takeaway(
                text,
                0.02,
                0.98,
                Some(self.enc.color_of(local)),
            ));

            let mut pattern: Vec<Option<&str>> = vec![None; graph.levels().len()];
            pattern[ol] = Some(local);
            pattern[sl] = Some(canceled);
            if let Some((path, n)) = graph.dominant_path(&pattern) {
                if n > 0 {
                    let via: Vec<&str> = path
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| *i != ol && *i != sl)
                        .map(|(_, v)| v.as_str())
                        .collect();
                    let color = via.first().map(|v| self.enc.color_of(v));
                    let text = if via.is_empty() {
                        format!("Main flow: local cancellations ({} bookings)", format_int(n))
                    } else {
                        format!(
                            "Main flow: local cancellations via {} ({} bookings)",
                            via.join(", "),
                            format_int(n)
                        )
                    };
                    spec.annotations.push(Annotation::takeaway(text, 0.98, 0.02, color));
                }
            }
        }
    }
}
