//! Board Graph
//!
//! A petgraph view of a finished board. Components own ports, ports belong
//! to nets, and pad-to-pad traces link ports directly, which makes these
//! cheap:
//! - Connectivity queries per net or component
//! - Path finding between components
//! - Finding connection-group ports that no trace reaches

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::schema::{Board, ComponentRecord, NetRecord, PortRecord};

/// Node type in the board graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BoardNode {
    Component(ComponentRecord),
    Port(PortRecord),
    Net(NetRecord),
}

impl BoardNode {
    pub fn as_component(&self) -> Option<&ComponentRecord> {
        match self {
            BoardNode::Component(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_port(&self) -> Option<&PortRecord> {
        match self {
            BoardNode::Port(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_net(&self) -> Option<&NetRecord> {
        match self {
            BoardNode::Net(n) => Some(n),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoardEdge {
    /// Component to one of its ports
    Pad,
    /// Port to the net whose connection group lists it
    Member,
    /// Port to port through routed copper
    Trace { pcb_trace_id: String },
}

#[derive(Debug, Clone)]
pub struct BoardGraph {
    graph: UnGraph<BoardNode, BoardEdge>,
    /// Reference designator -> node index
    component_indices: HashMap<String, NodeIndex>,
    /// Port id -> node index
    port_indices: HashMap<String, NodeIndex>,
    /// Net name -> node index
    net_indices: HashMap<String, NodeIndex>,
    /// Ports at least one trace end lands on
    attached_ports: HashSet<String>,
}

impl BoardGraph {
    pub fn from_board(board: &Board) -> Self {
        let mut graph = UnGraph::new_undirected();
        let mut component_indices = HashMap::new();
        let mut component_by_id = HashMap::new();
        let mut port_indices = HashMap::new();
        let mut net_indices = HashMap::new();
        let mut net_by_id = HashMap::new();
        let mut attached_ports = HashSet::new();

        for component in board.components() {
            let idx = graph.add_node(BoardNode::Component(component.clone()));
            component_indices.insert(component.reference.clone(), idx);
            component_by_id.insert(component.pcb_component_id.clone(), idx);
        }

        for port in board.ports() {
            let idx = graph.add_node(BoardNode::Port(port.clone()));
            port_indices.insert(port.pcb_port_id.clone(), idx);
            if let Some(&comp_idx) = component_by_id.get(&port.pcb_component_id) {
                graph.add_edge(comp_idx, idx, BoardEdge::Pad);
            }
        }

        for net in board.nets() {
            let idx = graph.add_node(BoardNode::Net(net.clone()));
            net_indices.insert(net.name.clone(), idx);
            net_by_id.insert(net.source_net_id.clone(), idx);
        }

        for connection in board.connections() {
            let Some(&net_idx) = net_by_id.get(&connection.source_net_id) else {
                continue;
            };
            for port_id in &connection.connected_port_ids {
                if let Some(&port_idx) = port_indices.get(port_id) {
                    graph.add_edge(port_idx, net_idx, BoardEdge::Member);
                }
            }
        }

        for trace in board.traces() {
            for port_id in [&trace.start_port_id, &trace.end_port_id].into_iter().flatten() {
                attached_ports.insert(port_id.clone());
            }
            let (Some(start), Some(end)) = (&trace.start_port_id, &trace.end_port_id) else {
                continue;
            };
            if let (Some(&a), Some(&b)) = (port_indices.get(start), port_indices.get(end)) {
                graph.add_edge(
                    a,
                    b,
                    BoardEdge::Trace {
                        pcb_trace_id: trace.pcb_trace_id.clone(),
                    },
                );
            }
        }

        Self {
            graph,
            component_indices,
            port_indices,
            net_indices,
            attached_ports,
        }
    }

    pub fn get_component(&self, reference: &str) -> Option<&ComponentRecord> {
        self.component_indices
            .get(reference)
            .and_then(|&idx| self.graph.node_weight(idx))
            .and_then(|n| n.as_component())
    }

    pub fn get_port(&self, port_id: &str) -> Option<&PortRecord> {
        self.port_indices
            .get(port_id)
            .and_then(|&idx| self.graph.node_weight(idx))
            .and_then(|n| n.as_port())
    }

    pub fn ports_on_net(&self, net_name: &str) -> Vec<&PortRecord> {
        let Some(&net_idx) = self.net_indices.get(net_name) else {
            return Vec::new();
        };
        self.neighbors_by(net_idx, |e| *e == BoardEdge::Member)
            .filter_map(|idx| self.graph.node_weight(idx))
            .filter_map(|n| n.as_port())
            .collect()
    }

    /// Nets a component has at least one port in
    pub fn nets_for_component(&self, reference: &str) -> Vec<&NetRecord> {
        let Some(&comp_idx) = self.component_indices.get(reference) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut nets = Vec::new();
        for port_idx in self.neighbors_by(comp_idx, |e| *e == BoardEdge::Pad) {
            for net_idx in self.neighbors_by(port_idx, |e| *e == BoardEdge::Member) {
                if seen.insert(net_idx) {
                    if let Some(net) = self.graph.node_weight(net_idx).and_then(|n| n.as_net()) {
                        nets.push(net);
                    }
                }
            }
        }
        nets
    }

    pub fn components_on_net(&self, net_name: &str) -> Vec<&ComponentRecord> {
        let Some(&net_idx) = self.net_indices.get(net_name) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut components = Vec::new();
        for port_idx in self.neighbors_by(net_idx, |e| *e == BoardEdge::Member) {
            for comp_idx in self.neighbors_by(port_idx, |e| *e == BoardEdge::Pad) {
                if seen.insert(comp_idx) {
                    if let Some(c) = self
                        .graph
                        .node_weight(comp_idx)
                        .and_then(|n| n.as_component())
                    {
                        components.push(c);
                    }
                }
            }
        }
        components
    }

    /// Shortest path between two components over routed copper only
    /// (pads and traces), as a list of references and port ids.
    pub fn find_path(&self, from_ref: &str, to_ref: &str) -> Option<Vec<String>> {
        use petgraph::algo::astar;
        use petgraph::visit::EdgeFiltered;

        let from_idx = self.component_indices.get(from_ref)?;
        let to_idx = self.component_indices.get(to_ref)?;

        let copper = EdgeFiltered::from_fn(&self.graph, |e| *e.weight() != BoardEdge::Member);
        let (_, path) = astar(&copper, *from_idx, |n| n == *to_idx, |_| 1, |_| 0)?;

        Some(
            path.into_iter()
                .filter_map(|idx| match self.graph.node_weight(idx) {
                    Some(BoardNode::Component(c)) => Some(c.reference.clone()),
                    Some(BoardNode::Port(p)) => Some(p.pcb_port_id.clone()),
                    Some(BoardNode::Net(n)) => Some(format!("[{}]", n.name)),
                    None => None,
                })
                .collect(),
        )
    }

    /// Ports listed in a connection group that no trace end lands on
    pub fn unrouted_ports(&self) -> Vec<&PortRecord> {
        let mut ports: Vec<&PortRecord> = self
            .graph
            .edge_references()
            .filter(|e| *e.weight() == BoardEdge::Member)
            .filter_map(|e| {
                [e.source(), e.target()]
                    .into_iter()
                    .find_map(|idx| self.graph.node_weight(idx).and_then(|n| n.as_port()))
            })
            .filter(|p| !self.attached_ports.contains(&p.pcb_port_id))
            .collect();
        ports.sort_by(|a, b| a.pcb_port_id.cmp(&b.pcb_port_id));
        ports.dedup_by(|a, b| a.pcb_port_id == b.pcb_port_id);
        ports
    }

    pub fn stats(&self) -> BoardGraphStats {
        let count = |pred: fn(&BoardEdge) -> bool| {
            self.graph.edge_weights().filter(|e| pred(e)).count()
        };
        BoardGraphStats {
            component_count: self.component_indices.len(),
            port_count: self.port_indices.len(),
            net_count: self.net_indices.len(),
            member_count: count(|e| *e == BoardEdge::Member),
            trace_link_count: count(|e| matches!(e, BoardEdge::Trace { .. })),
            unrouted_port_count: self.unrouted_ports().len(),
        }
    }

    fn neighbors_by<'g>(
        &'g self,
        idx: NodeIndex,
        pred: impl Fn(&BoardEdge) -> bool + 'g,
    ) -> impl Iterator<Item = NodeIndex> + 'g {
        self.graph
            .edges(idx)
            .filter(move |e| pred(e.weight()))
            .map(move |e| if e.source() == idx { e.target() } else { e.source() })
    }
}

/// Statistics about a board graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardGraphStats {
    pub component_count: usize,
    pub port_count: usize,
    pub net_count: usize,
    pub member_count: usize,
    pub trace_link_count: usize,
    pub unrouted_port_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::schema::{BoardElement, ConnectionRecord, TraceRecord};
    use crate::geometry::{Layer, Point};

    fn create_test_board() -> Board {
        let mut board = Board::new();
        for (i, reference) in ["U1", "R1", "C1"].iter().enumerate() {
            board.insert(BoardElement::PcbComponent(ComponentRecord {
                pcb_component_id: format!("pcb_component_{}", i),
                reference: reference.to_string(),
                footprint_id: "FP".to_string(),
                center: Point::new(i as f64 * 5.0, 0.0),
                rotation: 0.0,
                layer: Layer::Top,
            }));
            for pin in 0..2 {
                board.insert(BoardElement::PcbPort(PortRecord {
                    pcb_port_id: format!("pcb_port_{}", i * 2 + pin),
                    pcb_component_id: format!("pcb_component_{}", i),
                    pin_ref: format!("{}-{}", reference, pin + 1),
                    x: i as f64 * 5.0 + pin as f64,
                    y: 0.0,
                    layers: vec![Layer::Top],
                }));
            }
        }

        // VCC: U1-1, R1-1 (routed); GND: U1-2, C1-2 (unrouted)
        for (n, name, ports) in [
            (0, "VCC", vec!["pcb_port_0", "pcb_port_2"]),
            (1, "GND", vec!["pcb_port_1", "pcb_port_5"]),
        ] {
            board.insert(BoardElement::SourceNet(NetRecord {
                source_net_id: format!("source_net_{}", n),
                name: name.to_string(),
            }));
            board.insert(BoardElement::SourceTrace(ConnectionRecord {
                source_trace_id: format!("source_trace_{}", n),
                source_net_id: format!("source_net_{}", n),
                connected_port_ids: ports.into_iter().map(String::from).collect(),
            }));
        }

        board.insert(BoardElement::PcbTrace(TraceRecord {
            pcb_trace_id: "pcb_trace_0".to_string(),
            net_name: "VCC".to_string(),
            source_net_id: Some("source_net_0".to_string()),
            route: Vec::new(),
            trace_length: 5.0,
            start_port_id: Some("pcb_port_0".to_string()),
            end_port_id: Some("pcb_port_2".to_string()),
            hanging: false,
        }));

        board
    }

    #[test]
    fn test_ports_and_components_on_net() {
        let graph = BoardGraph::from_board(&create_test_board());

        let ports = graph.ports_on_net("VCC");
        assert_eq!(ports.len(), 2);

        let refs: Vec<&str> = graph
            .components_on_net("GND")
            .iter()
            .map(|c| c.reference.as_str())
            .collect();
        assert_eq!(refs.len(), 2);
        assert!(refs.contains(&"U1"));
        assert!(refs.contains(&"C1"));
    }

    #[test]
    fn test_nets_for_component() {
        let graph = BoardGraph::from_board(&create_test_board());
        let names: Vec<&str> = graph
            .nets_for_component("U1")
            .iter()
            .map(|n| n.name.as_str())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"VCC"));
        assert!(names.contains(&"GND"));
        assert!(graph.nets_for_component("X9").is_empty());
    }

    #[test]
    fn test_find_path_follows_copper() {
        let graph = BoardGraph::from_board(&create_test_board());

        let path = graph.find_path("U1", "R1").unwrap();
        assert_eq!(path, vec!["U1", "pcb_port_0", "pcb_port_2", "R1"]);

        // GND is only a logical connection, no copper
        assert!(graph.find_path("U1", "C1").is_none());
    }

    #[test]
    fn test_unrouted_ports() {
        let graph = BoardGraph::from_board(&create_test_board());
        let ids: Vec<&str> = graph
            .unrouted_ports()
            .iter()
            .map(|p| p.pcb_port_id.as_str())
            .collect();
        assert_eq!(ids, vec!["pcb_port_1", "pcb_port_5"]);

        let stats = graph.stats();
        assert_eq!(stats.component_count, 3);
        assert_eq!(stats.port_count, 6);
        assert_eq!(stats.member_count, 4);
        assert_eq!(stats.trace_link_count, 1);
        assert_eq!(stats.unrouted_port_count, 2);
    }
}
