//! Output Schema
//!
//! Flat, typed board elements in the shape downstream viewers and checkers
//! consume, and the append-only store the assembler writes them into.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{Layer, PadShape, Point};
use crate::routing::RoutePoint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardRecord {
    pub board_id: Uuid,
    pub name: String,
    pub width: f64,
    pub height: f64,
    pub center: Point,
    /// Closed outline in board millimeters; empty when the design has none
    pub outline: Vec<Point>,
    pub num_layers: u32,
    pub created_at: DateTime<Utc>,
}

impl BoardRecord {
    /// Board record with an id derived from the design name, so converting
    /// the same design twice yields the same id. Unnamed designs get a
    /// random id.
    pub fn new(name: &str) -> Self {
        let board_id = if name.trim().is_empty() {
            Uuid::new_v4()
        } else {
            Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes())
        };
        Self {
            board_id,
            name: name.to_string(),
            width: 0.0,
            height: 0.0,
            center: Point::default(),
            outline: Vec::new(),
            num_layers: 2,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub pcb_component_id: String,
    pub reference: String,
    pub footprint_id: String,
    pub center: Point,
    pub rotation: f64,
    pub layer: Layer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmtPadRecord {
    pub pcb_smtpad_id: String,
    pub pcb_component_id: String,
    pub pcb_port_id: String,
    pub x: f64,
    pub y: f64,
    pub layer: Layer,
    #[serde(flatten)]
    pub shape: PadShape,
    pub port_hints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatedHoleRecord {
    pub pcb_plated_hole_id: String,
    pub pcb_component_id: String,
    pub pcb_port_id: String,
    pub x: f64,
    pub y: f64,
    pub outer_diameter: f64,
    pub hole_diameter: f64,
    #[serde(flatten)]
    pub shape: PadShape,
    pub layers: Vec<Layer>,
    pub port_hints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortRecord {
    pub pcb_port_id: String,
    pub pcb_component_id: String,
    /// `"<reference>-<pin>"`
    pub pin_ref: String,
    pub x: f64,
    pub y: f64,
    pub layers: Vec<Layer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetRecord {
    pub source_net_id: String,
    pub name: String,
}

/// Logical connection group of a net
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub source_trace_id: String,
    pub source_net_id: String,
    pub connected_port_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub pcb_trace_id: String,
    pub net_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_net_id: Option<String>,
    pub route: Vec<RoutePoint>,
    pub trace_length: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_port_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_port_id: Option<String>,
    /// Neither end lands on a pad
    #[serde(default)]
    pub hanging: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViaElement {
    pub pcb_via_id: String,
    pub net_name: String,
    pub x: f64,
    pub y: f64,
    pub outer_diameter: f64,
    pub hole_diameter: f64,
    pub layers: Vec<Layer>,
}

/// One element of the produced board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BoardElement {
    PcbBoard(BoardRecord),
    PcbComponent(ComponentRecord),
    PcbSmtpad(SmtPadRecord),
    PcbPlatedHole(PlatedHoleRecord),
    PcbPort(PortRecord),
    SourceNet(NetRecord),
    SourceTrace(ConnectionRecord),
    PcbTrace(TraceRecord),
    PcbVia(ViaElement),
}

impl BoardElement {
    pub fn type_name(&self) -> &'static str {
        match self {
            BoardElement::PcbBoard(_) => "pcb_board",
            BoardElement::PcbComponent(_) => "pcb_component",
            BoardElement::PcbSmtpad(_) => "pcb_smtpad",
            BoardElement::PcbPlatedHole(_) => "pcb_plated_hole",
            BoardElement::PcbPort(_) => "pcb_port",
            BoardElement::SourceNet(_) => "source_net",
            BoardElement::SourceTrace(_) => "source_trace",
            BoardElement::PcbTrace(_) => "pcb_trace",
            BoardElement::PcbVia(_) => "pcb_via",
        }
    }

    /// The element's own `<type>_<n>` id; the board record has none.
    pub fn id(&self) -> Option<&str> {
        match self {
            BoardElement::PcbBoard(_) => None,
            BoardElement::PcbComponent(c) => Some(&c.pcb_component_id),
            BoardElement::PcbSmtpad(p) => Some(&p.pcb_smtpad_id),
            BoardElement::PcbPlatedHole(p) => Some(&p.pcb_plated_hole_id),
            BoardElement::PcbPort(p) => Some(&p.pcb_port_id),
            BoardElement::SourceNet(n) => Some(&n.source_net_id),
            BoardElement::SourceTrace(c) => Some(&c.source_trace_id),
            BoardElement::PcbTrace(t) => Some(&t.pcb_trace_id),
            BoardElement::PcbVia(v) => Some(&v.pcb_via_id),
        }
    }
}

/// Append-only element store. Traces are the one exception: the stitching
/// stage deletes the raw per-segment traces of a net and reinserts chains.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Board {
    elements: Vec<BoardElement>,
    #[serde(skip)]
    counters: HashMap<&'static str, usize>,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store restored from existing elements. Each id counter resumes after
    /// the highest `<type>_<n>` suffix already present.
    pub fn from_elements(elements: Vec<BoardElement>) -> Self {
        let mut counters: HashMap<&'static str, usize> = HashMap::new();
        for element in &elements {
            let type_name = element.type_name();
            let Some(n) = element
                .id()
                .and_then(|id| id.strip_prefix(type_name))
                .and_then(|rest| rest.strip_prefix('_'))
                .and_then(|n| n.parse::<usize>().ok())
            else {
                continue;
            };
            let next = counters.entry(type_name).or_insert(0);
            *next = (*next).max(n + 1);
        }
        Self { elements, counters }
    }

    pub fn insert(&mut self, element: BoardElement) {
        self.elements.push(element);
    }

    /// Allocate the next id for an element type, e.g. `pcb_trace_3`. Ids
    /// are never handed out twice, even after deletions.
    pub fn next_id(&mut self, type_name: &'static str) -> String {
        let n = self.counters.entry(type_name).or_insert(0);
        let id = format!("{}_{}", type_name, n);
        *n += 1;
        id
    }

    /// Remove every trace of a net; returns how many were removed.
    pub fn delete_traces_for_net(&mut self, net_name: &str) -> usize {
        let before = self.elements.len();
        self.elements
            .retain(|e| !matches!(e, BoardElement::PcbTrace(t) if t.net_name == net_name));
        before - self.elements.len()
    }

    pub fn elements(&self) -> &[BoardElement] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn board(&self) -> Option<&BoardRecord> {
        self.elements.iter().find_map(|e| match e {
            BoardElement::PcbBoard(b) => Some(b),
            _ => None,
        })
    }

    pub fn components(&self) -> impl Iterator<Item = &ComponentRecord> {
        self.elements.iter().filter_map(|e| match e {
            BoardElement::PcbComponent(c) => Some(c),
            _ => None,
        })
    }

    pub fn smt_pads(&self) -> impl Iterator<Item = &SmtPadRecord> {
        self.elements.iter().filter_map(|e| match e {
            BoardElement::PcbSmtpad(p) => Some(p),
            _ => None,
        })
    }

    pub fn plated_holes(&self) -> impl Iterator<Item = &PlatedHoleRecord> {
        self.elements.iter().filter_map(|e| match e {
            BoardElement::PcbPlatedHole(p) => Some(p),
            _ => None,
        })
    }

    pub fn ports(&self) -> impl Iterator<Item = &PortRecord> {
        self.elements.iter().filter_map(|e| match e {
            BoardElement::PcbPort(p) => Some(p),
            _ => None,
        })
    }

    pub fn nets(&self) -> impl Iterator<Item = &NetRecord> {
        self.elements.iter().filter_map(|e| match e {
            BoardElement::SourceNet(n) => Some(n),
            _ => None,
        })
    }

    pub fn connections(&self) -> impl Iterator<Item = &ConnectionRecord> {
        self.elements.iter().filter_map(|e| match e {
            BoardElement::SourceTrace(c) => Some(c),
            _ => None,
        })
    }

    pub fn traces(&self) -> impl Iterator<Item = &TraceRecord> {
        self.elements.iter().filter_map(|e| match e {
            BoardElement::PcbTrace(t) => Some(t),
            _ => None,
        })
    }

    pub fn traces_for_net<'a>(
        &'a self,
        net_name: &'a str,
    ) -> impl Iterator<Item = &'a TraceRecord> {
        self.traces().filter(move |t| t.net_name == net_name)
    }

    pub fn vias(&self) -> impl Iterator<Item = &ViaElement> {
        self.elements.iter().filter_map(|e| match e {
            BoardElement::PcbVia(v) => Some(v),
            _ => None,
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.elements)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.elements)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl<'de> Deserialize<'de> for Board {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<BoardElement>::deserialize(deserializer).map(Board::from_elements)
    }
}
