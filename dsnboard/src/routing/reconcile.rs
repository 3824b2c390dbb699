//! Pad-Boundary Reconciler
//!
//! Attaches stitched chains to the ports their ends land on.

use serde::{Deserialize, Serialize};

use crate::geometry::{PadShape, Point};
use crate::routing::{route_length, RoutePoint, StitchedTrace};

/// Absolute position and footprint of a pad's contact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortLocation {
    pub port_id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Exact pad outline, used to rank overlapping matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<PadShape>,
}

impl PortLocation {
    pub fn new(port_id: impl Into<String>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            port_id: port_id.into(),
            x,
            y,
            width,
            height,
            shape: None,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn is_zero_area(&self) -> bool {
        self.width <= 0.0 && self.height <= 0.0
    }

    /// Whether `p` lies in the bounding rectangle grown by `slack`; zero-area
    /// ports fall back to point equality within `epsilon`.
    pub fn matches(&self, p: &Point, slack: f64, epsilon: f64) -> bool {
        if self.is_zero_area() {
            return self.center().approx_eq(p, epsilon);
        }
        (p.x - self.x).abs() <= self.width / 2.0 + slack
            && (p.y - self.y).abs() <= self.height / 2.0 + slack
    }

    fn on_copper(&self, p: &Point, slack: f64) -> bool {
        match &self.shape {
            Some(shape) => shape.contains(&Point::new(p.x - self.x, p.y - self.y), slack),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceClass {
    /// At least one end lands on a port
    PadAttached,
    /// Neither end lands on a port
    Hanging,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledTrace {
    pub net: String,
    pub route: Vec<RoutePoint>,
    pub length: f64,
    pub start_port_id: Option<String>,
    pub end_port_id: Option<String>,
    pub class: TraceClass,
    pub segments: Vec<usize>,
}

impl ReconciledTrace {
    pub fn is_hanging(&self) -> bool {
        self.class == TraceClass::Hanging
    }
}

pub struct PadReconciler<'a> {
    ports: &'a [PortLocation],
    slack: f64,
    epsilon: f64,
}

impl<'a> PadReconciler<'a> {
    pub fn new(ports: &'a [PortLocation], slack: f64, epsilon: f64) -> Self {
        Self {
            ports,
            slack,
            epsilon,
        }
    }

    pub fn reconcile(&self, traces: Vec<StitchedTrace>) -> Vec<ReconciledTrace> {
        traces.into_iter().map(|t| self.reconcile_trace(t)).collect()
    }

    pub fn reconcile_trace(&self, trace: StitchedTrace) -> ReconciledTrace {
        let StitchedTrace {
            net,
            mut route,
            segments,
        } = trace;

        let start_port_id = first_wire(&route)
            .and_then(|p| self.port_at(&p))
            .map(|port| port.port_id.clone());
        let end_port_id = last_wire(&route)
            .and_then(|p| self.port_at(&p))
            .map(|port| port.port_id.clone());

        if let Some(RoutePoint::Wire {
            start_port_id: tag, ..
        }) = route.iter_mut().find(|p| !p.is_via())
        {
            *tag = start_port_id.clone();
        }
        if let Some(RoutePoint::Wire {
            end_port_id: tag, ..
        }) = route.iter_mut().rev().find(|p| !p.is_via())
        {
            *tag = end_port_id.clone();
        }

        let class = if start_port_id.is_none() && end_port_id.is_none() {
            TraceClass::Hanging
        } else {
            TraceClass::PadAttached
        };

        ReconciledTrace {
            net,
            length: route_length(&route),
            route,
            start_port_id,
            end_port_id,
            class,
            segments,
        }
    }

    /// Port a chain end lands on. Overlapping matches prefer ports whose
    /// copper actually covers the point, then the nearest center, then input
    /// order.
    pub fn port_at(&self, p: &Point) -> Option<&'a PortLocation> {
        let mut best: Option<(&'a PortLocation, bool, f64)> = None;
        for port in self.ports {
            if !port.matches(p, self.slack, self.epsilon) {
                continue;
            }
            let on_copper = port.on_copper(p, self.slack);
            let distance = port.center().distance_to(p);
            let better = match best {
                None => true,
                Some((_, best_on_copper, best_distance)) => {
                    (on_copper && !best_on_copper)
                        || (on_copper == best_on_copper && distance < best_distance)
                }
            };
            if better {
                best = Some((port, on_copper, distance));
            }
        }
        best.map(|(port, _, _)| port)
    }
}

fn first_wire(route: &[RoutePoint]) -> Option<Point> {
    route.iter().find(|p| !p.is_via()).map(|p| p.position())
}

fn last_wire(route: &[RoutePoint]) -> Option<Point> {
    route.iter().rev().find(|p| !p.is_via()).map(|p| p.position())
}
