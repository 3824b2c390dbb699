//! Segment Stitcher
//!
//! Merges the segments of one net into maximal chains. Endpoints are matched
//! through tolerance keys: a lookup scans the key of the probe point and its
//! eight neighbours, then keeps only endpoints within epsilon on both axes.
//!
//! Each unused segment seeds a chain that is extended forward from its end
//! and then backward from its start. At every endpoint, direct continuations
//! (the candidate starts there when extending forward) are tried before
//! reversed ones. A candidate on the other layer is only eligible when a via
//! of the net sits at the shared point; the via is spliced into the route.
//!
//! At a branch, a candidate whose far end continues into another unused
//! eligible segment is preferred over one that dead-ends; remaining ties go
//! to the first candidate in input order. Branches not taken stay unused and
//! seed their own chains later, so every segment lands in exactly one chain.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::core::{ConversionError, Stage, StitchOptions};
use crate::geometry::{Layer, Point, PointKey};
use crate::routing::{route_length, RoutePoint, Segment, ViaRecord};

/// A chain of one or more segments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StitchedTrace {
    pub net: String,
    pub route: Vec<RoutePoint>,
    /// Indices of the input segments merged into this chain
    pub segments: Vec<usize>,
}

impl StitchedTrace {
    pub fn length(&self) -> f64 {
        route_length(&self.route)
    }

    pub fn start(&self) -> Option<Point> {
        self.route.iter().find(|p| !p.is_via()).map(|p| p.position())
    }

    pub fn end(&self) -> Option<Point> {
        self.route.iter().rev().find(|p| !p.is_via()).map(|p| p.position())
    }

    pub fn via_count(&self) -> usize {
        self.route.iter().filter(|p| p.is_via()).count()
    }

    /// Layers the wire points of this chain run on, in first-seen order
    pub fn layers(&self) -> Vec<Layer> {
        let mut layers = Vec::new();
        for layer in self.route.iter().filter_map(|p| p.layer()) {
            if !layers.contains(&layer) {
                layers.push(layer);
            }
        }
        layers
    }
}

/// Working node of the stitch graph
#[derive(Debug)]
struct TraceSegment {
    route: Vec<RoutePoint>,
    start: Point,
    end: Point,
    layer: Layer,
    used: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    id: usize,
    /// The candidate's route has to be reversed to continue the chain
    reversed: bool,
}

/// Counts loop steps for one net and fails once the cap is passed.
#[derive(Debug)]
struct IterationGuard<'n> {
    net: &'n str,
    limit: usize,
    steps: usize,
}

impl<'n> IterationGuard<'n> {
    fn new(net: &'n str, limit: usize) -> Self {
        Self {
            net,
            limit,
            steps: 0,
        }
    }

    fn tick(&mut self) -> Result<(), ConversionError> {
        self.steps += 1;
        if self.steps > self.limit {
            return Err(ConversionError::IterationLimitExceeded {
                stage: Stage::Stitching,
                net: self.net.to_string(),
                limit: self.limit,
            });
        }
        Ok(())
    }
}

struct StitchGraph<'v> {
    nodes: Vec<TraceSegment>,
    by_start: HashMap<PointKey, Vec<usize>>,
    by_end: HashMap<PointKey, Vec<usize>>,
    vias: &'v [ViaRecord],
    via_index: HashMap<PointKey, Vec<usize>>,
    epsilon: f64,
}

impl<'v> StitchGraph<'v> {
    fn new(segments: &[Segment], vias: &'v [ViaRecord], epsilon: f64) -> Self {
        let mut graph = StitchGraph {
            nodes: Vec::with_capacity(segments.len()),
            by_start: HashMap::new(),
            by_end: HashMap::new(),
            vias,
            via_index: HashMap::new(),
            epsilon,
        };

        for (id, segment) in segments.iter().enumerate() {
            let node = TraceSegment {
                route: segment.to_route(),
                start: segment.start(),
                end: segment.end(),
                layer: segment.layer,
                used: false,
            };
            graph
                .by_start
                .entry(node.start.key(epsilon))
                .or_default()
                .push(id);
            graph.by_end.entry(node.end.key(epsilon)).or_default().push(id);
            graph.nodes.push(node);
        }

        for (idx, via) in vias.iter().enumerate() {
            graph
                .via_index
                .entry(via.position.key(epsilon))
                .or_default()
                .push(idx);
        }

        graph
    }

    /// Unused nodes with the selected endpoint within epsilon of `at`, in
    /// input order.
    fn lookup(&self, at: Point, starts: bool) -> Vec<usize> {
        let index = if starts { &self.by_start } else { &self.by_end };
        let mut found: Vec<usize> = at
            .key(self.epsilon)
            .neighborhood()
            .filter_map(|key| index.get(&key))
            .flatten()
            .copied()
            .filter(|&id| {
                let node = &self.nodes[id];
                let endpoint = if starts { node.start } else { node.end };
                !node.used && endpoint.approx_eq(&at, self.epsilon)
            })
            .collect();
        found.sort_unstable();
        found.dedup();
        found
    }

    fn via_at(&self, at: Point) -> Option<&ViaRecord> {
        at.key(self.epsilon)
            .neighborhood()
            .filter_map(|key| self.via_index.get(&key))
            .flatten()
            .map(|&idx| &self.vias[idx])
            .filter(|via| via.position.approx_eq(&at, self.epsilon))
            .min_by(|a, b| {
                a.position
                    .distance_to(&at)
                    .total_cmp(&b.position.distance_to(&at))
            })
    }

    /// Eligible continuations at `at`: direct candidates first, then
    /// reversed ones; cross-layer candidates only where a via exists.
    fn candidates(&self, at: Point, layer: Layer, direction: Direction) -> Vec<Candidate> {
        let (direct, reversed) = match direction {
            Direction::Forward => (self.lookup(at, true), self.lookup(at, false)),
            Direction::Backward => (self.lookup(at, false), self.lookup(at, true)),
        };

        let has_via = self.via_at(at).is_some();
        direct
            .into_iter()
            .map(|id| Candidate { id, reversed: false })
            .chain(reversed.into_iter().map(|id| Candidate { id, reversed: true }))
            .filter(|c| self.nodes[c.id].layer == layer || has_via)
            .fold(Vec::new(), |mut acc, c| {
                // A segment starting and ending at the same point shows up in
                // both lists; keep its direct entry.
                if !acc.iter().any(|a: &Candidate| a.id == c.id) {
                    acc.push(c);
                }
                acc
            })
    }

    /// Endpoint the chain tip moves to after taking `candidate`.
    fn far_end(&self, candidate: Candidate, direction: Direction) -> Point {
        let node = &self.nodes[candidate.id];
        match (direction, candidate.reversed) {
            (Direction::Forward, false) | (Direction::Backward, true) => node.end,
            (Direction::Forward, true) | (Direction::Backward, false) => node.start,
        }
    }

    fn choose(&self, candidates: &[Candidate], direction: Direction) -> Option<Candidate> {
        if candidates.len() <= 1 {
            return candidates.first().copied();
        }

        candidates
            .iter()
            .copied()
            .find(|&c| self.continues(c, candidates, direction))
            .or_else(|| candidates.first().copied())
    }

    /// Whether taking `candidate` leads on to another unused segment that is
    /// not one of the competing branches.
    fn continues(
        &self,
        candidate: Candidate,
        competing: &[Candidate],
        direction: Direction,
    ) -> bool {
        let at = self.far_end(candidate, direction);
        let layer = self.nodes[candidate.id].layer;
        self.candidates(at, layer, direction)
            .iter()
            .any(|next| !competing.iter().any(|c| c.id == next.id))
    }

    fn take(&mut self, id: usize) -> (Vec<RoutePoint>, Layer) {
        let node = &mut self.nodes[id];
        node.used = true;
        (node.route.clone(), node.layer)
    }
}

/// Chain under construction
struct Chain {
    route: VecDeque<RoutePoint>,
    segments: Vec<usize>,
}

impl Chain {
    fn tip(&self, direction: Direction) -> Option<(Point, Layer)> {
        let point = match direction {
            Direction::Forward => self.route.back(),
            Direction::Backward => self.route.front(),
        }?;
        Some((point.position(), point.layer()?))
    }

    fn append(&mut self, route: Vec<RoutePoint>, at: Point, from: Layer, to: Layer) {
        if from == to {
            self.route.extend(route.into_iter().skip(1));
        } else {
            self.route.push_back(RoutePoint::via(at, from, to));
            self.route.extend(route);
        }
    }

    fn prepend(&mut self, route: Vec<RoutePoint>, at: Point, from: Layer, to: Layer) {
        let keep = if from == to {
            route.len().saturating_sub(1)
        } else {
            self.route.push_front(RoutePoint::via(at, from, to));
            route.len()
        };
        for point in route.into_iter().take(keep).rev() {
            self.route.push_front(point);
        }
    }
}

#[derive(Debug, Clone)]
pub struct Stitcher {
    epsilon: f64,
    max_iterations: usize,
}

impl Default for Stitcher {
    fn default() -> Self {
        Self::new(&StitchOptions::default())
    }
}

impl Stitcher {
    pub fn new(options: &StitchOptions) -> Self {
        Self {
            epsilon: options.epsilon_mm,
            max_iterations: options.max_iterations,
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Stitch the segments of one net.
    ///
    /// Chains come out in the input order of their seed segments.
    pub fn stitch_net(
        &self,
        net: &str,
        segments: &[Segment],
        vias: &[ViaRecord],
    ) -> Result<Vec<StitchedTrace>, ConversionError> {
        let mut graph = StitchGraph::new(segments, vias, self.epsilon);
        let mut guard = IterationGuard::new(net, 2 * segments.len() + self.max_iterations);
        let mut traces = Vec::new();

        for seed in 0..graph.nodes.len() {
            guard.tick()?;
            if graph.nodes[seed].used {
                continue;
            }

            let (route, _) = graph.take(seed);
            let mut chain = Chain {
                route: route.into(),
                segments: vec![seed],
            };

            self.extend(&mut graph, &mut chain, Direction::Forward, &mut guard)?;
            self.extend(&mut graph, &mut chain, Direction::Backward, &mut guard)?;

            traces.push(StitchedTrace {
                net: net.to_string(),
                route: chain.route.into(),
                segments: chain.segments,
            });
        }

        tracing::debug!(
            "Stitched net {}: {} segments into {} traces",
            net,
            segments.len(),
            traces.len()
        );

        Ok(traces)
    }

    fn extend(
        &self,
        graph: &mut StitchGraph<'_>,
        chain: &mut Chain,
        direction: Direction,
        guard: &mut IterationGuard<'_>,
    ) -> Result<(), ConversionError> {
        while let Some((at, layer)) = chain.tip(direction) {
            let candidates = graph.candidates(at, layer, direction);
            let Some(chosen) = graph.choose(&candidates, direction) else {
                break;
            };
            guard.tick()?;

            let (mut route, next_layer) = graph.take(chosen.id);
            chain.segments.push(chosen.id);

            match direction {
                Direction::Forward => {
                    if chosen.reversed {
                        route.reverse();
                    }
                    chain.append(route, at, layer, next_layer);
                }
                Direction::Backward => {
                    if chosen.reversed {
                        route.reverse();
                    }
                    chain.prepend(route, at, next_layer, layer);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(layer: Layer, points: &[(f64, f64)]) -> Segment {
        Segment::new(
            "N",
            layer,
            0.2,
            points.iter().map(|&(x, y)| Point::new(x, y)).collect(),
        )
    }

    fn positions(trace: &StitchedTrace) -> Vec<(f64, f64)> {
        trace
            .route
            .iter()
            .map(|p| {
                let pos = p.position();
                (pos.x, pos.y)
            })
            .collect()
    }

    #[test]
    fn test_single_segment_is_unchanged() {
        let segments = vec![seg(Layer::Top, &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)])];
        let traces = Stitcher::default().stitch_net("N", &segments, &[]).unwrap();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].route, segments[0].to_route());
        assert_eq!(traces[0].segments, vec![0]);
    }

    #[test]
    fn test_reversed_neighbours_are_merged() {
        // middle segment is declared end to start
        let segments = vec![
            seg(Layer::Top, &[(0.0, 0.0), (1.0, 0.0)]),
            seg(Layer::Top, &[(2.0, 0.0), (1.0, 0.0)]),
            seg(Layer::Top, &[(2.0, 0.0), (3.0, 0.0)]),
        ];
        let traces = Stitcher::default().stitch_net("N", &segments, &[]).unwrap();
        assert_eq!(traces.len(), 1);
        assert_eq!(
            positions(&traces[0]),
            vec![(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (3.0, 0.0)]
        );
        assert_eq!(traces[0].segments, vec![0, 1, 2]);
    }

    #[test]
    fn test_backward_extension_prepends() {
        let segments = vec![
            seg(Layer::Top, &[(1.0, 0.0), (2.0, 0.0)]),
            seg(Layer::Top, &[(0.0, 0.0), (1.0, 0.0)]),
        ];
        let traces = Stitcher::default().stitch_net("N", &segments, &[]).unwrap();
        assert_eq!(traces.len(), 1);
        assert_eq!(
            positions(&traces[0]),
            vec![(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]
        );
    }

    #[test]
    fn test_via_splice_forward_and_backward() {
        let segments = vec![
            seg(Layer::Top, &[(1.0, 0.0), (2.0, 0.0)]),
            seg(Layer::Bottom, &[(2.0, 0.0), (2.0, 2.0)]),
            seg(Layer::Bottom, &[(0.0, 0.0), (1.0, 0.0)]),
        ];
        let vias = vec![
            ViaRecord::new("N", Point::new(2.0, 0.0)),
            ViaRecord::new("N", Point::new(1.0, 0.0)),
        ];
        let traces = Stitcher::default()
            .stitch_net("N", &segments, &vias)
            .unwrap();
        assert_eq!(traces.len(), 1);

        let route = &traces[0].route;
        assert_eq!(traces[0].via_count(), 2);
        assert_eq!(
            route[2],
            RoutePoint::via(Point::new(1.0, 0.0), Layer::Bottom, Layer::Top)
        );
        assert_eq!(
            route[5],
            RoutePoint::via(Point::new(2.0, 0.0), Layer::Top, Layer::Bottom)
        );
        assert_eq!(route.first().and_then(|p| p.layer()), Some(Layer::Bottom));
        assert_eq!(route.last().and_then(|p| p.layer()), Some(Layer::Bottom));
        assert!((traces[0].length() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_layer_change_without_via_is_not_merged() {
        let segments = vec![
            seg(Layer::Top, &[(0.0, 0.0), (1.0, 0.0)]),
            seg(Layer::Bottom, &[(1.0, 0.0), (2.0, 0.0)]),
        ];
        let traces = Stitcher::default().stitch_net("N", &segments, &[]).unwrap();
        assert_eq!(traces.len(), 2);
    }

    #[test]
    fn test_branch_prefers_continuing_candidate() {
        // at (1,0): a dead-end spur declared first, then a branch that goes on
        let segments = vec![
            seg(Layer::Top, &[(0.0, 0.0), (1.0, 0.0)]),
            seg(Layer::Top, &[(1.0, 0.0), (1.0, 1.0)]),
            seg(Layer::Top, &[(1.0, 0.0), (2.0, 0.0)]),
            seg(Layer::Top, &[(2.0, 0.0), (3.0, 0.0)]),
        ];
        let traces = Stitcher::default().stitch_net("N", &segments, &[]).unwrap();
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].segments, vec![0, 2, 3]);
        assert_eq!(traces[1].segments, vec![1]);
    }

    #[test]
    fn test_closed_loop_terminates() {
        let segments = vec![
            seg(Layer::Top, &[(0.0, 0.0), (1.0, 0.0)]),
            seg(Layer::Top, &[(1.0, 0.0), (1.0, 1.0)]),
            seg(Layer::Top, &[(1.0, 1.0), (0.0, 0.0)]),
        ];
        let traces = Stitcher::default().stitch_net("N", &segments, &[]).unwrap();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].segments.len(), 3);
    }

    #[test]
    fn test_duplicate_segments_consumed_once() {
        let segments = vec![
            seg(Layer::Top, &[(0.0, 0.0), (1.0, 0.0)]),
            seg(Layer::Top, &[(0.0, 0.0), (1.0, 0.0)]),
        ];
        let traces = Stitcher::default().stitch_net("N", &segments, &[]).unwrap();
        let total: usize = traces.iter().map(|t| t.segments.len()).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_iteration_guard_reports_stage_and_net() {
        let mut guard = IterationGuard::new("GND", 2);
        assert!(guard.tick().is_ok());
        assert!(guard.tick().is_ok());
        match guard.tick() {
            Err(ConversionError::IterationLimitExceeded { stage, net, limit }) => {
                assert_eq!(stage, Stage::Stitching);
                assert_eq!(net, "GND");
                assert_eq!(limit, 2);
            }
            other => panic!("expected iteration limit, got {:?}", other),
        }
    }
}
