//! Stitching and pad attachment behavior on hand-built nets

use dsnboard::core::StitchOptions;
use dsnboard::routing::{PadReconciler, PortLocation, TraceClass};
use dsnboard::{
    BoardAssembler, ConversionOptions, DsnParser, Layer, Point, RoutePoint, Segment,
    StitchedTrace, Stitcher, ViaRecord,
};

fn seg(layer: Layer, points: &[(f64, f64)]) -> Segment {
    Segment::new(
        "N",
        layer,
        0.25,
        points.iter().map(|&(x, y)| Point::new(x, y)).collect(),
    )
}

fn wire_points(trace: &StitchedTrace) -> Vec<Point> {
    trace
        .route
        .iter()
        .filter(|p| !p.is_via())
        .map(|p| p.position())
        .collect()
}

fn stitch(segments: &[Segment], vias: &[ViaRecord]) -> Vec<StitchedTrace> {
    Stitcher::default()
        .stitch_net("N", segments, vias)
        .expect("Stitching should finish")
}

#[test]
fn test_shared_endpoints_preserve_length() {
    let segments = vec![
        seg(Layer::Top, &[(0.0, 0.0), (3.0, 0.0)]),
        seg(Layer::Top, &[(3.0, 4.0), (3.0, 0.0)]),
        seg(Layer::Top, &[(3.0, 4.0), (6.0, 8.0), (9.0, 8.0)]),
    ];
    let total: f64 = segments.iter().map(Segment::length).sum();

    let traces = stitch(&segments, &[]);
    assert_eq!(traces.len(), 1);
    assert!((traces[0].length() - total).abs() < 1e-9);
    assert_eq!(
        wire_points(&traces[0]),
        vec![
            Point::new(0.0, 0.0),
            Point::new(3.0, 0.0),
            Point::new(3.0, 4.0),
            Point::new(6.0, 8.0),
            Point::new(9.0, 8.0),
        ]
    );
}

#[test]
fn test_every_segment_in_exactly_one_chain() {
    let segments = vec![
        seg(Layer::Top, &[(0.0, 0.0), (1.0, 0.0)]),
        seg(Layer::Top, &[(5.0, 5.0), (6.0, 5.0)]),
        seg(Layer::Top, &[(1.0, 0.0), (2.0, 0.0)]),
        seg(Layer::Top, &[(1.0, 0.0), (1.0, 1.0)]),
        seg(Layer::Bottom, &[(2.0, 0.0), (3.0, 0.0)]),
        seg(Layer::Top, &[(6.0, 5.0), (5.0, 5.0)]),
    ];

    let traces = stitch(&segments, &[]);
    let mut seen: Vec<usize> = traces.iter().flat_map(|t| t.segments.clone()).collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..segments.len()).collect::<Vec<_>>());
}

#[test]
fn test_restitching_is_stable() {
    let segments = vec![
        seg(Layer::Top, &[(0.0, 0.0), (5.0, 0.0)]),
        seg(Layer::Top, &[(5.0, 0.0), (10.0, 5.0)]),
        seg(Layer::Top, &[(5.0, 0.0), (10.0, -5.0)]),
        seg(Layer::Top, &[(20.0, 0.0), (25.0, 0.0)]),
    ];
    let first = stitch(&segments, &[]);

    let again: Vec<Segment> = first
        .iter()
        .map(|t| Segment::new("N", Layer::Top, 0.25, wire_points(t)))
        .collect();
    let second = stitch(&again, &[]);

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(wire_points(a), wire_points(b));
    }
}

#[test]
fn test_gap_within_epsilon_merges() {
    let segments = vec![
        seg(Layer::Top, &[(0.0, 0.0), (1.0, 0.0)]),
        seg(Layer::Top, &[(1.0009, 0.0), (2.0, 0.0)]),
    ];
    let traces = stitch(&segments, &[]);
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0].segments, vec![0, 1]);
}

#[test]
fn test_gap_beyond_epsilon_stays_split() {
    let segments = vec![
        seg(Layer::Top, &[(0.0, 0.0), (1.0, 0.0)]),
        seg(Layer::Top, &[(1.01, 0.0), (2.0, 0.0)]),
    ];
    assert_eq!(stitch(&segments, &[]).len(), 2);
}

#[test]
fn test_epsilon_is_configurable() {
    let segments = vec![
        seg(Layer::Top, &[(0.0, 0.0), (1.0, 0.0)]),
        seg(Layer::Top, &[(1.01, 0.0), (2.0, 0.0)]),
    ];
    let stitcher = Stitcher::new(&StitchOptions {
        epsilon_mm: 0.02,
        ..Default::default()
    });
    let traces = stitcher.stitch_net("N", &segments, &[]).unwrap();
    assert_eq!(traces.len(), 1);
}

#[test]
fn test_layer_change_needs_via() {
    let segments = vec![
        seg(Layer::Top, &[(0.0, 0.0), (2.0, 0.0)]),
        seg(Layer::Bottom, &[(2.0, 0.0), (4.0, 0.0)]),
    ];

    let unjoined = stitch(&segments, &[]);
    assert_eq!(unjoined.len(), 2);
    assert!(unjoined.iter().all(|t| t.via_count() == 0));

    let via = ViaRecord::new("N", Point::new(2.0, 0.0));
    let joined = stitch(&segments, &[via]);
    assert_eq!(joined.len(), 1);
    assert_eq!(joined[0].via_count(), 1);
    assert_eq!(joined[0].layers(), vec![Layer::Top, Layer::Bottom]);
    assert!(matches!(
        joined[0].route[2],
        RoutePoint::Via {
            from_layer: Layer::Top,
            to_layer: Layer::Bottom,
            ..
        }
    ));
}

#[test]
fn test_via_elsewhere_does_not_join() {
    let segments = vec![
        seg(Layer::Top, &[(0.0, 0.0), (2.0, 0.0)]),
        seg(Layer::Bottom, &[(2.0, 0.0), (4.0, 0.0)]),
    ];
    let via = ViaRecord::new("N", Point::new(3.0, 0.0));
    assert_eq!(stitch(&segments, &[via]).len(), 2);
}

#[test]
fn test_chain_attaches_to_both_pads() {
    let segments = vec![
        seg(Layer::Top, &[(0.0, 0.0), (5.0, 0.0)]),
        seg(Layer::Top, &[(5.0, 5.0), (5.0, 0.0)]),
        seg(Layer::Top, &[(5.0, 5.0), (10.0, 5.0)]),
    ];
    let ports = vec![
        PortLocation::new("pcb_port_0", 0.0, 0.0, 0.5, 0.5),
        PortLocation::new("pcb_port_1", 10.0, 5.0, 0.5, 0.5),
    ];

    let chains = stitch(&segments, &[]);
    assert_eq!(chains.len(), 1);

    let reconciler = PadReconciler::new(&ports, 0.01, 0.001);
    let traces = reconciler.reconcile(chains);
    assert_eq!(traces[0].class, TraceClass::PadAttached);
    assert_eq!(traces[0].start_port_id.as_deref(), Some("pcb_port_0"));
    assert_eq!(traces[0].end_port_id.as_deref(), Some("pcb_port_1"));
    assert!((traces[0].length - 15.0).abs() < 1e-9);

    assert!(matches!(
        traces[0].route.first(),
        Some(RoutePoint::Wire { start_port_id: Some(id), .. }) if id == "pcb_port_0"
    ));
    assert!(matches!(
        traces[0].route.last(),
        Some(RoutePoint::Wire { end_port_id: Some(id), .. }) if id == "pcb_port_1"
    ));
}

#[test]
fn test_chain_off_pads_is_hanging() {
    let segments = vec![seg(Layer::Top, &[(2.0, 2.0), (3.0, 2.0)])];
    let ports = vec![PortLocation::new("pcb_port_0", 0.0, 0.0, 0.5, 0.5)];

    let reconciler = PadReconciler::new(&ports, 0.01, 0.001);
    let traces = reconciler.reconcile(stitch(&segments, &[]));
    assert!(traces[0].is_hanging());
}

#[test]
fn test_y_branch_is_deterministic() {
    let segments = vec![
        seg(Layer::Top, &[(0.0, 0.0), (5.0, 0.0)]),
        seg(Layer::Top, &[(5.0, 0.0), (10.0, 5.0)]),
        seg(Layer::Top, &[(5.0, 0.0), (10.0, -5.0)]),
    ];

    let first = stitch(&segments, &[]);
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].segments, vec![0, 1]);
    assert_eq!(first[1].segments, vec![2]);

    for _ in 0..10 {
        assert_eq!(stitch(&segments, &[]), first);
    }
}

const UNITS_BOARD: &str = r#"(pcb units.dsn
  (resolution mil 1000)
  (structure (boundary (rect pcb 0 0 100000 100000)))
  (network (net N))
  (wiring (wire (path F.Cu 100 0 0 10000 0) (net N))))
"#;

#[test]
fn test_mil_resolution_scales_to_mm() {
    let design = DsnParser::parse_dsn_str(UNITS_BOARD, "units.dsn").unwrap();
    let options = ConversionOptions {
        center_board: false,
        ..Default::default()
    };
    let result = BoardAssembler::convert(&design, None, options).unwrap();

    let traces: Vec<_> = result.board.traces().collect();
    assert_eq!(traces.len(), 1);
    // 10000 du at 1000 per mil is 10 mil
    assert!((traces[0].trace_length - 0.254).abs() < 1e-9);
    assert!(traces[0].route[1]
        .position()
        .approx_eq(&Point::new(0.254, 0.0), 1e-9));
}

#[test]
fn test_missing_resolution_defaults_to_mil() {
    let content = UNITS_BOARD.replace("(resolution mil 1000)", "");
    let design = DsnParser::parse_dsn_str(&content, "units.dsn").unwrap();
    let options = ConversionOptions {
        center_board: false,
        ..Default::default()
    };
    let result = BoardAssembler::convert(&design, None, options).unwrap();

    let length = result.board.traces().map(|t| t.trace_length).sum::<f64>();
    assert!((length - 0.254).abs() < 1e-9);
}
