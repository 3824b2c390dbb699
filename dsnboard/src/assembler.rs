//! Board Assembler
//!
//! Runs the conversion stages in order and writes the result into a
//! [`Board`]: transform, catalog, placement, connectivity, then per net
//! extraction, stitching and pad reconciliation.

use std::path::Path;

use crate::board::{
    Board, BoardElement, BoardRecord, ComponentRecord, ConnectionRecord, NetRecord,
    PlatedHoleRecord, PortRecord, SmtPadRecord, TraceRecord, ViaElement,
};
use crate::catalog::FootprintCatalog;
use crate::connectivity::NetTable;
use crate::core::{
    ConversionContext, ConversionError, ConversionOptions, ConversionResult, ConversionStats,
    ConversionWarning, ReferenceKind, Stage,
};
use crate::geometry::{BoundingBox, Layer, Point};
use crate::parser::schema::{DsnDesign, RoutingResults, SesDesign};
use crate::parser::{DsnParser, SesParser};
use crate::placement::{PlacementResolver, PlacementResult};
use crate::routing::{ExtractedNet, PadReconciler, ReconciledTrace, SegmentExtractor, Stitcher};
use crate::transform::CoordinateTransform;

/// Conversion entry points.
pub struct BoardAssembler;

impl BoardAssembler {
    /// Convert a design, overlaying `routes` when given. Without routes the
    /// design's own wiring section (if any) is used.
    pub fn convert(
        design: &DsnDesign,
        routes: Option<&RoutingResults>,
        options: ConversionOptions,
    ) -> Result<ConversionResult, ConversionError> {
        let mut ctx = ConversionContext::new(options);
        ctx.set_transform(CoordinateTransform::for_design(design, ctx.options.center_board));

        let mut catalog = FootprintCatalog::build(&design.library, &mut ctx);
        let placement = PlacementResolver::new(&catalog, &ctx)?.resolve(design, &mut ctx)?;
        let nets = NetTable::build(&design.network, &placement, &mut ctx);

        let mut board = Board::new();
        let mut stats = ConversionStats::default();

        write_board_record(&mut board, design, &ctx)?;
        write_placement(&mut board, &placement, &mut stats);
        write_nets(&mut board, &nets, &mut stats);

        if let Some(routes) = routes.or(design.wiring.as_ref()) {
            catalog.merge_padstacks(&routes.padstacks, ctx.options.fallback_pad_diameter);
            let mut extractor = SegmentExtractor::new(&catalog, routes, &ctx)?;
            let extracted = extractor.extract(routes, &mut ctx);

            write_raw_routes(&mut board, &extracted, &nets, &mut stats);
            stitch_routes(&mut board, &extracted, &placement, &nets, &mut ctx, &mut stats)?;
        } else {
            tracing::debug!("No routing results, board has no traces");
        }

        let warnings = ctx.into_warnings();
        stats.warnings = warnings.len();

        tracing::info!(
            "Converted {}: {} components, {} nets, {} segments stitched into {} traces ({} hanging), {} vias, {} warnings",
            design.name,
            stats.components,
            stats.nets,
            stats.raw_segments,
            stats.traces,
            stats.hanging_traces,
            stats.vias,
            stats.warnings
        );

        Ok(ConversionResult {
            board,
            warnings,
            stats,
        })
    }

    /// Convert a design together with a session file's routes.
    pub fn convert_with_session(
        design: &DsnDesign,
        session: &SesDesign,
        options: ConversionOptions,
    ) -> Result<ConversionResult, ConversionError> {
        if let Some(base) = &session.base_design {
            if !design.name.is_empty() && !base.ends_with(design.name.as_str()) {
                tracing::warn!(
                    "Session {} was routed from {}, converting against {}",
                    session.name,
                    base,
                    design.name
                );
            }
        }
        Self::convert(design, Some(&session.routes), options)
    }

    /// Load and convert a DSN file, with an optional SES file.
    pub fn convert_files(
        dsn_path: &Path,
        ses_path: Option<&Path>,
        options: ConversionOptions,
    ) -> Result<ConversionResult, ConversionError> {
        let design = DsnParser::parse_dsn(dsn_path)?;
        match ses_path {
            Some(path) => {
                let session = SesParser::parse_ses(path)?;
                Self::convert_with_session(&design, &session, options)
            }
            None => Self::convert(&design, None, options),
        }
    }
}

fn write_board_record(
    board: &mut Board,
    design: &DsnDesign,
    ctx: &ConversionContext,
) -> Result<(), ConversionError> {
    let transform = ctx.transform(Stage::Assembly)?;
    let mut record = BoardRecord::new(&design.name);

    let outline: Vec<Point> = match design.boundary.paths.first() {
        Some(path) => path
            .coordinates
            .chunks_exact(2)
            .map(|xy| transform.apply(xy[0], xy[1]))
            .collect(),
        None => match design.boundary.rects.first() {
            Some(r) => [(r.x1, r.y1), (r.x2, r.y1), (r.x2, r.y2), (r.x1, r.y2)]
                .iter()
                .map(|&(x, y)| transform.apply(x, y))
                .collect(),
            None => Vec::new(),
        },
    };

    if let Some(bbox) = BoundingBox::from_points(&outline) {
        record.width = bbox.width();
        record.height = bbox.height();
        record.center = bbox.center();
    }
    record.outline = outline;

    board.insert(BoardElement::PcbBoard(record));
    Ok(())
}

fn write_placement(board: &mut Board, placement: &PlacementResult, stats: &mut ConversionStats) {
    for component in &placement.components {
        board.insert(BoardElement::PcbComponent(ComponentRecord {
            pcb_component_id: component.component_id.clone(),
            reference: component.reference.clone(),
            footprint_id: component.footprint_id.clone(),
            center: component.center,
            rotation: component.rotation,
            layer: component.layer,
        }));
    }

    for pad in &placement.pads {
        let element = match pad.hole_diameter {
            Some(hole_diameter) => BoardElement::PcbPlatedHole(PlatedHoleRecord {
                pcb_plated_hole_id: pad.pad_id.clone(),
                pcb_component_id: pad.component_id.clone(),
                pcb_port_id: pad.port_id.clone(),
                x: pad.position.x,
                y: pad.position.y,
                outer_diameter: pad.shape.outer_diameter(),
                hole_diameter,
                shape: pad.shape.clone(),
                layers: pad.layers.clone(),
                port_hints: vec![pad.pin_id.clone()],
            }),
            None => BoardElement::PcbSmtpad(SmtPadRecord {
                pcb_smtpad_id: pad.pad_id.clone(),
                pcb_component_id: pad.component_id.clone(),
                pcb_port_id: pad.port_id.clone(),
                x: pad.position.x,
                y: pad.position.y,
                layer: pad.layers.first().copied().unwrap_or(Layer::Top),
                shape: pad.shape.clone(),
                port_hints: vec![pad.pin_id.clone()],
            }),
        };
        board.insert(element);
        board.insert(BoardElement::PcbPort(PortRecord {
            pcb_port_id: pad.port_id.clone(),
            pcb_component_id: pad.component_id.clone(),
            pin_ref: pad.pin_ref.clone(),
            x: pad.position.x,
            y: pad.position.y,
            layers: pad.layers.clone(),
        }));
    }

    stats.components = placement.components.len();
    stats.pads = placement.pads.len();
}

fn write_nets(board: &mut Board, nets: &NetTable, stats: &mut ConversionStats) {
    for net in &nets.nets {
        board.insert(BoardElement::SourceNet(NetRecord {
            source_net_id: net.net_id.clone(),
            name: net.name.clone(),
        }));
    }
    for connection in &nets.connections {
        board.insert(BoardElement::SourceTrace(ConnectionRecord {
            source_trace_id: connection.connection_id.clone(),
            source_net_id: connection.net_id.clone(),
            connected_port_ids: connection.port_ids.clone(),
        }));
    }
    stats.nets = nets.nets.len();
    stats.connections = nets.connections.len();
}

/// One trace per extracted segment plus every via; the stitch pass replaces
/// the raw traces afterwards.
fn write_raw_routes(
    board: &mut Board,
    extracted: &[ExtractedNet],
    nets: &NetTable,
    stats: &mut ConversionStats,
) {
    for net in extracted {
        let net_id = nets.net_id(&net.name).map(str::to_string);
        for segment in &net.segments {
            let id = board.next_id("pcb_trace");
            board.insert(BoardElement::PcbTrace(TraceRecord {
                pcb_trace_id: id,
                net_name: net.name.clone(),
                source_net_id: net_id.clone(),
                route: segment.to_route(),
                trace_length: segment.length(),
                start_port_id: None,
                end_port_id: None,
                hanging: false,
            }));
        }
        for via in &net.vias {
            let id = board.next_id("pcb_via");
            board.insert(BoardElement::PcbVia(ViaElement {
                pcb_via_id: id,
                net_name: net.name.clone(),
                x: via.position.x,
                y: via.position.y,
                outer_diameter: via.outer_diameter,
                hole_diameter: via.hole_diameter,
                layers: vec![via.from_layer, via.to_layer],
            }));
        }
        stats.raw_segments += net.segments.len();
        stats.vias += net.vias.len();
    }
}

fn stitch_routes(
    board: &mut Board,
    extracted: &[ExtractedNet],
    placement: &PlacementResult,
    nets: &NetTable,
    ctx: &mut ConversionContext,
    stats: &mut ConversionStats,
) -> Result<(), ConversionError> {
    let stitcher = Stitcher::new(&ctx.options.stitch);
    let ports = placement.port_locations();
    let reconciler = PadReconciler::new(&ports, ctx.options.pad_slack_mm, stitcher.epsilon());

    for net in extracted {
        let net_id = nets.net_id(&net.name).map(str::to_string);
        if net_id.is_none() {
            ctx.warn(ConversionWarning::UnresolvedReference {
                stage: Stage::Stitching,
                reference_kind: ReferenceKind::Net,
                reference: net.name.clone(),
            });
        }

        let chains = stitcher.stitch_net(&net.name, &net.segments, &net.vias)?;
        let traces = reconciler.reconcile(chains);

        board.delete_traces_for_net(&net.name);
        for trace in traces {
            if trace.is_hanging() {
                stats.hanging_traces += 1;
                if !ctx.options.keep_hanging_traces {
                    continue;
                }
            }
            insert_trace(board, trace, net_id.clone());
            stats.traces += 1;
        }
    }
    Ok(())
}

fn insert_trace(board: &mut Board, trace: ReconciledTrace, source_net_id: Option<String>) {
    let id = board.next_id("pcb_trace");
    let hanging = trace.is_hanging();
    board.insert(BoardElement::PcbTrace(TraceRecord {
        pcb_trace_id: id,
        net_name: trace.net,
        source_net_id,
        route: trace.route,
        trace_length: trace.length,
        start_port_id: trace.start_port_id,
        end_port_id: trace.end_port_id,
        hanging,
    }));
}
