//! Convert a DSN file (and optional SES file) and print the stitched traces.

use dsnboard::prelude::*;
use std::path::Path;

fn main() -> Result<(), ConversionError> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(dsn) = args.first() else {
        eprintln!("Usage: cargo run --example convert_board <board.dsn> [board.ses] [--json]");
        std::process::exit(1);
    };
    let ses = args.get(1).filter(|a| !a.starts_with("--"));
    let json = args.iter().any(|a| a == "--json");

    let dsn = Path::new(dsn);
    if !dsn.exists() {
        eprintln!("File not found: {}", dsn.display());
        std::process::exit(1);
    }

    let result = BoardAssembler::convert_files(
        dsn,
        ses.map(Path::new),
        ConversionOptions::default(),
    )?;

    if json {
        match result.board.to_json_pretty() {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Could not serialize board: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let stats = &result.stats;
    println!("Converted: {}", dsn.display());
    println!(
        "  {} components, {} pads, {} nets",
        stats.components, stats.pads, stats.nets
    );
    println!(
        "  {} segments -> {} traces ({} hanging), {} vias",
        stats.raw_segments, stats.traces, stats.hanging_traces, stats.vias
    );
    println!();

    for trace in result.board.traces() {
        let start = trace.start_port_id.as_deref().unwrap_or("-");
        let end = trace.end_port_id.as_deref().unwrap_or("-");
        println!(
            "  {:<12} {:<8} {:>8.3}mm  {} -> {}{}",
            trace.pcb_trace_id,
            trace.net_name,
            trace.trace_length,
            start,
            end,
            if trace.hanging { "  (hanging)" } else { "" }
        );
    }

    if result.has_warnings() {
        println!("\nWarnings:");
        for warning in &result.warnings {
            println!("  - {}", warning);
        }
    }

    let graph = BoardGraph::from_board(&result.board);
    let unrouted = graph.unrouted_ports();
    if !unrouted.is_empty() {
        println!("\nUnrouted pins:");
        for port in unrouted {
            println!("  - {}", port.pin_ref);
        }
    }

    Ok(())
}
