//! Specctra SES Parser
//!
//! Reads autorouter session files (.ses). Only the `(routes ...)` section is
//! consumed: its resolution, the `library_out` padstacks, and the
//! `network_out` wires and vias.

use std::path::Path;

use crate::parser::dsn::{parse_padstack, parse_resolution, parse_via, parse_wire, DsnParseError};
use crate::parser::schema::*;
use crate::parser::sexp::{SExp, SExpParser};

/// Parser for Specctra session files
pub struct SesParser;

impl SesParser {
    pub fn parse_ses(path: &Path) -> Result<SesDesign, DsnParseError> {
        let content = std::fs::read_to_string(path)?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        Self::parse_ses_str(&content, filename)
    }

    pub fn parse_ses_str(content: &str, filename: &str) -> Result<SesDesign, DsnParseError> {
        let mut parser = SExpParser::new(content);
        let root = parser.parse()?;

        if root.tag() != Some("session") {
            return Err(DsnParseError::InvalidFormat(format!(
                "Expected session root, found {}",
                root.tag().unwrap_or("atom")
            )));
        }

        let name = root
            .args()
            .first()
            .and_then(|a| a.as_atom())
            .map(|s| s.to_string())
            .unwrap_or_else(|| filename.to_string());

        let base_design = root.value_of("base_design").map(|s| s.to_string());

        let routes_exp = root
            .find("routes")
            .ok_or_else(|| DsnParseError::MissingField("routes".to_string()))?;
        let mut routes = Self::parse_routes(routes_exp);

        // Some writers only declare the resolution on the session placement
        if routes.resolution.is_none() {
            routes.resolution = root
                .find("placement")
                .and_then(|p| p.find("resolution"))
                .and_then(parse_resolution);
        }

        tracing::debug!(
            "Parsed session {}: {} nets, {} wires, {} vias",
            name,
            routes.nets.len(),
            routes.wire_count(),
            routes.via_count()
        );

        Ok(SesDesign {
            name,
            base_design,
            routes,
        })
    }

    fn parse_routes(sexp: &SExp) -> RoutingResults {
        let mut routes = RoutingResults {
            resolution: sexp.find("resolution").and_then(parse_resolution),
            ..Default::default()
        };

        if let Some(library_out) = sexp.find("library_out") {
            routes.padstacks = library_out
                .find_all("padstack")
                .filter_map(parse_padstack)
                .collect();
        }

        if let Some(network_out) = sexp.find("network_out") {
            for net in network_out.find_all("net") {
                let Some(name) = net.leading_atoms().first().map(|s| s.to_string()) else {
                    continue;
                };
                let routed = routes.net_mut(&name);
                for item in net.args() {
                    match item.tag() {
                        Some("wire") => match parse_wire(item) {
                            Ok(Some(wire)) => routed.wires.push(wire),
                            Ok(None) => {}
                            Err(e) => tracing::warn!("Skipping wire on net {}: {}", name, e),
                        },
                        Some("via") => match parse_via(item) {
                            Ok(via) => routed.vias.push(via),
                            Err(e) => tracing::warn!("Skipping via on net {}: {}", name, e),
                        },
                        _ => {}
                    }
                }
            }
        }

        routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_SES: &str = r#"
(session "small.ses"
  (base_design "small.dsn")
  (placement
    (resolution um 10)
    (component "Resistor_SMD:R_0603" (place R1 20000 -10000 front 90))
  )
  (was_is)
  (routes
    (resolution um 10)
    (parser (host_cad "KiCad's Pcbnew") (host_version "7.0"))
    (library_out
      (padstack "Via[0-1]_600:300_um"
        (shape (circle F.Cu 6000 0 0))
        (shape (circle B.Cu 6000 0 0))
        (attach off)
      )
    )
    (network_out
      (net GND
        (wire (path F.Cu 2000 11750 -10000 30000 -10000))
        (wire (path B.Cu 2000 30000 -10000 51750 -10000))
        (via "Via[0-1]_600:300_um" 30000 -10000)
      )
      (net VCC
        (wire (qarc F.Cu 2000 0 0 10 10 5 5))
      )
    )
  )
)
"#;

    #[test]
    fn test_parse_session() {
        let ses = SesParser::parse_ses_str(SMALL_SES, "fallback.ses").unwrap();

        assert_eq!(ses.name, "small.ses");
        assert_eq!(ses.base_design.as_deref(), Some("small.dsn"));
        assert_eq!(ses.routes.resolution, Some(Resolution::new("um", 10.0)));
        assert_eq!(ses.routes.padstacks.len(), 1);
        assert_eq!(ses.routes.padstacks[0].shapes.len(), 2);

        let gnd = &ses.routes.nets[0];
        assert_eq!(gnd.wires.len(), 2);
        assert_eq!(gnd.wires[1].layer, "B.Cu");
        assert_eq!(gnd.vias.len(), 1);
        assert_eq!(gnd.vias[0].x, 30000.0);
    }

    #[test]
    fn test_arc_wires_are_not_carried() {
        let ses = SesParser::parse_ses_str(SMALL_SES, "small.ses").unwrap();
        let vcc = ses.routes.nets.iter().find(|n| n.name == "VCC").unwrap();
        assert!(vcc.wires.is_empty());
    }

    #[test]
    fn test_missing_routes_section() {
        let err = SesParser::parse_ses_str("(session s (base_design b))", "s.ses").unwrap_err();
        assert!(matches!(err, DsnParseError::MissingField(_)));
    }
}
