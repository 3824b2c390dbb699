//! Net/Connectivity Table Builder

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::{ConversionContext, ConversionWarning, ReferenceKind, Stage};
use crate::parser::schema::Network;
use crate::placement::PlacementResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetEntry {
    pub net_id: String,
    pub name: String,
}

/// Logical connection group: the ports a net must join
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub connection_id: String,
    pub net_id: String,
    pub net_name: String,
    pub port_ids: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NetTable {
    pub nets: Vec<NetEntry>,
    pub connections: Vec<Connection>,
    /// Pin references that matched no placed pad
    pub unresolved: Vec<String>,
    by_name: HashMap<String, usize>,
}

impl NetTable {
    pub fn build(
        network: &Network,
        placement: &PlacementResult,
        ctx: &mut ConversionContext,
    ) -> Self {
        let mut table = NetTable::default();

        for net in &network.nets {
            let net_id = match table.by_name.get(&net.name) {
                Some(&idx) => table.nets[idx].net_id.clone(),
                None => {
                    let net_id = format!("source_net_{}", table.nets.len());
                    table.by_name.insert(net.name.clone(), table.nets.len());
                    table.nets.push(NetEntry {
                        net_id: net_id.clone(),
                        name: net.name.clone(),
                    });
                    net_id
                }
            };

            let mut port_ids: Vec<String> = Vec::new();
            for pin_ref in &net.pin_refs {
                match placement.port_for_pin(pin_ref) {
                    Some(port_id) => {
                        if !port_ids.iter().any(|p| p == port_id) {
                            port_ids.push(port_id.to_string());
                        }
                    }
                    None => {
                        ctx.warn(ConversionWarning::UnresolvedReference {
                            stage: Stage::Connectivity,
                            reference_kind: ReferenceKind::PinRef,
                            reference: pin_ref.clone(),
                        });
                        table.unresolved.push(pin_ref.clone());
                    }
                }
            }

            if port_ids.len() < 2 {
                tracing::debug!(
                    "Net {} has {} resolved pins, no connection recorded",
                    net.name,
                    port_ids.len()
                );
                continue;
            }

            table.connections.push(Connection {
                connection_id: format!("source_trace_{}", table.connections.len()),
                net_id,
                net_name: net.name.clone(),
                port_ids,
            });
        }

        table
    }

    pub fn net_id(&self, name: &str) -> Option<&str> {
        self.by_name
            .get(name)
            .map(|&idx| self.nets[idx].net_id.as_str())
    }

    pub fn connection_for_net(&self, name: &str) -> Option<&Connection> {
        self.connections.iter().find(|c| c.net_name == name)
    }

    pub fn unresolved_count(&self) -> usize {
        self.unresolved.len()
    }
}
