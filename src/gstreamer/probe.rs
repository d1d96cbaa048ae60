//! Element availability checks
//!
//! Reports which stages of each topology the installed plugin set can
//! provide, so a missing plugin is named before anything is built.

use super::topology::{receiver_topology, transmitter_topology, StageSpec};
use crate::config::{ReceiverConfig, SinkKind, SourceKind, TransmitterConfig};
use gstreamer as gst;
use log::debug;

/// Check if a GStreamer element is available
pub fn element_available(name: &str) -> bool {
    gst::ElementFactory::find(name).is_some()
}

/// Factories used by `specs` that are not installed, in first-use order
pub fn missing_factories(specs: &[StageSpec]) -> Vec<&'static str> {
    let mut missing: Vec<&'static str> = Vec::new();
    for spec in specs {
        if !missing.contains(&spec.factory) && !element_available(spec.factory) {
            debug!("Element factory {} not found", spec.factory);
            missing.push(spec.factory);
        }
    }
    missing
}

/// Availability of one topology
#[derive(Debug, Clone)]
pub struct TopologyReport {
    /// "receive" or "transmit"
    pub direction: &'static str,
    /// Source or destination kind name
    pub kind: &'static str,
    pub stages: Vec<StageSpec>,
    pub missing: Vec<&'static str>,
}

impl TopologyReport {
    pub fn is_usable(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Probe every receiver and transmitter topology with default parameters
pub fn report() -> Vec<TopologyReport> {
    let mut reports = Vec::new();

    for source in [SourceKind::Usb, SourceKind::H264, SourceKind::H265] {
        let config = ReceiverConfig {
            source,
            ..ReceiverConfig::default()
        };
        if let Ok(stages) = receiver_topology(&config) {
            reports.push(TopologyReport {
                direction: "receive",
                kind: source.as_str(),
                missing: missing_factories(&stages),
                stages,
            });
        }
    }

    for destination in [SinkKind::H264, SinkKind::H265, SinkKind::Display] {
        let config = TransmitterConfig {
            destination,
            ..TransmitterConfig::default()
        };
        if let Ok(stages) = transmitter_topology(&config) {
            reports.push(TopologyReport {
                direction: "transmit",
                kind: destination.as_str(),
                missing: missing_factories(&stages),
                stages,
            });
        }
    }

    reports
}
