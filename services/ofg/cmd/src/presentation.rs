//! Text presentation: topology changes become log lines.

use ofg_topology::{Drawable, LinkId, Presentation};
use ofg_wire::{Message, Payload};

use crate::{component_debug, component_info, component_warn};

/// Reports every topology change through the log
#[derive(Debug, Default)]
pub struct LogPresentation;

impl Presentation for LogPresentation {
    fn add_drawable(&self, drawable: &Drawable) {
        match drawable {
            Drawable::Node(node) => component_info!("topology", "Node added: {}", node),
            Drawable::Link(link) => component_info!("topology", "Link added: {}", link),
            Drawable::Flow(flow) => component_debug!(
                "topology",
                "Flow {} added: {:#x}:{} -> {:#x}:{} via {} hops",
                flow.flow_id,
                flow.src.id,
                flow.src_port,
                flow.dst.id,
                flow.dst_port,
                flow.path.len()
            ),
        }
    }

    fn remove_drawable(&self, drawable: &Drawable) {
        match drawable {
            Drawable::Node(node) => component_info!("topology", "Node removed: {}", node),
            Drawable::Link(link) => component_info!("topology", "Link removed: {}", link),
            Drawable::Flow(flow) => component_debug!("topology", "Flow {} removed", flow.flow_id),
        }
    }

    fn link_utilization_changed(&self, link: LinkId, utilization: f64) {
        if utilization < 0.0 {
            component_debug!("stats", "{} utilization unknown", link);
        } else {
            component_debug!("stats", "{} at {:.1}% utilization", link, utilization * 100.0);
        }
    }

    fn extension_received(&self, msg: &Message) {
        match &msg.payload {
            Payload::ExPowerUsage(p) => component_info!("ext", "Network draws {} W", p.watts_current),
            Payload::EtPowerUsage(p) => component_info!(
                "ext",
                "Power: {} W now, {} W always-on, {} W max",
                p.watts_current,
                p.watts_traditional,
                p.watts_max
            ),
            Payload::EtBandwidth(mbps) => component_info!("ext", "Achieved bandwidth: {} Mbps", mbps),
            Payload::EtLatency(ms) => component_info!("ext", "Latency: {} ms", ms),
            Payload::EtComputationDone(unplaced) => {
                if *unplaced > 0 {
                    component_warn!("ext", "Flow placement done, {} flows unplaced", unplaced);
                } else {
                    component_info!("ext", "Flow placement done");
                }
            }
            other => component_debug!("ext", "Extension message {:?}", other.message_type()),
        }
    }
}
