use crate::network::link::{Link, LinkId};
use crate::network::registry::Registry;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Every link has this much per-hop processing overhead, on top of its configured delay
const PER_HOP_OVERHEAD: Duration = Duration::from_micros(50);

/// Links without a bandwidth limit behave like 10 Gbit/s links
const UNCONSTRAINED_BANDWIDTH_MBPS: f64 = 10_000.0;

/// Finds the shortest path from `source` to `target`, returned as the links to traverse
///
/// Only links that are up are considered, and packets are only forwarded by running switches.
pub(crate) fn find_path(
    registry: &Registry,
    links: &[Link],
    source: &str,
    target: &str,
) -> Option<Vec<LinkId>> {
    if source == target {
        return Some(Vec::new());
    }

    let mut reached_through: HashMap<Arc<str>, LinkId> = HashMap::new();
    let mut queue = VecDeque::new();
    queue.push_back(Arc::<str>::from(source));

    while let Some(current) = queue.pop_front() {
        for link in links.iter().filter(|l| l.is_up()) {
            let Some(peer) = link.peer_of(&current) else {
                continue;
            };

            if &*peer.node == source || reached_through.contains_key(&peer.node) {
                continue;
            }

            reached_through.insert(peer.node.clone(), link.id());
            if &*peer.node == target {
                return Some(unwind(links, &reached_through, source, target));
            }

            let forwards = registry
                .get(&peer.node)
                .is_some_and(|n| n.is_switch() && n.is_running());
            if forwards {
                queue.push_back(peer.node.clone());
            }
        }
    }

    None
}

fn unwind(
    links: &[Link],
    reached_through: &HashMap<Arc<str>, LinkId>,
    source: &str,
    target: &str,
) -> Vec<LinkId> {
    let mut path = Vec::new();
    let mut current: &str = target;
    while current != source {
        let link_id = reached_through[current];
        path.push(link_id);
        match links[link_id].peer_of(current) {
            Some(peer) => current = &*peer.node,
            None => break,
        }
    }

    path.reverse();
    path
}

/// Aggregated properties of a path
pub(crate) struct PathMetrics {
    pub(crate) round_trip: Duration,
    pub(crate) bottleneck_mbps: f64,
    /// The probability that a packet is lost along the path, in one direction
    pub(crate) loss_ratio: f64,
}

impl PathMetrics {
    pub(crate) fn new(links: &[Link], path: &[LinkId]) -> Self {
        let mut one_way = Duration::ZERO;
        let mut bottleneck_mbps = UNCONSTRAINED_BANDWIDTH_MBPS;
        let mut delivery_ratio = 1.0;
        for &id in path {
            let shaping = &links[id].shaping;
            one_way += shaping.delay;
            bottleneck_mbps =
                bottleneck_mbps.min(shaping.bandwidth_mbps.unwrap_or(UNCONSTRAINED_BANDWIDTH_MBPS));
            delivery_ratio *= 1.0 - shaping.loss_ratio;
        }

        let hops = u32::try_from(path.len()).unwrap_or(u32::MAX);
        Self {
            round_trip: one_way * 2 + PER_HOP_OVERHEAD * hops,
            bottleneck_mbps,
            loss_ratio: 1.0 - delivery_ratio,
        }
    }
}
