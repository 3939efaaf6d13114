use crate::network::NetworkError;
use crate::network::event::UpdateLinkStatus;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

pub type LinkId = usize;

/// Emulation parameters of a link, as given by the operator or the topology
///
/// Missing values mean "unconstrained". Unrecognized flags are kept in `extra` and are never
/// interpreted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinkParams {
    /// The link's bandwidth, in Mbit/s
    pub bw: Option<f64>,
    /// The propagation delay of the link, as a duration string (e.g. `10ms`)
    pub delay: Option<String>,
    /// The ratio of packets that will be lost, in percent (the value must be between 0 and 100)
    pub loss: Option<f64>,
    /// The maximum queue length, in packets
    pub max_queue_size: Option<u64>,
    pub extra: BTreeMap<String, String>,
}

impl LinkParams {
    pub fn is_empty(&self) -> bool {
        self.bw.is_none()
            && self.delay.is_none()
            && self.loss.is_none()
            && self.max_queue_size.is_none()
            && self.extra.is_empty()
    }

    pub(crate) fn shaping(&self) -> Result<LinkShaping, NetworkError> {
        let bandwidth_mbps = match self.bw {
            Some(bw) if !(bw > 0.0 && bw.is_finite()) => {
                return Err(NetworkError::invalid_parameter(
                    "bw",
                    bw.to_string(),
                    "bandwidth must be a positive number",
                ));
            }
            bw => bw,
        };

        let loss_ratio = match self.loss {
            Some(loss) if !(0.0..=100.0).contains(&loss) => {
                return Err(NetworkError::invalid_parameter(
                    "loss",
                    loss.to_string(),
                    "loss must be between 0 and 100 percent",
                ));
            }
            Some(loss) => loss / 100.0,
            None => 0.0,
        };

        let delay = match &self.delay {
            Some(delay) => parse_delay(delay)
                .ok_or_else(|| NetworkError::invalid_parameter("delay", delay, "expected <number>[us|ms|s]"))?,
            None => Duration::ZERO,
        };

        Ok(LinkShaping {
            bandwidth_mbps,
            delay,
            loss_ratio,
        })
    }
}

impl Display for LinkParams {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut fields = Vec::new();
        if let Some(bw) = self.bw {
            fields.push(format!("bw={bw}"));
        }
        if let Some(delay) = &self.delay {
            fields.push(format!("delay={delay}"));
        }
        if let Some(loss) = self.loss {
            fields.push(format!("loss={loss}"));
        }
        if let Some(max_queue_size) = self.max_queue_size {
            fields.push(format!("max_queue_size={max_queue_size}"));
        }
        for (key, value) in &self.extra {
            fields.push(format!("{key}={value}"));
        }

        write!(f, "{}", fields.join(" "))
    }
}

/// Parses a tc-style duration; a number without unit is in microseconds
pub fn parse_delay(s: &str) -> Option<Duration> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let number: f64 = number.parse().ok()?;
    let micros = match unit {
        "" | "us" | "usec" => number,
        "ms" | "msec" => number * 1_000.0,
        "s" | "sec" => number * 1_000_000.0,
        _ => return None,
    };

    Some(Duration::from_nanos((micros * 1_000.0).round() as u64))
}

/// Validated link parameters, in the units used by the reachability model
#[derive(Clone, Copy, Debug)]
pub(crate) struct LinkShaping {
    pub(crate) bandwidth_mbps: Option<f64>,
    pub(crate) delay: Duration,
    pub(crate) loss_ratio: f64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub node: Arc<str>,
    pub interface: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkStatus {
    Up,
    Down,
}

pub struct Link {
    id: LinkId,
    endpoints: [Endpoint; 2],
    params: LinkParams,
    pub(crate) shaping: LinkShaping,
    status: LinkStatus,
}

impl Link {
    pub(crate) fn new(
        id: LinkId,
        endpoints: [Endpoint; 2],
        params: LinkParams,
        shaping: LinkShaping,
    ) -> Self {
        Self {
            id,
            endpoints,
            params,
            shaping,
            status: LinkStatus::Up,
        }
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn endpoints(&self) -> &[Endpoint; 2] {
        &self.endpoints
    }

    pub fn params(&self) -> &LinkParams {
        &self.params
    }

    pub fn status(&self) -> LinkStatus {
        self.status
    }

    pub fn is_up(&self) -> bool {
        self.status == LinkStatus::Up
    }

    pub fn status_str(&self) -> &'static str {
        match self.status {
            LinkStatus::Up => "UP",
            LinkStatus::Down => "DOWN",
        }
    }

    /// Whether this link joins `a` and `b`, in either direction
    pub fn connects(&self, a: &str, b: &str) -> bool {
        let [x, y] = &self.endpoints;
        (&*x.node == a && &*y.node == b) || (&*x.node == b && &*y.node == a)
    }

    /// The endpoint on the other side of `node`, if `node` is attached to this link
    pub fn peer_of(&self, node: &str) -> Option<&Endpoint> {
        let [x, y] = &self.endpoints;
        if &*x.node == node {
            Some(y)
        } else if &*y.node == node {
            Some(x)
        } else {
            None
        }
    }

    /// Returns true if the status actually changed
    pub(crate) fn update_status(&mut self, update: UpdateLinkStatus) -> bool {
        let status = match update {
            UpdateLinkStatus::Up => LinkStatus::Up,
            UpdateLinkStatus::Down => LinkStatus::Down,
        };

        let changed = self.status != status;
        self.status = status;
        changed
    }
}

impl Display for Link {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let [x, y] = &self.endpoints;
        write!(f, "{}<->{}", x.interface, y.interface)
    }
}
