use serde::{Deserialize, Serialize};

/// Interval applied when an `add` command omits `itvl`.
pub const DEFAULT_INTERVAL_MS: u64 = 6_000;

/// Byte budgets applied to names and hosts on ingest.
pub const NAME_MAX_BYTES: usize = 15;
pub const HOST_MAX_BYTES: usize = 47;

/// Sentinel for "no usable latency": the target is down, or the last
/// check had zero successful rounds.
pub const RTT_UNKNOWN: f32 = -1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub name: String,
    pub host: String,
    pub interval_ms: u64,
    /// Uptime of the last check pass; `None` until the first check, and
    /// a never-checked target is due immediately.
    pub last_check_ms: Option<u64>,
    pub consec_ok: u32,
    pub consec_fail: u32,
    pub is_down: bool,
    pub last_avg_rtt: f32,
    pub last_change_ms: u64,
    pub down_start_ms: u64,
}

impl Target {
    pub fn new(name: &str, host: &str, interval_ms: u64) -> Self {
        Self {
            name: truncate_bytes(name, NAME_MAX_BYTES),
            host: truncate_bytes(host, HOST_MAX_BYTES),
            interval_ms,
            last_check_ms: None,
            consec_ok: 0,
            consec_fail: 0,
            is_down: false,
            last_avg_rtt: RTT_UNKNOWN,
            last_change_ms: 0,
            down_start_ms: 0,
        }
    }
}

/// Result of one full check (up to four probe rounds) against a target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckOutcome {
    pub ok: bool,
    pub avg_rtt: f32,
}

impl CheckOutcome {
    pub fn success(avg_rtt: f32) -> Self {
        Self { ok: true, avg_rtt }
    }

    pub fn failure() -> Self {
        Self {
            ok: false,
            avg_rtt: RTT_UNKNOWN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    Up,
    Down,
}

/// One telemetry entry as it appears on the wire. `down` is 0/1 rather
/// than a bool to match the datagram format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotItem {
    pub name: String,
    pub host: String,
    pub down: u8,
    pub rtt: f32,
}

impl SnapshotItem {
    pub fn from_target(target: &Target) -> Self {
        Self {
            name: target.name.clone(),
            host: target.host.clone(),
            down: target.is_down as u8,
            rtt: target.last_avg_rtt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub ts: u64,
    pub items: Vec<SnapshotItem>,
}

/// Truncate at a char boundary so the result never exceeds `max` bytes.
fn truncate_bytes(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
