use crate::models::{Snapshot, SnapshotItem, Target};

/// Largest snapshot we will put in one datagram. Chosen to stay under a
/// typical 1500-byte MTU with headroom for IP/UDP headers.
pub const DATAGRAM_BUDGET: usize = 1_400;

/// Pause between datagrams on the degraded per-item path.
pub const PER_ITEM_GAP_MS: u64 = 10;

/// Encoded form of one snapshot, ready to hand to the socket.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The whole snapshot fits in one datagram.
    Single(Vec<u8>),
    /// Snapshot too large: one datagram per item, all carrying the
    /// same `ts`. Receivers see the set flicker between frames.
    PerItem(Vec<Vec<u8>>),
}

pub fn snapshot(ts: u64, targets: &[Target]) -> Snapshot {
    Snapshot {
        ts,
        items: targets.iter().map(SnapshotItem::from_target).collect(),
    }
}

pub fn encode(snapshot: &Snapshot) -> serde_json::Result<Payload> {
    let buf = serde_json::to_vec(snapshot)?;
    if buf.len() <= DATAGRAM_BUDGET {
        return Ok(Payload::Single(buf));
    }

    let mut frames = Vec::with_capacity(snapshot.items.len());
    for item in &snapshot.items {
        let single = Snapshot {
            ts: snapshot.ts,
            items: vec![item.clone()],
        };
        frames.push(serde_json::to_vec(&single)?);
    }
    Ok(Payload::PerItem(frames))
}

/// Parse an inbound telemetry datagram. Anything that is not a complete
/// snapshot object is discarded.
pub fn decode(buf: &[u8]) -> Option<Snapshot> {
    serde_json::from_slice(buf).ok()
}
