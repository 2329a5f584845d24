use crate::models::{Snapshot, SnapshotItem};
use crate::telemetry;

/// One row of the viewer display.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerItem {
    pub name: String,
    pub host: String,
    pub down: bool,
    pub rtt: f32,
}

impl From<SnapshotItem> for ViewerItem {
    fn from(item: SnapshotItem) -> Self {
        Self {
            name: item.name,
            host: item.host,
            down: item.down != 0,
            rtt: item.rtt,
        }
    }
}

impl ViewerItem {
    pub fn has_rtt(&self) -> bool {
        self.rtt >= 0.0
    }
}

/// Local mirror of the probe's target set. Each accepted datagram
/// replaces the whole set; there is no merging, so a per-item burst
/// shows one target at a time until the next full snapshot.
#[derive(Debug, Default)]
pub struct DisplayModel {
    ts: u64,
    items: Vec<ViewerItem>,
}

impl DisplayModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ts(&self) -> u64 {
        self.ts
    }

    pub fn items(&self) -> &[ViewerItem] {
        &self.items
    }

    pub fn any_down(&self) -> bool {
        self.items.iter().any(|i| i.down)
    }

    /// Reconcile one inbound datagram. Returns whether the model was
    /// replaced; malformed input leaves it untouched.
    pub fn apply_datagram(&mut self, buf: &[u8]) -> bool {
        let Some(snapshot) = telemetry::decode(buf) else {
            return false;
        };
        self.apply(snapshot);
        true
    }

    pub fn apply(&mut self, snapshot: Snapshot) {
        self.ts = snapshot.ts;
        self.items = snapshot.items.into_iter().map(ViewerItem::from).collect();
    }
}
