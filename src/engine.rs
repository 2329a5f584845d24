use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::alarm::{AlarmScheduler, ToneSink};
use crate::command::{self, Command};
use crate::health::{self, LinkStatus, Prober};
use crate::models::{HealthTransition, Snapshot, Target};
use crate::net;
use crate::registry::TargetRegistry;
use crate::telemetry;

/// Cadence of the cooperative loop.
pub const TICK_MS: u64 = 50;

/// Status output on the probe itself. The stock build has no panel, so
/// the default sink writes a one-line summary to the log.
pub trait DisplaySink: Send {
    fn render(&mut self, targets: &[Target], now_ms: u64);
}

#[derive(Debug, Default)]
pub struct LogDisplay;

impl DisplaySink for LogDisplay {
    fn render(&mut self, targets: &[Target], now_ms: u64) {
        let down = targets.iter().filter(|t| t.is_down).count();
        debug!(targets = targets.len(), down, uptime_ms = now_ms, "status refresh");
    }
}

/// Core probe state: the target table, the alarm, and the collaborators
/// behind traits. All mutation happens through the tick methods, which
/// take the loop's clock as an argument rather than reading one.
pub struct Monitor<P, S, L> {
    pub registry: TargetRegistry,
    pub alarm: AlarmScheduler,
    prober: P,
    tones: S,
    link: L,
    link_up: bool,
}

impl<P, S, L> Monitor<P, S, L>
where
    P: Prober,
    S: ToneSink,
    L: LinkStatus,
{
    pub fn new(registry: TargetRegistry, prober: P, tones: S, link: L) -> Self {
        Self {
            registry,
            alarm: AlarmScheduler::new(),
            prober,
            tones,
            link,
            link_up: true,
        }
    }

    /// Operator acknowledgement from the console.
    pub fn acknowledge(&mut self) {
        self.alarm.request_stop();
    }

    pub fn service_alarm(&mut self, now_ms: u64) {
        let Self { alarm, tones, .. } = self;
        alarm.tick(now_ms, tones);
    }

    /// Parse and apply one command datagram. Returns false when the
    /// datagram was not a valid command; valid commands that the
    /// registry rejects are logged but still count as handled.
    pub fn handle_command_datagram(&mut self, buf: &[u8]) -> bool {
        let Some(cmd) = Command::parse(buf) else {
            return false;
        };
        self.apply_command(cmd);
        true
    }

    pub fn apply_command(&mut self, cmd: Command) {
        match command::apply(&mut self.registry, &cmd) {
            Ok(()) => info!(?cmd, registry = self.registry.len(), "command applied"),
            Err(e) => warn!(?cmd, "command rejected: {e}"),
        }
    }

    /// Run every check whose interval has elapsed, in table order. With
    /// no usable uplink the whole pass is skipped so the counters do
    /// not record link loss as target failures.
    pub async fn run_due_checks(&mut self, now_ms: u64) {
        let connected = self.link.is_connected();
        if connected != self.link_up {
            self.link_up = connected;
            if connected {
                info!("uplink restored, resuming checks");
            } else {
                warn!("uplink down, suspending checks");
            }
        }
        if !connected {
            return;
        }

        let Self {
            registry,
            alarm,
            prober,
            tones,
            ..
        } = self;

        for target in registry.iter_mut() {
            // A target that has never been checked is due at once.
            if target
                .last_check_ms
                .is_some_and(|last| now_ms.saturating_sub(last) < target.interval_ms)
            {
                continue;
            }
            target.last_check_ms = Some(now_ms);

            let down_since_ms = target.down_start_ms;
            let outcome = health::run_rounds(&*prober, &target.host).await;
            match health::apply_outcome(target, outcome, now_ms) {
                Some(HealthTransition::Down) => {
                    error!("[CHANGE] {} ({}) -> DOWN", target.name, target.host);
                    alarm.trigger(now_ms);
                }
                Some(HealthTransition::Up) => {
                    warn!(
                        "[CHANGE] {} ({}) -> UP after {}s down",
                        target.name,
                        target.host,
                        (now_ms - down_since_ms) / 1000
                    );
                    alarm.notify_recovery(tones);
                }
                None => {}
            }
        }
    }

    pub fn snapshot(&self, now_ms: u64) -> Snapshot {
        telemetry::snapshot(now_ms, self.registry.targets())
    }
}

/// Socket-facing wrapper that drives a `Monitor` on the shared tick:
/// alarm first, then at most one command datagram, then due checks,
/// then the once-a-second render and telemetry send.
pub struct ProbeRuntime<P, S, L, D> {
    pub monitor: Monitor<P, S, L>,
    pub display: D,
    pub cmd_socket: UdpSocket,
    pub telemetry_socket: UdpSocket,
    pub telemetry_dest: SocketAddr,
    pub broadcast_dest: SocketAddr,
    pub telemetry_interval_ms: u64,
    pub snapshot_tx: watch::Sender<Snapshot>,
    pub ack: Arc<AtomicBool>,
}

impl<P, S, L, D> ProbeRuntime<P, S, L, D>
where
    P: Prober,
    S: ToneSink,
    L: LinkStatus,
    D: DisplaySink,
{
    pub async fn run(mut self) {
        info!(
            targets = self.monitor.registry.len(),
            dest = %self.telemetry_dest,
            "probe loop running"
        );

        let started = tokio::time::Instant::now();
        let mut next_refresh = 0u64;
        let mut buf = [0u8; net::MAX_DATAGRAM];

        loop {
            let now_ms = started.elapsed().as_millis() as u64;

            if self.ack.swap(false, Ordering::Relaxed) {
                self.monitor.acknowledge();
            }
            self.monitor.service_alarm(now_ms);

            if let Some((len, from)) = net::try_recv(&self.cmd_socket, &mut buf) {
                if !self.monitor.handle_command_datagram(&buf[..len]) {
                    warn!(%from, "ignoring invalid command datagram");
                }
            }

            self.monitor.run_due_checks(now_ms).await;

            if now_ms >= next_refresh {
                next_refresh = now_ms + self.telemetry_interval_ms;
                self.display.render(self.monitor.registry.targets(), now_ms);

                let snapshot = self.monitor.snapshot(now_ms);
                match telemetry::encode(&snapshot) {
                    Ok(payload) => {
                        net::send_payload(
                            &self.telemetry_socket,
                            &payload,
                            self.telemetry_dest,
                            self.broadcast_dest,
                        )
                        .await;
                    }
                    Err(e) => warn!("telemetry encode failed: {e}"),
                }
                self.snapshot_tx.send_replace(snapshot);
            }

            tokio::time::sleep(Duration::from_millis(TICK_MS)).await;
        }
    }
}
