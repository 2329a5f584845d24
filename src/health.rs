use std::net::IpAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use surge_ping::{Client as PingClient, Config as PingConfig, PingIdentifier, PingSequence};
use tracing::{debug, warn};

use crate::models::{CheckOutcome, HealthTransition, Target, RTT_UNKNOWN};

pub const PROBE_ROUNDS: u32 = 4;
pub const ROUND_GAP_MS: u64 = 30;
pub const PROBE_TIMEOUT_MS: u64 = 1_000;

/// Consecutive failed checks before an up target is declared down.
pub const FAIL_THRESHOLD: u32 = 3;
/// Consecutive ok checks before a down target is declared recovered.
pub const RECOVER_THRESHOLD: u32 = 2;

/// Single probe round against a host. Returns the round-trip time in
/// milliseconds, or `None` when the round failed for any reason.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe_once(&self, host: &str) -> Option<f64>;
}

/// Reports whether the uplink is usable at all. When it is not, checks
/// are skipped entirely so counters never record a dead link as target
/// failures.
pub trait LinkStatus: Send {
    fn is_connected(&self) -> bool;
}

/// Run one full check: up to four probe rounds with a short gap between
/// them. The check is ok if at least one round succeeded; the average is
/// taken over successful rounds only.
pub async fn run_rounds<P: Prober + ?Sized>(prober: &P, host: &str) -> CheckOutcome {
    let mut sum = 0.0f64;
    let mut successes = 0u32;

    for round in 0..PROBE_ROUNDS {
        if let Some(rtt_ms) = prober.probe_once(host).await {
            sum += rtt_ms;
            successes += 1;
        }
        if round + 1 < PROBE_ROUNDS {
            tokio::time::sleep(Duration::from_millis(ROUND_GAP_MS)).await;
        }
    }

    if successes > 0 {
        CheckOutcome::success((sum / successes as f64) as f32)
    } else {
        CheckOutcome::failure()
    }
}

/// Fold a check outcome into the target's counters and report the health
/// transition, if any. The consecutive counters are mutually exclusive:
/// recording one kind of outcome zeroes the other counter.
pub fn apply_outcome(
    target: &mut Target,
    outcome: CheckOutcome,
    now_ms: u64,
) -> Option<HealthTransition> {
    let mut transition = None;

    if outcome.ok {
        target.consec_ok += 1;
        target.consec_fail = 0;
        if target.is_down && target.consec_ok >= RECOVER_THRESHOLD {
            target.is_down = false;
            target.last_change_ms = now_ms;
            target.down_start_ms = 0;
            transition = Some(HealthTransition::Up);
        }
    } else {
        target.consec_fail += 1;
        target.consec_ok = 0;
        if !target.is_down && target.consec_fail >= FAIL_THRESHOLD {
            target.is_down = true;
            target.last_change_ms = now_ms;
            target.down_start_ms = now_ms;
            transition = Some(HealthTransition::Down);
        }
    }

    // The latency is only meaningful while the target is considered up.
    target.last_avg_rtt = if outcome.ok && !target.is_down {
        outcome.avg_rtt
    } else {
        RTT_UNKNOWN
    };

    transition
}

/// ICMP echo prober backed by a raw-socket ping client. Hostnames are
/// resolved per round; IP literals bypass the resolver.
pub struct IcmpProber {
    client: PingClient,
    resolver: TokioResolver,
}

impl IcmpProber {
    pub fn new() -> Result<Self> {
        let client =
            PingClient::new(&PingConfig::default()).context("failed to create ping client")?;

        let resolver = match TokioResolver::builder_tokio() {
            Ok(builder) => builder.build(),
            Err(e) => {
                warn!("system resolver config unavailable ({e}), using built-in defaults");
                TokioResolver::builder_with_config(
                    ResolverConfig::default(),
                    TokioConnectionProvider::default(),
                )
                .build()
            }
        };

        Ok(Self { client, resolver })
    }

    async fn resolve(&self, host: &str) -> Option<IpAddr> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Some(ip);
        }
        match self.resolver.lookup_ip(host).await {
            Ok(lookup) => lookup.iter().next(),
            Err(e) => {
                debug!(host, "dns lookup failed: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl Prober for IcmpProber {
    async fn probe_once(&self, host: &str) -> Option<f64> {
        let ip = self.resolve(host).await?;
        let payload = [0u8; 56];
        let mut pinger = self.client.pinger(ip, PingIdentifier(rand::random())).await;
        pinger.timeout(Duration::from_millis(PROBE_TIMEOUT_MS));

        match pinger.ping(PingSequence(0), &payload).await {
            Ok((_, latency)) => Some(latency.as_secs_f64() * 1000.0),
            Err(_) => None,
        }
    }
}
