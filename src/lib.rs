//! Minimal network-health monitor for small field installations: an
//! ICMP probe daemon that broadcasts JSON snapshots over UDP, takes
//! remote add/del/set commands, and sounds a local alarm on outages.

pub mod alarm;
pub mod api;
pub mod command;
pub mod config;
pub mod engine;
pub mod health;
pub mod models;
pub mod net;
pub mod registry;
pub mod telemetry;
pub mod utils;
pub mod viewer;
