use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::command::Command;
use crate::models::Snapshot;

/// Console state. Snapshots arrive read-only through a watch channel;
/// writes go back to the probe loop as UDP command datagrams on
/// loopback, so the console is just another remote sender.
#[derive(Clone)]
pub struct ConsoleState {
    pub snapshot: watch::Receiver<Snapshot>,
    pub ack: Arc<AtomicBool>,
    pub command_addr: SocketAddr,
}

async fn console_page() -> Html<&'static str> {
    Html(CONSOLE_PAGE)
}

async fn get_status(State(state): State<ConsoleState>) -> Json<Snapshot> {
    Json(state.snapshot.borrow().clone())
}

async fn post_command(State(state): State<ConsoleState>, body: Bytes) -> StatusCode {
    let Some(cmd) = Command::parse(&body) else {
        return StatusCode::BAD_REQUEST;
    };
    let socket = match tokio::net::UdpSocket::bind(("0.0.0.0", 0)).await {
        Ok(s) => s,
        Err(e) => {
            warn!("console relay socket failed: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };
    match socket.send_to(&cmd.encode(), state.command_addr).await {
        Ok(_) => StatusCode::ACCEPTED,
        Err(e) => {
            warn!("console relay send failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn post_ack(State(state): State<ConsoleState>) -> StatusCode {
    state.ack.store(true, Ordering::Relaxed);
    StatusCode::ACCEPTED
}

pub fn create_router(state: ConsoleState) -> Router {
    Router::new()
        .route("/", get(console_page))
        .route("/api/status", get(get_status))
        .route("/api/cmd", post(post_command))
        .route("/api/ack", post(post_ack))
        .with_state(state)
}

pub async fn serve(port: u16, state: ConsoleState) -> Result<()> {
    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind console port {port}"))?;
    info!("console: http://localhost:{port}");
    axum::serve(listener, app).await.context("console server failed")
}

const CONSOLE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>fieldnms console</title>
<style>
body { font-family: monospace; background: #111; color: #ddd; margin: 2em; }
table { border-collapse: collapse; margin: 1em 0; }
td, th { border: 1px solid #444; padding: 4px 10px; text-align: left; }
.up { color: #4c4; }
.down { color: #f55; font-weight: bold; }
button { margin-left: 4px; }
#ack { background: #a33; color: #fff; padding: 6px 14px; }
input { width: 9em; }
</style>
</head>
<body>
<h2>fieldnms console</h2>
<button id="ack" onclick="ack()">SILENCE ALARM</button>
<table>
<thead><tr><th>name</th><th>host</th><th>state</th><th>rtt</th><th></th></tr></thead>
<tbody id="rows"></tbody>
</table>
<p>
add: <input id="tname" placeholder="name"> <input id="thost" placeholder="host">
<input id="titvl" placeholder="interval ms">
<button onclick="add()">add</button>
</p>
<p id="meta"></p>
<script>
async function send(cmd) {
  await fetch('/api/cmd', { method: 'POST', body: JSON.stringify(cmd) });
  setTimeout(refresh, 300);
}
function add() {
  const cmd = { cmd: 'add', name: tname.value, host: thost.value };
  if (titvl.value) cmd.itvl = parseInt(titvl.value, 10);
  send(cmd);
}
function del(n) { send({ cmd: 'del', name: n }); }
function setItvl(n) {
  const v = prompt('interval ms for ' + n);
  if (v) send({ cmd: 'set', name: n, itvl: parseInt(v, 10) });
}
async function ack() { await fetch('/api/ack', { method: 'POST' }); }
async function refresh() {
  const snap = await (await fetch('/api/status')).json();
  rows.innerHTML = snap.items.map(i =>
    '<tr><td>' + i.name + '</td><td>' + i.host + '</td>' +
    '<td class="' + (i.down ? 'down">DOWN' : 'up">UP') + '</td>' +
    '<td>' + (i.rtt < 0 ? '--' : i.rtt.toFixed(1) + ' ms') + '</td>' +
    '<td><button onclick="setItvl(\'' + i.name + '\')">set</button>' +
    '<button onclick="del(\'' + i.name + '\')">del</button></td></tr>').join('');
  meta.textContent = 'probe uptime ' + Math.floor(snap.ts / 1000) + 's, ' +
    snap.items.length + ' targets';
}
refresh();
setInterval(refresh, 2000);
</script>
</body>
</html>
"#;
