use std::io::Write;
use std::net::{Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::style::{Print, Stylize};
use crossterm::terminal::{Clear, ClearType};
use tokio::io::AsyncBufReadExt;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use fieldnms::command::Command;
use fieldnms::config::{COMMAND_PORT, TELEMETRY_PORT};
use fieldnms::models::DEFAULT_INTERVAL_MS;
use fieldnms::net;
use fieldnms::utils;
use fieldnms::viewer::DisplayModel;

#[derive(Parser)]
#[command(name = "fieldnms-viewer", about = "Terminal viewer for fieldnms telemetry")]
struct Args {
    /// UDP port to listen on for telemetry snapshots.
    #[arg(short, long, default_value_t = TELEMETRY_PORT)]
    listen_port: u16,

    /// Probe address for add/del/set commands, as host or host:port.
    /// Without it the viewer is read-only.
    #[arg(short, long)]
    probe: Option<String>,

    /// Redraw and poll cadence in milliseconds.
    #[arg(long, default_value_t = 200)]
    frame_ms: u64,
}

enum ConsoleInput {
    Cmd(Command),
    Quit,
}

fn parse_line(line: &str) -> Option<ConsoleInput> {
    let mut parts = line.split_whitespace();
    match parts.next()? {
        "add" => {
            let name = parts.next()?.to_string();
            let host = parts.next()?.to_string();
            let interval_ms = match parts.next() {
                Some(tok) => tok.parse().ok()?,
                None => DEFAULT_INTERVAL_MS,
            };
            Some(ConsoleInput::Cmd(Command::Add {
                name,
                host,
                interval_ms,
            }))
        }
        "del" => Some(ConsoleInput::Cmd(Command::Del {
            name: parts.next()?.to_string(),
        })),
        "set" => {
            let name = parts.next()?.to_string();
            let interval_ms = parts.next()?.parse().ok().filter(|ms| *ms > 0)?;
            Some(ConsoleInput::Cmd(Command::Set { name, interval_ms }))
        }
        "quit" | "exit" | "q" => Some(ConsoleInput::Quit),
        _ => None,
    }
}

/// Probe spec without a port gets the default command port. Bare IPv6
/// literals are bracketed first so their groups are not read as a port.
fn with_command_port(spec: &str) -> String {
    if spec.parse::<Ipv6Addr>().is_ok() {
        return format!("[{spec}]:{COMMAND_PORT}");
    }
    if let Some(host) = spec.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
        return format!("[{host}]:{COMMAND_PORT}");
    }
    if spec.contains(':') {
        spec.to_string()
    } else {
        format!("{spec}:{COMMAND_PORT}")
    }
}

fn draw(
    model: &DisplayModel,
    last_rx: Option<Instant>,
    probe: Option<SocketAddr>,
) -> std::io::Result<()> {
    let mut out = std::io::stdout();
    queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;

    let clock = Local::now().format("%H:%M:%S");
    queue!(out, Print(format!("fieldnms viewer  {clock}\r\n")))?;

    match last_rx {
        None => queue!(out, Print("waiting for telemetry...\r\n".yellow()))?,
        Some(at) if at.elapsed() > Duration::from_secs(3) => queue!(
            out,
            Print(format!("no telemetry for {}s\r\n", at.elapsed().as_secs()).yellow())
        )?,
        Some(_) if model.any_down() => {
            let down = model.items().iter().filter(|i| i.down).count();
            queue!(out, Print(format!("!! {down} DOWN !!\r\n").red().bold()))?;
        }
        Some(_) => queue!(out, Print("all targets up\r\n".green()))?,
    }

    queue!(
        out,
        Print(format!(
            "\r\n{:<15} {:<28} {:<6} {}\r\n",
            "NAME", "HOST", "STATE", "RTT"
        ))
    )?;
    for item in model.items() {
        let state = if item.down {
            format!("{:<6}", "DOWN").red().bold()
        } else {
            format!("{:<6}", "UP").green()
        };
        let rtt = if item.has_rtt() {
            format!("{:.1} ms", item.rtt).stylize()
        } else {
            "--".to_string().yellow()
        };
        queue!(
            out,
            Print(format!("{:<15} {:<28} ", item.name, item.host)),
            Print(state),
            Print(" "),
            Print(rtt),
            Print("\r\n")
        )?;
    }

    let peer = match probe {
        Some(addr) => format!("probe: {addr}"),
        None => "read-only (no --probe)".to_string(),
    };
    queue!(
        out,
        Print(format!("\r\n{peer}\r\n").dim()),
        Print("add <name> <host> [interval_ms] | del <name> | set <name> <interval_ms> | quit\r\n".dim())
    )?;
    out.flush()
}

async fn run(args: Args) -> Result<()> {
    let socket = net::bind_udp(args.listen_port).await?;
    let probe_addr = match &args.probe {
        Some(spec) => Some(net::resolve_dest(&with_command_port(spec)).await?),
        None => None,
    };
    let cmd_socket = net::bind_udp(0).await?;

    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut model = DisplayModel::new();
    let mut last_rx: Option<Instant> = None;
    let mut buf = [0u8; net::MAX_DATAGRAM];

    loop {
        if let Some((len, from)) = net::poll_datagram(&socket, args.frame_ms, &mut buf).await {
            if model.apply_datagram(&buf[..len]) {
                last_rx = Some(Instant::now());
            } else {
                debug!(%from, "discarding malformed telemetry datagram");
            }
        }

        while let Ok(line) = line_rx.try_recv() {
            match parse_line(&line) {
                Some(ConsoleInput::Cmd(cmd)) => match probe_addr {
                    Some(addr) => {
                        if let Err(e) = cmd_socket.send_to(&cmd.encode(), addr).await {
                            warn!("command send failed: {e}");
                        }
                    }
                    None => warn!("viewer is read-only, start with --probe to send commands"),
                },
                Some(ConsoleInput::Quit) => return Ok(()),
                None if line.trim().is_empty() => {}
                None => warn!("unrecognized command: {line:?}"),
            }
        }

        draw(&model, last_rx, probe_addr)?;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    utils::enable_ansi();

    // Logs go to stderr so they do not fight the redraw on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .init();

    let args = Args::parse();

    tokio::select! {
        res = run(args) => res,
        _ = signal::ctrl_c() => {
            info!("viewer closing");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_cmd(input: Option<ConsoleInput>) -> Command {
        match input {
            Some(ConsoleInput::Cmd(cmd)) => cmd,
            _ => panic!("expected a command"),
        }
    }

    #[test]
    fn add_line_defaults_the_interval() {
        let cmd = as_cmd(parse_line("add db 10.0.0.7"));
        assert_eq!(
            cmd,
            Command::Add {
                name: "db".into(),
                host: "10.0.0.7".into(),
                interval_ms: DEFAULT_INTERVAL_MS,
            }
        );
        let cmd = as_cmd(parse_line("add db 10.0.0.7 2500"));
        assert_eq!(
            cmd,
            Command::Add {
                name: "db".into(),
                host: "10.0.0.7".into(),
                interval_ms: 2500,
            }
        );
    }

    #[test]
    fn set_line_rejects_a_zero_interval() {
        assert!(parse_line("set db 0").is_none());
        assert!(parse_line("set db abc").is_none());
        let cmd = as_cmd(parse_line("set db 4000"));
        assert_eq!(
            cmd,
            Command::Set {
                name: "db".into(),
                interval_ms: 4000,
            }
        );
    }

    #[test]
    fn junk_lines_parse_to_nothing() {
        assert!(parse_line("").is_none());
        assert!(parse_line("   ").is_none());
        assert!(parse_line("reboot everything").is_none());
        assert!(parse_line("add onlyname").is_none());
    }

    #[test]
    fn quit_aliases() {
        assert!(matches!(parse_line("quit"), Some(ConsoleInput::Quit)));
        assert!(matches!(parse_line("q"), Some(ConsoleInput::Quit)));
        assert!(matches!(parse_line("exit"), Some(ConsoleInput::Quit)));
    }

    #[test]
    fn probe_spec_gets_the_default_port() {
        assert_eq!(with_command_port("192.168.1.50"), "192.168.1.50:5006");
        assert_eq!(with_command_port("192.168.1.50:7000"), "192.168.1.50:7000");
        assert_eq!(with_command_port("probe.field.lan"), "probe.field.lan:5006");
    }

    #[test]
    fn ipv6_probe_specs_are_bracketed() {
        assert_eq!(with_command_port("fe80::1"), "[fe80::1]:5006");
        assert_eq!(with_command_port("[2001:db8::7]"), "[2001:db8::7]:5006");
        assert_eq!(with_command_port("[2001:db8::7]:7000"), "[2001:db8::7]:7000");
    }
}
