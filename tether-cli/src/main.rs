//! tether: a line-oriented IRC client on top of tether-sdk.
//!
//! Lines typed on stdin go to the engine as user input (`/join #x`,
//! `/me waves`, or plain text for the current channel). A few commands are
//! handled locally:
//!
//!   /focus <handle>    switch the current channel
//!   /close <handle>    close a channel (parts it when it is one)
//!   /reconnect         connect again to the configured server, with a
//!                      fresh attempt budget, even after /disconnect
//!   /disconnect        quit the server but keep running
//!   /exit              quit and exit
//!
//! Channel lines are printed to stdout; logs go to stderr.

mod config;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use tether_sdk::{EngineConfig, Event};
use tether_sdk::driver::{self, ClientHandle};
use tether_sdk::registry::{ChannelLine, LineKind};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tether", version, about = "Line-oriented IRC client")]
pub struct Cli {
    /// Config file (default: ~/.config/tether/tether.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Server host
    #[arg(long)]
    pub host: Option<String>,

    /// Server port
    #[arg(long)]
    pub port: Option<u16>,

    /// Use TLS
    #[arg(long)]
    pub tls: bool,

    /// Connect to Twitch chat (forces TLS on irc.chat.twitch.tv:443)
    #[arg(long)]
    pub twitch: bool,

    /// Nickname
    #[arg(long)]
    pub nick: Option<String>,

    /// Username sent with USER (defaults to the nickname)
    #[arg(long)]
    pub user: Option<String>,

    /// Server password
    #[arg(long, env = "TETHER_SERVER_PASSWORD")]
    pub password: Option<String>,

    /// Channels to join, comma or space separated
    #[arg(long)]
    pub channels: Option<String>,

    /// Echo raw protocol traffic into the (Debug) channel
    #[arg(long)]
    pub debug: bool,

    /// Log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log: String,

    /// Milliseconds between engine ticks
    #[arg(long, default_value_t = 50)]
    pub tick_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log)),
        )
        .with_writer(std::io::stderr)
        .init();

    let file = config::Config::load(cli.config.as_deref())?;
    let engine_config = config::resolve(&cli, &file);
    tracing::info!(
        host = %engine_config.host,
        port = engine_config.port,
        nick = %engine_config.nick,
        "Starting tether"
    );

    let (handle, mut events) = driver::spawn(
        tether_sdk::Client::new(),
        Duration::from_millis(cli.tick_ms.max(1)),
    );
    handle.connect(engine_config.clone()).await?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = stdin.next_line() => match line? {
                Some(line) => {
                    if !run_local(&handle, &line, &engine_config).await? {
                        break;
                    }
                }
                None => break,
            },
            event = events.recv() => match event {
                Some(event) => render(&event),
                None => {
                    tracing::warn!("Client stopped");
                    return Ok(());
                }
            },
        }
    }

    let _ = handle.shutdown().await;
    while let Some(event) = events.recv().await {
        render(&event);
    }
    Ok(())
}

/// Handle one stdin line. Returns false when the user asked to exit.
async fn run_local(handle: &ClientHandle, line: &str, config: &EngineConfig) -> Result<bool> {
    let trimmed = line.trim();
    let (verb, arg) = match trimmed.split_once(' ') {
        Some((verb, arg)) => (verb, arg.trim()),
        None => (trimmed, ""),
    };

    match verb.to_ascii_lowercase().as_str() {
        "/exit" => return Ok(false),
        "/focus" if !arg.is_empty() => handle.focus(arg).await?,
        "/close" if !arg.is_empty() => handle.close_channel(arg).await?,
        "/reconnect" => handle.connect(config.clone()).await?,
        "/disconnect" => handle.disconnect().await?,
        "/focus" | "/close" => eprintln!("usage: {verb} <handle>"),
        _ => handle.input(line).await?,
    }
    Ok(true)
}

fn render(event: &Event) {
    match event {
        Event::Line { handle, line } => println!("{}", format_line(handle, line)),
        Event::Connecting { endpoint } => tracing::info!(%endpoint, "Connecting"),
        Event::ConnectionFailed { reason } => tracing::warn!(%reason, "Connection failed"),
        Event::SslCertificateError { reason } => {
            tracing::warn!(%reason, "Server certificate not trusted")
        }
        Event::CommandReceived(_) | Event::CommandSent(_) => tracing::trace!(?event),
        other => tracing::info!(event = ?other),
    }
}

fn format_line(handle: &str, line: &ChannelLine) -> String {
    let at = line.at.with_timezone(&Local).format("%H:%M:%S");
    let body = match line.kind {
        LineKind::Message => format!("<{}> {}", line.sender, line.text),
        LineKind::Action => format!("* {}", line.text),
        LineKind::Membership | LineKind::Notice if line.sender == "*" => format!("-!- {}", line.text),
        LineKind::Membership | LineKind::Notice => format!("-{}- {}", line.sender, line.text),
    };
    format!("{at} [{handle}] {body}")
}
