//! Run a [`Client`] inside a tokio application.
//!
//! The client is single-threaded and ticks synchronously, so it lives on the
//! blocking pool. Requests reach it over an mpsc channel and are applied
//! between ticks; events come back on another channel in the order the
//! client produced them.

use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::client::Client;
use crate::config::EngineConfig;
use crate::event::Event;

/// Default tick period.
pub const DEFAULT_TICK: Duration = Duration::from_millis(50);

/// Requests the host can make of a running client.
#[derive(Debug)]
pub enum Request {
    /// A line typed by the user.
    Input(String),
    Connect(EngineConfig),
    Reconnect,
    Disconnect,
    CloseChannel(String),
    Focus(String),
    /// Disconnect and stop ticking.
    Shutdown,
}

/// A handle to a client running on the blocking pool.
#[derive(Clone)]
pub struct ClientHandle {
    req_tx: mpsc::Sender<Request>,
}

impl ClientHandle {
    pub async fn input(&self, line: &str) -> Result<()> {
        self.req_tx.send(Request::Input(line.to_string())).await?;
        Ok(())
    }

    pub async fn connect(&self, config: EngineConfig) -> Result<()> {
        self.req_tx.send(Request::Connect(config)).await?;
        Ok(())
    }

    pub async fn reconnect(&self) -> Result<()> {
        self.req_tx.send(Request::Reconnect).await?;
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.req_tx.send(Request::Disconnect).await?;
        Ok(())
    }

    pub async fn close_channel(&self, handle: &str) -> Result<()> {
        self.req_tx
            .send(Request::CloseChannel(handle.to_string()))
            .await?;
        Ok(())
    }

    pub async fn focus(&self, handle: &str) -> Result<()> {
        self.req_tx.send(Request::Focus(handle.to_string())).await?;
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.req_tx.send(Request::Shutdown).await?;
        Ok(())
    }
}

/// Start ticking `client` every `period`.
///
/// Returns a handle for requests and a receiver for events. The client stops
/// on [`Request::Shutdown`], when every handle is dropped, or when the event
/// receiver is dropped.
pub fn spawn(client: Client, period: Duration) -> (ClientHandle, mpsc::Receiver<Event>) {
    let (event_tx, event_rx) = mpsc::channel(4096);
    let (req_tx, req_rx) = mpsc::channel(256);

    tokio::task::spawn_blocking(move || run(client, period, req_rx, event_tx));

    (ClientHandle { req_tx }, event_rx)
}

fn run(
    mut client: Client,
    period: Duration,
    mut requests: mpsc::Receiver<Request>,
    events: mpsc::Sender<Event>,
) {
    loop {
        let mut stop = false;
        loop {
            match requests.try_recv() {
                Ok(Request::Shutdown) | Err(TryRecvError::Disconnected) => {
                    stop = true;
                    break;
                }
                Ok(request) => apply(&mut client, request),
                Err(TryRecvError::Empty) => break,
            }
        }

        if stop {
            client.disconnect();
        } else {
            client.tick();
        }

        for event in client.drain_events() {
            if events.blocking_send(event).is_err() {
                tracing::debug!("Event receiver dropped, stopping client");
                stop = true;
                break;
            }
        }
        if stop {
            client.disconnect();
            tracing::debug!("Client stopped");
            return;
        }

        std::thread::sleep(period);
    }
}

fn apply(client: &mut Client, request: Request) {
    match request {
        Request::Input(line) => client.submit_input(&line),
        Request::Connect(config) => {
            if let Err(e) = client.connect(config) {
                tracing::warn!(error = %e, "Connect request rejected");
            }
        }
        Request::Reconnect => client.reconnect(),
        Request::Disconnect => client.disconnect(),
        Request::CloseChannel(handle) => {
            client.close_channel(&handle);
        }
        Request::Focus(handle) => {
            client.focus(&handle);
        }
        Request::Shutdown => {}
    }
}
