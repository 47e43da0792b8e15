//! In-memory connector, transport and clock for driving the engine without
//! sockets or wall time.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tether_sdk::config::{EngineConfig, Endpoint};
use tether_sdk::engine::Clock;
use tether_sdk::error::ConnectError;
use tether_sdk::transport::{Connection, Connector, TlsStatus, Transport};
use tether_sdk::{Client, Event};

pub const START: i64 = 1_000_000;

#[derive(Default)]
struct State {
    opens: usize,
    closes: usize,
    refuse: bool,
    tls: Option<TlsStatus>,
    inbound: VecDeque<Vec<u8>>,
    read_error: Option<io::ErrorKind>,
    fail_next_write: bool,
    sent: Vec<String>,
}

/// Shared script and transcript for every connection the mock opens.
#[derive(Clone, Default)]
pub struct Mock(Arc<Mutex<State>>);

impl Mock {
    pub fn connector(&self) -> Box<dyn Connector> {
        Box::new(MockConnector(self.clone()))
    }

    /// Every open fails as if the host refused the connection.
    pub fn refuse(&self, refuse: bool) {
        self.0.lock().refuse = refuse;
    }

    pub fn tls(&self, status: TlsStatus) {
        self.0.lock().tls = Some(status);
    }

    /// Queue one read's worth of bytes.
    pub fn push(&self, data: &str) {
        self.0.lock().inbound.push_back(data.as_bytes().to_vec());
    }

    pub fn push_bytes(&self, data: &[u8]) {
        self.0.lock().inbound.push_back(data.to_vec());
    }

    pub fn fail_next_read(&self, kind: io::ErrorKind) {
        self.0.lock().read_error = Some(kind);
    }

    pub fn fail_next_write(&self) {
        self.0.lock().fail_next_write = true;
    }

    /// Lines written since the last call, without terminators.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut self.0.lock().sent)
    }

    pub fn opens(&self) -> usize {
        self.0.lock().opens
    }

    pub fn closes(&self) -> usize {
        self.0.lock().closes
    }
}

struct MockConnector(Mock);

impl Connector for MockConnector {
    fn open(&mut self, _endpoint: &Endpoint, _timeout: Duration) -> Result<Connection, ConnectError> {
        let mut state = self.0.0.lock();
        state.opens += 1;
        if state.refuse {
            return Err(ConnectError::Io(io::ErrorKind::ConnectionRefused.into()));
        }
        Ok(Connection {
            transport: Box::new(MockTransport(self.0.clone())),
            tls: state.tls.clone(),
        })
    }
}

struct MockTransport(Mock);

impl Transport for MockTransport {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        let mut state = self.0.0.lock();
        if let Some(kind) = state.read_error.take() {
            return Err(kind.into());
        }
        let Some(mut chunk) = state.inbound.pop_front() else {
            return Ok(None);
        };
        if chunk.len() > buf.len() {
            let rest = chunk.split_off(buf.len());
            state.inbound.push_front(rest);
        }
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(Some(chunk.len()))
    }

    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.0.0.lock();
        if state.fail_next_write {
            state.fail_next_write = false;
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        let text = String::from_utf8_lossy(data).into_owned();
        state
            .sent
            .extend(text.split_terminator("\r\n").map(str::to_string));
        Ok(())
    }

    fn close(&mut self) {
        self.0.0.lock().closes += 1;
    }
}

/// A clock that only moves when told to.
#[derive(Clone)]
pub struct ManualClock(Arc<AtomicI64>);

impl ManualClock {
    pub fn new() -> Self {
        Self(Arc::new(AtomicI64::new(START)))
    }

    pub fn advance(&self, millis: i64) {
        self.0.fetch_add(millis, Ordering::SeqCst);
    }

    /// Jump to `START + offset`.
    pub fn at(&self, offset: i64) {
        self.0.store(START + offset, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn config() -> EngineConfig {
    EngineConfig {
        host: "irc.test".to_string(),
        port: 6667,
        nick: "jeb".to_string(),
        channels: "#a nobody #b".to_string(),
        ..Default::default()
    }
}

/// Route engine logs to the test harness; set RUST_LOG to see them.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn client(mock: &Mock, clock: &ManualClock) -> Client {
    init_logging();
    Client::with_parts(mock.connector(), Box::new(clock.clone()))
}

pub fn drain(client: &mut Client) -> Vec<Event> {
    client.drain_events().collect()
}

/// Events with channel lines and sent commands filtered out.
pub fn lifecycle(events: &[Event]) -> Vec<Event> {
    events
        .iter()
        .filter(|e| !matches!(e, Event::Line { .. } | Event::CommandSent(_) | Event::CommandReceived(_)))
        .cloned()
        .collect()
}

/// Texts posted to `handle`, in order.
pub fn lines_for(events: &[Event], wanted: &str) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Line { handle, line } if handle == wanted => Some(line.text.clone()),
            _ => None,
        })
        .collect()
}
