//! Structured trace of every resolution step.
//!
//! Each hop of a resolution becomes an immutable [`TraceEvent`]. Workers hand
//! their events to a [`Tracer`], which forwards them to the single writer
//! thread owned by the [`TraceLogger`]. Only that thread touches the sink, so
//! lines from concurrent workers never interleave.

use crate::Error;
use chrono::{DateTime, Local, SecondsFormat};
use serde::{Serialize, Serializer};
use std::fmt;
use std::fs::File;
use std::io;
use std::io::{BufWriter, Write};
use std::net::IpAddr;
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use strum_macros::Display;

/// The role of the server queried in a hop.
#[derive(Copy, Clone, Debug, Display, PartialEq, Serialize)]
pub enum Step {
    Root,

    #[strum(serialize = "TLD")]
    #[serde(rename = "TLD")]
    Tld,

    Authoritative,

    /// The summary event written once a query is answered.
    #[strum(serialize = "FINAL")]
    #[serde(rename = "FINAL")]
    Final,

    #[strum(serialize = "N-A")]
    #[serde(rename = "N-A")]
    NotApplicable,
}

/// What a hop (or a whole resolution) ended with.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Outcome {
    /// An answer holding this A record.
    Answer(std::net::Ipv4Addr),
    Referral,
    NxDomain,
    /// Any other response code, including NOERROR responses that were
    /// neither an answer nor a referral.
    Rcode(u8),
    Timeout,
    /// No server was left to ask, or the hop limit was reached.
    Exhausted,
    NotApplicable,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Answer(ip) => write!(f, "RESPONSE: A={}", ip),
            Outcome::Referral => write!(f, "REFERRAL"),
            Outcome::NxDomain => write!(f, "NXDOMAIN"),
            Outcome::Rcode(rcode) => write!(f, "RCODE_{}", rcode),
            Outcome::Timeout => write!(f, "TIMEOUT"),
            Outcome::Exhausted => write!(f, "EXHAUSTED"),
            Outcome::NotApplicable => write!(f, "N-A"),
        }
    }
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub enum Mode {
    #[serde(rename = "iterative")]
    Iterative,

    #[serde(rename = "N-A")]
    NotApplicable,
}

/// There is no cache, so every lookup is a miss.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub enum CacheStatus {
    #[serde(rename = "MISS")]
    Miss,
}

/// One line of the trace log.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TraceEvent {
    #[serde(serialize_with = "iso8601")]
    pub timestamp: DateTime<Local>,

    pub domain: String,
    pub resolution_mode: Mode,

    #[serde(serialize_with = "ip_or_na")]
    pub server_ip: Option<IpAddr>,

    pub step: Step,
    pub response: Outcome,

    /// Round trip time of this hop, in milliseconds.
    #[serde(serialize_with = "millis")]
    pub rtt: Duration,

    /// Time since the resolution started, in milliseconds.
    #[serde(serialize_with = "millis")]
    pub total_time: Duration,

    pub cache_status: CacheStatus,
}

impl TraceEvent {
    /// An event for one exchange with one server.
    pub fn hop(
        domain: &str,
        server_ip: Option<IpAddr>,
        step: Step,
        response: Outcome,
        rtt: Duration,
        total_time: Duration,
    ) -> TraceEvent {
        TraceEvent {
            timestamp: Local::now(),
            domain: domain.to_string(),
            resolution_mode: Mode::Iterative,
            server_ip,
            step,
            response,
            rtt,
            total_time,
            cache_status: CacheStatus::Miss,
        }
    }

    /// The summary event of a query, carrying over the server and rtt of
    /// the last hop, if there was one.
    pub fn finish(
        domain: &str,
        last: Option<&TraceEvent>,
        response: Outcome,
        total_time: Duration,
    ) -> TraceEvent {
        TraceEvent {
            timestamp: Local::now(),
            domain: domain.to_string(),
            resolution_mode: match last {
                Some(_) => Mode::Iterative,
                None => Mode::NotApplicable,
            },
            server_ip: last.and_then(|e| e.server_ip),
            step: Step::Final,
            response,
            rtt: last.map(|e| e.rtt).unwrap_or_default(),
            total_time,
            cache_status: CacheStatus::Miss,
        }
    }
}

fn iso8601<S: Serializer>(t: &DateTime<Local>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Micros, false))
}

fn ip_or_na<S: Serializer>(ip: &Option<IpAddr>, s: S) -> Result<S::Ok, S::Error> {
    match ip {
        Some(ip) => s.collect_str(ip),
        None => s.serialize_str("N-A"),
    }
}

fn millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_nanos() as f64 / 1_000_000.0)
}

enum Command {
    Record(Vec<TraceEvent>),
    Shutdown,
}

/// Owns the trace sink and the thread writing to it.
pub struct TraceLogger {
    tx: mpsc::Sender<Command>,
    writer: Option<thread::JoinHandle<()>>,
}

impl TraceLogger {
    /// Starts a logger writing to `path`. Any existing contents are discarded.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<TraceLogger> {
        let file = File::create(path)?;
        Self::with_writer(BufWriter::new(file))
    }

    /// Starts a logger writing to an arbitrary sink.
    pub fn with_writer<W: Write + Send + 'static>(sink: W) -> io::Result<TraceLogger> {
        let (tx, rx) = mpsc::channel();

        let writer = thread::Builder::new()
            .name("trace-writer".to_string())
            .spawn(move || write_loop(rx, sink))?;

        Ok(TraceLogger {
            tx,
            writer: Some(writer),
        })
    }

    /// Returns a handle workers can record events with.
    pub fn tracer(&self) -> Tracer {
        Tracer {
            tx: self.tx.clone(),
        }
    }

    /// Writes out everything recorded so far, then stops the writer.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(writer) = self.writer.take() {
            // The writer only goes away early if it panicked, which join reports.
            let _ = self.tx.send(Command::Shutdown);
            if writer.join().is_err() {
                log::error!("trace writer panicked");
            }
        }
    }
}

impl Drop for TraceLogger {
    fn drop(&mut self) {
        self.stop();
    }
}

fn write_loop<W: Write>(rx: mpsc::Receiver<Command>, mut sink: W) {
    for cmd in rx {
        match cmd {
            Command::Record(events) => {
                if let Err(e) = write_batch(&mut sink, &events) {
                    log::error!("failed to write {} trace events: {}", events.len(), e);
                }
            }
            Command::Shutdown => break,
        }
    }

    if let Err(e) = sink.flush() {
        log::error!("failed to flush trace log: {}", e);
    }
}

fn write_batch<W: Write>(sink: &mut W, events: &[TraceEvent]) -> io::Result<()> {
    for event in events {
        serde_json::to_writer(&mut *sink, event)?;
        sink.write_all(b"\n")?;
    }
    sink.flush()
}

/// A cheap, cloneable handle to the [`TraceLogger`].
#[derive(Clone)]
pub struct Tracer {
    tx: mpsc::Sender<Command>,
}

impl Tracer {
    pub fn record(&self, event: TraceEvent) -> crate::Result<()> {
        self.record_all(vec![event])
    }

    /// Records a batch of events. The batch is written as consecutive lines.
    pub fn record_all(&self, events: Vec<TraceEvent>) -> crate::Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        self.tx
            .send(Command::Record(events))
            .map_err(|_| Error::TraceClosed)
    }
}
