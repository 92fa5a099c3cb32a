//! The request dispatcher: receives client queries over UDP and resolves
//! each one on its own thread.

use crate::clients::udp::is_timeout;
use crate::clients::{Exchanger, UdpClient};
use crate::config::Config;
use crate::resolver::Resolver;
use crate::trace::{Outcome, TraceEvent, Tracer};
use crate::types::*;
use crate::Error;
use crate::Result;
use log::{debug, error, info, warn};
use std::any::Any;
use std::net::{SocketAddr, UdpSocket};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// How often the listener wakes up to check whether it should stop.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How often shutdown checks for workers still running.
const DRAIN_INTERVAL: Duration = Duration::from_millis(10);

/// Counts the queries currently being resolved.
struct InFlight {
    count: AtomicUsize,
    limit: usize,
}

/// A slot in [`InFlight`], given back when dropped.
struct Permit(Arc<InFlight>);

impl InFlight {
    fn try_acquire(self: &Arc<Self>) -> Option<Permit> {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                if n < self.limit {
                    Some(n + 1)
                } else {
                    None
                }
            })
            .ok()
            .map(|_| Permit(self.clone()))
    }

    /// Blocks until every permit has been given back.
    fn wait_idle(&self) {
        while self.count.load(Ordering::Acquire) > 0 {
            thread::sleep(DRAIN_INTERVAL);
        }
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.0.count.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Stops a running [`Server`].
#[derive(Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Asks the server to stop. Queries already being resolved still finish.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// A UDP DNS server that resolves every query iteratively.
///
/// # Example
///
/// ```rust,no_run
/// use iterdns::{Config, Resolver, Server, TraceLogger};
///
/// fn main() -> iterdns::Result<()> {
///     let config = Config::default();
///     let trace = TraceLogger::create(&config.trace_path)?;
///
///     let resolver = Resolver::new_with_config(&config);
///     let server = Server::bind(&config, resolver, trace.tracer())?;
///     server.serve()?;
///
///     trace.shutdown();
///     Ok(())
/// }
/// ```
pub struct Server<E = UdpClient> {
    socket: Arc<UdpSocket>,
    resolver: Arc<Resolver<E>>,
    tracer: Tracer,

    in_flight: Arc<InFlight>,
    running: Arc<AtomicBool>,
}

impl<E> Server<E>
where
    E: Exchanger + 'static,
{
    /// Binds the listening socket. Failing to bind is fatal.
    pub fn bind(config: &Config, resolver: Resolver<E>, tracer: Tracer) -> Result<Server<E>> {
        let socket = UdpSocket::bind(config.listen)?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;

        Ok(Server {
            socket: Arc::new(socket),
            resolver: Arc::new(resolver),
            tracer,
            in_flight: Arc::new(InFlight {
                count: AtomicUsize::new(0),
                limit: config.max_in_flight,
            }),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: self.running.clone(),
        }
    }

    /// Serves queries until [`ShutdownHandle::shutdown`] is called, then
    /// waits for the queries already dispatched to finish.
    ///
    /// Malformed datagrams are logged and dropped without a reply. Every
    /// query that decodes gets exactly one reply.
    pub fn serve(&self) -> Result<()> {
        info!("listening on {}", self.local_addr()?);

        let mut buf = [0; 4096];
        while self.running.load(Ordering::Acquire) {
            let (len, client) = match self.socket.recv_from(&mut buf) {
                Ok(r) => r,
                Err(e) if is_timeout(&e) => continue,
                Err(e) => {
                    warn!("failed to receive query: {}", e);
                    continue;
                }
            };

            match parse_query(&buf[..len]) {
                Ok(query) => self.dispatch(query, client),
                Err(e) => warn!("dropping query from {}: {}", client, e),
            }
        }

        let pending = self.in_flight.count.load(Ordering::Acquire);
        if pending > 0 {
            info!("waiting for {} queries to finish", pending);
        }
        self.in_flight.wait_idle();

        info!("stopped listening on {}", self.local_addr()?);
        Ok(())
    }

    fn dispatch(&self, query: Message, client: SocketAddr) {
        let worker = Worker {
            socket: self.socket.clone(),
            resolver: self.resolver.clone(),
            tracer: self.tracer.clone(),
        };

        let permit = match self.in_flight.try_acquire() {
            Some(permit) => permit,
            None => {
                let domain = &query.questions[0].name;
                warn!("{}: too many queries in flight, refusing {}", domain, client);

                worker.record(vec![TraceEvent::finish(
                    domain,
                    None,
                    Outcome::NotApplicable,
                    Duration::ZERO,
                )]);
                worker.send(&query.reply(Rcode::ServFail), &query, client);
                return;
            }
        };

        let fallback = query.reply(Rcode::ServFail);
        let socket = self.socket.clone();

        let spawned = thread::Builder::new()
            .name(format!("query-{}", query.id))
            .spawn(move || {
                let _permit = permit;
                worker.run(query, client);
            });

        if let Err(e) = spawned {
            error!("unable to start a worker for {}: {}", client, e);
            if let Ok(buf) = fallback.to_vec() {
                if let Err(e) = socket.send_to(&buf, client) {
                    warn!("failed to reply to {}: {}", client, e);
                }
            }
        }
    }
}

/// Decodes a client query. It must ask at least one question.
fn parse_query(buf: &[u8]) -> Result<Message> {
    let query = Message::from_slice(buf).map_err(Error::Malformed)?;
    if query.questions.is_empty() {
        return Err(Error::NoQuestion);
    }

    Ok(query)
}

/// Everything a single query needs, moved onto its own thread.
struct Worker<E> {
    socket: Arc<UdpSocket>,
    resolver: Arc<Resolver<E>>,
    tracer: Tracer,
}

impl<E: Exchanger> Worker<E> {
    /// Handles the query, making sure the client hears back even if
    /// resolution panics.
    fn run(&self, query: Message, client: SocketAddr) {
        let start = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.handle(&query, client)));

        if let Err(cause) = result {
            let domain = &query.questions[0].name;
            error!(
                "{}: resolution for {} panicked: {}",
                domain,
                client,
                panic_message(&*cause)
            );

            self.record(vec![TraceEvent::finish(
                domain,
                None,
                Outcome::NotApplicable,
                start.elapsed(),
            )]);
            self.send(&query.reply(Rcode::ServFail), &query, client);
        }
    }

    fn handle(&self, query: &Message, client: SocketAddr) {
        let domain = &query.questions[0].name;

        let start = Instant::now();
        let resolution = self.resolver.resolve(domain);
        let total_time = start.elapsed();

        let summary = TraceEvent::finish(
            domain,
            resolution.last_hop(),
            resolution.outcome(),
            total_time,
        );
        debug!(
            "{}: {:?} after {} hops in {:?}",
            domain, resolution.state, resolution.hops, total_time
        );

        // The trace is queued before the client hears back.
        let mut events = resolution.trace;
        events.push(summary);
        self.record(events);

        let reply = match resolution.message {
            Some(mut m) => {
                m.qr = QR::Response;
                m.id = query.id;
                m
            }
            None => query.reply(Rcode::ServFail),
        };
        self.send(&reply, query, client);
    }

    /// Sends `reply`, or a SERVFAIL for `query` if the reply can't be encoded.
    fn send(&self, reply: &Message, query: &Message, client: SocketAddr) {
        let buf = match reply.to_vec() {
            Ok(buf) => buf,
            Err(e) => {
                warn!("unable to encode reply to {}, sending SERVFAIL: {}", client, e);
                match query.reply(Rcode::ServFail).to_vec() {
                    Ok(buf) => buf,
                    Err(e) => {
                        error!("unable to encode SERVFAIL to {}: {}", client, e);
                        return;
                    }
                }
            }
        };

        if let Err(e) = self.socket.send_to(&buf, client) {
            warn!("failed to reply to {}: {}", client, e);
        }
    }

    fn record(&self, events: Vec<TraceEvent>) {
        if let Err(e) = self.tracer.record_all(events) {
            warn!("trace events lost: {}", e);
        }
    }
}

fn panic_message(cause: &(dyn Any + Send)) -> &str {
    if let Some(s) = cause.downcast_ref::<&str>() {
        s
    } else if let Some(s) = cause.downcast_ref::<String>() {
        s
    } else {
        "unknown cause"
    }
}
