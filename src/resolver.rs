//! Iterative resolution, walking referrals from a root server down to an
//! authoritative answer.
//!
//! See [rfc1034#section-5.3.3] for the general algorithm. Only glue from the
//! additional section is followed; a referral to a name server whose address
//! is not supplied ends the resolution.
//!
//! [rfc1034#section-5.3.3]: https://datatracker.ietf.org/doc/html/rfc1034#section-5.3.3

use crate::clients::{Exchanger, UdpClient};
use crate::config::Config;
use crate::trace::{Outcome, Step, TraceEvent};
use crate::types::*;
use crate::Error;
use log::{debug, info, warn};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

/// Where a resolution is, or where it ended up.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum State {
    Querying,
    Referred,

    /// Terminal: an A record was found.
    Answered,

    /// Terminal: the name does not exist.
    NxDomain,

    /// Terminal: any response code other than NOERROR or NXDOMAIN, for
    /// example REFUSED or SERVFAIL.
    OtherError,

    /// Terminal: no server left to ask, or the hop limit was reached.
    Exhausted,
}

/// The result of resolving one name.
#[derive(Debug)]
pub struct Resolution {
    /// The terminal response, or None if resolution failed.
    pub message: Option<Message>,
    pub state: State,

    /// Number of exchanges attempted.
    pub hops: usize,

    /// One event per hop, in order. The last one describes the terminal state.
    pub trace: Vec<TraceEvent>,
}

impl Resolution {
    /// How the resolution ended.
    pub fn outcome(&self) -> Outcome {
        self.trace
            .last()
            .map(|e| e.response)
            .unwrap_or(Outcome::Exhausted)
    }

    /// The last event that involved a server.
    pub fn last_hop(&self) -> Option<&TraceEvent> {
        self.trace.iter().rev().find(|e| e.server_ip.is_some())
    }
}

/// What a single response tells us to do next.
#[derive(Debug, PartialEq)]
enum Reply {
    Answer(Ipv4Addr),
    Referral {
        ns: Vec<String>,
        glue: Option<(String, Ipv4Addr)>,
    },
    NxDomain,
    Rcode(Rcode),

    /// NOERROR with no A answer and nothing in the authority section.
    Empty,
}

fn classify(resp: &Message) -> Reply {
    match resp.rcode {
        Rcode::NoError => (),
        Rcode::NXDomain => return Reply::NxDomain,
        rcode => return Reply::Rcode(rcode),
    }

    let answer = resp.answers.iter().find_map(|rr| match rr.resource {
        Resource::A(ip) => Some(ip),
        _ => None,
    });
    if let Some(ip) = answer {
        return Reply::Answer(ip);
    }

    // Anything in the authority section is a referral, even if it holds
    // no name servers to follow.
    if resp.authoritys.is_empty() {
        return Reply::Empty;
    }

    let ns: Vec<String> = resp
        .authoritys
        .iter()
        .filter_map(|rr| match &rr.resource {
            Resource::NS(name) => Some(name.clone()),
            _ => None,
        })
        .collect();

    // The first name server, in authority order, that has glue.
    let glue = ns.iter().find_map(|name| {
        resp.additionals.iter().find_map(|rr| match rr.resource {
            Resource::A(ip) if rr.name.eq_ignore_ascii_case(name) => Some((name.clone(), ip)),
            _ => None,
        })
    });

    Reply::Referral { ns, glue }
}

/// The step label for a server we were referred to.
fn referral_step(ns: &str) -> Step {
    if ns.to_ascii_lowercase().contains("tld") {
        Step::Tld
    } else {
        Step::Authoritative
    }
}

/// An iterative resolver.
///
/// # Example
///
/// ```rust,no_run
/// use iterdns::{Config, Resolver};
///
/// let resolver = Resolver::new_with_config(&Config::default());
/// let resolution = resolver.resolve("bramp.net");
///
/// if let Some(m) = resolution.message {
///     println!("{}", m);
/// }
/// ```
pub struct Resolver<E = UdpClient> {
    exchanger: E,

    roots: Vec<Ipv4Addr>,
    upstream_port: u16,
    hop_limit: usize,
}

impl Resolver {
    /// Creates a new Resolver talking UDP, with the timeout from the config.
    pub fn new_with_config(config: &Config) -> Resolver<UdpClient> {
        Resolver::new(UdpClient::new(config.hop_timeout), config)
    }
}

impl<E> Resolver<E>
where
    E: Exchanger,
{
    pub fn new(exchanger: E, config: &Config) -> Resolver<E> {
        Resolver {
            exchanger,
            roots: config.roots.clone(),
            upstream_port: config.upstream_port,
            hop_limit: config.hop_limit,
        }
    }

    pub fn exchanger(&self) -> &E {
        &self.exchanger
    }

    /// Resolves the A record of `domain`, starting from the first root server.
    pub fn resolve(&self, domain: &str) -> Resolution {
        let start = Instant::now();
        let mut trace = Vec::new();

        let mut roots = self.roots.iter().copied();
        let mut server = roots.next();
        let mut step = Step::Root;
        let mut state = State::Querying;
        let mut hops = 0;

        let mut query = match Message::query(domain, Type::A) {
            Ok(query) => query,
            Err(e) => {
                warn!("{}: unable to build query: {}", domain, e);
                server = None;
                Message::default()
            }
        };

        let record_hop = |trace: &mut Vec<TraceEvent>,
                          server: Option<Ipv4Addr>,
                          step: Step,
                          outcome: Outcome,
                          rtt: Duration| {
            trace.push(TraceEvent::hop(
                domain,
                server.map(IpAddr::V4),
                step,
                outcome,
                rtt,
                start.elapsed(),
            ));
        };

        while hops < self.hop_limit {
            let ip = match server {
                Some(ip) => ip,
                None => break,
            };

            hops += 1;
            query.id = rand::random();

            let addr = SocketAddr::from((ip, self.upstream_port));
            debug!("{}: hop {} asking {} ({}, {:?})", domain, hops, addr, step, state);

            let hop_start = Instant::now();
            let resp = match self.exchanger.exchange(addr, &query) {
                Ok(resp) => resp,
                Err(e) => {
                    match e {
                        Error::Timeout(_) => {
                            record_hop(&mut trace, server, step, Outcome::Timeout, hop_start.elapsed())
                        }
                        e => warn!("{}: query to {} failed: {}", domain, addr, e),
                    }

                    // Only root servers have somewhere else to go.
                    server = match step {
                        Step::Root => roots.next(),
                        _ => None,
                    };
                    if let Some(next) = server {
                        info!("{}: root {} failed, falling back to {}", domain, ip, next);
                    }
                    continue;
                }
            };

            let rtt = resp
                .stats
                .as_ref()
                .map(|s| s.duration)
                .unwrap_or_else(|| hop_start.elapsed());

            match classify(&resp) {
                Reply::Answer(a) => {
                    record_hop(&mut trace, server, Step::Authoritative, Outcome::Answer(a), rtt);
                    return Resolution {
                        message: Some(resp),
                        state: State::Answered,
                        hops,
                        trace,
                    };
                }

                Reply::Referral { ns, glue } => {
                    record_hop(&mut trace, server, step, Outcome::Referral, rtt);

                    match glue {
                        Some((name, next)) => {
                            debug!("{}: referred to {} ({})", domain, name, next);
                            step = referral_step(&name);
                            server = Some(next);
                            state = State::Referred;
                        }
                        None if ns.is_empty() => {
                            warn!(
                                "{}: got referral from {} without name servers, giving up",
                                domain, ip
                            );
                            server = None;
                        }
                        None => {
                            warn!(
                                "{}: got referral to {} but no glue, giving up",
                                domain,
                                ns.join(", ")
                            );
                            server = None;
                        }
                    }
                }

                Reply::NxDomain => {
                    record_hop(&mut trace, server, step, Outcome::NxDomain, rtt);
                    return Resolution {
                        message: Some(resp),
                        state: State::NxDomain,
                        hops,
                        trace,
                    };
                }

                Reply::Rcode(rcode) => {
                    record_hop(&mut trace, server, step, Outcome::Rcode(rcode as u8), rtt);
                    return Resolution {
                        message: Some(resp),
                        state: State::OtherError,
                        hops,
                        trace,
                    };
                }

                Reply::Empty => {
                    warn!("{}: {} sent neither an answer nor a referral, giving up", domain, ip);
                    record_hop(&mut trace, server, step, Outcome::NotApplicable, rtt);
                    server = None;
                }
            }
        }

        warn!("{}: resolution exhausted after {} hops", domain, hops);
        record_hop(&mut trace, None, step, Outcome::Exhausted, Duration::ZERO);

        Resolution {
            message: None,
            state: State::Exhausted,
            hops,
            trace,
        }
    }
}
