//! A scripted upstream, so resolutions can be tested without the network.
#![allow(dead_code)]

use iterdns::clients::Exchanger;
use iterdns::types::*;
use iterdns::{Error, Result};
use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

pub const ROOT: Ipv4Addr = Ipv4Addr::new(198, 41, 0, 4);
pub const GTLD: Ipv4Addr = Ipv4Addr::new(192, 5, 6, 30);
pub const AUTH: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 53);

/// How a scripted server behaves.
#[derive(Clone)]
pub enum Script {
    Reply(Message),

    /// Replies after sleeping for a while.
    Slow(Message, Duration),

    Timeout,
    Panic,

    /// Sends back bytes that don't decode.
    Malformed,

    /// Replies with someone else's query id.
    WrongId,
}

/// Answers each server from its script, and remembers who was asked.
#[derive(Default)]
pub struct MockExchanger {
    scripts: HashMap<Ipv4Addr, Script>,
    asked: Mutex<Vec<SocketAddr>>,
}

impl MockExchanger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, server: Ipv4Addr, script: Script) -> Self {
        self.scripts.insert(server, script);
        self
    }

    /// Every server asked so far, in order.
    pub fn asked(&self) -> Vec<SocketAddr> {
        self.asked.lock().unwrap().clone()
    }
}

impl Exchanger for MockExchanger {
    fn exchange(&self, server: SocketAddr, query: &Message) -> Result<Message> {
        self.asked.lock().unwrap().push(server);

        let ip = match server {
            SocketAddr::V4(addr) => *addr.ip(),
            SocketAddr::V6(_) => panic!("only IPv4 servers are scripted"),
        };

        let template = match self.scripts.get(&ip) {
            Some(Script::Reply(m)) => m.clone(),
            Some(Script::Slow(m, delay)) => {
                thread::sleep(*delay);
                m.clone()
            }
            Some(Script::Panic) => panic!("scripted panic from {}", ip),
            Some(Script::Malformed) => {
                return Err(Error::Malformed(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated response",
                )))
            }
            Some(Script::WrongId) => {
                return Err(Error::IdMismatch {
                    want: query.id,
                    got: query.id.wrapping_add(1),
                })
            }
            Some(Script::Timeout) | None => return Err(Error::Timeout(server)),
        };

        let mut resp = query.reply(template.rcode);
        resp.aa = template.aa;
        resp.answers = template.answers;
        resp.authoritys = template.authoritys;
        resp.additionals = template.additionals;
        Ok(resp)
    }
}

pub fn record(name: &str, resource: Resource) -> Record {
    Record {
        name: name.to_string(),
        class: Class::Internet,
        ttl: Duration::from_secs(172800),
        resource,
    }
}

/// A response with no records.
pub fn rcode(rcode: Rcode) -> Message {
    Message {
        qr: QR::Response,
        rcode,
        ..Default::default()
    }
}

/// An authoritative answer for `name`.
pub fn answer(name: &str, ip: Ipv4Addr) -> Message {
    let mut m = rcode(Rcode::NoError);
    m.aa = true;
    m.answers.push(record(name, Resource::A(ip)));
    m
}

/// A referral for `zone` to the given name servers, each with optional glue.
pub fn referral(zone: &str, servers: &[(&str, Option<Ipv4Addr>)]) -> Message {
    let mut m = rcode(Rcode::NoError);
    for (ns, glue) in servers {
        m.authoritys.push(record(zone, Resource::NS(ns.to_string())));
        if let Some(ip) = glue {
            m.additionals.push(record(ns, Resource::A(*ip)));
        }
    }
    m
}

/// A negative response for `zone`: NOERROR with only an SOA in authority.
pub fn soa(zone: &str) -> Message {
    let mut m = rcode(Rcode::NoError);
    m.authoritys.push(record(
        zone,
        Resource::SOA(SOA {
            mname: format!("ns.{}", zone),
            rname: format!("hostmaster.{}", zone),
            serial: 1,
            refresh: Duration::from_secs(7200),
            retry: Duration::from_secs(3600),
            expire: Duration::from_secs(1209600),
            minimum: Duration::from_secs(3600),
        }),
    ));
    m
}

/// The usual root, then gTLD, then authoritative chain for example.com.
pub fn example_com() -> MockExchanger {
    MockExchanger::new()
        .with(
            ROOT,
            Script::Reply(referral(
                "com.",
                &[
                    ("a.gtld-servers.net.", Some(GTLD)),
                    ("b.gtld-servers.net.", Some(Ipv4Addr::new(192, 33, 14, 30))),
                ],
            )),
        )
        .with(
            GTLD,
            Script::Reply(referral(
                "example.com.",
                &[("ns1.example.com.", Some(AUTH))],
            )),
        )
        .with(
            AUTH,
            Script::Reply(answer("example.com.", Ipv4Addr::new(93, 184, 216, 34))),
        )
}
