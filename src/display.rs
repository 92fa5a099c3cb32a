//! Implements the Display trait for the various types, so they output
//! in `dig` style.
// Refer to https://github.com/tigeli/bind-utils/blob/master/bin/dig/dig.c for reference.

use crate::types::*;
use chrono::prelude::*;
use num_traits::FromPrimitive;
use std::fmt;

/// Displays this message in a format resembling `dig` output.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.fmt_header(f)?;

        // Always display the question section, but optionally
        // display the other sections.
        writeln!(f, ";; QUESTION SECTION:")?;
        for question in &self.questions {
            write!(f, "{}", question)?;
        }
        writeln!(f)?;

        if !self.answers.is_empty() {
            writeln!(f, ";; ANSWER SECTION:")?;
            for answer in &self.answers {
                write!(f, "{}", answer)?;
            }
            writeln!(f)?;
        }

        if !self.authoritys.is_empty() {
            writeln!(f, ";; AUTHORITY SECTION:")?;
            for answer in &self.authoritys {
                write!(f, "{}", answer)?;
            }
            writeln!(f)?;
        }

        if !self.additionals.is_empty() {
            writeln!(f, ";; ADDITIONAL SECTION:")?;
            for answer in &self.additionals {
                write!(f, "{}", answer)?;
            }
            writeln!(f)?;
        }

        if let Some(stats) = &self.stats {
            write!(f, "{}", stats)?;
        }

        Ok(())
    }
}

impl Message {
    fn fmt_header(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            ";; ->>HEADER<<- opcode: {opcode}, status: {rcode}, id: {id}",
            opcode = self.opcode,
            rcode = self.rcode,
            id = self.id,
        )?;

        let mut flags = String::new();

        if self.qr.to_bool() {
            flags.push_str(" qr")
        }
        if self.aa {
            flags.push_str(" aa")
        }
        if self.tc {
            flags.push_str(" tc")
        }
        if self.rd {
            flags.push_str(" rd")
        }
        if self.ra {
            flags.push_str(" ra")
        }
        if self.ad {
            flags.push_str(" ad")
        }
        if self.cd {
            flags.push_str(" cd")
        }

        writeln!(f, ";; flags:{flags}; QUERY: {qd_count}, ANSWER: {an_count}, AUTHORITY: {ns_count}, ADDITIONAL: {ar_count}",
            flags = flags,
            qd_count = self.questions.len(),
            an_count = self.answers.len(),
            ns_count = self.authoritys.len(),
            ar_count = self.additionals.len(),
        )?;

        writeln!(f)
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, ";; Query time: {} msec", self.duration.as_millis())?;
        writeln!(f, ";; SERVER: {}", self.server)?;

        let start: chrono::DateTime<Local> = self.start.into();
        // ;; WHEN: Sat Jun 12 12:14:21 PDT 2021
        writeln!(f, ";; WHEN: {}", start.format("%a %b %-d %H:%M:%S %z %-Y"))?;
        writeln!(
            f,
            ";; MSG SIZE sent: {} rcvd: {}",
            self.request_size, self.response_size
        )
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            ";{name:<18}      {class:4} {rtype:6}",
            name = self.name,
            class = self.class,
            rtype = type_name(self.r#type),
        )
    }
}

/// The mnemonic for a type code, or the rfc3597 `TYPE<n>` form.
fn type_name(code: u16) -> String {
    match Type::from_u16(code) {
        Some(t) => t.to_string(),
        None => format!("TYPE{}", code),
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {

        writeln!(
            f,
            "{name:<20} {ttl:>4} {class:4} {rtype:6} {resource}",
            name = self.name,
            ttl = self.ttl.as_secs(),
            class = self.class,
            rtype = type_name(self.r#type()),
            resource = self.resource,
        )
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::A(ip) => fmt::Display::fmt(ip, f),
            Resource::AAAA(ip) => fmt::Display::fmt(ip, f),

            Resource::NS(name) => fmt::Display::fmt(name, f),
            Resource::CNAME(name) => fmt::Display::fmt(name, f),
            Resource::PTR(name) => fmt::Display::fmt(name, f),

            Resource::SOA(soa) => fmt::Display::fmt(soa, f),
            Resource::MX(mx) => fmt::Display::fmt(mx, f),

            Resource::TXT(txts) => {
                let output = txts
                    .iter()
                    .map(|txt| format!("\"{}\"", String::from_utf8_lossy(txt)))
                    .collect::<Vec<String>>()
                    .join(" ");
                write!(f, "{}", output)
            }

            // Generic rdata syntax from rfc3597.
            Resource::Unknown { data, .. } => {
                write!(f, "\\# {}", data.len())?;
                if !data.is_empty() {
                    write!(f, " ")?;
                    for b in data {
                        write!(f, "{:02x}", b)?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for MX {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // "10 aspmx.l.google.com."
        write!(
            f,
            "{preference} {exchange}",
            preference = self.preference,
            exchange = self.exchange,
        )
    }
}

impl fmt::Display for SOA {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // "ns1.google.com. dns-admin.google.com. 376337657 900 900 1800 60"
        write!(
            f,
            "{mname} {rname} {serial} {refresh} {retry} {expire} {minimum}",
            mname = self.mname,
            rname = self.rname,
            serial = self.serial,
            refresh = self.refresh.as_secs(),
            retry = self.retry.as_secs(),
            expire = self.expire.as_secs(),
            minimum = self.minimum.as_secs(),
        )
    }
}
