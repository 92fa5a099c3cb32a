use crate::bail;
use crate::io::{DNSReadExt, SeekExt, MAX_LABEL_LEN, MAX_NAME_LEN};
use crate::types::*;
use byteorder::{ReadBytesExt, BE};
use num_traits::FromPrimitive;
use std::io;
use std::io::Cursor;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

// A helper class to hold state while the parsing is happening.
struct MessageParser<'a> {
    cur: Cursor<&'a [u8]>,

    m: Message,
}

#[derive(Copy, Clone, PartialEq)]
enum RecordSection {
    Answers,
    Authorities,
    Additionals,
}

impl<'a> MessageParser<'a> {
    fn new(buf: &'a [u8]) -> MessageParser<'a> {
        MessageParser {
            cur: Cursor::new(buf),
            m: Message::default(),
        }
    }

    /// Consume the MessageParser and returned the resulting Message.
    fn parse(mut self) -> io::Result<Message> {
        self.m.id = self.cur.read_u16::<BE>()?;

        let b = self.cur.read_u8()?;
        self.m.qr = QR::from_bool(0b1000_0000 & b != 0);
        let opcode = (0b0111_1000 & b) >> 3;
        self.m.aa = (0b0000_0100 & b) != 0;
        self.m.tc = (0b0000_0010 & b) != 0;
        self.m.rd = (0b0000_0001 & b) != 0;

        self.m.opcode = match FromPrimitive::from_u8(opcode) {
            Some(t) => t,
            None => bail!(InvalidData, "invalid Opcode({})", opcode),
        };

        let b = self.cur.read_u8()?;
        self.m.ra = (0b1000_0000 & b) != 0;
        self.m.z = (0b0100_0000 & b) != 0; // Unused
        self.m.ad = (0b0010_0000 & b) != 0;
        self.m.cd = (0b0001_0000 & b) != 0;
        let rcode = 0b0000_1111 & b;

        self.m.rcode = match FromPrimitive::from_u8(rcode) {
            Some(t) => t,
            None => bail!(InvalidData, "invalid RCode({})", rcode),
        };

        let qd_count = self.cur.read_u16::<BE>()?;
        let an_count = self.cur.read_u16::<BE>()?;
        let ns_count = self.cur.read_u16::<BE>()?;
        let ar_count = self.cur.read_u16::<BE>()?;

        self.read_questions(qd_count)?;
        self.read_records(an_count, RecordSection::Answers)?;
        self.read_records(ns_count, RecordSection::Authorities)?;
        self.read_records(ar_count, RecordSection::Additionals)?;

        if self.cur.remaining() > 0 {
            bail!(
                InvalidData,
                "finished parsing with {} bytes left over",
                self.cur.remaining()
            );
        }

        Ok(self.m)
    }

    fn read_questions(&mut self, count: u16) -> io::Result<()> {
        for _ in 0..count {
            let name = self.cur.read_qname()?;

            let r#type = self.cur.read_u16::<BE>()?;
            let class = self.cur.read_class()?;

            self.m.questions.push(Question {
                name,
                r#type,
                class,
            });
        }

        Ok(())
    }

    fn read_records(&mut self, count: u16, section: RecordSection) -> io::Result<()> {
        for _ in 0..count {
            let name = self.cur.read_qname()?;
            let r#type = self.cur.read_u16::<BE>()?;

            if r#type == Type::OPT as u16 {
                if section != RecordSection::Additionals {
                    bail!(InvalidData, "OPT record outside the additional section");
                }

                // The class and ttl fields are overloaded by EDNS(0), which
                // we don't speak. Skip the whole record.
                let _payload_size = self.cur.read_u16::<BE>()?;
                let _flags = self.cur.read_u32::<BE>()?;
                let len = self.cur.read_u16::<BE>()?;
                self.cur.read_bytes(len.into())?;
                continue;
            }

            let class = self.cur.read_class()?;
            let record = self.read_record(name, r#type, class)?;

            let records = match section {
                RecordSection::Answers => &mut self.m.answers,
                RecordSection::Authorities => &mut self.m.authoritys,
                RecordSection::Additionals => &mut self.m.additionals,
            };
            records.push(record);
        }

        Ok(())
    }

    fn read_record(&mut self, name: String, r#type: u16, class: Class) -> io::Result<Record> {
        let ttl = Duration::from_secs(self.cur.read_u32::<BE>()?.into());
        let len = self.cur.read_u16::<BE>()? as usize;

        let start = self.cur.position() as usize;
        let end = start + len;
        if self.cur.remaining() < len {
            bail!(
                InvalidData,
                "record length {} exceeds the {} bytes left",
                len,
                self.cur.remaining()
            );
        }

        let resource = match Type::from_u16(r#type) {
            Some(Type::A) => {
                if len != 4 {
                    bail!(InvalidData, "invalid A record length ({}) expected 4", len);
                }
                Resource::A(Ipv4Addr::from(self.cur.read_u32::<BE>()?))
            }
            Some(Type::AAAA) => {
                if len != 16 {
                    bail!(InvalidData, "invalid AAAA record length ({}) expected 16", len);
                }
                Resource::AAAA(Ipv6Addr::from(self.cur.read_u128::<BE>()?))
            }

            Some(Type::NS) => Resource::NS(self.cur.read_qname()?),
            Some(Type::CNAME) => Resource::CNAME(self.cur.read_qname()?),
            Some(Type::PTR) => Resource::PTR(self.cur.read_qname()?),

            Some(Type::MX) => Resource::MX(MX {
                preference: self.cur.read_u16::<BE>()?,
                exchange: self.cur.read_qname()?,
            }),

            Some(Type::SOA) => Resource::SOA(SOA {
                mname: self.cur.read_qname()?,
                rname: self.cur.read_qname()?,
                serial: self.cur.read_u32::<BE>()?,
                refresh: Duration::from_secs(self.cur.read_u32::<BE>()?.into()),
                retry: Duration::from_secs(self.cur.read_u32::<BE>()?.into()),
                expire: Duration::from_secs(self.cur.read_u32::<BE>()?.into()),
                minimum: Duration::from_secs(self.cur.read_u32::<BE>()?.into()),
            }),

            Some(Type::TXT) => {
                let mut txts = Vec::new();
                while (self.cur.position() as usize) < end {
                    let txt_len = self.cur.read_u8()?;
                    txts.push(self.cur.read_bytes(txt_len.into())?);
                }
                Resource::TXT(txts)
            }

            _ => Resource::Unknown {
                r#type,
                data: self.cur.read_bytes(len)?,
            },
        };

        if self.cur.position() as usize != end {
            bail!(
                InvalidData,
                "record '{}' rdata was {} bytes, but {} were read",
                name,
                len,
                self.cur.position() as usize - start
            );
        }

        Ok(Record {
            name,
            class,
            ttl,
            resource,
        })
    }
}

impl Message {
    /// Parses a DNS message from the wire format.
    pub fn from_slice(buf: &[u8]) -> io::Result<Message> {
        MessageParser::new(buf).parse()
    }

    /// Builds a single question query for `domain`, with a random id.
    ///
    /// Recursion is not desired, as this is used to walk referrals.
    pub fn query(domain: &str, r#type: Type) -> io::Result<Message> {
        let mut m = Message {
            id: rand::random(),
            ..Default::default()
        };
        m.add_question(domain, r#type, Class::Internet)?;

        Ok(m)
    }

    pub fn add_question(&mut self, domain: &str, r#type: Type, class: Class) -> io::Result<()> {
        if self.questions.len() == u16::MAX as usize {
            bail!(InvalidInput, "too many questions");
        }

        let q = Question {
            name: normalise_domain(domain)?,
            r#type: r#type as u16,
            class,
        };

        self.questions.push(q);
        Ok(())
    }

    /// Builds a reply to this query with the given rcode, keeping the id,
    /// opcode, recursion desired flag and the questions.
    pub fn reply(&self, rcode: Rcode) -> Message {
        Message {
            id: self.id,
            qr: QR::Response,
            opcode: self.opcode,
            rd: self.rd,
            ra: true,
            rcode,
            questions: self.questions.clone(),

            ..Default::default()
        }
    }

    /// Returns this DNS Message as a Vec<u8> ready to be sent, as defined by [rfc1035](https://datatracker.ietf.org/doc/html/rfc1035).
    pub fn to_vec(&self) -> io::Result<Vec<u8>> {
        let mut req = Vec::<u8>::with_capacity(512);

        req.extend_from_slice(&self.id.to_be_bytes());

        let mut b = 0_u8;
        b |= if self.qr.to_bool() { 0b1000_0000 } else { 0 };
        b |= ((self.opcode as u8) << 3) & 0b0111_1000;
        b |= if self.aa { 0b0000_0100 } else { 0 };
        b |= if self.tc { 0b0000_0010 } else { 0 };
        b |= if self.rd { 0b0000_0001 } else { 0 };
        req.push(b);

        let mut b = 0_u8;
        b |= if self.ra { 0b1000_0000 } else { 0 };
        b |= if self.z { 0b0100_0000 } else { 0 };
        b |= if self.ad { 0b0010_0000 } else { 0 };
        b |= if self.cd { 0b0001_0000 } else { 0 };
        b |= (self.rcode as u8) & 0b0000_1111;
        req.push(b);

        write_count(&mut req, self.questions.len())?;
        write_count(&mut req, self.answers.len())?;
        write_count(&mut req, self.authoritys.len())?;
        write_count(&mut req, self.additionals.len())?;

        for question in &self.questions {
            write_qname(&mut req, &question.name)?;

            req.extend_from_slice(&question.r#type.to_be_bytes());
            req.extend_from_slice(&(question.class as u16).to_be_bytes());
        }

        for record in self
            .answers
            .iter()
            .chain(&self.authoritys)
            .chain(&self.additionals)
        {
            record.write(&mut req)?;
        }

        Ok(req)
    }
}

impl Record {
    fn write(&self, buf: &mut Vec<u8>) -> io::Result<()> {
        write_qname(buf, &self.name)?;
        buf.extend_from_slice(&self.r#type().to_be_bytes());
        buf.extend_from_slice(&(self.class as u16).to_be_bytes());

        let ttl = u32::try_from(self.ttl.as_secs()).unwrap_or(u32::MAX);
        buf.extend_from_slice(&ttl.to_be_bytes());

        // Length placeholder, filled in once the rdata is written.
        let len_pos = buf.len();
        buf.extend_from_slice(&[0, 0]);

        match &self.resource {
            Resource::A(ip) => buf.extend_from_slice(&ip.octets()),
            Resource::AAAA(ip) => buf.extend_from_slice(&ip.octets()),

            Resource::NS(name) | Resource::CNAME(name) | Resource::PTR(name) => {
                write_qname(buf, name)?
            }

            Resource::MX(mx) => {
                buf.extend_from_slice(&mx.preference.to_be_bytes());
                write_qname(buf, &mx.exchange)?;
            }

            Resource::SOA(soa) => {
                write_qname(buf, &soa.mname)?;
                write_qname(buf, &soa.rname)?;
                buf.extend_from_slice(&soa.serial.to_be_bytes());
                for d in [soa.refresh, soa.retry, soa.expire, soa.minimum] {
                    let secs = u32::try_from(d.as_secs()).unwrap_or(u32::MAX);
                    buf.extend_from_slice(&secs.to_be_bytes());
                }
            }

            Resource::TXT(txts) => {
                for txt in txts {
                    let len = match u8::try_from(txt.len()) {
                        Ok(len) => len,
                        Err(_) => bail!(InvalidData, "TXT string longer than 255 bytes"),
                    };
                    buf.push(len);
                    buf.extend_from_slice(txt);
                }
            }

            Resource::Unknown { data, .. } => buf.extend_from_slice(data),
        }

        let rdata_len = buf.len() - len_pos - 2;
        let rdata_len = match u16::try_from(rdata_len) {
            Ok(len) => len,
            Err(_) => bail!(InvalidData, "rdata for '{}' is too long", self.name),
        };
        buf[len_pos..len_pos + 2].copy_from_slice(&rdata_len.to_be_bytes());

        Ok(())
    }
}

fn write_count(buf: &mut Vec<u8>, count: usize) -> io::Result<()> {
    match u16::try_from(count) {
        Ok(count) => buf.extend_from_slice(&count.to_be_bytes()),
        Err(_) => bail!(InvalidData, "too many records in one section ({})", count),
    }
    Ok(())
}

/// Takes a unicode domain and converts it to a fully qualified ASCII name.
/// This normalises it, so it's easier to compare what was queried, and what
/// was returned.
fn normalise_domain(domain: &str) -> io::Result<String> {
    if domain.is_empty() || domain == "." {
        return Ok(".".to_string());
    }

    let mut ascii = match idna::domain_to_ascii(domain) {
        Ok(ascii) => ascii,
        Err(e) => bail!(InvalidInput, "invalid dns name '{}': {}", domain, e),
    };

    if !ascii.ends_with('.') {
        ascii.push('.')
    }

    Ok(ascii)
}

/// Writes a domain name into the supplied `Vec<u8>`, without compression.
fn write_qname(buf: &mut Vec<u8>, domain: &str) -> io::Result<()> {
    let start = buf.len();

    if !domain.is_empty() && domain != "." {
        for label in domain.split_terminator('.') {
            if label.is_empty() {
                bail!(InvalidData, "empty label in domain name '{}'", domain);
            }

            if label.len() > MAX_LABEL_LEN {
                bail!(
                    InvalidData,
                    "label '{0}' longer than {1} characters",
                    label,
                    MAX_LABEL_LEN
                );
            }

            buf.push(label.len() as u8);
            buf.extend_from_slice(label.as_bytes());
        }
    }

    buf.push(0);

    if buf.len() - start > MAX_NAME_LEN {
        bail!(InvalidData, "domain name '{}' is too long", domain);
    }

    Ok(())
}
