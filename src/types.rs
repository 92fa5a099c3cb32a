use num_traits::FromPrimitive;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, SystemTime};
use strum_macros::{Display, EnumString};

/// DNS Message that serves as the root of all DNS requests and responses.
///
/// # Examples
///
/// For constructing a query and encoding it:
///
/// ```rust
/// use iterdns::Message;
/// use iterdns::types::*;
///
/// let query = Message::query("bramp.net", Type::A).expect("valid domain");
/// let req = query.to_vec().expect("failed to encode DNS request");
///
/// let m = Message::from_slice(&req).expect("invalid message");
/// assert_eq!(m.questions[0].name, "bramp.net.");
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Message {
    /// 16-bit identifier assigned by the program that generates any kind of
    /// query. This identifier is copied into the corresponding reply and can be
    /// used by the requester to match up replies to outstanding queries.
    pub id: u16,

    /// Recursion Desired - this bit directs the name server to pursue the query
    /// recursively.
    pub rd: bool,

    /// Truncation - specifies that this message was truncated.
    pub tc: bool,

    /// Authoritative Answer - Specifies that the responding name server is an
    /// authority for the domain name in question section.
    pub aa: bool,

    /// Specifies kind of query in this message. 0 represents a standard query.
    /// See <https://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml#dns-parameters-5>
    pub opcode: Opcode,

    /// Specifies whether this message is a query (0), or a response (1).
    pub qr: QR,

    /// Response code.
    pub rcode: Rcode,

    /// Checking Disabled. See [RFC4035] and [RFC6840].
    ///
    /// [rfc4035]: https://datatracker.ietf.org/doc/html/rfc4035
    /// [rfc6840]: https://datatracker.ietf.org/doc/html/rfc6840
    pub cd: bool,

    /// Authentic Data. See [RFC4035] and [RFC6840].
    ///
    /// [rfc4035]: https://datatracker.ietf.org/doc/html/rfc4035
    /// [rfc6840]: https://datatracker.ietf.org/doc/html/rfc6840
    pub ad: bool,

    /// Z Reserved for future use. You must set this field to 0.
    pub z: bool,

    /// Recursion Available - this be is set or cleared in a response, and
    /// denotes whether recursive query support is available in the name server.
    pub ra: bool,

    /// The questions.
    pub questions: Vec<Question>,

    /// The answer records.
    pub answers: Vec<Record>,

    /// The authoritive records.
    pub authoritys: Vec<Record>,

    /// The additional records.
    pub additionals: Vec<Record>,

    /// Stats about the exchange that produced this message. Only set on
    /// responses returned by a client.
    pub stats: Option<Stats>,
}

/// DNS Question.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Question {
    /// A fully qualified ASCII domain name, with a trailing dot.
    pub name: String,

    /// The wire type code, kept as is so questions for types we don't know
    /// can still be echoed back. See [`Question::qtype`].
    pub r#type: u16,
    pub class: Class,
}

impl Question {
    /// The question's type, if it is one we know.
    pub fn qtype(&self) -> Option<Type> {
        Type::from_u16(self.r#type)
    }
}

/// Resource Record (RR)
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub name: String,
    pub class: Class,

    /// The number of seconds that the resource record may be cached
    /// before the source of the information should again be consulted.
    /// Zero is interpreted to mean that the RR can only be used for the
    /// transaction in progress.
    pub ttl: Duration,

    pub resource: Resource,
}

impl Record {
    /// The wire type code of this record, taken from its resource.
    pub fn r#type(&self) -> u16 {
        self.resource.type_code()
    }
}

/// Statistics about a single query/response exchange.
#[derive(Clone, Debug, PartialEq)]
pub struct Stats {
    /// When the request was sent.
    pub start: SystemTime,

    /// Round trip time between sending the request and receiving the response.
    pub duration: Duration,

    /// The server the response came from.
    pub server: SocketAddr,

    pub request_size: usize,
    pub response_size: usize,
}

#[derive(Copy, Clone, Debug, EnumString, PartialEq)]
pub enum QR {
    Query = 0,
    Response = 1,
}

impl Default for QR {
    fn default() -> Self {
        QR::Query
    }
}

impl QR {
    pub fn from_bool(b: bool) -> QR {
        match b {
            false => QR::Query,
            true => QR::Response,
        }
    }

    pub fn to_bool(self) -> bool {
        match self {
            QR::Query => false,
            QR::Response => true,
        }
    }
}

/// Specifies kind of query in this message. See [rfc1035], [rfc6895] and <https://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml#dns-parameters-5>
///
/// [rfc1035]: https://datatracker.ietf.org/doc/html/rfc1035
/// [rfc6895]: https://datatracker.ietf.org/doc/html/rfc6895
#[derive(Copy, Clone, Debug, Display, EnumString, FromPrimitive, PartialEq)]
#[allow(clippy::upper_case_acronyms)]
#[repr(u8)] // Really only 4 bits
pub enum Opcode {
    Query = 0,

    /// Inverse Query (OBSOLETE). See [rfc3425].
    ///
    /// [rfc3425]: https://datatracker.ietf.org/doc/html/rfc3425
    IQuery = 1,
    Status = 2,
    Notify = 4,
    Update = 5,
    DSO = 6,
}

impl Default for Opcode {
    fn default() -> Self {
        Opcode::Query
    }
}

/// Response Codes.
/// See [rfc1035] and <https://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml#dns-parameters-6>
///
/// [rfc1035]: https://datatracker.ietf.org/doc/html/rfc1035
#[derive(Copy, Clone, Debug, Display, EnumString, FromPrimitive, PartialEq)]
#[allow(clippy::upper_case_acronyms)]
#[repr(u8)] // In headers it is only 4 bits.
pub enum Rcode {
    /// No Error
    NoError = 0,

    /// Format Error
    FormErr = 1,

    /// Server Failure
    ServFail = 2,

    /// Non-Existent Domain
    NXDomain = 3,

    /// Not Implemented
    NotImp = 4,

    /// Query Refused
    Refused = 5,

    YXDomain = 6,
    YXRRSet = 7,
    NXRRSet = 8,
    NotAuth = 9,
    NotZone = 10,
    DSOTYPENI = 11,

    // Unassigned, but they fit in the header so must still parse.
    Unassigned12 = 12,
    Unassigned13 = 13,
    Unassigned14 = 14,
    Unassigned15 = 15,
}

impl Default for Rcode {
    fn default() -> Self {
        Rcode::NoError
    }
}

/// Resource Record Type, for example, A, CNAME or SOA.
///
// When adding a Type that carries a domain name, a parsing function must be
// added in dns.rs, otherwise the rdata is kept as raw bytes.
#[derive(Copy, Clone, Debug, Display, EnumString, FromPrimitive, PartialEq)]
#[allow(clippy::upper_case_acronyms)]
#[repr(u16)]
pub enum Type {
    Reserved = 0,

    /// (Default) IPv4 Address.
    A = 1,
    NS = 2,
    CNAME = 5,
    SOA = 6,

    /// Domain name pointer.
    PTR = 12,

    /// Mail exchange.
    MX = 15,

    /// Text strings.
    TXT = 16,

    /// IPv6 Address.
    AAAA = 28,

    /// Server Selection
    SRV = 33,

    /// EDNS(0) Opt type. Skipped when parsing.
    OPT = 41,

    DS = 43,
    RRSIG = 46,
    NSEC = 47,
    DNSKEY = 48,
    NSEC3 = 50,
    SVCB = 64,
    HTTPS = 65,

    /// Any record type.
    /// Only valid as a Question Type.
    ANY = 255,

    CAA = 257,
}

impl Default for Type {
    fn default() -> Self {
        Type::A
    }
}

/// Resource Record Class, for example Internet.
#[derive(Copy, Clone, Debug, Display, EnumString, FromPrimitive, PartialEq)]
#[repr(u16)]
pub enum Class {
    /// Reserved per [RFC6895]
    ///
    /// [rfc6895]: https://datatracker.ietf.org/doc/html/rfc6895
    Reserved = 0,

    /// (Default) The Internet (IN), see [rfc1035].
    ///
    /// [rfc1035]: https://datatracker.ietf.org/doc/html/rfc1035
    #[strum(serialize = "IN")]
    Internet = 1,

    #[strum(serialize = "CS")]
    CsNet = 2,

    #[strum(serialize = "CH")]
    Chaos = 3,

    #[strum(serialize = "HS")]
    Hesiod = 4,

    None = 254,

    #[strum(serialize = "*")]
    Any = 255,
}

impl Default for Class {
    fn default() -> Self {
        Class::Internet
    }
}

// This should be kept in sync with Type.
#[derive(Clone, Debug, PartialEq)]
#[allow(clippy::upper_case_acronyms)]
pub enum Resource {
    A(Ipv4Addr),
    AAAA(Ipv6Addr),

    CNAME(String),
    NS(String),
    PTR(String),

    TXT(Vec<Vec<u8>>),

    MX(MX),
    SOA(SOA),

    /// A record type we don't decode. The rdata is kept verbatim so the
    /// record can be written back out unchanged.
    Unknown { r#type: u16, data: Vec<u8> },
}

impl Resource {
    pub fn type_code(&self) -> u16 {
        match self {
            Resource::A(_) => Type::A as u16,
            Resource::AAAA(_) => Type::AAAA as u16,
            Resource::CNAME(_) => Type::CNAME as u16,
            Resource::NS(_) => Type::NS as u16,
            Resource::PTR(_) => Type::PTR as u16,
            Resource::TXT(_) => Type::TXT as u16,
            Resource::MX(_) => Type::MX as u16,
            Resource::SOA(_) => Type::SOA as u16,
            Resource::Unknown { r#type, .. } => *r#type,
        }
    }
}

/// Mail exchange record.
#[derive(Clone, Debug, PartialEq)]
pub struct MX {
    pub preference: u16,
    pub exchange: String,
}

/// Start of Authority record.
#[derive(Clone, Debug, PartialEq)]
pub struct SOA {
    /// The primary name server for this zone.
    pub mname: String,

    /// The mailbox of the person responsible for this zone.
    pub rname: String,

    pub serial: u32,
    pub refresh: Duration,
    pub retry: Duration,
    pub expire: Duration,
    pub minimum: Duration,
}
