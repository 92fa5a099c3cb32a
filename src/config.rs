use crate::clients::DEFAULT_READ_TIMEOUT;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// a.root-servers.net
pub const DEFAULT_ROOT: Ipv4Addr = Ipv4Addr::new(198, 41, 0, 4);

/// Upper bound on the number of hops a single resolution may take.
pub const DEFAULT_HOP_LIMIT: usize = 10;

/// Runtime configuration for the resolver.
#[derive(Clone, Debug)]
pub struct Config {
    /// Address the dispatcher listens on for client queries.
    pub listen: SocketAddr,

    /// Root servers, tried in order. Only the first is queried unless it fails.
    pub roots: Vec<Ipv4Addr>,

    /// Port upstream servers are queried on.
    pub upstream_port: u16,

    pub hop_limit: usize,

    /// Receive timeout of every upstream exchange.
    pub hop_timeout: Duration,

    /// File the resolution trace is written to. Truncated on start.
    pub trace_path: PathBuf,

    /// Maximum number of queries resolved concurrently.
    pub max_in_flight: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen: SocketAddr::from(([0, 0, 0, 0], 53)),
            roots: vec![DEFAULT_ROOT],
            upstream_port: 53,
            hop_limit: DEFAULT_HOP_LIMIT,
            hop_timeout: DEFAULT_READ_TIMEOUT,
            trace_path: PathBuf::from("resolver.log"),
            max_in_flight: 1024,
        }
    }
}
