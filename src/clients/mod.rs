//! Clients that exchange a single query for a single response with one server.

use crate::Message;
use crate::Result;
use std::net::SocketAddr;

pub use self::udp::{UdpClient, DEFAULT_READ_TIMEOUT};

pub(crate) mod udp;

/// Exchanger sends a query to a server and returns its response.
///
/// Implementations must be usable from many threads at once, as each
/// in-flight resolution drives its own exchanges.
pub trait Exchanger: Send + Sync {
    fn exchange(&self, server: SocketAddr, query: &Message) -> Result<Message>;
}
