use crate::clients::Exchanger;
use crate::Error;
use crate::Result;
use crate::{Message, Stats};
use std::io;
use std::net::SocketAddr;
use std::net::UdpSocket;
use std::time::{Duration, Instant, SystemTime};

/// How long to wait for an upstream server to answer a single query.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// A UDP DNS Client.
///
/// Every exchange binds a fresh ephemeral socket, which is closed when the
/// exchange returns, whichever way it returns.
///
/// # Example
///
/// ```rust,no_run
/// use iterdns::clients::{Exchanger, UdpClient};
/// use iterdns::types::*;
///
/// fn main() -> iterdns::Result<()> {
///     let query = Message::query("bramp.net", Type::A)?;
///
///     let response = UdpClient::default()
///        .exchange("198.41.0.4:53".parse().unwrap(), &query)?;
///
///     println!("{}", response);
///     Ok(())
/// }
/// ```
///
/// See <https://datatracker.ietf.org/doc/html/rfc1035#section-4.2.1>
#[derive(Clone, Debug)]
pub struct UdpClient {
    read_timeout: Duration,
}

impl Default for UdpClient {
    fn default() -> Self {
        UdpClient {
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl UdpClient {
    /// Creates a new UdpClient that waits at most `read_timeout` for each response.
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }
}

impl Exchanger for UdpClient {
    /// Sends the query [`Message`] to the `server` via UDP and returns the result.
    ///
    /// The response must carry the same id as the query.
    fn exchange(&self, server: SocketAddr, query: &Message) -> Result<Message> {
        let bind = if server.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };

        let socket = UdpSocket::bind(bind)?;
        socket.set_read_timeout(Some(self.read_timeout))?;

        // Connect us to the server, meaning recv will only receive directly
        // from the server.
        socket.connect(server)?;

        let req = query.to_vec()?;

        let sent_at = SystemTime::now();
        let timer = Instant::now();
        socket.send(&req)?;

        let mut buf = [0; 4096];
        let len = match socket.recv(&mut buf) {
            Ok(len) => len,
            Err(e) if is_timeout(&e) => return Err(Error::Timeout(server)),
            Err(e) => return Err(e.into()),
        };

        let mut resp = Message::from_slice(&buf[0..len]).map_err(Error::Malformed)?;
        if resp.id != query.id {
            return Err(Error::IdMismatch {
                want: query.id,
                got: resp.id,
            });
        }

        resp.stats = Some(Stats {
            start: sent_at,
            duration: timer.elapsed(),
            server,
            request_size: req.len(),
            response_size: len,
        });

        Ok(resp)
    }
}

/// A read timeout surfaces as WouldBlock on unix and TimedOut on windows.
pub(crate) fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
