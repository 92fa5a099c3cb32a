//! An iterative DNS resolver.
//!
//! Client queries arrive over UDP and are each resolved on their own thread
//! by walking referrals from a root server down to an authoritative one.
//! Every hop is written to a JSON lines trace log.
//!
//! The crate also carries the small wire codec the resolver speaks, and a
//! [`clients::UdpClient`] usable on its own, as the `dig` tool does.

mod display;
mod dns;
mod errors;
mod io;

pub mod clients;
pub mod config;
pub mod resolver;
pub mod server;
pub mod trace;
pub mod types;

#[macro_use]
extern crate num_derive;

pub use crate::errors::{Error, Result};
pub use crate::types::*;

// Pull up the various types that should be on the front page of the docs.
#[doc(inline)]
pub use crate::config::Config;
#[doc(inline)]
pub use crate::resolver::{Resolution, Resolver, State};
#[doc(inline)]
pub use crate::server::{Server, ShutdownHandle};
#[doc(inline)]
pub use crate::trace::{TraceEvent, TraceLogger, Tracer};
