// Simple dig style command line, handy for poking at a running resolver.
// dig [@server[:port]] {type} {domain}...
mod util;

use iterdns::clients::{Exchanger, UdpClient};
use iterdns::types::*;
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::process;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
enum ArgsError {
    #[error("Unknown flag: {0}")]
    UnknownFlag(String),

    #[error("Invalid server: {0}")]
    InvalidServer(String),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),
}

// A simple type alias so as to DRY.
type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug, PartialEq)]
struct Args {
    server: SocketAddr,

    /// Ask the server to recurse for us.
    recurse: bool,

    /// Dump the raw packets.
    hex: bool,

    timeout: Duration,

    /// Query this types
    r#type: Type,

    /// Across all these domains
    domains: Vec<String>,
}

/// Parses `ip`, `ip:port`, or `[ipv6]:port`, defaulting to port 53.
fn parse_server(s: &str) -> std::result::Result<SocketAddr, ArgsError> {
    if let Ok(addr) = SocketAddr::from_str(s) {
        return Ok(addr);
    }

    IpAddr::from_str(s)
        .map(|ip| SocketAddr::new(ip, 53))
        .map_err(|_| ArgsError::InvalidServer(s.to_string()))
}

fn parse_args(args: impl Iterator<Item = String>) -> std::result::Result<Args, ArgsError> {
    let mut result = Args {
        server: SocketAddr::from(([127, 0, 0, 1], 53)),
        recurse: true,
        hex: false,
        timeout: Duration::from_secs(5),

        r#type: Type::A,
        domains: Vec::new(),
    };

    let mut type_or_domain = Vec::<String>::new();

    for arg in args {
        match arg.as_str() {
            "+recurse" => result.recurse = true,
            "+norecurse" => result.recurse = false,
            "+hex" => result.hex = true,

            _ => {
                if let Some(timeout) = arg.strip_prefix("+timeout=") {
                    let secs = u64::from_str(timeout)
                        .map_err(|_| ArgsError::InvalidTimeout(timeout.to_string()))?;
                    result.timeout = Duration::from_secs(secs);
                } else if arg.starts_with('+') {
                    return Err(ArgsError::UnknownFlag(arg));
                } else if let Some(server) = arg.strip_prefix('@') {
                    result.server = parse_server(server)?;
                } else {
                    type_or_domain.push(arg)
                }
            }
        }
    }

    let mut found_type = false;

    // To be useful, we allow users to say `dig A bramp.net` or `dig bramp.net A`
    for arg in type_or_domain {
        if !found_type {
            // Use the first type we found and assume the rest are domains.
            if let Ok(r#type) = Type::from_str(&arg) {
                result.r#type = r#type;
                found_type = true;
                continue;
            }
        }

        result.domains.push(arg)
    }

    if result.domains.is_empty() {
        // By default query the root domain
        result.domains.push(".".to_string());
        if !found_type {
            result.r#type = Type::NS;
        }
    }

    Ok(result)
}

fn main() -> Result<()> {
    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("Usage: dig [@server[:port]] [+norecurse] [+hex] [+timeout=secs] {{domain}} {{type}}");
            process::exit(1);
        }
    };

    let client = UdpClient::new(args.timeout);

    // One question per message; most servers refuse anything else.
    for domain in &args.domains {
        let mut query = Message::query(domain, args.r#type)?;
        query.rd = args.recurse;

        if args.hex {
            println!("query:");
            print!("{}", util::hexdump(&query.to_vec()?));
            println!();
        }

        let resp = client.exchange(args.server, &query)?;

        if args.hex {
            println!("response:");
            print!("{}", util::hexdump(&resp.to_vec()?));
            println!();
        }

        println!("{}", resp);
    }

    Ok(())
}
