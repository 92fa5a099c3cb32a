// iterdns: resolves client queries iteratively, starting at a root server.
use clap::Parser;
use iterdns::{Config, Resolver, Server, TraceLogger};
use log::{error, info};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(version, about = "An iterative DNS resolver")]
struct Cli {
    /// Address to listen for client queries on.
    #[arg(long, default_value = "0.0.0.0:53")]
    listen: SocketAddr,

    /// Root server to start from. Repeat to add fallbacks, tried in order.
    #[arg(long = "root", default_value = "198.41.0.4")]
    roots: Vec<Ipv4Addr>,

    /// File the per-hop trace is written to. Truncated on start.
    #[arg(long, default_value = "resolver.log")]
    trace_log: PathBuf,

    /// Maximum number of servers asked per query.
    #[arg(long, default_value_t = iterdns::config::DEFAULT_HOP_LIMIT)]
    hop_limit: usize,

    /// How long to wait for each upstream server, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    hop_timeout_ms: u64,

    /// Port upstream servers are queried on.
    #[arg(long, default_value_t = 53)]
    upstream_port: u16,

    /// Maximum number of queries resolved at the same time. Queries beyond
    /// this are answered with SERVFAIL.
    #[arg(long, default_value_t = 1024)]
    max_in_flight: usize,
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        Config {
            listen: cli.listen,
            roots: cli.roots,
            upstream_port: cli.upstream_port,
            hop_limit: cli.hop_limit,
            hop_timeout: Duration::from_millis(cli.hop_timeout_ms),
            trace_path: cli.trace_log,
            max_in_flight: cli.max_in_flight,
        }
    }
}

fn run(config: Config) -> iterdns::Result<()> {
    let trace = TraceLogger::create(&config.trace_path)?;
    info!("writing trace to {}", config.trace_path.display());

    let resolver = Resolver::new_with_config(&config);
    let server = Server::bind(&config, resolver, trace.tracer())?;
    server.serve()?;

    trace.shutdown();
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from(Cli::parse());
    if let Err(e) = run(config) {
        error!("{}", e);
        process::exit(1);
    }
}
