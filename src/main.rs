use anyhow::Result;
use clap::Parser;
use dnsrevproxy::error::Error::DNSError;
use dnsrevproxy::{Config, DynExchanger, NetworkExchanger, RawConfig, Shared};
use is_terminal::IsTerminal;
use lazy_static::lazy_static;
use std::sync::Arc;
use std::time::Duration;
use time::macros::format_description;
use tokio::signal;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "dns-reverse-proxy")]
#[command(version)]
#[command(about = "DNS reverse proxy routing queries to upstream servers by domain suffix")]
struct Cli {
    /// JSON configuration file, used instead of the flags below
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<String>,

    /// Address to listen to (TCP and UDP)
    #[arg(long, default_value = ":53")]
    address: String,

    /// Default DNS server where to send queries if no route matched (IP:port)
    #[arg(long)]
    default: Option<String>,

    /// List of routes where to send queries (subdomain=IP:port)
    #[arg(long = "route", value_delimiter = ',')]
    routes: Vec<String>,

    /// List of remaps to translate a domain to another (srcdomain=dstdomain)
    #[arg(long = "remap", value_delimiter = ',')]
    remaps: Vec<String>,

    /// List of IPs allowed to transfer (AXFR/IXFR)
    #[arg(long, value_delimiter = ',')]
    allow_transfer: Vec<String>,

    /// Seconds an idle client TCP connection is kept open
    #[arg(long, default_value_t = 5)]
    tcp_timeout: u64,

    /// Seconds to wait on each upstream read or write
    #[arg(long, default_value_t = 2)]
    upstream_timeout: u64,
}

lazy_static! {
    static ref LOG_TIME_FORMAT: &'static [time::format_description::FormatItem<'static>] =
        format_description!(
            version = 2,
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
        );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    let config = config_init(Cli::parse())?;
    for (suffix, upstream) in config.routes.iter() {
        tracing::info!("routing {suffix} to {upstream}");
    }
    for (src, dst) in config.remaps.iter() {
        tracing::info!("remapping {src} to {dst}");
    }
    tracing::info!("routing everything else to {}", config.default_upstream);

    let exchanger: DynExchanger = Arc::new(NetworkExchanger::new(config.upstream_timeout));
    let (dns_server, in_flight) = dnsrevproxy::dns::new(config.clone(), exchanger).await?;
    tracing::info!("DNS listening on UDP and TCP {}", &config.listen_addr);
    let dns_handle = tokio::spawn(dns_server.block_until_done());

    tokio::select! {
        () = shutdown_signal() => {
            tracing::info!("quitting from signal, waiting for {} queries in flight", in_flight.count());
            in_flight.drain().await;
        },
        Ok(dns_res) = dns_handle => {
            if let Err(err) = dns_res {
                return Err(DNSError(err).into())
            }
        }
    }
    tracing::info!("goodbye");
    Ok(())
}

fn tracing_init() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(UtcTime::new(*LOG_TIME_FORMAT))
                .with_ansi(std::io::stdout().is_terminal()),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dnsrevproxy=info,dns_reverse_proxy=info".into()),
        )
        .init();
}

fn config_init(cli: Cli) -> Result<Shared> {
    let config = match cli.config {
        Some(config_file) => {
            tracing::debug!("loading config from {config_file}");
            Config::try_from_file(&config_file)?
        }
        None => Config::try_from_raw(RawConfig {
            address: cli.address,
            default: cli.default,
            routes: cli.routes,
            remaps: cli.remaps,
            allow_transfer: cli.allow_transfer,
            tcp_timeout: Duration::from_secs(cli.tcp_timeout),
            upstream_timeout: Duration::from_secs(cli.upstream_timeout),
        })?,
    };
    Ok(Arc::new(config))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("can't listen for SIGINT: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!("can't listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
