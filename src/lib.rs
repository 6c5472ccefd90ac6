//! DNS Reverse Proxy
//!
//! Like an HTTP reverse proxy, but for DNS. Queries arriving over UDP or TCP are sent to an
//! upstream DNS server picked by the longest matching domain suffix of the queried name, or to
//! a default upstream when no route matches. Domain suffixes can be remapped on the way out and
//! back in, and zone transfers (`AXFR`/`IXFR`) are restricted to an allow-list of client
//! addresses since the upstreams never see the real client.
//!
//! See [`dns`] for usage.
#![warn(clippy::pedantic)]

pub mod config;
pub mod dispatch;
pub mod dns;
pub mod error;
pub mod proxy;
pub mod suffix;
pub mod transfer;
pub mod upstream;

pub use config::{Config, RawConfig, Shared};
pub use dns::new as new_dns;
pub use proxy::{Client, Proxy, Reply};
pub use upstream::{DynExchanger, Exchanger, NetworkExchanger, Transport};
