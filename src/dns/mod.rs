//! UDP and TCP DNS listeners.
//!
//! Both transports are bound on the same [`Config::listen_addr`][`crate::config::Config::listen_addr`]
//! and every query, whichever way it arrived, goes through the same
//! [`Proxy`][`crate::proxy::Proxy`]. Only the transport differs: UDP queries are forwarded over
//! UDP and TCP queries over TCP.
//!
//! E.g. started with:
//! ```bash
//! ❯ dns-reverse-proxy --address :5353 \
//!     --default 8.8.8.8:53 \
//!     --route .example.com.=8.8.4.4:53 \
//!     --allow-transfer 1.2.3.4,::1
//! ```
//!
//! A query for `example.net` or `example.com` goes to `8.8.8.8:53`, the default, while a query
//! for `subdomain.example.com` goes to `8.8.4.4:53`:
//!
//! ```bash
//! ❯ dig @127.0.0.1 -p 5353 +short subdomain.example.com A
//! ```
//!
//! # Remaps
//!
//! With `--remap old.com=new.com`, a query for `a.old.com` is sent upstream as `a.new.com`
//! (and routed as such). Names in the answer are rewritten back to `a.old.com` before the client
//! sees them.
//!
//! # Zone transfers
//!
//! The upstream servers only see the proxy's address, so `AXFR`/`IXFR` queries are only
//! forwarded for clients listed with `--allow-transfer`, and only over TCP. Everything else gets
//! `SERVFAIL`.
//!
//! # Truncation
//!
//! A truncated UDP answer from an upstream is relayed as is, with the TC bit set, so the client
//! can retry over TCP.
//!
//! # Shutdown
//!
//! On `SIGINT`/`SIGTERM` new queries are dropped and the process exits once every query already
//! being handled has been answered.

mod handlers;
pub mod server;

pub use handlers::Handler;
pub use server::{new, InFlight};
