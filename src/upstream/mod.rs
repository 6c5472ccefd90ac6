//! Outbound exchanges with upstream DNS servers.
//!
//! The [`Exchanger`] trait is the seam between the proxy logic and the network. The proxy only
//! ever asks for one of two things: a single query/answer exchange over the transport the client
//! used, or a complete zone transfer over TCP. [`NetworkExchanger`] implements both with plain
//! tokio sockets.

use crate::error::Error;
use std::fmt;
use std::sync::Arc;
use trust_dns_proto::op::Message;

mod network;

pub use network::NetworkExchanger;

/// How a client reached the proxy, and so how its query is forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// TCP.
    Stream,
    /// UDP.
    Datagram,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Stream => write!(f, "tcp"),
            Transport::Datagram => write!(f, "udp"),
        }
    }
}

/// `DynExchanger` is a type alias for an [`Exchanger`] shared by every request handler.
pub type DynExchanger = Arc<dyn Exchanger + Send + Sync>;

#[async_trait::async_trait]
pub trait Exchanger {
    /// Send `query` to `upstream` (`host:port`) over `transport` and return its answer.
    ///
    /// An answer with the TC bit set is returned as [`Error::Truncated`].
    async fn exchange(
        &self,
        upstream: &str,
        transport: Transport,
        query: &Message,
    ) -> Result<Message, Error>;

    /// Run the zone transfer `query` against `upstream` and return every message of the
    /// transfer, in order. Only returns once the transfer is complete.
    async fn transfer(&self, upstream: &str, query: &Message) -> Result<Vec<Message>, Error>;
}
