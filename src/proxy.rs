//! The request pipeline shared by the UDP and TCP listeners.
//!
//! [`Proxy::serve`] takes one parsed query and the client it came from, and always produces
//! exactly one [`Reply`]: the upstream answer, a complete zone transfer, or a failure the
//! listener turns into SERVFAIL. Per-request errors never escape it.

use crate::config::Shared;
use crate::dispatch::{Dispatcher, Route};
use crate::error::{Error, ErrorKind};
use crate::transfer::{is_transfer_request, TransferGuard};
use crate::upstream::{DynExchanger, Transport};
use std::net::SocketAddr;
use tracing::{debug, error, info};
use trust_dns_proto::op::Message;

/// The client a query came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    /// Textual IP address, without port.
    pub addr: String,
    pub transport: Transport,
}

impl Client {
    #[must_use]
    pub fn new(addr: SocketAddr, transport: Transport) -> Self {
        Client {
            addr: addr.ip().to_string(),
            transport,
        }
    }
}

/// What to send back to the client.
#[derive(Debug)]
pub enum Reply {
    /// A single answer, possibly truncated.
    Response(Message),
    /// Every message of a completed zone transfer, in order.
    Transfer(Vec<Message>),
    /// The request failed. The client gets a generic failure indicator.
    Failure(Error),
}

#[derive(Clone)]
pub struct Proxy {
    dispatcher: Dispatcher,
    guard: TransferGuard,
    exchanger: DynExchanger,
}

impl Proxy {
    #[must_use]
    pub fn new(config: Shared, exchanger: DynExchanger) -> Self {
        Proxy {
            dispatcher: Dispatcher::new(config.clone()),
            guard: TransferGuard::new(config),
            exchanger,
        }
    }

    /// Handle one query from `client`.
    pub async fn serve(&self, query: Message, client: &Client) -> Reply {
        match self.dispatch(query, client).await {
            Ok(reply) => reply,
            Err(err) => {
                match err.kind() {
                    ErrorKind::Upstream => {
                        error!("query from {} ({}) failed: {err}", client.addr, client.transport);
                    }
                    ErrorKind::Authorization | ErrorKind::ProtocolViolation => {
                        info!("rejected query from {} ({}): {err}", client.addr, client.transport);
                    }
                    _ => debug!("dropped query from {}: {err}", client.addr),
                }
                Reply::Failure(err)
            }
        }
    }

    async fn dispatch(&self, mut query: Message, client: &Client) -> Result<Reply, Error> {
        // A query without a question is never a transfer, so it still fails in route().
        if !self.guard.authorize(&query, &client.addr) {
            return Err(Error::TransferForbidden(client.addr.clone()));
        }
        let route = self.dispatcher.route(&query)?;

        match &route.remap {
            Some(remap) => debug!(
                "{} {} {} remapped {} -> {}, to {}",
                client.addr, client.transport, route.name, remap.src, remap.dst, route.upstream
            ),
            None => debug!(
                "{} {} {} to {}",
                client.addr, client.transport, route.name, route.upstream
            ),
        }

        route.rewrite_query(&mut query);
        self.forward(&route, client.transport, query).await
    }

    /// Forward a dispatched query to its upstream and prepare the answer for the client.
    ///
    /// Zone transfers are only forwarded for TCP clients, and are buffered completely before
    /// anything is returned. A truncated answer is a normal outcome, relayed so the client can
    /// retry over TCP. Names under the remap destination are rewritten back under the remap
    /// source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransferOverDatagram`] for a zone transfer from a UDP client, or the
    /// error of the failed exchange.
    pub async fn forward(
        &self,
        route: &Route,
        transport: Transport,
        query: Message,
    ) -> Result<Reply, Error> {
        if is_transfer_request(&query) {
            if transport != Transport::Stream {
                return Err(Error::TransferOverDatagram);
            }
            let messages = self.exchanger.transfer(&route.upstream, &query).await?;
            return Ok(Reply::Transfer(messages));
        }

        let mut response = match self
            .exchanger
            .exchange(&route.upstream, transport, &query)
            .await
        {
            Ok(response) => response,
            Err(Error::Truncated(response)) => {
                debug!("relaying truncated response from {}", route.upstream);
                *response
            }
            Err(err) => return Err(err),
        };

        if let Some(remap) = &route.remap {
            remap.restore_response(&mut response)?;
        }
        Ok(Reply::Response(response))
    }
}
