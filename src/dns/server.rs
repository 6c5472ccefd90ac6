use crate::config::Shared;
use crate::dns::handlers::Handler;
use crate::proxy::Proxy;
use crate::upstream::DynExchanger;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::Notify;
use trust_dns_server::ServerFuture;

/// Bind the UDP socket and TCP listener on the configured address and build the server that
/// serves both with the same [`Proxy`].
///
/// # Errors
///
/// Returns an error if either socket can't be bound.
pub async fn new(
    config: Shared,
    exchanger: DynExchanger,
) -> anyhow::Result<(ServerFuture<Handler>, InFlight)> {
    let addr = config.listen_addr;
    let tcp_timeout = config.tcp_timeout;
    let in_flight = InFlight::default();
    let dns_handler = Handler::new(Proxy::new(config, exchanger), in_flight.clone());
    let mut dns_server = ServerFuture::new(dns_handler);
    dns_server.register_socket(UdpSocket::bind(addr).await?);
    dns_server.register_listener(TcpListener::bind(addr).await?, tcp_timeout);
    Ok((dns_server, in_flight))
}

/// Counts the queries being handled, so shutdown can wait for them.
#[derive(Clone, Default)]
pub struct InFlight {
    inner: Arc<InFlightState>,
}

#[derive(Default)]
struct InFlightState {
    count: AtomicUsize,
    draining: AtomicBool,
    idle: Notify,
}

/// Marks one query as in flight until dropped.
pub struct InFlightGuard {
    inner: Arc<InFlightState>,
}

impl InFlight {
    /// Register a new query, or return `None` once [`InFlight::drain`] has been called.
    #[must_use]
    pub fn enter(&self) -> Option<InFlightGuard> {
        self.inner.count.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard {
            inner: self.inner.clone(),
        };
        if self.inner.draining.load(Ordering::SeqCst) {
            return None;
        }
        Some(guard)
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.count.load(Ordering::SeqCst)
    }

    /// Refuse new queries and wait until every query in flight has been answered.
    pub async fn drain(&self) {
        self.inner.draining.store(true, Ordering::SeqCst);
        loop {
            let idle = self.inner.idle.notified();
            if self.count() == 0 {
                return;
            }
            idle.await;
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.inner.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}
