use crate::error::Error;
use crate::transfer::TransferTracker;
use crate::upstream::{Exchanger, Transport};
use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use trust_dns_proto::op::{Message, Query};
use trust_dns_proto::rr::RecordType;

/// Largest UDP answer accepted from an upstream (EDNS sized).
const MAX_UDP_MESSAGE_SIZE: usize = 4096;

/// An [`Exchanger`] talking to upstreams over UDP and TCP sockets.
///
/// Every connect, read and write is bounded by the configured timeout. There is no retry: a
/// failed exchange is reported to the caller as is.
#[derive(Debug, Clone)]
pub struct NetworkExchanger {
    timeout: Duration,
}

impl NetworkExchanger {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        NetworkExchanger { timeout }
    }

    async fn timed<T>(
        &self,
        upstream: &str,
        op: impl Future<Output = io::Result<T>>,
    ) -> Result<T, Error> {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(res) => Ok(res?),
            Err(_) => Err(Error::UpstreamTimeout(upstream.to_string())),
        }
    }

    async fn resolve(&self, upstream: &str) -> Result<SocketAddr, Error> {
        self.timed(upstream, lookup_host(upstream))
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("no address for upstream {upstream}"),
                )
                .into()
            })
    }

    async fn exchange_udp(&self, upstream: &str, query: &[u8]) -> Result<Vec<u8>, Error> {
        let addr = self.resolve(upstream).await?;
        let local: SocketAddr = match addr {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(addr).await?;
        self.timed(upstream, socket.send(query)).await?;

        let mut buf = vec![0; MAX_UDP_MESSAGE_SIZE];
        let len = self.timed(upstream, socket.recv(&mut buf)).await?;
        buf.truncate(len);
        Ok(buf)
    }

    async fn connect(&self, upstream: &str) -> Result<TcpStream, Error> {
        let addr = self.resolve(upstream).await?;
        self.timed(upstream, TcpStream::connect(addr)).await
    }

    async fn write_frame(
        &self,
        upstream: &str,
        stream: &mut TcpStream,
        message: &[u8],
    ) -> Result<(), Error> {
        let len = u16::try_from(message.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "message too long for TCP")
        })?;
        let mut frame = Vec::with_capacity(message.len() + 2);
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(message);
        self.timed(upstream, stream.write_all(&frame)).await
    }

    async fn read_frame(&self, upstream: &str, stream: &mut TcpStream) -> Result<Vec<u8>, Error> {
        let mut len = [0; 2];
        self.timed(upstream, stream.read_exact(&mut len)).await?;
        let mut buf = vec![0; usize::from(u16::from_be_bytes(len))];
        self.timed(upstream, stream.read_exact(&mut buf)).await?;
        Ok(buf)
    }

    fn decode(upstream: &str, query: &Message, raw: &[u8]) -> Result<Message, Error> {
        let response = Message::from_vec(raw)?;
        if response.id() != query.id() {
            return Err(Error::UpstreamIdMismatch {
                upstream: upstream.to_string(),
                expected: query.id(),
                actual: response.id(),
            });
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl Exchanger for NetworkExchanger {
    async fn exchange(
        &self,
        upstream: &str,
        transport: Transport,
        query: &Message,
    ) -> Result<Message, Error> {
        let bytes = query.to_vec()?;
        let raw = match transport {
            Transport::Datagram => self.exchange_udp(upstream, &bytes).await?,
            Transport::Stream => {
                let mut stream = self.connect(upstream).await?;
                self.write_frame(upstream, &mut stream, &bytes).await?;
                self.read_frame(upstream, &mut stream).await?
            }
        };

        let response = Self::decode(upstream, query, &raw)?;
        if response.truncated() {
            return Err(Error::Truncated(Box::new(response)));
        }
        Ok(response)
    }

    async fn transfer(&self, upstream: &str, query: &Message) -> Result<Vec<Message>, Error> {
        let query_type = query
            .queries()
            .first()
            .map_or(RecordType::AXFR, Query::query_type);
        let mut stream = self.connect(upstream).await?;
        self.write_frame(upstream, &mut stream, &query.to_vec()?)
            .await?;

        let mut tracker = TransferTracker::new(query_type);
        let mut messages = Vec::new();
        loop {
            let raw = match self.read_frame(upstream, &mut stream).await {
                Ok(raw) => raw,
                Err(Error::IO(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(Error::TransferAborted {
                        upstream: upstream.to_string(),
                        reason: "connection closed before the transfer completed".to_string(),
                    })
                }
                Err(err) => return Err(err),
            };
            let message = Self::decode(upstream, query, &raw)?;
            let done = tracker
                .observe(&message)
                .map_err(|reason| Error::TransferAborted {
                    upstream: upstream.to_string(),
                    reason,
                })?;
            messages.push(message);
            if done {
                tracing::debug!(
                    "transfer from {upstream} complete after {} messages",
                    messages.len()
                );
                return Ok(messages);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tokio::net::TcpListener;
    use trust_dns_proto::op::{MessageType, ResponseCode};
    use trust_dns_proto::rr::rdata::SOA;
    use trust_dns_proto::rr::{Name, RData, Record};

    fn name(s: &str) -> Name {
        Name::from_str(s).unwrap()
    }

    fn query(id: u16, host: &str, record_type: RecordType) -> Message {
        let mut message = Message::new();
        message.set_id(id);
        message.add_query(Query::query(name(host), record_type));
        message
    }

    fn answer(query: &Message, records: Vec<Record>) -> Message {
        let mut response = Message::new();
        response
            .set_id(query.id())
            .set_message_type(MessageType::Response);
        response.add_queries(query.queries().to_vec());
        response.add_answers(records);
        response
    }

    fn a(host: &str) -> Record {
        Record::from_rdata(name(host), 60, RData::A(Ipv4Addr::new(192, 0, 2, 1)))
    }

    fn soa(serial: u32) -> Record {
        Record::from_rdata(
            name("example.com."),
            3600,
            RData::SOA(SOA::new(
                name("ns1.example.com."),
                name("admin.example.com."),
                serial,
                86_400,
                7_200,
                3_600_000,
                172_800,
            )),
        )
    }

    async fn udp_upstream(reply: impl FnOnce(Message) -> Message + Send + 'static) -> String {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = vec![0; MAX_UDP_MESSAGE_SIZE];
            let (len, peer) = socket.recv_from(&mut buf).await.unwrap();
            let response = reply(Message::from_vec(&buf[..len]).unwrap());
            socket
                .send_to(&response.to_vec().unwrap(), peer)
                .await
                .unwrap();
        });
        addr.to_string()
    }

    async fn tcp_upstream(
        frames: impl FnOnce(Message) -> Vec<Message> + Send + 'static,
    ) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut len = [0; 2];
            stream.read_exact(&mut len).await.unwrap();
            let mut buf = vec![0; usize::from(u16::from_be_bytes(len))];
            stream.read_exact(&mut buf).await.unwrap();
            for message in frames(Message::from_vec(&buf).unwrap()) {
                let bytes = message.to_vec().unwrap();
                let len = u16::try_from(bytes.len()).unwrap();
                stream.write_all(&len.to_be_bytes()).await.unwrap();
                stream.write_all(&bytes).await.unwrap();
            }
        });
        addr.to_string()
    }

    fn exchanger() -> NetworkExchanger {
        NetworkExchanger::new(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn udp_exchange() {
        let upstream =
            udp_upstream(|q| answer(&q, vec![a("www.example.com.")])).await;
        let response = exchanger()
            .exchange(
                &upstream,
                Transport::Datagram,
                &query(7, "www.example.com.", RecordType::A),
            )
            .await
            .unwrap();
        assert_eq!(response.id(), 7);
        assert_eq!(response.answers().len(), 1);
    }

    #[tokio::test]
    async fn udp_truncation_is_reported_with_the_answer() {
        let upstream = udp_upstream(|q| {
            let mut response = answer(&q, vec![]);
            response.set_truncated(true);
            response
        })
        .await;
        let err = exchanger()
            .exchange(
                &upstream,
                Transport::Datagram,
                &query(8, "big.example.com.", RecordType::TXT),
            )
            .await
            .unwrap_err();
        match err {
            Error::Truncated(response) => {
                assert!(response.truncated());
                assert_eq!(response.id(), 8);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn udp_id_mismatch() {
        let upstream = udp_upstream(|q| {
            let mut response = answer(&q, vec![]);
            response.set_id(q.id().wrapping_add(1));
            response
        })
        .await;
        let err = exchanger()
            .exchange(
                &upstream,
                Transport::Datagram,
                &query(9, "www.example.com.", RecordType::A),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpstreamIdMismatch { expected: 9, .. }));
    }

    #[tokio::test]
    async fn udp_timeout() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let upstream = socket.local_addr().unwrap().to_string();
        let err = NetworkExchanger::new(Duration::from_millis(100))
            .exchange(
                &upstream,
                Transport::Datagram,
                &query(10, "www.example.com.", RecordType::A),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpstreamTimeout(_)));
        drop(socket);
    }

    #[tokio::test]
    async fn tcp_exchange() {
        let upstream =
            tcp_upstream(|q| vec![answer(&q, vec![a("www.example.com.")])]).await;
        let response = exchanger()
            .exchange(
                &upstream,
                Transport::Stream,
                &query(11, "www.example.com.", RecordType::A),
            )
            .await
            .unwrap();
        assert_eq!(response.id(), 11);
        assert_eq!(response.answers()[0].name(), &name("www.example.com."));
    }

    #[tokio::test]
    async fn axfr_collects_every_message() {
        let upstream = tcp_upstream(|q| {
            vec![
                answer(&q, vec![soa(2023), a("www.example.com.")]),
                answer(&q, vec![a("mail.example.com.")]),
                answer(&q, vec![soa(2023)]),
            ]
        })
        .await;
        let messages = exchanger()
            .transfer(&upstream, &query(12, "example.com.", RecordType::AXFR))
            .await
            .unwrap();
        assert_eq!(messages.len(), 3);
    }

    #[tokio::test]
    async fn axfr_closed_early_is_aborted() {
        let upstream =
            tcp_upstream(|q| vec![answer(&q, vec![soa(2023), a("www.example.com.")])]).await;
        let err = exchanger()
            .transfer(&upstream, &query(13, "example.com.", RecordType::AXFR))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TransferAborted { .. }));
    }

    #[tokio::test]
    async fn ixfr_sends_the_client_serial_and_collects_the_diffs() {
        let upstream = tcp_upstream(|q| {
            if q.name_servers().is_empty() {
                let mut formerr = answer(&q, vec![]);
                formerr.set_response_code(ResponseCode::FormErr);
                return vec![formerr];
            }
            vec![
                answer(&q, vec![soa(2024), soa(2023), a("old.example.com.")]),
                answer(&q, vec![soa(2024), a("new.example.com.")]),
                answer(&q, vec![soa(2024)]),
            ]
        })
        .await;
        let mut ixfr = query(14, "example.com.", RecordType::IXFR);
        ixfr.add_name_server(soa(2023));
        let messages = exchanger().transfer(&upstream, &ixfr).await.unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].answers()[1].name(), &name("new.example.com."));
    }

    #[tokio::test]
    async fn ixfr_up_to_date_is_a_single_soa() {
        let upstream = tcp_upstream(|q| vec![answer(&q, vec![soa(2023)])]).await;
        let mut ixfr = query(15, "example.com.", RecordType::IXFR);
        ixfr.add_name_server(soa(2023));
        let messages = exchanger().transfer(&upstream, &ixfr).await.unwrap();
        assert_eq!(messages.len(), 1);
    }
}
