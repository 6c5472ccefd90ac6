use crate::dns::server::InFlight;
use crate::error::Error;
use crate::proxy::{Client, Proxy, Reply};
use crate::upstream::Transport;
use tracing::{debug, error};
use trust_dns_proto::op::{Header, Message, ResponseCode};
use trust_dns_server::authority::MessageResponseBuilder;
use trust_dns_server::server::{
    Protocol, Request, RequestHandler, ResponseHandler, ResponseInfo,
};

#[derive(Clone)]
pub struct Handler {
    proxy: Proxy,
    in_flight: InFlight,
}

impl Handler {
    pub(super) fn new(proxy: Proxy, in_flight: InFlight) -> Self {
        Handler { proxy, in_flight }
    }

    fn transport(protocol: Protocol) -> Transport {
        match protocol {
            Protocol::Udp => Transport::Datagram,
            _ => Transport::Stream,
        }
    }

    /// Rebuild the client's query as a [`Message`] to forward upstream. Every section is kept:
    /// an IXFR carries the client's SOA in its authority section, and TSIG records travel in
    /// the additional section.
    fn query_message(request: &Request) -> Message {
        let header = request.header();
        let mut query = Message::new();
        query
            .set_id(header.id())
            .set_op_code(header.op_code())
            .set_recursion_desired(header.recursion_desired())
            .set_authentic_data(header.authentic_data())
            .set_checking_disabled(header.checking_disabled());
        query.add_query(request.query().original().clone());
        query
            .add_answers(request.answers().iter().cloned())
            .add_name_servers(request.name_servers().iter().cloned())
            .add_additionals(request.additionals().iter().cloned());
        if let Some(edns) = request.edns() {
            query.set_edns(edns.clone());
        }
        query
    }

    async fn send_reply<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
        reply: Reply,
    ) -> Result<ResponseInfo, Error> {
        match reply {
            Reply::Response(response) => {
                self.send_message(request, &mut response_handle, &response)
                    .await
            }
            Reply::Transfer(messages) => {
                let mut info = None;
                for message in &messages {
                    info = Some(
                        self.send_message(request, &mut response_handle, message)
                            .await?,
                    );
                }
                match info {
                    Some(info) => Ok(info),
                    None => self.send_servfail(request, response_handle).await,
                }
            }
            Reply::Failure(_) => self.send_servfail(request, response_handle).await,
        }
    }

    async fn send_message<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: &mut R,
        message: &Message,
    ) -> Result<ResponseInfo, Error> {
        let mut header = *message.header();
        header.set_id(request.header().id());
        let mut builder = MessageResponseBuilder::from_message_request(request);
        if let Some(edns) = message.extensions() {
            builder.edns(edns.clone());
        }
        let response = builder.build(
            header,
            message.answers().iter(),
            message.name_servers().iter(),
            &[],
            message.additionals().iter(),
        );
        Ok(response_handle.send_response(response).await?)
    }

    async fn send_servfail<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> Result<ResponseInfo, Error> {
        let response = MessageResponseBuilder::from_message_request(request);
        Ok(response_handle
            .send_response(response.error_msg(request.header(), ResponseCode::ServFail))
            .await?)
    }
}

#[async_trait::async_trait]
impl RequestHandler for Handler {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: R,
    ) -> ResponseInfo {
        let mut header = Header::new();
        header.set_response_code(ResponseCode::ServFail);

        let Some(_guard) = self.in_flight.enter() else {
            debug!("shutting down, dropping query from {}", request.src());
            return header.into();
        };

        let client = Client::new(request.src(), Self::transport(request.protocol()));
        let reply = self.proxy.serve(Self::query_message(request), &client).await;
        match self.send_reply(request, response_handle, reply).await {
            Ok(info) => info,
            Err(error) => {
                error!("error in RequestHandler: {:?}", error);
                header.into()
            }
        }
    }
}
