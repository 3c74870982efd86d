use crate::{
    forwarder::{client::HttpClientPool, ForwardingRequest},
    jsonrpc::{JsonRpcResponse, JsonRpcResponseTy},
    metrics::FORWARDER_METRICS,
};
use alloy_primitives::B256;
use futures::{stream::FuturesUnordered, StreamExt};
use hyper::StatusCode;
use reqwest::Url;
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::{Duration, Instant},
};
use tokio::sync::mpsc;
use tracing::*;

pub fn spawn_http_forwarder(
    name: String,
    url: String,
    client: HttpClientPool, // request client to be reused for http senders
) -> eyre::Result<mpsc::UnboundedSender<Arc<ForwardingRequest>>> {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    match Url::parse(&url)?.scheme() {
        "http" | "https" => {
            info!(target: "forwarder", name, %url, "spawning http forwarder");
            let (forwarder, decoder) = HttpForwarder::new(client, name, url, request_rx);
            tokio::spawn(forwarder);
            tokio::spawn(decoder.run());
        }

        scheme => {
            error!(target: "forwarder", %scheme, %url, relay = %name, "Unsupported URL scheme");
            eyre::bail!("unsupported url scheme {scheme}. url: {url}. relay: {name}")
        }
    }
    Ok(request_tx)
}

/// The response received by the [`HttpForwarder`] after sending a request.
#[derive(Debug)]
struct ForwarderResponse<Ok, Err> {
    /// The hash of the payload forwarded.
    hash: B256,
    /// The instant at which request was sent.
    start_time: Instant,
    /// Relay response.
    response: Result<Ok, Err>,
}

type RequestFut<Ok, Err> = Pin<Box<dyn Future<Output = ForwarderResponse<Ok, Err>> + Send>>;

/// An HTTP forwarder that relays requests to a single downstream target.
///
/// Implemented as a future: it continuously drains completed relay calls and
/// accepts new requests from its channel. In-flight calls are independent and
/// are never cancelled by a sibling's failure.
struct HttpForwarder {
    client: HttpClientPool,
    /// The name of the relay we're forwarding to.
    relay_name: String,
    /// The URL of the relay.
    relay_url: String,
    /// The receiver of forwarding requests.
    request_rx: mpsc::UnboundedReceiver<Arc<ForwardingRequest>>,
    /// The sender to decode [`reqwest::Response`] errors.
    error_decoder_tx: mpsc::Sender<ErrorDecoderInput>,
    /// The pending responses that need to be processed.
    pending: FuturesUnordered<RequestFut<reqwest::Response, reqwest::Error>>,
}

impl HttpForwarder {
    fn new(
        client: HttpClientPool,
        name: String,
        url: String,
        request_rx: mpsc::UnboundedReceiver<Arc<ForwardingRequest>>,
    ) -> (Self, ResponseErrorDecoder) {
        let (error_decoder_tx, error_decoder_rx) = mpsc::channel(8192);
        let decoder = ResponseErrorDecoder {
            relay_name: name.clone(),
            relay_url: url.clone(),
            rx: error_decoder_rx,
        };

        (
            Self {
                client,
                relay_name: name,
                relay_url: url,
                request_rx,
                pending: FuturesUnordered::new(),
                error_decoder_tx,
            },
            decoder,
        )
    }

    /// Send an HTTP request to the relay, returning a future that resolves to the response.
    fn send_http_request(
        &self,
        request: Arc<ForwardingRequest>,
    ) -> RequestFut<reqwest::Response, reqwest::Error> {
        let client_pool = self.client.clone();
        let relay_url = self.relay_url.clone();

        let fut = async move {
            let hash = request.hash;
            trace!(target: "forwarder", %hash, e2e = ?request.received_at.elapsed(), "dispatching request");

            // Try to avoid cloning the body and headers if there is only one reference.
            let (body, headers) = Arc::try_unwrap(request).map_or_else(
                |req| ((*req.body).clone(), req.headers.clone()),
                |inner| {
                    (Arc::try_unwrap(inner.body).unwrap_or_else(|b| (*b).clone()), inner.headers)
                },
            );

            let start_time = Instant::now();
            let response =
                client_pool.client().post(relay_url).body(body).headers(headers).send().await;
            trace!(target: "forwarder", elapsed = ?start_time.elapsed(), "received response");

            ForwarderResponse { hash, start_time, response }
        };

        Box::pin(fut)
    }

    fn on_response(&mut self, response: ForwarderResponse<reqwest::Response, reqwest::Error>) {
        let ForwarderResponse { hash, start_time, response: response_result } = response;
        let elapsed = start_time.elapsed();

        match response_result {
            Ok(response) => {
                let status = response.status();

                // Print warning if the RPC call took more than 1 second.
                if elapsed > Duration::from_secs(1) {
                    warn!(target: "forwarder", relay = %self.relay_name, ?elapsed, "long rpc call");
                }

                if status.is_success() {
                    trace!(target: "forwarder", relay = %self.relay_name, %hash, ?status, "received success response");

                    if status != StatusCode::OK {
                        warn!(target: "forwarder", relay = %self.relay_name, ?status, "non-ok status code");
                    }

                    // Only record success if the status is OK.
                    FORWARDER_METRICS
                        .rpc_call_duration
                        .with_label_values(&[self.relay_name.as_str()])
                        .observe(elapsed.as_secs_f64());
                } else {
                    // If we have a non-OK status code, also record it.
                    error!(target: "forwarder", relay = %self.relay_name, %hash, ?status, "failed to forward request");
                    let reason =
                        status.canonical_reason().map(String::from).unwrap_or(status.to_string());

                    FORWARDER_METRICS
                        .http_call_failures
                        .with_label_values(&[self.relay_name.as_str(), reason.as_str()])
                        .inc();

                    if let Err(e) =
                        self.error_decoder_tx.try_send(ErrorDecoderInput::new(hash, response))
                    {
                        error!(target: "forwarder", ?e, "failed to send error response to decoder");
                    }
                }
            }
            Err(error) => {
                error!(target: "forwarder", relay = %self.relay_name, %hash, "error forwarding request");

                // Parse the reason, which is either the status code reason of the error message
                // itself. If the request fails for non-network reasons, the status code may be
                // None.
                let reason = error
                    .status()
                    .and_then(|s| s.canonical_reason().map(String::from))
                    .unwrap_or(format!("{error:?}"));

                if error.is_connect() {
                    warn!(target: "forwarder", ?reason, "connection error");
                    FORWARDER_METRICS
                        .http_connect_failures
                        .with_label_values(&[self.relay_name.as_str()])
                        .inc();
                } else {
                    FORWARDER_METRICS
                        .http_call_failures
                        .with_label_values(&[self.relay_name.as_str(), reason.as_str()])
                        .inc();
                }
            }
        }
    }
}

impl Future for HttpForwarder {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        loop {
            // First poll for completed work.
            if let Poll::Ready(Some(response)) = this.pending.poll_next_unpin(cx) {
                this.on_response(response);
                continue;
            }

            // Then accept new requests.
            if let Poll::Ready(maybe_request) = this.request_rx.poll_recv(cx) {
                let Some(request) = maybe_request else {
                    info!(target: "forwarder", name = %this.relay_name, "terminating forwarder");
                    return Poll::Ready(());
                };

                let fut = this.send_http_request(request);
                this.pending.push(fut);

                FORWARDER_METRICS
                    .inflight_requests
                    .with_label_values(&[this.relay_name.as_str()])
                    .set(this.pending.len() as i64);
                continue;
            }

            return Poll::Pending;
        }
    }
}

/// The input to the error decoder, containing the response to the request and its associated
/// payload hash.
#[derive(Debug)]
pub struct ErrorDecoderInput {
    /// The hash of the payload forwarded.
    pub hash: B256,
    /// The error response to be decoded.
    pub response: reqwest::Response,
}

impl ErrorDecoderInput {
    /// Create a new error decoder input.
    pub fn new(hash: B256, response: reqwest::Response) -> Self {
        Self { hash, response }
    }
}

/// A [`reqwest::Response`] error decoder, associated to a certain [`HttpForwarder`], which traces
/// errors from relay error responses.
#[derive(Debug)]
pub struct ResponseErrorDecoder {
    /// The name of the relay.
    pub relay_name: String,
    /// The url of the relay.
    pub relay_url: String,
    /// The receiver of the error responses.
    pub rx: mpsc::Receiver<ErrorDecoderInput>,
}

impl ResponseErrorDecoder {
    async fn decode(&self, input: ErrorDecoderInput) {
        match input.response.json::<JsonRpcResponse<serde_json::Value>>().await {
            Ok(body) => {
                if let JsonRpcResponseTy::Error { code, message } = body.result_or_error {
                    error!(
                        target: "forwarder",
                        relay = %self.relay_name,
                        url = %self.relay_url,
                        hash = %input.hash,
                        %code,
                        %message,
                        "decoded error response from relay"
                    );
                    FORWARDER_METRICS
                        .rpc_call_failures
                        .with_label_values(&[self.relay_name.as_str(), code.to_string().as_str()])
                        .inc();
                }
            }
            Err(e) => {
                warn!(target: "forwarder", relay = %self.relay_name, ?e, "failed to decode response into json-rpc");
                FORWARDER_METRICS
                    .json_rpc_decoding_failures
                    .with_label_values(&[self.relay_name.as_str()])
                    .inc();
            }
        }
    }

    /// Run the error decoder actor in loop.
    pub async fn run(mut self) {
        while let Some(input) = self.rx.recv().await {
            self.decode(input).await;
        }
    }
}

#[cfg(test)]
mod test {
    use reqwest::Url;

    #[test]
    fn parse_url_scheme() {
        assert_eq!(Url::parse("http://127.0.0.1:8080").unwrap().scheme(), "http");
        assert_eq!(Url::parse("https://127.0.0.1:8080").unwrap().scheme(), "https");
    }
}
