//! Transports for the ledger bus.

use ledger_core::bus::{Channel, Publisher};
use ledger_core::{ChainError, LedgerError};
use reqwest::header::CONTENT_TYPE;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::constants::{BUS_CHAIN_ROUTE, BUS_TRANSACTION_ROUTE};
use crate::state::NodeState;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub channel: Channel,
    pub payload: String,
}

/// In-process fan-out. Every subscriber, the publishing node included,
/// receives each payload.
#[derive(Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<Envelope>,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }
}

impl Publisher for LocalBus {
    fn publish(&self, channel: Channel, payload: String) {
        if self.sender.send(Envelope { channel, payload }).is_err() {
            debug!("no subscribers for {channel} payload");
        }
    }
}

/// Feed everything arriving on `rx` into `state` until the bus closes.
pub fn spawn_listener(state: NodeState, mut rx: broadcast::Receiver<Envelope>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(envelope) => deliver(&state, envelope).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("bus listener lagged; {skipped} payloads dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn deliver(state: &NodeState, envelope: Envelope) {
    match state.receive(envelope.channel, &envelope.payload).await {
        Ok(()) => {}
        // our own broadcasts come back to us
        Err(LedgerError::Chain(ChainError::ShorterOrEqualChain { .. })) => {}
        Err(e) => warn!("dropping {} payload: {e}", envelope.channel),
    }
}

/// Pushes payloads to peer nodes over HTTP.
#[derive(Clone, Debug)]
pub struct HttpBus {
    client: reqwest::Client,
    peers: Vec<String>,
}

impl HttpBus {
    pub fn new(peers: Vec<String>) -> Self {
        let peers = peers
            .into_iter()
            .map(|p| p.trim().trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self {
            client: reqwest::Client::new(),
            peers,
        }
    }

    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    fn route(channel: Channel) -> &'static str {
        match channel {
            Channel::Chain => BUS_CHAIN_ROUTE,
            Channel::Transaction => BUS_TRANSACTION_ROUTE,
        }
    }
}

impl Publisher for HttpBus {
    fn publish(&self, channel: Channel, payload: String) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime; {channel} payload not sent");
            return;
        };
        for peer in &self.peers {
            let url = format!("{peer}{}", Self::route(channel));
            let request = self
                .client
                .post(url.clone())
                .header(CONTENT_TYPE, "application/json")
                .body(payload.clone());
            runtime.spawn(async move {
                match request.send().await {
                    Ok(res) if res.status().is_success() => debug!("delivered {channel} to {url}"),
                    Ok(res) => debug!("{url} answered {} to {channel} payload", res.status()),
                    Err(e) => warn!("could not deliver {channel} to {url}: {e}"),
                }
            });
        }
    }
}
