//! Offer/answer handshake with the realtime gateway.

use std::sync::Arc;

use reqwest::header::CONTENT_TYPE;
use tracing::{error, info};

use crate::{
    DEFAULT_GATEWAY_URL, DEFAULT_MODEL,
    credential::EphemeralKey,
    error::{Error, Result},
    transport::{PeerConfig, PeerTransport},
};

const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Where and how the SDP offer is posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub url: String,
    /// Sent as the `model` query parameter.
    pub model: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_GATEWAY_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// An SDP blob tagged with the side that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    kind: SdpKind,
    sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }

    pub fn kind(&self) -> SdpKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.sdp
    }
}

/// Drives the three handshake steps against one [`PeerTransport`].
///
/// Only [`SessionNegotiator::exchange_with_gateway`] touches the network; the
/// other two steps are local to the device. Nothing is retried.
pub struct SessionNegotiator {
    transport: Arc<dyn PeerTransport>,
    http: reqwest::Client,
    gateway: GatewayConfig,
    peer: PeerConfig,
}

impl SessionNegotiator {
    pub fn new(transport: Arc<dyn PeerTransport>, gateway: GatewayConfig, peer: PeerConfig) -> Self {
        Self {
            transport,
            http: reqwest::Client::new(),
            gateway,
            peer,
        }
    }

    /// Uses `http` for the gateway exchange, e.g. to share a connection pool
    /// or enforce a request timeout.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn transport(&self) -> &Arc<dyn PeerTransport> {
        &self.transport
    }

    pub fn gateway(&self) -> &GatewayConfig {
        &self.gateway
    }

    /// Sets up the peer connection (ICE servers, local audio track, event
    /// data channel) and returns the applied local offer.
    pub async fn create_local_offer(&self) -> Result<SessionDescription> {
        self.transport.setup(&self.peer).await?;
        let sdp = self.transport.create_offer().await?;
        info!(bytes = sdp.len(), "Local SDP offer created");
        Ok(SessionDescription::offer(sdp))
    }

    /// Posts `offer` to the gateway and returns its answer verbatim.
    pub async fn exchange_with_gateway(
        &self,
        offer: &SessionDescription,
        key: &EphemeralKey,
    ) -> Result<SessionDescription> {
        if offer.kind() != SdpKind::Offer {
            return Err(Error::Negotiation(
                "only an offer can be sent to the gateway".to_string(),
            ));
        }

        info!(model = %self.gateway.model, "Exchanging SDP offer with realtime gateway");
        let response = self
            .http
            .post(&self.gateway.url)
            .query(&[("model", self.gateway.model.as_str())])
            .bearer_auth(key.expose())
            .header(CONTENT_TYPE, SDP_CONTENT_TYPE)
            .body(offer.as_str().to_owned())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Realtime gateway rejected the offer");
            return Err(Error::Gateway {
                status: status.as_u16(),
                body,
            });
        }

        let answer = response.text().await?;
        info!(status = status.as_u16(), bytes = answer.len(), "Received SDP answer");
        Ok(SessionDescription::answer(answer))
    }

    pub async fn apply_remote_answer(&self, answer: &SessionDescription) -> Result<()> {
        if answer.kind() != SdpKind::Answer {
            return Err(Error::Negotiation(
                "only an answer can be applied as the remote description".to_string(),
            ));
        }
        self.transport.set_remote_answer(answer.as_str()).await?;
        info!("Remote SDP answer applied");
        Ok(())
    }
}
