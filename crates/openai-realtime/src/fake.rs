//! In-memory doubles for the transport traits and the realtime gateway.
//!
//! Compiled for this crate's tests and for downstream crates that enable the
//! `test-util` feature.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use axum::{
    Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    routing::post,
};
use openai_realtime_types::EVENTS_CHANNEL_LABEL;
use tokio::{net::TcpListener, sync::Notify, task::JoinHandle};

use crate::{
    error::{Error, Result},
    transport::{DataChannel, MessageHandler, PeerConfig, PeerTransport},
};

/// A transport step that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeStep {
    Setup,
    Offer,
    RemoteAnswer,
}

#[derive(Default)]
struct FakeState {
    live: bool,
    peer_config: Option<PeerConfig>,
    remote_answer: Option<String>,
}

/// Records every call and hands out a [`FakeDataChannel`].
pub struct FakeTransport {
    state: Mutex<FakeState>,
    channel: Arc<FakeDataChannel>,
    fail_at: Option<FakeStep>,
    offer_gate: Option<Arc<Notify>>,
    setups: AtomicUsize,
    offers: AtomicUsize,
    answers: AtomicUsize,
    releases: AtomicUsize,
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            channel: Arc::new(FakeDataChannel::new(EVENTS_CHANNEL_LABEL)),
            fail_at: None,
            offer_gate: None,
            setups: AtomicUsize::new(0),
            offers: AtomicUsize::new(0),
            answers: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        }
    }

    pub fn fail_at(mut self, step: FakeStep) -> Self {
        self.fail_at = Some(step);
        self
    }

    /// Makes `create_offer` wait for a permit on `gate` after it has been
    /// counted.
    pub fn with_offer_gate(mut self, gate: Arc<Notify>) -> Self {
        self.offer_gate = Some(gate);
        self
    }

    pub fn channel(&self) -> Arc<FakeDataChannel> {
        Arc::clone(&self.channel)
    }

    pub fn setup_calls(&self) -> usize {
        self.setups.load(Ordering::SeqCst)
    }

    pub fn offer_calls(&self) -> usize {
        self.offers.load(Ordering::SeqCst)
    }

    pub fn answer_calls(&self) -> usize {
        self.answers.load(Ordering::SeqCst)
    }

    /// How many times `close` actually released a live connection.
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn is_live(&self) -> bool {
        self.lock().live
    }

    pub fn peer_config(&self) -> Option<PeerConfig> {
        self.lock().peer_config.clone()
    }

    pub fn remote_answer(&self) -> Option<String> {
        self.lock().remote_answer.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self, step: FakeStep) -> Result<()> {
        if self.fail_at == Some(step) {
            return Err(Error::Negotiation(format!("injected {:?} failure", step)));
        }
        Ok(())
    }
}

#[async_trait]
impl PeerTransport for FakeTransport {
    async fn setup(&self, config: &PeerConfig) -> Result<()> {
        self.setups.fetch_add(1, Ordering::SeqCst);
        self.check(FakeStep::Setup)?;
        let mut state = self.lock();
        state.live = true;
        state.peer_config = Some(config.clone());
        state.remote_answer = None;
        self.channel.set_open(true);
        Ok(())
    }

    async fn create_offer(&self) -> Result<String> {
        self.offers.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.offer_gate {
            gate.notified().await;
        }
        self.check(FakeStep::Offer)?;
        if !self.is_live() {
            return Err(Error::Negotiation("peer connection is not set up".to_string()));
        }
        Ok("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=fake offer\r\n".to_string())
    }

    async fn set_remote_answer(&self, sdp: &str) -> Result<()> {
        self.answers.fetch_add(1, Ordering::SeqCst);
        self.check(FakeStep::RemoteAnswer)?;
        self.lock().remote_answer = Some(sdp.to_string());
        Ok(())
    }

    async fn data_channel(&self) -> Option<Arc<dyn DataChannel>> {
        if self.is_live() {
            Some(Arc::clone(&self.channel) as Arc<dyn DataChannel>)
        } else {
            None
        }
    }

    async fn close(&self) {
        let was_live = std::mem::take(&mut self.lock().live);
        if was_live {
            self.channel.set_open(false);
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// A data channel that records outbound frames and lets tests push inbound
/// ones through the registered handler.
pub struct FakeDataChannel {
    label: String,
    open: AtomicBool,
    sent: Mutex<Vec<String>>,
    handler: Mutex<Option<MessageHandler>>,
    closes: AtomicUsize,
}

impl FakeDataChannel {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            open: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
            handler: Mutex::new(None),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    pub fn has_handler(&self) -> bool {
        self.handler
            .lock()
            .map(|handler| handler.is_some())
            .unwrap_or(false)
    }

    /// Hands `payload` to the registered handler. Returns `false` if none is
    /// registered.
    pub fn deliver(&self, payload: &str) -> bool {
        match self.handler.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(handler) => {
                    handler(payload.to_string());
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataChannel for FakeDataChannel {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send_text(&self, payload: &str) -> Result<()> {
        if !self.is_open() {
            return Err(Error::Channel("channel is closed".to_string()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(payload.to_string());
        }
        Ok(())
    }

    fn set_message_handler(&self, handler: Option<MessageHandler>) {
        if let Ok(mut slot) = self.handler.lock() {
            *slot = handler;
        }
    }

    async fn close(&self) {
        self.set_open(false);
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// One SDP exchange as seen by [`FakeGateway`].
#[derive(Debug, Clone, Default)]
pub struct GatewayRequest {
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub model: Option<String>,
    pub body: String,
}

#[derive(Clone)]
struct GatewayState {
    status: StatusCode,
    body: String,
    requests: Arc<Mutex<Vec<GatewayRequest>>>,
}

/// A local HTTP server that answers SDP offers with a canned response.
pub struct FakeGateway {
    url: String,
    requests: Arc<Mutex<Vec<GatewayRequest>>>,
    server: JoinHandle<()>,
}

impl FakeGateway {
    /// Answers every offer with `201 Created` and `answer` as the body.
    pub async fn answering(answer: &str) -> std::io::Result<Self> {
        Self::start(StatusCode::CREATED, answer).await
    }

    pub async fn failing(status: u16, body: &str) -> std::io::Result<Self> {
        let status = StatusCode::from_u16(status)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        Self::start(status, body).await
    }

    async fn start(status: StatusCode, body: &str) -> std::io::Result<Self> {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = GatewayState {
            status,
            body: body.to_string(),
            requests: Arc::clone(&requests),
        };
        let app = Router::new()
            .route("/v1/realtime", post(exchange))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("http://{}/v1/realtime", listener.local_addr()?);
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            url,
            requests,
            server,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn requests(&self) -> Vec<GatewayRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

impl Drop for FakeGateway {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn exchange(
    State(state): State<GatewayState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    let request = GatewayRequest {
        authorization: header_value(header::AUTHORIZATION),
        content_type: header_value(header::CONTENT_TYPE),
        model: query.get("model").cloned(),
        body,
    };
    if let Ok(mut requests) = state.requests.lock() {
        requests.push(request);
    }
    (state.status, state.body)
}
