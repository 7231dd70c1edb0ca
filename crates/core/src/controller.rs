//! Session Controller
//!
//! Owns the lifecycle of one realtime voice session: token acquisition, the
//! three-step SDP handshake, the event channel, speaker routing and teardown.
//! It is the single writer of [`UiState`]; observers get a read-only
//! [`watch::Receiver`] via [`SessionController::subscribe`].
//!
//! Every `connect`, `disconnect` and `reset` starts a new session epoch. Work
//! still in flight from an older epoch (a pending handshake step, a queued
//! server event, a report being saved) never writes UI state.

use std::{
    sync::{
        Arc, Mutex as StdMutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use openai_realtime::{
    EventChannel, SessionNegotiator,
    types::{ClientEvent, ServerEvent},
};
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::{
    Command,
    collaborators::{AudioOutput, ProgressStore, TokenProvider},
    conversation::{SessionContext, reduce},
    error::SessionError,
    report::ProgressReport,
    state::{ConnectionState, UiState},
};

/// User message that asks the agent for its final report.
pub const DEFAULT_REPORT_TRIGGER: &str =
    "Thank you for your time. Please generate the final report of our conversation now.";

pub const STATUS_REQUESTING_TOKEN: &str = "Requesting session token...";
pub const STATUS_CONNECTING: &str = "Connecting to the conversation...";
pub const STATUS_CONNECTED: &str = "Connected. The conversation has started.";
pub const STATUS_FINALIZING: &str = "Finishing up and generating the final report...";
pub const STATUS_REPORT_SAVED: &str = "Final report generated.";
pub const STATUS_DISCONNECTED: &str = "Disconnected.";

/// Tunables of a [`SessionController`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Upper bound on a whole `connect` call. `None` leaves timing to the
    /// HTTP client and the native transport.
    pub connect_timeout: Option<Duration>,
    /// Text of the synthetic user message sent by `request_final_report`.
    pub report_trigger: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            report_trigger: DEFAULT_REPORT_TRIGGER.to_string(),
        }
    }
}

/// External services a session calls out to.
pub struct Collaborators {
    pub tokens: Arc<dyn TokenProvider>,
    pub progress: Arc<dyn ProgressStore>,
    pub audio: Arc<dyn AudioOutput>,
}

enum ConnectOutcome {
    Connected,
    /// A reset or disconnect started a newer epoch mid-handshake.
    Superseded,
}

pub struct SessionController {
    negotiator: SessionNegotiator,
    tokens: Arc<dyn TokenProvider>,
    progress: Arc<dyn ProgressStore>,
    audio: Arc<dyn AudioOutput>,
    settings: SessionSettings,
    ui: watch::Sender<UiState>,
    channel: Mutex<Option<EventChannel>>,
    epoch: AtomicU64,
    speaker_on: AtomicBool,
    connected_at: StdMutex<Option<DateTime<Utc>>>,
}

impl SessionController {
    pub fn new(
        negotiator: SessionNegotiator,
        collaborators: Collaborators,
        settings: SessionSettings,
    ) -> Arc<Self> {
        let (ui, _) = watch::channel(UiState::default());
        Arc::new(Self {
            negotiator,
            tokens: collaborators.tokens,
            progress: collaborators.progress,
            audio: collaborators.audio,
            settings,
            ui,
            channel: Mutex::new(None),
            epoch: AtomicU64::new(0),
            speaker_on: AtomicBool::new(false),
            connected_at: StdMutex::new(None),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<UiState> {
        self.ui.subscribe()
    }

    /// A snapshot of the current UI state.
    pub fn state(&self) -> UiState {
        self.ui.borrow().clone()
    }

    /// Establishes a session configured by `instructions`.
    ///
    /// Never returns an error: every failure ends in
    /// [`ConnectionState::Error`] with all partially acquired resources
    /// released. Callers must not start a second `connect` while one is
    /// running or connected.
    pub async fn connect(self: &Arc<Self>, instructions: &str) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        info!(epoch, model = %self.negotiator.gateway().model, "Starting session");

        let attempt = self.establish(epoch, instructions);
        let result = match self.settings.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, attempt)
                .await
                .unwrap_or_else(|_| {
                    Err(SessionError::Timeout(format!(
                        "connect did not finish within {:?}",
                        limit
                    )))
                }),
            None => attempt.await,
        };

        match result {
            Ok(ConnectOutcome::Connected) => info!(epoch, "Session connected"),
            Ok(ConnectOutcome::Superseded) => {
                info!(epoch, "Connect superseded, releasing its resources");
                self.release_if_inactive().await;
            }
            Err(e) => {
                error!(epoch, error = %e, "Failed to start session");
                let message = format!("Failed to start: {}", e);
                if self.update_if_current(epoch, |state| state.fail(message)) {
                    self.disconnect().await;
                } else {
                    self.release_if_inactive().await;
                }
            }
        }
    }

    async fn establish(
        self: &Arc<Self>,
        epoch: u64,
        instructions: &str,
    ) -> Result<ConnectOutcome, SessionError> {
        let fresh = self.update_if_current(epoch, |state| {
            *state = UiState {
                connection_state: ConnectionState::RequestingToken,
                status_message: STATUS_REQUESTING_TOKEN.to_string(),
                ..UiState::default()
            };
        });
        if !fresh {
            return Ok(ConnectOutcome::Superseded);
        }

        let key = self.tokens.ephemeral_key(instructions).await?;
        let connecting = self.update_if_current(epoch, |state| {
            state.connection_state = ConnectionState::Connecting;
            state.status_message = STATUS_CONNECTING.to_string();
        });
        if !connecting {
            return Ok(ConnectOutcome::Superseded);
        }

        let offer = self.negotiator.create_local_offer().await?;
        if !self.is_current(epoch) {
            return Ok(ConnectOutcome::Superseded);
        }
        // The key is spent on this single exchange.
        let answer = self.negotiator.exchange_with_gateway(&offer, &key).await?;
        drop(key);
        if !self.is_current(epoch) {
            return Ok(ConnectOutcome::Superseded);
        }
        self.negotiator.apply_remote_answer(&answer).await?;

        let channel = self
            .negotiator
            .transport()
            .data_channel()
            .await
            .ok_or_else(|| SessionError::Negotiation("data channel missing after setup".into()))?;
        let (sink, events) = mpsc::unbounded_channel();
        {
            let mut slot = self.channel.lock().await;
            if !self.is_current(epoch) {
                return Ok(ConnectOutcome::Superseded);
            }
            *slot = Some(EventChannel::open(channel, sink));
        }
        self.spawn_event_pump(epoch, events);

        *self.connected_at_slot() = Some(Utc::now());
        self.audio.set_speaker_enabled(true);
        self.speaker_on.store(true, Ordering::SeqCst);

        let connected = self.update_if_current(epoch, |state| {
            state.connection_state = ConnectionState::Connected;
            state.status_message = STATUS_CONNECTED.to_string();
        });
        if !connected {
            return Ok(ConnectOutcome::Superseded);
        }
        Ok(ConnectOutcome::Connected)
    }

    /// Asks the agent for its final report.
    ///
    /// Sends the trigger message followed by `response.create`; the gateway
    /// only calls `generate_final_report` in response to that pair. Without
    /// an open channel the request is dropped.
    pub async fn request_final_report(&self) -> Result<(), SessionError> {
        let slot = self.channel.lock().await;
        let Some(channel) = slot.as_ref() else {
            warn!("No active session, final report request dropped");
            return Ok(());
        };

        info!("Requesting final report");
        self.ui
            .send_modify(|state| state.status_message = STATUS_FINALIZING.to_string());
        channel
            .send_event(&ClientEvent::user_text(self.settings.report_trigger.clone()))
            .await?;
        channel.send_event(&ClientEvent::ResponseCreate).await?;
        Ok(())
    }

    /// Releases the data channel, the peer connection and speaker routing.
    ///
    /// Idempotent, and safe to call while `connect` is still running.
    pub async fn disconnect(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.release().await;
        self.ui.send_if_modified(|state| {
            if !state.connection_state.is_active() {
                return false;
            }
            state.connection_state = ConnectionState::Idle;
            state.status_message = STATUS_DISCONNECTED.to_string();
            state.is_ai_speaking = false;
            true
        });
    }

    /// Disconnects and restores the default UI state.
    pub async fn reset(&self) {
        self.disconnect().await;
        self.ui.send_modify(|state| *state = UiState::default());
        info!("Session reset");
    }

    /// Applies one server event to the UI state and runs the resulting
    /// command, if any.
    pub async fn handle_event(&self, event: &ServerEvent) {
        debug!(event_type = event.event_type(), "Server event");
        let epoch = self.epoch.load(Ordering::SeqCst);
        let now = Utc::now();
        let session_date = self.connected_at_slot().unwrap_or(now);
        let ctx = SessionContext { session_date, now };

        let mut command = None;
        self.ui.send_if_modified(|state| {
            let step = reduce(state, event, &ctx);
            command = step.command;
            if step.state == *state {
                return false;
            }
            *state = step.state;
            true
        });

        match command {
            Some(Command::PersistReport(report)) => self.persist_report(epoch, report).await,
            Some(Command::Disconnect) => self.disconnect().await,
            None => {}
        }
    }

    async fn persist_report(&self, epoch: u64, report: ProgressReport) {
        info!("Saving final report");
        let saved = self.progress.save_progress(&report).await;
        if !self.is_current(epoch) {
            warn!("Session ended while the final report was being saved");
            return;
        }

        match saved {
            Ok(_) => {
                info!("Final report saved");
                self.ui.send_modify(|state| {
                    state.final_report = Some(report);
                    state.connection_state = ConnectionState::Idle;
                    state.status_message = STATUS_REPORT_SAVED.to_string();
                    state.is_ai_speaking = false;
                });
            }
            Err(e) => {
                error!(error = %e, "Failed to save final report");
                self.ui.send_modify(|state| {
                    state.fail(format!("Could not save the progress report: {}", e))
                });
            }
        }
        self.disconnect().await;
    }

    fn spawn_event_pump(
        self: &Arc<Self>,
        epoch: u64,
        mut events: mpsc::UnboundedReceiver<openai_realtime::Result<ServerEvent>>,
    ) {
        let controller: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(item) = events.recv().await {
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                if !controller.is_current(epoch) {
                    continue;
                }
                match item {
                    Ok(event) => controller.handle_event(&event).await,
                    Err(e) => debug!(error = %e, "Dropped undecodable event"),
                }
            }
            debug!(epoch, "Event pump stopped");
        });
    }

    async fn release(&self) {
        let channel = self.channel.lock().await.take();
        if let Some(channel) = channel {
            channel.close().await;
        }
        self.negotiator.transport().close().await;
        if self.speaker_on.swap(false, Ordering::SeqCst) {
            self.audio.set_speaker_enabled(false);
        }
        *self.connected_at_slot() = None;
        info!("Session resources released");
    }

    /// Tears down resources left by a superseded connect, unless a newer
    /// session is already being set up.
    async fn release_if_inactive(&self) {
        let active = self.ui.borrow().connection_state.is_active();
        if active {
            return;
        }
        self.release().await;
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    /// Applies `update` only while `epoch` is still the current one. The
    /// check runs under the state lock, so it cannot interleave with a reset.
    fn update_if_current(&self, epoch: u64, update: impl FnOnce(&mut UiState)) -> bool {
        self.ui.send_if_modified(|state| {
            if !self.is_current(epoch) {
                return false;
            }
            update(state);
            true
        })
    }

    fn connected_at_slot(&self) -> MutexGuard<'_, Option<DateTime<Utc>>> {
        self.connected_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MockAudioOutput, MockProgressStore, MockTokenProvider};
    use mockall::predicate::eq;
    use openai_realtime::{
        EphemeralKey, GatewayConfig, PeerConfig,
        fake::{FakeGateway, FakeTransport},
    };
    use tokio::sync::Notify;

    const ANSWER: &str = "v=0\r\ns=fake answer\r\n";
    const VALID_ARGS: &str = r#"{"topics_discussed":["travel"],"new_vocabulary":["itinerary"],"grammar_points":[],"ai_summary":"Good session","suggested_level":"B1"}"#;

    fn tokens_ok() -> MockTokenProvider {
        let mut tokens = MockTokenProvider::new();
        tokens
            .expect_ephemeral_key()
            .returning(|_| Ok(EphemeralKey::new("ek_test", 1_900_000_000)));
        tokens
    }

    fn any_audio() -> MockAudioOutput {
        let mut audio = MockAudioOutput::new();
        audio.expect_set_speaker_enabled().return_const(());
        audio
    }

    fn no_audio() -> MockAudioOutput {
        let mut audio = MockAudioOutput::new();
        audio.expect_set_speaker_enabled().never();
        audio
    }

    fn no_progress() -> MockProgressStore {
        let mut progress = MockProgressStore::new();
        progress.expect_save_progress().never();
        progress
    }

    fn controller(
        transport: &Arc<FakeTransport>,
        gateway_url: &str,
        tokens: MockTokenProvider,
        progress: MockProgressStore,
        audio: MockAudioOutput,
        settings: SessionSettings,
    ) -> Arc<SessionController> {
        let negotiator = SessionNegotiator::new(
            transport.clone(),
            GatewayConfig {
                url: gateway_url.to_string(),
                model: "test-model".to_string(),
            },
            PeerConfig::default(),
        );
        SessionController::new(
            negotiator,
            Collaborators {
                tokens: Arc::new(tokens),
                progress: Arc::new(progress),
                audio: Arc::new(audio),
            },
            settings,
        )
    }

    async fn wait_for_state(
        controller: &SessionController,
        predicate: impl Fn(&UiState) -> bool,
    ) -> UiState {
        let mut rx = controller.subscribe();
        let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| predicate(s)))
            .await
            .expect("timed out waiting for state")
            .expect("state channel closed");
        let snapshot = (*state).clone();
        snapshot
    }

    async fn eventually(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    fn report_done(arguments: &str) -> String {
        serde_json::json!({
            "type": "response.done",
            "response": {
                "output": [{
                    "type": "function_call",
                    "name": "generate_final_report",
                    "arguments": arguments,
                }]
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_connect_reaches_connected() {
        let transport = Arc::new(FakeTransport::new());
        let gateway = FakeGateway::answering(ANSWER).await.unwrap();
        let mut tokens = MockTokenProvider::new();
        tokens
            .expect_ephemeral_key()
            .withf(|instructions| instructions == "Topic: travel")
            .times(1)
            .returning(|_| Ok(EphemeralKey::new("ek_test", 1_900_000_000)));
        let mut audio = MockAudioOutput::new();
        audio
            .expect_set_speaker_enabled()
            .with(eq(true))
            .times(1)
            .return_const(());
        let controller = controller(
            &transport,
            gateway.url(),
            tokens,
            no_progress(),
            audio,
            SessionSettings::default(),
        );

        controller.connect("Topic: travel").await;

        let state = controller.state();
        assert_eq!(state.connection_state, ConnectionState::Connected);
        assert_eq!(state.status_message, STATUS_CONNECTED);
        let requests = gateway.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer ek_test"));
        assert_eq!(transport.remote_answer().as_deref(), Some(ANSWER));
        assert!(transport.channel().has_handler());
    }

    #[tokio::test]
    async fn test_connect_without_token_fails_before_transport_setup() {
        let transport = Arc::new(FakeTransport::new());
        let mut tokens = MockTokenProvider::new();
        tokens
            .expect_ephemeral_key()
            .times(1)
            .returning(|_| Err(SessionError::Auth("no auth token stored".to_string())));
        let controller = controller(
            &transport,
            "http://127.0.0.1:9/v1/realtime",
            tokens,
            no_progress(),
            no_audio(),
            SessionSettings::default(),
        );

        controller.connect("Topic: travel").await;

        let state = controller.state();
        assert!(matches!(
            state.connection_state,
            ConnectionState::Error(ref message) if message.starts_with("Failed to start")
        ));
        assert_eq!(transport.setup_calls(), 0);
        assert_eq!(transport.release_count(), 0);
    }

    #[tokio::test]
    async fn test_gateway_rejection_releases_transport() {
        let transport = Arc::new(FakeTransport::new());
        let gateway = FakeGateway::failing(401, "expired key").await.unwrap();
        let controller = controller(
            &transport,
            gateway.url(),
            tokens_ok(),
            no_progress(),
            no_audio(),
            SessionSettings::default(),
        );

        controller.connect("Topic: travel").await;

        match controller.state().connection_state {
            ConnectionState::Error(message) => assert!(message.contains("401"), "{}", message),
            other => panic!("unexpected state: {:?}", other),
        }
        assert_eq!(transport.answer_calls(), 0);
        assert_eq!(transport.release_count(), 1);
        assert!(!transport.is_live());
    }

    #[tokio::test]
    async fn test_disconnect_twice_releases_once() {
        let transport = Arc::new(FakeTransport::new());
        let gateway = FakeGateway::answering(ANSWER).await.unwrap();
        let mut audio = MockAudioOutput::new();
        audio
            .expect_set_speaker_enabled()
            .with(eq(true))
            .times(1)
            .return_const(());
        audio
            .expect_set_speaker_enabled()
            .with(eq(false))
            .times(1)
            .return_const(());
        let controller = controller(
            &transport,
            gateway.url(),
            tokens_ok(),
            no_progress(),
            audio,
            SessionSettings::default(),
        );
        controller.connect("Topic: travel").await;

        controller.disconnect().await;
        controller.disconnect().await;

        assert_eq!(transport.release_count(), 1);
        assert_eq!(transport.channel().close_count(), 1);
        assert!(!transport.channel().has_handler());
        let state = controller.state();
        assert_eq!(state.connection_state, ConnectionState::Idle);
        assert_eq!(state.status_message, STATUS_DISCONNECTED);
    }

    #[tokio::test]
    async fn test_final_report_round_trip() {
        let transport = Arc::new(FakeTransport::new());
        let gateway = FakeGateway::answering(ANSWER).await.unwrap();
        let mut progress = MockProgressStore::new();
        progress
            .expect_save_progress()
            .withf(|report| report.ai_summary == "Good session")
            .times(1)
            .returning(|report| Ok(report.clone()));
        let controller = controller(
            &transport,
            gateway.url(),
            tokens_ok(),
            progress,
            any_audio(),
            SessionSettings::default(),
        );
        controller.connect("Topic: travel").await;

        controller.request_final_report().await.unwrap();

        let channel = transport.channel();
        let sent = channel.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].starts_with(r#"{"type":"conversation.item.create""#));
        assert!(sent[0].contains(DEFAULT_REPORT_TRIGGER));
        assert_eq!(sent[1], r#"{"type":"response.create"}"#);
        assert_eq!(controller.state().status_message, STATUS_FINALIZING);

        assert!(channel.deliver(&report_done(VALID_ARGS)));

        let state = wait_for_state(&controller, |s| s.final_report.is_some()).await;
        let report = state.final_report.unwrap();
        assert_eq!(report.topics_discussed, vec!["travel"]);
        assert_eq!(report.new_vocabulary, vec!["itinerary"]);
        assert!(report.grammar_points.is_empty());
        assert_eq!(report.ai_summary, "Good session");
        assert_eq!(report.suggested_level, "B1");
        assert!(report.duration_minutes >= 1);
        assert_eq!(state.connection_state, ConnectionState::Idle);
        assert_eq!(state.status_message, STATUS_REPORT_SAVED);
        eventually(|| transport.release_count() == 1).await;
    }

    #[tokio::test]
    async fn test_malformed_report_sets_error_and_releases() {
        let transport = Arc::new(FakeTransport::new());
        let gateway = FakeGateway::answering(ANSWER).await.unwrap();
        let controller = controller(
            &transport,
            gateway.url(),
            tokens_ok(),
            no_progress(),
            any_audio(),
            SessionSettings::default(),
        );
        controller.connect("Topic: travel").await;

        transport.channel().deliver(&report_done("{\"topics_discussed\":"));

        let state = wait_for_state(&controller, |s| {
            matches!(s.connection_state, ConnectionState::Error(_))
        })
        .await;
        assert!(state.final_report.is_none());
        eventually(|| transport.release_count() == 1).await;
    }

    #[tokio::test]
    async fn test_persistence_failure_sets_error_and_releases() {
        let transport = Arc::new(FakeTransport::new());
        let gateway = FakeGateway::answering(ANSWER).await.unwrap();
        let mut progress = MockProgressStore::new();
        progress
            .expect_save_progress()
            .times(1)
            .returning(|_| Err(SessionError::Persistence("HTTP 500".to_string())));
        let controller = controller(
            &transport,
            gateway.url(),
            tokens_ok(),
            progress,
            any_audio(),
            SessionSettings::default(),
        );
        controller.connect("Topic: travel").await;

        transport.channel().deliver(&report_done(VALID_ARGS));

        let state = wait_for_state(&controller, |s| {
            matches!(s.connection_state, ConnectionState::Error(_))
        })
        .await;
        assert!(state.status_message.starts_with("Could not save the progress report"));
        assert!(state.final_report.is_none());
        eventually(|| transport.release_count() == 1).await;
    }

    #[tokio::test]
    async fn test_server_events_drive_ui_and_survive_malformed_frames() {
        let transport = Arc::new(FakeTransport::new());
        let gateway = FakeGateway::answering(ANSWER).await.unwrap();
        let controller = controller(
            &transport,
            gateway.url(),
            tokens_ok(),
            no_progress(),
            any_audio(),
            SessionSettings::default(),
        );
        controller.connect("Topic: travel").await;
        let channel = transport.channel();

        channel.deliver(r#"{"type":"output_audio_buffer.started"}"#);
        channel.deliver(r#"{"type":"response.audio_transcript.delta","delta":"Hi"}"#);
        channel.deliver("{oops");
        channel.deliver(r#"{"type":"response.audio_transcript.delta","delta":" there"}"#);
        channel.deliver(r#"{"type":"output_audio_buffer.stopped"}"#);

        let state = wait_for_state(&controller, |s| {
            !s.is_ai_speaking && s.ai_response_text == "Hi there"
        })
        .await;
        assert_eq!(state.connection_state, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_reset_during_connect_wins() {
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(FakeTransport::new().with_offer_gate(gate.clone()));
        let gateway = FakeGateway::answering(ANSWER).await.unwrap();
        let controller = controller(
            &transport,
            gateway.url(),
            tokens_ok(),
            no_progress(),
            no_audio(),
            SessionSettings::default(),
        );

        let connecting = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.connect("Topic: travel").await })
        };
        eventually(|| transport.offer_calls() == 1).await;
        controller.reset().await;
        gate.notify_one();
        connecting.await.unwrap();

        assert_eq!(controller.state(), UiState::default());
        assert_eq!(transport.release_count(), 1);
        assert!(gateway.requests().is_empty());
    }

    #[tokio::test]
    async fn test_connect_timeout_fails_and_releases() {
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(FakeTransport::new().with_offer_gate(gate));
        let controller = controller(
            &transport,
            "http://127.0.0.1:9/v1/realtime",
            tokens_ok(),
            no_progress(),
            no_audio(),
            SessionSettings {
                connect_timeout: Some(Duration::from_millis(50)),
                ..SessionSettings::default()
            },
        );

        controller.connect("Topic: travel").await;

        match controller.state().connection_state {
            ConnectionState::Error(message) => assert!(message.contains("timed out"), "{}", message),
            other => panic!("unexpected state: {:?}", other),
        }
        assert_eq!(transport.release_count(), 1);
    }

    #[tokio::test]
    async fn test_request_final_report_without_session_is_noop() {
        let transport = Arc::new(FakeTransport::new());
        let controller = controller(
            &transport,
            "http://127.0.0.1:9/v1/realtime",
            tokens_ok(),
            no_progress(),
            no_audio(),
            SessionSettings::default(),
        );

        controller.request_final_report().await.unwrap();

        assert!(transport.channel().sent().is_empty());
        assert_eq!(controller.state(), UiState::default());
    }

    #[tokio::test]
    async fn test_request_final_report_on_closed_channel_sends_nothing() {
        let transport = Arc::new(FakeTransport::new());
        let gateway = FakeGateway::answering(ANSWER).await.unwrap();
        let controller = controller(
            &transport,
            gateway.url(),
            tokens_ok(),
            no_progress(),
            any_audio(),
            SessionSettings {
                report_trigger: "Wrap up, please.".to_string(),
                ..SessionSettings::default()
            },
        );
        controller.connect("Topic: travel").await;
        transport.channel().set_open(false);

        controller.request_final_report().await.unwrap();

        assert!(transport.channel().sent().is_empty());
    }
}
