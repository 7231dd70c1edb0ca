//! Typed send/receive over the `oai-events` data channel.

use std::sync::Arc;

use openai_realtime_types::{ClientEvent, ServerEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    error::{Error, Result},
    transport::DataChannel,
};

/// Binds a [`DataChannel`] to a stream of decoded [`ServerEvent`]s.
///
/// Every inbound frame produces exactly one item on the sink: the decoded
/// event, or [`Error::Decode`] for a frame that is not a valid event. A bad
/// frame never unregisters the handler.
pub struct EventChannel {
    channel: Arc<dyn DataChannel>,
}

impl EventChannel {
    pub fn open(
        channel: Arc<dyn DataChannel>,
        sink: mpsc::UnboundedSender<Result<ServerEvent>>,
    ) -> Self {
        channel.set_message_handler(Some(Box::new(move |payload: String| {
            debug!(bytes = payload.len(), "Inbound event frame");
            let event = ServerEvent::decode(&payload).map_err(Error::from);
            if let Err(e) = &event {
                warn!(error = %e, "Received malformed event frame");
            }
            // A closed receiver means the session is gone; drop the frame.
            let _ = sink.send(event);
        })));
        info!(label = %channel.label(), "Event channel bound");
        Self { channel }
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    /// Transmits a text frame. Frames sent while the channel is not open are
    /// dropped without error.
    pub async fn send(&self, payload: &str) -> Result<()> {
        if !self.channel.is_open() {
            warn!(bytes = payload.len(), "Data channel not open, dropping frame");
            return Ok(());
        }
        debug!(bytes = payload.len(), "Outbound event frame");
        self.channel.send_text(payload).await
    }

    pub async fn send_event(&self, event: &ClientEvent) -> Result<()> {
        let payload = event.to_json()?;
        debug!(event_type = event.event_type(), "Sending client event");
        self.send(&payload).await
    }

    pub async fn close(self) {
        self.channel.set_message_handler(None);
        self.channel.close().await;
        info!(label = %self.channel.label(), "Event channel closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeDataChannel;

    fn open_channel() -> (
        Arc<FakeDataChannel>,
        EventChannel,
        mpsc::UnboundedReceiver<Result<ServerEvent>>,
    ) {
        let fake = Arc::new(FakeDataChannel::new("oai-events"));
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = EventChannel::open(fake.clone(), tx);
        (fake, channel, rx)
    }

    #[tokio::test]
    async fn test_send_while_closed_is_silent_noop() {
        let (fake, channel, _rx) = open_channel();
        fake.set_open(false);

        channel.send(r#"{"type":"response.create"}"#).await.unwrap();
        channel.send_event(&ClientEvent::ResponseCreate).await.unwrap();

        assert!(fake.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_event_transmits_json() {
        let (fake, channel, _rx) = open_channel();

        channel
            .send_event(&ClientEvent::user_text("hello"))
            .await
            .unwrap();
        channel.send_event(&ClientEvent::ResponseCreate).await.unwrap();

        let sent = fake.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].starts_with(r#"{"type":"conversation.item.create""#));
        assert_eq!(sent[1], r#"{"type":"response.create"}"#);
    }

    #[tokio::test]
    async fn test_malformed_frame_does_not_stop_delivery() {
        let (fake, _channel, mut rx) = open_channel();

        assert!(fake.deliver("{this is not json"));
        assert!(fake.deliver(r#"{"type":"output_audio_buffer.started"}"#));

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, Err(Error::Decode(_))));
        let second = rx.recv().await.unwrap().unwrap();
        assert_eq!(second, ServerEvent::SpeechStarted);
    }

    #[tokio::test]
    async fn test_unknown_events_are_forwarded_as_other() {
        let (fake, _channel, mut rx) = open_channel();

        fake.deliver(r#"{"type":"rate_limits.updated","rate_limits":[]}"#);

        let event = rx.recv().await.unwrap().unwrap();
        assert_eq!(
            event,
            ServerEvent::Other {
                event_type: "rate_limits.updated".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_close_unregisters_handler_and_releases_channel() {
        let (fake, channel, _rx) = open_channel();
        assert!(fake.has_handler());

        channel.close().await;

        assert!(!fake.has_handler());
        assert!(!fake.is_open());
        assert_eq!(fake.close_count(), 1);
        assert!(!fake.deliver(r#"{"type":"response.done"}"#));
    }
}
