//! [`PeerTransport`] backed by the pure-Rust `webrtc` engine.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use webrtc::{
    api::{
        APIBuilder,
        interceptor_registry::register_default_interceptors,
        media_engine::{MIME_TYPE_OPUS, MediaEngine},
    },
    data_channel::{
        RTCDataChannel, data_channel_message::DataChannelMessage,
        data_channel_state::RTCDataChannelState,
    },
    ice_transport::ice_server::RTCIceServer,
    interceptor::registry::Registry,
    media::Sample,
    peer_connection::{
        RTCPeerConnection, configuration::RTCConfiguration,
        peer_connection_state::RTCPeerConnectionState,
        sdp::session_description::RTCSessionDescription,
    },
    rtp_transceiver::{RTCRtpTransceiver, rtp_codec::RTCRtpCodecCapability, rtp_receiver::RTCRtpReceiver},
    track::{
        track_local::{TrackLocal, track_local_static_sample::TrackLocalStaticSample},
        track_remote::TrackRemote,
    },
};

use crate::{
    error::{Error, Result},
    transport::{AudioSource, DataChannel, MessageHandler, PeerConfig, PeerTransport},
};

/// Native resources owned by one peer connection.
///
/// Stored as soon as the peer exists so that a cancelled setup still leaves
/// everything reachable from [`PeerTransport::close`].
struct RtcResources {
    peer: Arc<RTCPeerConnection>,
    channel: Option<Arc<RtcDataChannel>>,
    tasks: Vec<JoinHandle<()>>,
}

impl RtcResources {
    async fn release(self) {
        for task in self.tasks {
            task.abort();
        }
        if let Some(channel) = self.channel {
            channel.close().await;
        }
        if let Err(e) = self.peer.close().await {
            warn!(error = %e, "Failed to close peer connection");
        }
        info!("Peer connection released");
    }
}

/// A WebRTC peer connection with one Opus audio track and one data channel.
pub struct WebRtcTransport {
    // Never held across an await.
    resources: Mutex<Option<RtcResources>>,
    microphone: Option<Arc<dyn AudioSource>>,
    remote_audio: Option<mpsc::Sender<Bytes>>,
}

impl Default for WebRtcTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl WebRtcTransport {
    pub fn new() -> Self {
        Self {
            resources: Mutex::new(None),
            microphone: None,
            remote_audio: None,
        }
    }

    /// Streams frames from `source` into the local audio track.
    pub fn with_microphone(mut self, source: Arc<dyn AudioSource>) -> Self {
        self.microphone = Some(source);
        self
    }

    /// Forwards RTP payloads of inbound audio tracks to `sink`.
    pub fn with_remote_audio(mut self, sink: mpsc::Sender<Bytes>) -> Self {
        self.remote_audio = Some(sink);
        self
    }

    fn slot(&self) -> MutexGuard<'_, Option<RtcResources>> {
        self.resources.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn peer(&self) -> Result<Arc<RTCPeerConnection>> {
        self.slot()
            .as_ref()
            .map(|r| Arc::clone(&r.peer))
            .ok_or_else(|| Error::Negotiation("peer connection is not set up".to_string()))
    }

    /// Takes the stored resources if they still belong to `peer`.
    fn take_if_current(&self, peer: &Arc<RTCPeerConnection>) -> Option<RtcResources> {
        let mut slot = self.slot();
        match slot.as_ref() {
            Some(r) if Arc::ptr_eq(&r.peer, peer) => slot.take(),
            _ => None,
        }
    }

    /// Hands `task` to the resources of `peer`, or aborts it when that peer
    /// has already been released.
    fn register_task(&self, peer: &Arc<RTCPeerConnection>, task: JoinHandle<()>) {
        match self.slot().as_mut() {
            Some(r) if Arc::ptr_eq(&r.peer, peer) => r.tasks.push(task),
            _ => task.abort(),
        }
    }

    #[cfg(test)]
    fn has_peer(&self) -> bool {
        self.slot().is_some()
    }

    /// Wires callbacks, the local audio track and the data channel onto a
    /// freshly created peer connection.
    async fn attach(
        &self,
        peer: &Arc<RTCPeerConnection>,
        config: &PeerConfig,
    ) -> Result<Arc<RTCDataChannel>> {
        peer.on_peer_connection_state_change(Box::new(|state: RTCPeerConnectionState| {
            info!(?state, "Peer connection state changed");
            Box::pin(async {})
        }));

        let remote_audio = self.remote_audio.clone();
        peer.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                info!(kind = %track.kind(), "Remote track added");
                let sink = remote_audio.clone();
                tokio::spawn(async move {
                    while let Ok((packet, _)) = track.read_rtp().await {
                        if let Some(sink) = &sink {
                            if sink.send(packet.payload).await.is_err() {
                                break;
                            }
                        }
                    }
                    debug!("Remote track ended");
                });
                Box::pin(async {})
            },
        ));

        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48_000,
                channels: 2,
                ..Default::default()
            },
            "audio0".to_owned(),
            "stream0".to_owned(),
        ));
        let rtp_sender = peer
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(Error::negotiation)?;

        // RTCP has to be read for the interceptors to run.
        self.register_task(
            peer,
            tokio::spawn(async move {
                let mut rtcp_buf = vec![0u8; 1500];
                while rtp_sender.read(&mut rtcp_buf).await.is_ok() {}
            }),
        );

        if let Some(microphone) = &self.microphone {
            let mut frames = microphone.start()?;
            let track = Arc::clone(&track);
            self.register_task(
                peer,
                tokio::spawn(async move {
                    while let Some(frame) = frames.recv().await {
                        let sample = Sample {
                            data: frame.data,
                            duration: frame.duration,
                            ..Default::default()
                        };
                        if let Err(e) = track.write_sample(&sample).await {
                            warn!(error = %e, "Failed to write microphone sample");
                            break;
                        }
                    }
                }),
            );
        }

        let channel = peer
            .create_data_channel(&config.channel_label, None)
            .await
            .map_err(Error::negotiation)?;
        let label = config.channel_label.clone();
        channel.on_open(Box::new(move || {
            info!(%label, "Data channel open");
            Box::pin(async {})
        }));

        Ok(channel)
    }
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn setup(&self, config: &PeerConfig) -> Result<()> {
        // A leftover connection from an earlier attempt is never reused.
        self.close().await;

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(Error::negotiation)?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(Error::negotiation)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = if config.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: config.ice_servers.clone(),
                ..Default::default()
            }]
        };
        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };
        let peer = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(Error::negotiation)?,
        );
        let displaced = self.slot().replace(RtcResources {
            peer: Arc::clone(&peer),
            channel: None,
            tasks: Vec::new(),
        });
        if let Some(displaced) = displaced {
            displaced.release().await;
        }

        match self.attach(&peer, config).await {
            Ok(channel) => {
                let channel = Arc::new(RtcDataChannel { inner: channel });
                let stored = match self.slot().as_mut() {
                    Some(r) if Arc::ptr_eq(&r.peer, &peer) => {
                        r.channel = Some(Arc::clone(&channel));
                        true
                    }
                    _ => false,
                };
                if !stored {
                    channel.close().await;
                    return Err(Error::Negotiation(
                        "peer connection closed during setup".to_string(),
                    ));
                }
                info!(ice_servers = ?config.ice_servers, "Peer connection configured");
                Ok(())
            }
            Err(e) => {
                if let Some(resources) = self.take_if_current(&peer) {
                    resources.release().await;
                }
                Err(e)
            }
        }
    }

    async fn create_offer(&self) -> Result<String> {
        let peer = self.peer()?;
        let offer = peer.create_offer(None).await.map_err(Error::negotiation)?;

        // The gateway takes a single offer, so wait for every candidate to be
        // folded into the local description before handing it out.
        let mut gathering_complete = peer.gathering_complete_promise().await;
        peer.set_local_description(offer)
            .await
            .map_err(Error::negotiation)?;
        let _ = gathering_complete.recv().await;

        let local = peer.local_description().await.ok_or_else(|| {
            Error::Negotiation("local description missing after offer".to_string())
        })?;
        Ok(local.sdp)
    }

    async fn set_remote_answer(&self, sdp: &str) -> Result<()> {
        let peer = self.peer()?;
        let answer = RTCSessionDescription::answer(sdp.to_owned()).map_err(Error::negotiation)?;
        peer.set_remote_description(answer)
            .await
            .map_err(Error::negotiation)
    }

    async fn data_channel(&self) -> Option<Arc<dyn DataChannel>> {
        self.slot()
            .as_ref()
            .and_then(|r| r.channel.clone())
            .map(|channel| channel as Arc<dyn DataChannel>)
    }

    async fn close(&self) {
        let taken = self.slot().take();
        if let Some(resources) = taken {
            resources.release().await;
        }
    }
}

/// [`DataChannel`] over an `RTCDataChannel`.
pub struct RtcDataChannel {
    inner: Arc<RTCDataChannel>,
}

#[async_trait]
impl DataChannel for RtcDataChannel {
    fn label(&self) -> String {
        self.inner.label().to_owned()
    }

    fn is_open(&self) -> bool {
        self.inner.ready_state() == RTCDataChannelState::Open
    }

    async fn send_text(&self, payload: &str) -> Result<()> {
        self.inner
            .send_text(payload.to_owned())
            .await
            .map(|_| ())
            .map_err(|e| Error::Channel(e.to_string()))
    }

    fn set_message_handler(&self, handler: Option<MessageHandler>) {
        match handler {
            Some(handler) => self.inner.on_message(Box::new(move |msg: DataChannelMessage| {
                match std::str::from_utf8(&msg.data) {
                    Ok(text) if msg.is_string => handler(text.to_owned()),
                    Ok(_) => debug!(bytes = msg.data.len(), "Ignoring binary frame"),
                    Err(e) => warn!(error = %e, "Dropping frame that is not UTF-8"),
                }
                Box::pin(async {})
            })),
            None => self
                .inner
                .on_message(Box::new(|_: DataChannelMessage| Box::pin(async {}))),
        }
    }

    async fn close(&self) {
        if let Err(e) = self.inner.close().await {
            warn!(error = %e, "Failed to close data channel");
        }
    }
}
