//! Live streaming session transport
//!
//! Wraps the bidirectional websocket to the live endpoint behind a small
//! capability handle: `send_chunk` and `close`, plus an event receiver for
//! everything inbound. The raw socket is never exposed to the capture or
//! playback side.

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::audio::AudioChunk;
use crate::constants::{EVENT_QUEUE_CAPACITY, LIVE_API_URL, OUTBOUND_QUEUE_CAPACITY};
use crate::error::TransportError;
use crate::transport::messages::{ClientMessage, ServerMessage};

/// Everything needed to open one live session
#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub api_key: String,
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
}

/// Inbound signals surfaced to the orchestrator, in arrival order
#[derive(Debug)]
pub enum TransportEvent {
    /// Remote accepted the setup; sending may begin
    Ready,
    /// One decoded synthesized-audio chunk (24 kHz mono)
    Audio(AudioChunk),
    /// The user barged in; flush scheduled playback now
    Interrupted,
    /// The model finished its turn
    TurnComplete,
    /// Normal end of session from the remote side
    Closed,
    /// The session failed; classification drives the retry decision
    Error(TransportError),
}

/// Capability handle for one open session.
///
/// Cloneable; all clones share the same underlying channel, so closing any
/// of them closes the session. Sends are best-effort and never surface an
/// error into the capture hot path.
#[derive(Clone)]
pub struct LiveSession {
    out_tx: mpsc::Sender<ClientMessage>,
    ready: Arc<AtomicBool>,
    open: Arc<AtomicBool>,
    cancel: CancellationToken,
    chunks_sent: Arc<AtomicU64>,
    chunks_dropped: Arc<AtomicU64>,
}

impl LiveSession {
    /// Queue one capture chunk for sending.
    ///
    /// A no-op while the session is not yet ready or no longer open: early
    /// speech is dropped, not buffered, so a slow connect cannot replay
    /// stale audio into a fresh turn. A full outbound queue also drops the
    /// chunk rather than blocking the caller.
    pub fn send_chunk(&self, chunk: &AudioChunk) {
        if !self.open.load(Ordering::Relaxed) || !self.ready.load(Ordering::Relaxed) {
            self.chunks_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match self.out_tx.try_send(ClientMessage::audio_chunk(chunk)) {
            Ok(()) => {
                self.chunks_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.chunks_dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("outbound queue unavailable, chunk dropped");
            }
        }
    }

    /// Close the session. Idempotent and safe from any state.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.cancel.cancel();
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn chunks_sent(&self) -> u64 {
        self.chunks_sent.load(Ordering::Relaxed)
    }

    pub fn chunks_dropped(&self) -> u64 {
        self.chunks_dropped.load(Ordering::Relaxed)
    }
}

/// Open a live session and send the setup message.
///
/// Resolves once the socket is up; the `Ready` event on the returned
/// receiver signals that the remote accepted the setup.
pub async fn connect(
    config: &LiveConfig,
) -> Result<(LiveSession, mpsc::Receiver<TransportEvent>), TransportError> {
    let url = build_url(&config.api_key)?;

    let (ws, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| classify(&e.to_string()))?;
    tracing::debug!(model = %config.model, "live socket connected");

    let (mut sink, mut stream) = ws.split();

    let setup = ClientMessage::setup(&config.model, &config.voice, &config.system_instruction);
    let setup_json =
        serde_json::to_string(&setup).map_err(|e| TransportError::Fatal(e.to_string()))?;
    sink.send(Message::Text(setup_json))
        .await
        .map_err(|e| classify(&e.to_string()))?;

    let (out_tx, mut out_rx) = mpsc::channel::<ClientMessage>(OUTBOUND_QUEUE_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(EVENT_QUEUE_CAPACITY);

    let ready = Arc::new(AtomicBool::new(false));
    let open = Arc::new(AtomicBool::new(true));
    let cancel = CancellationToken::new();

    let session = LiveSession {
        out_tx,
        ready: ready.clone(),
        open: open.clone(),
        cancel: cancel.clone(),
        chunks_sent: Arc::new(AtomicU64::new(0)),
        chunks_dropped: Arc::new(AtomicU64::new(0)),
    };

    // Writer: drains the outbound queue until closed or cancelled
    let writer_open = open.clone();
    let writer_cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                msg = out_rx.recv() => {
                    let Some(msg) = msg else { break };
                    let json = match serde_json::to_string(&msg) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::warn!("failed to encode outbound message: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(json)).await {
                        tracing::debug!("outbound send failed: {}", e);
                        writer_open.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }
        }
    });

    // Reader: turns server messages into transport events, in arrival order
    let reader_open = open;
    let reader_ready = ready;
    let reader_cancel = cancel;
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                _ = reader_cancel.cancelled() => break,
                frame = stream.next() => frame,
            };
            match frame {
                Some(Ok(msg)) => {
                    let parsed = match msg {
                        Message::Text(text) => serde_json::from_str::<ServerMessage>(&text),
                        Message::Binary(bin) => serde_json::from_slice::<ServerMessage>(&bin),
                        Message::Close(_) => {
                            reader_open.store(false, Ordering::SeqCst);
                            let _ = event_tx.send(TransportEvent::Closed).await;
                            break;
                        }
                        // Pings are answered by the websocket layer
                        _ => continue,
                    };
                    let server_msg = match parsed {
                        Ok(m) => m,
                        Err(e) => {
                            tracing::warn!("unparseable server message: {}", e);
                            continue;
                        }
                    };
                    if !dispatch(&server_msg, &event_tx, &reader_ready, &reader_open).await {
                        break;
                    }
                }
                Some(Err(e)) => {
                    reader_open.store(false, Ordering::SeqCst);
                    let _ = event_tx
                        .send(TransportEvent::Error(classify(&e.to_string())))
                        .await;
                    break;
                }
                None => {
                    reader_open.store(false, Ordering::SeqCst);
                    let _ = event_tx.send(TransportEvent::Closed).await;
                    break;
                }
            }
        }
    });

    Ok((session, event_rx))
}

/// Forward the signals of one server message. Returns false when the
/// session is over and the reader should stop.
async fn dispatch(
    msg: &ServerMessage,
    event_tx: &mpsc::Sender<TransportEvent>,
    ready: &Arc<AtomicBool>,
    open: &Arc<AtomicBool>,
) -> bool {
    if msg.is_setup_complete() {
        ready.store(true, Ordering::SeqCst);
        if event_tx.send(TransportEvent::Ready).await.is_err() {
            return false;
        }
    }

    for chunk in msg.audio_chunks() {
        if event_tx.send(TransportEvent::Audio(chunk)).await.is_err() {
            return false;
        }
    }

    if msg.is_interrupted() && event_tx.send(TransportEvent::Interrupted).await.is_err() {
        return false;
    }

    if msg.is_turn_complete() && event_tx.send(TransportEvent::TurnComplete).await.is_err() {
        return false;
    }

    if let Some(err) = msg.error.as_ref() {
        open.store(false, Ordering::SeqCst);
        let detail = err
            .message
            .clone()
            .or_else(|| err.status.clone())
            .unwrap_or_else(|| "unspecified server error".to_string());
        let _ = event_tx.send(TransportEvent::Error(classify(&detail))).await;
        return false;
    }

    if msg.go_away.is_some() {
        open.store(false, Ordering::SeqCst);
        let _ = event_tx.send(TransportEvent::Closed).await;
        return false;
    }

    true
}

fn build_url(api_key: &str) -> Result<Url, TransportError> {
    let mut url =
        Url::parse(LIVE_API_URL).map_err(|e| TransportError::Fatal(e.to_string()))?;
    url.query_pairs_mut().append_pair("key", api_key);
    Ok(url)
}

/// Classify a failure for the retry state machine.
///
/// Messages indicating transient unavailability are retried with backoff;
/// everything else tears the session down for good.
pub fn classify(message: &str) -> TransportError {
    const TRANSIENT_MARKERS: &[&str] = &[
        "unavailable",
        "overloaded",
        "503",
        "429",
        "resource exhausted",
        "resource_exhausted",
        "deadline",
        "timed out",
        "timeout",
        "temporarily",
        "connection reset",
        "try again",
    ];

    let lowered = message.to_lowercase();
    if TRANSIENT_MARKERS.iter().any(|m| lowered.contains(m)) {
        TransportError::Transient(message.to_string())
    } else {
        TransportError::Fatal(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_transient() {
        assert!(classify("503 Service Unavailable").is_transient());
        assert!(classify("the model is overloaded, try again later").is_transient());
        assert!(classify("RESOURCE_EXHAUSTED: quota").is_transient());
        assert!(classify("deadline exceeded").is_transient());
        assert!(classify("Connection reset by peer").is_transient());
    }

    #[test]
    fn test_classify_fatal() {
        assert!(!classify("401 Unauthorized").is_transient());
        assert!(!classify("invalid api key").is_transient());
        assert!(!classify("protocol violation").is_transient());
    }

    #[test]
    fn test_url_embeds_key() {
        let url = build_url("secret-key").unwrap();
        assert!(url.as_str().starts_with("wss://"));
        assert!(url.query().unwrap().contains("key=secret-key"));
    }

    #[tokio::test]
    async fn test_unready_session_drops_chunks_silently() {
        // The open-question decision pinned: early speech is dropped, never
        // buffered, and sending never errors.
        let (out_tx, mut out_rx) = mpsc::channel(4);
        let session = LiveSession {
            out_tx,
            ready: Arc::new(AtomicBool::new(false)),
            open: Arc::new(AtomicBool::new(true)),
            cancel: CancellationToken::new(),
            chunks_sent: Arc::new(AtomicU64::new(0)),
            chunks_dropped: Arc::new(AtomicU64::new(0)),
        };

        let chunk = AudioChunk::from_f32(&[0.1; 8], 16_000, 1);
        session.send_chunk(&chunk);
        session.send_chunk(&chunk);

        assert_eq!(session.chunks_sent(), 0);
        assert_eq!(session.chunks_dropped(), 2);
        assert!(out_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ready_session_queues_chunks() {
        let (out_tx, mut out_rx) = mpsc::channel(4);
        let session = LiveSession {
            out_tx,
            ready: Arc::new(AtomicBool::new(true)),
            open: Arc::new(AtomicBool::new(true)),
            cancel: CancellationToken::new(),
            chunks_sent: Arc::new(AtomicU64::new(0)),
            chunks_dropped: Arc::new(AtomicU64::new(0)),
        };

        let chunk = AudioChunk::from_f32(&[0.1; 8], 16_000, 1);
        session.send_chunk(&chunk);
        assert_eq!(session.chunks_sent(), 1);
        assert!(matches!(
            out_rx.try_recv(),
            Ok(ClientMessage::RealtimeInput(_))
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (out_tx, _out_rx) = mpsc::channel(1);
        let session = LiveSession {
            out_tx,
            ready: Arc::new(AtomicBool::new(true)),
            open: Arc::new(AtomicBool::new(true)),
            cancel: CancellationToken::new(),
            chunks_sent: Arc::new(AtomicU64::new(0)),
            chunks_dropped: Arc::new(AtomicU64::new(0)),
        };

        session.close();
        session.close();
        assert!(!session.is_open());

        // Sends after close are silent no-ops
        let chunk = AudioChunk::from_f32(&[0.1; 8], 16_000, 1);
        session.send_chunk(&chunk);
        assert_eq!(session.chunks_sent(), 0);
    }
}
