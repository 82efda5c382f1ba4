//! Session orchestration
//!
//! One driver task owns every resource of the live session: microphone
//! capture, the websocket transport, and the playback engine. It walks the
//! lifecycle `Idle -> Connecting -> Active -> {Closed, Error}`, retries
//! transient failures with backoff, and tears everything down in a fixed
//! order. Stopping cancels the driver's token, which also aborts any pending
//! backoff sleep, so a superseded attempt can never touch state again.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::audio::buffer::{create_shared_buffer, Chunker, SharedRingBuffer};
use crate::audio::{AudioCapture, AudioOutput, PlaybackScheduler};
use crate::config::AppConfig;
use crate::constants::{
    CAPTURE_SAMPLE_RATE, CHUNK_SAMPLES, RING_BUFFER_CAPACITY, VOICE_GROUNDING_CHARS,
};
use crate::error::{AudioError, Result, TransportError};
use crate::knowledge::Knowledge;
use crate::session::retry::RetryDecision;
use crate::transport::{self, LiveConfig, LiveSession, TransportEvent};

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Error,
    Closed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Error | SessionState::Closed)
    }
}

/// Published on every state change: state, a human-readable message, and the
/// reconnection attempt count
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub state: SessionState,
    pub message: String,
    pub attempt: u32,
}

impl SessionStatus {
    fn new(state: SessionState, message: impl Into<String>, attempt: u32) -> Self {
        Self {
            state,
            message: message.into(),
            attempt,
        }
    }
}

/// How one connection attempt ended
enum AttemptEnd {
    /// Remote closed normally, or the event stream drained
    Closed,
    /// The user stopped the session
    Cancelled,
    /// Microphone refused before any connect was attempted; the session
    /// never starts
    Refused(String),
    /// Retryable failure
    Transient(String),
    /// Not retryable
    Fatal(String),
}

/// A running (or finished) voice session.
///
/// `start` refuses without a credential; `stop` is idempotent and safe from
/// any state. Status is observed through a watch channel.
pub struct VoiceSession {
    cancel: CancellationToken,
    driver: Option<JoinHandle<()>>,
    status_rx: watch::Receiver<SessionStatus>,
}

impl VoiceSession {
    /// Start a session over the given document.
    ///
    /// Fails fast with `ConfigError::CredentialMissing` before any device or
    /// network activity when no API key is configured.
    pub fn start(config: AppConfig, knowledge: Knowledge) -> Result<Self> {
        let api_key = config.require_api_key()?;

        let (status_tx, status_rx) = watch::channel(SessionStatus::new(
            SessionState::Idle,
            "Ready for a voice conversation",
            0,
        ));
        let cancel = CancellationToken::new();
        let driver = tokio::spawn(drive(
            config,
            api_key,
            knowledge,
            status_tx,
            cancel.clone(),
        ));

        Ok(Self {
            cancel,
            driver: Some(driver),
            status_rx,
        })
    }

    /// Watch lifecycle changes
    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx.clone()
    }

    /// Stop the session and wait for every owned resource to be released.
    /// Safe to call repeatedly, and before anything connected.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(driver) = self.driver.take() {
            let _ = driver.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status_rx.borrow().state.is_terminal()
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// The driver: connection attempts interleaved with backoff sleeps until a
/// terminal state is reached.
async fn drive(
    config: AppConfig,
    api_key: String,
    knowledge: Knowledge,
    status_tx: watch::Sender<SessionStatus>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        status_tx.send_replace(SessionStatus::new(
            SessionState::Connecting,
            "Connecting to the tutor...",
            attempt,
        ));

        let end = run_attempt(&config, &api_key, &knowledge, &status_tx, &cancel, attempt).await;

        match end {
            AttemptEnd::Cancelled => {
                status_tx.send_replace(SessionStatus::new(
                    SessionState::Closed,
                    "Session stopped",
                    attempt,
                ));
                return;
            }
            AttemptEnd::Closed => {
                status_tx.send_replace(SessionStatus::new(
                    SessionState::Closed,
                    "Session ended",
                    attempt,
                ));
                return;
            }
            AttemptEnd::Refused(message) => {
                // No connect was attempted; the session closes without ever
                // having started
                status_tx.send_replace(SessionStatus::new(SessionState::Closed, message, attempt));
                return;
            }
            AttemptEnd::Fatal(message) => {
                status_tx.send_replace(SessionStatus::new(SessionState::Error, message, attempt));
                return;
            }
            AttemptEnd::Transient(message) => {
                let error = TransportError::Transient(message.clone());
                match config.retry.decide(&error, attempt) {
                    RetryDecision::GiveUp => {
                        status_tx.send_replace(SessionStatus::new(
                            SessionState::Error,
                            format!("Connection lost after {attempt} reconnection attempts: {message}"),
                            attempt,
                        ));
                        return;
                    }
                    RetryDecision::Retry(delay) => {
                        attempt += 1;
                        tracing::info!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "transient failure, scheduling reconnect: {}",
                            message
                        );
                        status_tx.send_replace(SessionStatus::new(
                            SessionState::Connecting,
                            format!(
                                "Connection hiccup, retrying in {}s (attempt {attempt})",
                                delay.as_secs()
                            ),
                            attempt,
                        ));
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                status_tx.send_replace(SessionStatus::new(
                                    SessionState::Closed,
                                    "Session stopped",
                                    attempt,
                                ));
                                return;
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }
    }
}

/// One full connection attempt: build the audio front-end, connect, pump
/// events until something ends it, then tear down in order — capture first,
/// then transport, then playback.
async fn run_attempt(
    config: &AppConfig,
    api_key: &str,
    knowledge: &Knowledge,
    status_tx: &watch::Sender<SessionStatus>,
    cancel: &CancellationToken,
    attempt: u32,
) -> AttemptEnd {
    let attempt_id = Uuid::new_v4();
    tracing::debug!(%attempt_id, attempt, "starting connection attempt");

    // Microphone first: a refused device is fatal and no connect is attempted.
    let ring = create_shared_buffer(RING_BUFFER_CAPACITY);
    let mut capture = match AudioCapture::new(ring.clone()) {
        Ok(capture) => capture,
        Err(AudioError::PermissionDenied(detail)) => {
            return AttemptEnd::Refused(format!(
                "Microphone unavailable or access denied: {detail}"
            ));
        }
        Err(e) => return AttemptEnd::Fatal(e.to_string()),
    };

    let mut output = match AudioOutput::new() {
        Ok(output) => output,
        Err(e) => return AttemptEnd::Fatal(e.to_string()),
    };
    let mut scheduler = PlaybackScheduler::new(output.timeline());

    let live_config = LiveConfig {
        api_key: api_key.to_string(),
        model: config.live_model.clone(),
        voice: config.voice.clone(),
        system_instruction: tutor_instruction(knowledge),
    };

    let (session, mut events) = tokio::select! {
        _ = cancel.cancelled() => return AttemptEnd::Cancelled,
        connected = transport::connect(&live_config) => match connected {
            Ok(pair) => pair,
            Err(e) => return attempt_end_from(e),
        },
    };

    if let Err(e) = output.start() {
        session.close();
        return AttemptEnd::Fatal(e.to_string());
    }

    let pump_cancel = cancel.child_token();
    let mut pump: Option<JoinHandle<()>> = None;
    let mut capture_check = tokio::time::interval(Duration::from_millis(500));

    let end = loop {
        tokio::select! {
            _ = cancel.cancelled() => break AttemptEnd::Cancelled,
            _ = capture_check.tick() => {
                if let Some(e) = capture.check_errors() {
                    // Capture hiccups are logged, never propagated into the
                    // audio path
                    tracing::warn!("capture stream error: {}", e);
                }
            }
            event = events.recv() => match event {
                Some(TransportEvent::Ready) => {
                    if let Err(e) = capture.start() {
                        break match e {
                            AudioError::PermissionDenied(detail) => AttemptEnd::Fatal(
                                format!("Microphone unavailable or access denied: {detail}"),
                            ),
                            other => AttemptEnd::Fatal(other.to_string()),
                        };
                    }
                    pump = Some(spawn_chunk_pump(
                        ring.clone(),
                        session.clone(),
                        pump_cancel.clone(),
                    ));
                    status_tx.send_replace(SessionStatus::new(
                        SessionState::Active,
                        "Connected! Speak now",
                        attempt,
                    ));
                    tracing::info!(%attempt_id, "session active");
                }
                Some(TransportEvent::Audio(chunk)) => {
                    scheduler.schedule(&chunk);
                }
                Some(TransportEvent::Interrupted) => {
                    scheduler.interrupt();
                }
                Some(TransportEvent::TurnComplete) => {
                    tracing::trace!("model turn complete");
                }
                Some(TransportEvent::Closed) | None => break AttemptEnd::Closed,
                Some(TransportEvent::Error(e)) => break attempt_end_from(e),
            }
        }
    };

    // Teardown order: capture, transport, playback.
    capture.stop();
    pump_cancel.cancel();
    if let Some(pump) = pump {
        let _ = pump.await;
    }
    tracing::debug!(
        %attempt_id,
        sent = session.chunks_sent(),
        dropped = session.chunks_dropped(),
        "closing transport"
    );
    session.close();
    scheduler.interrupt();
    output.stop();

    end
}

fn attempt_end_from(error: TransportError) -> AttemptEnd {
    match error {
        TransportError::Transient(m) => AttemptEnd::Transient(m),
        TransportError::Fatal(m) => AttemptEnd::Fatal(m),
    }
}

/// The live-session system instruction: tutoring role plus a bounded prefix
/// of the document as grounding.
fn tutor_instruction(knowledge: &Knowledge) -> String {
    format!(
        "You are a friendly, encouraging study tutor. Help the student \
         understand the following course material, ask questions to check \
         their understanding, and keep them motivated.\n\nCourse material:\n{}",
        knowledge.grounding_prefix(VOICE_GROUNDING_CHARS)
    )
}

/// Drains captured sample blocks, reframes them into fixed-size chunks, and
/// hands them to the transport. Sends are best-effort; when the session is
/// not active the chunks are dropped, not queued.
fn spawn_chunk_pump(
    ring: SharedRingBuffer,
    session: LiveSession,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut chunker = Chunker::new(CHUNK_SAMPLES, CAPTURE_SAMPLE_RATE);
        loop {
            if cancel.is_cancelled() {
                break;
            }
            while let Some(block) = ring.try_pop() {
                chunker.push(&block);
                while let Some(chunk) = chunker.pop_chunk() {
                    session.send_chunk(&chunk);
                }
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, Error};

    fn knowledge() -> Knowledge {
        Knowledge::from_text("chapter one: thermodynamics").unwrap()
    }

    #[tokio::test]
    async fn test_start_refuses_without_credential() {
        let config = AppConfig::default();
        let result = VoiceSession::start(config, knowledge());
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::CredentialMissing))
        ));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let config = AppConfig {
            api_key: Some("test-key".to_string()),
            ..AppConfig::default()
        };
        let mut session = VoiceSession::start(config, knowledge()).unwrap();

        // Stop immediately, twice; whatever phase the driver reached, this
        // must neither panic nor hang.
        session.stop().await;
        session.stop().await;
        assert!(session.is_finished());
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Error.is_terminal());
        assert!(SessionState::Closed.is_terminal());
        assert!(!SessionState::Connecting.is_terminal());
        assert!(!SessionState::Active.is_terminal());
        assert!(!SessionState::Idle.is_terminal());
    }

    #[test]
    fn test_instruction_embeds_grounding() {
        let text = "x".repeat(VOICE_GROUNDING_CHARS * 2);
        let knowledge = Knowledge::from_text(text).unwrap();
        let instruction = tutor_instruction(&knowledge);
        // Bounded: the prefix, not the whole document
        assert!(instruction.len() < VOICE_GROUNDING_CHARS + 500);
        assert!(instruction.contains("Course material"));
    }
}
