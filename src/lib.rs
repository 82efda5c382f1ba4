//! # Study Voice
//!
//! Real-time voice conversation core for a PDF study assistant.
//!
//! A document is loaded and its text extracted; the user then converses about
//! it over a live bidirectional audio session (or a text chat), backed by a
//! hosted model API. The crate's own job is the audio bridge: capture, fixed
//! framing, PCM16 conversion, streaming transport, gapless playback
//! scheduling, and session retry.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           LOCAL MACHINE                              │
//! │  ┌────────────┐      ┌──────────────────────────────────────────┐   │
//! │  │ Microphone │      │        Session Orchestrator              │   │
//! │  └─────┬──────┘      │  idle → connecting → active → closed     │   │
//! │        ▼             │        (retry w/ backoff on transient)   │   │
//! │  ┌────────────┐      └───────┬──────────────────────────┬───────┘   │
//! │  │  Capture   │              │                          │           │
//! │  │  Thread    │──ring──┐     │                          │           │
//! │  │ 16kHz mono │ buffer │     ▼                          ▼           │
//! │  └────────────┘        │  ┌─────────────┐        ┌─────────────┐    │
//! │                        └─▶│   Chunker   │        │  Playback   │    │
//! │                           │ 4096 / PCM16│        │  Scheduler  │    │
//! │                           └──────┬──────┘        │ 24kHz mono  │    │
//! │                                  │               └──────▲──────┘    │
//! │                                  ▼                      │           │
//! │                           ┌─────────────────────────────┴──────┐    │
//! │                           │      Live Transport (websocket)    │    │
//! │                           │  send: base64 PCM16 realtime input │    │
//! │                           │  recv: audio / interrupted / close │    │
//! │                           └──────────────────┬─────────────────┘    │
//! └──────────────────────────────────────────────┼──────────────────────┘
//!                                                │ wss
//!                                                ▼
//!                                   hosted conversational model
//! ```

pub mod audio;
pub mod chat;
pub mod codec;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod session;
pub mod transport;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Sample rate for microphone capture (what the live API expects as input)
    pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

    /// Sample rate of synthesized audio returned by the live API
    pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

    /// Capture and playback are both mono
    pub const CHANNELS: u16 = 1;

    /// Samples per outbound chunk
    pub const CHUNK_SAMPLES: usize = 4096;

    /// Lock-free ring buffer capacity between the capture thread and the
    /// chunk pump (in cpal callback buffers)
    pub const RING_BUFFER_CAPACITY: usize = 256;

    /// Outbound websocket queue depth (chunks)
    pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;

    /// Inbound transport event queue depth
    pub const EVENT_QUEUE_CAPACITY: usize = 256;

    /// Characters of document text embedded in the live session instruction
    pub const VOICE_GROUNDING_CHARS: usize = 15_000;

    /// Characters of document text embedded in the chat system instruction
    pub const CHAT_GROUNDING_CHARS: usize = 20_000;

    /// Live streaming endpoint
    pub const LIVE_API_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

    /// Turn-based generation endpoint base
    pub const GENERATE_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

    /// Default model for the live voice session
    pub const DEFAULT_LIVE_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-12-2025";

    /// Default model for the text chat
    pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";

    /// Default prebuilt voice
    pub const DEFAULT_VOICE: &str = "Kore";
}
