//! Playback scheduling and output
//!
//! Inbound chunks arrive with network jitter but must play gaplessly. The
//! scheduler places each decoded chunk on a sample-accurate timeline at
//! `max(cursor, now)` and advances the cursor by the chunk length, so chunks
//! are back-to-back while arrival keeps pace and a gap (never an overlap) is
//! inserted when the cursor has fallen behind the output clock.
//!
//! The cpal output callback mixes scheduled voices into its buffer and is the
//! only thing that advances the clock; an interruption (barge-in) force-stops
//! every active voice and resets the cursor to zero.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::bounded;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::buffer::AudioChunk;
use crate::audio::device::default_output_device;
use crate::constants::{CHANNELS, PLAYBACK_SAMPLE_RATE};
use crate::error::AudioError;

/// How long to wait for the output thread to confirm the stream opened
const START_TIMEOUT: Duration = Duration::from_secs(2);

/// One scheduled, not-yet-finished piece of synthesized speech
struct Voice {
    id: u64,
    /// Absolute timeline position of the first sample
    start: u64,
    samples: Vec<f32>,
}

/// Shared sample timeline between the scheduler and the output callback.
///
/// `played` is the output clock: the number of samples the device has
/// consumed. The voice list is the set of active voices; each entry leaves it
/// exactly once — consumed to completion by `mix_into`, or cleared by an
/// interruption.
pub struct Timeline {
    voices: Mutex<Vec<Voice>>,
    played: AtomicU64,
}

impl Timeline {
    pub fn new() -> Self {
        Self {
            voices: Mutex::new(Vec::new()),
            played: AtomicU64::new(0),
        }
    }

    /// Current output clock position in samples
    pub fn position(&self) -> u64 {
        self.played.load(Ordering::Relaxed)
    }

    /// Number of scheduled-but-unfinished voices
    pub fn active_voices(&self) -> usize {
        self.voices.lock().len()
    }

    /// Ids of the scheduled-but-unfinished voices, in scheduling order
    pub fn voice_ids(&self) -> Vec<u64> {
        self.voices.lock().iter().map(|v| v.id).collect()
    }

    /// Force-stop everything currently scheduled
    pub fn clear_voices(&self) {
        self.voices.lock().clear();
    }

    fn add_voice(&self, voice: Voice) {
        self.voices.lock().push(voice);
    }

    /// Mix all voices overlapping the next `out.len()` samples into `out`
    /// and advance the clock. Finished voices are removed.
    pub fn mix_into(&self, out: &mut [f32]) {
        out.fill(0.0);
        let base = self.played.load(Ordering::Relaxed);
        let end = base + out.len() as u64;

        let mut voices = self.voices.lock();
        voices.retain(|voice| {
            let voice_end = voice.start + voice.samples.len() as u64;
            if voice_end <= base {
                return false;
            }
            if voice.start >= end {
                return true;
            }
            let from = voice.start.max(base);
            let to = voice_end.min(end);
            let out_offset = (from - base) as usize;
            let voice_offset = (from - voice.start) as usize;
            let count = (to - from) as usize;
            for i in 0..count {
                out[out_offset + i] += voice.samples[voice_offset + i];
            }
            voice_end > end
        });
        drop(voices);

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
        self.played.fetch_add(out.len() as u64, Ordering::Relaxed);
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Schedules decoded inbound chunks on the shared timeline.
///
/// The cursor is owned here exclusively: monotonically non-decreasing during
/// normal playback, reset to zero only by `interrupt`.
pub struct PlaybackScheduler {
    timeline: Arc<Timeline>,
    cursor: u64,
    next_id: u64,
}

impl PlaybackScheduler {
    pub fn new(timeline: Arc<Timeline>) -> Self {
        Self {
            timeline,
            cursor: 0,
            next_id: 0,
        }
    }

    /// Schedule one inbound chunk. Returns the timeline position it will
    /// start playing at.
    pub fn schedule(&mut self, chunk: &AudioChunk) -> u64 {
        let samples = chunk.to_f32();
        let start = self.cursor.max(self.timeline.position());

        let id = self.next_id;
        self.next_id += 1;
        self.cursor = start + samples.len() as u64;

        tracing::trace!(
            voice = id,
            start,
            len = samples.len(),
            "scheduled playback voice"
        );
        self.timeline.add_voice(Voice { id, start, samples });
        start
    }

    /// Barge-in: force-stop every active voice and restart the timeline.
    ///
    /// Safe when nothing is scheduled; the cursor still resets so the next
    /// chunk starts at current real time.
    pub fn interrupt(&mut self) {
        let stopped = self.timeline.active_voices();
        self.timeline.clear_voices();
        self.cursor = 0;
        if stopped > 0 {
            tracing::debug!(stopped, "playback interrupted");
        }
    }

    /// Next free timeline position in samples
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn timeline(&self) -> Arc<Timeline> {
        self.timeline.clone()
    }
}

/// Speaker output engine: a 24 kHz mono cpal stream on its own thread whose
/// callback drains the shared timeline.
pub struct AudioOutput {
    timeline: Arc<Timeline>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl AudioOutput {
    /// Acquire the default playback device.
    pub fn new() -> Result<Self, AudioError> {
        let device = default_output_device()?;
        device.default_output_config()?;

        Ok(Self {
            timeline: Arc::new(Timeline::new()),
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        })
    }

    pub fn timeline(&self) -> Arc<Timeline> {
        self.timeline.clone()
    }

    /// Open the output stream. Blocks until the thread confirms.
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);
        let running = self.running.clone();
        let running_for_loop = self.running.clone();
        let timeline = self.timeline.clone();

        let config = StreamConfig {
            channels: CHANNELS,
            sample_rate: cpal::SampleRate(PLAYBACK_SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("voice-playback".to_string())
            .spawn(move || {
                let device = match default_output_device() {
                    Ok(d) => d.into_inner(),
                    Err(e) => {
                        running.store(false, Ordering::SeqCst);
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let stream = device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        timeline.mix_into(data);
                    },
                    |err| {
                        tracing::warn!("output stream error: {}", err);
                    },
                    None,
                );

                match stream {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            running.store(false, Ordering::SeqCst);
                            let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                            return;
                        }
                        let _ = ready_tx.send(Ok(()));

                        while running_for_loop.load(Ordering::Relaxed) {
                            thread::sleep(Duration::from_millis(10));
                        }
                    }
                    Err(e) => {
                        running.store(false, Ordering::SeqCst);
                        let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                    }
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        self.thread_handle = Some(handle);

        match ready_rx.recv_timeout(START_TIMEOUT) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.stop();
                Err(e)
            }
            Err(_) => {
                self.stop();
                Err(AudioError::StreamError(
                    "output thread did not start in time".to_string(),
                ))
            }
        }
    }

    /// Close the stream and release the device. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PLAYBACK_SAMPLE_RATE;
    use proptest::prelude::*;

    fn chunk_of(samples: usize) -> AudioChunk {
        AudioChunk::from_f32(&vec![0.25; samples], PLAYBACK_SAMPLE_RATE, 1)
    }

    #[test]
    fn test_back_to_back_scheduling() {
        let timeline = Arc::new(Timeline::new());
        let mut scheduler = PlaybackScheduler::new(timeline);

        let first = scheduler.schedule(&chunk_of(1000));
        let second = scheduler.schedule(&chunk_of(500));
        let third = scheduler.schedule(&chunk_of(250));

        // Arrival keeps pace: each chunk starts exactly where the previous ends
        assert_eq!(first, 0);
        assert_eq!(second, 1000);
        assert_eq!(third, 1500);
        assert_eq!(scheduler.cursor(), 1750);
    }

    #[test]
    fn test_gap_when_cursor_behind_clock() {
        let timeline = Arc::new(Timeline::new());
        let mut scheduler = PlaybackScheduler::new(timeline.clone());

        scheduler.schedule(&chunk_of(100));

        // Output clock runs past the scheduled audio
        let mut out = vec![0.0f32; 600];
        timeline.mix_into(&mut out);
        assert_eq!(timeline.position(), 600);

        // Late chunk starts at the clock, not at the stale cursor
        let start = scheduler.schedule(&chunk_of(100));
        assert_eq!(start, 600);
        assert_eq!(scheduler.cursor(), 700);
    }

    #[test]
    fn test_mixing_places_samples_and_retires_voices() {
        let timeline = Arc::new(Timeline::new());
        let mut scheduler = PlaybackScheduler::new(timeline.clone());

        scheduler.schedule(&chunk_of(100));
        scheduler.schedule(&chunk_of(100));
        assert_eq!(timeline.active_voices(), 2);

        let mut out = vec![0.0f32; 150];
        timeline.mix_into(&mut out);
        // First voice fully consumed exactly once, second still mid-play
        assert_eq!(timeline.active_voices(), 1);
        assert_eq!(timeline.voice_ids(), vec![1]);
        assert!(out.iter().all(|&s| s > 0.0));

        let mut rest = vec![0.0f32; 150];
        timeline.mix_into(&mut rest);
        assert_eq!(timeline.active_voices(), 0);
        assert!(rest[..50].iter().all(|&s| s > 0.0));
        assert!(rest[50..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_interrupt_stops_all_and_resets_cursor() {
        let timeline = Arc::new(Timeline::new());
        let mut scheduler = PlaybackScheduler::new(timeline.clone());

        scheduler.schedule(&chunk_of(1000));
        scheduler.schedule(&chunk_of(1000));
        assert_eq!(timeline.active_voices(), 2);

        scheduler.interrupt();
        assert_eq!(timeline.active_voices(), 0);
        assert_eq!(scheduler.cursor(), 0);

        // Silence after the interruption
        let mut out = vec![1.0f32; 64];
        timeline.mix_into(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_interrupt_on_empty_is_noop() {
        let timeline = Arc::new(Timeline::new());
        let mut scheduler = PlaybackScheduler::new(timeline.clone());
        scheduler.schedule(&chunk_of(100));
        let mut out = vec![0.0f32; 200];
        timeline.mix_into(&mut out);
        assert_eq!(timeline.active_voices(), 0);

        scheduler.interrupt();
        assert_eq!(scheduler.cursor(), 0);
        assert_eq!(timeline.active_voices(), 0);
    }

    #[test]
    fn test_schedule_after_interrupt_starts_at_clock() {
        let timeline = Arc::new(Timeline::new());
        let mut scheduler = PlaybackScheduler::new(timeline.clone());

        scheduler.schedule(&chunk_of(5000));
        let mut out = vec![0.0f32; 1024];
        timeline.mix_into(&mut out);

        scheduler.interrupt();
        let start = scheduler.schedule(&chunk_of(100));
        assert_eq!(start, 1024);
    }

    proptest! {
        #[test]
        fn no_overlap_no_unnecessary_gap(lens in prop::collection::vec(1usize..2000, 1..40)) {
            let timeline = Arc::new(Timeline::new());
            let mut scheduler = PlaybackScheduler::new(timeline);

            let mut prev_end = 0u64;
            for len in lens {
                let start = scheduler.schedule(&chunk_of(len));
                // Never overlaps the previous chunk, and with an idle clock
                // never inserts a gap either
                prop_assert!(start >= prev_end);
                prop_assert_eq!(start, prev_end);
                prev_end = start + len as u64;
            }
        }
    }
}
