//! Microphone capture
//!
//! One capture stream per session, running at 16 kHz mono on its own thread
//! (cpal streams are not `Send`). Captured callback buffers are pushed into a
//! lock-free ring buffer; the chunk pump on the async side drains them.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::buffer::SharedRingBuffer;
use crate::audio::device::default_input_device;
use crate::constants::{CAPTURE_SAMPLE_RATE, CHANNELS};
use crate::error::AudioError;

/// How long to wait for the capture thread to confirm the stream opened
const START_TIMEOUT: Duration = Duration::from_secs(2);

/// Microphone capture instance
pub struct AudioCapture {
    /// Whether capture is running
    running: Arc<AtomicBool>,

    /// Output buffer for captured sample blocks
    output_buffer: SharedRingBuffer,

    /// Stream thread handle
    thread_handle: Option<JoinHandle<()>>,

    /// Channel for stream errors after start
    error_rx: Option<Receiver<AudioError>>,

    /// Total samples captured
    samples_captured: Arc<AtomicU64>,

    /// Stream configuration
    config: StreamConfig,
}

impl AudioCapture {
    /// Acquire the default microphone.
    ///
    /// Fails with `AudioError::PermissionDenied` when no input device is
    /// available or the device refuses to be probed — fatal to session start.
    pub fn new(output_buffer: SharedRingBuffer) -> Result<Self, AudioError> {
        let device = default_input_device()?;

        // Probing the default config is the earliest point an occupied or
        // refused device fails.
        device
            .default_input_config()
            .map_err(|e| AudioError::PermissionDenied(e.to_string()))?;

        let config = StreamConfig {
            channels: CHANNELS,
            sample_rate: cpal::SampleRate(CAPTURE_SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        Ok(Self {
            running: Arc::new(AtomicBool::new(false)),
            output_buffer,
            thread_handle: None,
            error_rx: None,
            samples_captured: Arc::new(AtomicU64::new(0)),
            config,
        })
    }

    /// Start capturing audio.
    ///
    /// Blocks until the capture thread has opened the stream (or failed to).
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);
        let (error_tx, error_rx) = bounded::<AudioError>(16);
        self.error_rx = Some(error_rx);

        let running = self.running.clone();
        let running_for_loop = self.running.clone();
        let output_buffer = self.output_buffer.clone();
        let samples_captured = self.samples_captured.clone();
        let config = self.config.clone();

        self.samples_captured.store(0, Ordering::SeqCst);
        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("voice-capture".to_string())
            .spawn(move || {
                let device = match default_input_device() {
                    Ok(d) => d.into_inner(),
                    Err(e) => {
                        running.store(false, Ordering::SeqCst);
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let running_cb = running.clone();
                let stream = device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        if !running_cb.load(Ordering::Relaxed) {
                            return;
                        }
                        samples_captured.fetch_add(data.len() as u64, Ordering::Relaxed);
                        // May fail on overflow; counted by the ring buffer
                        let _ = output_buffer.push(data.to_vec());
                    },
                    move |err| {
                        let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
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

                        // Keep thread alive while running
                        while running_for_loop.load(Ordering::Relaxed) {
                            thread::sleep(Duration::from_millis(10));
                        }

                        // Stream is dropped here, releasing the device
                    }
                    Err(e) => {
                        running.store(false, Ordering::SeqCst);
                        let err = match e {
                            cpal::BuildStreamError::DeviceNotAvailable => {
                                AudioError::PermissionDenied("input device not available".to_string())
                            }
                            other => AudioError::StreamError(other.to_string()),
                        };
                        let _ = ready_tx.send(Err(err));
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
                    "capture thread did not start in time".to_string(),
                ))
            }
        }
    }

    /// Stop capturing and release the device. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    /// Check if capture is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get total samples captured
    pub fn samples_captured(&self) -> u64 {
        self.samples_captured.load(Ordering::Relaxed)
    }

    /// Check for stream errors raised after start
    pub fn check_errors(&self) -> Option<AudioError> {
        self.error_rx.as_ref().and_then(|rx| rx.try_recv().ok())
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
