//! Camera kiosk: continuous capture and check-in on a dedicated thread.

use crate::config::KioskConfig;
use crate::engine::{EngineError, EngineHandle};
use crate::notify::Notifier;
use presence_core::kiosk::PauseGate;
use presence_core::{CheckIn, Recognition};
use presence_hw::{Camera, CameraError, Frame, FrameStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub trait FrameSource {
    fn capture(&mut self) -> Result<Frame, CameraError>;
}

impl FrameSource for FrameStream<'_> {
    fn capture(&mut self) -> Result<Frame, CameraError> {
        self.next_frame()
    }
}

pub trait CheckInSink {
    fn check_in(&self, image: Vec<u8>) -> Result<CheckIn, EngineError>;
}

impl CheckInSink for EngineHandle {
    fn check_in(&self, image: Vec<u8>) -> Result<CheckIn, EngineError> {
        self.check_in_blocking(image)
    }
}

/// What one kiosk iteration did.
#[derive(Debug, PartialEq)]
pub enum Step {
    Paused(Duration),
    Dark,
    NoFace,
    Unknown,
    Validated { name: String, recorded: bool },
    Failed,
}

pub struct Kiosk<S, K> {
    source: S,
    sink: K,
    notifier: Box<dyn Notifier>,
    gate: PauseGate,
    frame_interval: Duration,
    quit: Arc<AtomicBool>,
}

impl<S: FrameSource, K: CheckInSink> Kiosk<S, K> {
    pub fn new(
        source: S,
        sink: K,
        notifier: Box<dyn Notifier>,
        config: &KioskConfig,
        quit: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            sink,
            notifier,
            gate: PauseGate::new(Duration::from_secs(config.pause_secs)),
            frame_interval: Duration::from_millis(config.frame_interval_ms),
            quit,
        }
    }

    pub fn step(&mut self, now: Instant) -> Step {
        if self.gate.is_paused(now) {
            return Step::Paused(self.gate.remaining(now));
        }

        let frame = match self.source.capture() {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, "frame capture failed");
                return Step::Failed;
            }
        };
        if frame.is_dark() {
            return Step::Dark;
        }
        let png = match frame.to_png() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "frame encoding failed");
                return Step::Failed;
            }
        };

        match self.sink.check_in(png) {
            Ok(CheckIn {
                recognition: Recognition::Matched { name, .. },
                recorded,
            }) => {
                self.gate.pause(&name, now);
                self.notifier.notify(&name);
                tracing::info!(%name, recorded, "kiosk check-in");
                Step::Validated { name, recorded }
            }
            Ok(_) => Step::Unknown,
            Err(EngineError::Core(presence_core::Error::NoFaceDetected)) => Step::NoFace,
            Err(e) => {
                tracing::warn!(error = %e, "kiosk check-in failed");
                Step::Failed
            }
        }
    }

    /// Loop until the quit flag is set.
    pub fn run(&mut self) {
        tracing::info!("kiosk running");
        while !self.quit.load(Ordering::Relaxed) {
            let wait = match self.step(Instant::now()) {
                Step::Paused(remaining) => remaining.min(self.frame_interval),
                _ => self.frame_interval,
            };
            std::thread::sleep(wait);
        }
        tracing::info!("kiosk stopped");
    }
}

/// Open the camera and run the kiosk on its own thread.
pub fn spawn_kiosk(
    config: KioskConfig,
    engine: EngineHandle,
    notifier: Box<dyn Notifier>,
    quit: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("presence-kiosk".into())
        .spawn(move || {
            let camera = match Camera::open(&config.camera_device, config.width, config.height) {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!(device = %config.camera_device, error = %e, "kiosk disabled");
                    return;
                }
            };
            let stream = match camera.stream() {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(error = %e, "kiosk disabled");
                    return;
                }
            };
            Kiosk::new(stream, engine, notifier, &config, quit).run();
        })
}
