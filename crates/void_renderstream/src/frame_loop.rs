//! Frame exchange loop
//!
//! A tick-driven state machine polled once per engine frame. Each tick
//! performs one timed wait on the plugin and reacts to the result:
//!
//! ```text
//!   Idle ──start──▶ AwaitingFrame ◀──────────────┐
//!                    │   │   │                   │ timeout / streams changed
//!                    │   │   └───────────────────┘
//!                    │   │ frame for another scene
//!                    │   ▼
//!                    │  SceneSwitchPending ──▶ Terminated
//!                    │ frame                       ▲
//!                    ▼                             │ quit / fatal error
//!                  Exchanging ──▶ AwaitingFrame ───┘
//! ```
//!
//! A session runs at most one loop at a time. A scene switch ends the loop
//! cleanly; a new loop is started once the host has loaded the scene.
//! Dropping a running loop also frees the session for a new one.

use crate::binder::ApplyReport;
use crate::config::SceneControl;
use crate::error::BridgeError;
use crate::session::{LoopLatch, Session};
use void_renderstream_sys::RenderStreamError;

/// Frame loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Not started
    Idle,
    /// Waiting on the plugin for frame data
    AwaitingFrame,
    /// The host selected another scene; the loop ends on the next tick
    SceneSwitchPending { scene: u32 },
    /// Fetching and applying the frame's parameters
    Exchanging,
    /// Finished; the loop does nothing further
    Terminated,
}

/// What one tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No frame within the timeout; the wait is reissued next tick
    Timeout,
    /// The stream set was renegotiated
    StreamsChanged,
    /// A frame's parameters were applied
    Applied(ApplyReport),
    /// A frame arrived but its parameters were not applied
    FrameSkipped,
    /// A scene load was requested and the loop is ending
    SceneSwitch { scene: u32 },
    /// The host asked the application to exit
    Quit,
    Terminated,
}

/// The engine side of host signals
pub trait HostEnvironment {
    /// Build index of the loaded engine scene
    fn active_scene(&self) -> u32;

    /// Request a scene load; completes after the current loop has ended
    fn load_scene(&mut self, scene: u32);

    /// Request process exit
    fn quit(&mut self);
}

/// One run of the frame exchange
#[derive(Debug)]
pub struct FrameLoop {
    state: LoopState,
    /// Frames received by this loop
    frames: u64,
    latch: Option<LoopLatch>,
}

impl FrameLoop {
    pub fn new() -> Self {
        Self {
            state: LoopState::Idle,
            frames: 0,
            latch: None,
        }
    }

    /// Start a loop unless one already runs on this session
    pub fn start(session: &mut Session) -> Option<Self> {
        let Some(latch) = session.begin_awaiting() else {
            log::debug!("Frame loop already running");
            return None;
        };
        Some(Self {
            state: LoopState::AwaitingFrame,
            frames: 0,
            latch: Some(latch),
        })
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn is_running(&self) -> bool {
        !matches!(self.state, LoopState::Idle | LoopState::Terminated)
    }

    fn terminate(&mut self) {
        if self.state != LoopState::Terminated {
            log::debug!("Frame loop terminated after {} frames", self.frames);
        }
        self.state = LoopState::Terminated;
        self.latch = None;
    }

    /// Advance by one engine tick
    pub fn tick(&mut self, session: &mut Session, host: &mut dyn HostEnvironment) -> TickOutcome {
        match self.state {
            LoopState::Idle => {
                let Some(latch) = session.begin_awaiting() else {
                    log::debug!("Frame loop already running");
                    return TickOutcome::Terminated;
                };
                self.latch = Some(latch);
                self.state = LoopState::AwaitingFrame;
            }
            LoopState::SceneSwitchPending { .. } | LoopState::Terminated => {
                self.state = LoopState::Terminated;
                return TickOutcome::Terminated;
            }
            LoopState::AwaitingFrame | LoopState::Exchanging => {}
        }

        self.state = LoopState::AwaitingFrame;
        let frame = match session.await_frame() {
            Ok(frame) => frame,
            Err(BridgeError::Native(RenderStreamError::Timeout)) => return TickOutcome::Timeout,
            Err(BridgeError::Native(RenderStreamError::StreamsChanged)) => {
                log::info!("Streams changed");
                if let Err(err) = session.refresh_streams() {
                    log::error!("Failed to get streams: {}", err);
                }
                return TickOutcome::StreamsChanged;
            }
            Err(BridgeError::Native(RenderStreamError::Quit)) => {
                log::info!("Quit requested by host");
                host.quit();
                self.terminate();
                return TickOutcome::Quit;
            }
            Err(err) if err.is_session_ending() => {
                log::error!("Frame loop stopped: {}", err);
                self.terminate();
                return TickOutcome::Terminated;
            }
            Err(err) => {
                log::error!("Failed to await frame data: {}", err);
                return TickOutcome::FrameSkipped;
            }
        };
        self.frames += 1;

        if session.config().scene_control == SceneControl::Selection && host.active_scene() != frame.scene {
            log::info!("Switching to scene {}", frame.scene);
            session.discard_frame();
            host.load_scene(frame.scene);
            self.state = LoopState::SceneSwitchPending { scene: frame.scene };
            self.latch = None;
            return TickOutcome::SceneSwitch { scene: frame.scene };
        }

        if session.schema().scene(frame.scene).is_none() {
            log::warn!(
                "Frame selects scene {}, schema has {}",
                frame.scene,
                session.schema().scenes.len()
            );
            return TickOutcome::FrameSkipped;
        }

        self.state = LoopState::Exchanging;
        let result = session
            .fetch_payload(frame.scene)
            .and_then(|payload| session.apply_payload(frame.scene, &payload));
        self.state = LoopState::AwaitingFrame;

        match result {
            Ok(report) => TickOutcome::Applied(report),
            Err(err) => {
                log::error!("Failed to apply frame parameters: {}", err);
                TickOutcome::FrameSkipped
            }
        }
    }
}

impl Default for FrameLoop {
    fn default() -> Self {
        Self::new()
    }
}
