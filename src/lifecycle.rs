//! Pipeline lifecycle state machine.
//!
//! ```text
//! Uninitialized ──build──▶ Ready ──frame──▶ Running
//!                           ▲  │               │
//!                           │  ├──▶ Resizing ──┤
//!                           │  └──▶ Refreshing ┘
//!                           └──── (rebuilt) ◀──┘
//! any ──dispose──▶ Disposed
//! ```
//!
//! Rendering and every transition take `&mut ParticleSystem`, so a resize
//! or refresh can only run between frames, after the previous frame's
//! commands were submitted. Replaced resources are still released only
//! once the GPU has finished that submission.

use crate::error::PipelineError;

/// Where the pipeline is in its life.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing allocated yet.
    Uninitialized,
    /// All resources valid, no frame rendered since they were (re)built.
    Ready,
    /// Frames are being rendered.
    Running,
    /// Screen-sized resources are being replaced.
    Resizing,
    /// Particle resources are being replaced and reseeded.
    Refreshing,
    /// All resources released. Terminal.
    Disposed,
}

/// Structural change requested by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionKind {
    Resize,
    Refresh,
}

impl TransitionKind {
    fn state(self) -> PipelineState {
        match self {
            TransitionKind::Resize => PipelineState::Resizing,
            TransitionKind::Refresh => PipelineState::Refreshing,
        }
    }

    fn operation(self) -> &'static str {
        match self {
            TransitionKind::Resize => "resize",
            TransitionKind::Refresh => "refresh",
        }
    }
}

#[derive(Debug)]
pub struct Lifecycle {
    state: PipelineState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Uninitialized,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Resources were built (or rebuilt after a transition).
    pub fn mark_ready(&mut self) -> Result<(), PipelineError> {
        match self.state {
            PipelineState::Uninitialized | PipelineState::Resizing | PipelineState::Refreshing => {
                self.state = PipelineState::Ready;
                Ok(())
            }
            state => Err(PipelineError::InvalidState {
                operation: "finish initialization",
                state,
            }),
        }
    }

    /// Start encoding a frame.
    pub fn begin_frame(&mut self) -> Result<(), PipelineError> {
        match self.state {
            PipelineState::Ready | PipelineState::Running => {
                self.state = PipelineState::Running;
                Ok(())
            }
            state => Err(PipelineError::InvalidState {
                operation: "render",
                state,
            }),
        }
    }

    /// Start replacing resources.
    pub fn begin_transition(&mut self, kind: TransitionKind) -> Result<(), PipelineError> {
        match self.state {
            // A failed rebuild leaves the state in Resizing/Refreshing; retrying is allowed.
            PipelineState::Ready
            | PipelineState::Running
            | PipelineState::Resizing
            | PipelineState::Refreshing => {
                self.state = kind.state();
                Ok(())
            }
            state => Err(PipelineError::InvalidState {
                operation: kind.operation(),
                state,
            }),
        }
    }

    /// Enter the terminal state. Returns `false` if already disposed.
    pub fn dispose(&mut self) -> bool {
        let was_live = self.state != PipelineState::Disposed;
        self.state = PipelineState::Disposed;
        was_live
    }
}
