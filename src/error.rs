//! Error types for windtrail.
//!
//! Configuration problems are reported before any GPU work happens.
//! GPU failures (adapter, device, allocation, readback) are propagated to the
//! caller unchanged. Particles leaving the field are never an error; they are
//! handled by the drop-rate bump every frame.

use std::fmt;

use crate::lifecycle::PipelineState;

/// Invalid input detected while validating a field, colour table or options.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// `max_particles` was zero.
    NoParticles,
    /// An axis with more than one grid node has `max <= min`.
    DegenerateBounds {
        axis: &'static str,
        min: f32,
        max: f32,
    },
    /// An axis has zero grid nodes.
    GridTooSmall { axis: &'static str },
    /// A U or V array does not match the grid dimensions.
    FieldSizeMismatch {
        component: &'static str,
        expected: usize,
        actual: usize,
    },
    /// The colour table has no entries.
    EmptyColorTable,
    /// A scalar option is out of its valid range or not finite.
    InvalidOption {
        name: &'static str,
        value: f32,
        reason: &'static str,
    },
    /// The visible region does not overlap the field.
    EmptySeedRegion,
    /// The render surface has a zero dimension.
    EmptySurface { width: u32, height: u32 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoParticles => write!(f, "max_particles must be greater than zero"),
            ConfigError::DegenerateBounds { axis, min, max } => write!(
                f,
                "Degenerate {} bounds: max ({}) must be greater than min ({})",
                axis, max, min
            ),
            ConfigError::GridTooSmall { axis } => {
                write!(f, "Field grid needs at least one {} node", axis)
            }
            ConfigError::FieldSizeMismatch {
                component,
                expected,
                actual,
            } => write!(
                f,
                "Field component {} has {} values, grid expects {}",
                component, actual, expected
            ),
            ConfigError::EmptyColorTable => write!(f, "Colour table must contain at least one colour"),
            ConfigError::InvalidOption { name, value, reason } => {
                write!(f, "Invalid option {} = {}: {}", name, value, reason)
            }
            ConfigError::EmptySeedRegion => {
                write!(f, "Visible lon/lat range does not overlap the field bounds")
            }
            ConfigError::EmptySurface { width, height } => {
                write!(f, "Render surface must be non-empty, got {}x{}", width, height)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors that can occur while talking to the GPU.
#[derive(Debug)]
pub enum GpuError {
    /// No compatible GPU adapter found.
    NoAdapter,
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
    /// Failed to map buffer for reading.
    BufferMapping(String),
    /// A buffer, texture or pipeline could not be created.
    Allocation(String),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::NoAdapter => write!(f, "No compatible GPU adapter found. Ensure your system has a GPU with WebGPU/Vulkan/Metal/DX12 support."),
            GpuError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
            GpuError::BufferMapping(msg) => write!(f, "Failed to map GPU buffer: {}", msg),
            GpuError::Allocation(msg) => write!(f, "GPU resource allocation failed: {}", msg),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::DeviceCreation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        GpuError::DeviceCreation(e)
    }
}

/// Errors returned by [`ParticleSystem`](crate::ParticleSystem) operations.
#[derive(Debug)]
pub enum PipelineError {
    /// Invalid configuration; nothing was allocated.
    Config(ConfigError),
    /// GPU failure while allocating or reading back resources.
    Gpu(GpuError),
    /// The operation is not allowed in the current pipeline state.
    InvalidState {
        operation: &'static str,
        state: PipelineState,
    },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Config(e) => write!(f, "Configuration error: {}", e),
            PipelineError::Gpu(e) => write!(f, "GPU error: {}", e),
            PipelineError::InvalidState { operation, state } => {
                write!(f, "Cannot {} while pipeline is {:?}", operation, state)
            }
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Config(e) => Some(e),
            PipelineError::Gpu(e) => Some(e),
            PipelineError::InvalidState { .. } => None,
        }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(e: ConfigError) -> Self {
        PipelineError::Config(e)
    }
}

impl From<GpuError> for PipelineError {
    fn from(e: GpuError) -> Self {
        PipelineError::Gpu(e)
    }
}
