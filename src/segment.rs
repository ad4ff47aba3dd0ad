//! The segment contract shared by every processing node.
//!
//! A segment is configured through a small, fixed set of operations
//! addressed by a [`Field`] and, for wiring, a [`Location`]. This keeps the
//! surface identical across segment kinds: a graph runner can wire and tune a
//! spatial mixer the same way it would any other segment, without knowing its
//! concrete type.
//!
//! Buffers never move through this interface; only [`BufferHandle`]s do. The
//! samples stay in the caller's [`BufferPool`], which is lent to
//! [`Segment::mix`] for the duration of one block.

use core::fmt;
use std::collections::TryReserveError;

use glam::Vec3;
use thiserror::Error;

use crate::attenuation::Attenuation;
use crate::buffer::{BufferHandle, BufferPool};

/// Configuration keys understood by segments.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Field {
    /// A wired sample buffer.
    Buffer,
    /// Position, 3 floats.
    Location,
    /// Velocity in distance units per second, 3 floats.
    Velocity,
    /// Facing direction, 3 floats.
    Direction,
    /// Up vector, 3 floats.
    Up,
    SoundSpeed,
    DopplerFactor,
    MinDistance,
    MaxDistance,
    Rolloff,
    /// Attenuation curve selector or custom function.
    Attenuation,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Buffer => "buffer",
            Field::Location => "location",
            Field::Velocity => "velocity",
            Field::Direction => "direction",
            Field::Up => "up",
            Field::SoundSpeed => "sound speed",
            Field::DopplerFactor => "doppler factor",
            Field::MinDistance => "min distance",
            Field::MaxDistance => "max distance",
            Field::Rolloff => "rolloff",
            Field::Attenuation => "attenuation",
        };
        f.write_str(name)
    }
}

/// Addresses an input or output slot of a segment.
///
/// `Left` and `Right` name the first two output channels. `Index` addresses
/// variable-arity inputs and, for outputs, channels by position.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Location {
    Left,
    Right,
    Index(usize),
}

impl Location {
    /// Position of this location in an output channel list.
    #[inline]
    pub fn channel(self) -> usize {
        match self {
            Location::Left => 0,
            Location::Right => 1,
            Location::Index(i) => i,
        }
    }
}

impl From<usize> for Location {
    fn from(index: usize) -> Self {
        Location::Index(index)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Left => f.write_str("left"),
            Location::Right => f.write_str("right"),
            Location::Index(i) => write!(f, "#{i}"),
        }
    }
}

/// A value read from or written to a [`Field`].
#[derive(Clone, Copy, Debug)]
pub enum Value {
    /// `None` unwires (or, for inputs, removes) the slot.
    Buffer(Option<BufferHandle>),
    Vector(Vec3),
    Scalar(f32),
    Attenuation(Attenuation),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Buffer(_) => "buffer",
            Value::Vector(_) => "vector",
            Value::Scalar(_) => "scalar",
            Value::Attenuation(_) => "attenuation",
        }
    }

    pub fn as_buffer(&self) -> Option<Option<BufferHandle>> {
        match *self {
            Value::Buffer(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<Vec3> {
        match *self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<f32> {
        match *self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_attenuation(&self) -> Option<Attenuation> {
        match *self {
            Value::Attenuation(a) => Some(a),
            _ => None,
        }
    }
}

impl From<BufferHandle> for Value {
    fn from(handle: BufferHandle) -> Self {
        Value::Buffer(Some(handle))
    }
}

impl From<Option<BufferHandle>> for Value {
    fn from(handle: Option<BufferHandle>) -> Self {
        Value::Buffer(handle)
    }
}

impl From<Vec3> for Value {
    fn from(v: Vec3) -> Self {
        Value::Vector(v)
    }
}

impl From<[f32; 3]> for Value {
    fn from(v: [f32; 3]) -> Self {
        Value::Vector(Vec3::from(v))
    }
}

impl From<f32> for Value {
    fn from(s: f32) -> Self {
        Value::Scalar(s)
    }
}

impl From<Attenuation> for Value {
    fn from(a: Attenuation) -> Self {
        Value::Attenuation(a)
    }
}

/// Capability flags reported in [`SegmentInfo`].
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct SegmentFlags {
    /// The segment rewrites its input buffers during `mix`, so they can't be
    /// shared read-only with other consumers.
    pub modifies_source: bool,
}

/// Static description of a segment.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SegmentInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub flags: SegmentFlags,
    pub min_inputs: usize,
    /// `None` means unbounded.
    pub max_inputs: Option<usize>,
    pub outputs: usize,
}

/// Everything that can go wrong configuring or running a segment.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// The field isn't addressable through this operation.
    #[error("invalid field: {field}")]
    InvalidField { field: Field },

    /// No such input or output slot.
    #[error("invalid location: {location}")]
    InvalidLocation { location: Location },

    /// Wrong value type, or a value that breaks an invariant.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: Field, reason: &'static str },

    #[error("out of memory")]
    OutOfMemory(#[from] TryReserveError),

    /// `mix` was called before every output channel had a buffer.
    #[error("output channel {channel} has no buffer wired")]
    NotReady { channel: usize },

    /// A handle no longer refers to a buffer in the pool.
    #[error("buffer {handle:?} is no longer in the pool")]
    StaleBuffer { handle: BufferHandle },

    #[error("buffer {handle:?} holds {capacity} samples, {requested} requested")]
    BufferTooSmall {
        handle: BufferHandle,
        capacity: usize,
        requested: usize,
    },

    /// An output buffer is wired twice, or also wired as an input.
    #[error("output buffer {handle:?} is aliased")]
    AliasedOutput { handle: BufferHandle },
}

impl SegmentError {
    pub(crate) fn wrong_type(field: Field) -> Self {
        SegmentError::InvalidValue {
            field,
            reason: "wrong value type",
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

pub(crate) use sealed::Sealed;

/// The uniform lifecycle/configuration/processing interface.
///
/// Implemented only by segment kinds in this crate. Dropping a segment
/// releases its state; buffers it referenced stay in their pool.
pub trait Segment: Sealed + Send + fmt::Debug {
    /// Static metadata.
    fn info(&self) -> SegmentInfo;

    /// Wire, replace or remove an input, or set per-input state.
    fn set_in(&mut self, field: Field, location: Location, value: Value) -> Result<(), SegmentError>;

    /// Read per-input state.
    fn get_in(&self, field: Field, location: Location) -> Result<Value, SegmentError>;

    /// Wire or unwire an output, or set per-output state.
    fn set_out(&mut self, field: Field, location: Location, value: Value) -> Result<(), SegmentError>;

    /// Read segment-wide configuration.
    fn get(&self, field: Field) -> Result<Value, SegmentError>;

    /// Write segment-wide configuration.
    fn set(&mut self, field: Field, value: Value) -> Result<(), SegmentError>;

    /// Process `samples` samples from every wired input into every wired
    /// output.
    fn mix(&mut self, samples: usize, pool: &mut BufferPool) -> Result<(), SegmentError>;
}
