//! Built-in graph nodes.
//!
//! Nodes are organized into three categories:
//!
//! ## Sources ([`source`])
//!
//! - [`Clip`] - Play a mono clip held in memory
//!
//! ## Effects ([`effect`])
//!
//! - [`SpatialNode`] - Mix every input as a moving source in 3D space
//!
//! ## Sinks ([`sink`])
//!
//! - [`Capture`] - Write interleaved samples to a ring buffer
//!
//! # Message Types
//!
//! - [`ClipMessage`] - Control [`Clip`] playback
//! - [`SpatialMessage`] - Move the listener and sources of a [`SpatialNode`]
//!
//! [`Capture`] has no parameters and uses `()` as its message type.

pub mod effect;
pub mod sink;
pub mod source;

pub use effect::{SpatialMessage, SpatialNode};
pub use sink::Capture;
pub use source::{Clip, ClipMessage};
