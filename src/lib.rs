//! Raumklang - spatial audio mixing on a uniform segment interface
//!
//! The core is [`SpaceMixer`], a segment that mixes any number of moving
//! point sources into one buffer per ear, with distance attenuation and a
//! Doppler pitch shift per source. It is configured and driven through the
//! [`Segment`] trait, the same small field/location interface every segment
//! exposes:
//!
//! - `set_in` / `set_out` wire [`BufferHandle`]s into inputs and outputs
//! - `set` / `get` read and write listener state and propagation constants
//! - `mix` processes one block
//!
//! Sample storage lives in a [`BufferPool`] owned by the caller. Segments only
//! hold handles, which go stale when their buffer is removed from the pool.
//!
//! For block-based hosting, [`MixGraph`] runs [`AudioNode`]s in a
//! `dasp_graph` graph with lock-free message queues, and
//! [`nodes::SpatialNode`] puts a [`SpaceMixer`] in it.
//!
//! ```
//! use glam::Vec3;
//! use raumklang::{make_spatial_mixer, Attenuation, BufferPool, Field, Location, Segment};
//!
//! let mut pool = BufferPool::new();
//! let left = pool.allocate(512);
//! let right = pool.allocate(512);
//! let engine = pool.allocate(512);
//!
//! let mut space = make_spatial_mixer(48000);
//! space.set_out(Field::Buffer, Location::Left, left.into())?;
//! space.set_out(Field::Buffer, Location::Right, right.into())?;
//! space.set(Field::Attenuation, Attenuation::Inverse.into())?;
//!
//! space.set_in(Field::Buffer, Location::Index(0), engine.into())?;
//! space.set_in(Field::Location, Location::Index(0), Vec3::new(300.0, 0.0, 0.0).into())?;
//! space.set_in(Field::Velocity, Location::Index(0), Vec3::new(-2000.0, 0.0, 0.0).into())?;
//!
//! space.mix(512, &mut pool)?;
//! assert_eq!(space.get_in(Field::Buffer, Location::Index(0))?.as_buffer(), Some(Some(engine)));
//! # Ok::<(), raumklang::SegmentError>(())
//! ```

extern crate alloc;

pub mod attenuation;
pub mod buffer;
pub mod doppler;
pub mod pitch;
pub mod segment;
pub mod space;

mod graph;
mod node;
pub mod nodes;

pub use attenuation::{Attenuation, AttenuationFn};
pub use buffer::{Buffer, BufferHandle, BufferPool};
pub use doppler::Kinematics;
pub use graph::{Handle, MixGraph, DEFAULT_QUEUE_SIZE};
pub use node::{AudioNode, NodeId, ProcessContext};
pub use segment::{Field, Location, Segment, SegmentError, SegmentFlags, SegmentInfo, Value};
pub use space::{make_spatial_mixer, Channel, SpaceConfig, SpaceMixer};
