//! Graph node running a [`SpaceMixer`].

use alloc::vec::Vec;

use dasp_graph::{Buffer, Input};
use tracing::{debug, warn};

use crate::buffer::{BufferHandle, BufferPool};
use crate::node::{AudioNode, ProcessContext};
use crate::segment::{Field, Location, Segment, SegmentError, Value};
use crate::space::SpaceMixer;

/// Messages to control a [`SpatialNode`].
#[derive(Clone, Copy, Debug)]
pub enum SpatialMessage {
    /// Set listener state or a propagation constant.
    Set(Field, Value),
    /// Set the location or velocity of the source fed by input `index`.
    SetSource {
        index: usize,
        field: Field,
        value: Value,
    },
}

/// Hosts a [`SpaceMixer`] in a [`MixGraph`](crate::MixGraph).
///
/// Every upstream connection becomes a source: the first connection made is
/// source 0, the next source 1, and so on. Multi-channel upstream nodes are
/// averaged to mono. The node outputs one channel per ear.
///
/// Sources are created the first block their connection is seen, which
/// allocates on the processing thread. Wire the graph before starting
/// real-time playback.
pub struct SpatialNode {
    mixer: SpaceMixer,
    pool: BufferPool,
    sources: Vec<BufferHandle>,
    outputs: Vec<BufferHandle>,
}

impl SpatialNode {
    /// Wrap `mixer`, giving each of its channels a block-sized buffer.
    ///
    /// Any sources already wired into `mixer` are discarded.
    pub fn new(mut mixer: SpaceMixer) -> Result<Self, SegmentError> {
        let mut pool = BufferPool::new();

        while mixer.source_count() > 0 {
            let last = mixer.source_count() - 1;
            mixer.set_in(Field::Buffer, Location::Index(last), Value::Buffer(None))?;
        }

        let mut outputs = Vec::with_capacity(mixer.channels().len());
        for channel in 0..mixer.channels().len() {
            let handle = pool.allocate(Buffer::LEN);
            mixer.set_out(Field::Buffer, Location::Index(channel), handle.into())?;
            outputs.push(handle);
        }

        Ok(Self {
            mixer,
            pool,
            sources: Vec::new(),
            outputs,
        })
    }

    #[inline]
    pub fn mixer(&self) -> &SpaceMixer {
        &self.mixer
    }

    fn apply(&mut self, msg: SpatialMessage) -> Result<(), SegmentError> {
        match msg {
            SpatialMessage::Set(field, value) => self.mixer.set(field, value),
            // Source buffers belong to the node
            SpatialMessage::SetSource {
                field: field @ Field::Buffer,
                ..
            } => Err(SegmentError::InvalidField { field }),
            SpatialMessage::SetSource {
                index,
                field,
                value,
            } => self.mixer.set_in(field, Location::Index(index), value),
        }
    }

    /// Grow or shrink the source list to match the number of inputs.
    fn sync_sources(&mut self, inputs: usize) -> Result<(), SegmentError> {
        while self.sources.len() < inputs {
            let handle = self.pool.allocate(Buffer::LEN);
            let index = self.sources.len();
            if let Err(e) = self
                .mixer
                .set_in(Field::Buffer, Location::Index(index), handle.into())
            {
                self.pool.remove(handle);
                return Err(e);
            }
            self.sources.push(handle);
        }

        while self.sources.len() > inputs {
            let index = self.sources.len() - 1;
            self.mixer
                .set_in(Field::Buffer, Location::Index(index), Value::Buffer(None))?;
            if let Some(handle) = self.sources.pop() {
                self.pool.remove(handle);
            }
        }
        Ok(())
    }

    fn silence(outputs: &mut [Buffer]) {
        for buffer in outputs.iter_mut() {
            buffer.iter_mut().for_each(|s| *s = 0.0);
        }
    }
}

impl AudioNode for SpatialNode {
    type Message = SpatialMessage;

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        messages: impl Iterator<Item = SpatialMessage>,
        inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        if self.sources.len() != inputs.len() {
            debug!(from = self.sources.len(), to = inputs.len(), "source count changed");
            if let Err(e) = self.sync_sources(inputs.len()) {
                warn!(error = %e, "could not match sources to inputs");
                // Drain anyway so stale messages don't pile up
                messages.for_each(drop);
                Self::silence(outputs);
                return;
            }
        }

        for msg in messages {
            if let Err(e) = self.apply(msg) {
                warn!(error = %e, ?msg, "rejected spatial message");
            }
        }

        // Inputs arrive newest connection first
        for (handle, input) in self.sources.iter().zip(inputs.iter().rev()) {
            let Some(buffer) = self.pool.get_mut(*handle) else {
                continue;
            };
            let data = buffer.data_mut();
            let channels = input.buffers();
            match channels {
                [] => data.fill(0.0),
                [mono] => data.copy_from_slice(mono),
                _ => {
                    let scale = 1.0 / channels.len() as f32;
                    for (i, sample) in data.iter_mut().enumerate() {
                        *sample = channels.iter().map(|c| c[i]).sum::<f32>() * scale;
                    }
                }
            }
            buffer.set_filled(Buffer::LEN);
        }

        if let Err(e) = self.mixer.mix(Buffer::LEN, &mut self.pool) {
            warn!(error = %e, "spatial mix failed, writing silence");
            Self::silence(outputs);
            return;
        }

        for (out, handle) in outputs.iter_mut().zip(&self.outputs) {
            match self.pool.get(*handle) {
                Some(buffer) => out.copy_from_slice(buffer.samples()),
                None => out.iter_mut().for_each(|s| *s = 0.0),
            }
        }
    }

    #[inline]
    fn num_inputs(&self) -> usize {
        self.sources.len()
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        self.outputs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::Channel;
    use glam::Vec3;

    #[test]
    fn wires_one_buffer_per_channel() {
        let mixer = SpaceMixer::new(48000)
            .with_channels([
                Channel::left(),
                Channel::right(),
                Channel::new("centre", Vec3::ZERO),
            ])
            .unwrap();
        let node = SpatialNode::new(mixer).unwrap();
        assert_eq!(node.num_outputs(), 3);
        assert!(node.mixer().is_ready());
        assert_eq!(node.mixer().source_count(), 0);
    }

    #[test]
    fn prewired_sources_are_discarded() {
        let mut pool = BufferPool::new();
        let mut mixer = SpaceMixer::new(48000);
        let a = pool.allocate(64);
        mixer.set_in(Field::Buffer, Location::Index(0), a.into()).unwrap();

        let node = SpatialNode::new(mixer).unwrap();
        assert_eq!(node.mixer().source_count(), 0);
    }

    #[test]
    fn source_buffers_are_owned_by_the_node() {
        let mut node = SpatialNode::new(SpaceMixer::new(48000)).unwrap();
        let msg = SpatialMessage::SetSource {
            index: 0,
            field: Field::Buffer,
            value: Value::Buffer(None),
        };
        assert!(matches!(
            node.apply(msg),
            Err(SegmentError::InvalidField { field: Field::Buffer })
        ));
    }

    #[test]
    fn sync_follows_input_count() {
        let mut node = SpatialNode::new(SpaceMixer::new(48000)).unwrap();
        node.sync_sources(3).unwrap();
        assert_eq!(node.mixer().source_count(), 3);
        assert_eq!(node.pool.len(), 2 + 3);

        node.sync_sources(1).unwrap();
        assert_eq!(node.mixer().source_count(), 1);
        assert_eq!(node.pool.len(), 2 + 1);
    }
}
