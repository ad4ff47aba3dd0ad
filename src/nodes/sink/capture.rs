//! Ring buffer sink for getting rendered audio out of a graph

use dasp_graph::{Buffer, Input};
use rtrb::Producer;

use crate::node::{AudioNode, ProcessContext};

/// A sink that pushes interleaved samples into an rtrb ring buffer.
///
/// Reads the first upstream node. Upstream channel `n` lands at interleaved
/// position `n`; if the upstream node has fewer channels than the capture,
/// its last channel is repeated. A block that doesn't fit in the ring buffer
/// is dropped whole.
pub struct Capture {
    producer: Producer<f32>,
    channels: usize,
}

impl Capture {
    pub fn new(producer: Producer<f32>, channels: usize) -> Self {
        Self {
            producer,
            channels: channels.max(1),
        }
    }

    pub fn mono(producer: Producer<f32>) -> Self {
        Self::new(producer, 1)
    }

    pub fn stereo(producer: Producer<f32>) -> Self {
        Self::new(producer, 2)
    }

    /// Sample slots left in the ring buffer.
    #[inline]
    pub fn available(&self) -> usize {
        self.producer.slots()
    }
}

impl AudioNode for Capture {
    type Message = ();

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        _messages: impl Iterator<Item = ()>,
        inputs: &[Input],
        _outputs: &mut [Buffer],
    ) {
        let Some(input) = inputs.first() else {
            return;
        };
        let buffers = input.buffers();
        let Some(last) = buffers.len().checked_sub(1) else {
            return;
        };

        let channels = self.channels;
        let frames = buffers[0].len();
        let Ok(chunk) = self.producer.write_chunk_uninit(frames * channels) else {
            return;
        };

        let samples =
            (0..frames).flat_map(|i| (0..channels).map(move |ch| buffers[ch.min(last)][i]));
        chunk.fill_from_iter(samples);
    }

    #[inline]
    fn num_inputs(&self) -> usize {
        1
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MixGraph;
    use crate::nodes::Clip;
    use rtrb::RingBuffer;

    #[test]
    fn repeats_last_upstream_channel() {
        let (producer, mut consumer) = RingBuffer::new(512);
        let mut graph = MixGraph::new(48000);
        let clip = graph.add(Clip::new((1..=64).map(|i| i as f32).collect()));
        let capture = graph.add(Capture::new(producer, 3));
        graph.connect(&clip, &capture);
        graph.output(&capture);

        graph.process();
        assert_eq!(consumer.slots(), Buffer::LEN * 3);
        let first: Vec<f32> = (0..6).map(|_| consumer.pop().unwrap()).collect();
        assert_eq!(first, [1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn full_ring_drops_the_whole_block() {
        let (producer, consumer) = RingBuffer::new(Buffer::LEN + 1);
        let mut graph = MixGraph::new(48000);
        let clip = graph.add(Clip::new(vec![0.5; 256]));
        let capture = graph.add(Capture::stereo(producer));
        graph.connect(&clip, &capture);
        graph.output(&capture);

        graph.process();
        assert_eq!(consumer.slots(), 0);
    }
}
