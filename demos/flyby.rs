//! Example: a tone flying past the listener
//!
//! Renders a few seconds offline through a `MixGraph`: a custom tone node
//! feeds a `SpatialNode`, which is moved block by block along a straight line
//! passing 3 metres in front of the listener. Prints per-ear loudness as the
//! source sweeps from left to right.
//!
//! Run with: RUST_LOG=raumklang=debug cargo run --example flyby

use dasp_graph::{Buffer, Input};
use glam::Vec3;
use raumklang::nodes::{Capture, SpatialMessage, SpatialNode};
use raumklang::{AudioNode, Field, MixGraph, ProcessContext, SpaceMixer};
use rtrb::RingBuffer;
use tracing_subscriber::EnvFilter;

const SAMPLE_RATE: u32 = 48000;
const SECONDS: f32 = 4.0;
/// Centimetres per second, roughly 90 km/h.
const SPEED: f32 = 2500.0;

/// A sawtooth-ish tone, rich enough to hear the pitch drop.
struct Tone {
    frequency: f32,
    phase: f32,
}

impl AudioNode for Tone {
    type Message = ();

    fn process(
        &mut self,
        ctx: &ProcessContext,
        _messages: impl Iterator<Item = ()>,
        _inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        let inc = self.frequency / ctx.sample_rate as f32;
        for sample in outputs[0].iter_mut() {
            *sample = (self.phase * 2.0 - 1.0) * 0.2;
            self.phase = (self.phase + inc) % 1.0;
        }
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut graph = MixGraph::new(SAMPLE_RATE);
    let total_frames = (SECONDS * SAMPLE_RATE as f32) as usize;
    let (producer, mut consumer) = RingBuffer::new(total_frames * 2 + 1024);

    let mixer = SpaceMixer::new(SAMPLE_RATE);
    let tone = graph.add(Tone {
        frequency: 330.0,
        phase: 0.0,
    });
    let mut space = graph.add(SpatialNode::new(mixer).expect("default mixer is valid"));
    let capture = graph.add(Capture::stereo(producer));
    graph.connect(&tone, &space);
    graph.connect(&space, &capture);
    graph.output(&capture);

    let velocity = Vec3::new(SPEED, 0.0, 0.0);
    let start = Vec3::new(-SPEED * SECONDS / 2.0, 0.0, 300.0);
    space
        .send(SpatialMessage::SetSource {
            index: 0,
            field: Field::Velocity,
            value: velocity.into(),
        })
        .ok();

    let block = graph.block_size();
    let blocks = total_frames / block;
    for n in 0..blocks {
        let t = (n * block) as f32 / SAMPLE_RATE as f32;
        space
            .send(SpatialMessage::SetSource {
                index: 0,
                field: Field::Location,
                value: (start + velocity * t).into(),
            })
            .ok();
        graph.process();
    }

    let mut left = Vec::with_capacity(total_frames);
    let mut right = Vec::with_capacity(total_frames);
    while let (Ok(l), Ok(r)) = (consumer.pop(), consumer.pop()) {
        left.push(l);
        right.push(r);
    }

    let window = SAMPLE_RATE as usize / 4;
    println!("  time   left rms  right rms");
    for (i, (l, r)) in left.chunks(window).zip(right.chunks(window)).enumerate() {
        let secs = (i * window) as f32 / SAMPLE_RATE as f32;
        println!("{secs:6.2}s  {:9.5}  {:9.5}", rms(l), rms(r));
    }
}
