//! Mono clip player.

use alloc::vec::Vec;
use dasp_graph::{Buffer, Input};

use crate::node::{AudioNode, ProcessContext};

/// Messages to control a [`Clip`].
#[derive(Clone, Copy, Debug)]
pub enum ClipMessage {
    /// Start or resume playback.
    Play,
    /// Pause playback (keeps position).
    Pause,
    /// Stop playback and rewind.
    Stop,
    SetLooping(bool),
}

/// Plays a mono clip held in memory.
///
/// Samples are played at the graph's rate; there is no resampling.
/// Playback starts immediately and writes silence once the clip has ended.
pub struct Clip {
    samples: Vec<f32>,
    position: usize,
    playing: bool,
    looping: bool,
}

impl Clip {
    pub fn new(samples: Vec<f32>) -> Self {
        Self {
            samples,
            position: 0,
            playing: true,
            looping: false,
        }
    }

    /// Restart from the beginning when the end is reached.
    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    /// Start paused; send [`ClipMessage::Play`] to begin.
    pub fn paused(mut self) -> Self {
        self.playing = false;
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Index of the next sample to play.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing
    }
}

impl AudioNode for Clip {
    type Message = ClipMessage;

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        messages: impl Iterator<Item = ClipMessage>,
        _inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        for msg in messages {
            match msg {
                ClipMessage::Play => self.playing = true,
                ClipMessage::Pause => self.playing = false,
                ClipMessage::Stop => {
                    self.playing = false;
                    self.position = 0;
                }
                ClipMessage::SetLooping(l) => self.looping = l,
            }
        }

        let Some(output) = outputs.first_mut() else {
            return;
        };

        if !self.playing || self.samples.is_empty() {
            output.iter_mut().for_each(|s| *s = 0.0);
            return;
        }

        for sample in output.iter_mut() {
            if self.position >= self.samples.len() {
                if self.looping {
                    self.position = 0;
                } else {
                    *sample = 0.0;
                    self.playing = false;
                    continue;
                }
            }
            *sample = self.samples[self.position];
            self.position += 1;
        }
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ProcessContext {
        ProcessContext {
            sample_rate: 48000,
            buffer_size: Buffer::LEN,
        }
    }

    fn run(clip: &mut Clip, messages: Vec<ClipMessage>) -> Vec<f32> {
        let mut out = [Buffer::SILENT];
        clip.process(&ctx(), messages.into_iter(), &[], &mut out);
        out[0].to_vec()
    }

    #[test]
    fn plays_then_falls_silent() {
        let mut clip = Clip::new((0..80).map(|i| i as f32).collect());
        let first = run(&mut clip, vec![]);
        assert_eq!(first[0], 0.0);
        assert_eq!(first[63], 63.0);

        let second = run(&mut clip, vec![]);
        assert_eq!(second[15], 79.0);
        assert!(second[16..].iter().all(|&s| s == 0.0));
        assert!(!clip.is_playing());
    }

    #[test]
    fn looping_wraps_around() {
        let mut clip = Clip::new(vec![1.0, 2.0, 3.0]).looping();
        let out = run(&mut clip, vec![]);
        assert_eq!(&out[..7], &[1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn stop_rewinds_and_play_resumes() {
        let mut clip = Clip::new(vec![0.5; 256]).paused();
        assert!(run(&mut clip, vec![]).iter().all(|&s| s == 0.0));

        run(&mut clip, vec![ClipMessage::Play]);
        assert_eq!(clip.position(), 64);

        let out = run(&mut clip, vec![ClipMessage::Stop]);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(clip.position(), 0);
    }
}
