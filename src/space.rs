//! The spatial mixing segment.
//!
//! [`SpaceMixer`] combines any number of moving point sources into one
//! output buffer per ear. Each source is attenuated by its distance to the
//! ear and pitch-shifted by the Doppler ratio between it and the listener.

use glam::Vec3;
use itertools::Itertools;
use tracing::{debug, trace};

use crate::attenuation::Attenuation;
use crate::buffer::{BufferHandle, BufferPool};
use crate::doppler::{self, Kinematics};
use crate::pitch::{FftPlan, PitchShifter, FRAME_SIZE, OVERSAMPLING};
use crate::segment::{
    Field, Location, Sealed, Segment, SegmentError, SegmentFlags, SegmentInfo, Value,
};

/// Propagation constants for a [`SpaceMixer`].
///
/// Distances are in arbitrary world units; the defaults assume centimetres.
#[derive(Clone, Copy, Debug)]
pub struct SpaceConfig {
    /// Speed of sound in world units per second.
    pub sound_speed: f32,
    /// `0` disables Doppler entirely.
    pub doppler_factor: f32,
    /// Distance below which no attenuation is applied.
    pub min_distance: f32,
    /// Distance beyond which attenuation stops increasing.
    pub max_distance: f32,
    /// Steepness of the attenuation curve. Must not be negative; `0` keeps
    /// every curve at unity gain.
    pub rolloff: f32,
    pub attenuation: Attenuation,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            sound_speed: 34330.0,
            doppler_factor: 1.0,
            min_distance: 1.0,
            max_distance: 10000.0,
            rolloff: 0.5,
            attenuation: Attenuation::Exponential,
        }
    }
}

impl SpaceConfig {
    pub fn with_sound_speed(mut self, sound_speed: f32) -> Self {
        self.sound_speed = sound_speed;
        self
    }

    pub fn with_doppler_factor(mut self, doppler_factor: f32) -> Self {
        self.doppler_factor = doppler_factor;
        self
    }

    /// Set both ends of the audible range.
    pub fn with_distance_range(mut self, min: f32, max: f32) -> Self {
        self.min_distance = min;
        self.max_distance = max;
        self
    }

    pub fn with_rolloff(mut self, rolloff: f32) -> Self {
        self.rolloff = rolloff;
        self
    }

    pub fn with_attenuation(mut self, attenuation: Attenuation) -> Self {
        self.attenuation = attenuation;
        self
    }

    /// Check every constant against the mixer's invariants.
    pub fn validate(&self) -> Result<(), SegmentError> {
        finite(Field::SoundSpeed, self.sound_speed)?;
        finite(Field::DopplerFactor, self.doppler_factor)?;
        finite(Field::MinDistance, self.min_distance)?;
        finite(Field::MaxDistance, self.max_distance)?;
        finite(Field::Rolloff, self.rolloff)?;

        if self.sound_speed <= 0.0 {
            return Err(SegmentError::InvalidValue {
                field: Field::SoundSpeed,
                reason: "must be positive",
            });
        }
        if self.min_distance <= 0.0 {
            return Err(SegmentError::InvalidValue {
                field: Field::MinDistance,
                reason: "must be positive",
            });
        }
        if self.rolloff < 0.0 {
            return Err(SegmentError::InvalidValue {
                field: Field::Rolloff,
                reason: "must not be negative",
            });
        }
        if self.min_distance > self.max_distance {
            return Err(SegmentError::InvalidValue {
                field: Field::MaxDistance,
                reason: "must not be below min distance",
            });
        }
        Ok(())
    }
}

fn finite(field: Field, value: f32) -> Result<f32, SegmentError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SegmentError::InvalidValue {
            field,
            reason: "must be finite",
        })
    }
}

fn finite_vector(field: Field, value: Value) -> Result<Vec3, SegmentError> {
    let v = value
        .as_vector()
        .ok_or_else(|| SegmentError::wrong_type(field))?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(SegmentError::InvalidValue {
            field,
            reason: "must be finite",
        })
    }
}

fn scalar(field: Field, value: Value) -> Result<f32, SegmentError> {
    let s = value
        .as_scalar()
        .ok_or_else(|| SegmentError::wrong_type(field))?;
    finite(field, s)
}

/// An output channel: a buffer placed at an offset from the listener.
#[derive(Clone, Debug, PartialEq)]
pub struct Channel {
    pub name: String,
    /// Offset from the listener along world axes.
    pub offset: Vec3,
    pub buffer: Option<BufferHandle>,
}

impl Channel {
    pub fn new(name: impl Into<String>, offset: Vec3) -> Self {
        Self {
            name: name.into(),
            offset,
            buffer: None,
        }
    }

    pub fn left() -> Self {
        Self::new("left", Vec3::new(-7.5, 0.0, 0.0))
    }

    pub fn right() -> Self {
        Self::new("right", Vec3::new(7.5, 0.0, 0.0))
    }
}

#[derive(Debug)]
struct Source {
    buffer: BufferHandle,
    kinematics: Kinematics,
    shifter: PitchShifter,
    /// Whether the shifter ran on the previous block.
    shifting: bool,
}

impl Source {
    fn stop_shifting(&mut self) {
        if self.shifting {
            self.shifter.reset();
            self.shifting = false;
        }
    }
}

/// A segment mixing moving sources into per-ear outputs.
///
/// Sources are wired with `set_in(Field::Buffer, Location::Index(n), ..)`:
/// `n == count` appends, `n < count` replaces the buffer and `None` removes
/// the source. Ears are wired with `set_out`.
///
/// ```
/// use glam::Vec3;
/// use raumklang::{BufferPool, Field, Location, Segment, SpaceMixer};
///
/// let mut pool = BufferPool::new();
/// let left = pool.allocate(256);
/// let right = pool.allocate(256);
/// let voice = pool.allocate(256);
///
/// let mut space = SpaceMixer::new(48000);
/// space.set_out(Field::Buffer, Location::Left, left.into())?;
/// space.set_out(Field::Buffer, Location::Right, right.into())?;
/// space.set_in(Field::Buffer, Location::Index(0), voice.into())?;
/// space.set_in(Field::Location, Location::Index(0), Vec3::new(0.0, 0.0, 200.0).into())?;
///
/// space.mix(256, &mut pool)?;
/// assert_eq!(pool.get(left).map(|b| b.filled()), Some(256));
/// # Ok::<(), raumklang::SegmentError>(())
/// ```
#[derive(Debug)]
pub struct SpaceMixer {
    sample_rate: u32,
    config: SpaceConfig,
    listener: Kinematics,
    direction: Vec3,
    up: Vec3,
    channels: Vec<Channel>,
    sources: Vec<Source>,
    plan: FftPlan,
}

impl SpaceMixer {
    /// Stereo mixer with default acoustics.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            config: SpaceConfig::default(),
            listener: Kinematics::default(),
            direction: Vec3::Z,
            up: Vec3::Y,
            channels: vec![Channel::left(), Channel::right()],
            sources: Vec::new(),
            plan: FftPlan::new(FRAME_SIZE),
        }
    }

    pub fn with_config(sample_rate: u32, config: SpaceConfig) -> Result<Self, SegmentError> {
        config.validate()?;
        let mut mixer = Self::new(sample_rate);
        mixer.config = config;
        Ok(mixer)
    }

    /// Replace the output layout. At least one channel is required.
    ///
    /// Channels are addressed by position; `Location::Left` and
    /// `Location::Right` are aliases for the first two.
    pub fn with_channels(
        mut self,
        channels: impl IntoIterator<Item = Channel>,
    ) -> Result<Self, SegmentError> {
        let channels: Vec<Channel> = channels.into_iter().collect();
        if channels.is_empty() {
            return Err(SegmentError::InvalidValue {
                field: Field::Buffer,
                reason: "at least one output channel is required",
            });
        }
        self.channels = channels;
        Ok(self)
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn config(&self) -> &SpaceConfig {
        &self.config
    }

    #[inline]
    pub fn listener(&self) -> &Kinematics {
        &self.listener
    }

    #[inline]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    #[inline]
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Whether every output channel has a buffer, i.e. `mix` can run.
    pub fn is_ready(&self) -> bool {
        self.channels.iter().all(|c| c.buffer.is_some())
    }

    fn source_index(&self, location: Location) -> Result<usize, SegmentError> {
        match location {
            Location::Index(i) if i < self.sources.len() => Ok(i),
            _ => Err(SegmentError::InvalidLocation { location }),
        }
    }

    fn channel_index(&self, location: Location) -> Result<usize, SegmentError> {
        let i = location.channel();
        if i < self.channels.len() {
            Ok(i)
        } else {
            Err(SegmentError::InvalidLocation { location })
        }
    }

    fn append_source(&mut self, buffer: BufferHandle) -> Result<(), SegmentError> {
        self.sources.try_reserve(1)?;
        let shifter = PitchShifter::new(self.plan.clone(), OVERSAMPLING)?;
        self.sources.push(Source {
            buffer,
            kinematics: Kinematics::default(),
            shifter,
            shifting: false,
        });
        debug!(index = self.sources.len() - 1, ?buffer, "source appended");
        Ok(())
    }

    fn wire_source(
        &mut self,
        location: Location,
        buffer: Option<BufferHandle>,
    ) -> Result<(), SegmentError> {
        let Location::Index(index) = location else {
            return Err(SegmentError::InvalidLocation { location });
        };
        let count = self.sources.len();

        match buffer {
            Some(handle) if index < count => {
                self.note_shared_buffer(index, handle);
                let source = &mut self.sources[index];
                if source.buffer != handle {
                    source.buffer = handle;
                    source.stop_shifting();
                }
                debug!(index, buffer = ?handle, "source rewired");
                Ok(())
            }
            Some(handle) if index == count => {
                self.note_shared_buffer(index, handle);
                self.append_source(handle)
            }
            None if index < count => {
                self.sources.remove(index);
                debug!(index, remaining = count - 1, "source removed");
                Ok(())
            }
            _ => Err(SegmentError::InvalidLocation { location }),
        }
    }

    /// Sources sharing a buffer each pitch-shift it in place, so it is shifted
    /// once per source.
    fn note_shared_buffer(&self, index: usize, handle: BufferHandle) {
        if let Some(other) = self
            .sources
            .iter()
            .enumerate()
            .position(|(i, s)| i != index && s.buffer == handle)
        {
            debug!(index, other, buffer = ?handle, "buffer already wired to another source");
        }
    }

    /// Checks everything `mix` relies on before any buffer is written.
    fn check_buffers(&self, samples: usize, pool: &BufferPool) -> Result<(), SegmentError> {
        for (channel, c) in self.channels.iter().enumerate() {
            if c.buffer.is_none() {
                return Err(SegmentError::NotReady { channel });
            }
        }

        let outputs = self.channels.iter().filter_map(|c| c.buffer);
        let inputs = self.sources.iter().map(|s| s.buffer);
        for handle in outputs.clone().chain(inputs) {
            let buffer = pool
                .get(handle)
                .ok_or(SegmentError::StaleBuffer { handle })?;
            if buffer.capacity() < samples {
                return Err(SegmentError::BufferTooSmall {
                    handle,
                    capacity: buffer.capacity(),
                    requested: samples,
                });
            }
        }

        if let Some((handle, _)) = outputs.clone().tuple_combinations().find(|(a, b)| a == b) {
            return Err(SegmentError::AliasedOutput { handle });
        }
        if let Some(handle) = outputs
            .clone()
            .find(|h| self.sources.iter().any(|s| s.buffer == *h))
        {
            return Err(SegmentError::AliasedOutput { handle });
        }
        Ok(())
    }
}

impl Sealed for SpaceMixer {}

impl Segment for SpaceMixer {
    fn info(&self) -> SegmentInfo {
        SegmentInfo {
            name: "space",
            description: "Mixes multiple sources while simulating 3D space.",
            flags: SegmentFlags {
                modifies_source: true,
            },
            min_inputs: 0,
            max_inputs: None,
            outputs: self.channels.len(),
        }
    }

    fn set_in(&mut self, field: Field, location: Location, value: Value) -> Result<(), SegmentError> {
        match field {
            Field::Buffer => {
                let buffer = value
                    .as_buffer()
                    .ok_or_else(|| SegmentError::wrong_type(field))?;
                self.wire_source(location, buffer)
            }
            Field::Location => {
                let index = self.source_index(location)?;
                self.sources[index].kinematics.location = finite_vector(field, value)?;
                Ok(())
            }
            Field::Velocity => {
                let index = self.source_index(location)?;
                self.sources[index].kinematics.velocity = finite_vector(field, value)?;
                Ok(())
            }
            _ => Err(SegmentError::InvalidField { field }),
        }
    }

    fn get_in(&self, field: Field, location: Location) -> Result<Value, SegmentError> {
        let source = match field {
            Field::Buffer | Field::Location | Field::Velocity => {
                &self.sources[self.source_index(location)?]
            }
            _ => return Err(SegmentError::InvalidField { field }),
        };
        Ok(match field {
            Field::Buffer => Value::Buffer(Some(source.buffer)),
            Field::Location => Value::Vector(source.kinematics.location),
            _ => Value::Vector(source.kinematics.velocity),
        })
    }

    fn set_out(&mut self, field: Field, location: Location, value: Value) -> Result<(), SegmentError> {
        match field {
            Field::Buffer => {
                let buffer = value
                    .as_buffer()
                    .ok_or_else(|| SegmentError::wrong_type(field))?;
                let index = self.channel_index(location)?;
                self.channels[index].buffer = buffer;
                debug!(channel = %self.channels[index].name, ?buffer, "output wired");
                Ok(())
            }
            Field::Location => {
                let offset = finite_vector(field, value)?;
                let index = self.channel_index(location)?;
                self.channels[index].offset = offset;
                Ok(())
            }
            _ => Err(SegmentError::InvalidField { field }),
        }
    }

    fn get(&self, field: Field) -> Result<Value, SegmentError> {
        let value = match field {
            Field::Location => Value::Vector(self.listener.location),
            Field::Velocity => Value::Vector(self.listener.velocity),
            Field::Direction => Value::Vector(self.direction),
            Field::Up => Value::Vector(self.up),
            Field::SoundSpeed => Value::Scalar(self.config.sound_speed),
            Field::DopplerFactor => Value::Scalar(self.config.doppler_factor),
            Field::MinDistance => Value::Scalar(self.config.min_distance),
            Field::MaxDistance => Value::Scalar(self.config.max_distance),
            Field::Rolloff => Value::Scalar(self.config.rolloff),
            Field::Attenuation => Value::Attenuation(self.config.attenuation),
            Field::Buffer => return Err(SegmentError::InvalidField { field }),
        };
        Ok(value)
    }

    fn set(&mut self, field: Field, value: Value) -> Result<(), SegmentError> {
        match field {
            Field::Location => self.listener.location = finite_vector(field, value)?,
            Field::Velocity => self.listener.velocity = finite_vector(field, value)?,
            Field::Direction => self.direction = finite_vector(field, value)?,
            Field::Up => self.up = finite_vector(field, value)?,
            Field::Attenuation => {
                self.config.attenuation = value
                    .as_attenuation()
                    .ok_or_else(|| SegmentError::wrong_type(field))?;
            }
            Field::SoundSpeed
            | Field::DopplerFactor
            | Field::MinDistance
            | Field::MaxDistance
            | Field::Rolloff => {
                let s = scalar(field, value)?;
                let mut config = self.config;
                match field {
                    Field::SoundSpeed => config.sound_speed = s,
                    Field::DopplerFactor => config.doppler_factor = s,
                    Field::MinDistance => config.min_distance = s,
                    Field::MaxDistance => config.max_distance = s,
                    _ => config.rolloff = s,
                }
                config.validate()?;
                self.config = config;
            }
            Field::Buffer => return Err(SegmentError::InvalidField { field }),
        }
        Ok(())
    }

    fn mix(&mut self, samples: usize, pool: &mut BufferPool) -> Result<(), SegmentError> {
        self.check_buffers(samples, pool)?;

        let SpaceConfig {
            sound_speed,
            doppler_factor,
            min_distance,
            max_distance,
            rolloff,
            attenuation,
        } = self.config;

        trace!(sources = self.sources.len(), samples, "mixing block");

        for source in self.sources.iter_mut() {
            let ratio = doppler::pitch_ratio(
                &self.listener,
                &source.kinematics,
                sound_speed,
                doppler_factor,
            );
            if ratio == 1.0 {
                // Drop frames left over from the last movement
                source.stop_shifting();
                continue;
            }
            source.shifting = true;
            if let Some(buffer) = pool.get_mut(source.buffer) {
                source.shifter.process(ratio, &mut buffer.data_mut()[..samples]);
            }
        }

        for channel in &self.channels {
            let Some(handle) = channel.buffer else {
                continue;
            };
            let Some(mut output) = pool.take(handle) else {
                continue;
            };
            let ear = self.listener.location + channel.offset;
            let out = &mut output.data_mut()[..samples];

            if self.sources.is_empty() {
                out.fill(0.0);
            }

            for (i, source) in self.sources.iter().enumerate() {
                let Some(input) = pool.get(source.buffer) else {
                    continue;
                };
                let distance = ear
                    .distance(source.kinematics.location)
                    .clamp(min_distance, max_distance);
                let gain = attenuation.gain(min_distance, max_distance, distance, rolloff);
                let input = &input.data()[..samples];

                if i == 0 {
                    for (o, &x) in out.iter_mut().zip(input) {
                        *o = x * gain;
                    }
                } else {
                    for (o, &x) in out.iter_mut().zip(input) {
                        *o += x * gain;
                    }
                }
            }

            output.set_filled(samples);
            pool.restore(handle, output);
        }

        Ok(())
    }
}

/// Create a stereo spatial mixer behind the segment interface.
pub fn make_spatial_mixer(sample_rate: u32) -> Box<dyn Segment> {
    Box::new(SpaceMixer::new(sample_rate))
}
