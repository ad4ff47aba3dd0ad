//! Streaming phase-vocoder pitch shifter.
//!
//! Shifts pitch without changing duration. Input is consumed in hops of
//! `frame_size / oversampling` samples; each hop runs one windowed FFT frame,
//! moves every bin's magnitude and true frequency up or down by the pitch
//! ratio, and overlap-adds the resynthesised frame. The output lags the input
//! by one frame ([`PitchShifter::latency`]).
//!
//! The working state carries phase history between calls, so every signal
//! needs its own `PitchShifter`. The FFT plans themselves are immutable and
//! are shared through [`FftPlan`].

use std::collections::TryReserveError;
use std::f32::consts::{PI, TAU};
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// Default analysis window length in samples.
pub const FRAME_SIZE: usize = 2048;
/// Default number of overlapping frames per window.
pub const OVERSAMPLING: usize = 16;

/// Forward and inverse FFTs of one size, shareable between shifters.
#[derive(Clone)]
pub struct FftPlan {
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl FftPlan {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            forward: planner.plan_fft_forward(size),
            inverse: planner.plan_fft_inverse(size),
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.forward.len()
    }
}

impl core::fmt::Debug for FftPlan {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FftPlan").field("size", &self.size()).finish()
    }
}

fn zeroed<T: Clone + Default>(len: usize) -> Result<Vec<T>, TryReserveError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)?;
    v.resize(len, T::default());
    Ok(v)
}

/// Per-signal pitch shifting state.
pub struct PitchShifter {
    plan: FftPlan,
    frame_size: usize,
    step: usize,
    /// Samples held in the input FIFO before the first full frame.
    fifo_latency: usize,
    /// Expected phase advance per hop for bin 1.
    expected: f32,
    /// Overlap-add normalisation for a Hann window applied twice.
    output_gain: f32,
    window: Vec<f32>,
    in_fifo: Vec<f32>,
    out_fifo: Vec<f32>,
    accumulator: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    last_phase: Vec<f32>,
    sum_phase: Vec<f32>,
    analysis_magnitude: Vec<f32>,
    analysis_frequency: Vec<f32>,
    synthesis_magnitude: Vec<f32>,
    synthesis_frequency: Vec<f32>,
    rover: usize,
}

impl PitchShifter {
    /// Allocate the working state for `plan.size()`-sample frames.
    ///
    /// `oversampling` must divide the frame size; it is clamped to
    /// `[1, frame_size]`.
    pub fn new(plan: FftPlan, oversampling: usize) -> Result<Self, TryReserveError> {
        let frame_size = plan.size();
        let oversampling = oversampling.clamp(1, frame_size.max(1));
        let step = (frame_size / oversampling).max(1);
        let fifo_latency = frame_size - step;
        let overlap = (frame_size / step) as f32;
        let bins = frame_size / 2 + 1;
        let scratch_len = plan
            .forward
            .get_inplace_scratch_len()
            .max(plan.inverse.get_inplace_scratch_len());

        let mut window = zeroed(frame_size)?;
        for (k, w) in window.iter_mut().enumerate() {
            *w = 0.5 - 0.5 * (TAU * k as f32 / frame_size as f32).cos();
        }

        Ok(Self {
            frame_size,
            step,
            fifo_latency,
            expected: TAU * step as f32 / frame_size as f32,
            // mean of hann^2 is 3/8
            output_gain: 1.0 / (frame_size as f32 * 0.375 * overlap),
            window,
            in_fifo: zeroed(frame_size)?,
            out_fifo: zeroed(frame_size)?,
            accumulator: zeroed(frame_size * 2)?,
            spectrum: zeroed(frame_size)?,
            scratch: zeroed(scratch_len)?,
            last_phase: zeroed(bins)?,
            sum_phase: zeroed(bins)?,
            analysis_magnitude: zeroed(bins)?,
            analysis_frequency: zeroed(bins)?,
            synthesis_magnitude: zeroed(bins)?,
            synthesis_frequency: zeroed(bins)?,
            rover: fifo_latency,
            plan,
        })
    }

    /// Samples of delay between input and output.
    #[inline]
    pub fn latency(&self) -> usize {
        self.frame_size
    }

    #[inline]
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Forget all history, as if freshly constructed.
    pub fn reset(&mut self) {
        for buf in [
            &mut self.in_fifo,
            &mut self.out_fifo,
            &mut self.accumulator,
            &mut self.last_phase,
            &mut self.sum_phase,
        ] {
            buf.fill(0.0);
        }
        self.rover = self.fifo_latency;
    }

    /// Pitch-shift `samples` in place by `ratio` (2.0 is one octave up).
    pub fn process(&mut self, ratio: f32, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            self.in_fifo[self.rover] = *sample;
            *sample = self.out_fifo[self.rover - self.fifo_latency];
            self.rover += 1;

            if self.rover >= self.frame_size {
                self.rover = self.fifo_latency;
                self.process_frame(ratio);
            }
        }
    }

    fn process_frame(&mut self, ratio: f32) {
        let frame_size = self.frame_size;
        let half = frame_size / 2;
        let oversampling = (frame_size / self.step) as f32;

        for ((bin, &input), &w) in self.spectrum.iter_mut().zip(&self.in_fifo).zip(&self.window) {
            *bin = Complex::new(input * w, 0.0);
        }
        self.plan
            .forward
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        // Analysis: magnitude and true frequency of each bin, in bin units
        for k in 0..=half {
            let bin = self.spectrum[k];
            let phase = bin.arg();
            let mut delta = phase - self.last_phase[k];
            self.last_phase[k] = phase;

            delta -= k as f32 * self.expected;
            delta = wrap_phase(delta);
            let deviation = oversampling * delta / TAU;

            // DC and Nyquist have no mirrored twin
            let scale = if k == 0 || k == half { 1.0 } else { 2.0 };
            self.analysis_magnitude[k] = scale * bin.norm();
            self.analysis_frequency[k] = k as f32 + deviation;
        }

        self.synthesis_magnitude.fill(0.0);
        self.synthesis_frequency.fill(0.0);
        for k in 0..=half {
            let target = (k as f32 * ratio) as usize;
            if target <= half {
                self.synthesis_magnitude[target] += self.analysis_magnitude[k];
                self.synthesis_frequency[target] = self.analysis_frequency[k] * ratio;
            }
        }

        // Synthesis: accumulate phase at each bin's new true frequency
        for k in 0..=half {
            let deviation = self.synthesis_frequency[k] - k as f32;
            let advance = TAU * deviation / oversampling + k as f32 * self.expected;
            self.sum_phase[k] = wrap_phase(self.sum_phase[k] + advance);
            self.spectrum[k] = Complex::from_polar(self.synthesis_magnitude[k], self.sum_phase[k]);
        }
        for bin in &mut self.spectrum[half + 1..] {
            *bin = Complex::new(0.0, 0.0);
        }
        self.plan
            .inverse
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        // Real part of a one-sided spectrum with doubled magnitudes gives
        // frame_size * x * w
        let gain = self.output_gain;
        for ((acc, bin), &w) in self.accumulator.iter_mut().zip(&self.spectrum).zip(&self.window) {
            *acc += gain * w * bin.re;
        }

        let step = self.step;
        self.out_fifo[..step].copy_from_slice(&self.accumulator[..step]);
        self.accumulator.copy_within(step.., 0);
        let len = self.accumulator.len();
        self.accumulator[len - step..].fill(0.0);
        self.in_fifo.copy_within(step..step + self.fifo_latency, 0);
    }
}

impl core::fmt::Debug for PitchShifter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PitchShifter")
            .field("frame_size", &self.frame_size)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}

/// Map a phase difference into `(-PI, PI]`.
#[inline]
fn wrap_phase(phase: f32) -> f32 {
    let turns = (phase / TAU).round();
    let wrapped = phase - turns * TAU;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shifter(frame_size: usize, oversampling: usize) -> PitchShifter {
        PitchShifter::new(FftPlan::new(frame_size), oversampling).unwrap()
    }

    fn sine(freq_bins: f32, frame_size: usize, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (TAU * freq_bins * i as f32 / frame_size as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn latency_is_one_frame() {
        let s = shifter(FRAME_SIZE, OVERSAMPLING);
        assert_eq!(s.latency(), FRAME_SIZE);
        assert_eq!(s.frame_size(), FRAME_SIZE);
    }

    #[test]
    fn first_hop_is_silent() {
        let mut s = shifter(256, 4);
        let mut block = vec![1.0; 256 / 4];
        s.process(1.5, &mut block);
        assert!(block.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn unity_ratio_is_quiet_for_one_frame() {
        let mut s = shifter(256, 4);
        let mut block = sine(8.0, 256, 256);
        s.process(1.0, &mut block);
        assert!(block.iter().all(|x| x.abs() < 1e-3));
    }

    #[test]
    fn unity_ratio_reconstructs_delayed_input() {
        let frame_size = 256;
        let mut s = shifter(frame_size, 4);
        let input = sine(8.0, frame_size, frame_size * 16);
        let mut output = input.clone();
        s.process(1.0, &mut output);

        let latency = s.latency();
        let start = frame_size * 4;
        let max_err = (start..input.len())
            .map(|i| (output[i] - input[i - latency]).abs())
            .fold(0.0f32, f32::max);
        assert!(max_err < 0.05, "max reconstruction error {max_err}");
    }

    #[test]
    fn octave_up_doubles_the_dominant_bin() {
        let frame_size = 256;
        let mut s = shifter(frame_size, 4);
        let mut signal = sine(8.0, frame_size, frame_size * 16);
        s.process(2.0, &mut signal);

        // Analyse a frame well past the start-up transient
        let tail = &signal[signal.len() - frame_size..];
        let plan = FftPlan::new(frame_size);
        let mut spectrum: Vec<Complex<f32>> = tail.iter().map(|&x| Complex::new(x, 0.0)).collect();
        plan.forward.process(&mut spectrum);
        let peak = spectrum[..frame_size / 2]
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
            .map(|(k, _)| k)
            .unwrap();
        assert!((15..=17).contains(&peak), "peak bin {peak}");
    }

    #[test]
    fn output_stays_finite_across_ratios() {
        for ratio in [0.25, 0.5, 0.9, 1.1, 2.0, 4.0] {
            let mut s = shifter(512, 8);
            let mut signal = sine(5.0, 512, 4096);
            s.process(ratio, &mut signal);
            assert!(signal.iter().all(|x| x.is_finite()), "ratio {ratio}");
        }
    }

    #[test]
    fn reset_clears_history() {
        let mut s = shifter(256, 4);
        let mut signal = sine(8.0, 256, 2048);
        s.process(1.3, &mut signal);
        s.reset();
        let mut silence = vec![0.0; 1024];
        s.process(1.3, &mut silence);
        assert!(silence.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn wrap_phase_stays_in_range() {
        for p in [-10.0f32, -PI, -1.0, 0.0, 1.0, PI, 7.5, 100.0] {
            let w = wrap_phase(p);
            assert!(w > -PI - 1e-5 && w <= PI + 1e-5, "{p} -> {w}");
        }
    }
}
