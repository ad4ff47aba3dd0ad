//! Doppler pitch ratio between a moving listener and a moving source.
//!
//! Follows the OpenAL 1.1 formulation: velocities are projected onto the
//! source-to-listener axis and clamped below the (scaled) speed of sound.

use glam::Vec3;

/// Lowest pitch ratio ever returned.
pub const MIN_PITCH_RATIO: f32 = 0.25;
/// Highest pitch ratio ever returned.
pub const MAX_PITCH_RATIO: f32 = 4.0;

/// Position and velocity of a listener or source.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Kinematics {
    pub location: Vec3,
    pub velocity: Vec3,
}

impl Kinematics {
    pub fn new(location: Vec3, velocity: Vec3) -> Self {
        Self { location, velocity }
    }

    /// At `location`, at rest.
    pub fn at(location: Vec3) -> Self {
        Self {
            location,
            velocity: Vec3::ZERO,
        }
    }
}

/// Pitch ratio heard by `listener` for a sound emitted by `source`.
///
/// Returns exactly `1.0` when `doppler_factor <= 0` or when the two share a
/// location. Otherwise the ratio is clamped into
/// `[MIN_PITCH_RATIO, MAX_PITCH_RATIO]`.
pub fn pitch_ratio(
    listener: &Kinematics,
    source: &Kinematics,
    sound_speed: f32,
    doppler_factor: f32,
) -> f32 {
    if doppler_factor <= 0.0 {
        return 1.0;
    }

    let sl = listener.location - source.location;
    let distance = sl.length();
    if distance <= f32::EPSILON {
        return 1.0;
    }
    let mag = distance.recip();

    let limit = sound_speed / doppler_factor;
    let vls = (sl.dot(listener.velocity) * mag).min(limit);
    let vss = (sl.dot(source.velocity) * mag).min(limit);

    let approach = sound_speed - doppler_factor * vss;
    if approach.is_nan() {
        return 1.0;
    }
    // Source closing at or past the speed of sound
    if approach <= 0.0 {
        return MAX_PITCH_RATIO;
    }

    let ratio = (sound_speed - doppler_factor * vls) / approach;
    if ratio.is_nan() {
        return 1.0;
    }
    ratio.clamp(MIN_PITCH_RATIO, MAX_PITCH_RATIO)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOUND_SPEED: f32 = 34330.0;

    #[test]
    fn disabled_doppler_is_unity() {
        let listener = Kinematics::new(Vec3::ZERO, Vec3::new(500.0, 0.0, 0.0));
        let source = Kinematics::new(Vec3::new(100.0, 0.0, 0.0), Vec3::new(-9000.0, 3.0, 1.0));
        assert_eq!(pitch_ratio(&listener, &source, SOUND_SPEED, 0.0), 1.0);
        assert_eq!(pitch_ratio(&listener, &source, SOUND_SPEED, -2.0), 1.0);
    }

    #[test]
    fn approaching_source_raises_pitch() {
        let listener = Kinematics::at(Vec3::ZERO);
        let source = Kinematics::new(Vec3::new(1000.0, 0.0, 0.0), Vec3::new(-3433.0, 0.0, 0.0));
        let ratio = pitch_ratio(&listener, &source, SOUND_SPEED, 1.0);
        // c / (c - c/10)
        assert!((ratio - 10.0 / 9.0).abs() < 1e-5, "ratio = {ratio}");
    }

    #[test]
    fn receding_source_lowers_pitch() {
        let listener = Kinematics::at(Vec3::ZERO);
        let source = Kinematics::new(Vec3::new(1000.0, 0.0, 0.0), Vec3::new(3433.0, 0.0, 0.0));
        let ratio = pitch_ratio(&listener, &source, SOUND_SPEED, 1.0);
        assert!((ratio - 10.0 / 11.0).abs() < 1e-5, "ratio = {ratio}");
    }

    #[test]
    fn listener_moving_toward_source_raises_pitch() {
        let listener = Kinematics::new(Vec3::ZERO, Vec3::new(3433.0, 0.0, 0.0));
        let source = Kinematics::at(Vec3::new(1000.0, 0.0, 0.0));
        assert!(pitch_ratio(&listener, &source, SOUND_SPEED, 1.0) > 1.0);
    }

    #[test]
    fn perpendicular_motion_is_unity() {
        let listener = Kinematics::at(Vec3::ZERO);
        let source = Kinematics::new(Vec3::new(0.0, 0.0, 500.0), Vec3::new(800.0, 0.0, 0.0));
        assert_eq!(pitch_ratio(&listener, &source, SOUND_SPEED, 1.0), 1.0);
    }

    #[test]
    fn coincident_positions_are_unity() {
        let listener = Kinematics::new(Vec3::ONE, Vec3::X);
        let source = Kinematics::new(Vec3::ONE, Vec3::NEG_X * 100.0);
        assert_eq!(pitch_ratio(&listener, &source, SOUND_SPEED, 1.0), 1.0);
    }

    #[test]
    fn supersonic_source_stays_finite() {
        let listener = Kinematics::at(Vec3::ZERO);
        let source = Kinematics::new(Vec3::new(10.0, 0.0, 0.0), Vec3::new(-1.0e6, 0.0, 0.0));
        let ratio = pitch_ratio(&listener, &source, SOUND_SPEED, 1.0);
        assert_eq!(ratio, MAX_PITCH_RATIO);
    }
}
