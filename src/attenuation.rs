//! Distance attenuation curves.
//!
//! Every curve has the same shape, `(min, max, distance, rolloff) -> gain`,
//! so a caller-supplied function can replace the built-ins without any
//! change to the mixer.

/// Signature shared by all attenuation curves.
pub type AttenuationFn = fn(min: f32, max: f32, distance: f32, rolloff: f32) -> f32;

/// No distance falloff.
pub fn none(_min: f32, _max: f32, _distance: f32, _rolloff: f32) -> f32 {
    1.0
}

/// Hyperbolic falloff; the inverse-distance law when `rolloff == 1`.
pub fn inverse(min: f32, _max: f32, distance: f32, rolloff: f32) -> f32 {
    min / (min + rolloff * (distance - min))
}

/// Straight-line falloff, reaching zero at `max` when `rolloff == 1`.
///
/// Goes negative past `max`; the mixer clamps distances into `[min, max]`
/// before calling. An empty range (`max <= min`) has unity gain.
pub fn linear(min: f32, max: f32, distance: f32, rolloff: f32) -> f32 {
    if max <= min {
        return 1.0;
    }
    1.0 - rolloff * (distance - min) / (max - min)
}

/// Power-law falloff.
pub fn exponential(min: f32, _max: f32, distance: f32, rolloff: f32) -> f32 {
    (distance / min).powf(-rolloff)
}

/// Attenuation selector.
///
/// The four built-in curves are addressed by name. `Custom` carries any
/// function with the [`AttenuationFn`] signature.
#[derive(Clone, Copy, Debug, Default)]
pub enum Attenuation {
    None,
    Inverse,
    Linear,
    #[default]
    Exponential,
    Custom(AttenuationFn),
}

impl Attenuation {
    /// The function this selector dispatches to.
    pub fn function(&self) -> AttenuationFn {
        match *self {
            Attenuation::None => none,
            Attenuation::Inverse => inverse,
            Attenuation::Linear => linear,
            Attenuation::Exponential => exponential,
            Attenuation::Custom(f) => f,
        }
    }

    #[inline]
    pub fn gain(&self, min: f32, max: f32, distance: f32, rolloff: f32) -> f32 {
        (self.function())(min, max, distance, rolloff)
    }

    #[inline]
    pub fn is_custom(&self) -> bool {
        matches!(self, Attenuation::Custom(_))
    }

    /// Short lowercase name, `"custom"` for caller-supplied curves.
    pub fn name(&self) -> &'static str {
        match self {
            Attenuation::None => "none",
            Attenuation::Inverse => "inverse",
            Attenuation::Linear => "linear",
            Attenuation::Exponential => "exponential",
            Attenuation::Custom(_) => "custom",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: f32 = 1.0;
    const MAX: f32 = 10000.0;

    #[test]
    fn unity_at_min_distance() {
        for model in [
            Attenuation::None,
            Attenuation::Inverse,
            Attenuation::Linear,
            Attenuation::Exponential,
        ] {
            for rolloff in [0.0, 0.5, 1.0, 3.0] {
                assert_eq!(model.gain(MIN, MAX, MIN, rolloff), 1.0, "{}", model.name());
            }
        }
    }

    #[test]
    fn inverse_halves_at_double_distance() {
        assert!((inverse(1.0, MAX, 2.0, 1.0) - 0.5).abs() < 1e-6);
        assert!((inverse(2.0, MAX, 4.0, 1.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn linear_reaches_zero_at_max() {
        assert!(linear(1.0, 11.0, 11.0, 1.0).abs() < 1e-6);
        assert!((linear(1.0, 11.0, 6.0, 1.0) - 0.5).abs() < 1e-6);
        // Unclamped distances overshoot into negative gain
        assert!(linear(1.0, 11.0, 21.0, 1.0) < 0.0);
    }

    #[test]
    fn linear_with_empty_range_is_unity() {
        assert_eq!(linear(1.0, 1.0, 1.0, 1.0), 1.0);
        assert_eq!(linear(5.0, 5.0, 50.0, 0.5), 1.0);
    }

    #[test]
    fn exponential_follows_power_law() {
        assert!((exponential(1.0, MAX, 4.0, 0.5) - 0.5).abs() < 1e-6);
        assert!((exponential(1.0, MAX, 100.0, 1.0) - 0.01).abs() < 1e-6);
    }

    #[test]
    fn none_ignores_everything() {
        assert_eq!(none(1.0, 2.0, 5000.0, 8.0), 1.0);
    }

    #[test]
    fn custom_dispatches_to_supplied_function() {
        fn half(_: f32, _: f32, _: f32, _: f32) -> f32 {
            0.5
        }
        let model = Attenuation::Custom(half);
        assert!(model.is_custom());
        assert_eq!(model.name(), "custom");
        assert_eq!(model.gain(1.0, 2.0, 3.0, 4.0), 0.5);
    }

    #[test]
    fn default_is_exponential() {
        assert!(matches!(Attenuation::default(), Attenuation::Exponential));
    }
}
