//! Blend curves shared by instance fades, layer fades and self blends.
use strum::{Display, EnumString};

/// The shape used to map linear fade progress to a blend weight.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum BlendCurve {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    /// Smoothstep with zero slope at both ends.
    UniformS,
}

impl BlendCurve {
    /// Evaluate the curve at `t` clamped to the range `0.0` to `1.0`.
    pub fn evaluate(self, t: f32) -> f32 {
        let t = clamp01(t);
        match self {
            BlendCurve::Linear => t,
            BlendCurve::EaseIn => t * t,
            BlendCurve::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            BlendCurve::UniformS => t * t * (3.0 - 2.0 * t),
        }
    }
}

/// Clamp to `0.0..=1.0` while mapping NaN to `0.0`.
pub fn clamp01(t: f32) -> f32 {
    if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) }
}

/// Map `x` from `[in_min, in_max]` to `[out_min, out_max]` and clamp to the output range.
pub fn lerp_scale_clamp(in_min: f32, in_max: f32, out_min: f32, out_max: f32, x: f32) -> f32 {
    if in_max == in_min {
        return if x < in_min { out_min } else { out_max };
    }
    let t = clamp01((x - in_min) / (in_max - in_min));
    out_min + (out_max - out_min) * t
}
