//! Sparse joint poses produced by instances and blended by layers.
use smol_str::SmolStr;
use strum::{Display, EnumString};

use crate::{ClipData, PoseCache, Transform};

/// How a layer's pose is combined with the layers below it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum BlendMode {
    /// Interpolate from the current pose towards the layer pose.
    #[default]
    Blend,
    /// Apply the layer pose on top of the current pose.
    Additive,
}

/// Local joint parameters and output control values
/// where channels without animation data are `None`.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Pose {
    pub joints: Vec<Option<Transform>>,
    pub floats: Vec<Option<f32>>,
}

impl Pose {
    pub fn empty(joint_count: usize, float_count: usize) -> Self {
        Self {
            joints: vec![None; joint_count],
            floats: vec![None; float_count],
        }
    }

    /// Sample every track in `clip` at `phase`.
    /// Float channels are matched to `output_controls` by name.
    pub fn sample(
        clip: &ClipData,
        phase: f32,
        joint_count: usize,
        output_controls: &[SmolStr],
    ) -> Self {
        let mut pose = Self::empty(joint_count, output_controls.len());
        for track in &clip.tracks {
            if let Some(joint) = pose.joints.get_mut(track.joint_index) {
                *joint = clip.sample_track(track, phase);
            }
        }
        for (value, name) in pose.floats.iter_mut().zip(output_controls) {
            *value = clip.evaluate_float(name, phase);
        }
        pose
    }

    /// Blend towards `other` by `t`.
    ///
    /// Channels defined in only one pose are copied from that pose.
    pub fn blend(&self, other: &Pose, t: f32, linear_rotation: bool) -> Pose {
        Pose {
            joints: self
                .joints
                .iter()
                .zip(&other.joints)
                .map(|(a, b)| match (a, b) {
                    (Some(a), Some(b)) => Some(a.blend(b, t, linear_rotation)),
                    (Some(a), None) => Some(*a),
                    (None, b) => *b,
                })
                .collect(),
            floats: self
                .floats
                .iter()
                .zip(&other.floats)
                .map(|(a, b)| match (a, b) {
                    (Some(a), Some(b)) => Some(lerp_float(*a, *b, t)),
                    (Some(a), None) => Some(*a),
                    (None, b) => *b,
                })
                .collect(),
        }
    }

    /// Write the pose into `cache` scaled by `weight` and invalidate the derived data.
    #[tracing::instrument(skip_all)]
    pub fn apply(&self, cache: &mut PoseCache, weight: f32, mode: BlendMode) {
        if weight <= 0.0 {
            return;
        }

        for (index, transform) in self.joints.iter().enumerate() {
            let Some(transform) = transform else {
                continue;
            };
            let Some(current) = cache.joint_params(index).copied() else {
                continue;
            };

            let value = match mode {
                BlendMode::Blend => current.blend(transform, weight, false),
                BlendMode::Additive => {
                    current * Transform::IDENTITY.blend(transform, weight, false)
                }
            };
            // The index was checked above.
            let _ = cache.set_joint_params(index, value);
        }

        for (index, value) in self.floats.iter().enumerate() {
            if let (Some(value), Some(current)) = (value, cache.output_control(index)) {
                let value = match mode {
                    BlendMode::Blend => lerp_float(current, *value, weight),
                    BlendMode::Additive => current + value * weight,
                };
                cache.set_output_control(index, value);
            }
        }

        cache.invalidate_all_transforms();
    }
}

fn lerp_float(a: f32, b: f32, t: f32) -> f32 {
    if t <= 0.0 {
        a
    } else if t >= 1.0 {
        b
    } else {
        a + (b - a) * t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use approx::assert_relative_eq;
    use glam::{Quat, vec3};

    use crate::{Joint, Skeleton};

    fn translation(x: f32) -> Transform {
        Transform {
            translation: vec3(x, 0.0, 0.0),
            ..Transform::IDENTITY
        }
    }

    #[test]
    fn blend_copies_missing_channels() {
        let a = Pose {
            joints: vec![Some(translation(1.0)), None, None],
            floats: vec![Some(0.5), None],
        };
        let b = Pose {
            joints: vec![Some(translation(3.0)), Some(translation(5.0)), None],
            floats: vec![None, Some(0.25)],
        };
        let blended = a.blend(&b, 0.5, false);
        assert_relative_eq!(
            vec3(2.0, 0.0, 0.0),
            blended.joints[0].unwrap().translation
        );
        assert_eq!(Some(translation(5.0)), blended.joints[1]);
        assert_eq!(None, blended.joints[2]);
        assert_eq!(vec![Some(0.5), Some(0.25)], blended.floats);
    }

    #[test]
    fn blend_weight_extremes_are_exact() {
        let a = Pose {
            joints: vec![Some(Transform {
                translation: vec3(0.1, 0.2, 0.3),
                rotation: Quat::from_rotation_x(0.3),
                scale: vec3(1.0, 1.1, 1.2),
            })],
            floats: vec![Some(0.3)],
        };
        let b = Pose {
            joints: vec![Some(Transform {
                translation: vec3(-7.0, 0.25, 1.0),
                rotation: Quat::from_rotation_z(2.0),
                scale: vec3(1.0, 1.0, 0.5),
            })],
            floats: vec![Some(0.9)],
        };
        assert_eq!(b, a.blend(&b, 1.0, false));
        assert_eq!(a, a.blend(&b, 0.0, true));
    }

    #[test]
    fn apply_blend_to_cache() {
        let skeleton = Skeleton::new(vec![
            Joint {
                name: "root".into(),
                transform: Transform::IDENTITY,
                parent_index: None,
            },
            Joint {
                name: "child".into(),
                transform: translation(1.0),
                parent_index: Some(0),
            },
        ]);
        let mut cache = PoseCache::new(Arc::new(skeleton)).unwrap();
        let pose = Pose {
            joints: vec![None, Some(translation(3.0))],
            floats: Vec::new(),
        };

        pose.apply(&mut cache, 0.5, BlendMode::Blend);
        assert_relative_eq!(
            vec3(2.0, 0.0, 0.0),
            cache.joint_params(1).unwrap().translation
        );
        assert!(!cache.is_transform_valid(1));
        assert_relative_eq!(
            vec3(2.0, 0.0, 0.0),
            cache.joint_transform(1).unwrap().w_axis.truncate()
        );

        pose.apply(&mut cache, 1.0, BlendMode::Additive);
        assert_relative_eq!(
            vec3(5.0, 0.0, 0.0),
            cache.joint_params(1).unwrap().translation
        );
    }
}
