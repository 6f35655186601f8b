use std::ops::Mul;

use glam::{Mat4, Quat, Vec3};

/// A decomposed joint transform as scale -> rotation -> translation (SQT).
///
/// Scale does not affect translation when multiplying [Transform].
/// Use [Transform::to_matrix] to accumulate transforms with non uniform scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn to_matrix(self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    pub fn from_matrix(value: Mat4) -> Self {
        let (scale, rotation, translation) = value.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.translation.is_finite() && self.rotation.is_finite() && self.scale.is_finite()
    }

    /// Blend towards `other` by `t` in the range `0.0` to `1.0`.
    ///
    /// Scale and translation are always interpolated linearly.
    /// Rotations use a spherical interpolation unless `linear_rotation` is set,
    /// in which case the rotations are blended component wise and renormalized.
    pub fn blend(&self, other: &Transform, t: f32, linear_rotation: bool) -> Transform {
        // Avoid introducing drift at the end points.
        if t <= 0.0 {
            return *self;
        }
        if t >= 1.0 {
            return *other;
        }

        let rotation = if linear_rotation {
            // Blend along the shortest path.
            let other_rotation = if self.rotation.dot(other.rotation) < 0.0 {
                -other.rotation
            } else {
                other.rotation
            };
            self.rotation.lerp(other_rotation, t)
        } else {
            self.rotation.slerp(other.rotation, t)
        };

        Transform {
            translation: self.translation.lerp(other.translation, t),
            rotation: rotation.normalize(),
            scale: self.scale.lerp(other.scale, t),
        }
    }
}

impl Mul<Transform> for Transform {
    type Output = Transform;

    fn mul(self, rhs: Transform) -> Self::Output {
        Transform {
            translation: self.rotation.mul_vec3(rhs.translation) + self.translation,
            rotation: self.rotation * rhs.rotation,
            scale: self.scale * rhs.scale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use glam::{quat, vec3};

    #[test]
    fn transform_to_matrix() {
        assert_eq!(
            Mat4::from_cols_array_2d(&[
                [4.0, 0.0, 0.0, 0.0],
                [0.0, -5.0, 0.0, 0.0],
                [0.0, 0.0, -6.0, 0.0],
                [1.0, 2.0, 3.0, 1.0],
            ]),
            Transform {
                translation: vec3(1.0, 2.0, 3.0),
                rotation: quat(1.0, 0.0, 0.0, 0.0),
                scale: vec3(4.0, 5.0, 6.0),
            }
            .to_matrix()
        );
    }

    #[test]
    fn transform_from_matrix() {
        assert_eq!(
            Transform {
                translation: vec3(1.0, 2.0, 3.0),
                rotation: quat(1.0, 0.0, 0.0, 0.0),
                scale: vec3(4.0, 5.0, 6.0),
            },
            Transform::from_matrix(Mat4::from_cols_array_2d(&[
                [4.0, 0.0, 0.0, 0.0],
                [0.0, -5.0, 0.0, 0.0],
                [0.0, 0.0, -6.0, 0.0],
                [1.0, 2.0, 3.0, 1.0],
            ]))
        );
    }

    #[test]
    fn blend_end_points_are_exact() {
        let a = Transform {
            translation: vec3(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_y(0.3),
            scale: vec3(1.0, 2.0, 1.0),
        };
        let b = Transform {
            translation: vec3(-4.0, 0.5, 9.0),
            rotation: Quat::from_rotation_x(1.2),
            scale: Vec3::ONE,
        };
        assert_eq!(a, a.blend(&b, 0.0, false));
        assert_eq!(b, a.blend(&b, 1.0, false));
        assert_eq!(b, a.blend(&b, 1.0, true));
    }

    #[test]
    fn blend_halfway() {
        let a = Transform::IDENTITY;
        let b = Transform {
            translation: vec3(2.0, 0.0, 0.0),
            rotation: Quat::from_rotation_z(1.0),
            scale: vec3(3.0, 3.0, 3.0),
        };
        let blended = a.blend(&b, 0.5, false);
        assert_relative_eq!(vec3(1.0, 0.0, 0.0), blended.translation);
        assert_relative_eq!(vec3(2.0, 2.0, 2.0), blended.scale);
        assert_relative_eq!(
            Quat::from_rotation_z(0.5),
            blended.rotation,
            epsilon = 0.0001
        );

        let linear = a.blend(&b, 0.5, true);
        assert_relative_eq!(
            Quat::from_rotation_z(0.5),
            linear.rotation,
            epsilon = 0.0001
        );
    }
}
