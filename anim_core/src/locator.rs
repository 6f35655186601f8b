use std::ops::Mul;

use glam::{Mat4, Quat, Vec3};

use crate::Transform;

/// A rigid transform with a translation and unit rotation but no scale.
///
/// Locators describe world space joint frames, action pack references and the object align.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Locator {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Default for Locator {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Locator {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            rotation: Quat::IDENTITY,
        }
    }

    /// Remove any scale from `value` and keep the rotation and translation.
    pub fn from_matrix(value: Mat4) -> Self {
        let (_, rotation, translation) = value.to_scale_rotation_translation();
        Self {
            translation,
            rotation: rotation.normalize(),
        }
    }

    pub fn to_matrix(self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.translation)
    }

    pub fn to_transform(self) -> Transform {
        Transform {
            translation: self.translation,
            rotation: self.rotation,
            scale: Vec3::ONE,
        }
    }

    /// Convert `other` from the space of `self` into the parent space.
    pub fn transform(&self, other: &Locator) -> Locator {
        Locator {
            translation: self.rotation * other.translation + self.translation,
            rotation: self.rotation * other.rotation,
        }
    }

    /// Convert `other` from the parent space into the space of `self`.
    pub fn untransform(&self, other: &Locator) -> Locator {
        let inverse_rotation = self.rotation.conjugate();
        Locator {
            translation: inverse_rotation * (other.translation - self.translation),
            rotation: inverse_rotation * other.rotation,
        }
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation * point + self.translation
    }

    pub fn untransform_point(&self, point: Vec3) -> Vec3 {
        self.rotation.conjugate() * (point - self.translation)
    }

    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation * vector
    }

    pub fn untransform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation.conjugate() * vector
    }

    pub fn inverse(&self) -> Locator {
        Locator::IDENTITY.transform(&self.untransform(&Locator::IDENTITY))
    }

    /// Linear interpolation for the translation and spherical interpolation for the rotation.
    pub fn lerp(&self, other: &Locator, t: f32) -> Locator {
        if t <= 0.0 {
            return *self;
        }
        if t >= 1.0 {
            return *other;
        }
        Locator {
            translation: self.translation.lerp(other.translation, t),
            rotation: self.rotation.slerp(other.rotation, t).normalize(),
        }
    }

    pub fn normalized(&self) -> Locator {
        Locator {
            translation: self.translation,
            rotation: self.rotation.normalize(),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.translation.is_finite() && self.rotation.is_finite()
    }
}

impl From<Transform> for Locator {
    fn from(value: Transform) -> Self {
        Self {
            translation: value.translation,
            rotation: value.rotation,
        }
    }
}

impl Mul<Locator> for Locator {
    type Output = Locator;

    fn mul(self, rhs: Locator) -> Self::Output {
        self.transform(&rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use glam::vec3;

    #[test]
    fn transform_untransform_inverse() {
        let space = Locator::new(vec3(1.0, 2.0, 3.0), Quat::from_rotation_y(0.7));
        let loc = Locator::new(vec3(-2.0, 0.5, 4.0), Quat::from_rotation_x(0.2));

        let ws = space.transform(&loc);
        let ls = space.untransform(&ws);
        assert_relative_eq!(loc.translation, ls.translation, epsilon = 0.0001);
        assert_relative_eq!(loc.rotation, ls.rotation, epsilon = 0.0001);

        let identity = space.transform(&space.inverse());
        assert_relative_eq!(Vec3::ZERO, identity.translation, epsilon = 0.0001);
        assert_relative_eq!(Quat::IDENTITY, identity.rotation, epsilon = 0.0001);
    }

    #[test]
    fn from_matrix_removes_scale() {
        let m = Mat4::from_scale_rotation_translation(
            vec3(2.0, 3.0, 4.0),
            Quat::from_rotation_z(0.5),
            vec3(1.0, 2.0, 3.0),
        );
        let loc = Locator::from_matrix(m);
        assert_relative_eq!(vec3(1.0, 2.0, 3.0), loc.translation, epsilon = 0.0001);
        assert_relative_eq!(Quat::from_rotation_z(0.5), loc.rotation, epsilon = 0.0001);
    }

    #[test]
    fn points_and_vectors() {
        let loc = Locator::new(
            vec3(0.0, 0.0, 5.0),
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
        );
        // +X rotates onto -Z.
        assert_relative_eq!(
            vec3(0.0, 0.0, 4.0),
            loc.transform_point(vec3(1.0, 0.0, 0.0)),
            epsilon = 0.0001
        );
        let v = vec3(1.0, 0.0, 0.0);
        assert_relative_eq!(v, loc.untransform_vector(loc.transform_vector(v)), epsilon = 0.0001);
        let p = vec3(3.0, -1.0, 2.0);
        assert_relative_eq!(p, loc.untransform_point(loc.transform_point(p)), epsilon = 0.0001);
    }

    #[test]
    fn lerp_end_points() {
        let a = Locator::new(vec3(1.0, 0.0, 0.0), Quat::from_rotation_y(0.1));
        let b = Locator::new(vec3(3.0, 0.0, 0.0), Quat::from_rotation_y(0.9));
        assert_eq!(a, a.lerp(&b, 0.0));
        assert_eq!(b, a.lerp(&b, 1.0));
        let half = a.lerp(&b, 0.5);
        assert_relative_eq!(vec3(2.0, 0.0, 0.0), half.translation);
        assert_relative_eq!(Quat::from_rotation_y(0.5), half.rotation, epsilon = 0.0001);
    }
}
