use glam::Mat4;
use log::warn;
use smol_str::SmolStr;

use crate::{Transform, error::SkeletonError};

/// The immutable joint hierarchy and bind pose shared by every [PoseCache](crate::PoseCache)
/// created for the same skeleton.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Skeleton {
    /// The hierarchy of joints in the skeleton.
    pub joints: Vec<Joint>,
    /// Names of the float controls written by gameplay and read by the animation.
    pub input_controls: Vec<SmolStr>,
    /// Names of the float controls produced by the animation for consumers like materials.
    pub output_controls: Vec<SmolStr>,
}

/// A single node in the skeleton heirarchy.
#[derive(Debug, PartialEq, Clone)]
pub struct Joint {
    pub name: SmolStr,
    /// The bind pose transform of the joint relative to its parent.
    pub transform: Transform,
    /// The index of the parent [Joint] in [joints](struct.Skeleton.html#structfield.joints)
    /// or `None` if this is a root joint.
    pub parent_index: Option<usize>,
}

impl Skeleton {
    pub fn new(joints: Vec<Joint>) -> Self {
        Self {
            joints,
            input_controls: Vec::new(),
            output_controls: Vec::new(),
        }
    }

    /// Check that every parent index is in range and appears before its children.
    ///
    /// The lazy world space conversion in [PoseCache](crate::PoseCache) relies on this ordering.
    pub fn validate(&self) -> Result<(), SkeletonError> {
        let count = self.joints.len();
        for (joint, j) in self.joints.iter().enumerate() {
            if let Some(parent) = j.parent_index {
                if parent >= count {
                    return Err(SkeletonError::ParentOutOfRange {
                        joint,
                        parent,
                        count,
                    });
                }
                if parent >= joint {
                    return Err(SkeletonError::ParentAfterChild { joint, parent });
                }
            }
        }

        let root_count = self.joints.iter().filter(|j| j.parent_index.is_none()).count();
        if root_count > 1 {
            warn!("Skeleton contains {root_count} root joints.");
        }

        Ok(())
    }

    pub fn joint_index(&self, name: &str) -> Option<usize> {
        self.joints.iter().position(|j| j.name == name)
    }

    pub fn input_control_index(&self, name: &str) -> Option<usize> {
        self.input_controls.iter().position(|c| c == name)
    }

    pub fn output_control_index(&self, name: &str) -> Option<usize> {
        self.output_controls.iter().position(|c| c == name)
    }

    /// The bind pose world transform for each joint in model space
    /// by recursively applying the parent transform.
    pub fn bind_world_transforms(&self) -> Vec<Mat4> {
        let mut transforms: Vec<Mat4> = Vec::with_capacity(self.joints.len());

        // Parents appear before children after validation.
        for joint in &self.joints {
            let local = joint.transform.to_matrix();
            let world = match joint.parent_index.and_then(|p| transforms.get(p)) {
                Some(parent) => *parent * local,
                None => local,
            };
            transforms.push(world);
        }

        transforms
    }

    /// The inverse of [Self::bind_world_transforms] used for skinning.
    pub fn inverse_bind_transforms(&self) -> Vec<Mat4> {
        self.bind_world_transforms()
            .into_iter()
            .map(|m| m.inverse())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use glam::vec3;

    fn joint(name: &str, x: f32, parent_index: Option<usize>) -> Joint {
        Joint {
            name: name.into(),
            transform: Transform {
                translation: vec3(x, 0.0, 0.0),
                ..Transform::IDENTITY
            },
            parent_index,
        }
    }

    #[test]
    fn validate_empty() {
        assert_eq!(Ok(()), Skeleton::default().validate());
    }

    #[test]
    fn validate_parent_after_child() {
        let skeleton = Skeleton::new(vec![joint("a", 0.0, Some(1)), joint("b", 0.0, None)]);
        assert_eq!(
            Err(SkeletonError::ParentAfterChild {
                joint: 0,
                parent: 1
            }),
            skeleton.validate()
        );
    }

    #[test]
    fn validate_parent_out_of_range() {
        let skeleton = Skeleton::new(vec![joint("a", 0.0, None), joint("b", 0.0, Some(5))]);
        assert_eq!(
            Err(SkeletonError::ParentOutOfRange {
                joint: 1,
                parent: 5,
                count: 2
            }),
            skeleton.validate()
        );
    }

    #[test]
    fn bind_world_transforms_chain() {
        let skeleton = Skeleton::new(vec![
            joint("a", 1.0, None),
            joint("b", 2.0, Some(0)),
            joint("c", 3.0, Some(1)),
        ]);
        let transforms = skeleton.bind_world_transforms();
        assert_relative_eq!(vec3(1.0, 0.0, 0.0), transforms[0].w_axis.truncate());
        assert_relative_eq!(vec3(3.0, 0.0, 0.0), transforms[1].w_axis.truncate());
        assert_relative_eq!(vec3(6.0, 0.0, 0.0), transforms[2].w_axis.truncate());

        let inverse = skeleton.inverse_bind_transforms();
        assert_relative_eq!(Mat4::IDENTITY, transforms[2] * inverse[2], epsilon = 0.0001);
    }

    #[test]
    fn joint_index_by_name() {
        let skeleton = Skeleton::new(vec![joint("root", 0.0, None), joint("hand", 0.0, Some(0))]);
        assert_eq!(Some(1), skeleton.joint_index("hand"));
        assert_eq!(None, skeleton.joint_index("foot"));
    }
}
