//! Per instance storage of local joint parameters with lazily derived world data.
//!
//! Local parameters are written by layer playback every frame.
//! World transforms and world locators are only recomputed when queried
//! and the corresponding bit in the validity sets is cleared.
//!
//! Setting local parameters does not invalidate anything.
//! Call [PoseCache::invalidate_sub_tree] after overwriting joints
//! so that later queries observe the new values.
use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use log::{error, warn};

use crate::{
    Locator, Skeleton, Transform,
    bitset::JointBitSet,
    error::{CreatePoseCacheError, JointIndexError},
};

#[derive(Debug, Clone)]
pub struct PoseCache {
    skeleton: Arc<Skeleton>,
    bind_world_transforms: Vec<Mat4>,
    local: Vec<Transform>,
    world_transforms: Vec<Mat4>,
    world_locators: Vec<Locator>,
    transform_valid: JointBitSet,
    locator_valid: JointBitSet,
    object_transform: Locator,
    input_controls: Vec<f32>,
    output_controls: Vec<f32>,
    in_bind_pose: bool,
    conversion_count: u64,
}

impl PoseCache {
    /// Allocate storage for `skeleton` and reset to the bind pose.
    pub fn new(skeleton: Arc<Skeleton>) -> Result<Self, CreatePoseCacheError> {
        if skeleton.joints.is_empty() {
            return Err(CreatePoseCacheError::EmptySkeleton);
        }
        skeleton.validate()?;

        let count = skeleton.joints.len();
        let bind_world_transforms = skeleton.bind_world_transforms();
        let mut cache = Self {
            bind_world_transforms,
            local: vec![Transform::IDENTITY; count],
            world_transforms: vec![Mat4::IDENTITY; count],
            world_locators: vec![Locator::IDENTITY; count],
            transform_valid: JointBitSet::new(count),
            locator_valid: JointBitSet::new(count),
            object_transform: Locator::IDENTITY,
            input_controls: vec![0.0; skeleton.input_controls.len()],
            output_controls: vec![0.0; skeleton.output_controls.len()],
            in_bind_pose: false,
            conversion_count: 0,
            skeleton,
        };
        cache.reset_to_bind_pose();
        Ok(cache)
    }

    pub fn skeleton(&self) -> &Arc<Skeleton> {
        &self.skeleton
    }

    pub fn joint_count(&self) -> usize {
        self.local.len()
    }

    pub fn parent_index(&self, index: usize) -> Option<usize> {
        self.skeleton.joints.get(index).and_then(|j| j.parent_index)
    }

    /// `true` until the first local parameter write after a reset.
    pub fn is_in_bind_pose(&self) -> bool {
        self.in_bind_pose
    }

    /// Copy the bind pose into the local parameters.
    ///
    /// World transforms are valid after this call but world locators are not,
    /// since they also depend on the object transform.
    #[tracing::instrument(skip_all)]
    pub fn reset_to_bind_pose(&mut self) {
        for (local, joint) in self.local.iter_mut().zip(&self.skeleton.joints) {
            *local = joint.transform;
        }
        self.world_transforms
            .copy_from_slice(&self.bind_world_transforms);
        self.transform_valid.set_all();
        self.locator_valid.clear_all();

        self.input_controls.fill(0.0);
        self.output_controls.fill(0.0);
        self.in_bind_pose = true;
    }

    pub fn joint_params(&self, index: usize) -> Option<&Transform> {
        self.local.get(index)
    }

    /// Write the local parameters for a joint without invalidating any derived data.
    ///
    /// Non finite values are rejected and the previous parameters are kept.
    pub fn set_joint_params(
        &mut self,
        index: usize,
        params: Transform,
    ) -> Result<(), JointIndexError> {
        let count = self.local.len();
        let local = self
            .local
            .get_mut(index)
            .ok_or(JointIndexError { index, count })?;

        if !params.is_finite() {
            error!("Ignoring non finite parameters for joint {index}: {params:?}");
            debug_assert!(params.is_finite());
            return Ok(());
        }

        *local = params;
        self.in_bind_pose = false;
        Ok(())
    }

    /// The local parameters for a joint or the bind pose if the parameters are not finite.
    /// Indices out of range return the identity.
    pub fn joint_params_or_bind(&self, index: usize) -> Transform {
        match (self.local.get(index), self.skeleton.joints.get(index)) {
            (Some(local), _) if local.is_finite() => *local,
            (_, Some(joint)) => joint.transform,
            _ => Transform::IDENTITY,
        }
    }

    /// The uniform scale of the root joint used to scale translations
    /// for world space procedural edits.
    pub fn root_scale(&self) -> f32 {
        self.local[0].scale.x
    }

    /// The model space transform for a joint.
    ///
    /// Only the invalid part of the parent chain is recomputed.
    pub fn joint_transform(&mut self, index: usize) -> Option<Mat4> {
        if index >= self.local.len() {
            error!(
                "Joint index {index} out of range for {} joints",
                self.local.len()
            );
            return None;
        }

        if !self.transform_valid.is_set(index) {
            self.convert_transform(index);
        }
        Some(self.world_transforms[index])
    }

    fn convert_transform(&mut self, index: usize) {
        // Collect the chain of invalid joints up to the first valid ancestor.
        let mut stack = vec![index];
        let mut parent = self.parent_index(index);
        while let Some(p) = parent {
            if self.transform_valid.is_set(p) {
                break;
            }
            stack.push(p);
            parent = self.parent_index(p);
        }

        // Recompute from the top of the chain down.
        while let Some(joint) = stack.pop() {
            let local = self.local[joint].to_matrix();
            self.world_transforms[joint] = match self.parent_index(joint) {
                Some(p) => self.world_transforms[p] * local,
                None => local,
            };
            self.transform_valid.set(joint);
            self.conversion_count += 1;
        }
    }

    /// The world space locator for a joint including the object transform.
    pub fn joint_locator_ws(&mut self, index: usize) -> Option<Locator> {
        if !self.locator_valid.is_set(index) {
            let world = self.joint_transform(index)?;
            let locator = Locator::from_matrix(self.object_transform.to_matrix() * world);
            self.world_locators[index] = locator;
            self.locator_valid.set(index);
        }
        Some(self.world_locators[index])
    }

    /// Write the world space locator for a joint and mark it valid.
    pub fn overwrite_joint_locator_ws(
        &mut self,
        index: usize,
        locator: Locator,
    ) -> Result<(), JointIndexError> {
        let count = self.world_locators.len();
        let target = self
            .world_locators
            .get_mut(index)
            .ok_or(JointIndexError { index, count })?;

        if !locator.is_finite() {
            error!("Ignoring non finite locator for joint {index}: {locator:?}");
            debug_assert!(locator.is_finite());
            return Ok(());
        }

        *target = locator;
        self.locator_valid.set(index);
        Ok(())
    }

    pub fn is_transform_valid(&self, index: usize) -> bool {
        self.transform_valid.is_set(index)
    }

    pub fn is_locator_valid(&self, index: usize) -> bool {
        self.locator_valid.is_set(index)
    }

    /// Mark the derived data for a single joint as out of date.
    pub fn invalidate_joint(&mut self, index: usize) {
        self.transform_valid.clear(index);
        self.locator_valid.clear(index);
    }

    /// Mark the derived data for `index` and all of its descendants as out of date.
    pub fn invalidate_sub_tree(&mut self, index: usize) {
        for joint in self.sub_tree(index) {
            self.invalidate_joint(joint);
        }
    }

    pub fn invalidate_all_transforms(&mut self) {
        self.transform_valid.clear_all();
        self.locator_valid.clear_all();
    }

    pub fn invalidate_all_locators(&mut self) {
        self.locator_valid.clear_all();
    }

    /// Convert every out of date transform and locator.
    #[tracing::instrument(skip_all)]
    pub fn validate_all(&mut self) {
        // Parents precede children, so a single forward pass is enough.
        for joint in 0..self.local.len() {
            if !self.transform_valid.is_set(joint) {
                self.convert_transform(joint);
            }
        }
        for joint in 0..self.local.len() {
            if !self.locator_valid.is_set(joint) {
                let locator = Locator::from_matrix(
                    self.object_transform.to_matrix() * self.world_transforms[joint],
                );
                self.world_locators[joint] = locator;
                self.locator_valid.set(joint);
            }
        }
    }

    /// All model space transforms after converting any invalid joints.
    pub fn world_transforms(&mut self) -> &[Mat4] {
        self.validate_all();
        &self.world_transforms
    }

    /// All world space locators after converting any invalid joints.
    pub fn world_locators(&mut self) -> &[Locator] {
        self.validate_all();
        &self.world_locators
    }

    /// Matrices that transform bind pose vertices to their posed model space positions.
    pub fn skinning_transforms(&mut self) -> Vec<Mat4> {
        self.validate_all();
        self.world_transforms
            .iter()
            .zip(&self.bind_world_transforms)
            .map(|(world, bind)| *world * bind.inverse())
            .collect()
    }

    pub fn bind_transform(&self, index: usize) -> Option<Mat4> {
        self.bind_world_transforms.get(index).copied()
    }

    pub fn inverse_bind_transform(&self, index: usize) -> Option<Mat4> {
        self.bind_world_transforms.get(index).map(|m| m.inverse())
    }

    pub fn object_transform(&self) -> Locator {
        self.object_transform
    }

    /// Set the object to world transform.
    /// World locators are invalidated only if the value changed.
    pub fn set_object_transform(&mut self, object_transform: Locator) {
        if !object_transform.is_finite() {
            error!("Ignoring non finite object transform {object_transform:?}");
            debug_assert!(object_transform.is_finite());
            return;
        }

        if object_transform != self.object_transform {
            self.invalidate_all_locators();
        }
        self.object_transform = object_transform;
    }

    /// Recompute the world locator for a joint from its parent locator and local parameters.
    /// Root joints are left unchanged.
    pub fn update_joint_locator_ws(&mut self, index: usize) {
        let Some(parent) = self.parent_index(index) else {
            return;
        };
        let Some(parent_locator) = self.joint_locator_ws(parent) else {
            return;
        };

        let local = self.local[index];
        let locator = parent_locator
            .transform(&Locator::new(
                local.translation * self.root_scale(),
                local.rotation,
            ))
            .normalized();
        // The index is valid since the joint has a parent.
        let _ = self.overwrite_joint_locator_ws(index, locator);
    }

    /// Recompute the world locators for `index` and its descendants from local parameters.
    /// The root joint is placed relative to `align`.
    #[tracing::instrument(skip_all)]
    pub fn update_world_sub_pose(&mut self, align: &Locator, index: usize) {
        if index >= self.local.len() {
            error!(
                "Joint index {index} out of range for {} joints",
                self.local.len()
            );
            return;
        }

        for joint in self.sub_tree(index) {
            if joint == 0 {
                let local = self.local[0];
                let locator = align.transform(&Locator::new(
                    local.translation * self.root_scale(),
                    local.rotation,
                ));
                let _ = self.overwrite_joint_locator_ws(0, locator);
            } else {
                self.update_joint_locator_ws(joint);
            }
        }
    }

    /// Recompute all world locators relative to `align`
    /// with translations scaled by the root scale and `scale`.
    #[tracing::instrument(skip_all)]
    pub fn update_world_root_sub_pose(&mut self, align: &Locator, scale: Vec3) {
        let root_scale = self.local[0].scale * scale;

        for joint in 0..self.local.len() {
            let local = self.local[joint];
            let locator = Locator::new(local.translation * root_scale, local.rotation);
            let world = match self.parent_index(joint) {
                Some(parent) => self.world_locators[parent].transform(&locator),
                None => align.transform(&locator),
            };
            let _ = self.overwrite_joint_locator_ws(joint, world);
        }
    }

    /// Move a joint by `move_ws` in world space. Root joints are not moved.
    pub fn move_joint_ws(&mut self, index: usize, move_ws: Vec3) {
        let root_scale = self.root_scale();
        if root_scale <= 0.0 {
            warn!("Unable to move joint {index} with root scale {root_scale}");
            return;
        }
        let Some(parent) = self.parent_index(index) else {
            return;
        };
        let Some(parent_locator) = self.joint_locator_ws(parent) else {
            return;
        };

        let delta = parent_locator.untransform_vector(move_ws / root_scale);
        self.local[index].translation += delta;
        self.in_bind_pose = false;
        self.update_joint_locator_ws(index);
    }

    /// Rotate a joint by `rotor` in world space. Root joints are not rotated.
    pub fn rotate_joint_ws(&mut self, index: usize, rotor: Quat) {
        let Some(parent) = self.parent_index(index) else {
            return;
        };
        let Some(parent_locator) = self.joint_locator_ws(parent) else {
            return;
        };

        let parent_rotation = parent_locator.rotation;
        let premul = parent_rotation.conjugate() * rotor * parent_rotation;
        let local = &mut self.local[index];
        local.rotation = (premul * local.rotation).normalize();
        self.in_bind_pose = false;
        self.update_joint_locator_ws(index);
    }

    /// Apply `rotation` before the joint's local rotation.
    pub fn pre_rotate_joint_ls(&mut self, index: usize, rotation: Quat) {
        if let Some(local) = self.local.get_mut(index) {
            local.rotation = (rotation * local.rotation).normalize();
            self.in_bind_pose = false;
            self.update_joint_locator_ws(index);
        }
    }

    /// Apply `rotation` after the joint's local rotation.
    pub fn post_rotate_joint_ls(&mut self, index: usize, rotation: Quat) {
        if let Some(local) = self.local.get_mut(index) {
            local.rotation = (local.rotation * rotation).normalize();
            self.in_bind_pose = false;
            self.update_joint_locator_ws(index);
        }
    }

    /// Translate the root joint by `translation` in world space.
    /// Every cached world locator is shifted by the same amount.
    pub fn translate_root_ws(&mut self, translation: Vec3, object_locator: &Locator) {
        // Convert before the root changes so stale locators aren't shifted twice.
        for joint in 0..self.local.len() {
            if let Some(mut locator) = self.joint_locator_ws(joint) {
                locator.translation += translation;
                let _ = self.overwrite_joint_locator_ws(joint, locator);
            }
        }

        let root_scale = self.root_scale();
        self.local[0].translation += object_locator.untransform_vector(translation) * root_scale;
        self.in_bind_pose = false;
    }

    /// Rotate the root joint by `rotor` in world space.
    pub fn rotate_root_ws(&mut self, rotor: Quat, object_locator: &Locator) {
        let object_rotation = object_locator.rotation;
        let premul = object_rotation.conjugate() * rotor * object_rotation;
        self.local[0].rotation = (premul * self.local[0].rotation).normalize();
        self.in_bind_pose = false;
    }

    /// The center and radius of a sphere enclosing the world space joint positions.
    pub fn bounding_sphere(&mut self, padding: f32) -> (Vec3, f32) {
        self.validate_all();

        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for locator in &self.world_locators {
            min = min.min(locator.translation);
            max = max.max(locator.translation);
        }

        let center = (min + max) * 0.5;
        let radius = (max - min).length() * 0.5 + padding;
        (center, radius)
    }

    pub fn input_control(&self, index: usize) -> Option<f32> {
        self.input_controls.get(index).copied()
    }

    pub fn input_control_by_name(&self, name: &str) -> Option<f32> {
        self.skeleton
            .input_control_index(name)
            .and_then(|i| self.input_control(i))
    }

    pub fn set_input_control(&mut self, index: usize, value: f32) {
        if let Some(control) = self.input_controls.get_mut(index) {
            *control = value;
        }
    }

    pub fn output_control(&self, index: usize) -> Option<f32> {
        self.output_controls.get(index).copied()
    }

    pub fn output_control_by_name(&self, name: &str) -> Option<f32> {
        self.skeleton
            .output_control_index(name)
            .and_then(|i| self.output_control(i))
    }

    pub fn set_output_control(&mut self, index: usize, value: f32) {
        if let Some(control) = self.output_controls.get_mut(index) {
            *control = value;
        }
    }

    pub fn output_controls(&self) -> &[f32] {
        &self.output_controls
    }

    /// The number of joint transforms recomputed since creation.
    pub fn conversion_count(&self) -> u64 {
        self.conversion_count
    }

    /// `index` followed by all of its descendants in skeleton order.
    fn sub_tree(&self, index: usize) -> Vec<usize> {
        let count = self.local.len();
        if index >= count {
            return Vec::new();
        }

        let mut in_tree = JointBitSet::new(count);
        in_tree.set(index);
        let mut joints = vec![index];
        for joint in index + 1..count {
            if self.parent_index(joint).is_some_and(|p| in_tree.is_set(p)) {
                in_tree.set(joint);
                joints.push(joint);
            }
        }
        joints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use glam::vec3;

    use crate::Joint;

    fn joint(name: &str, translation: Vec3, parent_index: Option<usize>) -> Joint {
        Joint {
            name: name.into(),
            transform: Transform {
                translation,
                ..Transform::IDENTITY
            },
            parent_index,
        }
    }

    fn chain() -> Arc<Skeleton> {
        Arc::new(Skeleton::new(vec![
            joint("root", Vec3::ZERO, None),
            joint("spine", vec3(0.0, 1.0, 0.0), Some(0)),
            joint("head", vec3(0.0, 1.0, 0.0), Some(1)),
            joint("arm", vec3(1.0, 0.0, 0.0), Some(1)),
        ]))
    }

    #[test]
    fn create_empty_skeleton() {
        assert_eq!(
            Err(CreatePoseCacheError::EmptySkeleton),
            PoseCache::new(Arc::new(Skeleton::default())).map(|_| ())
        );
    }

    #[test]
    fn reset_to_bind_pose_world_transforms() {
        let skeleton = chain();
        let mut cache = PoseCache::new(skeleton.clone()).unwrap();
        let expected = skeleton.bind_world_transforms();
        for (i, transform) in expected.iter().enumerate() {
            assert!(cache.is_transform_valid(i));
            assert!(!cache.is_locator_valid(i));
            assert_relative_eq!(*transform, cache.joint_transform(i).unwrap());
        }
        assert!(cache.is_in_bind_pose());
    }

    #[test]
    fn lazy_conversion_is_idempotent() {
        let mut cache = PoseCache::new(chain()).unwrap();
        cache
            .set_joint_params(
                1,
                Transform {
                    translation: vec3(0.0, 2.0, 0.0),
                    ..Transform::IDENTITY
                },
            )
            .unwrap();
        cache.invalidate_sub_tree(1);
        assert!(cache.is_transform_valid(0));
        assert!(!cache.is_transform_valid(3));

        let before = cache.conversion_count();
        let first = cache.joint_transform(2).unwrap();
        // Only spine and head are recomputed.
        assert_eq!(before + 2, cache.conversion_count());

        let second = cache.joint_transform(2).unwrap();
        assert_eq!(first, second);
        assert_eq!(before + 2, cache.conversion_count());
        assert_relative_eq!(vec3(0.0, 3.0, 0.0), first.w_axis.truncate());
        assert!(!cache.is_transform_valid(3));
    }

    #[test]
    fn set_joint_params_out_of_range() {
        let mut cache = PoseCache::new(chain()).unwrap();
        assert_eq!(
            Err(JointIndexError { index: 9, count: 4 }),
            cache.set_joint_params(9, Transform::IDENTITY)
        );
        assert_eq!(None, cache.joint_transform(9));
        assert_eq!(None, cache.joint_locator_ws(9));
        assert_eq!(Transform::IDENTITY, cache.joint_params_or_bind(9));
    }

    #[test]
    fn joint_params_or_bind_non_finite() {
        let mut cache = PoseCache::new(chain()).unwrap();
        let previous = *cache.joint_params(1).unwrap();
        cache.local[1].translation = vec3(f32::NAN, 0.0, 0.0);
        assert_eq!(previous, cache.joint_params_or_bind(1));
    }

    #[test]
    fn object_transform_invalidates_on_change() {
        let mut cache = PoseCache::new(chain()).unwrap();
        cache.validate_all();
        assert!(cache.is_locator_valid(2));

        cache.set_object_transform(Locator::IDENTITY);
        assert!(cache.is_locator_valid(2));

        cache.set_object_transform(Locator::from_translation(vec3(5.0, 0.0, 0.0)));
        assert!(!cache.is_locator_valid(2));
        assert!(cache.is_transform_valid(2));
        assert_relative_eq!(
            vec3(5.0, 2.0, 0.0),
            cache.joint_locator_ws(2).unwrap().translation
        );
    }

    #[test]
    fn move_joint_ws_in_parent_space() {
        let mut cache = PoseCache::new(chain()).unwrap();
        cache.post_rotate_joint_ls(1, Quat::from_rotation_y(std::f32::consts::FRAC_PI_2));
        cache.invalidate_sub_tree(1);

        cache.move_joint_ws(3, vec3(0.0, 0.0, -1.0));
        // -Z in world space is +X in the rotated spine space.
        assert_relative_eq!(
            vec3(2.0, 0.0, 0.0),
            cache.joint_params(3).unwrap().translation,
            epsilon = 0.0001
        );
        assert!(cache.is_locator_valid(3));
    }

    #[test]
    fn move_root_joint_ignored() {
        let mut cache = PoseCache::new(chain()).unwrap();
        cache.move_joint_ws(0, vec3(1.0, 0.0, 0.0));
        assert_eq!(Vec3::ZERO, cache.joint_params(0).unwrap().translation);
    }

    #[test]
    fn translate_root_ws_shifts_locators() {
        let mut cache = PoseCache::new(chain()).unwrap();
        cache.validate_all();
        cache.translate_root_ws(vec3(0.0, 0.0, 2.0), &Locator::IDENTITY);
        assert_eq!(vec3(0.0, 0.0, 2.0), cache.joint_params(0).unwrap().translation);
        assert_relative_eq!(
            vec3(0.0, 2.0, 2.0),
            cache.joint_locator_ws(2).unwrap().translation
        );
    }

    #[test]
    fn translate_root_ws_after_reset() {
        let mut cache = PoseCache::new(chain()).unwrap();
        assert!(!cache.is_locator_valid(2));

        cache.translate_root_ws(vec3(0.0, 0.0, 2.0), &Locator::IDENTITY);
        assert!(cache.is_locator_valid(2));
        assert_relative_eq!(
            vec3(0.0, 2.0, 2.0),
            cache.joint_locator_ws(2).unwrap().translation
        );
        assert_relative_eq!(
            vec3(1.0, 1.0, 2.0),
            cache.joint_locator_ws(3).unwrap().translation
        );
    }

    #[test]
    fn update_world_sub_pose_from_align() {
        let mut cache = PoseCache::new(chain()).unwrap();
        let align = Locator::from_translation(vec3(10.0, 0.0, 0.0));
        cache.update_world_sub_pose(&align, 0);
        assert_relative_eq!(
            vec3(10.0, 2.0, 0.0),
            cache.joint_locator_ws(2).unwrap().translation
        );
        assert_relative_eq!(
            vec3(11.0, 1.0, 0.0),
            cache.joint_locator_ws(3).unwrap().translation
        );
    }

    #[test]
    fn update_world_root_sub_pose_scaled() {
        let mut cache = PoseCache::new(chain()).unwrap();
        cache.update_world_root_sub_pose(&Locator::IDENTITY, Vec3::splat(2.0));
        assert_relative_eq!(
            vec3(0.0, 4.0, 0.0),
            cache.joint_locator_ws(2).unwrap().translation
        );
    }

    #[test]
    fn update_world_root_sub_pose_keeps_root_rotation() {
        let mut cache = PoseCache::new(chain()).unwrap();
        cache.post_rotate_joint_ls(0, Quat::from_rotation_z(std::f32::consts::FRAC_PI_2));
        cache.update_world_root_sub_pose(&Locator::IDENTITY, Vec3::ONE);
        assert_relative_eq!(
            vec3(-1.0, 0.0, 0.0),
            cache.joint_locator_ws(1).unwrap().translation,
            epsilon = 0.0001
        );
        assert_relative_eq!(
            vec3(-2.0, 0.0, 0.0),
            cache.joint_locator_ws(2).unwrap().translation,
            epsilon = 0.0001
        );
    }

    #[test]
    fn bounding_sphere_of_joints() {
        let mut cache = PoseCache::new(chain()).unwrap();
        let (center, radius) = cache.bounding_sphere(0.5);
        assert_relative_eq!(vec3(0.5, 1.0, 0.0), center);
        assert_relative_eq!(5.0f32.sqrt() * 0.5 + 0.5, radius);
    }

    #[test]
    fn controls_by_name() {
        let mut skeleton = Skeleton::new(vec![joint("root", Vec3::ZERO, None)]);
        skeleton.input_controls = vec!["blink".into()];
        skeleton.output_controls = vec!["wrinkle".into()];
        let mut cache = PoseCache::new(Arc::new(skeleton)).unwrap();

        cache.set_input_control(0, 0.25);
        cache.set_output_control(0, 0.75);
        assert_eq!(Some(0.25), cache.input_control_by_name("blink"));
        assert_eq!(Some(0.75), cache.output_control_by_name("wrinkle"));
        assert_eq!(None, cache.output_control_by_name("blink"));

        cache.reset_to_bind_pose();
        assert_eq!(Some(0.0), cache.input_control(0));
    }
}
