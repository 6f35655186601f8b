//! Resolving the object align from the align and action pack reference channels.
//!
//! Clips store the `align` channel in animation space and the `apReference`
//! channel relative to the align. An action pack reference (AP reference) is
//! the world space locator that the `apReference` channel should line up with.
use std::{fmt, sync::Arc};

use glam::{Mat3, Quat, Vec3};
use log::error;

use crate::{
    ClipData, Locator, StateLayer,
    clip::ALIGN_CHANNEL,
    instance::InstanceId,
    state::{AlignFuncArgs, StateFlags},
    state_instance::StateInstance,
};

/// Squared lengths at or below this are treated as zero for spherical blending.
const DEGENERATE_LENGTH_SQUARED: f32 = 1e-30;

/// Positions further apart than this angle (135 degrees) are blended linearly.
const COS_SPHERICAL_LIMIT: f32 = -std::f32::consts::FRAC_1_SQRT_2;

/// A custom align for every instance of a [StateLayer].
/// Returning `None` keeps the computed align.
#[derive(Clone)]
pub struct InstanceAlignCallback(
    pub Arc<dyn Fn(&StateInstance, &AlignFuncArgs) -> Option<Locator> + Send + Sync>,
);

impl InstanceAlignCallback {
    pub fn new(
        f: impl Fn(&StateInstance, &AlignFuncArgs) -> Option<Locator> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, instance: &StateInstance, args: &AlignFuncArgs) -> Option<Locator> {
        (self.0)(instance, args)
    }
}

impl fmt::Debug for InstanceAlignCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InstanceAlignCallback")
    }
}

/// The align relative to the AP reference for `clip` at `phase`.
///
/// This is the inverse of the AP channel, the raw align channel if there is
/// no AP channel, or identity if the clip has no align channel.
pub fn clip_ap_to_align_delta(
    clip: &ClipData,
    phase: f32,
    ap_channel: &str,
    mirror: bool,
) -> Locator {
    let Some(align) = clip.evaluate_channel(ALIGN_CHANNEL, phase, mirror) else {
        return Locator::IDENTITY;
    };
    match clip.evaluate_channel(ap_channel, phase, mirror) {
        Some(ap) => ap.inverse().normalized(),
        None => align,
    }
}

/// [clip_ap_to_align_delta] for the current phase of `instance`.
pub fn ap_to_align_delta(instance: &StateInstance, ap_channel: &str) -> Locator {
    clip_ap_to_align_delta(
        instance.clip(),
        instance.phase(),
        ap_channel,
        instance.is_mirrored(),
    )
}

/// The world align that places the AP channel of `clip` at `ap_ref`.
///
/// Clips without the AP channel fall back to treating the align channel as
/// relative to `ap_ref`.
pub fn find_align_from_ap_reference(
    clip: &ClipData,
    phase: f32,
    ap_ref: &Locator,
    ap_channel: &str,
    mirror: bool,
) -> Option<Locator> {
    if let Some(ap) = clip.evaluate_channel(ap_channel, phase, mirror) {
        return Some(ap_ref.transform(&ap.inverse()).normalized());
    }
    if ap_channel != ALIGN_CHANNEL
        && let Some(align) = clip.evaluate_channel(ALIGN_CHANNEL, phase, mirror)
    {
        return Some(ap_ref.transform(&align).normalized());
    }
    None
}

/// Remove pitch and roll so the locator's Y axis points up.
pub fn adjust_locator_to_upright(locator: &Locator) -> Locator {
    let forward = locator.rotation * Vec3::Z;
    let forward = (forward - Vec3::Y * forward.dot(Vec3::Y)).normalize_or(Vec3::Z);
    let right = Vec3::Y.cross(forward);
    let rotation = Quat::from_mat3(&Mat3::from_cols(right, Vec3::Y, forward)).normalize();
    Locator::new(locator.translation, rotation)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum AlignInterp {
    #[default]
    Linear,
    /// Blend positions along an arc around the base align.
    Spherical,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignData {
    pub align: Locator,
    pub interp: AlignInterp,
}

/// Blends the aligns of all instances of a [StateLayer] into a single object align.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimAlignBlender {
    /// The object align at the start of the step.
    pub base_align: Locator,
    /// Uniform object scale applied to animated translation.
    pub scale: f32,
    pub interp: AlignInterp,
}

impl AnimAlignBlender {
    pub fn new(base_align: Locator, scale: f32) -> Self {
        Self {
            base_align,
            scale,
            interp: AlignInterp::Linear,
        }
    }

    pub fn with_interp(self, interp: AlignInterp) -> Self {
        Self { interp, ..self }
    }

    /// The align this instance would produce on its own.
    ///
    /// Saved aligns only apply once the instance is no longer the newest in its layer.
    pub fn data_for_instance(
        &self,
        instance: &StateInstance,
        is_top: bool,
        callback: Option<&InstanceAlignCallback>,
    ) -> AlignData {
        let flags = instance.state_flags();

        let mut ap_align_delta = if flags.contains(StateFlags::FIRST_ALIGN_REF_MOVE_UPDATE) {
            instance
                .evaluate_channel(ALIGN_CHANNEL)
                .unwrap_or(Locator::IDENTITY)
        } else {
            ap_to_align_delta(instance, instance.ap_channel())
        };
        ap_align_delta.translation *= self.scale;

        let mut align_delta = instance.channel_delta();
        align_delta.translation *= self.scale;

        let use_ap = flags
            .intersects(StateFlags::AP_MOVE_UPDATE | StateFlags::FIRST_ALIGN_REF_MOVE_UPDATE)
            && !(flags.contains(StateFlags::EXTRAPOLATE_ALIGN) && instance.phase() == 1.0);

        let saved = instance
            .saved_align()
            .filter(|_| !is_top && flags.contains(StateFlags::SAVE_TOP_ALIGN));
        let align = if let Some(saved) = saved {
            saved
        } else if flags.contains(StateFlags::NO_ALIGN_MOVE_UPDATE) {
            self.base_align
        } else if use_ap {
            instance.ap_ref().transform(&ap_align_delta)
        } else {
            let mut delta = align_delta;
            let phase_delta = instance.phase() - instance.prev_phase();
            if flags.contains(StateFlags::EXTRAPOLATE_ALIGN)
                && !instance.is_frozen()
                && phase_delta > 0.0
                && instance.update_rate() != 0.0
            {
                // Make up for the time lost to clamping at the end of the clip.
                let truncated = phase_delta / instance.update_rate();
                let full = truncated + instance.remainder_time();
                delta.translation *= full / truncated;
            }
            self.base_align.transform(&delta)
        };
        let mut align = align.normalized();

        if !flags.contains(StateFlags::NO_ADJUST_TO_UPRIGHT) {
            align = adjust_locator_to_upright(&align);
        }

        let args = AlignFuncArgs {
            state: instance.state_name(),
            base_align: self.base_align,
            instance_align: align,
            ap_ref: instance.ap_ref(),
            phase: instance.phase(),
        };
        let custom = match &instance.state().align_func {
            Some(f) => f.call(&args),
            None => callback.and_then(|c| c.call(instance, &args)),
        };
        if let Some(custom) = custom {
            align = custom;
        }

        if !align.is_finite() {
            error!(
                "Non finite align for state {:?}. Using the base align.",
                instance.state_name()
            );
            debug_assert!(align.is_finite());
            align = self.base_align;
        }

        AlignData {
            align,
            interp: self.interp,
        }
    }

    /// Blend `right` over `left` by the motion fade of the newer instance.
    pub fn blend_data(&self, left: &AlignData, right: &AlignData, motion_fade: f32) -> AlignData {
        let spherical =
            left.interp == AlignInterp::Spherical && right.interp == AlignInterp::Spherical;
        if spherical {
            AlignData {
                align: self.spherical_blend(&left.align, &right.align, motion_fade),
                interp: AlignInterp::Spherical,
            }
        } else {
            AlignData {
                align: left.align.lerp(&right.align, motion_fade),
                interp: AlignInterp::Linear,
            }
        }
    }

    /// Blend positions around the base align instead of along a straight line.
    pub fn spherical_blend(&self, left: &Locator, right: &Locator, t: f32) -> Locator {
        let rotation = left.rotation.slerp(right.rotation, t).normalize();

        let base = self.base_align.translation;
        let left_delta = left.translation - base;
        let right_delta = right.translation - base;
        let linear = Locator::new(left.translation.lerp(right.translation, t), rotation);

        if left_delta.length_squared() <= DEGENERATE_LENGTH_SQUARED
            || right_delta.length_squared() <= DEGENERATE_LENGTH_SQUARED
        {
            return linear;
        }

        let left_dir = left_delta.normalize();
        let right_dir = right_delta.normalize();
        if left_dir.dot(right_dir) < COS_SPHERICAL_LIMIT {
            // Nearly opposite directions swing from side to side.
            return linear;
        }

        let arc = Quat::from_rotation_arc(left_dir, right_dir);
        let dir = Quat::IDENTITY.slerp(arc, t) * left_dir;
        let length = left_delta.length() + (right_delta.length() - left_delta.length()) * t;
        Locator::new(base + dir * length, rotation)
    }

    /// Blend all instances of `layer` from oldest to newest.
    ///
    /// Each instance's own align is recorded in `table` if provided.
    #[tracing::instrument(skip_all)]
    pub fn blend_forward(
        &self,
        layer: &StateLayer,
        mut table: Option<&mut InstanceAlignTable>,
    ) -> Locator {
        let callback = layer.align_callback();
        let mut result: Option<AlignData> = None;
        for (i, instance) in layer.instances().iter().enumerate().rev() {
            let data = self.data_for_instance(instance, i == 0, callback);
            if let Some(table) = table.as_deref_mut() {
                table.set(instance.id(), data.align);
            }
            result = Some(match result {
                Some(acc) => self.blend_data(&acc, &data, instance.motion_fade()),
                None => data,
            });
        }
        result.map(|r| r.align).unwrap_or(self.base_align)
    }
}

/// A bounded table of per instance aligns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceAlignTable {
    entries: Vec<(InstanceId, Locator)>,
    max_len: usize,
}

impl InstanceAlignTable {
    pub fn new(max_len: usize) -> Self {
        Self {
            entries: Vec::with_capacity(max_len),
            max_len,
        }
    }

    /// Returns `false` if the table is full and `id` is not already present.
    pub fn set(&mut self, id: InstanceId, align: Locator) -> bool {
        if let Some(entry) = self.entries.iter_mut().find(|(i, _)| *i == id) {
            entry.1 = align;
            true
        } else if self.entries.len() < self.max_len {
            self.entries.push((id, align));
            true
        } else {
            false
        }
    }

    pub fn get(&self, id: InstanceId) -> Option<Locator> {
        self.entries
            .iter()
            .find_map(|(i, align)| (*i == id).then_some(*align))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use glam::vec3;

    use crate::{
        AnimActor, AnimState, ClipTable,
        clip::AP_REFERENCE_CHANNEL,
        layer::{LayerConfig, LayerKind},
        request::FadeToStateParams,
        state::AlignFunc,
    };

    fn clip(name: &str, with_ap: bool) -> ClipData {
        let mut locator_channels = vec![(
            ALIGN_CHANNEL.into(),
            (0..11)
                .map(|i| Locator::from_translation(vec3(0.0, 0.0, i as f32)))
                .collect::<Vec<_>>(),
        )];
        if with_ap {
            locator_channels.push((
                AP_REFERENCE_CHANNEL.into(),
                vec![Locator::from_translation(vec3(0.0, 0.0, 2.0)); 11],
            ));
        }
        ClipData {
            name: name.into(),
            frames_per_second: 10.0,
            frame_count: 11,
            locator_channels: locator_channels.into_iter().collect(),
            ..Default::default()
        }
    }

    fn layer(state: AnimState) -> (StateLayer, ClipTable) {
        let clips: ClipTable = [clip("walk", false), clip("enter", true)]
            .into_iter()
            .collect();
        let actor = Arc::new(AnimActor::new("player").with_state(state.clone()));
        let mut layer = StateLayer::new(LayerConfig::new("base", LayerKind::State), actor);
        layer
            .fade_to_state(&clips, &state.name, &FadeToStateParams::default())
            .unwrap();
        layer.begin_step(0.0, 0, &clips);
        (layer, clips)
    }

    #[test]
    fn ap_to_align_delta_inverts_ap_channel() {
        let delta = clip_ap_to_align_delta(&clip("enter", true), 0.5, AP_REFERENCE_CHANNEL, false);
        assert_relative_eq!(vec3(0.0, 0.0, -2.0), delta.translation);

        let delta = clip_ap_to_align_delta(&clip("walk", false), 0.5, AP_REFERENCE_CHANNEL, false);
        assert_relative_eq!(vec3(0.0, 0.0, 5.0), delta.translation);

        let empty = ClipData::default();
        assert_eq!(
            Locator::IDENTITY,
            clip_ap_to_align_delta(&empty, 0.5, AP_REFERENCE_CHANNEL, false)
        );
    }

    #[test]
    fn find_align_from_ap_reference_channels() {
        let ap_ref = Locator::from_translation(vec3(10.0, 0.0, 0.0));
        let align =
            find_align_from_ap_reference(&clip("enter", true), 0.0, &ap_ref, AP_REFERENCE_CHANNEL, false)
                .unwrap();
        assert_relative_eq!(vec3(10.0, 0.0, -2.0), align.translation);

        let align =
            find_align_from_ap_reference(&clip("walk", false), 1.0, &ap_ref, AP_REFERENCE_CHANNEL, false)
                .unwrap();
        assert_relative_eq!(vec3(10.0, 0.0, 10.0), align.translation);

        assert!(
            find_align_from_ap_reference(&ClipData::default(), 0.0, &ap_ref, "custom", false)
                .is_none()
        );
    }

    #[test]
    fn upright_removes_pitch() {
        let tilted = Locator::new(
            vec3(1.0, 2.0, 3.0),
            Quat::from_rotation_y(0.5) * Quat::from_rotation_x(0.3),
        );
        let upright = adjust_locator_to_upright(&tilted);
        assert_relative_eq!(tilted.translation, upright.translation);
        assert_relative_eq!(Vec3::Y, upright.rotation * Vec3::Y, epsilon = 1e-5);
        assert_relative_eq!(
            Quat::from_rotation_y(0.5) * Vec3::Z,
            upright.rotation * Vec3::Z,
            epsilon = 1e-5
        );
    }

    #[test]
    fn spherical_blend_follows_arc() {
        let blender = AnimAlignBlender::new(Locator::IDENTITY, 1.0);
        let left = Locator::from_translation(vec3(2.0, 0.0, 0.0));
        let right = Locator::from_translation(vec3(0.0, 0.0, 2.0));
        let blended = blender.spherical_blend(&left, &right, 0.5);
        assert_relative_eq!(2.0, blended.translation.length(), epsilon = 1e-5);

        // Opposite directions fall back to a straight line.
        let right = Locator::from_translation(vec3(-2.0, 0.0, 0.0));
        let blended = blender.spherical_blend(&left, &right, 0.5);
        assert_relative_eq!(Vec3::ZERO, blended.translation);

        // Degenerate deltas also blend linearly.
        let blended = blender.spherical_blend(&Locator::IDENTITY, &left, 0.25);
        assert_relative_eq!(vec3(0.5, 0.0, 0.0), blended.translation);
    }

    #[test]
    fn blend_data_requires_both_spherical() {
        let blender = AnimAlignBlender::new(Locator::IDENTITY, 1.0);
        let left = AlignData {
            align: Locator::from_translation(vec3(2.0, 0.0, 0.0)),
            interp: AlignInterp::Spherical,
        };
        let right = AlignData {
            align: Locator::from_translation(vec3(0.0, 0.0, 2.0)),
            interp: AlignInterp::Linear,
        };
        let blended = blender.blend_data(&left, &right, 0.5);
        assert_eq!(AlignInterp::Linear, blended.interp);
        assert_relative_eq!(vec3(1.0, 0.0, 1.0), blended.align.translation);
    }

    #[test]
    fn blend_forward_moves_by_channel_delta() {
        let (mut layer, clips) = layer(AnimState::new("walk", "walk"));
        layer.begin_step(0.5, 1, &clips);

        let base = Locator::from_translation(vec3(1.0, 0.0, 0.0));
        let mut table = InstanceAlignTable::new(4);
        let align = AnimAlignBlender::new(base, 2.0).blend_forward(&layer, Some(&mut table));
        assert_relative_eq!(vec3(1.0, 0.0, 10.0), align.translation, epsilon = 1e-5);
        assert_eq!(Some(align), table.get(InstanceId(1)));
    }

    #[test]
    fn blend_forward_ap_move_update() {
        let mut state = AnimState::new("enter", "enter");
        state.flags = StateFlags::AP_MOVE_UPDATE;
        let (mut layer, _) = layer(state);
        layer.set_ap_ref_on_current_state(Locator::from_translation(vec3(0.0, 0.0, 5.0)));

        let align = AnimAlignBlender::new(Locator::IDENTITY, 1.0).blend_forward(&layer, None);
        assert_relative_eq!(vec3(0.0, 0.0, 3.0), align.translation, epsilon = 1e-5);
    }

    #[test]
    fn no_align_move_update_keeps_base() {
        let mut state = AnimState::new("walk", "walk");
        state.flags = StateFlags::NO_ALIGN_MOVE_UPDATE;
        let (mut layer, clips) = layer(state);
        layer.begin_step(0.5, 1, &clips);

        let base = Locator::from_translation(vec3(1.0, 2.0, 3.0));
        let align = AnimAlignBlender::new(base, 1.0).blend_forward(&layer, None);
        assert_relative_eq!(base.translation, align.translation);
    }

    #[test]
    fn extrapolate_align_uses_remainder() {
        let mut state = AnimState::new("walk", "walk");
        state.flags = StateFlags::EXTRAPOLATE_ALIGN;
        let (mut layer, clips) = layer(state);
        layer.begin_step(0.75, 1, &clips);
        layer.begin_step(0.5, 2, &clips);
        assert_eq!(1.0, layer.current_instance().unwrap().phase());

        // Only 2.5 units were played but 5 units worth of time passed.
        let align = AnimAlignBlender::new(Locator::IDENTITY, 1.0).blend_forward(&layer, None);
        assert_relative_eq!(vec3(0.0, 0.0, 5.0), align.translation, epsilon = 1e-4);
    }

    #[test]
    fn align_func_overrides_callback() {
        let mut state = AnimState::new("walk", "walk");
        state.align_func = Some(AlignFunc::new(|args| {
            Some(Locator::from_translation(args.base_align.translation + Vec3::X))
        }));
        let (mut layer, _) = layer(state);
        layer.set_align_callback(Some(InstanceAlignCallback::new(|_, _| {
            Some(Locator::from_translation(Vec3::Y))
        })));

        let align = AnimAlignBlender::new(Locator::IDENTITY, 1.0).blend_forward(&layer, None);
        assert_eq!(Vec3::X, align.translation);
    }

    #[test]
    fn layer_callback_without_align_func() {
        let (mut layer, _) = layer(AnimState::new("walk", "walk"));
        layer.set_align_callback(Some(InstanceAlignCallback::new(|_, _| {
            Some(Locator::from_translation(Vec3::Y))
        })));
        let align = AnimAlignBlender::new(Locator::IDENTITY, 1.0).blend_forward(&layer, None);
        assert_eq!(Vec3::Y, align.translation);
    }

    #[test]
    fn empty_layer_keeps_base_align() {
        let actor = Arc::new(AnimActor::new("player"));
        let layer = StateLayer::new(LayerConfig::new("base", LayerKind::State), actor);
        let base = Locator::from_translation(vec3(1.0, 0.0, 0.0));
        assert_eq!(
            base,
            AnimAlignBlender::new(base, 1.0)
                .with_interp(AlignInterp::Spherical)
                .blend_forward(&layer, None)
        );
    }

    #[test]
    fn instance_align_table_bounded() {
        let mut table = InstanceAlignTable::new(1);
        assert!(table.set(InstanceId(1), Locator::IDENTITY));
        assert!(table.set(InstanceId(1), Locator::from_translation(Vec3::X)));
        assert!(!table.set(InstanceId(2), Locator::IDENTITY));
        assert_eq!(
            Some(Locator::from_translation(Vec3::X)),
            table.get(InstanceId(1))
        );
        assert_eq!(None, table.get(InstanceId(2)));
        assert_eq!(1, table.len());
    }
}
