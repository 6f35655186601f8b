//! Instances of states playing in a [StateLayer](crate::StateLayer).
use std::sync::Arc;

use log::error;
use smol_str::SmolStr;

use crate::{
    BlendCurve, ClipData, Locator,
    clip::{ALIGN_CHANNEL, AP_REFERENCE_CHANNEL},
    curve::clamp01,
    instance::{FadeTimer, InstanceId},
    state::{AnimState, StateFlags},
};

/// A state playing its clip with separate animation and motion fades.
///
/// The animation fade weights the pose and the motion fade weights the align.
#[derive(Debug, Clone)]
pub struct StateInstance {
    id: InstanceId,
    state: AnimState,
    clip: Arc<ClipData>,
    phase: f32,
    prev_phase: f32,
    remainder_time: f32,
    update_rate: f32,
    anim_fade: FadeTimer,
    motion_fade: FadeTimer,
    mirror: bool,
    frozen: bool,
    fade_frozen: bool,
    freeze_during_fade_in: bool,
    auto_transitions_disabled: bool,
    first_update_phase: Option<f32>,
    ap_ref: Locator,
    ap_channel: SmolStr,
    saved_align: Option<Locator>,
    // The align channel before and after the last phase update.
    channel_prev: Locator,
    channel_cur: Locator,
    channel_delta: Locator,
}

pub(crate) struct StateInstanceInit {
    pub id: InstanceId,
    pub state: AnimState,
    pub clip: Arc<ClipData>,
    pub start_phase: f32,
    pub anim_fade_time: f32,
    pub motion_fade_time: f32,
    pub curve: BlendCurve,
    pub ap_ref: Locator,
    pub mirror: bool,
    pub freeze_during_fade_in: bool,
}

impl StateInstance {
    pub(crate) fn new(init: StateInstanceInit) -> Self {
        let StateInstanceInit {
            id,
            state,
            clip,
            start_phase,
            anim_fade_time,
            motion_fade_time,
            curve,
            ap_ref,
            mirror,
            freeze_during_fade_in,
        } = init;

        let update_rate = clip.phase_per_second() * state.playback_rate;
        let phase = if clip.frame_count <= 1 {
            0.0
        } else {
            clamp01(start_phase)
        };
        let freeze_during_fade_in = freeze_during_fade_in
            || state.flags.contains(StateFlags::FREEZE_PHASE_DURING_FADE_IN);

        Self {
            id,
            state,
            clip,
            phase,
            prev_phase: phase,
            remainder_time: 0.0,
            update_rate,
            anim_fade: FadeTimer::new(anim_fade_time, curve),
            motion_fade: FadeTimer::new(motion_fade_time, curve),
            mirror,
            frozen: false,
            fade_frozen: false,
            freeze_during_fade_in,
            auto_transitions_disabled: false,
            first_update_phase: None,
            ap_ref,
            ap_channel: AP_REFERENCE_CHANNEL.into(),
            saved_align: None,
            channel_prev: Locator::IDENTITY,
            channel_cur: Locator::IDENTITY,
            channel_delta: Locator::IDENTITY,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn state(&self) -> &AnimState {
        &self.state
    }

    pub fn state_name(&self) -> &SmolStr {
        &self.state.name
    }

    pub fn state_flags(&self) -> StateFlags {
        self.state.flags
    }

    pub fn clip(&self) -> &Arc<ClipData> {
        &self.clip
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn prev_phase(&self) -> f32 {
        self.prev_phase
    }

    pub fn set_phase(&mut self, phase: f32) {
        if !phase.is_finite() {
            error!("Ignoring non finite phase for state {:?}", self.state.name);
            debug_assert!(phase.is_finite());
            return;
        }
        self.prev_phase = self.phase;
        self.phase = if self.clip.frame_count <= 1 {
            0.0
        } else {
            clamp01(phase)
        };
    }

    /// The authored frame number for the current phase.
    pub fn frame(&self) -> f32 {
        self.clip.authored_frame(self.phase)
    }

    pub fn prev_frame(&self) -> f32 {
        self.clip.authored_frame(self.prev_phase)
    }

    pub fn max_frame(&self) -> f32 {
        self.clip.max_authored_frame()
    }

    pub fn duration(&self) -> f32 {
        self.clip.duration()
    }

    /// Time left over after the phase was clamped at the end of the clip.
    pub fn remainder_time(&self) -> f32 {
        self.remainder_time
    }

    /// Phase per second including the state playback rate.
    pub fn update_rate(&self) -> f32 {
        self.update_rate
    }

    pub fn anim_fade(&self) -> f32 {
        self.anim_fade.value
    }

    pub fn motion_fade(&self) -> f32 {
        self.motion_fade.value
    }

    pub fn master_fade(&self) -> f32 {
        self.anim_fade.value.min(self.motion_fade.value)
    }

    pub fn is_fading(&self) -> bool {
        self.anim_fade.is_fading() || self.motion_fade.is_fading()
    }

    pub fn anim_fade_time_left(&self) -> f32 {
        self.anim_fade.time_left.max(0.0)
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirror
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen || self.fade_frozen
    }

    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    pub fn set_first_update_phase(&mut self, phase: Option<f32>) {
        self.first_update_phase = phase;
    }

    pub fn disable_auto_transitions(&mut self) {
        self.auto_transitions_disabled = true;
    }

    pub fn auto_transitions_disabled(&self) -> bool {
        self.auto_transitions_disabled
    }

    pub fn ap_ref(&self) -> Locator {
        self.ap_ref
    }

    pub fn set_ap_ref(&mut self, ap_ref: Locator) {
        if ap_ref.is_finite() {
            self.ap_ref = ap_ref.normalized();
        } else {
            error!("Ignoring non finite ap reference for state {:?}", self.state.name);
            debug_assert!(ap_ref.is_finite());
        }
    }

    pub fn ap_channel(&self) -> &SmolStr {
        &self.ap_channel
    }

    pub fn set_ap_channel(&mut self, channel: SmolStr) {
        self.ap_channel = channel;
    }

    pub fn saved_align(&self) -> Option<Locator> {
        self.saved_align
    }

    pub fn set_saved_align(&mut self, align: Option<Locator>) {
        self.saved_align = align;
    }

    /// The align channel motion accumulated this step in the space of the previous align.
    pub fn channel_delta(&self) -> Locator {
        self.channel_delta
    }

    pub fn channel_prev_loc(&self) -> Locator {
        self.channel_prev
    }

    pub fn channel_cur_loc(&self) -> Locator {
        self.channel_cur
    }

    pub fn reset_channel_deltas(&mut self) {
        self.channel_delta = Locator::IDENTITY;
        self.channel_prev = Locator::IDENTITY;
        self.channel_cur = Locator::IDENTITY;
    }

    pub(crate) fn copy_channel_locs_from(&mut self, other: &StateInstance) {
        self.channel_prev = other.channel_prev;
        self.channel_cur = other.channel_cur;
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.clip.has_channel(name)
    }

    pub fn evaluate_channel(&self, name: &str) -> Option<Locator> {
        self.evaluate_channel_at(name, self.phase)
    }

    pub fn evaluate_channel_at(&self, name: &str, phase: f32) -> Option<Locator> {
        self.clip.evaluate_channel(name, phase, self.mirror)
    }

    pub fn evaluate_float(&self, name: &str) -> Option<f32> {
        self.clip.evaluate_float(name, self.phase)
    }

    /// Restart a finished instance of the same state.
    pub(crate) fn restart(&mut self, start_phase: f32, ap_ref: Locator) {
        self.prev_phase = self.phase;
        self.phase = clamp01(start_phase);
        self.remainder_time = 0.0;
        self.auto_transitions_disabled = false;
        self.frozen = false;
        self.fade_frozen = false;
        self.freeze_during_fade_in = false;
        self.set_ap_ref(ap_ref);
    }

    /// Update both fades and freeze the phase while fading in if requested.
    pub(crate) fn fade_update(&mut self, delta_time: f32) {
        self.anim_fade.update(delta_time);
        self.motion_fade.update(delta_time);
        self.fade_frozen = self.freeze_during_fade_in && self.is_fading();
    }

    /// Advance the phase clamped to `0.0..=1.0` and accumulate the align channel delta.
    pub(crate) fn phase_update(&mut self, delta_time: f32) {
        let pre = self.evaluate_channel_at(ALIGN_CHANNEL, self.phase);

        self.prev_phase = self.phase;
        self.remainder_time = 0.0;
        if !self.is_frozen() && self.clip.frame_count > 1 {
            let mut phase = self.phase + self.update_rate * delta_time;
            if let Some(first) = self.first_update_phase.take() {
                phase = first;
            }
            if !phase.is_finite() {
                error!("Ignoring non finite phase for state {:?}", self.state.name);
                debug_assert!(phase.is_finite());
                phase = self.phase;
            }

            let overflow = if phase > 1.0 {
                phase - 1.0
            } else if phase < 0.0 {
                -phase
            } else {
                0.0
            };
            if overflow > 0.0 && self.update_rate != 0.0 {
                self.remainder_time = overflow / self.update_rate.abs();
            }
            self.phase = clamp01(phase);
        }

        let post = self.evaluate_channel_at(ALIGN_CHANNEL, self.phase);
        match (pre, post) {
            (Some(pre), Some(post)) => {
                self.channel_prev = pre;
                self.channel_cur = post;
                let delta = pre.untransform(&post);
                // Accumulate in case of multiple updates in the same step.
                self.channel_delta = self.channel_delta.transform(&delta).normalized();
                if let Some(saved) = self.saved_align {
                    self.saved_align = Some(saved.transform(&delta).normalized());
                }
            }
            _ => self.channel_delta = Locator::IDENTITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use glam::vec3;

    fn clip() -> Arc<ClipData> {
        Arc::new(ClipData {
            name: "walk".into(),
            frames_per_second: 30.0,
            frame_count: 31,
            locator_channels: [(
                ALIGN_CHANNEL.into(),
                (0..31)
                    .map(|i| Locator::from_translation(vec3(0.0, 0.0, i as f32)))
                    .collect(),
            )]
            .into(),
            ..Default::default()
        })
    }

    fn instance(state: AnimState, fade_time: f32) -> StateInstance {
        StateInstance::new(StateInstanceInit {
            id: InstanceId(1),
            state,
            clip: clip(),
            start_phase: 0.0,
            anim_fade_time: fade_time,
            motion_fade_time: fade_time,
            curve: BlendCurve::Linear,
            ap_ref: Locator::IDENTITY,
            mirror: false,
            freeze_during_fade_in: false,
        })
    }

    #[test]
    fn phase_clamps_with_remainder() {
        let mut instance = instance(AnimState::new("walk", "walk"), 0.0);
        instance.phase_update(0.75);
        assert_eq!(0.75, instance.phase());
        instance.phase_update(0.5);
        assert_eq!(1.0, instance.phase());
        assert_relative_eq!(0.25, instance.remainder_time());
    }

    #[test]
    fn channel_delta_accumulates() {
        let mut instance = instance(AnimState::new("walk", "walk"), 0.0);
        instance.phase_update(0.25);
        instance.phase_update(0.25);
        assert_relative_eq!(vec3(0.0, 0.0, 15.0), instance.channel_delta().translation);
        assert_relative_eq!(vec3(0.0, 0.0, 15.0), instance.channel_cur_loc().translation);
        instance.reset_channel_deltas();
        assert_eq!(Locator::IDENTITY, instance.channel_delta());
    }

    #[test]
    fn playback_rate_scales_update_rate() {
        let state = AnimState {
            playback_rate: 2.0,
            ..AnimState::new("walk", "walk")
        };
        let mut instance = instance(state, 0.0);
        instance.phase_update(0.25);
        assert_eq!(0.5, instance.phase());
    }

    #[test]
    fn freeze_during_fade_in() {
        let state = AnimState {
            flags: StateFlags::FREEZE_PHASE_DURING_FADE_IN,
            ..AnimState::new("walk", "walk")
        };
        let mut instance = instance(state, 0.5);
        instance.fade_update(0.25);
        assert!(instance.is_frozen());
        instance.phase_update(0.25);
        assert_eq!(0.0, instance.phase());

        instance.fade_update(0.25);
        assert!(!instance.is_frozen());
        assert_eq!(1.0, instance.master_fade());
        instance.phase_update(0.25);
        assert_eq!(0.25, instance.phase());
    }

    #[test]
    fn saved_align_follows_channel() {
        let state = AnimState {
            flags: StateFlags::SAVE_TOP_ALIGN,
            ..AnimState::new("walk", "walk")
        };
        let mut instance = instance(state, 0.0);
        assert_eq!(None, instance.saved_align());
        instance.phase_update(0.5);
        assert_eq!(None, instance.saved_align());

        instance.set_saved_align(Some(Locator::from_translation(vec3(10.0, 0.0, 0.0))));
        instance.phase_update(0.25);
        assert_relative_eq!(
            vec3(10.0, 0.0, 7.5),
            instance.saved_align().unwrap().translation
        );
    }
}
