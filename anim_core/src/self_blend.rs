//! Blending the align of a newly started state from its source action pack
//! reference to a destination reference over part of the clip.
use smol_str::SmolStr;

use crate::{
    BlendCurve, Locator,
    align::{InstanceAlignCallback, ap_to_align_delta},
    clip::AP_REFERENCE_CHANNEL,
    curve::lerp_scale_clamp,
    instance::InstanceId,
    request::FadeToStateParams,
    state_instance::StateInstance,
};

#[derive(Debug, Clone, PartialEq)]
pub struct SelfBlendParams {
    /// The phase of the destination instance where the blend starts.
    /// A negative phase disables the blend.
    pub phase: f32,
    /// The blend duration in seconds.
    pub time: f32,
    pub curve: BlendCurve,
    /// The blend always completes by this phase.
    pub constraint_phase: Option<f32>,
    pub dest_ap: Locator,
    pub ap_channel: SmolStr,
}

impl Default for SelfBlendParams {
    fn default() -> Self {
        Self {
            phase: 0.0,
            time: 0.0,
            curve: BlendCurve::UniformS,
            constraint_phase: None,
            dest_ap: Locator::IDENTITY,
            ap_channel: AP_REFERENCE_CHANNEL.into(),
        }
    }
}

/// Moves the align of a single state instance from the source AP to the destination AP.
#[derive(Debug, Clone, PartialEq)]
pub struct SelfBlend {
    params: SelfBlendParams,
    source_ap: Locator,
    source_channel: SmolStr,
    instance_id: InstanceId,
}

impl SelfBlend {
    pub fn new(params: SelfBlendParams) -> Self {
        Self {
            source_ap: params.dest_ap,
            source_channel: params.ap_channel.clone(),
            params,
            instance_id: InstanceId::INVALID,
        }
    }

    pub fn params(&self) -> &SelfBlendParams {
        &self.params
    }

    pub fn update_params(&mut self, params: SelfBlendParams) {
        self.params = params;
    }

    pub fn update_dest_ap_ref(&mut self, ap_ref: Locator) {
        self.params.dest_ap = ap_ref;
    }

    pub fn update_source_ap_ref(&mut self, ap_ref: Locator, channel: SmolStr) {
        self.source_ap = ap_ref;
        self.source_channel = channel;
    }

    pub fn source_ap(&self) -> Locator {
        self.source_ap
    }

    /// Record the requested AP as the source and retarget the request to the destination AP.
    pub fn prepare(&mut self, params: &mut FadeToStateParams) {
        match params.ap_ref {
            Some(ap_ref) => {
                self.source_ap = ap_ref;
                self.source_channel = params
                    .ap_channel
                    .clone()
                    .unwrap_or_else(|| AP_REFERENCE_CHANNEL.into());
            }
            None => {
                self.source_ap = self.params.dest_ap;
                self.source_channel = self.params.ap_channel.clone();
            }
        }
        params.ap_ref = Some(self.params.dest_ap);
        params.ap_channel = Some(self.params.ap_channel.clone());
    }

    pub fn bind(&mut self, instance_id: InstanceId) {
        self.instance_id = instance_id;
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn is_bound(&self) -> bool {
        self.instance_id.is_valid()
    }

    /// The blend progress from `0.0` to `1.0` before applying the curve,
    /// or `None` if the blend is disabled.
    pub fn completion(&self, instance: &StateInstance) -> Option<f32> {
        if self.params.phase < 0.0 {
            return None;
        }

        let start = self.params.phase;
        let duration = instance.duration();
        let mut end = if duration > 0.0 {
            start + self.params.time / duration
        } else {
            start
        };
        if let Some(constraint) = self.params.constraint_phase.filter(|p| *p >= 0.0) {
            end = end.min(constraint);
        }
        Some(lerp_scale_clamp(start, end, 0.0, 1.0, instance.phase()))
    }

    /// The align of `instance` between the source and destination AP aligns.
    pub fn instance_align(&self, instance: &StateInstance) -> Option<Locator> {
        let blend = self.params.curve.evaluate(self.completion(instance)?);
        let source = || {
            self.source_ap
                .transform(&ap_to_align_delta(instance, &self.source_channel))
        };
        let dest = || {
            self.params
                .dest_ap
                .transform(&ap_to_align_delta(instance, &self.params.ap_channel))
        };

        let align = if blend <= 0.0 {
            source()
        } else if blend >= 1.0 {
            dest()
        } else {
            source().lerp(&dest(), blend)
        };
        Some(align.normalized())
    }

    /// A layer callback applying this blend to the bound instance only.
    pub fn align_callback(&self) -> InstanceAlignCallback {
        let blend = self.clone();
        InstanceAlignCallback::new(move |instance, _| {
            if instance.id() == blend.instance_id {
                blend.instance_align(instance)
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use approx::assert_relative_eq;
    use glam::vec3;

    use crate::{
        ClipData,
        clip::ALIGN_CHANNEL,
        state::AnimState,
        state_instance::StateInstanceInit,
    };

    fn instance(start_phase: f32) -> StateInstance {
        let clip = ClipData {
            name: "enter".into(),
            frames_per_second: 10.0,
            frame_count: 11,
            locator_channels: [
                (ALIGN_CHANNEL.into(), vec![Locator::IDENTITY; 11]),
                (AP_REFERENCE_CHANNEL.into(), vec![Locator::IDENTITY; 11]),
            ]
            .into_iter()
            .collect(),
            ..Default::default()
        };
        StateInstance::new(StateInstanceInit {
            id: InstanceId(3),
            state: AnimState::new("enter", "enter"),
            clip: Arc::new(clip),
            start_phase,
            anim_fade_time: 0.0,
            motion_fade_time: 0.0,
            curve: BlendCurve::Linear,
            ap_ref: Locator::IDENTITY,
            mirror: false,
            freeze_during_fade_in: false,
        })
    }

    fn self_blend() -> SelfBlend {
        let mut blend = SelfBlend::new(SelfBlendParams {
            phase: 0.25,
            time: 0.5,
            curve: BlendCurve::Linear,
            dest_ap: Locator::from_translation(vec3(4.0, 0.0, 0.0)),
            ..Default::default()
        });
        let mut params = FadeToStateParams {
            ap_ref: Some(Locator::IDENTITY),
            ..Default::default()
        };
        blend.prepare(&mut params);
        assert_eq!(Some(blend.params().dest_ap), params.ap_ref);
        blend
    }

    #[test]
    fn completion_phase_range() {
        let blend = self_blend();
        assert_eq!(Some(0.0), blend.completion(&instance(0.0)));
        assert_eq!(Some(0.5), blend.completion(&instance(0.5)));
        assert_eq!(Some(1.0), blend.completion(&instance(1.0)));
    }

    #[test]
    fn completion_constraint_phase() {
        let mut blend = self_blend();
        blend.update_params(SelfBlendParams {
            constraint_phase: Some(0.5),
            time: 2.0,
            ..blend.params().clone()
        });
        assert_eq!(Some(1.0), blend.completion(&instance(0.5)));
    }

    #[test]
    fn negative_phase_disables() {
        let mut blend = self_blend();
        blend.update_params(SelfBlendParams {
            phase: -1.0,
            ..Default::default()
        });
        assert_eq!(None, blend.completion(&instance(0.5)));
        assert_eq!(None, blend.instance_align(&instance(0.5)));
    }

    #[test]
    fn align_moves_to_dest_ap() {
        let blend = self_blend();
        let align = blend.instance_align(&instance(0.5)).unwrap();
        assert_relative_eq!(vec3(2.0, 0.0, 0.0), align.translation);
        let align = blend.instance_align(&instance(1.0)).unwrap();
        assert_relative_eq!(vec3(4.0, 0.0, 0.0), align.translation);
    }

    #[test]
    fn callback_only_for_bound_instance() {
        let mut blend = self_blend();
        let callback = blend.align_callback();
        let instance = instance(1.0);
        let args = crate::state::AlignFuncArgs {
            state: instance.state_name(),
            base_align: Locator::IDENTITY,
            instance_align: Locator::IDENTITY,
            ap_ref: Locator::IDENTITY,
            phase: 1.0,
        };
        assert_eq!(None, callback.call(&instance, &args));

        blend.bind(InstanceId(3));
        assert!(blend.is_bound());
        let callback = blend.align_callback();
        assert!(callback.call(&instance, &args).is_some());
    }
}
