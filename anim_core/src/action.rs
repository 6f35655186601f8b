//! Gameplay handles tracking a single transition or fade until it completes.
use std::ops::Deref;

use log::{debug, warn};
use smol_str::SmolStr;
use strum::{Display, EnumString};

use crate::{
    AnimControl, Locator,
    clip::AUTHORED_FRAMES_PER_SECOND,
    instance::{InstanceId, SimpleInstance},
    layer::{AnimLayer, FadeRequestParams},
    request::{FadeToStateParams, RequestId, RequestStatus, RequestTypes},
    self_blend::{SelfBlend, SelfBlendParams},
    state::AUTO_TRANSITION,
    state_instance::StateInstance,
};

/// Phase at which [FinishCondition::AnimEndEarly] completes on simple layers.
const EARLY_END_PHASE: f32 = 0.8;

/// Remaining authored frames at which [FinishCondition::AnimEndEarly] completes on state layers.
const EARLY_END_FRAMES: f32 = 6.0;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ActionStatus {
    #[default]
    Invalid,
    /// Waiting for the layer phase to reach the trigger phase before requesting.
    DeferredPending,
    Pending,
    /// The request was taken but the finish condition is not met yet.
    Taken,
    Failed,
    Completed,
}

/// When a taken request counts as done.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum FinishCondition {
    TransitionTaken,
    #[default]
    NonTransitionalStateReached,
    AnimEnd,
    AnimEndEarly,
    /// Done when the remaining frames fit in the blend time.
    AnimEndEarlyByBlend,
    /// Done once the state first seen after the transition is left.
    LoopingAnimEnd,
    BlendedOut,
    BlendedIn,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DeferredRequest {
    trigger_phase: f32,
    ap_ref: Option<Locator>,
}

/// Tracks one request on a named layer of an [AnimControl].
///
/// Call [AnimAction::update] once per frame after stepping the control.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimAction {
    layer: SmolStr,
    name: SmolStr,
    request_id: RequestId,
    request_status: RequestStatus,
    last_request_status: RequestStatus,
    status: ActionStatus,
    finish_condition: FinishCondition,
    looping_state: Option<SmolStr>,
    deferred: Option<DeferredRequest>,
    start_phase: Option<f32>,
    blend_time: f32,
}

impl AnimAction {
    pub fn new(layer: impl Into<SmolStr>) -> Self {
        Self {
            layer: layer.into(),
            name: SmolStr::default(),
            request_id: RequestId::INVALID,
            request_status: RequestStatus::Invalid,
            last_request_status: RequestStatus::Invalid,
            status: ActionStatus::Invalid,
            finish_condition: FinishCondition::default(),
            looping_state: None,
            deferred: None,
            start_phase: None,
            blend_time: 0.0,
        }
    }

    pub fn layer(&self) -> &SmolStr {
        &self.layer
    }

    /// The transition, state or clip name of the last request.
    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    pub fn status(&self) -> ActionStatus {
        self.status
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn request_status(&self) -> RequestStatus {
        self.request_status
    }

    pub fn finish_condition(&self) -> FinishCondition {
        self.finish_condition
    }

    /// Forget the current request without changing the layer.
    pub fn reset(&mut self) {
        *self = Self::new(self.layer.clone());
    }

    pub fn is_valid(&self) -> bool {
        self.status != ActionStatus::Invalid
    }

    pub fn is_done(&self) -> bool {
        matches!(
            self.status,
            ActionStatus::Completed | ActionStatus::Failed | ActionStatus::Invalid
        )
    }

    /// Request `transition` from the current state.
    ///
    /// Returns `true` if the current state has the transition.
    pub fn request(
        &mut self,
        control: &mut AnimControl,
        transition: &str,
        finish_condition: FinishCondition,
        ap_ref: Option<Locator>,
        start_phase: Option<f32>,
    ) -> bool {
        let params = FadeToStateParams {
            ap_ref,
            start_phase,
            ..Default::default()
        };
        self.request_with_params(control, transition, finish_condition, params)
    }

    fn request_with_params(
        &mut self,
        control: &mut AnimControl,
        transition: &str,
        finish_condition: FinishCondition,
        params: FadeToStateParams,
    ) -> bool {
        self.reset();
        self.name = transition.into();
        self.finish_condition = finish_condition;
        self.start_phase = params.start_phase;

        let layer = match control.state_layer_mut(&self.layer) {
            Ok(layer) => layer,
            Err(e) => {
                warn!("Failed to request transition {transition:?}: {e}");
                return false;
            }
        };
        self.request_id = layer.request_transition(transition, &params);
        self.init_request_status(layer.transition_status(self.request_id));
        layer.is_transition_valid(transition)
    }

    /// Request `transition` once the current instance of the layer reaches `trigger_phase`.
    ///
    /// Trigger phases outside `(0.0, 1.0]` request immediately.
    pub fn request_deferred(
        &mut self,
        control: &mut AnimControl,
        transition: &str,
        trigger_phase: f32,
        finish_condition: FinishCondition,
        ap_ref: Option<Locator>,
        start_phase: Option<f32>,
    ) -> bool {
        if trigger_phase <= 0.0 || trigger_phase > 1.0 {
            return self.request(control, transition, finish_condition, ap_ref, start_phase);
        }

        self.reset();
        let Ok(layer) = control.state_layer(&self.layer) else {
            warn!("Failed to find state layer {:?}", self.layer);
            return false;
        };
        self.name = transition.into();
        self.finish_condition = finish_condition;
        self.start_phase = start_phase;
        self.deferred = Some(DeferredRequest {
            trigger_phase,
            ap_ref,
        });
        self.request_status = RequestStatus::Pending;
        self.last_request_status = RequestStatus::Pending;
        self.status = ActionStatus::DeferredPending;
        layer.is_transition_valid(transition)
    }

    /// Fade directly to `state` replacing all pending requests of the layer.
    pub fn fade_to_state(
        &mut self,
        control: &mut AnimControl,
        state: &str,
        params: &FadeToStateParams,
        finish_condition: FinishCondition,
    ) {
        self.reset();
        self.name = state.into();
        self.finish_condition = finish_condition;

        match control.state_layer_mut(&self.layer) {
            Ok(layer) => layer.remove_all_pending_transitions(RequestTypes::all()),
            Err(e) => {
                warn!("Failed to fade to state {state:?}: {e}");
                return;
            }
        }

        match control.fade_to_state(&self.layer, state, params) {
            Ok(id) => {
                self.request_id = id;
                let status = control
                    .state_layer(&self.layer)
                    .map(|l| l.transition_status(id))
                    .unwrap_or(RequestStatus::Invalid);
                self.init_request_status(status);
            }
            Err(e) => {
                warn!("Failed to fade to state {state:?}: {e}");
                self.init_request_status(RequestStatus::Failed);
            }
        }
    }

    /// Fade to `clip` on a simple layer. Simple layers resolve immediately.
    pub fn fade_to_anim(
        &mut self,
        control: &mut AnimControl,
        clip: &str,
        params: &FadeRequestParams,
        finish_condition: FinishCondition,
    ) -> bool {
        self.reset();
        self.name = clip.into();
        self.finish_condition = finish_condition;
        self.blend_time = params.fade_time;

        let success = match control.fade_to_anim(&self.layer, clip, params) {
            Ok(_) => true,
            Err(e) => {
                warn!("Failed to fade to clip {clip:?}: {e}");
                false
            }
        };
        let status = if success {
            RequestStatus::Taken
        } else {
            RequestStatus::Failed
        };
        self.request_status = status;
        self.last_request_status = status;
        self.status = if success {
            ActionStatus::Taken
        } else {
            ActionStatus::Failed
        };
        success
    }

    /// Track a request that was made directly on the layer.
    pub fn handle_manual_fade_to_state(
        &mut self,
        control: &AnimControl,
        state: &str,
        request_id: RequestId,
        finish_condition: FinishCondition,
    ) {
        self.reset();
        let Ok(layer) = control.state_layer(&self.layer) else {
            warn!("Failed to find state layer {:?}", self.layer);
            return;
        };
        self.name = state.into();
        self.finish_condition = finish_condition;
        self.request_id = request_id;
        self.init_request_status(layer.transition_status(request_id));
    }

    fn init_request_status(&mut self, status: RequestStatus) {
        if self.request_id.is_valid() {
            self.request_status = status;
            self.last_request_status = status;
            self.status = ActionStatus::Pending;
        } else {
            self.request_status = RequestStatus::Failed;
            self.last_request_status = RequestStatus::Failed;
            self.status = ActionStatus::Failed;
        }
    }

    /// Advance the action after [AnimControl::step].
    pub fn update(&mut self, control: &mut AnimControl) {
        self.last_request_status = self.request_status;

        if let Some(deferred) = self.deferred {
            let Some(layer) = control.layer(&self.layer) else {
                self.status = ActionStatus::Invalid;
                return;
            };
            if layer.current_phase() < deferred.trigger_phase {
                return;
            }

            debug!(
                "Deferred transition {:?} triggered at phase {}",
                self.name,
                layer.current_phase()
            );
            let name = self.name.clone();
            self.request(
                control,
                &name,
                self.finish_condition,
                deferred.ap_ref,
                self.start_phase,
            );
        }

        if !matches!(self.status, ActionStatus::Pending | ActionStatus::Taken) {
            return;
        }

        let Some(layer) = control.layer(&self.layer) else {
            self.status = ActionStatus::Invalid;
            return;
        };
        match layer {
            AnimLayer::Simple(_) => self.check_finish_condition(control),
            AnimLayer::State(layer) => match self.request_status {
                RequestStatus::Invalid => self.status = ActionStatus::Invalid,
                RequestStatus::Failed => self.status = ActionStatus::Failed,
                RequestStatus::Pending => {
                    self.request_status = layer.transition_status(self.request_id);
                    match self.request_status {
                        RequestStatus::Invalid | RequestStatus::Failed => {
                            self.status = ActionStatus::Failed
                        }
                        RequestStatus::Taken => {
                            self.status = ActionStatus::Taken;
                            self.check_finish_condition(control);
                        }
                        RequestStatus::Pending => (),
                    }
                }
                RequestStatus::Taken => self.check_finish_condition(control),
            },
        }
    }

    fn check_finish_condition(&mut self, control: &AnimControl) {
        let Some(layer) = control.layer(&self.layer) else {
            self.status = ActionStatus::Invalid;
            return;
        };

        let finished = match layer {
            AnimLayer::Simple(layer) => {
                let current = layer.current_instance();
                let end_phase = match (self.finish_condition, current) {
                    (FinishCondition::AnimEndEarly, _) => EARLY_END_PHASE,
                    (FinishCondition::AnimEndEarlyByBlend, Some(current))
                        if self.blend_time > 0.0 && current.clip().frame_count > 0 =>
                    {
                        1.0 - self.blend_time * current.clip().frames_per_second
                            / current.clip().frame_count as f32
                    }
                    _ => 1.0,
                };
                current.is_none_or(|i| i.phase() >= end_phase)
            }
            AnimLayer::State(layer) => {
                let dest = layer.transition_dest_instance(self.request_id);
                let current = layer.current_instance();
                let dest_is_current =
                    dest.is_some_and(|d| current.is_some_and(|c| c.id() == d.id()));

                match self.finish_condition {
                    FinishCondition::TransitionTaken => true,
                    FinishCondition::NonTransitionalStateReached => {
                        // States ending without an auto transition would never finish.
                        layer.is_in_non_transitional_state()
                            || (current.is_some_and(|c| c.phase() == 1.0)
                                && !layer.can_transition_be_taken_this_frame(AUTO_TRANSITION))
                    }
                    FinishCondition::AnimEnd => match dest {
                        Some(dest) => !dest_is_current || dest.phase() >= 1.0,
                        None => true,
                    },
                    FinishCondition::AnimEndEarly => match dest {
                        Some(dest) => {
                            !dest_is_current || dest.max_frame() - dest.frame() < EARLY_END_FRAMES
                        }
                        None => true,
                    },
                    FinishCondition::AnimEndEarlyByBlend => match dest {
                        Some(dest) => {
                            let frames = (self.blend_time * AUTHORED_FRAMES_PER_SECOND).max(0.0);
                            !dest_is_current || dest.max_frame() - dest.frame() <= frames
                        }
                        None => true,
                    },
                    FinishCondition::LoopingAnimEnd => match dest {
                        Some(dest) => {
                            if self.looping_state.is_none() {
                                self.looping_state = Some(dest.state_name().clone());
                            }
                            !dest_is_current
                        }
                        None => match (&self.looping_state, current) {
                            (Some(looping), Some(current)) => current.state_name() != looping,
                            _ => true,
                        },
                    },
                    FinishCondition::BlendedOut => match dest {
                        Some(dest) if !dest_is_current => {
                            current.is_some_and(|c| c.anim_fade() >= 1.0)
                        }
                        Some(dest) => dest.phase() >= 1.0,
                        None => true,
                    },
                    FinishCondition::BlendedIn => {
                        dest.is_none_or(|dest| dest.master_fade() >= 1.0)
                    }
                }
            }
        };

        if finished {
            debug!("Action {:?} on layer {:?} completed", self.name, self.layer);
            self.status = ActionStatus::Completed;
        }
    }

    /// `true` only for the first update that sees the request taken.
    pub fn was_transition_taken_this_frame(&self) -> bool {
        self.request_status == RequestStatus::Taken
            && self.last_request_status != RequestStatus::Taken
    }

    pub fn can_transition_be_taken_this_frame(&self, control: &AnimControl, name: &str) -> bool {
        control
            .state_layer(&self.layer)
            .is_ok_and(|l| l.can_transition_be_taken_this_frame(name))
    }

    /// The state instance created by the taken request.
    pub fn transition_dest_instance<'a>(
        &self,
        control: &'a AnimControl,
    ) -> Option<&'a StateInstance> {
        if !self.is_valid() || self.request_status != RequestStatus::Taken {
            return None;
        }
        control
            .state_layer(&self.layer)
            .ok()?
            .transition_dest_instance(self.request_id)
    }

    pub fn is_top_instance(&self, control: &AnimControl) -> bool {
        let Ok(layer) = control.state_layer(&self.layer) else {
            return false;
        };
        match (layer.current_instance(), self.transition_dest_instance(control)) {
            (Some(top), Some(dest)) => top.id() == dest.id(),
            _ => false,
        }
    }

    /// Query the instance playing for this action.
    ///
    /// Returns `0.0` while pending and `-1.0` if the request was not taken
    /// or the instance no longer exists.
    fn instance_value(
        &self,
        control: &AnimControl,
        state: impl Fn(&StateInstance) -> f32,
        simple: impl Fn(&SimpleInstance) -> f32,
    ) -> f32 {
        match self.request_status {
            RequestStatus::Pending => return 0.0,
            RequestStatus::Taken => (),
            _ => return -1.0,
        }
        let value = match control.layer(&self.layer) {
            Some(AnimLayer::State(_)) => self.transition_dest_instance(control).map(state),
            Some(AnimLayer::Simple(layer)) => layer.current_instance().map(simple),
            None => None,
        };
        value.unwrap_or(-1.0)
    }

    pub fn phase(&self, control: &AnimControl) -> f32 {
        self.instance_value(control, |i| i.phase(), |i| i.phase())
    }

    /// The authored frame number.
    pub fn frame(&self, control: &AnimControl) -> f32 {
        self.instance_value(control, |i| i.frame(), |i| i.frame())
    }

    pub fn duration(&self, control: &AnimControl) -> f32 {
        self.instance_value(control, |i| i.duration(), |i| i.duration())
    }

    pub fn max_frame(&self, control: &AnimControl) -> f32 {
        self.instance_value(
            control,
            |i| i.max_frame(),
            |i| i.clip().frame_count as f32,
        )
    }

    /// The clip playing for this action.
    pub fn clip_name(&self, control: &AnimControl) -> Option<SmolStr> {
        if self.request_status != RequestStatus::Taken {
            return None;
        }
        match control.layer(&self.layer)? {
            AnimLayer::State(_) => self
                .transition_dest_instance(control)
                .map(|i| i.clip().name.clone()),
            AnimLayer::Simple(layer) => layer.current_instance().map(|i| i.clip_name().clone()),
        }
    }

    /// The AP reference of the current instance once the request is taken.
    pub fn ap_ref(&self, control: &AnimControl) -> Option<Locator> {
        if self.request_status != RequestStatus::Taken {
            return None;
        }
        match control.layer(&self.layer)? {
            AnimLayer::State(layer) => layer.ap_ref_from_current_state(),
            AnimLayer::Simple(layer) => layer.ap_ref_from_current_instance(),
        }
    }

    pub fn set_ap_ref(&self, control: &mut AnimControl, ap_ref: Locator) -> bool {
        if self.request_status != RequestStatus::Taken {
            return false;
        }
        match control.layer_mut(&self.layer) {
            Some(AnimLayer::State(layer)) => layer.set_ap_ref_on_current_state(ap_ref),
            Some(AnimLayer::Simple(layer)) => match layer.current_instance_mut() {
                Some(instance) => {
                    instance.align_to_ap_origin(Some(ap_ref));
                    true
                }
                None => false,
            },
            None => false,
        }
    }
}

/// An [AnimAction] that also blends the object align to a destination AP reference.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimActionWithSelfBlend {
    action: AnimAction,
    self_blend: Option<SelfBlend>,
    prepared: bool,
    callback_installed: bool,
}

impl Deref for AnimActionWithSelfBlend {
    type Target = AnimAction;

    fn deref(&self) -> &Self::Target {
        &self.action
    }
}

impl AnimActionWithSelfBlend {
    pub fn new(layer: impl Into<SmolStr>) -> Self {
        Self {
            action: AnimAction::new(layer),
            self_blend: None,
            prepared: false,
            callback_installed: false,
        }
    }

    pub fn action(&self) -> &AnimAction {
        &self.action
    }

    pub fn self_blend(&self) -> Option<&SelfBlend> {
        self.self_blend.as_ref()
    }

    /// Forget the request and the self blend.
    pub fn reset(&mut self) {
        self.clear_self_blend_params();
        self.action.reset();
    }

    pub fn request(
        &mut self,
        control: &mut AnimControl,
        transition: &str,
        finish_condition: FinishCondition,
        ap_ref: Option<Locator>,
        start_phase: Option<f32>,
    ) -> bool {
        let mut params = FadeToStateParams {
            ap_ref,
            start_phase,
            ..Default::default()
        };
        self.prepare(&mut params);
        self.action
            .request_with_params(control, transition, finish_condition, params)
    }

    pub fn fade_to_state(
        &mut self,
        control: &mut AnimControl,
        state: &str,
        params: &FadeToStateParams,
        finish_condition: FinishCondition,
    ) {
        let mut params = params.clone();
        self.prepare(&mut params);
        self.action
            .fade_to_state(control, state, &params, finish_condition);
    }

    fn prepare(&mut self, params: &mut FadeToStateParams) {
        if let Some(blend) = &mut self.self_blend {
            blend.prepare(params);
            blend.bind(InstanceId::INVALID);
            self.prepared = true;
        }
    }

    /// Configure the blend to `final_ap_ref`.
    /// A negative phase in `params` removes an existing blend.
    pub fn set_self_blend_params(
        &mut self,
        params: Option<SelfBlendParams>,
        final_ap_ref: Locator,
        constraint_phase: Option<f32>,
    ) {
        let params = SelfBlendParams {
            dest_ap: final_ap_ref,
            constraint_phase,
            ..params.unwrap_or_default()
        };

        match &mut self.self_blend {
            Some(_) if params.phase < 0.0 => self.self_blend = None,
            Some(blend) => blend.update_params(params),
            None if params.phase >= 0.0 => {
                self.self_blend = Some(SelfBlend::new(params));
                self.prepared = false;
            }
            None => (),
        }
    }

    pub fn clear_self_blend_params(&mut self) {
        self.self_blend = None;
        self.prepared = false;
    }

    pub fn set_self_blend_ap_ref(&mut self, ap_ref: Locator) {
        if let Some(blend) = &mut self.self_blend {
            blend.update_dest_ap_ref(ap_ref);
        }
    }

    fn self_blend_completion(&self, control: &AnimControl) -> Option<f32> {
        let blend = self.self_blend.as_ref()?;
        let layer = control.state_layer(self.action.layer()).ok()?;
        let instance = layer.instance_by_id(blend.instance_id())?;
        blend.completion(instance)
    }

    /// `true` while the blend is bound but has not started moving the align.
    pub fn is_self_blend_pending(&self, control: &AnimControl) -> bool {
        self.self_blend_completion(control)
            .is_some_and(|c| (0.0..f32::EPSILON).contains(&c))
    }

    pub fn is_self_blend_complete(&self, control: &AnimControl) -> bool {
        self.self_blend_completion(control)
            .is_none_or(|c| !(0.0..1.0).contains(&c))
    }

    /// Advance the action and keep the layer align callback in sync with the blend.
    pub fn update(&mut self, control: &mut AnimControl) {
        self.action.update(control);

        let layer_name = self.action.layer().clone();
        let dest_id = self.action.transition_dest_instance(control).map(|i| i.id());
        let Ok(layer) = control.state_layer_mut(&layer_name) else {
            return;
        };

        let Some(blend) = &mut self.self_blend else {
            if self.callback_installed {
                layer.set_align_callback(None);
                self.callback_installed = false;
            }
            return;
        };

        if !blend.is_bound()
            && let Some(id) = dest_id
        {
            blend.bind(id);
            if let Some(instance) = layer.instance_by_id_mut(id)
                && !self.prepared
            {
                // The request was made before the blend so retarget the instance now.
                blend.update_source_ap_ref(instance.ap_ref(), instance.ap_channel().clone());
                instance.set_ap_ref(blend.params().dest_ap);
                instance.set_ap_channel(blend.params().ap_channel.clone());
                self.prepared = true;
            }
            debug!("Self blend bound to instance {}", id.0);
        }

        if blend.is_bound() {
            layer.set_align_callback(Some(blend.align_callback()));
            self.callback_installed = true;
        }
    }
}
