use std::sync::Arc;

use log::{debug, warn};
use smol_str::SmolStr;

use crate::{
    BlendCurve, ClipLookup, Locator, Pose, PoseCache,
    align::{InstanceAlignCallback, InstanceAlignTable},
    error::FadeToStateError,
    instance::InstanceId,
    layer::{LayerConfig, LayerFade},
    request::{
        FadeToStateParams, MAX_REQUESTS_IN_FLIGHT, ProcessedRequest, ProcessedRequests,
        RequestId, RequestStatus, RequestType, RequestTypes, StateChangeRequest,
    },
    state::{AUTO_TRANSITION, AnimActor, AnimState, AnimTransition, StateFlags, TransitionFlags},
    state_instance::{StateInstance, StateInstanceInit},
};

/// A layer of state instances driven by transitions through an [AnimActor].
///
/// Requests are queued and taken at the start of the next step.
/// Instances are ordered newest first.
#[derive(Debug)]
pub struct StateLayer {
    config: LayerConfig,
    actor: Arc<AnimActor>,
    instances: Vec<StateInstance>,
    last_instance_id: InstanceId,
    pending: Vec<StateChangeRequest>,
    processed: ProcessedRequests,
    last_request_id: RequestId,
    fade: LayerFade,
    transitions_enabled: bool,
    transitions_taken_last_update: u32,
    states_completed_last_update: u32,
    align_callback: Option<InstanceAlignCallback>,
}

/// How the destination instance of a transition is created.
struct TransitionSetup<'a> {
    state: &'a AnimState,
    start_phase: f32,
    anim_fade_time: f32,
    motion_fade_time: f32,
    curve: BlendCurve,
    ap_ref: Locator,
    params: &'a FadeToStateParams,
}

impl StateLayer {
    pub fn new(config: LayerConfig, actor: Arc<AnimActor>) -> Self {
        Self {
            instances: Vec::with_capacity(config.capacity.max(1)),
            config,
            actor,
            last_instance_id: InstanceId::INVALID,
            pending: Vec::with_capacity(MAX_REQUESTS_IN_FLIGHT),
            processed: ProcessedRequests::default(),
            last_request_id: RequestId::INVALID,
            fade: LayerFade::default(),
            transitions_enabled: true,
            transitions_taken_last_update: 0,
            states_completed_last_update: 0,
            align_callback: None,
        }
    }

    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    pub fn name(&self) -> &SmolStr {
        &self.config.name
    }

    pub fn actor(&self) -> &Arc<AnimActor> {
        &self.actor
    }

    pub fn layer_fade(&self) -> &LayerFade {
        &self.fade
    }

    pub fn fade(&mut self, target: f32, fade_time: f32, curve: BlendCurve) {
        self.fade.fade(target, fade_time, curve);
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn fades_in_progress(&self) -> usize {
        self.instances.len().saturating_sub(1)
    }

    pub fn instances(&self) -> &[StateInstance] {
        &self.instances
    }

    pub fn instance(&self, index: usize) -> Option<&StateInstance> {
        self.instances.get(index)
    }

    pub fn instance_by_id(&self, id: InstanceId) -> Option<&StateInstance> {
        self.instances.iter().find(|i| i.id() == id)
    }

    pub fn instance_by_id_mut(&mut self, id: InstanceId) -> Option<&mut StateInstance> {
        self.instances.iter_mut().find(|i| i.id() == id)
    }

    pub fn current_instance(&self) -> Option<&StateInstance> {
        self.instances.first()
    }

    pub fn current_instance_mut(&mut self) -> Option<&mut StateInstance> {
        self.instances.first_mut()
    }

    pub fn current_state(&self) -> Option<&AnimState> {
        self.current_instance().map(|i| i.state())
    }

    pub fn current_state_id(&self) -> Option<&SmolStr> {
        self.current_instance().map(|i| i.state_name())
    }

    pub fn is_in_non_transitional_state(&self) -> bool {
        self.current_state().is_some_and(|s| !s.is_transitional())
    }

    pub fn are_transitions_enabled(&self) -> bool {
        self.transitions_enabled
    }

    pub fn enable_transitions(&mut self) {
        self.transitions_enabled = true;
    }

    pub fn disable_transitions(&mut self) {
        self.transitions_enabled = false;
    }

    pub fn transitions_taken_last_update(&self) -> u32 {
        self.transitions_taken_last_update
    }

    /// The number of instances that reached the end of their clip last update.
    pub fn states_completed_last_update(&self) -> u32 {
        self.states_completed_last_update
    }

    pub fn are_transitions_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_requests(&self) -> &[StateChangeRequest] {
        &self.pending
    }

    pub fn processed_request(&self, id: RequestId) -> Option<&ProcessedRequest> {
        self.processed.get(id)
    }

    pub fn align_callback(&self) -> Option<&InstanceAlignCallback> {
        self.align_callback.as_ref()
    }

    /// Override the align computed for every instance of this layer.
    pub fn set_align_callback(&mut self, callback: Option<InstanceAlignCallback>) {
        self.align_callback = callback;
    }

    /// Snapshot the resolved align of [StateFlags::SAVE_TOP_ALIGN] instances
    /// the first time they are replaced as the newest instance.
    pub fn save_top_aligns(&mut self, aligns: &InstanceAlignTable) {
        for instance in self.instances.iter_mut().skip(1) {
            if instance.state_flags().contains(StateFlags::SAVE_TOP_ALIGN)
                && instance.saved_align().is_none()
                && let Some(align) = aligns.get(instance.id())
            {
                instance.set_saved_align(Some(align));
            }
        }
    }

    /// Queue taking the transition `name` from the current state.
    ///
    /// Returns [RequestId::INVALID] if the queue is full.
    pub fn request_transition(&mut self, name: &str, params: &FadeToStateParams) -> RequestId {
        self.queue_transition(name, params, false)
    }

    /// Like [StateLayer::request_transition] but not removed by
    /// [StateLayer::remove_all_pending_transitions].
    pub fn request_persistent_transition(
        &mut self,
        name: &str,
        params: &FadeToStateParams,
    ) -> RequestId {
        self.queue_transition(name, params, true)
    }

    fn queue_transition(
        &mut self,
        name: &str,
        params: &FadeToStateParams,
        dont_remove: bool,
    ) -> RequestId {
        if self.pending.len() >= MAX_REQUESTS_IN_FLIGHT {
            warn!(
                "Layer {:?} has too many transition requests. Dropping {name:?}",
                self.config.name
            );
            return RequestId::INVALID;
        }

        let id = self.next_request_id();
        self.pending.push(StateChangeRequest {
            id,
            kind: RequestType::Transition,
            name: name.into(),
            status: RequestStatus::Pending,
            dont_remove,
            params: params.clone(),
            use_parent_ap_ref: params.ap_ref.is_none(),
        });
        debug!(
            "Layer {:?} accepted transition request {name:?} as {}",
            self.config.name, id.0
        );
        id
    }

    /// Queue a transition from the current state that leads to `dest`.
    pub fn request_transition_by_final_state(
        &mut self,
        dest: &str,
        params: &FadeToStateParams,
    ) -> RequestId {
        let Some(current) = self.current_instance() else {
            return RequestId::INVALID;
        };
        if current.state_name() == dest {
            return RequestId::INVALID;
        }

        let name = self
            .actor
            .find_transition_to_final_state(current.state_name(), dest, current.phase())
            .map(|t| t.name.clone());
        match name {
            Some(name) => self.request_transition(&name, params),
            None => {
                debug!(
                    "Layer {:?} found no transition from {:?} to {dest:?}",
                    self.config.name,
                    current.state_name()
                );
                RequestId::INVALID
            }
        }
    }

    /// Queue fading directly to the state `name` without a transition.
    ///
    /// Pending transitions are replaced unless
    /// [FadeToStateParams::dont_clear_transitions] is set.
    pub fn fade_to_state(
        &mut self,
        clips: &dyn ClipLookup,
        name: &str,
        params: &FadeToStateParams,
    ) -> Result<RequestId, FadeToStateError> {
        let state = self
            .actor
            .state(name)
            .ok_or_else(|| FadeToStateError::MissingState(name.into()))?;
        if clips.clip(&state.clip).is_none() {
            return Err(FadeToStateError::MissingClip {
                state: name.into(),
                clip: state.clip.clone(),
            });
        }

        if !params.dont_clear_transitions {
            self.remove_pending(RequestTypes::TRANSITION, false);
        }
        if self.pending.len() >= MAX_REQUESTS_IN_FLIGHT {
            self.remove_request_by_index(0, RequestStatus::Failed, InstanceId::INVALID);
        }

        let id = self.next_request_id();
        let request = StateChangeRequest {
            id,
            kind: RequestType::DirectFade,
            name: name.into(),
            status: RequestStatus::Pending,
            dont_remove: false,
            params: params.clone(),
            use_parent_ap_ref: params.ap_ref.is_none(),
        };
        if params.dont_clear_transitions {
            self.pending.insert(0, request);
        } else {
            self.pending.push(request);
        }
        debug!(
            "Layer {:?} accepted direct fade to {name:?} as {}",
            self.config.name, id.0
        );
        Ok(id)
    }

    /// Remove pending requests of the given types except persistent ones.
    pub fn remove_all_pending_transitions(&mut self, types: RequestTypes) {
        self.remove_pending(types, true);
    }

    fn remove_pending(&mut self, types: RequestTypes, keep_persistent: bool) {
        let mut index = 0;
        while index < self.pending.len() {
            let request = &self.pending[index];
            if request.kind.matches(types) && !(keep_persistent && request.dont_remove) {
                self.remove_request_by_index(index, RequestStatus::Failed, InstanceId::INVALID);
            } else {
                index += 1;
            }
        }
    }

    fn remove_request_by_index(
        &mut self,
        index: usize,
        status: RequestStatus,
        instance_id: InstanceId,
    ) {
        if index >= self.pending.len() {
            return;
        }
        let request = self.pending.remove(index);
        let src_state = self.current_state_id().cloned();
        let dst_state = self
            .instance_by_id(instance_id)
            .map(|i| i.state_name().clone());
        self.processed.push(ProcessedRequest {
            id: request.id,
            kind: request.kind,
            name: request.name,
            status,
            instance_id,
            src_state,
            dst_state,
        });
    }

    fn next_request_id(&mut self) -> RequestId {
        self.last_request_id = self.last_request_id.next();
        self.last_request_id
    }

    /// The status of a pending or recently processed request.
    pub fn transition_status(&self, id: RequestId) -> RequestStatus {
        if !id.is_valid() {
            return RequestStatus::Invalid;
        }
        if let Some(request) = self.pending.iter().find(|r| r.id == id) {
            return request.status;
        }
        self.processed
            .get(id)
            .map(|r| r.status)
            .unwrap_or(RequestStatus::Invalid)
    }

    /// The instance created by a taken request if it still exists.
    pub fn transition_dest_instance(&self, id: RequestId) -> Option<&StateInstance> {
        let processed = self.processed.get(id)?;
        self.instance_by_id(processed.instance_id)
    }

    /// Change the action pack reference of a request that is still pending.
    pub fn update_transition_ap_ref(&mut self, id: RequestId, ap_ref: Locator) {
        if let Some(request) = self.pending.iter_mut().find(|r| r.id == id) {
            request.params.ap_ref = Some(ap_ref);
            request.use_parent_ap_ref = false;
        }
    }

    /// `true` if the current state has a transition named `name`.
    pub fn is_transition_valid(&self, name: &str) -> bool {
        let Some(current) = self.current_instance() else {
            return false;
        };
        if current.auto_transitions_disabled() && name == AUTO_TRANSITION {
            return false;
        }
        current.state().transition(name).is_some()
    }

    /// `true` if the transition `name` is valid and active at the current phase.
    pub fn can_transition_be_taken_this_frame(&self, name: &str) -> bool {
        self.is_transition_valid(name)
            && self.current_instance().is_some_and(|current| {
                current
                    .state()
                    .active_transition(name, current.phase())
                    .is_some()
            })
    }

    pub fn ap_ref_from_current_state(&self) -> Option<Locator> {
        self.current_instance().map(|i| i.ap_ref())
    }

    pub fn set_ap_ref_on_current_state(&mut self, ap_ref: Locator) -> bool {
        match self.current_instance_mut() {
            Some(instance) => {
                instance.set_ap_ref(ap_ref);
                true
            }
            None => false,
        }
    }

    pub fn update_all_ap_references(&mut self, ap_ref: Locator) {
        for instance in &mut self.instances {
            instance.set_ap_ref(ap_ref);
        }
    }

    /// Take pending transitions and advance fades and phases.
    #[tracing::instrument(skip_all)]
    pub fn begin_step(&mut self, delta_time: f32, _frame: u64, clips: &dyn ClipLookup) {
        self.transitions_taken_last_update = 0;
        self.states_completed_last_update = 0;

        self.delete_non_contributing_instances();

        for instance in &mut self.instances {
            instance.reset_channel_deltas();
        }

        if self.transitions_enabled {
            let took_normal = self.take_transitions(clips);
            self.take_auto_transitions(took_normal, clips);
        }

        for instance in &mut self.instances {
            instance.fade_update(delta_time);
        }

        for instance in &mut self.instances {
            let was_complete = instance.phase() >= 1.0;
            instance.phase_update(delta_time);
            if !was_complete && instance.phase() >= 1.0 {
                self.states_completed_last_update += 1;
            }
        }

        self.delete_non_contributing_instances();

        self.fade.update(delta_time);
        if self.fade.is_faded_out() {
            self.instances.clear();
        }

        if self.transitions_taken_last_update > 0 {
            debug!(
                "Layer {:?} took {} transitions",
                self.config.name, self.transitions_taken_last_update
            );
        }
    }

    fn delete_non_contributing_instances(&mut self) {
        if let Some(index) = self
            .instances
            .iter()
            .position(|i| i.anim_fade() == 1.0 && i.motion_fade() == 1.0)
        {
            self.instances.truncate(index + 1);
        }
    }

    /// Process queued requests in order until one can not be taken yet.
    fn take_transitions(&mut self, clips: &dyn ClipLookup) -> bool {
        let mut took_transition = false;

        while let Some(request) = self.pending.first().cloned() {
            match request.kind {
                RequestType::DirectFade => {
                    let actor = self.actor.clone();
                    let Some(state) = actor.state(&request.name) else {
                        warn!(
                            "Layer {:?} could not find state {:?}",
                            self.config.name, request.name
                        );
                        self.remove_request_by_index(0, RequestStatus::Invalid, InstanceId::INVALID);
                        continue;
                    };

                    let ap_ref = self.request_ap_ref(&request, state);
                    let anim_fade_time = request.params.anim_fade_or(0.0);
                    let setup = TransitionSetup {
                        state,
                        start_phase: request.params.start_phase.unwrap_or(0.0),
                        anim_fade_time,
                        motion_fade_time: request.params.motion_fade_or(anim_fade_time),
                        curve: request.params.curve.unwrap_or_default(),
                        ap_ref,
                        params: &request.params,
                    };
                    match self.set_state(&setup, clips) {
                        Ok(id) => {
                            self.remove_request_by_index(0, RequestStatus::Taken, id);
                            self.transitions_taken_last_update += 1;
                            took_transition = true;
                        }
                        Err(e) => {
                            warn!("Layer {:?} failed direct fade: {e}", self.config.name);
                            self.remove_request_by_index(0, RequestStatus::Failed, InstanceId::INVALID);
                        }
                    }
                }
                RequestType::Transition => {
                    let Some(current) = self.current_instance() else {
                        self.remove_request_by_index(0, RequestStatus::Invalid, InstanceId::INVALID);
                        continue;
                    };
                    let Some(transition) = current.state().transition(&request.name).cloned()
                    else {
                        debug!(
                            "Layer {:?} state {:?} has no transition {:?}",
                            self.config.name,
                            current.state_name(),
                            request.name
                        );
                        self.remove_request_by_index(0, RequestStatus::Invalid, InstanceId::INVALID);
                        continue;
                    };
                    if !transition.is_active(current.phase())
                        || (transition.name == AUTO_TRANSITION
                            && current.auto_transitions_disabled())
                    {
                        // Wait until the transition becomes active.
                        break;
                    }

                    let parent_ap_ref = request.use_parent_ap_ref.then(|| current.ap_ref());
                    match self.apply_transition(0, &transition, &request.params, parent_ap_ref, clips)
                    {
                        Ok(id) => {
                            let id = id.unwrap_or(InstanceId::INVALID);
                            self.remove_request_by_index(0, RequestStatus::Taken, id);
                            self.transitions_taken_last_update += 1;
                            took_transition = true;
                        }
                        Err(e) => {
                            warn!(
                                "Layer {:?} failed transition {:?}: {e}",
                                self.config.name, request.name
                            );
                            self.remove_request_by_index(0, RequestStatus::Failed, InstanceId::INVALID);
                        }
                    }
                }
            }
        }

        took_transition
    }

    fn take_auto_transitions(&mut self, took_normal: bool, clips: &dyn ClipLookup) {
        let ids: Vec<_> = self.instances.iter().map(|i| i.id()).collect();
        for (index, id) in ids.into_iter().enumerate() {
            if index == 0 && took_normal {
                continue;
            }
            if !self.transitions_enabled {
                break;
            }
            let Some(position) = self.instances.iter().position(|i| i.id() == id) else {
                continue;
            };

            let instance = &self.instances[position];
            if instance.auto_transitions_disabled() {
                continue;
            }
            let Some(transition) = instance
                .state()
                .active_transition(AUTO_TRANSITION, instance.phase())
                .cloned()
            else {
                continue;
            };
            if transition
                .flags
                .contains(TransitionFlags::INACTIVE_WHILE_BLENDING)
                && self.instances.len() > 1
            {
                continue;
            }

            let ap_ref = Some(instance.ap_ref());
            let params = FadeToStateParams::default();
            match self.apply_transition(position, &transition, &params, ap_ref, clips) {
                Ok(new_id) => {
                    if let Some(new_id) = new_id {
                        debug!(
                            "Layer {:?} took auto transition to {:?} as instance {}",
                            self.config.name, transition.dest_state, new_id.0
                        );
                    }
                    self.transitions_taken_last_update += 1;
                }
                Err(e) => warn!("Layer {:?} failed auto transition: {e}", self.config.name),
            }
        }
    }

    fn apply_transition(
        &mut self,
        index: usize,
        transition: &AnimTransition,
        params: &FadeToStateParams,
        parent_ap_ref: Option<Locator>,
        clips: &dyn ClipLookup,
    ) -> Result<Option<InstanceId>, FadeToStateError> {
        if transition.flags.contains(TransitionFlags::FADE_OUT_LAYER) {
            self.fade(0.0, transition.fade_time, transition.curve);
            self.disable_transitions();
            return Ok(None);
        }
        if transition.flags.contains(TransitionFlags::NO_RESET) {
            return Ok(None);
        }

        let actor = self.actor.clone();
        let dest = actor
            .state(&transition.dest_state)
            .ok_or_else(|| FadeToStateError::MissingState(transition.dest_state.clone()))?;
        let Some(instance) = self.instances.get(index) else {
            return Ok(None);
        };

        let phase_sync = transition.flags.contains(TransitionFlags::PHASE_SYNC) || params.phase_sync;
        let mut start_phase = params
            .start_phase
            .filter(|p| (0.0..=1.0).contains(p))
            .unwrap_or(transition.start_phase);
        if phase_sync {
            start_phase += instance.phase();
            // Phase synced states may start at exactly 1.0.
            if start_phase > 1.0 {
                start_phase -= 1.0;
            }
        } else if start_phase >= 1.0 {
            start_phase -= 1.0;
        }

        let ap_ref = match parent_ap_ref {
            Some(parent) if dest.is_ap_move_update() => parent,
            _ => params.ap_ref.unwrap_or_else(|| instance.ap_ref()),
        };

        let anim_fade_time = params.anim_fade_or(transition.fade_time);
        let motion_fade_time = params
            .motion_fade_time
            .filter(|t| *t >= 0.0)
            .or(transition.motion_fade_time)
            .unwrap_or(anim_fade_time)
            .max(0.0);
        let setup = TransitionSetup {
            state: dest,
            start_phase,
            anim_fade_time,
            motion_fade_time,
            curve: params.curve.unwrap_or(transition.curve),
            ap_ref,
            params,
        };

        if index != 0 {
            // Older instances can only restart themselves.
            let instance = &mut self.instances[index];
            return Ok(can_loop_instance(instance, &setup).then(|| {
                instance.restart(setup.start_phase, setup.ap_ref);
                instance.id()
            }));
        }

        self.set_state(&setup, clips).map(Some)
    }

    fn set_state(
        &mut self,
        setup: &TransitionSetup,
        clips: &dyn ClipLookup,
    ) -> Result<InstanceId, FadeToStateError> {
        if setup
            .state
            .flags
            .contains(StateFlags::DISABLE_PREV_AUTO_TRANSITIONS)
        {
            for instance in &mut self.instances {
                instance.disable_auto_transitions();
            }
        }

        if let Some(current) = self.instances.first_mut()
            && can_loop_instance(current, setup)
        {
            debug!(
                "Layer {:?} looping state {:?}",
                self.config.name, setup.state.name
            );
            current.restart(setup.start_phase, setup.ap_ref);
            return Ok(current.id());
        }

        let clip = clips
            .clip(&setup.state.clip)
            .ok_or_else(|| FadeToStateError::MissingClip {
                state: setup.state.name.clone(),
                clip: setup.state.clip.clone(),
            })?;

        // Reuse the oldest slot since it is about to be faded out anyway.
        let capacity = self.config.capacity.max(1);
        if self.instances.len() >= capacity {
            self.instances.truncate(capacity - 1);
        }

        self.last_instance_id = self.last_instance_id.next();
        let mut instance = StateInstance::new(StateInstanceInit {
            id: self.last_instance_id,
            state: setup.state.clone(),
            clip,
            start_phase: setup.start_phase,
            anim_fade_time: setup.anim_fade_time.max(0.0),
            motion_fade_time: setup.motion_fade_time.max(0.0),
            curve: setup.curve,
            ap_ref: setup.ap_ref,
            mirror: setup.params.mirror,
            freeze_during_fade_in: setup.params.freeze_during_fade_in,
        });
        if let Some(channel) = &setup.params.ap_channel {
            instance.set_ap_channel(channel.clone());
        }
        if let Some(previous) = self.instances.first() {
            instance.copy_channel_locs_from(previous);
        }
        self.instances.insert(0, instance);

        Ok(self.last_instance_id)
    }

    /// Blend the sampled poses of all instances from oldest to newest by animation fade.
    #[tracing::instrument(skip_all)]
    pub fn evaluate_pose(&self, cache: &PoseCache) -> Option<Pose> {
        let output_controls = &cache.skeleton().output_controls;
        self.instances.iter().rev().fold(None, |pose, instance| {
            let sampled = Pose::sample(
                instance.clip(),
                instance.phase(),
                cache.joint_count(),
                output_controls,
            );
            Some(match pose {
                Some(pose) => pose.blend(
                    &sampled,
                    instance.anim_fade(),
                    self.config.linear_rotation,
                ),
                None => sampled,
            })
        })
    }

    /// The locator channel `name` blended across instances by motion fade.
    pub fn evaluate_channel(&self, name: &str) -> Option<Locator> {
        self.instances.iter().rev().fold(None, |result, instance| {
            match (result, instance.evaluate_channel(name)) {
                (Some(a), Some(b)) => Some(a.lerp(&b, instance.motion_fade())),
                (a, b) => b.or(a),
            }
        })
    }

    pub fn evaluate_float(&self, name: &str) -> Option<f32> {
        self.instances.iter().rev().fold(None, |result, instance| {
            match (result, instance.evaluate_float(name)) {
                (Some(a), Some(b)) => Some(a + (b - a) * instance.anim_fade()),
                (a, b) => b.or(a),
            }
        })
    }

    fn request_ap_ref(
        &self,
        request: &StateChangeRequest,
        dest: &AnimState,
    ) -> Locator {
        let current = self.current_instance().map(|i| i.ap_ref());
        if request.use_parent_ap_ref
            && dest.is_ap_move_update()
            && let Some(current) = current
        {
            return current;
        }
        request
            .params
            .ap_ref
            .or(current)
            .unwrap_or(Locator::IDENTITY)
    }
}

/// A finished instance of the same state restarts instead of fading to a new instance.
fn can_loop_instance(instance: &StateInstance, setup: &TransitionSetup) -> bool {
    if !setup.params.allow_state_looping {
        return false;
    }
    if instance.state_name() != &setup.state.name
        || setup.state.flags.contains(StateFlags::NEVER_LOOP)
    {
        return false;
    }

    // Reversed playback ends at phase 0.
    let has_ended = instance.phase() == 1.0
        || (instance.phase() == 0.0
            && instance.phase() < instance.prev_phase()
            && setup.start_phase > 0.99);
    has_ended && setup.anim_fade_time == 0.0 && setup.motion_fade_time == 0.0
}
