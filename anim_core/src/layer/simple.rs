use log::{debug, warn};
use smol_str::SmolStr;
use strum::{Display, EnumString};

use crate::{
    BlendCurve, ClipLookup, Locator, Pose, PoseCache,
    align::find_align_from_ap_reference,
    clip::{ALIGN_CHANNEL, AP_REFERENCE_CHANNEL},
    curve::clamp01,
    error::FadeToAnimError,
    instance::{InstanceId, SharedTimeIndex, SimpleInstance},
    layer::{LayerConfig, LayerFade},
};

/// How the start phase of a newly requested clip is chosen.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum StartPhaseMode {
    /// Use [FadeRequestParams::start_phase].
    #[default]
    Explicit,
    /// Continue from the phase of the current instance.
    Previous,
    /// Start at one minus the phase of the current instance for mirrored hand offs.
    OneMinusPrevious,
}

/// Fade the whole layer out once the top clip finishes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeOutOnCompleteParams {
    pub enabled: bool,
    pub fade_time: f32,
    pub curve: BlendCurve,
    /// The phase at which the top instance counts as complete.
    pub end_phase: f32,
    /// Start fading early so the fade finishes at `end_phase`.
    pub fade_early: bool,
}

impl Default for FadeOutOnCompleteParams {
    fn default() -> Self {
        Self {
            enabled: false,
            fade_time: 0.0,
            curve: BlendCurve::default(),
            end_phase: 1.0,
            fade_early: false,
        }
    }
}

/// Options for [SimpleLayer::request_fade_to_anim].
#[derive(Debug, Clone)]
pub struct FadeRequestParams {
    pub curve: BlendCurve,
    pub start_phase: f32,
    pub phase_mode: StartPhaseMode,
    pub fade_time: f32,
    pub playback_rate: f32,
    /// The layer fade target applied with the same fade time.
    pub layer_fade: f32,
    pub force_loop: bool,
    /// Freeze the phase of the instance being faded out.
    pub freeze_src: bool,
    /// Freeze the phase of the new instance.
    pub freeze_dst: bool,
    pub mirror: bool,
    pub no_align_location: bool,
    pub skip_first_frame_update: bool,
    pub first_update_phase: Option<f32>,
    /// Align the object to this action pack origin through the `ap_channel`.
    pub ap_origin: Option<Locator>,
    pub ap_channel: SmolStr,
    pub layer_fade_out: FadeOutOnCompleteParams,
    pub shared_time: Option<SharedTimeIndex>,
}

impl Default for FadeRequestParams {
    fn default() -> Self {
        Self {
            curve: BlendCurve::UniformS,
            start_phase: 0.0,
            phase_mode: StartPhaseMode::Explicit,
            fade_time: 0.0,
            playback_rate: 1.0,
            layer_fade: 1.0,
            force_loop: false,
            freeze_src: false,
            freeze_dst: false,
            mirror: false,
            no_align_location: false,
            skip_first_frame_update: false,
            first_update_phase: None,
            ap_origin: None,
            ap_channel: AP_REFERENCE_CHANNEL.into(),
            layer_fade_out: FadeOutOnCompleteParams::default(),
            shared_time: None,
        }
    }
}

/// A layer of directly requested clips.
///
/// Instances are ordered newest first.
/// The instance at index `0` is the current instance.
#[derive(Debug)]
pub struct SimpleLayer {
    config: LayerConfig,
    instances: Vec<SimpleInstance>,
    last_id: InstanceId,
    fade: LayerFade,
    fade_out_params: FadeOutOnCompleteParams,
    frame: u64,
}

impl SimpleLayer {
    pub fn new(config: LayerConfig) -> Self {
        Self {
            instances: Vec::with_capacity(config.capacity.max(1)),
            config,
            last_id: InstanceId::INVALID,
            fade: LayerFade::default(),
            fade_out_params: FadeOutOnCompleteParams::default(),
            frame: 0,
        }
    }

    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    pub fn name(&self) -> &SmolStr {
        &self.config.name
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

    /// The number of instances still fading out under the current one.
    pub fn fades_in_progress(&self) -> usize {
        self.instances.len().saturating_sub(1)
    }

    pub fn instances(&self) -> &[SimpleInstance] {
        &self.instances
    }

    pub fn instance(&self, index: usize) -> Option<&SimpleInstance> {
        self.instances.get(index)
    }

    pub fn instance_mut(&mut self, index: usize) -> Option<&mut SimpleInstance> {
        self.instances.get_mut(index)
    }

    pub fn instance_by_id(&self, id: InstanceId) -> Option<&SimpleInstance> {
        self.instances.iter().find(|i| i.id() == id)
    }

    pub fn instance_by_id_mut(&mut self, id: InstanceId) -> Option<&mut SimpleInstance> {
        self.instances.iter_mut().find(|i| i.id() == id)
    }

    pub fn current_instance(&self) -> Option<&SimpleInstance> {
        self.instances.first()
    }

    pub fn current_instance_mut(&mut self) -> Option<&mut SimpleInstance> {
        self.instances.first_mut()
    }

    /// The action pack origin of the current instance.
    pub fn ap_ref_from_current_instance(&self) -> Option<Locator> {
        self.current_instance().map(|i| i.ap_origin())
    }

    pub fn fade_out_on_complete(&self) -> &FadeOutOnCompleteParams {
        &self.fade_out_params
    }

    pub fn set_fade_out_on_complete(&mut self, params: FadeOutOnCompleteParams) {
        self.fade_out_params = params;
    }

    pub fn delete_all_instances(&mut self) {
        self.instances.clear();
    }

    /// Start fading in the clip `name` on top of the existing instances.
    ///
    /// Missing clips fail without changing the layer.
    pub fn request_fade_to_anim(
        &mut self,
        clips: &dyn ClipLookup,
        name: &str,
        params: &FadeRequestParams,
    ) -> Result<InstanceId, FadeToAnimError> {
        let Some(clip) = clips.clip(name) else {
            warn!("Layer {:?} failed to find clip {name:?}", self.config.name);
            return Err(FadeToAnimError::MissingClip(name.into()));
        };
        if clip.frame_count == 0 {
            warn!("Layer {:?} requested empty clip {name:?}", self.config.name);
            return Err(FadeToAnimError::EmptyClip(name.into()));
        }

        let previous_phase = self.current_instance().map(|i| i.phase()).unwrap_or(0.0);
        let start_phase = match params.phase_mode {
            StartPhaseMode::Explicit => params.start_phase,
            StartPhaseMode::Previous => previous_phase,
            StartPhaseMode::OneMinusPrevious => 1.0 - previous_phase,
        };

        // Reuse the oldest slot since it is about to be faded out anyway.
        let capacity = self.config.capacity.max(1);
        if self.instances.len() >= capacity {
            self.instances.truncate(capacity - 1);
        }

        self.last_id = self.last_id.next();
        let mut instance = SimpleInstance::new(
            self.last_id,
            clip,
            clamp01(start_phase),
            params.playback_rate,
            params.fade_time,
            params.curve,
            params.shared_time.clone(),
            self.frame,
        );
        if params.force_loop {
            instance.set_looping(true);
        }
        instance.set_no_align_location(params.no_align_location);
        if params.freeze_dst {
            instance.set_frozen(true);
        }
        instance.align_to_ap_origin(params.ap_origin);
        instance.set_ap_channel(params.ap_channel.clone());
        instance.set_mirrored(params.mirror);
        // The request frame already shows the new clip so the first update can be skipped.
        instance.set_skip_phase_update_this_frame(params.skip_first_frame_update);
        if let Some(phase) = params.first_update_phase.filter(|p| *p >= 0.0) {
            instance.set_first_update_phase(Some(phase));
        }

        self.instances.insert(0, instance);
        if let Some(previous) = self.instances.get_mut(1) {
            previous.set_frozen(params.freeze_src);
        }

        self.fade_out_params = params.layer_fade_out;
        self.fade
            .fade(params.layer_fade, params.fade_time, params.curve);

        debug!(
            "Layer {:?} fading to {name:?} over {}s as instance {}",
            self.config.name, params.fade_time, self.last_id.0
        );
        Ok(self.last_id)
    }

    /// Advance instance phases, fades and the layer fade.
    #[tracing::instrument(skip_all)]
    pub fn begin_step(&mut self, delta_time: f32, frame: u64) {
        self.frame = frame;
        self.delete_non_contributing_instances();

        for instance in &mut self.instances {
            instance.phase_update(delta_time, frame);
        }

        if self.fade_out_params.enabled
            && let Some(current) = self.instances.first()
        {
            let mut end_phase = clamp01(self.fade_out_params.end_phase);
            if self.fade_out_params.fade_early {
                end_phase -= current.clip().phase_per_second() * self.fade_out_params.fade_time;
            }
            if !current.is_looping() && current.phase() >= end_phase {
                debug!("Layer {:?} completed and is fading out", self.config.name);
                self.fade.fade(
                    0.0,
                    self.fade_out_params.fade_time,
                    self.fade_out_params.curve,
                );
                self.fade_out_params.enabled = false;
            }
        }

        self.delete_non_contributing_instances();

        self.fade.update(delta_time);
        if self.fade.is_faded_out() {
            self.delete_all_instances();
        }
    }

    /// Instances under a fully faded in instance no longer contribute.
    fn delete_non_contributing_instances(&mut self) {
        if let Some(index) = self.instances.iter().position(|i| i.fade() == 1.0) {
            self.instances.truncate(index + 1);
        }
    }

    /// Blend the sampled poses of all instances from oldest to newest.
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
                Some(pose) => pose.blend(&sampled, instance.fade(), self.config.linear_rotation),
                None => sampled,
            })
        })
    }

    /// The locator channel `name` blended across instances by fade.
    pub fn evaluate_channel(&self, name: &str) -> Option<Locator> {
        self.instances.iter().rev().fold(None, |result, instance| {
            let value = instance
                .clip()
                .evaluate_channel(name, instance.phase(), instance.is_mirrored());
            match (result, value) {
                (Some(a), Some(b)) => Some(a.lerp(&b, instance.fade())),
                (a, b) => b.or(a),
            }
        })
    }

    pub fn evaluate_float(&self, name: &str) -> Option<f32> {
        self.instances.iter().rev().fold(None, |result, instance| {
            let value = instance.clip().evaluate_float(name, instance.phase());
            match (result, value) {
                (Some(a), Some(b)) => Some(a + (b - a) * instance.fade()),
                (a, b) => b.or(a),
            }
        })
    }

    /// The object space motion since the last step blended across instances by fade.
    pub fn anim_align_delta(&self, current_align: &Locator) -> Locator {
        let delta = self
            .instances
            .iter()
            .rev()
            .fold(Locator::IDENTITY, |accum, instance| {
                accum.lerp(
                    &instance_align_delta(instance, current_align),
                    instance.fade(),
                )
            });
        delta.normalized()
    }

    /// The absolute world space align blended across instances.
    ///
    /// Returns `None` if no instance moves the object.
    pub fn determine_align_ws(&self, current_align: &Locator) -> Option<Locator> {
        let mut result: Option<Locator> = None;
        for instance in self.instances.iter().rev() {
            if let Some(align) = instance_align_ws(instance, current_align) {
                result = Some(match result {
                    Some(r) => r.lerp(&align, instance.fade()),
                    None => align,
                });
            }
        }
        result
    }
}

fn instance_align_ws(instance: &SimpleInstance, current_align: &Locator) -> Option<Locator> {
    if instance.is_aligned_to_ap_origin() {
        find_align_from_ap_reference(
            instance.clip(),
            instance.phase(),
            &instance.ap_origin(),
            instance.ap_channel(),
            instance.is_mirrored(),
        )
    } else if instance.is_aligning_location() {
        let align = instance.clip().evaluate_channel(
            ALIGN_CHANNEL,
            instance.phase(),
            instance.is_mirrored(),
        )?;
        Some(current_align.transform(&align).normalized())
    } else {
        None
    }
}

fn instance_align_delta(instance: &SimpleInstance, current_align: &Locator) -> Locator {
    if instance.is_aligned_to_ap_origin() {
        return match instance_align_ws(instance, current_align) {
            Some(align) => current_align.untransform(&align),
            None => Locator::IDENTITY,
        };
    }
    if !instance.is_aligning_location() {
        return Locator::IDENTITY;
    }

    let old_phase = instance.prev_phase();
    let new_phase = instance.phase();
    if new_phase >= old_phase || !instance.is_looping() {
        align_delta_range(instance, old_phase, new_phase)
    } else {
        // Wrapped around the end of a looping clip.
        let a = align_delta_range(instance, old_phase, 1.0);
        let b = align_delta_range(instance, 0.0, new_phase);
        Locator::new(a.translation + b.translation, a.rotation * b.rotation)
    }
}

fn align_delta_range(instance: &SimpleInstance, start_phase: f32, end_phase: f32) -> Locator {
    let clip = instance.clip();
    let mirror = instance.is_mirrored();
    match (
        clip.evaluate_channel(ALIGN_CHANNEL, start_phase, mirror),
        clip.evaluate_channel(ALIGN_CHANNEL, end_phase, mirror),
    ) {
        (Some(start), Some(end)) => start.untransform(&end),
        _ => Locator::IDENTITY,
    }
}
