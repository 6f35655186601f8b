//! Playback instances for simple layers and the timing helpers shared with state instances.
use std::sync::{Arc, Mutex};

use log::error;
use smol_str::SmolStr;

use crate::{
    BlendCurve, ClipData, Locator,
    clip::AP_REFERENCE_CHANNEL,
    curve::clamp01,
};

/// Identifies an instance within its layer. Id `0` is never assigned.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(pub u32);

impl InstanceId {
    pub const INVALID: Self = Self(0);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    /// The next id after `self` skipping [InstanceId::INVALID] on wrap around.
    pub fn next(self) -> Self {
        match self.0.wrapping_add(1) {
            0 => Self(1),
            n => Self(n),
        }
    }
}

/// A phase shared by instances on different skeletons that must stay synchronized.
///
/// The first instance to update on a given frame publishes its phase.
/// Every later instance on the same frame adopts the published phase.
#[derive(Debug, Clone, Default)]
pub struct SharedTimeIndex {
    inner: Arc<Mutex<SharedTime>>,
}

#[derive(Debug, Default)]
struct SharedTime {
    frame: Option<u64>,
    phase: f32,
}

impl SharedTimeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `phase` if nothing was published for `frame` yet.
    /// Returns the phase all instances should use for `frame`.
    pub fn get_or_set(&self, frame: u64, phase: f32) -> f32 {
        let mut shared = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if shared.frame == Some(frame) {
            shared.phase
        } else {
            shared.frame = Some(frame);
            shared.phase = phase;
            phase
        }
    }

    /// Forget the published phase so the next update publishes again.
    pub fn invalidate(&self) {
        let mut shared = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        shared.frame = None;
    }

    pub fn phase(&self) -> Option<f32> {
        let shared = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        shared.frame.map(|_| shared.phase)
    }
}

/// A time based ramp from `0.0` to `1.0` shaped by a [BlendCurve].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeTimer {
    pub time_left: f32,
    pub total_time: f32,
    pub curve: BlendCurve,
    pub value: f32,
}

impl Default for FadeTimer {
    fn default() -> Self {
        Self::new(0.0, BlendCurve::default())
    }
}

impl FadeTimer {
    /// A zero or negative `fade_time` starts fully faded in.
    pub fn new(fade_time: f32, curve: BlendCurve) -> Self {
        let fade_time = fade_time.max(0.0);
        Self {
            time_left: fade_time,
            total_time: fade_time,
            curve,
            value: if fade_time > 0.0 { 0.0 } else { 1.0 },
        }
    }

    pub fn update(&mut self, delta_time: f32) {
        if self.time_left > 0.0 {
            self.time_left -= delta_time;
            let t = clamp01((self.total_time - self.time_left) / self.total_time);
            self.value = self.curve.evaluate(t);
        } else {
            self.value = 1.0;
        }
    }

    pub fn is_fading(&self) -> bool {
        self.time_left > 0.0
    }
}

/// A single clip playing in a [SimpleLayer](crate::SimpleLayer).
#[derive(Debug, Clone)]
pub struct SimpleInstance {
    id: InstanceId,
    clip: Arc<ClipData>,
    phase: f32,
    prev_phase: f32,
    remainder_time: f32,
    playback_rate: f32,
    fade: FadeTimer,
    looping: bool,
    mirror: bool,
    frozen: bool,
    skip_phase_update: bool,
    first_update_phase: Option<f32>,
    shared_time: Option<SharedTimeIndex>,
    ap_origin: Locator,
    align_to_ap: bool,
    ap_channel: SmolStr,
    no_align_location: bool,
}

impl SimpleInstance {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: InstanceId,
        clip: Arc<ClipData>,
        start_phase: f32,
        playback_rate: f32,
        fade_time: f32,
        curve: BlendCurve,
        shared_time: Option<SharedTimeIndex>,
        frame: u64,
    ) -> Self {
        let looping = clip.looping;
        let mut phase = if clip.frame_count <= 1 { 0.0 } else { start_phase };
        if let Some(shared) = &shared_time {
            phase = shared.get_or_set(frame, phase);
        }

        Self {
            id,
            clip,
            phase,
            prev_phase: phase,
            remainder_time: 0.0,
            playback_rate: finite_or(playback_rate, 1.0),
            fade: FadeTimer::new(fade_time, curve),
            looping,
            mirror: false,
            frozen: false,
            skip_phase_update: false,
            first_update_phase: None,
            shared_time,
            ap_origin: Locator::IDENTITY,
            align_to_ap: false,
            ap_channel: AP_REFERENCE_CHANNEL.into(),
            no_align_location: false,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn clip(&self) -> &Arc<ClipData> {
        &self.clip
    }

    pub fn clip_name(&self) -> &SmolStr {
        &self.clip.name
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn prev_phase(&self) -> f32 {
        self.prev_phase
    }

    /// Jump to `phase` and treat the jump as a discontinuity.
    pub fn set_phase(&mut self, phase: f32) {
        self.prev_phase = self.phase;
        self.set_phase_internal(phase);
    }

    /// The authored frame number for the current phase.
    pub fn frame(&self) -> f32 {
        self.clip.authored_frame(self.phase)
    }

    pub fn prev_frame(&self) -> f32 {
        self.clip.authored_frame(self.prev_phase)
    }

    /// Jump to the sample frame `frame` in the range `0` to `frame_count - 1`.
    pub fn set_frame(&mut self, frame: f32) {
        let max_sample = self.clip.frame_count.saturating_sub(1) as f32;
        if max_sample > 0.0 {
            self.set_phase(frame / max_sample);
        } else {
            self.set_phase(0.0);
        }
    }

    pub fn duration(&self) -> f32 {
        self.clip.duration()
    }

    pub fn remainder_time(&self) -> f32 {
        self.remainder_time
    }

    pub fn playback_rate(&self) -> f32 {
        self.playback_rate
    }

    pub fn set_playback_rate(&mut self, rate: f32) {
        self.playback_rate = finite_or(rate, self.playback_rate);
    }

    pub fn fade(&self) -> f32 {
        self.fade.value
    }

    pub fn is_fading(&self) -> bool {
        self.fade.is_fading()
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirror
    }

    pub fn set_mirrored(&mut self, mirror: bool) {
        self.mirror = mirror;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    pub fn set_skip_phase_update_this_frame(&mut self, skip: bool) {
        self.skip_phase_update = skip;
    }

    pub fn set_first_update_phase(&mut self, phase: Option<f32>) {
        self.first_update_phase = phase;
    }

    /// Align the object so that the action pack reference channel lines up with `ap_origin`.
    pub fn align_to_ap_origin(&mut self, ap_origin: Option<Locator>) {
        match ap_origin {
            Some(origin) if origin.is_finite() => {
                self.ap_origin = origin.normalized();
                self.align_to_ap = true;
            }
            Some(origin) => {
                error!("Ignoring non finite action pack origin {origin:?}");
                self.align_to_ap = false;
            }
            None => self.align_to_ap = false,
        }
    }

    pub fn is_aligned_to_ap_origin(&self) -> bool {
        self.align_to_ap
    }

    pub fn ap_origin(&self) -> Locator {
        self.ap_origin
    }

    pub fn ap_channel(&self) -> &SmolStr {
        &self.ap_channel
    }

    pub fn set_ap_channel(&mut self, channel: SmolStr) {
        self.ap_channel = channel;
    }

    pub fn set_no_align_location(&mut self, no_align_location: bool) {
        self.no_align_location = no_align_location;
    }

    /// `false` if the instance should not move the object through its align channel.
    pub fn is_aligning_location(&self) -> bool {
        !self.no_align_location
    }

    /// Advance the phase and the fade by `delta_time` seconds.
    pub(crate) fn phase_update(&mut self, delta_time: f32, frame: u64) {
        self.fade.update(delta_time);
        if self.skip_phase_update {
            self.skip_phase_update = false;
            return;
        }

        self.prev_phase = self.phase;
        self.remainder_time = 0.0;
        let update_rate = self.playback_rate * self.clip.phase_per_second();
        if !self.frozen {
            let mut phase = self.phase + update_rate * delta_time;
            if let Some(first) = self.first_update_phase.take() {
                phase = first;
            }
            if let Some(shared) = &self.shared_time {
                phase = shared.get_or_set(frame, phase);
            }
            self.set_phase_internal(phase);
        }

        let over = self.phase - 1.0;
        if over > 0.0 {
            if self.looping {
                self.set_phase_internal(over - over.floor());
            } else {
                if update_rate != 0.0 {
                    self.remainder_time = over / update_rate.abs();
                }
                self.set_phase_internal(1.0);
            }
        }
        if self.phase < 0.0 {
            let phase = if self.looping {
                self.phase - self.phase.floor()
            } else {
                0.0
            };
            self.set_phase_internal(phase);
        }
    }

    fn set_phase_internal(&mut self, phase: f32) {
        self.phase = if self.clip.frame_count <= 1 {
            0.0
        } else if phase.is_finite() {
            phase
        } else {
            error!("Ignoring non finite phase for clip {:?}", self.clip.name);
            debug_assert!(phase.is_finite());
            self.phase
        };
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        error!("Ignoring non finite playback rate {value}");
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    fn clip(looping: bool) -> Arc<ClipData> {
        Arc::new(ClipData {
            name: "idle".into(),
            frames_per_second: 30.0,
            frame_count: 31,
            looping,
            ..Default::default()
        })
    }

    fn instance(looping: bool, fade_time: f32) -> SimpleInstance {
        SimpleInstance::new(
            InstanceId(1),
            clip(looping),
            0.0,
            1.0,
            fade_time,
            BlendCurve::Linear,
            None,
            0,
        )
    }

    #[test]
    fn instance_id_skips_invalid() {
        assert_eq!(InstanceId(1), InstanceId::INVALID.next());
        assert_eq!(InstanceId(1), InstanceId(u32::MAX).next());
        assert!(!InstanceId::INVALID.is_valid());
    }

    #[test]
    fn shared_time_get_or_set() {
        let shared = SharedTimeIndex::new();
        assert_eq!(None, shared.phase());
        assert_eq!(0.25, shared.get_or_set(1, 0.25));
        assert_eq!(0.25, shared.get_or_set(1, 0.75));
        assert_eq!(0.75, shared.get_or_set(2, 0.75));
        shared.invalidate();
        assert_eq!(0.5, shared.get_or_set(2, 0.5));
    }

    #[test]
    fn fade_timer_monotonic() {
        let mut fade = FadeTimer::new(1.0, BlendCurve::UniformS);
        assert_eq!(0.0, fade.value);
        let mut previous = fade.value;
        for _ in 0..4 {
            fade.update(0.25);
            assert!(fade.value >= previous);
            previous = fade.value;
        }
        assert_eq!(1.0, fade.value);
        assert!(!fade.is_fading());
    }

    #[test]
    fn fade_timer_zero_time() {
        let fade = FadeTimer::new(-1.0, BlendCurve::Linear);
        assert_eq!(1.0, fade.value);
        assert!(!fade.is_fading());
    }

    #[test]
    fn phase_update_clamps() {
        let mut instance = instance(false, 0.0);
        instance.phase_update(0.75, 0);
        assert_eq!(0.75, instance.phase());
        instance.phase_update(0.5, 1);
        assert_eq!(1.0, instance.phase());
        assert_eq!(0.75, instance.prev_phase());
        assert!(instance.remainder_time() > 0.0);
    }

    #[test]
    fn phase_update_wraps_looping() {
        let mut instance = instance(true, 0.0);
        instance.phase_update(0.75, 0);
        instance.phase_update(0.5, 1);
        assert!((instance.phase() - 0.25).abs() < 0.0001);
    }

    #[test]
    fn phase_update_frozen_and_skipped() {
        let mut instance = instance(false, 0.5);
        instance.set_skip_phase_update_this_frame(true);
        instance.phase_update(0.25, 0);
        assert_eq!(0.0, instance.phase());
        // Skipping the phase still advances the crossfade.
        assert_eq!(0.5, instance.fade());

        instance.set_frozen(true);
        instance.phase_update(0.25, 1);
        assert_eq!(0.0, instance.phase());
        assert_eq!(1.0, instance.fade());
    }

    #[test]
    fn remainder_time_uses_playback_rate() {
        let mut instance = instance(false, 0.0);
        instance.set_playback_rate(2.0);
        instance.phase_update(0.375, 0);
        assert_eq!(0.75, instance.phase());
        assert_eq!(0.0, instance.remainder_time());

        // A quarter phase past the end is 0.125 seconds at twice the speed.
        instance.phase_update(0.25, 1);
        assert_eq!(1.0, instance.phase());
        assert_relative_eq!(0.125, instance.remainder_time());

        instance.phase_update(0.0, 2);
        assert_eq!(0.0, instance.remainder_time());
    }

    #[test]
    fn phase_update_wraps_large_negative_rate() {
        let mut instance = instance(true, 0.0);
        instance.set_playback_rate(-1.0);
        instance.phase_update(1.75, 0);
        assert_relative_eq!(0.25, instance.phase(), epsilon = 0.0001);
        assert!((0.0..=1.0).contains(&instance.phase()));
    }

    #[test]
    fn first_update_phase_overrides() {
        let mut instance = instance(false, 0.0);
        instance.set_first_update_phase(Some(0.5));
        instance.phase_update(0.125, 0);
        assert_eq!(0.5, instance.phase());
        instance.phase_update(0.125, 1);
        assert!(instance.phase() > 0.5);
    }

    #[test]
    fn single_frame_clip_phase() {
        let clip = Arc::new(ClipData {
            name: "pose".into(),
            frames_per_second: 30.0,
            frame_count: 1,
            ..Default::default()
        });
        let mut instance = SimpleInstance::new(
            InstanceId(1),
            clip,
            0.5,
            1.0,
            0.0,
            BlendCurve::Linear,
            None,
            0,
        );
        assert_eq!(0.0, instance.phase());
        instance.set_phase(0.75);
        assert_eq!(0.0, instance.phase());
    }
}
