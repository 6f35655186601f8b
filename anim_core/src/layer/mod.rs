//! Layers own the instances blended into the final pose.
//!
//! The variant set is fixed, so layers are a closed enum of
//! [SimpleLayer] for directly requested clips and [StateLayer] for
//! instances driven by a state graph.
use std::sync::Arc;

use smol_str::SmolStr;
use strum::{Display, EnumString};

use crate::{BlendCurve, ClipLookup, Locator, Pose, PoseCache, pose::BlendMode, state::AnimActor};

mod simple;
mod state;

pub use simple::{FadeOutOnCompleteParams, FadeRequestParams, SimpleLayer, StartPhaseMode};
pub use state::StateLayer;

/// The default number of instances a layer keeps before reusing the oldest.
pub const DEFAULT_LAYER_CAPACITY: usize = 4;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum LayerKind {
    #[default]
    Simple,
    State,
}

/// Static settings for a layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerConfig {
    pub name: SmolStr,
    pub kind: LayerKind,
    /// The maximum number of instances including the ones fading out.
    pub capacity: usize,
    pub blend_mode: BlendMode,
    /// Layers are applied from lowest to highest priority.
    pub priority: i32,
    /// The highest priority non empty layer with this set moves the object.
    pub drives_align: bool,
    /// Blend instance rotations component wise instead of spherically.
    pub linear_rotation: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            name: SmolStr::default(),
            kind: LayerKind::default(),
            capacity: DEFAULT_LAYER_CAPACITY,
            blend_mode: BlendMode::default(),
            priority: 0,
            drives_align: false,
            linear_rotation: false,
        }
    }
}

impl LayerConfig {
    pub fn new(name: impl Into<SmolStr>, kind: LayerKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Default::default()
        }
    }
}

/// The weight of a whole layer moving towards a desired value over time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerFade {
    current: f32,
    desired: f32,
    start: f32,
    time_left: f32,
    total_time: f32,
    curve: BlendCurve,
}

impl Default for LayerFade {
    fn default() -> Self {
        Self {
            current: 1.0,
            desired: 1.0,
            start: 1.0,
            time_left: 0.0,
            total_time: 0.0,
            curve: BlendCurve::Linear,
        }
    }
}

impl LayerFade {
    /// Start fading towards `target`. A zero or negative `fade_time` applies immediately.
    pub fn fade(&mut self, target: f32, fade_time: f32, curve: BlendCurve) {
        let target = crate::curve::clamp01(target);
        self.desired = target;
        self.curve = curve;
        if fade_time > 0.0 && fade_time.is_finite() {
            self.start = self.current;
            self.time_left = fade_time;
            self.total_time = fade_time;
        } else {
            self.start = target;
            self.current = target;
            self.time_left = 0.0;
            self.total_time = 0.0;
        }
    }

    pub fn update(&mut self, delta_time: f32) {
        if self.time_left > 0.0 {
            self.time_left -= delta_time;
            let t = crate::curve::clamp01((self.total_time - self.time_left) / self.total_time);
            self.current = self.start + (self.desired - self.start) * self.curve.evaluate(t);
        } else {
            self.current = self.desired;
        }
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn desired(&self) -> f32 {
        self.desired
    }

    pub fn is_fading(&self) -> bool {
        self.time_left > 0.0
    }

    /// `true` once the layer has completely faded out and wants to stay that way.
    pub fn is_faded_out(&self) -> bool {
        self.current == 0.0 && self.desired == 0.0
    }
}

/// A layer in an [AnimControl](crate::AnimControl).
#[derive(Debug)]
pub enum AnimLayer {
    Simple(SimpleLayer),
    State(StateLayer),
}

impl AnimLayer {
    /// Create an empty layer of the kind in `config`.
    /// Only state layers use the `actor`.
    pub fn new(config: LayerConfig, actor: Arc<AnimActor>) -> Self {
        match config.kind {
            LayerKind::Simple => AnimLayer::Simple(SimpleLayer::new(config)),
            LayerKind::State => AnimLayer::State(StateLayer::new(config, actor)),
        }
    }

    pub fn config(&self) -> &LayerConfig {
        match self {
            AnimLayer::Simple(l) => l.config(),
            AnimLayer::State(l) => l.config(),
        }
    }

    pub fn name(&self) -> &SmolStr {
        &self.config().name
    }

    pub fn priority(&self) -> i32 {
        self.config().priority
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.config().blend_mode
    }

    pub fn layer_fade(&self) -> &LayerFade {
        match self {
            AnimLayer::Simple(l) => l.layer_fade(),
            AnimLayer::State(l) => l.layer_fade(),
        }
    }

    pub fn current_fade(&self) -> f32 {
        self.layer_fade().current()
    }

    pub fn desired_fade(&self) -> f32 {
        self.layer_fade().desired()
    }

    pub fn fade(&mut self, target: f32, fade_time: f32, curve: BlendCurve) {
        match self {
            AnimLayer::Simple(l) => l.fade(target, fade_time, curve),
            AnimLayer::State(l) => l.fade(target, fade_time, curve),
        }
    }

    pub fn instance_count(&self) -> usize {
        match self {
            AnimLayer::Simple(l) => l.instance_count(),
            AnimLayer::State(l) => l.instance_count(),
        }
    }

    /// The phase of the top instance or `0.0` for an empty layer.
    pub fn current_phase(&self) -> f32 {
        let phase = match self {
            AnimLayer::Simple(l) => l.current_instance().map(|i| i.phase()),
            AnimLayer::State(l) => l.current_instance().map(|i| i.phase()),
        };
        phase.unwrap_or(0.0)
    }

    /// Advance phases, fades and pending transitions by `delta_time` seconds.
    pub fn begin_step(&mut self, delta_time: f32, frame: u64, clips: &dyn ClipLookup) {
        match self {
            AnimLayer::Simple(l) => l.begin_step(delta_time, frame),
            AnimLayer::State(l) => l.begin_step(delta_time, frame, clips),
        }
    }

    /// The blended pose of all instances or `None` for an empty layer.
    pub fn evaluate_pose(&self, cache: &PoseCache) -> Option<Pose> {
        match self {
            AnimLayer::Simple(l) => l.evaluate_pose(cache),
            AnimLayer::State(l) => l.evaluate_pose(cache),
        }
    }

    /// Write the layer pose into `cache` weighted by the layer fade.
    pub fn finish_step(&self, cache: &mut PoseCache) {
        if let Some(pose) = self.evaluate_pose(cache) {
            pose.apply(cache, self.current_fade(), self.blend_mode());
        }
    }

    pub fn evaluate_channel(&self, name: &str) -> Option<Locator> {
        match self {
            AnimLayer::Simple(l) => l.evaluate_channel(name),
            AnimLayer::State(l) => l.evaluate_channel(name),
        }
    }

    pub fn evaluate_float(&self, name: &str) -> Option<f32> {
        match self {
            AnimLayer::Simple(l) => l.evaluate_float(name),
            AnimLayer::State(l) => l.evaluate_float(name),
        }
    }

    pub fn as_simple(&self) -> Option<&SimpleLayer> {
        match self {
            AnimLayer::Simple(l) => Some(l),
            AnimLayer::State(_) => None,
        }
    }

    pub fn as_simple_mut(&mut self) -> Option<&mut SimpleLayer> {
        match self {
            AnimLayer::Simple(l) => Some(l),
            AnimLayer::State(_) => None,
        }
    }

    pub fn as_state(&self) -> Option<&StateLayer> {
        match self {
            AnimLayer::State(l) => Some(l),
            AnimLayer::Simple(_) => None,
        }
    }

    pub fn as_state_mut(&mut self) -> Option<&mut StateLayer> {
        match self {
            AnimLayer::State(l) => Some(l),
            AnimLayer::Simple(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_fade_immediate() {
        let mut fade = LayerFade::default();
        assert_eq!(1.0, fade.current());
        fade.fade(0.0, 0.0, BlendCurve::Linear);
        assert_eq!(0.0, fade.current());
        assert!(fade.is_faded_out());
    }

    #[test]
    fn layer_fade_over_time() {
        let mut fade = LayerFade::default();
        fade.fade(0.0, 0.5, BlendCurve::Linear);
        fade.update(0.25);
        assert_eq!(0.5, fade.current());
        assert!(fade.is_fading());
        fade.update(0.25);
        assert_eq!(0.0, fade.current());
        assert!(!fade.is_fading());
        assert!(fade.is_faded_out());

        fade.fade(1.0, 0.5, BlendCurve::UniformS);
        fade.update(0.25);
        assert_eq!(0.5, fade.current());
        fade.update(0.5);
        assert_eq!(1.0, fade.current());
    }

    #[test]
    fn layer_config_defaults() {
        let config = LayerConfig::new("base", LayerKind::State);
        assert_eq!(DEFAULT_LAYER_CAPACITY, config.capacity);
        assert_eq!(BlendMode::Blend, config.blend_mode);
        assert_eq!(Ok(LayerKind::State), "state".parse());
    }
}
