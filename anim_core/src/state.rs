//! The state graph driving a [StateLayer](crate::StateLayer).
use std::{collections::VecDeque, fmt, sync::Arc};

use bitflags::bitflags;
use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::{BlendCurve, Locator};

/// The name of the transition taken automatically once active.
pub const AUTO_TRANSITION: &str = "auto";

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StateFlags: u32 {
        /// Align the object relative to the instance action pack reference.
        const AP_MOVE_UPDATE = 1 << 0;
        /// Like [StateFlags::AP_MOVE_UPDATE] but using the raw align channel.
        const FIRST_ALIGN_REF_MOVE_UPDATE = 1 << 1;
        /// Move a saved align with the clip instead of the object align.
        const SAVE_TOP_ALIGN = 1 << 2;
        const NO_ALIGN_MOVE_UPDATE = 1 << 3;
        const NO_ADJUST_TO_UPRIGHT = 1 << 4;
        /// Scale the last align delta by the time left over when the clip ends.
        const EXTRAPOLATE_ALIGN = 1 << 5;
        /// Intermediate states that do not count as a destination.
        const TRANSITIONAL = 1 << 6;
        const NEVER_LOOP = 1 << 7;
        const DISABLE_PREV_AUTO_TRANSITIONS = 1 << 8;
        const FREEZE_PHASE_DURING_FADE_IN = 1 << 9;
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TransitionFlags: u32 {
        const FADE_OUT_LAYER = 1 << 0;
        /// Keep the current instance and do not start a new one.
        const NO_RESET = 1 << 1;
        /// Start the destination at the source phase offset by the start phase.
        const PHASE_SYNC = 1 << 2;
        /// Automatic transitions wait until no other instance is blending.
        const INACTIVE_WHILE_BLENDING = 1 << 3;
        const NO_PATHFIND_THROUGH = 1 << 4;
    }
}

/// Arguments passed to an [AlignFunc].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignFuncArgs<'a> {
    pub state: &'a SmolStr,
    /// The object align at the start of the step.
    pub base_align: Locator,
    /// The align computed for the instance.
    pub instance_align: Locator,
    pub ap_ref: Locator,
    pub phase: f32,
}

/// A custom align for every instance of a state.
/// Returning `None` keeps the computed align.
#[derive(Clone)]
pub struct AlignFunc(pub Arc<dyn Fn(&AlignFuncArgs) -> Option<Locator> + Send + Sync>);

impl AlignFunc {
    pub fn new(f: impl Fn(&AlignFuncArgs) -> Option<Locator> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, args: &AlignFuncArgs) -> Option<Locator> {
        (self.0)(args)
    }
}

impl fmt::Debug for AlignFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AlignFunc")
    }
}

#[derive(Debug, Clone)]
pub struct AnimTransition {
    pub name: SmolStr,
    pub dest_state: SmolStr,
    pub fade_time: f32,
    /// Defaults to `fade_time` when `None`.
    pub motion_fade_time: Option<f32>,
    pub curve: BlendCurve,
    /// The transition can only be taken while the phase is inside this window.
    pub min_phase: f32,
    pub max_phase: f32,
    pub start_phase: f32,
    pub flags: TransitionFlags,
}

impl Default for AnimTransition {
    fn default() -> Self {
        Self {
            name: SmolStr::default(),
            dest_state: SmolStr::default(),
            fade_time: 0.0,
            motion_fade_time: None,
            curve: BlendCurve::default(),
            min_phase: 0.0,
            max_phase: 1.0,
            start_phase: 0.0,
            flags: TransitionFlags::empty(),
        }
    }
}

impl AnimTransition {
    pub fn new(name: impl Into<SmolStr>, dest_state: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            dest_state: dest_state.into(),
            ..Default::default()
        }
    }

    pub fn is_active(&self, phase: f32) -> bool {
        phase >= self.min_phase && phase <= self.max_phase
    }

    pub fn motion_fade_time(&self) -> f32 {
        self.motion_fade_time.unwrap_or(self.fade_time)
    }
}

#[derive(Debug, Clone)]
pub struct AnimState {
    pub name: SmolStr,
    /// The clip sampled by instances of this state.
    pub clip: SmolStr,
    pub flags: StateFlags,
    pub playback_rate: f32,
    pub transitions: Vec<AnimTransition>,
    pub align_func: Option<AlignFunc>,
}

impl Default for AnimState {
    fn default() -> Self {
        Self {
            name: SmolStr::default(),
            clip: SmolStr::default(),
            flags: StateFlags::empty(),
            playback_rate: 1.0,
            transitions: Vec::new(),
            align_func: None,
        }
    }
}

impl AnimState {
    pub fn new(name: impl Into<SmolStr>, clip: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            clip: clip.into(),
            ..Default::default()
        }
    }

    pub fn transition(&self, name: &str) -> Option<&AnimTransition> {
        self.transitions.iter().find(|t| t.name == name)
    }

    pub fn active_transition(&self, name: &str, phase: f32) -> Option<&AnimTransition> {
        self.transitions
            .iter()
            .find(|t| t.name == name && t.is_active(phase))
    }

    pub fn active_transition_to_state(&self, dest: &str, phase: f32) -> Option<&AnimTransition> {
        self.transitions
            .iter()
            .find(|t| t.dest_state == dest && t.is_active(phase))
    }

    pub fn is_transitional(&self) -> bool {
        self.flags.contains(StateFlags::TRANSITIONAL)
    }

    /// `true` if align is computed relative to the action pack reference.
    pub fn is_ap_move_update(&self) -> bool {
        self.flags
            .intersects(StateFlags::AP_MOVE_UPDATE | StateFlags::FIRST_ALIGN_REF_MOVE_UPDATE)
    }
}

/// A named collection of states.
#[derive(Debug, Clone, Default)]
pub struct AnimActor {
    pub name: SmolStr,
    states: IndexMap<SmolStr, AnimState, ahash::RandomState>,
}

impl AnimActor {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            states: IndexMap::default(),
        }
    }

    /// Add a state and return the previous state with the same name.
    pub fn insert(&mut self, state: AnimState) -> Option<AnimState> {
        self.states.insert(state.name.clone(), state)
    }

    pub fn with_state(mut self, state: AnimState) -> Self {
        self.insert(state);
        self
    }

    pub fn state(&self, name: &str) -> Option<&AnimState> {
        self.states.get(name)
    }

    pub fn states(&self) -> impl Iterator<Item = &AnimState> {
        self.states.values()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// The first transition to take from `src` at `phase` on the way to `dest`.
    ///
    /// A direct transition is preferred. Otherwise the search only passes
    /// through transitional states and the first hop must be active.
    pub fn find_transition_to_final_state(
        &self,
        src: &str,
        dest: &str,
        phase: f32,
    ) -> Option<&AnimTransition> {
        let src_state = self.state(src)?;
        if let Some(t) = src_state.active_transition_to_state(dest, phase) {
            return Some(t);
        }

        // Breadth first search remembering the first hop of each path.
        let mut visited: Vec<SmolStr> = vec![src.into()];
        let mut queue = VecDeque::new();
        for t in src_state.transitions.iter().filter(|t| t.is_active(phase)) {
            if t.flags.contains(TransitionFlags::NO_PATHFIND_THROUGH) {
                continue;
            }
            if self.state(&t.dest_state).is_some_and(|s| s.is_transitional()) {
                queue.push_back((t, t.dest_state.clone()));
            }
        }

        while let Some((first, name)) = queue.pop_front() {
            if visited.contains(&name) {
                continue;
            }
            visited.push(name.clone());

            let Some(state) = self.state(&name) else {
                continue;
            };
            for t in &state.transitions {
                if t.dest_state == dest {
                    return Some(first);
                }
                if !t.flags.contains(TransitionFlags::NO_PATHFIND_THROUGH)
                    && self.state(&t.dest_state).is_some_and(|s| s.is_transitional())
                {
                    queue.push_back((first, t.dest_state.clone()));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor() -> AnimActor {
        let mut stand_to_walk = AnimState::new("stand-to-walk", "stand-to-walk");
        stand_to_walk.flags = StateFlags::TRANSITIONAL;
        stand_to_walk
            .transitions
            .push(AnimTransition::new("auto", "walk"));

        let mut idle = AnimState::new("idle", "idle");
        idle.transitions.push(AnimTransition {
            min_phase: 0.5,
            ..AnimTransition::new("start-walk", "stand-to-walk")
        });
        idle.transitions.push(AnimTransition::new("jump", "jump"));

        AnimActor::new("player")
            .with_state(idle)
            .with_state(stand_to_walk)
            .with_state(AnimState::new("walk", "walk"))
            .with_state(AnimState::new("jump", "jump"))
    }

    #[test]
    fn transition_phase_window() {
        let actor = actor();
        let idle = actor.state("idle").unwrap();
        assert!(idle.active_transition("start-walk", 0.25).is_none());
        assert!(idle.active_transition("start-walk", 0.5).is_some());
        assert!(idle.transition("start-walk").is_some());
        assert!(idle.active_transition("missing", 0.5).is_none());
    }

    #[test]
    fn final_state_direct() {
        let actor = actor();
        let t = actor
            .find_transition_to_final_state("idle", "jump", 0.0)
            .unwrap();
        assert_eq!("jump", t.name);
    }

    #[test]
    fn final_state_through_transitional() {
        let actor = actor();
        let t = actor
            .find_transition_to_final_state("idle", "walk", 0.75)
            .unwrap();
        assert_eq!("start-walk", t.name);
        assert!(
            actor
                .find_transition_to_final_state("idle", "walk", 0.25)
                .is_none()
        );
        assert!(
            actor
                .find_transition_to_final_state("walk", "idle", 0.0)
                .is_none()
        );
    }

    #[test]
    fn motion_fade_defaults_to_anim_fade() {
        let t = AnimTransition {
            fade_time: 0.25,
            ..AnimTransition::new("a", "b")
        };
        assert_eq!(0.25, t.motion_fade_time());
        assert!(
            StateFlags::AP_MOVE_UPDATE
                .intersects(StateFlags::AP_MOVE_UPDATE | StateFlags::FIRST_ALIGN_REF_MOVE_UPDATE)
        );
    }
}
