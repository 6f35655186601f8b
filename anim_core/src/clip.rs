//! Immutable sampled clip data and the lookup used to resolve clips by name.
use std::sync::Arc;

use glam::Quat;
use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::{Locator, Transform, curve::clamp01};

/// The channel describing the object's motion relative to the clip origin.
pub const ALIGN_CHANNEL: &str = "align";

/// The channel describing the action pack reference point in clip space.
pub const AP_REFERENCE_CHANNEL: &str = "apReference";

/// The frame rate used for frame numbers shown to gameplay and authoring tools.
pub const AUTHORED_FRAMES_PER_SECOND: f32 = 30.0;

/// Sampled animation data for a single clip.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct ClipData {
    pub name: SmolStr,
    pub frames_per_second: f32,
    /// The number of samples including the first and last frame.
    pub frame_count: u32,
    pub looping: bool,
    pub tracks: Vec<JointTrack>,
    /// Object space locator channels like [ALIGN_CHANNEL] with one value per frame.
    pub locator_channels: IndexMap<SmolStr, Vec<Locator>>,
    /// Float channels with one value per frame matched to skeleton output controls by name.
    pub float_channels: IndexMap<SmolStr, Vec<f32>>,
}

/// The local transform for a joint at each frame.
#[derive(Debug, PartialEq, Clone)]
pub struct JointTrack {
    pub joint_index: usize,
    pub frames: Vec<Transform>,
}

impl ClipData {
    /// The length of the clip in seconds.
    pub fn duration(&self) -> f32 {
        if self.frame_count > 1 && self.frames_per_second > 0.0 {
            (self.frame_count - 1) as f32 / self.frames_per_second
        } else {
            0.0
        }
    }

    /// The phase covered by a single frame interval.
    pub fn phase_per_frame(&self) -> f32 {
        if self.frame_count > 1 {
            1.0 / (self.frame_count - 1) as f32
        } else {
            0.0
        }
    }

    /// The phase advanced per second at a playback rate of `1.0`.
    pub fn phase_per_second(&self) -> f32 {
        self.phase_per_frame() * self.frames_per_second
    }

    /// The sample position for `phase` in the range `0.0` to `frame_count - 1`.
    pub fn sample_frame(&self, phase: f32) -> f32 {
        clamp01(phase) * self.frame_count.saturating_sub(1) as f32
    }

    /// The frame number at `phase` measured at [AUTHORED_FRAMES_PER_SECOND].
    pub fn authored_frame(&self, phase: f32) -> f32 {
        clamp01(phase) * self.duration() * AUTHORED_FRAMES_PER_SECOND
    }

    /// The phase for an authored frame number.
    pub fn phase_from_authored_frame(&self, frame: f32) -> f32 {
        let max_frame = self.duration() * AUTHORED_FRAMES_PER_SECOND;
        if max_frame > 0.0 {
            clamp01(frame / max_frame)
        } else {
            0.0
        }
    }

    /// The last authored frame number.
    pub fn max_authored_frame(&self) -> f32 {
        self.duration() * AUTHORED_FRAMES_PER_SECOND
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.locator_channels.contains_key(name)
    }

    /// Sample the joint track at `phase` with interpolation between frames.
    pub fn sample_track(&self, track: &JointTrack, phase: f32) -> Option<Transform> {
        let (i0, i1, t) = self.sample_indices(phase, track.frames.len())?;
        Some(track.frames[i0].blend(&track.frames[i1], t, false))
    }

    /// Sample a locator channel at `phase`.
    /// Mirrored channels are reflected across the YZ plane.
    pub fn evaluate_channel(&self, name: &str, phase: f32, mirror: bool) -> Option<Locator> {
        let frames = self.locator_channels.get(name)?;
        let (i0, i1, t) = self.sample_indices(phase, frames.len())?;
        let locator = frames[i0].lerp(&frames[i1], t);
        Some(if mirror {
            mirror_locator(&locator)
        } else {
            locator
        })
    }

    pub fn evaluate_float(&self, name: &str, phase: f32) -> Option<f32> {
        let frames = self.float_channels.get(name)?;
        let (i0, i1, t) = self.sample_indices(phase, frames.len())?;
        Some(frames[i0] + (frames[i1] - frames[i0]) * t)
    }

    fn sample_indices(&self, phase: f32, len: usize) -> Option<(usize, usize, f32)> {
        if len == 0 {
            return None;
        }
        let frame = self.sample_frame(phase);
        let i0 = (frame.floor() as usize).min(len - 1);
        let i1 = (i0 + 1).min(len - 1);
        Some((i0, i1, frame - frame.floor()))
    }
}

/// Reflect a locator across the YZ plane.
pub fn mirror_locator(locator: &Locator) -> Locator {
    let q = locator.rotation;
    Locator {
        translation: locator.translation * glam::vec3(-1.0, 1.0, 1.0),
        rotation: Quat::from_xyzw(q.x, -q.y, -q.z, q.w),
    }
}

/// Resolve clips by name.
///
/// A missing clip is reported as `None` and is never an error on its own.
pub trait ClipLookup {
    fn clip(&self, name: &str) -> Option<Arc<ClipData>>;
}

/// A [ClipLookup] backed by an insertion ordered map.
#[derive(Debug, Default, Clone)]
pub struct ClipTable {
    clips: IndexMap<SmolStr, Arc<ClipData>, ahash::RandomState>,
}

impl ClipTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a clip keyed by its name and return the previous clip with the same name.
    pub fn insert(&mut self, clip: ClipData) -> Option<Arc<ClipData>> {
        self.clips.insert(clip.name.clone(), Arc::new(clip))
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &SmolStr> {
        self.clips.keys()
    }
}

impl ClipLookup for ClipTable {
    fn clip(&self, name: &str) -> Option<Arc<ClipData>> {
        self.clips.get(name).cloned()
    }
}

impl FromIterator<ClipData> for ClipTable {
    fn from_iter<T: IntoIterator<Item = ClipData>>(iter: T) -> Self {
        let mut table = Self::new();
        for clip in iter {
            table.insert(clip);
        }
        table
    }
}
