//! JSON scene descriptions converted to anim_core data.
use std::{path::Path, sync::Arc};

use anim_core::{
    AnimActor, AnimState, AnimTransition, BlendCurve, BlendMode, ClipData, ClipTable, Joint,
    Locator, Skeleton, Transform,
    clip::{ALIGN_CHANNEL, JointTrack},
    layer::{LayerConfig, LayerKind},
    state::{StateFlags, TransitionFlags},
};
use anyhow::{Context, Result, anyhow};
use glam::{Quat, Vec3};
use serde::Deserialize;
use smol_str::SmolStr;

#[derive(Debug, Deserialize)]
pub struct Scene {
    pub skeleton: SkeletonDesc,
    pub clips: Vec<ClipDesc>,
    #[serde(default)]
    pub states: Vec<StateDesc>,
    pub layers: Vec<LayerDesc>,
    #[serde(default)]
    pub commands: Vec<Command>,
}

#[derive(Debug, Deserialize)]
pub struct SkeletonDesc {
    pub joints: Vec<JointDesc>,
    #[serde(default)]
    pub input_controls: Vec<SmolStr>,
    #[serde(default)]
    pub output_controls: Vec<SmolStr>,
}

#[derive(Debug, Deserialize)]
pub struct JointDesc {
    pub name: SmolStr,
    #[serde(default)]
    pub parent: Option<SmolStr>,
    #[serde(default)]
    pub transform: TransformDesc,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct TransformDesc {
    pub translation: [f32; 3],
    /// Quaternion in xyzw order.
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl Default for TransformDesc {
    fn default() -> Self {
        Self {
            translation: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0; 3],
        }
    }
}

impl From<TransformDesc> for Transform {
    fn from(value: TransformDesc) -> Self {
        Self {
            translation: Vec3::from_array(value.translation),
            rotation: Quat::from_array(value.rotation).normalize(),
            scale: Vec3::from_array(value.scale),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ClipDesc {
    pub name: SmolStr,
    #[serde(default = "default_fps")]
    pub fps: f32,
    pub frame_count: u32,
    #[serde(default)]
    pub looping: bool,
    /// Joint tracks interpolated linearly from `from` to `to` over the clip.
    #[serde(default)]
    pub tracks: Vec<TrackDesc>,
    /// The total object motion over the clip written to the align channel.
    #[serde(default)]
    pub align_motion: Option<[f32; 3]>,
    /// The total yaw in radians over the clip written to the align channel.
    #[serde(default)]
    pub align_turn: Option<f32>,
    #[serde(default)]
    pub float_channels: Vec<FloatChannelDesc>,
}

fn default_fps() -> f32 {
    30.0
}

#[derive(Debug, Deserialize)]
pub struct TrackDesc {
    pub joint: SmolStr,
    pub from: TransformDesc,
    pub to: TransformDesc,
}

#[derive(Debug, Deserialize)]
pub struct FloatChannelDesc {
    pub name: SmolStr,
    pub from: f32,
    pub to: f32,
}

#[derive(Debug, Deserialize)]
pub struct StateDesc {
    pub name: SmolStr,
    pub clip: SmolStr,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default = "default_rate")]
    pub playback_rate: f32,
    #[serde(default)]
    pub transitions: Vec<TransitionDesc>,
}

fn default_rate() -> f32 {
    1.0
}

#[derive(Debug, Deserialize)]
pub struct TransitionDesc {
    pub name: SmolStr,
    pub dest: SmolStr,
    #[serde(default)]
    pub fade_time: f32,
    #[serde(default)]
    pub motion_fade_time: Option<f32>,
    #[serde(default)]
    pub curve: Option<String>,
    #[serde(default)]
    pub min_phase: f32,
    #[serde(default = "default_max_phase")]
    pub max_phase: f32,
    #[serde(default)]
    pub start_phase: f32,
    #[serde(default)]
    pub flags: Vec<String>,
}

fn default_max_phase() -> f32 {
    1.0
}

#[derive(Debug, Deserialize)]
pub struct LayerDesc {
    pub name: SmolStr,
    pub kind: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub capacity: Option<usize>,
    #[serde(default)]
    pub blend_mode: Option<String>,
    #[serde(default)]
    pub drives_align: bool,
    #[serde(default)]
    pub linear_rotation: bool,
}

/// A request issued on `frame` before stepping.
#[derive(Debug, Clone, Deserialize)]
pub struct Command {
    pub frame: u64,
    pub layer: SmolStr,
    #[serde(flatten)]
    pub kind: CommandKind,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandKind {
    FadeToState {
        state: SmolStr,
        #[serde(default)]
        fade_time: Option<f32>,
        #[serde(default)]
        finish: Option<String>,
    },
    Request {
        transition: SmolStr,
        /// Wait for the current instance to reach this phase.
        #[serde(default)]
        trigger_phase: Option<f32>,
        #[serde(default)]
        finish: Option<String>,
    },
    FadeToAnim {
        clip: SmolStr,
        #[serde(default)]
        fade_time: f32,
        #[serde(default)]
        looping: bool,
        #[serde(default)]
        finish: Option<String>,
    },
}

impl CommandKind {
    pub fn name(&self) -> &SmolStr {
        match self {
            CommandKind::FadeToState { state, .. } => state,
            CommandKind::Request { transition, .. } => transition,
            CommandKind::FadeToAnim { clip, .. } => clip,
        }
    }

    pub fn finish(&self) -> Option<&str> {
        match self {
            CommandKind::FadeToState { finish, .. }
            | CommandKind::Request { finish, .. }
            | CommandKind::FadeToAnim { finish, .. } => finish.as_deref(),
        }
    }
}

impl Scene {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scene {path:?}"))?;
        serde_json::from_str(&text).with_context(|| format!("failed to parse scene {path:?}"))
    }

    pub fn skeleton(&self) -> Result<Arc<Skeleton>> {
        let mut joints = Vec::new();
        for joint in &self.skeleton.joints {
            let parent_index = match &joint.parent {
                Some(parent) => Some(
                    self.joint_index(parent)
                        .with_context(|| format!("joint {:?} has unknown parent", joint.name))?,
                ),
                None => None,
            };
            joints.push(Joint {
                name: joint.name.clone(),
                transform: joint.transform.into(),
                parent_index,
            });
        }

        let mut skeleton = Skeleton::new(joints);
        skeleton.input_controls = self.skeleton.input_controls.clone();
        skeleton.output_controls = self.skeleton.output_controls.clone();
        skeleton.validate().context("invalid skeleton")?;
        Ok(Arc::new(skeleton))
    }

    fn joint_index(&self, name: &str) -> Result<usize> {
        self.skeleton
            .joints
            .iter()
            .position(|j| j.name == name)
            .ok_or_else(|| anyhow!("failed to find joint {name:?}"))
    }

    pub fn clips(&self) -> Result<ClipTable> {
        let mut table = ClipTable::new();
        for desc in &self.clips {
            let clip = self
                .clip(desc)
                .with_context(|| format!("invalid clip {:?}", desc.name))?;
            table.insert(clip);
        }
        Ok(table)
    }

    fn clip(&self, desc: &ClipDesc) -> Result<ClipData> {
        let count = desc.frame_count as usize;
        let t = |frame: usize| {
            if count > 1 {
                frame as f32 / (count - 1) as f32
            } else {
                0.0
            }
        };

        let mut tracks = Vec::new();
        for track in &desc.tracks {
            let from: Transform = track.from.into();
            let to: Transform = track.to.into();
            tracks.push(JointTrack {
                joint_index: self.joint_index(&track.joint)?,
                frames: (0..count).map(|i| from.blend(&to, t(i), false)).collect(),
            });
        }

        let mut clip = ClipData {
            name: desc.name.clone(),
            frames_per_second: desc.fps,
            frame_count: desc.frame_count,
            looping: desc.looping,
            tracks,
            ..Default::default()
        };

        if desc.align_motion.is_some() || desc.align_turn.is_some() {
            let motion = Vec3::from_array(desc.align_motion.unwrap_or_default());
            let turn = desc.align_turn.unwrap_or_default();
            let align = (0..count)
                .map(|i| Locator::new(motion * t(i), Quat::from_rotation_y(turn * t(i))))
                .collect();
            clip.locator_channels.insert(ALIGN_CHANNEL.into(), align);
        }

        for channel in &desc.float_channels {
            let values = (0..count)
                .map(|i| channel.from + (channel.to - channel.from) * t(i))
                .collect();
            clip.float_channels.insert(channel.name.clone(), values);
        }

        Ok(clip)
    }

    pub fn actor(&self, name: &str) -> Result<Arc<AnimActor>> {
        let mut actor = AnimActor::new(name);
        for desc in &self.states {
            let mut state = AnimState::new(desc.name.clone(), desc.clip.clone());
            state.playback_rate = desc.playback_rate;
            for flag in &desc.flags {
                state.flags |= StateFlags::from_name(flag)
                    .with_context(|| format!("unknown state flag {flag:?} on {:?}", desc.name))?;
            }
            for transition in &desc.transitions {
                state.transitions.push(
                    self.transition(transition)
                        .with_context(|| format!("invalid transition on state {:?}", desc.name))?,
                );
            }
            actor.insert(state);
        }
        Ok(Arc::new(actor))
    }

    fn transition(&self, desc: &TransitionDesc) -> Result<AnimTransition> {
        let mut flags = TransitionFlags::empty();
        for flag in &desc.flags {
            flags |= TransitionFlags::from_name(flag)
                .with_context(|| format!("unknown transition flag {flag:?}"))?;
        }
        let curve = match &desc.curve {
            Some(curve) => curve
                .parse::<BlendCurve>()
                .with_context(|| format!("unknown curve {curve:?}"))?,
            None => BlendCurve::default(),
        };
        Ok(AnimTransition {
            name: desc.name.clone(),
            dest_state: desc.dest.clone(),
            fade_time: desc.fade_time,
            motion_fade_time: desc.motion_fade_time,
            curve,
            min_phase: desc.min_phase,
            max_phase: desc.max_phase,
            start_phase: desc.start_phase,
            flags,
        })
    }

    pub fn layer_configs(&self) -> Result<Vec<LayerConfig>> {
        self.layers
            .iter()
            .map(|desc| {
                let kind = desc
                    .kind
                    .parse::<LayerKind>()
                    .with_context(|| format!("unknown layer kind {:?}", desc.kind))?;
                let mut config = LayerConfig::new(desc.name.clone(), kind);
                config.priority = desc.priority;
                config.drives_align = desc.drives_align;
                config.linear_rotation = desc.linear_rotation;
                if let Some(capacity) = desc.capacity {
                    config.capacity = capacity;
                }
                if let Some(mode) = &desc.blend_mode {
                    config.blend_mode = mode
                        .parse::<BlendMode>()
                        .with_context(|| format!("unknown blend mode {mode:?}"))?;
                }
                Ok(config)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    const SCENE: &str = r#"{
        "skeleton": {
            "joints": [
                { "name": "root" },
                { "name": "spine", "parent": "root", "transform": { "translation": [0, 1, 0] } }
            ]
        },
        "clips": [
            {
                "name": "walk",
                "frame_count": 31,
                "looping": true,
                "tracks": [
                    { "joint": "spine", "from": { "translation": [0, 1, 0] }, "to": { "translation": [1, 1, 0] } }
                ],
                "align_motion": [0, 0, 1.5]
            }
        ],
        "states": [
            {
                "name": "walk",
                "clip": "walk",
                "flags": ["AP_MOVE_UPDATE"],
                "transitions": [{ "name": "auto", "dest": "walk", "curve": "uniform-s", "flags": ["PHASE_SYNC"] }]
            }
        ],
        "layers": [{ "name": "base", "kind": "state", "drives_align": true }],
        "commands": [
            { "frame": 0, "layer": "base", "type": "fade_to_state", "state": "walk" },
            { "frame": 10, "layer": "base", "type": "request", "transition": "auto", "trigger_phase": 0.5 }
        ]
    }"#;

    #[test]
    fn parse_scene() {
        let scene: Scene = serde_json::from_str(SCENE).unwrap();

        let skeleton = scene.skeleton().unwrap();
        assert_eq!(Some(0), skeleton.joints[1].parent_index);

        let clips = scene.clips().unwrap();
        assert_eq!(1, clips.len());

        let actor = scene.actor("player").unwrap();
        let walk = actor.state("walk").unwrap();
        assert!(walk.flags.contains(StateFlags::AP_MOVE_UPDATE));
        assert_eq!(BlendCurve::UniformS, walk.transitions[0].curve);
        assert!(walk.transitions[0].flags.contains(TransitionFlags::PHASE_SYNC));

        let layers = scene.layer_configs().unwrap();
        assert_eq!(LayerKind::State, layers[0].kind);
        assert!(layers[0].drives_align);
        assert!(!layers[0].linear_rotation);

        assert_eq!(2, scene.commands.len());
        assert!(matches!(
            scene.commands[1].kind,
            CommandKind::Request {
                trigger_phase: Some(0.5),
                ..
            }
        ));
    }

    #[test]
    fn unknown_parent_joint() {
        let scene: Scene = serde_json::from_str(
            r#"{
                "skeleton": { "joints": [{ "name": "spine", "parent": "root" }] },
                "clips": [],
                "layers": []
            }"#,
        )
        .unwrap();
        assert!(scene.skeleton().is_err());
    }

    #[test]
    fn unknown_state_flag() {
        let scene: Scene = serde_json::from_str(
            r#"{
                "skeleton": { "joints": [{ "name": "root" }] },
                "clips": [],
                "states": [{ "name": "idle", "clip": "idle", "flags": ["FLYING"] }],
                "layers": []
            }"#,
        )
        .unwrap();
        assert!(scene.actor("player").is_err());
    }
}
