//! # anim_core
//! anim_core plays skeletal animation clips on layers and resolves the pose and align of an object.
//!
//! An [AnimControl] owns a [PoseCache] for a single [Skeleton] and a priority ordered list of layers.
//! [SimpleLayer] crossfades directly requested clips.
//! [StateLayer] plays the states of an [AnimActor] and takes named transitions between them.
//!
//! # Getting Started
//! ```rust
//! use std::sync::Arc;
//!
//! use anim_core::{
//!     AnimActor, AnimControl, AnimState, ClipData, ClipTable, Joint, Skeleton, Transform,
//!     layer::{LayerConfig, LayerKind},
//!     request::FadeToStateParams,
//! };
//!
//! let skeleton = Arc::new(Skeleton::new(vec![Joint {
//!     name: "root".into(),
//!     transform: Transform::IDENTITY,
//!     parent_index: None,
//! }]));
//! let clips: ClipTable = [ClipData {
//!     name: "idle".into(),
//!     frames_per_second: 30.0,
//!     frame_count: 31,
//!     ..Default::default()
//! }]
//! .into_iter()
//! .collect();
//! let actor = Arc::new(AnimActor::new("player").with_state(AnimState::new("idle", "idle")));
//!
//! let mut control = AnimControl::new(skeleton, clips, actor)?;
//! control.add_layer(LayerConfig::new("base", LayerKind::State))?;
//! control.fade_to_state("base", "idle", &FadeToStateParams::default())?;
//! control.step(1.0 / 30.0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
pub mod action;
pub mod align;
pub mod bitset;
pub mod clip;
pub mod control;
pub mod curve;
pub mod error;
pub mod instance;
pub mod layer;
pub mod locator;
pub mod pose;
pub mod pose_cache;
pub mod request;
pub mod self_blend;
pub mod skeleton;
pub mod state;
pub mod state_instance;
pub mod transform;

pub use action::{ActionStatus, AnimAction, AnimActionWithSelfBlend, FinishCondition};
pub use clip::{ClipData, ClipLookup, ClipTable};
pub use control::AnimControl;
pub use curve::BlendCurve;
pub use layer::{AnimLayer, SimpleLayer, StateLayer};
pub use locator::Locator;
pub use pose::{BlendMode, Pose};
pub use pose_cache::PoseCache;
pub use skeleton::{Joint, Skeleton};
pub use state::{AnimActor, AnimState, AnimTransition};
pub use transform::Transform;
