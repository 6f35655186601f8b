//! Queued state change requests and the record of processed requests.
use bitflags::bitflags;
use smol_str::SmolStr;
use strum::{Display, EnumString};

use crate::{BlendCurve, Locator, instance::InstanceId};

/// The maximum number of requests a state layer queues before rejecting new ones.
pub const MAX_REQUESTS_IN_FLIGHT: usize = 4;

/// Identifies a request within its layer. Id `0` is never assigned.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u32);

impl RequestId {
    pub const INVALID: Self = Self(0);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    pub fn next(self) -> Self {
        match self.0.wrapping_add(1) {
            0 => Self(1),
            n => Self(n),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum RequestStatus {
    /// Unknown or rejected requests.
    #[default]
    Invalid,
    Pending,
    Taken,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum RequestType {
    /// Fade directly to a named state.
    DirectFade,
    /// Take a named transition from the current state.
    Transition,
}

bitflags! {
    /// Selects which kinds of pending requests to remove.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RequestTypes: u8 {
        const DIRECT_FADE = 1 << 0;
        const TRANSITION = 1 << 1;
    }
}

impl RequestType {
    pub fn matches(self, types: RequestTypes) -> bool {
        match self {
            RequestType::DirectFade => types.contains(RequestTypes::DIRECT_FADE),
            RequestType::Transition => types.contains(RequestTypes::TRANSITION),
        }
    }
}

/// Options for fading to a state or overriding a transition.
#[derive(Debug, Clone, PartialEq)]
pub struct FadeToStateParams {
    /// Override the start phase of the destination in the range `0.0` to `1.0`.
    pub start_phase: Option<f32>,
    /// Override the animation fade time.
    pub anim_fade_time: Option<f32>,
    /// Override the motion fade time. Defaults to the animation fade time.
    pub motion_fade_time: Option<f32>,
    pub curve: Option<BlendCurve>,
    /// The action pack reference for the new instance.
    /// Transitions reuse the reference of the current instance when `None`.
    pub ap_ref: Option<Locator>,
    /// The channel matched to `ap_ref` instead of `apReference`.
    pub ap_channel: Option<SmolStr>,
    pub phase_sync: bool,
    /// Restart a finished instance of the same state instead of starting a new one.
    pub allow_state_looping: bool,
    /// Queue behind existing transitions instead of replacing them.
    pub dont_clear_transitions: bool,
    pub mirror: bool,
    pub freeze_during_fade_in: bool,
}

impl Default for FadeToStateParams {
    fn default() -> Self {
        Self {
            start_phase: None,
            anim_fade_time: None,
            motion_fade_time: None,
            curve: None,
            ap_ref: None,
            ap_channel: None,
            phase_sync: false,
            allow_state_looping: true,
            dont_clear_transitions: false,
            mirror: false,
            freeze_during_fade_in: false,
        }
    }
}

impl FadeToStateParams {
    pub fn with_fade_time(fade_time: f32) -> Self {
        Self {
            anim_fade_time: Some(fade_time),
            ..Default::default()
        }
    }

    pub(crate) fn anim_fade_or(&self, default: f32) -> f32 {
        self.anim_fade_time
            .filter(|t| *t >= 0.0)
            .unwrap_or(default)
            .max(0.0)
    }

    pub(crate) fn motion_fade_or(&self, default: f32) -> f32 {
        self.motion_fade_time
            .filter(|t| *t >= 0.0)
            .unwrap_or(default)
            .max(0.0)
    }
}

/// A request waiting in the queue of a state layer.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChangeRequest {
    pub id: RequestId,
    pub kind: RequestType,
    /// The transition name or the destination state for direct fades.
    pub name: SmolStr,
    pub status: RequestStatus,
    /// Survives [StateLayer::remove_all_pending_transitions](crate::StateLayer::remove_all_pending_transitions).
    pub dont_remove: bool,
    pub params: FadeToStateParams,
    pub use_parent_ap_ref: bool,
}

/// The outcome of a request that left the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedRequest {
    pub id: RequestId,
    pub kind: RequestType,
    pub name: SmolStr,
    pub status: RequestStatus,
    pub instance_id: InstanceId,
    pub src_state: Option<SmolStr>,
    pub dst_state: Option<SmolStr>,
}

/// The last few processed requests overwritten oldest first.
#[derive(Debug, Clone, Default)]
pub struct ProcessedRequests {
    entries: [Option<ProcessedRequest>; MAX_REQUESTS_IN_FLIGHT],
    next: usize,
}

impl ProcessedRequests {
    pub fn push(&mut self, request: ProcessedRequest) {
        self.entries[self.next] = Some(request);
        self.next = (self.next + 1) % MAX_REQUESTS_IN_FLIGHT;
    }

    pub fn get(&self, id: RequestId) -> Option<&ProcessedRequest> {
        if !id.is_valid() {
            return None;
        }
        self.entries.iter().flatten().find(|r| r.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessedRequest> {
        self.entries.iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processed(id: u32) -> ProcessedRequest {
        ProcessedRequest {
            id: RequestId(id),
            kind: RequestType::Transition,
            name: "walk".into(),
            status: RequestStatus::Taken,
            instance_id: InstanceId(id),
            src_state: None,
            dst_state: None,
        }
    }

    #[test]
    fn processed_ring_overwrites_oldest() {
        let mut ring = ProcessedRequests::default();
        for id in 1..=5 {
            ring.push(processed(id));
        }
        assert!(ring.get(RequestId(1)).is_none());
        assert_eq!(Some(InstanceId(5)), ring.get(RequestId(5)).map(|r| r.instance_id));
        assert_eq!(4, ring.iter().count());
        assert!(ring.get(RequestId::INVALID).is_none());
    }

    #[test]
    fn fade_time_overrides() {
        let params = FadeToStateParams {
            anim_fade_time: Some(-1.0),
            motion_fade_time: None,
            ..Default::default()
        };
        assert_eq!(0.5, params.anim_fade_or(0.5));
        assert_eq!(0.25, params.motion_fade_or(0.25));

        let params = FadeToStateParams::with_fade_time(0.2);
        assert_eq!(0.2, params.anim_fade_or(0.5));
        assert_eq!(0.2, params.motion_fade_or(params.anim_fade_or(0.5)));
    }

    #[test]
    fn request_type_mask() {
        assert!(RequestType::Transition.matches(RequestTypes::all()));
        assert!(!RequestType::DirectFade.matches(RequestTypes::TRANSITION));
        assert_eq!(RequestId(1), RequestId(u32::MAX).next());
    }
}
