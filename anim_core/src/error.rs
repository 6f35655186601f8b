use smol_str::SmolStr;
use thiserror::Error;

#[derive(Debug, PartialEq, Eq, Error)]
pub enum SkeletonError {
    #[error("joint {joint} has parent {parent} out of range for {count} joints")]
    ParentOutOfRange {
        joint: usize,
        parent: usize,
        count: usize,
    },

    #[error("joint {joint} appears before its parent {parent}")]
    ParentAfterChild { joint: usize, parent: usize },
}

#[derive(Debug, PartialEq, Eq, Error)]
pub enum CreatePoseCacheError {
    #[error("skeleton has no joints")]
    EmptySkeleton,

    #[error("invalid skeleton hierarchy")]
    Skeleton(#[from] SkeletonError),
}

#[derive(Debug, PartialEq, Eq, Error)]
#[error("joint index {index} out of range for {count} joints")]
pub struct JointIndexError {
    pub index: usize,
    pub count: usize,
}

#[derive(Debug, PartialEq, Eq, Error)]
pub enum FadeToAnimError {
    #[error("failed to find clip {0:?}")]
    MissingClip(SmolStr),

    #[error("clip {0:?} has no frames")]
    EmptyClip(SmolStr),
}

#[derive(Debug, PartialEq, Eq, Error)]
pub enum FadeToStateError {
    #[error("failed to find state {0:?}")]
    MissingState(SmolStr),

    #[error("state {state:?} references missing clip {clip:?}")]
    MissingClip { state: SmolStr, clip: SmolStr },
}

#[derive(Debug, PartialEq, Eq, Error)]
pub enum LayerError {
    #[error("failed to find layer {0:?}")]
    MissingLayer(SmolStr),

    #[error("layer {0:?} is not a simple layer")]
    NotSimple(SmolStr),

    #[error("layer {0:?} is not a state layer")]
    NotState(SmolStr),

    #[error("layer {0:?} already exists")]
    DuplicateLayer(SmolStr),
}

#[derive(Debug, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("invalid layer")]
    Layer(#[from] LayerError),

    #[error("failed to fade to state")]
    FadeToState(#[from] FadeToStateError),

    #[error("failed to fade to clip")]
    FadeToAnim(#[from] FadeToAnimError),
}
