mod backend;
pub mod backends;
mod decode;
mod detector;
mod filter;
pub mod nms;
mod raw;
mod result;

pub use backend::{InferenceBackend, ModelFamily, DEFAULT_OVERLAP_THRESHOLD};
pub use backends::{ScriptedBackend, SyntheticCrowdBackend};
pub use decode::{decode, decode_grid_anchor, decode_single_shot};
pub use detector::{
    build_detector, DetectorSettings, GridAnchorDetector, PeopleDetector, SingleShotDetector,
};
pub use filter::PersonFilter;
pub use raw::RawOutput;
pub use result::{Detection, FrameResult, PersonDetection};

#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
