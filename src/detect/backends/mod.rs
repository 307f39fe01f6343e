pub mod scripted;
pub mod synthetic;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use scripted::ScriptedBackend;
pub use synthetic::SyntheticCrowdBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;
