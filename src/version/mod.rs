//! Version store module (spec §3, §4.5): resource identity, per-resource
//! locking, and the append-only version chain itself.

pub mod locks;
pub mod record;
pub mod store;

pub use record::{bump_version, ContentLocation, KeyProvider, ResourceKey, ResourceType, VersionInfo, VersionRecord};
pub use store::{SaveConfig, VersionStore};
