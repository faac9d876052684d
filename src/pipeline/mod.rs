//! The packaging pipeline: icon synthesis, environment preparation,
//! bundle construction, signing, disk-image packaging, and notarization.

pub mod bundle;
pub mod context;
pub mod dmg;
pub mod env;
pub mod error;
pub mod icon;
pub mod manifest;
pub mod notarize;
pub mod runner;
pub mod sign;
pub mod utils;

pub use context::BuildContext;
pub use error::{Error, Result};
pub use manifest::{Arch, BuildManifest};
pub use notarize::NotaryCredentials;
pub use runner::{Artifact, BuildSummary, Pipeline};
pub use sign::{SignReport, SignStatus};
