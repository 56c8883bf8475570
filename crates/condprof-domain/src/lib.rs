#![deny(clippy::all, warnings)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod changelog;
pub mod customization;
pub mod metadata;
pub mod naming;

pub use changelog::{Changelog, ChangelogEntry, CHANGELOG_FILENAME};
pub use customization::{
    load_customizations, Customization, CustomizationRegistry, ScenarioOptions,
};
pub use metadata::{Metadata, MetadataBuilder, METADATA_FILENAME};
pub use naming::{ProfileKey, ARCHIVE_EXTENSION};
