//! Instagate SDK
//!
//! The seam between the gateway and whatever library actually speaks the
//! Instagram private API. An engine provides a [`ClientFactory`]; every
//! logged-in account is an [`InstagramClient`] created by it.

mod client;
mod error;
pub mod ids;
mod types;

pub use client::{ClientFactory, InstagramClient};
pub use error::{EngineError, EngineResult};
pub use types::{
    ClientOptions, ClientSettings, DirectMessage, DownloadedFile, EngineInfo, Hashtag,
    InsightsQuery, Location, Media, MediaEdit, MediaKind, Resource, Story, StoryOptions,
    UploadFile, UploadOptions, User, UserShort, Usertag,
};
