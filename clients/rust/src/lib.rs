//! Typed async client for the Instagate HTTP gateway.

mod client;
mod error;
mod types;

pub use client::{InstagateClient, InstagateClientBuilder};
pub use error::{ClientError, Result};
pub use instagate_sdk::{
    ClientSettings, DirectMessage, DownloadedFile, Hashtag, Location, Media, MediaKind, Story,
    StoryOptions, UploadFile, UploadOptions, User, UserShort, Usertag,
};
pub use types::{EncodedFile, ErrorBody, Health, LoginRequest};
