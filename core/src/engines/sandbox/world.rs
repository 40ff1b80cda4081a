//! Shared in-memory state behind every sandbox client.

use bytes::Bytes;
use instagate_sdk::ids;
use instagate_sdk::{
    DirectMessage, EngineError, EngineResult, Location, Media, MediaKind, Resource, Story, User,
    UserShort, Usertag,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub(super) const SANDBOX_HOST: &str = "https://sandbox.instagate.local";

/// First pk handed out to medias and stories.
const FIRST_MEDIA_PK: u64 = 2_110_901_750_722_920_960;

/// Fake clock start, advanced by a minute for every new item.
const EPOCH_START: u64 = 1_700_000_000;

/// Credentials accepted by the sandbox login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxAccount {
    pub username: String,
    pub password: String,
    /// When set, login requires this two-factor code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_code: Option<String>,
}

impl SandboxAccount {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            verification_code: None,
        }
    }

    #[must_use]
    pub fn with_verification_code(mut self, code: impl Into<String>) -> Self {
        self.verification_code = Some(code.into());
        self
    }
}

#[must_use]
pub fn default_accounts() -> Vec<SandboxAccount> {
    vec![
        SandboxAccount::new("alice", "alice-password"),
        SandboxAccount::new("bob", "bob-password").with_verification_code("123456"),
    ]
}

pub(super) struct StoredMedia {
    pub media: Media,
    pub files: Vec<Bytes>,
    pub archived: bool,
}

pub(super) struct StoredStory {
    pub story: Story,
    pub data: Bytes,
}

/// Parameters for a new media.
pub(super) struct NewMedia {
    pub kind: MediaKind,
    pub caption: String,
    pub title: Option<String>,
    pub usertags: Vec<Usertag>,
    pub location: Option<Location>,
    /// One entry per album resource, a single entry otherwise.
    pub files: Vec<(Bytes, u8)>,
}

pub(super) struct World {
    pub accounts: HashMap<String, SandboxAccount>,
    pub users: BTreeMap<String, User>,
    /// Session id -> user pk.
    pub sessions: HashMap<String, String>,
    pub medias: BTreeMap<String, StoredMedia>,
    pub stories: BTreeMap<String, StoredStory>,
    /// Hashtag name -> id.
    pub hashtags: BTreeMap<String, String>,
    /// (follower pk, followee pk)
    pub follows: BTreeSet<(String, String)>,
    /// (media pk, user pk)
    pub likes: BTreeSet<(String, String)>,
    /// (viewer pk, media or story pk)
    pub seen: BTreeSet<(String, String)>,
    pub muted_posts: BTreeSet<(String, String)>,
    pub muted_stories: BTreeSet<(String, String)>,
    /// Sorted participant pks -> thread id.
    pub threads: BTreeMap<Vec<String>, String>,
    pub messages: Vec<DirectMessage>,
    /// Content served by `*_download_by_url`, keyed by URL.
    pub blobs: HashMap<String, Bytes>,
    next_pk: u64,
    clock: u64,
}

pub(super) fn fake_jpeg(label: &str) -> Bytes {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
    data.extend_from_slice(label.as_bytes());
    data.extend_from_slice(&[0xFF, 0xD9]);
    Bytes::from(data)
}

pub(super) fn fake_mp4(label: &str) -> Bytes {
    let mut data = b"\x00\x00\x00\x18ftypmp42".to_vec();
    data.extend_from_slice(label.as_bytes());
    Bytes::from(data)
}

/// Lowercased hashtags mentioned in a caption, without the leading `#`.
pub(super) fn hashtags_in(caption: &str) -> BTreeSet<String> {
    caption
        .split_whitespace()
        .filter_map(|word| word.strip_prefix('#'))
        .map(|tag| {
            tag.chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|tag| !tag.is_empty())
        .collect()
}

pub(super) fn normalize_hashtag(name: &str) -> String {
    name.trim().trim_start_matches('#').to_lowercase()
}

fn extension_for(media_type: u8) -> &'static str {
    if media_type == 2 {
        "mp4"
    } else {
        "jpg"
    }
}

impl World {
    pub fn seeded(accounts: Vec<SandboxAccount>) -> Self {
        let mut world = Self {
            accounts: HashMap::new(),
            users: BTreeMap::new(),
            sessions: HashMap::new(),
            medias: BTreeMap::new(),
            stories: BTreeMap::new(),
            hashtags: BTreeMap::new(),
            follows: BTreeSet::new(),
            likes: BTreeSet::new(),
            seen: BTreeSet::new(),
            muted_posts: BTreeSet::new(),
            muted_stories: BTreeSet::new(),
            threads: BTreeMap::new(),
            messages: Vec::new(),
            blobs: HashMap::new(),
            next_pk: FIRST_MEDIA_PK,
            clock: EPOCH_START,
        };

        world.add_user("1001", "alice", "Alice Liddell", false, "Chasing sunsets");
        world.add_user("1002", "bob", "Bob Builder", false, "Behind the scenes");
        world.add_user("1003", "carol", "Carol Danvers", true, "");
        world.add_user("25025320", "instagram", "Instagram", false, "Discover what's new");
        if let Some(user) = world.users.get_mut("25025320") {
            user.is_verified = true;
            user.is_business = true;
            user.external_url = Some("https://about.instagram.com".to_string());
        }

        let mut extra_pk = 2000;
        for account in accounts {
            if world.find_username(&account.username).is_none() {
                extra_pk += 1;
                let pk = extra_pk.to_string();
                world.add_user(&pk, &account.username, &account.username, false, "");
            }
            world
                .accounts
                .insert(account.username.to_lowercase(), account);
        }

        for (follower, followee) in [
            ("1002", "1001"),
            ("1003", "1001"),
            ("1001", "1002"),
            ("1001", "25025320"),
            ("1003", "25025320"),
        ] {
            world
                .follows
                .insert((follower.to_string(), followee.to_string()));
        }

        let bob = world.short("1002");
        let alice = world.short("1001");

        let pier = world.add_media(
            "1001",
            NewMedia {
                kind: MediaKind::Photo,
                caption: "Golden hour at the pier #sunset #travel".to_string(),
                title: None,
                usertags: bob
                    .clone()
                    .map(|user| vec![Usertag { user, x: 0.5, y: 0.5 }])
                    .unwrap_or_default(),
                location: Some(Location {
                    pk: Some(213_385_402),
                    name: "Santa Monica Pier".to_string(),
                    address: Some("200 Santa Monica Pier".to_string()),
                    lat: Some(34.0092),
                    lng: Some(-118.4976),
                }),
                files: vec![(fake_jpeg("pier"), 1)],
            },
        );
        world.add_media(
            "1001",
            NewMedia {
                kind: MediaKind::Video,
                caption: "Timelapse #sunset".to_string(),
                title: None,
                usertags: Vec::new(),
                location: None,
                files: vec![(fake_mp4("timelapse"), 2)],
            },
        );
        world.add_media(
            "1001",
            NewMedia {
                kind: MediaKind::Album,
                caption: "Weekend #travel".to_string(),
                title: None,
                usertags: Vec::new(),
                location: None,
                files: vec![(fake_jpeg("weekend-1"), 1), (fake_jpeg("weekend-2"), 1)],
            },
        );
        world.add_media(
            "1002",
            NewMedia {
                kind: MediaKind::Igtv,
                caption: "How we built it #behindthescenes".to_string(),
                title: Some("Making of".to_string()),
                usertags: Vec::new(),
                location: None,
                files: vec![(fake_mp4("making-of"), 2)],
            },
        );
        world.add_media(
            "1003",
            NewMedia {
                kind: MediaKind::Clip,
                caption: "New routine #dance".to_string(),
                title: None,
                usertags: Vec::new(),
                location: None,
                files: vec![(fake_mp4("routine"), 2)],
            },
        );
        let featured = world.add_media(
            "25025320",
            NewMedia {
                kind: MediaKind::Photo,
                caption: "Photo of the day #sunset".to_string(),
                title: None,
                usertags: alice
                    .map(|user| vec![Usertag { user, x: 0.25, y: 0.75 }])
                    .unwrap_or_default(),
                location: None,
                files: vec![(fake_jpeg("potd"), 1)],
            },
        );

        for liker in ["1002", "1003"] {
            world.likes.insert((pier.pk.clone(), liker.to_string()));
        }
        for liker in ["1001", "1002", "1003"] {
            world.likes.insert((featured.pk.clone(), liker.to_string()));
        }

        world.add_story(
            "1001",
            MediaKind::Photo,
            fake_jpeg("story-alice"),
            bob.into_iter().collect(),
            Vec::new(),
            Vec::new(),
        );
        world.add_story(
            "1002",
            MediaKind::Video,
            fake_mp4("story-bob"),
            Vec::new(),
            vec!["behindthescenes".to_string()],
            vec!["https://example.com/making-of".to_string()],
        );

        world
    }

    fn add_user(&mut self, pk: &str, username: &str, full_name: &str, private: bool, bio: &str) {
        let pic = format!("{SANDBOX_HOST}/users/{pk}.jpg");
        self.blobs.insert(pic.clone(), fake_jpeg(username));
        self.users.insert(
            pk.to_string(),
            User {
                pk: pk.to_string(),
                username: username.to_string(),
                full_name: full_name.to_string(),
                is_private: private,
                is_verified: false,
                is_business: false,
                profile_pic_url: Some(pic),
                media_count: 0,
                follower_count: 0,
                following_count: 0,
                biography: bio.to_string(),
                external_url: None,
            },
        );
    }

    pub fn next_pk(&mut self) -> String {
        let pk = self.next_pk;
        self.next_pk += 1;
        pk.to_string()
    }

    pub fn tick(&mut self) -> u64 {
        self.clock += 60;
        self.clock
    }

    pub fn find_username(&self, username: &str) -> Option<&User> {
        self.users
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username.trim_start_matches('@')))
    }

    pub fn user_by_username(&self, username: &str) -> EngineResult<User> {
        let user = self
            .find_username(username)
            .ok_or_else(|| EngineError::UserNotFound(username.to_string()))?;
        Ok(self.with_counts(user))
    }

    pub fn user(&self, pk: &str) -> EngineResult<User> {
        let user = self
            .users
            .get(pk)
            .ok_or_else(|| EngineError::UserNotFound(pk.to_string()))?;
        Ok(self.with_counts(user))
    }

    pub fn short(&self, pk: &str) -> Option<UserShort> {
        self.users.get(pk).map(User::short)
    }

    fn with_counts(&self, user: &User) -> User {
        let mut user = user.clone();
        user.follower_count = self.follows.iter().filter(|(_, to)| *to == user.pk).count() as u64;
        user.following_count = self
            .follows
            .iter()
            .filter(|(from, _)| *from == user.pk)
            .count() as u64;
        user.media_count = self
            .medias
            .values()
            .filter(|m| m.media.user.pk == user.pk && !m.archived)
            .count() as u64;
        user
    }

    /// Media as callers see it, with live like counts.
    pub fn media_view(&self, stored: &StoredMedia) -> Media {
        let mut media = stored.media.clone();
        media.like_count = self.likes.iter().filter(|(m, _)| *m == media.pk).count() as u64;
        media
    }

    pub fn media(&self, media_id: &str) -> EngineResult<&StoredMedia> {
        let pk = ids::media_pk_from_id(media_id);
        self.medias
            .get(pk)
            .ok_or_else(|| EngineError::MediaNotFound(media_id.to_string()))
    }

    pub fn media_mut(&mut self, media_id: &str) -> EngineResult<&mut StoredMedia> {
        let pk = ids::media_pk_from_id(media_id);
        self.medias
            .get_mut(pk)
            .ok_or_else(|| EngineError::MediaNotFound(media_id.to_string()))
    }

    pub fn story(&self, story_pk: &str) -> EngineResult<&StoredStory> {
        let pk = ids::media_pk_from_id(story_pk);
        self.stories
            .get(pk)
            .ok_or_else(|| EngineError::StoryNotFound(story_pk.to_string()))
    }

    /// Published (not archived) medias matching a filter, newest first.
    pub fn visible_medias<F>(&self, filter: F) -> Vec<Media>
    where
        F: Fn(&Media) -> bool,
    {
        let mut medias: Vec<Media> = self
            .medias
            .values()
            .filter(|m| !m.archived && filter(&m.media))
            .map(|m| self.media_view(m))
            .collect();
        medias.sort_by(|a, b| b.taken_at.cmp(&a.taken_at).then(b.pk.cmp(&a.pk)));
        medias
    }

    pub fn register_hashtags(&mut self, caption: &str) {
        for tag in hashtags_in(caption) {
            if !self.hashtags.contains_key(&tag) {
                let id = format!("1784{:013}", self.hashtags.len() + 1);
                self.hashtags.insert(tag, id);
            }
        }
    }

    pub fn add_media(&mut self, owner_pk: &str, new: NewMedia) -> Media {
        let pk = self.next_pk();
        let taken_at = self.tick();
        let user = self.short(owner_pk).unwrap_or_else(|| UserShort {
            pk: owner_pk.to_string(),
            username: owner_pk.to_string(),
            full_name: String::new(),
            profile_pic_url: None,
            is_private: false,
            is_verified: false,
        });

        let thumbnail_url = format!("{SANDBOX_HOST}/media/{pk}.jpg");
        let mut video_url = None;
        let mut resources = Vec::new();

        if new.kind == MediaKind::Album {
            for (i, (data, media_type)) in new.files.iter().enumerate() {
                let resource_pk = format!("{pk}{i}");
                let url = format!(
                    "{SANDBOX_HOST}/media/{resource_pk}.{}",
                    extension_for(*media_type)
                );
                self.blobs.insert(url.clone(), data.clone());
                let (thumb, video) = if *media_type == 2 {
                    (None, Some(url))
                } else {
                    (Some(url), None)
                };
                resources.push(Resource {
                    pk: resource_pk,
                    media_type: *media_type,
                    thumbnail_url: thumb,
                    video_url: video,
                });
            }
            if let Some((first, _)) = new.files.first() {
                self.blobs.insert(thumbnail_url.clone(), first.clone());
            }
        } else if let Some((data, _)) = new.files.first() {
            if new.kind.media_type() == 2 {
                let url = format!("{SANDBOX_HOST}/media/{pk}.mp4");
                self.blobs.insert(url.clone(), data.clone());
                self.blobs.insert(thumbnail_url.clone(), fake_jpeg(&pk));
                video_url = Some(url);
            } else {
                self.blobs.insert(thumbnail_url.clone(), data.clone());
            }
        }

        let code = ids::code_from_media_pk(&pk).unwrap_or_default();
        let media = Media {
            id: format!("{pk}_{owner_pk}"),
            pk: pk.clone(),
            code,
            taken_at,
            media_type: new.kind.media_type(),
            product_type: new.kind.product_type().to_string(),
            user,
            caption_text: new.caption,
            title: new.title,
            thumbnail_url: Some(thumbnail_url),
            video_url,
            like_count: 0,
            comment_count: 0,
            usertags: new.usertags,
            location: new.location,
            resources,
        };

        self.register_hashtags(&media.caption_text);
        self.medias.insert(
            pk,
            StoredMedia {
                media: media.clone(),
                files: new.files.into_iter().map(|(data, _)| data).collect(),
                archived: false,
            },
        );
        media
    }

    pub fn add_story(
        &mut self,
        owner_pk: &str,
        kind: MediaKind,
        data: Bytes,
        mentions: Vec<UserShort>,
        hashtags: Vec<String>,
        links: Vec<String>,
    ) -> Story {
        let pk = self.next_pk();
        let taken_at = self.tick();
        let ext = kind.extension();
        let url = format!("{SANDBOX_HOST}/stories/{pk}.{ext}");
        self.blobs.insert(url.clone(), data.clone());
        let (thumbnail_url, video_url) = if kind == MediaKind::Video {
            let thumb = format!("{SANDBOX_HOST}/stories/{pk}.jpg");
            self.blobs.insert(thumb.clone(), fake_jpeg(&pk));
            (Some(thumb), Some(url))
        } else {
            (Some(url), None)
        };

        let user = self.short(owner_pk).unwrap_or_else(|| UserShort {
            pk: owner_pk.to_string(),
            username: owner_pk.to_string(),
            full_name: String::new(),
            profile_pic_url: None,
            is_private: false,
            is_verified: false,
        });

        let story = Story {
            id: format!("{pk}_{owner_pk}"),
            code: ids::code_from_media_pk(&pk).unwrap_or_default(),
            pk: pk.clone(),
            taken_at,
            media_type: kind.media_type(),
            user,
            thumbnail_url,
            video_url,
            mentions,
            hashtags,
            links,
        };
        self.stories.insert(
            pk,
            StoredStory {
                story: story.clone(),
                data,
            },
        );
        story
    }

    /// Thread shared by exactly these participants, created on first use.
    pub fn thread_for(&mut self, mut participants: Vec<String>) -> String {
        participants.sort();
        participants.dedup();
        let next = format!("3400{:014}", self.threads.len() + 1);
        self.threads.entry(participants).or_insert(next).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashtags_are_extracted_and_normalized() {
        let tags = hashtags_in("Golden #Sunset, at the #pier! #sunset #");
        assert_eq!(
            tags.into_iter().collect::<Vec<_>>(),
            vec!["pier".to_string(), "sunset".to_string()]
        );
        assert_eq!(normalize_hashtag(" #Travel "), "travel");
    }

    #[test]
    fn seeded_world_is_consistent() {
        let world = World::seeded(default_accounts());
        let alice = world.user_by_username("alice").unwrap();
        assert_eq!(alice.follower_count, 2);
        assert_eq!(alice.following_count, 2);
        assert_eq!(alice.media_count, 3);
        assert!(world.hashtags.contains_key("sunset"));

        for stored in world.medias.values() {
            let code = &stored.media.code;
            assert_eq!(ids::media_pk_from_code(code).unwrap(), stored.media.pk);
        }
    }

    #[test]
    fn extra_accounts_get_users() {
        let world = World::seeded(vec![SandboxAccount::new("dave", "pw")]);
        assert!(world.find_username("dave").is_some());
        assert!(world.accounts.contains_key("dave"));
    }

    #[test]
    fn threads_are_keyed_by_participants() {
        let mut world = World::seeded(default_accounts());
        let a = world.thread_for(vec!["1001".into(), "1002".into()]);
        let b = world.thread_for(vec!["1002".into(), "1001".into()]);
        let c = world.thread_for(vec!["1001".into(), "1003".into()]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
