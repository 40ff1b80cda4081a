pub mod auth;
pub mod direct;
pub mod download;
pub mod extract;
pub mod hashtag;
pub mod insights;
pub mod media;
pub mod models;
pub mod story;
pub mod system;
pub mod transfer;
pub mod user;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use instagate_sdk::MediaKind;
use std::sync::Arc;

use crate::state::AppState;

type ApiRouter = Router<Arc<AppState>>;

/// Routes reachable without a bearer token.
pub fn system_routes() -> ApiRouter {
    Router::new()
        .route("/", get(system::index))
        .route("/version", get(system::version))
        .route("/health", get(system::health))
}

/// Every Instagram-facing route.
pub fn api_routes() -> ApiRouter {
    Router::new()
        .nest("/auth", auth_routes())
        .nest("/user", user_routes())
        .nest("/media", media_routes())
        .nest("/photo", media_kind_routes(MediaKind::Photo))
        .nest("/video", media_kind_routes(MediaKind::Video))
        .nest("/igtv", media_kind_routes(MediaKind::Igtv))
        .nest("/clip", media_kind_routes(MediaKind::Clip))
        .nest("/album", album_routes())
        .nest("/story", story_routes())
        .nest("/insights", insights_routes())
        .nest("/direct", direct_routes())
        .nest("/hashtag", hashtag_routes())
}

fn auth_routes() -> ApiRouter {
    Router::new()
        .route("/login", post(auth::login))
        .route("/relogin", post(auth::relogin))
        .route("/settings/get", get(auth::settings_get))
        .route("/settings/set", post(auth::settings_set))
        .route("/timeline_feed", get(auth::timeline_feed))
        .route("/logout", post(auth::logout))
}

fn user_routes() -> ApiRouter {
    Router::new()
        .route("/followers", post(user::followers))
        .route("/following", post(user::following))
        .route("/info", post(user::info))
        .route("/info_by_username", post(user::info_by_username))
        .route("/follow", post(user::follow))
        .route("/unfollow", post(user::unfollow))
        .route("/id_from_username", post(user::id_from_username))
        .route("/username_from_id", post(user::username_from_id))
        .route("/remove_follower", post(user::remove_follower))
        .route("/mute_posts_from_follow", post(user::mute_posts_from_follow))
        .route("/unmute_posts_from_follow", post(user::unmute_posts_from_follow))
        .route("/mute_stories_from_follow", post(user::mute_stories_from_follow))
        .route("/unmute_stories_from_follow", post(user::unmute_stories_from_follow))
}

fn media_routes() -> ApiRouter {
    Router::new()
        .route("/id", get(media::id))
        .route("/pk_from_code", get(media::pk_from_code))
        .route("/pk_from_url", get(media::pk_from_url))
        .route("/info", post(media::info))
        .route("/user_medias", post(media::user_medias))
        .route("/usertag_medias", post(media::usertag_medias))
        .route("/delete", post(media::delete))
        .route("/edit", post(media::edit))
        .route("/user", post(media::user))
        .route("/oembed", post(media::oembed))
        .route("/like", post(media::like))
        .route("/unlike", post(media::unlike))
        .route("/seen", post(media::seen))
        .route("/likers", post(media::likers))
        .route("/archive", post(media::archive))
        .route("/unarchive", post(media::unarchive))
}

fn media_kind_routes(kind: MediaKind) -> ApiRouter {
    let mut router = Router::new()
        .route("/download", post(transfer::download))
        .route("/download/by_url", post(transfer::download_by_url))
        .route("/upload", post(transfer::upload))
        .route("/upload/by_url", post(transfer::upload_by_url));
    if kind.is_story_kind() {
        router = router.route("/upload_to_story", post(transfer::upload_to_story));
    }
    router.layer(Extension(kind))
}

fn album_routes() -> ApiRouter {
    Router::new()
        .route("/download", post(transfer::download))
        .route("/download/by_urls", post(transfer::download_by_urls))
        .route("/upload", post(transfer::upload))
        .layer(Extension(MediaKind::Album))
}

fn story_routes() -> ApiRouter {
    Router::new()
        .route("/user_stories", post(story::user_stories))
        .route("/info", post(story::info))
        .route("/delete", post(story::delete))
        .route("/seen", post(story::seen))
        .route("/pk_from_url", get(story::pk_from_url))
        .route("/download", post(story::download))
        .route("/download/by_url", post(story::download_by_url))
}

fn insights_routes() -> ApiRouter {
    Router::new()
        .route("/media_feed_all", post(insights::media_feed_all))
        .route("/account", post(insights::account))
        .route("/media", post(insights::media))
}

fn direct_routes() -> ApiRouter {
    Router::new()
        .route("/send_by_username", post(direct::send_by_username))
        .route("/send_by_id", post(direct::send_by_id))
        .route("/send_to_username_list", post(direct::send_to_username_list))
        .route("/send_to_id_list", post(direct::send_to_id_list))
        .route("/send_photo_by_id", post(direct::send_photo_by_id))
        .route("/send_photo_by_username", post(direct::send_photo_by_username))
}

fn hashtag_routes() -> ApiRouter {
    Router::new()
        .route("/get_top_hashtags", post(hashtag::top))
        .route("/get_recent_hashtags", post(hashtag::recent))
        .route("/get_hashtag_info", post(hashtag::info))
}
