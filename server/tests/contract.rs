//! Contract tests for the gateway's HTTP API.
//!
//! Every test drives the real router over HTTP against the sandbox engine.

mod harness;

use harness::{TestOptions, TestServer, ALICE, BOB};
use instagate_core::{RemoteConfig, RemoteEngine};
use reqwest::{header, multipart, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn error_of(resp: reqwest::Response) -> (StatusCode, String, String) {
    let status = resp.status();
    let body: Value = resp.json().await.unwrap();
    (
        status,
        body["exc_type"].as_str().unwrap_or_default().to_string(),
        body["detail"].as_str().unwrap_or_default().to_string(),
    )
}

/// Medias of a user as returned by `/media/user_medias`.
async fn medias_of(server: &TestServer, session: &str, user_id: &str) -> Vec<Value> {
    server
        .post_form(
            "/media/user_medias",
            &[("sessionid", session), ("user_id", user_id)],
        )
        .await
        .as_array()
        .unwrap()
        .clone()
}

fn find_media<'a>(medias: &'a [Value], media_type: u64, product_type: &str) -> &'a Value {
    medias
        .iter()
        .find(|m| m["media_type"] == media_type && m["product_type"] == product_type)
        .unwrap_or_else(|| panic!("no media of type {media_type}/{product_type}"))
}

fn jpeg_part(name: &str) -> multipart::Part {
    multipart::Part::bytes(vec![0xFF, 0xD8, 0xFF, 0xE0, b'x'])
        .file_name(name.to_string())
        .mime_str("image/jpeg")
        .unwrap()
}

// ============================================================================
// System
// ============================================================================

#[tokio::test]
async fn system_routes() {
    let server = TestServer::start().await;

    let health: Value = server.get("/health").send().await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["engine"], "sandbox");

    let version: Value = server.get("/version").send().await.unwrap().json().await.unwrap();
    assert!(version["instagate"].is_string());
    assert!(version["sandbox"].is_string());

    let index: Value = server.get("/").send().await.unwrap().json().await.unwrap();
    assert_eq!(index["name"], "instagate");
    assert_eq!(index["sessions"], 0);
}

#[tokio::test]
async fn base_path_prefixes_every_route() {
    let server = TestServer::start_with(TestOptions {
        base_path: Some("/instagram/engine".to_string()),
        ..TestOptions::default()
    })
    .await;

    assert!(server.url.ends_with("/instagram/engine"));
    let session = server.login(ALICE).await;
    assert!(!session.is_empty());

    let bare = reqwest::get(format!("http://{}/health", server.addr)).await.unwrap();
    assert_eq!(bare.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Auth
// ============================================================================

#[tokio::test]
async fn login_returns_session_id() {
    let server = TestServer::start().await;
    let session = server.login(ALICE).await;

    assert!(session.starts_with("1001%3A"), "unexpected session id {session}");
    assert_eq!(server.registry.len().await, 1);

    let settings: Value = server
        .get("/auth/settings/get")
        .query(&[("sessionid", session.as_str())])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(settings["authorization_data"]["sessionid"], session.as_str());
    assert_eq!(settings["authorization_data"]["ds_user_id"], "1001");
}

#[tokio::test]
async fn login_failures_map_to_status_codes() {
    let server = TestServer::start().await;

    let resp = server
        .post("/auth/login")
        .form(&[("username", "alice"), ("password", "nope")])
        .send()
        .await
        .unwrap();
    let (status, exc_type, _) = error_of(resp).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(exc_type, "BadPassword");

    let resp = server
        .post("/auth/login")
        .form(&[("username", "mallory"), ("password", "x")])
        .send()
        .await
        .unwrap();
    let (status, exc_type, _) = error_of(resp).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(exc_type, "UserNotFound");

    let resp = server
        .post("/auth/login")
        .form(&[("username", "bob"), ("password", "bob-password")])
        .send()
        .await
        .unwrap();
    let (status, exc_type, _) = error_of(resp).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(exc_type, "TwoFactorRequired");

    let resp = server
        .post("/auth/login")
        .form(&[("username", "alice")])
        .send()
        .await
        .unwrap();
    let (status, exc_type, detail) = error_of(resp).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(exc_type, "ValidationError");
    assert!(detail.contains("password"), "detail was {detail}");

    let resp = server
        .post("/auth/login")
        .form(&[
            ("username", "alice"),
            ("password", "alice-password"),
            ("proxy", "ftp://proxy.local"),
        ])
        .send()
        .await
        .unwrap();
    let (status, exc_type, _) = error_of(resp).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(exc_type, "InvalidArgument");
}

#[tokio::test]
async fn unknown_session_is_unauthorized() {
    let server = TestServer::start().await;

    let resp = server
        .post("/user/info")
        .form(&[("sessionid", "1001%3Adoes-not-exist"), ("user_id", "1002")])
        .send()
        .await
        .unwrap();
    let (status, exc_type, detail) = error_of(resp).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(exc_type, "SessionNotFound");
    assert!(detail.contains("please relogin"));
}

#[tokio::test]
async fn relogin_keeps_session_usable() {
    let server = TestServer::start().await;
    let session = server.login(ALICE).await;

    let result = server
        .post_form("/auth/relogin", &[("sessionid", session.as_str())])
        .await;
    assert_eq!(result, Value::Bool(true));

    let user = server
        .post_form(
            "/user/info_by_username",
            &[("sessionid", session.as_str()), ("username", "bob")],
        )
        .await;
    assert_eq!(user["pk"], "1002");
}

#[tokio::test]
async fn settings_set_registers_a_session() {
    let server = TestServer::start().await;
    let session = server.login(ALICE).await;

    let settings = server
        .get("/auth/settings/get")
        .query(&[("sessionid", session.as_str())])
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let restored = server
        .post_form("/auth/settings/set", &[("settings", settings.as_str())])
        .await;
    assert_eq!(restored.as_str(), Some(session.as_str()));

    let resp = server
        .post("/auth/settings/set")
        .form(&[("settings", "[1, 2]")])
        .send()
        .await
        .unwrap();
    let (status, exc_type, _) = error_of(resp).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(exc_type, "InvalidArgument");
}

#[tokio::test]
async fn settings_set_reuses_the_existing_client() {
    let server = TestServer::start().await;
    let proxy = "socks5://127.0.0.1:1080";
    let session = server
        .post_form(
            "/auth/login",
            &[
                ("username", "alice"),
                ("password", "alice-password"),
                ("proxy", proxy),
            ],
        )
        .await
        .as_str()
        .unwrap()
        .to_string();
    let before = server.registry.get(&session).await.unwrap();

    let settings = server
        .get("/auth/settings/get")
        .query(&[("sessionid", session.as_str())])
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let result = server
        .post_form(
            "/auth/settings/set",
            &[("settings", settings.as_str()), ("sessionid", session.as_str())],
        )
        .await;
    assert_eq!(result.as_str(), Some(session.as_str()));

    let entry = server.registry.entry(&session).await.unwrap();
    assert!(Arc::ptr_eq(&entry.client, &before));
    assert_eq!(entry.proxy.as_deref(), Some(proxy));
    assert_eq!(server.registry.len().await, 1);

    let resp = server
        .post("/auth/settings/set")
        .form(&[("settings", settings.as_str()), ("sessionid", "1001%3Aunknown")])
        .send()
        .await
        .unwrap();
    let (status, exc_type, _) = error_of(resp).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(exc_type, "SessionNotFound");
}

#[tokio::test]
async fn declined_login_answers_false() {
    let engine = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/rpc/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": false })))
        .mount(&engine)
        .await;

    let remote = RemoteEngine::new(RemoteConfig::new(engine.uri())).unwrap();
    let server = TestServer::start_with(TestOptions {
        factory: Some(Arc::new(remote)),
        ..TestOptions::default()
    })
    .await;

    let result = server
        .post_form("/auth/login", &[("username", "alice"), ("password", "alice-password")])
        .await;
    assert_eq!(result, Value::Bool(false));
    assert!(server.registry.is_empty().await);
}

#[tokio::test]
async fn timeline_feed_lists_followed_accounts() {
    let server = TestServer::start().await;
    let session = server.login(ALICE).await;

    let feed: Value = server
        .get("/auth/timeline_feed")
        .query(&[("sessionid", session.as_str())])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let items = feed["feed_items"].as_array().unwrap();
    assert!(!items.is_empty());
    assert!(items
        .iter()
        .all(|item| item["media_or_ad"]["user"]["username"] != "carol"));
}

#[tokio::test]
async fn logout_evicts_session() {
    let server = TestServer::start().await;
    let session = server.login(ALICE).await;

    let result = server
        .post_form("/auth/logout", &[("sessionid", session.as_str())])
        .await;
    assert_eq!(result, Value::Bool(true));
    assert!(server.registry.is_empty().await);

    let resp = server
        .post("/auth/relogin")
        .form(&[("sessionid", session.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Users
// ============================================================================

#[tokio::test]
async fn user_lookups_and_follows() {
    let server = TestServer::start().await;
    let session = server.login(ALICE).await;
    let s = session.as_str();

    let id = server
        .post_form("/user/id_from_username", &[("sessionid", s), ("username", "carol")])
        .await;
    assert_eq!(id, "1003");

    let name = server
        .post_form("/user/username_from_id", &[("sessionid", s), ("user_id", "1002")])
        .await;
    assert_eq!(name, "bob");

    let followers = server
        .post_form("/user/followers", &[("sessionid", s), ("user_id", "1001")])
        .await;
    let followers = followers.as_object().unwrap();
    assert!(followers.contains_key("1002"));
    assert!(followers.contains_key("1003"));

    let one = server
        .post_form(
            "/user/followers",
            &[("sessionid", s), ("user_id", "1001"), ("amount", "1")],
        )
        .await;
    assert_eq!(one.as_object().unwrap().len(), 1);

    assert_eq!(
        server
            .post_form("/user/follow", &[("sessionid", s), ("user_id", "1003")])
            .await,
        true
    );
    let following = server
        .post_form("/user/following", &[("sessionid", s), ("user_id", "1001")])
        .await;
    assert!(following.as_object().unwrap().contains_key("1003"));

    assert_eq!(
        server
            .post_form("/user/unfollow", &[("sessionid", s), ("user_id", "1003")])
            .await,
        true
    );
    assert_eq!(
        server
            .post_form(
                "/user/mute_posts_from_follow",
                &[("sessionid", s), ("user_id", "1002")]
            )
            .await,
        true
    );
    assert_eq!(
        server
            .post_form(
                "/user/unmute_posts_from_follow",
                &[("sessionid", s), ("user_id", "1002")]
            )
            .await,
        true
    );

    let resp = server
        .post("/user/info")
        .form(&[("sessionid", s), ("user_id", "999999")])
        .send()
        .await
        .unwrap();
    let (status, exc_type, _) = error_of(resp).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(exc_type, "UserNotFound");
}

// ============================================================================
// Media
// ============================================================================

#[tokio::test]
async fn media_ids_without_session() {
    let server = TestServer::start().await;

    let pk: Value = server
        .get("/media/pk_from_code")
        .query(&[("code", "B1LbfVPlwIA")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(pk, "2110901750722920960");

    let pk: Value = server
        .get("/media/pk_from_url")
        .query(&[("url", "https://www.instagram.com/p/B1LbfVPlwIA/")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(pk, "2110901750722920960");

    let story_pk: Value = server
        .get("/story/pk_from_url")
        .query(&[("url", "https://www.instagram.com/stories/alice/2581281926631793076/")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(story_pk, "2581281926631793076");

    let resp = server
        .get("/media/pk_from_code")
        .query(&[("code", "not a code!")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn media_info_like_and_likers() {
    let server = TestServer::start().await;
    let alice = server.login(ALICE).await;
    let bob = server.login(BOB).await;

    let medias = medias_of(&server, &alice, "1001").await;
    let photo = find_media(&medias, 1, "feed");
    let pk = photo["pk"].as_str().unwrap();

    let media_id: Value = server
        .get("/media/id")
        .query(&[("sessionid", alice.as_str()), ("media_pk", pk)])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(media_id, format!("{pk}_1001"));
    let media_id = media_id.as_str().unwrap();

    let info = server
        .post_form("/media/info", &[("sessionid", bob.as_str()), ("pk", pk)])
        .await;
    assert_eq!(info["user"]["username"], "alice");
    let likes_before = info["like_count"].as_u64().unwrap();

    server
        .post_form("/media/like", &[("sessionid", alice.as_str()), ("media_id", media_id)])
        .await;
    let likers = server
        .post_form("/media/likers", &[("sessionid", bob.as_str()), ("media_id", media_id)])
        .await;
    assert_eq!(likers.as_array().unwrap().len() as u64, likes_before + 1);

    server
        .post_form("/media/unlike", &[("sessionid", alice.as_str()), ("media_id", media_id)])
        .await;
    let info = server
        .post_form("/media/info", &[("sessionid", bob.as_str()), ("pk", pk)])
        .await;
    assert_eq!(info["like_count"].as_u64().unwrap(), likes_before);

    let owner = server
        .post_form("/media/user", &[("sessionid", bob.as_str()), ("media_pk", pk)])
        .await;
    assert_eq!(owner["pk"], "1001");

    let seen = server
        .post_form(
            "/media/seen",
            &[
                ("sessionid", bob.as_str()),
                ("media_ids", media_id),
                ("media_ids", pk),
            ],
        )
        .await;
    assert_eq!(seen, true);
}

#[tokio::test]
async fn media_edit_archive_and_delete_are_owner_only() {
    let server = TestServer::start().await;
    let alice = server.login(ALICE).await;
    let bob = server.login(BOB).await;

    let medias = medias_of(&server, &alice, "1001").await;
    let video = find_media(&medias, 2, "feed");
    let pk = video["pk"].as_str().unwrap();

    let edited = server
        .post_form(
            "/media/edit",
            &[
                ("sessionid", alice.as_str()),
                ("media_id", pk),
                ("caption", "Edited #sunset"),
                (
                    "usertags",
                    r#"{"user": {"pk": "1002", "username": "bob"}, "x": 0.5, "y": 0.5}"#,
                ),
            ],
        )
        .await;
    assert_eq!(edited["caption_text"], "Edited #sunset");
    assert_eq!(edited["usertags"][0]["user"]["username"], "bob");

    let resp = server
        .post("/media/delete")
        .form(&[("sessionid", bob.as_str()), ("media_id", pk)])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    server
        .post_form("/media/archive", &[("sessionid", alice.as_str()), ("media_id", pk)])
        .await;
    let resp = server
        .post("/media/info")
        .form(&[("sessionid", bob.as_str()), ("pk", pk)])
        .send()
        .await
        .unwrap();
    let (status, exc_type, _) = error_of(resp).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(exc_type, "MediaNotFound");

    server
        .post_form("/media/unarchive", &[("sessionid", alice.as_str()), ("media_id", pk)])
        .await;
    server
        .post_form("/media/info", &[("sessionid", bob.as_str()), ("pk", pk)])
        .await;

    assert_eq!(
        server
            .post_form("/media/delete", &[("sessionid", alice.as_str()), ("media_id", pk)])
            .await,
        true
    );
    let remaining = medias_of(&server, &alice, "1001").await;
    assert_eq!(remaining.len(), medias.len() - 1);
}

#[tokio::test]
async fn usertag_medias_and_oembed() {
    let server = TestServer::start().await;
    let alice = server.login(ALICE).await;

    let tagged = server
        .post_form(
            "/media/usertag_medias",
            &[("sessionid", alice.as_str()), ("user_id", "1001")],
        )
        .await;
    assert!(tagged
        .as_array()
        .unwrap()
        .iter()
        .any(|m| m["user"]["username"] == "instagram"));

    let medias = medias_of(&server, &alice, "1001").await;
    let code = medias[0]["code"].as_str().unwrap();
    let oembed = server
        .post_form(
            "/media/oembed",
            &[
                ("sessionid", alice.as_str()),
                ("url", &format!("https://www.instagram.com/p/{code}/")),
            ],
        )
        .await;
    assert!(oembed.is_object());
}

// ============================================================================
// Transfer
// ============================================================================

#[tokio::test]
async fn photo_download_returns_attachment() {
    let server = TestServer::start().await;
    let alice = server.login(ALICE).await;
    let medias = medias_of(&server, &alice, "1001").await;
    let pk = find_media(&medias, 1, "feed")["pk"].as_str().unwrap().to_string();

    let resp = server
        .post("/photo/download")
        .form(&[("sessionid", alice.as_str()), ("media_pk", pk.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"alice_{pk}.jpg\"").as_str()
    );
    assert!(!resp.bytes().await.unwrap().is_empty());

    let resp = server
        .post("/video/download")
        .form(&[("sessionid", alice.as_str()), ("media_pk", pk.as_str())])
        .send()
        .await
        .unwrap();
    let (status, exc_type, _) = error_of(resp).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(exc_type, "InvalidArgument");
}

#[tokio::test]
async fn download_to_folder_returns_path() {
    let server = TestServer::start().await;
    let alice = server.login(ALICE).await;
    let medias = medias_of(&server, &alice, "1001").await;
    let pk = find_media(&medias, 2, "feed")["pk"].as_str().unwrap().to_string();

    let path = server
        .post_form(
            "/video/download",
            &[
                ("sessionid", alice.as_str()),
                ("media_pk", pk.as_str()),
                ("folder", "videos"),
                ("returnFile", "false"),
            ],
        )
        .await;
    let path = std::path::PathBuf::from(path.as_str().unwrap());
    assert!(path.starts_with(server.downloads.path().join("videos")));
    assert_eq!(path.extension().unwrap(), "mp4");
    assert!(path.exists());

    let resp = server
        .post("/video/download")
        .form(&[
            ("sessionid", alice.as_str()),
            ("media_pk", pk.as_str()),
            ("folder", "../escape"),
            ("returnFile", "false"),
        ])
        .send()
        .await
        .unwrap();
    let (status, exc_type, _) = error_of(resp).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(exc_type, "InvalidArgument");
}

#[tokio::test]
async fn album_download_and_by_urls() {
    let server = TestServer::start().await;
    let alice = server.login(ALICE).await;
    let medias = medias_of(&server, &alice, "1001").await;
    let album = find_media(&medias, 8, "feed");
    let pk = album["pk"].as_str().unwrap();

    let files = server
        .post_form("/album/download", &[("sessionid", alice.as_str()), ("media_pk", pk)])
        .await;
    let files = files.as_array().unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0]["content_type"], "image/jpeg");
    assert!(files[0]["size"].as_u64().unwrap() > 0);

    let urls: Vec<&str> = album["resources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["thumbnail_url"].as_str().unwrap())
        .collect();
    let mut form = vec![
        ("sessionid", alice.as_str()),
        ("folder", "album"),
        ("returnFile", "false"),
    ];
    form.extend(urls.iter().map(|u| ("urls", *u)));
    let paths = server.post_form("/album/download/by_urls", &form).await;
    assert_eq!(paths.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn photo_upload_and_upload_by_url() {
    let server = TestServer::start().await;
    let alice = server.login(ALICE).await;

    let form = multipart::Form::new()
        .text("sessionid", alice.clone())
        .text("caption", "Fresh upload #sunset")
        .text(
            "location",
            r#"{"name": "Venice Beach", "lat": 33.98, "lng": -118.47}"#,
        )
        .part("file", jpeg_part("upload.jpg"));
    let resp = server.post("/photo/upload").multipart(form).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let media: Value = resp.json().await.unwrap();
    assert_eq!(media["caption_text"], "Fresh upload #sunset");
    assert_eq!(media["media_type"], 1);
    assert_eq!(media["location"]["name"], "Venice Beach");

    let url = media["thumbnail_url"].as_str().unwrap();
    let copy = server
        .post_form(
            "/photo/upload/by_url",
            &[("sessionid", alice.as_str()), ("url", url), ("caption", "Again")],
        )
        .await;
    assert_eq!(copy["caption_text"], "Again");
    assert_ne!(copy["pk"], media["pk"]);

    let form = multipart::Form::new().text("sessionid", alice.clone());
    let resp = server.post("/photo/upload").multipart(form).send().await.unwrap();
    let (status, exc_type, _) = error_of(resp).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(exc_type, "ValidationError");
}

#[tokio::test]
async fn album_upload_needs_several_files() {
    let server = TestServer::start().await;
    let alice = server.login(ALICE).await;

    let form = multipart::Form::new()
        .text("sessionid", alice.clone())
        .text("caption", "Trip")
        .part("files", jpeg_part("1.jpg"))
        .part("files", jpeg_part("2.jpg"))
        .part("files", jpeg_part("3.jpg"));
    let resp = server.post("/album/upload").multipart(form).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let media: Value = resp.json().await.unwrap();
    assert_eq!(media["media_type"], 8);
    assert_eq!(media["resources"].as_array().unwrap().len(), 3);

    let form = multipart::Form::new()
        .text("sessionid", alice.clone())
        .part("files", jpeg_part("only.jpg"));
    let resp = server.post("/album/upload").multipart(form).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_to_story_only_for_photo_and_video() {
    let server = TestServer::start().await;
    let alice = server.login(ALICE).await;

    let form = multipart::Form::new()
        .text("sessionid", alice.clone())
        .text("caption", "Story time")
        .text("mentions", "1002")
        .text("links", "https://example.com")
        .part("file", jpeg_part("story.jpg"));
    let resp = server
        .post("/photo/upload_to_story")
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let story: Value = resp.json().await.unwrap();
    assert_eq!(story["mentions"][0]["username"], "bob");
    assert_eq!(story["links"][0], "https://example.com");

    let resp = server
        .post("/igtv/upload_to_story")
        .multipart(multipart::Form::new().text("sessionid", alice.clone()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Stories
// ============================================================================

#[tokio::test]
async fn stories_roundtrip() {
    let server = TestServer::start().await;
    let alice = server.login(ALICE).await;
    let bob = server.login(BOB).await;

    let stories = server
        .post_form(
            "/story/user_stories",
            &[("sessionid", bob.as_str()), ("user_id", "1001")],
        )
        .await;
    let story = stories.as_array().unwrap()[0].clone();
    let story_pk = story["pk"].as_str().unwrap();

    let info = server
        .post_form("/story/info", &[("sessionid", bob.as_str()), ("story_pk", story_pk)])
        .await;
    assert_eq!(info["user"]["username"], "alice");

    assert_eq!(
        server
            .post_form("/story/seen", &[("sessionid", bob.as_str()), ("story_pks", story_pk)])
            .await,
        true
    );

    let resp = server
        .post("/story/download")
        .form(&[
            ("sessionid", bob.as_str()),
            ("story_pk", story_pk),
            ("filename", "saved"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"saved.jpg\""
    );

    let resp = server
        .post("/story/delete")
        .form(&[("sessionid", bob.as_str()), ("story_pk", story_pk)])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert_eq!(
        server
            .post_form("/story/delete", &[("sessionid", alice.as_str()), ("story_pk", story_pk)])
            .await,
        true
    );
    let resp = server
        .post("/story/info")
        .form(&[("sessionid", bob.as_str()), ("story_pk", story_pk)])
        .send()
        .await
        .unwrap();
    let (status, exc_type, _) = error_of(resp).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(exc_type, "StoryNotFound");
}

// ============================================================================
// Insights, direct, hashtags
// ============================================================================

#[tokio::test]
async fn insights_for_own_account() {
    let server = TestServer::start().await;
    let alice = server.login(ALICE).await;

    let account = server
        .post_form("/insights/account", &[("sessionid", alice.as_str())])
        .await;
    assert_eq!(account["account_type"], "PERSONAL");

    let feed = server
        .post_form(
            "/insights/media_feed_all",
            &[("sessionid", alice.as_str()), ("count", "2")],
        )
        .await;
    assert_eq!(feed.as_array().unwrap().len(), 2);

    let resp = server
        .post("/insights/media_feed_all")
        .form(&[("sessionid", alice.as_str()), ("time_frame", "FOREVER")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let medias = medias_of(&server, &alice, "1001").await;
    let pk = medias[0]["pk"].as_str().unwrap();
    let media = server
        .post_form("/insights/media", &[("sessionid", alice.as_str()), ("media_pk", pk)])
        .await;
    assert!(media.is_object());
}

#[tokio::test]
async fn direct_messages() {
    let server = TestServer::start().await;
    let alice = server.login(ALICE).await;
    let s = alice.as_str();

    let message = server
        .post_form(
            "/direct/send_by_username",
            &[("sessionid", s), ("target_username", "bob"), ("message_body", "hi bob")],
        )
        .await;
    assert_eq!(message["text"], "hi bob");
    assert_eq!(message["user_id"], "1001");

    let again = server
        .post_form(
            "/direct/send_by_id",
            &[("sessionid", s), ("target_userid", "1002"), ("message_body", "still there?")],
        )
        .await;
    assert_eq!(again["thread_id"], message["thread_id"]);

    let group = server
        .post_form(
            "/direct/send_to_username_list",
            &[
                ("sessionid", s),
                ("target_usernames_list", "bob"),
                ("target_usernames_list", "carol"),
                ("message_body", "group hello"),
            ],
        )
        .await;
    assert_ne!(group["thread_id"], message["thread_id"]);

    let by_ids = server
        .post_form(
            "/direct/send_to_id_list",
            &[
                ("sessionid", s),
                ("target_ids_list", "1002"),
                ("target_ids_list", "1003"),
                ("message_body", "same group"),
            ],
        )
        .await;
    assert_eq!(by_ids["thread_id"], group["thread_id"]);

    let form = multipart::Form::new()
        .text("sessionid", alice.clone())
        .text("username", "bob")
        .part("file", jpeg_part("pic.jpg"));
    let resp = server
        .post("/direct/send_photo_by_username")
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let photo: Value = resp.json().await.unwrap();
    assert_eq!(photo["thread_id"], message["thread_id"]);

    let resp = server
        .post("/direct/send_by_username")
        .form(&[("sessionid", s), ("target_username", "nobody"), ("message_body", "?")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn hashtags_default_amount_and_query_override() {
    let server = TestServer::start().await;
    let alice = server.login(ALICE).await;
    let s = alice.as_str();

    let info = server
        .post_form("/hashtag/get_hashtag_info", &[("sessionid", s), ("name", "sunset")])
        .await;
    assert_eq!(info["name"], "sunset");

    let top = server
        .post_form("/hashtag/get_top_hashtags", &[("sessionid", s), ("name", "sunset")])
        .await;
    let top = top.as_array().unwrap();
    assert!(top.len() >= 2 && top.len() <= 9);
    assert!(top[0]["like_count"].as_u64() >= top[1]["like_count"].as_u64());

    let one = server
        .post_form(
            "/hashtag/get_recent_hashtags?amount=1",
            &[("sessionid", s), ("name", "#sunset")],
        )
        .await;
    assert_eq!(one.as_array().unwrap().len(), 1);

    let resp = server
        .post("/hashtag/get_hashtag_info")
        .form(&[("sessionid", s), ("name", "nosuchtag")])
        .send()
        .await
        .unwrap();
    let (status, exc_type, _) = error_of(resp).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(exc_type, "HashtagNotFound");
}

// ============================================================================
// Auth middleware and rate limits
// ============================================================================

#[tokio::test]
async fn bearer_token_guards_api_routes() {
    let server = TestServer::start_with_auth("integration-secret").await;

    let health = reqwest::get(server.endpoint("/health")).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    let resp = reqwest::Client::new()
        .post(server.endpoint("/auth/login"))
        .form(&[("username", "alice"), ("password", "alice-password")])
        .send()
        .await
        .unwrap();
    let (status, exc_type, _) = error_of(resp).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(exc_type, "Unauthorized");

    let resp = reqwest::Client::new()
        .post(server.endpoint("/auth/login"))
        .bearer_auth("not-a-jwt")
        .form(&[("username", "alice"), ("password", "alice-password")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let session = server.login(ALICE).await;
    assert!(!session.is_empty());
}

#[tokio::test]
async fn session_rate_limit() {
    let server = TestServer::start_with(TestOptions {
        session_qps: Some(2),
        ..TestOptions::default()
    })
    .await;
    let alice = server.login(ALICE).await;

    let mut statuses = Vec::new();
    for _ in 0..4 {
        let resp = server
            .post("/user/info")
            .form(&[("sessionid", alice.as_str()), ("user_id", "1002")])
            .send()
            .await
            .unwrap();
        statuses.push(resp.status());
    }
    assert!(statuses.contains(&StatusCode::TOO_MANY_REQUESTS));

    let bob = server.login(BOB).await;
    let resp = server
        .post("/user/info")
        .form(&[("sessionid", bob.as_str()), ("user_id", "1001")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_sessions_do_not_spend_budget() {
    let server = TestServer::start_with(TestOptions {
        session_qps: Some(1),
        ..TestOptions::default()
    })
    .await;

    for _ in 0..3 {
        let resp = server
            .post("/user/info")
            .form(&[("sessionid", "1001%3Aforged"), ("user_id", "1002")])
            .send()
            .await
            .unwrap();
        let (status, exc_type, _) = error_of(resp).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(exc_type, "SessionNotFound");
    }
}
