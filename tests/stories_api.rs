mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::json;

use fabula::models::ModelError;

use common::build_test_app;

const DOG: &[u8] = b"dog";
const BALL: &[u8] = b"ball";

#[tokio::test]
async fn full_story_lifecycle() {
    let app = build_test_app();
    let cookie = app.login_with_key("ada@example.com").await;

    // Upload two images: each gets a caption, in order
    let created = app
        .upload("Park day", &[("dog.png", DOG), ("ball.png", BALL)], Some(&cookie))
        .await;
    assert_eq!(created.status, StatusCode::CREATED, "{:?}", created.body);
    let story = &created.body;
    let id = story["id"].as_str().unwrap().to_string();
    assert_eq!(story["title"], "Park day");
    assert_eq!(story["images"].as_array().unwrap().len(), 2);
    assert_eq!(
        story["imageSummaries"],
        json!(["caption of dog", "caption of ball"])
    );
    assert_eq!(story["stage"], "draft");
    assert_eq!(story["isImproved"], false);
    assert!(story.get("generatedStory").is_none());

    // Generate a narrative from the captions
    let generated = app
        .post(&format!("/api/stories/{}/generate", id), json!({}), Some(&cookie))
        .await;
    assert_eq!(generated.status, StatusCode::OK);
    let first_text = generated.body["generatedStory"].as_str().unwrap().to_string();
    assert!(first_text.contains("caption of dog"));
    assert_eq!(generated.body["stage"], "generated");

    // First narration synthesizes audio
    let narrated = app
        .post(&format!("/api/stories/{}/narrate", id), json!({}), Some(&cookie))
        .await;
    assert_eq!(narrated.status, StatusCode::OK);
    assert_eq!(narrated.body["regenerated"], true);
    let first_audio = narrated.body["audioPath"].as_str().unwrap().to_string();
    assert!(first_audio.starts_with("uploads/audio/"));
    assert_eq!(narrated.body["story"]["stage"], "narrated");

    // Second narration reuses it
    let cached = app
        .post(&format!("/api/stories/{}/narrate", id), json!({}), Some(&cookie))
        .await;
    assert_eq!(cached.body["regenerated"], false);
    assert_eq!(cached.body["audioPath"], first_audio.as_str());
    assert_eq!(app.model.speech_count(), 1);

    // Improving marks the audio stale without resynthesizing
    let improved = app
        .post(
            &format!("/api/stories/{}/improve", id),
            json!({ "instruction": "make it spooky" }),
            Some(&cookie),
        )
        .await;
    assert_eq!(improved.status, StatusCode::OK);
    assert_eq!(improved.body["isImproved"], true);
    assert_eq!(improved.body["stage"], "improved");
    assert_eq!(
        improved.body["generatedStory"],
        format!("{} [make it spooky]", first_text)
    );
    assert_eq!(app.model.speech_count(), 1);

    // Narrating again produces a new file and clears the flag
    let renarrated = app
        .post(&format!("/api/stories/{}/narrate", id), json!({}), Some(&cookie))
        .await;
    assert_eq!(renarrated.body["regenerated"], true);
    assert_ne!(renarrated.body["audioPath"], first_audio.as_str());
    assert_eq!(renarrated.body["story"]["isImproved"], false);
    assert_eq!(app.model.speech_count(), 2);

    // The audio is served as a static file
    let audio_path = renarrated.body["audioPath"].as_str().unwrap();
    let audio = app.get(&format!("/{}", audio_path), None).await;
    assert_eq!(audio.status, StatusCode::OK);
    assert!(audio.raw.starts_with(b"ID3"));

    // Listing shows the story; delete removes it
    let listed = app.get("/api/stories", Some(&cookie)).await;
    assert_eq!(listed.body.as_array().unwrap().len(), 1);

    let deleted = app
        .json(Method::DELETE, &format!("/api/stories/{}", id), None, Some(&cookie))
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    let gone = app.get(&format!("/api/stories/{}", id), Some(&cookie)).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
    assert_eq!(gone.body["error"], "Story not found");
}

#[tokio::test]
async fn uploaded_images_are_served() {
    let app = build_test_app();
    let cookie = app.login_with_key("ada@example.com").await;

    let created = app.upload("t", &[("dog.png", DOG)], Some(&cookie)).await;
    let image = created.body["images"][0].as_str().unwrap();
    assert!(image.starts_with("uploads/"));

    let served = app.get(&format!("/{}", image), None).await;
    assert_eq!(served.status, StatusCode::OK);
    assert_eq!(&served.raw[..], DOG);
}

#[tokio::test]
async fn stories_require_authentication() {
    let app = build_test_app();

    assert_eq!(app.get("/api/stories", None).await.status, StatusCode::UNAUTHORIZED);
    let upload = app.upload("t", &[("dog.png", DOG)], None).await;
    assert_eq!(upload.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.story_count(), 0);
}

#[tokio::test]
async fn invalid_uploads_persist_nothing() {
    let app = build_test_app();
    let cookie = app.login_with_key("ada@example.com").await;

    let no_title = app.upload("  ", &[("dog.png", DOG)], Some(&cookie)).await;
    assert_eq!(no_title.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        no_title.body["error"],
        "Title and at least one image are required"
    );

    let no_images = app.upload("Title", &[], Some(&cookie)).await;
    assert_eq!(no_images.status, StatusCode::BAD_REQUEST);

    let too_many = app
        .upload(
            "Title",
            &[("a.png", DOG), ("b.png", DOG), ("c.png", DOG), ("d.png", DOG)],
            Some(&cookie),
        )
        .await;
    assert_eq!(too_many.status, StatusCode::BAD_REQUEST);

    assert_eq!(app.story_count(), 0);
}

#[tokio::test]
async fn non_multipart_upload_is_a_json_400() {
    let app = build_test_app();
    let cookie = app.login_with_key("ada@example.com").await;

    let response = app
        .post("/api/stories", json!({ "title": "t" }), Some(&cookie))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid upload"));
    assert_eq!(app.story_count(), 0);

    let id = app
        .upload("t", &[("dog.png", DOG)], Some(&cookie))
        .await
        .body["id"]
        .as_str()
        .unwrap()
        .to_string();
    let no_body = app
        .json(
            Method::POST,
            &format!("/api/stories/{}/improve", id),
            None,
            Some(&cookie),
        )
        .await;
    assert_eq!(no_body.status, StatusCode::BAD_REQUEST);
    assert!(no_body.body["error"].is_string());
}

#[tokio::test]
async fn missing_api_key_blocks_creation() {
    let app = build_test_app();
    let cookie = app.login_as("ada@example.com").await;

    let response = app.upload("t", &[("dog.png", DOG)], Some(&cookie)).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].as_str().unwrap().contains("API key"));
    assert_eq!(app.story_count(), 0);
}

#[tokio::test]
async fn provider_failures_are_classified() {
    let app = build_test_app();
    let cookie = app.login_with_key("ada@example.com").await;

    app.model.fail_with(ModelError::CredentialInvalid);
    let rejected = app.upload("t", &[("dog.png", DOG)], Some(&cookie)).await;
    assert_eq!(rejected.status, StatusCode::FORBIDDEN);

    app.model.fail_with(ModelError::RateLimited);
    let limited = app.upload("t", &[("dog.png", DOG)], Some(&cookie)).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);

    app.model.fail_with(ModelError::Upstream {
        status: 500,
        message: "boom".to_string(),
    });
    let upstream = app.upload("t", &[("dog.png", DOG)], Some(&cookie)).await;
    assert_eq!(upstream.status, StatusCode::BAD_GATEWAY);

    assert_eq!(app.story_count(), 0);
}

#[tokio::test]
async fn improve_and_narrate_preconditions() {
    let app = build_test_app();
    let cookie = app.login_with_key("ada@example.com").await;
    let created = app.upload("t", &[("dog.png", DOG)], Some(&cookie)).await;
    let id = created.body["id"].as_str().unwrap().to_string();

    let narrate = app
        .post(&format!("/api/stories/{}/narrate", id), json!({}), Some(&cookie))
        .await;
    assert_eq!(narrate.status, StatusCode::CONFLICT);

    let improve = app
        .post(
            &format!("/api/stories/{}/improve", id),
            json!({ "instruction": "shorter" }),
            Some(&cookie),
        )
        .await;
    assert_eq!(improve.status, StatusCode::CONFLICT);

    let empty = app
        .post(
            &format!("/api/stories/{}/improve", id),
            json!({ "instruction": "" }),
            Some(&cookie),
        )
        .await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stories_are_private_to_their_owner() {
    let app = build_test_app();
    let alice = app.login_with_key("alice@example.com").await;
    let bob = app.login_with_key("bob@example.com").await;

    let created = app.upload("Alice's", &[("dog.png", DOG)], Some(&alice)).await;
    let id = created.body["id"].as_str().unwrap().to_string();

    let peek = app.get(&format!("/api/stories/{}", id), Some(&bob)).await;
    assert_eq!(peek.status, StatusCode::NOT_FOUND);

    let generate = app
        .post(&format!("/api/stories/{}/generate", id), json!({}), Some(&bob))
        .await;
    assert_eq!(generate.status, StatusCode::NOT_FOUND);

    let delete = app
        .json(Method::DELETE, &format!("/api/stories/{}", id), None, Some(&bob))
        .await;
    assert_eq!(delete.status, StatusCode::NOT_FOUND);

    let bobs = app.get("/api/stories", Some(&bob)).await;
    assert!(bobs.body.as_array().unwrap().is_empty());

    let still_there = app.get(&format!("/api/stories/{}", id), Some(&alice)).await;
    assert_eq!(still_there.status, StatusCode::OK);
}

#[tokio::test]
async fn list_is_newest_first() {
    let app = build_test_app();
    let cookie = app.login_with_key("ada@example.com").await;

    app.upload("First", &[("dog.png", DOG)], Some(&cookie)).await;
    app.upload("Second", &[("ball.png", BALL)], Some(&cookie)).await;

    let listed = app.get("/api/stories", Some(&cookie)).await;
    let titles: Vec<&str> = listed
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Second", "First"]);
}

#[tokio::test]
async fn bearer_token_can_drive_the_api() {
    let app = build_test_app();
    app.login_with_key("ada@example.com").await;
    let token = app
        .state
        .users
        .get_by_email("ada@example.com")
        .unwrap()
        .unwrap()
        .token;

    let request = Request::builder()
        .uri("/api/stories")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.as_array().unwrap().is_empty());
}
