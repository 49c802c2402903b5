//! HTTP mock tests for the Gemini adapter.

use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use services::services::generative::{
    ClientProvider, GeminiProvider, GenerationConfig, GenerationError, GenerativeClient,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ENDPOINT: &str = "/v1beta/models/gemini-2.5-flash:generateContent";

fn client_for(server: &MockServer) -> Box<dyn GenerativeClient> {
    let provider = GeminiProvider::new(&format!("{}/", server.uri()), Duration::from_secs(5)).unwrap();
    provider
        .client(SecretString::from("test-api-key".to_string()), "models/gemini-2.5-flash")
        .unwrap()
}

#[tokio::test]
async fn sends_conversation_and_config_and_joins_parts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(header("x-goog-api-key", "test-api-key"))
        .and(body_partial_json(json!({
            "contents": [
                { "role": "user", "parts": [{ "text": "You are terse." }] },
                { "role": "model", "parts": [{ "text": "Understood." }] },
                { "role": "user", "parts": [{ "text": "Say hi" }] },
            ],
            "generationConfig": { "topK": 64, "maxOutputTokens": 8192 },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Hi" }, { "text": " there\n" }] },
                "finishReason": "STOP",
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let text = client
        .generate("Say hi", Some("You are terse."), &GenerationConfig::default())
        .await
        .unwrap();
    assert_eq!(text, "Hi there\n");
}

#[tokio::test]
async fn error_status_uses_api_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT" }
        })))
        .mount(&server)
        .await;

    let result = client_for(&server)
        .generate("prompt", None, &GenerationConfig::default())
        .await;

    match result {
        Err(GenerationError::Api { status, message }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "API key not valid.");
        }
        other => panic!("Expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn non_json_error_body_is_kept_verbatim() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .generate("prompt", None, &GenerationConfig::default())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "API returned 500: Internal Server Error");
}

#[tokio::test]
async fn blocked_prompt_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .generate("prompt", None, &GenerationConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::Blocked(reason) if reason == "SAFETY"));
}

#[tokio::test]
async fn candidate_without_text_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "finishReason": "MAX_TOKENS" }]
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .generate("prompt", None, &GenerationConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::EmptyResponse(reason) if reason == "MAX_TOKENS"));
}
