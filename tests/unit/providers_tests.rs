/*!
 * Tests for provider wire formats and helpers
 */

use std::time::Duration;
use nikud_narrator::providers::{backoff_ceiling, backoff_delay};
use nikud_narrator::providers::nakdan::{NakdanRequest, NakdanResponse, NakdanToken};
use nikud_narrator::providers::speech::{Speech, SpeechRequest};

/// Test the request body sent to Nakdan
#[test]
fn test_nakdanRequest_serialization_shouldMatchWireContract() {
    let request = NakdanRequest::new("שלום עולם", "modern").timeout(Duration::from_secs(3));
    let json = serde_json::to_value(&request).unwrap();

    assert_eq!(json["task"], "nakdan");
    assert_eq!(json["data"], "שלום עולם");
    assert_eq!(json["genre"], "modern");
    assert_eq!(json["optimizer"], true);
    assert!(json.get("timeout").is_none());
}

/// Test parsing a Nakdan answer with separators and options
#[test]
fn test_nakdanResponse_words_withSeparatorsAndOptions_shouldReturnPreferredForms() {
    let json = r#"[
        {"word": "שלום", "options": ["שָׁ|לוֹם", "שְׁלוֹם"]},
        {"word": " ", "options": []},
        {"word": "עולם", "options": []}
    ]"#;
    let response: NakdanResponse = serde_json::from_str(json).unwrap();

    let expected = "שָׁ|לוֹם".replace('|', "");
    assert_eq!(response.words(), vec![expected, "עולם".to_string()]);
}

/// Test that a token without options falls back to its word
#[test]
fn test_nakdanToken_preferred_withoutOptions_shouldReturnWord() {
    let token = NakdanToken {
        word: "בית".to_string(),
        options: Vec::new(),
    };
    assert_eq!(token.preferred(), "בית");
}

/// Test the speech request builder
#[test]
fn test_speechRequest_builder_shouldCarryVoiceAndSpeed() {
    let request = SpeechRequest::new("שלום", "nova").speed(1.5);

    assert_eq!(request.input, "שלום");
    assert_eq!(request.voice, "nova");
    assert_eq!(request.speed, 1.5);
}

/// Test creating a speech client without a key for a local server
#[test]
fn test_speech_new_withoutKey_shouldSucceed() {
    assert!(Speech::new("http://localhost:8880/v1", None, "kokoro", Duration::from_secs(5)).is_ok());
}

/// Test that backoff grows with every attempt
#[test]
fn test_backoffDelay_withAttempts_shouldGrowExponentially() {
    let base = 100;
    for attempt in 1..5u32 {
        let delay = backoff_delay(base, attempt).as_millis() as u64;
        let expected = base * (1 << (attempt - 1));
        assert!(delay >= expected && delay < expected + base / 2, "attempt {}: {}", attempt, delay);
    }
}

/// Test that the ceiling bounds every jittered delay
#[test]
fn test_backoffCeiling_withAttempts_shouldBoundDelay() {
    for attempt in 1..5u32 {
        assert!(backoff_delay(200, attempt) <= backoff_ceiling(200, attempt));
    }
    assert_eq!(backoff_ceiling(200, 3).as_millis(), 900);
}
