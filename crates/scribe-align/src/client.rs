//! HTTP client for the external forced-alignment service.

use std::time::Duration;

use serde::Deserialize;

use crate::error::AlignError;

const ALIGN_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Response model
// ---------------------------------------------------------------------------

/// One word of the aligner's response. Times are relative to the submitted
/// clip, not the source audio.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AlignedWord {
    #[serde(default)]
    pub word: String,
    #[serde(default)]
    pub start: Option<f64>,
    #[serde(default)]
    pub end: Option<f64>,
    #[serde(default)]
    pub probability: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct AlignResponse {
    #[serde(default)]
    words: Vec<AlignedWord>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Multipart POST client for the `align` endpoint.
#[derive(Debug, Clone)]
pub struct AlignClient {
    http: reqwest::Client,
    endpoint: String,
}

impl AlignClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(ALIGN_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    /// POST `{audio: clip.wav, transcript}` and parse the word list. Any
    /// non-2xx status is an [`AlignError::Endpoint`].
    ///
    /// The raw response body is returned alongside the parsed words so
    /// callers can persist it as a debug artifact.
    pub async fn align(
        &self,
        wav_bytes: Vec<u8>,
        transcript: &str,
    ) -> Result<(Vec<AlignedWord>, serde_json::Value), AlignError> {
        let clip_size = wav_bytes.len();
        let part = reqwest::multipart::Part::bytes(wav_bytes)
            .file_name("clip.wav")
            .mime_str("audio/wav")
            .expect("static mime type");
        let form = reqwest::multipart::Form::new()
            .part("audio", part)
            .text("transcript", transcript.to_string());

        let response = self.http.post(&self.endpoint).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(AlignError::Endpoint {
                status: status.as_u16(),
                body: snippet,
            });
        }

        let raw: serde_json::Value = response.json().await?;
        let parsed: AlignResponse = serde_json::from_value(raw.clone()).unwrap_or_default();
        tracing::debug!(
            clip_size,
            transcript_len = transcript.len(),
            words = parsed.words.len(),
            "align endpoint responded"
        );
        Ok((parsed.words, raw))
    }
}

// ---------------------------------------------------------------------------
// Response normalization
// ---------------------------------------------------------------------------

/// Split response tokens whose `word` contains internal whitespace,
/// distributing the `[start, end]` interval linearly by character length.
/// Exploded pieces inherit the source token's probability.
pub fn explode_words(words: Vec<AlignedWord>) -> Vec<AlignedWord> {
    let mut out = Vec::with_capacity(words.len());
    for token in words {
        if !token.word.trim().contains(' ') {
            out.push(token);
            continue;
        }
        let parts: Vec<&str> = token.word.split_whitespace().collect();
        if parts.is_empty() {
            out.push(token);
            continue;
        }

        match (token.start, token.end) {
            (Some(start), Some(end)) => {
                let span = (end - start).max(0.0);
                let total_chars: usize = parts.iter().map(|p| p.len().max(1)).sum();
                let mut cursor = start;
                let count = parts.len();
                for (idx, part) in parts.iter().enumerate() {
                    let piece_end = if idx == count - 1 {
                        end
                    } else {
                        cursor + span * (part.len().max(1) as f64 / total_chars as f64)
                    };
                    out.push(AlignedWord {
                        word: (*part).to_string(),
                        start: Some(cursor),
                        end: Some(piece_end),
                        probability: token.probability,
                    });
                    cursor = piece_end;
                }
            }
            _ => {
                // Missing interval: split the text but do not invent times.
                for part in parts {
                    out.push(AlignedWord {
                        word: part.to_string(),
                        start: None,
                        end: None,
                        probability: token.probability,
                    });
                }
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn aligned(word: &str, start: Option<f64>, end: Option<f64>) -> AlignedWord {
        AlignedWord {
            word: word.into(),
            start,
            end,
            probability: Some(0.5),
        }
    }

    #[test]
    fn plain_words_pass_through() {
        let words = vec![aligned("hello", Some(0.0), Some(1.0))];
        assert_eq!(explode_words(words.clone()), words);
    }

    #[test]
    fn multiword_token_splits_by_char_length() {
        let words = vec![aligned("ab cdefgh", Some(0.0), Some(1.0))];
        let exploded = explode_words(words);
        assert_eq!(exploded.len(), 2);
        assert_eq!(exploded[0].word, "ab");
        assert_eq!(exploded[1].word, "cdefgh");
        // 2 of 8 characters → 0.25 of the interval.
        assert!((exploded[0].end.unwrap() - 0.25).abs() < 1e-9);
        assert_eq!(exploded[1].start, exploded[0].end);
        assert_eq!(exploded[1].end, Some(1.0));
        assert_eq!(exploded[0].probability, Some(0.5));
    }

    #[test]
    fn multiword_token_without_times_splits_untimed() {
        let words = vec![aligned("a b", None, Some(1.0))];
        let exploded = explode_words(words);
        assert_eq!(exploded.len(), 2);
        assert!(exploded.iter().all(|w| w.start.is_none() && w.end.is_none()));
    }

    #[test]
    fn response_parses_with_missing_fields() {
        let raw = serde_json::json!({"words": [{"word": "hi"}, {"word": "x", "start": 0.1, "end": 0.2}]});
        let parsed: AlignResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.words.len(), 2);
        assert!(parsed.words[0].start.is_none());
        assert_eq!(parsed.words[1].end, Some(0.2));
    }

    #[tokio::test]
    async fn align_posts_multipart_and_parses_words() {
        use axum::{extract::Multipart, routing::post, Json, Router};

        async fn mock_align(mut multipart: Multipart) -> Json<serde_json::Value> {
            let mut transcript = String::new();
            let mut audio_len = 0usize;
            while let Some(field) = multipart.next_field().await.unwrap() {
                match field.name() {
                    Some("transcript") => transcript = field.text().await.unwrap(),
                    Some("audio") => audio_len = field.bytes().await.unwrap().len(),
                    _ => {}
                }
            }
            assert_eq!(transcript, "hello world");
            assert_eq!(audio_len, 4);
            Json(serde_json::json!({
                "words": [
                    {"word": "hello", "start": 0.0, "end": 0.4},
                    {"word": "world", "start": 0.5, "end": 1.0}
                ]
            }))
        }

        let app = Router::new().route("/align", post(mock_align));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let client = AlignClient::new(format!("http://{addr}/align"));
        let (words, raw) = client.align(vec![0u8; 4], "hello world").await.unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words[1].word, "world");
        assert!(raw.get("words").is_some());
    }

    #[tokio::test]
    async fn non_2xx_is_an_endpoint_error() {
        use axum::{http::StatusCode, routing::post, Router};

        let app = Router::new().route("/align", post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let client = AlignClient::new(format!("http://{addr}/align"));
        let err = client.align(Vec::new(), "x").await.unwrap_err();
        match err {
            AlignError::Endpoint { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "upstream down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
