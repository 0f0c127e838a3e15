//! Token composition, tokenization, and input sanitization.
//!
//! The token model preserves the full text verbatim: words and whitespace
//! runs alternate within a line, and a `"\n"` token separates lines, so
//! [`compose`] is the exact inverse of the line structure.

use scribe_core::{Result, ScribeError, Token};

// ---------------------------------------------------------------------------
// Compose / tokenize
// ---------------------------------------------------------------------------

/// Concatenate every token's `word` verbatim, whitespace runs and `"\n"`
/// markers included.
pub fn compose(words: &[Token]) -> String {
    words.iter().map(|t| t.word.as_str()).collect()
}

/// Split text into alternating runs of non-whitespace and whitespace per
/// line, with a `"\n"` token between lines. A trailing `"\n"` token is
/// emitted iff the input ends with one. No timings are attached.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut words: Vec<Token> = Vec::new();
    let lines: Vec<&str> = text.split('\n').collect();

    for (idx, line) in lines.iter().enumerate() {
        let mut buffer = String::new();
        let mut buffer_is_space: Option<bool> = None;
        for c in line.chars() {
            let c_is_space = c.is_whitespace();
            match buffer_is_space {
                None => {
                    buffer.push(c);
                    buffer_is_space = Some(c_is_space);
                }
                Some(current) if current == c_is_space => buffer.push(c),
                Some(_) => {
                    words.push(Token::bare(std::mem::take(&mut buffer)));
                    buffer.push(c);
                    buffer_is_space = Some(c_is_space);
                }
            }
        }
        if !buffer.is_empty() {
            words.push(Token::bare(buffer));
        }
        if idx < lines.len() - 1 {
            words.push(Token::bare("\n"));
        }
    }

    if text.ends_with('\n') && !words.last().map(Token::is_newline).unwrap_or(false) {
        words.push(Token::bare("\n"));
    }
    words
}

// ---------------------------------------------------------------------------
// Sanitization
// ---------------------------------------------------------------------------

fn value_to_seconds(value: &serde_json::Value, context: &str) -> Result<Option<f64>> {
    let number = match value {
        serde_json::Value::Null => return Ok(None),
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) if s.is_empty() => return Ok(None),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    };
    match number {
        Some(n) if n.is_finite() => Ok(Some(n.max(0.0))),
        Some(_) => Ok(None),
        None => Err(ScribeError::InvalidInput(format!(
            "{context} timing/probability must be number or null"
        ))),
    }
}

/// Parse and sanitize client-submitted word objects.
///
/// Each entry must be an object with a string `word` and nullable numeric
/// `start`/`end`/`probability`. Negative times clamp to zero; an inverted
/// `end < start` pair drops `end` so the normalizer can rebuild it.
pub fn sanitize_words(values: &[serde_json::Value]) -> Result<Vec<Token>> {
    let mut sanitized = Vec::with_capacity(values.len());
    for (idx, value) in values.iter().enumerate() {
        let object = value
            .as_object()
            .ok_or_else(|| ScribeError::InvalidInput(format!("words[{idx}] must be an object")))?;

        let word = match object.get("word") {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(ScribeError::InvalidInput(format!(
                    "words[{idx}].word must be string"
                )))
            }
        };

        let context = format!("words[{idx}]");
        let null = serde_json::Value::Null;
        let start = value_to_seconds(object.get("start").unwrap_or(&null), &context)?;
        let end = value_to_seconds(object.get("end").unwrap_or(&null), &context)?;
        let probability = value_to_seconds(object.get("probability").unwrap_or(&null), &context)?;

        let mut token = Token {
            word,
            start,
            end,
            probability,
        };
        if let (Some(s), Some(e)) = (token.start, token.end) {
            if e < s {
                token.end = None;
            }
        }
        sanitized.push(token);
    }
    Ok(sanitized)
}

/// Re-sanitize tokens that may have been rebuilt server-side: clamp negative
/// values to zero and drop inverted `end` values.
pub fn sanitize_tokens(words: Vec<Token>) -> Vec<Token> {
    words
        .into_iter()
        .map(|mut token| {
            token.start = token.start.filter(|v| v.is_finite()).map(|v| v.max(0.0));
            token.end = token.end.filter(|v| v.is_finite()).map(|v| v.max(0.0));
            token.probability = token.probability.filter(|v| v.is_finite()).map(|v| v.max(0.0));
            if let (Some(s), Some(e)) = (token.start, token.end) {
                if e < s {
                    token.end = None;
                }
            }
            token
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
