pub mod carry;
pub mod normalize;

pub use carry::{
    assign_from_previous, ensure_words_match_text, previous_from_rows, previous_from_words,
    validate_timings, BaselineSource, PrevToken,
};
pub use normalize::{
    normalize_row_timings, normalize_words_json, rows_to_tokens_normalized, slice_words_json,
    MIN_TOKEN_DURATION_SEC,
};
