pub mod artifacts;
pub mod audio;
pub mod client;
pub mod clip;
pub mod error;
pub mod mapper;

pub use artifacts::ArtifactWriter;
pub use audio::{dereference_pointer, resolve_audio};
pub use client::{explode_words, AlignClient, AlignedWord};
pub use clip::extract_wav_clip;
pub use error::AlignError;
pub use mapper::{
    build_window, clip_bounds_from_rows, map_aligned, segment_window, LocalToken, TimingAdjustBlock,
    TimingUpdate,
};
