use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;

/// Server configuration, loaded from `SCRIBE_`-prefixed environment
/// variables. `data_dir` is the single filesystem root: the SQLite store and
/// the audio tree live underneath it.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Forced-aligner endpoint receiving multipart `{audio, transcript}`.
    #[serde(default = "default_align_endpoint")]
    pub align_endpoint: String,

    /// Re-align changed segments as part of every save.
    #[serde(default = "default_true")]
    pub align_prealign_on_save: bool,

    /// Directory for per-call alignment debug artifacts.
    #[serde(default = "default_audio_log_dir")]
    pub audio_log_dir: PathBuf,

    /// Also keep an un-resampled clip per alignment call.
    #[serde(default = "default_true")]
    pub audio_log_native: bool,

    /// Floor duration for normalized token spans, in seconds.
    #[serde(default = "default_min_token_duration")]
    pub min_token_duration_sec: f64,

    /// Padding added on both sides of an extracted audio clip, in seconds.
    #[serde(default = "default_clip_pad")]
    pub clip_pad_sec: f64,

    /// Neighbor window used by save-time realignment when the client sends
    /// none.
    #[serde(default = "default_neighbor_default")]
    pub neighbor_default: i64,

    /// Hard cap on the neighbor window.
    #[serde(default = "default_neighbor_max")]
    pub neighbor_max: i64,
}

impl ServerConfig {
    pub fn load() -> Result<Self, envy::Error> {
        envy::prefixed("SCRIBE_").from_env()
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("explore.sqlite")
    }

    pub fn audio_root(&self) -> PathBuf {
        self.data_dir.join("audio")
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.bind_addr, self.port).parse()
    }

    /// Clamp a requested neighbor window into `[0, neighbor_max]`, using
    /// `fallback` when the client sent none.
    pub fn clamp_neighbors(&self, requested: Option<i64>, fallback: i64) -> usize {
        let max = self.neighbor_max.max(0);
        requested.unwrap_or(fallback).clamp(0, max) as usize
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            data_dir: default_data_dir(),
            align_endpoint: default_align_endpoint(),
            align_prealign_on_save: true,
            audio_log_dir: default_audio_log_dir(),
            audio_log_native: true,
            min_token_duration_sec: default_min_token_duration(),
            clip_pad_sec: default_clip_pad(),
            neighbor_default: default_neighbor_default(),
            neighbor_max: default_neighbor_max(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_align_endpoint() -> String {
    "http://localhost:8000/align".to_string()
}

fn default_audio_log_dir() -> PathBuf {
    PathBuf::from("./audio-log")
}

fn default_true() -> bool {
    true
}

fn default_min_token_duration() -> f64 {
    0.20
}

fn default_clip_pad() -> f64 {
    0.10
}

fn default_neighbor_default() -> i64 {
    1
}

fn default_neighbor_max() -> i64 {
    3
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
