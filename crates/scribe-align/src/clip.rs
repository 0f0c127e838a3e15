//! WAV clip extraction via an ffmpeg subprocess.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::error::AlignError;

/// Extract a mono 16 kHz WAV clip covering `[clip_start - pad, clip_end + pad]`
/// of the source audio, streamed over a pipe. Returns the WAV bytes plus the
/// effective clip bounds (the start is floored at zero).
pub async fn extract_wav_clip(
    audio_path: &Path,
    clip_start: f64,
    clip_end: f64,
    pad: f64,
) -> Result<(Vec<u8>, f64, f64), AlignError> {
    let ss = (clip_start - pad).max(0.0);
    let to = clip_end + pad;

    let output = Command::new("ffmpeg")
        .arg("-hide_banner")
        .arg("-loglevel")
        .arg("error")
        .arg("-ss")
        .arg(format!("{ss:.3}"))
        .arg("-to")
        .arg(format!("{to:.3}"))
        .arg("-i")
        .arg(audio_path)
        .arg("-ac")
        .arg("1")
        .arg("-ar")
        .arg("16000")
        .arg("-f")
        .arg("wav")
        .arg("pipe:1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(AlignError::Ffmpeg(stderr));
    }

    tracing::debug!(
        path = %audio_path.display(),
        ss,
        to,
        bytes = output.stdout.len(),
        "extracted wav clip"
    );
    Ok((output.stdout, ss, to))
}

/// Extract the same window without resampling, written straight to `out`.
/// Used only for diagnostic artifacts.
pub async fn extract_native_clip(
    audio_path: &Path,
    clip_start: f64,
    clip_end: f64,
    out: &Path,
) -> Result<(), AlignError> {
    let output = Command::new("ffmpeg")
        .arg("-hide_banner")
        .arg("-loglevel")
        .arg("error")
        .arg("-ss")
        .arg(format!("{clip_start:.3}"))
        .arg("-to")
        .arg(format!("{clip_end:.3}"))
        .arg("-i")
        .arg(audio_path)
        .arg("-f")
        .arg("wav")
        .arg("-c:a")
        .arg("pcm_s16le")
        .arg(out)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(AlignError::Ffmpeg(stderr));
    }
    Ok(())
}
