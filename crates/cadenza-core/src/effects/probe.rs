//! Stream probing: duration and format from the decoded stream.
//!
//! The engine's duration is authoritative for playback and comes from here,
//! never from tags. When the container does not declare a frame count, the
//! packets are walked and their durations summed.

use std::fs::File;
use std::path::Path;

use symphonia::core::codecs::{CodecParameters, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::BackendError;

/// Shape of the default audio track of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channels: u32,
    pub duration_ms: u64,
}

/// Probe `path`, confirm a decoder exists for its codec and compute duration.
pub fn probe_file(path: &Path) -> Result<StreamInfo, BackendError> {
    let (mut format, track_id, params) = open_format(path)?;

    // Fails for codecs we cannot decode even if the container parsed.
    symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;

    let sample_rate = params.sample_rate.unwrap_or(44100);
    let channels = params.channels.map(|c| c.count() as u32).unwrap_or(2);
    let duration_ms = match params.n_frames {
        Some(n_frames) => frames_to_ms(n_frames, sample_rate),
        None => scan_duration(format.as_mut(), track_id, &params, sample_rate)?,
    };

    Ok(StreamInfo {
        sample_rate,
        channels,
        duration_ms,
    })
}

/// Open a container and select its default track.
pub(crate) fn open_format(
    path: &Path,
) -> Result<(Box<dyn FormatReader>, u32, CodecParameters), BackendError> {
    if !path.exists() {
        return Err(BackendError::NotFound(path.to_path_buf()));
    }
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| BackendError::Decode("no default track".into()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();
    Ok((format, track_id, params))
}

pub(crate) fn frames_to_ms(frames: u64, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    frames.saturating_mul(1000) / sample_rate as u64
}

fn scan_duration(
    format: &mut dyn FormatReader,
    track_id: u32,
    params: &CodecParameters,
    sample_rate: u32,
) -> Result<u64, BackendError> {
    let mut total_ts: u64 = 0;
    loop {
        match format.next_packet() {
            Ok(packet) => {
                if packet.track_id() == track_id {
                    total_ts += packet.dur;
                }
            }
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        }
    }

    let ms = match params.time_base {
        Some(tb) => {
            let t = tb.calc_time(total_ts);
            t.seconds * 1000 + (t.frac * 1000.0) as u64
        }
        None => frames_to_ms(total_ts, sample_rate),
    };
    Ok(ms)
}

/// Write a 16-bit mono PCM WAV of silence. Test fixture.
#[cfg(test)]
pub(crate) fn write_test_wav(path: &Path, sample_rate: u32, duration_ms: u64) {
    let frames = (sample_rate as u64 * duration_ms / 1000) as u32;
    let data_len = frames * 2;
    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVEfmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes.resize(44 + data_len as usize, 0);
    std::fs::write(path, bytes).expect("write wav");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn wav_duration_from_frame_count() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tone.wav");
        write_test_wav(&path, 8000, 1500);

        let info = probe_file(&path).unwrap();
        assert_eq!(info.sample_rate, 8000);
        assert_eq!(info.channels, 1);
        assert_eq!(info.duration_ms, 1500);
    }

    #[test]
    fn packet_walk_matches_frame_count() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tone.wav");
        write_test_wav(&path, 8000, 1500);

        let (mut format, track_id, params) = open_format(&path).unwrap();
        assert_eq!(params.n_frames, Some(12_000));
        let ms = scan_duration(format.as_mut(), track_id, &params, 8000).unwrap();
        assert_eq!(ms, 1500);

        // Without a time base the summed timestamps are read as frames.
        let (mut format, track_id, mut params) = open_format(&path).unwrap();
        params.time_base = None;
        let ms = scan_duration(format.as_mut(), track_id, &params, 8000).unwrap();
        assert_eq!(ms, 1500);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = probe_file(Path::new("/no/such/file.flac")).unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[test]
    fn garbage_is_rejected_regardless_of_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fake.mp3");
        std::fs::write(&path, b"this is not audio at all, just text").unwrap();
        assert!(probe_file(&path).is_err());
    }

    #[test]
    fn frames_to_ms_handles_zero_rate() {
        assert_eq!(frames_to_ms(44_100, 44_100), 1000);
        assert_eq!(frames_to_ms(10, 0), 0);
    }
}
