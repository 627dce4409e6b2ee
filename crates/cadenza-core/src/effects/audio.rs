//! Native backend: symphonia decode + cpal output.
//!
//! Pipeline per run:
//! 1. a decoder thread reads packets, resamples to the device rate and
//!    pushes interleaved f32 samples into a bounded ring,
//! 2. an output thread owns the cpal stream; its callback drains the ring,
//!    remixes channels and applies volume.
//!
//! Position counts samples actually handed to the device, not samples
//! decoded, so it does not run ahead by the ring's depth.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{SeekMode, SeekTo};
use symphonia::core::units::Time;

use super::probe::{self, StreamInfo};
use super::AudioBackend;
use crate::error::BackendError;
use crate::models::TrackRef;

/// Roughly four seconds of 48 kHz stereo.
const RING_CAPACITY: usize = 48_000 * 2 * 4;

pub struct NativeBackend {
    state: Arc<AudioState>,
}

struct OpenedTrack {
    path: PathBuf,
    info: StreamInfo,
}

struct AudioState {
    /// Output is live (cleared on halt and once the stream drains).
    playing: AtomicBool,
    paused: AtomicBool,
    /// f32 bits.
    volume: AtomicU32,
    /// Track position the current run started from.
    base_ms: AtomicU64,
    /// Interleaved ring samples consumed by the device this run.
    played_samples: AtomicU64,
    /// Rate and channel count of what sits in the ring.
    ring_rate: AtomicU32,
    ring_channels: AtomicU32,
    stop_signal: AtomicBool,
    decode_done: AtomicBool,
    error: Mutex<Option<BackendError>>,
    samples: Mutex<SampleRing>,
    opened: Mutex<Option<OpenedTrack>>,
    threads: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl AudioState {
    fn latch_error(&self, e: BackendError) {
        log::error!("cadenza: audio backend error: {}", e);
        *self.error.lock() = Some(e);
        self.playing.store(false, Ordering::SeqCst);
    }
}

/// Bounded FIFO of interleaved samples.
struct SampleRing {
    buf: VecDeque<f32>,
    capacity: usize,
}

impl SampleRing {
    fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn free(&self) -> usize {
        self.capacity - self.buf.len()
    }

    /// Push everything or nothing.
    fn push(&mut self, samples: &[f32]) -> bool {
        if samples.len() > self.free() {
            return false;
        }
        self.buf.extend(samples.iter().copied());
        true
    }

    /// Fill `out`, zero-padding on underrun. Returns samples actually taken.
    fn pull(&mut self, out: &mut [f32]) -> usize {
        let n = out.len().min(self.buf.len());
        for (dst, src) in out.iter_mut().zip(self.buf.drain(..n)) {
            *dst = src;
        }
        out[n..].fill(0.0);
        n
    }

    fn len(&self) -> usize {
        self.buf.len()
    }

    fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Linear-interpolation resampler over interleaved frames.
struct LinearResampler {
    step: f64,
    phase: f64,
    channels: usize,
}

impl LinearResampler {
    fn new(src_rate: u32, dst_rate: u32, channels: usize) -> Self {
        Self {
            step: src_rate as f64 / dst_rate as f64,
            phase: 0.0,
            channels: channels.max(1),
        }
    }

    fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let ch = self.channels;
        let frames = input.len() / ch;
        if frames == 0 {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(((frames as f64 / self.step).ceil() as usize + 1) * ch);
        while (self.phase as usize) < frames {
            let i = self.phase as usize;
            let frac = (self.phase - i as f64) as f32;
            let j = (i + 1).min(frames - 1);
            for c in 0..ch {
                let a = input[i * ch + c];
                let b = input[j * ch + c];
                out.push(a + (b - a) * frac);
            }
            self.phase += self.step;
        }
        self.phase -= frames as f64;
        out
    }
}

impl NativeBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AudioState {
                playing: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                volume: AtomicU32::new(1.0f32.to_bits()),
                base_ms: AtomicU64::new(0),
                played_samples: AtomicU64::new(0),
                ring_rate: AtomicU32::new(44_100),
                ring_channels: AtomicU32::new(2),
                stop_signal: AtomicBool::new(false),
                decode_done: AtomicBool::new(false),
                error: Mutex::new(None),
                samples: Mutex::new(SampleRing::new(RING_CAPACITY)),
                opened: Mutex::new(None),
                threads: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NativeBackend {
    fn drop(&mut self) {
        self.halt();
    }
}

impl AudioBackend for NativeBackend {
    fn open(&self, track: &TrackRef) -> Result<u64, BackendError> {
        self.halt();
        let mut opened = self.state.opened.lock();
        *opened = None;
        let info = probe::probe_file(track.path())?;
        log::debug!(
            "cadenza: opened {} ({} Hz, {} ch, {} ms)",
            track,
            info.sample_rate,
            info.channels,
            info.duration_ms
        );
        *opened = Some(OpenedTrack {
            path: track.path().to_path_buf(),
            info,
        });
        Ok(info.duration_ms)
    }

    fn start(&self, from_secs: u64) -> Result<(), BackendError> {
        self.halt();

        let (path, info) = match self.state.opened.lock().as_ref() {
            Some(t) => (t.path.clone(), t.info),
            None => return Err(BackendError::NotOpened),
        };

        // Fail synchronously when there is nowhere to play.
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| BackendError::Device("no output device".into()))?;

        // One config for both threads: the ring is filled at the rate the
        // stream actually runs at.
        let ranges: Vec<_> = device
            .supported_output_configs()
            .map(|configs| configs.collect())
            .unwrap_or_default();
        let default_config = device
            .default_output_config()
            .map_err(|e| BackendError::Device(e.to_string()));
        let config = select_output_config(
            ranges,
            default_config,
            info.channels.max(1) as u16,
            info.sample_rate,
        )?;
        let device_rate = config.sample_rate.0;
        let s = &self.state;
        s.stop_signal.store(false, Ordering::SeqCst);
        s.decode_done.store(false, Ordering::SeqCst);
        s.paused.store(false, Ordering::SeqCst);
        s.playing.store(true, Ordering::SeqCst);
        s.base_ms
            .store(from_secs.saturating_mul(1000).min(info.duration_ms), Ordering::SeqCst);
        s.played_samples.store(0, Ordering::SeqCst);
        s.ring_rate.store(device_rate, Ordering::SeqCst);
        s.ring_channels.store(info.channels.max(1), Ordering::SeqCst);
        s.samples.lock().clear();
        *s.error.lock() = None;

        let mut threads = s.threads.lock();

        let decoder_state = Arc::clone(&self.state);
        threads.push(thread::spawn(move || {
            if let Err(e) = decode_to_ring(&path, from_secs, device_rate, &decoder_state) {
                decoder_state.latch_error(e);
            }
            decoder_state.decode_done.store(true, Ordering::SeqCst);
        }));

        let output_state = Arc::clone(&self.state);
        threads.push(thread::spawn(move || {
            if let Err(e) = output_from_ring(Arc::clone(&output_state), config) {
                output_state.latch_error(e);
            }
        }));

        Ok(())
    }

    fn pause(&self) {
        self.state.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.state.paused.store(false, Ordering::SeqCst);
    }

    fn halt(&self) {
        let s = &self.state;
        s.stop_signal.store(true, Ordering::SeqCst);
        s.playing.store(false, Ordering::SeqCst);
        s.paused.store(false, Ordering::SeqCst);
        s.samples.lock().clear();

        // Drain handles then join outside the lock
        let handles: Vec<_> = s.threads.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
    }

    fn set_volume(&self, volume: f32) {
        self.state
            .volume
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::SeqCst);
    }

    fn is_busy(&self) -> bool {
        self.state.playing.load(Ordering::SeqCst) && !self.state.paused.load(Ordering::SeqCst)
    }

    fn position_ms(&self) -> u64 {
        let s = &self.state;
        let rate = s.ring_rate.load(Ordering::SeqCst).max(1) as u64;
        let channels = s.ring_channels.load(Ordering::SeqCst).max(1) as u64;
        let frames = s.played_samples.load(Ordering::SeqCst) / channels;
        s.base_ms.load(Ordering::SeqCst) + frames * 1000 / rate
    }

    fn take_error(&self) -> Option<BackendError> {
        self.state.error.lock().take()
    }
}

/// Decode `path` from `from_secs` and feed the ring at `device_rate`.
fn decode_to_ring(
    path: &std::path::Path,
    from_secs: u64,
    device_rate: u32,
    state: &AudioState,
) -> Result<(), BackendError> {
    let (mut format, track_id, params) = probe::open_format(path)?;
    let mut decoder =
        symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;

    let sample_rate = params.sample_rate.unwrap_or(44_100);
    let channels = params.channels.map(|c| c.count()).unwrap_or(2);

    if from_secs > 0 {
        let to = SeekTo::Time {
            time: Time::new(from_secs, 0.0),
            track_id: Some(track_id),
        };
        if let Err(e) = format.seek(SeekMode::Accurate, to) {
            log::warn!("cadenza: seek to {}s failed, playing from start: {}", from_secs, e);
            state.base_ms.store(0, Ordering::SeqCst);
        }
        decoder.reset();
    }

    let mut resampler = if device_rate != sample_rate {
        log::info!("cadenza: resampling {}Hz -> {}Hz", sample_rate, device_rate);
        Some(LinearResampler::new(sample_rate, device_rate, channels))
    } else {
        None
    };

    loop {
        if state.stop_signal.load(Ordering::SeqCst) {
            return Ok(());
        }

        while state.paused.load(Ordering::SeqCst) {
            if state.stop_signal.load(Ordering::SeqCst) {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(10));
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(());
            }
            Err(SymphoniaError::ResetRequired) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // A corrupt packet is skipped, not fatal.
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("cadenza: skipping bad packet: {}", e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        let samples = match resampler.as_mut() {
            Some(rs) => rs.process(sample_buf.samples()),
            None => sample_buf.samples().to_vec(),
        };

        // Back-pressure until the device has drained enough.
        loop {
            if state.samples.lock().push(&samples) {
                break;
            }
            if state.stop_signal.load(Ordering::SeqCst) {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
    }
}

/// Own the cpal stream for one run; returns once halted or drained.
fn output_from_ring(state: Arc<AudioState>, config: cpal::StreamConfig) -> Result<(), BackendError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| BackendError::Device("no output device".into()))?;

    let ring_channels = state.ring_channels.load(Ordering::SeqCst).max(1) as u16;
    let out_channels = config.channels.max(1);
    let cb_state = Arc::clone(&state);
    let err_state = Arc::clone(&state);
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if cb_state.paused.load(Ordering::SeqCst) {
                    data.fill(0.0);
                    return;
                }
                let taken = if ring_channels == out_channels {
                    cb_state.samples.lock().pull(data)
                } else {
                    let frames = data.len() / out_channels as usize;
                    let mut tmp = vec![0.0f32; frames * ring_channels as usize];
                    let taken = cb_state.samples.lock().pull(&mut tmp);
                    remix(&tmp, ring_channels, data, out_channels);
                    taken
                };
                cb_state
                    .played_samples
                    .fetch_add(taken as u64, Ordering::SeqCst);
                let vol = f32::from_bits(cb_state.volume.load(Ordering::SeqCst));
                for s in data.iter_mut() {
                    *s *= vol;
                }
            },
            move |err| {
                err_state.latch_error(BackendError::Device(err.to_string()));
            },
            None,
        )
        .map_err(|e| BackendError::Device(e.to_string()))?;

    stream
        .play()
        .map_err(|e| BackendError::Device(e.to_string()))?;

    loop {
        if state.stop_signal.load(Ordering::SeqCst) {
            break;
        }
        let drained = state.decode_done.load(Ordering::SeqCst) && state.samples.lock().len() == 0;
        if drained || !state.playing.load(Ordering::SeqCst) {
            break;
        }
        thread::sleep(Duration::from_millis(25));
    }

    state.playing.store(false, Ordering::SeqCst);
    Ok(())
}

/// Convert interleaved frames between channel counts: mono fans out,
/// multi-channel to mono averages, otherwise channels are copied in order
/// with extras zeroed or dropped.
fn remix(src: &[f32], src_ch: u16, dst: &mut [f32], dst_ch: u16) {
    let (src_ch, dst_ch) = (src_ch as usize, dst_ch as usize);
    for (in_frame, out_frame) in src.chunks(src_ch).zip(dst.chunks_mut(dst_ch)) {
        if src_ch == 1 {
            out_frame.fill(in_frame[0]);
        } else if dst_ch == 1 {
            out_frame[0] = in_frame.iter().sum::<f32>() / in_frame.len() as f32;
        } else {
            for (c, out) in out_frame.iter_mut().enumerate() {
                *out = in_frame.get(c).copied().unwrap_or(0.0);
            }
        }
    }
}

/// Stream config for a track of `channels` at `rate`.
///
/// Prefers an f32 range that covers `rate` with the fewest channels that
/// still fit the track, so no resampling is needed. Otherwise the device
/// default is used, which must be f32; the decoder then resamples to it.
fn select_output_config(
    ranges: impl IntoIterator<Item = cpal::SupportedStreamConfigRange>,
    default_config: Result<cpal::SupportedStreamConfig, BackendError>,
    channels: u16,
    rate: u32,
) -> Result<cpal::StreamConfig, BackendError> {
    let native = ranges
        .into_iter()
        .filter(|range| {
            range.sample_format() == cpal::SampleFormat::F32
                && range.channels() >= channels
                && range.min_sample_rate().0 <= rate
                && range.max_sample_rate().0 >= rate
        })
        .min_by_key(|range| range.channels());
    if let Some(range) = native {
        return Ok(cpal::StreamConfig {
            channels: range.channels(),
            sample_rate: cpal::SampleRate(rate),
            buffer_size: cpal::BufferSize::Default,
        });
    }

    let default_config = default_config?;
    if default_config.sample_format() != cpal::SampleFormat::F32 {
        return Err(BackendError::Device(format!(
            "device does not support f32 output (got {:?})",
            default_config.sample_format()
        )));
    }
    Ok(default_config.into())
}

#[cfg(test)]
mod tests {
    use super::{remix, select_output_config, LinearResampler, SampleRing};
    use crate::error::BackendError;
    use cpal::{
        SampleFormat, SampleRate, SupportedBufferSize, SupportedStreamConfig,
        SupportedStreamConfigRange,
    };

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    fn default_config(
        channels: u16,
        rate: u32,
        format: SampleFormat,
    ) -> Result<SupportedStreamConfig, BackendError> {
        Ok(SupportedStreamConfig::new(
            channels,
            SampleRate(rate),
            SupportedBufferSize::Unknown,
            format,
        ))
    }

    #[test]
    fn surround_track_on_stereo_device_uses_default_rate() {
        let ranges = vec![range(2, 48_000, 48_000, SampleFormat::F32)];
        let config =
            select_output_config(ranges, default_config(2, 48_000, SampleFormat::F32), 6, 44_100)
                .unwrap();
        // The decoder resamples to this rate and position is counted at it.
        assert_eq!(config.sample_rate.0, 48_000);
        assert_eq!(config.channels, 2);
    }

    #[test]
    fn supported_track_rate_is_kept() {
        let ranges = vec![
            range(2, 44_100, 96_000, SampleFormat::I16),
            range(8, 8_000, 192_000, SampleFormat::F32),
            range(2, 44_100, 96_000, SampleFormat::F32),
        ];
        let config =
            select_output_config(ranges, default_config(2, 48_000, SampleFormat::F32), 2, 44_100)
                .unwrap();
        assert_eq!(config.sample_rate.0, 44_100);
        assert_eq!(config.channels, 2);
    }

    #[test]
    fn non_float_default_is_rejected() {
        let ranges = vec![range(2, 44_100, 44_100, SampleFormat::I16)];
        let err =
            select_output_config(ranges, default_config(2, 44_100, SampleFormat::I16), 2, 44_100)
                .unwrap_err();
        assert!(matches!(err, BackendError::Device(_)));
    }

    #[test]
    fn ring_push_is_all_or_nothing() {
        let mut ring = SampleRing::new(4);
        assert!(ring.push(&[1.0, 2.0, 3.0]));
        assert!(!ring.push(&[4.0, 5.0]));
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn ring_underrun_pads_with_silence() {
        let mut ring = SampleRing::new(8);
        ring.push(&[0.5, -0.5]);
        let mut out = [9.0f32; 5];
        assert_eq!(ring.pull(&mut out), 2);
        assert_eq!(out, [0.5, -0.5, 0.0, 0.0, 0.0]);
        assert_eq!(ring.free(), 8);
    }

    #[test]
    fn resampler_doubles_frame_count() {
        let mut rs = LinearResampler::new(22_050, 44_100, 1);
        let out = rs.process(&[0.0, 1.0, 0.0, -1.0]);
        assert_eq!(out.len(), 8);
        assert_eq!(out[1], 0.5);
    }

    #[test]
    fn resampler_halves_stereo_frames() {
        let mut rs = LinearResampler::new(96_000, 48_000, 2);
        let input: Vec<f32> = (0..16).map(|i| i as f32).collect();
        let out = rs.process(&input);
        assert_eq!(out.len(), 8);
        assert_eq!(&out[..4], &[0.0, 1.0, 4.0, 5.0]);
    }

    #[test]
    fn remix_mono_to_stereo_and_back() {
        let mut stereo = [0.0f32; 4];
        remix(&[0.25, 0.75], 1, &mut stereo, 2);
        assert_eq!(stereo, [0.25, 0.25, 0.75, 0.75]);

        let mut mono = [0.0f32; 2];
        remix(&[1.0, 3.0, 2.0, 4.0], 2, &mut mono, 1);
        assert_eq!(mono, [2.0, 3.0]);
    }

    #[test]
    fn remix_stereo_to_quad_zero_fills() {
        let mut quad = [9.0f32; 4];
        remix(&[1.0, 2.0], 2, &mut quad, 4);
        assert_eq!(quad, [1.0, 2.0, 0.0, 0.0]);
    }
}
