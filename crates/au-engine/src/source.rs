//! PCM sources for the playback engine
//!
//! A source delivers interleaved stereo f64 frames on the audio thread.
//! Implementations must be allocation-free and non-blocking in `read`;
//! decode work belongs on another thread feeding a buffer the source
//! drains.

use au_core::{frame_count, Sample};

/// Seekable interleaved stereo PCM supplier.
///
/// `read` fills `out` (interleaved stereo, `out.len() / 2` frames) and
/// returns the number of frames written. A short count means the track
/// ended; the remainder of `out` is left untouched.
pub trait PcmSource: Send {
    fn read(&mut self, out: &mut [Sample]) -> usize;

    /// Jump to an absolute frame position. Positions past the end clamp
    /// to the end.
    fn seek(&mut self, frame: u64);

    /// Total length in frames, if known
    fn len_frames(&self) -> Option<u64> {
        None
    }
}

/// Endless silence. Used when the engine has no track loaded.
pub struct SilenceSource;

impl PcmSource for SilenceSource {
    fn read(&mut self, out: &mut [Sample]) -> usize {
        out.fill(0.0);
        frame_count(out, 2)
    }

    fn seek(&mut self, _frame: u64) {}
}

/// In-memory interleaved stereo buffer source
pub struct MemorySource {
    samples: Vec<Sample>,
    position: u64,
}

impl MemorySource {
    /// `samples` is interleaved stereo; a trailing odd sample is dropped.
    pub fn new(mut samples: Vec<Sample>) -> Self {
        samples.truncate(samples.len() & !1);
        Self {
            samples,
            position: 0,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }
}

impl PcmSource for MemorySource {
    fn read(&mut self, out: &mut [Sample]) -> usize {
        let total_frames = self.samples.len() as u64 / 2;
        let start = self.position.min(total_frames);
        let frames = ((total_frames - start) as usize).min(frame_count(out, 2));
        let begin = (start * 2) as usize;
        out[..frames * 2].copy_from_slice(&self.samples[begin..begin + frames * 2]);
        self.position = start + frames as u64;
        frames
    }

    fn seek(&mut self, frame: u64) {
        self.position = frame.min(self.samples.len() as u64 / 2);
    }

    fn len_frames(&self) -> Option<u64> {
        Some(self.samples.len() as u64 / 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_reads_and_ends() {
        let mut src = MemorySource::new(vec![0.1; 10]); // 5 frames
        let mut out = [0.0; 8];
        assert_eq!(src.read(&mut out), 4);
        assert_eq!(src.read(&mut out), 1);
        assert_eq!(src.read(&mut out), 0);
    }

    #[test]
    fn test_memory_source_seek_clamps() {
        let mut src = MemorySource::new(vec![0.5; 20]);
        src.seek(1_000_000);
        assert_eq!(src.position(), 10);
        src.seek(3);
        let mut out = [0.0; 4];
        assert_eq!(src.read(&mut out), 2);
        assert_eq!(src.position(), 5);
    }

    #[test]
    fn test_silence_source() {
        let mut src = SilenceSource;
        let mut out = [1.0; 16];
        assert_eq!(src.read(&mut out), 8);
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
