//! Sample type and interleaved buffer helpers

/// Type alias for audio samples (f64 on the processing path)
pub type Sample = f64;

/// Number of frames in an interleaved buffer
#[inline]
pub fn frame_count(interleaved: &[Sample], channels: usize) -> usize {
    if channels == 0 {
        0
    } else {
        interleaved.len() / channels
    }
}

/// Mix an interleaved frame down to a single mono sample
#[inline]
pub fn mono_mix(frame: &[Sample]) -> Sample {
    if frame.is_empty() {
        return 0.0;
    }
    frame.iter().sum::<Sample>() / frame.len() as Sample
}
