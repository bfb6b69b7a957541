//! Chunked audio and per-chunk separation results

use au_core::Sample;

/// The four stem roles, in output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StemKind {
    Vocals,
    Drums,
    Bass,
    Other,
}

/// Stems in their fixed, deterministic output order
pub const STEM_ORDER: [StemKind; 4] = [
    StemKind::Vocals,
    StemKind::Drums,
    StemKind::Bass,
    StemKind::Other,
];

impl StemKind {
    pub fn file_name(self) -> &'static str {
        match self {
            StemKind::Vocals => "vocals.wav",
            StemKind::Drums => "drums.wav",
            StemKind::Bass => "bass.wav",
            StemKind::Other => "other.wav",
        }
    }
}

/// One fixed-duration interval of a track's mono PCM
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub index: usize,
    pub total: usize,
    pub sample_rate: u32,
    pub samples: Vec<Sample>,
}

/// Four equal-length stem signals reconstructed from one chunk
#[derive(Debug, Clone)]
pub struct SeparatedAudio {
    pub vocals: Vec<Sample>,
    pub drums: Vec<Sample>,
    pub bass: Vec<Sample>,
    pub other: Vec<Sample>,
}

impl SeparatedAudio {
    pub fn with_len(len: usize) -> Self {
        Self {
            vocals: vec![0.0; len],
            drums: vec![0.0; len],
            bass: vec![0.0; len],
            other: vec![0.0; len],
        }
    }

    pub fn stem(&self, kind: StemKind) -> &[Sample] {
        match kind {
            StemKind::Vocals => &self.vocals,
            StemKind::Drums => &self.drums,
            StemKind::Bass => &self.bass,
            StemKind::Other => &self.other,
        }
    }

    pub fn stem_mut(&mut self, kind: StemKind) -> &mut Vec<Sample> {
        match kind {
            StemKind::Vocals => &mut self.vocals,
            StemKind::Drums => &mut self.drums,
            StemKind::Bass => &mut self.bass,
            StemKind::Other => &mut self.other,
        }
    }
}

/// Split mono PCM into chunks of `chunk_frames`; the last chunk may be
/// shorter but is never empty.
pub fn chunk_samples(samples: &[Sample], sample_rate: u32, chunk_frames: usize) -> Vec<AudioChunk> {
    let total = samples.len().div_ceil(chunk_frames);
    samples
        .chunks(chunk_frames)
        .enumerate()
        .map(|(index, chunk)| AudioChunk {
            index,
            total,
            sample_rate,
            samples: chunk.to_vec(),
        })
        .collect()
}
