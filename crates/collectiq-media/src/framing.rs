//! Re-chunk a TTS byte stream into fixed-size playback frames.

/// Accumulates arbitrary chunks and yields frames of exactly `frame_bytes`.
#[derive(Debug)]
pub struct AudioFramer {
    frame_bytes: usize,
    pending: Vec<u8>,
}

impl AudioFramer {
    pub fn new(frame_bytes: usize) -> Self {
        Self {
            frame_bytes: frame_bytes.max(1),
            pending: Vec::with_capacity(frame_bytes.max(1) * 2),
        }
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Add a chunk and drain every complete frame.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::with_capacity(self.pending.len() / self.frame_bytes);
        while self.pending.len() >= self.frame_bytes {
            frames.push(self.pending.drain(..self.frame_bytes).collect());
        }
        frames
    }

    /// The short trailing frame, if any bytes remain.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.pending))
    }

    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_span_chunk_boundaries() {
        let mut framer = AudioFramer::new(4);

        assert!(framer.push(&[1, 2, 3]).is_empty());
        assert_eq!(framer.buffered(), 3);

        let frames = framer.push(&[4, 5, 6, 7, 8, 9]);
        assert_eq!(frames, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
        assert_eq!(framer.finish(), Some(vec![9]));
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn test_total_bytes_preserved() {
        let mut framer = AudioFramer::new(160);
        let mut total = 0;
        for size in [1usize, 500, 37, 160, 1023] {
            total += framer.push(&vec![0u8; size]).iter().map(Vec::len).sum::<usize>();
        }
        total += framer.finish().map_or(0, |f| f.len());
        assert_eq!(total, 1 + 500 + 37 + 160 + 1023);
    }

    #[test]
    fn test_zero_frame_size_is_clamped() {
        let mut framer = AudioFramer::new(0);
        assert_eq!(framer.frame_bytes(), 1);
        assert_eq!(framer.push(&[1, 2]).len(), 2);
    }
}
