//! Streaming pull-interface: decode a VAG stream chunk by chunk and hand PCM
//! back to the caller in interleaved order.

use std::io::{ErrorKind, Read, Seek, SeekFrom};

use crate::error::VagResult;
use crate::frame::{FRAME_LEN, PredictorState, SAMPLES_PER_FRAME, decode_frame, is_end_flag};
use crate::header::{Header, payload_start};

/// Internal chunking granularity used for non-interleaved streams. This does
/// not appear on the wire; it just bounds how much we decode per refill.
const INTERNAL_CHUNK_BYTES: u32 = 2048;

/// Reader state, per §4.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderStatus {
    Ready,
    Streaming,
    EndOfStream,
}

/// Pull-style VAG decoder. Holds per-channel predictor state and a
/// single-chunk PCM scratch buffer, refilled on exhaustion.
pub struct VagReader<R> {
    input: Option<R>,
    leave_open: bool,
    header: Header,
    states: Vec<PredictorState>,
    scratch: Vec<i16>,
    cursor: usize,
    filled: usize,
    started: bool,
    ended: bool,
}

impl<R: Read + Seek> VagReader<R> {
    /// Parses the header and positions `input` at the aligned payload start.
    pub fn new(mut input: R, leave_open: bool) -> VagResult<Self> {
        let header = Header::read(&mut input)?;
        input.seek(SeekFrom::Start(payload_start()))?;

        let channel_count = header.channel_count.max(1) as usize;
        Ok(VagReader {
            input: Some(input),
            leave_open,
            header,
            states: vec![PredictorState::default(); channel_count],
            scratch: Vec::new(),
            cursor: 0,
            filled: 0,
            started: false,
            ended: false,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.header.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.header.channel_count
    }

    pub fn interleaved(&self) -> bool {
        self.header.interleaved
    }

    /// 0 for non-interleaved streams, per the surface contract.
    pub fn chunk_size(&self) -> u32 {
        if self.header.interleaved {
            self.header.interleave_chunk_size
        } else {
            0
        }
    }

    pub fn total_samples_per_channel(&self) -> u32 {
        (self.header.data_length / FRAME_LEN as u32) * SAMPLES_PER_FRAME as u32
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.header.sample_rate == 0 {
            return 0.0;
        }
        self.total_samples_per_channel() as f64 / self.header.sample_rate as f64
    }

    pub fn status(&self) -> ReaderStatus {
        if !self.started {
            ReaderStatus::Ready
        } else if self.ended && self.cursor >= self.filled {
            ReaderStatus::EndOfStream
        } else {
            ReaderStatus::Streaming
        }
    }

    fn frames_per_chunk(&self) -> usize {
        let bytes = if self.header.interleaved {
            self.header.interleave_chunk_size
        } else {
            INTERNAL_CHUNK_BYTES
        };
        (bytes as usize / FRAME_LEN).max(1)
    }

    fn input_mut(&mut self) -> &mut R {
        self.input.as_mut().expect("input present until drop")
    }

    /// Decodes the next chunk into the scratch buffer, interleaved
    /// L,R,L,R,... Wire order within a chunk is channel-contiguous (channel 0's
    /// `frames_per_chunk` frames, then channel 1's, ...), matching the
    /// writer's `finalize_interleaved`; this only reorders into interleaved
    /// form once every channel's frames are decoded. Marks `ended` on a
    /// truncated frame or an end-of-stream flag.
    fn fill_chunk(&mut self) -> VagResult<()> {
        self.scratch.clear();
        self.cursor = 0;
        self.filled = 0;

        if self.ended {
            return Ok(());
        }

        let frames_per_chunk = self.frames_per_chunk();
        let channel_count = self.states.len();
        let mut channel_samples: Vec<Vec<i16>> = (0..channel_count)
            .map(|_| Vec::with_capacity(frames_per_chunk * SAMPLES_PER_FRAME))
            .collect();

        let mut frames_completed = vec![0usize; channel_count];
        let mut saw_end_flag = false;

        'outer: for ch in 0..channel_count {
            for _ in 0..frames_per_chunk {
                let mut bytes = [0u8; FRAME_LEN];
                match self.input_mut().read_exact(&mut bytes) {
                    Ok(()) => {
                        let decoded = decode_frame(&bytes, &mut self.states[ch]);
                        channel_samples[ch].extend_from_slice(&decoded);
                        frames_completed[ch] += 1;
                        if is_end_flag(bytes[1]) {
                            saw_end_flag = true;
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                        self.ended = true;
                        break 'outer;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        if saw_end_flag {
            self.ended = true;
        }

        // Channels may have stopped at different points on a truncated read;
        // only the frames every channel completed can be interleaved.
        let common_frames = frames_completed.iter().copied().min().unwrap_or(0);
        for samples in channel_samples.iter_mut() {
            samples.truncate(common_frames * SAMPLES_PER_FRAME);
        }

        self.scratch.reserve(common_frames * SAMPLES_PER_FRAME * channel_count);
        for i in 0..common_frames * SAMPLES_PER_FRAME {
            for samples in channel_samples.iter() {
                self.scratch.push(samples[i]);
            }
        }
        self.filled = self.scratch.len();
        Ok(())
    }

    /// Fills up to `out.len()` interleaved PCM samples. Returns the number
    /// actually written; 0 once the stream is exhausted.
    pub fn read_i16(&mut self, out: &mut [i16]) -> VagResult<usize> {
        self.started = true;
        let mut written = 0;
        while written < out.len() {
            if self.cursor >= self.filled {
                if self.ended {
                    break;
                }
                self.fill_chunk()?;
                if self.filled == 0 {
                    break;
                }
            }
            let available = self.filled - self.cursor;
            let to_copy = available.min(out.len() - written);
            out[written..written + to_copy]
                .copy_from_slice(&self.scratch[self.cursor..self.cursor + to_copy]);
            self.cursor += to_copy;
            written += to_copy;
        }
        Ok(written)
    }

    /// Like [`read_i16`](Self::read_i16), scaled to `[-1.0, 1.0)`.
    pub fn read_f32(&mut self, out: &mut [f32]) -> VagResult<usize> {
        let mut tmp = vec![0i16; out.len()];
        let written = self.read_i16(&mut tmp)?;
        for (dst, src) in out.iter_mut().zip(tmp.iter()) {
            *dst = *src as f32 / 32768.0;
        }
        Ok(written)
    }

    /// Like [`read_i16`](Self::read_i16), packed as little-endian 16-bit PCM
    /// bytes. Returns the number of *samples* written, not bytes.
    pub fn read_bytes(&mut self, out: &mut [u8]) -> VagResult<usize> {
        let capacity = out.len() / 2;
        let mut tmp = vec![0i16; capacity];
        let written = self.read_i16(&mut tmp)?;
        for (i, sample) in tmp[..written].iter().enumerate() {
            out[i * 2..i * 2 + 2].copy_from_slice(&sample.to_le_bytes());
        }
        Ok(written)
    }

    /// Returns to the payload start and zeroes predictor state.
    pub fn reset(&mut self) -> VagResult<()> {
        self.input_mut().seek(SeekFrom::Start(payload_start()))?;
        for state in self.states.iter_mut() {
            state.reset();
        }
        self.scratch.clear();
        self.cursor = 0;
        self.filled = 0;
        self.started = false;
        self.ended = false;
        Ok(())
    }

    /// Reclaims the underlying stream.
    pub fn into_inner(mut self) -> R {
        self.input.take().expect("input present until drop")
    }
}

impl<R> Drop for VagReader<R> {
    fn drop(&mut self) {
        if self.leave_open {
            if let Some(inner) = self.input.take() {
                std::mem::forget(inner);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode_block;
    use crate::header::{DEFAULT_VERSION, payload_start};
    use std::io::Cursor;

    fn mono_stream(samples_per_channel: &[i16]) -> Vec<u8> {
        let mut payload = Vec::new();
        let mut state = PredictorState::default();
        let mut iter = samples_per_channel.chunks(SAMPLES_PER_FRAME).peekable();
        while let Some(chunk) = iter.next() {
            let mut block = [0i16; SAMPLES_PER_FRAME];
            block[..chunk.len()].copy_from_slice(chunk);
            let flags = if iter.peek().is_none() { 0x01 } else { 0x00 };
            payload.extend_from_slice(&encode_block(&block, flags, &mut state));
        }

        let header = Header {
            interleaved: false,
            version: DEFAULT_VERSION,
            interleave_chunk_size: 0,
            data_length: payload.len() as u32,
            sample_rate: 8000,
            channel_count: 1,
        };
        let mut out = Vec::new();
        header.write(&mut out).unwrap();
        out.resize(payload_start() as usize, 0);
        out.extend_from_slice(&payload);
        out
    }

    #[test]
    fn test_bad_magic_is_rejected() {
        let cursor = Cursor::new(b"FOOBextra".to_vec());
        let err = VagReader::new(cursor, false).unwrap_err();
        assert!(matches!(err, crate::error::VagError::BadMagic));
    }

    #[test]
    fn test_reads_silence() {
        let bytes = mono_stream(&[0i16; 28]);
        let mut reader = VagReader::new(Cursor::new(bytes), false).unwrap();
        let mut out = [1i16; 28];
        let n = reader.read_i16(&mut out).unwrap();
        assert_eq!(n, 28);
        assert_eq!(out, [0i16; 28]);
        let n2 = reader.read_i16(&mut out).unwrap();
        assert_eq!(n2, 0);
        assert_eq!(reader.status(), ReaderStatus::EndOfStream);
    }

    #[test]
    fn test_reset_reproduces_first_read() {
        let samples: Vec<i16> = (0..56).map(|i| (i * 37 - 900) as i16).collect();
        let bytes = mono_stream(&samples);
        let mut reader = VagReader::new(Cursor::new(bytes), false).unwrap();

        let mut first = vec![0i16; 56];
        reader.read_i16(&mut first).unwrap();

        reader.reset().unwrap();
        assert_eq!(reader.status(), ReaderStatus::Ready);

        let mut second = vec![0i16; 56];
        reader.read_i16(&mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_truncated_frame_yields_zero_and_end_of_stream() {
        let mut header = Vec::new();
        Header {
            interleaved: false,
            version: DEFAULT_VERSION,
            interleave_chunk_size: 0,
            data_length: 16,
            sample_rate: 8000,
            channel_count: 1,
        }
        .write(&mut header)
        .unwrap();
        header.resize(payload_start() as usize, 0);
        header.extend_from_slice(&[0u8; 10]); // short payload: only 10 of 16 bytes

        let mut reader = VagReader::new(Cursor::new(header), false).unwrap();
        let mut out = [0i16; 28];
        let n = reader.read_i16(&mut out).unwrap();
        assert_eq!(n, 0);
        assert_eq!(reader.status(), ReaderStatus::EndOfStream);
    }
}
