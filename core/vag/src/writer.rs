//! Append-then-finalize writer: buffers PCM per channel, and on `finalize`
//! splits it into frames (and chunks, for interleaved streams), encodes them,
//! and patches the header's per-channel data length.

use std::io::{Seek, SeekFrom, Write};

use crate::encoder::encode_block;
use crate::error::{VagError, VagResult};
use crate::frame::{FRAME_LEN, PredictorState, SAMPLES_PER_FRAME};
use crate::header::{DATA_LENGTH_OFFSET, DEFAULT_VERSION, Header, PAYLOAD_ALIGN, payload_start};

/// Append-then-finalize VAG encoder.
pub struct VagWriter<W> {
    output: Option<W>,
    leave_open: bool,
    interleaved: bool,
    streaming_loop_flags: bool,
    sample_rate: u32,
    channel_count: u16,
    chunk_size: u32,
    channels: Vec<Vec<i16>>,
    finalized: bool,
}

impl<W: Write + Seek> VagWriter<W> {
    /// Mono, non-interleaved, no loop flags: the common case.
    pub fn new_simple(sample_rate: u32, output: W, leave_open: bool) -> VagResult<Self> {
        Self::new(false, false, sample_rate, 1, 0, output, leave_open)
    }

    /// Full constructor. Writes the header immediately (with a zeroed length
    /// field) and positions `output` at the aligned payload start.
    pub fn new(
        interleaved: bool,
        streaming_loop_flags: bool,
        sample_rate: u32,
        channel_count: u16,
        chunk_size: u32,
        mut output: W,
        leave_open: bool,
    ) -> VagResult<Self> {
        if channel_count == 0 {
            return Err(VagError::config("channel_count must be > 0"));
        }
        if sample_rate == 0 {
            return Err(VagError::config("sample_rate must be > 0"));
        }
        if interleaved && (chunk_size == 0 || chunk_size as u64 % PAYLOAD_ALIGN != 0) {
            return Err(VagError::config(
                "chunk_size must be > 0 and a multiple of 2048 for interleaved streams",
            ));
        }

        let header = Header {
            interleaved,
            version: DEFAULT_VERSION,
            interleave_chunk_size: if interleaved { chunk_size } else { 0 },
            data_length: 0,
            sample_rate,
            channel_count,
        };
        header.write(&mut output)?;
        let padding = payload_start() - crate::header::HEADER_LEN;
        output.write_all(&vec![0u8; padding as usize])?;

        Ok(VagWriter {
            output: Some(output),
            leave_open,
            interleaved,
            streaming_loop_flags,
            sample_rate,
            channel_count,
            chunk_size,
            channels: vec![Vec::new(); channel_count as usize],
            finalized: false,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    /// De-interleaves `samples` round-robin by channel. `samples.len()` must
    /// be a multiple of `channel_count`; behavior otherwise is undefined.
    pub fn append_i16(&mut self, samples: &[i16]) -> VagResult<()> {
        if self.finalized {
            return Err(VagError::WriteAfterFinalize);
        }
        let channel_count = self.channels.len();
        for (i, &sample) in samples.iter().enumerate() {
            self.channels[i % channel_count].push(sample);
        }
        Ok(())
    }

    fn output_mut(&mut self) -> &mut W {
        self.output.as_mut().expect("output present until drop")
    }

    /// Encodes all buffered PCM into frames, writes the payload, and patches
    /// the header's per-channel data length. Must be called exactly once.
    pub fn finalize(&mut self) -> VagResult<()> {
        if self.finalized {
            return Err(VagError::WriteAfterFinalize);
        }

        let data_length = if self.interleaved {
            self.finalize_interleaved()?
        } else {
            self.finalize_noninterleaved()?
        };

        let end_pos = self.output_mut().stream_position()?;
        self.output_mut().seek(SeekFrom::Start(DATA_LENGTH_OFFSET))?;
        self.output_mut()
            .write_all(&data_length.to_be_bytes())?;
        self.output_mut().seek(SeekFrom::Start(end_pos))?;

        self.finalized = true;
        Ok(())
    }

    fn finalize_noninterleaved(&mut self) -> VagResult<u32> {
        let samples = &self.channels[0];
        let block_count = samples.len().div_ceil(SAMPLES_PER_FRAME).max(1);
        let mut state = PredictorState::default();

        for block_idx in 0..block_count {
            let mut block = [0i16; SAMPLES_PER_FRAME];
            let start = block_idx * SAMPLES_PER_FRAME;
            let end = (start + SAMPLES_PER_FRAME).min(samples.len());
            block[..end - start].copy_from_slice(&samples[start..end]);

            let flags = if block_idx == block_count - 1 { 0x01 } else { 0x00 };
            let bytes = encode_block(&block, flags, &mut state);
            self.output_mut().write_all(&bytes)?;
        }

        Ok((block_count * FRAME_LEN) as u32)
    }

    fn finalize_interleaved(&mut self) -> VagResult<u32> {
        let frames_per_chunk = (self.chunk_size as usize / FRAME_LEN).max(1);
        let samples_per_chunk = frames_per_chunk * SAMPLES_PER_FRAME;
        let channel_count = self.channels.len();

        let total_samples = self.channels[0].len();
        let chunk_count = total_samples.div_ceil(samples_per_chunk).max(1);

        let mut states = vec![PredictorState::default(); channel_count];

        for chunk_idx in 0..chunk_count {
            for ch in 0..channel_count {
                let samples = &self.channels[ch];
                for frame_idx in 0..frames_per_chunk {
                    let start = chunk_idx * samples_per_chunk + frame_idx * SAMPLES_PER_FRAME;
                    let end = (start + SAMPLES_PER_FRAME).min(samples.len());

                    let mut block = [0i16; SAMPLES_PER_FRAME];
                    if start < samples.len() {
                        block[..end - start].copy_from_slice(&samples[start..end]);
                    }

                    let mut flags = 0u8;
                    if frame_idx == frames_per_chunk - 1 {
                        if self.streaming_loop_flags {
                            flags |= 0x03;
                        }
                        if chunk_idx == chunk_count - 1 {
                            flags |= 0x01;
                        }
                    }

                    let bytes = encode_block(&block, flags, &mut states[ch]);
                    self.output_mut().write_all(&bytes)?;
                }
            }
        }

        Ok((chunk_count * self.chunk_size as usize) as u32)
    }

    /// Reclaims the underlying stream. Only meaningful after `finalize`.
    pub fn into_inner(mut self) -> W {
        self.output.take().expect("output present until drop")
    }
}

impl<W> Drop for VagWriter<W> {
    fn drop(&mut self) {
        if self.leave_open {
            if let Some(inner) = self.output.take() {
                std::mem::forget(inner);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::VagReader;
    use std::io::Cursor;

    #[test]
    fn test_rejects_bad_config() {
        let buf = Cursor::new(Vec::new());
        assert!(VagWriter::new(false, false, 0, 1, 0, buf, false).is_err());

        let buf = Cursor::new(Vec::new());
        assert!(VagWriter::new(true, false, 8000, 1, 100, buf, false).is_err());

        let buf = Cursor::new(Vec::new());
        assert!(VagWriter::new(false, false, 8000, 0, 0, buf, false).is_err());
    }

    #[test]
    fn test_mono_silence_one_frame() {
        let buf = Cursor::new(Vec::new());
        let mut writer = VagWriter::new_simple(8000, buf, false).unwrap();
        writer.append_i16(&[0i16; 28]).unwrap();
        writer.finalize().unwrap();

        let bytes = writer.into_inner().into_inner();
        let payload_start = crate::header::payload_start() as usize;
        let frame = &bytes[payload_start..payload_start + FRAME_LEN];
        assert_eq!(frame[0], 0x00);
        assert_eq!(frame[1], 0x01);
        assert_eq!(&frame[2..], &[0u8; 14]);
        assert_eq!(&bytes[12..16], &[0x00, 0x00, 0x00, 0x10]);
    }

    #[test]
    fn test_mono_silence_padded_second_frame() {
        let buf = Cursor::new(Vec::new());
        let mut writer = VagWriter::new_simple(8000, buf, false).unwrap();
        writer.append_i16(&[0i16; 30]).unwrap();
        writer.finalize().unwrap();
        let bytes = writer.into_inner().into_inner();

        let mut reader = VagReader::new(Cursor::new(bytes), false).unwrap();
        let mut out = [1i16; 64];
        let n = reader.read_i16(&mut out).unwrap();
        assert_eq!(n, 56);
        assert!(out[..56].iter().all(|&s| s == 0));
    }

    #[test]
    fn test_write_after_finalize_is_an_error() {
        let buf = Cursor::new(Vec::new());
        let mut writer = VagWriter::new_simple(8000, buf, false).unwrap();
        writer.append_i16(&[0i16; 28]).unwrap();
        writer.finalize().unwrap();
        assert!(matches!(
            writer.append_i16(&[0i16; 4]),
            Err(VagError::WriteAfterFinalize)
        ));
        assert!(matches!(
            writer.finalize(),
            Err(VagError::WriteAfterFinalize)
        ));
    }

    #[test]
    fn test_interleaved_stereo_ramp_round_trips() {
        let buf = Cursor::new(Vec::new());
        let mut writer = VagWriter::new(true, false, 22050, 2, 2048, buf, false).unwrap();

        let mut interleaved = Vec::new();
        for i in 0..128i32 {
            interleaved.push((i * 10) as i16);
            interleaved.push((-i * 10) as i16);
        }
        writer.append_i16(&interleaved).unwrap();
        writer.finalize().unwrap();
        let bytes = writer.into_inner().into_inner();

        assert_eq!(&bytes[0..4], b"VAGi");
        assert_eq!(&bytes[12..16], &[0x00, 0x00, 0x08, 0x00]);

        let mut reader = VagReader::new(Cursor::new(bytes), false).unwrap();
        assert_eq!(reader.channel_count(), 2);
        assert_eq!(reader.chunk_size(), 2048);

        let mut out = vec![0i16; 256];
        let n = reader.read_i16(&mut out).unwrap();
        assert_eq!(n, 256);
        for (i, pair) in out.chunks(2).enumerate() {
            assert!((pair[0] as i32 - (i as i32 * 10)).abs() < 600);
            assert!((pair[1] as i32 - (-(i as i32) * 10)).abs() < 600);
        }
    }

    #[test]
    fn test_streaming_loop_flags_tag_every_chunk() {
        let buf = Cursor::new(Vec::new());
        let mut writer = VagWriter::new(true, true, 11025, 1, 2048, buf, false).unwrap();
        writer.append_i16(&vec![100i16; 300]).unwrap();
        writer.finalize().unwrap();
        let bytes = writer.into_inner().into_inner();

        let frames_per_chunk = 2048 / FRAME_LEN;
        let samples_per_chunk = frames_per_chunk * SAMPLES_PER_FRAME;
        let chunk_count = 300usize.div_ceil(samples_per_chunk);

        let payload_start = crate::header::payload_start() as usize;
        for c in 0..chunk_count {
            let last_frame_offset = payload_start + c * 2048 + (frames_per_chunk - 1) * FRAME_LEN;
            let flags = bytes[last_frame_offset + 1];
            assert_eq!(flags & 0x03, 0x03);
        }
    }
}
