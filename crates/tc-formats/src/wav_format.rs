//! WAV encoding and decoding for mono 16-bit PCM.

use crate::FormatError;
use std::io::Write;
use tc_engine::SampleBlock;

const NUM_CHANNELS: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;
const FMT_CHUNK_SIZE: u32 = 16;
const PCM_FORMAT: u16 = 1;

/// Size of the RIFF header plus `fmt ` and `data` chunk headers.
pub const WAV_HEADER_LEN: usize = 44;

// --- Writing ---

pub fn write_wav(w: &mut impl Write, block: &SampleBlock) -> std::io::Result<()> {
    let block_align = NUM_CHANNELS * (BITS_PER_SAMPLE / 8);
    let data_size = block.len() as u32 * block_align as u32;

    write_riff_header(w, data_size)?;
    write_fmt_chunk(w, block.sample_rate(), block_align)?;
    write_data_chunk(w, block.samples(), data_size)
}

/// Wrap a sample block in an in-memory WAV container.
pub fn block_to_wav(block: &SampleBlock) -> Vec<u8> {
    let mut buf = Vec::with_capacity(WAV_HEADER_LEN + block.len() * 2);
    write_wav(&mut buf, block).expect("Vec<u8> write cannot fail");
    buf
}

fn write_riff_header(w: &mut impl Write, data_size: u32) -> std::io::Result<()> {
    w.write_all(b"RIFF")?;
    w.write_all(&(4 + (8 + FMT_CHUNK_SIZE) + 8 + data_size).to_le_bytes())?;
    w.write_all(b"WAVE")
}

fn write_fmt_chunk(w: &mut impl Write, sample_rate: u32, block_align: u16) -> std::io::Result<()> {
    w.write_all(b"fmt ")?;
    w.write_all(&FMT_CHUNK_SIZE.to_le_bytes())?;
    w.write_all(&PCM_FORMAT.to_le_bytes())?;
    w.write_all(&NUM_CHANNELS.to_le_bytes())?;
    w.write_all(&sample_rate.to_le_bytes())?;
    w.write_all(&(sample_rate * block_align as u32).to_le_bytes())?;
    w.write_all(&block_align.to_le_bytes())?;
    w.write_all(&BITS_PER_SAMPLE.to_le_bytes())
}

fn write_data_chunk(w: &mut impl Write, samples: &[i16], data_size: u32) -> std::io::Result<()> {
    w.write_all(b"data")?;
    w.write_all(&data_size.to_le_bytes())?;
    for sample in samples {
        w.write_all(&sample.to_le_bytes())?;
    }
    Ok(())
}

// --- Reading ---

/// Load a mono 16-bit WAV file from raw bytes.
pub fn load_wav(data: &[u8]) -> Result<SampleBlock, FormatError> {
    let header = parse_header(data)?;
    let end = header.data_offset + header.data_size;
    if end > data.len() {
        return Err(FormatError::UnexpectedEof);
    }

    let samples = data[header.data_offset..end]
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();
    Ok(SampleBlock::new(samples, header.sample_rate))
}

struct WavHeader {
    sample_rate: u32,
    data_offset: usize,
    data_size: usize,
}

fn parse_header(data: &[u8]) -> Result<WavHeader, FormatError> {
    if data.len() < WAV_HEADER_LEN {
        return Err(FormatError::UnexpectedEof);
    }
    if &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        return Err(FormatError::InvalidHeader);
    }

    let mut pos = 12;
    let mut sample_rate: Option<u32> = None;
    let mut data_chunk: Option<(usize, usize)> = None;

    while pos + 8 <= data.len() {
        let chunk_id = &data[pos..pos + 4];
        let chunk_size = read_u32_le(data, pos + 4) as usize;

        if chunk_id == b"fmt " && chunk_size >= 16 && pos + 24 <= data.len() {
            let format = read_u16_le(data, pos + 8);
            let channels = read_u16_le(data, pos + 10);
            let bits = read_u16_le(data, pos + 22);
            if format != PCM_FORMAT || channels != NUM_CHANNELS || bits != BITS_PER_SAMPLE {
                return Err(FormatError::Unsupported { format, channels, bits });
            }
            sample_rate = Some(read_u32_le(data, pos + 12));
        } else if chunk_id == b"data" {
            data_chunk = Some((pos + 8, chunk_size));
        }

        pos += 8 + chunk_size;
        if pos % 2 != 0 {
            pos += 1;
        }
    }

    let sample_rate = sample_rate.ok_or(FormatError::InvalidHeader)?;
    let (data_offset, data_size) = data_chunk.ok_or(FormatError::InvalidHeader)?;

    Ok(WavHeader { sample_rate, data_offset, data_size })
}

fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}
