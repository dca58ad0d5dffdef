//! On-disk framing for the ledger log.
//!
//! Every applied [`WriteBatch`] becomes one frame:
//!
//! ```text
//! | magic "RMLG" (4) | version u16 LE (2) | len u32 LE (4) | JSON batch (len) | crc32 u32 LE (4) |
//! ```
//!
//! The CRC covers the header and the payload.
//!
//! A frame that runs past the end of the log is only treated as torn when
//! nothing after its header looks like a whole frame. Anything else is
//! damage inside the log and is reported as corruption.

use crate::batch::WriteBatch;
use crate::error::{LedgerError, LedgerResult};

/// Magic bytes opening every frame.
pub(crate) const FRAME_MAGIC: [u8; 4] = *b"RMLG";

/// Current frame format version.
pub(crate) const FRAME_VERSION: u16 = 1;

/// magic (4) + version (2) + length (4)
pub(crate) const HEADER_SIZE: usize = 10;

const CRC_SIZE: usize = 4;

/// Largest payload a frame may carry.
pub(crate) const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Result of decoding the bytes at some offset of the log.
#[derive(Debug)]
pub(crate) enum Decoded {
    /// A whole, verified frame of `len` bytes.
    Frame { batch: WriteBatch, len: usize },
    /// The log ends in the middle of a frame.
    Torn,
}

/// Encodes a batch into a frame.
pub(crate) fn encode(batch: &WriteBatch) -> LedgerResult<Vec<u8>> {
    let payload = serde_json::to_vec(batch)
        .map_err(|e| LedgerError::corrupted(0, format!("cannot encode batch: {e}")))?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(LedgerError::corrupted(
            0,
            format!(
                "batch of {} bytes exceeds maximum frame size of {MAX_FRAME_SIZE} bytes",
                payload.len()
            ),
        ));
    }
    let len = u32::try_from(payload.len())
        .map_err(|_| LedgerError::corrupted(0, "batch exceeds maximum frame size"))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    frame.extend_from_slice(&FRAME_MAGIC);
    frame.extend_from_slice(&FRAME_VERSION.to_le_bytes());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    let crc = compute_crc32(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Decodes the frame starting at the beginning of `buf`.
///
/// `offset` is only used for error reporting.
pub(crate) fn decode(buf: &[u8], offset: u64) -> LedgerResult<Decoded> {
    if buf.len() < HEADER_SIZE {
        return Ok(Decoded::Torn);
    }

    if buf[0..4] != FRAME_MAGIC {
        return Err(LedgerError::corrupted(offset, "bad frame magic"));
    }

    let version = u16::from_le_bytes([buf[4], buf[5]]);
    if version != FRAME_VERSION {
        return Err(LedgerError::corrupted(
            offset,
            format!("unsupported frame version {version}"),
        ));
    }

    let len = u32::from_le_bytes([buf[6], buf[7], buf[8], buf[9]]) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(LedgerError::corrupted(
            offset,
            format!("frame length {len} exceeds maximum of {MAX_FRAME_SIZE}"),
        ));
    }

    let total = HEADER_SIZE + len + CRC_SIZE;
    if buf.len() < total {
        if let Some(later) = find_whole_frame(&buf[HEADER_SIZE..]) {
            return Err(LedgerError::corrupted(
                offset,
                format!(
                    "frame length {len} runs over a later frame at offset {}",
                    offset + (HEADER_SIZE + later) as u64
                ),
            ));
        }
        return Ok(Decoded::Torn);
    }

    let body_end = HEADER_SIZE + len;
    let expected = u32::from_le_bytes([
        buf[body_end],
        buf[body_end + 1],
        buf[body_end + 2],
        buf[body_end + 3],
    ]);
    let actual = compute_crc32(&buf[..body_end]);
    if expected != actual {
        return Err(LedgerError::corrupted(
            offset,
            format!("checksum mismatch: expected {expected:08x}, got {actual:08x}"),
        ));
    }

    let batch = serde_json::from_slice(&buf[HEADER_SIZE..body_end])
        .map_err(|e| LedgerError::corrupted(offset, format!("bad frame payload: {e}")))?;

    Ok(Decoded::Frame { batch, len: total })
}

/// Position of the first checksummed frame inside `buf`, if any.
fn find_whole_frame(buf: &[u8]) -> Option<usize> {
    buf.windows(FRAME_MAGIC.len())
        .enumerate()
        .filter(|(_, window)| *window == FRAME_MAGIC)
        .map(|(pos, _)| pos)
        .find(|&pos| is_whole_frame(&buf[pos..]))
}

/// Whether `buf` starts with a complete frame whose checksum matches.
fn is_whole_frame(buf: &[u8]) -> bool {
    if buf.len() < HEADER_SIZE || buf[0..4] != FRAME_MAGIC {
        return false;
    }
    let len = u32::from_le_bytes([buf[6], buf[7], buf[8], buf[9]]) as usize;
    if len > MAX_FRAME_SIZE {
        return false;
    }
    let body_end = HEADER_SIZE + len;
    if buf.len() < body_end + CRC_SIZE {
        return false;
    }
    let expected = u32::from_le_bytes([
        buf[body_end],
        buf[body_end + 1],
        buf[body_end + 2],
        buf[body_end + 3],
    ]);
    expected == compute_crc32(&buf[..body_end])
}

/// Computes CRC32 (IEEE polynomial).
pub(crate) fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
