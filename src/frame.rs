//! Wire framing for the LD2410's two frame dialects.
//!
//! Command/ack frames and report frames share one bytestream but use
//! distinct head and trailer magics:
//!
//! - commands/acks: `FD FC FB FA | len:u16le | payload | 04 03 02 01`
//! - reports:       `F4 F3 F2 F1 | len:u16le | payload | F8 F7 F6 F5`
//!
//! There is no CRC; integrity comes from the magics plus the length field.
//! [`FrameCodec`] implements a resynchronising [`Decoder`]: garbage between
//! frames is skipped to the next recognisable head, and a head whose trailer
//! does not check out costs exactly one discarded byte, so the scan always
//! makes forward progress.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::error::FrameError;

pub const COMMAND_HEAD: [u8; 4] = [0xFD, 0xFC, 0xFB, 0xFA];
pub const COMMAND_TRAILER: [u8; 4] = [0x04, 0x03, 0x02, 0x01];
pub const REPORT_HEAD: [u8; 4] = [0xF4, 0xF3, 0xF2, 0xF1];
pub const REPORT_TRAILER: [u8; 4] = [0xF8, 0xF7, 0xF6, 0xF5];

/// Smallest possible frame: head + length word + empty payload + trailer.
pub const FRAME_MIN_SIZE: usize = 10;

/// A validated wire frame, tagged by dialect, carrying its raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Command or ack frame (host ↔ device).
    Command(Bytes),
    /// Periodic report frame (device → host).
    Report(Bytes),
}

impl Frame {
    pub fn command(payload: impl Into<Bytes>) -> Self {
        Frame::Command(payload.into())
    }

    pub fn report(payload: impl Into<Bytes>) -> Self {
        Frame::Report(payload.into())
    }

    /// The intra-frame payload bytes.
    pub fn payload(&self) -> &Bytes {
        match self {
            Frame::Command(data) | Frame::Report(data) => data,
        }
    }

    fn magics(&self) -> (&'static [u8; 4], &'static [u8; 4]) {
        match self {
            Frame::Command(_) => (&COMMAND_HEAD, &COMMAND_TRAILER),
            Frame::Report(_) => (&REPORT_HEAD, &REPORT_TRAILER),
        }
    }

    /// Serialise the frame to its wire form.
    pub fn to_bytes(&self) -> Bytes {
        let payload = self.payload();
        let (head, trailer) = self.magics();
        let mut buf = BytesMut::with_capacity(FRAME_MIN_SIZE + payload.len());
        buf.put_slice(head);
        buf.put_u16_le(payload.len() as u16);
        buf.put_slice(payload);
        buf.put_slice(trailer);
        buf.freeze()
    }

    /// Parse one frame from the start of `src`.
    ///
    /// Returns the frame and the number of bytes it occupies. `src` must
    /// begin with one of the two head magics.
    pub fn parse(src: &[u8]) -> Result<(Self, usize), FrameError> {
        if src.len() < FRAME_MIN_SIZE {
            return Err(FrameError::FrameTooShort {
                expected: FRAME_MIN_SIZE,
                actual: src.len(),
            });
        }

        let head = [src[0], src[1], src[2], src[3]];
        let trailer = match head {
            COMMAND_HEAD => COMMAND_TRAILER,
            REPORT_HEAD => REPORT_TRAILER,
            other => return Err(FrameError::BadMagic(other)),
        };

        let length = u16::from_le_bytes([src[4], src[5]]) as usize;
        let total = FRAME_MIN_SIZE + length;
        if src.len() < total {
            return Err(FrameError::truncated(total, src.len()));
        }
        let tail = &src[6 + length..total];
        if tail != trailer {
            return Err(FrameError::BadTrailer([tail[0], tail[1], tail[2], tail[3]]));
        }

        let payload = Bytes::copy_from_slice(&src[6..6 + length]);
        let frame = match head {
            COMMAND_HEAD => Frame::Command(payload),
            _ => Frame::Report(payload),
        };
        Ok((frame, total))
    }
}

/// Position of the earliest head magic (either dialect) in `src`.
fn find_head(src: &[u8]) -> Option<usize> {
    src.windows(4)
        .position(|window| window == COMMAND_HEAD || window == REPORT_HEAD)
}

/// Resynchronising codec for the multiplexed LD2410 bytestream.
#[derive(Debug, Default)]
pub struct FrameCodec {
    _private: (),
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&frame.to_bytes());
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Self::Error> {
        loop {
            let Some(pos) = find_head(&src[..]) else {
                // No head in sight. Everything but a possible head prefix at
                // the tail is garbage and can go.
                if src.len() > 3 {
                    let skipped = src.len() - 3;
                    warn!(skipped, "skipping garbage bytes: {:02x?}", &src[..skipped]);
                    src.advance(skipped);
                }
                return Ok(None);
            };

            if pos > 0 {
                warn!(skipped = pos, "skipping garbage bytes: {:02x?}", &src[..pos]);
                src.advance(pos);
            }

            match Frame::parse(&src[..]) {
                Ok((frame, consumed)) => {
                    src.advance(consumed);
                    return Ok(Some(frame));
                }
                Err(FrameError::FrameTooShort { .. }) | Err(FrameError::TruncatedPayload { .. }) => {
                    // Wait for the rest of the frame.
                    return Ok(None);
                }
                Err(err) => {
                    // Head looked right but the frame is corrupted. One byte
                    // goes, then the scan resumes.
                    warn!(%err, "resynchronising after corrupted frame");
                    src.advance(1);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Self::Error> {
        let frame = self.decode(src)?;
        if frame.is_none() && !src.is_empty() {
            warn!(remaining = src.len(), "discarding partial frame at end of stream");
            src.clear();
        }
        Ok(frame)
    }
}
