use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::{Error, Result};
use super::schema::SUBSYSTEM_APPSRV;
use super::{HEADER_SIZE, MAX_PAYLOAD_SIZE};

/// One length-delimited unit of the app server wire protocol
///
/// ```text
/// [length: u16 LE][subsystem: u8][command: u8][payload: length bytes]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Subsystem id from the header
    pub subsystem: u8,
    /// Command id from the header
    pub command: u8,
    /// Encoded payload
    pub payload: Bytes,
}

impl Frame {
    /// Creates an app server frame
    pub fn new(command: u8, payload: impl Into<Bytes>) -> Self {
        Frame {
            subsystem: SUBSYSTEM_APPSRV,
            command,
            payload: payload.into(),
        }
    }

    /// Number of bytes the frame occupies on the wire
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Builds the wire bytes of an app server frame
///
/// The command id is always taken from the caller, never from the payload.
pub fn encode_frame(command: u8, payload: &[u8]) -> Result<Bytes> {
    let mut dst = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    write_frame(SUBSYSTEM_APPSRV, command, payload, &mut dst)?;
    Ok(dst.freeze())
}

/// Splits a complete buffer into frames
///
/// Unlike [`FrameCodec`], which waits for more bytes, a frame that does not fit
/// in `buffer` is a framing error here.
pub fn decode_stream(buffer: &[u8]) -> Result<Vec<Frame>> {
    let mut frames = Vec::new();
    let mut rest = buffer;

    while !rest.is_empty() {
        if rest.len() < HEADER_SIZE {
            return Err(Error::framing(format!(
                "{} trailing bytes do not form a frame header",
                rest.len()
            )));
        }

        let length = u16::from_le_bytes([rest[0], rest[1]]) as usize;
        let total = HEADER_SIZE + length;
        if rest.len() < total {
            return Err(Error::framing(format!(
                "frame declares {} payload bytes but only {} are available",
                length,
                rest.len() - HEADER_SIZE
            )));
        }

        frames.push(Frame {
            subsystem: rest[2],
            command: rest[3],
            payload: Bytes::copy_from_slice(&rest[HEADER_SIZE..total]),
        });
        rest = &rest[total..];
    }

    Ok(frames)
}

fn write_frame(subsystem: u8, command: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(Error::framing(format!(
            "payload of {} bytes exceeds the {} byte limit",
            payload.len(),
            MAX_PAYLOAD_SIZE
        )));
    }

    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u16_le(payload.len() as u16);
    dst.put_u8(subsystem);
    dst.put_u8(command);
    dst.extend_from_slice(payload);
    Ok(())
}

/// Streaming frame codec for the app server socket
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl FrameCodec {
    /// Creates a new frame codec
    pub fn new() -> Self {
        FrameCodec
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < HEADER_SIZE {
            // Need more data to read the header
            return Ok(None);
        }

        let length = u16::from_le_bytes([src[0], src[1]]) as usize;
        if src.len() < HEADER_SIZE + length {
            src.reserve(HEADER_SIZE + length - src.len());
            return Ok(None);
        }

        let subsystem = src[2];
        let command = src[3];
        src.advance(HEADER_SIZE);
        let payload = src.split_to(length).freeze();

        Ok(Some(Frame { subsystem, command, payload }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => {
                let leftover = src.len();
                src.clear();
                Err(Error::framing(format!(
                    "connection closed with {} bytes of an incomplete frame",
                    leftover
                )))
            }
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        write_frame(item.subsystem, item.command, &item.payload, dst)
    }
}
