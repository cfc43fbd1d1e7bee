// src/core/protocol/codec.rs

//! Wires `RespFrame::parse`/`encode` into `tokio_util`'s `Decoder`/`Encoder`
//! traits so a `Framed<TcpStream, RespFrameCodec>` can be used as a
//! `Stream`/`Sink` of frames directly.

use super::frame::RespFrame;
use crate::core::error::ServerError;
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

#[derive(Debug, Default, Clone, Copy)]
pub struct RespFrameCodec;

impl Decoder for RespFrameCodec {
    type Item = RespFrame;
    type Error = ServerError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RespFrame>, ServerError> {
        match RespFrame::parse(src)? {
            Some((frame, consumed)) => {
                src.advance_consumed(consumed);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<RespFrame> for RespFrameCodec {
    type Error = ServerError;

    fn encode(&mut self, item: RespFrame, dst: &mut BytesMut) -> Result<(), ServerError> {
        let mut buf = Vec::new();
        item.encode(&mut buf);
        dst.extend_from_slice(&buf);
        Ok(())
    }
}

/// Small helper trait so `decode` reads as "advance past what was consumed"
/// rather than repeating `bytes::Buf::advance` call-site noise.
trait ConsumeExt {
    fn advance_consumed(&mut self, n: usize);
}

impl ConsumeExt for BytesMut {
    fn advance_consumed(&mut self, n: usize) {
        let _ = self.split_to(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_frame_split_across_two_fills() {
        let mut codec = RespFrameCodec;
        let mut buf = BytesMut::from(&b"$5\r\nhel"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"lo\r\n");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame, RespFrame::bulk(&b"hello"[..]));
        assert!(buf.is_empty());
    }
}
