//! Complete wire frames: header plus payload
//!
//! RPC-service frames split their payload into a binary sub-header, a
//! JSON document, and an opaque bulk section:
//!
//! ```text
//! [12-byte FrameHeader][4 bytes function_id][4 bytes json_size]
//! [json_size bytes JSON][remaining bytes bulk binary]
//! ```
//!
//! `data_size` in the header counts everything after the fixed header,
//! including the 8 sub-header bytes. Frames on other services carry an
//! uninterpreted payload.

use bytes::{BufMut, Bytes, BytesMut};

use super::error::FormatError;
use super::header::FrameHeader;
use super::types::{FrameType, FunctionId, RpcType, ServiceType};
use super::{BINARY_HEADER_SIZE, FRAME_HEADER_SIZE, MAX_DATA_SIZE};

/// Payload of a decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePayload {
    /// Uninterpreted bytes (control, audio, video, bulk services)
    Raw(Bytes),
    /// RPC payload with the binary sub-header split out
    Rpc {
        /// Operation this message belongs to
        function_id: FunctionId,
        /// JSON document bytes (may be empty)
        json: Bytes,
        /// Opaque bulk binary trailing the JSON (may be empty)
        bulk: Bytes,
    },
}

/// One length-delimited unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: FrameHeader,
    payload: FramePayload,
}

impl Frame {
    /// Build a single RPC frame. The header's `data_size` is computed
    /// from the payload, so the two can never disagree on the send path.
    ///
    /// The payload must fit [`MAX_DATA_SIZE`]; anything larger belongs
    /// in a multi-frame sequence, and a decoder would reject the frame.
    #[must_use]
    pub fn rpc(
        rpc_type: RpcType,
        session_id: u8,
        correlation_id: u32,
        function_id: FunctionId,
        json: Bytes,
        bulk: Bytes,
    ) -> Self {
        let data_size = BINARY_HEADER_SIZE + json.len() + bulk.len();
        debug_assert!(
            data_size <= MAX_DATA_SIZE,
            "rpc payload of {data_size} bytes exceeds the {MAX_DATA_SIZE}-byte frame limit"
        );
        let data_size = data_size as u32;
        let header = FrameHeader::new(
            FrameType::Single,
            rpc_type,
            ServiceType::Rpc,
            session_id,
            data_size,
            correlation_id,
        );
        Self {
            header,
            payload: FramePayload::Rpc {
                function_id,
                json,
                bulk,
            },
        }
    }

    /// Build a raw frame on a non-RPC service.
    #[must_use]
    pub fn raw(
        frame_type: FrameType,
        rpc_type: RpcType,
        service_type: ServiceType,
        session_id: u8,
        message_id: u32,
        payload: Bytes,
    ) -> Self {
        debug_assert!(
            payload.len() <= MAX_DATA_SIZE,
            "payload of {} bytes exceeds the {MAX_DATA_SIZE}-byte frame limit",
            payload.len()
        );
        let header = FrameHeader::new(
            frame_type,
            rpc_type,
            service_type,
            session_id,
            payload.len() as u32,
            message_id,
        );
        Self {
            header,
            payload: FramePayload::Raw(payload),
        }
    }

    /// Frame header
    #[must_use]
    pub const fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// Frame payload
    #[must_use]
    pub const fn payload(&self) -> &FramePayload {
        &self.payload
    }

    /// Serialize the whole frame
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf =
            BytesMut::with_capacity(FRAME_HEADER_SIZE + self.header.data_size() as usize);
        buf.put_slice(&self.header.to_bytes());

        match &self.payload {
            FramePayload::Raw(payload) => buf.put_slice(payload),
            FramePayload::Rpc {
                function_id,
                json,
                bulk,
            } => {
                buf.put_u32(function_id.as_u32());
                buf.put_u32(json.len() as u32);
                buf.put_slice(json);
                buf.put_slice(bulk);
            }
        }

        buf.freeze()
    }

    /// Parse a complete frame.
    ///
    /// The input must hold exactly one frame: the declared `data_size`
    /// has to match the bytes trailing the header, short input fails
    /// with [`FormatError::Truncated`] and surplus input with
    /// [`FormatError::SizeMismatch`].
    pub fn decode(bytes: Bytes) -> Result<Self, FormatError> {
        let header = FrameHeader::from_bytes(&bytes)?;

        let declared = header.data_size() as usize;
        let actual = bytes.len() - FRAME_HEADER_SIZE;
        if actual < declared {
            return Err(FormatError::Truncated {
                needed: FRAME_HEADER_SIZE + declared,
                got: bytes.len(),
            });
        }
        if actual > declared {
            return Err(FormatError::SizeMismatch { declared, actual });
        }

        let payload = bytes.slice(FRAME_HEADER_SIZE..);
        if !header.service_type().carries_rpc_payload() {
            return Ok(Self {
                header,
                payload: FramePayload::Raw(payload),
            });
        }

        if payload.len() < BINARY_HEADER_SIZE {
            return Err(FormatError::Truncated {
                needed: FRAME_HEADER_SIZE + BINARY_HEADER_SIZE,
                got: bytes.len(),
            });
        }

        let function_id = FunctionId::from_u32(u32::from_be_bytes(
            payload[0..4].try_into().expect("slice is 4 bytes"),
        ));
        let json_size = u32::from_be_bytes(payload[4..8].try_into().expect("slice is 4 bytes"))
            as usize;

        let body = payload.len() - BINARY_HEADER_SIZE;
        if json_size > body {
            return Err(FormatError::JsonOverflow {
                json_size,
                payload: body,
            });
        }

        Ok(Self {
            header,
            payload: FramePayload::Rpc {
                function_id,
                json: payload.slice(BINARY_HEADER_SIZE..BINARY_HEADER_SIZE + json_size),
                bulk: payload.slice(BINARY_HEADER_SIZE + json_size..),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_roundtrip() {
        let frame = Frame::rpc(
            RpcType::Request,
            3,
            77,
            FunctionId::PerformInteraction,
            Bytes::from_static(b"{\"initialText\":\"pick\"}"),
            Bytes::from_static(&[0xDE, 0xAD]),
        );
        let decoded = Frame::decode(frame.encode()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_empty_json_and_bulk() {
        let frame = Frame::rpc(
            RpcType::Response,
            0,
            0,
            FunctionId::CreateInteractionChoiceSet,
            Bytes::new(),
            Bytes::new(),
        );
        assert_eq!(frame.header().data_size() as usize, BINARY_HEADER_SIZE);
        assert_eq!(Frame::decode(frame.encode()).unwrap(), frame);
    }

    #[test]
    fn test_declared_size_must_match() {
        let frame = Frame::rpc(
            RpcType::Request,
            1,
            5,
            FunctionId::Alert,
            Bytes::from_static(b"{}"),
            Bytes::new(),
        );
        let mut encoded = frame.encode().to_vec();

        let mut short = encoded.clone();
        short.truncate(encoded.len() - 1);
        assert!(matches!(
            Frame::decode(Bytes::from(short)),
            Err(FormatError::Truncated { .. })
        ));

        encoded.push(0xFF);
        assert!(matches!(
            Frame::decode(Bytes::from(encoded)),
            Err(FormatError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_json_overflow_rejected() {
        let frame = Frame::rpc(
            RpcType::Request,
            1,
            5,
            FunctionId::Alert,
            Bytes::from_static(b"{}"),
            Bytes::new(),
        );
        let mut encoded = frame.encode().to_vec();
        // json_size lives at offset 16; declare more JSON than exists
        encoded[16..20].copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(
            Frame::decode(Bytes::from(encoded)),
            Err(FormatError::JsonOverflow { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "exceeds")]
    fn test_oversized_rpc_payload_rejected_at_construction() {
        let _ = Frame::rpc(
            RpcType::Request,
            1,
            5,
            FunctionId::PutFile,
            Bytes::from_static(b"{}"),
            Bytes::from(vec![0u8; MAX_DATA_SIZE]),
        );
    }

    #[test]
    fn test_payload_at_limit_roundtrips() {
        let bulk_room = MAX_DATA_SIZE - BINARY_HEADER_SIZE - 2;
        let frame = Frame::rpc(
            RpcType::Request,
            1,
            5,
            FunctionId::PutFile,
            Bytes::from_static(b"{}"),
            Bytes::from(vec![0u8; bulk_room]),
        );
        assert_eq!(Frame::decode(frame.encode()).unwrap(), frame);
    }

    #[test]
    fn test_raw_frame_roundtrip() {
        let frame = Frame::raw(
            FrameType::First,
            RpcType::Notification,
            ServiceType::Bulk,
            9,
            100,
            Bytes::from_static(&[1, 2, 3, 4]),
        );
        assert_eq!(Frame::decode(frame.encode()).unwrap(), frame);
    }
}
