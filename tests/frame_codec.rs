use bytes::Bytes;
use proptest::prelude::*;

use hulink::{
    FRAME_HEADER_SIZE, Frame, FrameHeader, FramePayload, FrameType, FunctionId, MAX_DATA_SIZE,
    RpcType, ServiceType,
};

fn rpc_type_strategy() -> impl Strategy<Value = RpcType> {
    prop_oneof![
        Just(RpcType::Request),
        Just(RpcType::Response),
        Just(RpcType::Notification),
    ]
}

fn correlation_strategy() -> impl Strategy<Value = u32> {
    prop_oneof![
        Just(0u32),
        Just((1u32 << 31) - 1),
        0..=((1u32 << 31) - 1),
    ]
}

proptest! {
    #[test]
    fn test_rpc_frame_roundtrips(
        rpc_type in rpc_type_strategy(),
        session_id in any::<u8>(),
        correlation_id in correlation_strategy(),
        function_id in any::<u32>(),
        json in proptest::collection::vec(any::<u8>(), 0..2048),
        bulk in proptest::collection::vec(any::<u8>(), 0..2048),
    ) {
        let frame = Frame::rpc(
            rpc_type,
            session_id,
            correlation_id,
            FunctionId::from_u32(function_id),
            Bytes::from(json.clone()),
            Bytes::from(bulk.clone()),
        );
        let decoded = Frame::decode(frame.encode()).unwrap();

        prop_assert_eq!(decoded.header().rpc_type(), rpc_type);
        prop_assert_eq!(decoded.header().session_id(), session_id);
        prop_assert_eq!(decoded.header().message_id(), correlation_id);
        match decoded.payload() {
            FramePayload::Rpc { function_id: fid, json: j, bulk: b } => {
                prop_assert_eq!(fid.as_u32(), function_id);
                prop_assert_eq!(j.as_ref(), json.as_slice());
                prop_assert_eq!(b.as_ref(), bulk.as_slice());
            }
            FramePayload::Raw(_) => prop_assert!(false, "rpc frame decoded as raw"),
        }
    }

    #[test]
    fn test_header_roundtrips(
        rpc_type in rpc_type_strategy(),
        session_id in any::<u8>(),
        message_id in any::<u32>(),
        data_size in 0..=(MAX_DATA_SIZE as u32),
    ) {
        let header = FrameHeader::new(
            FrameType::Single,
            rpc_type,
            ServiceType::Rpc,
            session_id,
            data_size,
            message_id,
        );
        let decoded = FrameHeader::from_bytes(&header.to_bytes()).unwrap();
        prop_assert_eq!(decoded, header);
        // Only 31 bits of the message ID survive the wire.
        prop_assert_eq!(decoded.message_id(), message_id & 0x7FFF_FFFF);
    }

    #[test]
    fn test_garbage_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = Frame::decode(Bytes::from(bytes));
    }

    #[test]
    fn test_truncated_frames_rejected(
        cut in 0..FRAME_HEADER_SIZE,
    ) {
        let frame = Frame::rpc(
            RpcType::Request,
            1,
            7,
            FunctionId::Alert,
            Bytes::from_static(b"{}"),
            Bytes::new(),
        );
        let encoded = frame.encode();
        prop_assert!(Frame::decode(encoded.slice(0..cut)).is_err());
    }
}
