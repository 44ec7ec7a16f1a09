// tests/property/codec_test.rs

//! Property-based tests for the RESP codec
//! Tests that replies arriving in arbitrary fragments decode to the same frames

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use spineldb_datasource::core::protocol::{RespFrame, RespFrameCodec};
use tokio_util::codec::{Decoder, Encoder};

fn scan_reply(cursor: u64, keys: &[Vec<u8>]) -> RespFrame {
    RespFrame::Array(vec![
        RespFrame::BulkString(Bytes::from(cursor.to_string())),
        RespFrame::Array(
            keys.iter()
                .map(|k| RespFrame::BulkString(Bytes::from(k.clone())))
                .collect(),
        ),
    ])
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_fragmented_input_decodes_identically(
        cursor in any::<u64>(),
        keys in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 0..16),
        chunk in 1usize..16,
    ) {
        let frame = scan_reply(cursor, &keys);
        let mut wire = BytesMut::new();
        RespFrameCodec.encode(frame.clone(), &mut wire).unwrap();
        RespFrameCodec.encode(RespFrame::SimpleString("PONG".into()), &mut wire).unwrap();

        let mut codec = RespFrameCodec;
        let mut buf = BytesMut::new();
        let mut decoded = Vec::new();
        for piece in wire.chunks(chunk) {
            buf.extend_from_slice(piece);
            while let Some(frame) = codec.decode(&mut buf).unwrap() {
                decoded.push(frame);
            }
        }

        prop_assert!(buf.is_empty());
        prop_assert_eq!(decoded, vec![frame, RespFrame::SimpleString("PONG".into())]);
    }
}
