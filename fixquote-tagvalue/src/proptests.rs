/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Property-based tests for the codec.
//!
//! - encode then decode preserves the ordered body fields
//! - encoded frames always validate cleanly
//! - BodyLength and CheckSum match independent recomputation

#![allow(clippy::unwrap_used)]

use crate::decoder::decode;
use crate::encoder::MessageEncoder;
use crate::validate::validate;
use fixquote_core::field::{Field, tags};
use fixquote_core::message::MsgType;
use fixquote_core::types::{CompId, SeqNum};
use proptest::prelude::*;

fn body_tag() -> impl Strategy<Value = u32> {
    (1u32..20_000).prop_filter("header and trailer tags are written by the encoder", |tag| {
        !tags::is_header(*tag) && *tag != tags::CHECK_SUM
    })
}

fn body_field() -> impl Strategy<Value = Field> {
    (body_tag(), "[ -~]{0,24}").prop_map(|(tag, value)| Field::new(tag, value))
}

fn msg_type() -> impl Strategy<Value = MsgType> {
    prop_oneof![
        Just(MsgType::Heartbeat),
        Just(MsgType::TestRequest),
        Just(MsgType::Logon),
        Just(MsgType::Logout),
        Just(MsgType::QuoteRequest),
        Just(MsgType::Quote),
        Just(MsgType::QuoteRequestReject),
    ]
}

fn encoder() -> MessageEncoder {
    MessageEncoder::new(
        "FIX.4.4",
        CompId::new("C1").unwrap(),
        CompId::new("STS").unwrap(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn encode_decode_preserves_body_fields(
        msg_type in msg_type(),
        body in prop::collection::vec(body_field(), 0..16),
        seq in 1u64..1_000_000,
    ) {
        let bytes = encoder().encode(&msg_type, &body, SeqNum::new(seq)).unwrap();
        let msg = decode(&bytes).unwrap();

        prop_assert_eq!(msg.msg_type(), &msg_type);
        prop_assert_eq!(msg.seq_num(), Some(SeqNum::new(seq)));
        let decoded: Vec<Field> = msg.body_fields().map(|f| f.to_field()).collect();
        prop_assert_eq!(decoded, body);
        prop_assert!(validate(&msg).is_empty());
    }

    #[test]
    fn body_length_matches_independent_count(
        body in prop::collection::vec(body_field(), 0..16),
    ) {
        let bytes = encoder().encode(&MsgType::Quote, &body, SeqNum::new(1)).unwrap();

        let start = memchr::memmem::find(&bytes, b"\x0135=").unwrap() + 1;
        let end = memchr::memmem::rfind(&bytes, b"\x0110=").unwrap() + 1;
        let declared_start = 2 + "FIX.4.4".len() + 1 + 2;
        let declared: usize = std::str::from_utf8(&bytes[declared_start..start - 1])
            .unwrap()
            .parse()
            .unwrap();
        prop_assert_eq!(declared, end - start);
    }

    #[test]
    fn checksum_matches_independent_sum(
        body in prop::collection::vec(body_field(), 0..16),
    ) {
        let bytes = encoder().encode(&MsgType::QuoteRequest, &body, SeqNum::new(9)).unwrap();

        let trailer = bytes.len() - "10=000".len();
        prop_assert_eq!(&bytes[trailer..trailer + 3], b"10=");
        let sum: u32 = bytes[..trailer].iter().map(|&b| u32::from(b)).sum();
        let expected = format!("{:03}", sum % 256);
        prop_assert_eq!(&bytes[trailer + 3..], expected.as_bytes());
    }
}
