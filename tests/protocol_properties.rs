use card_gateway::domain::amount::{Amount, Balance};
use card_gateway::domain::batch::BatchSummary;
use card_gateway::error::GatewayError;
use card_gateway::protocol::envelope::{EncryptionEnvelope, EncryptionScheme, Identity};
use card_gateway::protocol::frame::{ControlCodes, FrameCodec, calculate_lrc};
use proptest::prelude::*;

fn printable_payload() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(0x20u8..0x7f, 0..512)
}

proptest! {
    #[test]
    fn frame_roundtrip(payload in printable_payload()) {
        let codec = FrameCodec::default();
        let frame = codec.encode(&payload).unwrap();
        prop_assert_eq!(frame.len(), payload.len() + 3);
        prop_assert_eq!(calculate_lrc(&frame), 0);
        prop_assert_eq!(codec.decode(&frame).unwrap(), payload.as_slice());
        prop_assert_eq!(codec.complete_len(&frame), Some(frame.len()));
    }

    #[test]
    fn single_byte_corruption_never_decodes(
        payload in printable_payload(),
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let codec = FrameCodec::new(ControlCodes::default());
        let mut frame = codec.encode(&payload).unwrap();
        let at = index.index(frame.len());
        frame[at] ^= flip;

        let result = codec.decode(&frame);
        prop_assert!(
            matches!(result, Err(GatewayError::Checksum { .. }) | Err(GatewayError::Framing(_))),
            "corrupted frame decoded: {:?}", result
        );
    }

    #[test]
    fn envelope_roundtrip_and_isolation(
        plaintext in "[ -~]{0,64}",
        user in "[a-z0-9]{1,12}",
        key in "[a-z0-9]{1,12}",
    ) {
        for scheme in [EncryptionScheme::None, EncryptionScheme::Tep2, EncryptionScheme::Version2] {
            let envelope = EncryptionEnvelope::new(scheme, &Identity::new(&user, &key));
            let sealed = envelope.encode(&plaintext).unwrap();
            prop_assert_eq!(envelope.decode(&sealed).unwrap(), plaintext.clone());

            if scheme.is_encrypted() {
                let other = EncryptionEnvelope::new(scheme, &Identity::new(&user, format!("{}x", key)));
                prop_assert!(matches!(other.decode(&sealed), Err(GatewayError::Decryption(_))));
            }
        }
    }

    #[test]
    fn batch_totals_match_recorded_amounts(cents in proptest::collection::vec((1u64..1_000_000, any::<bool>()), 0..50)) {
        let mut summary = BatchSummary::new(1);
        let mut expected: i64 = 0;
        for (units, refund) in &cents {
            let amount = Balance::from(Amount::from_minor_units(*units).unwrap());
            if *refund {
                summary.record(-amount);
                expected -= *units as i64;
            } else {
                summary.record(amount);
                expected += *units as i64;
            }
        }
        prop_assert_eq!(summary.transaction_count as usize, cents.len());
        prop_assert_eq!(summary.total_amount.to_minor_units().unwrap(), expected);
    }
}

#[test]
fn sealed_card_number_survives_framing() {
    let envelope = EncryptionEnvelope::new(EncryptionScheme::Version2, &Identity::new("user", "key"));
    let sealed = envelope.seal_field("4111111111111111").unwrap();
    assert!(!sealed.contains("4111111111111111"));

    let codec = FrameCodec::new(ControlCodes { start: 0x02, end: 0x03 });
    let frame = codec.encode(sealed.as_bytes()).unwrap();
    assert_eq!(frame[0], 0x02);
    assert_eq!(frame[frame.len() - 2], 0x03);
    let (lrc, body) = frame.split_last().unwrap();
    assert_eq!(*lrc, calculate_lrc(body));
    assert_eq!(*lrc, body.iter().fold(0u8, |acc, b| acc ^ b));

    let payload = std::str::from_utf8(codec.decode(&frame).unwrap()).unwrap();
    assert_eq!(payload, sealed);
    assert_eq!(envelope.open_field(payload).unwrap(), "4111111111111111");
}
