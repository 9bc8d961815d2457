//! End to end exercises of the DIMSE message catalog and transport.

use dicom_dul::dimse::params::*;
use dicom_dul::dimse::{
    CCancelRq, CEchoRq, CEchoRsp, CFindRq, CFindRsp, CGetRq, CGetRsp, CMoveRq, CMoveRsp, CStoreRq,
    CStoreRsp, Message, MessageDecoder, Priority, StatusType, NO_DATA_SET, STATUS_CANCEL,
    STATUS_PENDING, STATUS_PENDING_WARNING, STATUS_SUCCESS,
};
use dicom_dul::pdu::{PDataValue, Pdu};
use rstest::rstest;

const VERIFICATION: &str = "1.2.840.10008.1.1";
const SECONDARY_CAPTURE: &str = "1.2.840.10008.5.1.4.1.1.7";
const STUDY_ROOT_QR_FIND: &str = "1.2.840.10008.5.1.4.1.2.2.1";

fn pdvs(pdu: &Pdu) -> &[PDataValue] {
    match pdu {
        Pdu::PData { data } => data,
        other => panic!("expected P-DATA-TF, got {:?}", other),
    }
}

/// Feed every PDU to a fresh receiver and require exactly one completion,
/// on the last PDU.
fn reassemble(pdus: &[Pdu]) -> Message {
    let mut decoder = MessageDecoder::new();
    let mut result = None;
    for (i, pdu) in pdus.iter().enumerate() {
        let outcome = decoder.process(pdvs(pdu)).expect("decoding should succeed");
        if let Some(message) = outcome {
            assert_eq!(i, pdus.len() - 1, "completion must happen on the last PDU");
            assert!(result.is_none());
            result = Some(message);
        }
    }
    result.expect("message should be complete")
}

#[test]
fn tiny_echo_request_fits_one_pdu() {
    let params = CEchoServiceParameters {
        affected_sop_class_uid: VERIFICATION.to_string(),
        message_id: 7,
        ..Default::default()
    };
    let msg = Message::from(CEchoRq::from_params(&params));

    let pdus = msg.encode(1, 16_384).unwrap();
    assert_eq!(pdus.len(), 1);

    let values = pdvs(&pdus[0]);
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].presentation_context_id, 1);
    assert_eq!(values[0].control_header(), 0x03);

    match reassemble(&pdus) {
        Message::CEchoRq(echo) => {
            let roundtrip = echo.to_params();
            assert_eq!(roundtrip.affected_sop_class_uid, VERIFICATION);
            assert_eq!(roundtrip.message_id, 7);
        }
        other => panic!("expected C-ECHO-RQ, got {:?}", other),
    }
}

#[test]
fn large_store_request_fragments_and_reassembles() {
    let data_set: Vec<u8> = (0..10 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
    let msg = Message::from(CStoreRq {
        affected_sop_class_uid: SECONDARY_CAPTURE.to_string(),
        affected_sop_instance_uid: "1.2.3.4.5.6".to_string(),
        message_id: 42,
        priority: Priority::Medium,
        move_originator_aet: None,
        move_originator_message_id: None,
        data_set: data_set.clone(),
    });

    let max_pdu_length = 4096;
    let pdus = msg.encode(1, max_pdu_length).unwrap();

    // one command PDU plus ceil(len / 4090) data PDUs
    let chunk = (max_pdu_length - 6) as usize;
    let expected_data_pdus = (data_set.len() + chunk - 1) / chunk;
    assert_eq!(pdus.len(), 1 + expected_data_pdus);

    assert_eq!(pdvs(&pdus[0])[0].control_header(), 0x03);
    for pdu in &pdus[1..pdus.len() - 1] {
        assert_eq!(pdvs(pdu)[0].control_header(), 0x00);
    }
    assert_eq!(pdvs(pdus.last().unwrap())[0].control_header(), 0x02);

    match reassemble(&pdus) {
        Message::CStoreRq(store) => {
            assert_eq!(store.data_set, data_set);
            assert_eq!(store.message_id, 42);
        }
        other => panic!("expected C-STORE-RQ, got {:?}", other),
    }
}

#[test]
fn find_response_sequence_distinguishes_pending_from_final() {
    // a small but valid implicit VR identifier: (0008,0052) CS "STUDY "
    let identifier = vec![
        0x08, 0x00, 0x52, 0x00, 0x06, 0x00, 0x00, 0x00, b'S', b'T', b'U', b'D', b'Y', b' ',
    ];

    let pending = Message::from(CFindRsp {
        affected_sop_class_uid: STUDY_ROOT_QR_FIND.to_string(),
        message_id_being_responded_to: 5,
        status: STATUS_PENDING,
        identifier: Some(identifier.clone()),
    });
    let done = Message::from(CFindRsp {
        affected_sop_class_uid: STUDY_ROOT_QR_FIND.to_string(),
        message_id_being_responded_to: 5,
        status: STATUS_SUCCESS,
        identifier: None,
    });

    let pending_pdus = pending.encode(1, 16_384).unwrap();
    // command set and identifier travel in separate PDUs
    assert_eq!(pending_pdus.len(), 2);
    match reassemble(&pending_pdus) {
        Message::CFindRsp(rsp) => {
            assert_eq!(rsp.status, STATUS_PENDING);
            assert_eq!(rsp.identifier, Some(identifier));
        }
        other => panic!("expected C-FIND-RSP, got {:?}", other),
    }

    let done_pdus = done.encode(1, 16_384).unwrap();
    assert_eq!(done_pdus.len(), 1);
    match reassemble(&done_pdus) {
        Message::CFindRsp(rsp) => {
            assert_eq!(rsp.status, STATUS_SUCCESS);
            assert_eq!(rsp.identifier, None);
        }
        other => panic!("expected C-FIND-RSP, got {:?}", other),
    }
}

fn sample_messages() -> Vec<Message> {
    let identifier = vec![
        0x08, 0x00, 0x52, 0x00, 0x06, 0x00, 0x00, 0x00, b'S', b'T', b'U', b'D', b'Y', b' ',
    ];
    vec![
        Message::from(CEchoRq {
            affected_sop_class_uid: VERIFICATION.to_string(),
            message_id: 1,
        }),
        Message::from(CEchoRsp {
            affected_sop_class_uid: VERIFICATION.to_string(),
            message_id_being_responded_to: 1,
            status: STATUS_SUCCESS,
        }),
        Message::from(CStoreRq {
            affected_sop_class_uid: SECONDARY_CAPTURE.to_string(),
            affected_sop_instance_uid: "1.2.3.4".to_string(),
            message_id: 2,
            priority: Priority::High,
            move_originator_aet: Some("MOVE-SCU".to_string()),
            move_originator_message_id: Some(17),
            data_set: vec![0xDE, 0xAD, 0xBE, 0xEF],
        }),
        Message::from(CStoreRsp {
            affected_sop_class_uid: SECONDARY_CAPTURE.to_string(),
            affected_sop_instance_uid: "1.2.3.4".to_string(),
            message_id_being_responded_to: 2,
            status: STATUS_SUCCESS,
        }),
        Message::from(CFindRq {
            affected_sop_class_uid: STUDY_ROOT_QR_FIND.to_string(),
            message_id: 3,
            priority: Priority::Low,
            identifier: identifier.clone(),
        }),
        Message::from(CFindRsp {
            affected_sop_class_uid: STUDY_ROOT_QR_FIND.to_string(),
            message_id_being_responded_to: 3,
            status: STATUS_PENDING,
            identifier: Some(identifier.clone()),
        }),
        Message::from(CGetRq {
            affected_sop_class_uid: STUDY_ROOT_QR_FIND.to_string(),
            message_id: 4,
            priority: Priority::Medium,
            identifier: identifier.clone(),
        }),
        Message::from(CGetRsp {
            affected_sop_class_uid: STUDY_ROOT_QR_FIND.to_string(),
            message_id_being_responded_to: 4,
            status: STATUS_SUCCESS,
            remaining: 0,
            completed: 3,
            failed: 0,
            warning: 1,
            identifier: None,
        }),
        Message::from(CMoveRq {
            affected_sop_class_uid: STUDY_ROOT_QR_FIND.to_string(),
            message_id: 5,
            priority: Priority::Medium,
            move_destination: "STORE-SCP".to_string(),
            identifier,
        }),
        Message::from(CMoveRsp {
            affected_sop_class_uid: STUDY_ROOT_QR_FIND.to_string(),
            message_id_being_responded_to: 5,
            status: STATUS_SUCCESS,
            remaining: 0,
            completed: 2,
            failed: 1,
            warning: 0,
            identifier: None,
        }),
        Message::from(CCancelRq {
            message_id_being_responded_to: 5,
        }),
    ]
}

#[rstest]
#[case(16)]
#[case(64)]
#[case(16_384)]
fn every_variant_survives_encode_decode(#[case] max_pdu_length: u32) {
    for msg in sample_messages() {
        let pdus = msg.encode(1, max_pdu_length).unwrap();
        let decoded = reassemble(&pdus);
        assert_eq!(decoded, msg, "mismatch at max_pdu_length {}", max_pdu_length);
    }
}

#[test]
fn data_set_type_matches_payload_presence() {
    use dicom_dictionary_std::tags;

    for msg in sample_messages() {
        let obj = msg.command_set();
        let data_set_type = obj
            .element(tags::COMMAND_DATA_SET_TYPE)
            .unwrap()
            .to_int::<u16>()
            .unwrap();
        assert_eq!(
            data_set_type == NO_DATA_SET,
            msg.data_set().is_none(),
            "inconsistent data set type for {:?}",
            msg.command_field()
        );
    }
}

#[test]
fn params_roundtrip_on_required_fields() {
    let echo = CEchoServiceParameters {
        affected_sop_class_uid: VERIFICATION.to_string(),
        message_id: 11,
        message_id_being_responded_to: 11,
        status: STATUS_SUCCESS,
    };
    assert_eq!(CEchoRq::from_params(&echo).to_params().message_id, 11);
    let rsp = CEchoRsp::from_params(&echo).to_params();
    assert_eq!(rsp.message_id_being_responded_to, 11);
    assert_eq!(rsp.status, STATUS_SUCCESS);

    let store = CStoreServiceParameters {
        affected_sop_class_uid: SECONDARY_CAPTURE.to_string(),
        affected_sop_instance_uid: "1.2.3".to_string(),
        message_id: 12,
        priority: Priority::High,
        move_originator_aet: Some("MOVE-SCU".to_string()),
        move_originator_message_id: Some(4),
        data_set: Some(vec![1, 2]),
        ..Default::default()
    };
    let back = CStoreRq::from_params(&store).to_params();
    assert_eq!(back.affected_sop_class_uid, store.affected_sop_class_uid);
    assert_eq!(
        back.affected_sop_instance_uid,
        store.affected_sop_instance_uid
    );
    assert_eq!(back.message_id, store.message_id);
    assert_eq!(back.priority, store.priority);
    assert_eq!(back.move_originator_aet, store.move_originator_aet);
    assert_eq!(
        back.move_originator_message_id,
        store.move_originator_message_id
    );
    assert_eq!(back.data_set, store.data_set);

    let find = CFindServiceParameters {
        affected_sop_class_uid: STUDY_ROOT_QR_FIND.to_string(),
        message_id: 13,
        priority: Priority::Low,
        identifier: Some(vec![9, 9]),
        ..Default::default()
    };
    let back = CFindRq::from_params(&find).to_params();
    assert_eq!(back.affected_sop_class_uid, find.affected_sop_class_uid);
    assert_eq!(back.message_id, find.message_id);
    assert_eq!(back.identifier, find.identifier);

    let mv = CMoveServiceParameters {
        affected_sop_class_uid: STUDY_ROOT_QR_FIND.to_string(),
        message_id: 14,
        move_destination: "STORE-SCP".to_string(),
        identifier: Some(vec![7]),
        ..Default::default()
    };
    let back = CMoveRq::from_params(&mv).to_params();
    assert_eq!(back.move_destination, mv.move_destination);
    assert_eq!(back.identifier, mv.identifier);

    let get = CGetServiceParameters {
        affected_sop_class_uid: STUDY_ROOT_QR_FIND.to_string(),
        message_id_being_responded_to: 15,
        remaining: 4,
        completed: 1,
        failed: 0,
        warning: 0,
        ..Default::default()
    };
    let back = CGetRsp::from_params(&get).to_params();
    assert_eq!(back.message_id_being_responded_to, 15);
    assert_eq!(back.remaining, 4);
    assert_eq!(back.completed, 1);

    let cancel = CCancelServiceParameters {
        message_id_being_responded_to: 16,
    };
    assert_eq!(
        CCancelRq::from_params(&cancel).to_params(),
        cancel
    );
}

#[test]
fn status_codes_classify_as_expected() {
    assert_eq!(StatusType::try_from(STATUS_SUCCESS), Ok(StatusType::Success));
    assert_eq!(StatusType::try_from(STATUS_CANCEL), Ok(StatusType::Cancel));
    assert_eq!(StatusType::try_from(STATUS_PENDING), Ok(StatusType::Pending));
    assert_eq!(
        StatusType::try_from(STATUS_PENDING_WARNING),
        Ok(StatusType::Pending)
    );
    // refused: out of resources
    assert_eq!(StatusType::try_from(0xA700), Ok(StatusType::Failure));
    // coercion of data elements
    assert_eq!(StatusType::try_from(0xB000), Ok(StatusType::Warning));
    assert_eq!(StatusType::try_from(0xC000), Err(0xC000));
}

#[test]
fn store_request_preserves_empty_move_originator_on_the_wire() {
    let msg = Message::from(CStoreRq {
        affected_sop_class_uid: SECONDARY_CAPTURE.to_string(),
        affected_sop_instance_uid: "1.2.3.4".to_string(),
        message_id: 1,
        priority: Priority::Medium,
        move_originator_aet: None,
        move_originator_message_id: None,
        data_set: vec![0x00, 0x01],
    });

    match reassemble(&msg.encode(1, 16_384).unwrap()) {
        Message::CStoreRq(store) => {
            assert_eq!(store.move_originator_aet, None);
            assert_eq!(store.move_originator_message_id, None);
        }
        other => panic!("expected C-STORE-RQ, got {:?}", other),
    }
}

#[test]
fn decoder_buffers_across_multiple_pdus() {
    let msg = Message::from(CEchoRq {
        affected_sop_class_uid: VERIFICATION.to_string(),
        message_id: 3,
    });
    // a tiny maximum PDU length forces the command set over several PDUs
    let pdus = msg.encode(1, 16).unwrap();
    assert!(pdus.len() > 1);
    assert_eq!(reassemble(&pdus), msg);
}
