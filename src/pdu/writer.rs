//! PDU writer module
use crate::pdu::*;
use byteordered::byteorder::{BigEndian, WriteBytesExt};
use dicom_encoding::text::{DefaultCharacterSetCodec, TextCodec};
use snafu::{Backtrace, ResultExt, Snafu};
use std::io::Write;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("could not write PDU field `{}`", field))]
    WritePduField {
        field: &'static str,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("could not encode text field `{}`", field))]
    EncodeText {
        field: &'static str,
        #[snafu(backtrace)]
        source: dicom_encoding::text::EncodeTextError,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Build a chunk of data through `func`
/// and write it out prefixed by its length as a 32-bit big endian integer.
fn write_chunk_u32<F>(writer: &mut dyn Write, field: &'static str, func: F) -> Result<()>
where
    F: FnOnce(&mut Vec<u8>) -> Result<()>,
{
    let mut data = vec![];
    func(&mut data)?;

    writer
        .write_u32::<BigEndian>(data.len() as u32)
        .context(WritePduFieldSnafu { field })?;
    writer.write_all(&data).context(WritePduFieldSnafu { field })
}

/// Build a chunk of data through `func`
/// and write it out prefixed by its length as a 16-bit big endian integer.
fn write_chunk_u16<F>(writer: &mut dyn Write, field: &'static str, func: F) -> Result<()>
where
    F: FnOnce(&mut Vec<u8>) -> Result<()>,
{
    let mut data = vec![];
    func(&mut data)?;

    writer
        .write_u16::<BigEndian>(data.len() as u16)
        .context(WritePduFieldSnafu { field })?;
    writer.write_all(&data).context(WritePduFieldSnafu { field })
}

/// Write one 16-character AE title field,
/// padded with trailing spaces.
fn write_ae_title(
    writer: &mut dyn Write,
    codec: &dyn TextCodec,
    ae_title: &str,
    field: &'static str,
) -> Result<()> {
    let mut bytes = codec.encode(ae_title).context(EncodeTextSnafu { field })?;
    bytes.resize(16, b' ');
    writer.write_all(&bytes).context(WritePduFieldSnafu { field })
}

/// Write a PDU to the given destination.
pub fn write_pdu<W>(writer: &mut W, pdu: &Pdu) -> Result<()>
where
    W: Write,
{
    let codec = DefaultCharacterSetCodec;
    match pdu {
        Pdu::AssociationRQ(AssociationRQ {
            protocol_version,
            calling_ae_title,
            called_ae_title,
            application_context_name,
            presentation_contexts,
            user_variables,
        }) => {
            writer
                .write_all(&[0x01, 0x00])
                .context(WritePduFieldSnafu { field: "PDU-type" })?;

            write_chunk_u32(writer, "A-ASSOCIATE-RQ", |writer| {
                writer
                    .write_u16::<BigEndian>(*protocol_version)
                    .context(WritePduFieldSnafu {
                        field: "Protocol-version",
                    })?;
                writer
                    .write_u16::<BigEndian>(0x00)
                    .context(WritePduFieldSnafu { field: "reserved" })?;
                write_ae_title(writer, &codec, called_ae_title, "Called-AE-title")?;
                write_ae_title(writer, &codec, calling_ae_title, "Calling-AE-title")?;
                writer
                    .write_all(&[0; 32])
                    .context(WritePduFieldSnafu { field: "reserved" })?;

                write_application_context(writer, &codec, application_context_name)?;
                for presentation_context in presentation_contexts {
                    write_presentation_context_proposed(writer, &codec, presentation_context)?;
                }
                write_user_variables(writer, &codec, user_variables)
            })
        }
        Pdu::AssociationAC(AssociationAC {
            protocol_version,
            application_context_name,
            called_ae_title,
            calling_ae_title,
            presentation_contexts,
            user_variables,
        }) => {
            writer
                .write_all(&[0x02, 0x00])
                .context(WritePduFieldSnafu { field: "PDU-type" })?;

            write_chunk_u32(writer, "A-ASSOCIATE-AC", |writer| {
                writer
                    .write_u16::<BigEndian>(*protocol_version)
                    .context(WritePduFieldSnafu {
                        field: "Protocol-version",
                    })?;
                writer
                    .write_u16::<BigEndian>(0x00)
                    .context(WritePduFieldSnafu { field: "reserved" })?;
                write_ae_title(writer, &codec, called_ae_title, "Called-AE-title")?;
                write_ae_title(writer, &codec, calling_ae_title, "Calling-AE-title")?;
                writer
                    .write_all(&[0; 32])
                    .context(WritePduFieldSnafu { field: "reserved" })?;

                write_application_context(writer, &codec, application_context_name)?;
                for presentation_context in presentation_contexts {
                    write_presentation_context_result(writer, &codec, presentation_context)?;
                }
                write_user_variables(writer, &codec, user_variables)
            })
        }
        Pdu::AssociationRJ(AssociationRJ { result, source }) => {
            writer
                .write_all(&[0x03, 0x00])
                .context(WritePduFieldSnafu { field: "PDU-type" })?;

            write_chunk_u32(writer, "A-ASSOCIATE-RJ", |writer| {
                let (source_code, reason_code) = source.codes();
                writer
                    .write_all(&[0x00, result.code(), source_code, reason_code])
                    .context(WritePduFieldSnafu {
                        field: "Result/Source/Reason",
                    })
            })
        }
        Pdu::PData { data } => {
            writer
                .write_all(&[0x04, 0x00])
                .context(WritePduFieldSnafu { field: "PDU-type" })?;

            write_chunk_u32(writer, "P-DATA-TF", |writer| {
                for value in data {
                    write_chunk_u32(writer, "Presentation-data-value", |writer| {
                        writer
                            .write_all(&[value.presentation_context_id, value.control_header()])
                            .context(WritePduFieldSnafu {
                                field: "Message Control Header",
                            })?;
                        writer.write_all(&value.data).context(WritePduFieldSnafu {
                            field: "Presentation-data-value",
                        })
                    })?;
                }
                Ok(())
            })
        }
        Pdu::ReleaseRQ => {
            writer
                .write_all(&[0x05, 0x00])
                .context(WritePduFieldSnafu { field: "PDU-type" })?;
            write_chunk_u32(writer, "A-RELEASE-RQ", |writer| {
                writer
                    .write_all(&[0; 4])
                    .context(WritePduFieldSnafu { field: "reserved" })
            })
        }
        Pdu::ReleaseRP => {
            writer
                .write_all(&[0x06, 0x00])
                .context(WritePduFieldSnafu { field: "PDU-type" })?;
            write_chunk_u32(writer, "A-RELEASE-RP", |writer| {
                writer
                    .write_all(&[0; 4])
                    .context(WritePduFieldSnafu { field: "reserved" })
            })
        }
        Pdu::AbortRQ { source } => {
            writer
                .write_all(&[0x07, 0x00])
                .context(WritePduFieldSnafu { field: "PDU-type" })?;
            write_chunk_u32(writer, "A-ABORT", |writer| {
                let (source_code, reason_code) = source.codes();
                writer
                    .write_all(&[0x00, 0x00, source_code, reason_code])
                    .context(WritePduFieldSnafu {
                        field: "Source/Reason",
                    })
            })
        }
        Pdu::Unknown { pdu_type, data } => {
            writer
                .write_all(&[*pdu_type, 0x00])
                .context(WritePduFieldSnafu { field: "PDU-type" })?;
            write_chunk_u32(writer, "Unknown", |writer| {
                writer
                    .write_all(data)
                    .context(WritePduFieldSnafu { field: "Unknown" })
            })
        }
    }
}

fn write_application_context(
    writer: &mut dyn Write,
    codec: &dyn TextCodec,
    application_context_name: &str,
) -> Result<()> {
    writer
        .write_all(&[0x10, 0x00])
        .context(WritePduFieldSnafu { field: "Item-type" })?;
    write_chunk_u16(writer, "Application Context Item", |writer| {
        writer
            .write_all(
                &codec
                    .encode(application_context_name)
                    .context(EncodeTextSnafu {
                        field: "Application-context-name",
                    })?,
            )
            .context(WritePduFieldSnafu {
                field: "Application-context-name",
            })
    })
}

fn write_syntax_sub_item(
    writer: &mut dyn Write,
    codec: &dyn TextCodec,
    item_type: u8,
    name: &str,
    field: &'static str,
) -> Result<()> {
    writer
        .write_all(&[item_type, 0x00])
        .context(WritePduFieldSnafu { field: "Item-type" })?;
    write_chunk_u16(writer, field, |writer| {
        writer
            .write_all(&codec.encode(name).context(EncodeTextSnafu { field })?)
            .context(WritePduFieldSnafu { field })
    })
}

fn write_presentation_context_proposed(
    writer: &mut dyn Write,
    codec: &dyn TextCodec,
    presentation_context: &PresentationContextProposed,
) -> Result<()> {
    writer
        .write_all(&[0x20, 0x00])
        .context(WritePduFieldSnafu { field: "Item-type" })?;
    write_chunk_u16(writer, "Presentation Context Item", |writer| {
        writer
            .write_all(&[presentation_context.id, 0x00, 0x00, 0x00])
            .context(WritePduFieldSnafu {
                field: "Presentation-context-ID",
            })?;
        write_syntax_sub_item(
            writer,
            codec,
            0x30,
            &presentation_context.abstract_syntax,
            "Abstract-syntax-name",
        )?;
        for transfer_syntax in &presentation_context.transfer_syntaxes {
            write_syntax_sub_item(writer, codec, 0x40, transfer_syntax, "Transfer-syntax-name")?;
        }
        Ok(())
    })
}

fn write_presentation_context_result(
    writer: &mut dyn Write,
    codec: &dyn TextCodec,
    presentation_context: &PresentationContextResult,
) -> Result<()> {
    writer
        .write_all(&[0x21, 0x00])
        .context(WritePduFieldSnafu { field: "Item-type" })?;
    write_chunk_u16(writer, "Presentation Context Item", |writer| {
        writer
            .write_all(&[
                presentation_context.id,
                0x00,
                presentation_context.reason as u8,
                0x00,
            ])
            .context(WritePduFieldSnafu {
                field: "Presentation-context-ID",
            })?;
        write_syntax_sub_item(
            writer,
            codec,
            0x40,
            &presentation_context.transfer_syntax,
            "Transfer-syntax-name",
        )
    })
}

fn write_user_variables(
    writer: &mut dyn Write,
    codec: &dyn TextCodec,
    user_variables: &[UserVariableItem],
) -> Result<()> {
    if user_variables.is_empty() {
        return Ok(());
    }

    writer
        .write_all(&[0x50, 0x00])
        .context(WritePduFieldSnafu { field: "Item-type" })?;
    write_chunk_u16(writer, "User Information Item", |writer| {
        for user_variable in user_variables {
            match user_variable {
                UserVariableItem::MaxLength(max_length) => {
                    writer
                        .write_all(&[0x51, 0x00])
                        .context(WritePduFieldSnafu { field: "Item-type" })?;
                    write_chunk_u16(writer, "Maximum Length Sub-Item", |writer| {
                        writer.write_u32::<BigEndian>(*max_length).context(
                            WritePduFieldSnafu {
                                field: "Maximum-length-received",
                            },
                        )
                    })?;
                }
                UserVariableItem::ImplementationClassUID(class_uid) => {
                    write_syntax_sub_item(
                        writer,
                        codec,
                        0x52,
                        class_uid,
                        "Implementation-class-uid",
                    )?;
                }
                UserVariableItem::ImplementationVersionName(version_name) => {
                    write_syntax_sub_item(
                        writer,
                        codec,
                        0x55,
                        version_name,
                        "Implementation-version-name",
                    )?;
                }
                UserVariableItem::Unknown(item_type, data) => {
                    writer
                        .write_all(&[*item_type, 0x00])
                        .context(WritePduFieldSnafu { field: "Item-type" })?;
                    write_chunk_u16(writer, "Unknown sub-item", |writer| {
                        writer.write_all(data).context(WritePduFieldSnafu {
                            field: "Unknown sub-item",
                        })
                    })?;
                }
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::write_pdu;
    use crate::pdu::reader::read_pdu;
    use crate::pdu::*;
    use std::io::Cursor;

    fn roundtrip(pdu: Pdu) -> Pdu {
        let mut bytes = Vec::new();
        write_pdu(&mut bytes, &pdu).unwrap();
        read_pdu(&mut Cursor::new(&bytes), DEFAULT_MAX_PDU, true)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn roundtrip_association_rq() {
        let pdu = Pdu::AssociationRQ(AssociationRQ {
            protocol_version: 1,
            calling_ae_title: "THIS-SCU".to_string(),
            called_ae_title: "ANY-SCP".to_string(),
            application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
            presentation_contexts: vec![PresentationContextProposed {
                id: 1,
                abstract_syntax: "1.2.840.10008.1.1".to_string(),
                transfer_syntaxes: vec!["1.2.840.10008.1.2".to_string()],
            }],
            user_variables: vec![
                UserVariableItem::MaxLength(16_384),
                UserVariableItem::ImplementationClassUID("1.2.3.4".to_string()),
                UserVariableItem::ImplementationVersionName("TEST 0.1".to_string()),
            ],
        });
        assert_eq!(roundtrip(pdu.clone()), pdu);
    }

    #[test]
    fn roundtrip_association_ac() {
        let pdu = Pdu::AssociationAC(AssociationAC {
            protocol_version: 1,
            application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
            called_ae_title: "ANY-SCP".to_string(),
            calling_ae_title: "THIS-SCU".to_string(),
            presentation_contexts: vec![PresentationContextResult {
                id: 1,
                reason: PresentationContextResultReason::Acceptance,
                transfer_syntax: "1.2.840.10008.1.2".to_string(),
            }],
            user_variables: vec![UserVariableItem::MaxLength(32_768)],
        });
        assert_eq!(roundtrip(pdu.clone()), pdu);
    }

    #[test]
    fn roundtrip_association_rj() {
        let pdu = Pdu::AssociationRJ(AssociationRJ {
            result: AssociationRJResult::Permanent,
            source: AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::CalledAETitleNotRecognized,
            ),
        });
        assert_eq!(roundtrip(pdu.clone()), pdu);
    }

    #[test]
    fn roundtrip_release_and_abort() {
        assert_eq!(roundtrip(Pdu::ReleaseRQ), Pdu::ReleaseRQ);
        assert_eq!(roundtrip(Pdu::ReleaseRP), Pdu::ReleaseRP);

        let abort = Pdu::AbortRQ {
            source: AbortRQSource::ServiceProvider(AbortRQServiceProviderReason::UnexpectedPdu),
        };
        assert_eq!(roundtrip(abort.clone()), abort);
    }

    #[test]
    fn roundtrip_pdata() {
        let pdu = Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id: 3,
                value_type: PDataValueType::Command,
                is_last: true,
                data: vec![0, 1, 2, 3],
            }],
        };
        assert_eq!(roundtrip(pdu.clone()), pdu);
    }

    #[test]
    fn pdata_wire_layout() {
        let pdu = Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id: 1,
                value_type: PDataValueType::Command,
                is_last: true,
                data: vec![0xAA; 4],
            }],
        };
        let mut bytes = Vec::new();
        write_pdu(&mut bytes, &pdu).unwrap();

        // PDU header: type, reserved, length
        assert_eq!(bytes[0], 0x04);
        assert_eq!(bytes[1], 0x00);
        assert_eq!(u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]), 10);
        // PDV item: length, context id, control header
        assert_eq!(u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]), 6);
        assert_eq!(bytes[10], 1);
        assert_eq!(bytes[11], 0x03);
    }

    #[test]
    fn rejects_bad_pdv_control_header() {
        // hand-crafted P-DATA-TF whose single PDV has control header 0x05
        let bytes: Vec<u8> = vec![
            0x04, 0x00, 0x00, 0x00, 0x00, 0x08, // PDU header
            0x00, 0x00, 0x00, 0x04, // item length
            0x01, 0x05, // context id, illegal header
            0xCA, 0xFE,
        ];
        let err = read_pdu(&mut Cursor::new(&bytes), DEFAULT_MAX_PDU, true);
        assert!(matches!(
            err,
            Err(crate::pdu::reader::Error::InvalidPdvHeader { header: 0x05, .. })
        ));
    }
}
