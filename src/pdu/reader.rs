//! PDU reader module
use crate::pdu::*;
use byteordered::byteorder::{BigEndian, ReadBytesExt};
use dicom_encoding::text::{DefaultCharacterSetCodec, TextCodec};
use snafu::{ensure, Backtrace, OptionExt, ResultExt, Snafu};
use std::io::{Cursor, ErrorKind, Read, Seek, SeekFrom};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("invalid maximum PDU length {}", max_pdu_length))]
    InvalidMaxPdu {
        max_pdu_length: u32,
        backtrace: Backtrace,
    },

    #[snafu(display("could not read PDU field `{}`", field))]
    ReadPduField {
        field: &'static str,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display(
        "incoming PDU was too large: length {}, maximum is {}",
        pdu_length,
        max_pdu_length
    ))]
    PduTooLarge {
        pdu_length: u32,
        max_pdu_length: u32,
        backtrace: Backtrace,
    },

    #[snafu(display("invalid PDV item length {} (must be at least 2)", length))]
    InvalidItemLength { length: u32 },

    #[snafu(display("invalid PDV message control header {:#04X}", header))]
    InvalidPdvHeader { header: u8, backtrace: Backtrace },

    #[snafu(display("invalid association rejection result or reason"))]
    InvalidRejectSourceOrReason { backtrace: Backtrace },

    #[snafu(display("invalid abort source or reason"))]
    InvalidAbortSourceOrReason { backtrace: Backtrace },

    #[snafu(display("invalid presentation context result reason"))]
    InvalidPresentationContextResultReason { backtrace: Backtrace },

    #[snafu(display("unexpected sub-item type {:#04X} in `{}`", item_type, item))]
    UnexpectedSubItem {
        item: &'static str,
        item_type: u8,
        backtrace: Backtrace,
    },

    #[snafu(display("PDU contained an unexpected variable item {:?}", var_item))]
    InvalidPduVariable {
        var_item: PduVariableItem,
        backtrace: Backtrace,
    },

    #[snafu(display("multiple transfer syntaxes were accepted"))]
    MultipleTransferSyntaxesAccepted { backtrace: Backtrace },

    #[snafu(display("could not decode text field `{}`", field))]
    DecodeText {
        field: &'static str,
        #[snafu(backtrace)]
        source: dicom_encoding::text::DecodeTextError,
    },

    #[snafu(display("missing application context name"))]
    MissingApplicationContextName { backtrace: Backtrace },

    #[snafu(display("missing abstract syntax"))]
    MissingAbstractSyntax { backtrace: Backtrace },

    #[snafu(display("missing transfer syntax"))]
    MissingTransferSyntax { backtrace: Backtrace },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Read a PDU from the given source.
///
/// Returns `Ok(None)` if the source reaches its end
/// before the first byte of a new PDU,
/// which distinguishes an orderly connection close
/// from a stream truncated mid-PDU.
///
/// In strict mode, a PDU longer than `max_pdu_length` is an error.
/// Otherwise, lengths up to the absolute maximum of the standard
/// are tolerated with a warning,
/// since some implementations negotiate one maximum
/// and then exceed it.
pub fn read_pdu<R>(reader: &mut R, max_pdu_length: u32, strict: bool) -> Result<Option<Pdu>>
where
    R: Read,
{
    ensure!(
        (MINIMUM_PDU_SIZE..=MAXIMUM_PDU_SIZE).contains(&max_pdu_length),
        InvalidMaxPduSnafu { max_pdu_length }
    );

    // PDU type + reserved byte; end of stream here means no PDU at all
    let mut bytes = [0; 2];
    if let Err(e) = reader.read_exact(&mut bytes) {
        if e.kind() == ErrorKind::UnexpectedEof {
            return Ok(None);
        }
        return Err(e).context(ReadPduFieldSnafu { field: "type" });
    }
    let pdu_type = bytes[0];

    let pdu_length = reader
        .read_u32::<BigEndian>()
        .context(ReadPduFieldSnafu { field: "length" })?;

    if strict {
        ensure!(
            pdu_length <= max_pdu_length,
            PduTooLargeSnafu {
                pdu_length,
                max_pdu_length
            }
        );
    } else {
        ensure!(
            pdu_length <= MAXIMUM_PDU_SIZE,
            PduTooLargeSnafu {
                pdu_length,
                max_pdu_length: MAXIMUM_PDU_SIZE
            }
        );
        if pdu_length > max_pdu_length {
            tracing::warn!(
                "Incoming PDU was too large: length {}, maximum is {}",
                pdu_length,
                max_pdu_length
            );
        }
    }

    let bytes = read_n(reader, pdu_length as usize).context(ReadPduFieldSnafu { field: "payload" })?;
    let mut cursor = Cursor::new(bytes);
    let codec = DefaultCharacterSetCodec;

    let pdu = match pdu_type {
        0x01 => {
            // A-ASSOCIATE-RQ
            let (protocol_version, called_ae_title, calling_ae_title) =
                read_common_association_fields(&mut cursor, &codec)?;

            let mut application_context_name = None;
            let mut presentation_contexts = vec![];
            let mut user_variables = vec![];

            while cursor.position() < cursor.get_ref().len() as u64 {
                match read_pdu_variable(&mut cursor, &codec)? {
                    PduVariableItem::ApplicationContext(val) => {
                        application_context_name = Some(val);
                    }
                    PduVariableItem::PresentationContextProposed(val) => {
                        presentation_contexts.push(val);
                    }
                    PduVariableItem::UserVariables(val) => {
                        user_variables = val;
                    }
                    var_item => return InvalidPduVariableSnafu { var_item }.fail(),
                }
            }

            Pdu::AssociationRQ(AssociationRQ {
                protocol_version,
                calling_ae_title,
                called_ae_title,
                application_context_name: application_context_name
                    .context(MissingApplicationContextNameSnafu)?,
                presentation_contexts,
                user_variables,
            })
        }
        0x02 => {
            // A-ASSOCIATE-AC
            let (protocol_version, called_ae_title, calling_ae_title) =
                read_common_association_fields(&mut cursor, &codec)?;

            let mut application_context_name = None;
            let mut presentation_contexts = vec![];
            let mut user_variables = vec![];

            while cursor.position() < cursor.get_ref().len() as u64 {
                match read_pdu_variable(&mut cursor, &codec)? {
                    PduVariableItem::ApplicationContext(val) => {
                        application_context_name = Some(val);
                    }
                    PduVariableItem::PresentationContextResult(val) => {
                        presentation_contexts.push(val);
                    }
                    PduVariableItem::UserVariables(val) => {
                        user_variables = val;
                    }
                    var_item => return InvalidPduVariableSnafu { var_item }.fail(),
                }
            }

            Pdu::AssociationAC(AssociationAC {
                protocol_version,
                calling_ae_title,
                called_ae_title,
                application_context_name: application_context_name
                    .context(MissingApplicationContextNameSnafu)?,
                presentation_contexts,
                user_variables,
            })
        }
        0x03 => {
            // A-ASSOCIATE-RJ: reserved byte, result, source, reason
            cursor
                .read_u8()
                .context(ReadPduFieldSnafu { field: "reserved" })?;
            let result = AssociationRJResult::from(
                cursor
                    .read_u8()
                    .context(ReadPduFieldSnafu { field: "Result" })?,
            )
            .context(InvalidRejectSourceOrReasonSnafu)?;
            let source = AssociationRJSource::from(
                cursor
                    .read_u8()
                    .context(ReadPduFieldSnafu { field: "Source" })?,
                cursor.read_u8().context(ReadPduFieldSnafu {
                    field: "Reason/Diag.",
                })?,
            )
            .context(InvalidRejectSourceOrReasonSnafu)?;

            Pdu::AssociationRJ(AssociationRJ { result, source })
        }
        0x04 => {
            // P-DATA-TF: a sequence of presentation data values
            let mut values = vec![];
            while cursor.position() < cursor.get_ref().len() as u64 {
                values.push(read_pdata_value(&mut cursor)?);
            }
            Pdu::PData { data: values }
        }
        0x05 => {
            // A-RELEASE-RQ: 4 reserved bytes
            cursor
                .seek(SeekFrom::Current(4))
                .context(ReadPduFieldSnafu { field: "reserved" })?;
            Pdu::ReleaseRQ
        }
        0x06 => {
            // A-RELEASE-RP: 4 reserved bytes
            cursor
                .seek(SeekFrom::Current(4))
                .context(ReadPduFieldSnafu { field: "reserved" })?;
            Pdu::ReleaseRP
        }
        0x07 => {
            // A-ABORT: 2 reserved bytes, source, reason
            cursor
                .seek(SeekFrom::Current(2))
                .context(ReadPduFieldSnafu { field: "reserved" })?;
            let source = AbortRQSource::from(
                cursor
                    .read_u8()
                    .context(ReadPduFieldSnafu { field: "Source" })?,
                cursor.read_u8().context(ReadPduFieldSnafu {
                    field: "Reason/Diag",
                })?,
            )
            .context(InvalidAbortSourceOrReasonSnafu)?;
            Pdu::AbortRQ { source }
        }
        _ => Pdu::Unknown {
            pdu_type,
            data: cursor.into_inner(),
        },
    };

    Ok(Some(pdu))
}

/// Read protocol version, a 2-byte reserved field,
/// both 16-character AE title fields
/// and the 32-byte reserved block
/// shared by the A-ASSOCIATE-RQ and A-ASSOCIATE-AC structures.
fn read_common_association_fields<R>(
    reader: &mut R,
    codec: &dyn TextCodec,
) -> Result<(u16, String, String)>
where
    R: Read,
{
    let protocol_version = reader.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
        field: "Protocol-version",
    })?;
    reader
        .read_u16::<BigEndian>()
        .context(ReadPduFieldSnafu { field: "reserved" })?;

    let called_ae_title = read_ae_title(reader, codec, "Called-AE-title")?;
    let calling_ae_title = read_ae_title(reader, codec, "Calling-AE-title")?;

    let mut reserved = [0; 32];
    reader
        .read_exact(&mut reserved)
        .context(ReadPduFieldSnafu { field: "reserved" })?;

    Ok((protocol_version, called_ae_title, calling_ae_title))
}

/// Read one 16-character AE title field,
/// with leading and trailing spaces being non-significant.
fn read_ae_title<R>(reader: &mut R, codec: &dyn TextCodec, field: &'static str) -> Result<String>
where
    R: Read,
{
    let mut bytes = [0; 16];
    reader
        .read_exact(&mut bytes)
        .context(ReadPduFieldSnafu { field })?;
    Ok(codec
        .decode(&bytes)
        .context(DecodeTextSnafu { field })?
        .trim()
        .to_string())
}

/// Read one presentation data value:
/// item length, presentation context ID, message control header
/// and the value bytes.
fn read_pdata_value<R>(reader: &mut R) -> Result<PDataValue>
where
    R: Read,
{
    let item_length = reader.read_u32::<BigEndian>().context(ReadPduFieldSnafu {
        field: "Item-length",
    })?;
    ensure!(
        item_length >= 2,
        InvalidItemLengthSnafu {
            length: item_length
        }
    );

    let presentation_context_id = reader.read_u8().context(ReadPduFieldSnafu {
        field: "Presentation-context-ID",
    })?;

    // Bit 0 selects command or data set information,
    // bit 1 flags the last fragment; any other bit is illegal.
    let header = reader.read_u8().context(ReadPduFieldSnafu {
        field: "Message Control Header",
    })?;
    ensure!(header <= 0x03, InvalidPdvHeaderSnafu { header });

    let value_type = if header & 0x01 != 0 {
        PDataValueType::Command
    } else {
        PDataValueType::Data
    };
    let is_last = (header & 0x02) != 0;

    let data = read_n(reader, (item_length - 2) as usize).context(ReadPduFieldSnafu {
        field: "Presentation-data-value",
    })?;

    Ok(PDataValue {
        presentation_context_id,
        value_type,
        is_last,
        data,
    })
}

fn read_n<R>(reader: &mut R, bytes_to_read: usize) -> std::io::Result<Vec<u8>>
where
    R: Read,
{
    let mut result = Vec::with_capacity(bytes_to_read.min(MAXIMUM_PDU_SIZE as usize));
    reader.take(bytes_to_read as u64).read_to_end(&mut result)?;
    if result.len() != bytes_to_read {
        return Err(std::io::Error::from(ErrorKind::UnexpectedEof));
    }
    Ok(result)
}

/// Read the 4-byte header of a variable item or sub-item:
/// item type, reserved byte and item length.
fn read_item_header<R>(reader: &mut R) -> Result<(u8, u16)>
where
    R: Read,
{
    let item_type = reader
        .read_u8()
        .context(ReadPduFieldSnafu { field: "Item-type" })?;
    reader
        .read_u8()
        .context(ReadPduFieldSnafu { field: "reserved" })?;
    let item_length = reader.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
        field: "Item-length",
    })?;
    Ok((item_type, item_length))
}

fn read_pdu_variable<R>(reader: &mut R, codec: &dyn TextCodec) -> Result<PduVariableItem>
where
    R: Read,
{
    let (item_type, item_length) = read_item_header(reader)?;
    let bytes = read_n(reader, item_length as usize).context(ReadPduFieldSnafu {
        field: "Variable item",
    })?;
    let mut cursor = Cursor::new(bytes);

    match item_type {
        0x10 => {
            // Application Context Item
            let val = codec.decode(cursor.get_ref()).context(DecodeTextSnafu {
                field: "Application-context-name",
            })?;
            Ok(PduVariableItem::ApplicationContext(val))
        }
        0x20 => {
            // Presentation Context Item (proposed):
            // context ID, 3 reserved bytes,
            // one abstract syntax and one or more transfer syntax sub-items
            let presentation_context_id = cursor.read_u8().context(ReadPduFieldSnafu {
                field: "Presentation-context-ID",
            })?;
            cursor
                .seek(SeekFrom::Current(3))
                .context(ReadPduFieldSnafu { field: "reserved" })?;

            let mut abstract_syntax: Option<String> = None;
            let mut transfer_syntaxes = vec![];

            while cursor.position() < cursor.get_ref().len() as u64 {
                let (item_type, item_length) = read_item_header(&mut cursor)?;
                match item_type {
                    0x30 => {
                        abstract_syntax = Some(read_syntax_name(
                            &mut cursor,
                            codec,
                            item_length,
                            "Abstract-syntax-name",
                        )?);
                    }
                    0x40 => {
                        transfer_syntaxes.push(read_syntax_name(
                            &mut cursor,
                            codec,
                            item_length,
                            "Transfer-syntax-name",
                        )?);
                    }
                    _ => {
                        return UnexpectedSubItemSnafu {
                            item: "Presentation Context (proposed)",
                            item_type,
                        }
                        .fail();
                    }
                }
            }

            Ok(PduVariableItem::PresentationContextProposed(
                PresentationContextProposed {
                    id: presentation_context_id,
                    abstract_syntax: abstract_syntax.context(MissingAbstractSyntaxSnafu)?,
                    transfer_syntaxes,
                },
            ))
        }
        0x21 => {
            // Presentation Context Item (result):
            // context ID, reserved, result/reason, reserved,
            // and exactly one transfer syntax sub-item
            let presentation_context_id = cursor.read_u8().context(ReadPduFieldSnafu {
                field: "Presentation-context-ID",
            })?;
            cursor
                .read_u8()
                .context(ReadPduFieldSnafu { field: "reserved" })?;
            let reason = PresentationContextResultReason::from(cursor.read_u8().context(
                ReadPduFieldSnafu {
                    field: "Result/Reason",
                },
            )?)
            .context(InvalidPresentationContextResultReasonSnafu)?;
            cursor
                .read_u8()
                .context(ReadPduFieldSnafu { field: "reserved" })?;

            let mut transfer_syntax: Option<String> = None;

            while cursor.position() < cursor.get_ref().len() as u64 {
                let (item_type, item_length) = read_item_header(&mut cursor)?;
                match item_type {
                    0x40 => {
                        ensure!(
                            transfer_syntax.is_none(),
                            MultipleTransferSyntaxesAcceptedSnafu
                        );
                        transfer_syntax = Some(read_syntax_name(
                            &mut cursor,
                            codec,
                            item_length,
                            "Transfer-syntax-name",
                        )?);
                    }
                    _ => {
                        return UnexpectedSubItemSnafu {
                            item: "Presentation Context (result)",
                            item_type,
                        }
                        .fail();
                    }
                }
            }

            Ok(PduVariableItem::PresentationContextResult(
                PresentationContextResult {
                    id: presentation_context_id,
                    reason,
                    transfer_syntax: transfer_syntax.context(MissingTransferSyntaxSnafu)?,
                },
            ))
        }
        0x50 => {
            // User Information Item
            let mut user_variables = vec![];

            while cursor.position() < cursor.get_ref().len() as u64 {
                let (item_type, item_length) = read_item_header(&mut cursor)?;
                match item_type {
                    0x51 => {
                        user_variables.push(UserVariableItem::MaxLength(
                            cursor.read_u32::<BigEndian>().context(ReadPduFieldSnafu {
                                field: "Maximum-length-received",
                            })?,
                        ));
                    }
                    0x52 => {
                        user_variables.push(UserVariableItem::ImplementationClassUID(
                            read_syntax_name(
                                &mut cursor,
                                codec,
                                item_length,
                                "Implementation-class-uid",
                            )?,
                        ));
                    }
                    0x55 => {
                        user_variables.push(UserVariableItem::ImplementationVersionName(
                            read_syntax_name(
                                &mut cursor,
                                codec,
                                item_length,
                                "Implementation-version-name",
                            )?,
                        ));
                    }
                    _ => {
                        user_variables.push(UserVariableItem::Unknown(
                            item_type,
                            read_n(&mut cursor, item_length as usize).context(
                                ReadPduFieldSnafu {
                                    field: "Unknown sub-item",
                                },
                            )?,
                        ));
                    }
                }
            }

            Ok(PduVariableItem::UserVariables(user_variables))
        }
        _ => Ok(PduVariableItem::Unknown(item_type)),
    }
}

fn read_syntax_name<R>(
    reader: &mut R,
    codec: &dyn TextCodec,
    length: u16,
    field: &'static str,
) -> Result<String>
where
    R: Read,
{
    let bytes = read_n(reader, length as usize).context(ReadPduFieldSnafu { field })?;
    Ok(codec
        .decode(&bytes)
        .context(DecodeTextSnafu { field })?
        .trim()
        .to_string())
}
