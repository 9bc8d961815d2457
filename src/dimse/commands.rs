//! Command set codec.
//!
//! Command sets are small data sets in group 0000,
//! always encoded in Implicit VR Little Endian.
//! Since implicit VR encoding carries no value representation on the wire,
//! the codec owns a schema of the command elements it understands,
//! rather than relying on a process wide data dictionary.

use dicom_core::header::{HasLength, Header};
use dicom_core::value::ConvertValueError;
use dicom_core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::mem::InMemElement;
use dicom_object::InMemDicomObject;
use snafu::{ensure, Backtrace, OptionExt, ResultExt, Snafu};

/// The value of _Command Data Set Type_ (0000,0800)
/// announcing that no data set follows the command set.
pub const NO_DATA_SET: u16 = 0x0101;

/// The conventional value of _Command Data Set Type_ (0000,0800)
/// announcing that a data set follows the command set.
/// Any value other than [`NO_DATA_SET`] has the same meaning on receipt.
pub const DATA_SET_PRESENT: u16 = 0x0001;

/// Encoded size of an implicit VR element header:
/// 2-byte group, 2-byte element, 4-byte length.
const ELEMENT_HEADER_LENGTH: u32 = 8;

/// The command elements of group 0000 known to this codec,
/// with the value representation
/// that their implicit VR encoding is resolved against.
static COMMAND_SCHEMA: &[(Tag, VR)] = &[
    (tags::COMMAND_GROUP_LENGTH, VR::UL),
    (tags::AFFECTED_SOP_CLASS_UID, VR::UI),
    (tags::REQUESTED_SOP_CLASS_UID, VR::UI),
    (tags::COMMAND_FIELD, VR::US),
    (tags::MESSAGE_ID, VR::US),
    (tags::MESSAGE_ID_BEING_RESPONDED_TO, VR::US),
    (tags::MOVE_DESTINATION, VR::AE),
    (tags::PRIORITY, VR::US),
    (tags::COMMAND_DATA_SET_TYPE, VR::US),
    (tags::STATUS, VR::US),
    (tags::OFFENDING_ELEMENT, VR::AT),
    (tags::ERROR_COMMENT, VR::LO),
    (tags::ERROR_ID, VR::US),
    (tags::AFFECTED_SOP_INSTANCE_UID, VR::UI),
    (tags::REQUESTED_SOP_INSTANCE_UID, VR::UI),
    (tags::EVENT_TYPE_ID, VR::US),
    (tags::ATTRIBUTE_IDENTIFIER_LIST, VR::AT),
    (tags::ACTION_TYPE_ID, VR::US),
    (tags::NUMBER_OF_REMAINING_SUBOPERATIONS, VR::US),
    (tags::NUMBER_OF_COMPLETED_SUBOPERATIONS, VR::US),
    (tags::NUMBER_OF_FAILED_SUBOPERATIONS, VR::US),
    (tags::NUMBER_OF_WARNING_SUBOPERATIONS, VR::US),
    (tags::MOVE_ORIGINATOR_APPLICATION_ENTITY_TITLE, VR::AE),
    (tags::MOVE_ORIGINATOR_MESSAGE_ID, VR::US),
];

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("missing command element {}", tag))]
    MissingElement { tag: Tag, backtrace: Backtrace },

    #[snafu(display("could not convert the value of command element {}", tag))]
    ConvertValue {
        tag: Tag,
        source: ConvertValueError,
    },

    #[snafu(display(
        "command group length accounting mismatch: recorded {}, encoded {}",
        recorded,
        encoded
    ))]
    GroupLengthMismatch {
        recorded: u32,
        encoded: u32,
        backtrace: Backtrace,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Look up the value representation of a command element in the schema.
pub fn vr_of(tag: Tag) -> VR {
    COMMAND_SCHEMA
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, vr)| *vr)
        .unwrap_or(VR::UN)
}

/// Build an unsigned 16-bit command element.
pub fn us_element(tag: Tag, value: u16) -> InMemElement {
    DataElement::new(tag, vr_of(tag), PrimitiveValue::from(value))
}

/// Build a text command element (UI, AE or LO per the schema).
pub fn str_element(tag: Tag, value: &str) -> InMemElement {
    DataElement::new(tag, vr_of(tag), PrimitiveValue::from(value))
}

/// Build a zero-length command element,
/// for fields which must be present on the wire even when they have no value.
pub fn empty_element(tag: Tag) -> InMemElement {
    DataElement::new(tag, vr_of(tag), PrimitiveValue::Empty)
}

/// Fetch a mandatory unsigned 16-bit value from a command set.
pub fn require_u16(obj: &InMemDicomObject, tag: Tag) -> Result<u16> {
    obj.get(tag)
        .context(MissingElementSnafu { tag })?
        .to_int::<u16>()
        .context(ConvertValueSnafu { tag })
}

/// Fetch an optional unsigned 16-bit value from a command set.
/// Absent and zero-length elements both map to `None`.
pub fn optional_u16(obj: &InMemDicomObject, tag: Tag) -> Result<Option<u16>> {
    match obj.get(tag) {
        None => Ok(None),
        Some(e) if e.value().length().0 == 0 => Ok(None),
        Some(e) => e
            .to_int::<u16>()
            .context(ConvertValueSnafu { tag })
            .map(Some),
    }
}

/// Fetch a mandatory text value from a command set,
/// with trailing padding removed.
pub fn require_str(obj: &InMemDicomObject, tag: Tag) -> Result<String> {
    let value = obj
        .get(tag)
        .context(MissingElementSnafu { tag })?
        .to_str()
        .context(ConvertValueSnafu { tag })?;
    Ok(trim_padding(&value).to_string())
}

/// Fetch an optional text value from a command set.
/// Absent and zero-length elements both map to `None`.
pub fn optional_str(obj: &InMemDicomObject, tag: Tag) -> Result<Option<String>> {
    match obj.get(tag) {
        None => Ok(None),
        Some(e) if e.value().length().0 == 0 => Ok(None),
        Some(e) => {
            let value = e.to_str().context(ConvertValueSnafu { tag })?;
            let value = trim_padding(&value);
            if value.is_empty() {
                Ok(None)
            } else {
                Ok(Some(value.to_string()))
            }
        }
    }
}

fn trim_padding(value: &str) -> &str {
    value.trim_end_matches(['\0', ' '])
}

/// Compute the group length of a command set:
/// the summed encoded length of every element after (0000,0000),
/// one implicit VR header plus the even-padded value length each.
pub fn command_group_length(obj: &InMemDicomObject) -> u32 {
    obj.iter()
        .filter(|e| e.tag() != tags::COMMAND_GROUP_LENGTH)
        .map(|e| {
            let len = e.value().length();
            ELEMENT_HEADER_LENGTH + if len.is_defined() { even_len(len.0) } else { 0 }
        })
        .sum()
}

fn even_len(len: u32) -> u32 {
    (len + 1) & !1
}

/// Verify that the _Command Group Length_ (0000,0000) element of a command
/// set matches the actual encoded length of the elements that follow it.
///
/// `encoded` is the full implicit VR encoding of the command set;
/// the group length element itself occupies its first 12 bytes.
pub fn verify_group_length(obj: &InMemDicomObject, encoded: &[u8]) -> Result<()> {
    let recorded = obj
        .get(tags::COMMAND_GROUP_LENGTH)
        .context(MissingElementSnafu {
            tag: tags::COMMAND_GROUP_LENGTH,
        })?
        .to_int::<u32>()
        .context(ConvertValueSnafu {
            tag: tags::COMMAND_GROUP_LENGTH,
        })?;
    let encoded = (encoded.len() as u32).saturating_sub(ELEMENT_HEADER_LENGTH + 4);
    ensure!(
        recorded == encoded,
        GroupLengthMismatchSnafu { recorded, encoded }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_transfer_syntax_registry::entries;

    #[test]
    fn schema_has_expected_representations() {
        assert_eq!(vr_of(tags::COMMAND_GROUP_LENGTH), VR::UL);
        assert_eq!(vr_of(tags::AFFECTED_SOP_CLASS_UID), VR::UI);
        assert_eq!(vr_of(tags::MOVE_DESTINATION), VR::AE);
        assert_eq!(vr_of(tags::ERROR_COMMENT), VR::LO);
        assert_eq!(vr_of(tags::OFFENDING_ELEMENT), VR::AT);
        assert_eq!(vr_of(tags::STATUS), VR::US);
    }

    #[test]
    fn group_length_matches_encoded_output() {
        let obj = InMemDicomObject::command_from_element_iter([
            str_element(tags::AFFECTED_SOP_CLASS_UID, "1.2.840.10008.1.1"),
            us_element(tags::COMMAND_FIELD, 0x0030),
            us_element(tags::MESSAGE_ID, 7),
            us_element(tags::COMMAND_DATA_SET_TYPE, NO_DATA_SET),
        ]);

        let mut encoded = Vec::new();
        obj.write_dataset_with_ts(&mut encoded, &entries::IMPLICIT_VR_LITTLE_ENDIAN.erased())
            .unwrap();

        verify_group_length(&obj, &encoded).unwrap();
        assert_eq!(
            command_group_length(&obj),
            encoded.len() as u32 - 12,
        );
    }

    #[test]
    fn optional_readers_treat_empty_as_absent() {
        let obj = InMemDicomObject::command_from_element_iter([
            empty_element(tags::MOVE_ORIGINATOR_APPLICATION_ENTITY_TITLE),
            empty_element(tags::MOVE_ORIGINATOR_MESSAGE_ID),
            us_element(tags::MESSAGE_ID, 5),
        ]);

        assert_eq!(
            optional_str(&obj, tags::MOVE_ORIGINATOR_APPLICATION_ENTITY_TITLE).unwrap(),
            None
        );
        assert_eq!(
            optional_u16(&obj, tags::MOVE_ORIGINATOR_MESSAGE_ID).unwrap(),
            None
        );
        assert_eq!(optional_u16(&obj, tags::MESSAGE_ID).unwrap(), Some(5));
        assert_eq!(optional_u16(&obj, tags::STATUS).unwrap(), None);
    }
}
