//! DIMSE message catalog and transport.
//!
//! This module provides typed representations of the composite DIMSE
//! messages (C-ECHO, C-STORE, C-FIND, C-GET, C-MOVE, C-CANCEL and their
//! responses), conversion between those messages and the flat service
//! parameter records of the application layer, and the machinery to
//! encode a message into a sequence of P-DATA-TF PDUs and to reassemble
//! it from incoming presentation data values.
//!
//! A message is a command set (a group 0000 data set, always in
//! Implicit VR Little Endian) plus an optional opaque data set payload.
//! Whether a payload follows is announced on the wire by the
//! _Command Data Set Type_ element: [`NO_DATA_SET`] means none.

pub mod commands;
pub mod fragment;
pub mod params;

use bytes::BytesMut;
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use dicom_transfer_syntax_registry::entries;
use snafu::{Backtrace, OptionExt, ResultExt, Snafu};
use tracing::warn;

use crate::pdu::{PDataValue, PDataValueType, Pdu};
use params::*;

pub use commands::{DATA_SET_PRESENT, NO_DATA_SET};

/// Status code of a successful operation.
pub const STATUS_SUCCESS: u16 = 0x0000;
/// Status code reporting that an operation was canceled.
pub const STATUS_CANCEL: u16 = 0xFE00;
/// Status code of a pending operation (further responses follow).
pub const STATUS_PENDING: u16 = 0xFF00;
/// Status code of a pending operation with warnings.
pub const STATUS_PENDING_WARNING: u16 = 0xFF01;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("unknown command field {:#06X}", value))]
    UnknownCommandField { value: u16, backtrace: Backtrace },

    #[snafu(display("could not encode command set"))]
    EncodeCommandSet {
        source: Box<dicom_object::WriteError>,
    },

    #[snafu(display("could not decode command set"))]
    DecodeCommandSet { source: dicom_object::ReadError },

    #[snafu(display("invalid command set"))]
    InvalidCommandSet {
        #[snafu(backtrace)]
        source: commands::Error,
    },

    #[snafu(display("data set fragments completed before a command set was received"))]
    MissingCommandSet { backtrace: Backtrace },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Command field opcodes (0000,0100) understood by the catalog.
///
/// Response opcodes carry the `0x8000` bit of their request counterpart.
#[repr(u16)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CommandField {
    CStoreRq = 0x0001,
    CStoreRsp = 0x8001,
    CGetRq = 0x0010,
    CGetRsp = 0x8010,
    CFindRq = 0x0020,
    CFindRsp = 0x8020,
    CMoveRq = 0x0021,
    CMoveRsp = 0x8021,
    CEchoRq = 0x0030,
    CEchoRsp = 0x8030,
    CCancelRq = 0x0FFF,
}

impl TryFrom<u16> for CommandField {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, u16> {
        match value {
            0x0001 => Ok(CommandField::CStoreRq),
            0x8001 => Ok(CommandField::CStoreRsp),
            0x0010 => Ok(CommandField::CGetRq),
            0x8010 => Ok(CommandField::CGetRsp),
            0x0020 => Ok(CommandField::CFindRq),
            0x8020 => Ok(CommandField::CFindRsp),
            0x0021 => Ok(CommandField::CMoveRq),
            0x8021 => Ok(CommandField::CMoveRsp),
            0x0030 => Ok(CommandField::CEchoRq),
            0x8030 => Ok(CommandField::CEchoRsp),
            0x0FFF => Ok(CommandField::CCancelRq),
            _ => Err(value),
        }
    }
}

/// Priority of a request (0000,0700).
#[repr(u16)]
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Priority {
    Low = 0x0002,
    #[default]
    Medium = 0x0000,
    High = 0x0001,
}

impl Priority {
    /// Interpret a priority code,
    /// tolerating unknown values as medium priority.
    fn from_u16(value: u16) -> Priority {
        match value {
            0x0002 => Priority::Low,
            0x0000 => Priority::Medium,
            0x0001 => Priority::High,
            _ => {
                warn!("Unknown priority code {:#06X}, assuming medium", value);
                Priority::Medium
            }
        }
    }
}

/// Coarse classification of the status codes
/// defined for the DIMSE services (PS3.7, annex C).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StatusType {
    Success,
    Warning,
    Failure,
    Cancel,
    Pending,
}

impl TryFrom<u16> for StatusType {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, u16> {
        match value {
            0x0000 => Ok(StatusType::Success),
            0x0001 | 0x0107 | 0x0116 | 0xB000..=0xBFFF => Ok(StatusType::Warning),
            0xA000..=0xAFFF | 0x0100..=0x02FF => Ok(StatusType::Failure),
            0xFE00 => Ok(StatusType::Cancel),
            0xFF00 | 0xFF01 => Ok(StatusType::Pending),
            _ => Err(value),
        }
    }
}

/// A C-ECHO request.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct CEchoRq {
    pub affected_sop_class_uid: String,
    pub message_id: u16,
}

impl CEchoRq {
    pub fn from_params(params: &CEchoServiceParameters) -> Self {
        CEchoRq {
            affected_sop_class_uid: params.affected_sop_class_uid.clone(),
            message_id: params.message_id,
        }
    }

    pub fn to_params(&self) -> CEchoServiceParameters {
        CEchoServiceParameters {
            affected_sop_class_uid: self.affected_sop_class_uid.clone(),
            message_id: self.message_id,
            ..Default::default()
        }
    }

    fn command_set(&self) -> InMemDicomObject {
        InMemDicomObject::command_from_element_iter([
            commands::str_element(tags::AFFECTED_SOP_CLASS_UID, &self.affected_sop_class_uid),
            commands::us_element(tags::COMMAND_FIELD, CommandField::CEchoRq as u16),
            commands::us_element(tags::MESSAGE_ID, self.message_id),
            commands::us_element(tags::COMMAND_DATA_SET_TYPE, NO_DATA_SET),
        ])
    }

    fn from_command_set(obj: &InMemDicomObject) -> Result<Self, commands::Error> {
        Ok(CEchoRq {
            affected_sop_class_uid: commands::require_str(obj, tags::AFFECTED_SOP_CLASS_UID)?,
            message_id: commands::require_u16(obj, tags::MESSAGE_ID)?,
        })
    }
}

/// A C-ECHO response.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct CEchoRsp {
    pub affected_sop_class_uid: String,
    pub message_id_being_responded_to: u16,
    pub status: u16,
}

impl CEchoRsp {
    pub fn from_params(params: &CEchoServiceParameters) -> Self {
        CEchoRsp {
            affected_sop_class_uid: params.affected_sop_class_uid.clone(),
            message_id_being_responded_to: params.message_id_being_responded_to,
            status: params.status,
        }
    }

    pub fn to_params(&self) -> CEchoServiceParameters {
        CEchoServiceParameters {
            affected_sop_class_uid: self.affected_sop_class_uid.clone(),
            message_id_being_responded_to: self.message_id_being_responded_to,
            status: self.status,
            ..Default::default()
        }
    }

    fn command_set(&self) -> InMemDicomObject {
        InMemDicomObject::command_from_element_iter([
            commands::str_element(tags::AFFECTED_SOP_CLASS_UID, &self.affected_sop_class_uid),
            commands::us_element(tags::COMMAND_FIELD, CommandField::CEchoRsp as u16),
            commands::us_element(
                tags::MESSAGE_ID_BEING_RESPONDED_TO,
                self.message_id_being_responded_to,
            ),
            commands::us_element(tags::COMMAND_DATA_SET_TYPE, NO_DATA_SET),
            commands::us_element(tags::STATUS, self.status),
        ])
    }

    fn from_command_set(obj: &InMemDicomObject) -> Result<Self, commands::Error> {
        Ok(CEchoRsp {
            affected_sop_class_uid: commands::require_str(obj, tags::AFFECTED_SOP_CLASS_UID)?,
            message_id_being_responded_to: commands::require_u16(
                obj,
                tags::MESSAGE_ID_BEING_RESPONDED_TO,
            )?,
            status: commands::require_u16(obj, tags::STATUS)?,
        })
    }
}

/// A C-STORE request.
///
/// The composite instance to store always accompanies the command set,
/// and the move originator elements are emitted even when empty,
/// so that they are present on the wire.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct CStoreRq {
    pub affected_sop_class_uid: String,
    pub affected_sop_instance_uid: String,
    pub message_id: u16,
    pub priority: Priority,
    pub move_originator_aet: Option<String>,
    pub move_originator_message_id: Option<u16>,
    pub data_set: Vec<u8>,
}

impl CStoreRq {
    pub fn from_params(params: &CStoreServiceParameters) -> Self {
        CStoreRq {
            affected_sop_class_uid: params.affected_sop_class_uid.clone(),
            affected_sop_instance_uid: params.affected_sop_instance_uid.clone(),
            message_id: params.message_id,
            priority: params.priority,
            move_originator_aet: params.move_originator_aet.clone(),
            move_originator_message_id: params.move_originator_message_id,
            data_set: params.data_set.clone().unwrap_or_default(),
        }
    }

    pub fn to_params(&self) -> CStoreServiceParameters {
        CStoreServiceParameters {
            affected_sop_class_uid: self.affected_sop_class_uid.clone(),
            affected_sop_instance_uid: self.affected_sop_instance_uid.clone(),
            message_id: self.message_id,
            priority: self.priority,
            move_originator_aet: self.move_originator_aet.clone(),
            move_originator_message_id: self.move_originator_message_id,
            data_set: Some(self.data_set.clone()),
            ..Default::default()
        }
    }

    fn command_set(&self) -> InMemDicomObject {
        InMemDicomObject::command_from_element_iter([
            commands::str_element(tags::AFFECTED_SOP_CLASS_UID, &self.affected_sop_class_uid),
            commands::us_element(tags::COMMAND_FIELD, CommandField::CStoreRq as u16),
            commands::us_element(tags::MESSAGE_ID, self.message_id),
            commands::us_element(tags::PRIORITY, self.priority as u16),
            commands::us_element(tags::COMMAND_DATA_SET_TYPE, DATA_SET_PRESENT),
            commands::str_element(
                tags::AFFECTED_SOP_INSTANCE_UID,
                &self.affected_sop_instance_uid,
            ),
            match &self.move_originator_aet {
                Some(aet) => {
                    commands::str_element(tags::MOVE_ORIGINATOR_APPLICATION_ENTITY_TITLE, aet)
                }
                None => commands::empty_element(tags::MOVE_ORIGINATOR_APPLICATION_ENTITY_TITLE),
            },
            match self.move_originator_message_id {
                Some(id) => commands::us_element(tags::MOVE_ORIGINATOR_MESSAGE_ID, id),
                None => commands::empty_element(tags::MOVE_ORIGINATOR_MESSAGE_ID),
            },
        ])
    }

    fn from_command_set(
        obj: &InMemDicomObject,
        data_set: Vec<u8>,
    ) -> Result<Self, commands::Error> {
        Ok(CStoreRq {
            affected_sop_class_uid: commands::require_str(obj, tags::AFFECTED_SOP_CLASS_UID)?,
            affected_sop_instance_uid: commands::require_str(
                obj,
                tags::AFFECTED_SOP_INSTANCE_UID,
            )?,
            message_id: commands::require_u16(obj, tags::MESSAGE_ID)?,
            priority: Priority::from_u16(commands::require_u16(obj, tags::PRIORITY)?),
            move_originator_aet: commands::optional_str(
                obj,
                tags::MOVE_ORIGINATOR_APPLICATION_ENTITY_TITLE,
            )?,
            move_originator_message_id: commands::optional_u16(
                obj,
                tags::MOVE_ORIGINATOR_MESSAGE_ID,
            )?,
            data_set,
        })
    }
}

/// A C-STORE response.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct CStoreRsp {
    pub affected_sop_class_uid: String,
    pub affected_sop_instance_uid: String,
    pub message_id_being_responded_to: u16,
    pub status: u16,
}

impl CStoreRsp {
    pub fn from_params(params: &CStoreServiceParameters) -> Self {
        CStoreRsp {
            affected_sop_class_uid: params.affected_sop_class_uid.clone(),
            affected_sop_instance_uid: params.affected_sop_instance_uid.clone(),
            message_id_being_responded_to: params.message_id_being_responded_to,
            status: params.status,
        }
    }

    pub fn to_params(&self) -> CStoreServiceParameters {
        CStoreServiceParameters {
            affected_sop_class_uid: self.affected_sop_class_uid.clone(),
            affected_sop_instance_uid: self.affected_sop_instance_uid.clone(),
            message_id_being_responded_to: self.message_id_being_responded_to,
            status: self.status,
            ..Default::default()
        }
    }

    fn command_set(&self) -> InMemDicomObject {
        InMemDicomObject::command_from_element_iter([
            commands::str_element(tags::AFFECTED_SOP_CLASS_UID, &self.affected_sop_class_uid),
            commands::us_element(tags::COMMAND_FIELD, CommandField::CStoreRsp as u16),
            commands::us_element(
                tags::MESSAGE_ID_BEING_RESPONDED_TO,
                self.message_id_being_responded_to,
            ),
            commands::us_element(tags::COMMAND_DATA_SET_TYPE, NO_DATA_SET),
            commands::us_element(tags::STATUS, self.status),
            commands::str_element(
                tags::AFFECTED_SOP_INSTANCE_UID,
                &self.affected_sop_instance_uid,
            ),
        ])
    }

    fn from_command_set(obj: &InMemDicomObject) -> Result<Self, commands::Error> {
        Ok(CStoreRsp {
            affected_sop_class_uid: commands::require_str(obj, tags::AFFECTED_SOP_CLASS_UID)?,
            affected_sop_instance_uid: commands::require_str(
                obj,
                tags::AFFECTED_SOP_INSTANCE_UID,
            )?,
            message_id_being_responded_to: commands::require_u16(
                obj,
                tags::MESSAGE_ID_BEING_RESPONDED_TO,
            )?,
            status: commands::require_u16(obj, tags::STATUS)?,
        })
    }
}

/// A C-FIND request. The query identifier always accompanies the command.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct CFindRq {
    pub affected_sop_class_uid: String,
    pub message_id: u16,
    pub priority: Priority,
    pub identifier: Vec<u8>,
}

impl CFindRq {
    pub fn from_params(params: &CFindServiceParameters) -> Self {
        CFindRq {
            affected_sop_class_uid: params.affected_sop_class_uid.clone(),
            message_id: params.message_id,
            priority: params.priority,
            identifier: params.identifier.clone().unwrap_or_default(),
        }
    }

    pub fn to_params(&self) -> CFindServiceParameters {
        CFindServiceParameters {
            affected_sop_class_uid: self.affected_sop_class_uid.clone(),
            message_id: self.message_id,
            priority: self.priority,
            identifier: Some(self.identifier.clone()),
            ..Default::default()
        }
    }

    fn command_set(&self) -> InMemDicomObject {
        InMemDicomObject::command_from_element_iter([
            commands::str_element(tags::AFFECTED_SOP_CLASS_UID, &self.affected_sop_class_uid),
            commands::us_element(tags::COMMAND_FIELD, CommandField::CFindRq as u16),
            commands::us_element(tags::MESSAGE_ID, self.message_id),
            commands::us_element(tags::PRIORITY, self.priority as u16),
            commands::us_element(tags::COMMAND_DATA_SET_TYPE, DATA_SET_PRESENT),
        ])
    }

    fn from_command_set(
        obj: &InMemDicomObject,
        identifier: Vec<u8>,
    ) -> Result<Self, commands::Error> {
        Ok(CFindRq {
            affected_sop_class_uid: commands::require_str(obj, tags::AFFECTED_SOP_CLASS_UID)?,
            message_id: commands::require_u16(obj, tags::MESSAGE_ID)?,
            priority: Priority::from_u16(commands::require_u16(obj, tags::PRIORITY)?),
            identifier,
        })
    }
}

/// A C-FIND response.
///
/// Pending responses carry a match identifier;
/// the final response carries none
/// and announces so with a data set type of [`NO_DATA_SET`].
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct CFindRsp {
    pub affected_sop_class_uid: String,
    pub message_id_being_responded_to: u16,
    pub status: u16,
    pub identifier: Option<Vec<u8>>,
}

impl CFindRsp {
    pub fn from_params(params: &CFindServiceParameters) -> Self {
        CFindRsp {
            affected_sop_class_uid: params.affected_sop_class_uid.clone(),
            message_id_being_responded_to: params.message_id_being_responded_to,
            status: params.status,
            identifier: params.identifier.clone(),
        }
    }

    pub fn to_params(&self) -> CFindServiceParameters {
        CFindServiceParameters {
            affected_sop_class_uid: self.affected_sop_class_uid.clone(),
            message_id_being_responded_to: self.message_id_being_responded_to,
            status: self.status,
            identifier: self.identifier.clone(),
            ..Default::default()
        }
    }

    fn command_set(&self) -> InMemDicomObject {
        InMemDicomObject::command_from_element_iter([
            commands::str_element(tags::AFFECTED_SOP_CLASS_UID, &self.affected_sop_class_uid),
            commands::us_element(tags::COMMAND_FIELD, CommandField::CFindRsp as u16),
            commands::us_element(
                tags::MESSAGE_ID_BEING_RESPONDED_TO,
                self.message_id_being_responded_to,
            ),
            commands::us_element(
                tags::COMMAND_DATA_SET_TYPE,
                if self.identifier.is_some() {
                    DATA_SET_PRESENT
                } else {
                    NO_DATA_SET
                },
            ),
            commands::us_element(tags::STATUS, self.status),
        ])
    }

    fn from_command_set(
        obj: &InMemDicomObject,
        identifier: Option<Vec<u8>>,
    ) -> Result<Self, commands::Error> {
        Ok(CFindRsp {
            affected_sop_class_uid: commands::require_str(obj, tags::AFFECTED_SOP_CLASS_UID)?,
            message_id_being_responded_to: commands::require_u16(
                obj,
                tags::MESSAGE_ID_BEING_RESPONDED_TO,
            )?,
            status: commands::require_u16(obj, tags::STATUS)?,
            identifier,
        })
    }
}

/// A C-GET request. The retrieve identifier always accompanies the command.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct CGetRq {
    pub affected_sop_class_uid: String,
    pub message_id: u16,
    pub priority: Priority,
    pub identifier: Vec<u8>,
}

impl CGetRq {
    pub fn from_params(params: &CGetServiceParameters) -> Self {
        CGetRq {
            affected_sop_class_uid: params.affected_sop_class_uid.clone(),
            message_id: params.message_id,
            priority: params.priority,
            identifier: params.identifier.clone().unwrap_or_default(),
        }
    }

    pub fn to_params(&self) -> CGetServiceParameters {
        CGetServiceParameters {
            affected_sop_class_uid: self.affected_sop_class_uid.clone(),
            message_id: self.message_id,
            priority: self.priority,
            identifier: Some(self.identifier.clone()),
            ..Default::default()
        }
    }

    fn command_set(&self) -> InMemDicomObject {
        InMemDicomObject::command_from_element_iter([
            commands::str_element(tags::AFFECTED_SOP_CLASS_UID, &self.affected_sop_class_uid),
            commands::us_element(tags::COMMAND_FIELD, CommandField::CGetRq as u16),
            commands::us_element(tags::MESSAGE_ID, self.message_id),
            commands::us_element(tags::PRIORITY, self.priority as u16),
            commands::us_element(tags::COMMAND_DATA_SET_TYPE, DATA_SET_PRESENT),
        ])
    }

    fn from_command_set(
        obj: &InMemDicomObject,
        identifier: Vec<u8>,
    ) -> Result<Self, commands::Error> {
        Ok(CGetRq {
            affected_sop_class_uid: commands::require_str(obj, tags::AFFECTED_SOP_CLASS_UID)?,
            message_id: commands::require_u16(obj, tags::MESSAGE_ID)?,
            priority: Priority::from_u16(commands::require_u16(obj, tags::PRIORITY)?),
            identifier,
        })
    }
}

/// A C-GET response, including the sub-operation counters.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct CGetRsp {
    pub affected_sop_class_uid: String,
    pub message_id_being_responded_to: u16,
    pub status: u16,
    pub remaining: u16,
    pub completed: u16,
    pub failed: u16,
    pub warning: u16,
    pub identifier: Option<Vec<u8>>,
}

impl CGetRsp {
    pub fn from_params(params: &CGetServiceParameters) -> Self {
        CGetRsp {
            affected_sop_class_uid: params.affected_sop_class_uid.clone(),
            message_id_being_responded_to: params.message_id_being_responded_to,
            status: params.status,
            remaining: params.remaining,
            completed: params.completed,
            failed: params.failed,
            warning: params.warning,
            identifier: params.identifier.clone(),
        }
    }

    pub fn to_params(&self) -> CGetServiceParameters {
        CGetServiceParameters {
            affected_sop_class_uid: self.affected_sop_class_uid.clone(),
            message_id_being_responded_to: self.message_id_being_responded_to,
            status: self.status,
            remaining: self.remaining,
            completed: self.completed,
            failed: self.failed,
            warning: self.warning,
            identifier: self.identifier.clone(),
            ..Default::default()
        }
    }

    fn command_set(&self) -> InMemDicomObject {
        InMemDicomObject::command_from_element_iter([
            commands::str_element(tags::AFFECTED_SOP_CLASS_UID, &self.affected_sop_class_uid),
            commands::us_element(tags::COMMAND_FIELD, CommandField::CGetRsp as u16),
            commands::us_element(
                tags::MESSAGE_ID_BEING_RESPONDED_TO,
                self.message_id_being_responded_to,
            ),
            commands::us_element(
                tags::COMMAND_DATA_SET_TYPE,
                if self.identifier.is_some() {
                    DATA_SET_PRESENT
                } else {
                    NO_DATA_SET
                },
            ),
            commands::us_element(tags::STATUS, self.status),
            commands::us_element(tags::NUMBER_OF_REMAINING_SUBOPERATIONS, self.remaining),
            commands::us_element(tags::NUMBER_OF_COMPLETED_SUBOPERATIONS, self.completed),
            commands::us_element(tags::NUMBER_OF_FAILED_SUBOPERATIONS, self.failed),
            commands::us_element(tags::NUMBER_OF_WARNING_SUBOPERATIONS, self.warning),
        ])
    }

    fn from_command_set(
        obj: &InMemDicomObject,
        identifier: Option<Vec<u8>>,
    ) -> Result<Self, commands::Error> {
        Ok(CGetRsp {
            affected_sop_class_uid: commands::require_str(obj, tags::AFFECTED_SOP_CLASS_UID)?,
            message_id_being_responded_to: commands::require_u16(
                obj,
                tags::MESSAGE_ID_BEING_RESPONDED_TO,
            )?,
            status: commands::require_u16(obj, tags::STATUS)?,
            remaining: commands::require_u16(obj, tags::NUMBER_OF_REMAINING_SUBOPERATIONS)?,
            completed: commands::require_u16(obj, tags::NUMBER_OF_COMPLETED_SUBOPERATIONS)?,
            failed: commands::require_u16(obj, tags::NUMBER_OF_FAILED_SUBOPERATIONS)?,
            warning: commands::require_u16(obj, tags::NUMBER_OF_WARNING_SUBOPERATIONS)?,
            identifier,
        })
    }
}

/// A C-MOVE request.
/// The retrieve identifier always accompanies the command.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct CMoveRq {
    pub affected_sop_class_uid: String,
    pub message_id: u16,
    pub priority: Priority,
    pub move_destination: String,
    pub identifier: Vec<u8>,
}

impl CMoveRq {
    pub fn from_params(params: &CMoveServiceParameters) -> Self {
        CMoveRq {
            affected_sop_class_uid: params.affected_sop_class_uid.clone(),
            message_id: params.message_id,
            priority: params.priority,
            move_destination: params.move_destination.clone(),
            identifier: params.identifier.clone().unwrap_or_default(),
        }
    }

    pub fn to_params(&self) -> CMoveServiceParameters {
        CMoveServiceParameters {
            affected_sop_class_uid: self.affected_sop_class_uid.clone(),
            message_id: self.message_id,
            priority: self.priority,
            move_destination: self.move_destination.clone(),
            identifier: Some(self.identifier.clone()),
            ..Default::default()
        }
    }

    fn command_set(&self) -> InMemDicomObject {
        InMemDicomObject::command_from_element_iter([
            commands::str_element(tags::AFFECTED_SOP_CLASS_UID, &self.affected_sop_class_uid),
            commands::us_element(tags::COMMAND_FIELD, CommandField::CMoveRq as u16),
            commands::us_element(tags::MESSAGE_ID, self.message_id),
            commands::str_element(tags::MOVE_DESTINATION, &self.move_destination),
            commands::us_element(tags::PRIORITY, self.priority as u16),
            commands::us_element(tags::COMMAND_DATA_SET_TYPE, DATA_SET_PRESENT),
        ])
    }

    fn from_command_set(
        obj: &InMemDicomObject,
        identifier: Vec<u8>,
    ) -> Result<Self, commands::Error> {
        Ok(CMoveRq {
            affected_sop_class_uid: commands::require_str(obj, tags::AFFECTED_SOP_CLASS_UID)?,
            message_id: commands::require_u16(obj, tags::MESSAGE_ID)?,
            priority: Priority::from_u16(commands::require_u16(obj, tags::PRIORITY)?),
            move_destination: commands::require_str(obj, tags::MOVE_DESTINATION)?,
            identifier,
        })
    }
}

/// A C-MOVE response, including the sub-operation counters.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct CMoveRsp {
    pub affected_sop_class_uid: String,
    pub message_id_being_responded_to: u16,
    pub status: u16,
    pub remaining: u16,
    pub completed: u16,
    pub failed: u16,
    pub warning: u16,
    pub identifier: Option<Vec<u8>>,
}

impl CMoveRsp {
    pub fn from_params(params: &CMoveServiceParameters) -> Self {
        CMoveRsp {
            affected_sop_class_uid: params.affected_sop_class_uid.clone(),
            message_id_being_responded_to: params.message_id_being_responded_to,
            status: params.status,
            remaining: params.remaining,
            completed: params.completed,
            failed: params.failed,
            warning: params.warning,
            identifier: params.identifier.clone(),
        }
    }

    pub fn to_params(&self) -> CMoveServiceParameters {
        CMoveServiceParameters {
            affected_sop_class_uid: self.affected_sop_class_uid.clone(),
            message_id_being_responded_to: self.message_id_being_responded_to,
            status: self.status,
            remaining: self.remaining,
            completed: self.completed,
            failed: self.failed,
            warning: self.warning,
            identifier: self.identifier.clone(),
            ..Default::default()
        }
    }

    fn command_set(&self) -> InMemDicomObject {
        InMemDicomObject::command_from_element_iter([
            commands::str_element(tags::AFFECTED_SOP_CLASS_UID, &self.affected_sop_class_uid),
            commands::us_element(tags::COMMAND_FIELD, CommandField::CMoveRsp as u16),
            commands::us_element(
                tags::MESSAGE_ID_BEING_RESPONDED_TO,
                self.message_id_being_responded_to,
            ),
            commands::us_element(
                tags::COMMAND_DATA_SET_TYPE,
                if self.identifier.is_some() {
                    DATA_SET_PRESENT
                } else {
                    NO_DATA_SET
                },
            ),
            commands::us_element(tags::STATUS, self.status),
            commands::us_element(tags::NUMBER_OF_REMAINING_SUBOPERATIONS, self.remaining),
            commands::us_element(tags::NUMBER_OF_COMPLETED_SUBOPERATIONS, self.completed),
            commands::us_element(tags::NUMBER_OF_FAILED_SUBOPERATIONS, self.failed),
            commands::us_element(tags::NUMBER_OF_WARNING_SUBOPERATIONS, self.warning),
        ])
    }

    fn from_command_set(
        obj: &InMemDicomObject,
        identifier: Option<Vec<u8>>,
    ) -> Result<Self, commands::Error> {
        Ok(CMoveRsp {
            affected_sop_class_uid: commands::require_str(obj, tags::AFFECTED_SOP_CLASS_UID)?,
            message_id_being_responded_to: commands::require_u16(
                obj,
                tags::MESSAGE_ID_BEING_RESPONDED_TO,
            )?,
            status: commands::require_u16(obj, tags::STATUS)?,
            remaining: commands::require_u16(obj, tags::NUMBER_OF_REMAINING_SUBOPERATIONS)?,
            completed: commands::require_u16(obj, tags::NUMBER_OF_COMPLETED_SUBOPERATIONS)?,
            failed: commands::require_u16(obj, tags::NUMBER_OF_FAILED_SUBOPERATIONS)?,
            warning: commands::require_u16(obj, tags::NUMBER_OF_WARNING_SUBOPERATIONS)?,
            identifier,
        })
    }
}

/// A C-CANCEL request.
///
/// Cancels a pending C-FIND, C-GET or C-MOVE operation.
/// It is a stand-alone request with no data set,
/// referring to the original operation
/// through _Message ID Being Responded To_.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct CCancelRq {
    pub message_id_being_responded_to: u16,
}

impl CCancelRq {
    pub fn from_params(params: &CCancelServiceParameters) -> Self {
        CCancelRq {
            message_id_being_responded_to: params.message_id_being_responded_to,
        }
    }

    pub fn to_params(&self) -> CCancelServiceParameters {
        CCancelServiceParameters {
            message_id_being_responded_to: self.message_id_being_responded_to,
        }
    }

    fn command_set(&self) -> InMemDicomObject {
        InMemDicomObject::command_from_element_iter([
            commands::us_element(tags::COMMAND_FIELD, CommandField::CCancelRq as u16),
            commands::us_element(
                tags::MESSAGE_ID_BEING_RESPONDED_TO,
                self.message_id_being_responded_to,
            ),
            commands::us_element(tags::COMMAND_DATA_SET_TYPE, NO_DATA_SET),
        ])
    }

    fn from_command_set(obj: &InMemDicomObject) -> Result<Self, commands::Error> {
        Ok(CCancelRq {
            message_id_being_responded_to: commands::require_u16(
                obj,
                tags::MESSAGE_ID_BEING_RESPONDED_TO,
            )?,
        })
    }
}

/// A composite DIMSE message of any of the supported services.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Message {
    CEchoRq(CEchoRq),
    CEchoRsp(CEchoRsp),
    CStoreRq(CStoreRq),
    CStoreRsp(CStoreRsp),
    CFindRq(CFindRq),
    CFindRsp(CFindRsp),
    CGetRq(CGetRq),
    CGetRsp(CGetRsp),
    CMoveRq(CMoveRq),
    CMoveRsp(CMoveRsp),
    CCancelRq(CCancelRq),
}

macro_rules! impl_from_variant {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for Message {
                fn from(value: $variant) -> Self {
                    Message::$variant(value)
                }
            }
        )*
    };
}

impl_from_variant!(
    CEchoRq, CEchoRsp, CStoreRq, CStoreRsp, CFindRq, CFindRsp, CGetRq, CGetRsp, CMoveRq, CMoveRsp,
    CCancelRq
);

impl Message {
    /// The opcode of this message.
    pub fn command_field(&self) -> CommandField {
        match self {
            Message::CEchoRq(_) => CommandField::CEchoRq,
            Message::CEchoRsp(_) => CommandField::CEchoRsp,
            Message::CStoreRq(_) => CommandField::CStoreRq,
            Message::CStoreRsp(_) => CommandField::CStoreRsp,
            Message::CFindRq(_) => CommandField::CFindRq,
            Message::CFindRsp(_) => CommandField::CFindRsp,
            Message::CGetRq(_) => CommandField::CGetRq,
            Message::CGetRsp(_) => CommandField::CGetRsp,
            Message::CMoveRq(_) => CommandField::CMoveRq,
            Message::CMoveRsp(_) => CommandField::CMoveRsp,
            Message::CCancelRq(_) => CommandField::CCancelRq,
        }
    }

    /// The opaque data set payload accompanying the command set, if any.
    pub fn data_set(&self) -> Option<&[u8]> {
        match self {
            Message::CEchoRq(_)
            | Message::CEchoRsp(_)
            | Message::CStoreRsp(_)
            | Message::CCancelRq(_) => None,
            Message::CStoreRq(msg) => Some(&msg.data_set),
            Message::CFindRq(msg) => Some(&msg.identifier),
            Message::CGetRq(msg) => Some(&msg.identifier),
            Message::CMoveRq(msg) => Some(&msg.identifier),
            Message::CFindRsp(msg) => msg.identifier.as_deref(),
            Message::CGetRsp(msg) => msg.identifier.as_deref(),
            Message::CMoveRsp(msg) => msg.identifier.as_deref(),
        }
    }

    /// Build the command set of this message,
    /// including the group length and data set type elements.
    pub fn command_set(&self) -> InMemDicomObject {
        match self {
            Message::CEchoRq(msg) => msg.command_set(),
            Message::CEchoRsp(msg) => msg.command_set(),
            Message::CStoreRq(msg) => msg.command_set(),
            Message::CStoreRsp(msg) => msg.command_set(),
            Message::CFindRq(msg) => msg.command_set(),
            Message::CFindRsp(msg) => msg.command_set(),
            Message::CGetRq(msg) => msg.command_set(),
            Message::CGetRsp(msg) => msg.command_set(),
            Message::CMoveRq(msg) => msg.command_set(),
            Message::CMoveRsp(msg) => msg.command_set(),
            Message::CCancelRq(msg) => msg.command_set(),
        }
    }

    /// Reconstruct a message from a decoded command set
    /// and the data set payload that accompanied it, if any.
    ///
    /// The concrete variant is selected by the _Command Field_ opcode
    /// before any other element is touched.
    pub fn from_command_set(obj: &InMemDicomObject, data_set: Option<Vec<u8>>) -> Result<Message> {
        let value = commands::require_u16(obj, tags::COMMAND_FIELD)
            .context(InvalidCommandSetSnafu)?;
        let field =
            CommandField::try_from(value).map_err(|value| {
                UnknownCommandFieldSnafu { value }.build()
            })?;

        let message = match field {
            CommandField::CEchoRq => CEchoRq::from_command_set(obj).map(Message::CEchoRq),
            CommandField::CEchoRsp => CEchoRsp::from_command_set(obj).map(Message::CEchoRsp),
            CommandField::CStoreRq => {
                CStoreRq::from_command_set(obj, data_set.unwrap_or_default())
                    .map(Message::CStoreRq)
            }
            CommandField::CStoreRsp => CStoreRsp::from_command_set(obj).map(Message::CStoreRsp),
            CommandField::CFindRq => {
                CFindRq::from_command_set(obj, data_set.unwrap_or_default()).map(Message::CFindRq)
            }
            CommandField::CFindRsp => {
                CFindRsp::from_command_set(obj, data_set).map(Message::CFindRsp)
            }
            CommandField::CGetRq => {
                CGetRq::from_command_set(obj, data_set.unwrap_or_default()).map(Message::CGetRq)
            }
            CommandField::CGetRsp => CGetRsp::from_command_set(obj, data_set).map(Message::CGetRsp),
            CommandField::CMoveRq => {
                CMoveRq::from_command_set(obj, data_set.unwrap_or_default()).map(Message::CMoveRq)
            }
            CommandField::CMoveRsp => {
                CMoveRsp::from_command_set(obj, data_set).map(Message::CMoveRsp)
            }
            CommandField::CCancelRq => CCancelRq::from_command_set(obj).map(Message::CCancelRq),
        };
        message.context(InvalidCommandSetSnafu)
    }

    /// Encode this message into an ordered sequence of P-DATA-TF PDUs,
    /// each carrying a single presentation data value.
    ///
    /// The command set is emitted first
    /// (control headers `0x01`, then `0x03` on the last fragment),
    /// followed by the data set payload if there is one
    /// (control headers `0x00`, then `0x02`).
    /// `max_pdu_length` must be at least 16.
    pub fn encode(&self, presentation_context_id: u8, max_pdu_length: u32) -> Result<Vec<Pdu>> {
        let command_set = self.command_set();
        let mut command = Vec::new();
        command_set
            .write_dataset_with_ts(&mut command, &entries::IMPLICIT_VR_LITTLE_ENDIAN.erased())
            .map_err(Box::new)
            .context(EncodeCommandSetSnafu)?;
        commands::verify_group_length(&command_set, &command)
            .context(InvalidCommandSetSnafu)?;

        let mut pdus = Vec::new();
        push_fragments(
            &mut pdus,
            presentation_context_id,
            PDataValueType::Command,
            fragment::fragment(max_pdu_length, &command),
        );
        if let Some(data_set) = self.data_set() {
            push_fragments(
                &mut pdus,
                presentation_context_id,
                PDataValueType::Data,
                fragment::fragment(max_pdu_length, data_set),
            );
        }
        Ok(pdus)
    }
}

fn push_fragments(
    pdus: &mut Vec<Pdu>,
    presentation_context_id: u8,
    value_type: PDataValueType,
    fragments: Vec<Vec<u8>>,
) {
    let last = fragments.len() - 1;
    for (i, data) in fragments.into_iter().enumerate() {
        pdus.push(Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id,
                value_type,
                is_last: i == last,
                data,
            }],
        });
    }
}

/// A stateful reassembler of DIMSE messages
/// from incoming presentation data values.
///
/// Feed it the values of each incoming P-DATA-TF PDU in order;
/// it buffers command and data set fragments
/// until a last-fragment marker completes the message.
/// A message with no data set completes
/// as soon as its command set does;
/// otherwise completion happens on the last data fragment.
#[derive(Debug, Default)]
pub struct MessageDecoder {
    command: BytesMut,
    data: BytesMut,
    /// decoded command set of a message whose data set is still incoming
    command_set: Option<InMemDicomObject>,
    presentation_context_id: Option<u8>,
}

impl MessageDecoder {
    pub fn new() -> Self {
        MessageDecoder::default()
    }

    /// The presentation context of the message being reassembled,
    /// as seen on the most recent fragment.
    pub fn presentation_context_id(&self) -> Option<u8> {
        self.presentation_context_id
    }

    /// Consume the presentation data values of one incoming P-DATA-TF PDU.
    ///
    /// Returns `Ok(Some(message))` when a message was completed
    /// by one of the given values,
    /// `Ok(None)` when more fragments are needed.
    pub fn process(&mut self, values: &[PDataValue]) -> Result<Option<Message>> {
        for value in values {
            self.presentation_context_id = Some(value.presentation_context_id);
            match value.value_type {
                PDataValueType::Command => {
                    self.command.extend_from_slice(&value.data);
                    if value.is_last {
                        let obj = InMemDicomObject::read_dataset_with_ts(
                            &self.command[..],
                            &entries::IMPLICIT_VR_LITTLE_ENDIAN.erased(),
                        )
                        .context(DecodeCommandSetSnafu)?;
                        self.command.clear();

                        let data_set_type =
                            commands::require_u16(&obj, tags::COMMAND_DATA_SET_TYPE)
                                .context(InvalidCommandSetSnafu)?;
                        if data_set_type == NO_DATA_SET {
                            return Message::from_command_set(&obj, None).map(Some);
                        }
                        // hold on to the command set until the data set completes
                        self.command_set = Some(obj);
                    }
                }
                PDataValueType::Data => {
                    self.data.extend_from_slice(&value.data);
                    if value.is_last {
                        let obj = self.command_set.take().context(MissingCommandSetSnafu)?;
                        let data = std::mem::take(&mut self.data);
                        return Message::from_command_set(&obj, Some(data.to_vec())).map(Some);
                    }
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERIFICATION: &str = "1.2.840.10008.1.1";

    #[test]
    fn echo_command_set_has_expected_elements() {
        let msg = CEchoRq {
            affected_sop_class_uid: VERIFICATION.to_string(),
            message_id: 7,
        };
        let obj = msg.command_set();

        assert_eq!(
            commands::require_u16(&obj, tags::COMMAND_FIELD).unwrap(),
            0x0030
        );
        assert_eq!(
            commands::require_u16(&obj, tags::COMMAND_DATA_SET_TYPE).unwrap(),
            NO_DATA_SET
        );
        assert_eq!(commands::require_u16(&obj, tags::MESSAGE_ID).unwrap(), 7);
        assert_eq!(
            commands::require_str(&obj, tags::AFFECTED_SOP_CLASS_UID).unwrap(),
            VERIFICATION
        );
    }

    #[test]
    fn store_rq_emits_move_originator_elements_even_when_empty() {
        let msg = CStoreRq {
            affected_sop_class_uid: "1.2.840.10008.5.1.4.1.1.7".to_string(),
            affected_sop_instance_uid: "1.2.3.4.5".to_string(),
            message_id: 1,
            priority: Priority::Medium,
            move_originator_aet: None,
            move_originator_message_id: None,
            data_set: vec![1, 2, 3, 4],
        };
        let obj = msg.command_set();

        assert!(obj
            .get(tags::MOVE_ORIGINATOR_APPLICATION_ENTITY_TITLE)
            .is_some());
        assert!(obj.get(tags::MOVE_ORIGINATOR_MESSAGE_ID).is_some());
        assert_eq!(
            commands::optional_str(&obj, tags::MOVE_ORIGINATOR_APPLICATION_ENTITY_TITLE).unwrap(),
            None
        );
    }

    #[test]
    fn unknown_command_field_is_rejected() {
        let obj = InMemDicomObject::command_from_element_iter([
            commands::us_element(tags::COMMAND_FIELD, 0x0042),
            commands::us_element(tags::COMMAND_DATA_SET_TYPE, NO_DATA_SET),
        ]);
        let err = Message::from_command_set(&obj, None);
        assert!(matches!(
            err,
            Err(Error::UnknownCommandField { value: 0x0042, .. })
        ));
    }

    #[test]
    fn cancel_is_a_stand_alone_request_without_data_set() {
        let msg = Message::CCancelRq(CCancelRq {
            message_id_being_responded_to: 9,
        });
        assert_eq!(msg.data_set(), None);
        let obj = msg.command_set();
        assert_eq!(
            commands::require_u16(&obj, tags::COMMAND_DATA_SET_TYPE).unwrap(),
            NO_DATA_SET
        );
    }
}
