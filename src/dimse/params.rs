//! Service parameter records exchanged with the application layer.
//!
//! Each DIMSE service is described by one flat record
//! holding the fields of its request and response primitives.
//! The records never contain wire encoding;
//! mapping to and from command sets
//! is the job of the message variants in the parent module.

use crate::dimse::Priority;

/// Parameters of the C-ECHO service.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct CEchoServiceParameters {
    pub affected_sop_class_uid: String,
    pub message_id: u16,
    pub message_id_being_responded_to: u16,
    pub status: u16,
}

/// Parameters of the C-STORE service.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct CStoreServiceParameters {
    pub affected_sop_class_uid: String,
    pub affected_sop_instance_uid: String,
    pub message_id: u16,
    pub message_id_being_responded_to: u16,
    pub priority: Priority,
    /// AE title of the C-MOVE originator,
    /// when this store is a C-MOVE sub-operation
    pub move_originator_aet: Option<String>,
    /// Message ID of the originating C-MOVE request,
    /// when this store is a C-MOVE sub-operation
    pub move_originator_message_id: Option<u16>,
    /// The encoded composite instance to be stored
    pub data_set: Option<Vec<u8>>,
    pub status: u16,
}

/// Parameters of the C-FIND service.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct CFindServiceParameters {
    pub affected_sop_class_uid: String,
    pub message_id: u16,
    pub message_id_being_responded_to: u16,
    pub priority: Priority,
    /// The encoded query identifier (request)
    /// or match identifier (pending response)
    pub identifier: Option<Vec<u8>>,
    pub status: u16,
}

/// Parameters of the C-GET service.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct CGetServiceParameters {
    pub affected_sop_class_uid: String,
    pub message_id: u16,
    pub message_id_being_responded_to: u16,
    pub priority: Priority,
    pub identifier: Option<Vec<u8>>,
    pub status: u16,
    pub remaining: u16,
    pub completed: u16,
    pub failed: u16,
    pub warning: u16,
}

/// Parameters of the C-MOVE service.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct CMoveServiceParameters {
    pub affected_sop_class_uid: String,
    pub message_id: u16,
    pub message_id_being_responded_to: u16,
    pub priority: Priority,
    /// AE title of the application entity
    /// that shall receive the C-STORE sub-operations
    pub move_destination: String,
    pub identifier: Option<Vec<u8>>,
    pub status: u16,
    pub remaining: u16,
    pub completed: u16,
    pub failed: u16,
    pub warning: u16,
}

/// Parameters of the C-CANCEL request.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct CCancelServiceParameters {
    pub message_id_being_responded_to: u16,
}
