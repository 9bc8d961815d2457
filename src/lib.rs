//! This crate contains the types and methods needed to exchange
//! DIMSE messages between DICOM nodes through the upper layer protocol.
//!
//! It serves as a base for concrete service class users (SCUs)
//! and service class providers (SCPs):
//!
//! - The [`pdu`] module
//!   provides data structures representing _protocol data units_
//!   and their wire codec.
//! - The [`dimse`] module
//!   provides a typed catalog of the composite DIMSE messages,
//!   a command set codec,
//!   and the fragmentation and reassembly of messages
//!   into and out of P-DATA-TF PDUs.
//! - The [`provider`] module
//!   provides an event driven DUL service provider:
//!   the association control state machine
//!   and the cooperative loop which drives it
//!   from the network, a user primitive queue, and the ARTIM timer.
//!
//! Command sets are always encoded in Implicit VR Little Endian,
//! regardless of the transfer syntax negotiated for the data sets,
//! as mandated by the standard.

pub mod dimse;
pub mod pdu;
pub mod provider;

/// The implementation class UID generically referring to this crate.
///
/// Generated as per the standard, part 5, section B.2.
///
/// This UID may change in future versions,
/// even between patch versions.
pub const IMPLEMENTATION_CLASS_UID: &str = "2.25.305828226938881605926274536244108354885";

/// The implementation version name generically referring to this crate.
///
/// This name may change in future versions,
/// even between patch versions.
pub const IMPLEMENTATION_VERSION_NAME: &str = "DICOM-DUL 0.1.0";

// re-exports

pub use dimse::{Message, MessageDecoder};
pub use pdu::read_pdu;
pub use pdu::write_pdu;
pub use pdu::Pdu;
pub use provider::{DulProvider, DulProviderOptions};
