//! The DICOM upper layer protocol state machine (PS3.8, section 9.2).
//!
//! The machine holds no socket, queue or timer of its own:
//! [`StateMachine::dispatch`] maps one event onto a [`Transition`]
//! describing the next state and the effects to carry out,
//! and the provider loop executes those effects.
//! This keeps every action a function of the current state and the event,
//! each enqueuing at most one outgoing PDU
//! and at most one primitive to the user.

use std::net::SocketAddr;

use tracing::debug;

use crate::pdu::{
    AbortRQServiceProviderReason, AbortRQSource, AssociationAC, AssociationRJ,
    AssociationRJResult, AssociationRJServiceProviderAsceReason, AssociationRJSource,
    AssociationRQ, PDataValue, Pdu,
};

/// The states of the upper layer state machine.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum State {
    /// Idle, no transport connection
    Sta1 = 1,
    /// Transport open, awaiting A-ASSOCIATE-RQ PDU
    Sta2 = 2,
    /// Awaiting local A-ASSOCIATE response primitive
    Sta3 = 3,
    /// Awaiting transport connection to open (requestor)
    Sta4 = 4,
    /// Awaiting A-ASSOCIATE-AC or A-ASSOCIATE-RJ PDU
    Sta5 = 5,
    /// Association established, data transfer
    Sta6 = 6,
    /// Awaiting A-RELEASE-RP PDU
    Sta7 = 7,
    /// Awaiting local A-RELEASE response primitive
    Sta8 = 8,
    /// Release collision (requestor): awaiting local A-RELEASE response
    Sta9 = 9,
    /// Release collision (acceptor): awaiting A-RELEASE-RP PDU
    Sta10 = 10,
    /// Release collision (requestor): awaiting A-RELEASE-RP PDU
    Sta11 = 11,
    /// Release collision (acceptor): awaiting local A-RELEASE response
    Sta12 = 12,
    /// Awaiting transport connection close
    Sta13 = 13,
}

impl State {
    pub fn from_u8(value: u8) -> Option<State> {
        match value {
            1 => Some(State::Sta1),
            2 => Some(State::Sta2),
            3 => Some(State::Sta3),
            4 => Some(State::Sta4),
            5 => Some(State::Sta5),
            6 => Some(State::Sta6),
            7 => Some(State::Sta7),
            8 => Some(State::Sta8),
            9 => Some(State::Sta9),
            10 => Some(State::Sta10),
            11 => Some(State::Sta11),
            12 => Some(State::Sta12),
            13 => Some(State::Sta13),
            _ => None,
        }
    }
}

/// The events driving the state machine,
/// numbered 1 to 19 by the standard.
///
/// Events originate from three sources:
/// service user primitives, the network, and the ARTIM timer.
#[derive(Debug)]
pub enum Event {
    /// A-ASSOCIATE request primitive from the local user (event 1)
    AAssociateRq {
        peer: SocketAddr,
        request: AssociationRQ,
    },
    /// Transport connection confirmed, requestor side (event 2)
    TransportConnected,
    /// A-ASSOCIATE-AC PDU received (event 3)
    AAssociateAcPdu(AssociationAC),
    /// A-ASSOCIATE-RJ PDU received (event 4)
    AAssociateRjPdu(AssociationRJ),
    /// Incoming transport connection accepted (event 5)
    TransportIndication,
    /// A-ASSOCIATE-RQ PDU received (event 6)
    AAssociateRqPdu(AssociationRQ),
    /// A-ASSOCIATE response primitive (accept) from the local user (event 7)
    AAssociateAc(AssociationAC),
    /// A-ASSOCIATE response primitive (reject) from the local user (event 8)
    AAssociateRj(AssociationRJ),
    /// P-DATA request primitive from the local user (event 9)
    PDataRq(Vec<PDataValue>),
    /// P-DATA-TF PDU received (event 10)
    PDataTfPdu(Vec<PDataValue>),
    /// A-RELEASE request primitive from the local user (event 11)
    AReleaseRq,
    /// A-RELEASE-RQ PDU received (event 12)
    AReleaseRqPdu,
    /// A-RELEASE-RP PDU received (event 13)
    AReleaseRpPdu,
    /// A-RELEASE response primitive from the local user (event 14)
    AReleaseRp,
    /// A-ABORT request primitive from the local user (event 15)
    AAbortRq(AbortRQSource),
    /// A-ABORT PDU received (event 16)
    AAbortPdu(AbortRQSource),
    /// Transport connection closed or failed (event 17)
    TransportClosed,
    /// ARTIM timer expired (event 18)
    ArtimExpired,
    /// Unrecognized or malformed PDU received (event 19)
    InvalidPdu,
}

/// A service primitive delivered to the DUL user.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Indication {
    /// A-ASSOCIATE indication: a peer requests an association
    Associate(AssociationRQ),
    /// A-ASSOCIATE confirmation (accept)
    AssociateAccepted(AssociationAC),
    /// A-ASSOCIATE confirmation (reject),
    /// from the peer or generated locally on timeout
    AssociateRejected(AssociationRJ),
    /// P-DATA indication
    PData(Vec<PDataValue>),
    /// A-RELEASE indication: the peer requests an orderly release
    Release,
    /// A-RELEASE confirmation
    ReleaseConfirmed,
    /// A-ABORT indication: the peer aborted the association
    Abort(AbortRQSource),
    /// A-P-ABORT indication: the provider aborted the association
    ProviderAbort(AbortRQServiceProviderReason),
}

/// The actions of the transition table (PS3.8, tables 9-6 to 9-9).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ActionKind {
    Ae1,
    Ae2,
    Ae3,
    Ae4,
    Ae5,
    Ae6,
    Ae7,
    Ae8,
    Dt1,
    Dt2,
    Ar1,
    Ar2,
    Ar3,
    Ar4,
    Ar5,
    Ar6,
    Ar7,
    Ar8,
    Ar9,
    Ar10,
    Aa1,
    Aa2,
    Aa3,
    Aa4,
    Aa5,
    Aa6,
    Aa7,
    Aa8,
}

/// Instruction for the ARTIM timer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TimerOp {
    Keep,
    Start,
    Stop,
}

/// Instruction for the transport connection.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TransportOp {
    None,
    /// Open a transport connection to the given peer
    Connect(SocketAddr),
    /// Close the transport connection
    Close,
}

/// The outcome of dispatching one event:
/// the applied action, the next state, and the effects to carry out.
#[derive(Debug)]
pub struct Transition {
    pub action: ActionKind,
    pub next: State,
    pub outgoing: Option<Pdu>,
    pub indication: Option<Indication>,
    pub timer: TimerOp,
    pub transport: TransportOp,
}

impl Transition {
    fn new(action: ActionKind, next: State) -> Self {
        Transition {
            action,
            next,
            outgoing: None,
            indication: None,
            timer: TimerOp::Keep,
            transport: TransportOp::None,
        }
    }

    fn outgoing(mut self, pdu: Pdu) -> Self {
        self.outgoing = Some(pdu);
        self
    }

    fn indicate(mut self, indication: Indication) -> Self {
        self.indication = Some(indication);
        self
    }

    fn timer(mut self, op: TimerOp) -> Self {
        self.timer = op;
        self
    }

    fn transport(mut self, op: TransportOp) -> Self {
        self.transport = op;
        self
    }
}

/// The role this node took when association setup began.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Role {
    Requestor,
    Acceptor,
}

/// The upper layer protocol state machine.
#[derive(Debug)]
pub struct StateMachine {
    state: State,
    role: Role,
    /// association request waiting for the transport connection to open
    pending_request: Option<AssociationRQ>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        StateMachine {
            state: State::Sta1,
            role: Role::Acceptor,
            pending_request: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Apply one event, moving to the next state
    /// and yielding the effects of the table-defined action.
    ///
    /// A (state, event) pair outside the transition table
    /// falls back to AA-8:
    /// send an A-ABORT PDU, indicate A-P-ABORT to the user,
    /// and await transport close.
    /// This function never panics.
    pub fn dispatch(&mut self, event: Event) -> Transition {
        use self::State::*;

        let transition = match event {
            Event::AAssociateRq { peer, request } => match self.state {
                Sta1 => {
                    self.role = Role::Requestor;
                    self.pending_request = Some(request);
                    Transition::new(ActionKind::Ae1, Sta4)
                        .transport(TransportOp::Connect(peer))
                }
                _ => self.aa8(AbortRQServiceProviderReason::UnexpectedPdu),
            },
            Event::TransportConnected => match self.state {
                // the ARTIM timer bounds the wait for the peer's answer
                Sta4 => {
                    let mut transition =
                        Transition::new(ActionKind::Ae2, Sta5).timer(TimerOp::Start);
                    if let Some(request) = self.pending_request.take() {
                        transition = transition.outgoing(Pdu::AssociationRQ(request));
                    }
                    transition
                }
                _ => self.aa8(AbortRQServiceProviderReason::UnexpectedPdu),
            },
            Event::AAssociateAcPdu(ac) => match self.state {
                Sta2 => self.aa1(),
                Sta5 => Transition::new(ActionKind::Ae3, Sta6)
                    .timer(TimerOp::Stop)
                    .indicate(Indication::AssociateAccepted(ac)),
                Sta13 => Transition::new(ActionKind::Aa6, Sta13),
                _ => self.aa8(AbortRQServiceProviderReason::UnexpectedPdu),
            },
            Event::AAssociateRjPdu(rj) => match self.state {
                Sta2 => self.aa1(),
                Sta5 => Transition::new(ActionKind::Ae4, Sta1)
                    .timer(TimerOp::Stop)
                    .transport(TransportOp::Close)
                    .indicate(Indication::AssociateRejected(rj)),
                Sta13 => Transition::new(ActionKind::Aa6, Sta13),
                _ => self.aa8(AbortRQServiceProviderReason::UnexpectedPdu),
            },
            Event::TransportIndication => match self.state {
                Sta1 => {
                    self.role = Role::Acceptor;
                    Transition::new(ActionKind::Ae5, Sta2).timer(TimerOp::Start)
                }
                _ => self.aa8(AbortRQServiceProviderReason::UnexpectedPdu),
            },
            Event::AAssociateRqPdu(rq) => match self.state {
                // acceptability is decided by the service user in Sta3
                Sta2 => Transition::new(ActionKind::Ae6, Sta3)
                    .timer(TimerOp::Stop)
                    .indicate(Indication::Associate(rq)),
                Sta13 => self.aa7(),
                _ => self.aa8(AbortRQServiceProviderReason::UnexpectedPdu),
            },
            Event::AAssociateAc(ac) => match self.state {
                Sta3 => Transition::new(ActionKind::Ae7, Sta6).outgoing(Pdu::AssociationAC(ac)),
                _ => self.aa8(AbortRQServiceProviderReason::UnexpectedPdu),
            },
            Event::AAssociateRj(rj) => match self.state {
                Sta3 => Transition::new(ActionKind::Ae8, Sta13)
                    .outgoing(Pdu::AssociationRJ(rj))
                    .timer(TimerOp::Start),
                _ => self.aa8(AbortRQServiceProviderReason::UnexpectedPdu),
            },
            Event::PDataRq(data) => match self.state {
                Sta6 => Transition::new(ActionKind::Dt1, Sta6).outgoing(Pdu::PData { data }),
                Sta8 => Transition::new(ActionKind::Ar7, Sta8).outgoing(Pdu::PData { data }),
                _ => self.aa8(AbortRQServiceProviderReason::UnexpectedPdu),
            },
            Event::PDataTfPdu(data) => match self.state {
                Sta2 => self.aa1(),
                Sta6 => Transition::new(ActionKind::Dt2, Sta6).indicate(Indication::PData(data)),
                Sta7 => Transition::new(ActionKind::Ar6, Sta7).indicate(Indication::PData(data)),
                Sta13 => Transition::new(ActionKind::Aa6, Sta13),
                _ => self.aa8(AbortRQServiceProviderReason::UnexpectedPdu),
            },
            Event::AReleaseRq => match self.state {
                // the ARTIM timer bounds the wait for the release response
                Sta6 => Transition::new(ActionKind::Ar1, Sta7)
                    .outgoing(Pdu::ReleaseRQ)
                    .timer(TimerOp::Start),
                _ => self.aa8(AbortRQServiceProviderReason::UnexpectedPdu),
            },
            Event::AReleaseRqPdu => match self.state {
                Sta2 => self.aa1(),
                Sta6 => Transition::new(ActionKind::Ar2, Sta8).indicate(Indication::Release),
                // release collision
                Sta7 => {
                    let next = match self.role {
                        Role::Requestor => Sta9,
                        Role::Acceptor => Sta10,
                    };
                    Transition::new(ActionKind::Ar8, next).indicate(Indication::Release)
                }
                Sta13 => Transition::new(ActionKind::Aa6, Sta13),
                _ => self.aa8(AbortRQServiceProviderReason::UnexpectedPdu),
            },
            Event::AReleaseRpPdu => match self.state {
                Sta2 => self.aa1(),
                Sta7 | Sta11 => Transition::new(ActionKind::Ar3, Sta1)
                    .timer(TimerOp::Stop)
                    .transport(TransportOp::Close)
                    .indicate(Indication::ReleaseConfirmed),
                Sta10 => Transition::new(ActionKind::Ar10, Sta12)
                    .indicate(Indication::ReleaseConfirmed),
                Sta13 => Transition::new(ActionKind::Aa6, Sta13),
                _ => self.aa8(AbortRQServiceProviderReason::UnexpectedPdu),
            },
            Event::AReleaseRp => match self.state {
                Sta8 | Sta12 => Transition::new(ActionKind::Ar4, Sta13)
                    .outgoing(Pdu::ReleaseRP)
                    .timer(TimerOp::Start),
                Sta9 => Transition::new(ActionKind::Ar9, Sta11).outgoing(Pdu::ReleaseRP),
                _ => self.aa8(AbortRQServiceProviderReason::UnexpectedPdu),
            },
            Event::AAbortRq(source) => match self.state {
                Sta4 => Transition::new(ActionKind::Aa2, Sta1)
                    .timer(TimerOp::Stop)
                    .transport(TransportOp::Close),
                Sta3 | Sta5 | Sta6 | Sta7 | Sta8 | Sta9 | Sta10 | Sta11 | Sta12 => {
                    Transition::new(ActionKind::Aa1, Sta13)
                        .outgoing(Pdu::AbortRQ { source })
                        .timer(TimerOp::Start)
                }
                _ => self.aa8(AbortRQServiceProviderReason::UnexpectedPdu),
            },
            Event::AAbortPdu(source) => match self.state {
                Sta2 | Sta13 => Transition::new(ActionKind::Aa2, Sta1)
                    .timer(TimerOp::Stop)
                    .transport(TransportOp::Close),
                Sta3 | Sta5 | Sta6 | Sta7 | Sta8 | Sta9 | Sta10 | Sta11 | Sta12 => {
                    let indication = match source {
                        AbortRQSource::ServiceProvider(reason) => {
                            Indication::ProviderAbort(reason)
                        }
                        other => Indication::Abort(other),
                    };
                    Transition::new(ActionKind::Aa3, Sta1)
                        .timer(TimerOp::Stop)
                        .transport(TransportOp::Close)
                        .indicate(indication)
                }
                _ => self.aa8(AbortRQServiceProviderReason::UnexpectedPdu),
            },
            Event::TransportClosed => match self.state {
                Sta2 => Transition::new(ActionKind::Aa5, Sta1).timer(TimerOp::Stop),
                Sta13 => Transition::new(ActionKind::Ar5, Sta1).timer(TimerOp::Stop),
                Sta3 | Sta4 | Sta5 | Sta6 | Sta7 | Sta8 | Sta9 | Sta10 | Sta11 | Sta12 => {
                    Transition::new(ActionKind::Aa4, Sta1)
                        .timer(TimerOp::Stop)
                        .indicate(Indication::ProviderAbort(
                            AbortRQServiceProviderReason::ReasonNotSpecified,
                        ))
                }
                _ => self.aa8(AbortRQServiceProviderReason::UnexpectedPdu),
            },
            Event::ArtimExpired => match self.state {
                Sta2 | Sta13 => Transition::new(ActionKind::Aa2, Sta1)
                    .timer(TimerOp::Stop)
                    .transport(TransportOp::Close),
                // an unanswered association request is reported to the user
                // as a transient rejection
                Sta5 => Transition::new(ActionKind::Aa2, Sta1)
                    .timer(TimerOp::Stop)
                    .transport(TransportOp::Close)
                    .indicate(Indication::AssociateRejected(AssociationRJ {
                        result: AssociationRJResult::Transient,
                        source: AssociationRJSource::ServiceProviderAsce(
                            AssociationRJServiceProviderAsceReason::NoReasonGiven,
                        ),
                    })),
                _ => self.aa8(AbortRQServiceProviderReason::UnexpectedPdu),
            },
            Event::InvalidPdu => match self.state {
                Sta2 => self.aa1(),
                Sta13 => self.aa7(),
                _ => self.aa8(AbortRQServiceProviderReason::ReasonNotSpecified),
            },
        };

        debug!(
            "{:?} + {:?} -> {:?}",
            self.state, transition.action, transition.next
        );
        self.state = transition.next;
        transition
    }

    /// AA-1: send an A-ABORT PDU and restart the ARTIM timer.
    fn aa1(&self) -> Transition {
        Transition::new(ActionKind::Aa1, State::Sta13)
            .outgoing(Pdu::AbortRQ {
                source: AbortRQSource::ServiceUser,
            })
            .timer(TimerOp::Start)
    }

    /// AA-7: send an A-ABORT PDU and stay awaiting transport close.
    fn aa7(&self) -> Transition {
        Transition::new(ActionKind::Aa7, State::Sta13).outgoing(Pdu::AbortRQ {
            source: AbortRQSource::ServiceProvider(AbortRQServiceProviderReason::UnexpectedPdu),
        })
    }

    /// AA-8: send an A-ABORT PDU, indicate A-P-ABORT to the user,
    /// and start the ARTIM timer while awaiting transport close.
    fn aa8(&self, reason: AbortRQServiceProviderReason) -> Transition {
        Transition::new(ActionKind::Aa8, State::Sta13)
            .outgoing(Pdu::AbortRQ {
                source: AbortRQSource::ServiceProvider(reason),
            })
            .indicate(Indication::ProviderAbort(reason))
            .timer(TimerOp::Start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rq() -> AssociationRQ {
        AssociationRQ {
            protocol_version: 1,
            calling_ae_title: "THIS-SCU".to_string(),
            called_ae_title: "ANY-SCP".to_string(),
            application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
            presentation_contexts: vec![],
            user_variables: vec![],
        }
    }

    fn sample_ac() -> AssociationAC {
        AssociationAC {
            protocol_version: 1,
            application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
            called_ae_title: "ANY-SCP".to_string(),
            calling_ae_title: "THIS-SCU".to_string(),
            presentation_contexts: vec![],
            user_variables: vec![],
        }
    }

    fn sample_rj() -> AssociationRJ {
        AssociationRJ {
            result: AssociationRJResult::Permanent,
            source: AssociationRJSource::ServiceUser(
                crate::pdu::AssociationRJServiceUserReason::NoReasonGiven,
            ),
        }
    }

    fn sample_events() -> Vec<Event> {
        let peer: SocketAddr = "127.0.0.1:11112".parse().unwrap();
        vec![
            Event::AAssociateRq {
                peer,
                request: sample_rq(),
            },
            Event::TransportConnected,
            Event::AAssociateAcPdu(sample_ac()),
            Event::AAssociateRjPdu(sample_rj()),
            Event::TransportIndication,
            Event::AAssociateRqPdu(sample_rq()),
            Event::AAssociateAc(sample_ac()),
            Event::AAssociateRj(sample_rj()),
            Event::PDataRq(vec![]),
            Event::PDataTfPdu(vec![]),
            Event::AReleaseRq,
            Event::AReleaseRqPdu,
            Event::AReleaseRpPdu,
            Event::AReleaseRp,
            Event::AAbortRq(AbortRQSource::ServiceUser),
            Event::AAbortPdu(AbortRQSource::ServiceUser),
            Event::TransportClosed,
            Event::ArtimExpired,
            Event::InvalidPdu,
        ]
    }

    const ALL_STATES: [State; 13] = [
        State::Sta1,
        State::Sta2,
        State::Sta3,
        State::Sta4,
        State::Sta5,
        State::Sta6,
        State::Sta7,
        State::Sta8,
        State::Sta9,
        State::Sta10,
        State::Sta11,
        State::Sta12,
        State::Sta13,
    ];

    #[test]
    fn dispatch_is_total() {
        // every (state, event) pair either applies a table action
        // or falls back to AA-8, without panicking
        for state in ALL_STATES {
            for event in sample_events() {
                let mut machine = StateMachine::new();
                machine.state = state;
                let transition = machine.dispatch(event);
                assert!(State::from_u8(transition.next as u8).is_some());
            }
        }
    }

    #[test]
    fn requestor_establishment_and_release() {
        let peer: SocketAddr = "127.0.0.1:11112".parse().unwrap();
        let mut machine = StateMachine::new();

        let t = machine.dispatch(Event::AAssociateRq {
            peer,
            request: sample_rq(),
        });
        assert_eq!(t.action, ActionKind::Ae1);
        assert_eq!(machine.state(), State::Sta4);
        assert_eq!(t.transport, TransportOp::Connect(peer));

        let t = machine.dispatch(Event::TransportConnected);
        assert_eq!(t.action, ActionKind::Ae2);
        assert_eq!(machine.state(), State::Sta5);
        assert!(matches!(t.outgoing, Some(Pdu::AssociationRQ(_))));
        assert_eq!(t.timer, TimerOp::Start);

        let t = machine.dispatch(Event::AAssociateAcPdu(sample_ac()));
        assert_eq!(t.action, ActionKind::Ae3);
        assert_eq!(machine.state(), State::Sta6);
        assert!(matches!(
            t.indication,
            Some(Indication::AssociateAccepted(_))
        ));

        let t = machine.dispatch(Event::AReleaseRq);
        assert_eq!(t.action, ActionKind::Ar1);
        assert_eq!(machine.state(), State::Sta7);
        assert!(matches!(t.outgoing, Some(Pdu::ReleaseRQ)));

        let t = machine.dispatch(Event::AReleaseRpPdu);
        assert_eq!(t.action, ActionKind::Ar3);
        assert_eq!(machine.state(), State::Sta1);
        assert_eq!(t.indication, Some(Indication::ReleaseConfirmed));
        assert_eq!(t.transport, TransportOp::Close);
    }

    #[test]
    fn acceptor_establishment() {
        let mut machine = StateMachine::new();

        let t = machine.dispatch(Event::TransportIndication);
        assert_eq!(t.action, ActionKind::Ae5);
        assert_eq!(machine.state(), State::Sta2);
        assert_eq!(t.timer, TimerOp::Start);

        let t = machine.dispatch(Event::AAssociateRqPdu(sample_rq()));
        assert_eq!(t.action, ActionKind::Ae6);
        assert_eq!(machine.state(), State::Sta3);
        assert_eq!(t.timer, TimerOp::Stop);
        assert!(matches!(t.indication, Some(Indication::Associate(_))));

        let t = machine.dispatch(Event::AAssociateAc(sample_ac()));
        assert_eq!(t.action, ActionKind::Ae7);
        assert_eq!(machine.state(), State::Sta6);
        assert!(matches!(t.outgoing, Some(Pdu::AssociationAC(_))));
    }

    #[test]
    fn release_collision_sides() {
        // requestor side goes through Sta9/Sta11
        let mut machine = StateMachine::new();
        machine.state = State::Sta7;
        machine.role = Role::Requestor;
        let t = machine.dispatch(Event::AReleaseRqPdu);
        assert_eq!(t.action, ActionKind::Ar8);
        assert_eq!(machine.state(), State::Sta9);

        let t = machine.dispatch(Event::AReleaseRp);
        assert_eq!(t.action, ActionKind::Ar9);
        assert_eq!(machine.state(), State::Sta11);

        let t = machine.dispatch(Event::AReleaseRpPdu);
        assert_eq!(t.action, ActionKind::Ar3);
        assert_eq!(machine.state(), State::Sta1);

        // acceptor side goes through Sta10/Sta12
        let mut machine = StateMachine::new();
        machine.state = State::Sta7;
        machine.role = Role::Acceptor;
        let t = machine.dispatch(Event::AReleaseRqPdu);
        assert_eq!(t.action, ActionKind::Ar8);
        assert_eq!(machine.state(), State::Sta10);

        let t = machine.dispatch(Event::AReleaseRpPdu);
        assert_eq!(t.action, ActionKind::Ar10);
        assert_eq!(machine.state(), State::Sta12);

        let t = machine.dispatch(Event::AReleaseRp);
        assert_eq!(t.action, ActionKind::Ar4);
        assert_eq!(machine.state(), State::Sta13);
        assert!(matches!(t.outgoing, Some(Pdu::ReleaseRP)));
    }

    #[test]
    fn unexpected_pdu_in_data_transfer_aborts() {
        let mut machine = StateMachine::new();
        machine.state = State::Sta6;

        let t = machine.dispatch(Event::InvalidPdu);
        assert_eq!(t.action, ActionKind::Aa8);
        assert_eq!(machine.state(), State::Sta13);
        assert!(matches!(t.outgoing, Some(Pdu::AbortRQ { .. })));
        assert!(matches!(t.indication, Some(Indication::ProviderAbort(_))));
    }

    #[test]
    fn artim_expiry_while_awaiting_association_response() {
        let mut machine = StateMachine::new();
        machine.state = State::Sta5;

        let t = machine.dispatch(Event::ArtimExpired);
        assert_eq!(t.action, ActionKind::Aa2);
        assert_eq!(machine.state(), State::Sta1);
        assert_eq!(t.transport, TransportOp::Close);
        assert!(matches!(
            t.indication,
            Some(Indication::AssociateRejected(AssociationRJ {
                result: AssociationRJResult::Transient,
                ..
            }))
        ));
    }

    #[test]
    fn peer_abort_is_indicated() {
        let mut machine = StateMachine::new();
        machine.state = State::Sta6;

        let t = machine.dispatch(Event::AAbortPdu(AbortRQSource::ServiceUser));
        assert_eq!(t.action, ActionKind::Aa3);
        assert_eq!(machine.state(), State::Sta1);
        assert_eq!(t.indication, Some(Indication::Abort(AbortRQSource::ServiceUser)));
    }
}
