//! The DUL service provider.
//!
//! A [`DulProvider`] runs the upper layer state machine
//! in a dedicated thread,
//! with a single cooperative loop polling three event sources in order:
//! the network (incoming connections and PDUs),
//! the user primitive queue,
//! and the ARTIM timer.
//! One provider serves one association at a time;
//! independent associations run on independent providers
//! with no shared state.
//!
//! The user talks to the provider through two queues:
//! primitives go in through [`DulProvider::send`]
//! and indications come out through [`DulProvider::receive`]
//! and its non-blocking variants.
//! Everything that happens on the network plane
//! is converted into state machine events inside the loop
//! and never surfaces as an error to the caller.

pub mod fsm;
pub mod timer;

use std::collections::VecDeque;
use std::io::Read;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::BytesMut;
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::{debug, trace, warn};

use crate::pdu::reader::read_pdu;
use crate::pdu::writer::write_pdu;
use crate::pdu::{
    AbortRQSource, AssociationAC, AssociationRJ, AssociationRQ, PDataValue, Pdu, DEFAULT_MAX_PDU,
    MAXIMUM_PDU_SIZE, PDU_HEADER_SIZE,
};
use fsm::{Event, StateMachine, TimerOp, Transition, TransportOp};
use timer::ArtimTimer;

pub use fsm::{Indication, State};
pub use timer::DEFAULT_ARTIM_TIMEOUT;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// could not bind the listening socket
    Bind { source: std::io::Error },

    /// could not configure a socket
    Configure { source: std::io::Error },

    /// could not spawn the provider thread
    Spawn { source: std::io::Error },

    /// the provider loop has terminated
    ProviderDown,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A service primitive issued by the DUL user.
///
/// The loop classifies each primitive into the corresponding
/// state machine event when it is dequeued.
#[derive(Debug)]
pub enum UserPrimitive {
    /// Request an association with the given peer.
    AssociateRq {
        peer: SocketAddr,
        request: AssociationRQ,
    },
    /// Accept the association proposed by the peer.
    AssociateAc(AssociationAC),
    /// Reject the association proposed by the peer.
    AssociateRj(AssociationRJ),
    /// Send presentation data values to the peer.
    PData(Vec<PDataValue>),
    /// Request an orderly association release.
    ReleaseRq,
    /// Answer the peer's release request.
    ReleaseRp,
    /// Abort the association.
    AbortRq(AbortRQSource),
}

/// Options for spawning a [`DulProvider`].
///
/// # Example
///
/// ```no_run
/// # use dicom_dul::provider::DulProviderOptions;
/// # use std::time::Duration;
/// # fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let provider = DulProviderOptions::new()
///     .artim_timeout(Duration::from_secs(30))
///     .spawn_listener("0.0.0.0:11112")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DulProviderOptions {
    /// time-to-live of the ARTIM timer
    artim_timeout: Duration,
    /// the maximum PDU length for incoming PDUs
    max_pdu_length: u32,
    /// whether incoming PDUs must not surpass the maximum PDU length
    strict: bool,
}

impl Default for DulProviderOptions {
    fn default() -> Self {
        DulProviderOptions {
            artim_timeout: DEFAULT_ARTIM_TIMEOUT,
            max_pdu_length: DEFAULT_MAX_PDU,
            strict: false,
        }
    }
}

impl DulProviderOptions {
    /// Create a new set of options with the default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the ARTIM timeout.
    ///
    /// The default is 10 seconds.
    pub fn artim_timeout(mut self, timeout: Duration) -> Self {
        self.artim_timeout = timeout;
        self
    }

    /// Override the maximum expected PDU length.
    pub fn max_pdu_length(mut self, value: u32) -> Self {
        self.max_pdu_length = value;
        self
    }

    /// Override strict mode:
    /// whether receiving PDUs must not
    /// surpass the configured maximum PDU length.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Spawn a provider with no transport,
    /// for requesting associations towards other nodes.
    ///
    /// The TCP connection is opened when an
    /// [`AssociateRq`](UserPrimitive::AssociateRq) primitive is processed.
    pub fn spawn_client(self) -> Result<DulProvider> {
        self.spawn(None, None, VecDeque::new(), None)
    }

    /// Spawn a provider listening for one incoming association
    /// on the given address.
    ///
    /// Binding a wildcard address (such as `0.0.0.0:104`) is supported;
    /// the provider accepts the first connection that arrives.
    pub fn spawn_listener<A: ToSocketAddrs>(self, address: A) -> Result<DulProvider> {
        let listener = TcpListener::bind(address).context(BindSnafu)?;
        listener.set_nonblocking(true).context(ConfigureSnafu)?;
        let local_addr = listener.local_addr().ok();
        self.spawn(Some(listener), None, VecDeque::new(), local_addr)
    }

    /// Spawn a provider over an already accepted TCP connection.
    pub fn spawn_on(self, stream: TcpStream) -> Result<DulProvider> {
        let mut events = VecDeque::new();
        events.push_back(Event::TransportIndication);
        self.spawn(None, Some(stream), events, None)
    }

    fn spawn(
        self,
        listener: Option<TcpListener>,
        socket: Option<TcpStream>,
        events: VecDeque<Event>,
        local_addr: Option<SocketAddr>,
    ) -> Result<DulProvider> {
        let (from_user_tx, from_user_rx) = mpsc::channel();
        let (to_user_tx, to_user_rx) = mpsc::channel();
        let kill = Arc::new(AtomicBool::new(false));
        let state = Arc::new(AtomicU8::new(State::Sta1 as u8));

        let provider_loop = ProviderLoop {
            machine: StateMachine::new(),
            artim: ArtimTimer::new(self.artim_timeout),
            listener,
            socket,
            events,
            from_user: from_user_rx,
            to_user: to_user_tx,
            kill: Arc::clone(&kill),
            state: Arc::clone(&state),
            max_pdu_length: self.max_pdu_length,
            strict: self.strict,
        };

        let handle = std::thread::Builder::new()
            .name("dul-provider".to_string())
            .spawn(move || provider_loop.run())
            .context(SpawnSnafu)?;

        Ok(DulProvider {
            from_user: from_user_tx,
            to_user: Mutex::new(to_user_rx),
            kill,
            state,
            local_addr,
            handle: Some(handle),
        })
    }
}

/// A handle to a running DUL service provider.
///
/// Dropping the handle kills the loop and joins its thread.
pub struct DulProvider {
    from_user: Sender<UserPrimitive>,
    to_user: Mutex<Receiver<Indication>>,
    kill: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    local_addr: Option<SocketAddr>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for DulProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DulProvider")
            .field("state", &self.state())
            .finish()
    }
}

impl DulProvider {
    /// Enqueue a service primitive for the provider loop.
    pub fn send(&self, primitive: UserPrimitive) -> Result<()> {
        self.from_user
            .send(primitive)
            .ok()
            .context(ProviderDownSnafu)
    }

    /// Take the next indication without blocking.
    pub fn try_receive(&self) -> Option<Indication> {
        self.to_user.lock().ok()?.try_recv().ok()
    }

    /// Wait for the next indication,
    /// returning `None` when the provider has terminated.
    pub fn receive(&self) -> Option<Indication> {
        self.to_user.lock().ok()?.recv().ok()
    }

    /// Wait for the next indication up to the given timeout.
    pub fn receive_timeout(&self, timeout: Duration) -> Option<Indication> {
        self.to_user.lock().ok()?.recv_timeout(timeout).ok()
    }

    /// The address the provider is listening on, when spawned as a listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// The current state of the state machine.
    pub fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::Relaxed)).unwrap_or(State::Sta1)
    }

    /// Terminate the loop at its next tick,
    /// closing the transport without flushing any queue.
    pub fn kill(&self) {
        self.kill.store(true, Ordering::Relaxed);
    }

    /// Terminate the loop only if the association is idle.
    ///
    /// Returns whether the stop request was honored.
    pub fn stop(&self) -> bool {
        if self.state() == State::Sta1 {
            self.kill();
            true
        } else {
            false
        }
    }
}

impl Drop for DulProvider {
    fn drop(&mut self) {
        self.kill();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// The provider loop: owns the socket, the state machine, the timer
/// and both ends of the event plumbing.
struct ProviderLoop {
    machine: StateMachine,
    artim: ArtimTimer,
    listener: Option<TcpListener>,
    socket: Option<TcpStream>,
    events: VecDeque<Event>,
    from_user: Receiver<UserPrimitive>,
    to_user: Sender<Indication>,
    kill: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    max_pdu_length: u32,
    strict: bool,
}

impl ProviderLoop {
    fn run(mut self) {
        debug!("DUL provider loop started");
        while !self.kill.load(Ordering::Relaxed) {
            let busy = self.check_network() || self.check_primitive() || self.check_timer();

            if let Some(event) = self.events.pop_front() {
                self.apply(event);
            } else if !busy {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        if let Some(socket) = self.socket.take() {
            let _ = socket.shutdown(Shutdown::Both);
        }
        debug!("DUL provider loop ended");
    }

    /// Dispatch one event and carry out the effects of the transition.
    fn apply(&mut self, event: Event) {
        let Transition {
            action,
            next,
            outgoing,
            indication,
            timer,
            transport,
        } = self.machine.dispatch(event);
        trace!("applying action {:?}", action);

        match timer {
            TimerOp::Start => self.artim.start(),
            TimerOp::Stop => self.artim.stop(),
            TimerOp::Keep => {}
        }

        if let TransportOp::Connect(peer) = transport {
            match TcpStream::connect(peer) {
                Ok(stream) => {
                    self.socket = Some(stream);
                    self.events.push_back(Event::TransportConnected);
                }
                Err(e) => {
                    debug!("could not connect to {}: {}", peer, e);
                    self.events.push_back(Event::TransportClosed);
                }
            }
        }

        if let Some(pdu) = outgoing {
            if let Some(socket) = self.socket.as_mut() {
                trace!("sending {}", pdu.short_description());
                // the read probe may have left the socket in non-blocking mode
                if socket.set_nonblocking(false).is_err() {
                    self.drop_transport();
                } else if let Err(e) = write_pdu(socket, &pdu) {
                    warn!("could not send {}: {}", pdu.short_description(), e);
                    self.drop_transport();
                }
            }
        }

        if transport == TransportOp::Close {
            if let Some(socket) = self.socket.take() {
                let _ = socket.shutdown(Shutdown::Both);
            }
        }

        if let Some(indication) = indication {
            // the consumer may be gone; the machine does not care
            let _ = self.to_user.send(indication);
        }

        self.state.store(next as u8, Ordering::Relaxed);
    }

    /// Poll the network plane:
    /// pending incoming connections, then one PDU from the active socket.
    /// While awaiting transport close, incoming bytes are drained instead.
    fn check_network(&mut self) -> bool {
        if self.machine.state() == State::Sta13 {
            return self.drain_until_closed();
        }

        if self.socket.is_none() {
            if let Some(listener) = &self.listener {
                match listener.accept() {
                    Ok((stream, address)) => {
                        debug!("incoming connection from {}", address);
                        self.socket = Some(stream);
                        self.events.push_back(Event::TransportIndication);
                        return true;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(e) => warn!("could not accept connection: {}", e),
                }
            }
            return false;
        }

        self.read_one_pdu()
    }

    /// Read and discard incoming bytes until the peer closes the connection.
    fn drain_until_closed(&mut self) -> bool {
        let Some(socket) = self.socket.as_mut() else {
            return false;
        };
        if socket.set_nonblocking(true).is_err() {
            self.drop_transport();
            return true;
        }
        let mut sink = [0u8; 1024];
        loop {
            match socket.read(&mut sink) {
                Ok(0) => {
                    self.drop_transport();
                    return true;
                }
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return false,
                Err(_) => {
                    self.drop_transport();
                    return true;
                }
            }
        }
    }

    /// Check the active socket for one PDU.
    ///
    /// The first byte is probed without blocking;
    /// once it has been read, the remaining header and the declared
    /// payload are read in blocking mode,
    /// since the peer is committed to sending that many bytes.
    fn read_one_pdu(&mut self) -> bool {
        let Some(socket) = self.socket.as_mut() else {
            return false;
        };

        if socket.set_nonblocking(true).is_err() {
            self.drop_transport();
            return true;
        }
        let mut first = [0u8; 1];
        match socket.read(&mut first) {
            Ok(0) => {
                self.drop_transport();
                return true;
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return false,
            Err(e) => {
                debug!("socket read failed: {}", e);
                self.drop_transport();
                return true;
            }
        }

        if socket.set_nonblocking(false).is_err() {
            self.drop_transport();
            return true;
        }

        let mut header = [0u8; PDU_HEADER_SIZE as usize];
        header[0] = first[0];
        if socket.read_exact(&mut header[1..]).is_err() {
            self.drop_transport();
            return true;
        }
        let pdu_length = u32::from_be_bytes([header[2], header[3], header[4], header[5]]);
        if pdu_length > MAXIMUM_PDU_SIZE {
            debug!("announced PDU length {} is beyond the maximum", pdu_length);
            self.events.push_back(Event::InvalidPdu);
            return true;
        }

        let mut buffer = BytesMut::with_capacity(PDU_HEADER_SIZE as usize + pdu_length as usize);
        buffer.extend_from_slice(&header);
        buffer.resize(PDU_HEADER_SIZE as usize + pdu_length as usize, 0);
        if socket.read_exact(&mut buffer[PDU_HEADER_SIZE as usize..]).is_err() {
            self.drop_transport();
            return true;
        }

        match read_pdu(&mut &buffer[..], self.max_pdu_length, self.strict) {
            Ok(Some(pdu)) => {
                trace!("received {}", pdu.short_description());
                self.events.push_back(pdu_event(pdu));
            }
            Ok(None) => {
                self.drop_transport();
            }
            Err(e) => {
                debug!("could not read PDU: {}", e);
                self.events.push_back(Event::InvalidPdu);
            }
        }
        true
    }

    /// Poll the user primitive queue for one primitive.
    fn check_primitive(&mut self) -> bool {
        match self.from_user.try_recv() {
            Ok(primitive) => {
                self.events.push_back(primitive_event(primitive));
                true
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => false,
        }
    }

    /// Poll the ARTIM timer.
    fn check_timer(&mut self) -> bool {
        if self.artim.take_expired() {
            debug!("ARTIM timer expired");
            self.events.push_back(Event::ArtimExpired);
            true
        } else {
            false
        }
    }

    /// Close the socket and raise the transport closed event.
    fn drop_transport(&mut self) {
        if let Some(socket) = self.socket.take() {
            let _ = socket.shutdown(Shutdown::Both);
        }
        self.events.push_back(Event::TransportClosed);
    }
}

/// Classify a received PDU into the corresponding state machine event.
fn pdu_event(pdu: Pdu) -> Event {
    match pdu {
        Pdu::AssociationRQ(rq) => Event::AAssociateRqPdu(rq),
        Pdu::AssociationAC(ac) => Event::AAssociateAcPdu(ac),
        Pdu::AssociationRJ(rj) => Event::AAssociateRjPdu(rj),
        Pdu::PData { data } => Event::PDataTfPdu(data),
        Pdu::ReleaseRQ => Event::AReleaseRqPdu,
        Pdu::ReleaseRP => Event::AReleaseRpPdu,
        Pdu::AbortRQ { source } => Event::AAbortPdu(source),
        Pdu::Unknown { pdu_type, .. } => {
            warn!("unrecognized PDU type {:#04X}", pdu_type);
            Event::InvalidPdu
        }
    }
}

/// Classify a user primitive into the corresponding state machine event.
fn primitive_event(primitive: UserPrimitive) -> Event {
    match primitive {
        UserPrimitive::AssociateRq { peer, request } => Event::AAssociateRq { peer, request },
        UserPrimitive::AssociateAc(ac) => Event::AAssociateAc(ac),
        UserPrimitive::AssociateRj(rj) => Event::AAssociateRj(rj),
        UserPrimitive::PData(data) => Event::PDataRq(data),
        UserPrimitive::ReleaseRq => Event::AReleaseRq,
        UserPrimitive::ReleaseRp => Event::AReleaseRp,
        UserPrimitive::AbortRq(source) => Event::AAbortRq(source),
    }
}
