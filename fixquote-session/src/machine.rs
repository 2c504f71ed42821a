/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Session state machine.
//!
//! [`SessionStateMachine`] performs no I/O and reads no clock of its own.
//! The driver feeds it transport milestones, reassembled frames and timer
//! ticks together with the current [`Instant`]; the machine answers with
//! [`SessionEvent`]s and queues encoded frames in an outbox the driver drains
//! with [`SessionStateMachine::take_outbound`] and writes in order.
//!
//! One machine serves one connection. Once it reaches
//! [`Phase::Disconnected`] it stays there; a new connection needs a new
//! machine, and with it a fresh outbound sequence.

use crate::config::{MAX_HEARTBEAT_INTERVAL, SessionConfig, ViolationPolicy};
use crate::event::{DisconnectReason, RejectNotice, SessionEvent};
use crate::heartbeat::{HeartbeatEcho, HeartbeatManager, generate_test_req_id};
use crate::sequence::{InboundSequence, SequenceResult};
use crate::state::SessionState;
use bytes::Bytes;
use fixquote_core::error::{EncodeError, ProtocolViolation, SessionError};
use fixquote_core::field::{Field, tags};
use fixquote_core::message::{MsgType, WireMessage, render_frame};
use fixquote_core::types::{Phase, SeqNum};
use fixquote_tagvalue::{MessageEncoder, decode_bytes, validate};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// EncryptMethod (tag 98) value for "none".
const ENCRYPT_METHOD_NONE: &str = "0";

/// Sans-IO session state machine.
#[derive(Debug)]
pub struct SessionStateMachine {
    config: SessionConfig,
    encoder: MessageEncoder,
    state: SessionState,
    outbox: VecDeque<Bytes>,
    started: bool,
    termination: Option<DisconnectReason>,
}

impl SessionStateMachine {
    /// Creates a machine in [`Phase::Disconnected`].
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        let encoder = MessageEncoder::new(
            config.begin_string.clone(),
            config.sender_comp_id.clone(),
            config.target_comp_id.clone(),
        );
        let heartbeat = HeartbeatManager::new(
            config.heartbeat_interval,
            config.test_request_grace,
            Instant::now(),
        );
        let inbound = if config.reset_seq_num_on_logon {
            InboundSequence::new()
        } else {
            InboundSequence::unanchored()
        };
        Self {
            config,
            encoder,
            state: SessionState::new(heartbeat, inbound),
            outbox: VecDeque::new(),
            started: false,
            termination: None,
        }
    }

    /// Returns the current phase.
    #[inline]
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// Returns the session state.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns why the session ended, once it has.
    #[must_use]
    pub const fn termination(&self) -> Option<&DisconnectReason> {
        self.termination.as_ref()
    }

    /// Returns true once the session has reached `Disconnected` after use.
    #[must_use]
    pub const fn is_terminated(&self) -> bool {
        self.termination.is_some()
    }

    /// Drains the frames queued for transmission, oldest first.
    pub fn take_outbound(&mut self) -> Vec<Bytes> {
        self.outbox.drain(..).collect()
    }

    /// Returns true if frames are waiting for transmission.
    #[must_use]
    pub fn has_outbound(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Starts a connection attempt.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidPhase` unless this is the first call on a
    /// disconnected machine.
    pub fn begin_connect(&mut self) -> Result<Vec<SessionEvent>, SessionError> {
        if self.started {
            return Err(self.invalid("connect"));
        }
        let mut events = Vec::new();
        if !self.set_phase(Phase::Connecting, &mut events) {
            return Err(self.invalid("connect"));
        }
        self.started = true;
        Ok(events)
    }

    /// Reports that the transport is up and sends Logon.
    ///
    /// # Arguments
    /// * `token` - Bearer token, sent as Password (tag 554)
    /// * `now` - The current time
    ///
    /// # Errors
    /// Returns `SessionError::InvalidPhase` outside `Connecting`, or
    /// `SessionError::Encode` if the username or token cannot be encoded.
    pub fn on_connected(
        &mut self,
        token: &str,
        now: Instant,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        if self.phase() != Phase::Connecting {
            return Err(self.invalid("logon"));
        }

        let mut body = Vec::with_capacity(5);
        body.push(Field::new(tags::ENCRYPT_METHOD, ENCRYPT_METHOD_NONE));
        body.push(Field::display(
            tags::HEART_BT_INT,
            self.config.heartbeat_interval_secs(),
        ));
        if self.config.reset_seq_num_on_logon {
            body.push(Field::flag(tags::RESET_SEQ_NUM_FLAG, true));
        }
        body.push(Field::new(tags::USERNAME, self.config.username.as_str()));
        body.push(Field::new(tags::PASSWORD, token));

        self.state.heartbeat_mut().reset(now);
        let seq = self.send(&MsgType::Logon, &body, now)?;
        info!(
            seq = %seq,
            username = %self.config.username,
            heartbeat_secs = self.config.heartbeat_interval_secs(),
            "logon sent"
        );

        let mut events = Vec::new();
        self.set_phase(Phase::AwaitingLogonAck, &mut events);
        Ok(events)
    }

    /// Dispatches one reassembled frame.
    ///
    /// Malformed frames are logged and dropped, except during the Logon
    /// handshake, where they end the session with a logon failure.
    pub fn on_frame(&mut self, frame: Bytes, now: Instant) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let phase = self.phase();
        if matches!(phase, Phase::Disconnected | Phase::Connecting) {
            debug!(%phase, "dropping frame received outside a live session");
            return events;
        }

        let msg = match decode_bytes(frame.clone()) {
            Ok(msg) => msg,
            Err(err) => {
                if phase == Phase::AwaitingLogonAck {
                    self.terminate(
                        DisconnectReason::LogonFailed(format!("malformed frame: {err}")),
                        &mut events,
                    );
                } else {
                    warn!(error = %err, frame = %render_frame(&frame), "dropping malformed frame");
                }
                return events;
            }
        };
        trace!(frame = %msg, "received");

        self.state.heartbeat_mut().on_message_received(now);
        self.track_inbound(&msg);

        if self.config.validate_inbound {
            let discrepancies = validate(&msg);
            if !discrepancies.is_empty() {
                let violation = ProtocolViolation::InvalidFrame {
                    msg_seq_num: msg.seq_num().map(SeqNum::value),
                    discrepancies,
                };
                if phase == Phase::AwaitingLogonAck {
                    self.terminate(
                        DisconnectReason::LogonFailed(violation.to_string()),
                        &mut events,
                    );
                    return events;
                }
                if self.raise_violation(violation, &mut events) {
                    return events;
                }
            }
        }

        match phase {
            Phase::AwaitingLogonAck => self.on_handshake_message(msg, now, &mut events),
            Phase::LoggedIn | Phase::LoggingOut => self.on_live_message(msg, now, &mut events),
            Phase::Disconnected | Phase::Connecting => {}
        }
        events
    }

    /// Runs the liveness checks.
    ///
    /// Call at [`SessionConfig::tick_period`]; outside `LoggedIn` this does
    /// nothing, so a tick racing a phase change is harmless.
    pub fn on_heartbeat_tick(&mut self, now: Instant) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.phase() != Phase::LoggedIn {
            return events;
        }

        if let Some((id, elapsed)) = self.state.heartbeat().unanswered_test_request(now) {
            let violation = ProtocolViolation::UnansweredTestRequest {
                test_req_id: id.to_string(),
                elapsed_ms: duration_ms(elapsed),
            };
            self.state.heartbeat_mut().clear_test_request();
            if self.raise_violation(violation, &mut events) {
                return events;
            }
        }

        if self.state.heartbeat().should_send_test_request(now) {
            let id = generate_test_req_id(self.state.next_outbound_seq());
            if self.send_admin(
                &MsgType::TestRequest,
                &[Field::new(tags::TEST_REQ_ID, id.as_str())],
                now,
            ) {
                debug!(test_req_id = %id, "inbound silence, test request sent");
                self.state.heartbeat_mut().on_test_request_sent(id, now);
            }
        } else if self.state.heartbeat().should_send_heartbeat(now) {
            self.send_admin(&MsgType::Heartbeat, &[], now);
        }
        events
    }

    /// Sends an application message.
    ///
    /// # Returns
    /// The MsgSeqNum the message was sent with.
    ///
    /// # Errors
    /// Returns `SessionError::NotLoggedIn` outside `LoggedIn` (nothing is
    /// sent and no number is used), or `SessionError::Encode` if the body
    /// cannot be encoded.
    pub fn send_application(
        &mut self,
        msg_type: &MsgType,
        body: &[Field],
        now: Instant,
    ) -> Result<SeqNum, SessionError> {
        let phase = self.phase();
        if phase != Phase::LoggedIn {
            return Err(SessionError::NotLoggedIn { phase });
        }
        let seq = self.send(msg_type, body, now)?;
        debug!(%msg_type, seq = %seq, "application message sent");
        Ok(seq)
    }

    /// Starts a local logout.
    ///
    /// From `LoggedIn` this sends Logout and waits in `LoggingOut` for the
    /// counterparty's Logout or [`Self::on_grace_expired`]. Before the
    /// handshake completes the session ends immediately. A second call while
    /// `LoggingOut` does nothing.
    ///
    /// # Arguments
    /// * `text` - Optional Text (tag 58) for the Logout
    /// * `now` - The current time
    ///
    /// # Errors
    /// Returns `SessionError::InvalidPhase` once disconnected, or
    /// `SessionError::Encode` if `text` cannot be encoded.
    pub fn initiate_logout(
        &mut self,
        text: Option<&str>,
        now: Instant,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        let mut events = Vec::new();
        match self.phase() {
            Phase::LoggedIn => {
                let body: Vec<Field> = text
                    .map(|t| Field::new(tags::TEXT, t))
                    .into_iter()
                    .collect();
                let seq = self.send(&MsgType::Logout, &body, now)?;
                info!(seq = %seq, "logout sent");
                self.set_phase(Phase::LoggingOut, &mut events);
            }
            Phase::Connecting | Phase::AwaitingLogonAck => {
                self.terminate(DisconnectReason::Aborted, &mut events);
            }
            Phase::LoggingOut => {}
            Phase::Disconnected => return Err(self.invalid("logout")),
        }
        Ok(events)
    }

    /// Reports that the logout grace period elapsed.
    pub fn on_grace_expired(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.phase() == Phase::LoggingOut {
            self.terminate(DisconnectReason::LogoutGraceExpired, &mut events);
        }
        events
    }

    /// Reports that the Logon acknowledgement did not arrive in time.
    pub fn on_logon_timeout(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.phase() == Phase::AwaitingLogonAck {
            self.terminate(DisconnectReason::LogonTimeout, &mut events);
        }
        events
    }

    /// Reports that the transport reached end of stream.
    ///
    /// While `LoggingOut` this completes the logout we asked for.
    pub fn on_transport_closed(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let reason = if self.phase() == Phase::LoggingOut {
            DisconnectReason::LogoutCompleted
        } else {
            DisconnectReason::TransportClosed
        };
        self.terminate(reason, &mut events);
        events
    }

    /// Reports a transport failure.
    pub fn on_transport_error(&mut self, reason: impl Into<String>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        self.terminate(DisconnectReason::TransportError(reason.into()), &mut events);
        events
    }

    fn on_handshake_message(
        &mut self,
        msg: WireMessage,
        now: Instant,
        events: &mut Vec<SessionEvent>,
    ) {
        match msg.msg_type() {
            MsgType::Logon => {
                let interval = match msg.get_as::<u64>(tags::HEART_BT_INT) {
                    Ok(secs) if secs > 0 && secs <= MAX_HEARTBEAT_INTERVAL.as_secs() => {
                        Duration::from_secs(secs)
                    }
                    Ok(secs) => {
                        warn!(
                            heart_bt_int = secs,
                            "ignoring out-of-range heartbeat interval from counterparty"
                        );
                        self.config.heartbeat_interval
                    }
                    Err(_) => self.config.heartbeat_interval,
                };
                let heartbeat = self.state.heartbeat_mut();
                heartbeat.set_interval(interval);
                heartbeat.reset(now);
                self.set_phase(Phase::LoggedIn, events);
                info!(heartbeat_secs = interval.as_secs(), "logon acknowledged");
                events.push(SessionEvent::LoggedOn {
                    heartbeat_interval: interval,
                });
            }
            MsgType::Logout => {
                let reason = msg
                    .get(tags::TEXT)
                    .unwrap_or("counterparty answered logon with logout")
                    .to_string();
                self.terminate(DisconnectReason::LogonFailed(reason), events);
            }
            MsgType::Reject => self.on_reject(&msg, events),
            other => debug!(msg_type = %other, "ignoring message before logon acknowledgement"),
        }
    }

    fn on_live_message(&mut self, msg: WireMessage, now: Instant, events: &mut Vec<SessionEvent>) {
        match msg.msg_type() {
            MsgType::Heartbeat => {
                let id = msg.get(tags::TEST_REQ_ID);
                match self.state.heartbeat_mut().on_heartbeat(id) {
                    HeartbeatEcho::Plain => {}
                    HeartbeatEcho::Matched => debug!("test request answered"),
                    HeartbeatEcho::Unexpected => {
                        let violation = ProtocolViolation::UnexpectedTestReqId {
                            test_req_id: id.unwrap_or_default().to_string(),
                        };
                        warn!(%violation, "protocol violation");
                        events.push(SessionEvent::Violation(violation));
                    }
                }
            }
            MsgType::TestRequest => {
                let body: Vec<Field> = match msg.get(tags::TEST_REQ_ID) {
                    Some(id) => vec![Field::new(tags::TEST_REQ_ID, id)],
                    None => {
                        warn!("test request without TestReqID, answering with a plain heartbeat");
                        Vec::new()
                    }
                };
                self.send_admin(&MsgType::Heartbeat, &body, now);
            }
            MsgType::Reject => self.on_reject(&msg, events),
            MsgType::Logout => {
                let text = msg.get(tags::TEXT).map(str::to_string);
                if self.phase() == Phase::LoggingOut {
                    self.terminate(DisconnectReason::LogoutCompleted, events);
                } else {
                    self.send_admin(&MsgType::Logout, &[], now);
                    self.terminate(DisconnectReason::RemoteLogout { text }, events);
                }
            }
            MsgType::Logon => warn!("ignoring logon received on an established session"),
            MsgType::ResendRequest | MsgType::SequenceReset => {
                warn!(msg_type = %msg.msg_type(), "sequence recovery is not supported, ignoring");
            }
            _ => events.push(SessionEvent::Application(msg)),
        }
    }

    fn on_reject(&mut self, msg: &WireMessage, events: &mut Vec<SessionEvent>) {
        let notice = RejectNotice::from_message(msg);
        warn!(%notice, "session reject received");
        events.push(SessionEvent::RejectReceived(notice));
    }

    fn track_inbound(&mut self, msg: &WireMessage) {
        let Some(seq) = msg.seq_num() else {
            warn!(msg_type = %msg.msg_type(), "inbound message without MsgSeqNum");
            return;
        };
        match self.state.inbound_mut().observe(seq.value()) {
            SequenceResult::Ok => {}
            SequenceResult::Gap { expected, received } => {
                warn!(expected, received, "inbound sequence gap");
            }
            SequenceResult::TooLow { expected, received } => {
                warn!(expected, received, "inbound sequence number lower than expected");
            }
        }
    }

    /// Reports a violation and applies the policy.
    ///
    /// # Returns
    /// `true` if the session was terminated.
    fn raise_violation(
        &mut self,
        violation: ProtocolViolation,
        events: &mut Vec<SessionEvent>,
    ) -> bool {
        warn!(%violation, "protocol violation");
        events.push(SessionEvent::Violation(violation.clone()));
        match self.config.violation_policy {
            ViolationPolicy::Log => false,
            ViolationPolicy::Disconnect => {
                self.terminate(DisconnectReason::Violation(violation), events);
                true
            }
        }
    }

    /// Encodes a frame with the next sequence number and queues it.
    fn send(
        &mut self,
        msg_type: &MsgType,
        body: &[Field],
        now: Instant,
    ) -> Result<SeqNum, EncodeError> {
        let frame = self
            .encoder
            .encode(msg_type, body, self.state.next_outbound_seq())?;
        let seq = self.state.outbound_mut().advance();
        self.state.heartbeat_mut().on_message_sent(now);
        trace!(frame = %render_frame(&frame), "queued");
        self.outbox.push_back(frame);
        Ok(seq)
    }

    /// Sends a session-level frame; failures are logged.
    fn send_admin(&mut self, msg_type: &MsgType, body: &[Field], now: Instant) -> bool {
        match self.send(msg_type, body, now) {
            Ok(_) => true,
            Err(err) => {
                error!(%msg_type, error = %err, "failed to encode session message");
                false
            }
        }
    }

    fn set_phase(&mut self, to: Phase, events: &mut Vec<SessionEvent>) -> bool {
        match self.state.transition(to) {
            Some(from) => {
                info!(%from, %to, "session phase changed");
                events.push(SessionEvent::PhaseChanged { from, to });
                true
            }
            None => false,
        }
    }

    fn terminate(&mut self, reason: DisconnectReason, events: &mut Vec<SessionEvent>) {
        if !self.set_phase(Phase::Disconnected, events) {
            return;
        }
        self.state.heartbeat_mut().clear_test_request();
        if reason.is_graceful() {
            info!(%reason, "session ended");
        } else {
            warn!(%reason, "session ended");
        }
        self.termination = Some(reason.clone());
        events.push(SessionEvent::Terminated(reason));
    }

    fn invalid(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidPhase {
            operation,
            phase: self.phase(),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfigBuilder;
    use fixquote_core::types::CompId;
    use fixquote_tagvalue::{calculate_checksum, decode, format_checksum};
    use proptest::prelude::*;

    const TOKEN: &str = "tok";

    fn config() -> SessionConfig {
        SessionConfigBuilder::new()
            .sender_comp_id("C1")
            .target_comp_id("STS")
            .build()
            .unwrap()
    }

    /// Builds frames the way the counterparty would.
    struct Counterparty {
        encoder: MessageEncoder,
        seq: u64,
    }

    impl Counterparty {
        fn new() -> Self {
            Self {
                encoder: MessageEncoder::new(
                    "FIX.4.4",
                    CompId::new("STS").unwrap(),
                    CompId::new("C1").unwrap(),
                ),
                seq: 0,
            }
        }

        fn frame(&mut self, msg_type: MsgType, body: &[Field]) -> Bytes {
            self.seq += 1;
            self.encoder
                .encode(&msg_type, body, SeqNum::new(self.seq))
                .unwrap()
        }
    }

    fn connected(config: SessionConfig, now: Instant) -> SessionStateMachine {
        let mut machine = SessionStateMachine::new(config);
        machine.begin_connect().unwrap();
        machine.on_connected(TOKEN, now).unwrap();
        machine
    }

    fn logged_in(now: Instant) -> (SessionStateMachine, Counterparty) {
        let mut machine = connected(config(), now);
        let mut cp = Counterparty::new();
        machine.on_frame(cp.frame(MsgType::Logon, &[Field::new(108, "30")]), now);
        assert_eq!(machine.phase(), Phase::LoggedIn);
        machine.take_outbound();
        (machine, cp)
    }

    fn decoded(frames: Vec<Bytes>) -> Vec<WireMessage> {
        frames.iter().map(|f| decode(f).unwrap()).collect()
    }

    fn corrupt_checksum(frame: &Bytes) -> Bytes {
        let split = frame.len() - 3;
        let declared = calculate_checksum(&frame[..split - 3]).wrapping_add(1);
        let mut out = frame[..split].to_vec();
        out.extend_from_slice(&format_checksum(declared));
        Bytes::from(out)
    }

    fn terminated(events: &[SessionEvent]) -> Option<&DisconnectReason> {
        events.iter().find_map(|e| match e {
            SessionEvent::Terminated(reason) => Some(reason),
            _ => None,
        })
    }

    #[test]
    fn test_logon_sent_on_connect() {
        let now = Instant::now();
        let mut machine = SessionStateMachine::new(config());
        assert_eq!(machine.phase(), Phase::Disconnected);

        let events = machine.begin_connect().unwrap();
        assert!(matches!(
            events.as_slice(),
            [SessionEvent::PhaseChanged {
                from: Phase::Disconnected,
                to: Phase::Connecting
            }]
        ));

        machine.on_connected(TOKEN, now).unwrap();
        assert_eq!(machine.phase(), Phase::AwaitingLogonAck);
        assert_eq!(machine.state().next_outbound_seq(), SeqNum::new(2));

        let out = decoded(machine.take_outbound());
        assert_eq!(out.len(), 1);
        let logon = &out[0];
        assert_eq!(*logon.msg_type(), MsgType::Logon);
        assert_eq!(logon.get(34), Some("1"));
        assert_eq!(logon.get(49), Some("C1"));
        assert_eq!(logon.get(56), Some("STS"));
        assert_eq!(logon.get(98), Some("0"));
        assert_eq!(logon.get(108), Some("30"));
        assert_eq!(logon.get(141), Some("Y"));
        assert_eq!(logon.get(553), Some("C1"));
        assert_eq!(logon.get(554), Some(TOKEN));
        assert!(!logon.to_string().contains(TOKEN));
    }

    #[test]
    fn test_logon_without_reset_flag() {
        let mut config = config();
        config.reset_seq_num_on_logon = false;
        let mut machine = connected(config, Instant::now());
        let out = decoded(machine.take_outbound());
        assert!(!out[0].contains(141));
    }

    #[test]
    fn test_logon_ack_moves_to_logged_in() {
        let now = Instant::now();
        let mut machine = connected(config(), now);
        let mut cp = Counterparty::new();

        let events = machine.on_frame(cp.frame(MsgType::Logon, &[Field::new(108, "30")]), now);
        assert_eq!(machine.phase(), Phase::LoggedIn);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::PhaseChanged {
                from: Phase::AwaitingLogonAck,
                to: Phase::LoggedIn
            }
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::LoggedOn { heartbeat_interval } if *heartbeat_interval == Duration::from_secs(30)
        )));
    }

    #[test]
    fn test_logon_ack_negotiates_interval() {
        let now = Instant::now();
        let mut machine = connected(config(), now);
        let mut cp = Counterparty::new();
        machine.on_frame(cp.frame(MsgType::Logon, &[Field::new(108, "10")]), now);
        assert_eq!(machine.state().heartbeat_interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_logon_ack_out_of_range_interval_keeps_configured() {
        let now = Instant::now();
        let mut machine = connected(config(), now);
        let mut cp = Counterparty::new();
        let events = machine.on_frame(
            cp.frame(MsgType::Logon, &[Field::new(108, "18446744073709551615")]),
            now,
        );
        assert_eq!(machine.phase(), Phase::LoggedIn);
        assert_eq!(machine.state().heartbeat_interval(), Duration::from_secs(30));
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::LoggedOn { heartbeat_interval } if *heartbeat_interval == Duration::from_secs(30)
        )));

        assert!(machine.on_heartbeat_tick(now + Duration::from_secs(1)).is_empty());
        assert_eq!(machine.phase(), Phase::LoggedIn);
    }

    #[test]
    fn test_logon_ack_accepts_maximum_interval() {
        let now = Instant::now();
        let mut machine = connected(config(), now);
        let mut cp = Counterparty::new();
        let secs = MAX_HEARTBEAT_INTERVAL.as_secs().to_string();
        machine.on_frame(cp.frame(MsgType::Logon, &[Field::new(108, secs.as_str())]), now);
        assert_eq!(machine.state().heartbeat_interval(), MAX_HEARTBEAT_INTERVAL);
        machine.on_heartbeat_tick(now + Duration::from_secs(1));
        assert!(!machine.has_outbound());
    }

    #[test]
    fn test_test_request_is_echoed() {
        let now = Instant::now();
        let (mut machine, mut cp) = logged_in(now);

        let events = machine.on_frame(cp.frame(MsgType::TestRequest, &[Field::new(112, "XYZ")]), now);
        assert!(events.is_empty());
        assert_eq!(machine.phase(), Phase::LoggedIn);

        let out = decoded(machine.take_outbound());
        assert_eq!(out.len(), 1);
        assert_eq!(*out[0].msg_type(), MsgType::Heartbeat);
        assert_eq!(out[0].get(112), Some("XYZ"));
        assert_eq!(out[0].get(34), Some("2"));
    }

    #[test]
    fn test_heartbeat_is_noop() {
        let now = Instant::now();
        let (mut machine, mut cp) = logged_in(now);
        let events = machine.on_frame(cp.frame(MsgType::Heartbeat, &[]), now);
        assert!(events.is_empty());
        assert!(!machine.has_outbound());
        assert_eq!(machine.state().last_inbound_seq(), Some(SeqNum::new(2)));
    }

    #[test]
    fn test_heartbeat_sent_after_idle_interval() {
        let start = Instant::now();
        let (mut machine, mut cp) = logged_in(start);

        machine.on_heartbeat_tick(start + Duration::from_secs(29));
        assert!(!machine.has_outbound());

        // Keep inbound traffic flowing so no TestRequest is due.
        machine.on_frame(cp.frame(MsgType::Heartbeat, &[]), start + Duration::from_secs(25));
        machine.on_heartbeat_tick(start + Duration::from_secs(30));
        let out = decoded(machine.take_outbound());
        assert_eq!(out.len(), 1);
        assert_eq!(*out[0].msg_type(), MsgType::Heartbeat);
        assert!(!out[0].contains(112));

        machine.on_heartbeat_tick(start + Duration::from_secs(31));
        assert!(!machine.has_outbound());
    }

    #[test]
    fn test_application_traffic_defers_heartbeat() {
        let start = Instant::now();
        let (mut machine, _cp) = logged_in(start);

        machine
            .send_application(&MsgType::QuoteRequest, &[Field::new(131, "q1")], start + Duration::from_secs(20))
            .unwrap();
        machine.take_outbound();
        machine.on_heartbeat_tick(start + Duration::from_secs(30));
        assert!(!machine.has_outbound());
    }

    #[test]
    fn test_test_request_probe_and_echo() {
        let start = Instant::now();
        let (mut machine, mut cp) = logged_in(start);

        machine.on_heartbeat_tick(start + Duration::from_secs(31));
        let out = decoded(machine.take_outbound());
        assert_eq!(out.len(), 1);
        assert_eq!(*out[0].msg_type(), MsgType::TestRequest);
        let id = out[0].get(112).unwrap().to_string();
        assert_eq!(machine.state().heartbeat().pending_test_request(), Some(id.as_str()));

        let events = machine.on_frame(
            cp.frame(MsgType::Heartbeat, &[Field::new(112, id.as_str())]),
            start + Duration::from_secs(32),
        );
        assert!(events.is_empty());
        assert!(machine.state().heartbeat().pending_test_request().is_none());
    }

    #[test]
    fn test_unanswered_test_request_logged() {
        let start = Instant::now();
        let (mut machine, _cp) = logged_in(start);

        machine.on_heartbeat_tick(start + Duration::from_secs(31));
        machine.take_outbound();

        let events = machine.on_heartbeat_tick(start + Duration::from_secs(61));
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Violation(ProtocolViolation::UnansweredTestRequest { .. })
        )));
        assert_eq!(machine.phase(), Phase::LoggedIn);
    }

    #[test]
    fn test_unanswered_test_request_disconnects() {
        let start = Instant::now();
        let mut config = config();
        config.violation_policy = ViolationPolicy::Disconnect;
        let mut machine = connected(config, start);
        let mut cp = Counterparty::new();
        machine.on_frame(cp.frame(MsgType::Logon, &[]), start);

        machine.on_heartbeat_tick(start + Duration::from_secs(31));
        let events = machine.on_heartbeat_tick(start + Duration::from_secs(61));

        assert_eq!(machine.phase(), Phase::Disconnected);
        assert!(matches!(
            terminated(&events),
            Some(DisconnectReason::Violation(ProtocolViolation::UnansweredTestRequest { .. }))
        ));
    }

    #[test]
    fn test_unexpected_test_req_id() {
        let now = Instant::now();
        let (mut machine, mut cp) = logged_in(now);

        let events = machine.on_frame(cp.frame(MsgType::Heartbeat, &[Field::new(112, "NOPE")]), now);
        assert!(matches!(
            events.as_slice(),
            [SessionEvent::Violation(ProtocolViolation::UnexpectedTestReqId { test_req_id })] if test_req_id == "NOPE"
        ));
        assert_eq!(machine.phase(), Phase::LoggedIn);
    }

    #[test]
    fn test_reject_surfaces_without_state_change() {
        let now = Instant::now();
        let (mut machine, mut cp) = logged_in(now);

        let events = machine.on_frame(
            cp.frame(
                MsgType::Reject,
                &[Field::new(45, "2"), Field::new(371, "611"), Field::new(58, "bad date")],
            ),
            now,
        );
        assert_eq!(machine.phase(), Phase::LoggedIn);
        match events.as_slice() {
            [SessionEvent::RejectReceived(notice)] => {
                assert_eq!(notice.ref_seq_num, Some(2));
                assert_eq!(notice.ref_tag_id, Some(611));
                assert_eq!(notice.text.as_deref(), Some("bad date"));
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn test_quote_forwarded_as_application() {
        let now = Instant::now();
        let (mut machine, mut cp) = logged_in(now);

        let events = machine.on_frame(cp.frame(MsgType::Quote, &[Field::new(131, "q1")]), now);
        match events.as_slice() {
            [SessionEvent::Application(msg)] => assert_eq!(msg.get(131), Some("q1")),
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn test_application_dropped_before_logon_ack() {
        let now = Instant::now();
        let mut machine = connected(config(), now);
        let mut cp = Counterparty::new();
        let events = machine.on_frame(cp.frame(MsgType::Quote, &[Field::new(131, "q1")]), now);
        assert!(events.is_empty());
        assert_eq!(machine.phase(), Phase::AwaitingLogonAck);
    }

    #[test]
    fn test_send_application_requires_logged_in() {
        let now = Instant::now();
        let mut machine = connected(config(), now);
        machine.take_outbound();

        let err = machine
            .send_application(&MsgType::QuoteRequest, &[Field::new(131, "q1")], now)
            .unwrap_err();
        assert_eq!(
            err,
            SessionError::NotLoggedIn {
                phase: Phase::AwaitingLogonAck
            }
        );
        assert_eq!(machine.phase(), Phase::AwaitingLogonAck);
        assert_eq!(machine.state().next_outbound_seq(), SeqNum::new(2));
        assert!(!machine.has_outbound());
    }

    #[test]
    fn test_encode_failure_does_not_consume_sequence() {
        let now = Instant::now();
        let (mut machine, _cp) = logged_in(now);

        let err = machine
            .send_application(&MsgType::QuoteRequest, &[Field::new(58, "a\x01b")], now)
            .unwrap_err();
        assert!(matches!(err, SessionError::Encode(_)));
        assert_eq!(machine.state().next_outbound_seq(), SeqNum::new(2));
    }

    #[test]
    fn test_local_logout_completes_on_remote_logout() {
        let now = Instant::now();
        let (mut machine, mut cp) = logged_in(now);

        let events = machine.initiate_logout(Some("bye"), now).unwrap();
        assert_eq!(machine.phase(), Phase::LoggingOut);
        assert_eq!(events.len(), 1);
        let out = decoded(machine.take_outbound());
        assert_eq!(*out[0].msg_type(), MsgType::Logout);
        assert_eq!(out[0].get(58), Some("bye"));

        assert!(machine.initiate_logout(None, now).unwrap().is_empty());
        assert!(!machine.has_outbound());

        let events = machine.on_frame(cp.frame(MsgType::Logout, &[]), now);
        assert_eq!(machine.phase(), Phase::Disconnected);
        assert_eq!(terminated(&events), Some(&DisconnectReason::LogoutCompleted));
        assert!(!machine.has_outbound());
    }

    #[test]
    fn test_logout_grace_expiry() {
        let now = Instant::now();
        let (mut machine, _cp) = logged_in(now);

        assert!(machine.on_grace_expired().is_empty());
        machine.initiate_logout(None, now).unwrap();
        let events = machine.on_grace_expired();
        assert_eq!(terminated(&events), Some(&DisconnectReason::LogoutGraceExpired));

        assert!(machine.on_grace_expired().is_empty());
        assert_eq!(
            machine.initiate_logout(None, now).unwrap_err(),
            SessionError::InvalidPhase {
                operation: "logout",
                phase: Phase::Disconnected
            }
        );
    }

    #[test]
    fn test_remote_logout_is_answered() {
        let now = Instant::now();
        let (mut machine, mut cp) = logged_in(now);

        let events = machine.on_frame(cp.frame(MsgType::Logout, &[Field::new(58, "maintenance")]), now);
        assert_eq!(machine.phase(), Phase::Disconnected);
        assert_eq!(
            terminated(&events),
            Some(&DisconnectReason::RemoteLogout {
                text: Some("maintenance".to_string())
            })
        );
        let out = decoded(machine.take_outbound());
        assert_eq!(out.len(), 1);
        assert_eq!(*out[0].msg_type(), MsgType::Logout);
        assert_eq!(out[0].get(34), Some("2"));
    }

    #[test]
    fn test_logout_before_ack_aborts() {
        let now = Instant::now();
        let mut machine = connected(config(), now);
        let events = machine.initiate_logout(None, now).unwrap();
        assert_eq!(terminated(&events), Some(&DisconnectReason::Aborted));
    }

    #[test]
    fn test_malformed_frame_during_logon_fails() {
        let now = Instant::now();
        let mut machine = connected(config(), now);

        let events = machine.on_frame(Bytes::from_static(b"8=FIX.4.4\x0135=A\x0110=000"), now);
        assert_eq!(machine.phase(), Phase::Disconnected);
        assert!(matches!(terminated(&events), Some(DisconnectReason::LogonFailed(_))));
        assert!(matches!(
            machine.termination().map(DisconnectReason::to_error),
            Some(SessionError::LogonFailed { .. })
        ));
    }

    #[test]
    fn test_malformed_frame_when_logged_in_is_dropped() {
        let now = Instant::now();
        let (mut machine, _cp) = logged_in(now);

        let events = machine.on_frame(Bytes::from_static(b"8=FIX.4.4\x0135=S\x0110=000"), now);
        assert!(events.is_empty());
        assert_eq!(machine.phase(), Phase::LoggedIn);
    }

    #[test]
    fn test_checksum_mismatch_logged_and_processed() {
        let now = Instant::now();
        let (mut machine, mut cp) = logged_in(now);

        let frame = corrupt_checksum(&cp.frame(MsgType::Quote, &[Field::new(131, "q1")]));
        let events = machine.on_frame(frame, now);
        assert!(matches!(
            events.as_slice(),
            [
                SessionEvent::Violation(ProtocolViolation::InvalidFrame { .. }),
                SessionEvent::Application(_)
            ]
        ));
        assert_eq!(machine.phase(), Phase::LoggedIn);
    }

    #[test]
    fn test_checksum_mismatch_disconnects_under_strict_policy() {
        let now = Instant::now();
        let mut config = config();
        config.violation_policy = ViolationPolicy::Disconnect;
        let mut machine = connected(config, now);
        let mut cp = Counterparty::new();
        machine.on_frame(cp.frame(MsgType::Logon, &[]), now);

        let frame = corrupt_checksum(&cp.frame(MsgType::Heartbeat, &[]));
        let events = machine.on_frame(frame, now);
        assert_eq!(machine.phase(), Phase::Disconnected);
        assert!(matches!(
            terminated(&events),
            Some(DisconnectReason::Violation(ProtocolViolation::InvalidFrame { .. }))
        ));
    }

    #[test]
    fn test_checksum_mismatch_ignored_without_validation() {
        let now = Instant::now();
        let mut config = config();
        config.validate_inbound = false;
        let mut machine = connected(config, now);
        let mut cp = Counterparty::new();

        let frame = corrupt_checksum(&cp.frame(MsgType::Logon, &[]));
        machine.on_frame(frame, now);
        assert_eq!(machine.phase(), Phase::LoggedIn);
    }

    #[test]
    fn test_invalid_logon_ack_fails_handshake() {
        let now = Instant::now();
        let mut machine = connected(config(), now);
        let mut cp = Counterparty::new();

        let frame = corrupt_checksum(&cp.frame(MsgType::Logon, &[]));
        let events = machine.on_frame(frame, now);
        assert!(matches!(terminated(&events), Some(DisconnectReason::LogonFailed(_))));
    }

    #[test]
    fn test_logon_timeout() {
        let now = Instant::now();
        let mut machine = connected(config(), now);
        let events = machine.on_logon_timeout();
        assert_eq!(terminated(&events), Some(&DisconnectReason::LogonTimeout));

        let (mut machine, _cp) = logged_in(now);
        assert!(machine.on_logon_timeout().is_empty());
        assert_eq!(machine.phase(), Phase::LoggedIn);
    }

    #[test]
    fn test_transport_closed_and_error() {
        let now = Instant::now();
        let (mut machine, _cp) = logged_in(now);
        let events = machine.on_transport_closed();
        assert_eq!(terminated(&events), Some(&DisconnectReason::TransportClosed));
        assert!(machine.on_transport_error("late").is_empty());

        let (mut machine, _cp) = logged_in(now);
        let events = machine.on_transport_error("reset by peer");
        assert_eq!(
            terminated(&events),
            Some(&DisconnectReason::TransportError("reset by peer".to_string()))
        );
    }

    #[test]
    fn test_disconnected_is_terminal() {
        let now = Instant::now();
        let mut machine = connected(config(), now);
        machine.on_transport_closed();

        assert!(matches!(
            machine.begin_connect(),
            Err(SessionError::InvalidPhase { operation: "connect", .. })
        ));
        assert!(machine.on_frame(Bytes::from_static(b"8=FIX.4.4"), now).is_empty());
        assert!(machine.on_heartbeat_tick(now + Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn test_on_connected_requires_connecting() {
        let mut machine = SessionStateMachine::new(config());
        assert!(matches!(
            machine.on_connected(TOKEN, Instant::now()),
            Err(SessionError::InvalidPhase { operation: "logon", phase: Phase::Disconnected })
        ));
    }

    #[derive(Debug, Clone)]
    enum Step {
        Tick(u64),
        Quote,
        TestRequest,
        Heartbeat,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (1u64..45).prop_map(Step::Tick),
            Just(Step::Quote),
            Just(Step::TestRequest),
            Just(Step::Heartbeat),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn outbound_sequence_is_gapless(steps in prop::collection::vec(step(), 0..40)) {
            let start = Instant::now();
            let mut machine = connected(config(), start);
            let mut cp = Counterparty::new();
            machine.on_frame(cp.frame(MsgType::Logon, &[]), start);

            let mut now = start;
            for step in steps {
                match step {
                    Step::Tick(secs) => {
                        now += Duration::from_secs(secs);
                        machine.on_heartbeat_tick(now);
                    }
                    Step::Quote => {
                        machine
                            .send_application(&MsgType::QuoteRequest, &[Field::new(131, "q")], now)
                            .unwrap();
                    }
                    Step::TestRequest => {
                        machine.on_frame(cp.frame(MsgType::TestRequest, &[Field::new(112, "T")]), now);
                    }
                    Step::Heartbeat => {
                        machine.on_frame(cp.frame(MsgType::Heartbeat, &[]), now);
                    }
                }
            }
            machine.initiate_logout(None, now).unwrap();

            let seqs: Vec<u64> = decoded(machine.take_outbound())
                .iter()
                .map(|m| m.seq_num().unwrap().value())
                .collect();
            let expected: Vec<u64> = (1..=seqs.len() as u64).collect();
            prop_assert_eq!(seqs, expected);
        }
    }
}
