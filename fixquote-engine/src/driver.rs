/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! The session driver task.
//!
//! One task owns the [`SessionStateMachine`], the [`QuoteWorkflow`] and the
//! write half of the stream. A reader task feeds it reassembled frames over a
//! channel; client commands, the liveness tick and timer events arrive on
//! their own channels. Everything that touches session state runs on this
//! one task.
//!
//! Timers are spawned sleeps that post a [`TimerEvent`] back to the driver.
//! Their handles are aborted once moot, and an event that still slips
//! through is a no-op in the machine or the workflow.

use crate::client::ClientEvent;
use bytes::Bytes;
use fixquote_core::error::{QuoteError, SessionError};
use fixquote_core::message::{WireMessage, render_frame};
use fixquote_core::types::Phase;
use fixquote_quote::{PendingQuote, QuoteOutcome, QuoteRequestParams, QuoteWorkflow};
use fixquote_session::{SessionEvent, SessionStateMachine};
use fixquote_transport::{BoxedStream, CodecError, FrameCodec};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, trace, warn};

/// Frames buffered between the reader task and the driver.
const INBOUND_BUFFER_SIZE: usize = 256;

/// Request from a [`crate::QuoteClient`] handle.
#[derive(Debug)]
pub(crate) enum Command {
    RequestQuote {
        params: QuoteRequestParams,
        reply: oneshot::Sender<Result<PendingQuote, QuoteError>>,
    },
    Logout {
        text: Option<String>,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
}

/// What the reader task saw.
#[derive(Debug)]
enum Inbound {
    Frame(Bytes),
    Closed,
    Failed(String),
}

#[derive(Debug)]
enum TimerEvent {
    LogonTimeout,
    LogoutGrace,
    QuoteTimeout(String),
}

/// Channels connecting the driver to its client.
pub(crate) struct DriverChannels {
    pub(crate) commands: mpsc::Receiver<Command>,
    pub(crate) phase: watch::Sender<Phase>,
    pub(crate) events: broadcast::Sender<ClientEvent>,
    /// Settled with the negotiated heartbeat interval on logon, or the
    /// error that ended the handshake.
    pub(crate) ready: oneshot::Sender<Result<Duration, SessionError>>,
}

pub(crate) struct Driver {
    session: SessionStateMachine,
    quotes: QuoteWorkflow,
    writer: WriteHalf<BoxedStream>,
    reader: JoinHandle<()>,
    inbound: mpsc::Receiver<Inbound>,
    commands: mpsc::Receiver<Command>,
    timer_tx: mpsc::UnboundedSender<TimerEvent>,
    timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
    phase: watch::Sender<Phase>,
    events: broadcast::Sender<ClientEvent>,
    ready: Option<oneshot::Sender<Result<Duration, SessionError>>>,
    logon_timer: Option<JoinHandle<()>>,
    grace_timer: Option<JoinHandle<()>>,
    quote_timers: HashMap<String, JoinHandle<()>>,
}

impl Driver {
    /// Splits the stream, starts the reader and spawns the driver.
    ///
    /// `session` must already be awaiting the Logon acknowledgement, with
    /// the Logon queued in its outbox.
    pub(crate) fn spawn(
        session: SessionStateMachine,
        quotes: QuoteWorkflow,
        stream: BoxedStream,
        channels: DriverChannels,
    ) -> JoinHandle<()> {
        let codec = FrameCodec::new(&session.config().begin_string)
            .with_max_frame_size(session.config().max_frame_size);
        let (read_half, writer) = tokio::io::split(stream);
        let (inbound_tx, inbound) = mpsc::channel(INBOUND_BUFFER_SIZE);
        let reader = tokio::spawn(read_frames(read_half, codec, inbound_tx));
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        let driver = Self {
            session,
            quotes,
            writer,
            reader,
            inbound,
            commands: channels.commands,
            timer_tx,
            timer_rx,
            phase: channels.phase,
            events: channels.events,
            ready: Some(channels.ready),
            logon_timer: None,
            grace_timer: None,
            quote_timers: HashMap::new(),
        };
        tokio::spawn(driver.run())
    }

    async fn run(mut self) {
        let mut ticker = time::interval(self.session.config().tick_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commands_open = true;

        let logon_timeout = self.session.config().logon_timeout;
        self.logon_timer = Some(self.arm(logon_timeout, TimerEvent::LogonTimeout));
        self.flush().await;

        while !self.session.is_terminated() {
            tokio::select! {
                Some(inbound) = self.inbound.recv() => self.on_inbound(inbound),
                command = self.commands.recv(), if commands_open => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        commands_open = false;
                        self.on_client_dropped();
                    }
                },
                Some(timer) = self.timer_rx.recv() => self.on_timer(timer),
                _ = ticker.tick() => {
                    let events = self.session.on_heartbeat_tick(now());
                    self.dispatch(events);
                }
            }
            self.flush().await;
        }
        self.shutdown().await;
    }

    fn on_inbound(&mut self, inbound: Inbound) {
        let events = match inbound {
            Inbound::Frame(frame) => self.session.on_frame(frame, now()),
            Inbound::Closed => {
                debug!("transport reached end of stream");
                self.session.on_transport_closed()
            }
            Inbound::Failed(reason) => {
                error!(%reason, "transport read failed");
                self.session.on_transport_error(reason)
            }
        };
        self.dispatch(events);
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::RequestQuote { params, reply } => {
                let result = self.quotes.request_quote(&mut self.session, &params, now());
                if let Ok(pending) = &result {
                    let id = pending.correlation_id().to_string();
                    let timeout = self.quotes.config().quote_timeout;
                    let handle = self.arm(timeout, TimerEvent::QuoteTimeout(id.clone()));
                    self.quote_timers.insert(id, handle);
                }
                if reply.send(result).is_err() {
                    debug!("quote requester went away before the reply");
                }
            }
            Command::Logout { text, reply } => {
                let result = match self.session.initiate_logout(text.as_deref(), now()) {
                    Ok(events) => {
                        self.dispatch(events);
                        Ok(())
                    }
                    Err(err) => Err(err),
                };
                if reply.send(result).is_err() {
                    debug!("logout requester went away before the reply");
                }
            }
        }
    }

    fn on_client_dropped(&mut self) {
        info!("client handle dropped, logging out");
        match self.session.initiate_logout(None, now()) {
            Ok(events) => self.dispatch(events),
            Err(err) => debug!(error = %err, "logout on drop skipped"),
        }
    }

    fn on_timer(&mut self, timer: TimerEvent) {
        let events = match timer {
            TimerEvent::LogonTimeout => {
                self.logon_timer = None;
                self.session.on_logon_timeout()
            }
            TimerEvent::LogoutGrace => {
                self.grace_timer = None;
                self.session.on_grace_expired()
            }
            TimerEvent::QuoteTimeout(id) => {
                self.quote_timers.remove(&id);
                if !self.quotes.on_timeout(&id) {
                    trace!(correlation_id = %id, "quote timer fired after settlement");
                }
                Vec::new()
            }
        };
        self.dispatch(events);
    }

    fn dispatch(&mut self, events: Vec<SessionEvent>) {
        for event in events {
            match event {
                SessionEvent::PhaseChanged { from, to } => {
                    debug!(%from, %to, "phase changed");
                    self.phase.send_replace(to);
                    match to {
                        Phase::LoggedIn => abort(&mut self.logon_timer),
                        Phase::LoggingOut => {
                            let grace = self.session.config().logout_grace;
                            self.grace_timer = Some(self.arm(grace, TimerEvent::LogoutGrace));
                        }
                        Phase::Disconnected | Phase::Connecting | Phase::AwaitingLogonAck => {}
                    }
                }
                SessionEvent::LoggedOn { heartbeat_interval } => {
                    if let Some(ready) = self.ready.take() {
                        // The connecting caller may have given up already.
                        let _ = ready.send(Ok(heartbeat_interval));
                    }
                }
                SessionEvent::RejectReceived(notice) => self.publish(ClientEvent::Reject(notice)),
                SessionEvent::Application(msg) => self.on_application(&msg),
                SessionEvent::Violation(violation) => {
                    self.publish(ClientEvent::Violation(violation));
                }
                SessionEvent::Terminated(reason) => {
                    abort(&mut self.logon_timer);
                    abort(&mut self.grace_timer);
                    for (_, handle) in self.quote_timers.drain() {
                        handle.abort();
                    }
                    self.quotes.fail_all(&reason.to_string());
                    if let Some(ready) = self.ready.take() {
                        let _ = ready.send(Err(reason.to_error()));
                    }
                    self.publish(ClientEvent::Disconnected(reason));
                }
            }
        }
    }

    fn on_application(&mut self, msg: &WireMessage) {
        match self.quotes.on_message(msg) {
            Some(QuoteOutcome::Resolved(result)) => self.cancel_quote_timer(&result.correlation_id),
            Some(QuoteOutcome::Rejected { correlation_id, .. }) => {
                self.cancel_quote_timer(&correlation_id);
            }
            Some(QuoteOutcome::Orphaned {
                correlation_id,
                msg_type,
            }) => self.publish(ClientEvent::Orphaned {
                correlation_id,
                msg_type,
            }),
            None => debug!(msg_type = %msg.msg_type(), "ignoring unhandled application message"),
        }
    }

    fn cancel_quote_timer(&mut self, correlation_id: &str) {
        if let Some(handle) = self.quote_timers.remove(correlation_id) {
            handle.abort();
        }
    }

    fn publish(&self, event: ClientEvent) {
        if self.events.send(event).is_err() {
            trace!("no event subscribers");
        }
    }

    fn arm(&self, after: Duration, event: TimerEvent) -> JoinHandle<()> {
        let tx = self.timer_tx.clone();
        tokio::spawn(async move {
            time::sleep(after).await;
            let _ = tx.send(event);
        })
    }

    /// Writes everything the session queued.
    async fn flush(&mut self) {
        let mut written = false;
        while self.session.has_outbound() {
            for frame in self.session.take_outbound() {
                trace!(frame = %render_frame(&frame), "sending");
                if let Err(err) = self.writer.write_all(&frame).await {
                    self.on_write_error(&err);
                    return;
                }
                written = true;
            }
        }
        if !written {
            return;
        }
        if let Err(err) = self.writer.flush().await {
            self.on_write_error(&err);
        }
    }

    fn on_write_error(&mut self, err: &std::io::Error) {
        error!(error = %err, "transport write failed");
        let events = self.session.on_transport_error(err.to_string());
        self.dispatch(events);
    }

    async fn shutdown(mut self) {
        abort(&mut self.logon_timer);
        abort(&mut self.grace_timer);
        for (_, handle) in self.quote_timers.drain() {
            handle.abort();
        }
        let failed = self.quotes.fail_all("session closed");
        if failed > 0 {
            warn!(failed, "quote requests outstanding at shutdown");
        }
        if let Err(err) = self.writer.shutdown().await {
            debug!(error = %err, "transport shutdown failed");
        }
        self.reader.abort();
        self.phase.send_replace(Phase::Disconnected);
        info!(reason = ?self.session.termination(), "session driver stopped");
    }
}

async fn read_frames(
    reader: ReadHalf<BoxedStream>,
    codec: FrameCodec,
    tx: mpsc::Sender<Inbound>,
) {
    let mut frames = FramedRead::new(reader, codec);
    let mut recovering = false;
    loop {
        let inbound = match frames.next().await {
            Some(Ok(frame)) => Inbound::Frame(frame),
            Some(Err(CodecError::FrameTooLarge { size, max_size })) => {
                warn!(size, max_size, "dropping oversized frame");
                recovering = true;
                continue;
            }
            Some(Err(err)) => Inbound::Failed(err.to_string()),
            // After a decode error the stream yields one None, then reads on.
            None if recovering => {
                recovering = false;
                continue;
            }
            None => Inbound::Closed,
        };
        recovering = false;
        let last = !matches!(inbound, Inbound::Frame(_));
        if tx.send(inbound).await.is_err() || last {
            break;
        }
    }
}

fn abort(timer: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = timer.take() {
        handle.abort();
    }
}

/// Current time on the tokio clock, so paused-time tests drive the session.
fn now() -> Instant {
    time::Instant::now().into_std()
}
