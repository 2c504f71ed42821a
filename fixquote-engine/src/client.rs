/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Async quote client.
//!
//! [`QuoteClient`] is a handle on a session driver task. Connecting fetches
//! a token, opens the transport, sends Logon and waits for the
//! acknowledgement; after that the handle sends quote requests and logs out.
//! Dropping the handle makes the driver log out on its own.

use crate::builder::ClientConfig;
use crate::credentials::TokenProvider;
use crate::driver::{Command, Driver, DriverChannels};
use fixquote_core::error::{ProtocolViolation, QuoteError, Result, SessionError, TransportError};
use fixquote_core::message::MsgType;
use fixquote_core::types::Phase;
use fixquote_quote::{PendingQuote, QuoteRequestParams, QuoteResult, QuoteWorkflow};
use fixquote_session::{DisconnectReason, RejectNotice, SessionStateMachine};
use fixquote_transport::{Connector, TcpConnector};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info};

/// Commands buffered between a client handle and its driver.
const COMMAND_BUFFER_SIZE: usize = 64;

/// Something worth telling the application that is not the answer to a
/// request it made.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The counterparty rejected one of our messages at session level.
    Reject(RejectNotice),
    /// A Quote or QuoteRequestReject matched no pending request.
    Orphaned {
        /// QuoteReqID the frame carried, if any.
        correlation_id: Option<String>,
        /// Quote or QuoteRequestReject.
        msg_type: MsgType,
    },
    /// The counterparty broke the protocol.
    Violation(ProtocolViolation),
    /// The session ended.
    Disconnected(DisconnectReason),
}

/// Handle on a logged-in quote session.
#[derive(Debug)]
pub struct QuoteClient {
    commands: mpsc::Sender<Command>,
    phase: watch::Receiver<Phase>,
    events: broadcast::Sender<ClientEvent>,
    driver: Option<JoinHandle<()>>,
    heartbeat_interval: Duration,
}

impl QuoteClient {
    /// Connects over TCP and logs on.
    ///
    /// # Errors
    /// See [`Self::connect_with`].
    pub async fn connect(config: ClientConfig, tokens: &dyn TokenProvider) -> Result<Self> {
        let connector = TcpConnector::new()
            .with_connect_timeout(config.connect_timeout)
            .with_nodelay(config.nodelay);
        Self::connect_with(config, &connector, tokens).await
    }

    /// Connects through `connector` and logs on.
    ///
    /// Returns once the counterparty acknowledged the Logon. The wait is
    /// bounded by the session's logon timeout.
    ///
    /// # Errors
    /// Returns `FixError::Auth` if no token could be fetched,
    /// `FixError::Transport` if the connection could not be made in time,
    /// and `FixError::Session` if the Logon was refused or not acknowledged.
    pub async fn connect_with(
        config: ClientConfig,
        connector: &dyn Connector,
        tokens: &dyn TokenProvider,
    ) -> Result<Self> {
        let token = tokens.fetch_token(&config.credentials).await?;

        let mut session = SessionStateMachine::new(config.session.clone());
        session.begin_connect()?;

        let addr = config.addr();
        info!(%addr, "connecting");
        let stream = match time::timeout(
            config.connect_timeout,
            connector.connect(&config.host, config.port),
        )
        .await
        {
            Ok(stream) => stream?,
            Err(_) => {
                return Err(TransportError::ConnectTimeout {
                    addr,
                    timeout_ms: u64::try_from(config.connect_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                }
                .into());
            }
        };
        session.on_connected(&token, time::Instant::now().into_std())?;

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER_SIZE);
        let (phase_tx, phase_rx) = watch::channel(session.phase());
        let (events_tx, _) = broadcast::channel(config.event_capacity);
        let (ready_tx, ready_rx) = oneshot::channel();

        let driver = Driver::spawn(
            session,
            QuoteWorkflow::new(config.quote),
            stream,
            DriverChannels {
                commands: commands_rx,
                phase: phase_tx,
                events: events_tx.clone(),
                ready: ready_tx,
            },
        );

        let heartbeat_interval = match ready_rx.await {
            Ok(Ok(interval)) => interval,
            Ok(Err(err)) => {
                if let Err(join_err) = driver.await {
                    debug!(error = %join_err, "session driver did not stop cleanly");
                }
                return Err(err.into());
            }
            Err(_) => return Err(driver_stopped().into()),
        };
        info!(%addr, heartbeat_secs = heartbeat_interval.as_secs(), "logged on");

        Ok(Self {
            commands: commands_tx,
            phase: phase_rx,
            events: events_tx,
            driver: Some(driver),
            heartbeat_interval,
        })
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Returns true while logged in.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.phase() == Phase::LoggedIn
    }

    /// Returns a receiver that observes every phase change.
    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.phase.clone()
    }

    /// Subscribes to events raised from now on.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Returns the heartbeat interval agreed at logon.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Sends a quote request.
    ///
    /// # Returns
    /// A handle resolving to the quote, or to the reject, timeout or
    /// session loss that settled the request.
    ///
    /// # Errors
    /// Returns `QuoteError::NotLoggedIn` unless logged in,
    /// `QuoteError::InvalidRequest` for bad parameters, and
    /// `QuoteError::SessionClosed` if the session ends meanwhile.
    pub async fn request_quote(
        &self,
        params: QuoteRequestParams,
    ) -> std::result::Result<PendingQuote, QuoteError> {
        let phase = self.phase();
        if phase != Phase::LoggedIn {
            return Err(QuoteError::NotLoggedIn { phase });
        }
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::RequestQuote { params, reply })
            .await
            .map_err(|_| quote_closed())?;
        response.await.map_err(|_| quote_closed())?
    }

    /// Sends a quote request and waits for its outcome.
    ///
    /// # Errors
    /// Any error of [`Self::request_quote`], plus `QuoteError::Rejected`
    /// and `QuoteError::Timeout`.
    pub async fn quote(
        &self,
        params: QuoteRequestParams,
    ) -> std::result::Result<QuoteResult, QuoteError> {
        self.request_quote(params).await?.await
    }

    /// Logs out and waits for the session to end.
    ///
    /// The wait is bounded by the logout grace period. Pending quotes fail
    /// with `QuoteError::SessionClosed`.
    ///
    /// # Arguments
    /// * `text` - Optional Text (tag 58) for the Logout
    ///
    /// # Errors
    /// Returns `SessionError::InvalidPhase` if the session already ended.
    pub async fn logout(&mut self, text: Option<&str>) -> std::result::Result<(), SessionError> {
        let phase = self.phase();
        if phase == Phase::Disconnected {
            return Err(SessionError::InvalidPhase {
                operation: "logout",
                phase,
            });
        }

        let (reply, response) = oneshot::channel();
        let command = Command::Logout {
            text: text.map(str::to_string),
            reply,
        };
        if self.commands.send(command).await.is_ok() {
            response.await.map_err(|_| driver_stopped())??;
        }

        // The driver publishes Disconnected before it stops.
        let _ = self.phase.wait_for(|phase| *phase == Phase::Disconnected).await;
        if let Some(driver) = self.driver.take() {
            if let Err(err) = driver.await {
                debug!(error = %err, "session driver did not stop cleanly");
            }
        }
        Ok(())
    }
}

fn driver_stopped() -> SessionError {
    SessionError::SessionClosed {
        reason: "session driver stopped".to_string(),
    }
}

fn quote_closed() -> QuoteError {
    QuoteError::SessionClosed {
        reason: "session driver stopped".to_string(),
    }
}
