/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Quote request workflow.
//!
//! [`QuoteWorkflow`] keeps the registry of outstanding quote requests, keyed
//! by correlation id (QuoteReqID, tag 131). Requests go out through the
//! session; Quote(S) and QuoteRequestReject(AG) frames settle them. Frames
//! that match nothing are reported as orphans and dropped. Correlation is
//! only ever by tag 131, never by sequence number.
//!
//! The workflow is driven from the same dispatch path as the session and
//! does not schedule timers itself: the driver arms one per request and
//! calls [`QuoteWorkflow::on_timeout`], which is a no-op for requests that
//! were already settled.

use crate::request::QuoteRequestParams;
use crate::result::QuoteResult;
use fixquote_core::error::{QuoteError, SessionError};
use fixquote_core::field::tags;
use fixquote_core::message::{MsgType, WireMessage};
use fixquote_core::types::{SeqNum, Timestamp};
use fixquote_session::SessionStateMachine;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default time a quote request may stay unanswered.
pub const DEFAULT_QUOTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Produces correlation ids for quote requests.
pub trait CorrelationIdGenerator: Send + fmt::Debug {
    /// Returns a fresh id.
    fn next_id(&mut self) -> String;
}

/// Random v4 UUID correlation ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl CorrelationIdGenerator for UuidGenerator {
    fn next_id(&mut self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Quote workflow configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteConfig {
    /// Account (tag 1) used when a request does not name one. When neither
    /// is set, each request gets a fresh id from the generator.
    pub account: Option<String>,
    /// How long a request may stay unanswered.
    pub quote_timeout: Duration,
}

impl QuoteConfig {
    /// Creates a configuration with the default timeout and no account.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            account: None,
            quote_timeout: DEFAULT_QUOTE_TIMEOUT,
        }
    }

    /// Sets the default account.
    #[must_use]
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// Sets the quote timeout.
    #[must_use]
    pub const fn with_quote_timeout(mut self, timeout: Duration) -> Self {
        self.quote_timeout = timeout;
        self
    }
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self::new()
    }
}

type Responder = oneshot::Sender<Result<QuoteResult, QuoteError>>;

/// An outstanding quote request.
#[derive(Debug)]
pub struct PendingQuoteRequest {
    correlation_id: String,
    seq_num: SeqNum,
    submitted_at: Instant,
    responder: Option<Responder>,
}

impl PendingQuoteRequest {
    /// Returns the correlation id.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Returns the MsgSeqNum the request went out with.
    #[must_use]
    pub const fn seq_num(&self) -> SeqNum {
        self.seq_num
    }

    /// Returns when the request was sent.
    #[must_use]
    pub const fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    /// Returns true once the caller's handle has been settled.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.responder.is_none()
    }

    fn settle(&mut self, outcome: Result<QuoteResult, QuoteError>) {
        let Some(responder) = self.responder.take() else {
            return;
        };
        if responder.send(outcome).is_err() {
            debug!(correlation_id = %self.correlation_id, "quote handle dropped before settlement");
        }
    }
}

/// Caller's handle on a quote request.
///
/// Resolves to the quote, or to the error that settled the request.
#[derive(Debug)]
#[must_use = "a pending quote does nothing unless awaited"]
pub struct PendingQuote {
    correlation_id: String,
    receiver: oneshot::Receiver<Result<QuoteResult, QuoteError>>,
}

impl PendingQuote {
    /// Returns the correlation id of the request.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

impl Future for PendingQuote {
    type Output = Result<QuoteResult, QuoteError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(QuoteError::SessionClosed {
                    reason: "quote workflow dropped".to_string(),
                })
            })
        })
    }
}

/// How an inbound quote-related frame was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteOutcome {
    /// A pending request was answered with a quote.
    Resolved(QuoteResult),
    /// A pending request was rejected.
    Rejected {
        /// Correlation id of the request.
        correlation_id: String,
        /// Reject text.
        reason: String,
    },
    /// The frame matched no pending request and was dropped.
    Orphaned {
        /// The QuoteReqID the frame carried, if any.
        correlation_id: Option<String>,
        /// Quote or QuoteRequestReject.
        msg_type: MsgType,
    },
}

/// Registry of outstanding quote requests.
#[derive(Debug)]
pub struct QuoteWorkflow {
    config: QuoteConfig,
    generator: Box<dyn CorrelationIdGenerator>,
    pending: HashMap<String, PendingQuoteRequest>,
}

impl QuoteWorkflow {
    /// Creates a workflow with UUID correlation ids.
    #[must_use]
    pub fn new(config: QuoteConfig) -> Self {
        Self::with_generator(config, UuidGenerator)
    }

    /// Creates a workflow with a custom correlation id generator.
    #[must_use]
    pub fn with_generator(
        config: QuoteConfig,
        generator: impl CorrelationIdGenerator + 'static,
    ) -> Self {
        Self {
            config,
            generator: Box::new(generator),
            pending: HashMap::new(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &QuoteConfig {
        &self.config
    }

    /// Returns the number of outstanding requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if `correlation_id` is outstanding.
    #[must_use]
    pub fn is_pending(&self, correlation_id: &str) -> bool {
        self.pending.contains_key(correlation_id)
    }

    /// Returns an outstanding request.
    #[must_use]
    pub fn pending(&self, correlation_id: &str) -> Option<&PendingQuoteRequest> {
        self.pending.get(correlation_id)
    }

    /// Sends a QuoteRequest(R) and registers it.
    ///
    /// # Arguments
    /// * `session` - The session to send through; must be logged in
    /// * `params` - What to quote
    /// * `now` - The current time
    ///
    /// # Errors
    /// Returns `QuoteError::InvalidRequest` if `params` fail validation or
    /// the generated id is already outstanding, `QuoteError::NotLoggedIn`
    /// if the session is not logged in, and `QuoteError::Session` if the
    /// request cannot be encoded.
    pub fn request_quote(
        &mut self,
        session: &mut SessionStateMachine,
        params: &QuoteRequestParams,
        now: Instant,
    ) -> Result<PendingQuote, QuoteError> {
        params.validate()?;

        let correlation_id = self.generator.next_id();
        if self.pending.contains_key(&correlation_id) {
            return Err(QuoteError::InvalidRequest(format!(
                "correlation id {correlation_id} is already outstanding"
            )));
        }
        let account = match params.account.as_ref().or(self.config.account.as_ref()) {
            Some(account) => account.clone(),
            None => Uuid::new_v4().to_string(),
        };

        let body = params.to_fields(&correlation_id, &account, Timestamp::now());
        let seq_num = session
            .send_application(&MsgType::QuoteRequest, &body, now)
            .map_err(|err| match err {
                SessionError::NotLoggedIn { phase } => QuoteError::NotLoggedIn { phase },
                other => QuoteError::Session(other.to_string()),
            })?;

        info!(
            correlation_id = %correlation_id,
            seq = %seq_num,
            underlying = %params.underlying_symbol,
            strike = %params.strike,
            maturity = %params.maturity,
            "quote requested"
        );

        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            correlation_id.clone(),
            PendingQuoteRequest {
                correlation_id: correlation_id.clone(),
                seq_num,
                submitted_at: now,
                responder: Some(tx),
            },
        );
        Ok(PendingQuote {
            correlation_id,
            receiver: rx,
        })
    }

    /// Settles the request a Quote(S) or QuoteRequestReject(AG) refers to.
    ///
    /// # Returns
    /// `None` for any other message type.
    pub fn on_message(&mut self, msg: &WireMessage) -> Option<QuoteOutcome> {
        let msg_type = msg.msg_type();
        if !matches!(msg_type, MsgType::Quote | MsgType::QuoteRequestReject) {
            return None;
        }

        let correlation_id = msg.get(tags::QUOTE_REQ_ID);
        let Some(mut request) = correlation_id.and_then(|id| self.pending.remove(id)) else {
            warn!(
                %msg_type,
                correlation_id = correlation_id.unwrap_or("<none>"),
                "discarding orphaned quote message"
            );
            return Some(QuoteOutcome::Orphaned {
                correlation_id: correlation_id.map(str::to_string),
                msg_type: msg_type.clone(),
            });
        };

        let elapsed_ms = duration_ms(request.submitted_at.elapsed());
        if *msg_type == MsgType::Quote {
            match QuoteResult::from_message(msg) {
                Ok(result) => {
                    info!(
                        correlation_id = %request.correlation_id,
                        fee = ?result.fee,
                        fee_source = ?result.fee_source,
                        elapsed_ms,
                        "quote received"
                    );
                    request.settle(Ok(result.clone()));
                    Some(QuoteOutcome::Resolved(result))
                }
                Err(err) => {
                    // from_message only fails without tag 131, which matched above.
                    let reason = err.to_string();
                    request.settle(Err(QuoteError::Rejected {
                        correlation_id: request.correlation_id.clone(),
                        reason: reason.clone(),
                    }));
                    Some(QuoteOutcome::Rejected {
                        correlation_id: request.correlation_id,
                        reason,
                    })
                }
            }
        } else {
            let reason = reject_reason(msg);
            warn!(correlation_id = %request.correlation_id, %reason, "quote request rejected");
            request.settle(Err(QuoteError::Rejected {
                correlation_id: request.correlation_id.clone(),
                reason: reason.clone(),
            }));
            Some(QuoteOutcome::Rejected {
                correlation_id: request.correlation_id,
                reason,
            })
        }
    }

    /// Expires a request.
    ///
    /// # Returns
    /// `true` if the request was still outstanding and has now failed with
    /// `QuoteError::Timeout`; `false` if it was already settled.
    pub fn on_timeout(&mut self, correlation_id: &str) -> bool {
        let Some(mut request) = self.pending.remove(correlation_id) else {
            return false;
        };
        let timeout_ms = duration_ms(self.config.quote_timeout);
        warn!(correlation_id, timeout_ms, "quote request timed out");
        request.settle(Err(QuoteError::Timeout {
            correlation_id: correlation_id.to_string(),
            timeout_ms,
        }));
        true
    }

    /// Fails every outstanding request with `QuoteError::SessionClosed`.
    ///
    /// # Returns
    /// The number of requests failed.
    pub fn fail_all(&mut self, reason: &str) -> usize {
        let count = self.pending.len();
        for (_, mut request) in self.pending.drain() {
            request.settle(Err(QuoteError::SessionClosed {
                reason: reason.to_string(),
            }));
        }
        if count > 0 {
            warn!(count, reason, "failed outstanding quote requests");
        }
        count
    }
}

/// Text (58) of a QuoteRequestReject, else its reason code (658).
fn reject_reason(msg: &WireMessage) -> String {
    match (msg.get(tags::TEXT), msg.get(tags::QUOTE_REQUEST_REJECT_REASON)) {
        (Some(text), _) => text.to_string(),
        (None, Some(code)) => format!("reject reason code {code}"),
        (None, None) => "quote request rejected".to_string(),
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
