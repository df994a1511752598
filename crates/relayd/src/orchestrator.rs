//! Answer orchestrator.
//!
//! Races one engine call against the response timeout:
//!
//! - engine first: record to the ledger, return the real text;
//! - timer first: register a pending entry, hand the still-running engine task
//!   to a supervised continuation, return the placeholder. The continuation
//!   waits with no bound, records, dispatches the callback and clears the
//!   pending entry.
//!
//! Finalize is at-most-once per request id: the ledger's insert-if-absent
//! decides which finalizer wins, and only the winner dispatches.

use crate::dispatcher::CallbackSink;
use crate::engine::{AnswerEngine, EngineError};
use crate::ledger::LedgerStore;
use crate::pending::{PendingGuard, PendingRegistry};
use crate::settings::SettingsHandle;
use crate::supervisor::Supervisor;
use chrono::Utc;
use relay_shared::{
    new_request_id, PendingEntry, PendingReport, RequestRecord, FAILURE_REPLY, PLACEHOLDER_REPLY,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type EngineTask = JoinHandle<Result<String, EngineError>>;

/// How a call to [`Orchestrator::answer`] was resolved
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Engine finished inside the budget
    Answered(String),
    /// Engine failed inside the budget
    Failed,
    /// Budget ran out; the answer follows through the callback
    Placeholder,
    /// Request id was already finalized; carries the recorded reply
    Duplicate(String),
}

impl Reply {
    /// Text handed back to the transport
    pub fn text(&self) -> &str {
        match self {
            Reply::Answered(text) | Reply::Duplicate(text) => text,
            Reply::Failed => FAILURE_REPLY,
            Reply::Placeholder => PLACEHOLDER_REPLY,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOutcome {
    pub request_id: String,
    pub reply: Reply,
}

impl AnswerOutcome {
    pub fn text(&self) -> &str {
        self.reply.text()
    }
}

pub struct Orchestrator {
    engine: Arc<dyn AnswerEngine>,
    ledger: Arc<dyn LedgerStore>,
    dispatcher: Arc<dyn CallbackSink>,
    pending: PendingRegistry,
    supervisor: Supervisor,
    settings: SettingsHandle,
}

impl Orchestrator {
    pub fn new(
        engine: Arc<dyn AnswerEngine>,
        ledger: Arc<dyn LedgerStore>,
        dispatcher: Arc<dyn CallbackSink>,
        settings: SettingsHandle,
    ) -> Self {
        Self {
            engine,
            ledger,
            dispatcher,
            pending: PendingRegistry::new(),
            supervisor: Supervisor::new(),
            settings,
        }
    }

    pub fn pending(&self) -> &PendingRegistry {
        &self.pending
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn pending_report(&self) -> PendingReport {
        PendingReport {
            pending: self.pending.snapshot(),
            active_continuations: self.supervisor.active(),
        }
    }

    /// Answer with the timeout currently configured in settings
    pub async fn handle(
        &self,
        request_id: Option<String>,
        user_id: &str,
        message: &str,
    ) -> AnswerOutcome {
        let timeout = self.settings.snapshot().response_timeout();
        self.answer(request_id, user_id, message, timeout).await
    }

    /// Answer one logical request. `timeout` of `None` or zero waits for the
    /// engine however long it takes.
    pub async fn answer(
        &self,
        request_id: Option<String>,
        user_id: &str,
        message: &str,
        timeout: Option<Duration>,
    ) -> AnswerOutcome {
        let request_id = request_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(new_request_id);

        match self.ledger.lookup(&request_id).await {
            Ok(Some(record)) => {
                info!("Request {} already finalized, not re-running", request_id);
                let text = if record.is_success() {
                    record.answer
                } else {
                    FAILURE_REPLY.to_string()
                };
                return AnswerOutcome {
                    request_id,
                    reply: Reply::Duplicate(text),
                };
            }
            Ok(None) => {}
            Err(e) => warn!("Ledger lookup for {} failed, answering anyway: {}", request_id, e),
        }

        let started = Instant::now();
        let start_time = Utc::now();

        let engine = Arc::clone(&self.engine);
        let conversation_id = user_id.to_string();
        let prompt = message.to_string();
        let mut job: EngineTask =
            tokio::spawn(async move { engine.generate(&conversation_id, &prompt).await });

        let finished = match timeout.filter(|d| !d.is_zero()) {
            None => join_engine(job.await),
            Some(budget) => {
                let raced = tokio::time::timeout(budget, &mut job).await;
                match raced {
                    Ok(joined) => join_engine(joined),
                    Err(_) => {
                        info!(
                            "Request {} exceeded {:?}, replying with placeholder",
                            request_id, budget
                        );
                        let entry = PendingEntry::new(user_id, message, start_time);
                        self.hand_off(&request_id, entry, started, job);
                        return AnswerOutcome {
                            request_id,
                            reply: Reply::Placeholder,
                        };
                    }
                }
            }
        };

        let record = build_record(&request_id, user_id, message, &finished, started);
        match self.ledger.record_if_absent(&record).await {
            Ok(true) => debug!("Request {} recorded", request_id),
            Ok(false) => info!("Request {} was finalized concurrently, keeping first record", request_id),
            Err(e) => error!("Could not record request {}: {}", request_id, e),
        }
        self.pending.remove(&request_id);

        let reply = match finished {
            Ok(text) => Reply::Answered(text),
            Err(e) => {
                warn!("Engine failed for {}: {}", request_id, e);
                Reply::Failed
            }
        };
        AnswerOutcome { request_id, reply }
    }

    /// Register the pending entry, then let a supervised continuation finish
    /// the still-running engine task.
    fn hand_off(&self, request_id: &str, entry: PendingEntry, started: Instant, job: EngineTask) {
        let continuation = Continuation {
            ledger: Arc::clone(&self.ledger),
            dispatcher: Arc::clone(&self.dispatcher),
            request_id: request_id.to_string(),
            user_id: entry.user_id.clone(),
            question: entry.question.clone(),
            started,
        };
        let guard = self.pending.track(request_id, entry);
        self.supervisor
            .spawn(request_id, continuation.run(job, guard));
    }

    /// Wait for all background continuations
    pub async fn shutdown(&self) {
        self.supervisor.drain().await;
    }
}

/// Slow-path finalizer, owns everything it needs after the caller has left
struct Continuation {
    ledger: Arc<dyn LedgerStore>,
    dispatcher: Arc<dyn CallbackSink>,
    request_id: String,
    user_id: String,
    question: String,
    started: Instant,
}

impl Continuation {
    async fn run(self, job: EngineTask, _pending: PendingGuard) {
        let finished = join_engine(job.await);
        let id = &self.request_id;

        match self.ledger.exists(id).await {
            Ok(true) => {
                info!("Request {} already finalized, skipping record and callback", id);
                return;
            }
            Ok(false) => {}
            Err(e) => {
                error!("Ledger unavailable for {}, dropping callback: {}", id, e);
                return;
            }
        }

        let record = build_record(id, &self.user_id, &self.question, &finished, self.started);
        match self.ledger.record_if_absent(&record).await {
            Ok(true) => debug!("Request {} recorded", id),
            Ok(false) => {
                info!("Request {} finalized concurrently, skipping callback", id);
                return;
            }
            Err(e) => {
                error!("Ledger unavailable for {}, dropping callback: {}", id, e);
                return;
            }
        }

        let text = match &finished {
            Ok(text) => text.as_str(),
            Err(e) => {
                warn!("Engine failed for {}: {}", id, e);
                FAILURE_REPLY
            }
        };
        if let Err(e) = self.dispatcher.deliver(&self.user_id, text).await {
            warn!("Callback for {} not delivered: {}", id, e);
        }
    }
}

fn join_engine(
    joined: Result<Result<String, EngineError>, tokio::task::JoinError>,
) -> Result<String, EngineError> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(EngineError::Failed(format!("engine task aborted: {}", e))),
    }
}

fn build_record(
    request_id: &str,
    user_id: &str,
    question: &str,
    finished: &Result<String, EngineError>,
    started: Instant,
) -> RequestRecord {
    let elapsed = started.elapsed().as_secs_f64();
    match finished {
        Ok(text) => RequestRecord::success(request_id, user_id, question, text, elapsed),
        Err(e) => RequestRecord::error(request_id, user_id, question, &e.to_string(), elapsed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_text() {
        assert_eq!(Reply::Answered("a".to_string()).text(), "a");
        assert_eq!(Reply::Duplicate("b".to_string()).text(), "b");
        assert_eq!(Reply::Failed.text(), FAILURE_REPLY);
        assert_eq!(Reply::Placeholder.text(), PLACEHOLDER_REPLY);
    }

    #[test]
    fn test_join_engine_maps_panic() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let joined = rt.block_on(async { tokio::spawn(async { panic!("engine bug") }).await });
        let result = join_engine(joined.map(|()| Ok(String::new())));
        assert!(matches!(result, Err(EngineError::Failed(_))));
    }

    #[test]
    fn test_build_record_error_keeps_description() {
        let rec = build_record(
            "r1",
            "u1",
            "q",
            &Err(EngineError::Status(500, "oops".to_string())),
            Instant::now(),
        );
        assert!(!rec.is_success());
        assert_eq!(rec.answer, "engine returned HTTP 500: oops");
    }
}
