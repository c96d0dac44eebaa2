//! Message: deliver text to a running worker's opencode session.

use serde::Serialize;
use tracing::{info, info_span, Instrument};

use super::Orchestrator;
use crate::models::session::Session;
use crate::opencode::{most_recent, MessageFormat, OpencodeClient};
use crate::registry::SessionStore;
use crate::{AppError, Result};

/// Inputs to a message delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageRequest {
    /// Registered worker to message.
    pub session_name: String,
    /// Message text.
    pub text: String,
    /// Opencode session to use instead of the most recently updated one.
    pub opencode_session: Option<String>,
    /// Reply format requested from the agent.
    pub format: MessageFormat,
}

/// Outcome of a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageReport {
    /// Worker the message went to.
    pub worker: String,
    /// Opencode session that received it.
    pub session_id: String,
    /// Exit status of the agent command.
    pub exit_code: i32,
    /// Agent output.
    pub output: String,
}

impl<S: SessionStore> Orchestrator<'_, S> {
    /// Send `request.text` to the worker registered as `request.session_name`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for an unknown worker (listing the
    /// registered ones) and `AppError::Runtime` when no opencode session
    /// can be found or the message cannot be delivered.
    pub async fn message(&self, request: &MessageRequest) -> Result<MessageReport> {
        let span = info_span!("message", session = %request.session_name);
        self.message_inner(request).instrument(span).await
    }

    async fn message_inner(&self, request: &MessageRequest) -> Result<MessageReport> {
        let name = request.session_name.as_str();
        let session = self.registered_worker(name)?;
        let client = OpencodeClient::new(self.runner, &self.config.container_engine, &session);

        let session_id = match &request.opencode_session {
            Some(id) => id.clone(),
            None => {
                let sessions = client.sessions().await.map_err(|err| {
                    AppError::Runtime(format!(
                        "failed to discover opencode sessions for {name:?} ({err}). Suggestion: \
                         the worker might still be starting up, or it may have stopped"
                    ))
                })?;
                most_recent(&sessions).map(|s| s.id.clone()).ok_or_else(|| {
                    AppError::Runtime(format!(
                        "no active opencode sessions found for {name:?}. Suggestion: the \
                         worker might still be starting up, or it may have stopped"
                    ))
                })?
            }
        };
        info!(%session_id, "delivering message");

        let result = client
            .send(&session_id, &request.text, request.format)
            .await
            .map_err(|err| {
                AppError::Runtime(format!("failed to send message to {name:?}: {err}"))
            })?;

        Ok(MessageReport {
            worker: name.to_owned(),
            session_id,
            exit_code: result.exit_code,
            output: result.output,
        })
    }

    fn registered_worker(&self, name: &str) -> Result<Session> {
        match self.registry.get(name) {
            Ok(session) => Ok(session),
            Err(err) if err.is_not_found() => {
                let known: Vec<String> = self
                    .registry
                    .list()
                    .map(|sessions| sessions.into_keys().collect())
                    .unwrap_or_default();
                Err(AppError::Validation(if known.is_empty() {
                    format!("worker {name:?} not found. No active workers registered")
                } else {
                    format!(
                        "worker {name:?} not found. Available workers: {}",
                        known.join(", ")
                    )
                }))
            }
            Err(err) => Err(err),
        }
    }
}
