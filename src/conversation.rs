use std::fmt;

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    Question,
    Answer,
    Error,
}

/// One unit of the transcript. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    kind: ExchangeKind,
    text: String,
}

impl Exchange {
    fn new(kind: ExchangeKind, text: impl Into<String>) -> Self {
        Exchange {
            kind,
            text: text.into(),
        }
    }

    pub fn kind(&self) -> ExchangeKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HistoryId(Uuid);

impl HistoryId {
    fn new() -> Self {
        HistoryId(Uuid::new_v4())
    }
}

impl fmt::Display for HistoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: HistoryId,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    pub id: HistoryId,
    pub draft: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(u64);

/// An accepted submission the caller must send and later hand back to [`ConversationStore::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub id: RequestId,
    pub prompt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Question and answer were appended; the value is the answer's transcript index.
    Answered(usize),
    /// Question and an error exchange were appended.
    Failed,
    /// The completion did not belong to the in-flight request and was dropped.
    Stale,
}

/// Owns the transcript, the prompt history and the single edit session.
#[derive(Debug, Default)]
pub struct ConversationStore {
    input: String,
    transcript: Vec<Exchange>,
    history: Vec<HistoryEntry>,
    edit: Option<EditSession>,
    in_flight: Option<Submission>,
    generation: u64,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, value: impl Into<String>) {
        self.input = value.into();
    }

    pub fn transcript(&self) -> &[Exchange] {
        &self.transcript
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn edit_session(&self) -> Option<&EditSession> {
        self.edit.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// The question currently waiting on the endpoint, if any.
    pub fn pending_prompt(&self) -> Option<&str> {
        self.in_flight.as_ref().map(|s| s.prompt.as_str())
    }

    pub fn can_submit(&self) -> bool {
        !self.input.trim().is_empty() && !self.is_busy()
    }

    /// Accepts the current input as a question. Blank input and overlapping
    /// submissions are rejected. The input is cleared on acceptance.
    pub fn submit(&mut self) -> Option<Submission> {
        if self.input.trim().is_empty() {
            tracing::debug!("ignoring blank submission");
            return None;
        }
        if let Some(pending) = &self.in_flight {
            tracing::debug!(request = pending.id.0, "submission rejected, request in flight");
            return None;
        }

        self.generation += 1;
        let submission = Submission {
            id: RequestId(self.generation),
            prompt: std::mem::take(&mut self.input),
        };
        tracing::info!(request = self.generation, "submitting question");
        self.in_flight = Some(submission.clone());
        Some(submission)
    }

    /// Completes the in-flight request. Failures become an inline error exchange.
    pub fn resolve<E: fmt::Display>(&mut self, id: RequestId, result: Result<String, E>) -> Resolution {
        let pending = match self.in_flight.take() {
            Some(pending) if pending.id == id => pending,
            other => {
                tracing::debug!(request = id.0, "dropping stale completion");
                self.in_flight = other;
                return Resolution::Stale;
            }
        };

        self.transcript
            .push(Exchange::new(ExchangeKind::Question, pending.prompt.as_str()));

        match result {
            Ok(answer) => {
                self.transcript.push(Exchange::new(ExchangeKind::Answer, answer));
                self.history.push(HistoryEntry {
                    id: HistoryId::new(),
                    prompt: pending.prompt,
                });
                tracing::info!(request = id.0, "answer received");
                Resolution::Answered(self.transcript.len() - 1)
            }
            Err(e) => {
                tracing::warn!(request = id.0, "request failed: {}", e);
                self.transcript
                    .push(Exchange::new(ExchangeKind::Error, e.to_string()));
                if self.input.is_empty() {
                    self.input = pending.prompt;
                }
                Resolution::Failed
            }
        }
    }

    /// Removes a history entry. The transcript is untouched.
    pub fn delete_history_entry(&mut self, id: HistoryId) -> bool {
        let Some(position) = self.position(id) else {
            return false;
        };
        self.history.remove(position);
        tracing::debug!(%id, "history entry deleted");
        if self.edit.as_ref().is_some_and(|e| e.id == id) {
            self.edit = None;
        }
        true
    }

    /// Opens the edit session for `id`, replacing any other open session.
    pub fn start_edit(&mut self, id: HistoryId) -> bool {
        let Some(position) = self.position(id) else {
            return false;
        };
        self.edit = Some(EditSession {
            id,
            draft: self.history[position].prompt.clone(),
        });
        true
    }

    pub fn update_draft(&mut self, text: impl Into<String>) {
        if let Some(edit) = &mut self.edit {
            edit.draft = text.into();
        }
    }

    /// Overwrites the entry's prompt and closes the edit session.
    pub fn save_edit(&mut self, id: HistoryId, text: impl Into<String>) -> bool {
        self.edit = None;
        match self.position(id) {
            Some(position) => {
                self.history[position].prompt = text.into();
                true
            }
            None => false,
        }
    }

    pub fn cancel_edit(&mut self) {
        self.edit = None;
    }

    fn position(&self, id: HistoryId) -> Option<usize> {
        self.history.iter().position(|entry| entry.id == id)
    }
}
