use crate::client::ClientError;
use crate::model::{PersistedViolation, UploadResult, ViolationIdentity};

/// Issued by [`UploadSession::begin`]; only the newest ticket may update
/// the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    Superseded,
}

/// View state of the upload page.
#[derive(Debug, Default)]
pub struct UploadSession {
    generation: u64,
    loading: bool,
    current: Option<UploadResult>,
    error: Option<String>,
}

impl UploadSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) -> Ticket {
        self.generation += 1;
        self.loading = true;
        self.error = None;
        Ticket(self.generation)
    }

    /// Responses to superseded requests are dropped. A failure keeps the
    /// previously displayed result.
    pub fn complete(
        &mut self,
        ticket: Ticket,
        result: Result<UploadResult, ClientError>,
    ) -> Completion {
        if ticket.0 != self.generation {
            tracing::debug!(
                ticket = ticket.0,
                latest = self.generation,
                "discarding superseded upload response"
            );
            return Completion::Superseded;
        }

        self.loading = false;
        match result {
            Ok(result) => {
                self.current = Some(result);
                self.error = None;
            }
            Err(e) => self.error = Some(e.to_string()),
        }
        Completion::Applied
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn current(&self) -> Option<&UploadResult> {
        self.current.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Local copy of the stored violations shown on the reports page.
#[derive(Debug, Default)]
pub struct ViolationBoard {
    items: Vec<PersistedViolation>,
    selected: Option<ViolationIdentity>,
    error: Option<String>,
}

impl ViolationBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, result: Result<Vec<PersistedViolation>, ClientError>) {
        match result {
            Ok(items) => {
                self.items = items;
                self.error = None;
            }
            Err(e) => self.error = Some(e.to_string()),
        }
    }

    pub fn select(&mut self, identity: ViolationIdentity) {
        self.selected = Some(identity);
    }

    /// Removes the item only once the backend confirmed the delete.
    pub fn apply_delete(&mut self, identity: &ViolationIdentity, result: Result<(), ClientError>) {
        match result {
            Ok(()) => {
                self.items.retain(|v| !v.matches(identity));
                if self.selected.as_ref() == Some(identity) {
                    self.selected = None;
                }
                self.error = None;
            }
            Err(e) => self.error = Some(e.to_string()),
        }
    }

    pub fn items(&self) -> &[PersistedViolation] {
        &self.items
    }

    pub fn selected(&self) -> Option<&ViolationIdentity> {
        self.selected.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
