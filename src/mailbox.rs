//! Mailbox collaborator contract.
//!
//! Labels are plain strings, hierarchical by "/" naming convention. The
//! core only ever reads from the single to-process label and only ever
//! writes the two terminal labels plus removing to-process.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::RawMessage;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct MailboxError(pub String);

/// One page of thread ids carrying a label.
#[derive(Debug, Clone, Default)]
pub struct ThreadPage {
    pub thread_ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// A thread with its label set and chronological messages.
#[derive(Debug, Clone)]
pub struct ThreadDetail {
    pub id: String,
    pub labels: Vec<String>,
    pub messages: Vec<RawMessage>,
}

#[async_trait]
pub trait Mailbox: Send + Sync {
    /// All label names known to the mailbox.
    async fn list_labels(&self) -> Result<Vec<String>, MailboxError>;

    /// Thread ids currently carrying `label`, paged.
    async fn threads_with_label(
        &self,
        label: &str,
        page_token: Option<&str>,
        limit: u32,
    ) -> Result<ThreadPage, MailboxError>;

    /// Full thread detail: labels plus messages.
    async fn thread(&self, thread_id: &str) -> Result<ThreadDetail, MailboxError>;

    /// Add and remove labels on one thread.
    async fn modify_thread_labels(
        &self,
        thread_id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<(), MailboxError>;
}
