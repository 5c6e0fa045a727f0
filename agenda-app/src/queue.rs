//! Per-user FIFO of proposals awaiting a decision. The head is the one on screen.

use crate::proposal::PendingProposalEntry;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no pending proposal")]
pub struct EmptyQueueError;

/// The head proposal as shown to the user, with the id its buttons carry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivePrompt {
    pub proposal_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProposalQueue {
    entries: VecDeque<PendingProposalEntry>,
}

impl ProposalQueue {
    pub fn enqueue_all(&mut self, entries: impl IntoIterator<Item = PendingProposalEntry>) {
        self.entries.extend(entries);
    }

    pub fn peek_active(&self) -> Option<&PendingProposalEntry> {
        self.entries.front()
    }

    /// Pops the head without executing it.
    pub fn confirm_active(&mut self) -> Result<PendingProposalEntry, EmptyQueueError> {
        self.entries.pop_front().ok_or(EmptyQueueError)
    }

    pub fn cancel_all(&mut self) -> Vec<PendingProposalEntry> {
        self.entries.drain(..).collect()
    }

    /// Pops the head and discards everything behind it.
    pub fn take_for_change(&mut self) -> Option<PendingProposalEntry> {
        let head = self.entries.pop_front();
        self.entries.clear();
        head
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when `proposal_id` names the head. A tap on any other prompt
    /// is stale.
    pub fn is_active(&self, proposal_id: &str) -> bool {
        self.peek_active()
            .is_some_and(|entry| entry.proposal_id == proposal_id)
    }

    /// Confirmation prompt for the head, `[1/N] `-prefixed when more follow.
    pub fn active_prompt(&self) -> Option<ActivePrompt> {
        let active = self.peek_active()?;
        let prefix = if self.len() > 1 {
            format!("[1/{}] ", self.len())
        } else {
            String::new()
        };
        Some(ActivePrompt {
            proposal_id: active.proposal_id.clone(),
            text: format!(
                "{prefix}Proposed action:\n\n{}\n\nConfirm?",
                active.proposal.render()
            ),
        })
    }
}
