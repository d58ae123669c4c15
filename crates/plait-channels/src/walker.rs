//! Lazy traversal of unread channel messages.

use std::collections::VecDeque;

use plait_core::Identifier;
use plait_transport::Transport;

use crate::error::Result;
use crate::message::Message;
use crate::user::User;

/// Walks every tracked publisher's unread messages.
///
/// A pass visits publishers in registration order and drains each one
/// until its next message is missing. Another pass follows whenever the
/// previous one found something, since a message read late in a pass
/// (a keyload, say) can make earlier publishers readable or add new ones.
/// Each message is committed to the user's state as it is yielded.
pub struct MessageWalker<'a, T> {
    user: &'a mut User<T>,
    pending: VecDeque<Identifier>,
    found_this_pass: bool,
    passes: usize,
    max_passes: Option<usize>,
}

impl<'a, T: Transport> MessageWalker<'a, T> {
    pub(crate) fn new(user: &'a mut User<T>, max_passes: Option<usize>) -> Self {
        Self {
            user,
            pending: VecDeque::new(),
            found_this_pass: false,
            passes: 0,
            max_passes,
        }
    }

    /// Number of passes started so far.
    pub fn passes(&self) -> usize {
        self.passes
    }

    fn start_pass(&mut self) -> bool {
        if self.passes > 0 && !self.found_this_pass {
            return false;
        }
        if matches!(self.max_passes, Some(max) if self.passes >= max) {
            return false;
        }
        self.passes += 1;
        self.found_this_pass = false;
        self.pending = self
            .user
            .state
            .sequencing
            .identifiers()
            .iter()
            .copied()
            .collect();
        !self.pending.is_empty()
    }

    /// The next unread message, or `None` once nothing new is found.
    pub async fn next(&mut self) -> Result<Option<Message>> {
        loop {
            let Some(publisher) = self.pending.front().copied() else {
                if self.start_pass() {
                    continue;
                }
                return Ok(None);
            };
            match self.user.fetch_next_for(&publisher).await? {
                Some(message) => {
                    self.found_this_pass = true;
                    return Ok(Some(message));
                }
                None => {
                    self.pending.pop_front();
                }
            }
        }
    }

    /// Drain the walker.
    pub async fn collect(mut self) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        while let Some(message) = self.next().await? {
            messages.push(message);
        }
        Ok(messages)
    }
}
