//! A pending probe or query: one subscription, one accumulator.

use peercache_protocol::{Message, Question};

use crate::store::record_matches;
use crate::transport::{MdnsTransport, Subscription};

/// Is `msg` a response answering `(name, rtype, class)`?
pub fn packet_is_for_query(msg: &Message, name: &str, rtype: u16, class: u16) -> bool {
    !msg.is_query()
        && msg
            .answers
            .iter()
            .any(|r| record_matches(r, name, rtype, class))
}

/// State shared by every round of a probe or query.
///
/// Once resolved, [`QuerySession::begin_round`] refuses every further round,
/// so a retry loop that keeps going after the outcome is known does nothing.
/// Dropping the session unsubscribes its listener.
#[derive(Debug)]
pub struct QuerySession {
    subscription: Subscription,
    name: String,
    rtype: u16,
    class: u16,
    accumulated: Vec<Message>,
    resolved: bool,
    rounds: u32,
}

impl QuerySession {
    /// Subscribe before the first send so no early answer is missed.
    pub fn open(transport: &MdnsTransport, name: &str, rtype: u16, class: u16) -> Self {
        Self {
            subscription: transport.subscribe(),
            name: name.to_string(),
            rtype,
            class,
            accumulated: Vec::new(),
            resolved: false,
            rounds: 0,
        }
    }

    pub fn question(&self) -> Question {
        Question::new(self.name.clone(), self.rtype, self.class)
    }

    /// Start a round. `false` once resolved.
    pub fn begin_round(&mut self) -> bool {
        if self.resolved {
            return false;
        }
        self.rounds += 1;
        true
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn resolve(&mut self) {
        self.resolved = true;
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Move matching responses captured since the last call into the
    /// accumulator. Returns how many were added.
    pub fn collect(&mut self) -> usize {
        let before = self.accumulated.len();
        for inbound in self.subscription.drain() {
            if packet_is_for_query(&inbound.message, &self.name, self.rtype, self.class) {
                self.accumulated.push(inbound.message.clone());
            }
        }
        self.accumulated.len() - before
    }

    pub fn accumulated(&self) -> &[Message] {
        &self.accumulated
    }

    /// Unsubscribe and hand back everything collected.
    pub fn finish(self) -> Vec<Message> {
        self.accumulated
    }
}
