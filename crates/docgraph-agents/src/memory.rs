use docgraph_llm::Message;

/// The `(role, content)` message history every agent carries, mirroring the
/// teacher's memory-list pattern but scoped to one component at a time instead
/// of a single long-lived conversation.
#[derive(Debug, Clone, Default)]
pub struct AgentMemory {
    messages: Vec<Message>,
}

impl AgentMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Drops everything but keeps a fresh summary note as the sole prior
    /// turn — used when the Verifier sends the Reader back to READ with a
    /// context suggestion, so the Reader sees that guidance without
    /// re-reading its own earlier (now-stale) analysis.
    pub fn refresh_with(&mut self, note: Message) {
        self.messages.clear();
        self.messages.push(note);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_with_drops_prior_turns_and_keeps_only_the_note() {
        let mut memory = AgentMemory::new();
        memory.push(Message::system("system prompt"));
        memory.push(Message::user("first analysis"));
        memory.push(Message::assistant("first response"));

        memory.refresh_with(Message::user("use this instead"));

        assert_eq!(memory.messages().len(), 1);
        assert_eq!(memory.messages()[0].content, "use this instead");
    }
}
