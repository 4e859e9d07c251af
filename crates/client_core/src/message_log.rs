use shared::domain::Message;

/// Received messages in arrival order. Grows only; entries are never edited,
/// reordered or removed.
#[derive(Debug, Default, Clone)]
pub struct MessageLog {
    entries: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) -> usize {
        self.entries.push(message);
        self.entries.len() - 1
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }
}
