/// running text of one in-flight assistant message.
///
/// append-only for the life of a message; a new turn gets a fresh buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageBuffer {
    text: String,
    fragments: usize,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// appends and re-exposes the whole buffer; the parser always starts over.
    pub fn append(&mut self, fragment: &str) -> &str {
        self.text.push_str(fragment);
        self.fragments += 1;
        &self.text
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// number of fragments appended so far.
    pub fn fragments(&self) -> usize {
        self.fragments
    }

    pub fn into_string(self) -> String {
        self.text
    }
}
