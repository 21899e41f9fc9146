//! chunk framing: raw transport bytes → decoded text fragments.

use serde::{Deserialize, Serialize};

/// how a transport wraps its text on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Framing {
    /// server-sent events: `data:` envelopes, `:` comments, keepalive blank lines.
    #[default]
    EventStream,
    /// plain text, line breaks are content.
    Raw,
}

/// sse control fields that never carry message text.
const CONTROL_FIELDS: [&str; 3] = ["event:", "id:", "retry:"];

/// splits one decoded chunk into content fragments.
///
/// for `EventStream`, each physical line is handled on its own: envelope
/// prefixes are stripped (plus the single optional space after them),
/// comments/control/blank lines are discarded and any other non-empty line
/// is kept verbatim. line breaks themselves are not content in this mode.
pub fn frame_chunk(chunk: &str, framing: Framing, prefixes: &[String]) -> Vec<String> {
    match framing {
        Framing::Raw => {
            if chunk.is_empty() {
                Vec::new()
            } else {
                vec![chunk.to_string()]
            }
        }
        Framing::EventStream => chunk
            .split('\n')
            .filter_map(|line| frame_line(line.strip_suffix('\r').unwrap_or(line), prefixes))
            .collect(),
    }
}

/// stateful framing for one message: an event-stream line split across
/// chunks (`da` | `ta: 深蹲`) is held back until its line break arrives.
#[derive(Debug, Clone)]
pub struct Framer {
    framing: Framing,
    prefixes: Vec<String>,
    partial: String,
}

impl Framer {
    pub fn new(framing: Framing, prefixes: &[String]) -> Self {
        Self { framing, prefixes: prefixes.to_vec(), partial: String::new() }
    }

    /// fragments completed by this piece of decoded text.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        if self.framing == Framing::Raw {
            return frame_chunk(text, Framing::Raw, &self.prefixes);
        }
        self.partial.push_str(text);
        let Some(end) = self.partial.rfind('\n') else {
            return Vec::new();
        };
        let rest = self.partial.split_off(end + 1);
        let complete = std::mem::replace(&mut self.partial, rest);
        frame_chunk(&complete, Framing::EventStream, &self.prefixes)
    }

    /// end of data: an unterminated last line still counts.
    pub fn finish(&mut self) -> Vec<String> {
        let tail = std::mem::take(&mut self.partial);
        frame_chunk(&tail, self.framing, &self.prefixes)
    }
}

fn frame_line(line: &str, prefixes: &[String]) -> Option<String> {
    if line.trim().is_empty() || line.starts_with(':') {
        return None;
    }
    for prefix in prefixes.iter().filter(|p| !p.is_empty()) {
        if let Some(rest) = line.strip_prefix(prefix.as_str()) {
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            return (!rest.is_empty()).then(|| rest.to_string());
        }
    }
    if CONTROL_FIELDS.iter().any(|f| line.starts_with(f)) {
        return None;
    }
    Some(line.to_string())
}

/// incremental utf-8 decoding across chunk boundaries.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// decodes as much as possible; an incomplete trailing sequence waits
    /// for the next chunk, invalid bytes become U+FFFD.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    out.push_str(s);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }

    /// flushes whatever is left at end of stream.
    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}
