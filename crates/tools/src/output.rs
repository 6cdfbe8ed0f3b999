//! Combined stdout/stderr buffer.

/// Output of one command, both streams appended in arrival order.
///
/// Once `max_chars` is exceeded the oldest quarter is dropped so the tail
/// (usually the interesting part) survives.
#[derive(Debug)]
pub struct OutputBuffer {
    pub combined: String,
    pub max_chars: usize,
    truncated: bool,
}

impl OutputBuffer {
    pub fn new(max_chars: usize) -> Self {
        Self {
            combined: String::new(),
            max_chars,
            truncated: false,
        }
    }

    pub fn push(&mut self, text: &str) {
        self.combined.push_str(text);
        if self.combined.len() > self.max_chars {
            let keep = self.max_chars * 3 / 4;
            let drain_count = self.combined.len() - keep;
            // Find a char boundary to avoid splitting a multi-byte character.
            let mut boundary = drain_count;
            while boundary < self.combined.len() && !self.combined.is_char_boundary(boundary) {
                boundary += 1;
            }
            self.combined.drain(..boundary);
            self.truncated = true;
        }
    }

    pub fn len(&self) -> usize {
        self.combined.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combined.is_empty()
    }

    /// Whether older output was dropped to stay under `max_chars`.
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}
