//! Positional tokenizer for indexable text.
//!
//! Splits on ASCII whitespace and punctuation, lowercases ASCII letters,
//! and passes non-ASCII bytes through untouched so that diacritic-bearing
//! tokens ("à la carte") index byte-faithfully. Positions count emitted
//! non-empty tokens, starting at zero.

/// Streaming tokenizer over a borrowed string.
///
/// The iterator is lazy, finite, and non-restartable.
pub struct Tokenizer<'a> {
    bytes: &'a [u8],
    cursor: usize,
    position: u32,
    verbatim: bool,
    done: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            cursor: 0,
            position: 0,
            verbatim: false,
            done: false,
        }
    }

    /// Verbatim mode: the whole input is emitted as a single token with no
    /// case folding. Used when numeric and bool facet values are indexed
    /// as strings and must round-trip exactly.
    pub fn verbatim(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            cursor: 0,
            position: 0,
            verbatim: true,
            done: false,
        }
    }

    /// Collect all `(token, position)` pairs.
    pub fn tokenize(self) -> Vec<(String, u32)> {
        self.collect()
    }

    /// Collect just the token strings.
    pub fn tokens(self) -> Vec<String> {
        self.map(|(t, _)| t).collect()
    }
}

#[inline]
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b >= 0x80
}

impl Iterator for Tokenizer<'_> {
    type Item = (String, u32);

    fn next(&mut self) -> Option<(String, u32)> {
        if self.done {
            return None;
        }

        if self.verbatim {
            self.done = true;
            if self.bytes.is_empty() {
                return None;
            }
            // Safety not needed: input came from &str, passed through whole
            let token = String::from_utf8_lossy(self.bytes).into_owned();
            return Some((token, 0));
        }

        while self.cursor < self.bytes.len() {
            // skip separators
            while self.cursor < self.bytes.len() && !is_token_byte(self.bytes[self.cursor]) {
                self.cursor += 1;
            }

            let start = self.cursor;
            while self.cursor < self.bytes.len() && is_token_byte(self.bytes[self.cursor]) {
                self.cursor += 1;
            }

            if self.cursor > start {
                let mut token = Vec::with_capacity(self.cursor - start);
                for &b in &self.bytes[start..self.cursor] {
                    token.push(b.to_ascii_lowercase());
                }

                let position = self.position;
                self.position += 1;

                // Token bytes are either ASCII alphanumerics or part of a
                // UTF-8 sequence copied wholesale from valid input.
                let token = String::from_utf8_lossy(&token).into_owned();
                return Some((token, position));
            }
        }

        self.done = true;
        None
    }
}
