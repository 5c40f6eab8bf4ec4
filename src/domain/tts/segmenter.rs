/// OpenAI has a limit of 4096 characters per request
pub const MAX_SEGMENT_CHARS: usize = 4096;

const SENTENCE_TERMINALS: [char; 5] = ['.', '?', '!', ';', ':'];

/// A contiguous slice of the input text, synthesized as one provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Position in the job, defines assembly order
    pub index: usize,
    pub content: String,
}

impl Segment {
    pub fn byte_length(&self) -> usize {
        self.content.len()
    }

    pub fn char_length(&self) -> usize {
        self.content.chars().count()
    }
}

/// Split text into segments of at most `max_chars` characters.
///
/// Boundaries are chosen, in order of preference, right after the last
/// sentence terminal (`. ? ! ; :`) that is followed by whitespace or closes the
/// window, right after the last space, or at exactly `max_chars`. No character
/// is trimmed: concatenating the segments yields `text` unchanged.
pub fn segment_text(text: &str, max_chars: usize) -> Vec<Segment> {
    let max_chars = max_chars.max(1);

    if text.is_empty() {
        return Vec::new();
    }

    // Byte offset of every char, plus the end of the text
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = offsets.len() - 1;

    if char_count <= max_chars {
        return vec![Segment {
            index: 0,
            content: text.to_string(),
        }];
    }

    let mut segments = Vec::with_capacity(char_count / max_chars + 1);
    let mut cursor = 0;

    while cursor < char_count {
        let window_end = (cursor + max_chars).min(char_count);

        let split_at = if window_end == char_count {
            window_end
        } else {
            let window = &text[offsets[cursor]..offsets[window_end]];
            match find_split(window) {
                Some(len) => cursor + len,
                None => {
                    tracing::warn!(
                        position = window_end,
                        "Forced split without space or punctuation"
                    );
                    window_end
                }
            }
        };

        segments.push(Segment {
            index: segments.len(),
            content: text[offsets[cursor]..offsets[split_at]].to_string(),
        });
        cursor = split_at;
    }

    tracing::debug!(
        text_chars = char_count,
        max_chars,
        segment_count = segments.len(),
        "Text split into segments"
    );

    segments
}

/// Length in chars of the preferred prefix of `window`, if any boundary exists
fn find_split(window: &str) -> Option<usize> {
    let chars: Vec<char> = window.chars().collect();

    let sentence_end = chars.iter().enumerate().rev().find_map(|(i, c)| {
        let closes = chars.get(i + 1).map_or(true, |next| next.is_whitespace());
        (SENTENCE_TERMINALS.contains(c) && closes).then_some(i + 1)
    });
    if sentence_end.is_some() {
        return sentence_end;
    }

    chars.iter().rposition(|c| *c == ' ').map(|i| i + 1)
}
