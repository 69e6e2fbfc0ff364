/// Structure-aware document splitter
use super::{count_tokens, SplitterConfig};
use tracing::debug;

const PARAGRAPH_SEP: &str = "\n\n";
const SENTENCE_SEP: &str = " ";

/// One chunk produced by the splitter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitChunk {
    /// Most recent header seen before this chunk ("" if none)
    pub heading: String,
    /// Chunk text, including any overlap carried from the previous chunk
    pub text: String,
    /// Estimated token length of `text`
    pub token_count: usize,
}

/// Splits documents along headers, paragraphs and sentences
///
/// Every chunk stays within `max_tokens` unless a single sentence is larger
/// than the budget on its own. Undersized sections are folded into the
/// preceding chunk when that chunk has room, except for the first chunk of
/// a document which always stands alone.
#[derive(Debug, Clone)]
pub struct StructuralSplitter {
    config: SplitterConfig,
}

impl StructuralSplitter {
    pub fn new(config: SplitterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Split one document into ordered `(heading, text)` chunks
    ///
    /// Returns an empty vector only when `text` has no non-whitespace
    /// content.
    pub fn split(&self, text: &str) -> Vec<SplitChunk> {
        let mut chunks: Vec<SplitChunk> = Vec::new();

        for section in split_sections(text) {
            let body = section.body.trim();
            let tokens = count_tokens(body);

            if tokens <= self.config.max_tokens {
                if tokens < self.config.min_tokens {
                    if let Some(prev) = chunks.last_mut() {
                        if prev.token_count + tokens <= self.config.max_tokens {
                            prev.text.push_str(PARAGRAPH_SEP);
                            prev.text.push_str(body);
                            prev.token_count += tokens;
                            continue;
                        }
                    }
                }

                chunks.push(SplitChunk {
                    heading: section.heading,
                    text: body.to_string(),
                    token_count: tokens,
                });
            } else {
                self.split_section(&section.heading, body, &mut chunks);
            }
        }

        // Never return nothing for non-empty input
        if chunks.is_empty() && !text.trim().is_empty() {
            let slice: String = text
                .trim()
                .chars()
                .take(self.config.max_tokens * 4)
                .collect();
            let token_count = count_tokens(&slice);
            chunks.push(SplitChunk {
                heading: String::new(),
                text: slice,
                token_count,
            });
        }

        debug!(
            "Split document into {} chunks (avg {} tokens)",
            chunks.len(),
            chunks.iter().map(|c| c.token_count).sum::<usize>() / chunks.len().max(1)
        );

        chunks
    }

    /// Split an oversized section by paragraphs, then sentences
    fn split_section(&self, heading: &str, body: &str, out: &mut Vec<SplitChunk>) {
        let mut buffer = ChunkBuffer::new(heading, self.config);

        for paragraph in paragraphs(body) {
            let tokens = count_tokens(paragraph);

            if tokens <= self.config.max_tokens {
                // An undersized buffer is topped up with sentences instead of
                // being emitted on its own
                if buffer.is_undersized() && buffer.tokens + tokens > self.config.max_tokens {
                    push_sentences(&mut buffer, paragraph, out);
                } else {
                    buffer.push(paragraph, tokens, PARAGRAPH_SEP, out);
                }
                continue;
            }

            // A lone header or short lead-in stays attached to the sentences
            if buffer.fresh_tokens() >= self.config.min_tokens {
                buffer.flush(out);
            }

            push_sentences(&mut buffer, paragraph, out);
        }

        buffer.finish(out);
    }
}

fn push_sentences<'a>(
    buffer: &mut ChunkBuffer<'a>,
    paragraph: &'a str,
    out: &mut Vec<SplitChunk>,
) {
    for (i, sentence) in sentences(paragraph).into_iter().enumerate() {
        let sep = if i == 0 { PARAGRAPH_SEP } else { SENTENCE_SEP };
        buffer.push(sentence, count_tokens(sentence), sep, out);
    }
}

#[derive(Debug, Clone, Copy)]
struct Piece<'a> {
    text: &'a str,
    tokens: usize,
    /// Separator placed before this piece when it is not the first
    sep: &'static str,
}

/// Running chunk buffer for one section
///
/// The first `seeded` pieces are overlap carried from the last flush and do
/// not count as new content.
struct ChunkBuffer<'a> {
    heading: &'a str,
    config: SplitterConfig,
    pieces: Vec<Piece<'a>>,
    tokens: usize,
    seeded: usize,
    seeded_tokens: usize,
    emitted: usize,
}

impl<'a> ChunkBuffer<'a> {
    fn new(heading: &'a str, config: SplitterConfig) -> Self {
        Self {
            heading,
            config,
            pieces: Vec::new(),
            tokens: 0,
            seeded: 0,
            seeded_tokens: 0,
            emitted: 0,
        }
    }

    fn fresh_tokens(&self) -> usize {
        self.tokens - self.seeded_tokens
    }

    fn has_fresh(&self) -> bool {
        self.pieces.len() > self.seeded
    }

    /// New content is waiting but the chunk would be under `min_tokens`
    fn is_undersized(&self) -> bool {
        self.has_fresh() && self.tokens < self.config.min_tokens
    }

    fn push(
        &mut self,
        text: &'a str,
        tokens: usize,
        sep: &'static str,
        out: &mut Vec<SplitChunk>,
    ) {
        if !self.pieces.is_empty() && self.tokens + tokens > self.config.max_tokens {
            self.flush(out);

            // Overlap is best-effort: drop it when it would not leave room
            if !self.pieces.is_empty() && self.tokens + tokens > self.config.max_tokens {
                self.clear();
            }
        }

        self.pieces.push(Piece { text, tokens, sep });
        self.tokens += tokens;
    }

    /// Emit the buffer as a chunk and seed the next one with its tail
    ///
    /// An undersized buffer is folded into this section's previous chunk
    /// instead when that chunk has room.
    fn flush(&mut self, out: &mut Vec<SplitChunk>) {
        if !self.has_fresh() {
            self.clear();
            return;
        }

        if !self.fold_into_previous(out) {
            out.push(SplitChunk {
                heading: self.heading.to_string(),
                text: render(&self.pieces),
                token_count: self.tokens,
            });
            self.emitted += 1;
        }

        let seed = self.overlap_seed();
        self.seeded = seed.len();
        self.seeded_tokens = seed.iter().map(|p| p.tokens).sum();
        self.tokens = self.seeded_tokens;
        self.pieces = seed;
    }

    /// Emit whatever is left, folding a short tail into the previous chunk
    fn finish(mut self, out: &mut Vec<SplitChunk>) {
        if self.has_fresh() {
            self.flush(out);
        }
    }

    /// Append the new content to the previous chunk of this section
    ///
    /// The seeded pieces already end that chunk, so only fresh pieces move.
    fn fold_into_previous(&self, out: &mut [SplitChunk]) -> bool {
        if self.emitted == 0 || !self.is_undersized() {
            return false;
        }

        let fresh_tokens = self.fresh_tokens();
        let Some(prev) = out.last_mut() else {
            return false;
        };
        if prev.token_count + fresh_tokens > self.config.max_tokens {
            return false;
        }

        let fresh = &self.pieces[self.seeded..];
        prev.text.push_str(fresh[0].sep);
        prev.text.push_str(&render(fresh));
        prev.token_count += fresh_tokens;
        true
    }

    /// Trailing sentences of the buffer that fit within `overlap_tokens`
    fn overlap_seed(&self) -> Vec<Piece<'a>> {
        let budget = self.config.overlap_tokens;
        let mut seed = Vec::new();
        let mut used = 0;

        'pieces: for piece in self.pieces.iter().rev() {
            let spans = sentences(piece.text);
            for (i, span) in spans.iter().enumerate().rev() {
                let tokens = count_tokens(span);
                if used + tokens > budget {
                    break 'pieces;
                }
                used += tokens;
                let sep = if i == 0 { piece.sep } else { SENTENCE_SEP };
                seed.push(Piece {
                    text: *span,
                    tokens,
                    sep,
                });
            }
        }

        // Repeating the entire chunk adds nothing
        if used >= self.tokens {
            return Vec::new();
        }

        seed.reverse();
        seed
    }

    fn clear(&mut self) {
        self.pieces.clear();
        self.tokens = 0;
        self.seeded = 0;
        self.seeded_tokens = 0;
    }
}

fn render(pieces: &[Piece<'_>]) -> String {
    let mut text = String::new();
    for (i, piece) in pieces.iter().enumerate() {
        if i > 0 {
            text.push_str(piece.sep);
        }
        text.push_str(piece.text);
    }
    text
}

struct Section {
    heading: String,
    body: String,
}

/// Split text on markdown-style header lines
///
/// The header line stays in its section's body so no content is lost.
/// Lines inside fenced code blocks are never treated as headers.
fn split_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut heading = String::new();
    let mut body = String::new();
    let mut in_fence = false;

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }

        if !in_fence {
            if let Some(title) = parse_header(line) {
                if !body.trim().is_empty() {
                    sections.push(Section {
                        heading: heading.clone(),
                        body: std::mem::take(&mut body),
                    });
                }
                body.clear();
                heading = title.to_string();
            }
        }

        body.push_str(line);
        body.push('\n');
    }

    if !body.trim().is_empty() {
        sections.push(Section { heading, body });
    }

    sections
}

/// Parse `#`..`######` followed by whitespace and a title
fn parse_header(line: &str) -> Option<&str> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }

    let rest = &line[indent..];
    let level = rest.len() - rest.trim_start_matches('#').len();
    if level == 0 || level > 6 {
        return None;
    }

    let after = &rest[level..];
    if !after.starts_with(|c: char| c.is_whitespace()) {
        return None;
    }

    let title = after.trim().trim_end_matches('#').trim_end();
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

/// Blank-line delimited paragraphs, trimmed
fn paragraphs(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    let mut end = 0;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        if line.trim().is_empty() {
            if let Some(s) = start.take() {
                out.push(text[s..end].trim());
            }
        } else {
            start.get_or_insert(line_start);
            end = offset;
        }
    }

    if let Some(s) = start {
        out.push(text[s..end].trim());
    }

    out
}

/// Sentences ending in `.`, `!` or `?` followed by whitespace
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let Some(&(_, next)) = chars.peek() else {
            break;
        };
        if next.is_whitespace() {
            let end = i + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            start = end;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }

    out
}
