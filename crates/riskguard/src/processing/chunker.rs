use std::collections::HashMap;
use uuid::Uuid;

/// One heading-delimited section of a markdown document.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkResult {
    pub id: Uuid,
    pub text: String,
    pub index: usize,
    /// `Header 1`..`Header N` for the active heading path.
    pub headers: HashMap<String, String>,
}

impl ChunkResult {
    /// Deepest active heading, used as the chunk title.
    pub fn heading(&self) -> Option<&str> {
        (1..=6)
            .rev()
            .find_map(|level| self.headers.get(&header_key(level)))
            .map(String::as_str)
    }
}

pub fn header_key(level: usize) -> String {
    format!("Header {}", level)
}

/// Splits markdown on ATX headings up to `max_level` (`#`, `##`, `###` by default).
/// Heading lines are dropped from chunk text; lines inside fenced code blocks
/// are never treated as headings.
pub struct MarkdownHeaderSplitter {
    max_level: usize,
}

impl Default for MarkdownHeaderSplitter {
    fn default() -> Self {
        Self { max_level: 3 }
    }
}

impl MarkdownHeaderSplitter {
    pub fn new(max_level: usize) -> Self {
        Self {
            max_level: max_level.clamp(1, 6),
        }
    }

    pub fn split(&self, text: &str) -> Vec<ChunkResult> {
        let mut chunks = Vec::new();
        let mut active: Vec<(usize, String)> = Vec::new();
        let mut buffer: Vec<&str> = Vec::new();
        let mut fence: Option<&str> = None;

        for line in text.lines() {
            let trimmed = line.trim_start();

            if let Some(marker) = fence {
                if trimmed.starts_with(marker) {
                    fence = None;
                }
                buffer.push(line);
                continue;
            }
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                fence = Some(&trimmed[..3]);
                buffer.push(line);
                continue;
            }

            if let Some((level, title)) = self.parse_heading(trimmed) {
                Self::flush(&mut buffer, &active, &mut chunks);
                active.retain(|(l, _)| *l < level);
                active.push((level, title));
                continue;
            }
            buffer.push(line);
        }
        Self::flush(&mut buffer, &active, &mut chunks);
        chunks
    }

    fn parse_heading(&self, line: &str) -> Option<(usize, String)> {
        let level = line.chars().take_while(|c| *c == '#').count();
        if level == 0 || level > self.max_level {
            return None;
        }
        let rest = &line[level..];
        // `#tag` is text, not a heading
        if !(rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\t')) {
            return None;
        }
        let title = rest.trim().trim_end_matches('#').trim();
        Some((level, title.to_string()))
    }

    fn flush(buffer: &mut Vec<&str>, active: &[(usize, String)], chunks: &mut Vec<ChunkResult>) {
        let text = buffer.join("\n").trim().to_string();
        buffer.clear();
        if text.is_empty() {
            return;
        }
        let headers = active
            .iter()
            .map(|(level, title)| (header_key(*level), title.clone()))
            .collect();
        chunks.push(ChunkResult {
            id: Uuid::new_v4(),
            text,
            index: chunks.len(),
            headers,
        });
    }
}
