//! Splits entry text into bounded-size retrievable chunks.

/// Default chunk budget in characters. Matches the indexing side of the
/// embedding model's comfortable input size.
pub const MAX_CHUNK_CHARS: usize = 500;

/// Split `text` on line boundaries into paragraphs (empty lines dropped),
/// then greedily pack paragraphs into chunks of at most `max_size` chars,
/// joined by single spaces.
///
/// A single paragraph longer than `max_size` is NOT split further — it
/// becomes one oversized chunk. Splitting mid-sentence would hurt retrieval
/// more than an occasional long chunk does.
pub fn chunk(text: &str, max_size: usize) -> Vec<String> {
    let paragraphs: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let mut chunks = Vec::new();
    let mut current = String::new();

    for p in paragraphs {
        if current.is_empty() {
            current.push_str(p);
        } else if current.chars().count() + 1 + p.chars().count() <= max_size {
            current.push(' ');
            current.push_str(p);
        } else {
            chunks.push(std::mem::take(&mut current));
            current.push_str(p);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}
