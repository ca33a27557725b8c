//! Per-URI document state with full and incremental synchronisation.
//!
//! Positions follow the LSP convention of 0-based line and character;
//! characters index Unicode scalars within the line. Applying a sequence
//! of ranged splices in notification order is equivalent to one full
//! replace with the final text, which is what the incremental-sync
//! equivalence test pins down.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Document {
    pub uri: String,
    pub language_id: String,
    pub version: i64,
    pub content: String,
}

/// One incremental splice: the range is replaced with `text`. A change
/// without a range is a full replace.
#[derive(Debug, Clone)]
pub struct TextChange {
    pub start_line: u32,
    pub start_character: u32,
    pub end_line: u32,
    pub end_character: u32,
    pub text: String,
}

/// Byte offset of (line, character) in `content`, clamping past-the-end
/// positions the way the protocol expects.
fn offset_of(content: &str, line: u32, character: u32) -> usize {
    let mut current_line = 0u32;
    let mut offset = 0usize;
    if line > 0 {
        for (index, byte) in content.bytes().enumerate() {
            if byte == b'\n' {
                current_line += 1;
                if current_line == line {
                    offset = index + 1;
                    break;
                }
            }
        }
        if current_line < line {
            return content.len();
        }
    }
    let rest = &content[offset..];
    let mut chars = 0u32;
    for (index, ch) in rest.char_indices() {
        if chars == character || ch == '\n' {
            return offset + index;
        }
        chars += 1;
    }
    content.len()
}

#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: HashMap<String, Document>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, uri: &str, language_id: &str, version: i64, content: &str) {
        self.documents.insert(
            uri.to_string(),
            Document {
                uri: uri.to_string(),
                language_id: language_id.to_string(),
                version,
                content: content.to_string(),
            },
        );
    }

    pub fn close(&mut self, uri: &str) -> bool {
        self.documents.remove(uri).is_some()
    }

    pub fn get(&self, uri: &str) -> Option<&Document> {
        self.documents.get(uri)
    }

    pub fn content(&self, uri: &str) -> Option<&str> {
        self.get(uri).map(|doc| doc.content.as_str())
    }

    pub fn version(&self, uri: &str) -> Option<i64> {
        self.get(uri).map(|doc| doc.version)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Full-content replacement.
    pub fn change_full(&mut self, uri: &str, version: i64, content: &str) -> bool {
        let Some(doc) = self.documents.get_mut(uri) else {
            return false;
        };
        doc.content = content.to_string();
        doc.version = version;
        true
    }

    /// Ranged splices, applied in order.
    pub fn change_incremental(&mut self, uri: &str, version: i64, changes: &[TextChange]) -> bool {
        let Some(doc) = self.documents.get_mut(uri) else {
            return false;
        };
        for change in changes {
            let start = offset_of(&doc.content, change.start_line, change.start_character);
            let end = offset_of(&doc.content, change.end_line, change.end_character);
            let (start, end) = (start.min(end), start.max(end));
            doc.content.replace_range(start..end, &change.text);
        }
        doc.version = version;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splice(
        start: (u32, u32),
        end: (u32, u32),
        text: &str,
    ) -> TextChange {
        TextChange {
            start_line: start.0,
            start_character: start.1,
            end_line: end.0,
            end_character: end.1,
            text: text.to_string(),
        }
    }

    #[test]
    fn open_change_close_lifecycle() {
        let mut store = DocumentStore::new();
        store.open("file:///a.es", "esharp", 1, "one");
        assert_eq!(store.content("file:///a.es"), Some("one"));
        assert!(store.change_full("file:///a.es", 2, "two"));
        assert_eq!(store.version("file:///a.es"), Some(2));
        assert!(store.close("file:///a.es"));
        assert!(store.is_empty());
    }

    #[test]
    fn incremental_splice_replaces_range() {
        let mut store = DocumentStore::new();
        store.open("u", "esharp", 1, "hello world\nsecond line\n");
        store.change_incremental("u", 2, &[splice((0, 6), (0, 11), "there")]);
        assert_eq!(store.content("u"), Some("hello there\nsecond line\n"));
    }

    #[test]
    fn insertion_is_an_empty_range_splice() {
        let mut store = DocumentStore::new();
        store.open("u", "esharp", 1, "ab\ncd\n");
        store.change_incremental("u", 2, &[splice((1, 1), (1, 1), "X")]);
        assert_eq!(store.content("u"), Some("ab\ncXd\n"));
    }

    #[test]
    fn multi_line_deletion() {
        let mut store = DocumentStore::new();
        store.open("u", "esharp", 1, "aaa\nbbb\nccc\n");
        store.change_incremental("u", 2, &[splice((0, 1), (2, 1), "")]);
        assert_eq!(store.content("u"), Some("acc\n"));
    }

    #[test]
    fn splice_sequence_equals_full_replace() {
        let initial = "int32 main() {\n    return 0;\n}\n";
        let mut incremental = DocumentStore::new();
        incremental.open("u", "esharp", 1, initial);

        // Rename `main` and change the return value in three splices.
        let edits = [
            splice((0, 6), (0, 10), "start"),
            splice((1, 11), (1, 12), "42"),
            splice((2, 1), (2, 1), "\n"),
        ];
        incremental.change_incremental("u", 2, &edits);

        let mut full = DocumentStore::new();
        full.open("u", "esharp", 1, initial);
        full.change_full("u", 2, "int32 start() {\n    return 42;\n}\n\n");

        assert_eq!(incremental.content("u"), full.content("u"));
    }

    #[test]
    fn positions_past_the_end_clamp() {
        let mut store = DocumentStore::new();
        store.open("u", "esharp", 1, "short\n");
        store.change_incremental("u", 2, &[splice((0, 50), (9, 0), "!")]);
        assert_eq!(store.content("u"), Some("short!"));
    }
}
