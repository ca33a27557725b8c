//! Source preprocessing: identifier-boundary macro replacement.
//!
//! The standard table maps the surface print helpers onto the runtime
//! names the later stages know (`println` becomes `Console.WriteLine` and
//! so on); callers append their own macros before processing. Replacement
//! happens only when the match is not embedded in a longer identifier,
//! so `printlnx` is left alone.

/// Standard macro table installed by the pipeline's preprocess stage.
pub const STANDARD_MACROS: &[(&str, &str)] = &[
    ("println_int", "Console.WriteLineInt"),
    ("println", "Console.WriteLine"),
    ("print_int", "Console.WriteInt"),
    ("print", "Console.Write"),
];

#[derive(Debug, Default)]
pub struct Preprocessor {
    macros: Vec<(String, String)>,
}

fn is_ident_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preprocessor with [`STANDARD_MACROS`] installed.
    pub fn with_standard_macros() -> Self {
        let mut pp = Self::new();
        for (name, replacement) in STANDARD_MACROS {
            pp.add_macro(name, replacement);
        }
        pp
    }

    /// Add or update a macro. Redefinition replaces the expansion.
    pub fn add_macro(&mut self, name: &str, replacement: &str) {
        if name.is_empty() {
            return;
        }
        if let Some(existing) = self.macros.iter_mut().find(|(n, _)| n == name) {
            existing.1 = replacement.to_string();
            return;
        }
        self.macros.push((name.to_string(), replacement.to_string()));
    }

    pub fn macro_count(&self) -> usize {
        self.macros.len()
    }

    /// Expand macros over a whole source text.
    pub fn process(&self, source: &str) -> String {
        let bytes = source.as_bytes();
        let mut out = String::with_capacity(source.len());
        let mut pos = 0usize;

        'outer: while pos < bytes.len() {
            // Only try at identifier starts not preceded by an
            // identifier character.
            let at_boundary = pos == 0 || !is_ident_char(bytes[pos - 1]);
            if at_boundary {
                for (name, replacement) in &self.macros {
                    let end = pos + name.len();
                    if source[pos..].starts_with(name.as_str())
                        && bytes.get(end).is_none_or(|&b| !is_ident_char(b))
                    {
                        out.push_str(replacement);
                        pos = end;
                        continue 'outer;
                    }
                }
            }
            // Advance one UTF-8 scalar.
            let char_len = source[pos..]
                .chars()
                .next()
                .map_or(1, char::len_utf8);
            out.push_str(&source[pos..pos + char_len]);
            pos += char_len;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_macros_rewrite_print_helpers() {
        let pp = Preprocessor::with_standard_macros();
        assert_eq!(
            pp.process("println(\"hi\"); print_int(3);"),
            "Console.WriteLine(\"hi\"); Console.WriteInt(3);"
        );
    }

    #[test]
    fn longer_names_win_over_prefixes() {
        let pp = Preprocessor::with_standard_macros();
        assert_eq!(pp.process("println_int(1);"), "Console.WriteLineInt(1);");
    }

    #[test]
    fn embedded_identifiers_are_untouched() {
        let pp = Preprocessor::with_standard_macros();
        assert_eq!(pp.process("myprintln(1); printlnx(2);"), "myprintln(1); printlnx(2);");
    }

    #[test]
    fn caller_macros_extend_the_table() {
        let mut pp = Preprocessor::with_standard_macros();
        pp.add_macro("DEBUG_LEVEL", "3");
        assert_eq!(pp.process("var level = DEBUG_LEVEL;"), "var level = 3;");
    }

    #[test]
    fn redefinition_replaces_expansion() {
        let mut pp = Preprocessor::new();
        pp.add_macro("X", "1");
        pp.add_macro("X", "2");
        assert_eq!(pp.process("X"), "2");
        assert_eq!(pp.macro_count(), 1);
    }
}
