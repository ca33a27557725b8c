//! Bridges the E# front-end to LSP feature payloads: diagnostics,
//! completion, hover, definition, document symbols, signature help and
//! the three formatting flavours.

use serde_json::{Value, json};

use esc_front::parser::Parser;
use esc_front::semantic::{
    Analyzer, BUILTIN_FUNCTIONS, Severity, SymbolInfo, SymbolKind,
};
use esc_front::typecheck::TypeChecker;

/// Everything one analysis pass produces for a document.
#[derive(Debug, Default)]
pub struct DocumentAnalysis {
    pub diagnostics: Vec<Value>,
    pub outline: Vec<SymbolInfo>,
    pub functions: Vec<esc_front::semantic::FunctionSig>,
}

fn lsp_range(line: u32, col: u32) -> Value {
    // The front-end is line-precise; ranges cover the whole line from
    // the reported column.
    let line = line.saturating_sub(1);
    let col = col.saturating_sub(1);
    json!({
        "start": { "line": line, "character": col },
        "end": { "line": line, "character": col + 80 },
    })
}

fn severity_code(severity: Severity) -> i64 {
    match severity {
        Severity::Error => 1,
        Severity::Warning => 2,
    }
}

/// Parse + analyse + type-check a document.
pub fn analyze(content: &str) -> DocumentAnalysis {
    let mut analysis = DocumentAnalysis::default();
    match Parser::new(content).parse() {
        Ok(program) => {
            let semantic = Analyzer::new().analyze(&program);
            for diag in &semantic.diagnostics {
                analysis.diagnostics.push(json!({
                    "range": lsp_range(diag.line, diag.col),
                    "severity": severity_code(diag.severity),
                    "source": "esc",
                    "message": diag.message,
                }));
            }
            for diag in TypeChecker::new().check(&program) {
                analysis.diagnostics.push(json!({
                    "range": lsp_range(diag.line, diag.col),
                    "severity": severity_code(diag.severity),
                    "source": "esc",
                    "message": diag.message,
                }));
            }
            analysis.outline = semantic.outline;
            analysis.functions = semantic.functions;
        }
        Err(errors) => {
            for err in errors {
                analysis.diagnostics.push(json!({
                    "range": lsp_range(err.line, err.col),
                    "severity": 1,
                    "source": "esc",
                    "message": err.message,
                }));
            }
        }
    }
    analysis
}

const KEYWORD_COMPLETIONS: &[&str] = &[
    "class", "if", "else", "while", "return", "var", "new", "true", "false", "null", "void",
    "int8", "int16", "int32", "int64", "uint8", "uint16", "uint32", "uint64", "float32",
    "float64", "bool", "char", "string",
];

/// Completion items: keywords, builtins, then document symbols.
pub fn completions(analysis: &DocumentAnalysis) -> Value {
    let mut items: Vec<Value> = Vec::new();
    for keyword in KEYWORD_COMPLETIONS {
        items.push(json!({ "label": keyword, "kind": 14 }));
    }
    for (name, _, _) in BUILTIN_FUNCTIONS {
        items.push(json!({ "label": name, "kind": 3 }));
    }
    for symbol in &analysis.outline {
        let kind = match symbol.kind {
            SymbolKind::Function | SymbolKind::Method => 3,
            SymbolKind::Class | SymbolKind::Type => 7,
            _ => 6,
        };
        items.push(json!({ "label": symbol.name, "kind": kind }));
    }
    json!(items)
}

/// The identifier under (line, character), both 0-based.
pub fn word_at(content: &str, line: u32, character: u32) -> Option<String> {
    let text = content.lines().nth(line as usize)?;
    let chars: Vec<char> = text.chars().collect();
    let mut index = (character as usize).min(chars.len());
    if index == chars.len() || !is_word(chars.get(index).copied()?) {
        index = index.checked_sub(1)?;
    }
    if !is_word(chars[index]) {
        return None;
    }
    let mut start = index;
    while start > 0 && is_word(chars[start - 1]) {
        start -= 1;
    }
    let mut end = index;
    while end + 1 < chars.len() && is_word(chars[end + 1]) {
        end += 1;
    }
    Some(chars[start..=end].iter().collect())
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Hover: the declared signature of the symbol under the cursor.
pub fn hover(analysis: &DocumentAnalysis, content: &str, line: u32, character: u32) -> Value {
    let Some(word) = word_at(content, line, character) else {
        return Value::Null;
    };
    if let Some(sig) = analysis.functions.iter().find(|sig| sig.name == word) {
        let params = sig
            .params
            .iter()
            .map(|(name, ty)| format!("{ty} {name}"))
            .collect::<Vec<_>>()
            .join(", ");
        return json!({
            "contents": {
                "kind": "markdown",
                "value": format!("```esharp\n{} {}({})\n```", sig.ret, sig.name, params),
            }
        });
    }
    if let Some(symbol) = analysis.outline.iter().find(|s| s.name == word) {
        return json!({
            "contents": {
                "kind": "markdown",
                "value": format!("`{}` ({:?})", symbol.name, symbol.kind),
            }
        });
    }
    Value::Null
}

/// Go-to-definition: the declaration line of the symbol under the
/// cursor, within the same document.
pub fn definition(
    analysis: &DocumentAnalysis,
    uri: &str,
    content: &str,
    line: u32,
    character: u32,
) -> Value {
    let Some(word) = word_at(content, line, character) else {
        return Value::Null;
    };
    let Some(symbol) = analysis
        .outline
        .iter()
        .find(|s| s.name == word || s.name.ends_with(&format!(".{word}")))
    else {
        return Value::Null;
    };
    let def_line = symbol.line.saturating_sub(1);
    json!({
        "uri": uri,
        "range": {
            "start": { "line": def_line, "character": 0 },
            "end": { "line": def_line, "character": 80 },
        }
    })
}

/// documentSymbol: flat symbol list with locations.
pub fn document_symbols(analysis: &DocumentAnalysis, uri: &str) -> Value {
    let symbols: Vec<Value> = analysis
        .outline
        .iter()
        .map(|symbol| {
            let kind = match symbol.kind {
                SymbolKind::Function => 12,
                SymbolKind::Method => 6,
                SymbolKind::Class => 5,
                SymbolKind::Type => 26,
                SymbolKind::Field => 8,
                _ => 13,
            };
            let line = symbol.line.saturating_sub(1);
            json!({
                "name": symbol.name,
                "kind": kind,
                "location": {
                    "uri": uri,
                    "range": {
                        "start": { "line": line, "character": 0 },
                        "end": { "line": line, "character": 80 },
                    }
                }
            })
        })
        .collect();
    json!(symbols)
}

/// signatureHelp for the innermost call at the cursor: scan left for the
/// callee name and count commas for the active parameter.
pub fn signature_help(
    analysis: &DocumentAnalysis,
    content: &str,
    line: u32,
    character: u32,
) -> Value {
    let Some(text) = content.lines().nth(line as usize) else {
        return Value::Null;
    };
    let upto: String = text.chars().take(character as usize).collect();
    let mut depth = 0i32;
    let mut active_param = 0u32;
    let mut call_start = None;
    for (index, ch) in upto.char_indices().rev() {
        match ch {
            ')' => depth += 1,
            '(' if depth > 0 => depth -= 1,
            '(' => {
                call_start = Some(index);
                break;
            }
            ',' if depth == 0 => active_param += 1,
            _ => {}
        }
    }
    let Some(call_start) = call_start else {
        return Value::Null;
    };
    let callee: String = upto[..call_start]
        .chars()
        .rev()
        .take_while(|&c| is_word(c) || c == '.')
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let builtin_sig = BUILTIN_FUNCTIONS
        .iter()
        .find(|(name, _, _)| *name == callee)
        .map(|(name, params, ret)| {
            let rendered = params
                .iter()
                .enumerate()
                .map(|(i, ty)| format!("{ty} arg{i}"))
                .collect::<Vec<_>>();
            (format!("{ret} {name}({})", rendered.join(", ")), rendered)
        });
    let user_sig = analysis
        .functions
        .iter()
        .find(|sig| sig.name == callee)
        .map(|sig| {
            let rendered = sig
                .params
                .iter()
                .map(|(name, ty)| format!("{ty} {name}"))
                .collect::<Vec<_>>();
            (
                format!("{} {}({})", sig.ret, sig.name, rendered.join(", ")),
                rendered,
            )
        });
    let Some((label, params)) = builtin_sig.or(user_sig) else {
        return Value::Null;
    };
    json!({
        "signatures": [{
            "label": label,
            "parameters": params.iter().map(|p| json!({ "label": p })).collect::<Vec<_>>(),
        }],
        "activeSignature": 0,
        "activeParameter": active_param,
    })
}

/// Whole-document re-indent by brace depth, four spaces per level.
pub fn format_document(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut depth = 0usize;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            out.push('\n');
            continue;
        }
        let dedent = trimmed.starts_with('}');
        let level = if dedent { depth.saturating_sub(1) } else { depth };
        out.push_str(&"    ".repeat(level));
        out.push_str(trimmed);
        out.push('\n');
        depth = depth
            .saturating_sub(trimmed.matches('}').count())
            .saturating_add(trimmed.matches('{').count());
    }
    out
}

/// Range formatting: re-indent only lines within [start_line, end_line],
/// keeping everything else byte-identical.
pub fn format_range(content: &str, start_line: u32, end_line: u32) -> String {
    let formatted = format_document(content);
    let original: Vec<&str> = content.lines().collect();
    let replacement: Vec<&str> = formatted.lines().collect();
    let mut out = String::with_capacity(content.len());
    for (index, line) in original.iter().enumerate() {
        let in_range = (index as u32) >= start_line && (index as u32) <= end_line;
        let text = if in_range {
            replacement.get(index).copied().unwrap_or(line)
        } else {
            line
        };
        out.push_str(text);
        out.push('\n');
    }
    out
}

/// On-type formatting after `;` or `}`: re-indent the line just typed.
pub fn format_on_type(content: &str, line: u32) -> String {
    format_range(content, line, line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_source_has_no_diagnostics() {
        let analysis = analyze("int32 main() { return 0; }");
        assert!(analysis.diagnostics.is_empty());
        assert_eq!(analysis.outline.len(), 1);
    }

    #[test]
    fn syntax_error_produces_diagnostics() {
        let analysis = analyze("int32 main( {");
        assert!(!analysis.diagnostics.is_empty());
        assert_eq!(analysis.diagnostics[0]["severity"], 1);
    }

    #[test]
    fn word_extraction_handles_boundaries() {
        let content = "int32 main() { return total; }";
        assert_eq!(word_at(content, 0, 7), Some("main".to_string()));
        assert_eq!(word_at(content, 0, 17), Some("return".to_string()));
        assert_eq!(word_at(content, 0, 24), Some("total".to_string()));
        assert_eq!(word_at(content, 0, 13), None);
    }

    #[test]
    fn hover_shows_function_signature() {
        let analysis = analyze("int32 add(int32 a, int32 b) { return a + b; }");
        let hover = hover(&analysis, "int32 add(int32 a, int32 b) { return a + b; }", 0, 7);
        assert!(hover["contents"]["value"]
            .as_str()
            .unwrap()
            .contains("int32 add(int32 a, int32 b)"));
    }

    #[test]
    fn signature_help_counts_active_parameter() {
        let source = "int32 add(int32 a, int32 b) { return a + b; }\nvoid m() { add(1, }";
        let analysis = analyze(source);
        let help = signature_help(&analysis, source, 1, 18);
        assert_eq!(help["activeParameter"], 1);
        assert!(help["signatures"][0]["label"]
            .as_str()
            .unwrap()
            .starts_with("int32 add"));
    }

    #[test]
    fn formatting_normalises_indentation() {
        let source = "int32 main() {\nreturn 0;\n}\n";
        let formatted = format_document(source);
        assert_eq!(formatted, "int32 main() {\n    return 0;\n}\n");
    }

    #[test]
    fn range_formatting_leaves_other_lines_alone() {
        let source = "int32 main() {\nreturn 0;\n}\nint32 x() {\nreturn 1;\n}\n";
        let formatted = format_range(source, 1, 1);
        assert!(formatted.contains("    return 0;"));
        assert!(formatted.contains("\nreturn 1;"));
    }
}
