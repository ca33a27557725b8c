//! Protocol-level scenarios driven through the server's message handler.

use serde_json::{Value, json};

use esc_lsp::server::ServerState;
use esc_lsp::{LspServer, transport};

fn send(server: &mut LspServer, payload: Value) -> Vec<Value> {
    server
        .handle_content(&payload.to_string())
        .messages
        .iter()
        .map(|m| serde_json::from_str(m).unwrap())
        .collect()
}

fn initialize(server: &mut LspServer) -> Vec<Value> {
    let out = send(
        server,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": { "rootUri": "file:///tmp", "processId": 77 },
        }),
    );
    send(server, json!({ "jsonrpc": "2.0", "method": "initialized" }));
    out
}

#[test]
fn initialize_advertises_incremental_sync() {
    let mut server = LspServer::new();
    let responses = initialize(&mut server);
    assert_eq!(responses.len(), 1);
    let caps = &responses[0]["result"]["capabilities"];
    assert_eq!(caps["textDocumentSync"]["change"], json!(2));
    assert_eq!(
        caps["completionProvider"]["triggerCharacters"],
        json!([".", "::"])
    );
    assert_eq!(
        caps["signatureHelpProvider"]["triggerCharacters"],
        json!(["(", ","])
    );
    assert_eq!(
        caps["documentOnTypeFormattingProvider"]["firstTriggerCharacter"],
        json!(";")
    );
    assert_eq!(server.state(), ServerState::Initialized);
}

#[test]
fn requests_before_initialize_are_rejected() {
    let mut server = LspServer::new();
    let responses = send(
        &mut server,
        json!({ "jsonrpc": "2.0", "id": 5, "method": "textDocument/hover", "params": {} }),
    );
    assert_eq!(responses[0]["error"]["code"], json!(-32002));
}

#[test]
fn unknown_method_is_method_not_found() {
    let mut server = LspServer::new();
    initialize(&mut server);
    let responses = send(
        &mut server,
        json!({ "jsonrpc": "2.0", "id": 9, "method": "workspace/nonsense", "params": {} }),
    );
    assert_eq!(responses[0]["error"]["code"], json!(-32601));
}

#[test]
fn did_open_publishes_diagnostics_for_same_uri() {
    let mut server = LspServer::new();
    initialize(&mut server);
    let out = send(
        &mut server,
        json!({
            "jsonrpc": "2.0",
            "method": "textDocument/didOpen",
            "params": { "textDocument": {
                "uri": "file:///tmp/main.es",
                "languageId": "esharp",
                "version": 1,
                "text": "int32 main() { return 0; }",
            }},
        }),
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0]["method"], json!("textDocument/publishDiagnostics"));
    assert_eq!(out[0]["params"]["uri"], json!("file:///tmp/main.es"));
    assert_eq!(out[0]["params"]["diagnostics"], json!([]));
}

#[test]
fn broken_source_produces_error_diagnostics() {
    let mut server = LspServer::new();
    initialize(&mut server);
    let out = send(
        &mut server,
        json!({
            "jsonrpc": "2.0",
            "method": "textDocument/didOpen",
            "params": { "textDocument": {
                "uri": "file:///tmp/bad.es",
                "languageId": "esharp",
                "version": 1,
                "text": "void main() { var x = missing; }",
            }},
        }),
    );
    let diagnostics = out[0]["params"]["diagnostics"].as_array().unwrap();
    assert!(!diagnostics.is_empty());
    assert!(diagnostics[0]["message"]
        .as_str()
        .unwrap()
        .contains("missing"));
}

#[test]
fn incremental_change_republishes_with_new_version() {
    let mut server = LspServer::new();
    initialize(&mut server);
    send(
        &mut server,
        json!({
            "jsonrpc": "2.0",
            "method": "textDocument/didOpen",
            "params": { "textDocument": {
                "uri": "file:///tmp/x.es",
                "languageId": "esharp",
                "version": 1,
                "text": "int32 main() { return 0; }",
            }},
        }),
    );
    // Replace `0` with `oops` via a ranged splice: now a semantic error.
    let out = send(
        &mut server,
        json!({
            "jsonrpc": "2.0",
            "method": "textDocument/didChange",
            "params": {
                "textDocument": { "uri": "file:///tmp/x.es", "version": 2 },
                "contentChanges": [{
                    "range": {
                        "start": { "line": 0, "character": 22 },
                        "end": { "line": 0, "character": 23 },
                    },
                    "text": "oops",
                }],
            },
        }),
    );
    assert_eq!(out[0]["params"]["version"], json!(2));
    let diagnostics = out[0]["params"]["diagnostics"].as_array().unwrap();
    assert!(!diagnostics.is_empty());
    assert_eq!(
        server.documents().content("file:///tmp/x.es"),
        Some("int32 main() { return oops; }")
    );
}

#[test]
fn shutdown_then_exit_is_clean_exit() {
    let mut server = LspServer::new();
    initialize(&mut server);
    let responses = send(
        &mut server,
        json!({ "jsonrpc": "2.0", "id": 2, "method": "shutdown" }),
    );
    assert_eq!(responses[0]["result"], Value::Null);
    assert_eq!(server.state(), ServerState::Shutdown);
    send(&mut server, json!({ "jsonrpc": "2.0", "method": "exit" }));
    assert_eq!(server.exit_code(), 0);
}

#[test]
fn exit_without_shutdown_is_code_one() {
    let mut server = LspServer::new();
    initialize(&mut server);
    send(&mut server, json!({ "jsonrpc": "2.0", "method": "exit" }));
    assert_eq!(server.exit_code(), 1);
}

#[test]
fn full_loop_over_framed_streams() {
    let mut wire = Vec::new();
    transport::write_message(
        &mut wire,
        &json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": { "rootUri": "file:///tmp" },
        })
        .to_string(),
    )
    .unwrap();
    transport::write_message(&mut wire, &json!({ "jsonrpc": "2.0", "method": "exit" }).to_string())
        .unwrap();

    let mut server = LspServer::new();
    let mut input = std::io::BufReader::new(wire.as_slice());
    let mut output = Vec::new();
    let exit_code = server.run(&mut input, &mut output).unwrap();
    // Exit before shutdown: code 1; the initialize response was framed.
    assert_eq!(exit_code, 1);
    let text = String::from_utf8(output).unwrap();
    assert!(text.starts_with("Content-Length:"));
    assert!(text.contains("\"textDocumentSync\""));
}

#[test]
fn document_symbols_and_hover_round_trip() {
    let mut server = LspServer::new();
    initialize(&mut server);
    send(
        &mut server,
        json!({
            "jsonrpc": "2.0",
            "method": "textDocument/didOpen",
            "params": { "textDocument": {
                "uri": "file:///tmp/sym.es",
                "languageId": "esharp",
                "version": 1,
                "text": "int32 add(int32 a, int32 b) { return a + b; }\nint32 main() { return add(1, 2); }",
            }},
        }),
    );

    let symbols = send(
        &mut server,
        json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "textDocument/documentSymbol",
            "params": { "textDocument": { "uri": "file:///tmp/sym.es" } },
        }),
    );
    let list = symbols[0]["result"].as_array().unwrap();
    let names: Vec<&str> = list.iter().map(|s| s["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["add", "main"]);

    let hover = send(
        &mut server,
        json!({
            "jsonrpc": "2.0",
            "id": 4,
            "method": "textDocument/hover",
            "params": {
                "textDocument": { "uri": "file:///tmp/sym.es" },
                "position": { "line": 1, "character": 24 },
            },
        }),
    );
    assert!(hover[0]["result"]["contents"]["value"]
        .as_str()
        .unwrap()
        .contains("int32 add"));
}
