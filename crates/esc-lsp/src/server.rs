//! Server state machine and method dispatch.
//!
//! States: Uninitialized -> Initializing -> Initialized -> Shutdown.
//! `initialize` is the only request accepted while Uninitialized; other
//! requests get `ServerNotInitialized`. `shutdown` without a following
//! `exit` terminates with exit code 1, `exit` after `shutdown` with 0.
//!
//! Dispatch is a static method table; a request for an unregistered
//! method yields `MethodNotFound`, unknown notifications are dropped.

use std::io::{BufRead, Write};

use serde_json::{Value, json};
use tracing::{debug, info};

use crate::analysis;
use crate::documents::{DocumentStore, TextChange};
use crate::error::LspError;
use crate::rpc::{self, Id, Incoming};
use crate::transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Uninitialized,
    Initializing,
    Initialized,
    Shutdown,
}

/// What one handled message produces: at most one response plus any
/// number of server-initiated notifications, already serialised.
#[derive(Debug, Default)]
pub struct Outgoing {
    pub messages: Vec<String>,
}

type Handler = fn(&mut LspServer, Option<&Id>, &Value, &mut Outgoing);

/// Static method table.
const HANDLERS: &[(&str, Handler)] = &[
    ("initialize", LspServer::on_initialize),
    ("initialized", LspServer::on_initialized),
    ("shutdown", LspServer::on_shutdown),
    ("exit", LspServer::on_exit),
    ("textDocument/didOpen", LspServer::on_did_open),
    ("textDocument/didChange", LspServer::on_did_change),
    ("textDocument/didClose", LspServer::on_did_close),
    ("textDocument/completion", LspServer::on_completion),
    ("textDocument/hover", LspServer::on_hover),
    ("textDocument/definition", LspServer::on_definition),
    ("textDocument/documentSymbol", LspServer::on_document_symbol),
    ("textDocument/signatureHelp", LspServer::on_signature_help),
    ("textDocument/formatting", LspServer::on_formatting),
    ("textDocument/rangeFormatting", LspServer::on_range_formatting),
    ("textDocument/onTypeFormatting", LspServer::on_on_type_formatting),
];

pub struct LspServer {
    pub name: String,
    pub version: String,
    state: ServerState,
    documents: DocumentStore,
    root_uri: Option<String>,
    running: bool,
    exit_code: i32,
}

impl Default for LspServer {
    fn default() -> Self {
        Self::new()
    }
}

impl LspServer {
    pub fn new() -> Self {
        Self {
            name: "E# Language Server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: ServerState::Uninitialized,
            documents: DocumentStore::new(),
            root_uri: None,
            running: false,
            exit_code: 1,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Advertised capability set.
    pub fn capabilities(&self) -> Value {
        json!({
            "textDocumentSync": {
                "openClose": true,
                "change": 2,
                "willSave": false,
                "willSaveWaitUntil": false,
            },
            "completionProvider": {
                "triggerCharacters": [".", "::"],
                "resolveProvider": false,
            },
            "hoverProvider": true,
            "definitionProvider": true,
            "documentSymbolProvider": true,
            "signatureHelpProvider": { "triggerCharacters": ["(", ","] },
            "documentFormattingProvider": true,
            "documentRangeFormattingProvider": true,
            "documentOnTypeFormattingProvider": {
                "firstTriggerCharacter": ";",
                "moreTriggerCharacter": ["}"],
            },
            "diagnosticProvider": {
                "interFileDependencies": true,
                "workspaceDiagnostics": false,
            },
        })
    }

    /// Blocking reader loop over framed streams; returns the exit code.
    pub fn run(&mut self, input: &mut impl BufRead, output: &mut impl Write) -> Result<i32, LspError> {
        self.running = true;
        info!(target: "lsp", "server loop started");
        while self.running {
            let Some(content) = transport::read_message(input)? else {
                debug!(target: "lsp", "eof on input");
                break;
            };
            let outgoing = self.handle_content(&content);
            for message in outgoing.messages {
                transport::write_message(output, &message)?;
            }
        }
        Ok(self.exit_code)
    }

    /// Handle one raw JSON payload; used by `run` and directly by tests.
    pub fn handle_content(&mut self, content: &str) -> Outgoing {
        let mut outgoing = Outgoing::default();
        let message = match Incoming::parse(content) {
            Ok(message) => message,
            Err(err) => {
                outgoing.messages.push(rpc::error_response(
                    None,
                    rpc::PARSE_ERROR,
                    &err.to_string(),
                ));
                return outgoing;
            }
        };
        self.dispatch(&message, &mut outgoing);
        outgoing
    }

    fn dispatch(&mut self, message: &Incoming, outgoing: &mut Outgoing) {
        let Some(method) = message.method.as_deref() else {
            if let Some(id) = &message.id {
                outgoing.messages.push(rpc::error_response(
                    Some(id),
                    rpc::INVALID_REQUEST,
                    "message has no method",
                ));
            }
            return;
        };

        // Uninitialized servers accept exactly one request.
        if self.state == ServerState::Uninitialized
            && message.is_request()
            && method != "initialize"
        {
            let id = message.id.as_ref().expect("requests carry an id");
            outgoing.messages.push(rpc::error_response(
                Some(id),
                rpc::SERVER_NOT_INITIALIZED,
                "Server not initialized",
            ));
            return;
        }

        match HANDLERS.iter().find(|(name, _)| *name == method) {
            Some((_, handler)) => handler(self, message.id.as_ref(), &message.params, outgoing),
            None => {
                debug!(target: "lsp", method, "unhandled method");
                if let Some(id) = &message.id {
                    outgoing.messages.push(rpc::error_response(
                        Some(id),
                        rpc::METHOD_NOT_FOUND,
                        "Method not found",
                    ));
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Lifecycle handlers
    // ---------------------------------------------------------------------

    fn on_initialize(&mut self, id: Option<&Id>, params: &Value, outgoing: &mut Outgoing) {
        let Some(id) = id else { return };
        if self.state != ServerState::Uninitialized {
            outgoing.messages.push(rpc::error_response(
                Some(id),
                rpc::INVALID_REQUEST,
                "initialize may only be sent once",
            ));
            return;
        }
        self.root_uri = params["rootUri"].as_str().map(str::to_string);
        self.state = ServerState::Initializing;
        info!(target: "lsp", root = self.root_uri.as_deref(), "initialize");
        outgoing.messages.push(rpc::response(
            id,
            json!({
                "capabilities": self.capabilities(),
                "serverInfo": { "name": self.name, "version": self.version },
            }),
        ));
    }

    fn on_initialized(&mut self, _id: Option<&Id>, _params: &Value, _outgoing: &mut Outgoing) {
        if self.state == ServerState::Initializing {
            self.state = ServerState::Initialized;
        }
    }

    fn on_shutdown(&mut self, id: Option<&Id>, _params: &Value, outgoing: &mut Outgoing) {
        self.state = ServerState::Shutdown;
        if let Some(id) = id {
            outgoing.messages.push(rpc::response(id, Value::Null));
        }
    }

    fn on_exit(&mut self, _id: Option<&Id>, _params: &Value, _outgoing: &mut Outgoing) {
        self.exit_code = if self.state == ServerState::Shutdown { 0 } else { 1 };
        self.running = false;
    }

    // ---------------------------------------------------------------------
    // Document synchronisation
    // ---------------------------------------------------------------------

    fn publish_diagnostics(&mut self, uri: &str, outgoing: &mut Outgoing) {
        let Some(content) = self.documents.content(uri) else {
            return;
        };
        let analysis = analysis::analyze(content);
        let version = self.documents.version(uri).unwrap_or(0);
        outgoing.messages.push(rpc::notification(
            "textDocument/publishDiagnostics",
            json!({
                "uri": uri,
                "version": version,
                "diagnostics": analysis.diagnostics,
            }),
        ));
    }

    fn on_did_open(&mut self, _id: Option<&Id>, params: &Value, outgoing: &mut Outgoing) {
        let doc = &params["textDocument"];
        let Some(uri) = doc["uri"].as_str() else { return };
        let language = doc["languageId"].as_str().unwrap_or("esharp");
        let version = doc["version"].as_i64().unwrap_or(0);
        let text = doc["text"].as_str().unwrap_or_default();
        self.documents.open(uri, language, version, text);
        let uri = uri.to_string();
        self.publish_diagnostics(&uri, outgoing);
    }

    fn on_did_change(&mut self, _id: Option<&Id>, params: &Value, outgoing: &mut Outgoing) {
        let Some(uri) = params["textDocument"]["uri"].as_str().map(str::to_string) else {
            return;
        };
        let version = params["textDocument"]["version"].as_i64().unwrap_or(0);
        let Some(changes) = params["contentChanges"].as_array() else {
            return;
        };
        for change in changes {
            match change.get("range") {
                Some(range) => {
                    let splice = TextChange {
                        start_line: range["start"]["line"].as_u64().unwrap_or(0) as u32,
                        start_character: range["start"]["character"].as_u64().unwrap_or(0) as u32,
                        end_line: range["end"]["line"].as_u64().unwrap_or(0) as u32,
                        end_character: range["end"]["character"].as_u64().unwrap_or(0) as u32,
                        text: change["text"].as_str().unwrap_or_default().to_string(),
                    };
                    self.documents
                        .change_incremental(&uri, version, std::slice::from_ref(&splice));
                }
                None => {
                    let text = change["text"].as_str().unwrap_or_default();
                    self.documents.change_full(&uri, version, text);
                }
            }
        }
        self.publish_diagnostics(&uri, outgoing);
    }

    fn on_did_close(&mut self, _id: Option<&Id>, params: &Value, _outgoing: &mut Outgoing) {
        if let Some(uri) = params["textDocument"]["uri"].as_str() {
            self.documents.close(uri);
        }
    }

    // ---------------------------------------------------------------------
    // Feature handlers
    // ---------------------------------------------------------------------

    fn request_document(&self, params: &Value) -> Option<(String, String)> {
        let uri = params["textDocument"]["uri"].as_str()?;
        let content = self.documents.content(uri)?;
        Some((uri.to_string(), content.to_string()))
    }

    fn position(params: &Value) -> (u32, u32) {
        (
            params["position"]["line"].as_u64().unwrap_or(0) as u32,
            params["position"]["character"].as_u64().unwrap_or(0) as u32,
        )
    }

    fn on_completion(&mut self, id: Option<&Id>, params: &Value, outgoing: &mut Outgoing) {
        let Some(id) = id else { return };
        let result = match self.request_document(params) {
            Some((_, content)) => analysis::completions(&analysis::analyze(&content)),
            None => json!([]),
        };
        outgoing.messages.push(rpc::response(id, result));
    }

    fn on_hover(&mut self, id: Option<&Id>, params: &Value, outgoing: &mut Outgoing) {
        let Some(id) = id else { return };
        let result = match self.request_document(params) {
            Some((_, content)) => {
                let (line, character) = Self::position(params);
                analysis::hover(&analysis::analyze(&content), &content, line, character)
            }
            None => Value::Null,
        };
        outgoing.messages.push(rpc::response(id, result));
    }

    fn on_definition(&mut self, id: Option<&Id>, params: &Value, outgoing: &mut Outgoing) {
        let Some(id) = id else { return };
        let result = match self.request_document(params) {
            Some((uri, content)) => {
                let (line, character) = Self::position(params);
                analysis::definition(
                    &analysis::analyze(&content),
                    &uri,
                    &content,
                    line,
                    character,
                )
            }
            None => Value::Null,
        };
        outgoing.messages.push(rpc::response(id, result));
    }

    fn on_document_symbol(&mut self, id: Option<&Id>, params: &Value, outgoing: &mut Outgoing) {
        let Some(id) = id else { return };
        let result = match self.request_document(params) {
            Some((uri, content)) => {
                analysis::document_symbols(&analysis::analyze(&content), &uri)
            }
            None => json!([]),
        };
        outgoing.messages.push(rpc::response(id, result));
    }

    fn on_signature_help(&mut self, id: Option<&Id>, params: &Value, outgoing: &mut Outgoing) {
        let Some(id) = id else { return };
        let result = match self.request_document(params) {
            Some((_, content)) => {
                let (line, character) = Self::position(params);
                analysis::signature_help(&analysis::analyze(&content), &content, line, character)
            }
            None => Value::Null,
        };
        outgoing.messages.push(rpc::response(id, result));
    }

    /// Full-document edit covering the whole buffer.
    fn whole_document_edit(content: &str, formatted: String) -> Value {
        let line_count = content.lines().count() as u64;
        json!([{
            "range": {
                "start": { "line": 0, "character": 0 },
                "end": { "line": line_count + 1, "character": 0 },
            },
            "newText": formatted,
        }])
    }

    fn on_formatting(&mut self, id: Option<&Id>, params: &Value, outgoing: &mut Outgoing) {
        let Some(id) = id else { return };
        let result = match self.request_document(params) {
            Some((_, content)) => {
                Self::whole_document_edit(&content, analysis::format_document(&content))
            }
            None => json!([]),
        };
        outgoing.messages.push(rpc::response(id, result));
    }

    fn on_range_formatting(&mut self, id: Option<&Id>, params: &Value, outgoing: &mut Outgoing) {
        let Some(id) = id else { return };
        let result = match self.request_document(params) {
            Some((_, content)) => {
                let start = params["range"]["start"]["line"].as_u64().unwrap_or(0) as u32;
                let end = params["range"]["end"]["line"].as_u64().unwrap_or(0) as u32;
                Self::whole_document_edit(&content, analysis::format_range(&content, start, end))
            }
            None => json!([]),
        };
        outgoing.messages.push(rpc::response(id, result));
    }

    fn on_on_type_formatting(&mut self, id: Option<&Id>, params: &Value, outgoing: &mut Outgoing) {
        let Some(id) = id else { return };
        let result = match self.request_document(params) {
            Some((_, content)) => {
                let (line, _) = Self::position(params);
                Self::whole_document_edit(&content, analysis::format_on_type(&content, line))
            }
            None => json!([]),
        };
        outgoing.messages.push(rpc::response(id, result));
    }
}
