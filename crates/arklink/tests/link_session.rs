//! Link-session scenarios over synthetic objects in a temp directory.

use std::fs;
use std::sync::{Arc, Mutex};

use arklink::ar::ArchiveBuilder;
use arklink::import::{COFF_MACHINE_AMD64, ImportKind, encode_short_import};
use arklink::object::{write_minimal_coff, write_minimal_elf};
use arklink::{ImportLibrary, LinkError, LinkSession, LinkTarget, LogLevel};

fn write_object(dir: &tempfile::TempDir, name: &str, data: Vec<u8>) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, data).unwrap();
    path
}

#[test]
fn links_self_contained_pe_objects() {
    let dir = tempfile::tempdir().unwrap();
    let main_obj = write_object(
        &dir,
        "main.o",
        write_minimal_coff(COFF_MACHINE_AMD64, &["main"], &["helper"]),
    );
    let helper_obj = write_object(
        &dir,
        "helper.o",
        write_minimal_coff(COFF_MACHINE_AMD64, &["helper"], &[]),
    );
    let output = dir.path().join("app.exe");

    let mut session = LinkSession::new();
    session
        .set_target(LinkTarget::Pe)
        .set_output(&output)
        .add_input(&main_obj)
        .add_input(&helper_obj);
    session.link().unwrap();

    assert!(output.exists());
    assert!(session.last_error().is_none());
    let image = fs::read(&output).unwrap();
    assert_eq!(&image[..2], b"MZ");
}

#[test]
fn missing_entry_symbol_fails_and_sets_error_slot() {
    let dir = tempfile::tempdir().unwrap();
    let obj = write_object(
        &dir,
        "lib.o",
        write_minimal_coff(COFF_MACHINE_AMD64, &["helper"], &[]),
    );
    let output = dir.path().join("app.exe");

    let mut session = LinkSession::new();
    session.set_output(&output).add_input(&obj);
    let err = session.link().unwrap_err();
    assert!(matches!(err, LinkError::MissingSymbol(sym) if sym == "main"));
    assert!(session.last_error().unwrap().contains("main"));
    assert!(!output.exists());
}

#[test]
fn unresolved_external_fails_without_import_library() {
    let dir = tempfile::tempdir().unwrap();
    let obj = write_object(
        &dir,
        "main.o",
        write_minimal_coff(COFF_MACHINE_AMD64, &["main"], &["ExitProcess"]),
    );
    let output = dir.path().join("app.exe");

    let mut session = LinkSession::new();
    session.set_output(&output).add_input(&obj);
    let err = session.link().unwrap_err();
    assert!(matches!(err, LinkError::Unresolved(sym) if sym == "ExitProcess"));
}

#[test]
fn import_library_resolves_dynamic_symbols() {
    let dir = tempfile::tempdir().unwrap();
    let obj = write_object(
        &dir,
        "main.o",
        write_minimal_coff(COFF_MACHINE_AMD64, &["main"], &["ExitProcess"]),
    );
    let output = dir.path().join("app.exe");

    let mut builder = ArchiveBuilder::new();
    builder.add_member(
        "kernel32.dll",
        encode_short_import(
            COFF_MACHINE_AMD64,
            "ExitProcess",
            "kernel32.dll",
            ImportKind::Code,
            0x153,
            false,
        ),
    );
    let lib = ImportLibrary::parse("kernel32.lib", &builder.build()).unwrap();

    let mut session = LinkSession::new();
    session
        .set_output(&output)
        .add_input(&obj)
        .add_import_library(lib);
    session.link().unwrap();
    assert!(output.exists());
}

#[test]
fn elf_object_rejected_by_pe_target() {
    let dir = tempfile::tempdir().unwrap();
    let obj = write_object(&dir, "main.o", write_minimal_elf(&["main"], &[]));
    let output = dir.path().join("app.exe");

    let mut session = LinkSession::new();
    session.set_target(LinkTarget::Pe).set_output(&output).add_input(&obj);
    let err = session.link().unwrap_err();
    assert!(matches!(err, LinkError::TargetMismatch { .. }));
}

#[test]
fn elf_target_links_elf_objects() {
    let dir = tempfile::tempdir().unwrap();
    let obj = write_object(&dir, "main.o", write_minimal_elf(&["main"], &[]));
    let output = dir.path().join("app");

    let mut session = LinkSession::new();
    session
        .set_target(LinkTarget::Elf)
        .set_output(&output)
        .add_input(&obj);
    session.link().unwrap();

    let image = fs::read(&output).unwrap();
    assert_eq!(&image[..4], &[0x7f, b'E', b'L', b'F']);
}

#[test]
fn logger_callback_receives_messages_by_level() {
    let dir = tempfile::tempdir().unwrap();
    let obj = write_object(
        &dir,
        "main.o",
        write_minimal_coff(COFF_MACHINE_AMD64, &["main"], &[]),
    );
    let output = dir.path().join("app.exe");

    let seen: Arc<Mutex<Vec<(LogLevel, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut session = LinkSession::new();
    session
        .set_output(&output)
        .add_input(&obj)
        .set_logger(Box::new(move |level, message| {
            sink.lock().unwrap().push((level, message.to_string()));
        }));
    session.link().unwrap();

    let seen = seen.lock().unwrap();
    assert!(seen.iter().any(|(level, _)| *level == LogLevel::Info));
    assert!(seen.iter().any(|(_, msg)| msg.contains("linked")));
}

#[test]
fn missing_input_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("app.exe");
    let mut session = LinkSession::new();
    session
        .set_output(&output)
        .add_input(&dir.path().join("nope.o"));
    let err = session.link().unwrap_err();
    assert!(matches!(err, LinkError::Io(_)));
}
