//! Byte-level import-library scenarios: short-import records, MinGW
//! import-descriptor objects and archive round trips.

use arklink::ar::ArchiveBuilder;
use arklink::import::{
    COFF_MACHINE_AMD64, ImportKind, ImportLibrary, encode_short_import,
};

/// AR magic + one member holding a by-ordinal short import for `foo` in
/// `bar.dll`, ordinal 1.
#[test]
fn parses_single_short_import_member() {
    let mut record = Vec::new();
    record.extend_from_slice(&[0x00, 0x00, 0xFF, 0xFF]); // sig1, sig2
    record.extend_from_slice(&[0x64, 0x86]); // machine = amd64
    record.extend_from_slice(&[0x00, 0x00]); // reserved
    record.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // time-date
    record.extend_from_slice(&[0x0A, 0x00, 0x00, 0x00]); // size of data
    record.extend_from_slice(&[0x01, 0x00]); // ordinal 1
    record.extend_from_slice(&[0x00, 0x00]); // type word: code, by-ordinal
    record.extend_from_slice(b"foo\0bar.dll\0");

    let mut builder = ArchiveBuilder::new();
    builder.add_member("bar.dll", record);
    let archive = builder.build();

    let lib = ImportLibrary::parse("bar.lib", &archive).unwrap();
    assert_eq!(lib.entries().len(), 1);
    let entry = &lib.entries()[0];
    assert_eq!(entry.symbol, "foo");
    assert_eq!(entry.dll, "bar.dll");
    assert_eq!(entry.kind, ImportKind::Code);
    assert!(entry.by_ordinal);
    assert_eq!(entry.ordinal, 1);
}

/// Building an archive from a set of short-import records and parsing it
/// back preserves (symbol, dll, ordinal-or-hint) for every record.
#[test]
fn short_import_archive_round_trip() {
    let records = [
        ("CreateFileW", "kernel32.dll", ImportKind::Code, 12u16, false),
        ("GetLastError", "kernel32.dll", ImportKind::Code, 99, false),
        ("wsock_select", "ws2_32.dll", ImportKind::Code, 7, true),
        ("timezone_tab", "ucrt.dll", ImportKind::Data, 3, false),
        ("pi_constant", "mathlib.dll", ImportKind::Const, 1, false),
    ];

    let mut builder = ArchiveBuilder::new();
    for (symbol, dll, kind, hint_or_ordinal, by_ordinal) in &records {
        builder.add_member(
            dll,
            encode_short_import(
                COFF_MACHINE_AMD64,
                symbol,
                dll,
                *kind,
                *hint_or_ordinal,
                *by_ordinal,
            ),
        );
    }
    let archive = builder.build();
    let lib = ImportLibrary::parse("mixed.lib", &archive).unwrap();

    assert_eq!(lib.entries().len(), records.len());
    for ((symbol, dll, kind, hint_or_ordinal, by_ordinal), entry) in
        records.iter().zip(lib.entries())
    {
        assert_eq!(entry.symbol, *symbol);
        assert_eq!(entry.dll, *dll);
        assert_eq!(entry.kind, *kind);
        assert_eq!(entry.by_ordinal, *by_ordinal);
        if *by_ordinal {
            assert_eq!(entry.ordinal, *hint_or_ordinal);
        } else {
            assert_eq!(entry.hint, *hint_or_ordinal);
        }
    }
}

/// Build a COFF import-descriptor member: `.idata$7` carries the DLL
/// name, `.idata$6` carries (hint, name) pairs.
fn mingw_member(dll: Option<&str>, imports: &[(u16, &str)]) -> Vec<u8> {
    let mut sections: Vec<(&[u8], Vec<u8>)> = Vec::new();
    if let Some(dll) = dll {
        let mut payload = dll.as_bytes().to_vec();
        payload.push(0);
        sections.push((b".idata$7", payload));
    }
    if !imports.is_empty() {
        let mut payload = Vec::new();
        for (hint, name) in imports {
            payload.extend_from_slice(&hint.to_le_bytes());
            payload.extend_from_slice(name.as_bytes());
            payload.push(0);
        }
        sections.push((b".idata$6", payload));
    }

    let headers_end = 20 + sections.len() * 40;
    let mut object = Vec::new();
    object.extend_from_slice(&0x8664u16.to_le_bytes());
    object.extend_from_slice(&(sections.len() as u16).to_le_bytes());
    object.extend_from_slice(&[0u8; 12]); // time-date, symtab, nsyms
    object.extend_from_slice(&0u16.to_le_bytes()); // optional header size
    object.extend_from_slice(&0u16.to_le_bytes()); // characteristics

    let mut data_offset = headers_end;
    for (name, payload) in &sections {
        let mut header = [0u8; 40];
        header[..name.len()].copy_from_slice(name);
        header[16..20].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        header[20..24].copy_from_slice(&(data_offset as u32).to_le_bytes());
        object.extend_from_slice(&header);
        data_offset += payload.len();
    }
    for (_, payload) in &sections {
        object.extend_from_slice(payload);
    }
    object
}

#[test]
fn mingw_members_share_a_rolling_dll_name() {
    let mut builder = ArchiveBuilder::new();
    // First member only names the DLL; the next two carry hint/name runs.
    builder.add_member("head.o", mingw_member(Some("msvcrt.dll"), &[]));
    builder.add_member("s1.o", mingw_member(None, &[(4, "printf"), (9, "malloc")]));
    builder.add_member("s2.o", mingw_member(None, &[(11, "free")]));
    let archive = builder.build();

    let lib = ImportLibrary::parse("msvcrt.a", &archive).unwrap();
    let entries = lib.entries();
    assert_eq!(entries.len(), 3);
    for entry in entries {
        assert_eq!(entry.dll, "msvcrt.dll");
        assert_eq!(entry.kind, ImportKind::Code);
        assert!(!entry.by_ordinal);
    }
    assert_eq!(entries[0].symbol, "printf");
    assert_eq!(entries[0].hint, 4);
    assert_eq!(entries[1].symbol, "malloc");
    assert_eq!(entries[2].symbol, "free");
    assert_eq!(entries[2].hint, 11);
}

#[test]
fn mingw_member_without_dll_name_falls_back() {
    let mut builder = ArchiveBuilder::new();
    builder.add_member("s.o", mingw_member(None, &[(1, "orphan")]));
    let archive = builder.build();
    let lib = ImportLibrary::parse("orphan.a", &archive).unwrap();
    assert_eq!(lib.entries()[0].dll, "unknown.dll");
}

#[test]
fn find_tolerates_x86_decoration() {
    let mut builder = ArchiveBuilder::new();
    builder.add_member(
        "k.dll",
        encode_short_import(COFF_MACHINE_AMD64, "_open", "crt.dll", ImportKind::Code, 2, false),
    );
    let archive = builder.build();
    let lib = ImportLibrary::parse("crt.lib", &archive).unwrap();

    let direct = lib.find("_open").unwrap();
    let undecorated = lib.find("open").unwrap();
    assert_eq!(direct, undecorated);
}

#[test]
fn truncated_trailing_member_degrades_gracefully() {
    let mut builder = ArchiveBuilder::new();
    builder.add_member(
        "a.dll",
        encode_short_import(COFF_MACHINE_AMD64, "first", "a.dll", ImportKind::Code, 1, false),
    );
    builder.add_member(
        "b.dll",
        encode_short_import(COFF_MACHINE_AMD64, "second", "b.dll", ImportKind::Code, 2, false),
    );
    let mut archive = builder.build();
    archive.truncate(archive.len() - 5);

    let lib = ImportLibrary::parse("partial.lib", &archive).unwrap();
    assert_eq!(lib.entries().len(), 1);
    assert_eq!(lib.entries()[0].symbol, "first");
}

#[test]
fn garbage_is_rejected_with_format_error() {
    let err = ImportLibrary::parse("bad.lib", b"this is not an archive").unwrap_err();
    assert!(matches!(err, arklink::ImportError::Format(_)));
}
