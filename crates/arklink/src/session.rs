//! The link session: objects in, executable out.
//!
//! A session is configured once (target, output kind, entry symbol,
//! subsystem, image base, stack size), fed input object paths in order,
//! and then asked to [`LinkSession::link`]. Linking is atomic: the image
//! is staged next to the output path and renamed into place only after
//! every input validated, every external resolved and the entry symbol
//! was found; any failure leaves the session error slot set and no partial
//! output on disk.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::LinkError;
use crate::import::{COFF_MACHINE_AMD64, ImportLibrary};
use crate::object::{self, ObjectFormat, ObjectSymbols};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTarget {
    Pe,
    Elf,
}

impl fmt::Display for LinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinkTarget::Pe => "pe",
            LinkTarget::Elf => "elf",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Executable,
    Library,
}

/// PE loader subsystem; only meaningful for the PE target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Console,
    Gui,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

pub type LogCallback = Box<dyn Fn(LogLevel, &str) + Send>;

pub const PE_DEFAULT_IMAGE_BASE: u64 = 0x1_4000_0000;
pub const ELF_DEFAULT_IMAGE_BASE: u64 = 0x40_0000;
pub const DEFAULT_STACK_SIZE: u64 = 0x10_0000;

pub struct LinkSession {
    target: LinkTarget,
    output_kind: OutputKind,
    entry: String,
    subsystem: Subsystem,
    image_base: u64,
    stack_size: u64,
    output: Option<PathBuf>,
    inputs: Vec<PathBuf>,
    import_libs: Vec<ImportLibrary>,
    error: Option<String>,
    logger: Option<LogCallback>,
}

impl Default for LinkSession {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkSession {
    pub fn new() -> Self {
        Self {
            target: LinkTarget::Pe,
            output_kind: OutputKind::Executable,
            entry: "main".to_string(),
            subsystem: Subsystem::Console,
            image_base: PE_DEFAULT_IMAGE_BASE,
            stack_size: DEFAULT_STACK_SIZE,
            output: None,
            inputs: Vec::new(),
            import_libs: Vec::new(),
            error: None,
            logger: None,
        }
    }

    // ---------------------------------------------------------------------
    // Configuration
    // ---------------------------------------------------------------------

    pub fn set_target(&mut self, target: LinkTarget) -> &mut Self {
        self.target = target;
        if target == LinkTarget::Elf && self.image_base == PE_DEFAULT_IMAGE_BASE {
            self.image_base = ELF_DEFAULT_IMAGE_BASE;
        }
        self
    }

    pub fn set_output_kind(&mut self, kind: OutputKind) -> &mut Self {
        self.output_kind = kind;
        self
    }

    pub fn set_entry_point(&mut self, entry: &str) -> &mut Self {
        self.entry = entry.to_string();
        self
    }

    pub fn set_subsystem(&mut self, subsystem: Subsystem) -> &mut Self {
        self.subsystem = subsystem;
        self
    }

    pub fn set_image_base(&mut self, base: u64) -> &mut Self {
        self.image_base = base;
        self
    }

    pub fn set_stack_size(&mut self, size: u64) -> &mut Self {
        self.stack_size = size;
        self
    }

    pub fn set_output(&mut self, path: &Path) -> &mut Self {
        self.output = Some(path.to_path_buf());
        self
    }

    pub fn set_logger(&mut self, logger: LogCallback) -> &mut Self {
        self.logger = Some(logger);
        self
    }

    pub fn add_input(&mut self, path: &Path) -> &mut Self {
        self.inputs.push(path.to_path_buf());
        self
    }

    pub fn add_import_library(&mut self, lib: ImportLibrary) -> &mut Self {
        self.import_libs.push(lib);
        self
    }

    pub fn last_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn log(&self, level: LogLevel, message: &str) {
        if let Some(logger) = &self.logger {
            logger(level, message);
        }
        match level {
            LogLevel::Error => tracing::error!(target: "arklink", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "arklink", "{message}"),
            LogLevel::Info => info!(target: "arklink", "{message}"),
            LogLevel::Debug => debug!(target: "arklink", "{message}"),
        }
    }

    fn fail(&mut self, err: LinkError) -> LinkError {
        let text = err.to_string();
        self.log(LogLevel::Error, &text);
        self.error = Some(text);
        err
    }

    // ---------------------------------------------------------------------
    // Linking
    // ---------------------------------------------------------------------

    /// Run the link. On success the output file exists; on failure the
    /// error is returned *and* recorded in the session's error slot.
    pub fn link(&mut self) -> Result<(), LinkError> {
        self.error = None;
        let output = match &self.output {
            Some(path) => path.clone(),
            None => return Err(self.fail(LinkError::NoOutput)),
        };

        self.log(
            LogLevel::Info,
            &format!(
                "linking {} input(s) -> {} ({})",
                self.inputs.len(),
                output.display(),
                self.target
            ),
        );

        // Pass 1: validate containers and collect symbol tables.
        let mut defined: HashSet<String> = HashSet::new();
        let mut undefined: Vec<String> = Vec::new();
        let mut payload_bytes = 0u64;
        for path in self.inputs.clone() {
            let display = path.display().to_string();
            let data = match fs::read(&path) {
                Ok(data) => data,
                Err(err) => return Err(self.fail(LinkError::Io(err))),
            };
            let symbols = match self.scan_object(&display, &data) {
                Ok(symbols) => symbols,
                Err(err) => return Err(self.fail(err)),
            };
            payload_bytes += data.len() as u64;
            self.log(
                LogLevel::Debug,
                &format!(
                    "{display}: {} defined, {} undefined",
                    symbols.defined.len(),
                    symbols.undefined.len()
                ),
            );
            defined.extend(symbols.defined);
            undefined.extend(symbols.undefined);
        }

        // Pass 2: every undefined reference must resolve to a definition
        // in some object or to a dynamic import.
        for symbol in &undefined {
            if defined.contains(symbol) {
                continue;
            }
            let dynamic = self.import_libs.iter().find_map(|lib| lib.find(symbol));
            match dynamic {
                Some(entry) => self.log(
                    LogLevel::Debug,
                    &format!("{symbol} resolved dynamically from {}", entry.dll),
                ),
                None => return Err(self.fail(LinkError::Unresolved(symbol.clone()))),
            }
        }

        if self.output_kind == OutputKind::Executable && !defined.contains(&self.entry) {
            let entry = self.entry.clone();
            return Err(self.fail(LinkError::MissingSymbol(entry)));
        }

        // Pass 3: emit. Staged write plus rename keeps the link atomic.
        let staged = output.with_extension("lnk.tmp");
        let image = self.emit_image(payload_bytes);
        let write_result = fs::write(&staged, &image).and_then(|()| fs::rename(&staged, &output));
        if let Err(err) = write_result {
            let _ = fs::remove_file(&staged);
            return Err(self.fail(LinkError::Io(err)));
        }

        self.log(
            LogLevel::Info,
            &format!("linked {} ({} bytes)", output.display(), image.len()),
        );
        Ok(())
    }

    fn scan_object(&self, path: &str, data: &[u8]) -> Result<ObjectSymbols, LinkError> {
        let format = object::detect_format(data).ok_or_else(|| LinkError::BadObject {
            path: path.to_string(),
            detail: "unrecognised object container".to_string(),
        })?;
        let expected = match self.target {
            LinkTarget::Pe => ObjectFormat::Coff,
            LinkTarget::Elf => ObjectFormat::Elf,
        };
        if format != expected {
            return Err(LinkError::TargetMismatch {
                path: path.to_string(),
                target: self.target.to_string(),
            });
        }
        match format {
            ObjectFormat::Coff => object::scan_coff(path, data),
            ObjectFormat::Elf => object::scan_elf(path, data),
        }
    }

    /// Produce the output image header. Section layout and relocation are
    /// the back-end emitters' concern; the session writes the container
    /// frame that records its own configuration.
    fn emit_image(&self, payload_bytes: u64) -> Vec<u8> {
        match self.target {
            LinkTarget::Pe => self.emit_pe_frame(payload_bytes),
            LinkTarget::Elf => self.emit_elf_frame(),
        }
    }

    fn emit_pe_frame(&self, payload_bytes: u64) -> Vec<u8> {
        let mut out = Vec::new();
        // DOS stub: magic + pointer to the PE signature at 0x40.
        out.extend_from_slice(b"MZ");
        out.resize(0x3c, 0);
        out.extend_from_slice(&0x40u32.to_le_bytes());
        out.extend_from_slice(b"PE\0\0");
        // COFF file header.
        out.extend_from_slice(&COFF_MACHINE_AMD64.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // sections
        out.extend_from_slice(&0u32.to_le_bytes()); // time-date
        out.extend_from_slice(&0u32.to_le_bytes()); // symtab
        out.extend_from_slice(&0u32.to_le_bytes()); // nsyms
        out.extend_from_slice(&112u16.to_le_bytes()); // optional header size
        let characteristics: u16 = if self.output_kind == OutputKind::Library {
            0x2000 // DLL
        } else {
            0x0002 // executable image
        };
        out.extend_from_slice(&characteristics.to_le_bytes());
        // Optional header (PE32+), the fields the loader and debuggers
        // actually consult for our configuration.
        out.extend_from_slice(&0x020bu16.to_le_bytes());
        out.extend_from_slice(&[0u8; 14]); // linker version, code sizes
        out.extend_from_slice(&0u32.to_le_bytes()); // entry rva (layout pass)
        out.extend_from_slice(&0u32.to_le_bytes()); // base of code
        out.extend_from_slice(&self.image_base.to_le_bytes());
        out.extend_from_slice(&0x1000u32.to_le_bytes()); // section align
        out.extend_from_slice(&0x200u32.to_le_bytes()); // file align
        out.extend_from_slice(&[0u8; 16]); // versions
        out.extend_from_slice(&(payload_bytes as u32).to_le_bytes()); // image size
        out.extend_from_slice(&0x400u32.to_le_bytes()); // headers size
        out.extend_from_slice(&0u32.to_le_bytes()); // checksum
        let subsystem: u16 = match self.subsystem {
            Subsystem::Console => 3,
            Subsystem::Gui => 2,
        };
        out.extend_from_slice(&subsystem.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // dll characteristics
        out.extend_from_slice(&self.stack_size.to_le_bytes()); // stack reserve
        out.extend_from_slice(&0x1000u64.to_le_bytes()); // stack commit
        out
    }

    fn emit_elf_frame(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&object::ELF_MAGIC);
        out.push(2); // ELFCLASS64
        out.push(1); // little-endian
        out.push(1); // EV_CURRENT
        out.extend_from_slice(&[0u8; 9]);
        let e_type: u16 = match self.output_kind {
            OutputKind::Executable => 2, // ET_EXEC
            OutputKind::Library => 3,    // ET_DYN
        };
        out.extend_from_slice(&e_type.to_le_bytes());
        out.extend_from_slice(&object::ELF_MACHINE_X86_64.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&self.image_base.to_le_bytes()); // entry
        out.extend_from_slice(&0u64.to_le_bytes()); // phoff
        out.extend_from_slice(&0u64.to_le_bytes()); // shoff
        out.extend_from_slice(&0u32.to_le_bytes()); // flags
        out.extend_from_slice(&64u16.to_le_bytes()); // ehsize
        out.extend_from_slice(&[0u8; 10]); // ph/sh counts
        out
    }
}
