//! Shallow object-file inspection: format detection and symbol scans.
//!
//! The link session only needs three facts about an input object: which
//! container it is (COFF vs ELF), which global symbols it defines, and
//! which it leaves undefined. Section payloads, relocations and layout are
//! the emitters' business, not the resolver's.

use crate::error::LinkError;
use crate::import::{COFF_MACHINE_AMD64, COFF_MACHINE_I386, read_u16, read_u32};

pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
pub const ELF_MACHINE_X86_64: u16 = 0x003e;
/// COFF storage class for external symbols.
const IMAGE_SYM_CLASS_EXTERNAL: u8 = 2;
/// ELF absolute-section index used for synthetic definitions.
const SHN_ABS: u16 = 0xfff1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectFormat {
    Coff,
    Elf,
}

pub fn detect_format(data: &[u8]) -> Option<ObjectFormat> {
    if data.len() >= 4 && data[..4] == ELF_MAGIC {
        return Some(ObjectFormat::Elf);
    }
    if data.len() >= 20
        && matches!(
            read_u16(data, 0),
            Some(COFF_MACHINE_I386) | Some(COFF_MACHINE_AMD64)
        )
    {
        return Some(ObjectFormat::Coff);
    }
    None
}

/// Global symbols split by definedness.
#[derive(Debug, Default, Clone)]
pub struct ObjectSymbols {
    pub defined: Vec<String>,
    pub undefined: Vec<String>,
}

fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    data.get(offset..offset + 8)
        .map(|b| u64::from_le_bytes(b.try_into().unwrap()))
}

fn bad(path: &str, detail: &str) -> LinkError {
    LinkError::BadObject {
        path: path.to_string(),
        detail: detail.to_string(),
    }
}

/// Scan a COFF object's symbol table. Name resolution handles both the
/// 8-byte inline form and the zeros/offset long-name form against the
/// string table that follows the symbol records.
pub fn scan_coff(path: &str, data: &[u8]) -> Result<ObjectSymbols, LinkError> {
    if data.len() < 20 {
        return Err(bad(path, "COFF header truncated"));
    }
    let symtab_offset = read_u32(data, 8).unwrap_or(0) as usize;
    let num_symbols = read_u32(data, 12).unwrap_or(0) as usize;
    let strtab_offset = symtab_offset + num_symbols * 18;

    let mut symbols = ObjectSymbols::default();
    let mut i = 0usize;
    while i < num_symbols {
        let entry = symtab_offset + i * 18;
        let Some(record) = data.get(entry..entry + 18) else {
            return Err(bad(path, "symbol table truncated"));
        };
        let name = if record[0] == 0 && record[1] == 0 && record[2] == 0 && record[3] == 0 {
            let offset = read_u32(record, 4).unwrap_or(0) as usize;
            read_strtab(data, strtab_offset, offset)
                .ok_or_else(|| bad(path, "string table reference out of range"))?
        } else {
            let end = record[..8].iter().position(|&b| b == 0).unwrap_or(8);
            String::from_utf8_lossy(&record[..end]).to_string()
        };
        let section = i16::from_le_bytes([record[12], record[13]]);
        let storage_class = record[16];
        let aux = record[17] as usize;

        if storage_class == IMAGE_SYM_CLASS_EXTERNAL && !name.is_empty() {
            if section == 0 {
                symbols.undefined.push(name);
            } else {
                symbols.defined.push(name);
            }
        }
        i += 1 + aux;
    }
    Ok(symbols)
}

fn read_strtab(data: &[u8], strtab_offset: usize, offset: usize) -> Option<String> {
    // The COFF string table begins with its own 4-byte length; offsets
    // include that prefix.
    let start = strtab_offset + offset;
    let tail = data.get(start..)?;
    let end = tail.iter().position(|&b| b == 0)?;
    Some(String::from_utf8_lossy(&tail[..end]).to_string())
}

/// Scan an ELF64 object's `.symtab`.
pub fn scan_elf(path: &str, data: &[u8]) -> Result<ObjectSymbols, LinkError> {
    if data.len() < 64 || data[..4] != ELF_MAGIC {
        return Err(bad(path, "ELF header truncated"));
    }
    if data[4] != 2 || data[5] != 1 {
        return Err(bad(path, "only little-endian ELF64 is supported"));
    }
    let shoff = read_u64(data, 0x28).unwrap_or(0) as usize;
    let shentsize = read_u16(data, 0x3a).unwrap_or(0) as usize;
    let shnum = read_u16(data, 0x3c).unwrap_or(0) as usize;

    let mut symbols = ObjectSymbols::default();
    for i in 0..shnum {
        let header = shoff + i * shentsize;
        let Some(sh_type) = read_u32(data, header + 4) else {
            return Err(bad(path, "section headers truncated"));
        };
        if sh_type != 2 {
            // SHT_SYMTAB
            continue;
        }
        let sh_offset = read_u64(data, header + 0x18).unwrap_or(0) as usize;
        let sh_size = read_u64(data, header + 0x20).unwrap_or(0) as usize;
        let sh_link = read_u32(data, header + 0x28).unwrap_or(0) as usize;
        let entsize = read_u64(data, header + 0x38).unwrap_or(24).max(24) as usize;

        let str_header = shoff + sh_link * shentsize;
        let str_offset = read_u64(data, str_header + 0x18).unwrap_or(0) as usize;

        let count = sh_size / entsize;
        for s in 1..count {
            // Entry 0 is the mandatory null symbol.
            let entry = sh_offset + s * entsize;
            let Some(st_name) = read_u32(data, entry) else {
                return Err(bad(path, "symbol table truncated"));
            };
            let shndx = read_u16(data, entry + 6).unwrap_or(0);
            let name_start = str_offset + st_name as usize;
            let Some(tail) = data.get(name_start..) else {
                continue;
            };
            let end = tail.iter().position(|&b| b == 0).unwrap_or(0);
            let name = String::from_utf8_lossy(&tail[..end]).to_string();
            if name.is_empty() {
                continue;
            }
            if shndx == 0 {
                symbols.undefined.push(name);
            } else {
                symbols.defined.push(name);
            }
        }
    }
    Ok(symbols)
}

// -------------------------------------------------------------------------
// Minimal object emission
// -------------------------------------------------------------------------

/// Emit a sectionless COFF object carrying only a symbol table. This is
/// the `eo` object the compiler hands to the link session: enough for
/// resolution, with payload layout left to the final emitter.
pub fn write_minimal_coff(machine: u16, defined: &[&str], undefined: &[&str]) -> Vec<u8> {
    let num_symbols = (defined.len() + undefined.len()) as u32;
    let symtab_offset = 20u32;

    let mut strtab: Vec<u8> = Vec::new();
    let mut symtab: Vec<u8> = Vec::new();
    let mut push_symbol = |name: &str, section: i16, strtab: &mut Vec<u8>| {
        let mut record = [0u8; 18];
        if name.len() <= 8 {
            record[..name.len()].copy_from_slice(name.as_bytes());
        } else {
            // Long name: zeros marker + offset past the 4-byte length.
            let offset = 4 + strtab.len() as u32;
            record[4..8].copy_from_slice(&offset.to_le_bytes());
            strtab.extend_from_slice(name.as_bytes());
            strtab.push(0);
        }
        record[12..14].copy_from_slice(&section.to_le_bytes());
        record[16] = IMAGE_SYM_CLASS_EXTERNAL;
        symtab.extend_from_slice(&record);
    };
    for name in defined {
        push_symbol(name, 1, &mut strtab);
    }
    for name in undefined {
        push_symbol(name, 0, &mut strtab);
    }

    let mut out = Vec::new();
    out.extend_from_slice(&machine.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // sections
    out.extend_from_slice(&0u32.to_le_bytes()); // time-date
    out.extend_from_slice(&symtab_offset.to_le_bytes());
    out.extend_from_slice(&num_symbols.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // optional header size
    out.extend_from_slice(&0u16.to_le_bytes()); // characteristics
    out.extend_from_slice(&symtab);
    out.extend_from_slice(&((strtab.len() as u32) + 4).to_le_bytes());
    out.extend_from_slice(&strtab);
    out
}

/// ELF64 counterpart of [`write_minimal_coff`].
pub fn write_minimal_elf(defined: &[&str], undefined: &[&str]) -> Vec<u8> {
    // Build .strtab and .symtab payloads first.
    let mut strtab: Vec<u8> = vec![0];
    let mut symtab: Vec<u8> = vec![0; 24]; // null symbol
    let mut add = |name: &str, shndx: u16, strtab: &mut Vec<u8>| {
        let name_offset = strtab.len() as u32;
        strtab.extend_from_slice(name.as_bytes());
        strtab.push(0);
        let mut entry = [0u8; 24];
        entry[0..4].copy_from_slice(&name_offset.to_le_bytes());
        entry[4] = 0x10; // STB_GLOBAL, STT_NOTYPE
        entry[6..8].copy_from_slice(&shndx.to_le_bytes());
        symtab.extend_from_slice(&entry);
    };
    for name in defined {
        add(name, SHN_ABS, &mut strtab);
    }
    for name in undefined {
        add(name, 0, &mut strtab);
    }

    let shstrtab: &[u8] = b"\0.symtab\0.strtab\0.shstrtab\0";
    let ehsize = 64usize;
    let symtab_offset = ehsize;
    let strtab_offset = symtab_offset + symtab.len();
    let shstrtab_offset = strtab_offset + strtab.len();
    let shoff = shstrtab_offset + shstrtab.len();

    let mut out = Vec::new();
    out.extend_from_slice(&ELF_MAGIC);
    out.push(2); // ELFCLASS64
    out.push(1); // little-endian
    out.push(1); // EV_CURRENT
    out.extend_from_slice(&[0u8; 9]);
    out.extend_from_slice(&1u16.to_le_bytes()); // ET_REL
    out.extend_from_slice(&ELF_MACHINE_X86_64.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes()); // version
    out.extend_from_slice(&0u64.to_le_bytes()); // entry
    out.extend_from_slice(&0u64.to_le_bytes()); // phoff
    out.extend_from_slice(&(shoff as u64).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // flags
    out.extend_from_slice(&64u16.to_le_bytes()); // ehsize
    out.extend_from_slice(&0u16.to_le_bytes()); // phentsize
    out.extend_from_slice(&0u16.to_le_bytes()); // phnum
    out.extend_from_slice(&64u16.to_le_bytes()); // shentsize
    out.extend_from_slice(&4u16.to_le_bytes()); // shnum
    out.extend_from_slice(&3u16.to_le_bytes()); // shstrndx

    out.extend_from_slice(&symtab);
    out.extend_from_slice(&strtab);
    out.extend_from_slice(shstrtab);

    let mut section = |sh_name: u32,
                       sh_type: u32,
                       offset: usize,
                       size: usize,
                       link: u32,
                       entsize: u64,
                       out: &mut Vec<u8>| {
        out.extend_from_slice(&sh_name.to_le_bytes());
        out.extend_from_slice(&sh_type.to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes()); // flags
        out.extend_from_slice(&0u64.to_le_bytes()); // addr
        out.extend_from_slice(&(offset as u64).to_le_bytes());
        out.extend_from_slice(&(size as u64).to_le_bytes());
        out.extend_from_slice(&link.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // info
        out.extend_from_slice(&0u64.to_le_bytes()); // addralign
        out.extend_from_slice(&entsize.to_le_bytes());
    };
    section(0, 0, 0, 0, 0, 0, &mut out); // null
    section(1, 2, symtab_offset, symtab.len(), 2, 24, &mut out); // .symtab
    section(9, 3, strtab_offset, strtab.len(), 0, 0, &mut out); // .strtab
    section(17, 3, shstrtab_offset, shstrtab.len(), 0, 0, &mut out); // .shstrtab
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coff_scan_round_trips_emitted_object() {
        let object = write_minimal_coff(
            COFF_MACHINE_AMD64,
            &["main", "a_rather_long_symbol_name"],
            &["printf"],
        );
        assert_eq!(detect_format(&object), Some(ObjectFormat::Coff));
        let symbols = scan_coff("test.o", &object).unwrap();
        assert_eq!(symbols.defined, vec!["main", "a_rather_long_symbol_name"]);
        assert_eq!(symbols.undefined, vec!["printf"]);
    }

    #[test]
    fn elf_scan_round_trips_emitted_object() {
        let object = write_minimal_elf(&["main"], &["puts", "malloc"]);
        assert_eq!(detect_format(&object), Some(ObjectFormat::Elf));
        let symbols = scan_elf("test.o", &object).unwrap();
        assert_eq!(symbols.defined, vec!["main"]);
        assert_eq!(symbols.undefined, vec!["puts", "malloc"]);
    }

    #[test]
    fn junk_is_not_an_object() {
        assert_eq!(detect_format(b"hello world, not an object"), None);
    }
}
