//! Content-Length framing over arbitrary byte streams.
//!
//! Each message is `Content-Length: N\r\n`, optional further headers,
//! a blank `\r\n` line, then exactly N payload bytes. The reader
//! tolerates bare `\n` line endings some clients emit.

use std::io::{BufRead, Read, Write};

use crate::error::LspError;

/// Read one framed message; `Ok(None)` signals a clean EOF before any
/// header byte.
pub fn read_message(input: &mut impl BufRead) -> Result<Option<String>, LspError> {
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        let read = input.read_line(&mut line)?;
        if read == 0 {
            return if content_length.is_none() {
                Ok(None)
            } else {
                Err(LspError::Frame("eof inside headers".into()))
            };
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("Content-Length:") {
            let length = value
                .trim()
                .parse::<usize>()
                .map_err(|_| LspError::Frame(format!("bad Content-Length '{value}'")))?;
            content_length = Some(length);
        }
        // Other headers (Content-Type) are ignored.
    }

    let length =
        content_length.ok_or_else(|| LspError::Frame("missing Content-Length".into()))?;
    let mut payload = vec![0u8; length];
    input.read_exact(&mut payload)?;
    let text = String::from_utf8(payload)
        .map_err(|_| LspError::Frame("payload is not UTF-8".into()))?;
    Ok(Some(text))
}

/// Frame and write one message, flushing afterwards.
pub fn write_message(output: &mut impl Write, content: &str) -> Result<(), LspError> {
    write!(output, "Content-Length: {}\r\n\r\n{}", content.len(), content)?;
    output.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    #[test]
    fn round_trip_single_message() {
        let mut wire = Vec::new();
        write_message(&mut wire, "{\"jsonrpc\":\"2.0\"}").unwrap();
        let mut reader = BufReader::new(wire.as_slice());
        let message = read_message(&mut reader).unwrap().unwrap();
        assert_eq!(message, "{\"jsonrpc\":\"2.0\"}");
        assert!(read_message(&mut reader).unwrap().is_none());
    }

    #[test]
    fn multiple_messages_in_sequence() {
        let mut wire = Vec::new();
        write_message(&mut wire, "first").unwrap();
        write_message(&mut wire, "second").unwrap();
        let mut reader = BufReader::new(wire.as_slice());
        assert_eq!(read_message(&mut reader).unwrap().unwrap(), "first");
        assert_eq!(read_message(&mut reader).unwrap().unwrap(), "second");
    }

    #[test]
    fn extra_headers_are_ignored() {
        let wire = b"Content-Length: 2\r\nContent-Type: application/vscode-jsonrpc\r\n\r\nok";
        let mut reader = BufReader::new(wire.as_slice());
        assert_eq!(read_message(&mut reader).unwrap().unwrap(), "ok");
    }

    #[test]
    fn missing_length_is_a_frame_error() {
        let wire = b"X-Other: 1\r\n\r\n{}";
        let mut reader = BufReader::new(wire.as_slice());
        assert!(matches!(
            read_message(&mut reader),
            Err(LspError::Frame(_))
        ));
    }

    #[test]
    fn clean_eof_yields_none() {
        let mut reader = BufReader::new(&b""[..]);
        assert!(read_message(&mut reader).unwrap().is_none());
    }
}
