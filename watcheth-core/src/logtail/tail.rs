//! Reading the last lines of a file without reading the whole file.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Bytes read per backward step.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// The tail of a file: its last non-blank lines, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tail {
    pub lines: Vec<String>,
    /// Bytes after the final newline. Empty when the file ends with `\n`.
    ///
    /// A non-blank fragment is also the last entry of `lines`; it is kept
    /// here so a later read can complete it.
    pub partial: Vec<u8>,
}

/// Read the last `n` non-blank lines of the first `len` bytes of `reader`.
///
/// Reads backwards in `chunk_size` steps, carrying the incomplete head of
/// each chunk into the next step, and stops as soon as `n` lines are known.
/// Whitespace-only lines are skipped and do not count towards `n`. Invalid
/// UTF-8 is replaced rather than rejected.
pub fn tail_lines<R: Read + Seek>(
    reader: &mut R,
    len: u64,
    n: usize,
    chunk_size: usize,
) -> io::Result<Tail> {
    let chunk_size = chunk_size.max(1) as u64;
    let mut tail = Tail::default();
    let mut newest_first: Vec<String> = Vec::new();
    let mut carry: Vec<u8> = Vec::new();
    let mut offset = len;
    let mut seen_end = false;

    while offset > 0 && (!seen_end || newest_first.len() < n) {
        let step = chunk_size.min(offset);
        offset -= step;

        // step <= chunk_size, which came from a usize
        let mut buf = vec![0u8; step as usize];
        reader.seek(SeekFrom::Start(offset))?;
        reader.read_exact(&mut buf)?;
        buf.extend_from_slice(&carry);

        let mut pieces = buf.split(|b| *b == b'\n');
        // Everything before the first newline may continue in an earlier chunk.
        let head = pieces.next().unwrap_or_default();
        let mut rest: Vec<&[u8]> = pieces.collect();

        if rest.is_empty() {
            carry = head.to_vec();
            continue;
        }

        if !seen_end {
            seen_end = true;
            if let Some(last) = rest.pop() {
                tail.partial = last.to_vec();
                if let Some(line) = decode_line(last) {
                    newest_first.push(line);
                }
            }
        }

        for piece in rest.iter().rev() {
            if newest_first.len() >= n {
                break;
            }
            if let Some(line) = decode_line(piece) {
                newest_first.push(line);
            }
        }
        carry = head.to_vec();
    }

    if offset == 0 {
        if !seen_end {
            // No newline anywhere: the whole file is one unterminated line.
            tail.partial = carry.clone();
        }
        if newest_first.len() < n {
            if let Some(line) = decode_line(&carry) {
                newest_first.push(line);
            }
        }
    }

    newest_first.truncate(n);
    newest_first.reverse();
    tail.lines = newest_first;
    Ok(tail)
}

/// Open `path`, read its last `n` non-blank lines, and close it again.
pub fn tail_file(path: impl AsRef<Path>, n: usize) -> io::Result<Tail> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    tail_lines(&mut file, len, n, DEFAULT_CHUNK_SIZE)
}

/// Split `data` into the non-blank complete lines it contains and the bytes
/// after the last newline.
pub(crate) fn split_complete(data: &[u8]) -> (Vec<String>, &[u8]) {
    match data.iter().rposition(|b| *b == b'\n') {
        Some(end) => {
            let lines = data[..end]
                .split(|b| *b == b'\n')
                .filter_map(decode_line)
                .collect();
            (lines, &data[end + 1..])
        }
        None => (Vec::new(), data),
    }
}

/// Decode one line, or `None` if it is blank.
pub(crate) fn decode_line(bytes: &[u8]) -> Option<String> {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    let line = String::from_utf8_lossy(bytes);
    if line.trim().is_empty() {
        None
    } else {
        Some(line.into_owned())
    }
}
