//! Streaming LDIF reader (RFC 2849 subset).
//!
//! Entries are yielded one at a time; the input is never buffered whole.
//! Attribute names are lowercased and keep their options (`;binary`).
//! Values marked with `::` are base64-decoded during parsing.

use crate::{decode_base64, CodecError};
use std::collections::HashMap;
use std::io::BufRead;

/// One LDIF entry: a DN plus its attribute/value multimap.
#[derive(Debug, Clone, Default)]
pub struct LdifEntry {
    /// Entry DN.
    pub dn: String,
    attrs: HashMap<String, Vec<Vec<u8>>>,
}

impl LdifEntry {
    /// First value of `name`, also trying the `;binary` option form.
    pub fn first(&self, name: &str) -> Option<&[u8]> {
        let lower = name.to_ascii_lowercase();
        self.attrs
            .get(&lower)
            .or_else(|| self.attrs.get(&format!("{lower};binary")))
            .and_then(|v| v.first())
            .map(Vec::as_slice)
    }

    /// All values of `name` (plain and `;binary` forms).
    pub fn all(&self, name: &str) -> Vec<&[u8]> {
        let lower = name.to_ascii_lowercase();
        let mut out = Vec::new();
        for key in [lower.clone(), format!("{lower};binary")] {
            if let Some(vals) = self.attrs.get(&key) {
                out.extend(vals.iter().map(Vec::as_slice));
            }
        }
        out
    }

    /// Whether `name` is present in either form.
    pub fn has(&self, name: &str) -> bool {
        self.first(name).is_some()
    }

    /// objectClass values, lowercased.
    pub fn object_classes(&self) -> Vec<String> {
        self.all("objectclass")
            .into_iter()
            .filter_map(|v| std::str::from_utf8(v).ok())
            .map(str::to_ascii_lowercase)
            .collect()
    }

    fn push(&mut self, name: String, value: Vec<u8>) {
        self.attrs.entry(name).or_default().push(value);
    }
}

/// Streaming entry iterator over any buffered reader.
pub struct LdifReader<R: BufRead> {
    reader: R,
    /// Physical line pushed back while detecting the end of a logical line.
    pending: Option<String>,
    done: bool,
}

impl<R: BufRead> LdifReader<R> {
    /// Wrap `reader`.
    pub fn new(reader: R) -> Self {
        Self { reader, pending: None, done: false }
    }

    fn next_physical_line(&mut self) -> Result<Option<String>, CodecError> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }
        let mut buf = String::new();
        let n = self.reader.read_line(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        while buf.ends_with('\n') || buf.ends_with('\r') {
            buf.pop();
        }
        Ok(Some(buf))
    }

    /// Read one logical line, folding continuation lines (single leading
    /// space). Returns None at end of input. Comment lines are skipped along
    /// with their continuations.
    fn next_logical_line(&mut self) -> Result<Option<String>, CodecError> {
        loop {
            let Some(first) = self.next_physical_line()? else {
                return Ok(None);
            };
            let is_comment = first.starts_with('#');
            let mut logical = first;
            loop {
                match self.next_physical_line()? {
                    Some(line) if line.starts_with(' ') => {
                        if !is_comment {
                            logical.push_str(&line[1..]);
                        }
                    }
                    Some(line) => {
                        self.pending = Some(line);
                        break;
                    }
                    None => break,
                }
            }
            if !is_comment {
                return Ok(Some(logical));
            }
        }
    }

    fn parse_entry(&mut self) -> Result<Option<LdifEntry>, CodecError> {
        // Skip blank separators and the optional leading "version:" line.
        let mut first = loop {
            match self.next_logical_line()? {
                None => return Ok(None),
                Some(l) if l.is_empty() => continue,
                Some(l) if l.to_ascii_lowercase().starts_with("version:") => continue,
                Some(l) => break l,
            }
        };

        let (name, value) = parse_attr_line(&first)?;
        if name != "dn" {
            // Resync at the next blank line so one bad record does not
            // poison the rest of the stream.
            loop {
                match self.next_logical_line()? {
                    None => break,
                    Some(l) if l.is_empty() => break,
                    Some(_) => continue,
                }
            }
            return Err(CodecError::Ldif(format!("expected dn, got attribute {name}")));
        }
        let mut entry = LdifEntry {
            dn: String::from_utf8(value)
                .map_err(|_| CodecError::Ldif("dn is not valid utf-8".into()))?,
            ..LdifEntry::default()
        };

        loop {
            first = match self.next_logical_line()? {
                None => break,
                Some(l) if l.is_empty() => break,
                Some(l) => l,
            };
            let (name, value) = parse_attr_line(&first)?;
            entry.push(name, value);
        }
        Ok(Some(entry))
    }
}

impl<R: BufRead> Iterator for LdifReader<R> {
    type Item = Result<LdifEntry, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.parse_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Split `attr: value` / `attr:: base64value`. Attribute names are lowercased
/// with options preserved. `:<` URL references are not fetched; they yield an
/// empty value.
fn parse_attr_line(line: &str) -> Result<(String, Vec<u8>), CodecError> {
    let colon = line
        .find(':')
        .ok_or_else(|| CodecError::Ldif(format!("missing colon in line: {line}")))?;
    let name = line[..colon].trim().to_ascii_lowercase();
    if name.is_empty() {
        return Err(CodecError::Ldif("empty attribute name".into()));
    }
    let rest = &line[colon + 1..];
    if let Some(b64) = rest.strip_prefix(':') {
        return Ok((name, decode_base64(b64.trim_start())?));
    }
    if rest.starts_with('<') {
        return Ok((name, Vec::new()));
    }
    Ok((name, rest.strip_prefix(' ').unwrap_or(rest).as_bytes().to_vec()))
}
