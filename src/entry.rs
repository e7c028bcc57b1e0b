//! Line formats of `dirs.txt`, `symlinks.txt` and `regulars.txt`.
//!
//! Every line starts with `mode,uid,gid,` where mode is written as four octal
//! digits. Paths are single quoted, with a literal `'` written as `'\''`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::Error;

const ESCAPED_QUOTE: &str = r"'\''";

/// Quotes a name for a metadata line.
pub fn encapsulate(name: &str) -> String {
    format!("'{}'", name.replace('\'', ESCAPED_QUOTE))
}

/// Inverse of [`encapsulate`] for a single quoted field.
pub fn decapsulate(quoted: &str) -> Option<String> {
    let inner = quoted.strip_prefix('\'')?.strip_suffix('\'')?;
    Some(inner.replace(ESCAPED_QUOTE, "'"))
}

/// Cursor over the comma separated fields of one line.
struct Fields<'a> {
    line: &'a str,
    rest: &'a str,
    kind: &'static str,
}

impl<'a> Fields<'a> {
    fn new(kind: &'static str, line: &'a str) -> Self {
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        Fields { line, rest: line, kind }
    }

    fn error(&self, reason: &'static str) -> Error {
        Error::Entry(self.kind, self.line.into(), reason)
    }

    fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }

    /// Next unquoted field, `None` once the line is exhausted.
    fn next_plain(&mut self) -> Option<&'a str> {
        if self.rest.is_empty() {
            return None;
        }
        match self.rest.find(',') {
            Some(i) => {
                let field = &self.rest[..i];
                self.rest = &self.rest[i + 1..];
                Some(field)
            }
            None => {
                let field = self.rest;
                self.rest = "";
                Some(field)
            }
        }
    }

    fn number(&mut self, radix: u32) -> Result<u32, Error> {
        let field = self.next_plain().ok_or_else(|| self.error("missing field"))?;
        u32::from_str_radix(field, radix).map_err(|_| self.error("invalid number"))
    }

    /// Next single quoted field, unescaped.
    fn quoted(&mut self) -> Result<String, Error> {
        let rest = self.rest;
        let bytes = rest.as_bytes();
        if bytes.first() != Some(&b'\'') {
            return Err(self.error("expected quoted path"));
        }

        let mut i = 1;
        loop {
            match bytes.get(i) {
                None => return Err(self.error("unterminated quote")),
                Some(b'\'') => {
                    if rest[i..].starts_with(ESCAPED_QUOTE) {
                        i += ESCAPED_QUOTE.len();
                    } else {
                        break;
                    }
                }
                Some(_) => i += 1,
            }
        }

        let quoted = &rest[..=i];
        let after = &rest[i + 1..];
        self.rest = match after.strip_prefix(',') {
            Some(rest) => rest,
            None if after.is_empty() => after,
            None => return Err(self.error("trailing characters after quoted path")),
        };
        decapsulate(quoted).ok_or_else(|| self.error("expected quoted path"))
    }

    fn header(&mut self) -> Result<(u32, u32, u32), Error> {
        Ok((self.number(8)?, self.number(10)?, self.number(10)?))
    }
}

/// Listed paths are UTF-8, see [`utf8_path`].
fn quote_path(path: &Path) -> String {
    encapsulate(&path.to_string_lossy())
}

/// Checks that `path` can be written to a listing without loss.
pub fn utf8_path<'a>(kind: &'static str, path: &'a Path) -> Result<&'a str, Error> {
    path.to_str().ok_or_else(|| {
        Error::Entry(kind, path.to_string_lossy().into(), "name is not valid UTF-8")
    })
}

/// One line of `dirs.txt`: `mode,uid,gid,'path'`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub path: PathBuf,
}

impl FromStr for DirectoryEntry {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self, Error> {
        let mut fields = Fields::new("directory", line);
        let (mode, uid, gid) = fields.header()?;
        let path = fields.quoted()?.into();
        if !fields.is_empty() {
            return Err(fields.error("unexpected trailing fields"));
        }
        Ok(DirectoryEntry { mode, uid, gid, path })
    }
}

impl fmt::Display for DirectoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:04o},{},{},{}", self.mode, self.uid, self.gid, quote_path(&self.path))
    }
}

/// One line of `symlinks.txt`: `mode,uid,gid,'link','target'`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymlinkEntry {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub link: PathBuf,
    pub target: PathBuf,
}

impl FromStr for SymlinkEntry {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self, Error> {
        let mut fields = Fields::new("symbolic link", line);
        let (mode, uid, gid) = fields.header()?;
        let link = fields.quoted()?.into();
        let target = fields.quoted()?.into();
        if !fields.is_empty() {
            return Err(fields.error("unexpected trailing fields"));
        }
        Ok(SymlinkEntry { mode, uid, gid, link, target })
    }
}

impl fmt::Display for SymlinkEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:04o},{},{},{},{}",
            self.mode,
            self.uid,
            self.gid,
            quote_path(&self.link),
            quote_path(&self.target)
        )
    }
}

/// One line of `regulars.txt`:
/// `mode,uid,gid,nlink,sha256,'path',size,inode[,compress_alg]`.
///
/// Older listings may stop after the path or leave `size` and `inode` empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegularEntry {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u64,
    pub sha256: String,
    pub path: PathBuf,
    pub size: Option<u64>,
    pub inode: Option<u64>,
    pub compress_alg: Option<String>,
}

impl RegularEntry {
    /// Key that groups hard links of the same file.
    pub fn link_key(&self) -> String {
        match self.inode {
            Some(inode) => inode.to_string(),
            None => self.sha256.clone(),
        }
    }
}

impl FromStr for RegularEntry {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self, Error> {
        let mut fields = Fields::new("regular file", line);
        let (mode, uid, gid) = fields.header()?;
        let nlink = fields
            .next_plain()
            .and_then(|x| x.parse().ok())
            .ok_or_else(|| fields.error("invalid link count"))?;
        let sha256 = match fields.next_plain() {
            Some(hash) if !hash.is_empty() && hash.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') => {
                hash.to_string()
            }
            _ => return Err(fields.error("invalid hash")),
        };
        let path = fields.quoted()?.into();

        let mut optional_number = |name: &'static str| -> Result<Option<u64>, Error> {
            match fields.next_plain() {
                None | Some("") => Ok(None),
                Some(x) => x.parse().map(Some).map_err(|_| fields.error(name)),
            }
        };
        let size = optional_number("invalid size")?;
        let inode = optional_number("invalid inode")?;
        let compress_alg = match fields.next_plain() {
            None | Some("") => None,
            Some(alg) => Some(alg.to_string()),
        };

        Ok(RegularEntry {
            mode,
            uid,
            gid,
            nlink,
            sha256,
            path,
            size,
            inode,
            compress_alg,
        })
    }
}

impl fmt::Display for RegularEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:04o},{},{},{},{},{},",
            self.mode,
            self.uid,
            self.gid,
            self.nlink,
            self.sha256,
            quote_path(&self.path)
        )?;
        if let Some(size) = self.size {
            write!(f, "{}", size)?;
        }
        f.write_str(",")?;
        if let Some(inode) = self.inode {
            write!(f, "{}", inode)?;
        }
        if let Some(alg) = &self.compress_alg {
            write!(f, ",{}", alg)?;
        }
        Ok(())
    }
}

/// Parses every non-empty line of a listing.
pub fn parse_lines<T: FromStr<Err = Error>>(text: &str) -> Result<Vec<T>, Error> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::parse)
        .collect()
}
