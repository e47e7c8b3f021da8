//! Entry names in both of the encodings the cache can be queried with.

use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::hash::Hash;
use std::io;

use crate::cache::path_index::{PathIndex, PathTable};
use crate::fs::Platform;

/// The name of one directory entry.
///
/// Every name is kept as UTF-8 bytes and as UTF-16 code units so that byte-string and
/// wide-string lookups can compare against it without converting on the hot path. A name
/// built from one encoding is converted lossily into the other.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Name {
    narrow: Box<[u8]>,
    wide: Box<[u16]>,
}

impl Name {
    /// Build a name from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let wide = String::from_utf8_lossy(bytes).encode_utf16().collect();
        Self {
            narrow: bytes.into(),
            wide,
        }
    }

    /// Build a name from UTF-16 code units.
    #[must_use]
    pub fn from_wide(units: &[u16]) -> Self {
        let narrow = String::from_utf16_lossy(units).into_bytes().into_boxed_slice();
        Self {
            narrow,
            wide: units.into(),
        }
    }

    /// Build a name from an OS string.
    #[must_use]
    pub fn from_os_str(name: &OsStr) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::ffi::OsStrExt as _;
            Self::from_bytes(name.as_bytes())
        }
        #[cfg(not(unix))]
        {
            Self::from(name.to_string_lossy().as_ref())
        }
    }

    /// The byte (UTF-8) form.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.narrow
    }

    /// The wide (UTF-16) form.
    #[must_use]
    pub fn as_wide(&self) -> &[u16] {
        &self.wide
    }

    /// Number of bytes in the byte form.
    #[must_use]
    pub fn len(&self) -> usize {
        self.narrow.len()
    }

    /// Whether the name is empty. Only the tree root and the posix root have empty names.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.narrow.is_empty()
    }

    /// Lossy UTF-8 rendering of the name.
    #[must_use]
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.narrow)
    }

    /// The name as an OS string, suitable for joining onto a host path.
    #[must_use]
    pub fn to_os_string(&self) -> OsString {
        #[cfg(unix)]
        {
            use std::os::unix::ffi::OsStrExt as _;
            OsStr::from_bytes(&self.narrow).to_os_string()
        }
        #[cfg(not(unix))]
        {
            OsString::from(self.to_string_lossy().into_owned())
        }
    }

    /// Compare against a query in either encoding.
    pub(crate) fn matches<C: CodeUnit>(&self, query: &[C], case_sensitive: bool) -> bool {
        units_eq(C::units(self), query, case_sensitive)
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Self {
            narrow: s.as_bytes().into(),
            wide: s.encode_utf16().collect(),
        }
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.to_string_lossy(), f)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

/// Which of the two encodings a lookup runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Encoding {
    Narrow = 0,
    Wide = 1,
}

impl Encoding {
    pub(crate) const fn slot(self) -> usize {
        self as usize
    }
}

/// A code unit of one of the two path encodings (`u8` or `u16`).
///
/// Everything generic in the lookup path is written once against this trait and
/// monomorphized for both encodings.
pub(crate) trait CodeUnit: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    const ENCODING: Encoding;

    /// The form of `name` in this encoding.
    fn units(name: &Name) -> &[Self];

    fn to_u32(self) -> u32;

    /// Simple case fold. ASCII for bytes, single-unit lowercase mapping for wide units.
    fn fold(self) -> Self;

    fn ascii(byte: u8) -> Self;

    fn name_from(units: &[Self]) -> Name;

    fn absolutize<P: Platform>(platform: &P, path: &[Self]) -> io::Result<Vec<Self>>;

    fn path_table(index: &mut PathIndex) -> &mut PathTable<Self>;

    fn path_table_ref(index: &PathIndex) -> &PathTable<Self>;

    fn is(self, byte: u8) -> bool {
        self == Self::ascii(byte)
    }
}

impl CodeUnit for u8 {
    const ENCODING: Encoding = Encoding::Narrow;

    fn units(name: &Name) -> &[Self] {
        name.as_bytes()
    }

    fn to_u32(self) -> u32 {
        u32::from(self)
    }

    fn fold(self) -> Self {
        self.to_ascii_lowercase()
    }

    fn ascii(byte: u8) -> Self {
        byte
    }

    fn name_from(units: &[Self]) -> Name {
        Name::from_bytes(units)
    }

    fn absolutize<P: Platform>(platform: &P, path: &[Self]) -> io::Result<Vec<Self>> {
        platform.absolutize(path)
    }

    fn path_table(index: &mut PathIndex) -> &mut PathTable<Self> {
        &mut index.narrow
    }

    fn path_table_ref(index: &PathIndex) -> &PathTable<Self> {
        &index.narrow
    }
}

impl CodeUnit for u16 {
    const ENCODING: Encoding = Encoding::Wide;

    fn units(name: &Name) -> &[Self] {
        name.as_wide()
    }

    fn to_u32(self) -> u32 {
        u32::from(self)
    }

    fn fold(self) -> Self {
        if self < 0x80 {
            return Self::from((self as u8).to_ascii_lowercase());
        }
        let Some(c) = char::from_u32(u32::from(self)) else {
            // Lone surrogate.
            return self;
        };
        let mut lower = c.to_lowercase();
        match (lower.next(), lower.next()) {
            (Some(l), None) => Self::try_from(u32::from(l)).unwrap_or(self),
            _ => self,
        }
    }

    fn ascii(byte: u8) -> Self {
        Self::from(byte)
    }

    fn name_from(units: &[Self]) -> Name {
        Name::from_wide(units)
    }

    fn absolutize<P: Platform>(platform: &P, path: &[Self]) -> io::Result<Vec<Self>> {
        platform.absolutize_wide(path)
    }

    fn path_table(index: &mut PathIndex) -> &mut PathTable<Self> {
        &mut index.wide
    }

    fn path_table_ref(index: &PathIndex) -> &PathTable<Self> {
        &index.wide
    }
}

/// Compare two unit strings, optionally ignoring case.
pub(crate) fn units_eq<C: CodeUnit>(a: &[C], b: &[C], case_sensitive: bool) -> bool {
    if a.len() != b.len() {
        return false;
    }
    if case_sensitive {
        return a == b;
    }
    a.iter().zip(b).all(|(x, y)| x == y || x.fold() == y.fold())
}
