//! Splitting input paths into a root specifier and components.

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::name::{CodeUnit, Name};

/// How input paths are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PathStyle {
    /// Drive letters (`C:\`), UNC shares (`\\server\share`), and both `\` and `/` as separators.
    #[default]
    Windows,
    /// A single `/` root and `/` separators.
    Posix,
}

impl PathStyle {
    /// The separator used when building paths.
    #[must_use]
    pub const fn separator(self) -> u8 {
        match self {
            Self::Windows => b'\\',
            Self::Posix => b'/',
        }
    }

    pub(crate) fn is_separator<C: CodeUnit>(self, c: C) -> bool {
        match self {
            Self::Windows => c.is(b'\\') || c.is(b'/'),
            Self::Posix => c.is(b'/'),
        }
    }
}

/// The root a path hangs off.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RootSpec {
    /// A drive letter, stored uppercase.
    Drive(u8),
    /// A UNC share.
    Share {
        /// Server name.
        server: Name,
        /// Share name.
        share: Name,
    },
    /// The single posix root.
    Posix,
}

impl RootSpec {
    /// The name the root object carries: `C:`, `\\server\share`, or empty for posix.
    #[must_use]
    pub fn name(&self) -> Name {
        match self {
            Self::Drive(letter) => Name::from_bytes(&[*letter, b':']),
            Self::Share { server, share } => {
                let mut bytes = b"\\\\".to_vec();
                bytes.extend_from_slice(server.as_bytes());
                bytes.push(b'\\');
                bytes.extend_from_slice(share.as_bytes());
                Name::from_bytes(&bytes)
            }
            Self::Posix => Name::from(""),
        }
    }

    /// The key the root is stored under. Share names compare case-insensitively unless the
    /// cache is case-sensitive.
    pub(crate) fn key(&self, case_sensitive: bool) -> Self {
        match self {
            Self::Share { server, share } if !case_sensitive => Self::Share {
                server: Name::from_bytes(&server.as_bytes().to_ascii_lowercase()),
                share: Name::from_bytes(&share.as_bytes().to_ascii_lowercase()),
            },
            other => other.clone(),
        }
    }
}

/// An absolute path free of `.` and `..`, split into its parts.
#[derive(Debug)]
pub(crate) struct ParsedPath<'a, C> {
    pub root: RootSpec,
    pub components: Vec<&'a [C]>,
    pub trailing_separator: bool,
}

#[derive(Debug)]
pub(crate) enum Parsed<'a, C> {
    /// The path can be walked as written.
    Walkable(ParsedPath<'a, C>),
    /// The path is relative, drive-relative, rooted without a drive, or has `.`/`..`
    /// components, and must be made absolute first.
    NeedsNormalization,
}

/// One step of a relative path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Component<'a, C> {
    Name(&'a [C]),
    Parent,
}

fn is_dot<C: CodeUnit>(component: &[C]) -> bool {
    matches!(component, [c] if c.is(b'.'))
}

fn is_dot_dot<C: CodeUnit>(component: &[C]) -> bool {
    matches!(component, [a, b] if a.is(b'.') && b.is(b'.'))
}

fn ascii_letter<C: CodeUnit>(c: C) -> Option<u8> {
    let v = c.to_u32();
    u8::try_from(v)
        .ok()
        .filter(u8::is_ascii_alphabetic)
        .map(|b| b.to_ascii_uppercase())
}

/// Parse `path` according to `style`.
pub(crate) fn parse<C: CodeUnit>(
    path: &[C],
    style: PathStyle,
    max_len: usize,
) -> Result<Parsed<'_, C>> {
    if path.is_empty() {
        return Err(CacheError::InvalidPath);
    }
    if path.len() > max_len {
        return Err(CacheError::PathTooLong { max: max_len });
    }
    let sep = |c: C| style.is_separator(c);

    let (root, rest) = match style {
        PathStyle::Posix => {
            if !sep(path[0]) {
                return Ok(Parsed::NeedsNormalization);
            }
            (RootSpec::Posix, &path[1..])
        }
        PathStyle::Windows => match path {
            [a, b, c, d, ..] if sep(*a) && sep(*b) && (c.is(b'?') || c.is(b'.')) && sep(*d) => {
                return Err(CacheError::Unsupported);
            }
            [a, b, unc @ ..] if sep(*a) && sep(*b) => {
                let mut parts = unc.splitn(3, |c| sep(*c));
                let server = parts.next().unwrap_or_default();
                let share = parts.next().unwrap_or_default();
                if server.is_empty() || share.is_empty() {
                    return Err(CacheError::InvalidPath);
                }
                let root = RootSpec::Share {
                    server: C::name_from(server),
                    share: C::name_from(share),
                };
                (root, parts.next().unwrap_or_default())
            }
            [a, ..] if sep(*a) => return Ok(Parsed::NeedsNormalization),
            [letter, colon, s, rest @ ..] if colon.is(b':') && sep(*s) => {
                let Some(letter) = ascii_letter(*letter) else {
                    return Err(CacheError::InvalidPath);
                };
                (RootSpec::Drive(letter), rest)
            }
            _ => return Ok(Parsed::NeedsNormalization),
        },
    };

    let mut components = Vec::new();
    for component in rest.split(|c| sep(*c)) {
        if component.is_empty() {
            continue;
        }
        if is_dot(component) || is_dot_dot(component) {
            return Ok(Parsed::NeedsNormalization);
        }
        components.push(component);
    }
    let trailing_separator = rest.last().is_some_and(|c| sep(*c));

    Ok(Parsed::Walkable(ParsedPath {
        root,
        components,
        trailing_separator,
    }))
}

/// Split a path relative to some directory. Absolute inputs are rejected.
pub(crate) fn parse_relative<C: CodeUnit>(
    path: &[C],
    style: PathStyle,
    max_len: usize,
) -> Result<(Vec<Component<'_, C>>, bool)> {
    if path.len() > max_len {
        return Err(CacheError::PathTooLong { max: max_len });
    }
    let sep = |c: C| style.is_separator(c);
    let absolute = match path {
        [first, ..] if sep(*first) => true,
        [_, colon, ..] => style == PathStyle::Windows && colon.is(b':'),
        _ => false,
    };
    if absolute {
        return Err(CacheError::InvalidPath);
    }

    let components = path
        .split(|c| sep(*c))
        .filter(|c| !c.is_empty() && !is_dot(c))
        .map(|c| {
            if is_dot_dot(c) {
                Component::Parent
            } else {
                Component::Name(c)
            }
        })
        .collect();
    Ok((components, path.last().is_some_and(|c| sep(*c))))
}

/// Split an absolute byte path into its root text and the remainder.
fn split_root(style: PathStyle, path: &[u8]) -> Option<(&[u8], &[u8])> {
    let sep = |c: &u8| style.is_separator(*c);
    match (style, path) {
        (PathStyle::Posix, [first, ..]) if sep(first) => Some(path.split_at(0)),
        (PathStyle::Windows, [a, b, unc @ ..]) if sep(a) && sep(b) => {
            let server_len = unc.iter().position(sep)?;
            let after = &unc[server_len + 1..];
            let share_len = after.iter().position(sep).unwrap_or(after.len());
            if server_len == 0 || share_len == 0 {
                return None;
            }
            Some(path.split_at(2 + server_len + 1 + share_len))
        }
        (PathStyle::Windows, [letter, b':', s, ..]) if letter.is_ascii_alphabetic() && sep(s) => {
            Some(path.split_at(2))
        }
        _ => None,
    }
}

/// Make `path` absolute against `cwd` and fold away `.` and `..` without touching the
/// filesystem. `..` never climbs above the root. A trailing separator is preserved.
pub(crate) fn absolutize_lexically(
    style: PathStyle,
    cwd: &[u8],
    path: &[u8],
) -> std::io::Result<Vec<u8>> {
    let invalid = || {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path cannot be made absolute",
        )
    };
    let sep = style.separator();
    let join = |base: &[u8], tail: &[u8]| {
        let mut joined = base.to_vec();
        if !tail.is_empty() {
            joined.push(sep);
            joined.extend_from_slice(tail);
        }
        joined
    };
    let (cwd_root, _) = split_root(style, cwd).ok_or_else(invalid)?;

    let joined = if split_root(style, path).is_some() {
        path.to_vec()
    } else {
        match (style, path) {
            (PathStyle::Windows, [letter, b':', tail @ ..]) if letter.is_ascii_alphabetic() => {
                let drive = letter.to_ascii_uppercase();
                let same_drive = matches!(cwd, [c, b':', ..] if c.to_ascii_uppercase() == drive);
                if same_drive {
                    join(cwd, tail)
                } else {
                    join(&[drive, b':', sep], tail)
                }
            }
            (PathStyle::Windows, [first, ..]) if style.is_separator(*first) => {
                join(cwd_root, path)
            }
            _ => join(cwd, path),
        }
    };

    let (root, rest) = split_root(style, &joined).ok_or_else(invalid)?;
    let mut parts: Vec<&[u8]> = Vec::new();
    for component in rest.split(|c| style.is_separator(*c)) {
        match component {
            b"" | b"." => {}
            b".." => {
                parts.pop();
            }
            name => parts.push(name),
        }
    }

    let mut out = root.to_vec();
    for part in &parts {
        out.push(sep);
        out.extend_from_slice(part);
    }
    let trailing = rest.last().is_some_and(|c| style.is_separator(*c));
    if parts.is_empty() || trailing {
        out.push(sep);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn absolute(style: PathStyle, cwd: &str, path: &str) -> String {
        let out = absolutize_lexically(style, cwd.as_bytes(), path.as_bytes())
            .unwrap_or_else(|e| panic!("{path:?}: {e}"));
        String::from_utf8_lossy(&out).into_owned()
    }

    #[test]
    fn lexical_absolutize_windows() {
        let cwd = r"C:\work\proj";
        assert_eq!(absolute(PathStyle::Windows, cwd, r"src\a.c"), r"C:\work\proj\src\a.c");
        assert_eq!(absolute(PathStyle::Windows, cwd, r"..\other"), r"C:\work\other");
        assert_eq!(absolute(PathStyle::Windows, cwd, r"\tools"), r"C:\tools");
        assert_eq!(absolute(PathStyle::Windows, cwd, "c:inc"), r"C:\work\proj\inc");
        assert_eq!(absolute(PathStyle::Windows, cwd, "d:inc"), r"D:\inc");
        assert_eq!(absolute(PathStyle::Windows, cwd, r"C:\a\..\..\b"), r"C:\b");
        assert_eq!(absolute(PathStyle::Windows, cwd, r"C:\a\.\b\"), r"C:\a\b\");
        assert_eq!(absolute(PathStyle::Windows, cwd, r"\\srv\sh\x\..\y"), r"\\srv\sh\y");
        assert_eq!(absolute(PathStyle::Windows, cwd, "C:"), r"C:\work\proj");
    }

    #[test]
    fn lexical_absolutize_posix() {
        assert_eq!(absolute(PathStyle::Posix, "/home/u", "src/../lib"), "/home/u/lib");
        assert_eq!(absolute(PathStyle::Posix, "/home/u", "/.."), "/");
        assert_eq!(absolute(PathStyle::Posix, "/", "."), "/");
        assert!(absolutize_lexically(PathStyle::Posix, b"rel", b"x").is_err());
    }

    fn walk(path: &str, style: PathStyle) -> ParsedPath<'_, u8> {
        match parse(path.as_bytes(), style, 260) {
            Ok(Parsed::Walkable(p)) => p,
            other => panic!("{path:?} did not parse as walkable: {other:?}"),
        }
    }

    fn needs_normalization(path: &str, style: PathStyle) -> bool {
        matches!(
            parse(path.as_bytes(), style, 260),
            Ok(Parsed::NeedsNormalization)
        )
    }

    #[test]
    fn drive_paths_uppercase_the_letter() {
        let p = walk(r"c:\src\kBuild\footer.kmk", PathStyle::Windows);
        assert_eq!(p.root, RootSpec::Drive(b'C'));
        assert_eq!(
            p.components,
            vec![b"src".as_slice(), b"kBuild", b"footer.kmk"]
        );
        assert!(!p.trailing_separator);
    }

    #[test]
    fn mixed_separators_and_empty_components_collapse() {
        let p = walk("D:/out//obj\\\\x.o", PathStyle::Windows);
        assert_eq!(p.root, RootSpec::Drive(b'D'));
        assert_eq!(p.components, vec![b"out".as_slice(), b"obj", b"x.o"]);
    }

    #[test]
    fn trailing_separator_is_recorded() {
        assert!(walk(r"C:\src\", PathStyle::Windows).trailing_separator);
        assert!(walk("/usr/include/", PathStyle::Posix).trailing_separator);
        assert!(walk(r"C:\", PathStyle::Windows).components.is_empty());
    }

    #[test]
    fn unc_share_root() {
        let p = walk(r"\\build01\tools\bin\gcc.exe", PathStyle::Windows);
        assert_eq!(
            p.root,
            RootSpec::Share {
                server: Name::from("build01"),
                share: Name::from("tools"),
            }
        );
        assert_eq!(p.components, vec![b"bin".as_slice(), b"gcc.exe"]);
        assert_eq!(p.root.name().as_bytes(), br"\\build01\tools");
    }

    #[test]
    fn unc_without_share_is_invalid() {
        assert!(matches!(
            parse(br"\\server".as_slice(), PathStyle::Windows, 260),
            Err(CacheError::InvalidPath)
        ));
        assert!(matches!(
            parse(br"\\server\".as_slice(), PathStyle::Windows, 260),
            Err(CacheError::InvalidPath)
        ));
    }

    #[test]
    fn device_and_verbatim_prefixes_are_unsupported() {
        for path in [r"\\?\C:\x", r"\\.\PhysicalDrive0"] {
            assert!(matches!(
                parse(path.as_bytes(), PathStyle::Windows, 260),
                Err(CacheError::Unsupported)
            ));
        }
    }

    #[test]
    fn relative_forms_need_normalization() {
        assert!(needs_normalization("src/main.c", PathStyle::Windows));
        assert!(needs_normalization(r"\src", PathStyle::Windows));
        assert!(needs_normalization("C:src", PathStyle::Windows));
        assert!(needs_normalization("C:", PathStyle::Windows));
        assert!(needs_normalization(r"C:\src\..\inc", PathStyle::Windows));
        assert!(needs_normalization(r"C:\.\inc", PathStyle::Windows));
        assert!(needs_normalization("usr/lib", PathStyle::Posix));
        assert!(needs_normalization("/usr/./lib", PathStyle::Posix));
    }

    #[test]
    fn dots_inside_names_are_fine() {
        let p = walk("/a/.hidden/..x/x..", PathStyle::Posix);
        assert_eq!(p.components, vec![b"a".as_slice(), b".hidden", b"..x", b"x.."]);
    }

    #[test]
    fn posix_backslash_is_a_name_character() {
        let p = walk(r"/a\b", PathStyle::Posix);
        assert_eq!(p.components, vec![br"a\b".as_slice()]);
    }

    #[test]
    fn length_limits() {
        assert!(matches!(
            parse(b"".as_slice(), PathStyle::Posix, 10),
            Err(CacheError::InvalidPath)
        ));
        assert!(matches!(
            parse(b"/0123456789".as_slice(), PathStyle::Posix, 10),
            Err(CacheError::PathTooLong { max: 10 })
        ));
    }

    #[test]
    fn wide_paths_parse_like_narrow() {
        let wide: Vec<u16> = r"e:\Проект\файл.txt".encode_utf16().collect();
        let Ok(Parsed::Walkable(p)) = parse(&wide, PathStyle::Windows, 260) else {
            panic!("not walkable");
        };
        assert_eq!(p.root, RootSpec::Drive(b'E'));
        assert_eq!(p.components.len(), 2);
    }

    #[test]
    fn relative_components() {
        let (parts, trailing) =
            parse_relative(br"..\inc\.\x.h".as_slice(), PathStyle::Windows, 260).unwrap_or_default();
        assert_eq!(
            parts,
            vec![
                Component::Parent,
                Component::Name(b"inc".as_slice()),
                Component::Name(b"x.h".as_slice()),
            ]
        );
        assert!(!trailing);
        assert!(parse_relative(br"C:\x".as_slice(), PathStyle::Windows, 260).is_err());
        assert!(parse_relative(b"/x".as_slice(), PathStyle::Posix, 260).is_err());
    }

    #[test]
    fn share_keys_fold_case() {
        let a = RootSpec::Share {
            server: Name::from("Build01"),
            share: Name::from("Tools"),
        };
        let b = RootSpec::Share {
            server: Name::from("BUILD01"),
            share: Name::from("tools"),
        };
        assert_eq!(a.key(false), b.key(false));
        assert_ne!(a.key(true), b.key(true));
    }
}
