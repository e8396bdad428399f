//! String utilities: splitting, shell-style tokenization, variable
//! substitution.

use anyhow::{bail, Result};

/// Split `s` on `sep`, dropping empty segments.
pub fn split(s: &str, sep: char) -> Vec<String> {
    s.split(sep)
        .filter(|p| !p.is_empty())
        .map(|p| p.to_owned())
        .collect()
}

/// Split `s` on `sep`, dropping empty segments, appending to `out`.
pub fn split_append(out: &mut Vec<String>, s: &str, sep: char) {
    out.extend(s.split(sep).filter(|p| !p.is_empty()).map(|p| p.to_owned()));
}

/// Split on whitespace *or* the given separator, dropping empties.
pub fn split_space_or_sep(s: &str, sep: char) -> Vec<String> {
    s.split(|c: char| c == sep || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .map(|p| p.to_owned())
        .collect()
}

/// Split as a shell would: whitespace-separated tokens, with single and
/// double quotes grouping (quotes are kept in the token, matching the
/// downstream command-template use). Unbalanced quotes are an error.
pub fn shell_split(s: &str) -> Result<Vec<String>> {
    let bytes = s.as_bytes();
    let mut out = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i == bytes.len() {
            break;
        }
        let start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
            let c = bytes[i];
            if c == b'\'' || c == b'"' {
                i = advance_to_end_quote(bytes, i)?;
            } else {
                if c == b'\\' && i + 1 < bytes.len() {
                    i += 1;
                }
                i += 1;
            }
        }
        out.push(s[start..i].to_owned());
    }
    Ok(out)
}

fn advance_to_end_quote(bytes: &[u8], quote_start: usize) -> Result<usize> {
    let quote = bytes[quote_start];
    let mut i = quote_start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            c if c == quote => return Ok(i + 1),
            _ => {}
        }
        i += 1;
    }
    bail!("unbalanced quotes in string, unable to tokenize");
}

/// Replace every non-alphanumeric character with `_`; prefix with `_` when
/// the first character is not alphanumeric.
pub fn sanitize(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 1);
    for (i, c) in s.chars().enumerate() {
        if i == 0 && !c.is_ascii_alphanumeric() {
            out.push('_');
        }
        out.push(if c.is_ascii_alphanumeric() { c } else { '_' });
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}

/// Expand `$name` / `${name}` references via `lookup`. `$$` collapses to a
/// literal `$`. With `require_curly`, only the braced form is recognized
/// (pkg-config files). Unknown names expand to empty with a warning.
pub fn substitute_variables<F>(text: &str, require_curly: bool, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            let start = i;
            while i < bytes.len() && bytes[i] != b'$' {
                i += 1;
            }
            out.push_str(&text[start..i]);
            continue;
        }
        // at a '$'
        if i + 1 >= bytes.len() {
            out.push('$');
            break;
        }
        let next = bytes[i + 1];
        if next == b'$' {
            out.push('$');
            i += 2;
            continue;
        }
        let (name_start, name_end, resume) = if next == b'{' {
            let start = i + 2;
            match text[start..].find('}') {
                Some(off) => (start, start + off, start + off + 1),
                None => {
                    tracing::warn!("variable marker not terminated in '{}'", text);
                    out.push_str(&text[i..]);
                    return out;
                }
            }
        } else if !require_curly && (next.is_ascii_alphabetic() || next == b'_') {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
                end += 1;
            }
            (start, end, end)
        } else {
            out.push('$');
            i += 1;
            continue;
        };

        let name = &text[name_start..name_end];
        match lookup(name) {
            Some(v) => out.push_str(&v),
            None => {
                tracing::warn!("variable '{}' undefined", name);
            }
        }
        i = resume;
    }
    out
}

/// Extension of a filename, including the dot. Empty when there is none.
pub fn extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(p) => &name[p..],
        None => "",
    }
}

/// Replace (or append) the extension of `name` with `new_ext` (which
/// includes its dot, and may be empty to strip).
pub fn replace_extension(name: &str, new_ext: &str) -> String {
    match name.rfind('.') {
        Some(p) => format!("{}{}", &name[..p], new_ext),
        None => format!("{name}{new_ext}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_drops_empty() {
        assert_eq!(split("/usr//lib/", '/'), vec!["usr", "lib"]);
        assert_eq!(split("a:b::c", ':'), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_shell_split_quotes() {
        let toks = shell_split("gcc -DVALUE=\"a b\" -c in.c").unwrap();
        assert_eq!(toks, vec!["gcc", "-DVALUE=\"a b\"", "-c", "in.c"]);
        assert!(shell_split("echo \"unterminated").is_err());
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("foo-bar.c"), "foo_bar_c");
        assert_eq!(sanitize("9lives"), "9lives");
        assert_eq!(sanitize("-x"), "__x");
    }

    #[test]
    fn test_substitute_plain_and_curly() {
        let lookup = |n: &str| match n {
            "prefix" => Some("/usr".to_owned()),
            "name" => Some("z".to_owned()),
            _ => None,
        };
        assert_eq!(
            substitute_variables("${prefix}/lib", true, lookup),
            "/usr/lib"
        );
        assert_eq!(substitute_variables("$name-$name", false, lookup), "z-z");
        // curly required: bare $name is left alone
        assert_eq!(substitute_variables("$name", true, lookup), "$name");
        // unknown names expand to empty
        assert_eq!(substitute_variables("${nope}/x", true, lookup), "/x");
        // $$ escapes
        assert_eq!(substitute_variables("a$$b", false, lookup), "a$b");
    }

    #[test]
    fn test_extension_handling() {
        assert_eq!(extension("foo.tar.gz"), ".gz");
        assert_eq!(extension("Makefile"), "");
        assert_eq!(replace_extension("foo.y", ".c"), "foo.c");
        assert_eq!(replace_extension("foo", ".o"), "foo.o");
    }
}
