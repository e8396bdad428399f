//! Binary-to-C-string emission.
//!
//! Reads inputs as raw bytes and writes a source file where each input
//! becomes a sequence of C string literals (`"\x41\x42..."`, twenty bytes
//! per line), wrapped in configurable per-file and per-item prefix/suffix
//! lines. This is the work behind the `codegen_binary_cstring` tool; the
//! generator binary runs it via the `-embed_binary_cstring` sub-mode.

use std::fs;

use anyhow::{Context as _, Result};

use crate::core::error::BuildError;
use crate::util::paths::Directory;
use crate::util::text;

/// Everything the emitter needs; the prefix/suffix/indent entries are side
/// files whose lines are spliced literally.
#[derive(Debug, Clone, Default)]
pub struct EmbedSpec {
    pub output: String,
    pub inputs: Vec<String>,
    pub file_prefix: Option<String>,
    pub file_suffix: Option<String>,
    pub item_prefix: Option<String>,
    pub item_suffix: Option<String>,
    pub item_indent: Option<String>,
    pub comma_separate: bool,
}

impl EmbedSpec {
    /// Parse the command-line form:
    /// `<output> [-comma] [-file_prefix <path>] ... <input...>`.
    pub fn parse_args(args: &[String]) -> Result<EmbedSpec> {
        let mut spec = EmbedSpec::default();
        let mut iter = args.iter();
        spec.output = iter
            .next()
            .ok_or_else(|| BuildError::Malformed("missing output file argument".into()))?
            .clone();
        while let Some(arg) = iter.next() {
            let mut side = |slot: &mut Option<String>, tag: &str| -> Result<()> {
                let v = iter.next().ok_or_else(|| {
                    BuildError::Malformed(format!("missing file argument after {tag}"))
                })?;
                *slot = Some(v.clone());
                Ok(())
            };
            match arg.as_str() {
                "-comma" => spec.comma_separate = true,
                "-file_prefix" => side(&mut spec.file_prefix, "-file_prefix")?,
                "-file_suffix" => side(&mut spec.file_suffix, "-file_suffix")?,
                "-item_prefix" => side(&mut spec.item_prefix, "-item_prefix")?,
                "-item_suffix" => side(&mut spec.item_suffix, "-item_suffix")?,
                "-item_indent" => side(&mut spec.item_indent, "-item_indent")?,
                _ => spec.inputs.push(arg.clone()),
            }
        }
        Ok(spec)
    }
}

fn read_lines(path: &Option<String>) -> Result<Vec<String>> {
    match path {
        None => Ok(Vec::new()),
        Some(p) => {
            let content = fs::read_to_string(p)
                .with_context(|| format!("unable to open '{p}' for read"))?;
            Ok(content.lines().map(str::to_owned).collect())
        }
    }
}

/// Run the emitter; the output is written through `update_if_different` so
/// unchanged regenerations leave the file untouched.
pub fn emit_code(spec: &EmbedSpec) -> Result<()> {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    const BYTES_PER_LINE: usize = 20;

    let file_prefix = read_lines(&spec.file_prefix)?;
    let file_suffix = read_lines(&spec.file_suffix)?;
    let item_prefix = read_lines(&spec.item_prefix)?;
    let item_suffix = read_lines(&spec.item_suffix)?;
    let item_indent = read_lines(&spec.item_indent)?;

    let mut out: Vec<String> = Vec::new();
    out.extend(file_prefix.iter().cloned());

    for (i, input) in spec.inputs.iter().enumerate() {
        let bytes = fs::read(input)
            .with_context(|| format!("unable to open '{input}' for read"))?;

        let item_name = input.rsplit('/').next().unwrap_or(input).to_owned();
        let item_size = bytes.len().to_string();
        let lookup = |n: &str| match n {
            "item_name" => Some(item_name.clone()),
            "item_file_size" => Some(item_size.clone()),
            _ => None,
        };

        for line in &item_prefix {
            out.push(text::substitute_variables(line, false, &lookup));
        }

        if bytes.is_empty() {
            out.push("\"\"".to_owned());
        } else {
            let mut cur = String::new();
            for (n, b) in bytes.iter().enumerate() {
                if cur.is_empty() {
                    for ind in &item_indent {
                        cur.push_str(ind);
                    }
                    cur.push('"');
                }
                cur.push('\\');
                cur.push('x');
                cur.push(HEX[(b >> 4) as usize] as char);
                cur.push(HEX[(b & 0x0f) as usize] as char);
                if (n + 1) % BYTES_PER_LINE == 0 {
                    cur.push('"');
                    out.push(std::mem::take(&mut cur));
                }
            }
            if !cur.is_empty() {
                cur.push('"');
                out.push(cur);
            }
        }

        for line in &item_suffix {
            out.push(text::substitute_variables(line, false, &lookup));
        }

        if spec.comma_separate && i + 1 < spec.inputs.len() {
            if let Some(last) = out.last_mut() {
                last.push(',');
            }
        }
    }

    out.extend(file_suffix.iter().cloned());

    let mut dir = Directory::from_root(&spec.output);
    let filename = dir.basename().to_owned();
    dir.cd_up()?;
    dir.update_if_different(&filename, &out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn path(tmp: &TempDir, name: &str) -> String {
        tmp.path().join(name).to_string_lossy().into_owned()
    }

    #[test]
    fn test_emit_basic_with_comma_and_empty_input() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a"), b"ABC").unwrap();
        fs::write(tmp.path().join("b"), b"").unwrap();
        fs::write(tmp.path().join("indent"), b"\t\n").unwrap();

        let spec = EmbedSpec {
            output: path(&tmp, "out.c"),
            inputs: vec![path(&tmp, "a"), path(&tmp, "b")],
            item_indent: Some(path(&tmp, "indent")),
            comma_separate: true,
            ..EmbedSpec::default()
        };
        emit_code(&spec).unwrap();

        let got = fs::read_to_string(tmp.path().join("out.c")).unwrap();
        assert_eq!(got, "\t\"\\x41\\x42\\x43\",\n\"\"\n");
    }

    #[test]
    fn test_twenty_bytes_per_line() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a"), vec![0u8; 25]).unwrap();
        let spec = EmbedSpec {
            output: path(&tmp, "out.c"),
            inputs: vec![path(&tmp, "a")],
            ..EmbedSpec::default()
        };
        emit_code(&spec).unwrap();
        let got = fs::read_to_string(tmp.path().join("out.c")).unwrap();
        let lines: Vec<&str> = got.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], format!("\"{}\"", "\\x00".repeat(20)));
        assert_eq!(lines[1], format!("\"{}\"", "\\x00".repeat(5)));
    }

    #[test]
    fn test_item_prefix_substitution() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("logo.png"), b"xy").unwrap();
        fs::write(
            tmp.path().join("prefix"),
            b"static const char $item_name[] = // $item_file_size bytes\n",
        )
        .unwrap();
        let spec = EmbedSpec {
            output: path(&tmp, "out.c"),
            inputs: vec![path(&tmp, "logo.png")],
            item_prefix: Some(path(&tmp, "prefix")),
            ..EmbedSpec::default()
        };
        emit_code(&spec).unwrap();
        let got = fs::read_to_string(tmp.path().join("out.c")).unwrap();
        assert!(got.starts_with("static const char logo.png[] = // 2 bytes\n"));
        assert!(got.contains("\"\\x78\\x79\""));
    }

    #[test]
    fn test_parse_args() {
        let args: Vec<String> = ["out.c", "-comma", "-item_indent", "ind", "a", "b"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let spec = EmbedSpec::parse_args(&args).unwrap();
        assert_eq!(spec.output, "out.c");
        assert!(spec.comma_separate);
        assert_eq!(spec.item_indent.as_deref(), Some("ind"));
        assert_eq!(spec.inputs, vec!["a", "b"]);
        assert!(EmbedSpec::parse_args(&[]).is_err());
    }

    #[test]
    fn test_update_if_different_leaves_unchanged() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a"), b"Z").unwrap();
        let spec = EmbedSpec {
            output: path(&tmp, "out.c"),
            inputs: vec![path(&tmp, "a")],
            ..EmbedSpec::default()
        };
        emit_code(&spec).unwrap();
        let m1 = fs::metadata(tmp.path().join("out.c")).unwrap().modified().unwrap();
        emit_code(&spec).unwrap();
        let m2 = fs::metadata(tmp.path().join("out.c")).unwrap().modified().unwrap();
        assert_eq!(m1, m2);
    }
}
