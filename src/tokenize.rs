//! The tokenization boundary and its stock implementations.
//!
//! A [`Tokenizer`] turns a document path into one whitespace-delimited token string. The
//! caching corpus splits that string into tokens; implementations only need to honour the
//! delimiter contract.

use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use bstr::ByteSlice;
use log::debug;
use regex::Regex;

use crate::error::{DocvecError, Result};

/// Capability that reduces a document on disk to whitespace-delimited tokens.
pub trait Tokenizer {
    /// Tokenizes the document at `path`.
    ///
    /// Failures are reported as [`DocvecError::Tokenization`] so the corpus can apply its
    /// failure policy per document.
    fn tokenize(&self, path: &Path) -> Result<String>;
}

impl<T: Tokenizer + ?Sized> Tokenizer for &T {
    fn tokenize(&self, path: &Path) -> Result<String> {
        (**self).tokenize(path)
    }
}

impl<T: Tokenizer + ?Sized> Tokenizer for Box<T> {
    fn tokenize(&self, path: &Path) -> Result<String> {
        (**self).tokenize(path)
    }
}

/// Adapts a closure into a [`Tokenizer`].
pub struct FnTokenizer<F>(pub F);

impl<F> Tokenizer for FnTokenizer<F>
where
    F: Fn(&Path) -> Result<String>,
{
    fn tokenize(&self, path: &Path) -> Result<String> {
        (self.0)(path)
    }
}

impl<F> fmt::Debug for FnTokenizer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnTokenizer")
    }
}

/// Converts raw tokenizer output into a token string.
///
/// Trailing NUL terminators are dropped and invalid UTF-8 is replaced rather than rejected.
#[must_use]
pub fn decode_token_bytes(bytes: &[u8]) -> String {
    bytes
        .trim_end_with(|ch| ch == '\0')
        .to_str_lossy()
        .into_owned()
}

/// Invokes an external tokenization program once per document.
///
/// The program receives the configured arguments followed by the document path and must print
/// the token string on stdout. A non-zero exit status is a tokenization failure. There is no
/// timeout: a hung program blocks the pass.
#[derive(Debug, Clone)]
pub struct CommandTokenizer {
    program: PathBuf,
    args: Vec<OsString>,
}

impl CommandTokenizer {
    /// Creates a tokenizer running `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends fixed arguments placed before the document path.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The program this tokenizer runs.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Tokenizer for CommandTokenizer {
    fn tokenize(&self, path: &Path) -> Result<String> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| {
                DocvecError::tokenization(
                    path,
                    format!("failed to run {}: {err}", self.program.display()),
                )
            })?;
        if !output.status.success() {
            let stderr = decode_token_bytes(&output.stderr);
            return Err(DocvecError::tokenization(
                path,
                format!(
                    "{} exited with {}: {}",
                    self.program.display(),
                    output.status,
                    stderr.trim()
                ),
            ));
        }
        Ok(decode_token_bytes(&output.stdout))
    }
}

/// Built-in best-effort word tokenizer for HTML documents.
///
/// Markup is stripped with patterns rather than parsed. `<math>` and `<cite>` elements become
/// the placeholder words `mathformula` and `citationelement`; scripts, styles, and tables are
/// dropped. Words are lowercased and purely numeric words become `NUM`.
#[derive(Debug, Clone)]
pub struct MarkupTokenizer {
    replacements: Vec<(Regex, &'static str)>,
}

impl Default for MarkupTokenizer {
    fn default() -> Self {
        let patterns = [
            (r"(?is)<script\b.*?</script\s*>", " "),
            (r"(?is)<style\b.*?</style\s*>", " "),
            (r"(?is)<table\b.*?</table\s*>", " "),
            (r"(?is)<math\b.*?</math\s*>", " mathformula "),
            (r"(?is)<cite\b.*?</cite\s*>", " citationelement "),
            (r"(?s)<!--.*?-->", " "),
            (r"(?s)<[^>]*>", " "),
            (r"&#?[A-Za-z0-9]+;", " "),
        ];
        let replacements = patterns
            .into_iter()
            .map(|(pattern, replacement)| {
                (
                    Regex::new(pattern).expect("valid markup pattern"),
                    replacement,
                )
            })
            .collect();
        Self { replacements }
    }
}

impl MarkupTokenizer {
    /// Creates the tokenizer with its stock patterns.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokenizes markup already held in memory.
    #[must_use]
    pub fn tokenize_markup(&self, markup: &str) -> String {
        let mut text = markup.to_string();
        for (pattern, replacement) in &self.replacements {
            text = pattern.replace_all(&text, *replacement).into_owned();
        }
        let mut tokens = String::with_capacity(text.len() / 2);
        for word in text
            .split(|ch: char| !ch.is_alphanumeric())
            .filter(|word| !word.is_empty())
        {
            if !tokens.is_empty() {
                tokens.push(' ');
            }
            if word.chars().all(|ch| ch.is_ascii_digit()) {
                tokens.push_str("NUM");
            } else {
                tokens.extend(word.chars().flat_map(char::to_lowercase));
            }
        }
        tokens
    }
}

impl Tokenizer for MarkupTokenizer {
    fn tokenize(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path)
            .map_err(|err| DocvecError::tokenization(path, format!("unreadable document: {err}")))?;
        let tokens = self.tokenize_markup(&bytes.to_str_lossy());
        debug!(
            "tokenized {} into {} bytes of tokens",
            path.display(),
            tokens.len()
        );
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn decode_strips_nul_terminator() {
        assert_eq!(decode_token_bytes(b"alpha beta\0"), "alpha beta");
        assert_eq!(decode_token_bytes(b"alpha\0\0"), "alpha");
        assert_eq!(decode_token_bytes(b""), "");
    }

    #[test]
    fn decode_replaces_invalid_utf8() {
        let decoded = decode_token_bytes(b"caf\xFF ok");
        assert!(decoded.ends_with(" ok"));
        assert!(decoded.starts_with("caf"));
    }

    #[test]
    fn markup_tokenizer_strips_tags_and_normalises_words() {
        let tokenizer = MarkupTokenizer::new();
        let html = r#"<html><head><style>p { color: red; }</style></head>
            <body><p class="ltx_para">The Energy is <math><mi>E</mi></math> in 2009 &amp; later
            <cite>[1]</cite>.</p><table><tr><td>skip</td></tr></table></body></html>"#;
        assert_eq!(
            tokenizer.tokenize_markup(html),
            "the energy is mathformula in NUM later citationelement"
        );
    }

    #[test]
    fn markup_tokenizer_reads_files() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("doc.html");
        fs::write(&path, "<p>Hello World</p>").expect("write doc");
        let tokens = MarkupTokenizer::new().tokenize(&path).expect("tokenize");
        assert_eq!(tokens, "hello world");
    }

    #[test]
    fn markup_tokenizer_reports_missing_files() {
        let dir = tempdir().expect("tempdir");
        let err = MarkupTokenizer::new()
            .tokenize(&dir.path().join("missing.html"))
            .expect_err("missing file");
        assert!(err.is_per_document());
    }

    #[test]
    fn fn_tokenizer_delegates_to_closure() {
        let tokenizer = FnTokenizer(|path: &Path| -> Result<String> { Ok(path.display().to_string()) });
        assert_eq!(tokenizer.tokenize(Path::new("a b")).unwrap(), "a b");
    }

    #[cfg(unix)]
    #[test]
    fn command_tokenizer_reads_program_stdout() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("doc.txt");
        fs::write(&path, "one two three").expect("write doc");
        let tokens = CommandTokenizer::new("cat").tokenize(&path).expect("run cat");
        assert_eq!(tokens, "one two three");
    }

    #[cfg(unix)]
    #[test]
    fn command_tokenizer_reports_failing_program() {
        let dir = tempdir().expect("tempdir");
        let err = CommandTokenizer::new("cat")
            .tokenize(&dir.path().join("missing.txt"))
            .expect_err("cat should fail on a missing file");
        assert!(matches!(err, DocvecError::Tokenization { .. }));
    }
}
