//! Terminal syntax highlighting for function source.

use anyhow::Context;
use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::{as_24_bit_terminal_escaped, LinesWithEndings};

const THEME: &str = "base16-eighties.dark";

/// Resets all terminal attributes.
const RESET: &str = "\x1b[0m";

/// Loaded syntax definitions and theme.
///
/// Loading the bundled sets is slow, so one instance is built at startup
/// and shared through the application state.
pub struct Highlighter {
    syntaxes: SyntaxSet,
    theme: Theme,
}

impl Highlighter {
    pub fn new() -> anyhow::Result<Self> {
        let syntaxes = SyntaxSet::load_defaults_newlines();
        let mut themes = ThemeSet::load_defaults();
        let theme = themes
            .themes
            .remove(THEME)
            .with_context(|| format!("bundled theme {THEME} missing"))?;
        Ok(Self { syntaxes, theme })
    }

    /// Colorize `source` with 24-bit ANSI escapes, picking the syntax by
    /// file `extension`.  Unknown extensions are rendered as plain text.
    pub fn highlight(&self, source: &str, extension: &str) -> anyhow::Result<String> {
        let syntax = self
            .syntaxes
            .find_syntax_by_extension(extension)
            .unwrap_or_else(|| self.syntaxes.find_syntax_plain_text());
        let mut lines = HighlightLines::new(syntax, &self.theme);

        let mut out = String::with_capacity(source.len() * 2);
        for line in LinesWithEndings::from(source) {
            let ranges = lines
                .highlight_line(line, &self.syntaxes)
                .context("highlighting source")?;
            out.push_str(&as_24_bit_terminal_escaped(&ranges, false));
        }
        out.push_str(RESET);
        Ok(out)
    }
}
