use once_cell::sync::Lazy;
use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, Theme, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

const FALLBACK_THEME: &str = "base16-ocean.dark";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
    pub rgb: [u8; 3],
    pub bold: bool,
    pub italic: bool,
}

pub type HighlightedLine = Vec<Fragment>;

#[derive(Debug, Clone)]
pub struct Highlighter {
    theme: Theme,
}

impl Highlighter {
    pub fn new(theme_name: &str) -> Self {
        let theme = match THEME_SET.themes.get(theme_name) {
            Some(theme) => theme.clone(),
            None => {
                tracing::warn!("unknown code theme {:?}, using {}", theme_name, FALLBACK_THEME);
                THEME_SET
                    .themes
                    .get(FALLBACK_THEME)
                    .cloned()
                    .unwrap_or_default()
            }
        };
        Highlighter { theme }
    }

    /// Highlights `source` for the given fence language. Returns `None` when the
    /// tag is absent or names no known syntax, so callers render plain text.
    pub fn highlight(&self, source: &str, language: Option<&str>) -> Option<Vec<HighlightedLine>> {
        let syntax = SYNTAX_SET.find_syntax_by_token(language?)?;
        let mut highlighter = HighlightLines::new(syntax, &self.theme);

        let mut lines = Vec::new();
        for line in LinesWithEndings::from(source) {
            let ranges = match highlighter.highlight_line(line, &SYNTAX_SET) {
                Ok(ranges) => ranges,
                Err(e) => {
                    tracing::debug!("highlighting failed for {:?}: {}", syntax.name, e);
                    return None;
                }
            };
            let fragments = ranges
                .into_iter()
                .filter_map(|(style, text)| {
                    let text = text.trim_end_matches(['\n', '\r']);
                    if text.is_empty() {
                        return None;
                    }
                    Some(Fragment {
                        text: text.to_string(),
                        rgb: [style.foreground.r, style.foreground.g, style.foreground.b],
                        bold: style.font_style.contains(FontStyle::BOLD),
                        italic: style.font_style.contains(FontStyle::ITALIC),
                    })
                })
                .collect();
            lines.push(fragments);
        }
        Some(lines)
    }
}

impl Default for Highlighter {
    fn default() -> Self {
        Highlighter::new(FALLBACK_THEME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(lines: &[HighlightedLine]) -> Vec<String> {
        lines
            .iter()
            .map(|line| line.iter().map(|f| f.text.as_str()).collect())
            .collect()
    }

    #[test]
    fn test_known_language_is_highlighted() {
        let highlighter = Highlighter::default();
        let lines = highlighter
            .highlight("fn main() {}\nlet x = 1;", Some("rust"))
            .unwrap();
        assert_eq!(joined(&lines), vec!["fn main() {}", "let x = 1;"]);
        assert!(lines[0].len() > 1);
    }

    #[test]
    fn test_missing_or_unknown_language_falls_back() {
        let highlighter = Highlighter::default();
        assert!(highlighter.highlight("plain", None).is_none());
        assert!(highlighter.highlight("plain", Some("no-such-lang")).is_none());
    }

    #[test]
    fn test_unknown_theme_uses_fallback() {
        let highlighter = Highlighter::new("does-not-exist");
        assert!(highlighter.highlight("x = 1", Some("py")).is_some());
    }
}
