use crate::config::NamesConfig;
use regex::{Regex, RegexBuilder};

/// Characters trimmed from both ends of a cleaned name
const SEPARATORS: &[char] = &['-', ':', '|', ','];

/// Turns raw scraped headings into display names
pub trait NameNormalizer: Send + Sync {
    /// Returns the cleaned form of `raw`
    ///
    /// Implementations must be idempotent: `clean(clean(x)) == clean(x)`.
    fn clean(&self, raw: &str) -> String;
}

/// Default normalizer driven by the `[names]` config section
#[derive(Debug, Clone, Default)]
pub struct CatalogNameCleaner {
    strip: Vec<Regex>,
}

impl CatalogNameCleaner {
    /// Builds a cleaner that removes each phrase case-insensitively
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let strip = phrases
            .into_iter()
            .filter(|p| !p.as_ref().trim().is_empty())
            .filter_map(|p| {
                RegexBuilder::new(&regex::escape(p.as_ref().trim()))
                    .case_insensitive(true)
                    .build()
                    .ok()
            })
            .collect();
        Self { strip }
    }

    pub fn from_config(config: &NamesConfig) -> Self {
        Self::new(&config.strip_phrases)
    }
}

impl NameNormalizer for CatalogNameCleaner {
    fn clean(&self, raw: &str) -> String {
        let mut current = collapse_whitespace(raw);

        // Removing one phrase can splice together another, so repeat until stable
        loop {
            let mut next = current.clone();
            for phrase in &self.strip {
                next = phrase.replace_all(&next, " ").into_owned();
            }
            let next = collapse_whitespace(next.trim_matches(|c: char| {
                c.is_whitespace() || SEPARATORS.contains(&c)
            }));

            if next == current {
                return current;
            }
            current = next;
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
