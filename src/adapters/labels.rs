//! Label file parsing.
//!
//! Accepts the usual Coral/TFLite label formats, one entry per line:
//!
//! ```text
//! 0 background        0:background        background
//! 1 cat               1:cat               cat
//! ```
//!
//! The first line decides the format, as pycoral's `read_label_file`
//! does: a leading number makes every line `<id> <label>` (lines without
//! an id are skipped); otherwise every line is a bare label whose id is
//! its line number (blank lines included).

use std::collections::BTreeMap;
use std::fmt;
use std::io;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMap {
    labels: BTreeMap<u16, String>,
}

/// Borrowed display name for a class id.
pub enum LabelRef<'a> {
    Named(&'a str),
    Id(u16),
}

impl fmt::Display for LabelRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Id(id) => write!(f, "{id}"),
        }
    }
}

impl LabelMap {
    /// The first line picks the format for the whole file: if it reads
    /// as `<id> <label>` every line must, otherwise every line is a bare
    /// label keyed by its line index.
    pub fn parse(text: &str) -> Self {
        let numbered = text
            .lines()
            .next()
            .is_some_and(|first| split_id(first.trim()).is_some());

        let mut labels = BTreeMap::new();
        for (row, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if numbered {
                match split_id(line) {
                    Some((id, label)) => {
                        labels.insert(id, label.to_owned());
                    }
                    None => log::debug!("labels: line {} has no id, skipped", row + 1),
                }
            } else if let Ok(id) = u16::try_from(row) {
                labels.insert(id, line.to_owned());
            }
        }
        Self { labels }
    }

    pub fn load(path: &str) -> io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let map = Self::parse(&text);
        log::info!("labels: {} entries from {}", map.len(), path);
        Ok(map)
    }

    /// Label for `id`, falling back to the number itself.
    pub fn get(&self, id: u16) -> LabelRef<'_> {
        match self.labels.get(&id) {
            Some(name) => LabelRef::Named(name),
            None => LabelRef::Id(id),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Classes a model must score to cover every labelled id.
    pub fn class_count(&self) -> usize {
        self.labels
            .keys()
            .next_back()
            .map_or(0, |&max| usize::from(max) + 1)
    }
}

/// `"<digits><sep>+<label>"` where sep is whitespace or `:`.
fn split_id(line: &str) -> Option<(u16, &str)> {
    let sep = line.find(|c: char| c.is_whitespace() || c == ':')?;
    let (head, rest) = line.split_at(sep);
    if head.is_empty() || !head.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let label = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ':');
    if label.is_empty() {
        return None;
    }
    Some((head.parse().ok()?, label.trim_end()))
}
