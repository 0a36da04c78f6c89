use std::fmt;

use serde::{Deserialize, Serialize};

/// The Twitch channel logins an exporter instance watches.
///
/// Logins are lowercased like Helix reports them. Blank entries are dropped
/// on insert and duplicates are ignored, so the list can be fed straight from
/// repeated CLI flags or comma separated env values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelNames(Vec<String>);

impl ChannelNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: &str) {
        let value = value.trim().to_lowercase();
        if value.is_empty() || self.0.contains(&value) {
            return;
        }
        self.0.push(value);
    }

    pub fn extend_csv(&mut self, values: &str) {
        for value in values.split(',') {
            self.push(value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<S: AsRef<str>> FromIterator<S> for ChannelNames {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut names = Self::new();
        for value in iter {
            names.push(value.as_ref());
        }
        names
    }
}

impl<'a> IntoIterator for &'a ChannelNames {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ChannelNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(" "))
    }
}
