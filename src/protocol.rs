//! Wire protocol: one `|`-separated event per line

use std::fmt;

/// Bytes per megabyte used when converting `uss` to the model's unit.
pub const BYTES_PER_MB: f64 = 1_048_576.0;

const FIELD_SEPARATOR: char = '|';
const NAME_KEY: &str = "name";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    New,
    Update,
    Old,
}

impl EventKind {
    /// Matches the leading token of a line. Case-sensitive.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "new" => Some(EventKind::New),
            "update" => Some(EventKind::Update),
            "old" => Some(EventKind::Old),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::New => "new",
            EventKind::Update => "update",
            EventKind::Old => "old",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered key/value pairs of one event. Setting an existing key replaces
/// its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    entries: Vec<(String, String)>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the mapping from the tokens following the kind discriminator.
    ///
    /// `key=value` tokens are split at the first `=`. A token without `=` is
    /// a fragment of a process name that itself contained `|`, and is glued
    /// back onto `name` with a single space. Fragments seen before any
    /// `name` are dropped.
    pub fn parse<'a, I>(tokens: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut fields = Fields::new();
        for token in tokens {
            match token.split_once('=') {
                Some((key, value)) => fields.set(key, value),
                None => {
                    if let Some(name) = fields.get_mut(NAME_KEY) {
                        name.push(' ');
                        name.push_str(token);
                    }
                }
            }
        }
        fields
    }

    pub fn set(&mut self, key: &str, value: &str) {
        match self.entries.iter().position(|(k, _)| k == key) {
            Some(index) => self.entries[index].1 = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut String> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub fields: Fields,
}

impl Event {
    pub fn new(kind: EventKind, fields: Fields) -> Self {
        Self { kind, fields }
    }

    /// Decodes one in-block line. `None` means the kind token was not
    /// recognized and the line should be ignored.
    pub fn decode(line: &str) -> Option<Self> {
        let mut tokens = line.split(FIELD_SEPARATOR);
        let kind = EventKind::from_token(tokens.next()?)?;
        Some(Self::new(kind, Fields::parse(tokens)))
    }

    pub fn pid(&self) -> Option<u32> {
        self.parse_field("pid")
    }

    pub fn ppid(&self) -> Option<u32> {
        self.parse_field("ppid")
    }

    pub fn uss_bytes(&self) -> Option<u64> {
        self.parse_field("uss")
    }

    pub fn uss_mb(&self) -> Option<f64> {
        self.uss_bytes().map(|bytes| bytes as f64 / BYTES_PER_MB)
    }

    pub fn name(&self) -> Option<&str> {
        self.fields.get(NAME_KEY)
    }

    fn parse_field<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.fields.get(key)?.trim().parse().ok()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for (key, value) in self.fields.iter() {
            write!(f, "{}{}={}", FIELD_SEPARATOR, key, value)?;
        }
        Ok(())
    }
}

/// Decodes one in-block line, see [`Event::decode`].
pub fn decode(line: &str) -> Option<Event> {
    Event::decode(line)
}
