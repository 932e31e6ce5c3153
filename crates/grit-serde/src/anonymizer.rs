//! Identifier obfuscation.
//!
//! An [`Anonymizer`] maps every anonymizable string (ids, names, tags,
//! country codes) to a short token on export and back on import. The map is
//! a bijection built lazily in first-seen order and persisted as a `;`
//! delimited side-table with one `real;token` pair per line.

use std::collections::HashMap;
use std::io::{Read, Write};

use grit_core::{GritError, GritResult};

pub trait Anonymizer: Send {
    /// Token for `value`, minted on first use.
    fn anonymize(&mut self, value: &str) -> String;

    /// Original value of `token`. Strings that are not tokens come back unchanged.
    fn deanonymize(&self, token: &str) -> String;

    /// Writes the mapping side-table.
    fn write(&self, sink: &mut dyn Write) -> GritResult<()>;

    /// True when tokens are the values themselves.
    fn is_identity(&self) -> bool {
        false
    }
}

/// No-op mapping used when anonymization is off.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityAnonymizer;

impl Anonymizer for IdentityAnonymizer {
    fn anonymize(&mut self, value: &str) -> String {
        value.to_string()
    }

    fn deanonymize(&self, token: &str) -> String {
        token.to_string()
    }

    fn write(&self, _sink: &mut dyn Write) -> GritResult<()> {
        Ok(())
    }

    fn is_identity(&self) -> bool {
        true
    }
}

/// Token of rank `n`: `A`..`Z`, `AA`..`AZ`, `BA`, ...
fn token(mut n: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (n % 26) as u8);
        n /= 26;
        if n == 0 {
            break;
        }
        n -= 1;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

fn csv_error(err: csv::Error) -> GritError {
    match err.into_kind() {
        csv::ErrorKind::Io(e) => GritError::Io(e),
        other => GritError::Parse(format!("Anonymization mapping: {:?}", other)),
    }
}

/// Bijective string-to-token map.
#[derive(Debug, Clone, Default)]
pub struct SimpleAnonymizer {
    /// Real values, indexed by token rank.
    values: Vec<String>,
    tokens: HashMap<String, String>,
    reverse: HashMap<String, String>,
}

impl SimpleAnonymizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a side-table written by [`Anonymizer::write`].
    pub fn read(source: impl Read) -> GritResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .from_reader(source);
        let mut anonymizer = Self::new();
        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            let (Some(value), Some(token)) = (record.get(0), record.get(1)) else {
                return Err(GritError::Parse(format!(
                    "Anonymization mapping: expected 'value;token', found {} field(s)",
                    record.len()
                )));
            };
            if anonymizer.tokens.contains_key(value) || anonymizer.reverse.contains_key(token) {
                return Err(GritError::Parse(format!(
                    "Anonymization mapping: '{}' or '{}' mapped twice",
                    value, token
                )));
            }
            anonymizer.insert(value.to_string(), token.to_string());
        }
        Ok(anonymizer)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn insert(&mut self, value: String, token: String) {
        self.tokens.insert(value.clone(), token.clone());
        self.reverse.insert(token, value.clone());
        self.values.push(value);
    }
}

impl Anonymizer for SimpleAnonymizer {
    fn anonymize(&mut self, value: &str) -> String {
        if let Some(token) = self.tokens.get(value) {
            return token.clone();
        }
        // skip ranks whose token was taken by a loaded table
        let mut rank = self.values.len();
        let mut candidate = token(rank);
        while self.reverse.contains_key(&candidate) {
            rank += 1;
            candidate = token(rank);
        }
        self.insert(value.to_string(), candidate.clone());
        candidate
    }

    fn deanonymize(&self, token: &str) -> String {
        self.reverse
            .get(token)
            .cloned()
            .unwrap_or_else(|| token.to_string())
    }

    fn write(&self, sink: &mut dyn Write) -> GritResult<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .from_writer(sink);
        for value in &self.values {
            writer
                .write_record([value.as_str(), self.tokens[value].as_str()])
                .map_err(csv_error)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_token_sequence() {
        assert_eq!(token(0), "A");
        assert_eq!(token(25), "Z");
        assert_eq!(token(26), "AA");
        assert_eq!(token(27), "AB");
        assert_eq!(token(52), "BA");
        assert_eq!(token(26 + 26 * 26), "AAA");
    }

    #[test]
    fn test_first_seen_order() {
        let mut anonymizer = SimpleAnonymizer::new();
        assert_eq!(anonymizer.anonymize("S1"), "A");
        assert_eq!(anonymizer.anonymize("VL1"), "B");
        assert_eq!(anonymizer.anonymize("S1"), "A");
        assert_eq!(anonymizer.len(), 2);
        assert_eq!(anonymizer.deanonymize("B"), "VL1");
        // not a token
        assert_eq!(anonymizer.deanonymize("ZZZ"), "ZZZ");
    }

    #[test]
    fn test_side_table_round_trip() {
        let mut anonymizer = SimpleAnonymizer::new();
        for value in ["GEN;1", "LOAD \"2\"", "FR"] {
            anonymizer.anonymize(value);
        }
        let mut table = Vec::new();
        anonymizer.write(&mut table).unwrap();

        let loaded = SimpleAnonymizer::read(table.as_slice()).unwrap();
        assert_eq!(loaded.deanonymize("A"), "GEN;1");
        assert_eq!(loaded.deanonymize("B"), "LOAD \"2\"");
        assert_eq!(loaded.deanonymize("C"), "FR");
    }

    #[test]
    fn test_loaded_table_keeps_minting_unused_tokens() {
        let table = "X;B\n";
        let mut anonymizer = SimpleAnonymizer::read(table.as_bytes()).unwrap();
        assert_eq!(anonymizer.anonymize("X"), "B");
        assert_eq!(anonymizer.anonymize("Y"), "C");
    }

    #[test]
    fn test_malformed_table() {
        let err = SimpleAnonymizer::read("only-one-field\n".as_bytes()).unwrap_err();
        assert!(matches!(err, GritError::Parse(_)));

        let err = SimpleAnonymizer::read("a;A\nb;A\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("mapped twice"));
    }

    #[test]
    fn test_identity() {
        let mut anonymizer = IdentityAnonymizer;
        assert_eq!(anonymizer.anonymize("G1"), "G1");
        assert_eq!(anonymizer.deanonymize("G1"), "G1");
        assert!(anonymizer.is_identity());
    }

    proptest! {
        #[test]
        fn anonymize_is_a_bijection(values in prop::collection::vec("[a-zA-Z0-9_ ;-]{1,12}", 1..40)) {
            let mut anonymizer = SimpleAnonymizer::new();
            let tokens: Vec<String> = values.iter().map(|v| anonymizer.anonymize(v)).collect();
            for (value, token) in values.iter().zip(&tokens) {
                prop_assert_eq!(&anonymizer.deanonymize(token), value);
            }

            let mut table = Vec::new();
            anonymizer.write(&mut table).unwrap();
            let loaded = SimpleAnonymizer::read(table.as_slice()).unwrap();
            for (value, token) in values.iter().zip(&tokens) {
                prop_assert_eq!(&loaded.deanonymize(token), value);
            }
        }
    }
}
