use std::fmt;
use std::str::FromStr;

use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::GovernanceError;

pub const LABEL_LEN: usize = 32;

/// Fixed-size proposal name, zero padded on the right.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Label([u8; LABEL_LEN]);

impl Label {
    /// Build a label from UTF-8 text. Fails when the text does not fit.
    pub fn new(name: &str) -> Result<Self, GovernanceError> {
        Self::from_bytes(name.as_bytes())
    }

    /// Build a label from raw UTF-8 bytes, padding with zeros.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GovernanceError> {
        if std::str::from_utf8(bytes).is_err() {
            return Err(GovernanceError::LabelNotUtf8);
        }
        if bytes.len() > LABEL_LEN {
            return Err(GovernanceError::LabelTooLong {
                len: bytes.len(),
                max: LABEL_LEN,
            });
        }
        let mut raw = [0u8; LABEL_LEN];
        raw[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8; LABEL_LEN] {
        &self.0
    }

    /// Render the full padded label as hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn trimmed(&self) -> &[u8] {
        let end = self
            .0
            .iter()
            .rposition(|b| *b != 0)
            .map_or(0, |pos| pos + 1);
        &self.0[..end]
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.trimmed()))
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Label({:?})", self.to_string())
    }
}

impl FromStr for Label {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for Label {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        Label::new(&text).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names_are_padded_and_trimmed_on_display() {
        let label = Label::new("yes").unwrap();
        assert_eq!(&label.as_bytes()[..3], b"yes");
        assert!(label.as_bytes()[3..].iter().all(|b| *b == 0));
        assert_eq!(label.to_string(), "yes");
        assert_eq!(label.to_hex().len(), 64);
    }

    #[test]
    fn oversized_names_are_rejected() {
        let err = Label::new(&"x".repeat(33)).unwrap_err();
        assert_eq!(err, GovernanceError::LabelTooLong { len: 33, max: 32 });
        assert!(Label::new(&"x".repeat(32)).is_ok());
    }

    #[test]
    fn raw_bytes_must_be_utf8() {
        let err = Label::from_bytes(&[0xff; LABEL_LEN]).unwrap_err();
        assert_eq!(err, GovernanceError::LabelNotUtf8);

        let label = Label::from_bytes("ja\u{00e9}".as_bytes()).unwrap();
        let json = serde_json::to_string(&label).unwrap();
        let back: Label = serde_json::from_str(&json).unwrap();
        assert_eq!(back, label);
    }

    #[test]
    fn labels_serialize_as_strings() {
        let label: Label = "proposal-a".parse().unwrap();
        let json = serde_json::to_string(&label).unwrap();
        assert_eq!(json, "\"proposal-a\"");
        let back: Label = serde_json::from_str(&json).unwrap();
        assert_eq!(back, label);
    }
}
