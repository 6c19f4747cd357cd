//! Parser for the plain-text model dump.
//!
//! The dump is a series of sections:
//!
//! ```text
//! FILEHEADER = {
//!   magic: lCRF
//!   ...
//! }
//!
//! LABELS = {
//!       0: sunny
//! }
//!
//! TRANSITIONS = {
//!   (1) sunny --> rainy: -0.250000
//! }
//! ```

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

static SECTION_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(FILEHEADER|LABELS|ATTRIBUTES|TRANSITIONS|STATE_FEATURES) = \{$")
        .expect("Invalid regex: section start")
});
static HEADER_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w+): (.*)$").expect("Invalid regex: header entry"));
static ID_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+): (.*)$").expect("Invalid regex: id entry"));
static FEATURE_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\((\d+)\) (.+) --> (.+): (\S+)$").expect("Invalid regex: feature entry")
});

/// Structured view of a model dump
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDump {
    /// `FILEHEADER` entries, values kept as text
    pub header: HashMap<String, String>,
    /// Label name to label id
    pub labels: HashMap<String, u32>,
    /// Attribute name to attribute id
    pub attributes: HashMap<String, u32>,
    /// `(from, to)` label pair to transition weight
    pub transitions: HashMap<(String, String), f64>,
    /// `(attribute, label)` pair to state feature weight
    pub state_features: HashMap<(String, String), f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Labels,
    Attributes,
    Transitions,
    StateFeatures,
}

/// Incremental line parser producing a [`ParsedDump`]
#[derive(Debug, Default)]
pub struct DumpParser {
    section: Option<Section>,
    result: ParsedDump,
}

impl DumpParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the next line of the dump.
    pub fn feed(&mut self, line: &str) -> Result<()> {
        let line = line.trim_start().trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Ok(());
        }
        let fail = || Error::DumpParse {
            line: line.to_string(),
        };

        if let Some(caps) = SECTION_START.captures(line) {
            self.section = Some(match &caps[1] {
                "FILEHEADER" => Section::Header,
                "LABELS" => Section::Labels,
                "ATTRIBUTES" => Section::Attributes,
                "TRANSITIONS" => Section::Transitions,
                _ => Section::StateFeatures,
            });
            return Ok(());
        }
        if line == "}" {
            self.section = None;
            return Ok(());
        }

        let result = &mut self.result;
        match self.section.ok_or_else(fail)? {
            Section::Header => {
                let caps = HEADER_ENTRY.captures(line).ok_or_else(fail)?;
                result.header.insert(caps[1].to_string(), caps[2].to_string());
            }
            Section::Labels | Section::Attributes => {
                let caps = ID_ENTRY.captures(line).ok_or_else(fail)?;
                let id: u32 = caps[1].parse().map_err(|_| fail())?;
                let table = if self.section == Some(Section::Labels) {
                    &mut result.labels
                } else {
                    &mut result.attributes
                };
                table.insert(caps[2].to_string(), id);
            }
            Section::Transitions | Section::StateFeatures => {
                let caps = FEATURE_ENTRY.captures(line).ok_or_else(fail)?;
                let weight: f64 = caps[4].parse().map_err(|_| fail())?;
                let key = (caps[2].to_string(), caps[3].to_string());
                let table = if self.section == Some(Section::Transitions) {
                    &mut result.transitions
                } else {
                    &mut result.state_features
                };
                table.insert(key, weight);
            }
        }
        Ok(())
    }

    pub fn finish(self) -> ParsedDump {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const DUMP: &str = "FILEHEADER = {
  magic: lCRF
  version: 100
  off_features: 0x30
}

LABELS = {
      0: B-LOC
      1: O
}

ATTRIBUTES = {
      0: w[0]=Paris
      1: w[-1]:w[0]=in|Paris
}

TRANSITIONS = {
  (1) B-LOC --> O: 1.250000
  (1) O --> O: -0.500000
}

STATE_FEATURES = {
  (0) w[0]=Paris --> B-LOC: 2.000000
  (0) w[-1]:w[0]=in|Paris --> O: -1.5e-3
}
";

    fn parse(text: &str) -> Result<ParsedDump> {
        let mut parser = DumpParser::new();
        for line in text.lines() {
            parser.feed(line)?;
        }
        Ok(parser.finish())
    }

    #[test]
    fn test_parse_sections() {
        let dump = parse(DUMP).unwrap();
        assert_eq!(dump.header["magic"], "lCRF");
        assert_eq!(dump.header["off_features"], "0x30");
        assert_eq!(dump.labels["O"], 1);
        assert_eq!(dump.attributes["w[-1]:w[0]=in|Paris"], 1);
        assert_eq!(
            dump.transitions[&("B-LOC".to_string(), "O".to_string())],
            1.25
        );
        assert_eq!(
            dump.state_features[&("w[-1]:w[0]=in|Paris".to_string(), "O".to_string())],
            -0.0015
        );
        assert_eq!(dump.state_features.len(), 2);
    }

    #[test]
    fn test_unmatched_line_is_an_error() {
        let err = parse("LABELS = {\n  garbage\n}\n").unwrap_err();
        assert!(matches!(err, Error::DumpParse { ref line } if line == "garbage"));
        assert!(parse("  0: outside\n").is_err());
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse("").unwrap(), ParsedDump::default());
    }
}
