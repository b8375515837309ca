// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Class index to label name table shipped with the detection weights

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// ONNX metadata key under which YOLO exports store class names
pub const NAMES_METADATA_KEY: &str = "names";

/// Fixed class-index -> name mapping owned by the model artifact
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelMap {
    names: BTreeMap<usize, String>,
}

impl LabelMap {
    /// Build from names listed in class-index order
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names
                .into_iter()
                .enumerate()
                .map(|(idx, name)| (idx, name.into()))
                .collect(),
        }
    }

    /// Build from explicit `(index, name)` pairs
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (usize, S)>,
        S: Into<String>,
    {
        Self {
            names: pairs
                .into_iter()
                .map(|(idx, name)| (idx, name.into()))
                .collect(),
        }
    }

    /// Parse the `names` metadata value written by YOLO exporters,
    /// e.g. `{0: 'apple', 1: 'banana', 2: "chef's knife"}`
    pub fn from_metadata(raw: &str) -> Result<Self> {
        let body = raw.trim();
        let body = body
            .strip_prefix('{')
            .and_then(|b| b.strip_suffix('}'))
            .context("names metadata must be a dict literal")?;

        let mut names = BTreeMap::new();
        let mut rest = body.trim_start();

        while !rest.is_empty() {
            let colon = rest
                .find(':')
                .with_context(|| format!("missing ':' in names entry near '{}'", rest))?;
            let idx: usize = rest[..colon]
                .trim()
                .parse()
                .with_context(|| format!("invalid class index '{}'", rest[..colon].trim()))?;

            rest = rest[colon + 1..].trim_start();
            let quote = match rest.chars().next() {
                Some(q @ ('\'' | '"')) => q,
                _ => bail!("class name for index {} is not quoted", idx),
            };
            let (name, consumed) = read_quoted(&rest[1..], quote)
                .with_context(|| format!("unterminated class name for index {}", idx))?;
            names.insert(idx, name);

            rest = rest[1 + consumed..].trim_start();
            if let Some(stripped) = rest.strip_prefix(',') {
                rest = stripped.trim_start();
            } else if !rest.is_empty() {
                bail!("unexpected content after index {}: '{}'", idx, rest);
            }
        }

        if names.is_empty() {
            bail!("names metadata contains no classes");
        }

        Ok(Self { names })
    }

    /// Parse a labels file holding one class name per line
    pub fn from_lines(contents: &str) -> Result<Self> {
        let mut names: Vec<&str> = contents.lines().map(str::trim).collect();
        // Blank lines inside the file keep their index; trailing ones are dropped
        while names.last().is_some_and(|line| line.is_empty()) {
            names.pop();
        }

        if names.is_empty() {
            bail!("labels file is empty");
        }

        Ok(Self::from_names(names))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read labels file {}", path.display()))?;
        Self::from_lines(&contents)
    }

    /// Label for a class index; unknown indices get a synthetic name
    pub fn label_for(&self, class_id: usize) -> String {
        self.names
            .get(&class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }

    pub fn get(&self, class_id: usize) -> Option<&str> {
        self.names.get(&class_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Read a Python string literal body up to the closing `quote`, resolving
/// backslash escapes. Returns the text and the bytes consumed, closing quote
/// included.
fn read_quoted(input: &str, quote: char) -> Option<(String, usize)> {
    let mut text = String::new();
    let mut chars = input.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, escaped) = chars.next()?;
                match escaped {
                    'n' => text.push('\n'),
                    't' => text.push('\t'),
                    '\\' | '\'' | '"' => text.push(escaped),
                    other => {
                        text.push('\\');
                        text.push(other);
                    }
                }
            }
            c if c == quote => return Some((text, i + c.len_utf8())),
            c => text.push(c),
        }
    }

    None
}
