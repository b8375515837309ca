// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection request types and schema validation

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

pub const MISSING_FIELD: &str = "Missing data for required field.";
pub const NULL_FIELD: &str = "Field may not be null.";
pub const NOT_A_STRING: &str = "Not a valid string.";
pub const EMPTY_STRING: &str = "Shorter than minimum length 1.";
pub const UNKNOWN_FIELD: &str = "Unknown field.";
pub const INVALID_INPUT_TYPE: &str = "Invalid input type.";

/// Key used for errors that concern the body as a whole
pub const SCHEMA_KEY: &str = "_schema";

/// Field name -> messages, in the order the problems were found
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldErrors {
    entries: Vec<(String, Vec<String>)>,
}

impl FieldErrors {
    pub fn add(&mut self, field: &str, message: &str) {
        match self.entries.iter_mut().find(|(name, _)| name == field) {
            Some((_, messages)) => messages.push(message.to_string()),
            None => self
                .entries
                .push((field.to_string(), vec![message.to_string()])),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn fields(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn messages(&self, field: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, messages)| messages.as_slice())
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(name, messages)| {
                    (
                        name.clone(),
                        Value::Array(messages.iter().cloned().map(Value::String).collect()),
                    )
                })
                .collect(),
        )
    }
}

impl Serialize for FieldErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, messages) in &self.entries {
            map.serialize_entry(name, messages)?;
        }
        map.end()
    }
}

/// Body of `POST /detect`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionRequest {
    /// Key of the photo inside the bucket
    pub photo: String,
}

impl DetectionRequest {
    /// Validate a parsed JSON body against the request schema.
    ///
    /// All problems are reported at once: `photo` must be present, a string
    /// and non-empty, and no other fields are accepted.
    pub fn from_json(body: &Value) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::default();

        let object = match body.as_object() {
            Some(object) => object,
            None => {
                errors.add(SCHEMA_KEY, INVALID_INPUT_TYPE);
                return Err(errors);
            }
        };

        let photo = match object.get("photo") {
            None => {
                errors.add("photo", MISSING_FIELD);
                None
            }
            Some(Value::Null) => {
                errors.add("photo", NULL_FIELD);
                None
            }
            Some(Value::String(s)) if s.is_empty() => {
                errors.add("photo", EMPTY_STRING);
                None
            }
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                errors.add("photo", NOT_A_STRING);
                None
            }
        };

        for key in object.keys().filter(|key| key.as_str() != "photo") {
            errors.add(key, UNKNOWN_FIELD);
        }

        match photo {
            Some(photo) if errors.is_empty() => Ok(Self { photo }),
            _ => Err(errors),
        }
    }
}
