use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

pub const REQUIRED: &str = "This field is required.";
pub const BLANK: &str = "This field may not be blank.";

/// Problems with a request payload, keyed by field name.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Serialize, Error)]
#[serde(transparent)]
#[error("Invalid fields: {}", .0.keys().copied().collect::<Vec<_>>().join(", "))]
pub struct FieldErrors(BTreeMap<&'static str, Vec<String>>);

impl FieldErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// `Ok(value)` if no errors were collected.
    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

/// Whitespace-trimmed `value`, or the error message for a blank one.
pub fn non_blank(value: &str) -> Result<String, &'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(BLANK)
    } else {
        Ok(trimmed.to_owned())
    }
}

pub fn max_chars(value: String, max: usize) -> Result<String, String> {
    if value.chars().count() <= max {
        Ok(value)
    } else {
        Err(format!("Ensure this field has no more than {max} characters."))
    }
}

#[cfg(test)]
mod tests {
    use crate::validation::{BLANK, FieldErrors, REQUIRED, max_chars, non_blank};

    #[test]
    fn collects_messages_per_field() {
        let mut errors = FieldErrors::new();
        assert!(errors.clone().into_result(()).is_ok());

        errors.add("content", REQUIRED);
        errors.add("title", "too long");
        errors.add("content", BLANK);

        assert_eq!(errors.get("content").unwrap(), [REQUIRED, BLANK]);
        assert_eq!(errors.to_string(), "Invalid fields: content, title");
        assert_eq!(
            serde_json::to_value(&errors).unwrap(),
            serde_json::json!({ "content": [REQUIRED, BLANK], "title": ["too long"] })
        );
        assert!(errors.into_result(()).is_err());
    }

    #[test]
    fn blank_and_length() {
        assert_eq!(non_blank("  hi \n"), Ok("hi".to_owned()));
        assert_eq!(non_blank(" \t"), Err(BLANK));
        assert!(max_chars("abc".to_owned(), 3).is_ok());
        assert!(max_chars("abcd".to_owned(), 3).is_err());
    }
}
