//! JSON media type allow-list.

/// Media types accepted for non-chunked stream bodies by default.
pub const DEFAULT_JSON_MIME_TYPES: &[&str] = &[
    "application/json",
    "application/x-json",
    "application/x-ndjson",
    "application/stream+json",
    "application/x-json-stream",
    "text/json",
];

/// Extract the media type from a `Content-Type` value, dropping parameters.
///
/// `"application/json; charset=utf-8"` becomes `"application/json"`.
pub fn media_type(content_type: &str) -> &str {
    content_type
        .split_once(';')
        .map_or(content_type, |(media, _)| media)
        .trim()
}

/// Closed set of media types a body may be decoded as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonMimeTypes {
    allowed: Vec<String>,
}

impl Default for JsonMimeTypes {
    fn default() -> Self {
        Self::new(DEFAULT_JSON_MIME_TYPES.iter().copied())
    }
}

impl JsonMimeTypes {
    /// Build an allow-list from exactly the given media types.
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: types
                .into_iter()
                .map(|t| t.into().trim().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Add one more accepted media type.
    pub fn allow(mut self, media: impl Into<String>) -> Self {
        let media = media.into().trim().to_ascii_lowercase();
        if !self.allowed.contains(&media) {
            self.allowed.push(media);
        }
        self
    }

    /// The accepted media types, lowercased.
    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    /// Check a `Content-Type` header value against the allow-list.
    ///
    /// On rejection returns the offending media type; a missing header is
    /// reported as an empty string.
    pub fn accepts(&self, content_type: Option<&str>) -> Result<(), String> {
        let media = content_type.map(media_type).unwrap_or_default();
        if self
            .allowed
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(media))
        {
            Ok(())
        } else {
            Err(media.to_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_strips_parameters() {
        assert_eq!(media_type("application/json; charset=utf-8"), "application/json");
        assert_eq!(media_type("  text/json "), "text/json");
        assert_eq!(media_type(""), "");
    }

    #[test]
    fn test_default_allow_list() {
        let types = JsonMimeTypes::default();
        for media in DEFAULT_JSON_MIME_TYPES {
            assert_eq!(types.accepts(Some(media)), Ok(()));
        }
        assert_eq!(types.accepts(Some("Application/JSON;charset=UTF-8")), Ok(()));
        assert_eq!(
            types.accepts(Some("text/html; charset=utf-8")),
            Err("text/html".to_owned())
        );
        assert_eq!(types.accepts(None), Err(String::new()));
    }

    #[test]
    fn test_custom_allow_list_is_closed() {
        let types = JsonMimeTypes::new(["application/vnd.events+json"]).allow("text/plain");
        assert_eq!(types.accepts(Some("text/plain")), Ok(()));
        assert_eq!(types.accepts(Some("application/vnd.events+json")), Ok(()));
        assert!(types.accepts(Some("application/json")).is_err());
        assert_eq!(types.allowed().len(), 2);
    }
}
