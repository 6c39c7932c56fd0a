//! Brief loading.

use std::path::Path;

use tracing::debug;

use articleforge_shared::{ArticleForgeError, Brief, Result};

/// Read-only source of content briefs.
pub trait BriefSource {
    fn load(&self) -> Result<Brief>;
}

/// A brief stored as a JSON file.
#[derive(Debug, Clone)]
pub struct JsonBriefFile<P> {
    path: P,
}

impl<P: AsRef<Path>> JsonBriefFile<P> {
    pub fn new(path: P) -> Self {
        Self { path }
    }
}

impl<P: AsRef<Path>> BriefSource for JsonBriefFile<P> {
    fn load(&self) -> Result<Brief> {
        let path = self.path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ArticleForgeError::io(path, e))?;
        let brief = parse_brief(&raw)?;
        debug!(path = %path.display(), brief_id = %brief.id, sections = brief.sections.len(), "brief loaded");
        Ok(brief)
    }
}

/// Parse and validate a JSON brief.
pub fn parse_brief(json: &str) -> Result<Brief> {
    let brief: Brief = serde_json::from_str(json)
        .map_err(|e| ArticleForgeError::parse(format!("invalid brief: {e}")))?;
    brief.validate()?;
    Ok(brief)
}

#[cfg(test)]
mod tests {
    use super::*;
    use articleforge_shared::{AttributeCategory, FormatCode};

    const BRIEF: &str = r#"{
        "id": "solar-101",
        "title": "Solar Panels",
        "central_entity": "solar panel",
        "eav_triples": [
            {"entity": "solar panel", "attribute": "lifespan", "value": "25 years"}
        ],
        "sections": [
            {
                "key": "what",
                "heading": "What is a solar panel?",
                "level": 2,
                "order": 1,
                "attribute_category": "ROOT",
                "format_code": "FS",
                "query_priority": 80
            }
        ]
    }"#;

    #[test]
    fn parses_a_brief() {
        let brief = parse_brief(BRIEF).unwrap();
        assert_eq!(brief.id, "solar-101");
        assert_eq!(brief.eav_triples.len(), 1);
        let s = &brief.sections[0];
        assert_eq!(s.attribute_category, AttributeCategory::Root);
        assert_eq!(s.format_code, FormatCode::Fs);
        assert!(s.required_phrases.is_empty());
    }

    #[test]
    fn rejects_malformed_and_invalid_briefs() {
        assert!(matches!(
            parse_brief("{not json").unwrap_err(),
            ArticleForgeError::Parse { .. }
        ));
        let empty = r#"{"id": "x", "title": "T", "central_entity": "e", "sections": []}"#;
        assert!(matches!(
            parse_brief(empty).unwrap_err(),
            ArticleForgeError::Validation { .. }
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = JsonBriefFile::new("/nonexistent/brief.json").load().unwrap_err();
        assert!(matches!(err, ArticleForgeError::Io { .. }));
    }

    #[test]
    fn loads_from_disk() {
        let path = std::env::temp_dir().join(format!("articleforge-brief-{}.json", std::process::id()));
        std::fs::write(&path, BRIEF).unwrap();
        let brief = JsonBriefFile::new(&path).load().unwrap();
        assert_eq!(brief.title, "Solar Panels");
        let _ = std::fs::remove_file(&path);
    }
}
