//! Core data types shared across the pipeline.
//!
//! `BookSummary` comes from the catalog search, `HoldingRecord` and `Citation`
//! from holdings inference, `ShelfImage` from the shelf visualizer.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

/// Base URL of the cover image service.
pub const COVERS_BASE_URL: &str = "https://covers.openlibrary.org/b/id";

/// Cover image size token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverSize {
    /// Used in result listings.
    Medium,
    /// Used in the detail view.
    Large,
}

impl CoverSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Medium => "M",
            Self::Large => "L",
        }
    }
}

/// One candidate book from the bibliographic search.
///
/// Field names follow the catalog's wire format so cached entries can be
/// written and read back without a separate schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSummary {
    /// Stable catalog identifier (e.g. `/works/OL45804W`).
    pub key: String,
    pub title: String,
    #[serde(rename = "author_name", default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(rename = "cover_i", default, skip_serializing_if = "Option::is_none")]
    pub cover_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_publish_year: Option<i32>,
}

impl BookSummary {
    /// Cover image URL, or `None` when the book has no cover.
    pub fn cover_url(&self, size: CoverSize) -> Option<String> {
        self.cover_id
            .map(|id| format!("{COVERS_BASE_URL}/{id}-{}.jpg", size.as_str()))
    }

    /// Authors joined for display.
    pub fn display_authors(&self) -> String {
        match &self.authors {
            Some(names) if !names.is_empty() => names.join(", "),
            _ => "Unknown author".into(),
        }
    }
}

impl std::fmt::Display for BookSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} by {}", self.title, self.display_authors())?;
        if let Some(year) = self.first_publish_year {
            write!(f, " ({year})")?;
        }
        Ok(())
    }
}

/// A physical copy of a book at a specific library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldingRecord {
    pub library: String,
    pub address: String,
    pub call_number: String,
    /// Free text: the upstream may emit any label.
    pub availability: String,
    /// How to find the shelf once inside the building.
    pub directions: String,
    pub website: Option<String>,
}

/// A web source the holdings inference consulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub uri: String,
}

/// An encoded image returned by the image synthesis call.
#[derive(Clone, PartialEq, Eq)]
pub struct ShelfImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ShelfImage {
    /// Decode a base64 inline payload.
    pub fn from_base64(mime_type: &str, data: &str) -> Result<Self, base64::DecodeError> {
        let bytes = BASE64.decode(data.trim())?;
        Ok(Self {
            mime_type: mime_type.to_string(),
            bytes,
        })
    }

    /// A directly displayable `data:` URI.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.bytes))
    }

    /// File extension matching the MIME type.
    pub fn file_extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "png",
        }
    }
}

impl std::fmt::Debug for ShelfImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShelfImage")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Where the user is, as far as the holdings prompt is concerned.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationHint {
    Coordinates { latitude: f64, longitude: f64 },
    Named(String),
}

impl LocationHint {
    /// Parse `"lat,lon"` into coordinates.
    pub fn parse_coordinates(s: &str) -> Option<Self> {
        let (lat, lon) = s.split_once(',')?;
        let latitude: f64 = lat.trim().parse().ok()?;
        let longitude: f64 = lon.trim().parse().ok()?;
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return None;
        }
        Some(Self::Coordinates {
            latitude,
            longitude,
        })
    }
}

impl std::fmt::Display for LocationHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Coordinates {
                latitude,
                longitude,
            } => write!(f, "latitude {latitude}, longitude {longitude}"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dune() -> BookSummary {
        BookSummary {
            key: "/works/OL893415W".into(),
            title: "Dune".into(),
            authors: Some(vec!["Frank Herbert".into()]),
            cover_id: Some(11481354),
            first_publish_year: Some(1965),
        }
    }

    #[test]
    fn cover_url_uses_size_token() {
        let book = dune();
        assert_eq!(
            book.cover_url(CoverSize::Medium).unwrap(),
            "https://covers.openlibrary.org/b/id/11481354-M.jpg"
        );
        assert_eq!(
            book.cover_url(CoverSize::Large).unwrap(),
            "https://covers.openlibrary.org/b/id/11481354-L.jpg"
        );
    }

    #[test]
    fn no_cover_id_means_no_url() {
        let book = BookSummary {
            cover_id: None,
            ..dune()
        };
        assert!(book.cover_url(CoverSize::Large).is_none());
    }

    #[test]
    fn summary_reads_catalog_field_names() {
        let json = r#"{"key":"/works/OL1W","title":"Emma","author_name":["Jane Austen"],"cover_i":42}"#;
        let book: BookSummary = serde_json::from_str(json).unwrap();
        assert_eq!(book.authors.as_deref(), Some(&["Jane Austen".to_string()][..]));
        assert_eq!(book.cover_id, Some(42));
        assert_eq!(book.first_publish_year, None);
    }

    #[test]
    fn display_without_authors() {
        let book = BookSummary {
            authors: None,
            first_publish_year: None,
            ..dune()
        };
        assert_eq!(book.to_string(), "Dune by Unknown author");
        assert_eq!(dune().to_string(), "Dune by Frank Herbert (1965)");
    }

    #[test]
    fn shelf_image_data_uri() {
        let image = ShelfImage::from_base64("image/png", "aGVsbG8=").unwrap();
        assert_eq!(image.bytes, b"hello");
        assert_eq!(image.data_uri(), "data:image/png;base64,aGVsbG8=");
        assert_eq!(image.file_extension(), "png");
    }

    #[test]
    fn location_coordinates_parse_and_render() {
        let hint = LocationHint::parse_coordinates("52.16, 4.49").unwrap();
        assert_eq!(hint.to_string(), "latitude 52.16, longitude 4.49");
        assert!(LocationHint::parse_coordinates("north").is_none());
        assert!(LocationHint::parse_coordinates("95,0").is_none());
    }
}
