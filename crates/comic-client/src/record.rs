//! The comic metadata document.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Metadata for one numbered comic, as served by the comic service.
///
/// The date is kept as three independent strings because the service does
/// not guarantee they form a valid calendar date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComicRecord {
    #[serde(rename = "num")]
    pub number: i64,
    pub title: String,
    /// Display variant of the title. Placeholders put their failure text here.
    pub safe_title: String,
    #[serde(rename = "img")]
    pub image_url: String,
    pub alt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub news: Option<String>,
    pub transcript: String,
    pub year: String,
    pub month: String,
    pub day: String,
}

impl ComicRecord {
    /// Build a stand-in record describing why comic `number` is unavailable.
    pub fn placeholder(number: i64, title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            number,
            safe_title: title.clone(),
            title,
            ..Self::default()
        }
    }

    /// Whether this record has an image to download.
    pub fn has_image(&self) -> bool {
        !self.image_url.is_empty()
    }

    /// Publication date, if the three date fields form a real day.
    pub fn date(&self) -> Option<NaiveDate> {
        let year = self.year.trim().parse().ok()?;
        let month = self.month.trim().parse().ok()?;
        let day = self.day.trim().parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    }

    /// Publication date as `YYYY-MM-DD`, or an empty string when malformed.
    pub fn formatted_date(&self) -> String {
        self.date()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    }
}
