//! Wire types for the media-server API.
//!
//! Field names follow the server's PascalCase JSON convention.

use serde::{Deserialize, Serialize};

/// Response from `/Users/AuthenticateByName`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuthResponse {
    /// Bearer token for subsequent requests.
    pub access_token: String,
    /// The authenticated user.
    pub user: User,
}

/// A server user account.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct User {
    /// Server-assigned user identifier.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// Envelope for item listing endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemsResponse {
    /// The items in this page.
    #[serde(default)]
    pub items: Vec<Item>,
    /// Total matching records on the server.
    #[serde(default)]
    pub total_record_count: i64,
}

/// A catalog entry (movie, series, or episode).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Item {
    /// Opaque server-assigned identifier.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Item type ("Movie", "Series", "Episode").
    #[serde(default, rename = "Type")]
    pub item_type: String,
    /// Name of the parent series, for episodes.
    #[serde(default)]
    pub series_name: Option<String>,
    /// Id of the parent series, for episodes.
    #[serde(default)]
    pub series_id: Option<String>,
    /// Episode number within the season.
    #[serde(default)]
    pub index_number: Option<i64>,
    /// Season number.
    #[serde(default)]
    pub parent_index_number: Option<i64>,
    /// Production year, for movies.
    #[serde(default)]
    pub production_year: Option<i64>,
    /// Source media path on the server, used for the file extension.
    #[serde(default)]
    pub path: Option<String>,
}

impl Item {
    /// Whether this item is a series episode.
    #[must_use]
    pub fn is_episode(&self) -> bool {
        self.item_type == "Episode"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_item_deserializes_pascal_case() {
        let json = r#"{
            "Id": "abc123",
            "Name": "Pilot",
            "Type": "Episode",
            "SeriesName": "Some Show",
            "IndexNumber": 1,
            "ParentIndexNumber": 2,
            "Path": "/media/shows/pilot.mkv"
        }"#;

        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, "abc123");
        assert_eq!(item.item_type, "Episode");
        assert!(item.is_episode());
        assert_eq!(item.series_name.as_deref(), Some("Some Show"));
        assert_eq!(item.index_number, Some(1));
        assert_eq!(item.parent_index_number, Some(2));
        assert_eq!(item.production_year, None);
    }

    #[test]
    fn test_items_response_tolerates_missing_fields() {
        let response: ItemsResponse = serde_json::from_str(r#"{"Items": [{"Id": "x"}]}"#).unwrap();
        assert_eq!(response.items.len(), 1);
        assert_eq!(response.total_record_count, 0);
        assert!(!response.items[0].is_episode());
    }
}
