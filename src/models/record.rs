use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::{ExternalDetail, MediaKind};
use crate::error::{AppError, AppResult};

/// Identity of a local record: the catalog id plus the kind it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub external_id: String,
    pub kind: MediaKind,
}

/// An entity owned by the user's backend (a rating, a favorite, a watchlist entry)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalRecord {
    /// Backend document id
    pub id: Option<String>,
    /// Identifier into the third-party catalog; empty for orphaned records
    pub external_id: String,
    pub kind: MediaKind,
    pub title: Option<String>,
    pub poster_path: Option<String>,
    /// User score, 0-10
    pub score: Option<f64>,
    pub comment: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl LocalRecord {
    /// Minimal record carrying only identity
    pub fn new(external_id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: None,
            external_id: external_id.into(),
            kind,
            title: None,
            poster_path: None,
            score: None,
            comment: None,
            created_at: None,
            modified_at: None,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            external_id: self.external_id.clone(),
            kind: self.kind,
        }
    }

    /// The catalog id, if it is usable for a detail lookup
    pub fn lookup_id(&self) -> Option<&str> {
        let id = self.external_id.trim();
        (!id.is_empty()).then_some(id)
    }

    pub fn has_comment(&self) -> bool {
        self.comment.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

/// A local record joined with the catalog's description of it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub record: LocalRecord,
    pub detail: ExternalDetail,
}

impl EnrichedRecord {
    pub fn key(&self) -> RecordKey {
        self.record.key()
    }

    pub fn is_degraded(&self) -> bool {
        self.detail.fallback
    }
}

/// Catalog entries that have no local counterpart carry a bare record
impl From<ExternalDetail> for EnrichedRecord {
    fn from(detail: ExternalDetail) -> Self {
        let record = LocalRecord {
            title: Some(detail.title.clone()),
            poster_path: detail.poster_path.clone(),
            ..LocalRecord::new(detail.id.to_string(), detail.kind)
        };
        EnrichedRecord { record, detail }
    }
}

/// Spring-style page envelope returned by the paged listing endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct PageResponse<T> {
    #[serde(default = "Vec::new")]
    pub content: Vec<T>,
    #[serde(default)]
    pub last: bool,
}

/// Rating as serialized by lms-rating
///
/// Movie ratings carry `movieId`, series ratings carry `serieId`; older documents
/// store the score as a string under `myVote`.
#[derive(Debug, Clone, Deserialize)]
pub struct RatingRecordDto {
    #[serde(default, deserialize_with = "string_from_any")]
    pub id: Option<String>,
    #[serde(default, rename = "movieId", deserialize_with = "string_from_any")]
    pub movie_id: Option<String>,
    #[serde(default, rename = "serieId", deserialize_with = "string_from_any")]
    pub serie_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default, alias = "myVote", deserialize_with = "score_from_any")]
    pub rating: Option<f64>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default, alias = "createdAt", deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "modifiedAt", deserialize_with = "lenient_timestamp")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl RatingRecordDto {
    /// Tags the rating with the kind of the endpoint it came from
    pub fn into_local(self, kind: MediaKind) -> LocalRecord {
        let external_id = match kind {
            MediaKind::Movie => self.movie_id.or(self.serie_id),
            MediaKind::Series => self.serie_id.or(self.movie_id),
        };

        LocalRecord {
            id: self.id,
            external_id: external_id.map(|id| id.trim().to_string()).unwrap_or_default(),
            kind,
            title: non_blank(self.title),
            poster_path: non_blank(self.poster_path),
            score: self.rating,
            comment: self.comment,
            created_at: self.created_at,
            modified_at: self.modified_at,
        }
    }
}

/// Watchlist entry as serialized by lms-favorite
#[derive(Debug, Clone, Deserialize)]
pub struct WatchlistEntryDto {
    #[serde(default, deserialize_with = "string_from_any")]
    pub id: Option<String>,
    #[serde(default, rename = "movieId", deserialize_with = "string_from_any")]
    pub movie_id: Option<String>,
    #[serde(default, rename = "serieId", deserialize_with = "string_from_any")]
    pub serie_id: Option<String>,
    #[serde(default, alias = "addedAt", deserialize_with = "lenient_timestamp")]
    pub added_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchlistEntry {
    pub id: Option<String>,
    pub external_id: String,
    pub kind: MediaKind,
    pub added_at: Option<DateTime<Utc>>,
}

impl WatchlistEntryDto {
    pub fn into_entry(self, kind: MediaKind) -> WatchlistEntry {
        let external_id = match kind {
            MediaKind::Movie => self.movie_id.or(self.serie_id),
            MediaKind::Series => self.serie_id.or(self.movie_id),
        };

        WatchlistEntry {
            id: self.id,
            external_id: external_id.map(|id| id.trim().to_string()).unwrap_or_default(),
            kind,
            added_at: self.added_at,
        }
    }
}

impl From<WatchlistEntry> for LocalRecord {
    fn from(entry: WatchlistEntry) -> Self {
        LocalRecord {
            id: entry.id,
            created_at: entry.added_at,
            ..LocalRecord::new(entry.external_id, entry.kind)
        }
    }
}

/// Favorite row as serialized by lms-favorite
#[derive(Debug, Clone, Deserialize)]
pub struct FavoriteEntryDto {
    #[serde(default, deserialize_with = "string_from_any")]
    pub id: Option<String>,
    #[serde(default, rename = "movieId", deserialize_with = "string_from_any")]
    pub movie_id: Option<String>,
    #[serde(default, rename = "serieId", deserialize_with = "string_from_any")]
    pub serie_id: Option<String>,
    #[serde(default = "default_favorite")]
    pub favorite: bool,
}

fn default_favorite() -> bool {
    true
}

/// Favorites listing body
///
/// The movie endpoint wraps the rows in `{message, data}`; some deployments
/// return the bare array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FavoriteList {
    Envelope {
        #[serde(default)]
        message: Option<String>,
        #[serde(default = "Vec::new")]
        data: Vec<FavoriteEntryDto>,
    },
    Bare(Vec<FavoriteEntryDto>),
}

impl FavoriteList {
    /// Rows still flagged as favorite, tagged with `kind`
    pub fn into_entries(self, kind: MediaKind) -> Vec<FavoriteEntry> {
        let rows = match self {
            FavoriteList::Envelope { data, .. } => data,
            FavoriteList::Bare(rows) => rows,
        };

        rows.into_iter()
            .filter(|row| row.favorite)
            .map(|row| {
                let external_id = match kind {
                    MediaKind::Movie => row.movie_id.or(row.serie_id),
                    MediaKind::Series => row.serie_id.or(row.movie_id),
                };
                FavoriteEntry {
                    id: row.id,
                    external_id: external_id.map(|id| id.trim().to_string()).unwrap_or_default(),
                    kind,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FavoriteEntry {
    pub id: Option<String>,
    pub external_id: String,
    pub kind: MediaKind,
}

impl From<FavoriteEntry> for LocalRecord {
    fn from(entry: FavoriteEntry) -> Self {
        LocalRecord {
            id: entry.id,
            ..LocalRecord::new(entry.external_id, entry.kind)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FavoriteStatus {
    pub external_id: String,
    pub is_favorite: bool,
}

/// Score submitted for a movie or series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingRequest {
    pub kind: MediaKind,
    pub external_id: String,
    pub rating: f64,
    pub title: String,
    pub poster_path: String,
    #[serde(default)]
    pub comment: Option<String>,
}

impl RatingRequest {
    pub const MIN_RATING: f64 = 0.5;
    pub const MAX_RATING: f64 = 10.0;

    /// Mirrors the rating service's own validation so bad input never leaves the process
    pub fn validate(&self) -> AppResult<()> {
        if self.external_id.trim().is_empty() {
            return Err(AppError::InvalidInput(format!(
                "{} id is required",
                self.kind
            )));
        }
        if !(Self::MIN_RATING..=Self::MAX_RATING).contains(&self.rating) {
            return Err(AppError::InvalidInput(format!(
                "Rating must be between {} and {}",
                Self::MIN_RATING,
                Self::MAX_RATING
            )));
        }
        if self.title.trim().is_empty() {
            return Err(AppError::InvalidInput("Title is required".to_string()));
        }
        if self.poster_path.trim().is_empty() {
            return Err(AppError::InvalidInput("Poster path is required".to_string()));
        }
        Ok(())
    }

    /// JSON body expected by POST /rate/{movies|series}
    pub fn to_body(&self) -> Value {
        let mut body = serde_json::json!({
            "rating": self.rating,
            "title": self.title,
            "poster_path": self.poster_path,
        });
        body[self.kind.id_param()] = Value::String(self.external_id.trim().to_string());
        if let Some(comment) = self.comment.as_deref().filter(|c| !c.trim().is_empty()) {
            body["comment"] = Value::String(comment.to_string());
        }
        body
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn string_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn score_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Accepts RFC 3339, zone-less local date-times (taken as UTC) and epoch millis.
/// Anything else becomes `None` instead of failing the whole page.
fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => parse_timestamp(&s),
        Some(Value::Number(n)) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movie_rating_dto_into_local() {
        let json = r#"{
            "id": "65f0",
            "movieId": "27205",
            "title": "Inception",
            "poster_path": "/inception.jpg",
            "rating": 9.5,
            "comment": "Dreams within dreams",
            "createdAt": "2024-03-01T10:00:00Z"
        }"#;

        let dto: RatingRecordDto = serde_json::from_str(json).unwrap();
        let record = dto.into_local(MediaKind::Movie);

        assert_eq!(record.external_id, "27205");
        assert_eq!(record.kind, MediaKind::Movie);
        assert_eq!(record.score, Some(9.5));
        assert_eq!(record.title.as_deref(), Some("Inception"));
        assert!(record.created_at.is_some());
        assert!(record.has_comment());
    }

    #[test]
    fn test_legacy_my_vote_string_and_numeric_id() {
        let json = r#"{"serieId": 1396, "myVote": "8.5", "title": "Breaking Bad"}"#;

        let dto: RatingRecordDto = serde_json::from_str(json).unwrap();
        let record = dto.into_local(MediaKind::Series);

        assert_eq!(record.external_id, "1396");
        assert_eq!(record.score, Some(8.5));
        assert_eq!(record.key().kind, MediaKind::Series);
    }

    #[test]
    fn test_missing_id_yields_unusable_lookup_id() {
        let json = r#"{"title": "Orphan", "poster_path": "   ", "created_at": "not a date"}"#;

        let dto: RatingRecordDto = serde_json::from_str(json).unwrap();
        let record = dto.into_local(MediaKind::Movie);

        assert_eq!(record.external_id, "");
        assert_eq!(record.lookup_id(), None);
        assert_eq!(record.poster_path, None);
        assert_eq!(record.created_at, None);
    }

    #[test]
    fn test_watchlist_local_datetime_is_utc() {
        let json = r#"{"id": "w1", "movieId": "603", "addedAt": "2024-05-02T18:30:15.123"}"#;

        let dto: WatchlistEntryDto = serde_json::from_str(json).unwrap();
        let entry = dto.into_entry(MediaKind::Movie);
        assert_eq!(entry.external_id, "603");
        assert_eq!(
            entry.added_at.unwrap().to_rfc3339(),
            "2024-05-02T18:30:15.123+00:00"
        );

        let record = LocalRecord::from(entry);
        assert_eq!(record.title, None);
        assert_eq!(record.key().external_id, "603");
    }

    #[test]
    fn test_favorite_list_envelope_and_bare_array() {
        let envelope = r#"{
            "message": "Favoritos encontrados",
            "data": [
                {"id": "f1", "movieId": "27205", "email": "ana@example.com", "favorite": true},
                {"id": "f2", "movieId": "603", "email": "ana@example.com", "favorite": false}
            ]
        }"#;
        let list: FavoriteList = serde_json::from_str(envelope).unwrap();
        let entries = list.into_entries(MediaKind::Movie);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].external_id, "27205");
        assert_eq!(entries[0].id.as_deref(), Some("f1"));

        let bare = r#"[{"id": "s1", "serieId": 1396}]"#;
        let list: FavoriteList = serde_json::from_str(bare).unwrap();
        let entries = list.into_entries(MediaKind::Series);
        assert_eq!(entries[0].external_id, "1396");
        assert_eq!(entries[0].kind, MediaKind::Series);

        let record = LocalRecord::from(entries[0].clone());
        assert_eq!(record.key().external_id, "1396");
        assert_eq!(record.score, None);
    }

    #[test]
    fn test_catalog_detail_becomes_bare_record() {
        let detail = ExternalDetail {
            id: 603,
            kind: MediaKind::Movie,
            title: "The Matrix".to_string(),
            original_title: None,
            overview: None,
            poster_path: Some("/matrix.jpg".to_string()),
            backdrop_path: None,
            release_date: None,
            vote_average: Some(8.2),
            genres: Vec::new(),
            cast: Vec::new(),
            fallback: false,
        };

        let item = EnrichedRecord::from(detail);
        assert_eq!(item.record.external_id, "603");
        assert_eq!(item.record.title.as_deref(), Some("The Matrix"));
        assert_eq!(item.record.score, None);
        assert!(!item.is_degraded());
    }

    #[test]
    fn test_page_response_defaults() {
        let page: PageResponse<RatingRecordDto> = serde_json::from_str(r#"{"last": true}"#).unwrap();
        assert!(page.content.is_empty());
        assert!(page.last);
    }

    #[test]
    fn test_rating_request_validation() {
        let mut request = RatingRequest {
            kind: MediaKind::Movie,
            external_id: "27205".to_string(),
            rating: 9.0,
            title: "Inception".to_string(),
            poster_path: "/inception.jpg".to_string(),
            comment: None,
        };
        assert!(request.validate().is_ok());

        request.rating = 0.0;
        assert!(matches!(request.validate(), Err(AppError::InvalidInput(_))));

        request.rating = 10.5;
        assert!(request.validate().is_err());

        request.rating = 7.0;
        request.poster_path = " ".to_string();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_rating_request_body_uses_kind_param() {
        let request = RatingRequest {
            kind: MediaKind::Series,
            external_id: "1396".to_string(),
            rating: 8.0,
            title: "Breaking Bad".to_string(),
            poster_path: "/bb.jpg".to_string(),
            comment: Some("".to_string()),
        };

        let body = request.to_body();
        assert_eq!(body["serieId"], "1396");
        assert!(body.get("movieId").is_none());
        assert!(body.get("comment").is_none());
    }
}
