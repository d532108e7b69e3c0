use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub mod record;
pub mod session;

pub use record::{
    EnrichedRecord, FavoriteEntry, FavoriteEntryDto, FavoriteList, FavoriteStatus, LocalRecord,
    PageResponse, RatingRecordDto, RatingRequest, RecordKey, WatchlistEntry, WatchlistEntryDto,
};
pub use session::Session;

/// Explicit discriminant for catalog items
///
/// Carried on every record and detail so that nothing downstream has to guess
/// the kind from which fields happen to be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    #[serde(alias = "serie")]
    Series,
}

impl MediaKind {
    /// Path segment used by every backend service ("movies" / "series")
    pub fn path_segment(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movies",
            MediaKind::Series => "series",
        }
    }

    /// Query/body parameter naming the external id ("movieId" / "serieId")
    pub fn id_param(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movieId",
            MediaKind::Series => "serieId",
        }
    }

    pub fn unknown_title(&self) -> &'static str {
        match self {
            MediaKind::Movie => "Unknown movie",
            MediaKind::Series => "Unknown series",
        }
    }

    pub fn all() -> [MediaKind; 2] {
        [MediaKind::Movie, MediaKind::Series]
    }
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Movie => write!(f, "movie"),
            MediaKind::Series => write!(f, "series"),
        }
    }
}

/// Curated TMDB lists served by lms-filmes
///
/// `Popular` and `TopRated` exist for both kinds; the rest belong to one kind only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CatalogCategory {
    Popular,
    TopRated,
    NowPlaying,
    Upcoming,
    AiringToday,
    OnTheAir,
}

impl CatalogCategory {
    /// Path segment under `/movies` or `/series`
    pub fn path_segment(&self) -> &'static str {
        match self {
            CatalogCategory::Popular => "popular",
            CatalogCategory::TopRated => "top-rated",
            CatalogCategory::NowPlaying => "now-playing",
            CatalogCategory::Upcoming => "upcoming",
            CatalogCategory::AiringToday => "airing-today",
            CatalogCategory::OnTheAir => "on-the-air",
        }
    }

    pub fn supports(&self, kind: MediaKind) -> bool {
        match self {
            CatalogCategory::Popular | CatalogCategory::TopRated => true,
            CatalogCategory::NowPlaying | CatalogCategory::Upcoming => kind == MediaKind::Movie,
            CatalogCategory::AiringToday | CatalogCategory::OnTheAir => kind == MediaKind::Series,
        }
    }
}

impl Display for CatalogCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// Read-only description of a catalog item, as served by the metadata provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExternalDetail {
    pub id: u64,
    pub kind: MediaKind,
    pub title: String,
    pub original_title: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub cast: Vec<CastMember>,
    /// Synthesized from local data because the catalog could not provide it
    #[serde(default)]
    pub fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Genre {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CastMember {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub character: Option<String>,
    #[serde(default)]
    pub profile_path: Option<String>,
}

// ============================================================================
// TMDB-shaped payloads served by lms-filmes
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmdbCredits {
    #[serde(default)]
    pub cast: Vec<CastMember>,
}

/// Movie details from GET /lms-filmes/movies/{id}
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbMovie {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub credits: Option<TmdbCredits>,
}

impl From<TmdbMovie> for ExternalDetail {
    fn from(movie: TmdbMovie) -> Self {
        ExternalDetail {
            id: movie.id,
            kind: MediaKind::Movie,
            title: movie.title,
            original_title: movie.original_title,
            overview: movie.overview,
            poster_path: movie.poster_path,
            backdrop_path: movie.backdrop_path,
            release_date: movie.release_date.filter(|d| !d.is_empty()),
            vote_average: movie.vote_average,
            genres: movie.genres,
            cast: movie.credits.unwrap_or_default().cast,
            fallback: false,
        }
    }
}

/// Series details from GET /lms-filmes/series/{id}
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbSerie {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub original_name: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub credits: Option<TmdbCredits>,
}

impl From<TmdbSerie> for ExternalDetail {
    fn from(serie: TmdbSerie) -> Self {
        ExternalDetail {
            id: serie.id,
            kind: MediaKind::Series,
            title: serie.name,
            original_title: serie.original_name,
            overview: serie.overview,
            poster_path: serie.poster_path,
            backdrop_path: serie.backdrop_path,
            release_date: serie.first_air_date.filter(|d| !d.is_empty()),
            vote_average: serie.vote_average,
            genres: serie.genres,
            cast: serie.credits.unwrap_or_default().cast,
            fallback: false,
        }
    }
}

/// One page of a TMDB list or search, 1-based
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbPage<T> {
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_results: u64,
}

fn first_page() -> u32 {
    1
}

impl<T: Into<ExternalDetail>> From<TmdbPage<T>> for CatalogPage {
    fn from(raw: TmdbPage<T>) -> Self {
        CatalogPage {
            page: raw.page,
            results: raw.results.into_iter().map(Into::into).collect(),
            total_pages: raw.total_pages,
            total_results: raw.total_results,
        }
    }
}

/// Catalog list page with the kind already resolved
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CatalogPage {
    pub page: u32,
    pub results: Vec<ExternalDetail>,
    pub total_pages: u32,
    pub total_results: u64,
}

impl CatalogPage {
    /// More pages exist only while `page < total_pages`
    pub fn is_last(&self) -> bool {
        self.page >= self.total_pages
    }
}
