/// HTTP client for the backend gateway
///
/// The gateway routes by service prefix:
/// - `/lms-filmes`   catalog details, lists and search (TMDB-shaped)
/// - `/lms-rating`   the user's ratings, paged Spring-style
/// - `/lms-favorite` favorites and watchlist
///
/// All calls carry the caller's bearer token; nothing is cached here.
use std::time::Duration;

use reqwest::{Client as HttpClient, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};

use crate::{
    error::{AppError, AppResult},
    models::{
        CatalogCategory, CatalogPage, ExternalDetail, FavoriteEntry, FavoriteList, LocalRecord,
        MediaKind, PageResponse, RatingRecordDto, RatingRequest, Session, TmdbMovie, TmdbPage,
        TmdbSerie, WatchlistEntry, WatchlistEntryDto,
    },
    services::providers::CatalogGateway,
};

#[derive(Clone)]
pub struct HttpGateway {
    http_client: HttpClient,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ToggleFavoriteResponse {
    #[serde(rename = "isFavorite")]
    is_favorite: bool,
}

#[derive(Debug, Deserialize)]
struct WatchlistStatusResponse {
    #[serde(rename = "inWatchlist")]
    in_watchlist: bool,
}

impl HttpGateway {
    /// Creates a gateway client with the given per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(AppError::from_transport)?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, service: &str, path: &str) -> String {
        format!("{}/{}{}", self.base_url, service, path)
    }

    fn authorized(&self, builder: RequestBuilder, session: &Session) -> RequestBuilder {
        builder
            .header(reqwest::header::AUTHORIZATION, session.bearer())
            .header(reqwest::header::ACCEPT, "application/json")
    }

    /// Sends the request and maps transport failures and error statuses
    async fn send(&self, builder: RequestBuilder) -> AppResult<Response> {
        let response = builder.send().await.map_err(AppError::from_transport)?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();

        tracing::debug!(status = %status, url = %url, body = %body, "Gateway request failed");

        Err(error_for_status(status, &url, &body))
    }

    /// Decodes a TMDB list page using the item shape of `kind`
    async fn catalog_list(&self, request: RequestBuilder, kind: MediaKind) -> AppResult<CatalogPage> {
        Ok(match kind {
            MediaKind::Movie => CatalogPage::from(self.json::<TmdbPage<TmdbMovie>>(request).await?),
            MediaKind::Series => CatalogPage::from(self.json::<TmdbPage<TmdbSerie>>(request).await?),
        })
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> AppResult<T> {
        let response = self.send(builder).await?;
        let text = response.text().await.map_err(AppError::from_transport)?;

        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(error = %e, response = %text, "Failed to parse gateway response");
            AppError::Upstream {
                status: 200,
                message: format!("Failed to parse gateway response: {}", e),
            }
        })
    }
}

/// Maps a non-success gateway status onto the error taxonomy
fn error_for_status(status: StatusCode, url: &str, body: &str) -> AppError {
    match status {
        StatusCode::UNAUTHORIZED => {
            AppError::Unauthorized("Session expired, please sign in again".to_string())
        }
        StatusCode::NOT_FOUND => AppError::NotFound(url.to_string()),
        _ => AppError::Upstream {
            status: status.as_u16(),
            message: extract_message(body),
        },
    }
}

/// Pulls a readable message out of an error body (`message`, `error` or `details`),
/// falling back to the trimmed body text
fn extract_message(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::String(s)) => s,
        Ok(value) => ["message", "error", "details"]
            .iter()
            .find_map(|field| value.get(field).and_then(|v| v.as_str()))
            .map(str::to_string)
            .unwrap_or_else(|| body.trim().to_string()),
        Err(_) => body.trim().to_string(),
    }
}

#[async_trait::async_trait]
impl CatalogGateway for HttpGateway {
    async fn fetch_detail(
        &self,
        session: &Session,
        kind: MediaKind,
        external_id: &str,
    ) -> AppResult<ExternalDetail> {
        let url = self.url(
            "lms-filmes",
            &format!("/{}/{}", kind.path_segment(), external_id),
        );
        let request = self.authorized(self.http_client.get(&url), session);

        let detail = match kind {
            MediaKind::Movie => ExternalDetail::from(self.json::<TmdbMovie>(request).await?),
            MediaKind::Series => ExternalDetail::from(self.json::<TmdbSerie>(request).await?),
        };

        tracing::debug!(external_id = %external_id, kind = %kind, "Detail fetched");

        Ok(detail)
    }

    async fn catalog_page(
        &self,
        session: &Session,
        kind: MediaKind,
        category: CatalogCategory,
        page: u32,
    ) -> AppResult<CatalogPage> {
        if !category.supports(kind) {
            return Err(AppError::InvalidInput(format!(
                "Category {} is not available for {}",
                category, kind
            )));
        }

        let url = self.url(
            "lms-filmes",
            &format!("/{}/{}", kind.path_segment(), category.path_segment()),
        );
        let request = self
            .authorized(self.http_client.get(&url), session)
            .query(&[("page", page.max(1))]);

        let listing = self.catalog_list(request, kind).await?;

        tracing::debug!(
            kind = %kind,
            category = %category,
            page = listing.page,
            total_pages = listing.total_pages,
            "Catalog page fetched"
        );

        Ok(listing)
    }

    async fn search_catalog(
        &self,
        session: &Session,
        kind: MediaKind,
        query: &str,
        page: u32,
    ) -> AppResult<CatalogPage> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidInput("Search query is required".to_string()));
        }

        let url = self.url("lms-filmes", &format!("/{}/search", kind.path_segment()));
        let page = page.max(1).to_string();
        let request = self
            .authorized(self.http_client.get(&url), session)
            .query(&[("query", query), ("page", page.as_str())]);

        let listing = self.catalog_list(request, kind).await?;

        tracing::debug!(
            kind = %kind,
            query = %query,
            page = listing.page,
            total_results = listing.total_results,
            "Catalog search fetched"
        );

        Ok(listing)
    }

    async fn fetch_rated_page(
        &self,
        session: &Session,
        kind: MediaKind,
        page: u32,
        size: u32,
    ) -> AppResult<PageResponse<LocalRecord>> {
        let url = self.url("lms-rating", &format!("/rate/{}/paged", kind.path_segment()));
        let request = self
            .authorized(self.http_client.get(&url), session)
            .query(&[("page", page), ("size", size)]);

        let raw: PageResponse<RatingRecordDto> = self.json(request).await?;

        tracing::info!(
            kind = %kind,
            page,
            size,
            received = raw.content.len(),
            last = raw.last,
            "Rated page fetched"
        );

        Ok(PageResponse {
            content: raw
                .content
                .into_iter()
                .map(|dto| dto.into_local(kind))
                .collect(),
            last: raw.last,
        })
    }

    async fn rate(&self, session: &Session, request: &RatingRequest) -> AppResult<LocalRecord> {
        request.validate()?;

        let url = self.url("lms-rating", &format!("/rate/{}", request.kind.path_segment()));
        let builder = self
            .authorized(self.http_client.post(&url), session)
            .json(&request.to_body());

        let stored: RatingRecordDto = self.json(builder).await?;

        tracing::info!(
            kind = %request.kind,
            external_id = %request.external_id,
            rating = request.rating,
            "Rating saved"
        );

        Ok(stored.into_local(request.kind))
    }

    async fn favorite_status(
        &self,
        session: &Session,
        kind: MediaKind,
        external_id: &str,
    ) -> AppResult<bool> {
        let url = self.url(
            "lms-favorite",
            &format!("/favorite/{}/status", kind.path_segment()),
        );
        let request = self
            .authorized(self.http_client.get(&url), session)
            .query(&[(kind.id_param(), external_id)]);

        self.json(request).await
    }

    async fn toggle_favorite(
        &self,
        session: &Session,
        kind: MediaKind,
        external_id: &str,
    ) -> AppResult<bool> {
        let url = self.url("lms-favorite", &format!("/favorite/{}", kind.path_segment()));
        let request = self
            .authorized(self.http_client.post(&url), session)
            .query(&[(kind.id_param(), external_id)]);

        let response: ToggleFavoriteResponse = self.json(request).await?;

        tracing::info!(
            kind = %kind,
            external_id = %external_id,
            is_favorite = response.is_favorite,
            "Favorite toggled"
        );

        Ok(response.is_favorite)
    }

    async fn favorites(&self, session: &Session, kind: MediaKind) -> AppResult<Vec<FavoriteEntry>> {
        let url = self.url("lms-favorite", &format!("/favorite/{}/", kind.path_segment()));
        let request = self.authorized(self.http_client.get(&url), session);

        let list: FavoriteList = self.json(request).await?;
        let entries = list.into_entries(kind);

        tracing::debug!(kind = %kind, count = entries.len(), "Favorites fetched");

        Ok(entries)
    }

    async fn watchlist(
        &self,
        session: &Session,
        kind: MediaKind,
    ) -> AppResult<Vec<WatchlistEntry>> {
        let url = self.url("lms-favorite", &format!("/watchlist/{}", kind.path_segment()));
        let request = self.authorized(self.http_client.get(&url), session);

        let entries: Vec<WatchlistEntryDto> = self.json(request).await?;

        Ok(entries
            .into_iter()
            .map(|dto| dto.into_entry(kind))
            .collect())
    }

    async fn toggle_watchlist(
        &self,
        session: &Session,
        kind: MediaKind,
        external_id: &str,
    ) -> AppResult<bool> {
        let url = self.url("lms-favorite", &format!("/watchlist/{}", kind.path_segment()));
        let request = self
            .authorized(self.http_client.post(&url), session)
            .query(&[(kind.id_param(), external_id)]);

        let response: WatchlistStatusResponse = self.json(request).await?;

        tracing::info!(
            kind = %kind,
            external_id = %external_id,
            in_watchlist = response.in_watchlist,
            "Watchlist toggled"
        );

        Ok(response.in_watchlist)
    }
}
