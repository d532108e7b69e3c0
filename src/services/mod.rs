pub mod catalog;
pub mod concurrency;
pub mod enrichment;
pub mod favorites;
pub mod pager;
pub mod providers;
pub mod ratings;
pub mod retry;
pub mod watchlist;

pub use catalog::{CatalogFeed, CatalogQuery, CatalogSnapshot};
pub use enrichment::{Enricher, EnrichmentOptions};
pub use favorites::{FavoriteStatusLoader, Favorites, FavoritesFilter, FavoritesListing};
pub use providers::{CatalogGateway, HttpGateway};
pub use ratings::{RatingsFeed, RatingsFilter, RatingsSnapshot};
pub use watchlist::{Watchlist, WatchlistPick};
