//! Report fetching on top of the API client.

mod fetcher;
mod types;

pub use fetcher::{LOCALE, MissingCredential, ReportFetcher};
pub use types::{CategoriesData, CategoriesResponse, Category};
