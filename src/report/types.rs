use serde::{Deserialize, Serialize};

/// A document category as returned by the upstream API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub title: String,
}

/// Envelope of the categories endpoint: `{"data": {"categories": [...]}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoriesResponse {
    pub data: CategoriesData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoriesData {
    pub categories: Vec<Category>,
}

impl CategoriesResponse {
    pub fn into_categories(self) -> Vec<Category> {
        self.data.categories
    }
}
