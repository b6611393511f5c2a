use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub username: String,
}

/// A movie in a user's collection. Optional columns stay `None` when never
/// supplied; they are not materialized as empty strings or zeros.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Movie {
    pub user_id: u64,
    pub title: String,
    pub director: Option<String>,
    pub writer: Option<String>,
    pub actors: Option<String>,
    pub runtime: Option<String>,
    pub year: Option<i32>,
    pub rating: Option<f64>,
    pub genre: Option<String>,
    pub plot: Option<String>,
    /// Always user-authored, never filled from a lookup.
    pub comment: String,
}

/// Partial update for a movie. Only `Some` fields are applied; everything
/// else on the stored record is left untouched.
#[derive(Debug, Clone, Default)]
pub struct MovieUpdate {
    pub title: Option<String>,
    pub director: Option<String>,
    pub writer: Option<String>,
    pub actors: Option<String>,
    pub runtime: Option<String>,
    pub year: Option<i32>,
    pub rating: Option<f64>,
    pub genre: Option<String>,
    pub plot: Option<String>,
    pub comment: Option<String>,
}
