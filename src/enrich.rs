use crate::database::MovieStore;
use crate::error::{StoreError, StoreResult};
use crate::model::Movie;
use crate::sanitize::SanitizedFields;

/// Movie attributes as submitted by the user, before reconciliation with a
/// lookup result. Blank strings count as "not supplied".
#[derive(Debug, Clone, Default)]
pub struct MovieInput {
    pub title: String,
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

/// Trim and check the one mandatory user field. Called before any external
/// lookup is spent on the request.
pub fn validate_title(title: &str) -> StoreResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(StoreError::Validation("title must not be empty".to_owned()));
    }
    Ok(title.to_owned())
}

/// Resolve the final field set for a new movie: user input wins wherever it
/// is non-empty, the sanitized lookup fills the gaps, and the comment is
/// user-only. Rejects duplicates in the owner's collection before any write.
pub fn resolve_movie_fields<S: MovieStore>(
    store: &S,
    user_id: u64,
    input: MovieInput,
    lookup: Option<SanitizedFields>,
) -> StoreResult<Movie> {
    let title = validate_title(&input.title)?;
    if store.movie_exists(user_id, &title)? {
        return Err(StoreError::Conflict(format!(
            "'{}' is already in this collection",
            title
        )));
    }
    let lookup = lookup.unwrap_or_default();
    Ok(Movie {
        user_id,
        title,
        director: prefer_user(input.director, lookup.director),
        writer: prefer_user(input.writer, lookup.writer),
        actors: prefer_user(input.actors, lookup.actors),
        runtime: prefer_user(input.runtime, lookup.runtime),
        year: input.year.or(lookup.year),
        rating: input.rating.or(lookup.rating),
        genre: prefer_user(input.genre, lookup.genre),
        plot: prefer_user(input.plot, lookup.plot),
        comment: input.comment.unwrap_or_default(),
    })
}

fn prefer_user(user: Option<String>, lookup: Option<String>) -> Option<String> {
    match user {
        Some(value) if !value.trim().is_empty() => Some(value),
        _ => lookup,
    }
}
