use crate::sanitize::{sanitize, SanitizedFields};
use log::warn;
use serde_json::{Map, Value};

const OMDB_URL: &str = "http://www.omdbapi.com/";

/// Field names of the OMDb response contract, paired with the internal
/// column they feed.
const FIELD_MAP: &[(&str, &str)] = &[
    ("Title", "title"),
    ("Director", "director"),
    ("Writer", "writer"),
    ("Actors", "actors"),
    ("Year", "year"),
    ("imdbRating", "rating"),
    ("Runtime", "runtime"),
    ("Genre", "genre"),
    ("Plot", "plot"),
];

/// Interpret an OMDb response body. An explicit "not found" answer yields
/// `None`; otherwise the known fields are remapped and sanitized.
pub fn parse_response(body: &Value) -> Option<SanitizedFields> {
    if body.get("Response").and_then(Value::as_str) == Some("False") {
        let message = body
            .get("Error")
            .and_then(Value::as_str)
            .unwrap_or("API error");
        warn!("OMDb lookup failed: {}", message);
        return None;
    }
    let mut raw = Map::new();
    for (external, internal) in FIELD_MAP {
        if let Some(value) = body.get(*external) {
            raw.insert((*internal).to_owned(), value.clone());
        }
    }
    Some(sanitize(&raw))
}

/// Look a title up against the OMDb contract. Network and parse failures
/// degrade to "no enrichment data"; the caller proceeds with manual input.
pub async fn fetch_movie_data(
    client: &reqwest::Client,
    api_key: &str,
    title: &str,
) -> Option<SanitizedFields> {
    let response = client
        .get(OMDB_URL)
        .query(&[("apikey", api_key), ("t", title), ("plot", "full")])
        .send()
        .await;
    let body: Value = match response {
        Ok(response) => match response.json().await {
            Ok(body) => body,
            Err(err) => {
                warn!("Invalid OMDb response: {}", err);
                return None;
            }
        },
        Err(err) => {
            warn!("Could not connect to OMDb: {}", err);
            return None;
        }
    };
    parse_response(&body)
}
