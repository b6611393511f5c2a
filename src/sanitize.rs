use serde_json::{Map, Value};

/// Movie attributes accepted from an external lookup, already converted to
/// the internal column types. Anything the sanitizer could not place or
/// convert is simply `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SanitizedFields {
    pub title: Option<String>,
    pub director: Option<String>,
    pub writer: Option<String>,
    pub actors: Option<String>,
    pub runtime: Option<String>,
    pub year: Option<i32>,
    pub rating: Option<f64>,
    pub genre: Option<String>,
    pub plot: Option<String>,
}

/// Clean and convert an untrusted field mapping. Keys outside the allow-list
/// and null values are dropped; `year` and `rating` are converted or dropped,
/// never reported as errors. Always returns a result, whatever the input.
pub fn sanitize(raw: &Map<String, Value>) -> SanitizedFields {
    SanitizedFields {
        title: text_field(raw, "title"),
        director: text_field(raw, "director"),
        writer: text_field(raw, "writer"),
        actors: text_field(raw, "actors"),
        runtime: text_field(raw, "runtime"),
        year: int_field(raw, "year"),
        rating: float_field(raw, "rating"),
        genre: text_field(raw, "genre"),
        plot: text_field(raw, "plot"),
    }
}

fn text_field(raw: &Map<String, Value>, key: &str) -> Option<String> {
    raw.get(key)?.as_str().map(str::to_owned)
}

fn int_field(raw: &Map<String, Value>, key: &str) -> Option<i32> {
    match raw.get(key)? {
        Value::Number(n) => n.as_i64().and_then(|n| std::convert::TryInto::try_into(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn float_field(raw: &Map<String, Value>, key: &str) -> Option<f64> {
    match raw.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn converts_and_drops_per_field() {
        let fields = sanitize(&raw(json!({
            "year": "N/A",
            "rating": "7.8",
            "title": "X",
            "bogus": "y",
        })));
        assert_eq!(
            fields,
            SanitizedFields {
                title: Some("X".to_owned()),
                rating: Some(7.8),
                ..SanitizedFields::default()
            }
        );
    }

    #[test]
    fn null_values_are_dropped() {
        let fields = sanitize(&raw(json!({
            "title": "X",
            "director": null,
            "plot": null,
        })));
        assert_eq!(fields.title, Some("X".to_owned()));
        assert_eq!(fields.director, None);
        assert_eq!(fields.plot, None);
    }

    #[test]
    fn numeric_json_values_are_accepted() {
        let fields = sanitize(&raw(json!({ "year": 2021, "rating": 8 })));
        assert_eq!(fields.year, Some(2021));
        assert_eq!(fields.rating, Some(8.0));
    }

    #[test]
    fn string_numbers_are_parsed() {
        let fields = sanitize(&raw(json!({ "year": " 1999 ", "rating": "N/A" })));
        assert_eq!(fields.year, Some(1999));
        assert_eq!(fields.rating, None);
    }

    #[test]
    fn non_string_text_values_are_dropped() {
        let fields = sanitize(&raw(json!({ "director": 7, "genre": ["Drama"] })));
        assert_eq!(fields.director, None);
        assert_eq!(fields.genre, None);
    }

    #[test]
    fn empty_input_yields_empty_result() {
        assert_eq!(sanitize(&Map::new()), SanitizedFields::default());
    }
}
