use log::warn;
use rand::seq::SliceRandom;
use serde_json::{json, Value};

const DEEPSEEK_URL: &str = "https://api.deepseek.com/v1/chat/completions";

pub struct Theme {
    pub name: &'static str,
    pub focus: &'static str,
}

/// Themes the fact generator can be steered towards.
pub const THEMES: &[Theme] = &[
    Theme {
        name: "technology",
        focus: "Groundbreaking film technologies and their first uses",
    },
    Theme {
        name: "controversies",
        focus: "Movie controversies, scandals and censorship battles",
    },
    Theme {
        name: "bloopers",
        focus: "Funny on-set accidents and unscripted moments",
    },
    Theme {
        name: "paranormal",
        focus: "Unexplained deaths and supernatural occurrences during productions",
    },
    Theme {
        name: "actor_facts",
        focus: "Extreme actor transformations for roles",
    },
    Theme {
        name: "props",
        focus: "Craziest movie props ever used",
    },
    Theme {
        name: "mistakes",
        focus: "Famous continuity errors and movie mistakes",
    },
    Theme {
        name: "oscars",
        focus: "Shocking Oscar wins and snubs",
    },
    Theme {
        name: "budgets",
        focus: "Insane movie budget facts",
    },
    Theme {
        name: "locations",
        focus: "Fascinating filming location stories",
    },
];

pub fn theme(name: &str) -> Option<&'static Theme> {
    THEMES.iter().find(|theme| theme.name == name)
}

pub fn random_theme() -> &'static Theme {
    THEMES
        .choose(&mut rand::thread_rng())
        .expect("themes table is empty")
}

fn build_prompt(theme: &Theme) -> String {
    format!(
        "Tell ONE surprising fact about: {}.\n\
         - Focus on a single specific example\n\
         - Be specific (mention movie titles/years)\n\
         - Maximum 1 sentence\n\
         - No lists or multiple examples\n\
         - Make it unexpected",
        theme.focus
    )
}

/// Ask the text-generation service for a themed trivia line. Failures only
/// cost the page its fact; nothing else depends on the answer.
pub async fn fetch_fun_fact(
    client: &reqwest::Client,
    api_key: &str,
    theme: &Theme,
) -> Option<String> {
    let request = json!({
        "model": "deepseek-chat",
        "messages": [{ "role": "user", "content": build_prompt(theme) }],
        "temperature": 0.8,
    });
    let response = client
        .post(DEEPSEEK_URL)
        .bearer_auth(api_key)
        .json(&request)
        .send()
        .await;
    let body: Value = match response {
        Ok(response) => match response.json().await {
            Ok(body) => body,
            Err(err) => {
                warn!("Invalid fact service response: {}", err);
                return None;
            }
        },
        Err(err) => {
            warn!("Could not connect to fact service: {}", err);
            return None;
        }
    };
    extract_fact(&body)
}

fn extract_fact(body: &Value) -> Option<String> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(|fact| fact.trim().to_owned())
}
