mod database;
mod enrich;
mod error;
mod facts;
mod model;
mod omdb;
mod sanitize;

use actix_web::{middleware::Logger, web, App, HttpResponse, HttpServer};
use crate::error::StoreError;
use database::*;
use enrich::MovieInput;
use log::debug;
use model::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

type Tera = web::Data<tera::Tera>;
type Db = web::Data<sled::Db>;
type Config = web::Data<AppConfig>;

struct AppConfig {
    omdb_api_key: Option<String>,
    deepseek_api_key: Option<String>,
    client: reqwest::Client,
}

fn log_error<E: std::fmt::Debug>(err: E, message: &'static str) -> actix_web::Error {
    debug!("{:?}", err);
    actix_web::error::ErrorInternalServerError(message)
}

fn found(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .append_header(("location", location))
        .finish()
}

fn render(
    tera: &tera::Tera,
    template: &str,
    ctx: &tera::Context,
) -> actix_web::Result<HttpResponse> {
    let body = tera
        .render(template, ctx)
        .map_err(|err| log_error(err, "Template error"))?;
    Ok(HttpResponse::Ok().content_type("text/html").body(body))
}

#[derive(Serialize)]
struct UserView<'a> {
    id: u64,
    username: &'a str,
}

#[derive(Serialize)]
struct MovieView<'a> {
    id: u64,
    #[serde(flatten)]
    movie: &'a Movie,
}

async fn fact_page(
    tera: Tera,
    config: Config,
    theme: &facts::Theme,
    template: &str,
) -> actix_web::Result<HttpResponse> {
    let mut ctx = tera::Context::new();
    ctx.insert("current_theme", theme.name);
    let fact = match &config.deepseek_api_key {
        Some(key) => facts::fetch_fun_fact(&config.client, key, theme).await,
        None => None,
    };
    if let Some(fact) = fact {
        ctx.insert("funfact", &fact);
    }
    render(&tera, template, &ctx)
}

async fn home(tera: Tera, config: Config) -> actix_web::Result<HttpResponse> {
    fact_page(tera, config, facts::random_theme(), "home.html").await
}

async fn themed_funfact(
    path: web::Path<String>,
    tera: Tera,
    config: Config,
) -> actix_web::Result<HttpResponse> {
    match facts::theme(&path.into_inner()) {
        Some(theme) => fact_page(tera, config, theme, "funfact.html").await,
        None => not_found(tera).await,
    }
}

async fn list_users(tera: Tera, db: Db) -> actix_web::Result<HttpResponse> {
    let users = db
        .list_users()
        .map_err(|err| log_error(err, "Database error"))?;
    let views = users
        .iter()
        .map(|(id, user)| UserView {
            id: *id,
            username: &user.username,
        })
        .collect::<Vec<_>>();
    let mut ctx = tera::Context::new();
    ctx.insert("users", &views);
    render(&tera, "user_select.html", &ctx)
}

async fn user_movies(
    path: web::Path<u64>,
    tera: Tera,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let user_id = path.into_inner();
    let user = match db
        .get_user(user_id)
        .map_err(|err| log_error(err, "Database error"))?
    {
        Some(user) => user,
        None => return Ok(found("/users")),
    };
    let movies = db
        .list_movies_for_user(user_id)
        .map_err(|err| log_error(err, "Database error"))?;
    let views = movies
        .iter()
        .map(|(id, movie)| MovieView { id: *id, movie })
        .collect::<Vec<_>>();
    let mut ctx = tera::Context::new();
    ctx.insert("user", &user);
    ctx.insert("user_id", &user_id);
    ctx.insert("movies", &views);
    render(&tera, "movie_list.html", &ctx)
}

#[derive(Serialize, Deserialize)]
struct AddUserForm {
    username: String,
}

async fn add_user_form(tera: Tera) -> actix_web::Result<HttpResponse> {
    render(&tera, "user_form.html", &tera::Context::new())
}

async fn add_user_post(
    form: web::Form<AddUserForm>,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    match db.add_user(&form.username) {
        Ok(_) => Ok(found("/")),
        Err(StoreError::Conflict(_)) => Ok(found("/add_user?taken")),
        Err(StoreError::Validation(_)) => Ok(found("/add_user?invalid")),
        Err(err) => Err(log_error(err, "Database error")),
    }
}

fn parse_int(value: &str) -> Option<i32> {
    value.trim().parse().ok()
}

fn parse_float(value: &str) -> Option<f64> {
    value.trim().parse().ok()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Serialize, Deserialize)]
struct AddMovieForm {
    title: String,
    director: Option<String>,
    writer: Option<String>,
    actors: Option<String>,
    runtime: Option<String>,
    year: Option<String>,
    rating: Option<String>,
    genre: Option<String>,
    plot: Option<String>,
    comment: Option<String>,
}

impl AddMovieForm {
    // Numeric fields parse leniently: a blank or malformed value counts as
    // not supplied, leaving the lookup result to fill the gap.
    fn into_input(self) -> MovieInput {
        MovieInput {
            title: self.title,
            director: self.director,
            writer: self.writer,
            actors: self.actors,
            runtime: self.runtime,
            year: self.year.as_deref().and_then(parse_int),
            rating: self.rating.as_deref().and_then(parse_float),
            genre: self.genre,
            plot: self.plot,
            comment: non_empty(self.comment),
        }
    }
}

async fn add_movie_form(
    path: web::Path<u64>,
    tera: Tera,
) -> actix_web::Result<HttpResponse> {
    let mut ctx = tera::Context::new();
    ctx.insert("user_id", &path.into_inner());
    render(&tera, "add_movie.html", &ctx)
}

async fn add_movie_post(
    path: web::Path<u64>,
    form: web::Form<AddMovieForm>,
    db: Db,
    config: Config,
) -> actix_web::Result<HttpResponse> {
    let user_id = path.into_inner();
    let back = format!("/add_movie/{}", user_id);

    let title = match enrich::validate_title(&form.title) {
        Ok(title) => title,
        Err(_) => return Ok(found(&format!("{}?empty_title", back))),
    };
    // Reject duplicates before spending an external lookup on the request.
    match db.movie_exists(user_id, &title) {
        Ok(true) => return Ok(found(&format!("{}?duplicate", back))),
        Ok(false) => {}
        Err(err) => return Err(log_error(err, "Database error")),
    }

    let lookup = match &config.omdb_api_key {
        Some(key) => omdb::fetch_movie_data(&config.client, key, &title).await,
        None => None,
    };
    let movie = match enrich::resolve_movie_fields(
        db.get_ref(),
        user_id,
        form.into_inner().into_input(),
        lookup,
    ) {
        Ok(movie) => movie,
        Err(StoreError::Conflict(_)) => return Ok(found(&format!("{}?duplicate", back))),
        Err(StoreError::Validation(_)) => return Ok(found(&format!("{}?empty_title", back))),
        Err(err) => return Err(log_error(err, "Database error")),
    };
    match db.add_movie(&movie) {
        Ok(_) => Ok(found(&format!("/user/{}", user_id))),
        Err(StoreError::NotFound) => Ok(found("/users")),
        Err(StoreError::Validation(_)) => Ok(found(&format!("{}?invalid", back))),
        Err(err) => Err(log_error(err, "Database error")),
    }
}

#[derive(Serialize, Deserialize)]
struct UpdateMovieForm {
    title: Option<String>,
    director: Option<String>,
    year: Option<String>,
    rating: Option<String>,
    genre: Option<String>,
    plot: Option<String>,
    comment: Option<String>,
}

impl UpdateMovieForm {
    // Blank fields are "leave as is", never "overwrite with nothing".
    fn into_update(self) -> MovieUpdate {
        MovieUpdate {
            title: non_empty(self.title),
            director: non_empty(self.director),
            year: self.year.as_deref().and_then(parse_int),
            rating: self.rating.as_deref().and_then(parse_float),
            genre: non_empty(self.genre),
            plot: non_empty(self.plot),
            comment: non_empty(self.comment),
            ..MovieUpdate::default()
        }
    }
}

async fn update_movie_form(
    path: web::Path<(u64, u64)>,
    tera: Tera,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let (user_id, movie_id) = path.into_inner();
    let movie = match db
        .get_movie(movie_id)
        .map_err(|err| log_error(err, "Database error"))?
    {
        Some(movie) => movie,
        None => return Ok(found(&format!("/user/{}", user_id))),
    };
    let mut ctx = tera::Context::new();
    ctx.insert("user_id", &user_id);
    ctx.insert("movie_id", &movie_id);
    ctx.insert("movie", &movie);
    render(&tera, "edit_movie.html", &ctx)
}

async fn update_movie_post(
    path: web::Path<(u64, u64)>,
    form: web::Form<UpdateMovieForm>,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let (user_id, movie_id) = path.into_inner();
    match db.update_movie(movie_id, &form.into_inner().into_update()) {
        Ok(true) => Ok(found(&format!("/user/{}?updated", user_id))),
        Ok(false) => Ok(found(&format!("/user/{}?not_found", user_id))),
        Err(StoreError::Validation(_)) => Ok(found(&format!(
            "/user/{}/update_movie/{}?invalid",
            user_id, movie_id
        ))),
        Err(err) => Err(log_error(err, "Database error")),
    }
}

async fn delete_movie_post(
    path: web::Path<(u64, u64)>,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let (user_id, movie_id) = path.into_inner();
    match db.delete_movie(movie_id) {
        Ok(true) => Ok(found(&format!("/user/{}?deleted", user_id))),
        Ok(false) => Ok(found(&format!("/user/{}?not_found", user_id))),
        Err(err) => Err(log_error(err, "Database error")),
    }
}

async fn movie_details(
    path: web::Path<u64>,
    tera: Tera,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let movie_id = path.into_inner();
    let (movie, user) = match db
        .get_movie_with_owner(movie_id)
        .map_err(|err| log_error(err, "Database error"))?
    {
        Some(pair) => pair,
        None => return Ok(found("/")),
    };
    let mut ctx = tera::Context::new();
    ctx.insert("movie", &MovieView {
        id: movie_id,
        movie: &movie,
    });
    ctx.insert("user", &user);
    render(&tera, "movie_details.html", &ctx)
}

async fn not_found(tera: Tera) -> actix_web::Result<HttpResponse> {
    let body = tera
        .render("404.html", &tera::Context::new())
        .map_err(|err| log_error(err, "Template error"))?;
    Ok(HttpResponse::NotFound().content_type("text/html").body(body))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    std::env::set_var("RUST_LOG", "movieweb=debug,actix_web=info");
    env_logger::init();

    let db_path = std::env::var("MOVIEWEB_DB").unwrap_or_else(|_| "data/movies.db".to_owned());
    let addr = std::env::var("MOVIEWEB_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_owned());
    let db = sled::open(&db_path).unwrap();
    let config = web::Data::new(AppConfig {
        omdb_api_key: std::env::var("OMDB_API_KEY").ok(),
        deepseek_api_key: std::env::var("DEEPSEEK_API_KEY").ok(),
        client: reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap(),
    });

    HttpServer::new(move || {
        let tera = tera::Tera::new(concat!(env!("CARGO_MANIFEST_DIR"), "/templates/**/*")).unwrap();
        App::new()
            .wrap(Logger::default())
            .app_data(web::Data::new(tera))
            .app_data(web::Data::new(db.clone()))
            .app_data(config.clone())
            .route("/", web::get().to(home))
            .route("/users", web::get().to(list_users))
            .route("/user/{user_id}", web::get().to(user_movies))
            .route("/add_user", web::get().to(add_user_form))
            .route("/add_user", web::post().to(add_user_post))
            .route("/add_movie/{user_id}", web::get().to(add_movie_form))
            .route("/add_movie/{user_id}", web::post().to(add_movie_post))
            .route(
                "/user/{user_id}/update_movie/{movie_id}",
                web::get().to(update_movie_form),
            )
            .route(
                "/user/{user_id}/update_movie/{movie_id}",
                web::post().to(update_movie_post),
            )
            .route(
                "/user/{user_id}/delete_movie/{movie_id}",
                web::post().to(delete_movie_post),
            )
            .route("/movie/{movie_id}", web::get().to(movie_details))
            .route("/funfact/{theme}", web::get().to(themed_funfact))
            .default_service(web::route().to(not_found))
    })
    .bind(&addr)?
    .run()
    .await
}
