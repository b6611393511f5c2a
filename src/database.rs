use crate::error::{StoreError, StoreResult};
use crate::model::*;
use log::error;
use sled::transaction::{abort, TransactionError, Transactional};

fn serialize_id(id: u64) -> [u8; 8] {
    id.to_le_bytes()
}

fn deserialize_id<V: AsRef<[u8]>>(id: V) -> u64 {
    use std::convert::TryInto;
    u64::from_le_bytes(id.as_ref().try_into().unwrap())
}

/// Composite key for the per-user movie index: user id followed by movie id.
fn movie_key(user_id: u64, movie_id: u64) -> Vec<u8> {
    let mut key = serialize_id(user_id).to_vec();
    key.extend_from_slice(&serialize_id(movie_id));
    key
}

const USERS: &[u8] = b"users";
const USERS_USERNAME: &[u8] = b"users_username";
const MOVIES: &[u8] = b"movies";
const MOVIES_USER: &[u8] = b"movies_user";

pub trait UserStore {
    fn list_users(&self) -> StoreResult<Vec<(u64, User)>>;
    fn get_user(&self, id: u64) -> StoreResult<Option<User>>;
    fn get_user_by_username(&self, username: &str) -> StoreResult<Option<(u64, User)>>;
    fn add_user(&self, username: &str) -> StoreResult<u64>;
}

pub trait MovieStore {
    fn list_movies_for_user(&self, user_id: u64) -> StoreResult<Vec<(u64, Movie)>>;
    fn get_movie(&self, id: u64) -> StoreResult<Option<Movie>>;
    fn get_movie_with_owner(&self, id: u64) -> StoreResult<Option<(Movie, User)>>;
    fn movie_exists(&self, user_id: u64, title: &str) -> StoreResult<bool>;
    fn add_movie(&self, movie: &Movie) -> StoreResult<u64>;
    fn update_movie(&self, id: u64, update: &MovieUpdate) -> StoreResult<bool>;
    fn delete_movie(&self, id: u64) -> StoreResult<bool>;
}

fn check_rating(rating: Option<f64>) -> StoreResult<()> {
    if let Some(rating) = rating {
        if !(0.0..=10.0).contains(&rating) {
            return Err(StoreError::Validation(format!(
                "rating {} outside the range 0.0-10.0",
                rating
            )));
        }
    }
    Ok(())
}

impl UserStore for sled::Db {
    fn list_users(&self) -> StoreResult<Vec<(u64, User)>> {
        let users = self.open_tree(USERS)?;
        users
            .iter()
            .map(|entry| -> StoreResult<(u64, User)> {
                let (id, data) = entry?;
                Ok((deserialize_id(id), bincode::deserialize(&data).unwrap()))
            })
            .collect()
    }

    fn get_user(&self, id: u64) -> StoreResult<Option<User>> {
        let users = self.open_tree(USERS)?;
        Ok(users
            .get(serialize_id(id))?
            .map(|d| bincode::deserialize(&d).unwrap()))
    }

    fn get_user_by_username(&self, username: &str) -> StoreResult<Option<(u64, User)>> {
        let users_username = self.open_tree(USERS_USERNAME)?;
        let users = self.open_tree(USERS)?;
        if let Some(id) = users_username.get(username)? {
            let user =
                bincode::deserialize(&users.get(&id)?.expect("Bad index users_username")).unwrap();
            Ok(Some((deserialize_id(id), user)))
        } else {
            Ok(None)
        }
    }

    fn add_user(&self, username: &str) -> StoreResult<u64> {
        let username = username.trim();
        if username.is_empty() {
            return Err(StoreError::Validation(
                "username must not be empty".to_owned(),
            ));
        }
        let users = self.open_tree(USERS)?;
        let users_username = self.open_tree(USERS_USERNAME)?;
        let id = self.generate_id()?;
        let user = User {
            username: username.to_owned(),
        };
        let result = (&users, &users_username).transaction(|(users, users_username)| {
            users.insert(&serialize_id(id), bincode::serialize(&user).unwrap())?;
            if users_username
                .insert(user.username.as_bytes(), &serialize_id(id))?
                .is_some()
            {
                return abort(StoreError::Conflict(format!(
                    "username '{}' is already taken",
                    user.username
                )));
            }
            Ok(())
        });
        match result {
            Ok(()) => Ok(id),
            Err(TransactionError::Storage(e)) => {
                error!("Error adding user: {}", e);
                Err(e.into())
            }
            Err(TransactionError::Abort(e)) => Err(e),
        }
    }
}

impl MovieStore for sled::Db {
    fn list_movies_for_user(&self, user_id: u64) -> StoreResult<Vec<(u64, Movie)>> {
        let movies = self.open_tree(MOVIES)?;
        let movies_user = self.open_tree(MOVIES_USER)?;
        movies_user
            .scan_prefix(serialize_id(user_id))
            .map(|entry| -> StoreResult<(u64, Movie)> {
                let (key, _) = entry?;
                let movie_id = deserialize_id(&key[8..]);
                let data = movies
                    .get(&key[8..])?
                    .expect("Bad index movies_user");
                Ok((movie_id, bincode::deserialize(&data).unwrap()))
            })
            .collect()
    }

    fn get_movie(&self, id: u64) -> StoreResult<Option<Movie>> {
        let movies = self.open_tree(MOVIES)?;
        Ok(movies
            .get(serialize_id(id))?
            .map(|d| bincode::deserialize(&d).unwrap()))
    }

    fn get_movie_with_owner(&self, id: u64) -> StoreResult<Option<(Movie, User)>> {
        let movie = match self.get_movie(id)? {
            Some(movie) => movie,
            None => return Ok(None),
        };
        let user = self
            .get_user(movie.user_id)?
            .expect("Bad reference movies.user_id");
        Ok(Some((movie, user)))
    }

    fn movie_exists(&self, user_id: u64, title: &str) -> StoreResult<bool> {
        // Exact, case-sensitive comparison; titles are stored trimmed.
        Ok(self
            .list_movies_for_user(user_id)?
            .iter()
            .any(|(_, movie)| movie.title == title))
    }

    fn add_movie(&self, movie: &Movie) -> StoreResult<u64> {
        if movie.title.trim().is_empty() {
            return Err(StoreError::Validation("title must not be empty".to_owned()));
        }
        check_rating(movie.rating)?;
        let users = self.open_tree(USERS)?;
        let movies = self.open_tree(MOVIES)?;
        let movies_user = self.open_tree(MOVIES_USER)?;
        let id = self.generate_id()?;
        let result = (&users, &movies, &movies_user).transaction(
            |(users, movies, movies_user)| {
                if users.get(&serialize_id(movie.user_id))?.is_none() {
                    return abort(StoreError::NotFound);
                }
                movies.insert(&serialize_id(id), bincode::serialize(movie).unwrap())?;
                movies_user.insert(movie_key(movie.user_id, id), &[] as &[u8])?;
                Ok(())
            },
        );
        match result {
            Ok(()) => Ok(id),
            Err(TransactionError::Storage(e)) => {
                error!("Error adding movie: {}", e);
                Err(e.into())
            }
            Err(TransactionError::Abort(e)) => Err(e),
        }
    }

    fn update_movie(&self, id: u64, update: &MovieUpdate) -> StoreResult<bool> {
        check_rating(update.rating)?;
        if let Some(title) = &update.title {
            if title.trim().is_empty() {
                return Err(StoreError::Validation("title must not be empty".to_owned()));
            }
        }
        let movies = self.open_tree(MOVIES)?;
        let result = movies.transaction(|movies| {
            let data = match movies.get(&serialize_id(id))? {
                Some(data) => data,
                None => return Ok(false),
            };
            let mut movie: Movie = bincode::deserialize(&data).unwrap();
            apply_update(&mut movie, update);
            movies.insert(&serialize_id(id), bincode::serialize(&movie).unwrap())?;
            Ok(true)
        });
        match result {
            Ok(found) => Ok(found),
            Err(TransactionError::Storage(e)) => {
                error!("Error updating movie: {}", e);
                Err(e.into())
            }
            Err(TransactionError::Abort(e)) => Err(e),
        }
    }

    fn delete_movie(&self, id: u64) -> StoreResult<bool> {
        let movies = self.open_tree(MOVIES)?;
        let movies_user = self.open_tree(MOVIES_USER)?;
        let result = (&movies, &movies_user).transaction(|(movies, movies_user)| {
            let data = match movies.remove(&serialize_id(id))? {
                Some(data) => data,
                None => return Ok(false),
            };
            let movie: Movie = bincode::deserialize(&data).unwrap();
            movies_user.remove(movie_key(movie.user_id, id))?;
            Ok(true)
        });
        match result {
            Ok(found) => Ok(found),
            Err(TransactionError::Storage(e)) => {
                error!("Error deleting movie: {}", e);
                Err(e.into())
            }
            Err(TransactionError::Abort(e)) => Err(e),
        }
    }
}

fn apply_update(movie: &mut Movie, update: &MovieUpdate) {
    if let Some(title) = &update.title {
        movie.title = title.trim().to_owned();
    }
    if let Some(director) = &update.director {
        movie.director = Some(director.clone());
    }
    if let Some(writer) = &update.writer {
        movie.writer = Some(writer.clone());
    }
    if let Some(actors) = &update.actors {
        movie.actors = Some(actors.clone());
    }
    if let Some(runtime) = &update.runtime {
        movie.runtime = Some(runtime.clone());
    }
    if let Some(year) = update.year {
        movie.year = Some(year);
    }
    if let Some(rating) = update.rating {
        movie.rating = Some(rating);
    }
    if let Some(genre) = &update.genre {
        movie.genre = Some(genre.clone());
    }
    if let Some(plot) = &update.plot {
        movie.plot = Some(plot.clone());
    }
    if let Some(comment) = &update.comment {
        movie.comment = comment.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> sled::Db {
        sled::Config::new().temporary(true).open().unwrap()
    }

    fn dune(user_id: u64) -> Movie {
        Movie {
            user_id,
            title: "Dune".to_owned(),
            year: Some(2021),
            rating: Some(8.0),
            ..Movie::default()
        }
    }

    #[test]
    fn add_user_and_lookup() {
        let db = test_db();
        let id = db.add_user("alice").unwrap();
        let (found_id, user) = db.get_user_by_username("alice").unwrap().unwrap();
        assert_eq!(found_id, id);
        assert_eq!(user.username, "alice");
        assert_eq!(db.get_user(id).unwrap().unwrap().username, "alice");
    }

    #[test]
    fn add_user_trims_username() {
        let db = test_db();
        let id = db.add_user("  bob  ").unwrap();
        assert_eq!(db.get_user(id).unwrap().unwrap().username, "bob");
        assert!(db.get_user_by_username("bob").unwrap().is_some());
    }

    #[test]
    fn duplicate_username_is_a_conflict() {
        let db = test_db();
        db.add_user("alice").unwrap();
        let err = db.add_user("alice").unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(db.list_users().unwrap().len(), 1);
    }

    #[test]
    fn empty_username_is_rejected() {
        let db = test_db();
        let err = db.add_user("   ").unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(db.list_users().unwrap().is_empty());
    }

    #[test]
    fn add_movie_round_trips_every_field() {
        let db = test_db();
        let user_id = db.add_user("alice").unwrap();
        let movie = Movie {
            user_id,
            title: "Blade Runner".to_owned(),
            director: Some("Ridley Scott".to_owned()),
            writer: Some("Hampton Fancher, David Peoples".to_owned()),
            actors: Some("Harrison Ford".to_owned()),
            runtime: Some("117 min".to_owned()),
            year: Some(1982),
            rating: Some(8.1),
            genre: Some("Sci-Fi".to_owned()),
            plot: Some("A blade runner must pursue replicants.".to_owned()),
            comment: "a favourite".to_owned(),
        };
        let id = db.add_movie(&movie).unwrap();
        assert_eq!(db.get_movie(id).unwrap().unwrap(), movie);
    }

    #[test]
    fn unsupplied_fields_stay_absent() {
        let db = test_db();
        let user_id = db.add_user("alice").unwrap();
        let id = db
            .add_movie(&Movie {
                user_id,
                title: "Stalker".to_owned(),
                ..Movie::default()
            })
            .unwrap();
        let movie = db.get_movie(id).unwrap().unwrap();
        assert_eq!(movie.director, None);
        assert_eq!(movie.year, None);
        assert_eq!(movie.rating, None);
        assert_eq!(movie.comment, "");
    }

    #[test]
    fn out_of_range_rating_is_rejected() {
        let db = test_db();
        let user_id = db.add_user("alice").unwrap();
        for rating in [-0.1, 10.5] {
            let err = db
                .add_movie(&Movie {
                    user_id,
                    title: "Bad".to_owned(),
                    rating: Some(rating),
                    ..Movie::default()
                })
                .unwrap_err();
            assert!(matches!(err, StoreError::Validation(_)));
        }
        assert!(db.list_movies_for_user(user_id).unwrap().is_empty());
    }

    #[test]
    fn boundary_ratings_are_accepted() {
        let db = test_db();
        let user_id = db.add_user("alice").unwrap();
        for (title, rating) in [("Zero", 0.0), ("Ten", 10.0)] {
            db.add_movie(&Movie {
                user_id,
                title: title.to_owned(),
                rating: Some(rating),
                ..Movie::default()
            })
            .unwrap();
        }
        assert_eq!(db.list_movies_for_user(user_id).unwrap().len(), 2);
    }

    #[test]
    fn add_movie_for_unknown_owner_is_not_found() {
        let db = test_db();
        let err = db.add_movie(&dune(42)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
        assert!(db.get_movie(0).unwrap().is_none());
    }

    #[test]
    fn update_changes_only_supplied_fields() {
        let db = test_db();
        let user_id = db.add_user("alice").unwrap();
        let id = db
            .add_movie(&Movie {
                user_id,
                title: "Alien".to_owned(),
                director: Some("Ridley Scott".to_owned()),
                year: Some(1979),
                rating: Some(8.5),
                ..Movie::default()
            })
            .unwrap();
        let before = db.get_movie(id).unwrap().unwrap();
        let applied = db
            .update_movie(
                id,
                &MovieUpdate {
                    rating: Some(9.0),
                    comment: Some("rewatched".to_owned()),
                    ..MovieUpdate::default()
                },
            )
            .unwrap();
        assert!(applied);
        let after = db.get_movie(id).unwrap().unwrap();
        assert_eq!(after.rating, Some(9.0));
        assert_eq!(after.comment, "rewatched");
        assert_eq!(after.title, before.title);
        assert_eq!(after.director, before.director);
        assert_eq!(after.writer, before.writer);
        assert_eq!(after.year, before.year);
        assert_eq!(after.plot, before.plot);
    }

    #[test]
    fn update_of_missing_movie_returns_false() {
        let db = test_db();
        let applied = db
            .update_movie(
                7,
                &MovieUpdate {
                    title: Some("Ghost".to_owned()),
                    ..MovieUpdate::default()
                },
            )
            .unwrap();
        assert!(!applied);
    }

    #[test]
    fn update_with_bad_rating_leaves_record_unchanged() {
        let db = test_db();
        let user_id = db.add_user("alice").unwrap();
        let id = db.add_movie(&dune(user_id)).unwrap();
        let err = db
            .update_movie(
                id,
                &MovieUpdate {
                    rating: Some(11.0),
                    ..MovieUpdate::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(db.get_movie(id).unwrap().unwrap().rating, Some(8.0));
    }

    #[test]
    fn movie_exists_is_scoped_to_the_owner() {
        let db = test_db();
        let alice = db.add_user("alice").unwrap();
        let bob = db.add_user("bob").unwrap();
        db.add_movie(&dune(alice)).unwrap();
        assert!(db.movie_exists(alice, "Dune").unwrap());
        assert!(!db.movie_exists(bob, "Dune").unwrap());
        assert!(!db.movie_exists(alice, "dune").unwrap());
    }

    #[test]
    fn delete_of_missing_movie_returns_false() {
        let db = test_db();
        let user_id = db.add_user("alice").unwrap();
        db.add_movie(&dune(user_id)).unwrap();
        assert!(!db.delete_movie(999).unwrap());
        assert_eq!(db.list_movies_for_user(user_id).unwrap().len(), 1);
    }

    #[test]
    fn delete_removes_row_and_listing() {
        let db = test_db();
        let user_id = db.add_user("alice").unwrap();
        let id = db.add_movie(&dune(user_id)).unwrap();
        assert!(db.delete_movie(id).unwrap());
        assert!(db.get_movie(id).unwrap().is_none());
        assert!(db.list_movies_for_user(user_id).unwrap().is_empty());
        assert!(!db.movie_exists(user_id, "Dune").unwrap());
    }

    #[test]
    fn listing_for_unknown_user_is_empty() {
        let db = test_db();
        assert!(db.list_movies_for_user(99).unwrap().is_empty());
    }

    #[test]
    fn get_movie_with_owner_attaches_the_user() {
        let db = test_db();
        let user_id = db.add_user("alice").unwrap();
        let id = db.add_movie(&dune(user_id)).unwrap();
        let (movie, user) = db.get_movie_with_owner(id).unwrap().unwrap();
        assert_eq!(movie.title, "Dune");
        assert_eq!(user.username, "alice");
        assert!(db.get_movie_with_owner(id + 1000).unwrap().is_none());
    }
}
