// ./infrastructure/src/persistence/sqlite_repository.rs
use application::{ApplicationError, PersonRepository};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use domain::{Person, PersonId, Profile};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument};

const PERSON_COLUMNS: &str = "id, name, age, favourite_color, friends, created_at";

/// SQLite-backed person store. The `people` table is created on open if
/// missing; `friends` is kept as a JSON array of id strings.
#[derive(Debug, Clone)]
pub struct SqlitePersonRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqlitePersonRepository {
    /// Opens the database named by a `DATABASE_URL` value. Accepts
    /// `sqlite://<path>`, `sqlite:<path>` or a bare file path.
    pub fn connect(database_url: &str) -> Result<Self, ApplicationError> {
        let path = database_path(database_url)?;
        Self::open(path)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, ApplicationError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            ApplicationError::Repository(format!(
                "Failed to open database '{}': {}",
                path.display(),
                e
            ))
        })?;
        initialize(&conn).map_err(storage_error)?;
        info!(path = %path.display(), "SQLite person store ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `op` against the connection on the blocking thread pool.
    async fn run<T, F>(&self, op: F) -> Result<T, ApplicationError>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| {
                ApplicationError::Repository("SQLite connection lock poisoned".to_string())
            })?;
            op(&mut *guard).map_err(storage_error)
        })
        .await
        .map_err(|e| ApplicationError::Repository(format!("Storage task failed: {}", e)))?
    }
}

/// Creates the schema if it doesn't exist.
fn initialize(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS people (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            age INTEGER,
            favourite_color TEXT,
            friends TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_people_name ON people(name);
        ",
    )
}

fn database_path(database_url: &str) -> Result<&str, ApplicationError> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);
    if path.is_empty() || path.contains("://") {
        return Err(ApplicationError::Repository(format!(
            "Unsupported DATABASE_URL '{}': expected a sqlite path",
            database_url
        )));
    }
    Ok(path)
}

fn storage_error(e: rusqlite::Error) -> ApplicationError {
    ApplicationError::Repository(e.to_string())
}

fn conversion_error(
    column: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e))
}

fn encode_friends(friends: &[PersonId]) -> rusqlite::Result<String> {
    serde_json::to_string(friends)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

// Fixed-width UTC timestamps sort lexicographically in creation order.
fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn row_to_person(row: &Row) -> rusqlite::Result<Person> {
    let id: String = row.get(0)?;
    let friends: String = row.get(4)?;
    let created_at: String = row.get(5)?;

    Ok(Person::from_parts(
        id.parse::<PersonId>().map_err(|e| conversion_error(0, e))?,
        Profile {
            name: row.get(1)?,
            age: row.get(2)?,
            favourite_color: row.get(3)?,
        },
        serde_json::from_str(&friends).map_err(|e| conversion_error(4, e))?,
        DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| conversion_error(5, e))?
            .with_timezone(&Utc),
    ))
}

fn find_by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<Person>> {
    conn.query_row(
        &format!("SELECT {PERSON_COLUMNS} FROM people WHERE id = ?1"),
        params![id],
        row_to_person,
    )
    .optional()
}

#[async_trait]
impl PersonRepository for SqlitePersonRepository {
    #[instrument(skip(self, person), fields(person_id = %person.id()))]
    async fn insert(&self, person: &Person) -> Result<(), ApplicationError> {
        debug!("Inserting person into SQLite store");
        let person = person.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO people (id, name, age, favourite_color, friends, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    person.id().to_string(),
                    person.name(),
                    person.age(),
                    person.favourite_color(),
                    encode_friends(person.friends())?,
                    encode_timestamp(person.created_at()),
                ],
            )?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self), fields(person_id = %id))]
    async fn get(&self, id: &PersonId) -> Result<Option<Person>, ApplicationError> {
        debug!("Getting person from SQLite store");
        let id = id.to_string();
        self.run(move |conn| find_by_id(conn, &id)).await
    }

    #[instrument(skip(self))]
    async fn list(&self, name: Option<&str>) -> Result<Vec<Person>, ApplicationError> {
        debug!("Listing people from SQLite store");
        let name = name.map(str::to_string);
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PERSON_COLUMNS} FROM people
                 WHERE ?1 IS NULL OR name = ?1
                 ORDER BY created_at, id"
            ))?;
            let people = stmt
                .query_map(params![name], row_to_person)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(people)
        })
        .await
    }

    #[instrument(skip(self, profile), fields(person_id = %id))]
    async fn update_profile(
        &self,
        id: &PersonId,
        profile: &Profile,
    ) -> Result<Option<Person>, ApplicationError> {
        debug!("Updating person profile in SQLite store");
        let id = id.to_string();
        let profile = profile.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE people SET name = ?1, age = ?2, favourite_color = ?3 WHERE id = ?4",
                params![profile.name, profile.age, profile.favourite_color, id],
            )?;
            let refreshed = if changed == 0 {
                None
            } else {
                find_by_id(&tx, &id)?
            };
            tx.commit()?;
            Ok(refreshed)
        })
        .await
    }

    #[instrument(skip(self, friends), fields(person_id = %id, friends = friends.len()))]
    async fn update_friends(
        &self,
        id: &PersonId,
        friends: &[PersonId],
    ) -> Result<Option<Person>, ApplicationError> {
        debug!("Updating friend list in SQLite store");
        let id = id.to_string();
        let friends = encode_friends(friends).map_err(storage_error)?;
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE people SET friends = ?1 WHERE id = ?2",
                params![friends, id],
            )?;
            let refreshed = if changed == 0 {
                None
            } else {
                find_by_id(&tx, &id)?
            };
            tx.commit()?;
            Ok(refreshed)
        })
        .await
    }

    #[instrument(skip(self), fields(person_id = %id))]
    async fn delete(&self, id: &PersonId) -> Result<bool, ApplicationError> {
        debug!("Deleting person from SQLite store");
        let id = id.to_string();
        self.run(move |conn| {
            let removed = conn.execute("DELETE FROM people WHERE id = ?1", params![id])?;
            Ok(removed > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(name: &str) -> Person {
        Person::new(name.to_string(), None, None)
    }

    fn open(dir: &tempfile::TempDir) -> SqlitePersonRepository {
        SqlitePersonRepository::open(dir.path().join("people.db")).unwrap()
    }

    #[test]
    fn database_url_forms() {
        assert_eq!(database_path("sqlite://people.db").unwrap(), "people.db");
        assert_eq!(database_path("sqlite:/var/lib/people.db").unwrap(), "/var/lib/people.db");
        assert_eq!(database_path("people.db").unwrap(), "people.db");
        assert!(database_path("postgresql://localhost/people").is_err());
        assert!(database_path("sqlite://").is_err());
    }

    #[tokio::test]
    async fn records_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = Person::new("Guido van Rossum".to_string(), Some(49), Some("black".into()));
        let friend = PersonId::generate();
        p.add_friends([friend]);

        {
            let repo = open(&dir);
            repo.insert(&p).await.unwrap();
        }

        let reopened = open(&dir);
        assert_eq!(reopened.get(p.id()).await.unwrap(), Some(p));
    }

    #[tokio::test]
    async fn list_filters_by_exact_name_in_creation_order() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open(&dir);
        let mut people: Vec<Person> =
            ["Gbenga Adeyi", "Graydon Hoare", "Gbenga Adeyi"].map(person).into();
        for p in &people {
            repo.insert(p).await.unwrap();
        }
        people.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });

        assert_eq!(repo.list(None).await.unwrap(), people);
        let matched = repo.list(Some("Gbenga Adeyi")).await.unwrap();
        let expected: Vec<Person> =
            people.into_iter().filter(|p| p.name() == "Gbenga Adeyi").collect();
        assert_eq!(matched, expected);
        assert!(repo.list(Some("gbenga adeyi")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn column_updates_leave_other_columns_alone() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open(&dir);
        let p = person("a");
        let friend = PersonId::generate();
        repo.insert(&p).await.unwrap();

        let with_friend = repo.update_friends(p.id(), &[friend]).await.unwrap().unwrap();
        assert_eq!(with_friend.name(), "a");
        assert_eq!(with_friend.friends(), &[friend]);

        let profile = Profile {
            name: "b".to_string(),
            age: Some(30),
            favourite_color: None,
        };
        let renamed = repo.update_profile(p.id(), &profile).await.unwrap().unwrap();
        assert_eq!(renamed.profile(), profile);
        assert_eq!(renamed.friends(), &[friend]);
        assert_eq!(renamed.created_at(), p.created_at());
    }

    #[tokio::test]
    async fn missing_records_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open(&dir);
        let id = PersonId::generate();
        assert_eq!(repo.get(&id).await.unwrap(), None);
        assert_eq!(repo.update_friends(&id, &[]).await.unwrap(), None);
        assert!(!repo.delete(&id).await.unwrap());
    }

    #[tokio::test]
    async fn delete_then_get_and_batch_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open(&dir);
        let (a, b) = (person("a"), person("b"));
        repo.insert(&a).await.unwrap();
        repo.insert(&b).await.unwrap();

        assert!(repo.delete(a.id()).await.unwrap());
        assert_eq!(repo.get(a.id()).await.unwrap(), None);
        assert_eq!(repo.get_many(&[*a.id(), *b.id()]).await.unwrap(), vec![b]);
    }
}
