use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// --- Domain Errors ---
#[derive(Error, Debug, PartialEq)]
pub enum DomainError {
    #[error("'{0}' is not a valid person id")]
    InvalidId(String),
}

// --- Person ID ---

/// Opaque identifier of a person. Serialized as a UUID string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(Uuid);

impl PersonId {
    /// Generates a fresh, never-reused identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for PersonId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PersonId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| DomainError::InvalidId(s.to_string()))
    }
}

// --- Profile ---

/// The descriptive fields of a person: everything a full replace overwrites.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Profile {
    pub name: String,
    pub age: Option<i32>,
    pub favourite_color: Option<String>,
}

// --- Person ---

/// The person resource, including its denormalized list of friend ids.
///
/// `friends` may reference persons that no longer exist; nothing here
/// enforces referential integrity.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Person {
    id: PersonId,
    name: String,
    age: Option<i32>,
    favourite_color: Option<String>,
    #[serde(default)]
    friends: Vec<PersonId>,
    created_at: DateTime<Utc>,
}

impl Person {
    /// Creates a new person with a generated id, the current time as
    /// creation timestamp and no friends.
    pub fn new(name: String, age: Option<i32>, favourite_color: Option<String>) -> Self {
        Self {
            id: PersonId::generate(),
            name,
            age,
            favourite_color,
            friends: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Rebuilds a person from stored parts. Used by repositories; no
    /// friend-list rules are applied.
    pub fn from_parts(
        id: PersonId,
        profile: Profile,
        friends: Vec<PersonId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: profile.name,
            age: profile.age,
            favourite_color: profile.favourite_color,
            friends,
            created_at,
        }
    }

    pub fn id(&self) -> &PersonId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn age(&self) -> Option<i32> {
        self.age
    }

    pub fn favourite_color(&self) -> Option<&str> {
        self.favourite_color.as_deref()
    }

    pub fn friends(&self) -> &[PersonId] {
        &self.friends
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn profile(&self) -> Profile {
        Profile {
            name: self.name.clone(),
            age: self.age,
            favourite_color: self.favourite_color.clone(),
        }
    }

    /// Full replacement: every updatable field is overwritten, so omitted
    /// optionals are cleared. `friends` and `created_at` are untouched.
    pub fn replace(&mut self, profile: Profile) {
        self.name = profile.name;
        self.age = profile.age;
        self.favourite_color = profile.favourite_color;
    }

    /// Partial update. A field changes only when the supplied value is
    /// present and non-empty: `None`, `0` and `""` all leave the stored
    /// value as it is. Resetting a field requires [`Person::replace`].
    pub fn patch(
        &mut self,
        name: Option<String>,
        age: Option<i32>,
        favourite_color: Option<String>,
    ) {
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            self.name = name;
        }
        if let Some(age) = age.filter(|a| *a != 0) {
            self.age = Some(age);
        }
        if let Some(color) = favourite_color.filter(|c| !c.is_empty()) {
            self.favourite_color = Some(color);
        }
    }

    /// Unions `candidates` into the friend list. The person's own id is
    /// never added and the result holds no duplicates.
    pub fn add_friends<I>(&mut self, candidates: I)
    where
        I: IntoIterator<Item = PersonId>,
    {
        let own_id = self.id;
        let current = std::mem::take(&mut self.friends);
        self.friends = dedup(
            current
                .into_iter()
                .chain(candidates.into_iter().filter(|c| *c != own_id)),
        );
    }

    /// Removes every id in `ids` from the friend list, deduplicating what
    /// remains.
    pub fn remove_friends(&mut self, ids: &[PersonId]) {
        let to_remove: HashSet<&PersonId> = ids.iter().collect();
        let current = std::mem::take(&mut self.friends);
        self.friends = dedup(current.into_iter().filter(|f| !to_remove.contains(f)));
    }
}

/// Order-preserving dedup: the first occurrence of each id wins.
fn dedup<I>(ids: I) -> Vec<PersonId>
where
    I: IntoIterator<Item = PersonId>,
{
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
