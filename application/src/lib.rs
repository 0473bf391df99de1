use async_trait::async_trait;
use domain::{DomainError, Person, PersonId, Profile};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

// --- Application Errors ---
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("person with id {0} not found.")]
    NotFound(PersonId),
    #[error("Repository error: {0}")]
    Repository(String),
    #[error("Domain validation error: {0}")]
    DomainError(#[from] DomainError), // Propagate domain errors cleanly
}

// --- Infrastructure Interfaces (Traits) ---

/// Interface to the store persisting people.
///
/// Every successful write is visible to the next read; implementations
/// backed by a transactional store commit before returning. Updates only
/// touch the columns they name, so a profile update never rewrites
/// `friends` and vice versa.
#[async_trait]
pub trait PersonRepository: Send + Sync {
    /// Persists a newly created person.
    async fn insert(&self, person: &Person) -> Result<(), ApplicationError>;
    /// Retrieves a person by id.
    async fn get(&self, id: &PersonId) -> Result<Option<Person>, ApplicationError>;
    /// Lists people, optionally only those whose name equals `name` exactly.
    async fn list(&self, name: Option<&str>) -> Result<Vec<Person>, ApplicationError>;
    /// Overwrites name, age and favourite colour. Returns the refreshed
    /// record, or `None` if it does not exist.
    async fn update_profile(
        &self,
        id: &PersonId,
        profile: &Profile,
    ) -> Result<Option<Person>, ApplicationError>;
    /// Overwrites the friend list. Returns the refreshed record, or `None`
    /// if it does not exist.
    async fn update_friends(
        &self,
        id: &PersonId,
        friends: &[PersonId],
    ) -> Result<Option<Person>, ApplicationError>;
    /// Deletes a person by id. Returns true if deleted.
    async fn delete(&self, id: &PersonId) -> Result<bool, ApplicationError>;
    /// Resolves ids to stored people, skipping ids with no record.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn get_many(&self, ids: &[PersonId]) -> Result<Vec<Person>, ApplicationError> {
        debug!("Resolving people via default iteration");
        let mut people = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(person) = self.get(id).await? {
                people.push(person);
            }
        }
        Ok(people)
    }
}

// --- Request Models (Data Transfer Objects - DTOs) ---

/// Payload for creating or fully replacing a person.
#[derive(Deserialize, Debug, Clone)]
pub struct PersonRequest {
    pub name: String,
    #[serde(default)]
    pub age: Option<i32>,
    #[serde(default)]
    pub favourite_color: Option<String>,
}

/// Payload for a partial update. Missing, zero and empty values are ignored.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct PartialPersonRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub age: Option<i32>,
    #[serde(default)]
    pub favourite_color: Option<String>,
}

// --- Application Services (Use Cases) ---

/// Service managing people and their friend lists.
pub struct PersonService {
    repo: Arc<dyn PersonRepository>,
}

impl PersonService {
    pub fn new(repo: Arc<dyn PersonRepository>) -> Self {
        Self { repo }
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_person(&self, request: PersonRequest) -> Result<Person, ApplicationError> {
        info!("Attempting to create person");
        let person = Person::new(request.name, request.age, request.favourite_color);
        self.repo.insert(&person).await.map_err(|e| {
            error!(person_id = %person.id(), "Failed to insert person: {}", e);
            e
        })?;
        info!(person_id = %person.id(), "Person created successfully");
        Ok(person)
    }

    /// Lists all people, or only those named exactly `name`. An empty
    /// filter is treated as no filter.
    #[instrument(skip(self))]
    pub async fn list_people(&self, name: Option<&str>) -> Result<Vec<Person>, ApplicationError> {
        let filter = name.filter(|n| !n.is_empty());
        let people = self.repo.list(filter).await?;
        debug!(count = people.len(), "People listed");
        Ok(people)
    }

    #[instrument(skip(self), fields(person_id = %id))]
    pub async fn get_person(&self, id: &PersonId) -> Result<Person, ApplicationError> {
        self.repo.get(id).await?.ok_or_else(|| {
            warn!("Person not found");
            ApplicationError::NotFound(*id)
        })
    }

    /// Overwrites name, age and favourite colour. `friends` and
    /// `created_at` are not written.
    #[instrument(skip(self, request), fields(person_id = %id))]
    pub async fn replace_person(
        &self,
        id: &PersonId,
        request: PersonRequest,
    ) -> Result<Person, ApplicationError> {
        info!("Attempting to replace person");
        let profile = Profile {
            name: request.name,
            age: request.age,
            favourite_color: request.favourite_color,
        };
        let person = self.write_profile(id, &profile).await?;
        info!("Person replaced successfully");
        Ok(person)
    }

    #[instrument(skip(self, request), fields(person_id = %id))]
    pub async fn patch_person(
        &self,
        id: &PersonId,
        request: PartialPersonRequest,
    ) -> Result<Person, ApplicationError> {
        info!("Attempting to patch person");
        let mut person = self.get_person(id).await?;
        person.patch(request.name, request.age, request.favourite_color);
        let person = self.write_profile(id, &person.profile()).await?;
        info!("Person patched successfully");
        Ok(person)
    }

    /// Hard-deletes a person. Other people's friend lists keep the id.
    #[instrument(skip(self), fields(person_id = %id))]
    pub async fn delete_person(&self, id: &PersonId) -> Result<(), ApplicationError> {
        info!("Attempting to delete person");
        if self.repo.delete(id).await? {
            info!("Person deleted successfully");
            Ok(())
        } else {
            warn!("Deletion failed: person not found");
            Err(ApplicationError::NotFound(*id))
        }
    }

    /// Resolves the person's friends. Dangling ids are skipped.
    #[instrument(skip(self), fields(person_id = %id))]
    pub async fn list_friends(&self, id: &PersonId) -> Result<Vec<Person>, ApplicationError> {
        let person = self.get_person(id).await?;
        if person.friends().is_empty() {
            return Ok(Vec::new());
        }
        let friends = self.repo.get_many(person.friends()).await?;
        let dangling = person.friends().len() - friends.len();
        if dangling > 0 {
            debug!(dangling, "Skipped friend ids with no matching person");
        }
        Ok(friends)
    }

    /// Adds the existing people among `candidate_ids` as friends. Unknown
    /// ids and the person's own id are dropped.
    #[instrument(
        skip(self, candidate_ids),
        fields(person_id = %id, candidates = candidate_ids.len())
    )]
    pub async fn add_friends(
        &self,
        id: &PersonId,
        candidate_ids: &[PersonId],
    ) -> Result<Person, ApplicationError> {
        info!("Attempting to add friends");
        let mut person = self.get_person(id).await?;
        let resolved = self.repo.get_many(candidate_ids).await?;
        person.add_friends(resolved.iter().map(|friend| *friend.id()));
        let person = self.write_friends(&person).await?;
        info!(friends = person.friends().len(), "Friends added successfully");
        Ok(person)
    }

    /// Removes the existing people among `candidate_ids` from the friend
    /// list. Nothing is written when the list is already empty.
    #[instrument(
        skip(self, candidate_ids),
        fields(person_id = %id, candidates = candidate_ids.len())
    )]
    pub async fn remove_friends(
        &self,
        id: &PersonId,
        candidate_ids: &[PersonId],
    ) -> Result<Person, ApplicationError> {
        info!("Attempting to remove friends");
        let mut person = self.get_person(id).await?;
        let resolved = self.repo.get_many(candidate_ids).await?;
        if person.friends().is_empty() {
            debug!("Friend list already empty, nothing to remove");
            return Ok(person);
        }
        let resolved_ids: Vec<PersonId> = resolved.iter().map(|friend| *friend.id()).collect();
        person.remove_friends(&resolved_ids);
        let person = self.write_friends(&person).await?;
        info!(friends = person.friends().len(), "Friends removed successfully");
        Ok(person)
    }

    async fn write_profile(
        &self,
        id: &PersonId,
        profile: &Profile,
    ) -> Result<Person, ApplicationError> {
        self.repo.update_profile(id, profile).await?.ok_or_else(|| {
            warn!(person_id = %id, "Person not found for profile update");
            ApplicationError::NotFound(*id)
        })
    }

    async fn write_friends(&self, person: &Person) -> Result<Person, ApplicationError> {
        self.repo
            .update_friends(person.id(), person.friends())
            .await?
            .ok_or_else(|| {
                warn!(person_id = %person.id(), "Person vanished before friends update");
                ApplicationError::NotFound(*person.id())
            })
    }
}
