// ./infrastructure/src/persistence/in_memory_repository.rs
use application::{ApplicationError, PersonRepository};
use async_trait::async_trait;
use dashmap::DashMap;
use domain::{Person, PersonId, Profile};
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Default)]
pub struct InMemoryPersonRepository {
    // Person ID -> Person
    people: Arc<DashMap<PersonId, Arc<Person>>>,
}

impl InMemoryPersonRepository {
    pub fn new() -> Self {
        Self {
            people: Arc::new(DashMap::new()),
        }
    }
}

#[async_trait]
impl PersonRepository for InMemoryPersonRepository {
    #[instrument(skip(self, person), fields(person_id = %person.id()))]
    async fn insert(&self, person: &Person) -> Result<(), ApplicationError> {
        debug!("Inserting person into in-memory store");
        self.people.insert(*person.id(), Arc::new(person.clone()));
        Ok(())
    }

    #[instrument(skip(self), fields(person_id = %id))]
    async fn get(&self, id: &PersonId) -> Result<Option<Person>, ApplicationError> {
        debug!("Getting person from in-memory store");
        // Get returns a Ref, so we clone the Person inside the Arc
        Ok(self.people.get(id).map(|person_ref| (**person_ref).clone()))
    }

    #[instrument(skip(self))]
    async fn list(&self, name: Option<&str>) -> Result<Vec<Person>, ApplicationError> {
        debug!("Listing people from in-memory store");
        let mut people: Vec<Person> = self
            .people
            .iter()
            .filter(|entry| name.is_none_or(|name| entry.value().name() == name))
            .map(|entry| (**entry.value()).clone())
            .collect();
        // DashMap iteration order is arbitrary; keep responses stable.
        people.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(people)
    }

    #[instrument(skip(self, profile), fields(person_id = %id))]
    async fn update_profile(
        &self,
        id: &PersonId,
        profile: &Profile,
    ) -> Result<Option<Person>, ApplicationError> {
        debug!("Updating person profile in in-memory store");
        // The entry stays locked between read and write.
        Ok(self.people.get_mut(id).map(|mut stored| {
            let mut updated = (**stored).clone();
            updated.replace(profile.clone());
            *stored = Arc::new(updated.clone());
            updated
        }))
    }

    #[instrument(skip(self, friends), fields(person_id = %id, friends = friends.len()))]
    async fn update_friends(
        &self,
        id: &PersonId,
        friends: &[PersonId],
    ) -> Result<Option<Person>, ApplicationError> {
        debug!("Updating friend list in in-memory store");
        Ok(self.people.get_mut(id).map(|mut stored| {
            let updated = Person::from_parts(
                *stored.id(),
                stored.profile(),
                friends.to_vec(),
                stored.created_at(),
            );
            *stored = Arc::new(updated.clone());
            updated
        }))
    }

    #[instrument(skip(self), fields(person_id = %id))]
    async fn delete(&self, id: &PersonId) -> Result<bool, ApplicationError> {
        debug!("Deleting person from in-memory store");
        Ok(self.people.remove(id).is_some())
    }

    /// Single pass over the map instead of one awaited lookup per id.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn get_many(&self, ids: &[PersonId]) -> Result<Vec<Person>, ApplicationError> {
        debug!("Resolving people directly from in-memory store");
        Ok(ids
            .iter()
            .filter_map(|id| self.people.get(id).map(|person_ref| (**person_ref).clone()))
            .collect())
    }
}
