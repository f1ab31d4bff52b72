use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CredentialStore, LogStore, StoreError};
use crate::models::{Identity, IdentityChanges, LogFilter, NewIdentity, RequestLog};

/// Process-local credential store. Every method takes the lock once, so the
/// compare-and-set in `swap_refresh_token` is atomic.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    identities: RwLock<HashMap<Uuid, Identity>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn email_taken(identities: &HashMap<Uuid, Identity>, email: &str, except: Option<Uuid>) -> bool {
    identities
        .values()
        .any(|identity| identity.email == email && Some(identity.id) != except)
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn insert(&self, new: NewIdentity) -> Result<Identity, StoreError> {
        let mut identities = self.identities.write().await;
        if email_taken(&identities, &new.email, None) || identities.contains_key(&new.id) {
            return Err(StoreError::DuplicateEmail);
        }

        let now = Utc::now();
        let identity = Identity {
            id: new.id,
            email: new.email,
            password_hash: new.password_hash,
            first_name: new.first_name,
            last_name: new.last_name,
            role: new.role,
            refresh_token: new.refresh_token,
            created_at: now,
            updated_at: now,
        };
        identities.insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        Ok(self.identities.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self
            .identities
            .read()
            .await
            .values()
            .find(|identity| identity.email == email)
            .cloned())
    }

    async fn set_refresh_token(&self, id: Uuid, token: &str) -> Result<(), StoreError> {
        if let Some(identity) = self.identities.write().await.get_mut(&id) {
            identity.refresh_token = Some(token.to_string());
            identity.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        id: Uuid,
        expected: &str,
        replacement: &str,
    ) -> Result<bool, StoreError> {
        let mut identities = self.identities.write().await;
        match identities.get_mut(&id) {
            Some(identity) if identity.refresh_token.as_deref() == Some(expected) => {
                identity.refresh_token = Some(replacement.to_string());
                identity.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn clear_refresh_token(&self, id: Uuid) -> Result<(), StoreError> {
        if let Some(identity) = self.identities.write().await.get_mut(&id) {
            if identity.refresh_token.take().is_some() {
                identity.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn clear_refresh_token_if(&self, id: Uuid, expected: &str) -> Result<bool, StoreError> {
        let mut identities = self.identities.write().await;
        match identities.get_mut(&id) {
            Some(identity) if identity.refresh_token.as_deref() == Some(expected) => {
                identity.refresh_token = None;
                identity.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list(&self) -> Result<Vec<Identity>, StoreError> {
        let mut all: Vec<Identity> = self.identities.read().await.values().cloned().collect();
        all.sort_by_key(|identity| identity.created_at);
        Ok(all)
    }

    async fn update(
        &self,
        id: Uuid,
        changes: IdentityChanges,
    ) -> Result<Option<Identity>, StoreError> {
        let mut identities = self.identities.write().await;
        if let Some(email) = &changes.email {
            if email_taken(&identities, email, Some(id)) {
                return Err(StoreError::DuplicateEmail);
            }
        }

        let Some(identity) = identities.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(email) = changes.email {
            identity.email = email;
        }
        if let Some(first_name) = changes.first_name {
            identity.first_name = first_name;
        }
        if let Some(last_name) = changes.last_name {
            identity.last_name = last_name;
        }
        if let Some(role) = changes.role {
            identity.role = role;
        }
        identity.updated_at = Utc::now();
        Ok(Some(identity.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.identities.write().await.remove(&id).is_some())
    }
}

#[derive(Debug, Default)]
pub struct MemoryLogStore {
    entries: RwLock<Vec<RequestLog>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn record(&self, entry: RequestLog) -> Result<(), StoreError> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn query(&self, filter: &LogFilter) -> Result<Vec<RequestLog>, StoreError> {
        let mut matching: Vec<RequestLog> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(matching)
    }
}
