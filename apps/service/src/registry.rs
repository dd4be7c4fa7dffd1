//! Registering, editing and removing monitors.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::database::{Database, Monitor, MonitorUpdate, NewMonitor, PingResult, UrlTaken};
use crate::monitoring::PingService;
use crate::monitoring::validation::{self, ValidationError};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("monitor {0} not found")]
    NotFound(Uuid),
    #[error("a monitor for {0} already exists")]
    DuplicateUrl(String),
    #[error("invalid password")]
    InvalidCredential,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(anyhow::Error),
}

impl From<anyhow::Error> for RegistryError {
    /// The unique URL index firing surfaces as `DuplicateUrl`.
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<UrlTaken>() {
            Ok(UrlTaken(url)) => RegistryError::DuplicateUrl(url),
            Err(error) => RegistryError::Storage(error),
        }
    }
}

pub type Result<T, E = RegistryError> = std::result::Result<T, E>;

pub struct Registry {
    db: Arc<dyn Database>,
    service: Arc<PingService>,
    hash_cost: u32,
    display_limit: usize,
}

impl Registry {
    pub fn new(db: Arc<dyn Database>, service: Arc<PingService>, display_limit: usize) -> Self {
        Self { db, service, hash_cost: bcrypt::DEFAULT_COST, display_limit }
    }

    /// Override the bcrypt work factor
    #[cfg(test)]
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    /// Register a monitor and kick off its first check in the background.
    pub async fn create(
        &self,
        name: &str,
        url: &str,
        interval: u32,
        password: &str,
    ) -> Result<(Monitor, JoinHandle<()>)> {
        validation::validate_name(name)?;
        let url = validation::validate_url(url.trim())?;
        validation::validate_interval(interval)?;
        validation::validate_password(password)?;

        let url = url.to_string();
        if self.db.check_duplicate_url(&url, None).await? {
            return Err(RegistryError::DuplicateUrl(url));
        }

        let password_hash = self.hash(password).await?;
        let monitor = self
            .db
            .create_monitor(NewMonitor { name: name.trim().to_string(), url, interval, password_hash })
            .await?;

        tracing::info!(monitor_id = %monitor.id, url = %monitor.url, "Monitor registered");
        let initial_check = self.service.spawn_check(monitor.id);

        Ok((monitor, initial_check))
    }

    /// Apply an edit. A changed URL gets a fresh check in the background.
    pub async fn update(&self, id: Uuid, mut update: MonitorUpdate) -> Result<(Monitor, Option<JoinHandle<()>>)> {
        let existing = self.get(id).await?;

        if let Some(name) = &update.name {
            validation::validate_name(name)?;
            update.name = Some(name.trim().to_string());
        }
        if let Some(interval) = update.interval {
            validation::validate_interval(interval)?;
        }
        if let Some(url) = &update.url {
            let url = validation::validate_url(url.trim())?.to_string();
            if self.db.check_duplicate_url(&url, Some(id)).await? {
                return Err(RegistryError::DuplicateUrl(url));
            }
            update.url = Some(url);
        }

        let url_changed = update.url.as_ref().is_some_and(|url| *url != existing.url);

        if !self.db.update_monitor(id, update).await? {
            return Err(RegistryError::NotFound(id));
        }
        let updated = self.get(id).await?;

        let recheck = url_changed.then(|| {
            tracing::info!(monitor_id = %id, url = %updated.url, "Monitor URL changed, re-checking");
            self.service.spawn_check(id)
        });

        Ok((updated, recheck))
    }

    /// Remove a monitor and its history after checking its password.
    pub async fn delete(&self, id: Uuid, password: &str) -> Result<()> {
        let existing = self.get(id).await?;

        if !self.verify(password, &existing.password_hash).await? {
            tracing::warn!(monitor_id = %id, "Rejected delete with wrong password");
            return Err(RegistryError::InvalidCredential);
        }

        let aggregator = self.service.aggregator();
        {
            let _guard = aggregator.lock(id).await;
            if !self.db.delete_monitor(id).await? {
                return Err(RegistryError::NotFound(id));
            }
        }
        aggregator.forget(id).await;

        tracing::info!(monitor_id = %id, "Monitor deleted");
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Monitor> {
        self.db.get_monitor(id).await?.ok_or(RegistryError::NotFound(id))
    }

    pub async fn list(&self) -> Result<Vec<Monitor>> {
        Ok(self.db.get_all_monitors().await?)
    }

    /// The display window of a monitor's history, oldest first
    pub async fn history(&self, id: Uuid) -> Result<Vec<PingResult>> {
        self.get(id).await?;
        Ok(self.db.get_ping_results(id, self.display_limit).await?)
    }

    pub async fn all_history(&self) -> Result<HashMap<Uuid, Vec<PingResult>>> {
        Ok(self.db.get_all_ping_results(self.display_limit).await?)
    }

    async fn hash(&self, password: &str) -> Result<String> {
        let password = password.to_string();
        let cost = self.hash_cost;
        let hashed = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(anyhow::Error::from)?
            .map_err(anyhow::Error::from)?;
        Ok(hashed)
    }

    async fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let password = password.to_string();
        let hash = hash.to_string();
        let matches = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(anyhow::Error::from)?
            .map_err(anyhow::Error::from)?;
        Ok(matches)
    }
}
