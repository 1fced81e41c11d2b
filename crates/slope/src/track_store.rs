use std::{path::Path as FsPath, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{
    ObjectStore, PutOptions, local::LocalFileSystem, memory::InMemory, path::Path,
};
use uuid::Uuid;

use crate::{
    errors::PersistenceError,
    export::{self, SessionRecord},
    session::Session,
};

/// Where finalized sessions go.
#[async_trait]
pub trait TrackStore: Send + Sync {
    async fn save(&self, session: &Session) -> Result<(), PersistenceError>;
    async fn load(&self, id: Uuid) -> Result<Session, PersistenceError>;
}

#[derive(Clone, Debug)]
pub struct ObjectTrackStore {
    store: Arc<dyn ObjectStore>,
}

impl ObjectTrackStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn new_local(base_path: impl AsRef<FsPath>) -> Result<Self, PersistenceError> {
        let base_path = base_path.as_ref();
        std::fs::create_dir_all(base_path)?;
        let store = LocalFileSystem::new_with_prefix(base_path)?;
        Ok(Self::new(Arc::new(store)))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    pub fn record_path(id: Uuid) -> Path {
        Path::from(format!("sessions/{id}.json"))
    }

    pub fn gpx_path(id: Uuid) -> Path {
        Path::from(format!("sessions/{id}.gpx"))
    }

    async fn put(&self, path: &Path, content: Bytes) -> Result<(), PersistenceError> {
        self.store
            .put_opts(path, content.into(), PutOptions::default())
            .await?;
        Ok(())
    }

    pub async fn get_gpx(&self, id: Uuid) -> Result<Bytes, PersistenceError> {
        self.get(id, &Self::gpx_path(id)).await
    }

    async fn get(&self, id: Uuid, path: &Path) -> Result<Bytes, PersistenceError> {
        let result = self.store.get(path).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => PersistenceError::NotFound(id),
            e => PersistenceError::Store(e),
        })?;
        Ok(result.bytes().await?)
    }
}

#[async_trait]
impl TrackStore for ObjectTrackStore {
    async fn save(&self, session: &Session) -> Result<(), PersistenceError> {
        let json = export::to_json(session)?;
        self.put(&Self::record_path(session.id), Bytes::from(json))
            .await?;

        let gpx = export::to_gpx(session);
        self.put(&Self::gpx_path(session.id), Bytes::from(gpx))
            .await?;

        tracing::info!(
            "Stored session {} ({} points)",
            session.id,
            session.points.len()
        );
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Session, PersistenceError> {
        let bytes = self.get(id, &Self::record_path(id)).await?;
        let record: SessionRecord = serde_json::from_slice(&bytes)?;
        Ok(record.session)
    }
}
