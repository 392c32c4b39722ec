use {
    crate::{Error, Result},
    parking_lot::RwLock,
    serde::{Serialize, de::DeserializeOwned},
    std::{
        collections::HashMap,
        sync::atomic::{AtomicBool, Ordering},
    },
};

/// Key of the session record under which the values of a request are kept.
const DATA_KEY: &str = "mvc.data";

type SessionData = HashMap<String, serde_json::Value>;

///
/// The session of the current request.
///
/// Storage, cookie and expiry belong to the `tower_sessions` layer that
/// [`Application::into_router`](crate::Application::into_router) installs.
/// Actions run on the blocking pool, so they work on this synchronous
/// snapshot instead: the server loads it from the request's
/// `tower_sessions::Session` before dispatch and writes it back afterwards.
///
/// A session only exists once it is started, explicitly or by the first
/// [`set`](Self::set). Requests that never start one get no cookie.
///
/// ```
/// use axum_mvc::http::Session;
///
/// let session = Session::new();
/// assert!(!session.is_started());
///
/// session.set("user", &42).unwrap();
/// assert!(session.is_started());
/// assert_eq!(session.get::<u32>("user").unwrap(), Some(42));
/// ```
///
#[derive(Debug, Default)]
pub struct Session {
    data: RwLock<SessionData>,
    started: AtomicBool,
    changed: AtomicBool,
    destroyed: AtomicBool,
}

impl Session {
    /// An empty session that has not been started.
    pub fn new() -> Self {
        Self::default()
    }

    ///
    /// Reads the values stored for the request's session.
    ///
    /// # Arguments
    ///
    /// * `handle` - the session the `tower_sessions` layer attached to the
    ///   request
    ///
    /// # Returns
    ///
    /// A started snapshot when the store still holds a record for the
    /// cookie, an empty one otherwise. Expired records count as missing.
    ///
    pub async fn load(handle: &tower_sessions::Session) -> Result<Self> {
        let data: Option<SessionData> = handle
            .get(DATA_KEY)
            .await
            .map_err(|e| Error::internal(format!("Session could not be loaded: {}", e)))?;
        Ok(Self {
            started: AtomicBool::new(data.is_some()),
            data: RwLock::new(data.unwrap_or_default()),
            ..Self::default()
        })
    }

    ///
    /// Writes changes made during the request back to `handle`. A destroyed
    /// session is flushed from the store and its cookie expired; an
    /// unchanged one is left alone.
    ///
    pub async fn save(&self, handle: &tower_sessions::Session) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            handle
                .flush()
                .await
                .map_err(|e| Error::internal(format!("Session could not be flushed: {}", e)))?;
            tracing::debug!("Session destroyed");
        }
        if self.changed.load(Ordering::SeqCst) {
            let data = self.data.read().clone();
            handle
                .insert(DATA_KEY, data)
                .await
                .map_err(|e| Error::internal(format!("Session could not be saved: {}", e)))?;
        }
        Ok(())
    }

    /// Starts the session unless it is already running.
    pub fn start(&self) {
        if !self.started.swap(true, Ordering::SeqCst) {
            self.changed.store(true, Ordering::SeqCst);
            tracing::debug!("Session started");
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn set<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.start();
        self.data.write().insert(name.to_string(), value);
        self.changed.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let value = self.data.read().get(name).cloned();
        value
            .map(serde_json::from_value)
            .transpose()
            .map_err(Into::into)
    }

    pub fn delete(&self, name: &str) {
        if self.data.write().remove(name).is_some() {
            self.changed.store(true, Ordering::SeqCst);
        }
    }

    /// Drops all session data; the cookie is expired on the response.
    pub fn destroy(&self) {
        if self.started.swap(false, Ordering::SeqCst) {
            self.data.write().clear();
            self.changed.store(false, Ordering::SeqCst);
            self.destroyed.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::sync::Arc, tower_sessions::MemoryStore};

    fn handle(store: &MemoryStore) -> tower_sessions::Session {
        tower_sessions::Session::new(None, Arc::new(store.clone()), None)
    }

    #[test]
    fn test_set_get_delete() {
        let session = Session::new();
        session.set("name", "Ada").unwrap();
        session.set("roles", &["admin", "dev"]).unwrap();

        assert_eq!(session.get::<String>("name").unwrap().as_deref(), Some("Ada"));
        assert_eq!(
            session.get::<Vec<String>>("roles").unwrap().unwrap(),
            vec!["admin", "dev"]
        );
        assert!(session.get::<u32>("name").is_err());

        session.delete("name");
        assert_eq!(session.get::<String>("name").unwrap(), None);
    }

    #[test]
    fn test_destroy_forgets_everything() {
        let session = Session::new();
        session.set("user", "ada").unwrap();
        session.destroy();

        assert!(!session.is_started());
        assert!(session.is_destroyed());
        assert_eq!(session.get::<String>("user").unwrap(), None);
    }

    #[tokio::test]
    async fn test_unstarted_session_is_not_saved() {
        let store = MemoryStore::default();
        let handle = handle(&store);

        let session = Session::load(&handle).await.unwrap();
        assert!(!session.is_started());
        session.save(&handle).await.unwrap();
        assert!(handle.is_empty().await);
    }

    #[tokio::test]
    async fn test_values_survive_load_and_save() {
        let store = MemoryStore::default();
        let handle = handle(&store);

        let session = Session::load(&handle).await.unwrap();
        session.set("user", "ada").unwrap();
        session.save(&handle).await.unwrap();

        let next = Session::load(&handle).await.unwrap();
        assert!(next.is_started());
        assert_eq!(next.get::<String>("user").unwrap().as_deref(), Some("ada"));

        next.destroy();
        next.save(&handle).await.unwrap();
        assert!(handle.is_empty().await);
    }
}
