//! Debounced draft saving.
//!
//! Each open registration gets a worker task that receives the latest form values on a `watch`
//! channel. A save happens once the values have been quiet for the debounce period and only if
//! they differ from what was last saved. Dropping the sender (see [`DraftAutosaver::shutdown`])
//! flushes whatever is still pending. The draft itself is created up front; the worker only
//! ever updates it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::Registration;
use crate::backend::RegistrationBackend;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AutosaveStatus {
    Idle,
    Pending,
    Saving,
    Saved {
        registration_id: String,
        at: DateTime<Utc>,
    },
    Failed {
        error: String,
    },
}

/// A snapshot is written only when it differs from the last one that reached the backend
pub fn needs_save(last_saved: Option<&Value>, current: &Value) -> bool {
    last_saved != Some(current)
}

pub struct DraftAutosaver {
    edits: watch::Sender<Value>,
    status: watch::Receiver<AutosaveStatus>,
    worker: JoinHandle<()>,
    last_edit: Instant,
}

impl DraftAutosaver {
    /// Autosave for a stored draft, starting from its saved values
    pub fn for_existing(
        backend: Arc<dyn RegistrationBackend>,
        registration: &Registration,
        debounce: Duration,
    ) -> Self {
        let worker = AutosaveWorker {
            backend,
            registration_id: registration.id.clone(),
            last_saved: registration.values.clone(),
            debounce,
        };
        Self::spawn(worker, registration.values.clone())
    }

    fn spawn(worker: AutosaveWorker, initial: Value) -> Self {
        let (edits, edits_rx) = watch::channel(initial);
        let (status_tx, status) = watch::channel(AutosaveStatus::Idle);
        let worker = tokio::spawn(worker.run(edits_rx, status_tx));
        Self {
            edits,
            status,
            worker,
            last_edit: Instant::now(),
        }
    }

    /// Replace the pending snapshot; older unsaved snapshots are never written
    pub fn update(&mut self, values: Value) {
        self.last_edit = Instant::now();
        self.edits.send_replace(values);
    }

    pub fn latest(&self) -> Value {
        self.edits.borrow().clone()
    }

    pub fn status(&self) -> AutosaveStatus {
        self.status.borrow().clone()
    }

    /// Nothing left to write and no edit for at least `timeout`
    pub fn is_idle(&self, timeout: Duration) -> bool {
        let settled = !matches!(
            *self.status.borrow(),
            AutosaveStatus::Pending | AutosaveStatus::Saving
        );
        settled && self.last_edit.elapsed() >= timeout
    }

    /// Stop the worker after it has flushed any pending snapshot
    pub async fn shutdown(self) -> AutosaveStatus {
        let Self {
            edits,
            status,
            worker,
            ..
        } = self;
        drop(edits);
        if let Err(e) = worker.await {
            error!(error = %e, "Autosave worker panicked");
        }
        status.borrow().clone()
    }
}

struct AutosaveWorker {
    backend: Arc<dyn RegistrationBackend>,
    registration_id: String,
    last_saved: Value,
    debounce: Duration,
}

impl AutosaveWorker {
    async fn run(
        mut self,
        mut edits: watch::Receiver<Value>,
        status: watch::Sender<AutosaveStatus>,
    ) {
        loop {
            if edits.changed().await.is_err() {
                break;
            }
            status.send_replace(AutosaveStatus::Pending);

            // Wait for a quiet period; every newer edit restarts it
            let closed = loop {
                tokio::select! {
                    _ = tokio::time::sleep(self.debounce) => break false,
                    changed = edits.changed() => {
                        if changed.is_err() {
                            break true;
                        }
                    }
                }
            };

            let snapshot = edits.borrow_and_update().clone();
            self.save_if_changed(&snapshot, &status).await;
            if closed {
                return;
            }
        }

        let snapshot = edits.borrow().clone();
        self.save_if_changed(&snapshot, &status).await;
    }

    async fn save_if_changed(&mut self, snapshot: &Value, status: &watch::Sender<AutosaveStatus>) {
        if !needs_save(Some(&self.last_saved), snapshot) {
            debug!(registration_id = %self.registration_id, "Draft unchanged, skipping save");
            status.send_if_modified(|current| {
                if *current == AutosaveStatus::Pending {
                    *current = AutosaveStatus::Saved {
                        registration_id: self.registration_id.clone(),
                        at: Utc::now(),
                    };
                    return true;
                }
                false
            });
            return;
        }

        status.send_replace(AutosaveStatus::Saving);
        match self.backend.update_draft(&self.registration_id, snapshot).await {
            Ok(registration) => {
                info!(registration_id = %registration.id, "Draft saved");
                self.last_saved = snapshot.clone();
                status.send_replace(AutosaveStatus::Saved {
                    registration_id: registration.id,
                    at: registration.updated_at,
                });
            }
            Err(e) => {
                warn!(registration_id = %self.registration_id, error = %e, "Draft autosave failed");
                status.send_replace(AutosaveStatus::Failed {
                    error: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::registration::RegistrationKind;
    use serde_json::json;

    const DEBOUNCE: Duration = Duration::from_millis(40);

    #[test]
    fn unchanged_snapshots_are_not_saved() {
        let saved = json!({ "practiceName": "Kila Clinic" });
        assert!(!needs_save(Some(&saved), &json!({ "practiceName": "Kila Clinic" })));
        assert!(needs_save(Some(&saved), &json!({ "practiceName": "Kila Medical" })));
        assert!(needs_save(None, &json!({})));
    }

    #[tokio::test]
    async fn burst_of_edits_is_saved_once() {
        let backend = Arc::new(InMemoryBackend::new());
        let draft = backend
            .create_draft("prov-1", RegistrationKind::PrivatePractice, &json!({}))
            .await
            .unwrap();
        let mut autosaver = DraftAutosaver::for_existing(backend.clone(), &draft, DEBOUNCE);

        autosaver.update(json!({ "practiceName": "K" }));
        autosaver.update(json!({ "practiceName": "Ki" }));
        autosaver.update(json!({ "practiceName": "Kila" }));
        tokio::time::sleep(DEBOUNCE * 4).await;

        assert_eq!(backend.calls("update_draft"), 1);
        let AutosaveStatus::Saved {
            registration_id, ..
        } = autosaver.status()
        else {
            panic!("expected a saved draft, got {:?}", autosaver.status());
        };
        assert_eq!(registration_id, draft.id);
        let stored = backend.get_registration(&draft.id).await.unwrap().unwrap();
        assert_eq!(stored.values, json!({ "practiceName": "Kila" }));

        autosaver.update(json!({ "practiceName": "Kila" }));
        tokio::time::sleep(DEBOUNCE * 4).await;
        assert_eq!(backend.calls("update_draft"), 1);

        autosaver.update(json!({ "practiceName": "Kila Clinic" }));
        tokio::time::sleep(DEBOUNCE * 4).await;
        assert_eq!(backend.calls("update_draft"), 2);
    }

    #[tokio::test]
    async fn idle_only_after_save_settles_and_quiet_period() {
        let backend = Arc::new(InMemoryBackend::new());
        let draft = backend
            .create_draft("prov-1", RegistrationKind::PrivatePractice, &json!({}))
            .await
            .unwrap();
        let mut autosaver = DraftAutosaver::for_existing(backend.clone(), &draft, DEBOUNCE);

        autosaver.update(json!({ "practiceName": "Kila" }));
        assert!(!autosaver.is_idle(DEBOUNCE * 2));

        tokio::time::sleep(DEBOUNCE * 4).await;
        assert!(matches!(autosaver.status(), AutosaveStatus::Saved { .. }));
        assert!(autosaver.is_idle(DEBOUNCE * 2));
        assert!(!autosaver.is_idle(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn shutdown_flushes_pending_edit() {
        let backend = Arc::new(InMemoryBackend::new());
        let draft = backend
            .create_draft("prov-1", RegistrationKind::HealthAuthority, &json!({}))
            .await
            .unwrap();
        let mut autosaver =
            DraftAutosaver::for_existing(backend.clone(), &draft, Duration::from_secs(60));

        autosaver.update(json!({ "authorityName": "Morobe PHA" }));
        let status = autosaver.shutdown().await;

        assert!(matches!(status, AutosaveStatus::Saved { .. }), "{status:?}");
        let stored = backend.get_registration(&draft.id).await.unwrap().unwrap();
        assert_eq!(stored.values, json!({ "authorityName": "Morobe PHA" }));
    }

    #[tokio::test]
    async fn failed_save_is_reported_and_retried() {
        let backend = Arc::new(InMemoryBackend::new());
        let draft = backend
            .create_draft("prov-1", RegistrationKind::PrivatePractice, &json!({}))
            .await
            .unwrap();
        let mut autosaver = DraftAutosaver::for_existing(backend.clone(), &draft, DEBOUNCE);

        backend.fail("update_draft");
        autosaver.update(json!({ "practiceName": "Kila" }));
        tokio::time::sleep(DEBOUNCE * 4).await;
        assert!(matches!(autosaver.status(), AutosaveStatus::Failed { .. }));

        backend.recover("update_draft");
        let status = autosaver.shutdown().await;
        assert!(matches!(status, AutosaveStatus::Saved { .. }), "{status:?}");
    }
}
