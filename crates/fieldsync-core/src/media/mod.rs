//! Offline media sidecar managers.
//!
//! Photos and voice memos are written as local files with a JSON sidecar;
//! only the sidecar metadata travels through the normal record pipeline.
//! The binary payload itself is uploaded out of band.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Operation, RecordId, RecordType};
use crate::sync::SyncEngine;

/// A unique identifier for a stored media file, using UUID v7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaId(Uuid);

impl MediaId {
    /// Create a new unique media ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID.
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for MediaId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MediaId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Sidecar metadata written next to each photo file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoSidecar {
    pub photo_id: MediaId,
    pub record_id: String,
    pub worker_id: String,
    pub timestamp: i64,
    pub file_path: String,
    pub file_size: u64,
}

/// Sidecar metadata written next to each voice recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceSidecar {
    pub voice_id: MediaId,
    pub worker_id: String,
    pub timestamp: i64,
    pub file_path: String,
    pub file_size: u64,
    pub transcript: String,
}

/// Stores media binaries locally and registers their metadata for sync.
pub struct OfflineMediaStore {
    photo_dir: PathBuf,
    voice_dir: PathBuf,
    engine: Arc<SyncEngine>,
}

impl OfflineMediaStore {
    /// Create a media store rooted at the given directory.
    pub fn new(media_dir: impl Into<PathBuf>, engine: Arc<SyncEngine>) -> Result<Self> {
        let media_dir = media_dir.into();
        let photo_dir = media_dir.join("photos");
        let voice_dir = media_dir.join("voice");
        std::fs::create_dir_all(&photo_dir)?;
        std::fs::create_dir_all(&voice_dir)?;
        Ok(Self {
            photo_dir,
            voice_dir,
            engine,
        })
    }

    /// Store a photo offline, linked to the record it documents.
    pub async fn store_photo_offline(
        &self,
        photo_bytes: &[u8],
        record_id: &RecordId,
        worker_id: &str,
        device_id: &str,
    ) -> Result<MediaId> {
        if photo_bytes.is_empty() {
            return Err(Error::InvalidInput(
                "photo payload cannot be empty".to_string(),
            ));
        }

        let photo_id = MediaId::new();
        let file_path = self.photo_dir.join(format!("{photo_id}.jpg"));
        std::fs::write(&file_path, photo_bytes)?;

        let sidecar = PhotoSidecar {
            photo_id,
            record_id: record_id.as_str(),
            worker_id: worker_id.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            file_path: file_path.display().to_string(),
            file_size: u64::try_from(photo_bytes.len()).unwrap_or(u64::MAX),
        };
        let sidecar_path = self.photo_dir.join(format!("{photo_id}.json"));
        std::fs::write(&sidecar_path, serde_json::to_vec_pretty(&sidecar)?)?;

        // Only the metadata goes through the sync pipeline
        self.engine
            .store_offline_record(
                RecordType::Photo,
                serde_json::to_value(&sidecar)?,
                worker_id,
                device_id,
                Some(*record_id),
                Operation::Create,
            )
            .await?;

        tracing::debug!("Stored photo {photo_id} ({} bytes) offline", photo_bytes.len());
        Ok(photo_id)
    }

    /// Store a voice recording offline with its transcript.
    pub async fn store_voice_offline(
        &self,
        audio_bytes: &[u8],
        worker_id: &str,
        device_id: &str,
        transcript: &str,
    ) -> Result<MediaId> {
        if audio_bytes.is_empty() {
            return Err(Error::InvalidInput(
                "voice payload cannot be empty".to_string(),
            ));
        }

        let voice_id = MediaId::new();
        let file_path = self.voice_dir.join(format!("{voice_id}.wav"));
        std::fs::write(&file_path, audio_bytes)?;

        let sidecar = VoiceSidecar {
            voice_id,
            worker_id: worker_id.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            file_path: file_path.display().to_string(),
            file_size: u64::try_from(audio_bytes.len()).unwrap_or(u64::MAX),
            transcript: transcript.to_string(),
        };
        let sidecar_path = self.voice_dir.join(format!("{voice_id}.json"));
        std::fs::write(&sidecar_path, serde_json::to_vec_pretty(&sidecar)?)?;

        self.engine
            .store_offline_record(
                RecordType::Voice,
                serde_json::to_value(&sidecar)?,
                worker_id,
                device_id,
                None,
                Operation::Create,
            )
            .await?;

        tracing::debug!("Stored voice memo {voice_id} ({} bytes) offline", audio_bytes.len());
        Ok(voice_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::models::{OfflineRecord, SyncStatus};
    use crate::store::StoreService;
    use crate::sync::{ConnectivityProbe, RemoteRecord, SyncTarget};
    use serde_json::{json, Value};
    use tempfile::tempdir;

    struct OfflineProbe;

    #[async_trait::async_trait]
    impl ConnectivityProbe for OfflineProbe {
        async fn is_online(&self) -> bool {
            false
        }
    }

    struct NullTarget;

    #[async_trait::async_trait]
    impl SyncTarget for NullTarget {
        async fn fetch(
            &self,
            _record_type: &RecordType,
            _remote_id: &str,
        ) -> crate::Result<Option<Value>> {
            Ok(None)
        }

        async fn create(&self, _record: &OfflineRecord) -> crate::Result<Value> {
            Ok(json!({"status": "accepted"}))
        }

        async fn update(&self, _remote_id: &str, _record: &OfflineRecord) -> crate::Result<Value> {
            Ok(json!({"status": "updated"}))
        }

        async fn records_for_worker(&self, _worker_id: &str) -> crate::Result<Vec<RemoteRecord>> {
            Ok(Vec::new())
        }
    }

    async fn media_store(dir: &std::path::Path) -> OfflineMediaStore {
        let store = StoreService::open_in_memory().await.unwrap();
        let engine = SyncEngine::new(
            store,
            Arc::new(OfflineProbe),
            Arc::new(NullTarget),
            EngineConfig::default(),
        );
        OfflineMediaStore::new(dir, engine).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn photo_is_written_with_sidecar_and_pending_record() {
        let tmp = tempdir().unwrap();
        let media = media_store(tmp.path()).await;

        let inspection_id = RecordId::new();
        let photo_id = media
            .store_photo_offline(b"jpeg-bytes", &inspection_id, "W1", "D1")
            .await
            .unwrap();

        let photo_path = tmp.path().join("photos").join(format!("{photo_id}.jpg"));
        let sidecar_path = tmp.path().join("photos").join(format!("{photo_id}.json"));
        assert_eq!(std::fs::read(&photo_path).unwrap(), b"jpeg-bytes");

        let sidecar: PhotoSidecar =
            serde_json::from_slice(&std::fs::read(&sidecar_path).unwrap()).unwrap();
        assert_eq!(sidecar.photo_id, photo_id);
        assert_eq!(sidecar.record_id, inspection_id.as_str());
        assert_eq!(sidecar.file_size, 10);

        // The registered record carries metadata only, not the binary
        let pending = media.engine.store().list_pending(Some("D1")).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].record_type, RecordType::Photo);
        assert_eq!(pending[0].sync_status, SyncStatus::Pending);
        assert_eq!(pending[0].parent_record_id, Some(inspection_id));
        assert_eq!(pending[0].data["file_size"], 10);
        assert!(pending[0].data.get("bytes").is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn voice_memo_keeps_transcript_in_sidecar() {
        let tmp = tempdir().unwrap();
        let media = media_store(tmp.path()).await;

        let voice_id = media
            .store_voice_offline(b"wav-bytes", "W1", "D1", "replace the valve")
            .await
            .unwrap();

        let sidecar_path = tmp.path().join("voice").join(format!("{voice_id}.json"));
        let sidecar: VoiceSidecar =
            serde_json::from_slice(&std::fs::read(&sidecar_path).unwrap()).unwrap();
        assert_eq!(sidecar.transcript, "replace the valve");

        let pending = media.engine.store().list_pending(Some("D1")).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].record_type, RecordType::Voice);
        assert_eq!(pending[0].data["transcript"], "replace the valve");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_payloads_are_rejected() {
        let tmp = tempdir().unwrap();
        let media = media_store(tmp.path()).await;

        let err = media
            .store_photo_offline(b"", &RecordId::new(), "W1", "D1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = media
            .store_voice_offline(b"", "W1", "D1", "")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
