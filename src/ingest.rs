//! Ingestion adapters: QR image upload, URL list and share-link import.
//!
//! All three end in [`InventoryStore::create_esim`] and report how many
//! records they created.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::model::{EsimDetails, NewEsim, non_blank};
use crate::share::{parse_share_input, stock_copy_for};
use crate::storage::InventoryStore;

/// Sub-directory of the storage root holding QR images.
pub const QR_DIR: &str = "qr";
pub const QR_API_PREFIX: &str = "/api/qr";
pub const QR_STATIC_PREFIX: &str = "/qr";

/// Where QR images live on disk and how records refer to them.
#[derive(Debug, Clone)]
pub struct QrStorage {
    root: PathBuf,
    public_prefix: &'static str,
}

/// One uploaded image as received from the client.
#[derive(Debug, Clone)]
pub struct UploadedQr {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

impl QrStorage {
    /// `via_api` selects `/api/qr/<file>` over the static `/qr/<file>` path.
    pub fn new(root: impl Into<PathBuf>, via_api: bool) -> Self {
        Self {
            root: root.into(),
            public_prefix: if via_api { QR_API_PREFIX } else { QR_STATIC_PREFIX },
        }
    }

    pub fn directory(&self) -> PathBuf {
        self.root.join(QR_DIR)
    }

    /// Writes `upload` under a timestamp-derived name and returns the path
    /// records should store.
    pub async fn save(&self, upload: &UploadedQr, now: DateTime<Utc>) -> AppResult<String> {
        let directory = self.directory();
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|err| AppError::upload(format!("cannot create {}: {err}", directory.display())))?;

        let file_name = stored_file_name(upload.file_name.as_deref(), now);
        let target = directory.join(&file_name);
        tokio::fs::write(&target, &upload.bytes)
            .await
            .map_err(|err| AppError::upload(format!("cannot write {}: {err}", target.display())))?;

        Ok(format!("{}/{}", self.public_prefix, file_name))
    }

    /// Reads a stored image. Paths that try to leave the QR directory are rejected.
    pub async fn read(&self, relative: &str) -> AppResult<Option<Vec<u8>>> {
        if relative.is_empty() || relative.contains("..") || !is_plain_relative(Path::new(relative)) {
            return Err(AppError::validation("invalid path"));
        }

        match tokio::fs::read(self.directory().join(relative)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

fn is_plain_relative(path: &Path) -> bool {
    path.components()
        .all(|component| matches!(component, Component::Normal(_)))
}

/// `<unix-millis>-<6 random chars>.<ext>`, extension taken from the upload name.
pub fn stored_file_name(original: Option<&str>, now: DateTime<Utc>) -> String {
    let extension = original
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "png".to_string());

    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(6).collect();
    format!("{}-{}.{}", now.timestamp_millis(), suffix, extension)
}

pub fn content_type_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Plan fields an operator types once for a whole batch.
#[derive(Debug, Clone, Default)]
pub struct BatchFields {
    pub country: Option<String>,
    pub plan_name: Option<String>,
    pub notes: Option<String>,
}

impl BatchFields {
    fn details(&self) -> EsimDetails {
        EsimDetails {
            country: non_blank(self.country.clone()),
            plan_name: non_blank(self.plan_name.clone()),
            notes: non_blank(self.notes.clone()),
            ..EsimDetails::default()
        }
    }
}

#[derive(Clone)]
pub struct IngestionService {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
    qr_storage: QrStorage,
}

impl IngestionService {
    pub fn new(store: Arc<dyn InventoryStore>, clock: Arc<dyn Clock>, qr_storage: QrStorage) -> Self {
        Self {
            store,
            clock,
            qr_storage,
        }
    }

    pub fn qr_storage(&self) -> &QrStorage {
        &self.qr_storage
    }

    async fn create(&self, store_id: i64, details: EsimDetails) -> AppResult<()> {
        self.store
            .create_esim(
                NewEsim {
                    store_id: Some(store_id),
                    details,
                },
                self.clock.now(),
            )
            .await?;
        Ok(())
    }

    /// One record per image. Without images a single placeholder record is created.
    pub async fn create_from_files(
        &self,
        store_id: i64,
        fields: &BatchFields,
        files: &[UploadedQr],
    ) -> AppResult<usize> {
        let details = fields.details();

        if files.is_empty() {
            self.create(store_id, details).await?;
            tracing::info!(store_id, created = 1, "placeholder eSIM created");
            return Ok(1);
        }

        let mut created = 0;
        for file in files {
            let qr_path = self.qr_storage.save(file, self.clock.now()).await?;
            self.create(store_id, details.clone().with_qr_path(Some(qr_path)))
                .await?;
            created += 1;
        }

        tracing::info!(store_id, created, "eSIMs created from uploaded QR images");
        Ok(created)
    }

    /// One record per non-blank line, `qr_path` set to the line itself.
    pub async fn create_from_urls(
        &self,
        store_id: i64,
        fields: &BatchFields,
        urls: &str,
    ) -> AppResult<usize> {
        let details = fields.details();
        let mut created = 0;

        for url in urls.lines().map(str::trim).filter(|line| !line.is_empty()) {
            self.create(store_id, details.clone().with_qr_path(Some(url.to_string())))
                .await?;
            created += 1;
        }

        tracing::info!(store_id, created, "eSIMs created from QR URL list");
        Ok(created)
    }

    /// Copies every record behind the pasted share links into `store_id`'s stock.
    /// Source records are looked up across all tenants and left untouched.
    pub async fn import_share_links(&self, store_id: i64, pasted: &str) -> AppResult<usize> {
        let ids: Vec<i64> = parse_share_input(pasted).into_iter().collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let sources = self.store.find_esims_by_ids(&ids, None).await?;
        let now = self.clock.now();
        for source in &sources {
            self.store.create_esim(stock_copy_for(source, store_id), now).await?;
        }

        tracing::info!(
            store_id,
            requested = ids.len(),
            created = sources.len(),
            "eSIMs imported from share links"
        );
        Ok(sources.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_names_keep_a_sane_extension() {
        let now = Utc::now();
        let name = stored_file_name(Some("Scan 01.JPG"), now);
        assert!(name.starts_with(&format!("{}-", now.timestamp_millis())));
        assert!(name.ends_with(".jpg"));

        assert!(stored_file_name(None, now).ends_with(".png"));
        assert!(stored_file_name(Some("noext"), now).ends_with(".png"));
        assert!(stored_file_name(Some("x.p/ng"), now).ends_with(".png"));
    }

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type_for("a.PNG"), "image/png");
        assert_eq!(content_type_for("a.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("a.webp"), "image/webp");
        assert_eq!(content_type_for("a.bin"), "application/octet-stream");
    }

    #[tokio::test]
    async fn read_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = QrStorage::new(dir.path(), true);
        assert!(storage.read("../secret").await.is_err());
        assert!(storage.read("/etc/passwd").await.is_err());
        assert!(storage.read("missing.png").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn saved_images_are_readable() {
        let dir = tempfile::tempdir().unwrap();
        let storage = QrStorage::new(dir.path(), false);
        let upload = UploadedQr {
            file_name: Some("qr.png".into()),
            bytes: vec![1, 2, 3],
        };

        let public = storage.save(&upload, Utc::now()).await.unwrap();
        assert!(public.starts_with("/qr/"));

        let file_name = public.trim_start_matches("/qr/");
        assert_eq!(storage.read(file_name).await.unwrap(), Some(vec![1, 2, 3]));
    }
}
