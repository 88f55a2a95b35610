use crate::document::OrderDocument;
use crate::error::{Result, StoreError};
use crate::store::OrderStore;
use async_trait::async_trait;
use fs2::FileExt;
use serial_engine::{ActivateOp, ActivationOutcome, ArchiveOp, UpdateOp};
use serial_protocol::{InternalItem, OrderItemMapping, ProductionNote, MAPPING_SCHEMA_VERSION};
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// One JSON document per order under `<root>/orders/`.
///
/// Writes take an exclusive lock file per order, so separate processes
/// pointed at the same directory serialize their read-modify-write cycles.
/// Reads stay lock-free: documents are replaced by an atomic rename.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(root.join("orders")).await?;
        log::debug!("Opened file store at {}", root.display());
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Order ids that have a document on disk.
    pub async fn order_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(self.root.join("orders")).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match read_document_at(&path) {
                Ok(Some(doc)) => ids.push(doc.order_id),
                Ok(None) => {}
                Err(err) => log::warn!("Skipping unreadable order document: {err}"),
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn document_path(&self, order_id: &str) -> PathBuf {
        self.root
            .join("orders")
            .join(format!("{}.json", file_stem_for_order(order_id)))
    }

    async fn read_document(&self, order_id: &str) -> Result<OrderDocument> {
        let path = self.document_path(order_id);
        let order_id = order_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<OrderDocument> {
            let doc = read_document_at(&path)?.unwrap_or_else(|| OrderDocument::new(&order_id));
            check_document(&path, &doc, &order_id)?;
            Ok(doc)
        })
        .await
        .map_err(|err| StoreError::Other(format!("join order read task: {err}")))?
    }

    async fn modify<T, F>(&self, order_id: &str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut OrderDocument) -> Result<T> + Send + 'static,
    {
        let path = self.document_path(order_id);
        let order_id = order_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<T> {
            let _lock = OrderFileLock::acquire(&path.with_extension("lock"))?;
            let mut doc =
                read_document_at(&path)?.unwrap_or_else(|| OrderDocument::new(&order_id));
            check_document(&path, &doc, &order_id)?;
            let out = f(&mut doc)?;
            write_document_at(&path, &doc)?;
            Ok(out)
        })
        .await
        .map_err(|err| StoreError::Other(format!("join order write task: {err}")))?
    }
}

#[async_trait]
impl OrderStore for FileStore {
    async fn load_mapping(&self, order_id: &str) -> Result<Option<OrderItemMapping>> {
        Ok(self.read_document(order_id).await?.mapping)
    }

    async fn save_mapping(
        &self,
        mapping: &OrderItemMapping,
        expected_version: u64,
    ) -> Result<OrderItemMapping> {
        let mapping = mapping.clone();
        let order_id = mapping.order_id.clone();
        self.modify(&order_id, move |doc| {
            doc.save_mapping(&mapping, expected_version)
        })
        .await
    }

    async fn list_items(&self, order_id: &str) -> Result<Vec<InternalItem>> {
        Ok(self.read_document(order_id).await?.items())
    }

    async fn activate_item(&self, op: &ActivateOp) -> Result<ActivationOutcome> {
        let op = op.clone();
        self.modify(&op.order_id.clone(), move |doc| doc.activate(&op))
            .await
    }

    async fn update_item(&self, op: &UpdateOp) -> Result<InternalItem> {
        let op = op.clone();
        self.modify(&op.order_id.clone(), move |doc| doc.update(&op))
            .await
    }

    async fn archive_item(&self, op: &ArchiveOp) -> Result<InternalItem> {
        let op = op.clone();
        self.modify(&op.order_id.clone(), move |doc| doc.archive(&op))
            .await
    }

    async fn list_notes(&self, order_id: &str) -> Result<Vec<ProductionNote>> {
        Ok(self.read_document(order_id).await?.notes)
    }

    async fn append_note(&self, note: &ProductionNote) -> Result<bool> {
        let note = note.clone();
        self.modify(&note.order_id.clone(), move |doc| doc.append_note(&note))
            .await
    }
}

struct OrderFileLock {
    file: std::fs::File,
}

impl OrderFileLock {
    fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|err| StoreError::Other(format!("open order lock {}: {err}", path.display())))?;
        file.lock_exclusive().map_err(|err| {
            StoreError::Other(format!("acquire order lock {}: {err}", path.display()))
        })?;
        Ok(Self { file })
    }
}

impl Drop for OrderFileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn read_document_at(path: &Path) -> Result<Option<OrderDocument>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let doc: OrderDocument = serde_json::from_slice(&bytes).map_err(|err| StoreError::Corrupt {
        path: path.display().to_string(),
        reason: err.to_string(),
    })?;
    Ok(Some(doc))
}

fn check_document(path: &Path, doc: &OrderDocument, order_id: &str) -> Result<()> {
    if doc.schema_version != MAPPING_SCHEMA_VERSION {
        return Err(StoreError::Corrupt {
            path: path.display().to_string(),
            reason: format!(
                "unsupported schema_version {} (expected {MAPPING_SCHEMA_VERSION})",
                doc.schema_version
            ),
        });
    }
    if doc.order_id != order_id {
        return Err(StoreError::Corrupt {
            path: path.display().to_string(),
            reason: format!("document belongs to order {}", doc.order_id),
        });
    }
    Ok(())
}

fn write_document_at(path: &Path, doc: &OrderDocument) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(doc)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Readable, collision-free file stem for an arbitrary order id.
fn file_stem_for_order(order_id: &str) -> String {
    let readable: String = order_id
        .chars()
        .take(48)
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let digest = Sha256::digest(order_id.as_bytes());
    let tag: String = digest[..6].iter().map(|b| format!("{b:02x}")).collect();
    format!("{readable}-{tag}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn file_stems_are_safe_and_distinct() {
        let a = file_stem_for_order("gid://shop/Order/1");
        let b = file_stem_for_order("gid://shop/Order/1?");
        assert!(a.starts_with("gid___shop_Order_1-"));
        assert!(!a.contains('/'));
        assert_ne!(a, b);
        assert_eq!(a, file_stem_for_order("gid://shop/Order/1"));
    }
}
