use std::path::Path;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;
use tracing::{debug, info};

use docproc_core::{DocError, DocResult, Document, DocumentId, DocumentText, TextPolicy};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS documents (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        locator      TEXT NOT NULL,
        created_date TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS documents_text (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        text        TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_documents_text_document ON documents_text(document_id);
    CREATE TABLE IF NOT EXISTS jobs (
        job_id      TEXT PRIMARY KEY,
        document_id INTEGER NOT NULL,
        locator     TEXT NOT NULL,
        status      TEXT NOT NULL,
        result      TEXT,
        error       TEXT,
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_jobs_document ON jobs(document_id);";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite-backed store for documents, their OCR text, and job status.
///
/// Foreign keys are enforced, so a text row can only be written for a live
/// document and disappears with it.
pub struct MetadataStore {
    pub(crate) conn: Mutex<Connection>,
}

pub(crate) fn db_err(e: rusqlite::Error) -> DocError {
    DocError::Database(e.to_string())
}

impl MetadataStore {
    /// Open or create the store at the given path.
    pub fn open(path: impl AsRef<Path>) -> DocResult<Self> {
        let conn = Connection::open(path.as_ref()).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").map_err(db_err)?;
        let store = Self::init(conn)?;
        info!(path = %path.as_ref().display(), "Metadata store opened");
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> DocResult<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> DocResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Insert a new document row and return it with its assigned id.
    pub async fn insert_document(&self, locator: &str, date: NaiveDate) -> DocResult<Document> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO documents (locator, created_date) VALUES (?1, ?2)",
            params![locator, date.format(DATE_FORMAT).to_string()],
        )
        .map_err(db_err)?;
        let id = conn.last_insert_rowid();
        debug!(document_id = id, locator = %locator, "Document inserted");
        Ok(Document {
            id,
            locator: locator.to_string(),
            created_date: date,
        })
    }

    pub async fn get_document(&self, id: DocumentId) -> DocResult<Option<Document>> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT id, locator, created_date FROM documents WHERE id = ?1",
                params![id],
                |row| {
                    let id: i64 = row.get(0)?;
                    let locator: String = row.get(1)?;
                    let date: String = row.get(2)?;
                    Ok((id, locator, date))
                },
            )
            .optional()
            .map_err(db_err)?;

        row.map(|(id, locator, date)| {
            let created_date = NaiveDate::parse_from_str(&date, DATE_FORMAT)
                .map_err(|e| DocError::Database(format!("bad date '{date}' on document {id}: {e}")))?;
            Ok(Document { id, locator, created_date })
        })
        .transpose()
    }

    /// Delete a document's text rows and then the document row, in one transaction.
    ///
    /// Returns `false` if the document did not exist.
    pub async fn delete_document(&self, id: DocumentId) -> DocResult<bool> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(db_err)?;
        let texts = tx
            .execute("DELETE FROM documents_text WHERE document_id = ?1", params![id])
            .map_err(db_err)?;
        let docs = tx
            .execute("DELETE FROM documents WHERE id = ?1", params![id])
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        debug!(document_id = id, text_rows = texts, "Document rows deleted");
        Ok(docs > 0)
    }

    /// Store OCR output for a document.
    ///
    /// Fails with `NotFound` if the document no longer exists; nothing is written in that case.
    pub async fn write_text(
        &self,
        document_id: DocumentId,
        text: &str,
        policy: TextPolicy,
    ) -> DocResult<DocumentText> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(db_err)?;

        let exists: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM documents WHERE id = ?1)",
                params![document_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        if !exists {
            return Err(DocError::document_not_found(document_id));
        }

        if policy == TextPolicy::ReplaceLatest {
            tx.execute(
                "DELETE FROM documents_text WHERE document_id = ?1",
                params![document_id],
            )
            .map_err(db_err)?;
        }

        tx.execute(
            "INSERT INTO documents_text (document_id, text) VALUES (?1, ?2)",
            params![document_id, text],
        )
        .map_err(|e| match e.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => DocError::document_not_found(document_id),
            _ => db_err(e),
        })?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(db_err)?;

        Ok(DocumentText {
            id,
            document_id,
            text: text.to_string(),
        })
    }

    /// The most recently written text for a document.
    pub async fn latest_text(&self, document_id: DocumentId) -> DocResult<Option<DocumentText>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, document_id, text FROM documents_text
             WHERE document_id = ?1 ORDER BY id DESC LIMIT 1",
            params![document_id],
            |row| {
                Ok(DocumentText {
                    id: row.get(0)?,
                    document_id: row.get(1)?,
                    text: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(db_err)
    }

    /// Number of text rows stored for a document.
    pub async fn text_count(&self, document_id: DocumentId) -> DocResult<usize> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM documents_text WHERE document_id = ?1",
                params![document_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 14).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get_document() {
        let store = MetadataStore::in_memory().unwrap();
        let doc = store.insert_document("documents/a.jpg", today()).await.unwrap();
        assert_eq!(doc.id, 1);

        let fetched = store.get_document(doc.id).await.unwrap().unwrap();
        assert_eq!(fetched, doc);
        assert!(store.get_document(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ids_are_not_reused_after_delete() {
        let store = MetadataStore::in_memory().unwrap();
        let first = store.insert_document("a", today()).await.unwrap();
        assert!(store.delete_document(first.id).await.unwrap());
        let second = store.insert_document("b", today()).await.unwrap();
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn test_replace_latest_keeps_one_row() {
        let store = MetadataStore::in_memory().unwrap();
        let doc = store.insert_document("a", today()).await.unwrap();

        store.write_text(doc.id, "first", TextPolicy::ReplaceLatest).await.unwrap();
        store.write_text(doc.id, "second", TextPolicy::ReplaceLatest).await.unwrap();

        assert_eq!(store.text_count(doc.id).await.unwrap(), 1);
        assert_eq!(store.latest_text(doc.id).await.unwrap().unwrap().text, "second");
    }

    #[tokio::test]
    async fn test_append_history_returns_newest() {
        let store = MetadataStore::in_memory().unwrap();
        let doc = store.insert_document("a", today()).await.unwrap();

        store.write_text(doc.id, "v1", TextPolicy::AppendHistory).await.unwrap();
        store.write_text(doc.id, "v2", TextPolicy::AppendHistory).await.unwrap();

        assert_eq!(store.text_count(doc.id).await.unwrap(), 2);
        assert_eq!(store.latest_text(doc.id).await.unwrap().unwrap().text, "v2");
    }

    #[tokio::test]
    async fn test_write_text_for_missing_document_is_rejected() {
        let store = MetadataStore::in_memory().unwrap();
        let err = store
            .write_text(42, "orphan", TextPolicy::ReplaceLatest)
            .await
            .unwrap_err();
        assert!(matches!(err, DocError::NotFound(_)));
        assert_eq!(store.text_count(42).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_removes_text() {
        let store = MetadataStore::in_memory().unwrap();
        let doc = store.insert_document("a", today()).await.unwrap();
        store.write_text(doc.id, "hello", TextPolicy::ReplaceLatest).await.unwrap();

        assert!(store.delete_document(doc.id).await.unwrap());
        assert!(store.get_document(doc.id).await.unwrap().is_none());
        assert!(store.latest_text(doc.id).await.unwrap().is_none());
        assert!(!store.delete_document(doc.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docproc.db");
        {
            let store = MetadataStore::open(&path).unwrap();
            let doc = store.insert_document("a", today()).await.unwrap();
            store.write_text(doc.id, "kept", TextPolicy::ReplaceLatest).await.unwrap();
        }
        let store = MetadataStore::open(&path).unwrap();
        assert_eq!(store.latest_text(1).await.unwrap().unwrap().text, "kept");
    }
}
