use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{OptionalExtension, TransactionBehavior, params};
use saltbox_protocol::{ErrorTag, Request, Response};
use tokio_rusqlite::Connection;
use tracing::{trace, warn};

use crate::ops::{self, StoreOp};
use crate::types::{Capabilities, StorageEngine, StorageError};

#[derive(Debug, Clone)]
pub struct SqliteEngineOptions {
    pub path: PathBuf,
}

/// Direct engine backed by a SQLite table keyed on `(owner, key)`.
///
/// Compare-and-swap operations run in an immediate transaction, so they stay
/// atomic across connections and processes sharing the file.
#[derive(Debug, Clone)]
pub struct SqliteEngine {
    conn: Connection,
}

impl SqliteEngine {
    pub async fn open(opts: SqliteEngineOptions) -> Result<Self, StorageError> {
        if let Some(parent) = opts.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Unavailable(format!(
                    "create storage dir {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let conn = Connection::open(&opts.path)
            .await
            .map_err(|e| StorageError::Unavailable(format!("open sqlite: {e}")))?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StorageError::Unavailable(format!("open sqlite: {e}")))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.call(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS saltbox (
                  owner       TEXT NOT NULL,
                  "key"       TEXT NOT NULL,
                  digest      TEXT NOT NULL,
                  created_at  TEXT NOT NULL,
                  updated_at  TEXT NOT NULL,
                  PRIMARY KEY (owner, "key")
                );
                "#,
            )?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Unavailable(format!("init sqlite schema: {e}")))?;

        Ok(Self { conn })
    }
}

#[async_trait]
impl StorageEngine for SqliteEngine {
    fn capabilities(&self) -> Capabilities {
        Capabilities::SERVER
    }

    async fn handle_request(&self, request: Request) -> Response {
        let fallback = request.clone();

        let result = self
            .conn
            .call(move |conn| {
                let op = match ops::parse_request(&request) {
                    Ok(op) => op,
                    Err(resp) => return Ok(resp),
                };
                let now = Utc::now().to_rfc3339();
                let (owner, key) = (request.owner(), request.key());

                let response = match op {
                    StoreOp::Create { digest } => {
                        let inserted = conn.execute(
                            r#"INSERT INTO saltbox (owner, "key", digest, created_at, updated_at)
                               VALUES (?1, ?2, ?3, ?4, ?4)
                               ON CONFLICT(owner, "key") DO NOTHING"#,
                            params![owner, key, digest, now],
                        )?;
                        if inserted == 0 {
                            ops::duplicate(&request)
                        } else {
                            Response::success(&request, Some(digest.to_string()))
                        }
                    }
                    StoreOp::Verify => {
                        let stored: Option<String> = conn
                            .query_row(
                                r#"SELECT digest FROM saltbox WHERE owner = ?1 AND "key" = ?2"#,
                                params![owner, key],
                                |row| row.get(0),
                            )
                            .optional()?;
                        match stored {
                            Some(digest) => Response::success(&request, Some(digest)),
                            None => ops::not_found(&request),
                        }
                    }
                    StoreOp::Update {
                        expected,
                        replacement,
                    } => {
                        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                        let stored: Option<String> = tx
                            .query_row(
                                r#"SELECT digest FROM saltbox WHERE owner = ?1 AND "key" = ?2"#,
                                params![owner, key],
                                |row| row.get(0),
                            )
                            .optional()?;
                        let response = match stored {
                            None => ops::not_found(&request),
                            Some(stored) if !ops::digests_match(&stored, expected) => {
                                ops::conflict(&request)
                            }
                            Some(_) => {
                                tx.execute(
                                    r#"UPDATE saltbox SET digest = ?3, updated_at = ?4
                                       WHERE owner = ?1 AND "key" = ?2"#,
                                    params![owner, key, replacement, now],
                                )?;
                                Response::success(&request, Some(replacement.to_string()))
                            }
                        };
                        tx.commit()?;
                        response
                    }
                    StoreOp::Delete { expected } => {
                        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                        let stored: Option<String> = tx
                            .query_row(
                                r#"SELECT digest FROM saltbox WHERE owner = ?1 AND "key" = ?2"#,
                                params![owner, key],
                                |row| row.get(0),
                            )
                            .optional()?;
                        let response = match stored {
                            None => ops::not_found(&request),
                            Some(stored)
                                if expected.is_some_and(|e| !ops::digests_match(&stored, e)) =>
                            {
                                ops::conflict(&request)
                            }
                            Some(_) => {
                                tx.execute(
                                    r#"DELETE FROM saltbox WHERE owner = ?1 AND "key" = ?2"#,
                                    params![owner, key],
                                )?;
                                Response::success(&request, None)
                            }
                        };
                        tx.commit()?;
                        response
                    }
                };
                Ok(response)
            })
            .await;

        result.unwrap_or_else(|e| {
            warn!(
                owner = %fallback.owner(),
                key = %fallback.key(),
                operation = %fallback.operation(),
                error = %e,
                "sqlite request failed"
            );
            Response::failure(&fallback, ErrorTag::Unavailable, format!("sqlite error: {e}"))
        })
    }

    async fn send_response(&self, response: &Response) -> Result<(), StorageError> {
        trace!(nonce = %response.nonce(), operation = %response.operation(), "response delivered");
        Ok(())
    }
}
