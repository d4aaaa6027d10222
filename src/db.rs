use crate::config;
use crate::model::{Book, NewBook};
use crate::repository::BookRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use libsql::{Builder, Connection, Database as LibsqlDatabase, Row};
use std::path::PathBuf;
use std::time::Duration;

const SCHEMA: &str = include_str!("schema.sql");

const IN_MEMORY: &str = ":memory:";

pub struct Database {
    _db: LibsqlDatabase,
    conn: Connection,
}

impl Database {
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Opens the database, retrying a fixed number of times with a fixed pause,
    /// then makes sure the `books` table exists.
    pub async fn connect(cfg: &config::Database) -> Result<Self> {
        let attempts = cfg.connect_attempts.max(1);
        let interval = Duration::from_secs(cfg.retry_interval_seconds);

        let mut attempt = 1;
        let database = loop {
            match Self::open(cfg).await {
                Ok(database) => break database,
                Err(e) if attempt < attempts => {
                    tracing::warn!(error = %e, attempt, max = attempts, "failed to connect to database, retrying");
                    tokio::time::sleep(interval).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e.context(format!("failed to connect to database after {attempts} attempts")));
                }
            }
        };

        database
            .conn
            .execute_batch(SCHEMA)
            .await
            .context("failed to create books table")?;
        tracing::info!(attempt, "database ready");

        Ok(database)
    }

    async fn open(cfg: &config::Database) -> Result<Self> {
        let db = match cfg.remote_url() {
            Some(url) => {
                tracing::info!(url = %url, user = ?cfg.get_user(), "[db] connecting to remote database");
                let token = cfg.get_password().unwrap_or_default().to_string();
                Builder::new_remote(url, token).build().await?
            }
            None if cfg.get_name() == IN_MEMORY => Builder::new_local(IN_MEMORY).build().await?,
            None => {
                let dir = cfg.get_data_dir();
                std::fs::create_dir_all(&dir).with_context(|| format!("failed to create data directory {dir:?}"))?;
                let path: PathBuf = dir.join(cfg.get_name());
                tracing::info!(path = ?path, "[db] opening local database");
                Builder::new_local(path).build().await?
            }
        };

        let conn = db.connect()?;
        conn.query("SELECT 1", ()).await?;

        Ok(Database { _db: db, conn })
    }
}

/// `BookRepository` over a libsql connection.
#[derive(Clone)]
pub struct LibsqlBookRepository {
    conn: Connection,
}

impl LibsqlBookRepository {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    fn row_to_book(row: &Row) -> Result<Book> {
        Ok(Book {
            id: row.get(0)?,
            title: row.get(1)?,
            author: row.get(2)?,
            progress: row.get::<Option<i64>>(3)?.unwrap_or(0),
            notes: row.get::<Option<String>>(4)?.unwrap_or_default(),
            finished: row.get::<Option<i64>>(5)?.unwrap_or(0) != 0,
            rating: row.get::<Option<i64>>(6)?.unwrap_or(0),
        })
    }
}

#[async_trait]
impl BookRepository for LibsqlBookRepository {
    async fn create(&self, book: NewBook) -> Result<Book> {
        let query = r#"
            INSERT INTO books (title, author, progress, notes, finished, rating)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
        "#;

        let mut rows = self
            .conn
            .query(
                query,
                libsql::params![
                    book.title.clone(),
                    book.author.clone(),
                    book.progress,
                    book.notes.clone(),
                    book.finished as i64,
                    book.rating
                ],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(book.into_book(row.get(0)?)),
            None => anyhow::bail!("insert into books returned no id"),
        }
    }

    async fn list(&self) -> Result<Vec<Book>> {
        let query = r#"
            SELECT id, title, author, progress, notes, finished, rating
            FROM books
            ORDER BY id
        "#;

        let mut rows = self.conn.query(query, ()).await?;
        let mut books = vec![];
        while let Some(row) = rows.next().await? {
            books.push(Self::row_to_book(&row)?);
        }

        Ok(books)
    }

    async fn update(&self, id: i64, book: NewBook) -> Result<Option<Book>> {
        let query = r#"
            UPDATE books
            SET title = ?, author = ?, progress = ?, notes = ?, finished = ?, rating = ?
            WHERE id = ?
        "#;

        let affected = self
            .conn
            .execute(
                query,
                libsql::params![
                    book.title.clone(),
                    book.author.clone(),
                    book.progress,
                    book.notes.clone(),
                    book.finished as i64,
                    book.rating,
                    id
                ],
            )
            .await?;

        Ok((affected > 0).then(|| book.into_book(id)))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM books WHERE id = ?", libsql::params![id])
            .await?;
        Ok(affected > 0)
    }
}
