//!
//! bookshelf catalog store
//! -----------------------
//! Persists book records in the `books` table and answers the filtered, sorted
//! listings used by both the HTML page and the JSON endpoint.
//!
//! Sort columns and filter categories are closed enums; request text is parsed
//! into them before any SQL is built, so the only dynamic piece of a listing
//! query is a `'static` column name chosen by the enum and two bound parameters.

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::SharedDb;
use crate::error::StoreError;

/// Lower and upper bound of the Dewey literature range, compared as text.
const FICTION_LOW: &str = "800";
const FICTION_HIGH: &str = "900";

/// A stored catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub pk: i64,
    pub title: String,
    pub author: String,
    pub classification: String,
    /// Identifier issued by the classification service.
    #[serde(rename = "id")]
    pub external_id: String,
}

/// Insert input: a book before the store assigned its key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub classification: String,
    pub external_id: String,
}

impl NewBook {
    fn with_pk(self, pk: i64) -> Book {
        Book {
            pk,
            title: self.title,
            author: self.author,
            classification: self.classification,
            external_id: self.external_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortColumn {
    #[default]
    PrimaryKey,
    Title,
    Author,
    Classification,
}

impl SortColumn {
    pub const ALL: [SortColumn; 4] = [SortColumn::PrimaryKey, SortColumn::Title, SortColumn::Author, SortColumn::Classification];

    /// Unrecognized or empty input falls back to `PrimaryKey`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "title" => SortColumn::Title,
            "author" => SortColumn::Author,
            "classification" => SortColumn::Classification,
            _ => SortColumn::PrimaryKey,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortColumn::PrimaryKey => "pk",
            SortColumn::Title => "title",
            SortColumn::Author => "author",
            SortColumn::Classification => "classification",
        }
    }

    fn column(&self) -> &'static str {
        // Wire names double as column names.
        self.as_str()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterCategory {
    #[default]
    All,
    Fiction,
    NonFiction,
}

impl FilterCategory {
    /// Unrecognized or empty input means no filter.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "fiction" => FilterCategory::Fiction,
            "nonfiction" => FilterCategory::NonFiction,
            _ => FilterCategory::All,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterCategory::All => "all",
            FilterCategory::Fiction => "fiction",
            FilterCategory::NonFiction => "nonfiction",
        }
    }

    /// True when `classification` is inside the filter. Mirrors the SQL predicate.
    pub fn matches(&self, classification: &str) -> bool {
        let in_range = classification >= FICTION_LOW && classification <= FICTION_HIGH;
        match self {
            FilterCategory::All => true,
            FilterCategory::Fiction => in_range,
            FilterCategory::NonFiction => !in_range,
        }
    }
}

/// Handle to the `books` table.
#[derive(Clone)]
pub struct CatalogStore {
    db: SharedDb,
}

impl CatalogStore {
    pub fn new(db: SharedDb) -> Self {
        Self { db }
    }

    pub fn insert(&self, book: NewBook) -> Result<Book, StoreError> {
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO books (title, author, classification, id) VALUES (?1, ?2, ?3, ?4)",
            params![book.title, book.author, book.classification, book.external_id],
        )?;
        let pk = conn.last_insert_rowid();
        info!(pk, title = %book.title, "inserted book");
        Ok(book.with_pk(pk))
    }

    /// Delete one book. Reports `NotFound` when no row had that key.
    pub fn delete_by_key(&self, pk: i64) -> Result<(), StoreError> {
        let conn = self.db.lock();
        let n = conn.execute("DELETE FROM books WHERE pk = ?1", params![pk])?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("book {pk}")));
        }
        info!(pk, "deleted book");
        Ok(())
    }

    pub fn get(&self, pk: i64) -> Result<Option<Book>, StoreError> {
        let conn = self.db.lock();
        let book = conn
            .query_row("SELECT pk, title, author, classification, id FROM books WHERE pk = ?1", params![pk], row_to_book)
            .optional()?;
        Ok(book)
    }

    /// All books matching `filter`, ascending by `sort`.
    ///
    /// Rows with equal sort keys come back in SQLite's native order, which is
    /// not guaranteed to be stable.
    pub fn list(&self, sort: SortColumn, filter: FilterCategory) -> Result<Vec<Book>, StoreError> {
        let predicate = match filter {
            FilterCategory::All => "",
            FilterCategory::Fiction => " WHERE classification BETWEEN ?1 AND ?2",
            FilterCategory::NonFiction => " WHERE NOT (classification BETWEEN ?1 AND ?2)",
        };
        let sql = format!(
            "SELECT pk, title, author, classification, id FROM books{} ORDER BY {} ASC",
            predicate,
            sort.column()
        );
        debug!(sort = sort.as_str(), filter = filter.as_str(), "listing books");
        let conn = self.db.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = match filter {
            FilterCategory::All => stmt.query_map([], row_to_book)?.collect::<Result<Vec<_>, _>>()?,
            _ => stmt
                .query_map(params![FICTION_LOW, FICTION_HIGH], row_to_book)?
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }
}

fn row_to_book(row: &rusqlite::Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        pk: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        classification: row.get(3)?,
        external_id: row.get(4)?,
    })
}
