use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::model::{Book, NewBook};

/// Data access for the `books` table. Each call maps to a single statement;
/// errors from the underlying store are passed through untouched.
#[async_trait]
pub trait BookRepository: Send + Sync + 'static {
    async fn create(&self, book: NewBook) -> Result<Book>;

    async fn list(&self) -> Result<Vec<Book>>;

    /// Returns `None` when no book has the given id.
    async fn update(&self, id: i64, book: NewBook) -> Result<Option<Book>>;

    /// Returns true if the book existed and was deleted.
    async fn delete(&self, id: i64) -> Result<bool>;
}

#[derive(Default)]
struct Shelf {
    next_id: i64,
    books: BTreeMap<i64, Book>,
}

/// Process-local repository, handy for tests and for running without a database.
#[derive(Default)]
pub struct InMemoryBookRepository {
    shelf: Mutex<Shelf>,
}

impl InMemoryBookRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookRepository for InMemoryBookRepository {
    async fn create(&self, book: NewBook) -> Result<Book> {
        let mut shelf = self.shelf.lock().await;
        shelf.next_id += 1;
        let book = book.into_book(shelf.next_id);
        shelf.books.insert(book.id, book.clone());
        Ok(book)
    }

    async fn list(&self) -> Result<Vec<Book>> {
        let shelf = self.shelf.lock().await;
        Ok(shelf.books.values().cloned().collect())
    }

    async fn update(&self, id: i64, book: NewBook) -> Result<Option<Book>> {
        let mut shelf = self.shelf.lock().await;
        match shelf.books.get_mut(&id) {
            Some(existing) => {
                *existing = book.into_book(id);
                Ok(Some(existing.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let mut shelf = self.shelf.lock().await;
        Ok(shelf.books.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(title: &str) -> NewBook {
        NewBook {
            title: title.to_string(),
            author: "Le Guin".to_string(),
            progress: 12,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_ids_are_assigned_in_order() {
        let repo = InMemoryBookRepository::new();
        let first = repo.create(book("A Wizard of Earthsea")).await.unwrap();
        let second = repo.create(book("The Tombs of Atuan")).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);

        let titles: Vec<_> = repo.list().await.unwrap().into_iter().map(|b| b.title).collect();
        assert_eq!(titles, vec!["A Wizard of Earthsea", "The Tombs of Atuan"]);
    }

    #[tokio::test]
    async fn test_update_replaces_all_fields() {
        let repo = InMemoryBookRepository::new();
        let created = repo.create(book("The Dispossessed")).await.unwrap();

        let replacement = NewBook {
            title: "The Dispossessed".to_string(),
            author: "Ursula K. Le Guin".to_string(),
            progress: 387,
            notes: "Anarres".to_string(),
            finished: true,
            rating: 5,
        };
        let updated = repo.update(created.id, replacement.clone()).await.unwrap();
        assert_eq!(updated, Some(replacement.into_book(created.id)));
        assert_eq!(repo.list().await.unwrap(), vec![updated.unwrap()]);

        assert_eq!(repo.update(99, book("Missing")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = InMemoryBookRepository::new();
        let created = repo.create(book("Lathe of Heaven")).await.unwrap();

        assert!(repo.delete(created.id).await.unwrap());
        assert!(!repo.delete(created.id).await.unwrap());
        assert!(repo.list().await.unwrap().is_empty());

        // ids are not reused after a delete
        assert_eq!(repo.create(book("Always Coming Home")).await.unwrap().id, 2);
    }
}
