use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub progress: i64,
    pub notes: String,
    pub finished: bool,
    pub rating: i64,
}

/// Request body for create and update. An `id` sent by the client is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub progress: i64,
    pub notes: String,
    pub finished: bool,
    pub rating: i64,
}

// Wire shape: absent and null fields both fall back to the zero value.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BookBody {
    title: Option<String>,
    author: Option<String>,
    progress: Option<i64>,
    notes: Option<String>,
    finished: Option<bool>,
    rating: Option<i64>,
}

impl From<BookBody> for NewBook {
    fn from(body: BookBody) -> Self {
        NewBook {
            title: body.title.unwrap_or_default(),
            author: body.author.unwrap_or_default(),
            progress: body.progress.unwrap_or_default(),
            notes: body.notes.unwrap_or_default(),
            finished: body.finished.unwrap_or_default(),
            rating: body.rating.unwrap_or_default(),
        }
    }
}

/// Field names match case-insensitively; an exact-case key wins over a folded one.
fn fold_keys(object: Map<String, Value>) -> Map<String, Value> {
    let mut folded = Map::new();
    let mut exact = Map::new();
    for (key, value) in object {
        let lower = key.to_lowercase();
        if lower == key {
            exact.insert(key, value);
        } else {
            folded.insert(lower, value);
        }
    }
    folded.extend(exact);
    folded
}

impl NewBook {
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let value = match serde_json::from_slice(bytes)? {
            Value::Object(object) => Value::Object(fold_keys(object)),
            other => other,
        };
        let body: BookBody = serde_json::from_value(value)?;
        Ok(body.into())
    }

    pub fn is_valid(&self) -> bool {
        !self.title.is_empty() && !self.author.is_empty() && self.progress >= 0
    }

    pub fn into_book(self, id: i64) -> Book {
        Book {
            id,
            title: self.title,
            author: self.author,
            progress: self.progress,
            notes: self.notes,
            finished: self.finished,
            rating: self.rating,
        }
    }
}
