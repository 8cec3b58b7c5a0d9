//! Loading a CSV export of users, the catalog, reviews and comments into the database.
//!
//! Ids in the files only link rows to each other, the database assigns new ones.
//! Rows that conflict with existing data or point to rows that weren't imported are
//! skipped with a warning. A malformed file stops the import.

use std::{
    collections::HashMap,
    fmt::Display,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use csv_async::{AsyncReaderBuilder, Trim};
use futures_util::StreamExt;
use log::{info, warn};
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;
use tokio::{fs::File, io::AsyncRead};
use yamdb_collab::{
    ArcedDatabase, Classifier, DatabaseError, NewClassifier, NewComment, NewReview, NewTitle,
    NewUser,
};
use yamdb_core::{PrimaryKey, Role, Score};

const USERS_FILE: &str = "users.csv";
const CATEGORIES_FILE: &str = "category.csv";
const GENRES_FILE: &str = "genre.csv";
const TITLE_GENRES_FILE: &str = "genre_title.csv";
const TITLES_FILE: &str = "titles.csv";
const REVIEWS_FILE: &str = "review.csv";
const COMMENTS_FILE: &str = "comments.csv";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Could not read {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{file} is malformed: {source}")]
    Csv {
        file: &'static str,
        source: csv_async::Error,
    },
    #[error(transparent)]
    Db(#[from] DatabaseError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct UserRow {
    id: PrimaryKey,
    username: String,
    email: String,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    bio: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
}

#[derive(Debug, Deserialize)]
struct ClassifierRow {
    id: PrimaryKey,
    name: String,
    slug: String,
}

#[derive(Debug, Deserialize)]
struct TitleGenreRow {
    title_id: PrimaryKey,
    genre_id: PrimaryKey,
}

#[derive(Debug, Deserialize)]
struct TitleRow {
    id: PrimaryKey,
    name: String,
    year: i32,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    category: Option<PrimaryKey>,
}

#[derive(Debug, Deserialize)]
struct ReviewRow {
    id: PrimaryKey,
    title_id: PrimaryKey,
    text: String,
    #[serde(alias = "author_id")]
    author: PrimaryKey,
    score: i32,
    pub_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct CommentRow {
    id: PrimaryKey,
    review_id: PrimaryKey,
    text: String,
    #[serde(alias = "author_id")]
    author: PrimaryKey,
    pub_date: DateTime<Utc>,
}

pub struct Importer {
    database: ArcedDatabase,
    users: HashMap<PrimaryKey, PrimaryKey>,
    categories: HashMap<PrimaryKey, PrimaryKey>,
    genres: HashMap<PrimaryKey, PrimaryKey>,
    /// Genre ids of each title, both as they are in the files
    title_genres: HashMap<PrimaryKey, Vec<PrimaryKey>>,
    titles: HashMap<PrimaryKey, PrimaryKey>,
    /// Title and review id of each imported review
    reviews: HashMap<PrimaryKey, (PrimaryKey, PrimaryKey)>,
    summary: ImportSummary,
}

impl Importer {
    pub fn new(database: ArcedDatabase) -> Self {
        Self {
            database,
            users: HashMap::new(),
            categories: HashMap::new(),
            genres: HashMap::new(),
            title_genres: HashMap::new(),
            titles: HashMap::new(),
            reviews: HashMap::new(),
            summary: ImportSummary::default(),
        }
    }

    /// Imports every known file found in the directory, in dependency order.
    /// Missing files are left out.
    pub async fn import_dir(mut self, dir: &Path) -> Result<ImportSummary, ImportError> {
        tokio::fs::metadata(dir)
            .await
            .map_err(|source| ImportError::Open {
                path: dir.to_path_buf(),
                source,
            })?;

        for file in [
            USERS_FILE,
            CATEGORIES_FILE,
            GENRES_FILE,
            TITLE_GENRES_FILE,
            TITLES_FILE,
            REVIEWS_FILE,
            COMMENTS_FILE,
        ] {
            let path = dir.join(file);

            if !path.is_file() {
                info!("{} was not found, skipping it", path.display());
                continue;
            }

            let reader = File::open(&path)
                .await
                .map_err(|source| ImportError::Open { path, source })?;

            match file {
                USERS_FILE => self.import_users(reader).await?,
                CATEGORIES_FILE => self.import_classifiers(Classifier::Category, reader).await?,
                GENRES_FILE => self.import_classifiers(Classifier::Genre, reader).await?,
                TITLE_GENRES_FILE => self.import_title_genres(reader).await?,
                TITLES_FILE => self.import_titles(reader).await?,
                REVIEWS_FILE => self.import_reviews(reader).await?,
                _ => self.import_comments(reader).await?,
            }
        }

        let summary = self.summary();
        info!(
            "Imported {} rows, skipped {}",
            summary.imported, summary.skipped
        );

        Ok(summary)
    }

    pub async fn import_users<R>(&mut self, reader: R) -> Result<(), ImportError>
    where
        R: AsyncRead + Unpin + Send,
    {
        for row in read_rows::<UserRow, _>(reader, USERS_FILE).await? {
            let role = match row.role.as_deref().map(str::parse::<Role>).transpose() {
                Ok(role) => role.unwrap_or_default(),
                Err(e) => {
                    self.skip(USERS_FILE, row.id, e);
                    continue;
                }
            };

            let result = self
                .database
                .create_user(NewUser {
                    username: row.username,
                    email: row.email,
                    role,
                    first_name: row.first_name,
                    last_name: row.last_name,
                    bio: row.bio,
                })
                .await;

            if let Some(user) = self.created(USERS_FILE, row.id, result)? {
                self.users.insert(row.id, user.id);
            }
        }

        Ok(())
    }

    pub async fn import_classifiers<R>(&mut self, kind: Classifier, reader: R) -> Result<(), ImportError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let file = match kind {
            Classifier::Category => CATEGORIES_FILE,
            Classifier::Genre => GENRES_FILE,
        };

        for row in read_rows::<ClassifierRow, _>(reader, file).await? {
            let result = self
                .database
                .create_classifier(
                    kind,
                    NewClassifier {
                        name: row.name,
                        slug: row.slug,
                    },
                )
                .await;

            if let Some(classifier) = self.created(file, row.id, result)? {
                match kind {
                    Classifier::Category => self.categories.insert(row.id, classifier.id),
                    Classifier::Genre => self.genres.insert(row.id, classifier.id),
                };
            }
        }

        Ok(())
    }

    /// Remembers the genres of each title, they are linked when titles are imported
    pub async fn import_title_genres<R>(&mut self, reader: R) -> Result<(), ImportError>
    where
        R: AsyncRead + Unpin + Send,
    {
        for row in read_rows::<TitleGenreRow, _>(reader, TITLE_GENRES_FILE).await? {
            self.title_genres
                .entry(row.title_id)
                .or_default()
                .push(row.genre_id);
        }

        Ok(())
    }

    pub async fn import_titles<R>(&mut self, reader: R) -> Result<(), ImportError>
    where
        R: AsyncRead + Unpin + Send,
    {
        for row in read_rows::<TitleRow, _>(reader, TITLES_FILE).await? {
            let category_id = match row.category {
                Some(category) => match self.categories.get(&category) {
                    Some(id) => Some(*id),
                    None => {
                        self.skip(TITLES_FILE, row.id, format!("unknown category {category}"));
                        continue;
                    }
                },
                None => None,
            };

            let mut genre_ids = Vec::new();
            for genre in self.title_genres.get(&row.id).into_iter().flatten() {
                match self.genres.get(genre) {
                    Some(id) => genre_ids.push(*id),
                    None => warn!("Title {} in {} lost unknown genre {}", row.id, TITLES_FILE, genre),
                }
            }

            let result = self
                .database
                .create_title(NewTitle {
                    name: row.name,
                    year: row.year,
                    description: row.description,
                    category_id,
                    genre_ids,
                })
                .await;

            if let Some(title) = self.created(TITLES_FILE, row.id, result)? {
                self.titles.insert(row.id, title.id);
            }
        }

        Ok(())
    }

    pub async fn import_reviews<R>(&mut self, reader: R) -> Result<(), ImportError>
    where
        R: AsyncRead + Unpin + Send,
    {
        for row in read_rows::<ReviewRow, _>(reader, REVIEWS_FILE).await? {
            let (Some(title_id), Some(author_id)) = (
                self.titles.get(&row.title_id).copied(),
                self.users.get(&row.author).copied(),
            )
            else {
                self.skip(REVIEWS_FILE, row.id, "unknown title or author");
                continue;
            };

            let score = match Score::new(row.score) {
                Ok(score) => score,
                Err(e) => {
                    self.skip(REVIEWS_FILE, row.id, e);
                    continue;
                }
            };

            let result = self
                .database
                .create_review(NewReview {
                    title_id,
                    author_id,
                    text: row.text,
                    score: score.value(),
                    created_at: Some(row.pub_date),
                })
                .await;

            if let Some(review) = self.created(REVIEWS_FILE, row.id, result)? {
                self.reviews.insert(row.id, (review.title_id, review.id));
            }
        }

        Ok(())
    }

    pub async fn import_comments<R>(&mut self, reader: R) -> Result<(), ImportError>
    where
        R: AsyncRead + Unpin + Send,
    {
        for row in read_rows::<CommentRow, _>(reader, COMMENTS_FILE).await? {
            let (Some((title_id, review_id)), Some(author_id)) = (
                self.reviews.get(&row.review_id).copied(),
                self.users.get(&row.author).copied(),
            )
            else {
                self.skip(COMMENTS_FILE, row.id, "unknown review or author");
                continue;
            };

            let result = self
                .database
                .create_comment(NewComment {
                    title_id,
                    review_id,
                    author_id,
                    text: row.text,
                    created_at: Some(row.pub_date),
                })
                .await;

            self.created(COMMENTS_FILE, row.id, result)?;
        }

        Ok(())
    }

    pub fn summary(&self) -> ImportSummary {
        self.summary
    }

    /// Counts the row, skipping it if it conflicts with existing data
    fn created<T>(
        &mut self,
        file: &str,
        id: PrimaryKey,
        result: Result<T, DatabaseError>,
    ) -> Result<Option<T>, ImportError> {
        match result {
            Ok(value) => {
                self.summary.imported += 1;
                Ok(Some(value))
            }
            Err(e @ (DatabaseError::Conflict { .. } | DatabaseError::NotFound { .. })) => {
                self.skip(file, id, e);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn skip(&mut self, file: &str, id: PrimaryKey, reason: impl Display) {
        warn!("Skipped row {} of {}: {}", id, file, reason);
        self.summary.skipped += 1;
    }
}

async fn read_rows<T, R>(reader: R, file: &'static str) -> Result<Vec<T>, ImportError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin + Send,
{
    let mut deserializer = AsyncReaderBuilder::new()
        .trim(Trim::All)
        .create_deserializer(reader);

    let mut records = deserializer.deserialize::<T>();
    let mut rows = Vec::new();

    while let Some(record) = records.next().await {
        rows.push(record.map_err(|source| ImportError::Csv { file, source })?);
    }

    Ok(rows)
}
