use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    postgres::PgPoolOptions, query, query_as, Error as SqlxError, FromRow, PgPool, Postgres,
    QueryBuilder,
};
use yamdb_core::{PrimaryKey, User};

use crate::{
    ChallengeData, Classifier, ClassifierData, CommentData, Database, DatabaseError,
    DatabaseResult, IntoDatabaseError, NewChallenge, NewClassifier, NewComment, NewReview,
    NewSession, NewTitle, NewUser, Result, ReviewData, SessionData, TitleData, TitleFilter,
    UpdatedComment, UpdatedReview, UpdatedTitle, UpdatedUser,
};

const TITLE_SELECT: &str = "
    SELECT
        titles.id,
        titles.name,
        titles.year,
        titles.description,
        categories.id AS category_id,
        categories.name AS category_name,
        categories.slug AS category_slug,
        (SELECT AVG(reviews.score)::float8 FROM reviews WHERE reviews.title_id = titles.id) AS rating
    FROM titles
        LEFT JOIN categories ON titles.category_id = categories.id";

const REVIEW_SELECT: &str = "
    SELECT
        reviews.id,
        reviews.title_id,
        reviews.author_id,
        users.username AS author,
        reviews.text,
        reviews.score,
        reviews.created_at
    FROM reviews
        INNER JOIN users ON reviews.author_id = users.id";

const COMMENT_SELECT: &str = "
    SELECT
        comments.id,
        comments.title_id,
        comments.review_id,
        comments.author_id,
        users.username AS author,
        comments.text,
        comments.created_at
    FROM comments
        INNER JOIN users ON comments.author_id = users.id";

/// A postgres database implementation for yamdb
pub struct PgDatabase {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: PrimaryKey,
    username: String,
    email: String,
    role: String,
    first_name: String,
    last_name: String,
    bio: String,
    staff: bool,
    superuser: bool,
}

#[derive(Debug, FromRow)]
struct ChallengeRow {
    id: PrimaryKey,
    user_id: PrimaryKey,
    code_hash: String,
    expires_at: DateTime<Utc>,
    consumed_at: Option<DateTime<Utc>>,
    failed_attempts: i32,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct SessionRow {
    id: PrimaryKey,
    token: String,
    expires_at: DateTime<Utc>,
    user_id: PrimaryKey,
}

#[derive(Debug, FromRow)]
struct ClassifierRow {
    id: PrimaryKey,
    name: String,
    slug: String,
}

#[derive(Debug, FromRow)]
struct TitleGenreRow {
    title_id: PrimaryKey,
    id: PrimaryKey,
    name: String,
    slug: String,
}

#[derive(Debug, FromRow)]
struct TitleRow {
    id: PrimaryKey,
    name: String,
    year: i32,
    description: Option<String>,
    category_id: Option<PrimaryKey>,
    category_name: Option<String>,
    category_slug: Option<String>,
    rating: Option<f64>,
}

#[derive(Debug, FromRow)]
struct ReviewRow {
    id: PrimaryKey,
    title_id: PrimaryKey,
    author_id: PrimaryKey,
    author: String,
    text: String,
    score: i32,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct CommentRow {
    id: PrimaryKey,
    title_id: PrimaryKey,
    review_id: PrimaryKey,
    author_id: PrimaryKey,
    author: String,
    text: String,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> Result<User> {
        let role = self
            .role
            .parse()
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(User {
            id: self.id,
            username: self.username,
            email: self.email,
            role,
            first_name: self.first_name,
            last_name: self.last_name,
            bio: self.bio,
            staff: self.staff,
            superuser: self.superuser,
        })
    }
}

impl From<ChallengeRow> for ChallengeData {
    fn from(r: ChallengeRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            code_hash: r.code_hash,
            expires_at: r.expires_at,
            consumed_at: r.consumed_at,
            failed_attempts: r.failed_attempts,
            created_at: r.created_at,
        }
    }
}

impl From<ClassifierRow> for ClassifierData {
    fn from(r: ClassifierRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            slug: r.slug,
        }
    }
}

impl From<ReviewRow> for ReviewData {
    fn from(r: ReviewRow) -> Self {
        Self {
            id: r.id,
            title_id: r.title_id,
            author_id: r.author_id,
            author: r.author,
            text: r.text,
            score: r.score,
            created_at: r.created_at,
        }
    }
}

impl From<CommentRow> for CommentData {
    fn from(r: CommentRow) -> Self {
        Self {
            id: r.id,
            title_id: r.title_id,
            review_id: r.review_id,
            author_id: r.author_id,
            author: r.author,
            text: r.text,
            created_at: r.created_at,
        }
    }
}

fn classifier_table(kind: Classifier) -> &'static str {
    match kind {
        Classifier::Category => "categories",
        Classifier::Genre => "genres",
    }
}

/// Maps a unique violation on the users table to the field whose constraint failed
fn user_conflict(error: SqlxError, username: &str, email: &str) -> DatabaseError {
    let constraint = error
        .as_database_error()
        .and_then(|e| e.constraint())
        .map(str::to_string);

    match constraint.as_deref() {
        Some("users_email_key") => error.conflict_or_any("user", "email", email),
        _ => error.conflict_or_any("user", "username", username),
    }
}

/// Escapes the wildcards of a LIKE pattern
fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

impl PgDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }

    /// Attaches genres to the title rows, preserving their order
    async fn titles_with_genres(&self, rows: Vec<TitleRow>) -> Result<Vec<TitleData>> {
        let ids: Vec<PrimaryKey> = rows.iter().map(|r| r.id).collect();

        let genre_rows = query_as::<_, TitleGenreRow>(
            "
            SELECT title_genres.title_id, genres.id, genres.name, genres.slug
            FROM title_genres
                INNER JOIN genres ON title_genres.genre_id = genres.id
            WHERE title_genres.title_id = ANY($1)
            ORDER BY genres.slug",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        let titles = rows
            .into_iter()
            .map(|r| {
                let genres = genre_rows
                    .iter()
                    .filter(|g| g.title_id == r.id)
                    .map(|g| ClassifierData {
                        id: g.id,
                        name: g.name.clone(),
                        slug: g.slug.clone(),
                    })
                    .collect();

                let category = match (r.category_id, r.category_name, r.category_slug) {
                    (Some(id), Some(name), Some(slug)) => Some(ClassifierData { id, name, slug }),
                    _ => None,
                };

                TitleData {
                    id: r.id,
                    name: r.name,
                    year: r.year,
                    description: r.description,
                    category,
                    genres,
                    rating: r.rating,
                }
            })
            .collect();

        Ok(titles)
    }

    async fn replace_title_genres(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        title_id: PrimaryKey,
        genre_ids: &[PrimaryKey],
    ) -> Result<()> {
        query("DELETE FROM title_genres WHERE title_id = $1")
            .bind(title_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| e.any())?;

        query(
            "INSERT INTO title_genres (title_id, genre_id)
             SELECT $1, genre_id FROM UNNEST($2::int4[]) AS genre_id
             ON CONFLICT DO NOTHING",
        )
        .bind(title_id)
        .bind(genre_ids)
        .execute(&mut **tx)
        .await
        .map_err(|e| e.not_found_or("genre", "id"))
        .map(|_| ())
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<User> {
        query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "id"))?
            .into_user()
    }

    async fn user_by_username(&self, username: &str) -> Result<User> {
        query_as::<_, UserRow>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "username"))?
            .into_user()
    }

    async fn user_by_email(&self, email: &str) -> Result<User> {
        query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "email"))?
            .into_user()
    }

    async fn list_users(&self, search: Option<&str>) -> Result<Vec<User>> {
        let pattern = format!("%{}%", escape_like(search.unwrap_or_default()));

        query_as::<_, UserRow>("SELECT * FROM users WHERE username LIKE $1 ORDER BY id")
            .bind(pattern)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?
            .into_iter()
            .map(UserRow::into_user)
            .collect()
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User> {
        self.user_by_username(&new_user.username)
            .await
            .conflict_or_ok("user", "username", &new_user.username)?;
        self.user_by_email(&new_user.email)
            .await
            .conflict_or_ok("user", "email", &new_user.email)?;

        query_as::<_, UserRow>(
            "INSERT INTO users (username, email, role, first_name, last_name, bio)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(new_user.role.as_str())
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .bind(&new_user.bio)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| user_conflict(e, &new_user.username, &new_user.email))?
        .into_user()
    }

    async fn update_user(&self, updated_user: UpdatedUser) -> Result<User> {
        let user = self.user_by_id(updated_user.id).await?;

        if let Some(username) = updated_user.username.as_ref().filter(|u| **u != user.username) {
            self.user_by_username(username)
                .await
                .conflict_or_ok("user", "username", username)?;
        }

        if let Some(email) = updated_user.email.as_ref().filter(|e| **e != user.email) {
            self.user_by_email(email)
                .await
                .conflict_or_ok("user", "email", email)?;
        }

        let username = updated_user.username.unwrap_or(user.username);
        let email = updated_user.email.unwrap_or(user.email);

        query(
            "UPDATE users
             SET username = $1, email = $2, role = $3, first_name = $4, last_name = $5, bio = $6
             WHERE id = $7",
        )
        .bind(&username)
        .bind(&email)
        .bind(updated_user.role.unwrap_or(user.role).as_str())
        .bind(updated_user.first_name.unwrap_or(user.first_name))
        .bind(updated_user.last_name.unwrap_or(user.last_name))
        .bind(updated_user.bio.unwrap_or(user.bio))
        .bind(updated_user.id)
        .execute(&self.pool)
        .await
        .map_err(|e| user_conflict(e, &username, &email))?;

        self.user_by_id(updated_user.id).await
    }

    async fn set_platform_flags(
        &self,
        user_id: PrimaryKey,
        staff: bool,
        superuser: bool,
    ) -> Result<User> {
        query_as::<_, UserRow>(
            "UPDATE users SET staff = $1, superuser = $2 WHERE id = $3 RETURNING *",
        )
        .bind(staff)
        .bind(superuser)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("user", "id"))?
        .into_user()
    }

    async fn delete_user(&self, user_id: PrimaryKey) -> Result<()> {
        // Ensure user exists
        let _ = self.user_by_id(user_id).await?;

        query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn create_challenge(&self, new_challenge: NewChallenge) -> Result<ChallengeData> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        // Only the newest challenge may be redeemed
        query("DELETE FROM challenges WHERE user_id = $1 AND consumed_at IS NULL")
            .bind(new_challenge.user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        let row = query_as::<_, ChallengeRow>(
            "INSERT INTO challenges (user_id, code_hash, expires_at) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(new_challenge.user_id)
        .bind(&new_challenge.code_hash)
        .bind(new_challenge.expires_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())?;

        Ok(row.into())
    }

    async fn live_challenge(
        &self,
        user_id: PrimaryKey,
        now: DateTime<Utc>,
    ) -> Result<ChallengeData> {
        query_as::<_, ChallengeRow>(
            "SELECT * FROM challenges
             WHERE user_id = $1 AND consumed_at IS NULL AND expires_at > $2
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.not_found_or("challenge", "user_id"))
    }

    async fn consume_challenge(
        &self,
        challenge_id: PrimaryKey,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = query(
            "UPDATE challenges SET consumed_at = $1 WHERE id = $2 AND consumed_at IS NULL",
        )
        .bind(now)
        .bind(challenge_id)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(result.rows_affected() == 1)
    }

    async fn fail_challenge(
        &self,
        challenge_id: PrimaryKey,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> Result<ChallengeData> {
        query_as::<_, ChallengeRow>(
            "UPDATE challenges
             SET failed_attempts = failed_attempts + 1,
                 consumed_at = CASE
                     WHEN consumed_at IS NULL AND failed_attempts + 1 >= $2 THEN $3
                     ELSE consumed_at
                 END
             WHERE id = $1
             RETURNING *",
        )
        .bind(challenge_id)
        .bind(max_attempts)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.not_found_or("challenge", "id"))
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let row = query_as::<_, SessionRow>("SELECT * FROM sessions WHERE token = $1")
            .bind(token)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("session", "token"))?;

        // The user is always fetched again, so role changes apply immediately
        let user = self.user_by_id(row.user_id).await?;

        Ok(SessionData {
            id: row.id,
            token: row.token,
            expires_at: row.expires_at,
            user,
        })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        self.session_by_token(&new_session.token)
            .await
            .conflict_or_ok("session", "token", &new_session.token)?;

        let row = query_as::<_, SessionRow>(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(&new_session.token)
        .bind(new_session.user_id)
        .bind(new_session.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.conflict_or_any("session", "token", &new_session.token))?;

        self.session_by_token(&row.token).await
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        query("DELETE FROM sessions WHERE now() > expires_at")
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn list_classifiers(
        &self,
        kind: Classifier,
        search: Option<&str>,
    ) -> Result<Vec<ClassifierData>> {
        let pattern = format!("%{}%", escape_like(search.unwrap_or_default()));
        let sql = format!(
            "SELECT * FROM {} WHERE name LIKE $1 ORDER BY slug",
            classifier_table(kind)
        );

        let rows = query_as::<_, ClassifierRow>(&sql)
            .bind(pattern)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn classifier_by_slug(&self, kind: Classifier, slug: &str) -> Result<ClassifierData> {
        let sql = format!("SELECT * FROM {} WHERE slug = $1", classifier_table(kind));

        query_as::<_, ClassifierRow>(&sql)
            .bind(slug)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or(kind.resource(), "slug"))
    }

    async fn create_classifier(
        &self,
        kind: Classifier,
        new_classifier: NewClassifier,
    ) -> Result<ClassifierData> {
        self.classifier_by_slug(kind, &new_classifier.slug)
            .await
            .conflict_or_ok(kind.resource(), "slug", &new_classifier.slug)?;

        let sql = format!(
            "INSERT INTO {} (name, slug) VALUES ($1, $2) RETURNING *",
            classifier_table(kind)
        );

        query_as::<_, ClassifierRow>(&sql)
            .bind(&new_classifier.name)
            .bind(&new_classifier.slug)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.conflict_or_any(kind.resource(), "slug", &new_classifier.slug))
    }

    async fn delete_classifier(&self, kind: Classifier, slug: &str) -> Result<()> {
        // Ensure it exists
        let _ = self.classifier_by_slug(kind, slug).await?;

        let sql = format!("DELETE FROM {} WHERE slug = $1", classifier_table(kind));

        query(&sql)
            .bind(slug)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn list_titles(&self, filter: TitleFilter) -> Result<Vec<TitleData>> {
        let mut builder = QueryBuilder::<Postgres>::new(TITLE_SELECT);
        builder.push(" WHERE TRUE");

        if let Some(genre) = filter.genre {
            builder
                .push(
                    " AND EXISTS (
                        SELECT 1 FROM title_genres
                            INNER JOIN genres ON title_genres.genre_id = genres.id
                        WHERE title_genres.title_id = titles.id AND genres.slug = ",
                )
                .push_bind(genre)
                .push(")");
        }

        if let Some(category) = filter.category {
            builder.push(" AND categories.slug = ").push_bind(category);
        }

        if let Some(name) = filter.name {
            builder
                .push(" AND titles.name LIKE ")
                .push_bind(format!("%{}%", escape_like(&name)));
        }

        if let Some(year) = filter.year {
            builder.push(" AND titles.year = ").push_bind(year);
        }

        builder.push(" ORDER BY titles.id");

        let rows: Vec<TitleRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?;

        self.titles_with_genres(rows).await
    }

    async fn title_by_id(&self, title_id: PrimaryKey) -> Result<TitleData> {
        let sql = format!("{TITLE_SELECT} WHERE titles.id = $1");

        let row = query_as::<_, TitleRow>(&sql)
            .bind(title_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("title", "id"))?;

        self.titles_with_genres(vec![row])
            .await?
            .pop()
            .ok_or(DatabaseError::NotFound {
                resource: "title",
                identifier: "id",
            })
    }

    async fn create_title(&self, new_title: NewTitle) -> Result<TitleData> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let (id,): (PrimaryKey,) = query_as(
            "INSERT INTO titles (name, year, description, category_id)
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(&new_title.name)
        .bind(new_title.year)
        .bind(&new_title.description)
        .bind(new_title.category_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| e.not_found_or("category", "id"))?;

        Self::replace_title_genres(&mut tx, id, &new_title.genre_ids).await?;
        tx.commit().await.map_err(|e| e.any())?;

        self.title_by_id(id).await
    }

    async fn update_title(&self, updated_title: UpdatedTitle) -> Result<TitleData> {
        let title = self.title_by_id(updated_title.id).await?;
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        query(
            "UPDATE titles SET name = $1, year = $2, description = $3, category_id = $4
             WHERE id = $5",
        )
        .bind(updated_title.name.unwrap_or(title.name))
        .bind(updated_title.year.unwrap_or(title.year))
        .bind(updated_title.description.unwrap_or(title.description))
        .bind(
            updated_title
                .category_id
                .unwrap_or(title.category.map(|c| c.id)),
        )
        .bind(updated_title.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        if let Some(genre_ids) = updated_title.genre_ids {
            Self::replace_title_genres(&mut tx, updated_title.id, &genre_ids).await?;
        }

        tx.commit().await.map_err(|e| e.any())?;

        self.title_by_id(updated_title.id).await
    }

    async fn delete_title(&self, title_id: PrimaryKey) -> Result<()> {
        // Ensure title exists
        let _ = self.title_by_id(title_id).await?;

        query("DELETE FROM titles WHERE id = $1")
            .bind(title_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn list_reviews(&self, title_id: PrimaryKey) -> Result<Vec<ReviewData>> {
        let sql = format!(
            "{REVIEW_SELECT} WHERE reviews.title_id = $1 ORDER BY reviews.created_at, reviews.id"
        );

        let rows = query_as::<_, ReviewRow>(&sql)
            .bind(title_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn review_by_id(
        &self,
        title_id: PrimaryKey,
        review_id: PrimaryKey,
    ) -> Result<ReviewData> {
        let sql = format!("{REVIEW_SELECT} WHERE reviews.id = $1 AND reviews.title_id = $2");

        query_as::<_, ReviewRow>(&sql)
            .bind(review_id)
            .bind(title_id)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("review", "id"))
    }

    async fn create_review(&self, new_review: NewReview) -> Result<ReviewData> {
        let existing = query("SELECT id FROM reviews WHERE author_id = $1 AND title_id = $2")
            .bind(new_review.author_id)
            .bind(new_review.title_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if existing.is_some() {
            return Err(DatabaseError::Conflict {
                resource: "review",
                field: "title",
                value: new_review.title_id.to_string(),
            });
        }

        // The unique constraint catches the race between the check above and the insert
        let (id,): (PrimaryKey,) = query_as(
            "INSERT INTO reviews (title_id, author_id, text, score, created_at)
             VALUES ($1, $2, $3, $4, COALESCE($5, now())) RETURNING id",
        )
        .bind(new_review.title_id)
        .bind(new_review.author_id)
        .bind(&new_review.text)
        .bind(new_review.score)
        .bind(new_review.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.conflict_or_any("review", "title", &new_review.title_id.to_string()))?;

        self.review_by_id(new_review.title_id, id).await
    }

    async fn update_review(&self, updated_review: UpdatedReview) -> Result<ReviewData> {
        let (title_id,): (PrimaryKey,) = query_as(
            "UPDATE reviews SET text = COALESCE($1, text), score = COALESCE($2, score)
             WHERE id = $3 RETURNING title_id",
        )
        .bind(updated_review.text)
        .bind(updated_review.score)
        .bind(updated_review.id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("review", "id"))?;

        self.review_by_id(title_id, updated_review.id).await
    }

    async fn delete_review(&self, review_id: PrimaryKey) -> Result<()> {
        let result = query("DELETE FROM reviews WHERE id = $1")
            .bind(review_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        match result.rows_affected() {
            0 => Err(DatabaseError::NotFound {
                resource: "review",
                identifier: "id",
            }),
            _ => Ok(()),
        }
    }

    async fn list_comments(
        &self,
        title_id: PrimaryKey,
        review_id: PrimaryKey,
    ) -> Result<Vec<CommentData>> {
        let sql = format!(
            "{COMMENT_SELECT}
             WHERE comments.title_id = $1 AND comments.review_id = $2
             ORDER BY comments.created_at, comments.id"
        );

        let rows = query_as::<_, CommentRow>(&sql)
            .bind(title_id)
            .bind(review_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn comment_by_id(
        &self,
        title_id: PrimaryKey,
        review_id: PrimaryKey,
        comment_id: PrimaryKey,
    ) -> Result<CommentData> {
        let sql = format!(
            "{COMMENT_SELECT}
             WHERE comments.id = $1 AND comments.title_id = $2 AND comments.review_id = $3"
        );

        query_as::<_, CommentRow>(&sql)
            .bind(comment_id)
            .bind(title_id)
            .bind(review_id)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("comment", "id"))
    }

    async fn create_comment(&self, new_comment: NewComment) -> Result<CommentData> {
        let (id,): (PrimaryKey,) = query_as(
            "INSERT INTO comments (title_id, review_id, author_id, text, created_at)
             VALUES ($1, $2, $3, $4, COALESCE($5, now())) RETURNING id",
        )
        .bind(new_comment.title_id)
        .bind(new_comment.review_id)
        .bind(new_comment.author_id)
        .bind(&new_comment.text)
        .bind(new_comment.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        self.comment_by_id(new_comment.title_id, new_comment.review_id, id)
            .await
    }

    async fn update_comment(&self, updated_comment: UpdatedComment) -> Result<CommentData> {
        let (title_id, review_id): (PrimaryKey, PrimaryKey) = query_as(
            "UPDATE comments SET text = COALESCE($1, text) WHERE id = $2 RETURNING title_id, review_id",
        )
        .bind(updated_comment.text)
        .bind(updated_comment.id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("comment", "id"))?;

        self.comment_by_id(title_id, review_id, updated_comment.id)
            .await
    }

    async fn delete_comment(&self, comment_id: PrimaryKey) -> Result<()> {
        let result = query("DELETE FROM comments WHERE id = $1")
            .bind(comment_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        match result.rows_affected() {
            0 => Err(DatabaseError::NotFound {
                resource: "comment",
                identifier: "id",
            }),
            _ => Ok(()),
        }
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            // Foreign keys pointing to nothing
            SqlxError::Database(e) if e.is_foreign_key_violation() => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }

    fn conflict_or_any(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> DatabaseError {
        match self {
            SqlxError::Database(e) if e.is_unique_violation() => DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            },
            e => Self::any(e),
        }
    }
}
