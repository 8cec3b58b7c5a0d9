use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use yamdb_core::{mean_score, PrimaryKey, Score, User};

use crate::{
    ChallengeData, Classifier, ClassifierData, CommentData, Database, DatabaseError, NewChallenge,
    NewClassifier, NewComment, NewReview, NewSession, NewTitle, NewUser, Result, ReviewData,
    SessionData, TitleData, TitleFilter, UpdatedComment, UpdatedReview, UpdatedTitle, UpdatedUser,
};

/// A database that lives in memory and is lost on shutdown.
/// Every operation takes the same lock, so checks and writes are atomic.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    last_id: PrimaryKey,
    users: Vec<User>,
    challenges: Vec<ChallengeData>,
    sessions: Vec<StoredSession>,
    categories: Vec<ClassifierData>,
    genres: Vec<ClassifierData>,
    titles: Vec<StoredTitle>,
    reviews: Vec<StoredReview>,
    comments: Vec<StoredComment>,
}

struct StoredSession {
    id: PrimaryKey,
    token: String,
    user_id: PrimaryKey,
    expires_at: DateTime<Utc>,
}

struct StoredTitle {
    id: PrimaryKey,
    name: String,
    year: i32,
    description: Option<String>,
    category_id: Option<PrimaryKey>,
    genre_ids: Vec<PrimaryKey>,
}

struct StoredReview {
    id: PrimaryKey,
    title_id: PrimaryKey,
    author_id: PrimaryKey,
    text: String,
    score: i32,
    created_at: DateTime<Utc>,
}

struct StoredComment {
    id: PrimaryKey,
    title_id: PrimaryKey,
    review_id: PrimaryKey,
    author_id: PrimaryKey,
    text: String,
    created_at: DateTime<Utc>,
}

fn not_found(resource: &'static str, identifier: &'static str) -> DatabaseError {
    DatabaseError::NotFound {
        resource,
        identifier,
    }
}

fn conflict(resource: &'static str, field: &'static str, value: &str) -> DatabaseError {
    DatabaseError::Conflict {
        resource,
        field,
        value: value.to_string(),
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl State {
    fn next_id(&mut self) -> PrimaryKey {
        self.last_id += 1;
        self.last_id
    }

    fn user(&self, user_id: PrimaryKey) -> Result<&User> {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .ok_or(not_found("user", "id"))
    }

    fn classifiers(&self, kind: Classifier) -> &Vec<ClassifierData> {
        match kind {
            Classifier::Category => &self.categories,
            Classifier::Genre => &self.genres,
        }
    }

    fn classifiers_mut(&mut self, kind: Classifier) -> &mut Vec<ClassifierData> {
        match kind {
            Classifier::Category => &mut self.categories,
            Classifier::Genre => &mut self.genres,
        }
    }

    fn title(&self, title_id: PrimaryKey) -> Result<TitleData> {
        let stored = self
            .titles
            .iter()
            .find(|t| t.id == title_id)
            .ok_or(not_found("title", "id"))?;

        Ok(self.title_data(stored))
    }

    fn title_data(&self, stored: &StoredTitle) -> TitleData {
        let category = stored
            .category_id
            .and_then(|id| self.categories.iter().find(|c| c.id == id).cloned());

        let mut genres: Vec<_> = self
            .genres
            .iter()
            .filter(|g| stored.genre_ids.contains(&g.id))
            .cloned()
            .collect();
        genres.sort_by(|a, b| a.slug.cmp(&b.slug));

        let scores = self
            .reviews
            .iter()
            .filter(|r| r.title_id == stored.id)
            .filter_map(|r| Score::new(r.score).ok());

        TitleData {
            id: stored.id,
            name: stored.name.clone(),
            year: stored.year,
            description: stored.description.clone(),
            category,
            genres,
            rating: mean_score(scores),
        }
    }

    fn check_references(
        &self,
        category_id: Option<PrimaryKey>,
        genre_ids: &[PrimaryKey],
    ) -> Result<()> {
        if let Some(id) = category_id {
            if !self.categories.iter().any(|c| c.id == id) {
                return Err(not_found("category", "id"));
            }
        }

        if !genre_ids.iter().all(|id| self.genres.iter().any(|g| g.id == *id)) {
            return Err(not_found("genre", "id"));
        }

        Ok(())
    }

    fn review(&self, review_id: PrimaryKey) -> Result<ReviewData> {
        let stored = self
            .reviews
            .iter()
            .find(|r| r.id == review_id)
            .ok_or(not_found("review", "id"))?;

        Ok(ReviewData {
            id: stored.id,
            title_id: stored.title_id,
            author_id: stored.author_id,
            author: self.user(stored.author_id)?.username.clone(),
            text: stored.text.clone(),
            score: stored.score,
            created_at: stored.created_at,
        })
    }

    fn comment(&self, comment_id: PrimaryKey) -> Result<CommentData> {
        let stored = self
            .comments
            .iter()
            .find(|c| c.id == comment_id)
            .ok_or(not_found("comment", "id"))?;

        Ok(CommentData {
            id: stored.id,
            title_id: stored.title_id,
            review_id: stored.review_id,
            author_id: stored.author_id,
            author: self.user(stored.author_id)?.username.clone(),
            text: stored.text.clone(),
            created_at: stored.created_at,
        })
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<User> {
        self.state.lock().user(user_id).cloned()
    }

    async fn user_by_username(&self, username: &str) -> Result<User> {
        self.state
            .lock()
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(not_found("user", "username"))
    }

    async fn user_by_email(&self, email: &str) -> Result<User> {
        self.state
            .lock()
            .users
            .iter()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(not_found("user", "email"))
    }

    async fn list_users(&self, search: Option<&str>) -> Result<Vec<User>> {
        let search = search.unwrap_or_default();

        Ok(self
            .state
            .lock()
            .users
            .iter()
            .filter(|u| u.username.contains(search))
            .cloned()
            .collect())
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User> {
        let mut state = self.state.lock();

        if state.users.iter().any(|u| u.username == new_user.username) {
            return Err(conflict("user", "username", &new_user.username));
        }

        if state.users.iter().any(|u| u.email == new_user.email) {
            return Err(conflict("user", "email", &new_user.email));
        }

        let user = User {
            id: state.next_id(),
            username: new_user.username,
            email: new_user.email,
            role: new_user.role,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            bio: new_user.bio,
            staff: false,
            superuser: false,
        };

        state.users.push(user.clone());
        Ok(user)
    }

    async fn update_user(&self, updated_user: UpdatedUser) -> Result<User> {
        let mut state = self.state.lock();
        let id = updated_user.id;

        if let Some(username) = &updated_user.username {
            if state.users.iter().any(|u| u.id != id && u.username == *username) {
                return Err(conflict("user", "username", username));
            }
        }

        if let Some(email) = &updated_user.email {
            if state.users.iter().any(|u| u.id != id && u.email == *email) {
                return Err(conflict("user", "email", email));
            }
        }

        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(not_found("user", "id"))?;

        if let Some(username) = updated_user.username {
            user.username = username;
        }
        if let Some(email) = updated_user.email {
            user.email = email;
        }
        if let Some(role) = updated_user.role {
            user.role = role;
        }
        if let Some(first_name) = updated_user.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = updated_user.last_name {
            user.last_name = last_name;
        }
        if let Some(bio) = updated_user.bio {
            user.bio = bio;
        }

        Ok(user.clone())
    }

    async fn set_platform_flags(
        &self,
        user_id: PrimaryKey,
        staff: bool,
        superuser: bool,
    ) -> Result<User> {
        let mut state = self.state.lock();
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(not_found("user", "id"))?;

        user.staff = staff;
        user.superuser = superuser;

        Ok(user.clone())
    }

    async fn delete_user(&self, user_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();
        state.user(user_id)?;

        state.users.retain(|u| u.id != user_id);
        state.challenges.retain(|c| c.user_id != user_id);
        state.sessions.retain(|s| s.user_id != user_id);

        let review_ids: Vec<_> = state
            .reviews
            .iter()
            .filter(|r| r.author_id == user_id)
            .map(|r| r.id)
            .collect();

        state.reviews.retain(|r| r.author_id != user_id);
        state
            .comments
            .retain(|c| c.author_id != user_id && !review_ids.contains(&c.review_id));

        Ok(())
    }

    async fn create_challenge(&self, new_challenge: NewChallenge) -> Result<ChallengeData> {
        let mut state = self.state.lock();
        state.user(new_challenge.user_id)?;

        state
            .challenges
            .retain(|c| c.user_id != new_challenge.user_id || c.consumed_at.is_some());

        let challenge = ChallengeData {
            id: state.next_id(),
            user_id: new_challenge.user_id,
            code_hash: new_challenge.code_hash,
            expires_at: new_challenge.expires_at,
            consumed_at: None,
            failed_attempts: 0,
            created_at: Utc::now(),
        };

        state.challenges.push(challenge.clone());
        Ok(challenge)
    }

    async fn live_challenge(
        &self,
        user_id: PrimaryKey,
        now: DateTime<Utc>,
    ) -> Result<ChallengeData> {
        self.state
            .lock()
            .challenges
            .iter()
            .rev()
            .find(|c| c.user_id == user_id && c.is_live(now))
            .cloned()
            .ok_or(not_found("challenge", "user_id"))
    }

    async fn consume_challenge(
        &self,
        challenge_id: PrimaryKey,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.lock();
        let challenge = state
            .challenges
            .iter_mut()
            .find(|c| c.id == challenge_id)
            .ok_or(not_found("challenge", "id"))?;

        if challenge.consumed_at.is_some() {
            return Ok(false);
        }

        challenge.consumed_at = Some(now);
        Ok(true)
    }

    async fn fail_challenge(
        &self,
        challenge_id: PrimaryKey,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> Result<ChallengeData> {
        let mut state = self.state.lock();
        let challenge = state
            .challenges
            .iter_mut()
            .find(|c| c.id == challenge_id)
            .ok_or(not_found("challenge", "id"))?;

        challenge.failed_attempts += 1;

        if challenge.consumed_at.is_none() && challenge.failed_attempts >= max_attempts {
            challenge.consumed_at = Some(now);
        }

        Ok(challenge.clone())
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let state = self.state.lock();
        let session = state
            .sessions
            .iter()
            .find(|s| s.token == token)
            .ok_or(not_found("session", "token"))?;

        Ok(SessionData {
            id: session.id,
            token: session.token.clone(),
            expires_at: session.expires_at,
            user: state.user(session.user_id)?.clone(),
        })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        let mut state = self.state.lock();
        let user = state.user(new_session.user_id)?.clone();

        if state.sessions.iter().any(|s| s.token == new_session.token) {
            return Err(conflict("session", "token", &new_session.token));
        }

        let session = StoredSession {
            id: state.next_id(),
            token: new_session.token,
            user_id: new_session.user_id,
            expires_at: new_session.expires_at,
        };

        let data = SessionData {
            id: session.id,
            token: session.token.clone(),
            expires_at: session.expires_at,
            user,
        };

        state.sessions.push(session);
        Ok(data)
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        let now = Utc::now();
        self.state.lock().sessions.retain(|s| s.expires_at > now);

        Ok(())
    }

    async fn list_classifiers(
        &self,
        kind: Classifier,
        search: Option<&str>,
    ) -> Result<Vec<ClassifierData>> {
        let search = search.unwrap_or_default();
        let state = self.state.lock();

        let mut classifiers: Vec<_> = state
            .classifiers(kind)
            .iter()
            .filter(|c| c.name.contains(search))
            .cloned()
            .collect();
        classifiers.sort_by(|a, b| a.slug.cmp(&b.slug));

        Ok(classifiers)
    }

    async fn classifier_by_slug(&self, kind: Classifier, slug: &str) -> Result<ClassifierData> {
        self.state
            .lock()
            .classifiers(kind)
            .iter()
            .find(|c| c.slug == slug)
            .cloned()
            .ok_or(not_found(kind.resource(), "slug"))
    }

    async fn create_classifier(
        &self,
        kind: Classifier,
        new_classifier: NewClassifier,
    ) -> Result<ClassifierData> {
        let mut state = self.state.lock();

        if state
            .classifiers(kind)
            .iter()
            .any(|c| c.slug == new_classifier.slug)
        {
            return Err(conflict(kind.resource(), "slug", &new_classifier.slug));
        }

        let classifier = ClassifierData {
            id: state.next_id(),
            name: new_classifier.name,
            slug: new_classifier.slug,
        };

        state.classifiers_mut(kind).push(classifier.clone());
        Ok(classifier)
    }

    async fn delete_classifier(&self, kind: Classifier, slug: &str) -> Result<()> {
        let mut state = self.state.lock();
        let id = state
            .classifiers(kind)
            .iter()
            .find(|c| c.slug == slug)
            .map(|c| c.id)
            .ok_or(not_found(kind.resource(), "slug"))?;

        state.classifiers_mut(kind).retain(|c| c.id != id);

        for title in state.titles.iter_mut() {
            match kind {
                Classifier::Category if title.category_id == Some(id) => title.category_id = None,
                Classifier::Genre => title.genre_ids.retain(|g| *g != id),
                _ => {}
            }
        }

        Ok(())
    }

    async fn list_titles(&self, filter: TitleFilter) -> Result<Vec<TitleData>> {
        let state = self.state.lock();

        let titles = state
            .titles
            .iter()
            .map(|t| state.title_data(t))
            .filter(|t| {
                let genre = filter
                    .genre
                    .as_ref()
                    .map_or(true, |slug| t.genres.iter().any(|g| g.slug == *slug));
                let category = filter.category.as_ref().map_or(true, |slug| {
                    t.category.as_ref().is_some_and(|c| c.slug == *slug)
                });
                let name = filter
                    .name
                    .as_ref()
                    .map_or(true, |name| t.name.contains(name.as_str()));
                let year = filter.year.map_or(true, |year| t.year == year);

                genre && category && name && year
            })
            .collect();

        Ok(titles)
    }

    async fn title_by_id(&self, title_id: PrimaryKey) -> Result<TitleData> {
        self.state.lock().title(title_id)
    }

    async fn create_title(&self, new_title: NewTitle) -> Result<TitleData> {
        let mut state = self.state.lock();
        state.check_references(new_title.category_id, &new_title.genre_ids)?;

        let mut genre_ids = new_title.genre_ids;
        genre_ids.sort_unstable();
        genre_ids.dedup();

        let title = StoredTitle {
            id: state.next_id(),
            name: new_title.name,
            year: new_title.year,
            description: new_title.description,
            category_id: new_title.category_id,
            genre_ids,
        };

        let id = title.id;
        state.titles.push(title);
        state.title(id)
    }

    async fn update_title(&self, updated_title: UpdatedTitle) -> Result<TitleData> {
        let mut state = self.state.lock();
        state.check_references(
            updated_title.category_id.flatten(),
            updated_title.genre_ids.as_deref().unwrap_or_default(),
        )?;

        let title = state
            .titles
            .iter_mut()
            .find(|t| t.id == updated_title.id)
            .ok_or(not_found("title", "id"))?;

        if let Some(name) = updated_title.name {
            title.name = name;
        }
        if let Some(year) = updated_title.year {
            title.year = year;
        }
        if let Some(description) = updated_title.description {
            title.description = description;
        }
        if let Some(category_id) = updated_title.category_id {
            title.category_id = category_id;
        }
        if let Some(mut genre_ids) = updated_title.genre_ids {
            genre_ids.sort_unstable();
            genre_ids.dedup();
            title.genre_ids = genre_ids;
        }

        state.title(updated_title.id)
    }

    async fn delete_title(&self, title_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();
        state.title(title_id)?;

        state.titles.retain(|t| t.id != title_id);
        state.reviews.retain(|r| r.title_id != title_id);
        state.comments.retain(|c| c.title_id != title_id);

        Ok(())
    }

    async fn list_reviews(&self, title_id: PrimaryKey) -> Result<Vec<ReviewData>> {
        let state = self.state.lock();

        let mut reviews = state
            .reviews
            .iter()
            .filter(|r| r.title_id == title_id)
            .map(|r| state.review(r.id))
            .collect::<Result<Vec<_>>>()?;
        reviews.sort_by_key(|r| (r.created_at, r.id));

        Ok(reviews)
    }

    async fn review_by_id(
        &self,
        title_id: PrimaryKey,
        review_id: PrimaryKey,
    ) -> Result<ReviewData> {
        self.state
            .lock()
            .review(review_id)
            .ok()
            .filter(|r| r.title_id == title_id)
            .ok_or(not_found("review", "id"))
    }

    async fn create_review(&self, new_review: NewReview) -> Result<ReviewData> {
        let mut state = self.state.lock();
        state.title(new_review.title_id)?;
        state.user(new_review.author_id)?;

        let exists = state
            .reviews
            .iter()
            .any(|r| r.author_id == new_review.author_id && r.title_id == new_review.title_id);

        if exists {
            return Err(conflict(
                "review",
                "title",
                &new_review.title_id.to_string(),
            ));
        }

        let review = StoredReview {
            id: state.next_id(),
            title_id: new_review.title_id,
            author_id: new_review.author_id,
            text: new_review.text,
            score: new_review.score,
            created_at: new_review.created_at.unwrap_or_else(Utc::now),
        };

        let id = review.id;
        state.reviews.push(review);
        state.review(id)
    }

    async fn update_review(&self, updated_review: UpdatedReview) -> Result<ReviewData> {
        let mut state = self.state.lock();
        let review = state
            .reviews
            .iter_mut()
            .find(|r| r.id == updated_review.id)
            .ok_or(not_found("review", "id"))?;

        if let Some(text) = updated_review.text {
            review.text = text;
        }
        if let Some(score) = updated_review.score {
            review.score = score;
        }

        state.review(updated_review.id)
    }

    async fn delete_review(&self, review_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();
        state.review(review_id)?;

        state.reviews.retain(|r| r.id != review_id);
        state.comments.retain(|c| c.review_id != review_id);

        Ok(())
    }

    async fn list_comments(
        &self,
        title_id: PrimaryKey,
        review_id: PrimaryKey,
    ) -> Result<Vec<CommentData>> {
        let state = self.state.lock();

        let mut comments = state
            .comments
            .iter()
            .filter(|c| c.title_id == title_id && c.review_id == review_id)
            .map(|c| state.comment(c.id))
            .collect::<Result<Vec<_>>>()?;
        comments.sort_by_key(|c| (c.created_at, c.id));

        Ok(comments)
    }

    async fn comment_by_id(
        &self,
        title_id: PrimaryKey,
        review_id: PrimaryKey,
        comment_id: PrimaryKey,
    ) -> Result<CommentData> {
        self.state
            .lock()
            .comment(comment_id)
            .ok()
            .filter(|c| c.title_id == title_id && c.review_id == review_id)
            .ok_or(not_found("comment", "id"))
    }

    async fn create_comment(&self, new_comment: NewComment) -> Result<CommentData> {
        let mut state = self.state.lock();
        state.title(new_comment.title_id)?;
        state.review(new_comment.review_id)?;
        state.user(new_comment.author_id)?;

        let comment = StoredComment {
            id: state.next_id(),
            title_id: new_comment.title_id,
            review_id: new_comment.review_id,
            author_id: new_comment.author_id,
            text: new_comment.text,
            created_at: new_comment.created_at.unwrap_or_else(Utc::now),
        };

        let id = comment.id;
        state.comments.push(comment);
        state.comment(id)
    }

    async fn update_comment(&self, updated_comment: UpdatedComment) -> Result<CommentData> {
        let mut state = self.state.lock();
        let comment = state
            .comments
            .iter_mut()
            .find(|c| c.id == updated_comment.id)
            .ok_or(not_found("comment", "id"))?;

        if let Some(text) = updated_comment.text {
            comment.text = text;
        }

        state.comment(updated_comment.id)
    }

    async fn delete_comment(&self, comment_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();
        state.comment(comment_id)?;

        state.comments.retain(|c| c.id != comment_id);

        Ok(())
    }
}
