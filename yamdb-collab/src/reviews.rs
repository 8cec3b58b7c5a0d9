use log::info;
use yamdb_core::{Denial, Method, Policy, PrimaryKey, Score, User};

use crate::{
    CollabContext, CollabError, CollabResult, CommentData, DatabaseError, NewComment, NewReview,
    ReviewData, UpdatedComment, UpdatedReview,
};

const POLICY: Policy = Policy::AuthorOrModeratorOrAdmin;

/// Reviews of titles, and comments on those reviews.
///
/// Anyone can read, any authenticated user can write, and only the author,
/// moderators and admins can change or remove what was written.
pub struct Reviews {
    context: CollabContext,
}

#[derive(Debug, Clone)]
pub struct ReviewInput {
    pub text: String,
    pub score: i32,
}

#[derive(Debug, Clone, Default)]
pub struct ReviewPatch {
    pub text: Option<String>,
    pub score: Option<i32>,
}

impl Reviews {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Lists the reviews of a title, oldest first
    pub async fn list_reviews(&self, title_id: PrimaryKey) -> CollabResult<Vec<ReviewData>> {
        let database = &self.context.database;
        database.title_by_id(title_id).await?;

        Ok(database.list_reviews(title_id).await?)
    }

    pub async fn review(
        &self,
        title_id: PrimaryKey,
        review_id: PrimaryKey,
    ) -> CollabResult<ReviewData> {
        Ok(self
            .context
            .database
            .review_by_id(title_id, review_id)
            .await?)
    }

    /// Creates a review authored by the actor.
    /// Every user can review a title only once.
    pub async fn create_review(
        &self,
        actor: Option<&User>,
        title_id: PrimaryKey,
        input: ReviewInput,
    ) -> CollabResult<ReviewData> {
        POLICY.check(actor, Method::Post)?;
        let author = authenticated(actor)?;

        let database = &self.context.database;
        database.title_by_id(title_id).await?;

        validate_text(&input.text)?;
        let score = validate_score(input.score)?;

        let review = database
            .create_review(NewReview {
                title_id,
                author_id: author.id,
                text: input.text,
                score: score.value(),
                created_at: None,
            })
            .await
            .map_err(|e| match e {
                DatabaseError::Conflict { .. } => CollabError::validation(
                    "title",
                    "review already exists for this title by this author",
                ),
                e => e.into(),
            })?;

        info!("User {} reviewed title {}", author.id, title_id);
        Ok(review)
    }

    pub async fn update_review(
        &self,
        actor: Option<&User>,
        title_id: PrimaryKey,
        review_id: PrimaryKey,
        patch: ReviewPatch,
    ) -> CollabResult<ReviewData> {
        POLICY.check(actor, Method::Patch)?;

        let database = &self.context.database;
        let review = database.review_by_id(title_id, review_id).await?;
        POLICY.check_object(actor, Method::Patch, &review)?;

        if let Some(text) = &patch.text {
            validate_text(text)?;
        }

        let score = patch.score.map(validate_score).transpose()?;

        Ok(database
            .update_review(UpdatedReview {
                id: review.id,
                text: patch.text,
                score: score.map(|s| s.value()),
            })
            .await?)
    }

    pub async fn delete_review(
        &self,
        actor: Option<&User>,
        title_id: PrimaryKey,
        review_id: PrimaryKey,
    ) -> CollabResult<()> {
        POLICY.check(actor, Method::Delete)?;

        let database = &self.context.database;
        let review = database.review_by_id(title_id, review_id).await?;
        POLICY.check_object(actor, Method::Delete, &review)?;

        database.delete_review(review.id).await?;
        Ok(())
    }

    /// Lists the comments of a review, oldest first
    pub async fn list_comments(
        &self,
        title_id: PrimaryKey,
        review_id: PrimaryKey,
    ) -> CollabResult<Vec<CommentData>> {
        let database = &self.context.database;
        database.title_by_id(title_id).await?;
        database.review_by_id(title_id, review_id).await?;

        Ok(database.list_comments(title_id, review_id).await?)
    }

    pub async fn comment(
        &self,
        title_id: PrimaryKey,
        review_id: PrimaryKey,
        comment_id: PrimaryKey,
    ) -> CollabResult<CommentData> {
        Ok(self
            .context
            .database
            .comment_by_id(title_id, review_id, comment_id)
            .await?)
    }

    pub async fn create_comment(
        &self,
        actor: Option<&User>,
        title_id: PrimaryKey,
        review_id: PrimaryKey,
        text: String,
    ) -> CollabResult<CommentData> {
        POLICY.check(actor, Method::Post)?;
        let author = authenticated(actor)?;

        let database = &self.context.database;
        database.title_by_id(title_id).await?;
        database.review_by_id(title_id, review_id).await?;

        validate_text(&text)?;

        Ok(database
            .create_comment(NewComment {
                title_id,
                review_id,
                author_id: author.id,
                text,
                created_at: None,
            })
            .await?)
    }

    pub async fn update_comment(
        &self,
        actor: Option<&User>,
        title_id: PrimaryKey,
        review_id: PrimaryKey,
        comment_id: PrimaryKey,
        text: Option<String>,
    ) -> CollabResult<CommentData> {
        POLICY.check(actor, Method::Patch)?;

        let database = &self.context.database;
        let comment = database
            .comment_by_id(title_id, review_id, comment_id)
            .await?;
        POLICY.check_object(actor, Method::Patch, &comment)?;

        if let Some(text) = &text {
            validate_text(text)?;
        }

        Ok(database
            .update_comment(UpdatedComment {
                id: comment.id,
                text,
            })
            .await?)
    }

    pub async fn delete_comment(
        &self,
        actor: Option<&User>,
        title_id: PrimaryKey,
        review_id: PrimaryKey,
        comment_id: PrimaryKey,
    ) -> CollabResult<()> {
        POLICY.check(actor, Method::Delete)?;

        let database = &self.context.database;
        let comment = database
            .comment_by_id(title_id, review_id, comment_id)
            .await?;
        POLICY.check_object(actor, Method::Delete, &comment)?;

        database.delete_comment(comment.id).await?;
        Ok(())
    }
}

fn authenticated(actor: Option<&User>) -> Result<&User, Denial> {
    actor.ok_or(Denial::AuthenticationRequired)
}

fn validate_text(text: &str) -> CollabResult<()> {
    if text.trim().is_empty() {
        return Err(CollabError::validation("text", "This field may not be blank"));
    }

    Ok(())
}

fn validate_score(score: i32) -> CollabResult<Score> {
    Score::new(score).map_err(|e| CollabError::validation("score", e.to_string()))
}

#[cfg(test)]
mod test {
    use yamdb_core::Role;

    use super::*;
    use crate::{
        test::{test_collab, test_user},
        Collab, TitleInput,
    };

    async fn test_title(collab: &Collab, admin: &User, name: &str) -> PrimaryKey {
        collab
            .catalog
            .create_title(
                Some(admin),
                TitleInput {
                    name: name.to_string(),
                    year: 1999,
                    description: None,
                    category: None,
                    genres: vec![],
                },
            )
            .await
            .unwrap()
            .id
    }

    fn review(text: &str, score: i32) -> ReviewInput {
        ReviewInput {
            text: text.to_string(),
            score,
        }
    }

    #[tokio::test]
    async fn test_one_review_per_author_and_title() {
        let (collab, database, _) = test_collab();
        let admin = test_user(&database, "admin", Role::Admin).await;
        let author = test_user(&database, "author", Role::User).await;
        let title = test_title(&collab, &admin, "Matrix").await;
        let other_title = test_title(&collab, &admin, "Heat").await;

        collab
            .reviews
            .create_review(Some(&author), title, review("Great", 9))
            .await
            .unwrap();

        let second = collab
            .reviews
            .create_review(Some(&author), title, review("Changed my mind", 2))
            .await;
        assert!(matches!(
            second,
            Err(CollabError::Validation { field: "title", .. })
        ));

        // Other titles and other authors are fine
        collab
            .reviews
            .create_review(Some(&author), other_title, review("Fine", 6))
            .await
            .unwrap();
        collab
            .reviews
            .create_review(Some(&admin), title, review("Agreed", 8))
            .await
            .unwrap();

        assert_eq!(collab.reviews.list_reviews(title).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_reviews() {
        let (collab, database, _) = test_collab();
        let admin = test_user(&database, "admin", Role::Admin).await;
        let author = test_user(&database, "author", Role::User).await;
        let title = test_title(&collab, &admin, "Matrix").await;

        let (first, second) = tokio::join!(
            collab
                .reviews
                .create_review(Some(&author), title, review("One", 9)),
            collab
                .reviews
                .create_review(Some(&author), title, review("Two", 9)),
        );

        assert!(first.is_ok() != second.is_ok(), "exactly one should succeed");
        assert_eq!(collab.reviews.list_reviews(title).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_review_validation() {
        let (collab, database, _) = test_collab();
        let admin = test_user(&database, "admin", Role::Admin).await;
        let author = test_user(&database, "author", Role::User).await;
        let title = test_title(&collab, &admin, "Matrix").await;

        for score in [0, 11] {
            let result = collab
                .reviews
                .create_review(Some(&author), title, review("Text", score))
                .await;
            assert!(matches!(
                result,
                Err(CollabError::Validation { field: "score", .. })
            ));
        }

        let anonymous = collab
            .reviews
            .create_review(None, title, review("Text", 5))
            .await;
        assert!(matches!(
            anonymous,
            Err(CollabError::Denied(Denial::AuthenticationRequired))
        ));

        let missing_title = collab
            .reviews
            .create_review(Some(&author), 404, review("Text", 5))
            .await;
        assert!(matches!(
            missing_title,
            Err(CollabError::Db(DatabaseError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_rating_follows_reviews() {
        let (collab, database, _) = test_collab();
        let admin = test_user(&database, "admin", Role::Admin).await;
        let first = test_user(&database, "first", Role::User).await;
        let second = test_user(&database, "second", Role::User).await;
        let title = test_title(&collab, &admin, "Matrix").await;

        assert_eq!(collab.catalog.title(title).await.unwrap().rating, None);

        collab
            .reviews
            .create_review(Some(&first), title, review("Good", 8))
            .await
            .unwrap();
        let low = collab
            .reviews
            .create_review(Some(&second), title, review("Meh", 4))
            .await
            .unwrap();

        assert_eq!(collab.catalog.title(title).await.unwrap().rating, Some(6.));

        collab
            .reviews
            .delete_review(Some(&second), title, low.id)
            .await
            .unwrap();
        assert_eq!(collab.catalog.title(title).await.unwrap().rating, Some(8.));
    }

    #[tokio::test]
    async fn test_only_owner_or_staff_can_modify() {
        let (collab, database, _) = test_collab();
        let admin = test_user(&database, "admin", Role::Admin).await;
        let author = test_user(&database, "author", Role::User).await;
        let stranger = test_user(&database, "stranger", Role::User).await;
        let moderator = test_user(&database, "moderator", Role::Moderator).await;
        let title = test_title(&collab, &admin, "Matrix").await;

        let created = collab
            .reviews
            .create_review(Some(&author), title, review("Original", 7))
            .await
            .unwrap();

        let patch = ReviewPatch {
            text: Some("Vandalized".to_string()),
            score: Some(1),
        };

        let denied = collab
            .reviews
            .update_review(Some(&stranger), title, created.id, patch.clone())
            .await;
        assert!(matches!(
            denied,
            Err(CollabError::Denied(Denial::PermissionDenied))
        ));

        let denied = collab
            .reviews
            .delete_review(Some(&stranger), title, created.id)
            .await;
        assert!(matches!(
            denied,
            Err(CollabError::Denied(Denial::PermissionDenied))
        ));

        let unchanged = collab.reviews.review(title, created.id).await.unwrap();
        assert_eq!(unchanged.text, "Original");
        assert_eq!(unchanged.score, 7);

        let edited = collab
            .reviews
            .update_review(
                Some(&author),
                title,
                created.id,
                ReviewPatch {
                    score: Some(8),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.score, 8);
        assert_eq!(edited.text, "Original");
        assert_eq!(edited.author, "author");

        collab
            .reviews
            .update_review(Some(&moderator), title, created.id, patch)
            .await
            .unwrap();

        collab
            .reviews
            .delete_review(Some(&admin), title, created.id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_comments() {
        let (collab, database, _) = test_collab();
        let admin = test_user(&database, "admin", Role::Admin).await;
        let author = test_user(&database, "author", Role::User).await;
        let stranger = test_user(&database, "stranger", Role::User).await;
        let title = test_title(&collab, &admin, "Matrix").await;
        let other_title = test_title(&collab, &admin, "Heat").await;

        let created = collab
            .reviews
            .create_review(Some(&author), title, review("Great", 9))
            .await
            .unwrap();

        let blank = collab
            .reviews
            .create_comment(Some(&stranger), title, created.id, "   ".to_string())
            .await;
        assert!(matches!(
            blank,
            Err(CollabError::Validation { field: "text", .. })
        ));

        // The review must belong to the title
        let mismatched = collab
            .reviews
            .create_comment(Some(&stranger), other_title, created.id, "Hi".to_string())
            .await;
        assert!(matches!(
            mismatched,
            Err(CollabError::Db(DatabaseError::NotFound { .. }))
        ));

        for text in ["First", "Second", "Third"] {
            collab
                .reviews
                .create_comment(Some(&stranger), title, created.id, text.to_string())
                .await
                .unwrap();
        }

        let comments = collab.reviews.list_comments(title, created.id).await.unwrap();
        let texts: Vec<_> = comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["First", "Second", "Third"], "oldest first");
        assert!(comments.iter().all(|c| c.author == "stranger"));

        let denied = collab
            .reviews
            .update_comment(
                Some(&author),
                title,
                created.id,
                comments[0].id,
                Some("Edited".to_string()),
            )
            .await;
        assert!(matches!(
            denied,
            Err(CollabError::Denied(Denial::PermissionDenied))
        ));

        collab
            .reviews
            .update_comment(
                Some(&stranger),
                title,
                created.id,
                comments[0].id,
                Some("Edited".to_string()),
            )
            .await
            .unwrap();

        collab
            .reviews
            .delete_comment(Some(&admin), title, created.id, comments[1].id)
            .await
            .unwrap();

        let remaining = collab.reviews.list_comments(title, created.id).await.unwrap();
        let texts: Vec<_> = remaining.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["Edited", "Third"]);
    }

    #[tokio::test]
    async fn test_listing_requires_parents() {
        let (collab, database, _) = test_collab();
        let admin = test_user(&database, "admin", Role::Admin).await;
        let title = test_title(&collab, &admin, "Matrix").await;

        assert!(collab.reviews.list_reviews(title).await.unwrap().is_empty());
        assert!(matches!(
            collab.reviews.list_reviews(404).await,
            Err(CollabError::Db(DatabaseError::NotFound { .. }))
        ));
        assert!(matches!(
            collab.reviews.list_comments(title, 404).await,
            Err(CollabError::Db(DatabaseError::NotFound { .. }))
        ));
    }
}
