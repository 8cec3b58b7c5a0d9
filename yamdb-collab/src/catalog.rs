use chrono::{Datelike, Utc};
use lazy_static::lazy_static;
use log::info;
use regex::Regex;
use yamdb_core::{Method, Policy, PrimaryKey, User};

use crate::{
    Classifier, ClassifierData, CollabContext, CollabError, CollabResult, DatabaseError,
    NewClassifier, NewTitle, TitleData, TitleFilter, UpdatedTitle,
};

lazy_static! {
    static ref SLUG_REGEX: Regex = Regex::new(r"^[-a-zA-Z0-9_]+$").unwrap();
}

const MAX_NAME_LENGTH: usize = 256;
const MAX_SLUG_LENGTH: usize = 50;

/// Categories, genres, and the titles classified by them.
/// Everyone can read the catalog, only admins can change it.
pub struct Catalog {
    context: CollabContext,
}

/// A new title. Category and genres are referenced by slug.
#[derive(Debug, Clone)]
pub struct TitleInput {
    pub name: String,
    pub year: i32,
    pub description: Option<String>,
    pub category: Option<String>,
    pub genres: Vec<String>,
}

/// A partial update of a title. `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default)]
pub struct TitlePatch {
    pub name: Option<String>,
    pub year: Option<i32>,
    pub description: Option<Option<String>>,
    pub category: Option<Option<String>>,
    pub genres: Option<Vec<String>>,
}

impl Catalog {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    pub async fn list_classifiers(
        &self,
        kind: Classifier,
        search: Option<&str>,
    ) -> CollabResult<Vec<ClassifierData>> {
        Ok(self
            .context
            .database
            .list_classifiers(kind, search)
            .await?)
    }

    pub async fn create_classifier(
        &self,
        actor: Option<&User>,
        kind: Classifier,
        new_classifier: NewClassifier,
    ) -> CollabResult<ClassifierData> {
        Policy::AdminOrReadOnly.check(actor, Method::Post)?;

        validate_name(&new_classifier.name)?;
        validate_slug(&new_classifier.slug)?;

        let classifier = self
            .context
            .database
            .create_classifier(kind, new_classifier)
            .await?;

        info!("Created {} {}", kind.resource(), classifier.slug);
        Ok(classifier)
    }

    pub async fn delete_classifier(
        &self,
        actor: Option<&User>,
        kind: Classifier,
        slug: &str,
    ) -> CollabResult<()> {
        Policy::AdminOrReadOnly.check(actor, Method::Delete)?;

        self.context.database.delete_classifier(kind, slug).await?;
        Ok(())
    }

    pub async fn list_titles(&self, filter: TitleFilter) -> CollabResult<Vec<TitleData>> {
        Ok(self.context.database.list_titles(filter).await?)
    }

    pub async fn title(&self, title_id: PrimaryKey) -> CollabResult<TitleData> {
        Ok(self.context.database.title_by_id(title_id).await?)
    }

    pub async fn create_title(
        &self,
        actor: Option<&User>,
        input: TitleInput,
    ) -> CollabResult<TitleData> {
        Policy::AdminOrReadOnly.check(actor, Method::Post)?;

        validate_name(&input.name)?;
        validate_year(input.year)?;

        let category_id = match &input.category {
            Some(slug) => Some(self.resolve(Classifier::Category, slug).await?),
            None => None,
        };
        let genre_ids = self.resolve_all(Classifier::Genre, &input.genres).await?;

        let title = self
            .context
            .database
            .create_title(NewTitle {
                name: input.name,
                year: input.year,
                description: input.description,
                category_id,
                genre_ids,
            })
            .await?;

        info!("Created title {}", title.id);
        Ok(title)
    }

    pub async fn update_title(
        &self,
        actor: Option<&User>,
        title_id: PrimaryKey,
        patch: TitlePatch,
    ) -> CollabResult<TitleData> {
        Policy::AdminOrReadOnly.check(actor, Method::Patch)?;

        if let Some(name) = &patch.name {
            validate_name(name)?;
        }

        if let Some(year) = patch.year {
            validate_year(year)?;
        }

        let category_id = match &patch.category {
            Some(Some(slug)) => Some(Some(self.resolve(Classifier::Category, slug).await?)),
            Some(None) => Some(None),
            None => None,
        };

        let genre_ids = match &patch.genres {
            Some(slugs) => Some(self.resolve_all(Classifier::Genre, slugs).await?),
            None => None,
        };

        Ok(self
            .context
            .database
            .update_title(UpdatedTitle {
                id: title_id,
                name: patch.name,
                year: patch.year,
                description: patch.description,
                category_id,
                genre_ids,
            })
            .await?)
    }

    pub async fn delete_title(&self, actor: Option<&User>, title_id: PrimaryKey) -> CollabResult<()> {
        Policy::AdminOrReadOnly.check(actor, Method::Delete)?;

        self.context.database.delete_title(title_id).await?;
        Ok(())
    }

    /// Turns a slug into an id. An unknown slug is invalid input, not a missing resource.
    async fn resolve(&self, kind: Classifier, slug: &str) -> CollabResult<PrimaryKey> {
        let field = match kind {
            Classifier::Category => "category",
            Classifier::Genre => "genre",
        };

        match self.context.database.classifier_by_slug(kind, slug).await {
            Ok(classifier) => Ok(classifier.id),
            Err(DatabaseError::NotFound { .. }) => Err(CollabError::validation(
                field,
                format!("{} with slug {} does not exist", kind.resource(), slug),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn resolve_all(&self, kind: Classifier, slugs: &[String]) -> CollabResult<Vec<PrimaryKey>> {
        let mut ids = Vec::with_capacity(slugs.len());

        for slug in slugs {
            ids.push(self.resolve(kind, slug).await?);
        }

        Ok(ids)
    }
}

fn validate_name(name: &str) -> CollabResult<()> {
    if name.trim().is_empty() || name.chars().count() > MAX_NAME_LENGTH {
        return Err(CollabError::validation(
            "name",
            format!("Name must be between 1 and {MAX_NAME_LENGTH} characters"),
        ));
    }

    Ok(())
}

fn validate_slug(slug: &str) -> CollabResult<()> {
    if slug.len() > MAX_SLUG_LENGTH || !SLUG_REGEX.is_match(slug) {
        return Err(CollabError::validation(
            "slug",
            format!(
                "Slug must be at most {MAX_SLUG_LENGTH} letters, numbers, underscores or hyphens"
            ),
        ));
    }

    Ok(())
}

fn validate_year(year: i32) -> CollabResult<()> {
    let current_year = Utc::now().year();

    if !(0..=current_year).contains(&year) {
        return Err(CollabError::validation(
            "year",
            format!("Year must be between 0 and {current_year}"),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use yamdb_core::Denial;

    use super::*;
    use crate::test::{test_collab, test_user};

    fn classifier(name: &str, slug: &str) -> NewClassifier {
        NewClassifier {
            name: name.to_string(),
            slug: slug.to_string(),
        }
    }

    fn title_input(name: &str, year: i32, category: Option<&str>, genres: &[&str]) -> TitleInput {
        TitleInput {
            name: name.to_string(),
            year,
            description: None,
            category: category.map(String::from),
            genres: genres.iter().map(|g| g.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_only_admins_write() {
        let (collab, database, _) = test_collab();
        let user = test_user(&database, "user", yamdb_core::Role::User).await;

        let anonymous = collab
            .catalog
            .create_classifier(None, Classifier::Genre, classifier("Drama", "drama"))
            .await;
        assert!(matches!(
            anonymous,
            Err(CollabError::Denied(Denial::AuthenticationRequired))
        ));

        let regular = collab
            .catalog
            .create_classifier(Some(&user), Classifier::Genre, classifier("Drama", "drama"))
            .await;
        assert!(matches!(
            regular,
            Err(CollabError::Denied(Denial::PermissionDenied))
        ));

        let regular = collab
            .catalog
            .create_title(Some(&user), title_input("Dune", 1965, None, &[]))
            .await;
        assert!(matches!(
            regular,
            Err(CollabError::Denied(Denial::PermissionDenied))
        ));
    }

    #[tokio::test]
    async fn test_classifiers() {
        let (collab, database, _) = test_collab();
        let admin = test_user(&database, "admin", yamdb_core::Role::Admin).await;
        let catalog = &collab.catalog;

        for (name, slug) in [("Sci-fi", "sci-fi"), ("Drama", "drama"), ("Comedy", "comedy")] {
            catalog
                .create_classifier(Some(&admin), Classifier::Genre, classifier(name, slug))
                .await
                .unwrap();
        }

        let slugs: Vec<_> = catalog
            .list_classifiers(Classifier::Genre, None)
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.slug)
            .collect();
        assert_eq!(slugs, ["comedy", "drama", "sci-fi"], "ordered by slug");

        let found = catalog
            .list_classifiers(Classifier::Genre, Some("Dra"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        // Genres and categories are separate
        assert!(catalog
            .list_classifiers(Classifier::Category, None)
            .await
            .unwrap()
            .is_empty());

        let duplicate = catalog
            .create_classifier(Some(&admin), Classifier::Genre, classifier("Drama 2", "drama"))
            .await;
        assert!(matches!(
            duplicate,
            Err(CollabError::Db(DatabaseError::Conflict { .. }))
        ));

        let invalid = catalog
            .create_classifier(Some(&admin), Classifier::Genre, classifier("Bad", "no spaces"))
            .await;
        assert!(matches!(
            invalid,
            Err(CollabError::Validation { field: "slug", .. })
        ));

        catalog
            .delete_classifier(Some(&admin), Classifier::Genre, "drama")
            .await
            .unwrap();
        let missing = catalog
            .delete_classifier(Some(&admin), Classifier::Genre, "drama")
            .await;
        assert!(matches!(
            missing,
            Err(CollabError::Db(DatabaseError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_titles() {
        let (collab, database, _) = test_collab();
        let admin = test_user(&database, "admin", yamdb_core::Role::Admin).await;
        let catalog = &collab.catalog;

        catalog
            .create_classifier(Some(&admin), Classifier::Category, classifier("Books", "books"))
            .await
            .unwrap();
        catalog
            .create_classifier(Some(&admin), Classifier::Category, classifier("Films", "films"))
            .await
            .unwrap();
        catalog
            .create_classifier(Some(&admin), Classifier::Genre, classifier("Sci-fi", "sci-fi"))
            .await
            .unwrap();

        let dune = catalog
            .create_title(
                Some(&admin),
                title_input("Dune", 1965, Some("books"), &["sci-fi"]),
            )
            .await
            .unwrap();
        assert_eq!(dune.category.as_ref().unwrap().slug, "books");
        assert_eq!(dune.genres.len(), 1);
        assert_eq!(dune.rating, None);

        catalog
            .create_title(Some(&admin), title_input("Dune", 2021, Some("films"), &["sci-fi"]))
            .await
            .unwrap();
        catalog
            .create_title(Some(&admin), title_input("Heat", 1995, Some("films"), &[]))
            .await
            .unwrap();

        let filtered = move |filter: TitleFilter| async move {
            catalog
                .list_titles(filter)
                .await
                .unwrap()
                .into_iter()
                .map(|t| (t.name, t.year))
                .collect::<Vec<_>>()
        };

        let by_genre = filtered(TitleFilter {
            genre: Some("sci-fi".to_string()),
            ..Default::default()
        })
        .await;
        assert_eq!(by_genre, [("Dune".to_string(), 1965), ("Dune".to_string(), 2021)]);

        let by_category_and_name = filtered(TitleFilter {
            category: Some("films".to_string()),
            name: Some("un".to_string()),
            ..Default::default()
        })
        .await;
        assert_eq!(by_category_and_name, [("Dune".to_string(), 2021)]);

        let by_year = filtered(TitleFilter {
            year: Some(1995),
            ..Default::default()
        })
        .await;
        assert_eq!(by_year, [("Heat".to_string(), 1995)]);

        // Deleting the category keeps the title
        catalog
            .delete_classifier(Some(&admin), Classifier::Category, "books")
            .await
            .unwrap();
        assert!(catalog.title(dune.id).await.unwrap().category.is_none());

        let updated = catalog
            .update_title(
                Some(&admin),
                dune.id,
                TitlePatch {
                    category: Some(Some("films".to_string())),
                    genres: Some(vec![]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.category.unwrap().slug, "films");
        assert!(updated.genres.is_empty());
        assert_eq!(updated.name, "Dune");
    }

    #[tokio::test]
    async fn test_repeated_genres_are_merged() {
        let (collab, database, _) = test_collab();
        let admin = test_user(&database, "admin", yamdb_core::Role::Admin).await;
        let catalog = &collab.catalog;

        for (name, slug) in [("Drama", "drama"), ("Crime", "crime")] {
            catalog
                .create_classifier(Some(&admin), Classifier::Genre, classifier(name, slug))
                .await
                .unwrap();
        }

        let heat = catalog
            .create_title(
                Some(&admin),
                title_input("Heat", 1995, None, &["crime", "crime"]),
            )
            .await
            .unwrap();
        assert_eq!(heat.genres.len(), 1);

        let updated = catalog
            .update_title(
                Some(&admin),
                heat.id,
                TitlePatch {
                    genres: Some(vec![
                        "drama".to_string(),
                        "crime".to_string(),
                        "drama".to_string(),
                    ]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let mut slugs: Vec<_> = updated.genres.iter().map(|g| g.slug.as_str()).collect();
        slugs.sort_unstable();
        assert_eq!(slugs, ["crime", "drama"]);
    }

    #[tokio::test]
    async fn test_title_validation() {
        let (collab, database, _) = test_collab();
        let admin = test_user(&database, "admin", yamdb_core::Role::Admin).await;

        let future = collab
            .catalog
            .create_title(Some(&admin), title_input("Later", Utc::now().year() + 1, None, &[]))
            .await;
        assert!(matches!(
            future,
            Err(CollabError::Validation { field: "year", .. })
        ));

        let unknown_genre = collab
            .catalog
            .create_title(Some(&admin), title_input("Dune", 1965, None, &["nope"]))
            .await;
        assert!(matches!(
            unknown_genre,
            Err(CollabError::Validation { field: "genre", .. })
        ));

        let missing = collab.catalog.title(404).await;
        assert!(matches!(
            missing,
            Err(CollabError::Db(DatabaseError::NotFound { .. }))
        ));
    }
}
