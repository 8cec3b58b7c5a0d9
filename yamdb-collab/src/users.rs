use lazy_static::lazy_static;
use log::info;
use regex::Regex;
use yamdb_core::{Denial, Method, Policy, Role, User};

use crate::{util::random_string, CollabContext, CollabError, CollabResult, NewUser, UpdatedUser};

lazy_static! {
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[\w.@+-]+$").unwrap();
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

const MAX_USERNAME_LENGTH: usize = 150;
const MAX_EMAIL_LENGTH: usize = 254;
const MAX_NAME_LENGTH: usize = 150;
const MAX_BIO_LENGTH: usize = 200;

/// Reserved for the profile of the requesting user
const RESERVED_USERNAME: &str = "me";

const DERIVED_SUFFIX_LENGTH: usize = 8;

/// User administration, and the profile of the requesting user
pub struct Users {
    context: CollabContext,
}

/// Changes to a profile. The role can only be changed by admins.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
}

impl Users {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    pub async fn list(&self, actor: Option<&User>, search: Option<&str>) -> CollabResult<Vec<User>> {
        Policy::AdminOnly.check(actor, Method::Get)?;

        Ok(self.context.database.list_users(search).await?)
    }

    pub async fn create(&self, actor: Option<&User>, new_user: NewUser) -> CollabResult<User> {
        Policy::AdminOnly.check(actor, Method::Post)?;

        validate_username(&new_user.username)?;
        validate_email(&new_user.email)?;
        validate_profile(
            Some(&new_user.first_name),
            Some(&new_user.last_name),
            Some(&new_user.bio),
        )?;

        let user = self.context.database.create_user(new_user).await?;

        info!("Created user {} ({})", user.id, user.username);
        Ok(user)
    }

    pub async fn by_username(&self, actor: Option<&User>, username: &str) -> CollabResult<User> {
        Policy::AdminOnly.check(actor, Method::Get)?;

        Ok(self.context.database.user_by_username(username).await?)
    }

    /// Updates any user, including their role
    pub async fn update(
        &self,
        actor: Option<&User>,
        username: &str,
        patch: UserPatch,
        role: Option<Role>,
    ) -> CollabResult<User> {
        Policy::AdminOnly.check(actor, Method::Patch)?;

        let database = &self.context.database;
        let user = database.user_by_username(username).await?;

        self.apply(&user, patch, role).await
    }

    pub async fn delete(&self, actor: Option<&User>, username: &str) -> CollabResult<()> {
        Policy::AdminOnly.check(actor, Method::Delete)?;

        let database = &self.context.database;
        let user = database.user_by_username(username).await?;
        database.delete_user(user.id).await?;

        info!("Deleted user {} ({})", user.id, user.username);
        Ok(())
    }

    /// The profile of the requesting user, as currently stored
    pub async fn me(&self, actor: Option<&User>) -> CollabResult<User> {
        let actor = actor.ok_or(Denial::AuthenticationRequired)?;

        Ok(self.context.database.user_by_id(actor.id).await?)
    }

    pub async fn update_me(&self, actor: Option<&User>, patch: UserPatch) -> CollabResult<User> {
        let actor = actor.ok_or(Denial::AuthenticationRequired)?;

        self.apply(actor, patch, None).await
    }

    async fn apply(
        &self,
        user: &User,
        patch: UserPatch,
        role: Option<Role>,
    ) -> CollabResult<User> {
        if let Some(username) = &patch.username {
            validate_username(username)?;
        }

        if let Some(email) = &patch.email {
            validate_email(email)?;
        }

        validate_profile(
            patch.first_name.as_deref(),
            patch.last_name.as_deref(),
            patch.bio.as_deref(),
        )?;

        let updated = self
            .context
            .database
            .update_user(UpdatedUser {
                id: user.id,
                username: patch.username,
                email: patch.email,
                role,
                first_name: patch.first_name,
                last_name: patch.last_name,
                bio: patch.bio,
            })
            .await?;

        if role.is_some_and(|r| r != user.role) {
            info!("User {} is now {}", updated.id, updated.role);
        }

        Ok(updated)
    }
}

fn validate_username(username: &str) -> CollabResult<()> {
    if username.is_empty() || username.len() > MAX_USERNAME_LENGTH {
        return Err(CollabError::validation(
            "username",
            format!("Username must be between 1 and {MAX_USERNAME_LENGTH} characters"),
        ));
    }

    if !USERNAME_REGEX.is_match(username) {
        return Err(CollabError::validation(
            "username",
            "Username may contain only letters, digits and @/./+/-/_",
        ));
    }

    if username == RESERVED_USERNAME {
        return Err(CollabError::validation(
            "username",
            format!("\"{RESERVED_USERNAME}\" can't be used as a username"),
        ));
    }

    Ok(())
}

/// The username of an account created from an email.
///
/// The email itself is used when it is a valid username and `unique` is not asked for.
/// Otherwise the local part is reduced to allowed characters and cut short,
/// and a random suffix is added.
pub(crate) fn username_for_email(email: &str, unique: bool) -> String {
    if !unique && validate_username(email).is_ok() {
        return email.to_string();
    }

    let local = email.split('@').next().unwrap_or_default();
    let mut base: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-' | '_'))
        .take(MAX_USERNAME_LENGTH - DERIVED_SUFFIX_LENGTH - 1)
        .collect();

    if base.is_empty() {
        base.push_str("user");
    }

    format!("{base}-{}", random_string(DERIVED_SUFFIX_LENGTH))
}

fn validate_email(email: &str) -> CollabResult<()> {
    if email.len() > MAX_EMAIL_LENGTH || !EMAIL_REGEX.is_match(email) {
        return Err(CollabError::validation("email", "Enter a valid email address"));
    }

    Ok(())
}

fn validate_profile(
    first_name: Option<&str>,
    last_name: Option<&str>,
    bio: Option<&str>,
) -> CollabResult<()> {
    for (field, value) in [("first_name", first_name), ("last_name", last_name)] {
        if value.is_some_and(|v| v.chars().count() > MAX_NAME_LENGTH) {
            return Err(CollabError::validation(
                field,
                format!("Ensure this field has no more than {MAX_NAME_LENGTH} characters"),
            ));
        }
    }

    if bio.is_some_and(|b| b.chars().count() > MAX_BIO_LENGTH) {
        return Err(CollabError::validation(
            "bio",
            format!("Ensure this field has no more than {MAX_BIO_LENGTH} characters"),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        test::{test_collab, test_user},
        Database, DatabaseError,
    };

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: format!("{username}@x.com"),
            role: Role::User,
            first_name: String::new(),
            last_name: String::new(),
            bio: String::new(),
        }
    }

    #[test]
    fn test_username_for_email() {
        assert_eq!(username_for_email("a.b+c@x.com", false), "a.b+c@x.com");

        let long = format!("{}@x.com", "a".repeat(200));
        let username = username_for_email(&long, false);
        assert_eq!(username.len(), MAX_USERNAME_LENGTH);
        assert!(validate_username(&username).is_ok());
        assert!(username.starts_with("aaaa"));

        let odd = username_for_email("o'brien!@x.com", false);
        assert!(odd.starts_with("obrien-"));
        assert!(validate_username(&odd).is_ok());

        let unique = username_for_email("a@x.com", true);
        assert!(unique.starts_with("a-"));
        assert_ne!(unique, username_for_email("a@x.com", true));
    }

    #[tokio::test]
    async fn test_administration_is_admin_only() {
        let (collab, database, _) = test_collab();
        let admin = test_user(&database, "admin", Role::Admin).await;
        let moderator = test_user(&database, "moderator", Role::Moderator).await;
        let staff = database.create_user(new_user("staff")).await.unwrap();
        let staff = database.set_platform_flags(staff.id, true, false).await.unwrap();

        assert!(matches!(
            collab.users.list(None, None).await,
            Err(CollabError::Denied(Denial::AuthenticationRequired))
        ));
        assert!(matches!(
            collab.users.list(Some(&moderator), None).await,
            Err(CollabError::Denied(Denial::PermissionDenied))
        ));
        assert!(matches!(
            collab.users.by_username(Some(&moderator), "admin").await,
            Err(CollabError::Denied(Denial::PermissionDenied))
        ));

        assert_eq!(collab.users.list(Some(&admin), None).await.unwrap().len(), 3);
        assert_eq!(collab.users.list(Some(&staff), None).await.unwrap().len(), 3);

        let found = collab
            .users
            .list(Some(&admin), Some("mod"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].username, "moderator");
    }

    #[tokio::test]
    async fn test_create_update_delete() {
        let (collab, database, _) = test_collab();
        let admin = test_user(&database, "admin", Role::Admin).await;

        let created = collab
            .users
            .create(Some(&admin), new_user("critic"))
            .await
            .unwrap();
        assert_eq!(created.role, Role::User);

        let duplicate = collab.users.create(Some(&admin), new_user("critic")).await;
        assert!(matches!(
            duplicate,
            Err(CollabError::Db(DatabaseError::Conflict { .. }))
        ));

        let promoted = collab
            .users
            .update(
                Some(&admin),
                "critic",
                UserPatch {
                    bio: Some("Watches everything".to_string()),
                    ..Default::default()
                },
                Some(Role::Moderator),
            )
            .await
            .unwrap();
        assert_eq!(promoted.role, Role::Moderator);
        assert_eq!(promoted.bio, "Watches everything");
        assert!(promoted.is_moderator());

        let taken_email = collab
            .users
            .update(
                Some(&admin),
                "critic",
                UserPatch {
                    email: Some(admin.email.clone()),
                    ..Default::default()
                },
                None,
            )
            .await;
        assert!(matches!(
            taken_email,
            Err(CollabError::Db(DatabaseError::Conflict { field: "email", .. }))
        ));

        collab.users.delete(Some(&admin), "critic").await.unwrap();
        assert!(matches!(
            collab.users.by_username(Some(&admin), "critic").await,
            Err(CollabError::Db(DatabaseError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_username_rules() {
        let (collab, database, _) = test_collab();
        let admin = test_user(&database, "admin", Role::Admin).await;

        for username in ["me", "", "has space", &"x".repeat(151)] {
            let result = collab.users.create(Some(&admin), new_user(username)).await;
            assert!(
                matches!(result, Err(CollabError::Validation { field: "username", .. })),
                "{username:?} should be rejected"
            );
        }

        let mut bad_email = new_user("critic");
        bad_email.email = "not-an-email".to_string();
        assert!(matches!(
            collab.users.create(Some(&admin), bad_email).await,
            Err(CollabError::Validation { field: "email", .. })
        ));
    }

    #[tokio::test]
    async fn test_me() {
        let (collab, database, _) = test_collab();
        let critic = test_user(&database, "critic", Role::User).await;

        assert!(matches!(
            collab.users.me(None).await,
            Err(CollabError::Denied(Denial::AuthenticationRequired))
        ));

        let me = collab.users.me(Some(&critic)).await.unwrap();
        assert_eq!(me, critic);

        let updated = collab
            .users
            .update_me(
                Some(&critic),
                UserPatch {
                    first_name: Some("Roger".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.first_name, "Roger");
        assert_eq!(updated.role, Role::User);

        let too_long = collab
            .users
            .update_me(
                Some(&critic),
                UserPatch {
                    bio: Some("x".repeat(201)),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(
            too_long,
            Err(CollabError::Validation { field: "bio", .. })
        ));
    }
}
