use thiserror::Error;

use crate::{PrimaryKey, User};

/// The method of an incoming request, as far as access control is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Options,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Safe methods never mutate state.
    pub fn is_safe(&self) -> bool {
        matches!(self, Method::Get | Method::Head | Method::Options)
    }
}

/// Why access was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Denial {
    /// The request had no valid credentials
    #[error("Authentication credentials were not provided")]
    AuthenticationRequired,
    /// The request had valid credentials, but the user lacks privileges
    #[error("You do not have permission to perform this action")]
    PermissionDenied,
}

/// A resource that is owned by a user.
pub trait Authored {
    fn author_id(&self) -> PrimaryKey;
}

/// An access control policy.
///
/// Collection-level checks decide if an action type can be attempted at all,
/// object-level checks decide if it can be performed on a specific resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Only admins may do anything
    AdminOnly,
    /// Everyone may read, only admins may write
    AdminOrReadOnly,
    /// Everyone may read, authenticated users may create,
    /// and only the author, moderators and admins may modify a resource
    AuthorOrModeratorOrAdmin,
}

impl Policy {
    /// Checks if the action type is permitted at all.
    pub fn check(&self, actor: Option<&User>, method: Method) -> Result<(), Denial> {
        let allowed = match self {
            Policy::AdminOnly => actor.is_some_and(|u| u.is_admin()),
            Policy::AdminOrReadOnly => method.is_safe() || actor.is_some_and(|u| u.is_admin()),
            Policy::AuthorOrModeratorOrAdmin => method.is_safe() || actor.is_some(),
        };

        verdict(allowed, actor)
    }

    /// Checks if the action is permitted on the given resource.
    pub fn check_object<R>(
        &self,
        actor: Option<&User>,
        method: Method,
        resource: &R,
    ) -> Result<(), Denial>
    where
        R: Authored + ?Sized,
    {
        match self {
            Policy::AdminOnly | Policy::AdminOrReadOnly => self.check(actor, method),
            Policy::AuthorOrModeratorOrAdmin => {
                let allowed = method.is_safe()
                    || actor.is_some_and(|u| {
                        u.is_admin() || u.is_moderator() || u.id == resource.author_id()
                    });

                verdict(allowed, actor)
            }
        }
    }

    /// Runs the collection-level check, and then the object-level check if a resource is given.
    pub fn authorize<R>(
        &self,
        actor: Option<&User>,
        method: Method,
        resource: Option<&R>,
    ) -> Result<(), Denial>
    where
        R: Authored + ?Sized,
    {
        self.check(actor, method)?;

        match resource {
            Some(resource) => self.check_object(actor, method, resource),
            None => Ok(()),
        }
    }
}

fn verdict(allowed: bool, actor: Option<&User>) -> Result<(), Denial> {
    match (allowed, actor) {
        (true, _) => Ok(()),
        (false, None) => Err(Denial::AuthenticationRequired),
        (false, Some(_)) => Err(Denial::PermissionDenied),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{identity::test::user_with_role, Role};

    struct Owned(PrimaryKey);

    impl Authored for Owned {
        fn author_id(&self) -> PrimaryKey {
            self.0
        }
    }

    const SAFE: [Method; 3] = [Method::Get, Method::Head, Method::Options];
    const UNSAFE: [Method; 4] = [Method::Post, Method::Put, Method::Patch, Method::Delete];

    #[test]
    fn test_admin_only() {
        let admin = user_with_role(1, Role::Admin);
        let moderator = user_with_role(2, Role::Moderator);

        for method in SAFE.iter().chain(UNSAFE.iter()).copied() {
            assert_eq!(Policy::AdminOnly.check(Some(&admin), method), Ok(()));
            assert_eq!(
                Policy::AdminOnly.check(Some(&moderator), method),
                Err(Denial::PermissionDenied)
            );
            assert_eq!(
                Policy::AdminOnly.check(None, method),
                Err(Denial::AuthenticationRequired)
            );
        }
    }

    #[test]
    fn test_admin_or_read_only() {
        let user = user_with_role(1, Role::User);
        let mut staff = user_with_role(2, Role::User);
        staff.staff = true;

        for method in SAFE {
            assert_eq!(Policy::AdminOrReadOnly.check(None, method), Ok(()));
            assert_eq!(Policy::AdminOrReadOnly.check(Some(&user), method), Ok(()));
        }

        for method in UNSAFE {
            assert_eq!(
                Policy::AdminOrReadOnly.check(None, method),
                Err(Denial::AuthenticationRequired)
            );
            assert_eq!(
                Policy::AdminOrReadOnly.check(Some(&user), method),
                Err(Denial::PermissionDenied)
            );
            assert_eq!(Policy::AdminOrReadOnly.check(Some(&staff), method), Ok(()));
            assert_eq!(
                Policy::AdminOrReadOnly.check_object(Some(&user), method, &Owned(1)),
                Err(Denial::PermissionDenied),
                "ownership is irrelevant for admin-or-read-only"
            );
        }
    }

    #[test]
    fn test_author_or_moderator_or_admin() {
        let policy = Policy::AuthorOrModeratorOrAdmin;

        let author = user_with_role(1, Role::User);
        let stranger = user_with_role(2, Role::User);
        let moderator = user_with_role(3, Role::Moderator);
        let admin = user_with_role(4, Role::Admin);
        let resource = Owned(author.id);

        for method in UNSAFE {
            // Anyone authenticated may attempt the action
            assert_eq!(policy.check(Some(&stranger), method), Ok(()));
            assert_eq!(
                policy.check(None, method),
                Err(Denial::AuthenticationRequired)
            );

            assert_eq!(policy.authorize(Some(&author), method, Some(&resource)), Ok(()));
            assert_eq!(policy.authorize(Some(&moderator), method, Some(&resource)), Ok(()));
            assert_eq!(policy.authorize(Some(&admin), method, Some(&resource)), Ok(()));
            assert_eq!(
                policy.authorize(Some(&stranger), method, Some(&resource)),
                Err(Denial::PermissionDenied)
            );
            assert_eq!(
                policy.authorize(None, method, Some(&resource)),
                Err(Denial::AuthenticationRequired)
            );
        }

        for method in SAFE {
            assert_eq!(policy.authorize(None, method, Some(&resource)), Ok(()));
            assert_eq!(policy.authorize(Some(&stranger), method, Some(&resource)), Ok(()));
        }
    }

    #[test]
    fn test_role_change_is_not_cached() {
        let policy = Policy::AuthorOrModeratorOrAdmin;
        let mut user = user_with_role(2, Role::User);
        let resource = Owned(1);

        assert_eq!(
            policy.check_object(Some(&user), Method::Delete, &resource),
            Err(Denial::PermissionDenied)
        );

        user.role = Role::Moderator;
        assert_eq!(policy.check_object(Some(&user), Method::Delete, &resource), Ok(()));
    }
}
