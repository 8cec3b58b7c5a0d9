mod auth;
mod catalog;
mod db;
mod errors;
mod mail;
mod reviews;
mod users;
mod util;

use std::sync::Arc;

pub use auth::*;
pub use catalog::*;
pub use db::*;
pub use errors::*;
pub use mail::*;
pub use reviews::*;
pub use users::*;

use chrono::Duration;

/// The yamdb collab system, facilitating authentication, the catalog, reviews, and more.
pub struct Collab {
    pub auth: Auth,
    pub catalog: Catalog,
    pub reviews: Reviews,
    pub users: Users,
}

#[derive(Debug, Clone)]
pub struct CollabConfig {
    /// How long a confirmation code stays valid
    pub challenge_ttl: Duration,
}

/// A type passed to various components of the collab system, to access state and collaborators.
#[derive(Clone)]
pub struct CollabContext {
    pub database: ArcedDatabase,
    pub mailer: ArcedMailer,
    pub config: CollabConfig,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            challenge_ttl: Duration::minutes(15),
        }
    }
}

impl Collab {
    pub fn new(database: ArcedDatabase, mailer: ArcedMailer, config: CollabConfig) -> Self {
        let context = CollabContext {
            database,
            mailer,
            config,
        };

        Self {
            auth: Auth::new(&context),
            catalog: Catalog::new(&context),
            reviews: Reviews::new(&context),
            users: Users::new(&context),
        }
    }

    /// A collab system backed by memory, for tests
    pub fn in_memory() -> (Self, Arc<MemoryDatabase>, Arc<OutboxMailer>) {
        let database = Arc::new(MemoryDatabase::new());
        let outbox = Arc::new(OutboxMailer::new());

        let collab = Self::new(database.clone(), outbox.clone(), CollabConfig::default());
        (collab, database, outbox)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::sync::Arc;

    use yamdb_core::{Role, User};

    use crate::{Collab, Database, MemoryDatabase, NewUser, OutboxMailer};

    pub fn test_collab() -> (Collab, Arc<MemoryDatabase>, Arc<OutboxMailer>) {
        Collab::in_memory()
    }

    pub async fn test_user(database: &Arc<MemoryDatabase>, name: &str, role: Role) -> User {
        database
            .create_user(NewUser {
                username: name.to_string(),
                email: format!("{name}@yamdb.test"),
                role,
                first_name: String::new(),
                last_name: String::new(),
                bio: String::new(),
            })
            .await
            .unwrap()
    }
}
