//! The identity and authorization model of yamdb, along with the rating aggregate.
//! Everything in here is pure and does no I/O.

mod identity;
mod policy;
mod rating;

pub use identity::*;
pub use policy::*;
pub use rating::*;
