#[cfg(test)]
pub mod memory;
pub mod pg;
pub mod repo;
pub mod repo_types;

pub use repo::{CreateUserError, UserRepository};
pub use repo_types::{MemberView, ProfileChanges, Role, User, UserStatus};
