mod handler;
pub mod model;

pub use handler::{create_membership, delete_membership, list_member_memberships};
pub use model::expire_memberships;
