mod handler;
pub mod model;

pub use handler::{create_member, list_members, member_qr_code, search_members, update_member};
