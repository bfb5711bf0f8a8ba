mod handler;
pub mod model;

pub use handler::{list_staff, register_staff, update_staff_status};
pub use model::ensure_bootstrap_admin;
