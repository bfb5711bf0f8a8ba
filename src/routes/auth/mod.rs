mod handler;
pub mod model;

pub use handler::{member_login, member_register, staff_login};
