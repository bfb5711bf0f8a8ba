mod handler;
pub mod model;

pub use handler::{activity_calendar, dashboard, my_qr_code};
