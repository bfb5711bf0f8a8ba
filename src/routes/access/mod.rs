mod handler;
pub mod model;
pub mod scan;

pub use handler::{access_logs, validate_access};
pub use scan::validate_qr;
