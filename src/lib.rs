use config::Config;
use sqlx::PgPool;

pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod qr;
pub mod routes;
pub mod scoring;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
}
