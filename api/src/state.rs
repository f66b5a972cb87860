use leadreg_core::DedupConfig;

use crate::pg::PgStore;

#[derive(Clone)]
pub struct AppState {
    pub store: PgStore,
    pub config: DedupConfig,
}
