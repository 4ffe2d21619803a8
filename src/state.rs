//! Shared application state handed to every route.

use crate::db::Pool;
use crate::purchase::SignatureVerifier;

pub struct AppState {
    pub pool: Pool,
    pub verifier: SignatureVerifier,
}

impl AppState {
    pub fn new(pool: Pool, payment_secret: &str) -> Self {
        Self {
            pool,
            verifier: SignatureVerifier::new(payment_secret),
        }
    }
}
