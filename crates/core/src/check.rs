//! Success check — an optional, caller-injected predicate over the live
//! environment. Must be cheap and safe to call every turn.

use async_trait::async_trait;

use crate::environment::Environment;
use crate::error::CheckError;

#[async_trait]
pub trait SuccessCheck: Send + Sync {
    async fn check(&self, env: &dyn Environment) -> Result<bool, CheckError>;
}

/// Succeeds once the environment's location contains the given fragment.
pub struct LocationContains(pub String);

#[async_trait]
impl SuccessCheck for LocationContains {
    async fn check(&self, env: &dyn Environment) -> Result<bool, CheckError> {
        Ok(env.location().contains(&self.0))
    }
}
