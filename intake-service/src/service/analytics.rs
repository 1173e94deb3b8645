//! Per-user usage statistics.

use crate::db::models::UserStats;
use crate::error::ServiceResult;
use crate::service::IntakeService;

impl IntakeService {
    /// Completed document count plus image, vector and byte totals
    pub fn user_stats(&self, user_id: &str) -> ServiceResult<UserStats> {
        self.store.get_user_stats(user_id)
    }
}
