//! Shared test utilities for mill-db unit tests.

#[cfg(test)]
pub(crate) mod helpers {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use mill_core::clock::{Clock, ManualClock, SystemClock};
    use mill_core::entities::NewUser;

    use crate::MillDb;
    use crate::audit::AuditRecorder;
    use crate::service::MillService;

    /// In-memory service on the system clock.
    pub async fn test_service() -> MillService {
        service_on(Arc::new(SystemClock)).await
    }

    /// In-memory service on a manual clock starting at 2024-01-10 09:00 UTC.
    pub async fn test_service_with_manual_clock() -> (MillService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap(),
        ));
        let svc = service_on(clock.clone()).await;
        (svc, clock)
    }

    async fn service_on(clock: Arc<dyn Clock>) -> MillService {
        let db = MillDb::open_local(":memory:").await.unwrap();
        let audit = AuditRecorder::spawn(db.clone(), Arc::clone(&clock), 256);
        MillService::new(db, audit, clock)
    }

    pub fn new_user(first_name: &str, email: &str) -> NewUser {
        NewUser {
            first_name: first_name.to_string(),
            last_name: "Tester".to_string(),
            email: email.to_string(),
        }
    }
}
