/*
Clock Port

Source of the current instant for cache staleness checks and for stamping locally raised
notifications. Injected so that restarts and the cache validity window can be exercised
without waiting on the wall clock.
*/

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
