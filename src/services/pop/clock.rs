/// Time source for the SHR `ts` claim.
pub trait Clock: Send + Sync {
    // Whole seconds since the Unix epoch.
    fn now_seconds(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_seconds(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}
