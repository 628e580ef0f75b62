use std::time::Duration;

/// Global configuration for the core runtime.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Initial authenticated rate budget, corrected later by the probes.
    pub auth_limit_initial: i64,
    /// Initial per-IP rate budget.
    pub ip_limit_initial: i64,
    /// How long an error line stays on the view sink before blanking.
    pub error_blanking_delay: Duration,
    /// Advisory capacity for a UI-side image loader. The core never reads it.
    pub image_loader_capacity: usize,
    /// Run the remote client behind a serialized worker thread.
    pub threaded: bool,
    /// Seed for the rate-paced pick. `None` seeds from the OS.
    pub rng_seed: Option<u64>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            auth_limit_initial: 50,
            ip_limit_initial: 50,
            error_blanking_delay: Duration::from_secs(4),
            image_loader_capacity: 100,
            threaded: false,
            rng_seed: None,
        }
    }
}
