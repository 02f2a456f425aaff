use std::sync::atomic::{AtomicBool, Ordering};

/// Readiness source consumed by the health endpoints.
///
/// The ingestion endpoint backs this with the broker connection state; the
/// processor backs it with a flag its consumer loops maintain.
pub trait ReadinessProbe: Send + Sync {
    fn is_ready(&self) -> bool;
}

impl ReadinessProbe for AtomicBool {
    fn is_ready(&self) -> bool {
        self.load(Ordering::SeqCst)
    }
}
