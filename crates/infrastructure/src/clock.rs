use std::sync::OnceLock;
use std::time::Instant;

static ORIGIN: OnceLock<Instant> = OnceLock::new();

/// Whole seconds elapsed since the first call in this process.
///
/// Monotonic, so expiry stamps never jump backwards under wall-clock
/// adjustments. All cache and transaction timestamps are relative to
/// this origin.
#[inline]
pub fn now_secs() -> u64 {
    ORIGIN.get_or_init(Instant::now).elapsed().as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_decreases() {
        let a = now_secs();
        let b = now_secs();
        assert!(b >= a);
    }
}
