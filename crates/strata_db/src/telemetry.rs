//! Entity and chunk counters.
//!
//! Counters vanish in production builds: without the `metrics` feature every
//! recording call is a no-op and every getter returns zero.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable counter collection (default: enabled)

#[cfg(feature = "metrics")]
mod enabled {
    /// Running totals for one database.
    #[derive(Clone, Debug, Default, PartialEq, Eq)]
    pub struct DatabaseStats {
        live_entities: usize,
        entities_created: u64,
        entities_destroyed: u64,
        blobs_allocated: u64,
        blobs_released: u64,
    }

    impl DatabaseStats {
        pub fn new() -> Self {
            Self::default()
        }

        pub(crate) fn record_created(&mut self, count: usize) {
            self.live_entities += count;
            self.entities_created += count as u64;
        }

        pub(crate) fn record_destroyed(&mut self, count: usize) {
            self.live_entities = self.live_entities.saturating_sub(count);
            self.entities_destroyed += count as u64;
        }

        pub(crate) fn record_blob_allocated(&mut self) {
            self.blobs_allocated += 1;
        }

        pub(crate) fn record_blob_released(&mut self) {
            self.blobs_released += 1;
        }

        pub fn live_entities(&self) -> usize {
            self.live_entities
        }

        pub fn entities_created(&self) -> u64 {
            self.entities_created
        }

        pub fn entities_destroyed(&self) -> u64 {
            self.entities_destroyed
        }

        pub fn blobs_allocated(&self) -> u64 {
            self.blobs_allocated
        }

        pub fn blobs_released(&self) -> u64 {
            self.blobs_released
        }

        /// Chunk blobs currently holding memory.
        pub fn live_blobs(&self) -> u64 {
            self.blobs_allocated - self.blobs_released
        }
    }
}

#[cfg(feature = "metrics")]
pub use enabled::DatabaseStats;

// ============================================================================
// No-op stub when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatabaseStats;

#[cfg(not(feature = "metrics"))]
impl DatabaseStats {
    pub fn new() -> Self { Self }
    pub(crate) fn record_created(&mut self, _count: usize) {}
    pub(crate) fn record_destroyed(&mut self, _count: usize) {}
    pub(crate) fn record_blob_allocated(&mut self) {}
    pub(crate) fn record_blob_released(&mut self) {}
    pub fn live_entities(&self) -> usize { 0 }
    pub fn entities_created(&self) -> u64 { 0 }
    pub fn entities_destroyed(&self) -> u64 { 0 }
    pub fn blobs_allocated(&self) -> u64 { 0 }
    pub fn blobs_released(&self) -> u64 { 0 }
    pub fn live_blobs(&self) -> u64 { 0 }
}

#[cfg(test)]
mod tests {
    use super::DatabaseStats;

    #[test]
    #[cfg(feature = "metrics")]
    fn counts_entities_and_blobs() {
        let mut stats = DatabaseStats::new();
        stats.record_created(10);
        stats.record_destroyed(4);
        stats.record_blob_allocated();
        stats.record_blob_allocated();
        stats.record_blob_released();

        assert_eq!(stats.live_entities(), 6);
        assert_eq!(stats.entities_created(), 10);
        assert_eq!(stats.entities_destroyed(), 4);
        assert_eq!(stats.live_blobs(), 1);
    }

    #[test]
    #[cfg(not(feature = "metrics"))]
    fn test_compiles_without_metrics() {
        let mut stats = DatabaseStats::new();
        stats.record_created(10);
        assert_eq!(stats.live_entities(), 0);
    }
}
