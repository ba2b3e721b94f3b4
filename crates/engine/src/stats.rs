//! Read-only telemetry snapshot (§6 Telemetry).

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct EngineStats {
    pub queue_length: usize,
    pub processing: bool,
    pub orphans_total: usize,
    pub orphans_by_opener: usize,
    pub oldest_orphan_age_ms: Option<u64>,
}
