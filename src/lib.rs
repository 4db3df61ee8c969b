/// Backyard bird monitoring: load detections from a recorder's database or
/// API, normalize them, filter, aggregate and export.
///
/// Pipeline: `ingest` (raw tables) → `normalize` (canonical `Dataset`) →
/// `loader` (source selection, weather, fallback) → `filter` → `analysis`
/// → `report` / `export`.

pub mod analysis;
pub mod columns;
pub mod config;
pub mod export;
pub mod filter;
pub mod ingest;
pub mod loader;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod report;
pub mod verify;
