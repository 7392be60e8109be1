//! Deterministic synthetic station traffic for tests and load
//! experiments.

use chrono::{DateTime, Utc};
use nimbus_core::ms_to_datetime;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::validate::RawReading;

/// Configuration for the synthetic reading generator.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Number of distinct stations, ids `station1..stationN` (default: 10).
    pub stations: u32,

    /// Every `duplicate_every`-th emitted record repeats the previous one
    /// verbatim (default: 5, i.e. ~20% duplicates). Zero disables
    /// duplicates.
    pub duplicate_every: u32,

    /// RNG seed. The same seed yields the same stream (default: 42).
    pub seed: u64,

    /// Timestamp of the first fresh reading (default: 2025-01-01T00:00:00Z).
    pub start: DateTime<Utc>,

    /// Gap between consecutive fresh readings (default: 1 second).
    pub step: chrono::Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            stations: 10,
            duplicate_every: 5,
            seed: 42,
            start: ms_to_datetime(1_735_689_600_000),
            step: chrono::Duration::seconds(1),
        }
    }
}

/// Seeded generator with a configurable duplicate ratio.
///
/// Duplicates repeat the previous record exactly (same station, same
/// timestamp, same measurements), which is what a station re-sending
/// after a dropped ack looks like. Fresh records each get their own
/// timestamp, so the stream's distinct key count is exactly its fresh
/// record count.
pub struct ReadingGenerator {
    config: GeneratorConfig,
    rng: StdRng,
    emitted: u64,
    fresh: u64,
    last: Option<RawReading>,
}

impl ReadingGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            emitted: 0,
            fresh: 0,
            last: None,
        }
    }

    /// Next reading in the stream.
    pub fn next_reading(&mut self) -> RawReading {
        self.emitted += 1;
        if self.config.duplicate_every > 0
            && self.emitted % self.config.duplicate_every as u64 == 0
        {
            if let Some(last) = &self.last {
                return last.clone();
            }
        }

        let station = self.rng.gen_range(1..=self.config.stations);
        let timestamp = self.config.start + self.config.step * self.fresh as i32;
        let reading = RawReading {
            station_id: format!("station{}", station),
            temperature: self.rng.gen_range(-10.0..35.0),
            humidity: self.rng.gen_range(0.0..100.0),
            wind_speed: self.rng.gen_range(0.0..30.0),
            timestamp: timestamp.to_rfc3339(),
        };

        self.fresh += 1;
        self.last = Some(reading.clone());
        reading
    }

    /// Generate the next `n` readings.
    pub fn batch(&mut self, n: usize) -> Vec<RawReading> {
        (0..n).map(|_| self.next_reading()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::Validator;
    use std::collections::HashSet;

    fn keys(readings: &[RawReading]) -> HashSet<(String, String)> {
        readings
            .iter()
            .map(|r| (r.station_id.clone(), r.timestamp.clone()))
            .collect()
    }

    #[test]
    fn test_same_seed_same_stream() {
        let config = GeneratorConfig {
            seed: 7,
            ..GeneratorConfig::default()
        };
        let a = ReadingGenerator::new(config.clone()).batch(50);
        let b = ReadingGenerator::new(config).batch(50);
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = ReadingGenerator::new(GeneratorConfig {
            seed: 1,
            ..GeneratorConfig::default()
        })
        .batch(50);
        let b = ReadingGenerator::new(GeneratorConfig {
            seed: 2,
            ..GeneratorConfig::default()
        })
        .batch(50);
        assert_ne!(a, b);
    }

    #[test]
    fn test_duplicate_ratio() {
        // Every 5th of 100 emitted records repeats its predecessor, so 80
        // distinct keys remain.
        let readings =
            ReadingGenerator::new(GeneratorConfig::default()).batch(100);
        assert_eq!(readings.len(), 100);
        assert_eq!(keys(&readings).len(), 80);
    }

    #[test]
    fn test_duplicates_disabled() {
        let readings = ReadingGenerator::new(GeneratorConfig {
            duplicate_every: 0,
            ..GeneratorConfig::default()
        })
        .batch(100);
        assert_eq!(keys(&readings).len(), 100);
    }

    #[test]
    fn test_generated_readings_validate() {
        let validator = Validator::default();
        for reading in ReadingGenerator::new(GeneratorConfig::default()).batch(200) {
            assert!(
                validator.validate(&reading).is_ok(),
                "generated reading failed validation: {:?}",
                reading
            );
        }
    }

    #[test]
    fn test_station_ids_within_configured_range() {
        let readings = ReadingGenerator::new(GeneratorConfig {
            stations: 3,
            ..GeneratorConfig::default()
        })
        .batch(100);
        for reading in &readings {
            assert!(
                ["station1", "station2", "station3"].contains(&reading.station_id.as_str()),
                "unexpected station id {}",
                reading.station_id
            );
        }
    }
}
