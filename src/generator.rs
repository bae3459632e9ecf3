//! Synthetic server metrics.
//!
//! Produces `server_metrics` rows for demo dashboards: one series per server,
//! sampled every `interval_hours` over `days` days starting 2025-01-01.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

use crate::storage::{Record, Value};

const SERVICES: &[&str] = &[
    "web",
    "db",
    "cache",
    "api",
    "storage",
    "queue",
    "monitoring",
    "auth",
];
const ZONES: &[&str] = &[
    "us-east",
    "us-west",
    "eu-central",
    "eu-west",
    "asia-south",
    "asia-east",
];
const ENVIRONMENTS: &[&str] = &["production", "staging", "development"];
const OS_TYPES: &[&str] = &["linux", "windows"];
const SERVER_TYPES: &[&str] = &["compute", "memory", "storage", "gpu"];
const STATUSES: &[&str] = &["healthy", "warning", "critical"];

/// Generator of synthetic `server_metrics` records.
pub struct DataGenerator {
    rng: StdRng,
}

impl std::fmt::Debug for DataGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataGenerator").finish_non_exhaustive()
    }
}

impl Default for DataGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl DataGenerator {
    /// Generator seeded from the OS.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic generator.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// First sample timestamp.
    pub fn base_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or_default()
    }

    /// Generate `server_count * ceil(24 * days / interval_hours)` records.
    ///
    /// Server names are `SRV-001`, `SRV-002`, ...; each server keeps its IP
    /// and install date across samples. An `interval_hours` of zero is
    /// treated as one.
    pub fn generate_server_data(
        &mut self,
        server_count: usize,
        days: u32,
        interval_hours: u32,
    ) -> Vec<Record> {
        let interval = interval_hours.max(1);
        let samples = (24 * days).div_ceil(interval) as usize;
        let base = Self::base_time();
        let mut records = Vec::with_capacity(server_count * samples);

        for i in 1..=server_count {
            let server_name = format!("SRV-{i:03}");
            let ip = (0..4)
                .map(|_| self.rng.random_range(1..=255_u8).to_string())
                .collect::<Vec<_>>()
                .join(".");
            let install_date = base - self.days(1..=365);

            for step in 0..samples {
                let hours = i64::from(interval) * step as i64;
                let timestamp = base + TimeDelta::hours(hours);
                records.push(self.sample(timestamp, &server_name, &ip, install_date));
            }
        }

        tracing::debug!(
            servers = server_count,
            records = records.len(),
            "Generated server metrics"
        );
        records
    }

    fn sample(
        &mut self,
        timestamp: NaiveDateTime,
        server_name: &str,
        ip: &str,
        install_date: NaiveDateTime,
    ) -> Record {
        let last_update = timestamp - self.days(1..=30);
        let next_maintenance = timestamp + self.days(1..=90);
        let last_backup = timestamp - self.days(1..=7);
        let cert_expiry = timestamp + self.days(30..=365);
        let days_between = |a: NaiveDateTime, b: NaiveDateTime| (a - b).num_days();

        let mut r = Record::with_capacity(32);
        r.insert("timestamp".into(), timestamp.into());
        r.insert("server_name".into(), server_name.into());
        r.insert("server_ip".into(), ip.into());
        r.insert("server_zone".into(), self.pick(ZONES));
        r.insert("server_type".into(), self.pick(SERVER_TYPES));
        r.insert("service_name".into(), self.pick(SERVICES));
        r.insert("environment".into(), self.pick(ENVIRONMENTS));
        r.insert("os_type".into(), self.pick(OS_TYPES));
        r.insert("install_date".into(), install_date.into());
        r.insert("last_update_date".into(), last_update.into());
        r.insert("next_maintenance_date".into(), next_maintenance.into());
        r.insert("last_backup_date".into(), last_backup.into());
        r.insert("certificate_expiry_date".into(), cert_expiry.into());
        r.insert(
            "days_since_install".into(),
            days_between(timestamp, install_date).into(),
        );
        r.insert(
            "days_since_last_update".into(),
            days_between(timestamp, last_update).into(),
        );
        r.insert(
            "days_until_maintenance".into(),
            days_between(next_maintenance, timestamp).into(),
        );
        r.insert(
            "days_since_last_backup".into(),
            days_between(timestamp, last_backup).into(),
        );
        r.insert(
            "days_until_cert_expiry".into(),
            days_between(cert_expiry, timestamp).into(),
        );
        r.insert("cpu_usage".into(), self.decimal(5.0, 95.0));
        r.insert("memory_usage".into(), self.decimal(10.0, 90.0));
        r.insert("disk_usage".into(), self.decimal(20.0, 80.0));
        r.insert("network_in".into(), self.integer(100, 10_000));
        r.insert("network_out".into(), self.integer(100, 10_000));
        r.insert("response_time".into(), self.decimal(10.0, 500.0));
        r.insert("requests_per_second".into(), self.integer(100, 5_000));
        r.insert("error_rate".into(), self.decimal(0.1, 5.0));
        r.insert("revenue_impact".into(), self.decimal(1_000.0, 50_000.0));
        r.insert("user_sessions".into(), self.integer(1_000, 50_000));
        r.insert("throughput".into(), self.integer(100, 5_000));
        r.insert("status".into(), self.pick(STATUSES));
        r.insert("uptime_days".into(), self.integer(1, 365));
        r.insert(
            "last_maintenance".into(),
            (timestamp - self.days(1..=30)).into(),
        );
        r
    }

    fn days(&mut self, range: std::ops::RangeInclusive<i64>) -> TimeDelta {
        TimeDelta::days(self.rng.random_range(range))
    }

    fn pick(&mut self, choices: &[&str]) -> Value {
        Value::from(choices.choose(&mut self.rng).copied().unwrap_or_default())
    }

    fn integer(&mut self, low: i64, high: i64) -> Value {
        Value::Integer(self.rng.random_range(low..=high))
    }

    /// Uniform decimal rounded to two places.
    fn decimal(&mut self, low: f64, high: f64) -> Value {
        let v: f64 = self.rng.random_range(low..=high);
        Value::Decimal((v * 100.0).round() / 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::server_metrics_schema;

    #[test]
    fn test_records_match_declared_schema() {
        let records = DataGenerator::with_seed(7).generate_server_data(3, 1, 6);
        assert_eq!(records.len(), 12);

        let schema = server_metrics_schema();
        for record in &records {
            schema.validate_record(record).unwrap();
        }
    }

    #[test]
    fn test_series_layout() {
        let records = DataGenerator::with_seed(1).generate_server_data(2, 2, 12);
        assert_eq!(records.len(), 8);

        assert_eq!(records[0]["server_name"], Value::from("SRV-001"));
        assert_eq!(records[4]["server_name"], Value::from("SRV-002"));
        assert_eq!(records[0]["timestamp"], Value::from(DataGenerator::base_time()));
        assert_eq!(
            records[3]["timestamp"],
            Value::from(DataGenerator::base_time() + TimeDelta::hours(36))
        );
        // IP is stable per server
        assert_eq!(records[0]["server_ip"], records[3]["server_ip"]);
    }

    #[test]
    fn test_value_ranges() {
        let records = DataGenerator::with_seed(42).generate_server_data(5, 1, 4);
        for record in &records {
            let Value::Decimal(cpu) = record["cpu_usage"] else {
                panic!("cpu_usage should be decimal");
            };
            assert!((5.0..=95.0).contains(&cpu));
            assert_eq!((cpu * 100.0).round() / 100.0, cpu);

            let Value::Integer(backup) = record["days_since_last_backup"] else {
                panic!("days_since_last_backup should be integer");
            };
            assert!((1..=7).contains(&backup));

            let Value::Text(status) = &record["status"] else {
                panic!("status should be text");
            };
            assert!(STATUSES.contains(&status.as_str()));
        }
    }

    #[test]
    fn test_seed_is_deterministic() {
        let a = DataGenerator::with_seed(9).generate_server_data(2, 1, 6);
        let b = DataGenerator::with_seed(9).generate_server_data(2, 1, 6);
        assert_eq!(a, b);
    }
}
