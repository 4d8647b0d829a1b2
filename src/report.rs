//! Serializable score reports.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tensor::{DType, Scalar};

/// One computed score with the context needed to compare it to others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    /// Metric name, e.g. `inception_score` or `frechet_distance`.
    pub metric: String,

    /// Score value.
    pub value: f64,

    /// Precision the score was computed for.
    pub dtype: DType,

    /// Number of examples scored (per side, for two-sample metrics).
    pub num_examples: usize,

    /// Number of chunks the classifier was run in.
    pub num_batches: usize,

    /// When the score was computed.
    #[serde(with = "chrono_serde")]
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ScoreReport {
    /// Report `score`, timestamped now.
    #[must_use]
    pub fn new(metric: impl Into<String>, score: Scalar, num_examples: usize, num_batches: usize) -> Self {
        Self {
            metric: metric.into(),
            value: score.to_f64(),
            dtype: score.dtype(),
            num_examples,
            num_batches,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write as JSON to `path`, creating parent directories.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Read a report written by [`write_json`](Self::write_json).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

mod chrono_serde {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        dt.to_rfc3339().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_from_scalar() {
        let report = ScoreReport::new("inception_score", Scalar::Float32(2.5), 100, 4);
        assert_eq!(report.metric, "inception_score");
        assert_eq!(report.value, 2.5);
        assert_eq!(report.dtype, DType::Float32);
    }

    #[test]
    fn test_timestamp_is_rfc3339() {
        let report = ScoreReport::new("frechet_distance", Scalar::Float64(1.0), 10, 1);
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        let ts = json["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
        assert_eq!(json["dtype"], "float64");
    }

    #[test]
    fn test_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("fid.json");
        let report = ScoreReport::new("frechet_distance", Scalar::Float64(12.75), 50, 5);

        report.write_json(&path).unwrap();
        let back = ScoreReport::load(&path).unwrap();
        assert_eq!(back.metric, report.metric);
        assert_eq!(back.value, report.value);
        assert_eq!(back.num_batches, 5);
        assert_eq!(back.timestamp.timestamp(), report.timestamp.timestamp());
    }
}
