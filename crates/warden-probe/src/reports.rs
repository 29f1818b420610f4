//! Verdict persistence under the reports directory
//!
//! `latest.json` is overwritten each session via temp-and-rename so
//! readers never observe a torn verdict; `health-<epoch>.json` is the
//! append-only history; `summary.json` is the compact projection the
//! `status` subcommand reads.

use std::path::{Path, PathBuf};
use tracing::debug;
use warden_common::{Error, HealthVerdict, Result, VerdictSummary};

pub struct ReportWriter {
    reports_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(reports_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(reports_dir)?;
        std::fs::create_dir_all(reports_dir.join("performance"))?;
        Ok(ReportWriter {
            reports_dir: reports_dir.to_path_buf(),
        })
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    /// Publish one completed verdict to all three report files.
    pub fn write_verdict(&self, verdict: &HealthVerdict) -> Result<()> {
        let raw = serde_json::to_string_pretty(verdict)?;

        let latest = self.reports_dir.join("latest.json");
        write_atomic(&latest, &raw)?;

        let history = self
            .reports_dir
            .join(format!("health-{}.json", verdict.timestamp.timestamp_millis()));
        std::fs::write(&history, &raw).map_err(|e| Error::SinkWrite(e.to_string()))?;

        let summary = VerdictSummary::from(verdict);
        let summary_raw = serde_json::to_string_pretty(&summary)?;
        write_atomic(&self.reports_dir.join("summary.json"), &summary_raw)?;

        debug!("verdict {} written to {}", verdict.check_id, latest.display());
        Ok(())
    }

    pub fn read_latest(&self) -> Result<HealthVerdict> {
        let raw = std::fs::read_to_string(self.reports_dir.join("latest.json"))?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn read_summary(&self) -> Result<VerdictSummary> {
        let raw = std::fs::read_to_string(self.reports_dir.join("summary.json"))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents).map_err(|e| Error::SinkWrite(e.to_string()))?;
    std::fs::rename(&tmp, path).map_err(|e| Error::SinkWrite(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;
    use uuid::Uuid;
    use warden_common::*;

    fn verdict() -> HealthVerdict {
        HealthVerdict {
            check_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            overall: OverallHealth::Good,
            score: 92.5,
            site: SiteCheck {
                available: true,
                status: Some(200),
                latency_ms: 150,
                error: None,
            },
            endpoints: EndpointsSummary {
                healthy: 6,
                total: 7,
                percent: 85.7,
                results: Vec::new(),
            },
            ui: UiCheck::skipped(),
            performance: PerformanceCheck {
                samples: Vec::new(),
                average_ms: 420.0,
                sla_violations: 0,
                availability_pct: 100.0,
                grade: PerformanceGrade::A,
            },
            mock_data: MockDataCheck {
                working: 4,
                total: 4,
                percent: 100.0,
                results: Vec::new(),
            },
            auto_fixes: Vec::new(),
            critical_issues: Vec::new(),
            recommendations: vec!["Investigate failing endpoints: /api/v1/alerts".to_string()],
            breaker_snapshots: Vec::new(),
        }
    }

    #[test]
    fn writes_all_three_report_files() {
        let dir = TempDir::new().unwrap();
        let writer = ReportWriter::new(dir.path()).unwrap();
        let v = verdict();
        writer.write_verdict(&v).unwrap();

        let restored = writer.read_latest().unwrap();
        assert_eq!(restored.check_id, v.check_id);
        assert_eq!(restored.overall, OverallHealth::Good);

        let summary = writer.read_summary().unwrap();
        assert_eq!(summary.score, 92.5);
        assert!(summary.site_available);

        let history: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("health-"))
            .collect();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn latest_is_overwritten_history_appends() {
        let dir = TempDir::new().unwrap();
        let writer = ReportWriter::new(dir.path()).unwrap();

        let mut first = verdict();
        first.timestamp = Utc::now() - chrono::Duration::seconds(10);
        writer.write_verdict(&first).unwrap();
        let second = verdict();
        writer.write_verdict(&second).unwrap();

        let restored = writer.read_latest().unwrap();
        assert_eq!(restored.check_id, second.check_id);

        let history: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("health-"))
            .collect();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn summary_json_uses_camel_case() {
        let dir = TempDir::new().unwrap();
        let writer = ReportWriter::new(dir.path()).unwrap();
        writer.write_verdict(&verdict()).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("summary.json")).unwrap();
        assert!(raw.contains("\"siteAvailable\""));
        assert!(raw.contains("\"performanceGrade\""));
        assert!(raw.contains("\"autoFixesApplied\""));
    }
}
