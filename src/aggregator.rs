//! Assembles per-peer outcomes into the report handed back to the admin caller.

use crate::types::{LegacyUpdateStatus, PeerUpdateResult, UpdateReport};

pub struct UpdateStatusAggregator;

impl UpdateStatusAggregator {
    /// Builds a report from results already in membership order.
    pub fn build(dry_run: bool, results: Vec<PeerUpdateResult>) -> UpdateReport {
        let results = results
            .into_iter()
            .map(|mut result| {
                // A peer that failed or only validated never moved versions.
                if dry_run || !result.is_success() {
                    result.version_after = result.version_before.clone();
                }
                result
            })
            .collect();
        UpdateReport { dry_run, results }
    }

    /// Builds a report from slots indexed by membership position.
    ///
    /// Slots that never produced a result still get an entry, carrying an error.
    pub fn collect(
        dry_run: bool,
        membership: &[String],
        slots: Vec<Option<PeerUpdateResult>>,
    ) -> UpdateReport {
        let mut slots = slots.into_iter();
        let results = membership
            .iter()
            .map(|host| match slots.next().flatten() {
                Some(result) => result,
                None => PeerUpdateResult::failed(host.clone(), "peer task did not report"),
            })
            .collect();
        Self::build(dry_run, results)
    }
}

impl UpdateReport {
    /// True when no peer reported an error.
    pub fn is_success(&self) -> bool {
        self.results.iter().all(PeerUpdateResult::is_success)
    }

    pub fn failed_hosts(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|result| !result.is_success())
            .map(|result| result.host.as_str())
            .collect()
    }

    pub fn result_for(&self, host: &str) -> Option<&PeerUpdateResult> {
        self.results.iter().find(|result| result.host == host)
    }
}

impl LegacyUpdateStatus {
    /// Single-node view of a report. Any peer failure becomes an error message.
    pub fn from_report(report: &UpdateReport, local_host: &str) -> Result<Self, String> {
        if !report.is_success() {
            let details = report
                .results
                .iter()
                .filter_map(|result| {
                    result
                        .error
                        .as_deref()
                        .filter(|err| !err.is_empty())
                        .map(|err| format!("{}: {err}", result.host))
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(details);
        }

        let local = report
            .result_for(local_host)
            .or_else(|| report.results.first())
            .ok_or_else(|| "no peers reported".to_string())?;
        Ok(Self {
            current_version: local.version_before.clone(),
            updated_version: local.version_after.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(host: &str, before: &str, after: &str) -> PeerUpdateResult {
        PeerUpdateResult {
            host: host.to_string(),
            error: None,
            version_before: before.to_string(),
            version_after: after.to_string(),
            waiting_drives: Default::default(),
        }
    }

    #[test]
    fn test_collect_fills_missing_slots_in_order() {
        let membership = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let report = UpdateStatusAggregator::collect(
            false,
            &membership,
            vec![Some(ok("a", "1", "2")), None, Some(ok("c", "1", "2"))],
        );
        let hosts: Vec<_> = report.results.iter().map(|r| r.host.as_str()).collect();
        assert_eq!(hosts, vec!["a", "b", "c"]);
        assert_eq!(report.failed_hosts(), vec!["b"]);
        assert!(!report.is_success());
    }

    #[test]
    fn test_build_pins_versions_for_dry_run_and_failures() {
        let mut failed = ok("b", "1", "2");
        failed.error = Some("timeout".to_string());
        let report = UpdateStatusAggregator::build(false, vec![ok("a", "1", "2"), failed]);
        assert_eq!(report.results[0].version_after, "2");
        assert_eq!(report.results[1].version_after, "1");

        let dry = UpdateStatusAggregator::build(true, vec![ok("a", "1", "2")]);
        assert_eq!(dry.results[0].version_after, "1");
        assert!(dry.is_success());
    }

    #[test]
    fn test_legacy_view() {
        let report =
            UpdateStatusAggregator::build(false, vec![ok("a", "1", "2"), ok("b", "1", "2")]);
        assert_eq!(
            LegacyUpdateStatus::from_report(&report, "b").unwrap(),
            LegacyUpdateStatus {
                current_version: "1".to_string(),
                updated_version: "2".to_string(),
            }
        );

        let mut broken = report.clone();
        broken.results[1].error = Some("drain timeout".to_string());
        assert_eq!(
            LegacyUpdateStatus::from_report(&broken, "a").unwrap_err(),
            "b: drain timeout"
        );
    }
}
