//! Recording published jobs in the remote ledger.

use ppt_core::{Job, Result};
use ppt_remote::Ledger;
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerReport {
    pub appended: usize,
    pub already_present: usize,
}

/// Ledger columns A..J for one job.
pub fn ledger_row(job: &Job, permitted_admins: &str) -> Vec<String> {
    vec![
        job.id.clone(),
        job.category.clone(),
        job.subcategory.clone(),
        String::new(),
        job.client.clone(),
        job.result.final_link.clone().unwrap_or_default(),
        job.keywords.clone(),
        job.filename.clone(),
        permitted_admins.to_string(),
        String::new(),
    ]
}

/// Append a row for every published job whose id the ledger does not hold
/// yet, and mark those jobs as logged.
pub fn record_ledger(ledger: &dyn Ledger, jobs: &mut [Job], permitted_admins: &str) -> Result<LedgerReport> {
    let mut seen: HashSet<String> = ledger.existing_ids()?;
    let mut report = LedgerReport::default();
    let mut rows = Vec::new();
    let mut newly_logged = Vec::new();

    for (idx, job) in jobs.iter_mut().enumerate() {
        if !job.is_published() {
            continue;
        }
        if !seen.insert(job.id.clone()) {
            log::debug!("{} already in the ledger", job.id);
            job.result.logged_to_sheet = true;
            report.already_present += 1;
            continue;
        }
        rows.push(ledger_row(job, permitted_admins));
        newly_logged.push(idx);
    }

    if !rows.is_empty() {
        ledger.append_rows(&rows)?;
        log::info!("Logged {} job(s) to the ledger", rows.len());
    } else {
        log::info!("Ledger already up to date");
    }
    for idx in newly_logged {
        jobs[idx].result.logged_to_sheet = true;
    }
    report.appended = rows.len();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppt_remote::MemoryBackend;

    fn published(id: &str) -> Job {
        let mut job = Job::new(id, format!("Deck {}", id), 1, 2);
        job.category = "Sermons".into();
        job.client = "North".into();
        job.result.final_link = Some(format!("https://docs.google.com/presentation/d/{}/edit", id));
        job.result.presentation_id = Some(id.to_string());
        job
    }

    #[test]
    fn test_row_layout() {
        let job = published("j1");
        let row = ledger_row(&job, "admins@example.com");
        assert_eq!(row.len(), 10);
        assert_eq!(row[0], "j1");
        assert_eq!(row[1], "Sermons");
        assert_eq!(row[3], "");
        assert_eq!(row[4], "North");
        assert!(row[5].contains("/presentation/d/j1/"));
        assert_eq!(row[7], "Deck j1");
        assert_eq!(row[8], "admins@example.com");
        assert_eq!(row[9], "");
    }

    #[test]
    fn test_skips_unpublished_and_known_ids() {
        let backend = MemoryBackend::new();
        backend.insert_row(vec!["j1".into()]);
        let mut jobs = vec![published("j1"), published("j2"), Job::new("j3", "Deck j3", 3, 4)];
        // Duplicate ids within one batch are written once.
        jobs.push(published("j2"));

        let report = record_ledger(&backend, &mut jobs, "").unwrap();
        assert_eq!(report.appended, 1);
        assert_eq!(report.already_present, 2);
        assert_eq!(backend.rows().len(), 2);
        assert!(jobs[0].result.logged_to_sheet);
        assert!(jobs[1].result.logged_to_sheet);
        assert!(!jobs[2].result.logged_to_sheet);
    }
}
