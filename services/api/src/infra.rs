use chrono::NaiveDate;
use hireflow::clock::Clock;
use hireflow::config::AppConfig;
use hireflow::store::{MemoryStore, RepositoryError};
use hireflow::workflows::domain::{CandidateId, CompanyId, CompetencyId, JobId, Money};
use hireflow::workflows::matching::{
    read_evidence, CandidateProfile, CompetencyLevel, FunctionalArea, JobPosting, JobRequirement,
    MatchingError, MatchingService,
};
use hireflow::workflows::pipeline::{
    NotificationDispatcher, NotificationError, NotificationRequest, PipelineService,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Dispatcher that writes every notification to the log instead of a mail relay.
#[derive(Default)]
pub(crate) struct LoggingDispatcher {
    dispatched: AtomicUsize,
}

impl LoggingDispatcher {
    pub(crate) fn dispatched(&self) -> usize {
        self.dispatched.load(Ordering::Relaxed)
    }
}

impl NotificationDispatcher for LoggingDispatcher {
    fn dispatch(&self, request: NotificationRequest) -> Result<(), NotificationError> {
        info!(
            candidacy_id = %request.candidacy_id,
            event = request.event_type.label(),
            recipient = request.recipient_role.label(),
            template = %request.template,
            fields = request.template_data.len(),
            "notification dispatched"
        );
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

pub(crate) type Pipeline = PipelineService<MemoryStore, LoggingDispatcher>;

/// Wires the pipeline and matching services over one store using the loaded config.
pub(crate) fn build_services(
    config: &AppConfig,
    store: Arc<MemoryStore>,
    dispatcher: Arc<LoggingDispatcher>,
    clock: Arc<dyn Clock>,
) -> (Arc<Pipeline>, Arc<MatchingService<MemoryStore>>) {
    let pipeline = Arc::new(PipelineService::new(
        store.clone(),
        dispatcher,
        Arc::new(config.billing.engine()),
        clock.clone(),
    ));
    let matching = Arc::new(MatchingService::new(store, config.matching, clock));
    (pipeline, matching)
}

pub(crate) const DEMO_ANALYST_JOB: JobId = JobId(1);
pub(crate) const DEMO_PLATFORM_JOB: JobId = JobId(2);

const SQL: CompetencyId = CompetencyId(1);
const PYTHON: CompetencyId = CompetencyId(2);
const RUST: CompetencyId = CompetencyId(3);
const KUBERNETES: CompetencyId = CompetencyId(4);

const DEMO_EVIDENCE: &str = "candidate_id,competency_id,level,source\n\
101,1,4,certified\n\
101,2,3,certified\n\
102,1,4,self_declared\n\
102,2,4,self_declared\n\
103,1,3,certified\n\
103,2,1,self_declared\n\
104,1,2,certified\n\
104,2,2,self_declared\n\
105,3,4,certified\n\
105,4,3,self_declared\n\
106,3,4,self_declared\n\
106,4,4,certified\n";

fn level(value: u8) -> Result<CompetencyLevel, RepositoryError> {
    CompetencyLevel::new(value).map_err(|err| RepositoryError::Unavailable(err.to_string()))
}

/// Seeds two jobs, six candidates and their evidence so the service and demo have
/// something to rank.
pub(crate) fn seed_demo_store(store: &MemoryStore, today: NaiveDate) -> Result<(), MatchingError> {
    seed_demo_catalog(store, today)?;
    let evidence = read_evidence(Cursor::new(DEMO_EVIDENCE))
        .map_err(|err| RepositoryError::Unavailable(err.to_string()))?;
    for row in evidence {
        store.record_evidence(row)?;
    }
    Ok(())
}

/// Jobs and candidate profiles only; evidence comes from a CSV export.
pub(crate) fn seed_demo_catalog(
    store: &MemoryStore,
    today: NaiveDate,
) -> Result<(), MatchingError> {
    let analytics = FunctionalArea::new("analytics");
    let engineering = FunctionalArea::new("engineering");

    store.upsert_job(
        JobPosting {
            job_id: DEMO_ANALYST_JOB,
            company_id: CompanyId(1),
            title: "Data Analyst".to_string(),
            functional_area: analytics.clone(),
            annual_salary: Some(Money::from_major(45_000)),
        },
        vec![
            requirement(DEMO_ANALYST_JOB, SQL, level(2)?, false),
            requirement(DEMO_ANALYST_JOB, PYTHON, level(2)?, false),
        ],
    )?;
    store.upsert_job(
        JobPosting {
            job_id: DEMO_PLATFORM_JOB,
            company_id: CompanyId(2),
            title: "Platform Engineer".to_string(),
            functional_area: engineering.clone(),
            annual_salary: Some(Money::from_major(130_000)),
        },
        vec![
            requirement(DEMO_PLATFORM_JOB, RUST, level(3)?, true),
            requirement(DEMO_PLATFORM_JOB, KUBERNETES, level(2)?, false),
        ],
    )?;

    let started = today
        .and_hms_opt(9, 0, 0)
        .map(|naive| naive.and_utc())
        .ok_or_else(|| RepositoryError::Unavailable(format!("invalid seed date {today}")))?;
    for (offset, id) in (101..=106).enumerate() {
        let functional_area = if id <= 104 {
            analytics.clone()
        } else {
            engineering.clone()
        };
        store.upsert_candidate(CandidateProfile {
            candidate_id: CandidateId(id),
            functional_area,
            profile_completed_at: Some(started - chrono::Duration::days(40 - offset as i64)),
            completed_formal_tests: u32::from(id % 2 == 1),
            profile_active: true,
        })?;
    }
    Ok(())
}

fn requirement(
    job_id: JobId,
    competency_id: CompetencyId,
    minimum_level: CompetencyLevel,
    test_required: bool,
) -> JobRequirement {
    JobRequirement {
        job_id,
        competency_id,
        minimum_level,
        test_required,
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hireflow::workflows::matching::{CandidatePool, CompetencyStore, JobCatalog};

    #[test]
    fn demo_seed_populates_jobs_candidates_and_evidence() {
        let store = MemoryStore::new();
        let today = NaiveDate::from_ymd_opt(2025, 5, 12).expect("valid date");

        seed_demo_store(&store, today).expect("seed succeeds");

        assert_eq!(
            store
                .requirements(DEMO_PLATFORM_JOB)
                .expect("requirements")
                .len(),
            2
        );
        assert!(store
            .candidate(CandidateId(106))
            .expect("lookup")
            .is_some());
        assert_eq!(store.evidence_count().expect("count"), 12);
        assert!(store.job(JobId(3)).expect("lookup").is_none());
        assert_eq!(
            store
                .evidence_for(&[CandidateId(101)])
                .expect("evidence")
                .len(),
            2
        );
    }

    #[test]
    fn parse_date_reports_bad_input() {
        assert_eq!(
            parse_date(" 2025-02-01 "),
            Ok(NaiveDate::from_ymd_opt(2025, 2, 1).expect("valid date"))
        );
        assert!(parse_date("02/01/2025").is_err());
    }
}
