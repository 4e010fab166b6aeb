use crate::infra::{
    build_services, parse_date, seed_demo_catalog, seed_demo_store, LoggingDispatcher, Pipeline,
    DEMO_ANALYST_JOB,
};
use chrono::{Local, NaiveDate};
use clap::Args;
use hireflow::clock::{Clock, FixedClock};
use hireflow::config::AppConfig;
use hireflow::error::AppError;
use hireflow::store::{MemoryStore, RepositoryError};
use hireflow::workflows::billing::{AddOnService, PaymentConfirmation};
use hireflow::workflows::domain::{CandidacyId, JobId};
use hireflow::workflows::matching::{evidence_from_path, MatchResult, MatchingError};
use hireflow::workflows::pipeline::{Actor, ActorRole, PipelineState, TransitionRequest};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Job to run the demo against.
    #[arg(long, default_value_t = DEMO_ANALYST_JOB.0)]
    pub(crate) job: u64,
    /// Simulated start date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Request a refund this many days after the hire instead of letting the warranty run out.
    #[arg(long)]
    pub(crate) refund_after_days: Option<i64>,
}

#[derive(Args, Debug)]
pub(crate) struct MatchArgs {
    /// Competency evidence CSV (candidate_id,competency_id,level,source)
    #[arg(long)]
    pub(crate) evidence: PathBuf,
    /// Job to rank candidates for
    #[arg(long, default_value_t = DEMO_ANALYST_JOB.0)]
    pub(crate) job: u64,
    /// Evaluation date (defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

fn demo_clock(today: Option<NaiveDate>) -> Result<Arc<FixedClock>, AppError> {
    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let start = today
        .and_hms_opt(9, 0, 0)
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            MatchingError::from(RepositoryError::Unavailable(format!(
                "invalid demo date {today}"
            )))
        })?;
    Ok(Arc::new(FixedClock::new(start)))
}

pub(crate) fn run_match(args: MatchArgs) -> Result<(), AppError> {
    let MatchArgs {
        evidence,
        job,
        today,
    } = args;

    let config = AppConfig::load()?;
    let clock = demo_clock(today)?;
    let store = Arc::new(MemoryStore::new());
    seed_demo_catalog(&store, clock.today())?;

    let rows = evidence_from_path(&evidence)?;
    println!("Loaded {} evidence rows from {}", rows.len(), evidence.display());
    for row in rows {
        store.record_evidence(row).map_err(MatchingError::from)?;
    }

    let (_, matching) = build_services(
        &config,
        store,
        Arc::new(LoggingDispatcher::default()),
        clock,
    );
    let result = matching.preview(JobId(job))?;
    render_ranking(&result);
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        job,
        today,
        refund_after_days,
    } = args;

    let config = AppConfig::load()?;
    let clock = demo_clock(today)?;
    let store = Arc::new(MemoryStore::new());
    seed_demo_store(&store, clock.today())?;

    let dispatcher = Arc::new(LoggingDispatcher::default());
    let shared: Arc<dyn Clock> = clock.clone();
    let (pipeline, matching) = build_services(&config, store, dispatcher.clone(), shared);

    println!("Hiring pipeline demo");
    let outcome = matching.match_job(JobId(job))?;
    render_ranking(&outcome.result);
    println!(
        "- {} pairings opened, {} refreshed",
        outcome.opened, outcome.refreshed
    );

    let Some(top) = outcome.pairings.first() else {
        println!("No qualifying candidates; nothing to walk through the pipeline.");
        return Ok(());
    };
    let id = top.candidacy_id;
    println!("\nWalking {} ({})", id, top.candidate_id);

    let company = Actor::new("demo-recruiter", ActorRole::Company);
    let candidate = Actor::new("demo-candidate", ActorRole::Candidate);
    let system = Actor::system("demo-automation");

    render_company_view(&pipeline, id)?;
    for request in [
        TransitionRequest::new(PipelineState::TestsDone, system),
        TransitionRequest::new(PipelineState::CompanyInterest, company.clone()),
        TransitionRequest::new(PipelineState::InterviewAccepted, candidate),
        TransitionRequest::new(PipelineState::Selected, company.clone()),
        TransitionRequest::new(PipelineState::Hired, company.clone())
            .with_add_ons([AddOnService::SoftSkillsTest]),
    ] {
        let outcome = pipeline.transition(id, request)?;
        println!(
            "- {} -> {} by {} ({} notifications)",
            outcome
                .transition
                .previous_state
                .map(|state| state.label())
                .unwrap_or("none"),
            outcome.transition.new_state,
            outcome.transition.actor_role,
            outcome.notifications.len()
        );
        if outcome.transition.new_state == PipelineState::InterviewAccepted {
            render_company_view(&pipeline, id)?;
        }
    }

    let Some(charge) = pipeline.charge_for(id)? else {
        println!("Hire did not open a charge.");
        return Ok(());
    };
    println!(
        "\nSuccess fee {}: fee {} + add-ons {} = {} due {}",
        charge.id,
        charge.fee,
        charge.add_on_total(),
        charge.amount_total,
        charge.due_on
    );

    let paid = pipeline.confirm_payment(
        id,
        PaymentConfirmation {
            charge_id: charge.id,
            method: "wire".to_string(),
            external_transaction_id: format!("demo-{}", charge.id.0),
            amount_paid: charge.amount_total,
        },
    )?;
    if let (Some(start), Some(end)) = (paid.record.warranty_start, paid.record.warranty_end) {
        println!("Payment confirmed; warranty runs {start} to {end}");
    }

    match refund_after_days {
        Some(days) => {
            clock.advance_days(days);
            match pipeline.request_refund(id, company, Some("demo departure".to_string())) {
                Ok(outcome) => {
                    if let Some(quote) = outcome.record.refund {
                        println!(
                            "Refund requested after {} days: {} of {} ({} bps)",
                            quote.elapsed_days, quote.amount, quote.base_amount, quote.rate_bps
                        );
                    }
                }
                Err(err) => println!("Refund refused: {err}"),
            }
            let report = pipeline.sweep_warranties()?;
            println!("Warranty sweep resolved {} refunds", report.refunds_resolved.len());
        }
        None => {
            clock.advance_days(config.billing.warranty_days + 1);
            let report = pipeline.sweep_warranties()?;
            println!("Warranty sweep completed {} warranties", report.completed.len());
        }
    }

    println!("\nAudit trail for {id}:");
    for row in pipeline.history(id)? {
        println!(
            "  {} {} -> {} by {} [{}]{}",
            row.recorded_at.format("%Y-%m-%d"),
            row.previous_state
                .map(|state| state.label())
                .unwrap_or("none"),
            row.new_state,
            row.actor_id,
            row.actor_role,
            if row.automatic { " automatic" } else { "" }
        );
    }
    println!("Notifications dispatched: {}", dispatcher.dispatched());

    Ok(())
}

fn render_ranking(result: &MatchResult) {
    println!("Ranking for {}", result.job_id);
    for (label, tier) in [("Tier 1", &result.tier1), ("Tier 2", &result.tier2)] {
        println!("{label}:");
        if tier.is_empty() {
            println!("  (none)");
        }
        for scored in tier {
            println!(
                "  - {} score {} (formal test bonus {})",
                scored.candidate_id, scored.score, scored.formal_test_bonus
            );
        }
    }
    println!("Excluded: {}", result.excluded_count);
    for exclusion in &result.exclusions {
        println!("  - {}: {}", exclusion.candidate_id, exclusion.reason.summary());
    }
}

fn render_company_view(pipeline: &Pipeline, id: CandidacyId) -> Result<(), AppError> {
    let view = pipeline.get(id)?.company_view();
    match serde_json::to_string(&view) {
        Ok(json) => println!("  Company view: {json}"),
        Err(err) => println!("  Company view unavailable: {err}"),
    }
    Ok(())
}
