use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::domain::{
    CandidateProfile, CompetencyEvidence, CompetencyLevel, EvidenceSource, Exclusion,
    ExclusionReason, JobPosting, JobRequirement, MatchResult, MatchTier, RequirementMatch,
    ScoredCandidate,
};
use super::service::MatchingError;
use crate::workflows::domain::{CandidateId, CompetencyId};

const DEFAULT_FORMAL_TEST_BONUS: u32 = 5;

/// Scoring knobs for the matching engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Added once when the candidate completed at least one formal skills test.
    pub formal_test_bonus: u32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            formal_test_bonus: DEFAULT_FORMAL_TEST_BONUS,
        }
    }
}

/// Stateless ranker applying the two-tier competency rubric.
#[derive(Debug, Clone, Default)]
pub struct MatchEngine {
    config: MatchingConfig,
}

type EvidenceIndex = HashMap<(CandidateId, CompetencyId), (CompetencyLevel, EvidenceSource)>;

impl MatchEngine {
    pub fn new(config: MatchingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Ranks `candidates` against the job. Candidates outside the job's functional area,
    /// without a completed profile, or with an inactive profile are not part of the
    /// population and are neither ranked nor counted as excluded.
    pub fn rank(
        &self,
        job: &JobPosting,
        requirements: &[JobRequirement],
        candidates: &[CandidateProfile],
        evidence: &[CompetencyEvidence],
    ) -> Result<MatchResult, MatchingError> {
        if requirements.is_empty() {
            return Err(MatchingError::Configuration(format!(
                "{} declares no competency requirements",
                job.job_id
            )));
        }

        let index = best_evidence(evidence);
        let mut tier1 = Vec::new();
        let mut tier2 = Vec::new();
        let mut exclusions = Vec::new();

        for candidate in candidates {
            if candidate.functional_area != job.functional_area || !candidate.profile_active {
                continue;
            }
            let Some(completed_at) = candidate.profile_completed_at else {
                continue;
            };

            match self.evaluate(candidate, requirements, &index) {
                Ok((contributions, bonus)) => {
                    let tier = if contributions
                        .iter()
                        .any(|contribution| contribution.source == EvidenceSource::Certified)
                    {
                        MatchTier::Certified
                    } else {
                        MatchTier::SelfDeclared
                    };
                    let score =
                        contributions.iter().map(|contribution| contribution.points).sum::<u32>()
                            + bonus;
                    let scored = ScoredCandidate {
                        candidate_id: candidate.candidate_id,
                        tier,
                        score,
                        formal_test_bonus: bonus,
                        profile_completed_at: completed_at,
                        contributions,
                    };
                    match tier {
                        MatchTier::Certified => tier1.push(scored),
                        MatchTier::SelfDeclared => tier2.push(scored),
                    }
                }
                Err(reason) => exclusions.push(Exclusion {
                    candidate_id: candidate.candidate_id,
                    reason,
                }),
            }
        }

        sort_tier(&mut tier1);
        sort_tier(&mut tier2);

        Ok(MatchResult {
            job_id: job.job_id,
            tier1,
            tier2,
            excluded_count: exclusions.len(),
            exclusions,
        })
    }

    fn evaluate(
        &self,
        candidate: &CandidateProfile,
        requirements: &[JobRequirement],
        index: &EvidenceIndex,
    ) -> Result<(Vec<RequirementMatch>, u32), ExclusionReason> {
        let mut contributions = Vec::with_capacity(requirements.len());

        for requirement in requirements {
            let competency_id = requirement.competency_id;
            let Some(&(level, source)) = index.get(&(candidate.candidate_id, competency_id))
            else {
                return Err(ExclusionReason::MissingEvidence { competency_id });
            };

            if requirement.test_required && source != EvidenceSource::Certified {
                return Err(ExclusionReason::CertificationRequired { competency_id });
            }

            if level < requirement.minimum_level {
                return Err(ExclusionReason::BelowMinimum {
                    competency_id,
                    required: requirement.minimum_level,
                    found: level,
                    source,
                });
            }

            contributions.push(RequirementMatch {
                competency_id,
                source,
                level,
                points: u32::from(level.value()) * source.weight(),
            });
        }

        let bonus = if candidate.completed_formal_tests > 0 {
            self.config.formal_test_bonus
        } else {
            0
        };

        Ok((contributions, bonus))
    }
}

/// Certified evidence wins over self-declared evidence for the same competency, regardless
/// of level.
fn best_evidence(evidence: &[CompetencyEvidence]) -> EvidenceIndex {
    let mut index = EvidenceIndex::new();

    for row in evidence {
        let key = (row.candidate_id, row.competency_id);
        let replace = match index.get(&key) {
            None => true,
            Some(&(level, source)) => {
                (source == EvidenceSource::SelfDeclared && row.source == EvidenceSource::Certified)
                    || (source == row.source && row.level > level)
            }
        };
        if replace {
            index.insert(key, (row.level, row.source));
        }
    }

    index
}

fn sort_tier(tier: &mut [ScoredCandidate]) {
    tier.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.profile_completed_at.cmp(&b.profile_completed_at))
            .then(a.candidate_id.cmp(&b.candidate_id))
    });
}
