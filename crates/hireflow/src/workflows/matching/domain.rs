use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::domain::{CandidateId, CompanyId, CompetencyId, JobId, Money};

/// Competency level on the 0–4 scale produced by the skills-testing subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct CompetencyLevel(u8);

impl CompetencyLevel {
    pub const MAX: u8 = 4;

    pub fn new(level: u8) -> Result<Self, InvalidCompetencyLevel> {
        if level <= Self::MAX {
            Ok(Self(level))
        } else {
            Err(InvalidCompetencyLevel(level))
        }
    }

    pub const fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for CompetencyLevel {
    type Error = InvalidCompetencyLevel;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CompetencyLevel> for u8 {
    fn from(level: CompetencyLevel) -> Self {
        level.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("competency level {0} is outside the 0-4 scale")]
pub struct InvalidCompetencyLevel(pub u8);

/// Origin of a competency level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    Certified,
    SelfDeclared,
}

impl EvidenceSource {
    pub const fn label(self) -> &'static str {
        match self {
            EvidenceSource::Certified => "certified",
            EvidenceSource::SelfDeclared => "self_declared",
        }
    }

    /// Points awarded per competency level.
    pub const fn weight(self) -> u32 {
        match self {
            EvidenceSource::Certified => 3,
            EvidenceSource::SelfDeclared => 1,
        }
    }
}

/// Read-only competency row from the evidence feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetencyEvidence {
    pub candidate_id: CandidateId,
    pub competency_id: CompetencyId,
    pub level: CompetencyLevel,
    pub source: EvidenceSource,
}

/// Competency a job demands before candidates are ranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequirement {
    pub job_id: JobId,
    pub competency_id: CompetencyId,
    pub minimum_level: CompetencyLevel,
    /// Only certified evidence satisfies the requirement.
    #[serde(default)]
    pub test_required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionalArea(pub String);

impl FunctionalArea {
    pub fn new(area: impl Into<String>) -> Self {
        Self(area.into())
    }
}

/// Published job opening as seen by the matching engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPosting {
    pub job_id: JobId,
    pub company_id: CompanyId,
    pub title: String,
    pub functional_area: FunctionalArea,
    pub annual_salary: Option<Money>,
}

/// Candidate attributes the engine needs to build the population.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub candidate_id: CandidateId,
    pub functional_area: FunctionalArea,
    pub profile_completed_at: Option<DateTime<Utc>>,
    pub completed_formal_tests: u32,
    pub profile_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    /// At least one requirement met by certified evidence.
    Certified,
    SelfDeclared,
}

impl MatchTier {
    pub const fn label(self) -> &'static str {
        match self {
            MatchTier::Certified => "certified_match",
            MatchTier::SelfDeclared => "self_declared_match",
        }
    }
}

/// How one requirement was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementMatch {
    pub competency_id: CompetencyId,
    pub source: EvidenceSource,
    pub level: CompetencyLevel,
    pub points: u32,
}

/// Qualifying candidate with the tier and raw score used for ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate_id: CandidateId,
    pub tier: MatchTier,
    pub score: u32,
    pub formal_test_bonus: u32,
    pub profile_completed_at: DateTime<Utc>,
    pub contributions: Vec<RequirementMatch>,
}

impl ScoredCandidate {
    pub fn points_for(&self, competency_id: CompetencyId) -> Option<u32> {
        self.contributions
            .iter()
            .find(|contribution| contribution.competency_id == competency_id)
            .map(|contribution| contribution.points)
    }
}

/// Why a candidate in the population did not qualify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExclusionReason {
    MissingEvidence {
        competency_id: CompetencyId,
    },
    CertificationRequired {
        competency_id: CompetencyId,
    },
    BelowMinimum {
        competency_id: CompetencyId,
        required: CompetencyLevel,
        found: CompetencyLevel,
        source: EvidenceSource,
    },
}

impl ExclusionReason {
    pub fn summary(&self) -> String {
        match self {
            ExclusionReason::MissingEvidence { competency_id } => {
                format!("no evidence for {competency_id}")
            }
            ExclusionReason::CertificationRequired { competency_id } => {
                format!("{competency_id} requires certified evidence")
            }
            ExclusionReason::BelowMinimum {
                competency_id,
                required,
                found,
                source,
            } => format!(
                "{competency_id} at {} level {} below required {}",
                source.label(),
                found.value(),
                required.value()
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub candidate_id: CandidateId,
    pub reason: ExclusionReason,
}

/// Two-tier ranking for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub job_id: JobId,
    pub tier1: Vec<ScoredCandidate>,
    pub tier2: Vec<ScoredCandidate>,
    pub excluded_count: usize,
    pub exclusions: Vec<Exclusion>,
}

impl MatchResult {
    /// Tier 1 followed by tier 2, in presentation order.
    pub fn ranked(&self) -> impl Iterator<Item = &ScoredCandidate> {
        self.tier1.iter().chain(self.tier2.iter())
    }

    pub fn qualifying_count(&self) -> usize {
        self.tier1.len() + self.tier2.len()
    }
}
