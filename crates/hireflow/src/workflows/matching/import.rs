use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use super::domain::{CompetencyEvidence, CompetencyLevel, EvidenceSource, InvalidCompetencyLevel};
use crate::workflows::domain::{CandidateId, CompetencyId};

#[derive(Debug)]
pub enum EvidenceImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    Level {
        line: u64,
        source: InvalidCompetencyLevel,
    },
    Source {
        line: u64,
        value: String,
    },
}

impl std::fmt::Display for EvidenceImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvidenceImportError::Io(err) => write!(f, "failed to read evidence feed: {}", err),
            EvidenceImportError::Csv(err) => write!(f, "invalid evidence CSV data: {}", err),
            EvidenceImportError::Level { line, source } => {
                write!(f, "line {}: {}", line, source)
            }
            EvidenceImportError::Source { line, value } => {
                write!(f, "line {}: unknown evidence source `{}`", line, value)
            }
        }
    }
}

impl std::error::Error for EvidenceImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EvidenceImportError::Io(err) => Some(err),
            EvidenceImportError::Csv(err) => Some(err),
            EvidenceImportError::Level { source, .. } => Some(source),
            EvidenceImportError::Source { .. } => None,
        }
    }
}

impl From<std::io::Error> for EvidenceImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for EvidenceImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// Reads `candidate_id,competency_id,level,source` rows exported by the skills-testing
/// subsystem.
pub fn read_evidence<R: Read>(reader: R) -> Result<Vec<CompetencyEvidence>, EvidenceImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut evidence = Vec::new();

    for (index, row) in csv_reader.deserialize::<EvidenceRow>().enumerate() {
        let row = row?;
        // header is line 1
        let line = index as u64 + 2;
        let level = CompetencyLevel::new(row.level)
            .map_err(|source| EvidenceImportError::Level { line, source })?;
        let source = parse_source(&row.source).ok_or_else(|| EvidenceImportError::Source {
            line,
            value: row.source.clone(),
        })?;

        evidence.push(CompetencyEvidence {
            candidate_id: CandidateId(row.candidate_id),
            competency_id: CompetencyId(row.competency_id),
            level,
            source,
        });
    }

    Ok(evidence)
}

pub fn evidence_from_path<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<CompetencyEvidence>, EvidenceImportError> {
    let file = std::fs::File::open(path)?;
    read_evidence(file)
}

#[derive(Debug, Deserialize)]
struct EvidenceRow {
    candidate_id: u64,
    competency_id: u64,
    level: u8,
    source: String,
}

fn parse_source(value: &str) -> Option<EvidenceSource> {
    match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "certified" => Some(EvidenceSource::Certified),
        "self_declared" => Some(EvidenceSource::SelfDeclared),
        _ => None,
    }
}
