//! Core domain model for the vacdb ingestion pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "vacdb-core";

/// Hiring organization as reported by the vacancy API.
///
/// The identifier is source-assigned; it is the primary key of the
/// `employers` table and the foreign key target of every vacancy.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Employer {
    pub employer_id: i32,
    pub employer_name: String,
}

/// Normalized vacancy listing ready for persistence.
///
/// Salary bounds are `None` when the source item carried no salary block;
/// items with a non-RUR salary never become records at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VacancyRecord {
    pub vacancy_id: i32,
    pub name: String,
    pub employer_id: i32,
    pub employer_name: String,
    pub city: Option<String>,
    pub salary_min: Option<i32>,
    pub salary_max: Option<i32>,
    pub url: Option<String>,
}

impl VacancyRecord {
    pub fn employer(&self) -> Employer {
        Employer {
            employer_id: self.employer_id,
            employer_name: self.employer_name.clone(),
        }
    }
}

/// Deduplicated employers from a collected listing, sorted by identifier.
pub fn unique_employers(records: &[VacancyRecord]) -> Vec<Employer> {
    let mut employers: Vec<Employer> = records.iter().map(VacancyRecord::employer).collect();
    employers.sort();
    employers.dedup_by_key(|e| e.employer_id);
    employers
}

/// End-of-run accounting printed by the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub collected: usize,
    pub new_vacancies: u64,
    pub duplicate_vacancies: u64,
}
