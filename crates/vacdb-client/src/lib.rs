//! HeadHunter search API client: paginated fetch, normalization, snapshots.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;
use tracing::info_span;
use uuid::Uuid;
use vacdb_core::{unique_employers, VacancyRecord};

pub const CRATE_NAME: &str = "vacdb-client";

pub const DEFAULT_BASE_URL: &str = "https://api.hh.ru/vacancies";
pub const DEFAULT_PER_PAGE: u32 = 100;

/// Only salaries quoted in this currency are retained; items quoting any
/// other currency are dropped entirely during normalization.
pub const LOCAL_CURRENCY: &str = "RUR";

/// Fixed politeness pause between page requests.
const PAGE_DELAY: Duration = Duration::from_millis(200);

/// Request parameters passed explicitly to each call, so repeated or
/// concurrent use never races on shared mutable state.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub base_url: String,
    pub text: String,
    pub per_page: u32,
}

impl SearchConfig {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            text: text.into(),
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

/// One page of the search response, as returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage {
    pub items: Vec<RawVacancy>,
    /// Total page count reported by the API for the current query.
    pub pages: u32,
    #[serde(default)]
    pub page: u32,
}

/// Vacancy item as it appears on the wire. Identifiers arrive as decimal
/// strings and are parsed during normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct RawVacancy {
    pub id: String,
    pub name: String,
    pub employer: RawEmployer,
    pub salary: Option<RawSalary>,
    pub area: Option<RawArea>,
    pub alternate_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEmployer {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSalary {
    pub from: Option<i32>,
    pub to: Option<i32>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawArea {
    pub name: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("malformed vacancy item: non-numeric {field} {value:?}")]
    MalformedItem { field: &'static str, value: String },
    #[error(transparent)]
    Snapshot(#[from] anyhow::Error),
}

/// Thin wrapper over a shared `reqwest` client. All request state lives in
/// the `SearchConfig` argument.
#[derive(Debug)]
pub struct HhClient {
    http: reqwest::Client,
}

impl HhClient {
    pub fn new() -> Result<Self, FetchError> {
        let http = reqwest::Client::builder().gzip(true).brotli(true).build()?;
        Ok(Self { http })
    }

    /// Fetch a single search page. Any non-success status is an explicit
    /// `FetchError::HttpStatus`; callers never receive a silent absence.
    pub async fn fetch_page(
        &self,
        config: &SearchConfig,
        page: u32,
    ) -> Result<SearchPage, FetchError> {
        let page_param = page.to_string();
        let per_page_param = config.per_page.to_string();
        let resp = self
            .http
            .get(&config.base_url)
            .query(&[
                ("text", config.text.as_str()),
                ("page", page_param.as_str()),
                ("per_page", per_page_param.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: resp.url().to_string(),
            });
        }

        Ok(resp.json::<SearchPage>().await?)
    }

    /// Walk every page the API reports for the query, normalizing items as
    /// they arrive and pausing between pages. The full collected list is
    /// also written to `vacancies.json` / `employers.json` under
    /// `snapshot_dir` as a debugging snapshot.
    pub async fn collect_all_vacancies(
        &self,
        config: &SearchConfig,
        snapshot_dir: &Path,
    ) -> Result<Vec<VacancyRecord>, FetchError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("collect_vacancies", %run_id, text = %config.text);
        let _guard = span.enter();

        let mut records = Vec::new();
        let mut page = 0u32;
        loop {
            let search_page = self.fetch_page(config, page).await?;
            records.extend(normalize_items(&search_page.items)?);
            tracing::debug!(page, pages = search_page.pages, collected = records.len());

            page += 1;
            if page >= search_page.pages {
                break;
            }
            tokio::time::sleep(PAGE_DELAY).await;
        }

        write_snapshots(snapshot_dir, &records).await?;
        Ok(records)
    }
}

/// Shape raw items into persistable records.
///
/// An item with a salary quoted in a foreign currency is dropped entirely;
/// an item with no salary block (or no currency code on it) is kept with
/// both bounds null.
pub fn normalize_items(items: &[RawVacancy]) -> Result<Vec<VacancyRecord>, FetchError> {
    let mut records = Vec::with_capacity(items.len());
    for item in items {
        let (salary_min, salary_max) = match &item.salary {
            Some(salary) => match salary.currency.as_deref() {
                Some(LOCAL_CURRENCY) => (salary.from, salary.to),
                Some(_) => continue,
                None => (None, None),
            },
            None => (None, None),
        };

        records.push(VacancyRecord {
            vacancy_id: parse_id("vacancy id", &item.id)?,
            name: item.name.clone(),
            employer_id: parse_id("employer id", &item.employer.id)?,
            employer_name: item.employer.name.clone(),
            city: item.area.as_ref().map(|area| area.name.clone()),
            salary_min,
            salary_max,
            url: item.alternate_url.clone(),
        });
    }
    Ok(records)
}

fn parse_id(field: &'static str, value: &str) -> Result<i32, FetchError> {
    value.parse().map_err(|_| FetchError::MalformedItem {
        field,
        value: value.to_string(),
    })
}

/// Persist the collected list as pretty-printed JSON artifacts. These are
/// debug outputs only; nothing in a later run reads them back.
async fn write_snapshots(dir: &Path, records: &[VacancyRecord]) -> anyhow::Result<()> {
    let vacancies_path = snapshot_path(dir, "vacancies.json");
    let vacancies = serde_json::to_vec_pretty(records).context("serializing vacancies snapshot")?;
    tokio::fs::write(&vacancies_path, vacancies)
        .await
        .with_context(|| format!("writing {}", vacancies_path.display()))?;

    let employers_path = snapshot_path(dir, "employers.json");
    let employers = serde_json::to_vec_pretty(&unique_employers(records))
        .context("serializing employers snapshot")?;
    tokio::fs::write(&employers_path, employers)
        .await
        .with_context(|| format!("writing {}", employers_path.display()))?;

    Ok(())
}

fn snapshot_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(name)
}
