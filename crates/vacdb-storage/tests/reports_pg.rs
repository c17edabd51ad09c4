//! Report and ingest behavior against a live Postgres server.
//!
//! These tests drop and recreate real databases, so they are ignored by
//! default. Run them against a local server with:
//!
//!   PGHOST=localhost PGUSER=postgres PGPASSWORD=postgres \
//!     cargo test -p vacdb-storage -- --ignored

use std::collections::BTreeMap;

use vacdb_core::VacancyRecord;
use vacdb_storage::{connect_options, VacancyStore};

fn store(dbname: &str) -> VacancyStore {
    let mut params = BTreeMap::new();
    params.insert(
        "host".to_string(),
        std::env::var("PGHOST").unwrap_or_else(|_| "localhost".to_string()),
    );
    params.insert(
        "port".to_string(),
        std::env::var("PGPORT").unwrap_or_else(|_| "5432".to_string()),
    );
    params.insert(
        "user".to_string(),
        std::env::var("PGUSER").unwrap_or_else(|_| "postgres".to_string()),
    );
    params.insert(
        "password".to_string(),
        std::env::var("PGPASSWORD").unwrap_or_else(|_| "postgres".to_string()),
    );
    VacancyStore::new(dbname, connect_options(&params)).unwrap()
}

fn record(
    vacancy_id: i32,
    name: &str,
    employer_id: i32,
    employer_name: &str,
    salary_max: Option<i32>,
) -> VacancyRecord {
    VacancyRecord {
        vacancy_id,
        name: name.to_string(),
        employer_id,
        employer_name: employer_name.to_string(),
        city: Some("Moscow".to_string()),
        salary_min: salary_max.map(|max| max / 2),
        salary_max,
        url: Some(format!("https://hh.ru/vacancy/{vacancy_id}")),
    }
}

fn sample_records() -> Vec<VacancyRecord> {
    vec![
        record(1, "Python Developer", 10, "Acme", Some(100)),
        record(2, "Rust Developer", 10, "Acme", Some(200)),
        record(3, "Go Developer", 10, "Acme", Some(300)),
        record(4, "Intern", 20, "Beta", None),
    ]
}

#[tokio::test]
#[ignore = "requires a local Postgres server"]
async fn ingest_is_idempotent_and_referentially_intact() {
    let store = store("vacdb_it_idempotent");
    store.create_database().await.unwrap();

    let records = sample_records();
    let first = store.ingest(&records).await.unwrap();
    assert_eq!(first.new_vacancies, 4);
    assert_eq!(first.new_employers, 2);

    // A repeat ingest of identical input changes nothing.
    let second = store.ingest(&records).await.unwrap();
    assert_eq!(second.new_vacancies, 0);
    assert_eq!(second.new_employers, 0);
    assert_eq!(second.duplicate_vacancies, 4);

    // Counts grouped per employer cover every ingested vacancy, so each
    // foreign key resolved.
    let counts = store.companies_and_vacancy_counts().await.unwrap();
    let total: i64 = counts.iter().map(|c| c.vacancies).sum();
    assert_eq!(total, 4);
}

#[tokio::test]
#[ignore = "requires a local Postgres server"]
async fn company_ranking_orders_by_count_then_name() {
    let store = store("vacdb_it_ranking");
    store.create_database().await.unwrap();
    store.ingest(&sample_records()).await.unwrap();

    let counts = store.companies_and_vacancy_counts().await.unwrap();
    assert_eq!(counts[0].employer_name, "Acme");
    assert_eq!(counts[0].vacancies, 3);
    assert_eq!(counts[1].employer_name, "Beta");
    assert_eq!(counts[1].vacancies, 1);
}

#[tokio::test]
#[ignore = "requires a local Postgres server"]
async fn salary_reports_skip_null_bounds_and_average_correctly() {
    let store = store("vacdb_it_salary");
    store.create_database().await.unwrap();
    store.ingest(&sample_records()).await.unwrap();

    let with_salary = store.vacancies_with_salary().await.unwrap();
    let names: Vec<_> = with_salary.iter().map(|v| v.vacancy_name.as_str()).collect();
    assert_eq!(names, ["Go Developer", "Rust Developer", "Python Developer"]);

    assert_eq!(store.average_max_salary().await.unwrap(), Some(200));

    // Strictly greater than the average: only the 300 entry qualifies.
    let above = store.vacancies_above_average().await.unwrap();
    assert_eq!(above.len(), 1);
    assert_eq!(above[0].vacancy_name, "Go Developer");
    assert_eq!(above[0].salary_max, 300);
}

#[tokio::test]
#[ignore = "requires a local Postgres server"]
async fn keyword_search_is_case_insensitive() {
    let store = store("vacdb_it_keyword");
    store.create_database().await.unwrap();
    store.ingest(&sample_records()).await.unwrap();

    let matches = store.vacancies_matching("python").await.unwrap();
    assert_eq!(matches, ["Python Developer"]);
}

#[tokio::test]
#[ignore = "requires a local Postgres server"]
async fn create_database_resets_previous_contents() {
    let store = store("vacdb_it_reset");
    store.create_database().await.unwrap();
    store.ingest(&sample_records()).await.unwrap();

    store.create_database().await.unwrap();
    let counts = store.companies_and_vacancy_counts().await.unwrap();
    assert!(counts.is_empty());
}
