//! Postgres persistence for vacancy listings: database lifecycle, idempotent
//! ingest, and the fixed report queries. Connection parameters come from an
//! INI file section.

use std::collections::BTreeMap;
use std::path::Path;

use ini::Ini;
use serde::Serialize;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Row};
use thiserror::Error;
use tracing::info_span;
use vacdb_core::VacancyRecord;

pub const CRATE_NAME: &str = "vacdb-storage";

/// SQLSTATE raised when dropping a database that other sessions hold open.
const OBJECT_IN_USE: &str = "55006";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: ini::Error,
    },
    #[error("section {section:?} is not found in the {path} file")]
    SectionMissing { section: String, path: String },
}

/// Read one section of an INI file as an ordered key/value map.
pub fn load_db_params(
    path: impl AsRef<Path>,
    section: &str,
) -> Result<BTreeMap<String, String>, ConfigError> {
    let path = path.as_ref();
    let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let props = ini
        .section(Some(section))
        .ok_or_else(|| ConfigError::SectionMissing {
            section: section.to_string(),
            path: path.display().to_string(),
        })?;

    Ok(props
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect())
}

/// Map the conventional connection keys onto sqlx options. Unknown keys are
/// ignored; an unparsable port falls back to the Postgres default. The
/// target database name is supplied separately by the caller.
pub fn connect_options(params: &BTreeMap<String, String>) -> PgConnectOptions {
    let mut options = PgConnectOptions::new();
    if let Some(host) = params.get("host") {
        options = options.host(host);
    }
    if let Some(port) = params.get("port") {
        options = options.port(port.parse().unwrap_or(5432));
    }
    if let Some(user) = params.get("user") {
        options = options.username(user);
    }
    if let Some(password) = params.get("password") {
        options = options.password(password);
    }
    options
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("invalid database name {0:?}")]
    InvalidDatabaseName(String),
}

/// Counts new inserts vs. conflict-skipped duplicates for one ingest call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub new_employers: u64,
    pub duplicate_employers: u64,
    pub new_vacancies: u64,
    pub duplicate_vacancies: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanyVacancyCount {
    pub employer_name: String,
    pub vacancies: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalariedVacancy {
    pub employer_name: String,
    pub vacancy_name: String,
    pub salary_max: i32,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VacancySalary {
    pub vacancy_name: String,
    pub salary_max: i32,
}

/// Persistence manager over one target database. Every public method opens
/// its own connection; nothing is pooled or shared.
#[derive(Debug, Clone)]
pub struct VacancyStore {
    dbname: String,
    options: PgConnectOptions,
}

impl VacancyStore {
    pub fn new(dbname: impl Into<String>, options: PgConnectOptions) -> Result<Self, StoreError> {
        let dbname = dbname.into();
        if !is_valid_dbname(&dbname) {
            return Err(StoreError::InvalidDatabaseName(dbname));
        }
        Ok(Self { dbname, options })
    }

    pub fn dbname(&self) -> &str {
        &self.dbname
    }

    async fn connect(&self) -> Result<PgConnection, sqlx::Error> {
        PgConnection::connect_with(&self.options.clone().database(&self.dbname)).await
    }

    async fn connect_maintenance(&self) -> Result<PgConnection, sqlx::Error> {
        PgConnection::connect_with(&self.options.clone().database("postgres")).await
    }

    /// Drop and recreate the target database, then create the two tables.
    ///
    /// A drop that fails because other sessions hold the database open is
    /// resolved by terminating those sessions and retrying once; any other
    /// error propagates.
    pub async fn create_database(&self) -> Result<(), StoreError> {
        let span = info_span!("create_database", dbname = %self.dbname);
        let _guard = span.enter();

        let mut conn = self.connect_maintenance().await?;
        let drop_sql = format!("DROP DATABASE IF EXISTS {}", self.dbname);
        if let Err(err) = sqlx::query(&drop_sql).execute(&mut conn).await {
            if !is_object_in_use(&err) {
                return Err(err.into());
            }
            tracing::warn!(dbname = %self.dbname, "database in use, terminating backends");
            sqlx::query(
                "SELECT pg_terminate_backend(pg_stat_activity.pid) \
                 FROM pg_stat_activity \
                 WHERE pg_stat_activity.datname = $1",
            )
            .bind(&self.dbname)
            .execute(&mut conn)
            .await?;
            sqlx::query(&drop_sql).execute(&mut conn).await?;
        }
        sqlx::query(&format!("CREATE DATABASE {}", self.dbname))
            .execute(&mut conn)
            .await?;
        conn.close().await?;

        let mut conn = self.connect().await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS employers (\
                 employer_id int PRIMARY KEY, \
                 employer_name varchar(255) UNIQUE NOT NULL)",
        )
        .execute(&mut conn)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vacancies (\
                 vacancy_id int PRIMARY KEY, \
                 vacancy_name varchar(255) NOT NULL, \
                 employer_id int REFERENCES employers(employer_id) NOT NULL, \
                 city text, \
                 salary_min int, \
                 salary_max int, \
                 url text)",
        )
        .execute(&mut conn)
        .await?;
        conn.close().await?;
        Ok(())
    }

    /// Insert records one statement at a time, employer before its vacancy
    /// so the foreign key always resolves. Duplicate keys are no-ops, which
    /// makes a repeat ingest of identical input idempotent.
    pub async fn ingest(&self, records: &[VacancyRecord]) -> Result<IngestSummary, StoreError> {
        let span = info_span!("ingest", dbname = %self.dbname, records = records.len());
        let _guard = span.enter();

        let mut conn = self.connect().await?;
        let mut summary = IngestSummary::default();
        for record in records {
            let result = sqlx::query(
                "INSERT INTO employers (employer_id, employer_name) \
                 VALUES ($1, $2) \
                 ON CONFLICT (employer_id) DO NOTHING",
            )
            .bind(record.employer_id)
            .bind(&record.employer_name)
            .execute(&mut conn)
            .await?;
            if result.rows_affected() > 0 {
                summary.new_employers += 1;
            } else {
                summary.duplicate_employers += 1;
            }

            let result = sqlx::query(
                "INSERT INTO vacancies \
                 (vacancy_id, vacancy_name, employer_id, city, salary_min, salary_max, url) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (vacancy_id) DO NOTHING",
            )
            .bind(record.vacancy_id)
            .bind(&record.name)
            .bind(record.employer_id)
            .bind(&record.city)
            .bind(record.salary_min)
            .bind(record.salary_max)
            .bind(&record.url)
            .execute(&mut conn)
            .await?;
            if result.rows_affected() > 0 {
                summary.new_vacancies += 1;
            } else {
                summary.duplicate_vacancies += 1;
            }
        }
        conn.close().await?;
        Ok(summary)
    }

    /// Employer names with their vacancy counts, busiest employer first,
    /// ties broken alphabetically.
    pub async fn companies_and_vacancy_counts(
        &self,
    ) -> Result<Vec<CompanyVacancyCount>, StoreError> {
        let mut conn = self.connect().await?;
        let rows = sqlx::query(
            "SELECT employer_name, COUNT(*) AS quantity_vacancies \
             FROM vacancies \
             LEFT JOIN employers USING (employer_id) \
             GROUP BY employer_name \
             ORDER BY quantity_vacancies DESC, employer_name",
        )
        .fetch_all(&mut conn)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(CompanyVacancyCount {
                employer_name: row.try_get("employer_name")?,
                vacancies: row.try_get("quantity_vacancies")?,
            });
        }
        Ok(out)
    }

    /// Every vacancy with a known maximum salary, highest-paid first.
    pub async fn vacancies_with_salary(&self) -> Result<Vec<SalariedVacancy>, StoreError> {
        let mut conn = self.connect().await?;
        let rows = sqlx::query(
            "SELECT employers.employer_name, vacancy_name, salary_max, url \
             FROM vacancies \
             JOIN employers USING (employer_id) \
             WHERE salary_max IS NOT NULL \
             ORDER BY salary_max DESC, vacancy_name",
        )
        .fetch_all(&mut conn)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(SalariedVacancy {
                employer_name: row.try_get("employer_name")?,
                vacancy_name: row.try_get("vacancy_name")?,
                salary_max: row.try_get("salary_max")?,
                url: row.try_get("url")?,
            });
        }
        Ok(out)
    }

    /// Rounded average of the known maximum salaries; `None` when no
    /// vacancy carries one.
    pub async fn average_max_salary(&self) -> Result<Option<i32>, StoreError> {
        let mut conn = self.connect().await?;
        let row = sqlx::query(
            "SELECT ROUND(AVG(salary_max))::int AS average_salary FROM vacancies",
        )
        .fetch_one(&mut conn)
        .await?;
        Ok(row.try_get("average_salary")?)
    }

    /// Vacancies whose maximum salary is strictly above the average.
    pub async fn vacancies_above_average(&self) -> Result<Vec<VacancySalary>, StoreError> {
        let mut conn = self.connect().await?;
        let rows = sqlx::query(
            "SELECT vacancy_name, salary_max \
             FROM vacancies \
             WHERE salary_max > (SELECT AVG(salary_max) FROM vacancies) \
             ORDER BY salary_max DESC, vacancy_name",
        )
        .fetch_all(&mut conn)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(VacancySalary {
                vacancy_name: row.try_get("vacancy_name")?,
                salary_max: row.try_get("salary_max")?,
            });
        }
        Ok(out)
    }

    /// Vacancy names case-insensitively containing the keyword.
    pub async fn vacancies_matching(&self, keyword: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connect().await?;
        let rows = sqlx::query(
            "SELECT vacancy_name FROM vacancies \
             WHERE vacancy_name ILIKE $1 \
             ORDER BY vacancy_name",
        )
        .bind(like_pattern(keyword))
        .fetch_all(&mut conn)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(row.try_get("vacancy_name")?);
        }
        Ok(out)
    }
}

/// Substring match pattern for the keyword report.
pub fn like_pattern(keyword: &str) -> String {
    format!("%{keyword}%")
}

/// The database name is interpolated into DROP/CREATE DATABASE statements
/// (they cannot take bind parameters), so restrict it to a plain
/// lowercase identifier.
pub fn is_valid_dbname(name: &str) -> bool {
    !name.is_empty()
        && name.chars().next().is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn is_object_in_use(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == OBJECT_IN_USE)
}
