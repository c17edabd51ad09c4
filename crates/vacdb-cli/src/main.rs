use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tracing::info;
use uuid::Uuid;
use vacdb_client::{HhClient, SearchConfig};
use vacdb_core::RunSummary;
use vacdb_storage::{connect_options, load_db_params, VacancyStore};

#[derive(Debug, Parser)]
#[command(name = "vacdb")]
#[command(about = "Fetch hh.ru vacancies into Postgres and print the fixed reports")]
struct Cli {
    /// INI file holding the database connection section.
    #[arg(long, default_value = "database.ini")]
    config: PathBuf,

    /// Section of the INI file to read connection parameters from.
    #[arg(long, default_value = "postgresql")]
    section: String,

    /// Search keyword sent to the vacancy API.
    #[arg(long, default_value = "Python")]
    keyword: String,

    /// Name of the database to drop and recreate.
    #[arg(long, default_value = "head_hunter")]
    dbname: String,

    /// Directory for the vacancies.json / employers.json snapshots.
    #[arg(long, default_value = ".")]
    snapshot_dir: PathBuf,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    info!(%run_id, keyword = %cli.keyword, dbname = %cli.dbname, "starting run");

    let params = load_db_params(&cli.config, &cli.section)?;
    let store = VacancyStore::new(&cli.dbname, connect_options(&params))?;

    println!("Creating database and tables");
    store.create_database().await?;

    println!("Collecting vacancies for {:?}", cli.keyword);
    let client = HhClient::new()?;
    let search = SearchConfig::new(&cli.keyword);
    let records = client
        .collect_all_vacancies(&search, &cli.snapshot_dir)
        .await?;

    println!("Ingesting {} records", records.len());
    let ingest = store.ingest(&records).await?;

    println!("\nCompanies and vacancy counts");
    for row in store.companies_and_vacancy_counts().await? {
        println!("{:<40} {}", row.employer_name, row.vacancies);
    }

    println!("\nAll vacancies with a known maximum salary");
    for row in store.vacancies_with_salary().await? {
        println!(
            "{:<30} {:<40} {:>9} {}",
            row.employer_name,
            row.vacancy_name,
            row.salary_max,
            row.url.as_deref().unwrap_or("-")
        );
    }

    println!("\nAverage maximum salary");
    match store.average_max_salary().await? {
        Some(average) => println!("{average}"),
        None => println!("no vacancies with a known salary"),
    }

    println!("\nVacancies above the average salary");
    for row in store.vacancies_above_average().await? {
        println!("{:<40} {:>9}", row.vacancy_name, row.salary_max);
    }

    println!("\nVacancies matching {:?}", cli.keyword);
    for name in store.vacancies_matching(&cli.keyword).await? {
        println!("{name}");
    }

    let summary = RunSummary {
        run_id,
        started_at,
        finished_at: Utc::now(),
        collected: records.len(),
        new_vacancies: ingest.new_vacancies,
        duplicate_vacancies: ingest.duplicate_vacancies,
    };
    println!(
        "\nrun {} finished: collected={} new={} duplicates={} elapsed={}s",
        summary.run_id,
        summary.collected,
        summary.new_vacancies,
        summary.duplicate_vacancies,
        (summary.finished_at - summary.started_at).num_seconds()
    );

    Ok(())
}
