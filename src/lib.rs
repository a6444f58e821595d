#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use crate::config::{AnalysisFairing, ConfigFairing, DatabaseFairing};
use crate::logging::LoggerFairing;

pub mod analysis;
pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;

/// Assemble the server: routes, catchers, and the fairings that load
/// configuration, connect to the database and set up text analysis.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .register("/", api::catchers())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(AnalysisFairing)
}

/// Connect to the database named in the Rocket config.
#[cfg(test)]
pub(crate) async fn db_client() -> mongodb::Client {
    let db_uri = rocket::Config::figment()
        .extract_inner::<String>("db_uri")
        .expect("`db_uri` not set");
    mongodb::Client::with_uri_str(&db_uri)
        .await
        .expect("failed to connect to the test database")
}

/// A fresh database name for one test.
#[cfg(test)]
pub(crate) fn database() -> String {
    config::get_database_name()
}

/// A server wired to the given database and a scripted analyzer, bypassing
/// the database and analysis fairings.
#[cfg(test)]
pub(crate) async fn rocket_for_db_and_analyzer(
    client: mongodb::Client,
    db_name: &str,
    analyzer: analysis::ScriptedAnalyzer,
) -> Rocket<Build> {
    log4rs_test_utils::test_logging::init_logging_once_for(["survey_backend"], None, None);

    let db = client.database(db_name);
    model::mongodb::ensure_indexes_exist(&db)
        .await
        .expect("failed to create indexes");
    let orchestrator = analysis::AnalysisOrchestrator::new(std::sync::Arc::new(analyzer));

    rocket::build()
        .mount("/", api::routes())
        .register("/", api::catchers())
        .attach(ConfigFairing)
        .manage(client)
        .manage(db)
        .manage(orchestrator)
}
