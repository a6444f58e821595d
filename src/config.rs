use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use log::{error, info, warn};
use mongodb::{error::Error as DbError, Client as MongoClient, Database};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::{de::DeserializeOwned, Deserialize};

use crate::analysis::{AnalysisOrchestrator, Analyzer, DisabledAnalyzer, RemoteAnalyzer};
use crate::model::mongodb::ensure_indexes_exist;

fn default_analysis_timeout() -> u64 {
    30
}

/// Settings read from `Rocket.toml` and `ROCKET_*` environment variables.
#[derive(Deserialize)]
pub struct Config {
    auth_ttl: u32,
    #[serde(default)]
    analysis_url: Option<String>,
    #[serde(default = "default_analysis_timeout")]
    analysis_timeout: u64,
    jwt_secret: String,
    #[serde(default)]
    analysis_api_key: Option<String>,
}

impl Config {
    /// Valid lifetime of auth tokens in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Secret key used to sign JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Base URL of the text analysis service, if there is one.
    pub fn analysis_url(&self) -> Option<&str> {
        self.analysis_url.as_deref()
    }

    /// Bearer key sent to the text analysis service.
    pub fn analysis_api_key(&self) -> Option<&str> {
        self.analysis_api_key.as_deref()
    }

    /// How long to wait for the text analysis service before giving up.
    pub fn analysis_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.analysis_timeout)
    }
}

/// Pull a config section out of Rocket's figment, printing Rocket's own
/// diagnostics on failure.
fn extract_section<T: DeserializeOwned>(rocket: &Rocket<Build>, section: &str) -> Option<T> {
    match rocket.figment().extract::<T>() {
        Ok(value) => Some(value),
        Err(e) => {
            error!("Invalid {section} config");
            rocket::config::pretty_print_error(e);
            None
        }
    }
}

/// Loads [`Config`] into managed state.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        match extract_section::<Config>(&rocket, "application") {
            Some(config) => Ok(rocket.manage(config)),
            None => Err(rocket),
        }
    }
}

#[derive(Deserialize)]
struct DbConfig {
    db_uri: String,
}

/// Open the survey database and make sure its indexes are in place.
async fn connect(db_uri: &str) -> Result<(MongoClient, Database), DbError> {
    let client = MongoClient::with_uri_str(db_uri).await?;
    let db = client.database(&get_database_name());
    ensure_indexes_exist(&db).await?;
    Ok((client, db))
}

/// Connects to MongoDB and manages both the `Client` (needed for
/// transactions and sessions) and the survey `Database`.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let Some(config) = extract_section::<DbConfig>(&rocket, "database") else {
            return Err(rocket);
        };
        match connect(&config.db_uri).await {
            Ok((client, db)) => {
                info!("Connected to database `{}`", db.name());
                Ok(rocket.manage(client).manage(db))
            }
            Err(e) => {
                error!("Database unavailable: {e}");
                Err(rocket)
            }
        }
    }
}

#[cfg(not(test))]
fn get_database_name() -> String {
    "surveys".to_string()
}

/// Every test gets a database of its own.
#[cfg(test)]
pub(crate) fn get_database_name() -> String {
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    db
}

/// A fairing that builds the text analysis collaborator from the managed
/// [`Config`] and places an [`AnalysisOrchestrator`] into managed state.
///
/// Must be attached after [`ConfigFairing`].
pub struct AnalysisFairing;

#[rocket::async_trait]
impl Fairing for AnalysisFairing {
    fn info(&self) -> Info {
        Info {
            name: "Text analysis",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let Some(config) = rocket.state::<Config>() else {
            error!("Text analysis requires the application config to be loaded first");
            return Err(rocket);
        };

        let analyzer: Arc<dyn Analyzer> = match config.analysis_url() {
            Some(url) => match RemoteAnalyzer::new(
                url,
                config.analysis_api_key(),
                config.analysis_timeout(),
            ) {
                Ok(remote) => {
                    info!("Using text analysis service at {url}");
                    Arc::new(remote)
                }
                Err(e) => {
                    error!("Failed to set up text analysis client: {e}");
                    return Err(rocket);
                }
            },
            None => {
                warn!("No `analysis_url` configured, text analysis is disabled");
                Arc::new(DisabledAnalyzer)
            }
        };

        Ok(rocket.manage(AnalysisOrchestrator::new(analyzer)))
    }
}
