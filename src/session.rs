/// Session Module
///
/// Everything one dashboard run carries between commands: the configuration,
/// the connection to the current database and the selected insight.
use crate::config::Config;
use crate::core::db::{ConnectionProvider, ConnectionSettings};
use crate::core::Result;
use crate::insights::{ChartView, InsightCursor};
use rusqlite::Connection;
use tracing::info;

#[derive(Debug)]
pub struct Session {
    config: Config,
    provider: ConnectionProvider,
    pub insights: InsightCursor,
    /// Chart style chosen for the current insight, if not its default
    pub chart_view: Option<ChartView>,
}

impl Session {
    /// Creates a session for the configured database without opening it.
    pub fn new(config: Config) -> Self {
        let provider = ConnectionProvider::new(config.database.connection_settings());
        Session {
            config,
            provider,
            insights: InsightCursor::default(),
            chart_view: None,
        }
    }

    /// Creates a session and opens the configured database.
    pub fn open(config: Config) -> Result<Self> {
        let mut session = Session::new(config);
        session.provider.connect()?;
        Ok(session)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database_path(&self) -> &str {
        &self.provider.settings().path
    }

    /// Switches to another database file, keeping the other settings.
    ///
    /// The current connection stays in place when the new one cannot be
    /// opened.
    pub fn connect(&mut self, path: &str) -> Result<()> {
        let settings = ConnectionSettings {
            path: path.to_string(),
            ..self.provider.settings().clone()
        };
        let provider = ConnectionProvider::open(settings)?;
        self.provider.close()?;
        self.provider = provider;
        info!("Session now using {}", path);
        Ok(())
    }

    /// The live connection, opened on first use.
    pub fn connection(&mut self) -> Result<&Connection> {
        self.provider.connection()
    }

    pub fn close(&mut self) -> Result<()> {
        self.provider.close()
    }
}
