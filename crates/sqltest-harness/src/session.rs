//! Database sessions the engine executes statements against.
//!
//! The engine only needs to know whether a statement raised an error and,
//! for queries, whether a first row could be read. Drivers adapt their
//! native client to that contract behind the [`Session`] trait.

use std::fmt;
use std::path::PathBuf;

use rusqlite::{Batch, Connection};
use sqltest_error::{Result, SqlTestError};
use tracing::{debug, info, warn};

use crate::case::SqlFailure;

/// Result of executing one statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Execution {
    /// The statement produced a result set that can be read with
    /// [`Session::fetch_one`].
    pub has_result_set: bool,
}

/// One open connection to the system under test.
pub trait Session {
    /// Execute a single SQL statement.
    fn execute(&mut self, sql: &str) -> std::result::Result<Execution, SqlFailure>;

    /// Read one row from the result set of the last executed statement.
    /// Returns `true` if a row was available.
    fn fetch_one(&mut self) -> std::result::Result<bool, SqlFailure>;

    /// Short label for logs, e.g. the driver and target.
    fn describe(&self) -> String;
}

impl<S: Session + ?Sized> Session for Box<S> {
    fn execute(&mut self, sql: &str) -> std::result::Result<Execution, SqlFailure> {
        (**self).execute(sql)
    }

    fn fetch_one(&mut self) -> std::result::Result<bool, SqlFailure> {
        (**self).fetch_one()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// User and password supplied outside the connection URL.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    /// Pair up optional user and password options. Both or neither must be
    /// present.
    pub fn from_parts(user: Option<String>, password: Option<String>) -> Result<Option<Self>> {
        match (user, password) {
            (Some(user), Some(password)) => Ok(Some(Self { user, password })),
            (None, None) => Ok(None),
            (Some(_), None) => Err(SqlTestError::invalid_config(
                "a user was given without a password; pass both or put both in the URL",
            )),
            (None, Some(_)) => Err(SqlTestError::invalid_config(
                "a password was given without a user; pass both or put both in the URL",
            )),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Supported session drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Sqlite,
    #[cfg(feature = "mysql")]
    Mysql,
}

impl Driver {
    /// Resolve a driver identifier as given on the command line.
    pub fn parse(identifier: &str) -> Result<Self> {
        match identifier.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" | "rusqlite" => Ok(Self::Sqlite),
            #[cfg(feature = "mysql")]
            "mysql" | "mariadb" => Ok(Self::Mysql),
            _ => Err(SqlTestError::UnsupportedDriver {
                driver: identifier.to_owned(),
            }),
        }
    }
}

/// Everything needed to open a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSpec {
    pub driver: String,
    pub url: String,
    pub credentials: Option<Credentials>,
}

impl ConnectionSpec {
    pub fn new(driver: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            url: url.into(),
            credentials: None,
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Load the driver and open a session.
    pub fn connect(&self) -> Result<Box<dyn Session>> {
        let driver = Driver::parse(&self.driver)?;
        debug!(
            driver = %self.driver,
            url = %self.url,
            user = self.credentials.as_ref().map(|c| c.user.as_str()),
            "opening session"
        );
        let session: Box<dyn Session> = match driver {
            Driver::Sqlite => {
                if self.credentials.is_some() {
                    warn!(driver = %self.driver, "sqlite ignores user and password");
                }
                Box::new(SqliteSession::open(&self.url)?)
            }
            #[cfg(feature = "mysql")]
            Driver::Mysql => Box::new(mysql::MysqlSession::open(
                &self.url,
                self.credentials.as_ref(),
            )?),
        };
        info!(session = %session.describe(), "session opened");
        Ok(session)
    }
}

/// Where a sqlite URL points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteTarget {
    Memory,
    File(PathBuf),
}

impl SqliteTarget {
    /// Accepts `sqlite::memory:`, `:memory:`, `sqlite://<path>`,
    /// `sqlite:<path>`, or a bare path.
    pub fn parse(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        if rest.is_empty() {
            return Err(SqlTestError::Connect {
                url: url.to_owned(),
                detail: "missing database path".to_owned(),
            });
        }
        if rest == ":memory:" {
            return Ok(Self::Memory);
        }
        Ok(Self::File(PathBuf::from(rest)))
    }
}

/// Session backed by an embedded SQLite connection.
///
/// Queries step their first row during `execute` and remember whether one
/// was available, so no statement handle outlives the call.
#[derive(Debug)]
pub struct SqliteSession {
    conn: Connection,
    target: SqliteTarget,
    pending_row: Option<bool>,
}

impl SqliteSession {
    pub fn open(url: &str) -> Result<Self> {
        let target = SqliteTarget::parse(url)?;
        let conn = match &target {
            SqliteTarget::Memory => Connection::open_in_memory(),
            SqliteTarget::File(path) => Connection::open(path),
        }
        .map_err(|err| SqlTestError::Connect {
            url: url.to_owned(),
            detail: err.to_string(),
        })?;
        Ok(Self {
            conn,
            target,
            pending_row: None,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }
}

impl Session for SqliteSession {
    fn execute(&mut self, sql: &str) -> std::result::Result<Execution, SqlFailure> {
        self.pending_row = None;
        let mut batch = Batch::new(&self.conn, sql);
        let Some(mut stmt) = batch.next()? else {
            return Ok(Execution {
                has_result_set: false,
            });
        };
        // Any text after the first statement must be whitespace or comments;
        // otherwise nothing in the entry runs.
        if !matches!(batch.next(), Ok(None)) {
            return Err(SqlFailure::new(format!(
                "entry holds more than one statement: {sql}"
            )));
        }
        if stmt.column_count() == 0 {
            stmt.execute([])?;
            return Ok(Execution {
                has_result_set: false,
            });
        }
        let first_row = {
            let mut rows = stmt.query([])?;
            rows.next()?.is_some()
        };
        self.pending_row = Some(first_row);
        Ok(Execution {
            has_result_set: true,
        })
    }

    fn fetch_one(&mut self) -> std::result::Result<bool, SqlFailure> {
        self.pending_row
            .take()
            .ok_or_else(|| SqlFailure::new("no result set is open"))
    }

    fn describe(&self) -> String {
        match &self.target {
            SqliteTarget::Memory => "sqlite::memory:".to_owned(),
            SqliteTarget::File(path) => format!("sqlite:{}", path.display()),
        }
    }
}

impl From<rusqlite::Error> for SqlFailure {
    fn from(err: rusqlite::Error) -> Self {
        let failure = Self::new(err.to_string());
        match err.sqlite_error() {
            Some(code) => failure.with_vendor_code(code.extended_code),
            None => failure,
        }
    }
}

#[cfg(feature = "mysql")]
mod mysql {
    use mysql_async::prelude::Queryable;
    use mysql_async::{Conn, Opts, OptsBuilder};
    use sqltest_error::{Result, SqlTestError};
    use tokio::runtime::{Builder, Runtime};

    use super::{Credentials, Execution, Session};
    use crate::case::SqlFailure;

    /// Session backed by a MySQL-protocol server, driven on a private
    /// current-thread runtime so callers stay synchronous.
    pub struct MysqlSession {
        runtime: Runtime,
        conn: Option<Conn>,
        url: String,
        pending_row: Option<bool>,
    }

    impl MysqlSession {
        pub fn open(url: &str, credentials: Option<&Credentials>) -> Result<Self> {
            let connect_error = |detail: String| SqlTestError::Connect {
                url: url.to_owned(),
                detail,
            };
            let runtime = Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|err| connect_error(err.to_string()))?;
            let opts = Opts::from_url(url).map_err(|err| connect_error(err.to_string()))?;
            let mut builder = OptsBuilder::from_opts(opts);
            if let Some(credentials) = credentials {
                builder = builder
                    .user(Some(credentials.user.clone()))
                    .pass(Some(credentials.password.clone()));
            }
            let conn = runtime
                .block_on(Conn::new(builder))
                .map_err(|err| connect_error(err.to_string()))?;
            Ok(Self {
                runtime,
                conn: Some(conn),
                url: url.to_owned(),
                pending_row: None,
            })
        }
    }

    impl Session for MysqlSession {
        fn execute(&mut self, sql: &str) -> std::result::Result<Execution, SqlFailure> {
            self.pending_row = None;
            let conn = self
                .conn
                .as_mut()
                .ok_or_else(|| SqlFailure::new("session is closed"))?;
            let first_row = self.runtime.block_on(async {
                let mut result = conn.query_iter(sql).await?;
                let has_result_set = !result.columns_ref().is_empty();
                let first_row = if has_result_set {
                    Some(result.next().await?.is_some())
                } else {
                    None
                };
                result.drop_result().await?;
                Ok::<_, mysql_async::Error>(first_row)
            })?;
            self.pending_row = first_row;
            Ok(Execution {
                has_result_set: first_row.is_some(),
            })
        }

        fn fetch_one(&mut self) -> std::result::Result<bool, SqlFailure> {
            self.pending_row
                .take()
                .ok_or_else(|| SqlFailure::new("no result set is open"))
        }

        fn describe(&self) -> String {
            format!("mysql:{}", self.url)
        }
    }

    impl Drop for MysqlSession {
        fn drop(&mut self) {
            if let Some(conn) = self.conn.take() {
                if let Err(err) = self.runtime.block_on(conn.disconnect()) {
                    tracing::warn!(error = %err, "mysql disconnect failed");
                }
            }
        }
    }

    impl From<mysql_async::Error> for SqlFailure {
        fn from(err: mysql_async::Error) -> Self {
            match &err {
                mysql_async::Error::Server(server) => Self::new(server.message.clone())
                    .with_vendor_code(i32::from(server.code))
                    .with_vendor_state(server.state.clone()),
                _ => Self::new(err.to_string()),
            }
        }
    }
}
