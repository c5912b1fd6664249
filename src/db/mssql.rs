//! SQL Server driver implementation using tiberius.
//!
//! Sessions run with `IMPLICIT_TRANSACTIONS ON`, matching ODBC's
//! autocommit-off behavior: every DML statement opens a transaction that
//! stays pending until [`Session::commit`]. Discarding a session therefore
//! rolls back any uncommitted work server-side.

use crate::db::driver::{Connector, Cursor, Session};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionSettings, SqlParam};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use futures_util::TryStreamExt;
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use tiberius::{
    AuthMethod, Client, ColumnData, Config, EncryptionLevel, FromSql, QueryItem, QueryStream,
    ResultMetadata, Row as TiberiusRow,
};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

const COMMIT_STATEMENT: &str = "IF @@TRANCOUNT > 0 COMMIT TRANSACTION";

/// Opens tiberius sessions against one configured server.
pub struct MssqlConnector {
    settings: ConnectionSettings,
}

impl MssqlConnector {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self { settings }
    }

    fn tiberius_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.settings.host);
        config.port(self.settings.port);
        config.database(&self.settings.database);
        config.authentication(AuthMethod::sql_server(
            &self.settings.user,
            &self.settings.password,
        ));
        config.encryption(if self.settings.encrypt {
            EncryptionLevel::Required
        } else {
            EncryptionLevel::Off
        });
        if self.settings.trust_server_certificate {
            config.trust_cert();
        }
        config
    }

    async fn open_session(&self) -> DbResult<MssqlSession> {
        let config = self.tiberius_config();
        let addr = config.get_addr();

        let tcp = TcpStream::connect(&addr).await.map_err(|e| {
            DbError::connection(
                format!("Cannot reach {addr}: {e}"),
                "Verify MSSQL_HOST and MSSQL_PORT and that the server accepts TCP connections",
            )
        })?;
        tcp.set_nodelay(true).map_err(|e| {
            DbError::connection(
                format!("Cannot configure socket for {addr}: {e}"),
                "Check network stack health on the server host",
            )
        })?;

        let mut client = Client::connect(config, tcp.compat_write()).await?;

        // ODBC autocommit-off equivalence; commit() ends the open transaction.
        client.execute("SET IMPLICIT_TRANSACTIONS ON", &[]).await?;

        Ok(MssqlSession {
            client: Some(client),
        })
    }
}

#[async_trait]
impl Connector for MssqlConnector {
    async fn connect(&self) -> DbResult<Box<dyn Session>> {
        tracing::debug!(endpoint = %self.settings.endpoint(), "opening sql server session");

        let timeout = self.settings.connect_timeout;
        let session = tokio::time::timeout(timeout, self.open_session())
            .await
            .map_err(|_| DbError::timeout("connect", timeout.as_secs()))??;

        tracing::debug!(endpoint = %self.settings.endpoint(), "sql server session established");
        Ok(Box::new(session))
    }

    fn endpoint(&self) -> String {
        self.settings.endpoint()
    }
}

/// One live tiberius client. `client` is `None` after `close`.
pub struct MssqlSession {
    client: Option<Client<Compat<TcpStream>>>,
}

impl MssqlSession {
    fn client_mut(&mut self) -> DbResult<&mut Client<Compat<TcpStream>>> {
        self.client.as_mut().ok_or_else(|| {
            DbError::connection(
                "Session is closed",
                "Acquire a fresh connection from the pool",
            )
        })
    }
}

#[async_trait]
impl Session for MssqlSession {
    async fn query<'a>(
        &'a mut self,
        sql: &str,
        params: &[SqlParam],
    ) -> DbResult<Box<dyn Cursor + 'a>> {
        let client = self.client_mut()?;
        let bound = bind_params(params);
        let refs: Vec<&dyn tiberius::ToSql> = bound
            .iter()
            .map(|p| p as &dyn tiberius::ToSql)
            .collect();

        let stream = client.query(sql.to_owned(), &refs[..]).await?;
        let mut cursor = MssqlCursor::new(stream);
        cursor.prime().await?;
        Ok(Box::new(cursor))
    }

    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> DbResult<u64> {
        let client = self.client_mut()?;
        let bound = bind_params(params);
        let refs: Vec<&dyn tiberius::ToSql> = bound
            .iter()
            .map(|p| p as &dyn tiberius::ToSql)
            .collect();

        let result = client.execute(sql.to_owned(), &refs[..]).await?;
        Ok(result.rows_affected().iter().sum::<u64>())
    }

    async fn ping(&mut self) -> DbResult<()> {
        let stream = self.client_mut()?.simple_query("SELECT 1").await?;
        stream.into_first_result().await?;
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.client_mut()?.execute(COMMIT_STATEMENT, &[]).await?;
        Ok(())
    }

    async fn close(&mut self) -> DbResult<()> {
        if let Some(client) = self.client.take() {
            client.close().await?;
        }
        Ok(())
    }
}

/// Streaming cursor over a tiberius query.
///
/// tiberius yields a `Metadata` item at the start of every result set and
/// `Row` items after it; this wrapper turns that interleaving into the
/// per-result-set view the [`Cursor`] trait promises.
struct MssqlCursor<'a> {
    stream: QueryStream<'a>,
    columns: Option<Vec<String>>,
    /// Metadata of the next result set, seen while the caller was still
    /// reading the current one.
    pending_columns: Option<Vec<String>>,
    /// A row pulled ahead of its metadata. Not expected from the server, but
    /// cheap to handle.
    pending_row: Option<TiberiusRow>,
    set_exhausted: bool,
    stream_done: bool,
}

impl<'a> MssqlCursor<'a> {
    fn new(stream: QueryStream<'a>) -> Self {
        Self {
            stream,
            columns: None,
            pending_columns: None,
            pending_row: None,
            set_exhausted: false,
            stream_done: false,
        }
    }

    /// Pull the leading metadata item so `columns` answers immediately.
    async fn prime(&mut self) -> DbResult<()> {
        match self.stream.try_next().await? {
            Some(QueryItem::Metadata(meta)) => {
                self.columns = Some(metadata_names(&meta));
            }
            Some(QueryItem::Row(row)) => {
                self.columns = Some(row.columns().iter().map(|c| c.name().to_string()).collect());
                self.pending_row = Some(row);
            }
            None => self.stream_done = true,
        }
        Ok(())
    }
}

#[async_trait]
impl<'a> Cursor for MssqlCursor<'a> {
    fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    async fn next_row(&mut self) -> DbResult<Option<Vec<JsonValue>>> {
        if let Some(row) = self.pending_row.take() {
            return Ok(Some(row_values(row)?));
        }
        if self.set_exhausted || self.stream_done {
            return Ok(None);
        }

        match self.stream.try_next().await? {
            Some(QueryItem::Row(row)) => Ok(Some(row_values(row)?)),
            Some(QueryItem::Metadata(meta)) => {
                self.pending_columns = Some(metadata_names(&meta));
                self.set_exhausted = true;
                Ok(None)
            }
            None => {
                self.stream_done = true;
                Ok(None)
            }
        }
    }

    async fn advance(&mut self) -> DbResult<bool> {
        loop {
            if let Some(columns) = self.pending_columns.take() {
                self.columns = Some(columns);
                self.pending_row = None;
                self.set_exhausted = false;
                return Ok(true);
            }
            if self.stream_done {
                return Ok(false);
            }

            // Skip whatever is left of the current result set.
            match self.stream.try_next().await? {
                Some(QueryItem::Metadata(meta)) => {
                    self.columns = Some(metadata_names(&meta));
                    self.pending_row = None;
                    self.set_exhausted = false;
                    return Ok(true);
                }
                Some(QueryItem::Row(_)) => continue,
                None => {
                    self.stream_done = true;
                    return Ok(false);
                }
            }
        }
    }
}

fn metadata_names(meta: &ResultMetadata) -> Vec<String> {
    meta.columns().iter().map(|c| c.name().to_string()).collect()
}

fn row_values(row: TiberiusRow) -> DbResult<Vec<JsonValue>> {
    row.into_iter().map(column_data_to_json).collect()
}

/// Owned parameter value with a tiberius wire encoding.
#[derive(Debug)]
enum BoundParam {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
}

impl tiberius::ToSql for BoundParam {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            BoundParam::Null => ColumnData::I32(None),
            BoundParam::Bool(v) => ColumnData::Bit(Some(*v)),
            BoundParam::I64(v) => ColumnData::I64(Some(*v)),
            BoundParam::F64(v) => ColumnData::F64(Some(*v)),
            BoundParam::String(v) => ColumnData::String(Some(Cow::Borrowed(v.as_str()))),
        }
    }
}

fn bind_params(params: &[SqlParam]) -> Vec<BoundParam> {
    params
        .iter()
        .map(|param| match param {
            SqlParam::Null => BoundParam::Null,
            SqlParam::Bool(v) => BoundParam::Bool(*v),
            SqlParam::Int(v) => BoundParam::I64(*v),
            SqlParam::Float(v) => BoundParam::F64(*v),
            SqlParam::String(v) => BoundParam::String(v.clone()),
        })
        .collect()
}

/// Convert one tiberius column value into JSON.
///
/// Temporal, GUID, numeric and binary values become strings so nothing loses
/// precision in transit; binary data is base64.
fn column_data_to_json(data: ColumnData<'static>) -> DbResult<JsonValue> {
    let value = match data {
        ColumnData::Bit(v) => v.map(JsonValue::Bool).unwrap_or(JsonValue::Null),
        ColumnData::U8(v) => v.map(|n| JsonValue::from(n as i64)).unwrap_or(JsonValue::Null),
        ColumnData::I16(v) => v.map(|n| JsonValue::from(n as i64)).unwrap_or(JsonValue::Null),
        ColumnData::I32(v) => v.map(|n| JsonValue::from(n as i64)).unwrap_or(JsonValue::Null),
        ColumnData::I64(v) => v.map(JsonValue::from).unwrap_or(JsonValue::Null),
        ColumnData::F32(v) => v
            .and_then(|n| serde_json::Number::from_f64(n as f64))
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ColumnData::F64(v) => v
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ColumnData::String(v) => v
            .map(|s| JsonValue::String(s.into_owned()))
            .unwrap_or(JsonValue::Null),
        ColumnData::Guid(v) => v
            .map(|g| JsonValue::String(g.to_string()))
            .unwrap_or(JsonValue::Null),
        ColumnData::Binary(v) => v
            .map(|b| JsonValue::String(STANDARD.encode(b.as_ref())))
            .unwrap_or(JsonValue::Null),
        ColumnData::Numeric(v) => v
            .map(|n| JsonValue::String(n.to_string()))
            .unwrap_or(JsonValue::Null),
        ColumnData::Xml(v) => v
            .map(|x| JsonValue::String(x.into_owned().into_string()))
            .unwrap_or(JsonValue::Null),
        dt @ (ColumnData::DateTime(_)
        | ColumnData::SmallDateTime(_)
        | ColumnData::DateTime2(_)) => chrono::NaiveDateTime::from_sql(&dt)?
            .map(|v| JsonValue::String(v.to_string()))
            .unwrap_or(JsonValue::Null),
        d @ ColumnData::Date(_) => chrono::NaiveDate::from_sql(&d)?
            .map(|v| JsonValue::String(v.to_string()))
            .unwrap_or(JsonValue::Null),
        t @ ColumnData::Time(_) => chrono::NaiveTime::from_sql(&t)?
            .map(|v| JsonValue::String(v.to_string()))
            .unwrap_or(JsonValue::Null),
        dto @ ColumnData::DateTimeOffset(_) => {
            chrono::DateTime::<chrono::Utc>::from_sql(&dto)?
                .map(|v| JsonValue::String(v.to_rfc3339()))
                .unwrap_or(JsonValue::Null)
        }
    };

    Ok(value)
}
