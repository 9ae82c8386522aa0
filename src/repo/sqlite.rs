use crate::models::error::{BackupError, Result};
use crate::models::quote_row::{InstrumentKind, QuoteRow};
use chrono::NaiveDateTime;
use log::{debug, info};
use once_cell::sync::Lazy;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OptionalExtension;
use std::sync::{Arc, PoisonError, RwLock};

type DbPool = Pool<SqliteConnectionManager>;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static DB_POOL: Lazy<RwLock<Option<Arc<DbPool>>>> = Lazy::new(|| RwLock::new(None));

pub fn set_db_pool(db_file: &str) -> Result<()> {
    if db_file.is_empty() {
        return Err(BackupError::DatabaseConnection {
            path: db_file.to_string(),
            cause: "database file path cannot be empty; use ':memory:' for an in-memory database"
                .to_string(),
        });
    }

    info!("Initializing database connection pool: {}", db_file);

    let is_in_memory = db_file == ":memory:" || db_file.starts_with("file::memory:");
    let use_wal = !is_in_memory;

    let manager = SqliteConnectionManager::file(db_file).with_init(move |conn| {
        let mut pragmas = String::from(
            "PRAGMA busy_timeout = 5000;
                 PRAGMA synchronous = NORMAL;",
        );

        if use_wal {
            pragmas.push_str(" PRAGMA journal_mode = WAL;");
        }

        conn.execute_batch(&pragmas)
    });

    // The importer writes sequentially; a few spare connections cover readers
    let pool_size = num_cpus::get_physical().clamp(1, 4) + 1;
    let pool = r2d2::Pool::builder()
        .max_size(pool_size as u32)
        .build(manager)
        .map_err(|e| BackupError::DatabaseConnection {
            path: db_file.to_string(),
            cause: e.to_string(),
        })?;

    info!("Database pool created with {} connections", pool_size);

    let mut global_pool = DB_POOL.write().unwrap_or_else(PoisonError::into_inner);
    *global_pool = Some(Arc::new(pool));

    Ok(())
}

fn get_connection() -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
    let pool_lock = DB_POOL.read().unwrap_or_else(PoisonError::into_inner);
    let pool = pool_lock
        .as_ref()
        .ok_or_else(|| BackupError::DatabaseConnection {
            path: String::new(),
            cause: "database pool not initialized, call set_db_pool() first".to_string(),
        })?;

    pool.get().map_err(|e| BackupError::DatabaseConnection {
        path: String::new(),
        cause: format!("failed to get a connection from the pool: {}", e),
    })
}

pub fn setup_database() -> Result<()> {
    info!("Initializing database schema");
    let setup_queries = "BEGIN;
    PRAGMA ENCODING = 'UTF-8';

    CREATE TABLE IF NOT EXISTS Investments(
        ID                      integer not null
            constraint Investments_ID_pk
                primary key autoincrement,
        Code                    TEXT    not null,
        Name                    TEXT    not null,
        Kind                    TEXT    not null,
        Exchange                TEXT    not null,
        Currency                TEXT    not null,
        Price                   REAL    not null,
        Day_Change              REAL,
        Change_12m              REAL,
        Dividend_Yield          REAL,
        Assets_Under_Management REAL,
        Average_Volume          REAL,
        Risk                    TEXT,
        Issuer                  TEXT,
        Maturity                TEXT,
        Return_Rate             REAL,
        Updated_At              TEXT    not null,
        constraint Investments_Code_Key
            unique (Code),
        constraint Investments_Kind_Check
            check (Kind IN ('ACAO', 'CRIPTO')));

    CREATE INDEX IF NOT EXISTS Investments_Kind_index
            on Investments (Kind);

    COMMIT;";

    let conn = get_connection()?;
    conn.execute_batch(setup_queries)
        .map_err(|cause| BackupError::DatabaseQuery {
            operation: "create tables".to_string(),
            cause,
        })?;
    info!("Database schema initialized successfully");
    Ok(())
}

/// Inserts a quote, or refreshes the market fields of an existing row with
/// the same code. Descriptive columns keep their first-seen values.
pub fn upsert_quote(quote: &QuoteRow) -> Result<()> {
    let conn = get_connection()?;
    debug!("Upserting quote: {}", quote.code);

    conn.execute(
        "INSERT INTO Investments (Code, Name, Kind, Exchange, Currency, Price, Day_Change,
                Change_12m, Dividend_Yield, Assets_Under_Management, Average_Volume, Risk,
                Issuer, Maturity, Return_Rate, Updated_At)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
         ON CONFLICT (Code) DO UPDATE SET
             Price = excluded.Price,
             Day_Change = excluded.Day_Change,
             Change_12m = excluded.Change_12m,
             Dividend_Yield = excluded.Dividend_Yield,
             Assets_Under_Management = excluded.Assets_Under_Management,
             Average_Volume = excluded.Average_Volume,
             Updated_At = excluded.Updated_At",
        rusqlite::params![
            &quote.code,
            &quote.name,
            quote.kind.code(),
            &quote.exchange,
            &quote.currency,
            quote.price,
            quote.day_change,
            quote.change_12m,
            quote.dividend_yield,
            quote.assets_under_management,
            quote.average_volume,
            &quote.risk,
            &quote.issuer,
            &quote.maturity,
            quote.return_rate,
            quote.updated_at.format(TIMESTAMP_FORMAT).to_string(),
        ],
    )
    .map_err(|cause| BackupError::DatabaseUpsert {
        table: "Investments".to_string(),
        code: quote.code.clone(),
        cause,
    })?;
    Ok(())
}

pub fn select_quote(code: &str) -> Result<Option<QuoteRow>> {
    let conn = get_connection()?;
    let mut query = conn
        .prepare(
            "SELECT Code, Name, Kind, Exchange, Currency, Price, Day_Change, Change_12m,
                    Dividend_Yield, Assets_Under_Management, Average_Volume, Risk, Issuer,
                    Maturity, Return_Rate, Updated_At
                FROM Investments
                WHERE Code=?1",
        )
        .map_err(|cause| BackupError::DatabaseQuery {
            operation: "select quote".to_string(),
            cause,
        })?;

    query
        .query_row([code], |row| {
            let kind: String = row.get(2)?;
            let updated_at: String = row.get(15)?;
            Ok(QuoteRow {
                code: row.get(0)?,
                name: row.get(1)?,
                kind: if kind == InstrumentKind::Crypto.code() {
                    InstrumentKind::Crypto
                } else {
                    InstrumentKind::Stock
                },
                exchange: row.get(3)?,
                currency: row.get(4)?,
                price: row.get(5)?,
                day_change: row.get(6)?,
                change_12m: row.get(7)?,
                dividend_yield: row.get(8)?,
                assets_under_management: row.get(9)?,
                average_volume: row.get(10)?,
                risk: row.get(11)?,
                issuer: row.get(12)?,
                maturity: row.get(13)?,
                return_rate: row.get(14)?,
                updated_at: NaiveDateTime::parse_from_str(&updated_at, TIMESTAMP_FORMAT)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            15,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?,
            })
        })
        .optional()
        .map_err(|cause| BackupError::DatabaseQuery {
            operation: format!("select quote {}", code),
            cause,
        })
}

pub fn count_quotes() -> Result<u64> {
    let conn = get_connection()?;
    conn.query_row("SELECT COUNT(*) FROM Investments", [], |row| row.get(0))
        .map_err(|cause| BackupError::DatabaseQuery {
            operation: "count quotes".to_string(),
            cause,
        })
}
