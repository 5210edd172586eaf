//! In-memory SQLite executor used as the probe's interception target.
//!
//! # Responsibility
//! - Implement the `executor` capability over one `rusqlite` connection.
//! - Translate JSON arguments and rows at the dispatch boundary.
//!
//! # Invariants
//! - Statement arguments carry their SQL under `sql`.
//! - Any call after `close` fails without touching the connection.

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::{json, Map, Value};
use sqlweave_core::{
    executor, BoxError, CallResult, Capability, CapabilitySet, DispatchTable, Signature, Target,
    TypeDescriptor,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

static BASE_EXECUTOR: TypeDescriptor = TypeDescriptor {
    name: "BaseExecutor",
    capabilities: &[Capability::Executor],
    parent: None,
};

static SQLITE_EXECUTOR: TypeDescriptor = TypeDescriptor {
    name: "SqliteExecutor",
    capabilities: &[],
    parent: Some(&BASE_EXECUTOR),
};

pub struct SqliteExecutor {
    table: DispatchTable<SqliteExecutor>,
    conn: Mutex<Connection>,
    closed: AtomicBool,
}

impl SqliteExecutor {
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let table = DispatchTable::new(&SQLITE_EXECUTOR)
            .on(executor::UPDATE, run_update)
            .on(executor::QUERY, run_query)
            .on(executor::COMMIT, |_target: &SqliteExecutor, _args| Ok(Value::Null))
            .on(executor::ROLLBACK, |_target: &SqliteExecutor, _args| Ok(Value::Null))
            .on(executor::CLOSE, |target: &SqliteExecutor, _args| {
                target.closed.store(true, Ordering::SeqCst);
                Ok(Value::Null)
            })
            .on(executor::IS_CLOSED, |target: &SqliteExecutor, _args| {
                Ok(json!(target.closed.load(Ordering::SeqCst)))
            });
        Ok(Self {
            table,
            conn: Mutex::new(Connection::open_in_memory()?),
            closed: AtomicBool::new(false),
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, BoxError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err("executor is closed".into());
        }
        self.conn
            .lock()
            .map_err(|_| "connection lock poisoned".into())
    }
}

impl Target for SqliteExecutor {
    fn type_name(&self) -> &str {
        self.table.type_name()
    }

    fn capabilities(&self) -> CapabilitySet {
        self.table.capabilities()
    }

    fn call(&self, signature: Signature, args: Vec<Value>) -> CallResult {
        self.table.dispatch(self, signature, &args)
    }
}

fn run_update(target: &SqliteExecutor, args: &[Value]) -> Result<Value, BoxError> {
    let sql = statement_sql(&args[0])?;
    let params = bind_params(&args[1]);
    let conn = target.connection()?;
    let changed = conn.execute(sql, params_from_iter(params.iter()))?;
    Ok(json!(changed))
}

fn run_query(target: &SqliteExecutor, args: &[Value]) -> Result<Value, BoxError> {
    let sql = statement_sql(&args[0])?;
    let params = bind_params(&args[1]);
    let conn = target.connection()?;

    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Map::new();
        for (index, name) in columns.iter().enumerate() {
            record.insert(name.clone(), column_to_json(row.get_ref(index)?));
        }
        records.push(Value::Object(record));
    }
    Ok(Value::Array(records))
}

fn statement_sql(statement: &Value) -> Result<&str, BoxError> {
    Ok(statement
        .get("sql")
        .and_then(Value::as_str)
        .ok_or("statement is missing `sql`")?)
}

fn bind_params(parameter: &Value) -> Vec<SqlValue> {
    match parameter {
        Value::Null => Vec::new(),
        Value::Array(values) => values.iter().map(json_to_sql).collect(),
        other => vec![json_to_sql(other)],
    }
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => SqlValue::Integer(integer),
            None => SqlValue::Real(number.as_f64().unwrap_or_default()),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn column_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(integer) => json!(integer),
        ValueRef::Real(real) => json!(real),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => json!(format!("<{} bytes>", bytes.len())),
    }
}
