// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use anyhow::{Context, Result};
use chrono::Utc;
use common::{
    Case, CaseDecisionLink, CreateCustomerPayload, Customer, Task, UpdateCustomerPayload,
};
use sqlx::{Row, Sqlite, SqlitePool, migrate::MigrateDatabase};
use tracing::{debug, info};

/// Establishes the database connection pool.
/// If the database does not exist, it creates it.
/// It also ensures all tables have the correct schema.
pub async fn establish_connection_pool(database_url: &str) -> Result<SqlitePool> {
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        info!("Creating database {}", database_url);
        Sqlite::create_database(database_url)
            .await
            .context("Failed to create database")?;
    } else {
        info!("Database already exists.");
    }

    let pool = SqlitePool::connect(database_url)
        .await
        .context("Failed to connect to database")?;

    apply_schema(&pool).await?;

    info!("Database schema is ready.");

    Ok(pool)
}

/// Creates all tables and indexes, and runs the idempotent column
/// migrations for databases created by older releases. Also used by the
/// tests to prepare in-memory databases.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // raw_sql: the schema block is several statements in one script.
    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS customers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            customer_code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            contact_person TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL DEFAULT '',
            phone TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'Active',
            segment TEXT NOT NULL DEFAULT '',
            owner TEXT NOT NULL DEFAULT '',
            notes TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cases (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            case_number TEXT NOT NULL UNIQUE,
            client_name TEXT NOT NULL,
            reference_number TEXT NOT NULL DEFAULT '',
            case_date TEXT NOT NULL DEFAULT '',
            notes TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'Open',
            due_date TEXT NOT NULL DEFAULT '',
            storage_folder_path TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            start_iso TEXT NOT NULL,
            end_iso TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT '',
            case_id INTEGER NULL,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        );

        CREATE TABLE IF NOT EXISTS case_customers (
            case_id INTEGER NOT NULL,
            customer_id INTEGER NOT NULL,
            PRIMARY KEY (case_id, customer_id)
        );

        CREATE TABLE IF NOT EXISTS diavgeia_decisions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ada TEXT NOT NULL UNIQUE,
            subject TEXT NOT NULL DEFAULT '',
            protocol_number TEXT NOT NULL DEFAULT '',
            decision_type_id TEXT NOT NULL DEFAULT '',
            organization_id TEXT NOT NULL DEFAULT '',
            organization_label TEXT NOT NULL DEFAULT '',
            issue_date TEXT NOT NULL DEFAULT '',
            document_url TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT '',
            submitter_uid TEXT NOT NULL DEFAULT '',
            unit_uid TEXT NOT NULL DEFAULT '',
            thematic_category_ids TEXT NOT NULL DEFAULT '[]',
            attachments TEXT NOT NULL DEFAULT '[]',
            extra_field_values TEXT NOT NULL DEFAULT '{}',
            private_data TEXT NOT NULL DEFAULT '{}',
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            last_fetched_at TIMESTAMP NOT NULL
        );

        CREATE TABLE IF NOT EXISTS case_diavgeia_links (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            case_id INTEGER NOT NULL,
            decision_ada TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMP NOT NULL,
            FOREIGN KEY (case_id) REFERENCES cases(id) ON DELETE CASCADE,
            FOREIGN KEY (decision_ada) REFERENCES diavgeia_decisions(ada) ON DELETE CASCADE
        );
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create tables")?;

    // Columns added after the first release; harmless on a fresh schema.
    ensure_column(pool, "cases", "status", "TEXT NOT NULL DEFAULT 'Open'").await?;
    ensure_column(pool, "cases", "due_date", "TEXT NOT NULL DEFAULT ''").await?;
    ensure_column(pool, "tasks", "case_id", "INTEGER NULL").await?;

    sqlx::raw_sql(
        r#"
        CREATE INDEX IF NOT EXISTS idx_case_customers_case_id ON case_customers (case_id);
        CREATE INDEX IF NOT EXISTS idx_case_customers_customer_id ON case_customers (customer_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_case_id ON tasks (case_id);
        CREATE INDEX IF NOT EXISTS idx_diavgeia_ada ON diavgeia_decisions (ada);
        CREATE INDEX IF NOT EXISTS idx_diavgeia_issue_date ON diavgeia_decisions (issue_date);
        CREATE INDEX IF NOT EXISTS idx_diavgeia_organization ON diavgeia_decisions (organization_id);
        CREATE INDEX IF NOT EXISTS idx_case_diavgeia_case ON case_diavgeia_links (case_id);
        CREATE INDEX IF NOT EXISTS idx_case_diavgeia_ada ON case_diavgeia_links (decision_ada);
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create indexes")?;

    Ok(())
}

/// Adds a column if it is missing (idempotent migration for database
/// files created before the column existed).
async fn ensure_column(pool: &SqlitePool, table: &str, column: &str, definition: &str) -> Result<()> {
    let rows = sqlx::query(&format!("PRAGMA table_info({table})"))
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to inspect table '{table}'"))?;

    let exists = rows
        .iter()
        .any(|row| row.get::<String, _>("name") == column);
    if !exists {
        info!("Adding missing column {}.{}", table, column);
        sqlx::query(&format!("ALTER TABLE {table} ADD COLUMN {column} {definition}"))
            .execute(pool)
            .await
            .with_context(|| format!("Failed to add column {table}.{column}"))?;
    }

    Ok(())
}

// --- Customers ---

/// Lists customers, optionally filtered by a case-insensitive substring
/// match over code, name, contact person and email; newest update first.
pub async fn list_customers_from_db(pool: &SqlitePool, q: Option<&str>) -> Result<Vec<Customer>> {
    let q = q.map(str::trim).filter(|s| !s.is_empty());

    let customers = match q {
        None => {
            sqlx::query_as::<_, Customer>("SELECT * FROM customers ORDER BY updated_at DESC")
                .fetch_all(pool)
                .await
        }
        Some(q) => {
            let like = format!("%{q}%");
            sqlx::query_as::<_, Customer>(
                r#"SELECT * FROM customers
                   WHERE customer_code LIKE ? OR name LIKE ? OR contact_person LIKE ? OR email LIKE ?
                   ORDER BY updated_at DESC"#,
            )
            .bind(&like)
            .bind(&like)
            .bind(&like)
            .bind(&like)
            .fetch_all(pool)
            .await
        }
    }
    .context("Failed to list customers from DB")?;

    Ok(customers)
}

pub async fn get_customer_from_db(pool: &SqlitePool, id: i64) -> Result<Option<Customer>> {
    let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to load customer from DB")?;

    Ok(customer)
}

/// Picks the next unused customer code: the larger of the autoincrement
/// sequence and the maximum numeric code already stored, plus one.
///
/// Not safe under concurrent creation (two callers can compute the same
/// code); the unique constraint turns the loser into a conflict. Accepted
/// for a single-operator office tool.
pub async fn next_customer_code_from_db(pool: &SqlitePool) -> Result<String> {
    // sqlite_sequence only exists after the first AUTOINCREMENT insert;
    // treat a missing table as an empty sequence.
    let seq: Option<i64> =
        sqlx::query_scalar("SELECT seq FROM sqlite_sequence WHERE name = 'customers'")
            .fetch_optional(pool)
            .await
            .unwrap_or(None);

    let max_code: Option<i64> =
        sqlx::query_scalar("SELECT MAX(CAST(customer_code AS INTEGER)) FROM customers")
            .fetch_one(pool)
            .await
            .context("Failed to read max customer code from DB")?;

    let next = (seq.unwrap_or(0) + 1).max(max_code.unwrap_or(0) + 1);
    Ok(next.to_string())
}

pub async fn create_customer_in_db(
    pool: &SqlitePool,
    customer_code: &str,
    name: &str,
    payload: &CreateCustomerPayload,
) -> Result<Customer> {
    let now = Utc::now();
    let status = payload.status.unwrap_or_default();

    debug!("Insert customer: code={}, name={}", customer_code, name);

    let id = sqlx::query(
        r#"INSERT INTO customers
           (customer_code, name, contact_person, email, phone, status, segment, owner, notes, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(customer_code)
    .bind(name)
    .bind(payload.contact_person.as_deref().unwrap_or(""))
    .bind(payload.email.as_deref().unwrap_or(""))
    .bind(payload.phone.as_deref().unwrap_or(""))
    .bind(status)
    .bind(payload.segment.as_deref().unwrap_or(""))
    .bind(payload.owner.as_deref().unwrap_or(""))
    .bind(payload.notes.as_deref().unwrap_or(""))
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to insert customer into DB")?
    .last_insert_rowid();

    get_customer_from_db(pool, id)
        .await?
        .context("Customer vanished right after insert")
}

pub async fn update_customer_in_db(
    pool: &SqlitePool,
    id: i64,
    customer_code: &str,
    name: &str,
    payload: &UpdateCustomerPayload,
) -> Result<Customer> {
    let now = Utc::now();
    let status = payload.status.unwrap_or_default();

    sqlx::query(
        r#"UPDATE customers
           SET customer_code=?, name=?, contact_person=?, email=?, phone=?, status=?, segment=?, owner=?, notes=?, updated_at=?
           WHERE id=?"#,
    )
    .bind(customer_code)
    .bind(name)
    .bind(payload.contact_person.as_deref().unwrap_or(""))
    .bind(payload.email.as_deref().unwrap_or(""))
    .bind(payload.phone.as_deref().unwrap_or(""))
    .bind(status)
    .bind(payload.segment.as_deref().unwrap_or(""))
    .bind(payload.owner.as_deref().unwrap_or(""))
    .bind(payload.notes.as_deref().unwrap_or(""))
    .bind(now)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to update customer in DB")?;

    get_customer_from_db(pool, id)
        .await?
        .context("Customer vanished during update")
}

/// First customer whose name equals `name` exactly, if any. Used to
/// auto-link a freshly created case to its client.
pub async fn find_customer_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Customer>> {
    let customer =
        sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE name = ? ORDER BY id LIMIT 1")
            .bind(name)
            .fetch_optional(pool)
            .await
            .context("Failed to look up customer by name")?;

    Ok(customer)
}

pub async fn count_customers_in_db(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
        .fetch_one(pool)
        .await
        .context("Failed to count customers")?;

    Ok(count)
}

// --- Cases ---

/// Field set for a case insert or update; the handler resolves defaults
/// and the derived storage folder before calling in.
#[derive(Debug)]
pub struct CaseRecord<'a> {
    pub case_number: &'a str,
    pub client_name: &'a str,
    pub reference_number: &'a str,
    pub case_date: &'a str,
    pub notes: &'a str,
    pub status: &'a str,
    pub due_date: &'a str,
    pub storage_folder_path: &'a str,
}

pub async fn list_cases_from_db(pool: &SqlitePool, q: Option<&str>) -> Result<Vec<Case>> {
    let q = q.map(str::trim).filter(|s| !s.is_empty());

    let cases = match q {
        None => {
            sqlx::query_as::<_, Case>("SELECT * FROM cases ORDER BY updated_at DESC")
                .fetch_all(pool)
                .await
        }
        Some(q) => {
            let like = format!("%{q}%");
            sqlx::query_as::<_, Case>(
                r#"SELECT * FROM cases
                   WHERE case_number LIKE ? OR client_name LIKE ? OR reference_number LIKE ?
                   ORDER BY updated_at DESC"#,
            )
            .bind(&like)
            .bind(&like)
            .bind(&like)
            .fetch_all(pool)
            .await
        }
    }
    .context("Failed to list cases from DB")?;

    Ok(cases)
}

pub async fn get_case_from_db(pool: &SqlitePool, id: i64) -> Result<Option<Case>> {
    let case = sqlx::query_as::<_, Case>("SELECT * FROM cases WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to load case from DB")?;

    Ok(case)
}

pub async fn create_case_in_db(pool: &SqlitePool, record: &CaseRecord<'_>) -> Result<Case> {
    let now = Utc::now();

    debug!(
        "Insert case: number={}, client={}",
        record.case_number, record.client_name
    );

    let id = sqlx::query(
        r#"INSERT INTO cases
           (case_number, client_name, reference_number, case_date, notes, status, due_date, storage_folder_path, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(record.case_number)
    .bind(record.client_name)
    .bind(record.reference_number)
    .bind(record.case_date)
    .bind(record.notes)
    .bind(record.status)
    .bind(record.due_date)
    .bind(record.storage_folder_path)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to insert case into DB")?
    .last_insert_rowid();

    get_case_from_db(pool, id)
        .await?
        .context("Case vanished right after insert")
}

pub async fn update_case_in_db(
    pool: &SqlitePool,
    id: i64,
    record: &CaseRecord<'_>,
) -> Result<Case> {
    let now = Utc::now();

    sqlx::query(
        r#"UPDATE cases
           SET case_number=?, client_name=?, reference_number=?, case_date=?, notes=?, status=?, due_date=?, storage_folder_path=?, updated_at=?
           WHERE id=?"#,
    )
    .bind(record.case_number)
    .bind(record.client_name)
    .bind(record.reference_number)
    .bind(record.case_date)
    .bind(record.notes)
    .bind(record.status)
    .bind(record.due_date)
    .bind(record.storage_folder_path)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to update case in DB")?;

    get_case_from_db(pool, id)
        .await?
        .context("Case vanished during update")
}

pub async fn count_active_cases_in_db(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cases WHERE status != 'Completed'")
        .fetch_one(pool)
        .await
        .context("Failed to count active cases")?;

    Ok(count)
}

// --- Case <-> customer links ---

/// Replaces the customer set linked to a case: delete all existing links,
/// insert the new set, all inside one transaction so a failure never
/// leaves the case with a partial link set.
pub async fn set_case_customers_in_db(
    pool: &SqlitePool,
    case_id: i64,
    customer_ids: &[i64],
) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin link-replace transaction")?;

    sqlx::query("DELETE FROM case_customers WHERE case_id = ?")
        .bind(case_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear existing case-customer links")?;

    for customer_id in customer_ids {
        sqlx::query("INSERT INTO case_customers (case_id, customer_id) VALUES (?, ?)")
            .bind(case_id)
            .bind(customer_id)
            .execute(&mut *tx)
            .await
            .context("Failed to insert case-customer link")?;
    }

    tx.commit()
        .await
        .context("Failed to commit link-replace transaction")?;

    Ok(())
}

/// Customers explicitly linked to a case, by name.
pub async fn load_case_customers_from_db(pool: &SqlitePool, case_id: i64) -> Result<Vec<Customer>> {
    let customers = sqlx::query_as::<_, Customer>(
        r#"SELECT c.*
           FROM case_customers cc
           JOIN customers c ON c.id = cc.customer_id
           WHERE cc.case_id = ?
           ORDER BY c.name"#,
    )
    .bind(case_id)
    .fetch_all(pool)
    .await
    .context("Failed to load case customers from DB")?;

    Ok(customers)
}

/// Two-step customer resolution for display: prefer explicit links; only
/// when a case has zero links fall back to customers whose name equals
/// the denormalized `client_name` exactly.
pub async fn resolve_case_customers(pool: &SqlitePool, case: &Case) -> Result<Vec<Customer>> {
    let linked = load_case_customers_from_db(pool, case.id).await?;
    if !linked.is_empty() || case.client_name.is_empty() {
        return Ok(linked);
    }

    let by_name = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE name = ?")
        .bind(&case.client_name)
        .fetch_all(pool)
        .await
        .context("Failed to match customers by client name")?;

    Ok(by_name)
}

/// Cases explicitly linked to a customer, newest update first.
pub async fn load_customer_cases_from_db(pool: &SqlitePool, customer_id: i64) -> Result<Vec<Case>> {
    let cases = sqlx::query_as::<_, Case>(
        r#"SELECT ca.*
           FROM case_customers cc
           JOIN cases ca ON ca.id = cc.case_id
           WHERE cc.customer_id = ?
           ORDER BY ca.updated_at DESC"#,
    )
    .bind(customer_id)
    .fetch_all(pool)
    .await
    .context("Failed to load customer cases from DB")?;

    Ok(cases)
}

/// Mirror of [`resolve_case_customers`] for the customer side.
pub async fn resolve_customer_cases(pool: &SqlitePool, customer: &Customer) -> Result<Vec<Case>> {
    let linked = load_customer_cases_from_db(pool, customer.id).await?;
    if !linked.is_empty() || customer.name.is_empty() {
        return Ok(linked);
    }

    let by_name = sqlx::query_as::<_, Case>(
        "SELECT * FROM cases WHERE client_name = ? ORDER BY updated_at DESC",
    )
    .bind(&customer.name)
    .fetch_all(pool)
    .await
    .context("Failed to match cases by client name")?;

    Ok(by_name)
}

// --- Tasks ---

pub async fn list_tasks_from_db(pool: &SqlitePool) -> Result<Vec<Task>> {
    let tasks = sqlx::query_as::<_, Task>("SELECT * FROM tasks ORDER BY start_iso ASC")
        .fetch_all(pool)
        .await
        .context("Failed to list tasks from DB")?;

    Ok(tasks)
}

pub async fn load_case_tasks_from_db(pool: &SqlitePool, case_id: i64) -> Result<Vec<Task>> {
    let tasks =
        sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE case_id = ? ORDER BY start_iso ASC")
            .bind(case_id)
            .fetch_all(pool)
            .await
            .context("Failed to load case tasks from DB")?;

    Ok(tasks)
}

pub async fn create_task_in_db(
    pool: &SqlitePool,
    title: &str,
    start_iso: &str,
    end_iso: &str,
    notes: &str,
    case_id: Option<i64>,
) -> Result<Task> {
    let now = Utc::now();

    let id = sqlx::query(
        r#"INSERT INTO tasks (title, start_iso, end_iso, notes, case_id, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(title)
    .bind(start_iso)
    .bind(end_iso)
    .bind(notes)
    .bind(case_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to insert task into DB")?
    .last_insert_rowid();

    let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .context("Task vanished right after insert")?;

    Ok(task)
}

// --- Case <-> decision links ---

pub async fn find_decision_link_in_db(
    pool: &SqlitePool,
    case_id: i64,
    decision_ada: &str,
) -> Result<Option<CaseDecisionLink>> {
    let link = sqlx::query_as::<_, CaseDecisionLink>(
        "SELECT * FROM case_diavgeia_links WHERE case_id = ? AND decision_ada = ?",
    )
    .bind(case_id)
    .bind(decision_ada)
    .fetch_optional(pool)
    .await
    .context("Failed to look up decision link")?;

    Ok(link)
}

pub async fn get_decision_link_from_db(
    pool: &SqlitePool,
    link_id: i64,
    case_id: i64,
) -> Result<Option<CaseDecisionLink>> {
    let link = sqlx::query_as::<_, CaseDecisionLink>(
        "SELECT * FROM case_diavgeia_links WHERE id = ? AND case_id = ?",
    )
    .bind(link_id)
    .bind(case_id)
    .fetch_optional(pool)
    .await
    .context("Failed to load decision link")?;

    Ok(link)
}

pub async fn create_decision_link_in_db(
    pool: &SqlitePool,
    case_id: i64,
    decision_ada: &str,
    notes: &str,
) -> Result<CaseDecisionLink> {
    let now = Utc::now();

    let id = sqlx::query(
        "INSERT INTO case_diavgeia_links (case_id, decision_ada, notes, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(case_id)
    .bind(decision_ada)
    .bind(notes)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to insert decision link into DB")?
    .last_insert_rowid();

    let link = sqlx::query_as::<_, CaseDecisionLink>(
        "SELECT * FROM case_diavgeia_links WHERE id = ?",
    )
    .bind(id)
    .fetch_one(pool)
    .await
    .context("Decision link vanished right after insert")?;

    Ok(link)
}

/// Links for a case, ordered by the linked decision's issue date, newest
/// first.
pub async fn list_decision_links_from_db(
    pool: &SqlitePool,
    case_id: i64,
) -> Result<Vec<CaseDecisionLink>> {
    let links = sqlx::query_as::<_, CaseDecisionLink>(
        r#"SELECT cdl.*
           FROM case_diavgeia_links cdl
           JOIN diavgeia_decisions d ON d.ada = cdl.decision_ada
           WHERE cdl.case_id = ?
           ORDER BY d.issue_date DESC, cdl.id DESC"#,
    )
    .bind(case_id)
    .fetch_all(pool)
    .await
    .context("Failed to list decision links from DB")?;

    Ok(links)
}

pub async fn delete_decision_link_in_db(pool: &SqlitePool, link_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM case_diavgeia_links WHERE id = ?")
        .bind(link_id)
        .execute(pool)
        .await
        .context("Failed to delete decision link from DB")?;

    Ok(())
}
