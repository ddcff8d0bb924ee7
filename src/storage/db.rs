use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Result;

/// Структура, представляющая пользователя в базе данных.
///
/// Статусы и планы хранятся как TEXT; типизированные enum'ы живут в
/// `subscription` — слой хранения остаётся чистым CRUD.
#[derive(Debug, Clone)]
pub struct User {
    /// Telegram ID пользователя
    pub telegram_id: i64,
    /// Имя пользователя (username) в Telegram, если доступно
    pub username: Option<String>,
    /// Статус подписки: "none", "pending", "active", "expired"
    pub status: String,
    /// Тариф: "none", "1m", "3m", "lifetime"
    pub plan: String,
    /// Начало подписки (RFC 3339), None если подписка не активировалась
    pub start_date: Option<String>,
    /// Окончание подписки (RFC 3339), None = бессрочно
    pub end_date: Option<String>,
    /// Дата первого контакта
    pub joined_at: String,
    /// Последняя активность
    pub last_seen: Option<String>,
    /// Токен диалогового состояния (см. `dialogue`), None = ожиданий нет
    pub user_state: Option<String>,
}

/// Структура, представляющая платёж.
///
/// Платежи никогда не удаляются — таблица служит аудиторским следом.
#[derive(Debug, Clone)]
pub struct Payment {
    pub id: i64,
    /// Ссылка на users.telegram_id
    pub user_id: i64,
    /// TXID для устаревшего текстового подтверждения
    pub txid: Option<String>,
    /// file_id скриншота перевода
    pub screenshot_file_id: Option<String>,
    /// Статус: "pending", "confirmed", "rejected"
    pub status: String,
    /// Метод оплаты: "crypto", "tribute"
    pub payment_method: String,
    /// Тариф, на который претендует платёж
    pub plan: Option<String>,
    pub created_at: String,
}

/// Запись списка платежей для админ-отчёта (платёж + username).
#[derive(Debug, Clone)]
pub struct PaymentReportRow {
    pub payment_id: i64,
    pub username: Option<String>,
    pub txid: Option<String>,
    pub status: String,
    pub payment_method: String,
    pub plan: Option<String>,
    pub created_at: String,
}

/// Пользователь с подпиской, истекающей в заданную дату.
#[derive(Debug, Clone)]
pub struct ExpiringUser {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub end_date: Option<String>,
}

/// Сводная статистика базы.
#[derive(Debug, Clone, Default)]
pub struct DbStats {
    pub total_users: i64,
    pub total_payments: i64,
    pub active_users: i64,
    /// (статус, количество)
    pub users_by_status: Vec<(String, i64)>,
    /// (тариф, количество)
    pub users_by_plan: Vec<(String, i64)>,
    /// (статус платежа, количество)
    pub payments_by_status: Vec<(String, i64)>,
}

/// Статистика за один календарный день.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DailyStats {
    pub new_users: i64,
    pub new_payments: i64,
    pub expired_users: i64,
    pub active_users: i64,
}

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Create a new database connection pool
///
/// Initializes a connection pool with up to 10 connections and runs schema
/// migrations on the first connection.
pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    if let Some(parent) = std::path::Path::new(database_path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("Failed to create database directory {}: {}", parent.display(), e);
            }
        }
    }

    let manager = SqliteConnectionManager::file(database_path);
    let pool = Pool::builder().max_size(10).build(manager)?;

    let conn = pool.get()?;
    if let Err(e) = migrate_schema(&conn) {
        log::warn!("Failed to migrate schema: {}", e);
    }

    Ok(pool)
}

/// Get a connection from the pool
pub fn get_connection(pool: &DbPool) -> Result<DbConnection, r2d2::Error> {
    pool.get()
}

/// Migrate database schema: create tables on first run, add columns that
/// older deployments are missing.
fn migrate_schema(conn: &DbConnection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            telegram_id INTEGER UNIQUE NOT NULL,
            username TEXT,
            status TEXT DEFAULT 'none',
            plan TEXT DEFAULT 'none',
            start_date TEXT,
            end_date TEXT,
            joined_at TEXT NOT NULL,
            last_seen TEXT,
            user_state TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            txid TEXT,
            screenshot_file_id TEXT,
            status TEXT DEFAULT 'pending',
            payment_method TEXT DEFAULT 'crypto',
            plan TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (telegram_id)
        )",
        [],
    )?;

    // Колонки, добавленные после первого релиза — для совместимости со
    // старыми базами добавляем молча.
    for (table, ddl) in [
        ("users", "ALTER TABLE users ADD COLUMN user_state TEXT"),
        ("users", "ALTER TABLE users ADD COLUMN last_seen TEXT"),
        ("payments", "ALTER TABLE payments ADD COLUMN payment_method TEXT DEFAULT 'crypto'"),
        ("payments", "ALTER TABLE payments ADD COLUMN plan TEXT"),
    ] {
        if let Err(e) = conn.execute(ddl, []) {
            log::debug!("Migration for {} skipped (column exists?): {}", table, e);
        }
    }

    Ok(())
}

/// Регистрирует пользователя при первом контакте (идемпотентный upsert).
///
/// Если пользователь уже существует — обновляет `last_seen` и `username`
/// (last-write-wins). Возвращает `true`, если была создана новая запись.
pub fn upsert_user(conn: &DbConnection, telegram_id: i64, username: Option<&str>, now: DateTime<Utc>) -> Result<bool> {
    let ts = now.to_rfc3339();
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE telegram_id = ?",
        &[&telegram_id as &dyn rusqlite::ToSql],
        |row| Ok(row.get::<_, i64>(0)? > 0),
    )?;

    if exists {
        conn.execute(
            "UPDATE users SET last_seen = ?1, username = ?2 WHERE telegram_id = ?3",
            &[
                &ts as &dyn rusqlite::ToSql,
                &username as &dyn rusqlite::ToSql,
                &telegram_id as &dyn rusqlite::ToSql,
            ],
        )?;
        Ok(false)
    } else {
        conn.execute(
            "INSERT INTO users (telegram_id, username, joined_at, last_seen) VALUES (?1, ?2, ?3, ?3)",
            &[
                &telegram_id as &dyn rusqlite::ToSql,
                &username as &dyn rusqlite::ToSql,
                &ts as &dyn rusqlite::ToSql,
            ],
        )?;
        Ok(true)
    }
}

/// Получает пользователя по Telegram ID.
pub fn get_user(conn: &DbConnection, telegram_id: i64) -> Result<Option<User>> {
    let mut stmt = conn.prepare(
        "SELECT telegram_id, username, status, plan, start_date, end_date, joined_at, last_seen, user_state
         FROM users WHERE telegram_id = ?",
    )?;
    let mut rows = stmt.query(&[&telegram_id as &dyn rusqlite::ToSql])?;

    if let Some(row) = rows.next()? {
        Ok(Some(User {
            telegram_id: row.get(0)?,
            username: row.get(1)?,
            status: row.get(2)?,
            plan: row.get(3)?,
            start_date: row.get(4)?,
            end_date: row.get(5)?,
            joined_at: row.get(6)?,
            last_seen: row.get(7)?,
            user_state: row.get(8)?,
        }))
    } else {
        Ok(None)
    }
}

/// Обновляет только статус пользователя.
pub fn set_user_status(conn: &DbConnection, telegram_id: i64, status: &str) -> Result<bool> {
    let n = conn.execute(
        "UPDATE users SET status = ?1 WHERE telegram_id = ?2",
        &[&status as &dyn rusqlite::ToSql, &telegram_id as &dyn rusqlite::ToSql],
    )?;
    Ok(n > 0)
}

/// Обновляет статус и тариф (без дат) — используется при подаче платежа.
pub fn set_user_status_and_plan(conn: &DbConnection, telegram_id: i64, status: &str, plan: &str) -> Result<bool> {
    let n = conn.execute(
        "UPDATE users SET status = ?1, plan = ?2 WHERE telegram_id = ?3",
        &[
            &status as &dyn rusqlite::ToSql,
            &plan as &dyn rusqlite::ToSql,
            &telegram_id as &dyn rusqlite::ToSql,
        ],
    )?;
    Ok(n > 0)
}

/// Обновляет только тариф пользователя, не трогая статус.
pub fn set_user_plan(conn: &DbConnection, telegram_id: i64, plan: &str) -> Result<bool> {
    let n = conn.execute(
        "UPDATE users SET plan = ?1 WHERE telegram_id = ?2",
        &[&plan as &dyn rusqlite::ToSql, &telegram_id as &dyn rusqlite::ToSql],
    )?;
    Ok(n > 0)
}

/// Активирует подписку: статус, тариф и окно действия одной операцией.
///
/// `end_date = None` означает бессрочную подписку (lifetime).
pub fn activate_user(
    conn: &DbConnection,
    telegram_id: i64,
    plan: &str,
    start_date: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
) -> Result<bool> {
    let start = start_date.to_rfc3339();
    let end = end_date.map(|d| d.to_rfc3339());
    let n = conn.execute(
        "UPDATE users SET status = 'active', plan = ?1, start_date = ?2, end_date = ?3 WHERE telegram_id = ?4",
        &[
            &plan as &dyn rusqlite::ToSql,
            &start as &dyn rusqlite::ToSql,
            &end as &dyn rusqlite::ToSql,
            &telegram_id as &dyn rusqlite::ToSql,
        ],
    )?;
    Ok(n > 0)
}

/// Устанавливает диалоговое состояние пользователя (None = сброс).
pub fn set_user_state(conn: &DbConnection, telegram_id: i64, state: Option<&str>) -> Result<bool> {
    let n = conn.execute(
        "UPDATE users SET user_state = ?1 WHERE telegram_id = ?2",
        &[&state as &dyn rusqlite::ToSql, &telegram_id as &dyn rusqlite::ToSql],
    )?;
    Ok(n > 0)
}

/// Получает диалоговое состояние пользователя.
pub fn get_user_state(conn: &DbConnection, telegram_id: i64) -> Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT user_state FROM users WHERE telegram_id = ?")?;
    let mut rows = stmt.query(&[&telegram_id as &dyn rusqlite::ToSql])?;
    if let Some(row) = rows.next()? {
        Ok(row.get(0)?)
    } else {
        Ok(None)
    }
}

/// Список активных получателей рассылки: статус active и неистёкшее окно.
pub fn get_active_users(conn: &DbConnection, now: DateTime<Utc>) -> Result<Vec<i64>> {
    let now_str = now.to_rfc3339();
    let mut stmt = conn.prepare(
        "SELECT telegram_id FROM users
         WHERE status = 'active' AND (end_date > ? OR end_date IS NULL OR plan = 'lifetime')",
    )?;
    let rows = stmt.query_map(&[&now_str as &dyn rusqlite::ToSql], |row| row.get(0))?;
    rows.collect()
}

/// Все пользователи, новые первыми.
pub fn get_all_users(conn: &DbConnection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(
        "SELECT telegram_id, username, status, plan, start_date, end_date, joined_at, last_seen, user_state
         FROM users ORDER BY joined_at DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(User {
            telegram_id: row.get(0)?,
            username: row.get(1)?,
            status: row.get(2)?,
            plan: row.get(3)?,
            start_date: row.get(4)?,
            end_date: row.get(5)?,
            joined_at: row.get(6)?,
            last_seen: row.get(7)?,
            user_state: row.get(8)?,
        })
    })?;
    rows.collect()
}

/// Добавляет платёж. Возвращает id новой записи.
#[allow(clippy::too_many_arguments)]
pub fn add_payment(
    conn: &DbConnection,
    user_id: i64,
    txid: Option<&str>,
    screenshot_file_id: Option<&str>,
    status: &str,
    payment_method: &str,
    plan: Option<&str>,
    now: DateTime<Utc>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO payments (user_id, txid, screenshot_file_id, status, payment_method, plan, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        &[
            &user_id as &dyn rusqlite::ToSql,
            &txid as &dyn rusqlite::ToSql,
            &screenshot_file_id as &dyn rusqlite::ToSql,
            &status as &dyn rusqlite::ToSql,
            &payment_method as &dyn rusqlite::ToSql,
            &plan as &dyn rusqlite::ToSql,
            &now.to_rfc3339() as &dyn rusqlite::ToSql,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Последний открытый (pending) платёж пользователя.
pub fn get_latest_open_payment(conn: &DbConnection, user_id: i64) -> Result<Option<Payment>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, txid, screenshot_file_id, status, payment_method, plan, created_at
         FROM payments
         WHERE user_id = ? AND status = 'pending'
         ORDER BY created_at DESC, id DESC
         LIMIT 1",
    )?;
    let mut rows = stmt.query(&[&user_id as &dyn rusqlite::ToSql])?;
    if let Some(row) = rows.next()? {
        Ok(Some(Payment {
            id: row.get(0)?,
            user_id: row.get(1)?,
            txid: row.get(2)?,
            screenshot_file_id: row.get(3)?,
            status: row.get(4)?,
            payment_method: row.get(5)?,
            plan: row.get(6)?,
            created_at: row.get(7)?,
        }))
    } else {
        Ok(None)
    }
}

/// Дополняет последний открытый платёж пользователя (на месте, без новой
/// строки) — используется при админской доразметке.
pub fn update_latest_open_payment(
    conn: &DbConnection,
    user_id: i64,
    txid: Option<&str>,
    payment_method: Option<&str>,
    plan: Option<&str>,
) -> Result<bool> {
    let n = conn.execute(
        "UPDATE payments SET
            txid = COALESCE(?1, txid),
            payment_method = COALESCE(?2, payment_method),
            plan = COALESCE(?3, plan)
         WHERE id = (SELECT id FROM payments WHERE user_id = ?4 AND status = 'pending'
                     ORDER BY created_at DESC, id DESC LIMIT 1)",
        &[
            &txid as &dyn rusqlite::ToSql,
            &payment_method as &dyn rusqlite::ToSql,
            &plan as &dyn rusqlite::ToSql,
            &user_id as &dyn rusqlite::ToSql,
        ],
    )?;
    Ok(n > 0)
}

/// Закрывает ВСЕ открытые платежи пользователя в заданный статус.
///
/// Используется при подтверждении: двойная отправка скриншота создаёт две
/// pending-строки, confirm закрывает обе (см. DESIGN.md).
pub fn close_open_payments(conn: &DbConnection, user_id: i64, status: &str) -> Result<usize> {
    conn.execute(
        "UPDATE payments SET status = ?1 WHERE user_id = ?2 AND status = 'pending'",
        &[&status as &dyn rusqlite::ToSql, &user_id as &dyn rusqlite::ToSql],
    )
}

/// Последние платежи для админ-отчёта (с username плательщика).
pub fn get_latest_payments(conn: &DbConnection, limit: i64) -> Result<Vec<PaymentReportRow>> {
    let mut stmt = conn.prepare(
        "SELECT p.id, u.username, p.txid, p.status, p.payment_method, p.plan, p.created_at
         FROM payments p
         JOIN users u ON p.user_id = u.telegram_id
         ORDER BY p.created_at DESC, p.id DESC
         LIMIT ?",
    )?;
    let rows = stmt.query_map(&[&limit as &dyn rusqlite::ToSql], |row| {
        Ok(PaymentReportRow {
            payment_id: row.get(0)?,
            username: row.get(1)?,
            txid: row.get(2)?,
            status: row.get(3)?,
            payment_method: row.get(4)?,
            plan: row.get(5)?,
            created_at: row.get(6)?,
        })
    })?;
    rows.collect()
}

/// Пользователи, у которых подписка истекает в указанную календарную дату.
pub fn get_users_expiring_on(conn: &DbConnection, date: NaiveDate) -> Result<Vec<ExpiringUser>> {
    let date_str = date.format("%Y-%m-%d").to_string();
    let mut stmt = conn.prepare(
        "SELECT telegram_id, username, end_date FROM users
         WHERE status = 'active' AND plan != 'lifetime' AND DATE(end_date) = DATE(?)",
    )?;
    let rows = stmt.query_map(&[&date_str as &dyn rusqlite::ToSql], |row| {
        Ok(ExpiringUser {
            telegram_id: row.get(0)?,
            username: row.get(1)?,
            end_date: row.get(2)?,
        })
    })?;
    rows.collect()
}

/// Активные пользователи с уже прошедшей датой окончания.
///
/// Lifetime исключён явно: у него end_date IS NULL и сравнение всё равно
/// ложно, но предикат должен читаться, а не полагаться на NULL-семантику.
pub fn get_expired_users(conn: &DbConnection, now: DateTime<Utc>) -> Result<Vec<ExpiringUser>> {
    let now_str = now.to_rfc3339();
    let mut stmt = conn.prepare(
        "SELECT telegram_id, username, end_date FROM users
         WHERE status = 'active' AND plan != 'lifetime'
           AND end_date IS NOT NULL AND end_date < ?",
    )?;
    let rows = stmt.query_map(&[&now_str as &dyn rusqlite::ToSql], |row| {
        Ok(ExpiringUser {
            telegram_id: row.get(0)?,
            username: row.get(1)?,
            end_date: row.get(2)?,
        })
    })?;
    rows.collect()
}

/// Сводная статистика по базе.
pub fn get_database_stats(conn: &DbConnection) -> Result<DbStats> {
    let group_count = |sql: &str| -> Result<Vec<(String, i64)>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        rows.collect()
    };

    Ok(DbStats {
        total_users: conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?,
        total_payments: conn.query_row("SELECT COUNT(*) FROM payments", [], |row| row.get(0))?,
        active_users: conn.query_row("SELECT COUNT(*) FROM users WHERE status = 'active'", [], |row| {
            row.get(0)
        })?,
        users_by_status: group_count("SELECT status, COUNT(*) FROM users GROUP BY status")?,
        users_by_plan: group_count("SELECT plan, COUNT(*) FROM users GROUP BY plan")?,
        payments_by_status: group_count("SELECT status, COUNT(*) FROM payments GROUP BY status")?,
    })
}

/// Статистика за указанный календарный день (для ежедневного отчёта).
pub fn get_daily_stats(conn: &DbConnection, date: NaiveDate) -> Result<DailyStats> {
    let date_str = date.format("%Y-%m-%d").to_string();
    let d = &date_str as &dyn rusqlite::ToSql;

    Ok(DailyStats {
        new_users: conn.query_row("SELECT COUNT(*) FROM users WHERE DATE(joined_at) = DATE(?)", &[d], |row| {
            row.get(0)
        })?,
        new_payments: conn.query_row(
            "SELECT COUNT(*) FROM payments WHERE DATE(created_at) = DATE(?)",
            &[d],
            |row| row.get(0),
        )?,
        expired_users: conn.query_row(
            "SELECT COUNT(*) FROM users WHERE status = 'expired' AND DATE(end_date) = DATE(?)",
            &[d],
            |row| row.get(0),
        )?,
        active_users: conn.query_row("SELECT COUNT(*) FROM users WHERE status = 'active'", [], |row| {
            row.get(0)
        })?,
    })
}
