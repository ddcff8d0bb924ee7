//! Subscription lifecycle: plan catalog, status enums and the state machine
//! that moves users through none → pending → active → expired.
//!
//! Every operation re-fetches persisted state and writes it back in one
//! self-contained transaction — handlers never share in-memory user state.
//! That re-fetching is the correctness mechanism for tolerating concurrent
//! updates from the background sweepers.

use chrono::{DateTime, Duration, Utc};

use crate::core::error::{BotError, BotResult};
use crate::storage::db::{self, DbConnection, ExpiringUser};

/// A purchasable subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    /// Stable key stored in the database ("1m", "3m", "lifetime")
    pub key: &'static str,
    /// Human-readable name shown in menus
    pub name: &'static str,
    /// Price in USDT
    pub price_usdt: u32,
    /// Duration in days, None = unbounded (lifetime)
    pub days: Option<i64>,
}

/// The plan catalog. Order matters: this is the order plans appear in menus.
pub static PLANS: &[Plan] = &[
    Plan {
        key: "1m",
        name: "1 месяц",
        price_usdt: 39,
        days: Some(30),
    },
    Plan {
        key: "3m",
        name: "3 месяца",
        price_usdt: 99,
        days: Some(90),
    },
    Plan {
        key: "lifetime",
        name: "Пожизненно",
        price_usdt: 239,
        days: None,
    },
];

impl Plan {
    /// Look up a plan by its stable key.
    pub fn from_key(key: &str) -> Option<&'static Plan> {
        PLANS.iter().find(|p| p.key == key)
    }

    /// Look up a plan, mapping misses to `InvalidPlan`.
    pub fn require(key: &str) -> BotResult<&'static Plan> {
        Plan::from_key(key).ok_or_else(|| BotError::InvalidPlan(key.to_string()))
    }

    pub fn is_lifetime(&self) -> bool {
        self.days.is_none()
    }

    /// The reply-keyboard label for this plan ("1 месяц — 39 USDT").
    pub fn menu_label(&self) -> String {
        format!("{} — {} USDT", self.name, self.price_usdt)
    }

    /// Subscription window starting at `start`: None end for lifetime.
    pub fn window_end(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.days.map(|d| start + Duration::days(d))
    }
}

/// Subscription status of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    None,
    Pending,
    Active,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::None => "none",
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
        }
    }

    /// Unknown strings (legacy rows) decode to None.
    pub fn parse(s: &str) -> SubscriptionStatus {
        match s {
            "pending" => SubscriptionStatus::Pending,
            "active" => SubscriptionStatus::Active,
            "expired" => SubscriptionStatus::Expired,
            _ => SubscriptionStatus::None,
        }
    }
}

/// Payment method chosen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    Crypto,
    Tribute,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Crypto => "crypto",
            PaymentMethod::Tribute => "tribute",
        }
    }

    pub fn parse(s: &str) -> Option<PaymentMethod> {
        match s {
            "crypto" => Some(PaymentMethod::Crypto),
            "tribute" => Some(PaymentMethod::Tribute),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PaymentMethod::Crypto => "Crypto (TRC20)",
            PaymentMethod::Tribute => "Tribute",
        }
    }
}

/// Reference to a payment proof: a screenshot file id or a legacy TXID.
#[derive(Debug, Clone)]
pub enum ProofRef {
    Screenshot(String),
    Txid(String),
}

/// Outcome of a successful `confirm`, everything the caller needs for the
/// user notification and the audit entry.
#[derive(Debug, Clone)]
pub struct Confirmation {
    pub user_id: i64,
    pub username: Option<String>,
    pub plan: &'static Plan,
    pub start_date: DateTime<Utc>,
    /// None = lifetime
    pub end_date: Option<DateTime<Utc>>,
    /// How many open payments were closed by this confirmation
    pub payments_closed: usize,
}

/// Records a proof submission: adds a pending payment row and moves the user
/// to `pending`, except that an already-active user keeps `active` (repeated
/// submissions must not regress a running subscription).
///
/// Returns the id of the new payment row.
pub fn submit_proof(
    conn: &DbConnection,
    user_id: i64,
    proof: &ProofRef,
    method: PaymentMethod,
    plan_key: &str,
    now: DateTime<Utc>,
) -> BotResult<i64> {
    let plan = Plan::require(plan_key)?;

    let (txid, screenshot) = match proof {
        ProofRef::Screenshot(file_id) => (None, Some(file_id.as_str())),
        ProofRef::Txid(txid) => (Some(txid.as_str()), None),
    };

    let payment_id = db::add_payment(
        conn,
        user_id,
        txid,
        screenshot,
        "pending",
        method.as_str(),
        Some(plan.key),
        now,
    )?;

    let current = db::get_user(conn, user_id)?
        .map(|u| SubscriptionStatus::parse(&u.status))
        .unwrap_or(SubscriptionStatus::None);

    if current == SubscriptionStatus::Active {
        db::set_user_plan(conn, user_id, plan.key)?;
    } else {
        db::set_user_status_and_plan(conn, user_id, SubscriptionStatus::Pending.as_str(), plan.key)?;
    }

    Ok(payment_id)
}

/// Confirms the target user's payment and activates their subscription.
///
/// Fails with `Unauthorized` unless `admin_id` is in `admins`, with
/// `UserNotFound` / `NoPlanSelected` when the target cannot be activated.
/// The subscription window always starts at `now`; re-confirming an already
/// active user resets the window (explicit policy, see DESIGN.md). All open
/// payments of the target are closed as confirmed.
pub fn confirm(
    conn: &DbConnection,
    admins: &[i64],
    admin_id: i64,
    target_user_id: i64,
    now: DateTime<Utc>,
) -> BotResult<Confirmation> {
    if !admins.contains(&admin_id) {
        return Err(BotError::Unauthorized);
    }

    let user = db::get_user(conn, target_user_id)?.ok_or(BotError::UserNotFound(target_user_id))?;

    let plan = match Plan::from_key(&user.plan) {
        Some(p) => p,
        None => return Err(BotError::NoPlanSelected(target_user_id)),
    };

    let end_date = plan.window_end(now);
    db::activate_user(conn, target_user_id, plan.key, now, end_date)?;
    let payments_closed = db::close_open_payments(conn, target_user_id, "confirmed")?;

    Ok(Confirmation {
        user_id: target_user_id,
        username: user.username,
        plan,
        start_date: now,
        end_date,
        payments_closed,
    })
}

/// Demotes every lapsed active subscription to `expired` and returns the
/// demoted users so the caller can notify them.
///
/// Idempotent: the predicate requires `status = active`, so a second run over
/// the same state is a no-op.
pub fn sweep_expirations(conn: &DbConnection, now: DateTime<Utc>) -> BotResult<Vec<ExpiringUser>> {
    let lapsed = db::get_expired_users(conn, now)?;
    for user in &lapsed {
        db::set_user_status(conn, user.telegram_id, SubscriptionStatus::Expired.as_str())?;
    }
    Ok(lapsed)
}

/// Presentation-level status of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayStatus {
    Active,
    ActiveLifetime,
    Pending,
    Expired,
    Inactive,
}

impl DisplayStatus {
    pub fn label(&self) -> &'static str {
        match self {
            DisplayStatus::Active | DisplayStatus::ActiveLifetime => "✅ Активна",
            DisplayStatus::Pending => "⏳ Ожидает подтверждения",
            DisplayStatus::Expired => "⚠️ Истекла",
            DisplayStatus::Inactive => "❌ Неактивна",
        }
    }
}

/// Derives the status label for a user record.
///
/// Lazy reconciliation, documented and deliberate: an `active` user whose
/// window has lapsed is reported as expired AND corrected in the database as
/// a side effect of being viewed. The daily sweep catches everyone else.
pub fn compute_display_status(conn: &DbConnection, user: &db::User, now: DateTime<Utc>) -> BotResult<DisplayStatus> {
    let status = SubscriptionStatus::parse(&user.status);
    let end = user
        .end_date
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc));

    Ok(match status {
        SubscriptionStatus::Active => {
            if user.plan == "lifetime" || end.is_none() {
                DisplayStatus::ActiveLifetime
            } else if end.map(|e| e > now).unwrap_or(false) {
                DisplayStatus::Active
            } else {
                db::set_user_status(conn, user.telegram_id, SubscriptionStatus::Expired.as_str())?;
                DisplayStatus::Expired
            }
        }
        SubscriptionStatus::Pending => DisplayStatus::Pending,
        SubscriptionStatus::Expired => DisplayStatus::Expired,
        SubscriptionStatus::None => DisplayStatus::Inactive,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::create_pool;
    use pretty_assertions::assert_eq;

    fn test_pool() -> (tempfile::TempDir, crate::storage::DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let pool = create_pool(path.to_str().unwrap()).unwrap();
        (dir, pool)
    }

    #[test]
    fn plan_catalog_is_closed_and_priced() {
        assert_eq!(PLANS.len(), 3);
        assert_eq!(Plan::from_key("1m").unwrap().days, Some(30));
        assert_eq!(Plan::from_key("3m").unwrap().days, Some(90));
        assert!(Plan::from_key("lifetime").unwrap().is_lifetime());
        assert!(Plan::from_key("6m").is_none());
    }

    #[test]
    fn window_end_is_exact_plan_duration() {
        let start = Utc::now();
        let plan = Plan::from_key("1m").unwrap();
        assert_eq!(plan.window_end(start), Some(start + Duration::days(30)));
        assert_eq!(Plan::from_key("lifetime").unwrap().window_end(start), None);
    }

    #[test]
    fn submit_proof_moves_user_to_pending() {
        let (_dir, pool) = test_pool();
        let conn = pool.get().unwrap();
        let now = Utc::now();
        db::upsert_user(&conn, 100, Some("alice"), now).unwrap();

        let pid = submit_proof(
            &conn,
            100,
            &ProofRef::Screenshot("file123".into()),
            PaymentMethod::Crypto,
            "1m",
            now,
        )
        .unwrap();
        assert!(pid > 0);

        let user = db::get_user(&conn, 100).unwrap().unwrap();
        assert_eq!(user.status, "pending");
        assert_eq!(user.plan, "1m");
    }

    #[test]
    fn submit_proof_rejects_unknown_plan() {
        let (_dir, pool) = test_pool();
        let conn = pool.get().unwrap();
        let now = Utc::now();
        db::upsert_user(&conn, 100, None, now).unwrap();

        let err = submit_proof(
            &conn,
            100,
            &ProofRef::Screenshot("f".into()),
            PaymentMethod::Crypto,
            "weekly",
            now,
        )
        .unwrap_err();
        assert!(matches!(err, BotError::InvalidPlan(_)));
    }

    #[test]
    fn submit_proof_does_not_regress_active_user() {
        let (_dir, pool) = test_pool();
        let conn = pool.get().unwrap();
        let now = Utc::now();
        db::upsert_user(&conn, 100, None, now).unwrap();
        db::activate_user(&conn, 100, "1m", now, Some(now + Duration::days(30))).unwrap();

        submit_proof(
            &conn,
            100,
            &ProofRef::Screenshot("renewal".into()),
            PaymentMethod::Tribute,
            "3m",
            now,
        )
        .unwrap();

        let user = db::get_user(&conn, 100).unwrap().unwrap();
        assert_eq!(user.status, "active");
        assert_eq!(user.plan, "3m");
    }

    #[test]
    fn confirm_requires_admin() {
        let (_dir, pool) = test_pool();
        let conn = pool.get().unwrap();
        let now = Utc::now();
        db::upsert_user(&conn, 100, None, now).unwrap();

        let err = confirm(&conn, &[1, 2], 999, 100, now).unwrap_err();
        assert!(matches!(err, BotError::Unauthorized));

        // And the target must be untouched
        let user = db::get_user(&conn, 100).unwrap().unwrap();
        assert_eq!(user.status, "none");
    }

    #[test]
    fn confirm_requires_plan() {
        let (_dir, pool) = test_pool();
        let conn = pool.get().unwrap();
        let now = Utc::now();
        db::upsert_user(&conn, 100, None, now).unwrap();

        let err = confirm(&conn, &[1], 1, 100, now).unwrap_err();
        assert!(matches!(err, BotError::NoPlanSelected(100)));
    }

    #[test]
    fn confirm_sets_exact_window_and_closes_all_open_payments() {
        let (_dir, pool) = test_pool();
        let conn = pool.get().unwrap();
        let now = Utc::now();
        db::upsert_user(&conn, 100, Some("bob"), now).unwrap();

        // Double submission: two open payments before review
        submit_proof(
            &conn,
            100,
            &ProofRef::Screenshot("one".into()),
            PaymentMethod::Crypto,
            "1m",
            now,
        )
        .unwrap();
        submit_proof(
            &conn,
            100,
            &ProofRef::Screenshot("two".into()),
            PaymentMethod::Crypto,
            "1m",
            now,
        )
        .unwrap();

        let c = confirm(&conn, &[1], 1, 100, now).unwrap();
        assert_eq!(c.plan.key, "1m");
        assert_eq!(c.start_date, now);
        assert_eq!(c.end_date, Some(now + Duration::days(30)));
        assert_eq!(c.payments_closed, 2);

        assert!(db::get_latest_open_payment(&conn, 100).unwrap().is_none());
        let user = db::get_user(&conn, 100).unwrap().unwrap();
        assert_eq!(user.status, "active");
    }

    #[test]
    fn confirm_lifetime_has_no_end_date() {
        let (_dir, pool) = test_pool();
        let conn = pool.get().unwrap();
        let now = Utc::now();
        db::upsert_user(&conn, 100, None, now).unwrap();
        db::set_user_status_and_plan(&conn, 100, "pending", "lifetime").unwrap();

        let c = confirm(&conn, &[1], 1, 100, now).unwrap();
        assert_eq!(c.end_date, None);

        let user = db::get_user(&conn, 100).unwrap().unwrap();
        assert_eq!(user.end_date, None);
        assert_eq!(user.status, "active");
    }

    #[test]
    fn sweep_is_idempotent() {
        let (_dir, pool) = test_pool();
        let conn = pool.get().unwrap();
        let t0 = Utc::now();
        db::upsert_user(&conn, 100, Some("carol"), t0).unwrap();
        db::activate_user(&conn, 100, "1m", t0, Some(t0 + Duration::days(30))).unwrap();

        let t_late = t0 + Duration::days(31);
        let first = sweep_expirations(&conn, t_late).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].telegram_id, 100);

        let second = sweep_expirations(&conn, t_late).unwrap();
        assert!(second.is_empty());

        let user = db::get_user(&conn, 100).unwrap().unwrap();
        assert_eq!(user.status, "expired");
    }

    #[test]
    fn sweep_skips_lifetime() {
        let (_dir, pool) = test_pool();
        let conn = pool.get().unwrap();
        let t0 = Utc::now();
        db::upsert_user(&conn, 100, None, t0).unwrap();
        db::activate_user(&conn, 100, "lifetime", t0, None).unwrap();

        let lapsed = sweep_expirations(&conn, t0 + Duration::days(10_000)).unwrap();
        assert!(lapsed.is_empty());
    }

    #[test]
    fn display_status_lazily_reconciles_lapsed_active() {
        let (_dir, pool) = test_pool();
        let conn = pool.get().unwrap();
        let t0 = Utc::now();
        db::upsert_user(&conn, 100, None, t0).unwrap();
        db::activate_user(&conn, 100, "1m", t0, Some(t0 + Duration::days(30))).unwrap();

        let user = db::get_user(&conn, 100).unwrap().unwrap();
        let status = compute_display_status(&conn, &user, t0 + Duration::days(31)).unwrap();
        assert_eq!(status, DisplayStatus::Expired);

        // Viewing corrected the stored status
        let user = db::get_user(&conn, 100).unwrap().unwrap();
        assert_eq!(user.status, "expired");
    }
}
