//! # Postgres Queue Store
//!
//! [`QueueStore`] over a sqlx `PgPool`. Each mutating method runs in a single
//! transaction. Customer rows are locked with `FOR UPDATE` before validation;
//! `call_next` selects its candidate with `FOR UPDATE SKIP LOCKED` so
//! concurrent counters each take a different customer instead of queueing on
//! the same row.
//!
//! Ordering is rendered from [`crate::queue::ordering`] so the SQL listing and
//! candidate selection follow the same policy as the in-memory store.

use super::store::{
    AppliedTransition, CounterEffect, PurgeCounts, QueueStore, ResetCustomer, ResetOutcome,
    ResetRequest, TransitionRequest,
};
use crate::calendar::BusinessDay;
use crate::error::{QueueError, QueueResult};
use crate::models::customer::CustomerRow;
use crate::models::{
    Counter, Customer, CustomerHistoryRecord, DailyQueueSnapshot, NewCustomer, NewQueueEvent,
    PriorityFlags, QueueEvent, QueueEventType, ResetLogEntry,
};
use crate::queue::ordering::{order_by_sql, ordering_key, ORDERING_KEY_SQL};
use crate::state_machine::{QueueStateMachine, QueueStatus, Role};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

const CUSTOMER_COLUMNS: &str = "c.id, c.name, c.contact, c.token_number, c.or_number, \
     c.priority_flags, c.manual_position, c.queue_status, c.created_at, c.updated_at, \
     c.served_at, c.remarks";

const COUNTER_COLUMNS: &str = "id, name, is_active, current_customer_id, updated_at";

const RESET_CANCEL_PREFIX: &str = "Queue Reset: ";
const RESET_COMPLETE_REMARK: &str = "Queue Reset: completed during reset";

#[derive(Debug, FromRow)]
struct QueueEventRow {
    id: i64,
    customer_id: i64,
    event_type: String,
    counter_id: Option<i64>,
    queue_position: Option<i32>,
    wait_time_minutes: Option<i32>,
    service_time_minutes: Option<i32>,
    processing_duration_minutes: Option<i32>,
    is_priority: bool,
    reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<QueueEventRow> for QueueEvent {
    type Error = QueueError;

    fn try_from(row: QueueEventRow) -> QueueResult<Self> {
        let event_type = row
            .event_type
            .parse::<QueueEventType>()
            .map_err(QueueError::Persistence)?;

        Ok(QueueEvent {
            id: row.id,
            event: NewQueueEvent {
                customer_id: row.customer_id,
                event_type,
                counter_id: row.counter_id,
                queue_position: row.queue_position,
                wait_time_minutes: row.wait_time_minutes,
                service_time_minutes: row.service_time_minutes,
                processing_duration_minutes: row.processing_duration_minutes,
                is_priority: row.is_priority,
                reason: row.reason,
                created_at: row.created_at,
            },
        })
    }
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    original_customer_id: i64,
    name: String,
    contact: Option<String>,
    queue_status: String,
    token_number: Option<i32>,
    priority_flags: Json<PriorityFlags>,
    created_at: DateTime<Utc>,
    archived_at: DateTime<Utc>,
    archive_date: NaiveDate,
}

impl TryFrom<HistoryRow> for CustomerHistoryRecord {
    type Error = QueueError;

    fn try_from(row: HistoryRow) -> QueueResult<Self> {
        let queue_status = row.queue_status.parse::<QueueStatus>().map_err(|e| {
            QueueError::Persistence(format!(
                "history for customer {}: {e}",
                row.original_customer_id
            ))
        })?;

        Ok(CustomerHistoryRecord {
            original_customer_id: row.original_customer_id,
            name: row.name,
            contact: row.contact,
            queue_status,
            token_number: row.token_number,
            priority_flags: row.priority_flags.0,
            created_at: row.created_at,
            archived_at: row.archived_at,
            archive_date: row.archive_date,
        })
    }
}

fn decode_customers(rows: Vec<CustomerRow>) -> QueueResult<Vec<Customer>> {
    rows.into_iter().map(Customer::try_from).collect()
}

/// Postgres-backed queue store
#[derive(Debug, Clone)]
pub struct PgQueueStore {
    pool: PgPool,
}

impl PgQueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> QueueResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Queue schema migrations applied");
        Ok(())
    }

    async fn lock_customer(
        conn: &mut PgConnection,
        customer_id: i64,
    ) -> QueueResult<Option<Customer>> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers c WHERE c.id = $1 FOR UPDATE");
        let row: Option<CustomerRow> = sqlx::query_as(&sql)
            .bind(customer_id)
            .fetch_optional(&mut *conn)
            .await?;
        row.map(Customer::try_from).transpose()
    }

    /// Lock an active counter row; missing or inactive counters are `NotFound`
    async fn lock_counter(conn: &mut PgConnection, counter_id: i64) -> QueueResult<Counter> {
        let sql = format!("SELECT {COUNTER_COLUMNS} FROM counters WHERE id = $1 FOR UPDATE");
        let counter: Option<Counter> = sqlx::query_as(&sql)
            .bind(counter_id)
            .fetch_optional(&mut *conn)
            .await?;

        match counter {
            Some(counter) if counter.is_active => Ok(counter),
            Some(_) => Err(QueueError::not_found(format!("counter {counter_id} is inactive"))),
            None => Err(QueueError::not_found(format!("counter {counter_id}"))),
        }
    }

    /// Unbind the customer from every counter; returns the counters touched
    async fn release_customer(conn: &mut PgConnection, customer_id: i64) -> QueueResult<Vec<i64>> {
        let released: Vec<i64> = sqlx::query_scalar(
            "UPDATE counters SET current_customer_id = NULL, updated_at = NOW() \
             WHERE current_customer_id = $1 RETURNING id",
        )
        .bind(customer_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(released)
    }

    async fn bind_counter(
        conn: &mut PgConnection,
        counter: &Counter,
        customer_id: i64,
    ) -> QueueResult<()> {
        // Clear stale bindings first so the partial unique index holds
        sqlx::query(
            "UPDATE counters SET current_customer_id = NULL, updated_at = NOW() \
             WHERE current_customer_id = $1 AND id <> $2",
        )
        .bind(customer_id)
        .bind(counter.id)
        .execute(&mut *conn)
        .await?;

        if let Some(previous) = counter.current_customer_id.filter(|&id| id != customer_id) {
            warn!(
                counter_id = counter.id,
                previous_customer_id = previous,
                customer_id,
                "Counter rebound while still holding another customer"
            );
        }

        sqlx::query(
            "UPDATE counters SET current_customer_id = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(customer_id)
        .bind(counter.id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn upsert_history(
        conn: &mut PgConnection,
        record: &CustomerHistoryRecord,
    ) -> QueueResult<()> {
        sqlx::query(
            r#"
            INSERT INTO customer_history (
                original_customer_id, name, contact, queue_status, token_number,
                priority_flags, created_at, archived_at, archive_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (original_customer_id, archive_date) DO UPDATE SET
                name = EXCLUDED.name,
                contact = EXCLUDED.contact,
                queue_status = EXCLUDED.queue_status,
                token_number = EXCLUDED.token_number,
                priority_flags = EXCLUDED.priority_flags,
                archived_at = EXCLUDED.archived_at
            "#,
        )
        .bind(record.original_customer_id)
        .bind(&record.name)
        .bind(&record.contact)
        .bind(record.queue_status.as_str())
        .bind(record.token_number)
        .bind(Json(record.priority_flags))
        .bind(record.created_at)
        .bind(record.archived_at)
        .bind(record.archive_date)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Upsert one history row inside a savepoint so a failure leaves the
    /// surrounding reset transaction usable
    async fn upsert_history_isolated(
        conn: &mut PgConnection,
        record: &CustomerHistoryRecord,
    ) -> QueueResult<()> {
        sqlx::query("SAVEPOINT archive_customer")
            .execute(&mut *conn)
            .await?;

        match Self::upsert_history(conn, record).await {
            Ok(()) => {
                sqlx::query("RELEASE SAVEPOINT archive_customer")
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            }
            Err(err) => {
                sqlx::query("ROLLBACK TO SAVEPOINT archive_customer")
                    .execute(&mut *conn)
                    .await?;
                Err(err)
            }
        }
    }

    /// Set the terminal reset status on the snapshotted ids still in `from`
    async fn reset_transition(
        conn: &mut PgConnection,
        ids: &[i64],
        from: &[&str],
        target: QueueStatus,
        remark: &str,
    ) -> QueueResult<Vec<Customer>> {
        let sql = format!(
            r#"
            UPDATE customers c SET
                queue_status = $1,
                served_at = NOW(),
                updated_at = NOW(),
                remarks = CASE
                    WHEN c.remarks IS NULL OR c.remarks = '' THEN $2
                    ELSE c.remarks || ' | ' || $2
                END
            WHERE c.id = ANY($3) AND c.queue_status = ANY($4)
            RETURNING {CUSTOMER_COLUMNS}
            "#
        );
        let from: Vec<String> = from.iter().map(|s| s.to_string()).collect();
        let rows: Vec<CustomerRow> = sqlx::query_as(&sql)
            .bind(target.as_str())
            .bind(remark)
            .bind(ids)
            .bind(&from)
            .fetch_all(&mut *conn)
            .await?;
        decode_customers(rows)
    }
}

#[async_trait]
impl QueueStore for PgQueueStore {
    #[instrument(skip(self, customer), fields(name = %customer.name))]
    async fn insert_customer(&self, customer: NewCustomer) -> QueueResult<Customer> {
        let sql = format!(
            r#"
            INSERT INTO customers AS c (
                name, contact, token_number, or_number, priority_flags, queue_status,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, 'waiting', COALESCE($6, NOW()), COALESCE($6, NOW()))
            RETURNING {CUSTOMER_COLUMNS}
            "#
        );
        let row: CustomerRow = sqlx::query_as(&sql)
            .bind(&customer.name)
            .bind(&customer.contact)
            .bind(customer.token_number)
            .bind(&customer.or_number)
            .bind(Json(customer.priority_flags))
            .bind(customer.created_at)
            .fetch_one(&self.pool)
            .await?;
        Customer::try_from(row)
    }

    async fn find_customer(&self, customer_id: i64) -> QueueResult<Option<Customer>> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers c WHERE c.id = $1");
        let row: Option<CustomerRow> = sqlx::query_as(&sql)
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Customer::try_from).transpose()
    }

    async fn list_customers(&self, statuses: &[QueueStatus]) -> QueueResult<Vec<Customer>> {
        let filter: Option<Vec<String>> = if statuses.is_empty() {
            None
        } else {
            Some(statuses.iter().map(|s| s.as_str().to_string()).collect())
        };

        let sql = format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers c \
             WHERE ($1::TEXT[] IS NULL OR c.queue_status = ANY($1)) \
             ORDER BY {}",
            order_by_sql()
        );
        let rows: Vec<CustomerRow> = sqlx::query_as(&sql)
            .bind(filter)
            .fetch_all(&self.pool)
            .await?;
        decode_customers(rows)
    }

    async fn count_with_status(&self, status: QueueStatus) -> QueueResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM customers WHERE queue_status = $1")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn create_counter(&self, name: &str) -> QueueResult<Counter> {
        let sql = format!("INSERT INTO counters (name) VALUES ($1) RETURNING {COUNTER_COLUMNS}");
        let counter = sqlx::query_as::<_, Counter>(&sql)
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(counter)
    }

    async fn set_counter_active(&self, counter_id: i64, is_active: bool) -> QueueResult<Counter> {
        let sql = format!(
            "UPDATE counters SET is_active = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING {COUNTER_COLUMNS}"
        );
        sqlx::query_as::<_, Counter>(&sql)
            .bind(counter_id)
            .bind(is_active)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| QueueError::not_found(format!("counter {counter_id}")))
    }

    async fn find_counter(&self, counter_id: i64) -> QueueResult<Option<Counter>> {
        let sql = format!("SELECT {COUNTER_COLUMNS} FROM counters WHERE id = $1");
        let counter = sqlx::query_as::<_, Counter>(&sql)
            .bind(counter_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(counter)
    }

    async fn list_counters(&self) -> QueueResult<Vec<Counter>> {
        let sql = format!("SELECT {COUNTER_COLUMNS} FROM counters ORDER BY id");
        let counters = sqlx::query_as::<_, Counter>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(counters)
    }

    #[instrument(skip(self, role, machine), fields(role = %role))]
    async fn claim_next(
        &self,
        counter_id: i64,
        role: &Role,
        machine: &QueueStateMachine,
    ) -> QueueResult<Option<AppliedTransition>> {
        machine.authorize(role, QueueStatus::Waiting, QueueStatus::Serving)?;

        let mut tx = self.pool.begin().await?;
        let counter = Self::lock_counter(&mut tx, counter_id).await?;

        let sql = format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers c \
             WHERE c.queue_status = 'waiting' \
             ORDER BY {} \
             LIMIT 1 \
             FOR UPDATE SKIP LOCKED",
            order_by_sql()
        );
        let row: Option<CustomerRow> = sqlx::query_as(&sql).fetch_optional(&mut *tx).await?;
        let Some(row) = row else {
            tx.rollback().await?;
            debug!(counter_id, "No waiting customer to call");
            return Ok(None);
        };
        let candidate = Customer::try_from(row)?;

        // Window functions cannot be combined with FOR UPDATE, so the rank is a separate count
        let ahead_sql = format!(
            "SELECT COUNT(*) FROM customers c \
             WHERE c.queue_status = 'waiting' AND c.id <> $1 AND ({ORDERING_KEY_SQL}) < $2"
        );
        let ahead: i64 = sqlx::query_scalar(&ahead_sql)
            .bind(candidate.id)
            .bind(ordering_key(&candidate))
            .fetch_one(&mut *tx)
            .await?;

        let update_sql = format!(
            "UPDATE customers c SET queue_status = 'serving', updated_at = NOW() \
             WHERE c.id = $1 RETURNING {CUSTOMER_COLUMNS}"
        );
        let row: CustomerRow = sqlx::query_as(&update_sql)
            .bind(candidate.id)
            .fetch_one(&mut *tx)
            .await?;
        let customer = Customer::try_from(row)?;

        Self::bind_counter(&mut tx, &counter, customer.id).await?;
        tx.commit().await?;

        debug!(customer_id = customer.id, counter_id, position = ahead + 1, "Customer claimed");

        Ok(Some(AppliedTransition {
            previous_status: candidate.queue_status,
            previous_updated_at: candidate.updated_at,
            customer,
            counter_id: Some(counter_id),
            queue_position: Some(i32::try_from(ahead + 1).unwrap_or(i32::MAX)),
        }))
    }

    #[instrument(
        skip(self, request, machine),
        fields(customer_id = request.customer_id, target = %request.target)
    )]
    async fn transition(
        &self,
        request: TransitionRequest,
        machine: &QueueStateMachine,
    ) -> QueueResult<AppliedTransition> {
        let mut tx = self.pool.begin().await?;

        let current = Self::lock_customer(&mut tx, request.customer_id)
            .await?
            .ok_or_else(|| QueueError::not_found(format!("customer {}", request.customer_id)))?;

        machine.validate(current.queue_status, request.target)?;
        if !request.precondition_holds(current.queue_status) {
            return Err(QueueError::not_found(format!(
                "customer {} is {}",
                current.id, current.queue_status
            )));
        }

        machine.authorize(&request.role, current.queue_status, request.target)?;

        let bind_target = match request.counter {
            CounterEffect::Bind(counter_id) => Some(Self::lock_counter(&mut tx, counter_id).await?),
            _ => None,
        };

        let update_sql = format!(
            r#"
            UPDATE customers c SET
                queue_status = $2,
                updated_at = NOW(),
                served_at = CASE WHEN $3 THEN NOW() ELSE c.served_at END,
                remarks = CASE
                    WHEN $4::TEXT IS NULL THEN c.remarks
                    WHEN c.remarks IS NULL OR c.remarks = '' THEN $4
                    ELSE c.remarks || ' | ' || $4
                END
            WHERE c.id = $1
            RETURNING {CUSTOMER_COLUMNS}
            "#
        );
        let row: CustomerRow = sqlx::query_as(&update_sql)
            .bind(current.id)
            .bind(request.target.as_str())
            .bind(request.stamp_served_at)
            .bind(request.remark.as_deref())
            .fetch_one(&mut *tx)
            .await?;
        let customer = Customer::try_from(row)?;

        let counter_id = match (request.counter, bind_target) {
            (CounterEffect::Bind(_), Some(counter)) => {
                Self::bind_counter(&mut tx, &counter, customer.id).await?;
                Some(counter.id)
            }
            (CounterEffect::Release(expected), _) => {
                let released = Self::release_customer(&mut tx, customer.id)
                    .await?
                    .into_iter()
                    .next();
                if released != Some(expected) {
                    warn!(
                        customer_id = customer.id,
                        expected,
                        ?released,
                        "Customer was not held by the named counter"
                    );
                }
                released
            }
            (CounterEffect::ReleaseAny, _) => Self::release_customer(&mut tx, customer.id)
                .await?
                .into_iter()
                .next(),
            _ => None,
        };

        if let Some(archive_date) = request.archive_on {
            let record = CustomerHistoryRecord::from_customer(
                &customer,
                customer.queue_status,
                archive_date,
                Utc::now(),
            );
            Self::upsert_history(&mut tx, &record).await?;
        }

        tx.commit().await?;

        Ok(AppliedTransition {
            previous_status: current.queue_status,
            previous_updated_at: current.updated_at,
            customer,
            counter_id,
            queue_position: None,
        })
    }

    #[instrument(skip(self), fields(count = customer_ids.len()))]
    async fn assign_manual_positions(&self, customer_ids: &[i64]) -> QueueResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;

        for (index, customer_id) in customer_ids.iter().enumerate() {
            let position = i32::try_from(index + 1)
                .map_err(|_| QueueError::Persistence("reorder list too long".to_string()))?;
            let result = sqlx::query(
                "UPDATE customers SET manual_position = $1 \
                 WHERE id = $2 AND queue_status = 'waiting'",
            )
            .bind(position)
            .bind(customer_id)
            .execute(&mut *tx)
            .await?;
            updated += result.rows_affected();
        }

        tx.commit().await?;
        Ok(updated)
    }

    #[instrument(skip(self, request), fields(business_date = %request.day.date))]
    async fn reset_queue(&self, request: ResetRequest) -> QueueResult<ResetOutcome> {
        let mut tx = self.pool.begin().await?;

        let snapshot_sql = format!(
            r#"
            SELECT {CUSTOMER_COLUMNS} FROM customers c
            WHERE c.queue_status IN ('waiting', 'serving', 'processing')
               OR (
                    c.queue_status = 'completed'
                    AND c.created_at >= $1 AND c.created_at < $2
                    AND NOT EXISTS (
                        SELECT 1 FROM customer_history h
                        WHERE h.original_customer_id = c.id AND h.archive_date = $3
                    )
               )
            ORDER BY c.id
            FOR UPDATE OF c
            "#
        );
        let rows: Vec<CustomerRow> = sqlx::query_as(&snapshot_sql)
            .bind(request.day.starts_at)
            .bind(request.day.ends_at)
            .bind(request.day.date)
            .fetch_all(&mut *tx)
            .await?;
        let snapshot = decode_customers(rows)?;
        let ids: Vec<i64> = snapshot.iter().map(|c| c.id).collect();
        let previous: HashMap<i64, QueueStatus> =
            snapshot.iter().map(|c| (c.id, c.queue_status)).collect();

        let cancel_remark = format!("{RESET_CANCEL_PREFIX}{}", request.reason);
        let cancelled = Self::reset_transition(
            &mut tx,
            &ids,
            &["waiting"],
            QueueStatus::Cancelled,
            &cancel_remark,
        )
        .await?;
        let completed = Self::reset_transition(
            &mut tx,
            &ids,
            &["serving", "processing"],
            QueueStatus::Completed,
            RESET_COMPLETE_REMARK,
        )
        .await?;

        let counters_cleared = sqlx::query(
            "UPDATE counters SET current_customer_id = NULL, updated_at = NOW() \
             WHERE current_customer_id IS NOT NULL",
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let mut final_rows: HashMap<i64, &Customer> = HashMap::new();
        for customer in cancelled.iter().chain(completed.iter()) {
            final_rows.insert(customer.id, customer);
        }

        let archived_at = Utc::now();
        let mut archived = Vec::with_capacity(snapshot.len());
        let mut archive_failures = Vec::new();
        for original in &snapshot {
            let current = final_rows.get(&original.id).copied().unwrap_or(original);
            let record = CustomerHistoryRecord::from_customer(
                current,
                current.queue_status,
                request.day.date,
                archived_at,
            );
            match Self::upsert_history_isolated(&mut tx, &record).await {
                Ok(()) => archived.push(original.id),
                Err(err) => {
                    warn!(
                        customer_id = original.id,
                        error = %err,
                        "Failed to archive customer during reset"
                    );
                    archive_failures.push(original.id);
                }
            }
        }

        tx.commit().await?;

        let with_previous = |customers: Vec<Customer>| -> Vec<ResetCustomer> {
            customers
                .into_iter()
                .map(|customer| ResetCustomer {
                    previous_status: previous
                        .get(&customer.id)
                        .copied()
                        .unwrap_or(customer.queue_status),
                    customer,
                })
                .collect()
        };

        Ok(ResetOutcome {
            cancelled: with_previous(cancelled),
            completed: with_previous(completed),
            archived,
            archive_failures,
            counters_cleared,
        })
    }

    async fn insert_queue_event(&self, event: &NewQueueEvent) -> QueueResult<()> {
        sqlx::query(
            r#"
            INSERT INTO queue_events (
                customer_id, event_type, counter_id, queue_position, wait_time_minutes,
                service_time_minutes, processing_duration_minutes, is_priority, reason, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(event.customer_id)
        .bind(event.event_type.as_str())
        .bind(event.counter_id)
        .bind(event.queue_position)
        .bind(event.wait_time_minutes)
        .bind(event.service_time_minutes)
        .bind(event.processing_duration_minutes)
        .bind(event.is_priority)
        .bind(&event.reason)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_queue_events(&self, customer_id: Option<i64>) -> QueueResult<Vec<QueueEvent>> {
        let rows: Vec<QueueEventRow> = sqlx::query_as(
            "SELECT id, customer_id, event_type, counter_id, queue_position, wait_time_minutes, \
             service_time_minutes, processing_duration_minutes, is_priority, reason, created_at \
             FROM queue_events WHERE ($1::BIGINT IS NULL OR customer_id = $1) ORDER BY id",
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(QueueEvent::try_from).collect()
    }

    async fn list_history(
        &self,
        archive_date: NaiveDate,
    ) -> QueueResult<Vec<CustomerHistoryRecord>> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT original_customer_id, name, contact, queue_status, token_number, \
             priority_flags, created_at, archived_at, archive_date \
             FROM customer_history WHERE archive_date = $1 ORDER BY original_customer_id",
        )
        .bind(archive_date)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CustomerHistoryRecord::try_from).collect()
    }

    async fn record_reset_attempt(&self, entry: &ResetLogEntry) -> QueueResult<()> {
        sqlx::query(
            "INSERT INTO daily_reset_log (reset_date, success, duration_ms, error, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(entry.reset_date)
        .bind(entry.success)
        .bind(entry.duration_ms)
        .bind(&entry.error)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn successful_reset_on(&self, reset_date: NaiveDate) -> QueueResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM daily_reset_log WHERE reset_date = $1 AND success)",
        )
        .bind(reset_date)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn list_reset_attempts(&self, reset_date: NaiveDate) -> QueueResult<Vec<ResetLogEntry>> {
        let entries = sqlx::query_as::<_, ResetLogEntry>(
            "SELECT reset_date, success, duration_ms, error, created_at \
             FROM daily_reset_log WHERE reset_date = $1 ORDER BY id",
        )
        .bind(reset_date)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    #[instrument(skip(self), fields(date = %day.date))]
    async fn refresh_daily_snapshot(&self, day: BusinessDay) -> QueueResult<DailyQueueSnapshot> {
        let snapshot = sqlx::query_as::<_, DailyQueueSnapshot>(
            r#"
            INSERT INTO daily_queue_history (
                date, total_customers, waiting_customers, serving_customers,
                processing_customers, completed_customers, cancelled_customers,
                priority_customers, avg_wait_minutes, updated_at
            )
            SELECT
                $1,
                COUNT(*),
                COUNT(*) FILTER (WHERE c.queue_status = 'waiting'),
                COUNT(*) FILTER (WHERE c.queue_status = 'serving'),
                COUNT(*) FILTER (WHERE c.queue_status = 'processing'),
                COUNT(*) FILTER (WHERE c.queue_status = 'completed'),
                COUNT(*) FILTER (WHERE c.queue_status = 'cancelled'),
                COUNT(*) FILTER (WHERE
                    COALESCE((c.priority_flags->>'senior_citizen')::BOOLEAN, FALSE)
                    OR COALESCE((c.priority_flags->>'pwd')::BOOLEAN, FALSE)
                    OR COALESCE((c.priority_flags->>'pregnant')::BOOLEAN, FALSE)
                ),
                COALESCE((
                    SELECT AVG(e.wait_time_minutes)::DOUBLE PRECISION
                    FROM queue_events e
                    WHERE e.event_type = 'called'
                      AND e.wait_time_minutes IS NOT NULL
                      AND e.created_at >= $2 AND e.created_at < $3
                ), 0),
                NOW()
            FROM customers c
            WHERE c.created_at >= $2 AND c.created_at < $3
            ON CONFLICT (date) DO UPDATE SET
                total_customers = EXCLUDED.total_customers,
                waiting_customers = EXCLUDED.waiting_customers,
                serving_customers = EXCLUDED.serving_customers,
                processing_customers = EXCLUDED.processing_customers,
                completed_customers = EXCLUDED.completed_customers,
                cancelled_customers = EXCLUDED.cancelled_customers,
                priority_customers = EXCLUDED.priority_customers,
                avg_wait_minutes = EXCLUDED.avg_wait_minutes,
                updated_at = EXCLUDED.updated_at
            RETURNING date, total_customers, waiting_customers, serving_customers,
                processing_customers, completed_customers, cancelled_customers,
                priority_customers, avg_wait_minutes, updated_at
            "#,
        )
        .bind(day.date)
        .bind(day.starts_at)
        .bind(day.ends_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(snapshot)
    }

    async fn find_daily_snapshot(
        &self,
        date: NaiveDate,
    ) -> QueueResult<Option<DailyQueueSnapshot>> {
        let snapshot = sqlx::query_as::<_, DailyQueueSnapshot>(
            "SELECT date, total_customers, waiting_customers, serving_customers, \
             processing_customers, completed_customers, cancelled_customers, \
             priority_customers, avg_wait_minutes, updated_at \
             FROM daily_queue_history WHERE date = $1",
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(snapshot)
    }

    #[instrument(skip(self))]
    async fn purge_before(
        &self,
        cutoff_date: NaiveDate,
        cutoff_at: DateTime<Utc>,
    ) -> QueueResult<PurgeCounts> {
        let mut tx = self.pool.begin().await?;

        let history = sqlx::query("DELETE FROM customer_history WHERE archive_date < $1")
            .bind(cutoff_date)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let events = sqlx::query("DELETE FROM queue_events WHERE created_at < $1")
            .bind(cutoff_at)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let snapshots = sqlx::query("DELETE FROM daily_queue_history WHERE date < $1")
            .bind(cutoff_date)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let reset_logs = sqlx::query("DELETE FROM daily_reset_log WHERE reset_date < $1")
            .bind(cutoff_date)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        Ok(PurgeCounts {
            history,
            events,
            snapshots,
            reset_logs,
        })
    }
}
