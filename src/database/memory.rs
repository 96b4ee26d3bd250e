//! # In-Memory Queue Store
//!
//! [`QueueStore`] kept entirely in process. One async mutex guards the whole
//! state and is held for the full duration of each operation, which gives the
//! same atomicity and exclusive-claim guarantees the Postgres store gets from
//! row locks. Every operation validates before it mutates, so an error leaves
//! the state untouched.
//!
//! Failure injection hooks let tests exercise archival isolation, event
//! write failures and failed resets without a database.

use super::store::{
    AppliedTransition, CounterEffect, PurgeCounts, QueueStore, ResetCustomer, ResetOutcome,
    ResetRequest, TransitionRequest,
};
use crate::calendar::BusinessDay;
use crate::error::{QueueError, QueueResult};
use crate::models::{
    Counter, Customer, CustomerHistoryRecord, DailyQueueSnapshot, NewCustomer, NewQueueEvent,
    QueueEvent, QueueEventType, ResetLogEntry,
};
use crate::queue::ordering::{compare, ordering_key};
use crate::state_machine::{QueueStateMachine, QueueStatus, Role};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct MemoryState {
    customers: BTreeMap<i64, Customer>,
    counters: BTreeMap<i64, Counter>,
    events: Vec<QueueEvent>,
    history: BTreeMap<(i64, NaiveDate), CustomerHistoryRecord>,
    reset_log: Vec<ResetLogEntry>,
    snapshots: BTreeMap<NaiveDate, DailyQueueSnapshot>,
    next_customer_id: i64,
    next_counter_id: i64,
    next_event_id: i64,
}

impl MemoryState {
    fn active_counter(&self, counter_id: i64) -> QueueResult<&Counter> {
        match self.counters.get(&counter_id) {
            Some(counter) if counter.is_active => Ok(counter),
            Some(_) => Err(QueueError::not_found(format!("counter {counter_id} is inactive"))),
            None => Err(QueueError::not_found(format!("counter {counter_id}"))),
        }
    }

    fn release_customer(&mut self, customer_id: i64, now: DateTime<Utc>) -> Vec<i64> {
        let mut released = Vec::new();
        for counter in self.counters.values_mut() {
            if counter.current_customer_id == Some(customer_id) {
                counter.current_customer_id = None;
                counter.updated_at = now;
                released.push(counter.id);
            }
        }
        released
    }

    fn bind_counter(&mut self, counter_id: i64, customer_id: i64, now: DateTime<Utc>) {
        for counter in self.counters.values_mut() {
            if counter.id != counter_id && counter.current_customer_id == Some(customer_id) {
                counter.current_customer_id = None;
                counter.updated_at = now;
            }
        }
        if let Some(counter) = self.counters.get_mut(&counter_id) {
            if let Some(previous) = counter.current_customer_id.filter(|&id| id != customer_id) {
                warn!(
                    counter_id,
                    previous_customer_id = previous,
                    customer_id,
                    "Counter rebound while still holding another customer"
                );
            }
            counter.current_customer_id = Some(customer_id);
            counter.updated_at = now;
        }
    }

    fn waiting_sorted(&self) -> Vec<&Customer> {
        let mut waiting: Vec<&Customer> = self
            .customers
            .values()
            .filter(|c| c.queue_status == QueueStatus::Waiting)
            .collect();
        waiting.sort_by(|a, b| compare(a, b));
        waiting
    }
}

#[derive(Debug, Default)]
struct FaultPlan {
    archive_failures: HashSet<i64>,
    failing_event_inserts: u32,
    failing_resets: u32,
}

/// Queue store held in process memory
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    state: Mutex<MemoryState>,
    faults: parking_lot::Mutex<FaultPlan>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future history upsert for this customer fail
    pub fn fail_archive_for(&self, customer_id: i64) {
        self.faults.lock().archive_failures.insert(customer_id);
    }

    /// Fail the next `count` event inserts
    pub fn fail_next_event_inserts(&self, count: u32) {
        self.faults.lock().failing_event_inserts = count;
    }

    /// Fail the next `count` reset transactions before they touch any row
    pub fn fail_next_resets(&self, count: u32) {
        self.faults.lock().failing_resets = count;
    }

    /// Overwrite a customer's timestamps, for wait and duration scenarios
    pub async fn backdate_customer(
        &self,
        customer_id: i64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        let customer = state
            .customers
            .get_mut(&customer_id)
            .ok_or_else(|| QueueError::not_found(format!("customer {customer_id}")))?;
        customer.created_at = created_at;
        customer.updated_at = updated_at;
        Ok(())
    }

    fn take_fault(counter: &mut u32) -> bool {
        if *counter > 0 {
            *counter -= 1;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn insert_customer(&self, customer: NewCustomer) -> QueueResult<Customer> {
        let mut state = self.state.lock().await;
        state.next_customer_id += 1;
        let now = Utc::now();
        let created_at = customer.created_at.unwrap_or(now);

        let row = Customer {
            id: state.next_customer_id,
            name: customer.name,
            contact: customer.contact,
            token_number: customer.token_number,
            or_number: customer.or_number,
            priority_flags: customer.priority_flags,
            manual_position: None,
            queue_status: QueueStatus::Waiting,
            created_at,
            updated_at: created_at,
            served_at: None,
            remarks: None,
        };
        state.customers.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_customer(&self, customer_id: i64) -> QueueResult<Option<Customer>> {
        let state = self.state.lock().await;
        Ok(state.customers.get(&customer_id).cloned())
    }

    async fn list_customers(&self, statuses: &[QueueStatus]) -> QueueResult<Vec<Customer>> {
        let state = self.state.lock().await;
        let mut customers: Vec<Customer> = state
            .customers
            .values()
            .filter(|c| statuses.is_empty() || statuses.contains(&c.queue_status))
            .cloned()
            .collect();
        customers.sort_by(compare);
        Ok(customers)
    }

    async fn count_with_status(&self, status: QueueStatus) -> QueueResult<i64> {
        let state = self.state.lock().await;
        Ok(state
            .customers
            .values()
            .filter(|c| c.queue_status == status)
            .count() as i64)
    }

    async fn create_counter(&self, name: &str) -> QueueResult<Counter> {
        let mut state = self.state.lock().await;
        if state.counters.values().any(|c| c.name == name) {
            return Err(QueueError::Persistence(format!("counter name '{name}' already exists")));
        }
        state.next_counter_id += 1;
        let counter = Counter {
            id: state.next_counter_id,
            name: name.to_string(),
            is_active: true,
            current_customer_id: None,
            updated_at: Utc::now(),
        };
        state.counters.insert(counter.id, counter.clone());
        Ok(counter)
    }

    async fn set_counter_active(&self, counter_id: i64, is_active: bool) -> QueueResult<Counter> {
        let mut state = self.state.lock().await;
        let counter = state
            .counters
            .get_mut(&counter_id)
            .ok_or_else(|| QueueError::not_found(format!("counter {counter_id}")))?;
        counter.is_active = is_active;
        counter.updated_at = Utc::now();
        Ok(counter.clone())
    }

    async fn find_counter(&self, counter_id: i64) -> QueueResult<Option<Counter>> {
        let state = self.state.lock().await;
        Ok(state.counters.get(&counter_id).cloned())
    }

    async fn list_counters(&self) -> QueueResult<Vec<Counter>> {
        let state = self.state.lock().await;
        Ok(state.counters.values().cloned().collect())
    }

    async fn claim_next(
        &self,
        counter_id: i64,
        role: &Role,
        machine: &QueueStateMachine,
    ) -> QueueResult<Option<AppliedTransition>> {
        machine.authorize(role, QueueStatus::Waiting, QueueStatus::Serving)?;

        let mut state = self.state.lock().await;
        state.active_counter(counter_id)?;

        let (candidate, position) = {
            let waiting = state.waiting_sorted();
            let Some(first) = waiting.first() else {
                debug!(counter_id, "No waiting customer to call");
                return Ok(None);
            };
            let key = ordering_key(first);
            let ahead = waiting.iter().filter(|c| ordering_key(c) < key).count();
            ((*first).clone(), ahead + 1)
        };

        let now = Utc::now();
        let customer = {
            let Some(row) = state.customers.get_mut(&candidate.id) else {
                return Ok(None);
            };
            row.queue_status = QueueStatus::Serving;
            row.updated_at = now;
            row.clone()
        };
        state.bind_counter(counter_id, customer.id, now);

        Ok(Some(AppliedTransition {
            previous_status: candidate.queue_status,
            previous_updated_at: candidate.updated_at,
            customer,
            counter_id: Some(counter_id),
            queue_position: Some(i32::try_from(position).unwrap_or(i32::MAX)),
        }))
    }

    async fn transition(
        &self,
        request: TransitionRequest,
        machine: &QueueStateMachine,
    ) -> QueueResult<AppliedTransition> {
        let mut state = self.state.lock().await;

        let current = state
            .customers
            .get(&request.customer_id)
            .cloned()
            .ok_or_else(|| QueueError::not_found(format!("customer {}", request.customer_id)))?;

        machine.validate(current.queue_status, request.target)?;
        if !request.precondition_holds(current.queue_status) {
            return Err(QueueError::not_found(format!(
                "customer {} is {}",
                current.id, current.queue_status
            )));
        }

        machine.authorize(&request.role, current.queue_status, request.target)?;

        if let CounterEffect::Bind(counter_id) = request.counter {
            state.active_counter(counter_id)?;
        }

        let now = Utc::now();
        let mut updated = current.clone();
        updated.queue_status = request.target;
        updated.updated_at = now;
        if request.stamp_served_at {
            updated.served_at = Some(now);
        }
        if let Some(note) = request.remark.as_deref() {
            updated.append_remark(note);
        }
        state.customers.insert(updated.id, updated.clone());

        let counter_id = match request.counter {
            CounterEffect::Keep => None,
            CounterEffect::Bind(counter_id) => {
                state.bind_counter(counter_id, updated.id, now);
                Some(counter_id)
            }
            CounterEffect::Release(expected) => {
                let released = state.release_customer(updated.id, now).into_iter().next();
                if released != Some(expected) {
                    warn!(
                        customer_id = updated.id,
                        expected,
                        ?released,
                        "Customer was not held by the named counter"
                    );
                }
                released
            }
            CounterEffect::ReleaseAny => state.release_customer(updated.id, now).into_iter().next(),
        };

        if let Some(archive_date) = request.archive_on {
            let record = CustomerHistoryRecord::from_customer(
                &updated,
                updated.queue_status,
                archive_date,
                now,
            );
            state.history.insert(record.key(), record);
        }

        Ok(AppliedTransition {
            previous_status: current.queue_status,
            previous_updated_at: current.updated_at,
            customer: updated,
            counter_id,
            queue_position: None,
        })
    }

    async fn assign_manual_positions(&self, customer_ids: &[i64]) -> QueueResult<u64> {
        let mut state = self.state.lock().await;
        let mut updated = 0;

        for (index, customer_id) in customer_ids.iter().enumerate() {
            let position = i32::try_from(index + 1)
                .map_err(|_| QueueError::Persistence("reorder list too long".to_string()))?;
            if let Some(customer) = state.customers.get_mut(customer_id) {
                if customer.queue_status == QueueStatus::Waiting {
                    customer.manual_position = Some(position);
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    async fn reset_queue(&self, request: ResetRequest) -> QueueResult<ResetOutcome> {
        if Self::take_fault(&mut self.faults.lock().failing_resets) {
            return Err(QueueError::Persistence("injected reset failure".to_string()));
        }
        let archive_faults = self.faults.lock().archive_failures.clone();

        let mut state = self.state.lock().await;
        let day = request.day;

        let snapshot: Vec<Customer> = state
            .customers
            .values()
            .filter(|c| {
                c.queue_status.is_attended()
                    || c.queue_status == QueueStatus::Waiting
                    || (c.queue_status == QueueStatus::Completed
                        && day.contains(c.created_at)
                        && !state.history.contains_key(&(c.id, day.date)))
            })
            .cloned()
            .collect();

        let now = Utc::now();
        let cancel_remark = format!("Queue Reset: {}", request.reason);
        let mut outcome = ResetOutcome::default();

        for original in &snapshot {
            let (target, remark) = match original.queue_status {
                QueueStatus::Waiting => (QueueStatus::Cancelled, cancel_remark.as_str()),
                QueueStatus::Serving | QueueStatus::Processing => {
                    (QueueStatus::Completed, "Queue Reset: completed during reset")
                }
                _ => continue,
            };
            if let Some(row) = state.customers.get_mut(&original.id) {
                row.queue_status = target;
                row.served_at = Some(now);
                row.updated_at = now;
                row.append_remark(remark);

                let moved = ResetCustomer {
                    customer: row.clone(),
                    previous_status: original.queue_status,
                };
                if target == QueueStatus::Cancelled {
                    outcome.cancelled.push(moved);
                } else {
                    outcome.completed.push(moved);
                }
            }
        }

        for counter in state.counters.values_mut() {
            if counter.current_customer_id.take().is_some() {
                counter.updated_at = now;
                outcome.counters_cleared += 1;
            }
        }

        for original in &snapshot {
            if archive_faults.contains(&original.id) {
                warn!(customer_id = original.id, "Failed to archive customer during reset");
                outcome.archive_failures.push(original.id);
                continue;
            }
            let current = state.customers.get(&original.id).unwrap_or(original);
            let record =
                CustomerHistoryRecord::from_customer(current, current.queue_status, day.date, now);
            state.history.insert(record.key(), record);
            outcome.archived.push(original.id);
        }

        Ok(outcome)
    }

    async fn insert_queue_event(&self, event: &NewQueueEvent) -> QueueResult<()> {
        if Self::take_fault(&mut self.faults.lock().failing_event_inserts) {
            return Err(QueueError::Persistence("injected event insert failure".to_string()));
        }
        let mut state = self.state.lock().await;
        state.next_event_id += 1;
        let id = state.next_event_id;
        state.events.push(QueueEvent {
            id,
            event: event.clone(),
        });
        Ok(())
    }

    async fn list_queue_events(&self, customer_id: Option<i64>) -> QueueResult<Vec<QueueEvent>> {
        let state = self.state.lock().await;
        Ok(state
            .events
            .iter()
            .filter(|e| customer_id.map_or(true, |id| e.event.customer_id == id))
            .cloned()
            .collect())
    }

    async fn list_history(
        &self,
        archive_date: NaiveDate,
    ) -> QueueResult<Vec<CustomerHistoryRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .history
            .values()
            .filter(|h| h.archive_date == archive_date)
            .cloned()
            .collect())
    }

    async fn record_reset_attempt(&self, entry: &ResetLogEntry) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        state.reset_log.push(entry.clone());
        Ok(())
    }

    async fn successful_reset_on(&self, reset_date: NaiveDate) -> QueueResult<bool> {
        let state = self.state.lock().await;
        Ok(state
            .reset_log
            .iter()
            .any(|e| e.reset_date == reset_date && e.success))
    }

    async fn list_reset_attempts(&self, reset_date: NaiveDate) -> QueueResult<Vec<ResetLogEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .reset_log
            .iter()
            .filter(|e| e.reset_date == reset_date)
            .cloned()
            .collect())
    }

    async fn refresh_daily_snapshot(&self, day: BusinessDay) -> QueueResult<DailyQueueSnapshot> {
        let mut state = self.state.lock().await;

        let todays: Vec<&Customer> = state
            .customers
            .values()
            .filter(|c| day.contains(c.created_at))
            .collect();
        let count = |status: QueueStatus| {
            todays.iter().filter(|c| c.queue_status == status).count() as i64
        };

        let waits: Vec<i32> = state
            .events
            .iter()
            .filter(|e| {
                e.event.event_type == QueueEventType::Called && day.contains(e.event.created_at)
            })
            .filter_map(|e| e.event.wait_time_minutes)
            .collect();
        let avg_wait_minutes = if waits.is_empty() {
            0.0
        } else {
            waits.iter().map(|&w| f64::from(w)).sum::<f64>() / waits.len() as f64
        };

        let snapshot = DailyQueueSnapshot {
            date: day.date,
            total_customers: todays.len() as i64,
            waiting_customers: count(QueueStatus::Waiting),
            serving_customers: count(QueueStatus::Serving),
            processing_customers: count(QueueStatus::Processing),
            completed_customers: count(QueueStatus::Completed),
            cancelled_customers: count(QueueStatus::Cancelled),
            priority_customers: todays.iter().filter(|c| c.is_priority()).count() as i64,
            avg_wait_minutes,
            updated_at: Utc::now(),
        };
        state.snapshots.insert(day.date, snapshot.clone());
        Ok(snapshot)
    }

    async fn find_daily_snapshot(
        &self,
        date: NaiveDate,
    ) -> QueueResult<Option<DailyQueueSnapshot>> {
        let state = self.state.lock().await;
        Ok(state.snapshots.get(&date).cloned())
    }

    async fn purge_before(
        &self,
        cutoff_date: NaiveDate,
        cutoff_at: DateTime<Utc>,
    ) -> QueueResult<PurgeCounts> {
        let mut state = self.state.lock().await;

        let before = state.history.len();
        state.history.retain(|(_, date), _| *date >= cutoff_date);
        let history = (before - state.history.len()) as u64;

        let before = state.events.len();
        state.events.retain(|e| e.event.created_at >= cutoff_at);
        let events = (before - state.events.len()) as u64;

        let before = state.snapshots.len();
        state.snapshots.retain(|date, _| *date >= cutoff_date);
        let snapshots = (before - state.snapshots.len()) as u64;

        let before = state.reset_log.len();
        state.reset_log.retain(|e| e.reset_date >= cutoff_date);
        let reset_logs = (before - state.reset_log.len()) as u64;

        Ok(PurgeCounts {
            history,
            events,
            snapshots,
            reset_logs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PriorityFlags;
    use chrono::Duration;

    #[tokio::test]
    async fn test_claim_binds_counter_and_ranks() {
        let store = MemoryQueueStore::new();
        let machine = QueueStateMachine::default();
        let counter = store.create_counter("Counter 1").await.unwrap();

        let base = Utc::now() - Duration::minutes(30);
        store
            .insert_customer(NewCustomer::new("plain").created_at(base))
            .await
            .unwrap();
        let senior = store
            .insert_customer(
                NewCustomer::new("senior")
                    .with_flags(PriorityFlags::senior())
                    .created_at(base + Duration::minutes(10)),
            )
            .await
            .unwrap();

        let claimed = store
            .claim_next(counter.id, &Role::Cashier, &machine)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.customer.id, senior.id);
        assert_eq!(claimed.customer.queue_status, QueueStatus::Serving);
        assert_eq!(claimed.queue_position, Some(1));

        let counter = store.find_counter(counter.id).await.unwrap().unwrap();
        assert_eq!(counter.current_customer_id, Some(senior.id));
    }

    #[tokio::test]
    async fn test_failed_authorization_leaves_state_untouched() {
        let store = MemoryQueueStore::new();
        let machine = QueueStateMachine::default();
        let customer = store.insert_customer(NewCustomer::new("a")).await.unwrap();

        let err = store
            .transition(
                TransitionRequest::new(customer.id, QueueStatus::Serving, Role::Sales),
                &machine,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Forbidden { .. }));

        let unchanged = store.find_customer(customer.id).await.unwrap().unwrap();
        assert_eq!(unchanged, customer);
    }

    #[tokio::test]
    async fn test_missing_edge_wins_over_precondition() {
        let store = MemoryQueueStore::new();
        let machine = QueueStateMachine::default();
        let customer = store.insert_customer(NewCustomer::new("a")).await.unwrap();

        let err = store
            .transition(
                TransitionRequest::new(customer.id, QueueStatus::Completed, Role::Admin)
                    .require_from(&[QueueStatus::Serving, QueueStatus::Processing]),
                &machine,
            )
            .await
            .unwrap_err();
        assert!(err.is_invalid_transition());

        // Valid edge, unmet precondition
        let err = store
            .transition(
                TransitionRequest::new(customer.id, QueueStatus::Cancelled, Role::Admin)
                    .require_from(&[QueueStatus::Serving]),
                &machine,
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let unchanged = store.find_customer(customer.id).await.unwrap().unwrap();
        assert_eq!(unchanged.queue_status, QueueStatus::Waiting);
    }

    #[tokio::test]
    async fn test_inactive_counter_cannot_claim() {
        let store = MemoryQueueStore::new();
        let machine = QueueStateMachine::default();
        let counter = store.create_counter("Counter 9").await.unwrap();
        store.set_counter_active(counter.id, false).await.unwrap();
        store.insert_customer(NewCustomer::new("a")).await.unwrap();

        let err = store
            .claim_next(counter.id, &Role::Cashier, &machine)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.count_with_status(QueueStatus::Waiting).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_event_insert_fault_is_one_shot() {
        let store = MemoryQueueStore::new();
        store.fail_next_event_inserts(1);
        let event = NewQueueEvent::new(1, QueueEventType::Joined, false);

        assert!(store.insert_queue_event(&event).await.is_err());
        assert!(store.insert_queue_event(&event).await.is_ok());
        assert_eq!(store.list_queue_events(Some(1)).await.unwrap().len(), 1);
    }
}
