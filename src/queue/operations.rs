//! # Queue Operations
//!
//! Status-changing entry points used by counters, administrators and the
//! customer collaborator. Each mutation is a single store transaction; the
//! analytics event and realtime notification for it are submitted to the
//! side-channel dispatcher only after that transaction has committed.
//!
//! `call_next` and `call_specific` report "nobody to call" as `Ok(None)`,
//! never as an error.

use crate::calendar::BusinessCalendar;
use crate::database::{AppliedTransition, CounterEffect, QueueStore, TransitionRequest};
use crate::error::{QueueError, QueueResult};
use crate::events::{
    QueueUpdate, QueueUpdateKind, RealtimeMessage, SideChannelDispatcher, StatusChanged,
};
use crate::logging::log_queue_operation;
use crate::models::{Counter, Customer, NewCustomer, NewQueueEvent, QueueEventType};
use crate::state_machine::{QueueStateMachine, QueueStatus, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub const DEFAULT_AVERAGE_SERVICE_MINUTES: i64 = 15;
const NO_REASON: &str = "No reason provided";

/// A customer in a queue listing with its 1-based rank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    #[serde(flatten)]
    pub customer: Customer,
    /// Rank among waiting customers; 0 for customers already at a counter
    pub position: i32,
    pub estimated_wait_minutes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueueStatistics {
    pub total_waiting: i64,
    pub average_wait_minutes: f64,
    pub longest_wait_minutes: f64,
    pub priority_customers: i64,
}

pub struct QueueOperations {
    store: Arc<dyn QueueStore>,
    machine: QueueStateMachine,
    dispatcher: SideChannelDispatcher,
    calendar: BusinessCalendar,
    average_service_minutes: i64,
}

impl std::fmt::Debug for QueueOperations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueOperations")
            .field("calendar", &self.calendar)
            .field("average_service_minutes", &self.average_service_minutes)
            .finish_non_exhaustive()
    }
}

impl QueueOperations {
    pub fn new(
        store: Arc<dyn QueueStore>,
        dispatcher: SideChannelDispatcher,
        calendar: BusinessCalendar,
    ) -> Self {
        Self {
            store,
            machine: QueueStateMachine::default(),
            dispatcher,
            calendar,
            average_service_minutes: DEFAULT_AVERAGE_SERVICE_MINUTES,
        }
    }

    pub fn with_state_machine(mut self, machine: QueueStateMachine) -> Self {
        self.machine = machine;
        self
    }

    pub fn with_average_service_minutes(mut self, minutes: i64) -> Self {
        self.average_service_minutes = minutes.max(0);
        self
    }

    pub fn state_machine(&self) -> &QueueStateMachine {
        &self.machine
    }

    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &SideChannelDispatcher {
        &self.dispatcher
    }

    /// Seed a WAITING customer on behalf of the customer collaborator
    #[instrument(skip(self, customer), fields(name = %customer.name))]
    pub async fn register_customer(&self, customer: NewCustomer) -> QueueResult<Customer> {
        let customer = self.store.insert_customer(customer).await?;
        let position = self.position_of(customer.id).await.unwrap_or_else(|e| {
            warn!(customer_id = customer.id, error = %e, "Could not rank new customer");
            None
        });

        log_queue_operation("register_customer", Some(customer.id), None, "joined", None);

        self.dispatcher.record(
            NewQueueEvent::new(customer.id, QueueEventType::Joined, customer.is_priority())
                .with_queue_position(position),
        );
        self.notify_update(QueueUpdateKind::CustomerJoined, &customer, None)
            .await;
        Ok(customer)
    }

    /// Call the highest-priority waiting customer to `counter_id`
    #[instrument(skip(self, role), fields(role = %role))]
    pub async fn call_next(&self, counter_id: i64, role: &Role) -> QueueResult<Option<Customer>> {
        let applied = match self.store.claim_next(counter_id, role, &self.machine).await {
            Ok(Some(applied)) => applied,
            Ok(None) => return Ok(None),
            Err(e) if e.is_not_found() => {
                warn!(counter_id, error = %e, "call_next found nothing to act on");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let customer = applied.customer.clone();
        let wait = Customer::minutes_since(customer.created_at, customer.updated_at);
        log_queue_operation("call_next", Some(customer.id), Some(counter_id), "serving", None);

        self.dispatcher.record(
            NewQueueEvent::new(customer.id, QueueEventType::Called, customer.is_priority())
                .at_counter(Some(counter_id))
                .with_queue_position(applied.queue_position)
                .with_wait_time(Some(wait)),
        );
        self.notify_update(QueueUpdateKind::CustomerCalled, &customer, Some(counter_id))
            .await;
        Ok(Some(customer))
    }

    /// Call one specific waiting customer; `None` when missing or not WAITING
    #[instrument(skip(self, role), fields(role = %role))]
    pub async fn call_specific(
        &self,
        customer_id: i64,
        counter_id: i64,
        role: &Role,
    ) -> QueueResult<Option<Customer>> {
        let request = TransitionRequest::new(customer_id, QueueStatus::Serving, role.clone())
            .require_from(&[QueueStatus::Waiting])
            .counter(CounterEffect::Bind(counter_id));

        let applied = match self.store.transition(request, &self.machine).await {
            Ok(applied) => applied,
            Err(e) if e.is_not_found() || e.is_invalid_transition() => {
                debug!(
                    customer_id,
                    counter_id,
                    error = %e,
                    "call_specific found nothing to act on"
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let customer = applied.customer.clone();
        let wait = Customer::minutes_since(customer.created_at, customer.updated_at);
        log_queue_operation("call_specific", Some(customer_id), Some(counter_id), "serving", None);

        self.dispatcher.record(
            NewQueueEvent::new(customer_id, QueueEventType::Called, customer.is_priority())
                .at_counter(Some(counter_id))
                .with_wait_time(Some(wait)),
        );
        self.notify_update(QueueUpdateKind::CustomerCalled, &customer, Some(counter_id))
            .await;
        Ok(Some(customer))
    }

    /// Finish service for a customer at a counter. Requires SERVING or PROCESSING.
    #[instrument(skip(self, role), fields(role = %role))]
    pub async fn complete_service(
        &self,
        customer_id: i64,
        counter_id: i64,
        role: &Role,
    ) -> QueueResult<Customer> {
        let request = TransitionRequest::new(customer_id, QueueStatus::Completed, role.clone())
            .require_from(&[QueueStatus::Serving, QueueStatus::Processing])
            .counter(CounterEffect::Release(counter_id))
            .stamp_served_at();

        let applied = self.store.transition(request, &self.machine).await?;
        log_queue_operation(
            "complete_service",
            Some(customer_id),
            applied.counter_id,
            "completed",
            None,
        );

        self.dispatcher.record(Self::event_for(&applied));
        self.notify_update(
            QueueUpdateKind::CustomerCompleted,
            &applied.customer,
            applied.counter_id,
        )
        .await;
        Ok(applied.customer)
    }

    /// Cancel a customer who has not finished, archiving them for today
    #[instrument(skip(self, role), fields(role = %role))]
    pub async fn cancel_service(
        &self,
        customer_id: i64,
        reason: Option<&str>,
        role: &Role,
    ) -> QueueResult<Customer> {
        let reason = Self::cancel_reason(reason);
        let applied = self.cancel_transition(customer_id, reason, role).await?;
        log_queue_operation(
            "cancel_service",
            Some(customer_id),
            applied.counter_id,
            "cancelled",
            None,
        );

        self.dispatcher.record(Self::event_for(&applied).with_reason(reason));
        self.notify_update(
            QueueUpdateKind::CustomerCancelled,
            &applied.customer,
            applied.counter_id,
        )
        .await;
        Ok(applied.customer)
    }

    /// Pin the listed waiting customers to positions 1..n in the given order
    #[instrument(skip(self, role, customer_ids), fields(role = %role, count = customer_ids.len()))]
    pub async fn reorder(&self, customer_ids: &[i64], role: &Role) -> QueueResult<Vec<QueueEntry>> {
        if !role.is_administrative() {
            return Err(QueueError::operation_forbidden(role, "reorder the queue"));
        }

        let updated = self.store.assign_manual_positions(customer_ids).await?;
        debug!(updated, "Manual positions assigned");

        let processing_count = self.processing_count().await;
        self.dispatcher.broadcast(RealtimeMessage::QueueUpdate(
            QueueUpdate::new(QueueUpdateKind::QueueReordered, None, processing_count)
                .with_order(customer_ids.to_vec()),
        ));

        self.list_queue(Some(QueueStatus::Waiting)).await
    }

    /// Generic gated transition. CANCELLED follows cancel semantics,
    /// COMPLETED stamps `served_at` and frees the counter.
    #[instrument(skip(self, role), fields(role = %role))]
    pub async fn change_status(
        &self,
        customer_id: i64,
        next: QueueStatus,
        role: &Role,
    ) -> QueueResult<Customer> {
        let applied = match next {
            QueueStatus::Cancelled => {
                self.cancel_transition(customer_id, NO_REASON, role).await?
            }
            QueueStatus::Completed => {
                let request = TransitionRequest::new(customer_id, next, role.clone())
                    .counter(CounterEffect::ReleaseAny)
                    .stamp_served_at();
                self.store.transition(request, &self.machine).await?
            }
            _ => {
                let request = TransitionRequest::new(customer_id, next, role.clone());
                self.store.transition(request, &self.machine).await?
            }
        };

        log_queue_operation(
            "change_status",
            Some(customer_id),
            applied.counter_id,
            next.as_str(),
            Some(applied.previous_status.as_str()),
        );

        let mut event = Self::event_for(&applied);
        if next == QueueStatus::Cancelled {
            event = event.with_reason(NO_REASON);
        }
        self.dispatcher.record(event);
        self.dispatcher.broadcast(RealtimeMessage::StatusChanged(StatusChanged {
            customer_id,
            previous_status: applied.previous_status,
            new_status: next,
            suppress_sound: next == QueueStatus::Processing,
            timestamp: Utc::now(),
        }));
        Ok(applied.customer)
    }

    /// Customers in priority order, optionally filtered to one status
    pub async fn list_queue(&self, status: Option<QueueStatus>) -> QueueResult<Vec<QueueEntry>> {
        let statuses: Vec<QueueStatus> = status.into_iter().collect();
        let customers = self.store.list_customers(&statuses).await?;

        Ok(customers
            .into_iter()
            .enumerate()
            .map(|(index, customer)| {
                let position = index as i32 + 1;
                QueueEntry {
                    customer,
                    position,
                    estimated_wait_minutes: self.estimate_wait(position),
                }
            })
            .collect())
    }

    /// Public display: customers at a counter first, then the waiting line.
    /// PROCESSING customers are back-office and not shown.
    pub async fn display_queue(&self) -> QueueResult<Vec<QueueEntry>> {
        let mut serving = self.store.list_customers(&[QueueStatus::Serving]).await?;
        serving.sort_by_key(|c| (c.updated_at, c.id));
        let waiting = self.store.list_customers(&[QueueStatus::Waiting]).await?;

        let mut display: Vec<QueueEntry> = serving
            .into_iter()
            .map(|customer| QueueEntry {
                customer,
                position: 0,
                estimated_wait_minutes: 0,
            })
            .collect();
        display.extend(waiting.into_iter().enumerate().map(|(index, customer)| {
            let position = index as i32 + 1;
            QueueEntry {
                customer,
                position,
                estimated_wait_minutes: self.estimate_wait(position),
            }
        }));
        Ok(display)
    }

    /// 1-based rank among waiting customers; `None` if not waiting
    pub async fn position_of(&self, customer_id: i64) -> QueueResult<Option<i32>> {
        let waiting = self.store.list_customers(&[QueueStatus::Waiting]).await?;
        Ok(waiting
            .iter()
            .position(|c| c.id == customer_id)
            .map(|index| index as i32 + 1))
    }

    pub async fn estimated_wait_minutes(&self, customer_id: i64) -> QueueResult<i64> {
        Ok(self
            .position_of(customer_id)
            .await?
            .map_or(0, |position| self.estimate_wait(position)))
    }

    pub async fn statistics(&self) -> QueueResult<QueueStatistics> {
        self.statistics_at(Utc::now()).await
    }

    pub async fn statistics_at(&self, now: DateTime<Utc>) -> QueueResult<QueueStatistics> {
        let waiting = self.store.list_customers(&[QueueStatus::Waiting]).await?;
        let waits: Vec<f64> = waiting
            .iter()
            .map(|c| ((now - c.created_at).num_seconds().max(0) as f64) / 60.0)
            .collect();

        let average_wait_minutes = if waits.is_empty() {
            0.0
        } else {
            waits.iter().sum::<f64>() / waits.len() as f64
        };

        Ok(QueueStatistics {
            total_waiting: waiting.len() as i64,
            average_wait_minutes,
            longest_wait_minutes: waits.iter().copied().fold(0.0, f64::max),
            priority_customers: waiting.iter().filter(|c| c.is_priority()).count() as i64,
        })
    }

    pub async fn list_counters(&self) -> QueueResult<Vec<Counter>> {
        self.store.list_counters().await
    }

    pub async fn create_counter(&self, name: &str, role: &Role) -> QueueResult<Counter> {
        if !role.is_administrative() {
            return Err(QueueError::operation_forbidden(role, "create counters"));
        }
        self.store.create_counter(name).await
    }

    pub async fn set_counter_active(
        &self,
        counter_id: i64,
        is_active: bool,
        role: &Role,
    ) -> QueueResult<Counter> {
        if !role.is_administrative() {
            return Err(QueueError::operation_forbidden(role, "change counters"));
        }
        self.store.set_counter_active(counter_id, is_active).await
    }

    fn cancel_reason(reason: Option<&str>) -> &str {
        reason.map(str::trim).filter(|r| !r.is_empty()).unwrap_or(NO_REASON)
    }

    async fn cancel_transition(
        &self,
        customer_id: i64,
        reason: &str,
        role: &Role,
    ) -> QueueResult<AppliedTransition> {
        let request = TransitionRequest::new(customer_id, QueueStatus::Cancelled, role.clone())
            .require_from(&QueueStatus::ACTIVE)
            .counter(CounterEffect::ReleaseAny)
            .remark(format!("Cancelled: {reason}"))
            .stamp_served_at()
            .archive_on(self.calendar.today().date);

        self.store.transition(request, &self.machine).await
    }

    /// Analytics event describing a committed transition
    fn event_for(applied: &AppliedTransition) -> NewQueueEvent {
        let customer = &applied.customer;
        let is_priority = customer.is_priority();
        let since_last_change =
            Customer::minutes_since(applied.previous_updated_at, customer.updated_at);

        match customer.queue_status {
            QueueStatus::Serving => {
                let waited = Customer::minutes_since(customer.created_at, customer.updated_at);
                NewQueueEvent::new(customer.id, QueueEventType::Called, is_priority)
                    .at_counter(applied.counter_id)
                    .with_queue_position(applied.queue_position)
                    .with_wait_time(Some(waited))
            }
            QueueStatus::Processing => {
                NewQueueEvent::new(customer.id, QueueEventType::ProcessingStarted, is_priority)
                    .at_counter(applied.counter_id)
                    .with_service_time(Some(since_last_change))
            }
            QueueStatus::Completed => {
                let processing = (applied.previous_status == QueueStatus::Processing)
                    .then_some(since_last_change);
                NewQueueEvent::new(customer.id, QueueEventType::Served, is_priority)
                    .at_counter(applied.counter_id)
                    .with_service_time(Some(since_last_change))
                    .with_processing_duration(processing)
            }
            QueueStatus::Cancelled => {
                let waited = (applied.previous_status == QueueStatus::Waiting).then(|| {
                    Customer::minutes_since(customer.created_at, customer.updated_at)
                });
                NewQueueEvent::new(customer.id, QueueEventType::Cancelled, is_priority)
                    .at_counter(applied.counter_id)
                    .with_wait_time(waited)
            }
            QueueStatus::Waiting => {
                NewQueueEvent::new(customer.id, QueueEventType::Joined, is_priority)
            }
        }
    }

    fn estimate_wait(&self, position: i32) -> i64 {
        i64::from(position.max(1) - 1) * self.average_service_minutes
    }

    async fn processing_count(&self) -> i64 {
        match self.store.count_with_status(QueueStatus::Processing).await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Could not count processing customers for notification");
                0
            }
        }
    }

    async fn notify_update(
        &self,
        kind: QueueUpdateKind,
        customer: &Customer,
        counter_id: Option<i64>,
    ) {
        let processing_count = self.processing_count().await;
        let update = QueueUpdate::new(kind, Some(customer.snapshot()), processing_count)
            .at_counter(counter_id);
        self.dispatcher.broadcast(RealtimeMessage::QueueUpdate(update));
    }
}
