/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Queue Message Data Access Layer
//!
//! Key features:
//! - Insert and conditional insert (check and insert in one transaction)
//! - Single-row state transitions returning the number of rows modified
//! - Atomic receive (see [`receiving`])
//! - Bootstrap recovery of orphaned `RUNNING` rows
//! - Read-modify-write of a single message for partial catalog updates

use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use uuid::Uuid;

use super::models::{NewQueueMessageRow, QueueMessageRow};
use super::DAL;
use crate::database::schema::queue_messages;
use crate::error::QueueError;
use crate::models::{now_millis, QueueMessage, QueueMessageType, QueueState};
use crate::queue::{BucketFilter, QueueFilter};

mod receiving;

/// Data access layer for queue messages.
#[derive(Clone)]
pub struct QueueMessageDAL<'a> {
    dal: &'a DAL,
}

fn order_types() -> Vec<String> {
    QueueMessageType::orders()
        .iter()
        .map(|t| t.as_str().to_string())
        .collect()
}

/// Boxed select over messages of one type matching `filter`.
pub(crate) fn filtered<'a>(
    message_type: QueueMessageType,
    filter: &QueueFilter,
) -> queue_messages::BoxedQuery<'a, Sqlite> {
    let mut query = queue_messages::table
        .filter(queue_messages::message_type.eq(message_type.as_str()))
        .into_boxed();

    if let Some(tape_code) = &filter.tape_code {
        query = query.filter(queue_messages::tape_code.eq(tape_code.clone()));
    }
    match &filter.bucket {
        Some(BucketFilter::Is(bucket)) => {
            query = query.filter(queue_messages::bucket.eq(bucket.clone()));
        }
        Some(BucketFilter::IsOrUnassigned(bucket)) => {
            query = query.filter(
                queue_messages::bucket
                    .eq(bucket.clone())
                    .or(queue_messages::bucket.is_null()),
            );
        }
        Some(BucketFilter::Unassigned) => {
            query = query.filter(queue_messages::bucket.is_null());
        }
        None => {}
    }
    if let Some(library) = &filter.library {
        query = query.filter(queue_messages::library.eq(library.clone()));
    }
    if !filter.tape_states.is_empty() {
        let tape_states: Vec<String> = filter
            .tape_states
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        query = query.filter(queue_messages::tape_state.eq_any(tape_states));
    }
    match filter.mounted {
        Some(true) => query = query.filter(queue_messages::drive_index.is_not_null()),
        Some(false) => query = query.filter(queue_messages::drive_index.is_null()),
        None => {}
    }
    if let Some(drive_index) = filter.drive_index {
        query = query.filter(queue_messages::drive_index.eq(drive_index as i32));
    }
    if let Some(reference) = &filter.reference {
        query = query.filter(queue_messages::reference.eq(reference.clone()));
    }
    if !filter.states.is_empty() {
        let states: Vec<String> = filter
            .states
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        query = query.filter(queue_messages::state.eq_any(states));
    }
    // NOT IN on a NULL column is NULL, so unset projections are let through explicitly
    if !filter.excluded_tape_codes.is_empty() {
        query = query.filter(
            queue_messages::tape_code
                .ne_all(filter.excluded_tape_codes.clone())
                .or(queue_messages::tape_code.is_null()),
        );
    }
    if !filter.excluded_buckets.is_empty() {
        query = query.filter(
            queue_messages::bucket
                .ne_all(filter.excluded_buckets.clone())
                .or(queue_messages::bucket.is_null()),
        );
    }

    query
}

impl<'a> QueueMessageDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    async fn connection(
        &self,
    ) -> Result<deadpool::managed::Object<deadpool_diesel::sqlite::Manager>, QueueError> {
        self.dal
            .database
            .get_connection()
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))
    }

    /// Inserts a message as given (state included).
    pub async fn insert(&self, message: &QueueMessage) -> Result<(), QueueError> {
        let row = NewQueueMessageRow::from_message(message)?;
        let conn = self.connection().await?;

        conn.interact(move |conn| {
            diesel::insert_into(queue_messages::table)
                .values(&row)
                .execute(conn)
        })
        .await
        .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    /// Inserts `message` unless a message of the same type matches `filter`.
    ///
    /// The existence check and the insert share one IMMEDIATE transaction,
    /// so two concurrent callers cannot both insert.
    ///
    /// Returns `true` if the message was inserted.
    pub async fn insert_if_absent(
        &self,
        filter: QueueFilter,
        message: &QueueMessage,
    ) -> Result<bool, QueueError> {
        let message_type = message.message_type();
        let row = NewQueueMessageRow::from_message(message)?;
        let conn = self.connection().await?;

        let inserted = conn
            .interact(move |conn| {
                conn.immediate_transaction::<_, QueueError, _>(|conn| {
                    let existing: i64 = filtered(message_type, &filter).count().get_result(conn)?;
                    if existing > 0 {
                        return Ok(false);
                    }
                    diesel::insert_into(queue_messages::table)
                        .values(&row)
                        .execute(conn)?;
                    Ok(true)
                })
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(inserted)
    }

    /// Deletes a message. Returns the number of rows deleted.
    pub async fn delete(&self, id: Uuid) -> Result<usize, QueueError> {
        let id = id.to_string();
        let conn = self.connection().await?;

        let deleted = conn
            .interact(move |conn| {
                diesel::delete(queue_messages::table.filter(queue_messages::id.eq(id)))
                    .execute(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(deleted)
    }

    /// Sets `state` and `last_update`. Returns the number of rows modified.
    pub async fn update_state(&self, id: Uuid, state: QueueState) -> Result<usize, QueueError> {
        let id = id.to_string();
        let conn = self.connection().await?;

        let updated = conn
            .interact(move |conn| {
                diesel::update(queue_messages::table.filter(queue_messages::id.eq(id)))
                    .set((
                        queue_messages::state.eq(state.as_str()),
                        queue_messages::last_update.eq(now_millis()),
                    ))
                    .execute(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(updated)
    }

    /// Moves `RUNNING` messages of the given types back to `READY`.
    ///
    /// With `unmounted_only`, rows that still reference a drive are left alone.
    pub async fn reset_running(
        &self,
        message_types: Vec<QueueMessageType>,
        unmounted_only: bool,
    ) -> Result<usize, QueueError> {
        let types: Vec<String> = message_types
            .iter()
            .map(|t| t.as_str().to_string())
            .collect();
        let conn = self.connection().await?;

        let reset = conn
            .interact(move |conn| {
                let target = queue_messages::table
                    .filter(queue_messages::message_type.eq_any(types))
                    .filter(queue_messages::state.eq(QueueState::Running.as_str()));
                let changes = (
                    queue_messages::state.eq(QueueState::Ready.as_str()),
                    queue_messages::last_update.eq(now_millis()),
                );
                if unmounted_only {
                    diesel::update(target.filter(queue_messages::drive_index.is_null()))
                        .set(changes)
                        .execute(conn)
                } else {
                    diesel::update(target).set(changes).execute(conn)
                }
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(reset)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<QueueMessage>, QueueError> {
        let id = id.to_string();
        let conn = self.connection().await?;

        let row: Option<QueueMessageRow> = conn
            .interact(move |conn| {
                queue_messages::table
                    .filter(queue_messages::id.eq(id))
                    .first(conn)
                    .optional()
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        row.map(QueueMessageRow::into_message).transpose()
    }

    /// Lists messages of one type matching `filter`, oldest first.
    pub async fn list(
        &self,
        message_type: QueueMessageType,
        filter: QueueFilter,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let conn = self.connection().await?;

        let rows: Vec<QueueMessageRow> = conn
            .interact(move |conn| {
                filtered(message_type, &filter)
                    .order((queue_messages::created.asc(), queue_messages::seq.asc()))
                    .load(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        rows.into_iter().map(QueueMessageRow::into_message).collect()
    }

    /// Counts messages of one type in one state.
    pub async fn count(
        &self,
        message_type: QueueMessageType,
        state: QueueState,
    ) -> Result<i64, QueueError> {
        let conn = self.connection().await?;

        let count = conn
            .interact(move |conn| {
                queue_messages::table
                    .filter(queue_messages::message_type.eq(message_type.as_str()))
                    .filter(queue_messages::state.eq(state.as_str()))
                    .count()
                    .get_result::<i64>(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(count)
    }

    /// Counts completed orders whose last transition is older than `cutoff`
    /// (epoch millis).
    pub async fn count_completed_before(&self, cutoff: i64) -> Result<i64, QueueError> {
        let types = order_types();
        let conn = self.connection().await?;

        let count = conn
            .interact(move |conn| {
                queue_messages::table
                    .filter(queue_messages::message_type.eq_any(types))
                    .filter(queue_messages::state.eq(QueueState::Completed.as_str()))
                    .filter(queue_messages::last_update.lt(cutoff))
                    .count()
                    .get_result::<i64>(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(count)
    }

    /// Deletes completed orders whose last transition is older than `cutoff`.
    ///
    /// Returns the number of rows deleted.
    pub async fn delete_completed_before(&self, cutoff: i64) -> Result<usize, QueueError> {
        let types = order_types();
        let conn = self.connection().await?;

        let deleted = conn
            .interact(move |conn| {
                diesel::delete(
                    queue_messages::table
                        .filter(queue_messages::message_type.eq_any(types))
                        .filter(queue_messages::state.eq(QueueState::Completed.as_str()))
                        .filter(queue_messages::last_update.lt(cutoff)),
                )
                .execute(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(deleted)
    }

    /// Overwrites every column of the message with the same id.
    ///
    /// Returns the number of rows modified.
    pub async fn replace(&self, message: &QueueMessage) -> Result<usize, QueueError> {
        let row = NewQueueMessageRow::from_message(message)?;
        let conn = self.connection().await?;

        let updated = conn
            .interact(move |conn| {
                diesel::update(queue_messages::table.filter(queue_messages::id.eq(row.id.clone())))
                    .set(&row)
                    .execute(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(updated)
    }

    /// Loads a message, lets `modify` change it, and writes it back, all in
    /// one IMMEDIATE transaction. `last_update` is refreshed.
    ///
    /// Returns the stored message, or `None` if the id is unknown.
    pub async fn modify<F>(&self, id: Uuid, modify: F) -> Result<Option<QueueMessage>, QueueError>
    where
        F: FnOnce(&mut QueueMessage) -> Result<(), QueueError> + Send + 'static,
    {
        let id = id.to_string();
        let conn = self.connection().await?;

        let modified = conn
            .interact(move |conn| {
                conn.immediate_transaction::<_, QueueError, _>(|conn| {
                    let row: Option<QueueMessageRow> = queue_messages::table
                        .filter(queue_messages::id.eq(id.as_str()))
                        .first(conn)
                        .optional()?;
                    let Some(row) = row else {
                        return Ok(None);
                    };

                    let mut message = row.into_message()?;
                    modify(&mut message)?;
                    message.last_update = now_millis();

                    let changes = NewQueueMessageRow::from_message(&message)?;
                    diesel::update(queue_messages::table.filter(queue_messages::id.eq(id.as_str())))
                        .set(&changes)
                        .execute(conn)?;
                    Ok(Some(message))
                })
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(modified)
    }
}
