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

//! Atomic receive.
//!
//! The candidate lookup and the `READY → RUNNING` flip run inside one
//! IMMEDIATE transaction, which takes SQLite's write lock up front: no other
//! connection or process can read-then-claim the same row in between. The
//! update is additionally conditioned on `state = 'READY'`, so a lost race
//! shows up as zero rows modified rather than a double claim.

use diesel::prelude::*;

use super::{filtered, QueueMessageDAL};
use crate::dal::models::{NewQueueMessageRow, QueueMessageRow};
use crate::database::schema::queue_messages;
use crate::error::QueueError;
use crate::models::{now_millis, QueueMessage, QueuePayload, QueueState};
use crate::queue::ReceiveRequest;

impl<'a> QueueMessageDAL<'a> {
    /// Receives the first `READY` message matching `request` and marks it `RUNNING`.
    ///
    /// Candidates are ordered by `(priority, created, seq)` when the request
    /// uses priority, else by `(created, seq)`. The extra update of the
    /// request is applied to the received message in the same write.
    ///
    /// Returns `None` when nothing matches.
    pub async fn receive(
        &self,
        request: ReceiveRequest,
    ) -> Result<Option<QueueMessage>, QueueError> {
        let conn = self.connection().await?;

        let received = conn
            .interact(move |conn| {
                conn.immediate_transaction::<_, QueueError, _>(|conn| {
                    let query = filtered(request.message_type, &request.filter)
                        .filter(queue_messages::state.eq(QueueState::Ready.as_str()));
                    let query = if request.use_priority {
                        query.order((
                            queue_messages::priority.asc(),
                            queue_messages::created.asc(),
                            queue_messages::seq.asc(),
                        ))
                    } else {
                        query.order((queue_messages::created.asc(), queue_messages::seq.asc()))
                    };

                    let candidate: Option<QueueMessageRow> = query.first(conn).optional()?;
                    let Some(row) = candidate else {
                        return Ok(None);
                    };

                    let seq = row.seq;
                    let mut message = row.into_message()?;
                    message.state = QueueState::Running;
                    message.last_update = now_millis();
                    request.update.apply(&mut message);
                    if let QueuePayload::TapeCatalog(tape) = &mut message.payload {
                        tape.state = message.state;
                        tape.last_update = message.last_update;
                    }

                    let changes = NewQueueMessageRow::from_message(&message)?;
                    let updated = diesel::update(
                        queue_messages::table
                            .filter(queue_messages::seq.eq(seq))
                            .filter(queue_messages::state.eq(QueueState::Ready.as_str())),
                    )
                    .set(&changes)
                    .execute(conn)?;

                    Ok((updated == 1).then_some(message))
                })
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(received)
    }
}
