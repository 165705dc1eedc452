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

//! Queue repository behavior against a real SQLite file.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Barrier;
use uuid::Uuid;

use tape_library::models::{QueueMessageType, QueueState};
use tape_library::queue::{QueueFilter, QueueRepository, QueueRepositoryExt, ReceiveRequest};

use crate::fixtures::{read_order, write_order, TestFixture};

/// Concurrent receivers never get the same message, and together drain the queue.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_receive_no_duplicates() {
    let fixture = TestFixture::new().await;
    let queue = fixture.queue();

    const NUM_ORDERS: usize = 20;
    const NUM_RECEIVERS: usize = 8;

    let mut created = HashSet::new();
    for i in 0..NUM_ORDERS {
        let message = write_order("objects", &format!("archive-{}.tar", i));
        created.insert(message.id);
        queue.add(message).await.expect("Failed to add order");
    }

    let barrier = Arc::new(Barrier::new(NUM_RECEIVERS));
    let mut handles = Vec::new();
    for _ in 0..NUM_RECEIVERS {
        let queue = queue.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let mut received = Vec::new();
            while let Some(message) = queue
                .receive(ReceiveRequest::new(QueueMessageType::WriteOrder))
                .await
                .expect("Failed to receive")
            {
                assert_eq!(message.state, QueueState::Running);
                received.push(message.id);
            }
            received
        }));
    }

    let mut all_received = Vec::new();
    for handle in handles {
        all_received.extend(handle.await.expect("receiver panicked"));
    }

    let unique: HashSet<_> = all_received.iter().copied().collect();
    assert_eq!(
        unique.len(),
        all_received.len(),
        "a message was received more than once"
    );
    assert_eq!(unique, created);
    assert_eq!(
        queue
            .count(QueueMessageType::WriteOrder, QueueState::Running)
            .await
            .unwrap(),
        NUM_ORDERS as i64
    );
}

#[tokio::test]
async fn test_priority_ordering() {
    let fixture = TestFixture::new().await;
    let queue = fixture.queue();

    for priority in [3, 1, 2] {
        queue
            .add(write_order("objects", &format!("p{}.tar", priority)).with_priority(priority))
            .await
            .unwrap();
    }

    let mut by_priority = Vec::new();
    while let Some(message) = queue
        .receive(ReceiveRequest::new(QueueMessageType::WriteOrder).use_priority(true))
        .await
        .unwrap()
    {
        by_priority.push(message.priority);
    }
    assert_eq!(by_priority, vec![1, 2, 3]);

    let fixture = TestFixture::new().await;
    let queue = fixture.queue();
    for priority in [3, 1, 2] {
        queue
            .add(write_order("objects", &format!("p{}.tar", priority)).with_priority(priority))
            .await
            .unwrap();
    }

    let mut by_insertion = Vec::new();
    while let Some(message) = queue
        .receive(ReceiveRequest::new(QueueMessageType::WriteOrder).use_priority(false))
        .await
        .unwrap()
    {
        by_insertion.push(message.priority);
    }
    assert_eq!(by_insertion, vec![3, 1, 2]);
}

#[tokio::test]
async fn test_unknown_id_modifies_nothing() {
    let fixture = TestFixture::new().await;
    let queue = fixture.queue();
    queue.add(read_order("TAPE01L6", 0)).await.unwrap();

    let unknown = Uuid::new_v4();
    assert_eq!(queue.remove(unknown).await.unwrap(), 0);
    assert_eq!(queue.complete(unknown).await.unwrap(), 0);
    assert_eq!(queue.mark_error(unknown).await.unwrap(), 0);
    assert_eq!(queue.mark_ready(unknown).await.unwrap(), 0);
    assert_eq!(
        queue
            .count(QueueMessageType::ReadOrder, QueueState::Ready)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_state_transitions() {
    let fixture = TestFixture::new().await;
    let queue = fixture.queue();
    let message = read_order("TAPE01L6", 0);
    let id = message.id;
    queue.add(message).await.unwrap();

    let received = queue
        .receive(ReceiveRequest::new(QueueMessageType::ReadOrder))
        .await
        .unwrap()
        .expect("order should be received");
    assert_eq!(received.id, id);
    // A RUNNING message is invisible to other receivers
    assert!(queue
        .receive(ReceiveRequest::new(QueueMessageType::ReadOrder))
        .await
        .unwrap()
        .is_none());

    assert_eq!(queue.mark_error(id).await.unwrap(), 1);
    assert_eq!(
        queue.find_message(id).await.unwrap().unwrap().state,
        QueueState::Error
    );

    assert_eq!(queue.mark_ready(id).await.unwrap(), 1);
    assert!(queue
        .receive(ReceiveRequest::new(QueueMessageType::ReadOrder))
        .await
        .unwrap()
        .is_some());
    assert_eq!(queue.complete(id).await.unwrap(), 1);

    let stored = queue.find_message(id).await.unwrap().unwrap();
    assert_eq!(stored.state, QueueState::Completed);
    assert!(stored.last_update >= stored.created);

    assert_eq!(queue.remove(id).await.unwrap(), 1);
    assert!(queue.find_message(id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_receive_is_scoped_to_message_type_and_filter() {
    let fixture = TestFixture::new().await;
    let queue = fixture.queue();
    queue.add(write_order("objects", "w.tar")).await.unwrap();
    queue.add(read_order("TAPE01L6", 0)).await.unwrap();
    queue.add(read_order("TAPE02L6", 0)).await.unwrap();

    let received = queue
        .receive(
            ReceiveRequest::new(QueueMessageType::ReadOrder)
                .filter(QueueFilter::new().tape_code("TAPE02L6")),
        )
        .await
        .unwrap()
        .expect("read order for TAPE02L6");
    let order = received.payload.into_order().unwrap();
    assert_eq!(order.archive_id(), "TAPE02L6-0.tar");

    assert!(queue
        .receive(
            ReceiveRequest::new(QueueMessageType::ReadOrder)
                .filter(QueueFilter::new().tape_code("TAPE09L6")),
        )
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        queue
            .count(QueueMessageType::WriteOrder, QueueState::Ready)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_add_if_absent() {
    let fixture = TestFixture::new().await;
    let queue = fixture.queue();
    let pending = QueueFilter::new()
        .tape_code("TAPE01L6")
        .state(QueueState::Ready);

    assert!(queue
        .add_if_absent(pending.clone(), read_order("TAPE01L6", 0))
        .await
        .unwrap());
    assert!(!queue
        .add_if_absent(pending.clone(), read_order("TAPE01L6", 1))
        .await
        .unwrap());
    assert!(queue
        .add_if_absent(
            QueueFilter::new().tape_code("TAPE02L6"),
            read_order("TAPE02L6", 0)
        )
        .await
        .unwrap());

    // Once the pending order is taken, the criteria no longer match
    queue
        .receive(
            ReceiveRequest::new(QueueMessageType::ReadOrder)
                .filter(QueueFilter::new().tape_code("TAPE01L6")),
        )
        .await
        .unwrap()
        .expect("pending order");
    assert!(queue
        .add_if_absent(pending, read_order("TAPE01L6", 1))
        .await
        .unwrap());

    assert_eq!(
        queue
            .list(QueueMessageType::ReadOrder, QueueFilter::new())
            .await
            .unwrap()
            .len(),
        3
    );
}

#[tokio::test]
async fn test_bootstrap_requeues_orphaned_orders() {
    let fixture = TestFixture::new().await;
    let queue = fixture.queue();
    queue.add(read_order("TAPE01L6", 0)).await.unwrap();
    queue.add(write_order("objects", "w.tar")).await.unwrap();
    queue.add(write_order("objects", "done.tar")).await.unwrap();

    queue
        .receive(ReceiveRequest::new(QueueMessageType::ReadOrder))
        .await
        .unwrap()
        .unwrap();
    let running = queue
        .receive(ReceiveRequest::new(QueueMessageType::WriteOrder))
        .await
        .unwrap()
        .unwrap();
    let done = queue
        .receive(ReceiveRequest::new(QueueMessageType::WriteOrder))
        .await
        .unwrap()
        .unwrap();
    queue.complete(done.id).await.unwrap();

    assert_eq!(queue.initialize_on_bootstrap().await.unwrap(), 2);
    assert_eq!(
        queue.find_message(running.id).await.unwrap().unwrap().state,
        QueueState::Ready
    );
    assert_eq!(
        queue.find_message(done.id).await.unwrap().unwrap().state,
        QueueState::Completed
    );
    assert_eq!(queue.initialize_on_bootstrap().await.unwrap(), 0);
}

/// The shorthand receives behave like the requests they stand for.
#[tokio::test]
async fn test_receive_shorthands() {
    let fixture = TestFixture::new().await;
    let queue = fixture.queue();
    queue
        .add(write_order("objects", "late.tar").with_priority(2))
        .await
        .unwrap();
    queue
        .add(write_order("objects", "urgent.tar").with_priority(1))
        .await
        .unwrap();
    queue.add(write_order("logbook", "lb.tar")).await.unwrap();
    queue.add(read_order("TAPE01L6", 0)).await.unwrap();
    queue.add(read_order("TAPE02L6", 0)).await.unwrap();

    let by_insertion = queue
        .receive_with_priority(QueueMessageType::WriteOrder, false)
        .await
        .unwrap()
        .expect("oldest write order");
    assert_eq!(by_insertion.payload.into_order().unwrap().archive_id(), "late.tar");

    let filtered = queue
        .receive_filtered(
            QueueFilter::new().exclude_buckets(["objects"]),
            QueueMessageType::WriteOrder,
        )
        .await
        .unwrap()
        .expect("write order outside the excluded bucket");
    assert_eq!(filtered.payload.into_order().unwrap().archive_id(), "lb.tar");
    assert!(queue
        .receive_filtered(
            QueueFilter::new().exclude_buckets(["objects", "logbook"]),
            QueueMessageType::WriteOrder,
        )
        .await
        .unwrap()
        .is_none());

    let remaining = queue
        .receive_type(QueueMessageType::WriteOrder)
        .await
        .unwrap()
        .expect("last write order");
    assert_eq!(remaining.payload.into_order().unwrap().archive_id(), "urgent.tar");
    assert!(queue
        .receive_type(QueueMessageType::WriteOrder)
        .await
        .unwrap()
        .is_none());

    let read = queue
        .receive_filtered(
            QueueFilter::new().exclude_tape_codes(["TAPE01L6"]),
            QueueMessageType::ReadOrder,
        )
        .await
        .unwrap()
        .expect("read order for the other cartridge");
    assert_eq!(read.payload.into_order().unwrap().archive_id(), "TAPE02L6-0.tar");
    assert_eq!(
        queue
            .count(QueueMessageType::ReadOrder, QueueState::Ready)
            .await
            .unwrap(),
        1
    );
}
