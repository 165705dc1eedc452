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

//! Drive workers driven end to end through the manager.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tape_library::models::{QueueMessageType, QueueState, ReadWritePriority, StatusCode};
use tape_library::queue::{QueueFilter, QueueRepository};
use tape_library::{TapeDriveWorkerManager, TapeDriveWorkerManagerConfig, WorkerError};

use crate::fixtures::{
    eventually, library, read_order, write_order, RecordingTaskFactory, TestFixture, LIBRARY,
};

/// Config whose poll interval is long enough that only enqueue notifications
/// can explain a prompt pickup.
fn notified_only() -> TapeDriveWorkerManagerConfig {
    TapeDriveWorkerManagerConfig::builder()
        .poll_interval(Duration::from_secs(60))
        .thread_name_prefix("test-drive")
        .build()
}

fn short_poll() -> TapeDriveWorkerManagerConfig {
    TapeDriveWorkerManagerConfig::builder()
        .poll_interval(Duration::from_millis(50))
        .build()
}

async fn count(
    queue: &dyn QueueRepository,
    message_type: QueueMessageType,
    state: QueueState,
) -> i64 {
    queue.count(message_type, state).await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_enqueue_wakes_idle_workers() {
    let fixture = TestFixture::new().await;
    let queue = fixture.queue();
    let factory = RecordingTaskFactory::completing();
    let library = library(&[(0, ReadWritePriority::Write), (1, ReadWritePriority::Read)]);

    let manager = TapeDriveWorkerManager::new(
        queue.clone(),
        &library,
        HashMap::new(),
        factory.clone(),
        notified_only(),
    )
    .unwrap();
    assert_eq!(manager.workers().len(), 2);
    assert_eq!(
        manager.worker(1).unwrap().priority(),
        ReadWritePriority::Read
    );

    // Let both workers reach their idle wait
    tokio::time::sleep(Duration::from_millis(100)).await;

    manager.enqueue(write_order("objects", "a.tar")).await.unwrap();
    manager.enqueue(write_order("objects", "b.tar")).await.unwrap();
    manager.enqueue(read_order("TAPE01L6", 0)).await.unwrap();

    assert!(eventually(Duration::from_secs(5), || factory.created() == 3).await);
    manager.shutdown().await;

    assert_eq!(
        count(queue.as_ref(), QueueMessageType::WriteOrder, QueueState::Completed).await,
        2
    );
    assert_eq!(
        count(queue.as_ref(), QueueMessageType::ReadOrder, QueueState::Completed).await,
        1
    );
    for worker in manager.workers() {
        assert!(!worker.is_running());
        assert!(worker.has_died());
    }
    assert!(manager
        .workers()
        .iter()
        .filter_map(|worker| worker.read_write_result())
        .all(|result| result.status == StatusCode::Ok));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_write_drive_drains_read_only_queue() {
    let fixture = TestFixture::new().await;
    let queue = fixture.queue();
    let factory = RecordingTaskFactory::completing();

    const NUM_ORDERS: usize = 6;
    for i in 0..NUM_ORDERS {
        queue.add(read_order("TAPE01L6", i as i32)).await.unwrap();
    }

    let manager = TapeDriveWorkerManager::new(
        queue.clone(),
        &library(&[(0, ReadWritePriority::Write)]),
        HashMap::new(),
        factory.clone(),
        short_poll(),
    )
    .unwrap();

    assert!(eventually(Duration::from_secs(5), || factory.created() == NUM_ORDERS).await);
    manager.shutdown().await;

    assert_eq!(
        count(queue.as_ref(), QueueMessageType::ReadOrder, QueueState::Completed).await,
        NUM_ORDERS as i64
    );
    let positions: Vec<i32> = factory
        .orders
        .lock()
        .iter()
        .map(|(drive, order)| {
            assert_eq!(*drive, 0);
            match order {
                tape_library::Order::Read(read) => read.file_position,
                tape_library::Order::Write(_) => panic!("unexpected write order"),
            }
        })
        .collect();
    assert_eq!(positions, (0..NUM_ORDERS as i32).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bounded_and_unbounded_shutdown() {
    let fixture = TestFixture::new().await;
    let queue = fixture.queue();
    let factory = RecordingTaskFactory::slow(Duration::from_secs(5));

    let manager = TapeDriveWorkerManager::new(
        queue.clone(),
        &library(&[(0, ReadWritePriority::Write)]),
        HashMap::new(),
        factory.clone(),
        short_poll(),
    )
    .unwrap();
    manager.enqueue(write_order("objects", "slow.tar")).await.unwrap();
    assert!(eventually(Duration::from_secs(5), || factory.created() == 1).await);

    // The in-flight task is not interrupted, so the bounded stop gives up
    let started = Instant::now();
    assert!(!manager.shutdown_timeout(Duration::from_millis(50)).await);
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(manager.dead_workers().is_empty());

    // The unbounded stop waits for the task to finish
    manager.shutdown().await;
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert_eq!(manager.dead_workers(), vec![0]);
    assert_eq!(
        count(queue.as_ref(), QueueMessageType::WriteOrder, QueueState::Completed).await,
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_idle_worker_stops_promptly() {
    let fixture = TestFixture::new().await;
    let manager = TapeDriveWorkerManager::new(
        fixture.queue(),
        &library(&[(0, ReadWritePriority::Write), (1, ReadWritePriority::Read)]),
        HashMap::new(),
        RecordingTaskFactory::completing(),
        notified_only(),
    )
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    assert!(manager.shutdown_timeout(Duration::from_secs(2)).await);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(manager.dead_workers().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fatal_result_kills_worker() {
    let fixture = TestFixture::new().await;
    let queue = fixture.queue();
    let factory = RecordingTaskFactory::new(StatusCode::Fatal, QueueState::Ready, Duration::ZERO);

    let manager = TapeDriveWorkerManager::new(
        queue.clone(),
        &library(&[(0, ReadWritePriority::Write)]),
        HashMap::new(),
        factory.clone(),
        short_poll(),
    )
    .unwrap();
    let mut deaths = manager.worker_deaths();
    assert_eq!(deaths.len(), 1);

    manager.enqueue(write_order("objects", "a.tar")).await.unwrap();

    let (index, died) = &mut deaths[0];
    assert_eq!(*index, 0);
    tokio::time::timeout(Duration::from_secs(5), died.wait_for(|died| *died))
        .await
        .expect("worker should die")
        .unwrap();

    assert_eq!(manager.dead_workers(), vec![0]);
    assert!(!manager.worker(0).unwrap().is_stop_requested());
    // The order is given back for another drive
    assert_eq!(
        count(queue.as_ref(), QueueMessageType::WriteOrder, QueueState::Ready).await,
        1
    );
    assert_eq!(factory.created(), 1);

    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_enqueue_if_absent() {
    let fixture = TestFixture::new().await;
    let queue = fixture.queue();
    let manager = TapeDriveWorkerManager::new(
        queue.clone(),
        &library(&[(0, ReadWritePriority::Read)]),
        HashMap::new(),
        RecordingTaskFactory::slow(Duration::from_millis(200)),
        short_poll(),
    )
    .unwrap();

    let criteria = QueueFilter::new().reference("a.tar");
    assert!(manager
        .enqueue_if_absent(criteria.clone(), write_order("objects", "a.tar"))
        .await
        .unwrap());
    assert!(!manager
        .enqueue_if_absent(criteria, write_order("objects", "a.tar"))
        .await
        .unwrap());

    manager.shutdown().await;
    let queued = queue
        .list(QueueMessageType::WriteOrder, QueueFilter::new().reference("a.tar"))
        .await
        .unwrap();
    assert_eq!(queued.len(), 1);
}

#[test]
fn test_manager_requires_runtime() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let fixture = runtime.block_on(TestFixture::new());

    let result = TapeDriveWorkerManager::new(
        fixture.queue(),
        &library(&[(0, ReadWritePriority::Write)]),
        HashMap::new(),
        RecordingTaskFactory::completing(),
        TapeDriveWorkerManagerConfig::default(),
    );
    assert!(matches!(result, Err(WorkerError::NoRuntime)));

    // The pool's connections are torn down by its runtime
    runtime.block_on(async move { drop(fixture) });
    drop(runtime);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_mounted_tape_is_handed_to_its_worker() {
    let fixture = TestFixture::new().await;
    let mut mounted = tape_library::TapeCatalog::new("TAPE02L6", LIBRARY);
    mounted.current_location = Some(tape_library::models::TapeLocation::drive(1));

    let manager = TapeDriveWorkerManager::new(
        fixture.queue(),
        &library(&[(0, ReadWritePriority::Write), (1, ReadWritePriority::Read)]),
        HashMap::from([(1, mounted)]),
        RecordingTaskFactory::completing(),
        short_poll(),
    )
    .unwrap();

    assert!(manager.worker(0).unwrap().current_tape().is_none());
    assert_eq!(
        manager.worker(1).unwrap().current_tape().map(|tape| tape.code),
        Some("TAPE02L6".to_string())
    );
    manager.shutdown().await;
}
