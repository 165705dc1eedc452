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

//! Tape catalog persistence and reconciliation with the changer.

use uuid::Uuid;

use tape_library::models::{
    QueueMessageType, QueueState, StatusCode, TapeCatalogUpdate, TapeLocation, TapeState,
};
use tape_library::queue::{BucketFilter, QueueFilter, QueueRepository, QueueUpdate, ReceiveRequest};
use tape_library::robot::parse_status;
use tape_library::{TapeCatalogError, TapeCatalogService};

use crate::fixtures::{robot_pool, tape, FakeChanger, TestFixture, LIBRARY, STATUS};

#[tokio::test]
async fn test_create_rejects_duplicate_code() {
    let fixture = TestFixture::new().await;
    let catalog = fixture.catalog();

    let created = catalog.create(tape("TAPE01L6")).await.unwrap();
    let found = catalog.find_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(found.code, "TAPE01L6");
    assert_eq!(found.state, QueueState::Ready);

    let err = catalog.create(tape("TAPE01L6")).await.unwrap_err();
    assert!(matches!(err, TapeCatalogError::AlreadyExists(code) if code == "TAPE01L6"));
    assert_eq!(catalog.find(QueueFilter::new()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_update_merges_fields() {
    let fixture = TestFixture::new().await;
    let catalog = fixture.catalog();
    let created = catalog.create(tape("TAPE01L6")).await.unwrap();

    let updated = catalog
        .update(
            created.id,
            TapeCatalogUpdate {
                tape_state: Some(TapeState::Open),
                bucket: Some("objects".to_string()),
                file_count: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(updated);

    let stored = catalog.find_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(stored.tape_state, TapeState::Open);
    assert_eq!(stored.bucket.as_deref(), Some("objects"));
    assert_eq!(stored.file_count, 2);
    assert_eq!(stored.code, "TAPE01L6");

    // The projection columns follow the payload
    let by_bucket = catalog
        .find(QueueFilter::new().bucket(BucketFilter::Is("objects".to_string())))
        .await
        .unwrap();
    assert_eq!(by_bucket.len(), 1);

    assert!(!catalog
        .update(Uuid::new_v4(), TapeCatalogUpdate::default())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_replace_overwrites_entry() {
    let fixture = TestFixture::new().await;
    let catalog = fixture.catalog();
    let mut entry = catalog.create(tape("TAPE01L6")).await.unwrap();

    entry.current_location = Some(TapeLocation::drive(1));
    entry.previous_location = Some(TapeLocation::slot(4));
    entry.written_bytes = 4096;
    catalog.replace(entry.clone()).await.unwrap();

    let mounted = catalog
        .find(QueueFilter::new().mounted(true).drive_index(1))
        .await
        .unwrap();
    assert_eq!(mounted.len(), 1);
    assert_eq!(mounted[0].previous_location, Some(TapeLocation::slot(4)));
    assert_eq!(mounted[0].written_bytes, 4096);
}

#[tokio::test]
async fn test_reserve_assigns_bucket_to_empty_tape() {
    let fixture = TestFixture::new().await;
    let catalog = fixture.catalog();
    let created = catalog.create(tape("TAPE01L6")).await.unwrap();

    let reserved = catalog
        .receive(
            ReceiveRequest::new(QueueMessageType::TapeCatalog)
                .filter(
                    QueueFilter::new()
                        .library(LIBRARY)
                        .tape_state(TapeState::Empty)
                        .bucket(BucketFilter::IsOrUnassigned("objects".to_string())),
                )
                .update(QueueUpdate::new().bucket("objects"))
                .use_priority(false),
        )
        .await
        .unwrap()
        .expect("empty tape should be reserved");
    assert_eq!(reserved.id, created.id);

    let stored = catalog.find_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(stored.state, QueueState::Running);
    assert_eq!(stored.bucket.as_deref(), Some("objects"));
}

#[tokio::test]
async fn test_init_records_library_state() {
    let fixture = TestFixture::new().await;
    let catalog = fixture.catalog();
    let state = parse_status(STATUS).unwrap();

    let mounted = catalog.init(LIBRARY, &state).await.unwrap();
    assert_eq!(mounted.len(), 1);
    let in_drive = &mounted[&0];
    assert_eq!(in_drive.code, "TAPE02L6");
    assert_eq!(in_drive.state, QueueState::Running);
    assert_eq!(in_drive.current_location, Some(TapeLocation::drive(0)));
    assert_eq!(in_drive.previous_location, Some(TapeLocation::slot(2)));

    let all = catalog.find(QueueFilter::new().library(LIBRARY)).await.unwrap();
    let mut codes: Vec<_> = all.iter().map(|t| t.code.as_str()).collect();
    codes.sort();
    assert_eq!(codes, vec!["TAPE01L6", "TAPE02L6", "TAPE03L6", "TAPE04L6"]);

    let mailbox = all.iter().find(|t| t.code == "TAPE04L6").unwrap();
    assert_eq!(mailbox.current_location, Some(TapeLocation::import_export(4)));
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let fixture = TestFixture::new().await;
    let catalog = fixture.catalog();
    let state = parse_status(STATUS).unwrap();

    let first = catalog.init(LIBRARY, &state).await.unwrap();
    let before = catalog.find(QueueFilter::new()).await.unwrap();

    let second = catalog.init(LIBRARY, &state).await.unwrap();
    let after = catalog.find(QueueFilter::new()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_bootstrap_through_robot() {
    let fixture = TestFixture::new().await;
    let catalog = fixture.catalog();
    let changer = FakeChanger::new(0, STATUS);

    let mounted = catalog.bootstrap(&robot_pool(changer.clone())).await.unwrap();
    assert_eq!(mounted[&0].code, "TAPE02L6");
    assert_eq!(
        changer.calls.lock()[0],
        vec!["-f".to_string(), "/dev/sg1".to_string(), "status".to_string()]
    );
}

#[tokio::test]
async fn test_bootstrap_reports_robot_failure() {
    let fixture = TestFixture::new().await;
    let catalog = fixture.catalog();

    let err = catalog
        .bootstrap(&robot_pool(FakeChanger::new(1, "")))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TapeCatalogError::Robot {
            status: StatusCode::Ko,
            ..
        }
    ));
    assert!(catalog.find(QueueFilter::new()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_bootstrap_releases_only_unmounted_reservations() {
    let fixture = TestFixture::new().await;
    let catalog = fixture.catalog();
    catalog
        .init(LIBRARY, &parse_status(STATUS).unwrap())
        .await
        .unwrap();

    // A reservation left behind by a task that never loaded the cartridge
    let stale = catalog
        .receive(
            ReceiveRequest::new(QueueMessageType::TapeCatalog)
                .filter(QueueFilter::new().tape_code("TAPE03L6")),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(catalog.initialize_on_bootstrap().await.unwrap(), 1);
    assert_eq!(
        catalog.find_by_id(stale.id).await.unwrap().unwrap().state,
        QueueState::Ready
    );

    let mounted = catalog
        .find(QueueFilter::new().tape_code("TAPE02L6"))
        .await
        .unwrap();
    assert_eq!(mounted[0].state, QueueState::Running);
}
