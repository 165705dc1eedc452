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

//! Startup reconciliation of the catalog with the robot's view.
//!
//! Records are only written when the reported location differs from the
//! stored one, so running it again on an unchanged library is a no-op.

use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::{PersistentTapeCatalogService, TapeCatalogService};
use crate::error::TapeCatalogError;
use crate::models::{
    now_millis, QueueMessage, QueueState, SlotType, TapeCartridge, TapeCatalog, TapeLibraryState,
    TapeLocation,
};

impl PersistentTapeCatalogService {
    pub(super) async fn reconcile(
        &self,
        library_identifier: &str,
        library_state: &TapeLibraryState,
    ) -> Result<HashMap<u32, TapeCatalog>, TapeCatalogError> {
        let mut mounted = HashMap::new();

        for drive in library_state.loaded_drives() {
            let Some(cartridge) = &drive.tape else { continue };
            let previous = cartridge.slot_index.map(TapeLocation::slot);

            if let Some(tape) = self
                .locate(
                    library_identifier,
                    cartridge,
                    TapeLocation::drive(drive.index),
                    previous,
                    QueueState::Running,
                )
                .await?
            {
                mounted.insert(drive.index, tape);
            }
        }

        for slot in &library_state.slots {
            let Some(cartridge) = &slot.tape else { continue };
            let location = match slot.slot_type {
                SlotType::Slot => TapeLocation::slot(slot.index),
                SlotType::ImportExport => TapeLocation::import_export(slot.index),
            };

            self.locate(
                library_identifier,
                cartridge,
                location,
                None,
                QueueState::Ready,
            )
            .await?;
        }

        info!(
            library = library_identifier,
            mounted = mounted.len(),
            "Tape catalog reconciled with library state"
        );
        Ok(mounted)
    }

    /// Records that `cartridge` sits at `location`, creating it if unknown.
    ///
    /// Returns `None` for cartridges without a readable volume tag.
    async fn locate(
        &self,
        library_identifier: &str,
        cartridge: &TapeCartridge,
        location: TapeLocation,
        previous_location: Option<TapeLocation>,
        state: QueueState,
    ) -> Result<Option<TapeCatalog>, TapeCatalogError> {
        let Some(code) = cartridge.volume_tag.as_deref() else {
            warn!(
                library = library_identifier,
                ?location,
                "Cartridge without volume tag skipped"
            );
            return Ok(None);
        };

        let existing = self.find_by_code(code).await?;
        let is_new = existing.is_none();
        let mut tape =
            existing.unwrap_or_else(|| TapeCatalog::new(code, library_identifier.to_string()));
        let before = tape.clone();

        tape.library = library_identifier.to_string();
        if cartridge.alternate_volume_tag.is_some() {
            tape.alternative_code = cartridge.alternate_volume_tag.clone();
        }
        tape.current_location = Some(location);
        if previous_location.is_some() {
            tape.previous_location = previous_location;
        } else if location.is_storage_element() {
            tape.previous_location = Some(location);
        }
        tape.state = state;

        if is_new {
            self.dal
                .queue_message()
                .insert(&QueueMessage::from(tape.clone()))
                .await?;
            info!(tape_code = code, ?location, "Unknown cartridge added to catalog");
        } else if tape != before {
            tape.last_update = now_millis();
            self.replace(tape.clone()).await?;
            debug!(tape_code = code, ?location, "Cartridge location updated");
        }

        Ok(Some(tape))
    }
}
