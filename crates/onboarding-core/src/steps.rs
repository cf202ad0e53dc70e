// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Step derivation.
//!
//! Decides which onboarding steps a client needs from the CRM's tri-state
//! flags and makes sure a client step exists for each. A missing row means
//! the step is not required.

use tracing::{debug, warn};

use crate::error::OnboardingError;
use crate::model::{ClientRecord, StepKind, StepListing};
use crate::store::RecordStore;

/// Create any missing client steps required by `client`.
///
/// Idempotent: existing steps are left untouched, completed ones are never
/// reset. Returns the kinds that are required.
pub async fn derive_required_steps(
    store: &dyn RecordStore,
    client: &ClientRecord,
) -> Result<Vec<StepKind>, OnboardingError> {
    let mut required = Vec::new();

    for kind in StepKind::ALL {
        if !client.requires(kind) {
            continue;
        }

        let Some(definition) = store
            .find_step_definition_by_name(kind.definition_name())
            .await?
        else {
            warn!(
                step = kind.definition_name(),
                "Onboarding step definition not found, skipping"
            );
            continue;
        };

        if store
            .find_client_step(&client.zoho_record_id, definition.id)
            .await?
            .is_none()
        {
            store
                .create_client_step(&client.zoho_record_id, definition.id)
                .await?;
            debug!(
                zoho_record_id = %client.zoho_record_id,
                step = %kind,
                "Client step created"
            );
        }
        required.push(kind);
    }

    Ok(required)
}

/// The step catalogue, or a client's required steps with completion state.
pub async fn list_steps(
    store: &dyn RecordStore,
    zoho_record_id: Option<&str>,
) -> Result<StepListing, OnboardingError> {
    match zoho_record_id {
        Some(id) => Ok(StepListing::Client(store.list_client_steps(id).await?)),
        None => Ok(StepListing::Catalogue(store.list_step_definitions().await?)),
    }
}
