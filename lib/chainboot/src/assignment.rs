// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Assignments map machines to profiles.
//!
//! A non-default assignment selects subjects by (buildarch, UUID) pairs. A
//! default assignment carries no UUIDs and is chosen by buildarch alone
//! when no direct match exists. Assignments are indexed by labels so the
//! store can answer selector lookups with set membership tests.

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::params::{Buildarch, IpxeSelectors};

/// Label carried by default assignments.
pub const DEFAULT_ASSIGNMENT_LABEL: &str = "default-assignment";

pub fn buildarch_label(buildarch: Buildarch) -> String {
    format!("buildarch/{buildarch}")
}

pub fn uuid_label(id: Uuid) -> String {
    format!("uuid/{id}")
}

#[derive(Clone, Debug)]
pub struct Assignment {
    pub name: String,
    pub profile_name: String,
    pub subject_selectors: SubjectSelectors,
    pub is_default: bool,
}

#[derive(Clone, Debug, Default)]
pub struct SubjectSelectors {
    pub uuids: Vec<Uuid>,
    pub buildarchs: Vec<Buildarch>,
}

impl Assignment {
    /// The label set the control plane indexes this assignment under.
    pub fn labels(&self) -> BTreeSet<String> {
        let mut labels = BTreeSet::new();
        for buildarch in &self.subject_selectors.buildarchs {
            labels.insert(buildarch_label(*buildarch));
        }
        for id in &self.subject_selectors.uuids {
            labels.insert(uuid_label(*id));
        }
        if self.is_default {
            labels.insert(DEFAULT_ASSIGNMENT_LABEL.to_string());
        }
        labels
    }

    /// Whether this assignment directly matches the given selectors.
    pub fn matches(&self, selectors: &IpxeSelectors) -> bool {
        let labels = self.labels();
        labels.contains(&buildarch_label(selectors.buildarch))
            && labels.contains(&uuid_label(selectors.uuid))
    }

    /// Whether this assignment is the default for the given buildarch.
    pub fn matches_default(&self, buildarch: Buildarch) -> bool {
        let labels = self.labels();
        labels.contains(DEFAULT_ASSIGNMENT_LABEL)
            && labels.contains(&buildarch_label(buildarch))
    }
}
