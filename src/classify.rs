//! Footprint classification and ordering for one board side

use crate::activity::{ActivityLog, Verbosity};
use crate::board::{Board, Footprint, Side};
use crate::mapping::{ComponentMapping, Placement};
use crate::placement::{Offset, PlacementRow};

/// Why a footprint ends up in a group
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Marked "exclude from position files" or "exclude from BOM"
    ExcludedByAttribute,
    /// Value matched this exclusion pattern
    ExcludedByPattern(String),
    /// Value matched this priority pattern
    Priority(String),
    Mapped(Placement),
    Unmapped,
}

/// Classify one footprint; exclusion is checked before priority before mapping
pub fn classify(footprint: &Footprint, mapping: &ComponentMapping) -> Classification {
    if footprint.attributes.excludes_from_placement() {
        return Classification::ExcludedByAttribute;
    }

    if let Some(pattern) = mapping.matching_exclusion(&footprint.value) {
        return Classification::ExcludedByPattern(pattern.as_str().to_string());
    }

    if let Some(pattern) = mapping.matching_priority(&footprint.value) {
        return Classification::Priority(pattern.as_str().to_string());
    }

    match mapping.placement(&footprint.value) {
        Some(placement) => Classification::Mapped(placement.clone()),
        None => Classification::Unmapped,
    }
}

/// Sort key: the first whitespace-delimited token of the value
pub fn sort_key(value: &str) -> &str {
    value.split_whitespace().next().unwrap_or("")
}

/// Counts reported after a side has been written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerStats {
    pub total: usize,
    pub mapped: usize,
    pub priority: usize,
    pub excluded_by_pattern: usize,
    pub excluded_by_attribute: usize,
    pub unmapped: usize,
}

/// Footprints of one side grouped and sorted for output
#[derive(Debug)]
pub struct LayerPlan<'a> {
    pub side: Side,
    pub priority: Vec<&'a Footprint>,
    pub mapped: Vec<&'a Footprint>,
    pub unmapped: Vec<&'a Footprint>,
    pub excluded_by_pattern: Vec<&'a Footprint>,
    pub excluded_by_attribute: Vec<&'a Footprint>,
    total: usize,
}

impl<'a> LayerPlan<'a> {
    /// Classify every footprint on `side` and sort the surviving groups
    pub fn build(
        board: &'a Board,
        side: Side,
        mapping: &ComponentMapping,
        activity: &ActivityLog,
    ) -> Self {
        let mut plan = Self {
            side,
            priority: Vec::new(),
            mapped: Vec::new(),
            unmapped: Vec::new(),
            excluded_by_pattern: Vec::new(),
            excluded_by_attribute: Vec::new(),
            total: 0,
        };

        for footprint in board.footprints_on(side) {
            plan.total += 1;
            let classification = classify(footprint, mapping);
            report(footprint, &classification, activity);

            match classification {
                Classification::ExcludedByAttribute => plan.excluded_by_attribute.push(footprint),
                Classification::ExcludedByPattern(_) => plan.excluded_by_pattern.push(footprint),
                Classification::Priority(_) => plan.priority.push(footprint),
                Classification::Mapped(_) => plan.mapped.push(footprint),
                Classification::Unmapped => plan.unmapped.push(footprint),
            }
        }

        for group in [&mut plan.priority, &mut plan.mapped, &mut plan.unmapped] {
            for footprint in group.iter() {
                activity.detail(Verbosity::Debug, || {
                    format!(
                        "Sort key for {} is {}",
                        footprint.reference,
                        sort_key(&footprint.value)
                    )
                });
            }
            // stable, so equal keys keep board order
            group.sort_by(|a, b| sort_key(&a.value).cmp(sort_key(&b.value)));
        }

        plan
    }

    /// Output rows in the order priority, mapped, unmapped
    pub fn rows(&self, mapping: &ComponentMapping, offset: Offset) -> Vec<PlacementRow> {
        let priority = self
            .priority
            .iter()
            .map(|footprint| PlacementRow::new(footprint, mapping, offset, true));
        let rest = self
            .mapped
            .iter()
            .chain(self.unmapped.iter())
            .map(|footprint| PlacementRow::new(footprint, mapping, offset, false));

        priority.chain(rest).collect()
    }

    pub fn stats(&self) -> LayerStats {
        LayerStats {
            total: self.total,
            mapped: self.mapped.len(),
            priority: self.priority.len(),
            excluded_by_pattern: self.excluded_by_pattern.len(),
            excluded_by_attribute: self.excluded_by_attribute.len(),
            unmapped: self.unmapped.len(),
        }
    }
}

fn report(footprint: &Footprint, classification: &Classification, activity: &ActivityLog) {
    let processing = || {
        format!(
            "Processing {}: Layer={}, Value='{}'",
            footprint.reference, footprint.layer, footprint.value
        )
    };

    match classification {
        Classification::ExcludedByAttribute => {
            activity.detail(Verbosity::Verbose, || {
                format!("{} - Excluded by attribute", processing())
            });
        }
        Classification::ExcludedByPattern(pattern) => {
            activity.detail(Verbosity::Debug, || {
                format!(
                    "Excluding {} based on pattern: {}",
                    footprint.reference, pattern
                )
            });
            activity.detail(Verbosity::Verbose, || {
                format!("{} - Excluded by pattern", processing())
            });
        }
        Classification::Priority(pattern) => {
            activity.detail(Verbosity::Debug, || {
                format!(
                    "Prioritizing {} based on pattern: {}",
                    footprint.reference, pattern
                )
            });
            activity.detail(Verbosity::Verbose, || format!("{} - Priority", processing()));
        }
        Classification::Mapped(placement) => {
            activity.detail(Verbosity::Verbose, || {
                format!(
                    "{} - Mapped N:{}, F:{}",
                    processing(),
                    placement.nozzle,
                    placement.stack
                )
            });
        }
        Classification::Unmapped => {
            activity.detail(Verbosity::Verbose, || format!("{} - Unmapped", processing()));
        }
    }
}
