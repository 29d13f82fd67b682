use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::config::CapacityCap;
use crate::models::{AdvisorCapacity, AdvisorId, StudentId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub student_id: StudentId,
    pub advisor_id: AdvisorId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisorLoad {
    pub advisor_id: AdvisorId,
    pub previous_load: u32,
    pub assigned: u32,
    pub projected_load: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub requested: usize,
    pub assignments: Vec<Assignment>,
    pub unassigned: Vec<StudentId>,
    pub loads: Vec<AdvisorLoad>,
    pub warning: Option<String>,
}

impl AllocationPlan {
    pub fn assigned_count(&self) -> usize {
        self.assignments.len()
    }

    pub fn unassigned_count(&self) -> usize {
        self.unassigned.len()
    }
}

/// Heap entry: most remaining capacity first, then lowest current load,
/// then roster order.
#[derive(Debug, PartialEq, Eq)]
struct Slot {
    remaining: u32,
    load: Reverse<u32>,
    position: Reverse<usize>,
}

impl Ord for Slot {
    fn cmp(&self, other: &Self) -> Ordering {
        self.remaining
            .cmp(&other.remaining)
            .then_with(|| self.load.cmp(&other.load))
            .then_with(|| self.position.cmp(&other.position))
    }
}

impl PartialOrd for Slot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Greedy quota allocation. Each unit goes to the advisor at the front of
/// the ordering, which is recomputed after every assignment; stops when
/// units run out or no advisor has room left.
pub fn allocate(
    students: &[StudentId],
    advisors: &[AdvisorCapacity],
    cap: CapacityCap,
) -> AllocationPlan {
    let mut loads: Vec<AdvisorLoad> = advisors
        .iter()
        .map(|advisor| AdvisorLoad {
            advisor_id: advisor.advisor_id,
            previous_load: advisor.current_load,
            assigned: 0,
            projected_load: advisor.current_load,
        })
        .collect();

    let mut heap: BinaryHeap<Slot> = advisors
        .iter()
        .enumerate()
        .map(|(position, advisor)| Slot {
            remaining: cap.limit_for(advisor).saturating_sub(advisor.current_load),
            load: Reverse(advisor.current_load),
            position: Reverse(position),
        })
        .filter(|slot| slot.remaining > 0)
        .collect();

    let mut assignments = Vec::with_capacity(students.len());
    let mut pending = students.iter();

    while let Some(student_id) = pending.as_slice().first().copied() {
        let Some(mut slot) = heap.pop() else {
            break;
        };
        pending.next();

        let entry = &mut loads[slot.position.0];
        entry.assigned += 1;
        entry.projected_load += 1;
        assignments.push(Assignment {
            student_id,
            advisor_id: entry.advisor_id,
        });

        slot.remaining -= 1;
        slot.load = Reverse(entry.projected_load);
        if slot.remaining > 0 {
            heap.push(slot);
        }
    }

    let unassigned: Vec<StudentId> = pending.copied().collect();
    let warning = (!unassigned.is_empty()).then(|| {
        format!(
            "{} students could not be assigned: advisor capacity exhausted",
            unassigned.len()
        )
    });

    AllocationPlan {
        requested: students.len(),
        assignments,
        unassigned,
        loads,
        warning,
    }
}
