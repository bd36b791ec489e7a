//! Month-range payment coverage.
//!
//! A [`CoverageWindow`] is a run of consecutive months starting at the
//! later of the rental start and today. Each month can be marked as paid;
//! the marked months always form one unbroken run, and committing reduces
//! that run to the last covered day.

use chrono::NaiveDate;
use tracing::{debug, trace};

use crate::datetime::{add_months, end_of_month, same_month, start_of_month};
use crate::error::CoverageError;

/// Number of months offered for payment.
pub const DEFAULT_HORIZON_MONTHS: usize = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthSlot {
    /// First day of the month.
    pub date: NaiveDate,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageWindow {
    start_month: NaiveDate,
    slots: Vec<MonthSlot>,
}

impl CoverageWindow {
    /// Builds the grid for a rental.
    ///
    /// Months up to and including the month of `current_end` start out
    /// selected. An end date before the first generated month selects
    /// nothing. The grid is shorter than `horizon` only when it would run
    /// past the last representable date.
    #[tracing::instrument(level = "debug")]
    pub fn generate(
        rental_start: NaiveDate,
        current_end: Option<NaiveDate>,
        today: NaiveDate,
        horizon: usize,
    ) -> Self {
        let start_month = start_of_month(rental_start.max(today));

        let slots: Vec<MonthSlot> = (0..horizon)
            .map_while(|offset| {
                let offset = u32::try_from(offset).ok()?;
                add_months(start_month, offset)
            })
            .map(|date| MonthSlot {
                date,
                selected: current_end
                    .is_some_and(|end| same_month(date, end) || date <= end),
            })
            .collect();

        debug!(
            %start_month,
            slots = slots.len(),
            covered = slots.iter().filter(|slot| slot.selected).count(),
            "generated coverage window"
        );

        Self { start_month, slots }
    }

    pub fn start_month(&self) -> NaiveDate {
        self.start_month
    }

    pub fn slots(&self) -> &[MonthSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn first_selected(&self) -> Option<usize> {
        self.slots.iter().position(|slot| slot.selected)
    }

    pub fn last_selected(&self) -> Option<usize> {
        self.slots.iter().rposition(|slot| slot.selected)
    }

    /// Index of the slot for the month containing `date`.
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.slots.iter().position(|slot| same_month(slot.date, date))
    }

    /// Handles a click on the slot at `index`.
    ///
    /// Clicking a covered month uncovers it and every later month.
    /// Clicking an uncovered month covers everything from the first
    /// covered month (or the first slot) through it.
    pub fn toggle(&mut self, index: usize) -> Result<(), CoverageError> {
        let len = self.slots.len();
        let clicked = self
            .slots
            .get(index)
            .ok_or(CoverageError::SlotOutOfRange { index, len })?;

        if clicked.selected {
            for slot in &mut self.slots[index..] {
                slot.selected = false;
            }
            trace!(index, "truncated coverage");
        } else {
            let first = self.first_selected().unwrap_or(0);
            if first <= index {
                for slot in &mut self.slots[first..=index] {
                    slot.selected = true;
                }
            }
            trace!(first, index, "extended coverage");
        }

        Ok(())
    }

    /// Last day covered by the current selection.
    pub fn commit(&self) -> Result<NaiveDate, CoverageError> {
        let last = self.last_selected().ok_or(CoverageError::NoSelection)?;
        Ok(end_of_month(self.slots[last].date))
    }
}
