use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::coverage::{CoverageWindow, MonthSlot};
use crate::datastore::RentalStore;
use crate::error::CoverageError;
use crate::pager::Pager;
use crate::rental::{Rental, RentalKind, RentalRef};

/// One user editing the paid months of one rental.
///
/// Clicks arrive as positions on the visible page and are translated to
/// grid indices here. Nothing is written until [`CoverageSession::commit`].
#[derive(Debug, Clone)]
pub struct CoverageSession {
    rental: Rental,
    window: CoverageWindow,
    pager: Pager,
}

impl CoverageSession {
    pub fn new(
        rental: Rental,
        today: NaiveDate,
        horizon: usize,
        page_size: usize,
    ) -> Result<Self, CoverageError> {
        if rental.kind != RentalKind::Rental {
            return Err(CoverageError::NotARental { id: rental.id });
        }

        let window =
            CoverageWindow::generate(rental.start_date, rental.end_date, today, horizon);
        let mut pager = Pager::new(window.len(), page_size);
        // open on the page where coverage currently ends
        if let Some(last) = window.last_selected() {
            pager.reveal(last);
        }

        Ok(Self {
            rental,
            window,
            pager,
        })
    }

    #[tracing::instrument(skip(store, selector, today), fields(selector = %selector))]
    pub fn open<S: RentalStore>(
        store: &S,
        selector: &RentalRef,
        today: NaiveDate,
        horizon: usize,
        page_size: usize,
    ) -> Result<Self, CoverageError> {
        let rental = store.load_rental(selector)?;
        debug!(
            id = rental.id,
            start = %rental.start_date,
            end = ?rental.end_date,
            "loaded rental"
        );
        Self::new(rental, today, horizon, page_size)
    }

    pub fn rental(&self) -> &Rental {
        &self.rental
    }

    pub fn window(&self) -> &CoverageWindow {
        &self.window
    }

    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    /// Slots on the page currently shown.
    pub fn visible(&self) -> &[MonthSlot] {
        self.pager.view(self.window.slots())
    }

    pub fn next_page(&mut self) -> usize {
        self.pager.next()
    }

    pub fn prev_page(&mut self) -> usize {
        self.pager.prev()
    }

    pub fn go_to_page(&mut self, page_index: usize) -> usize {
        self.pager.go_to(page_index)
    }

    /// Click on the `in_page`-th cell of the current page.
    pub fn toggle_visible(&mut self, in_page: usize) -> Result<(), CoverageError> {
        let absolute = self.pager.absolute_index(in_page)?;
        self.window.toggle(absolute)
    }

    /// Click on the cell for the month containing `month`, showing its page.
    pub fn toggle_month(&mut self, month: NaiveDate) -> Result<(), CoverageError> {
        let Some(absolute) = self.window.index_of(month) else {
            warn!(%month, start = %self.window.start_month(), "month outside coverage window");
            return Err(CoverageError::MonthOutsideWindow {
                month,
                start: self.window.start_month(),
                len: self.window.len(),
            });
        };
        self.pager.reveal(absolute);
        self.window.toggle(absolute)
    }

    /// End date the current selection would commit.
    pub fn preview(&self) -> Result<NaiveDate, CoverageError> {
        self.window.commit()
    }

    /// Persists the selection. Local state only changes once the store has
    /// accepted the write.
    #[tracing::instrument(skip(self, store, now), fields(id = self.rental.id))]
    pub fn commit<S: RentalStore>(
        &mut self,
        store: &S,
        now: DateTime<Utc>,
    ) -> Result<NaiveDate, CoverageError> {
        let end_date = self.window.commit()?;

        let saved = store
            .save_rental_coverage(self.rental.uuid, end_date, now)
            .inspect_err(|err| warn!(error = %err, "coverage commit rejected by storage"))?;

        self.rental.end_date = saved.end_date;
        self.rental.paid = saved.paid;
        self.rental.modified = saved.modified;

        info!(%end_date, "committed rental coverage");
        Ok(end_date)
    }
}
