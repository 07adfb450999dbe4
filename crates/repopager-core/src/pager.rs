use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::{
    mediator::PagingCoordinator,
    models::{Item, LoadDirection, PagingState, ScopeKey},
    remote::RemoteSearchClient,
    store::{blocking, LocalStore},
    Result,
};

/// Pull-style reader over one scope
///
/// Pages always come out of the local store. The coordinator is asked for
/// more only once every stored row has been handed out, so what the caller
/// sees is the cache after each load rather than the raw API response.
///
/// The store orders rows by stars, which need not match the order the API
/// paged them in, so the pager remembers which ids it already returned and
/// each new page is taken from the rows not yet shown.
pub struct ScopedPager<R, S> {
    coordinator: PagingCoordinator<R, S>,
    store: Arc<S>,
    page_size: u32,
    pages: Vec<Vec<Item>>,
    shown: HashSet<i64>,
    anchor_position: Option<usize>,
    start_reached: bool,
    end_reached: bool,
}

impl<R, S> ScopedPager<R, S>
where
    R: RemoteSearchClient,
    S: LocalStore,
{
    pub fn new(coordinator: PagingCoordinator<R, S>, store: Arc<S>, page_size: u32) -> Self {
        Self {
            coordinator,
            store,
            page_size,
            pages: Vec::new(),
            shown: HashSet::new(),
            anchor_position: None,
            start_reached: false,
            end_reached: false,
        }
    }

    pub fn scope_key(&self) -> &ScopeKey {
        self.coordinator.scope_key()
    }

    /// Remember the last viewed position for the next refresh
    ///
    /// A refresh around an anchor replaces the scope with the anchor's page;
    /// [`prev_page`](Self::prev_page) walks back to the earlier ones.
    pub fn set_anchor(&mut self, position: usize) {
        self.anchor_position = Some(position);
    }

    pub fn start_reached(&self) -> bool {
        self.start_reached
    }

    pub fn end_reached(&self) -> bool {
        self.end_reached
    }

    /// What the coordinator would see right now
    pub fn state(&self) -> PagingState {
        PagingState {
            pages: self.pages.clone(),
            anchor_position: self.anchor_position,
            page_size: self.page_size,
        }
    }

    /// Reload and return the first page
    pub async fn refresh(&mut self) -> Result<&[Item]> {
        let end = self
            .coordinator
            .load(LoadDirection::Refresh, &self.state())
            .await
            .into_result()?;

        self.shown.clear();
        let first = self.take_unseen(&HashSet::new()).await?;
        self.end_reached = end || first.is_empty();
        self.start_reached = false;
        self.pages = vec![first];
        Ok(self.pages[0].as_slice())
    }

    /// The page after the last one handed out, or `None` at the end
    pub async fn next_page(&mut self) -> Result<Option<&[Item]>> {
        if self.pages.is_empty() {
            self.refresh().await?;
            return Ok(self.pages.last().and_then(|page| non_empty(page)));
        }
        if self.end_reached {
            return Ok(None);
        }

        let mut window = self.take_unseen(&HashSet::new()).await?;
        if window.is_empty() {
            debug!("All stored rows of '{}' shown, appending", self.scope_key());
            let end = self
                .coordinator
                .load(LoadDirection::Append, &self.state())
                .await
                .into_result()?;
            window = self.take_unseen(&HashSet::new()).await?;
            // A short-circuited append writes nothing; treat that as the end too
            if end || window.is_empty() {
                self.end_reached = true;
            }
        }

        if window.is_empty() {
            return Ok(None);
        }
        self.pages.push(window);
        Ok(self.pages.last().and_then(|page| non_empty(page)))
    }

    /// The page before the first one handed out, or `None` at the start
    pub async fn prev_page(&mut self) -> Result<Option<&[Item]>> {
        if self.pages.is_empty() || self.start_reached {
            return Ok(None);
        }

        // Rows already waiting for next_page belong after the loaded pages
        let waiting: HashSet<i64> = self
            .unseen()
            .await?
            .into_iter()
            .map(|item| item.id)
            .collect();

        debug!("Prepending before the first loaded page of '{}'", self.scope_key());
        let start = self
            .coordinator
            .load(LoadDirection::Prepend, &self.state())
            .await
            .into_result()?;
        let window = self.take_unseen(&waiting).await?;

        if start || window.is_empty() {
            self.start_reached = true;
        }
        if window.is_empty() {
            return Ok(None);
        }
        self.pages.insert(0, window);
        Ok(self.pages.first().and_then(|page| non_empty(page)))
    }

    /// Up to one page of rows not yet shown and not in `skip`, marked as shown
    async fn take_unseen(&mut self, skip: &HashSet<i64>) -> Result<Vec<Item>> {
        let window: Vec<Item> = self
            .unseen()
            .await?
            .into_iter()
            .filter(|item| !skip.contains(&item.id))
            .take(self.page_size as usize)
            .collect();
        self.shown.extend(window.iter().map(|item| item.id));
        Ok(window)
    }

    /// Every stored row of the scope the caller has not seen, in store order
    async fn unseen(&self) -> Result<Vec<Item>> {
        let scope = self.scope_key().clone();
        let rows = blocking(&self.store, move |store| {
            let total = store.count_by_scope(&scope)? as usize;
            store.items_by_scope(&scope, 0, total)
        })
        .await?;
        Ok(rows
            .into_iter()
            .filter(|item| !self.shown.contains(&item.id))
            .collect())
    }
}

fn non_empty(page: &[Item]) -> Option<&[Item]> {
    (!page.is_empty()).then_some(page)
}
