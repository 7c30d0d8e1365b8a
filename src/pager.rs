use std::future::Future;

use crate::api::Page;
use crate::fetcher::RetryPolicy;
use crate::{AppError, Result};

/// Records gathered by a page walk, plus the error that stopped it early
#[derive(Debug)]
pub struct Walk<T> {
    pub records: Vec<T>,
    pub error: Option<AppError>,
}

impl<T> Walk<T> {
    pub fn complete(records: Vec<T>) -> Self {
        Self {
            records,
            error: None,
        }
    }

    /// Discard partial records if the walk failed
    pub fn into_result(self) -> Result<Vec<T>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.records),
        }
    }
}

/// Follow continuation cursors until the platform reports no further pages.
///
/// Each page goes through `policy`. A page that still fails ends the walk,
/// keeping every record fetched before it.
pub async fn walk_cursor<T, F, Fut>(policy: &RetryPolicy, mut fetch_page: F) -> Walk<T>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut records = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = match policy.call(|| fetch_page(cursor.clone())).await {
            Ok(page) => page,
            Err(e) => {
                return Walk {
                    records,
                    error: Some(e),
                };
            }
        };

        records.extend(page.items);

        match page.next_cursor {
            Some(next) if !next.is_empty() => cursor = Some(next),
            _ => break,
        }
    }

    Walk::complete(records)
}

/// Walk numbered pages starting at 1, bounded by the page count each
/// response reports.
pub async fn walk_numbered<T, F, Fut>(policy: &RetryPolicy, mut fetch_page: F) -> Walk<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(Vec<T>, u32)>>,
{
    let mut records = Vec::new();
    let mut page = 1;

    loop {
        let (items, total_pages) = match policy.call(|| fetch_page(page)).await {
            Ok(result) => result,
            Err(e) => {
                return Walk {
                    records,
                    error: Some(e),
                };
            }
        };

        records.extend(items);

        if page >= total_pages {
            break;
        }
        page += 1;
    }

    Walk::complete(records)
}
