//! Page-number pagination over lazily cached item sequences.

use thiserror::Error;

use crate::util::iteration::CachedIter;

pub const DEFAULT_PER_PAGE: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaginationError {
    #[error("`{0}` is not a valid page number")]
    InvalidNumber(String),
    #[error("page {number} is beyond the last page ({pages})")]
    Empty { number: usize, pages: usize },
}

/// One page of items together with its position in the full listing.
#[derive(Debug, Clone, PartialEq)]
pub struct PageWindow<T> {
    pub items: Vec<T>,
    pub number: usize,
    pub num_pages: usize,
    pub per_page: usize,
    pub total: usize,
}

impl<T> PageWindow<T> {
    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn previous_number(&self) -> Option<usize> {
        self.has_previous().then(|| self.number - 1)
    }

    pub fn next_number(&self) -> Option<usize> {
        self.has_next().then(|| self.number + 1)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageWindow<U> {
        PageWindow {
            items: self.items.into_iter().map(f).collect(),
            number: self.number,
            num_pages: self.num_pages,
            per_page: self.per_page,
            total: self.total,
        }
    }
}

/// Parse a raw 1-based page number; an absent value means page 1.
pub fn parse_page_number(raw: Option<&str>) -> Result<usize, PaginationError> {
    let Some(raw) = raw else {
        return Ok(1);
    };

    match raw.trim().parse::<usize>() {
        Ok(number) if number >= 1 => Ok(number),
        _ => Err(PaginationError::InvalidNumber(raw.to_string())),
    }
}

/// Slice the requested page out of `items`.
///
/// Page 1 always exists, even for an empty sequence. Consumes the whole
/// source to learn the page count.
pub fn paginate<I>(
    items: &mut CachedIter<I>,
    per_page: usize,
    raw_number: Option<&str>,
) -> Result<PageWindow<I::Item>, PaginationError>
where
    I: Iterator,
    I::Item: Clone,
{
    let number = parse_page_number(raw_number)?;
    let per_page = per_page.max(1);
    let total = items.len();
    let num_pages = total.div_ceil(per_page).max(1);

    if number > num_pages {
        return Err(PaginationError::Empty {
            number,
            pages: num_pages,
        });
    }

    let start = (number - 1) * per_page;
    let end = (start + per_page).min(total);
    let page_items = items
        .slice(start..end)
        .map_err(|_| PaginationError::Empty {
            number,
            pages: num_pages,
        })?
        .to_vec();

    Ok(PageWindow {
        items: page_items,
        number,
        num_pages,
        per_page,
        total,
    })
}
