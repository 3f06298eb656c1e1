//! Page selection: `all`, `5`, `3-15`, `7-`, `1,3,5-7`.

use crate::error::KitError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Specifies which pages of a PDF an operation applies to (1-indexed).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Every page (default).
    #[default]
    All,
    /// A single page.
    Single(usize),
    /// A contiguous inclusive range.
    Range(usize, usize),
    /// From a page to the end of the document.
    From(usize),
    /// A comma list; each item is an inclusive `(start, end)` span, with
    /// single pages stored as `(p, p)`.
    Set(Vec<(usize, usize)>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page
    /// numbers. Pages beyond `total_pages` are dropped.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::From(start) => ((*start).max(1) - 1..total_pages).collect(),
            PageSelection::Set(spans) => spans
                .iter()
                .flat_map(|&(start, end)| start.max(1) - 1..end.min(total_pages))
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Like [`to_indices`](Self::to_indices) but an empty result is an error.
    pub fn resolve(&self, total_pages: usize) -> Result<Vec<usize>, KitError> {
        let indices = self.to_indices(total_pages);
        if indices.is_empty() {
            return Err(KitError::PageOutOfRange {
                selection: self.to_string(),
                total: total_pages,
            });
        }
        Ok(indices)
    }
}

fn parse_page(s: &str, whole: &str) -> Result<usize, KitError> {
    let page: usize = s
        .trim()
        .parse()
        .map_err(|_| KitError::invalid(whole, format!("'{}' is not a page number", s.trim())))?;
    if page < 1 {
        return Err(KitError::invalid(whole, "pages are 1-indexed, minimum is 1"));
    }
    Ok(page)
}

fn parse_range(s: &str, whole: &str) -> Result<(usize, usize), KitError> {
    let (start, end) = s
        .split_once('-')
        .ok_or_else(|| KitError::invalid(whole, "expected a range like 3-15"))?;
    let start = parse_page(start, whole)?;
    let end = parse_page(end, whole)?;
    if start > end {
        return Err(KitError::invalid(
            whole,
            format!("range {start}-{end}: start must be <= end"),
        ));
    }
    Ok((start, end))
}

impl FromStr for PageSelection {
    type Err = KitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();

        if s == "all" || s.is_empty() {
            return Ok(PageSelection::All);
        }

        // List: "1,3,5-7"
        if s.contains(',') {
            let mut spans = Vec::new();
            for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                if part.contains('-') {
                    spans.push(parse_range(part, &s)?);
                } else {
                    let page = parse_page(part, &s)?;
                    spans.push((page, page));
                }
            }
            return Ok(PageSelection::Set(spans));
        }

        // Open range: "7-"
        if let Some(start) = s.strip_suffix('-') {
            return Ok(PageSelection::From(parse_page(start, &s)?));
        }

        // Range: "3-15"
        if s.contains('-') {
            let (a, b) = parse_range(&s, &s)?;
            return Ok(PageSelection::Range(a, b));
        }

        Ok(PageSelection::Single(parse_page(&s, &s)?))
    }
}

impl fmt::Display for PageSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSelection::All => f.write_str("all"),
            PageSelection::Single(p) => write!(f, "{p}"),
            PageSelection::Range(a, b) => write!(f, "{a}-{b}"),
            PageSelection::From(a) => write!(f, "{a}-"),
            PageSelection::Set(spans) => {
                let parts: Vec<String> = spans
                    .iter()
                    .map(|&(a, b)| if a == b { a.to_string() } else { format!("{a}-{b}") })
                    .collect();
                f.write_str(&parts.join(","))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_selection_to_indices() {
        assert_eq!(PageSelection::All.to_indices(5), vec![0, 1, 2, 3, 4]);
        assert_eq!(PageSelection::Single(3).to_indices(5), vec![2]);
        assert_eq!(PageSelection::Single(6).to_indices(5), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(2, 4).to_indices(5), vec![1, 2, 3]);
        assert_eq!(PageSelection::From(4).to_indices(5), vec![3, 4]);
        assert_eq!(
            PageSelection::Set(vec![(3, 3), (1, 1), (3, 3)]).to_indices(5),
            vec![0, 2] // deduplicated and sorted
        );
    }

    #[test]
    fn range_is_clipped_to_document() {
        assert_eq!(PageSelection::Range(3, 10).to_indices(4), vec![2, 3]);
    }

    #[test]
    fn resolve_rejects_empty_selection() {
        let err = PageSelection::Single(100).resolve(4).unwrap_err();
        assert!(matches!(err, KitError::PageOutOfRange { total: 4, .. }));
    }

    #[test]
    fn parse_forms() {
        assert_eq!("all".parse::<PageSelection>().unwrap(), PageSelection::All);
        assert_eq!(" ALL ".parse::<PageSelection>().unwrap(), PageSelection::All);
        assert_eq!("5".parse::<PageSelection>().unwrap(), PageSelection::Single(5));
        assert_eq!(
            "3-15".parse::<PageSelection>().unwrap(),
            PageSelection::Range(3, 15)
        );
        assert_eq!("7-".parse::<PageSelection>().unwrap(), PageSelection::From(7));
        assert_eq!(
            "1,3,5-7".parse::<PageSelection>().unwrap(),
            PageSelection::Set(vec![(1, 1), (3, 3), (5, 7)])
        );
    }

    #[test]
    fn huge_list_range_is_clipped_not_expanded() {
        let sel: PageSelection = "1,5-4000000000".parse().unwrap();
        assert_eq!(sel, PageSelection::Set(vec![(1, 1), (5, 4_000_000_000)]));
        assert_eq!(sel.to_indices(7), vec![0, 4, 5, 6]);
        assert_eq!(sel.to_string(), "1,5-4000000000");
        assert_eq!(
            PageSelection::Set(vec![(2, 3), (3, usize::MAX)]).to_indices(4),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn parse_errors() {
        assert!("0".parse::<PageSelection>().is_err());
        assert!("5-3".parse::<PageSelection>().is_err());
        assert!("a-b".parse::<PageSelection>().is_err());
        assert!("1,x".parse::<PageSelection>().is_err());
        assert!("two".parse::<PageSelection>().is_err());
    }

    #[test]
    fn display_round_trips_simple_forms() {
        for s in ["all", "5", "3-15", "7-", "1,3,5", "1,4-6"] {
            assert_eq!(s.parse::<PageSelection>().unwrap().to_string(), s);
        }
    }
}
