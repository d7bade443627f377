//! In-memory index over the page tree.
//!
//! [`PageTree`] is built once per request from the full page list and checks
//! the structural invariants the store is expected to maintain: at most one
//! homepage, which has no parent; every parent reference resolves; sibling
//! slugs are unique; no cycles. Children are kept in `order_index` order.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::domain::{entities::PageRecord, error::DomainError, slug::is_url_slug};

#[derive(Debug, Clone)]
pub struct PageTree {
    pages: Vec<PageRecord>,
    by_id: HashMap<Uuid, usize>,
    children: HashMap<Option<Uuid>, Vec<usize>>,
    homepage: Option<usize>,
}

impl PageTree {
    pub fn build(pages: Vec<PageRecord>) -> Result<Self, DomainError> {
        let mut by_id = HashMap::with_capacity(pages.len());
        let mut homepage = None;

        for (index, page) in pages.iter().enumerate() {
            if by_id.insert(page.id, index).is_some() {
                return Err(DomainError::invariant(format!(
                    "page `{}` appears twice",
                    page.id
                )));
            }
            if page.is_homepage {
                if page.parent_id.is_some() {
                    return Err(DomainError::invariant(format!(
                        "homepage `{}` has a parent",
                        page.id
                    )));
                }
                if homepage.replace(index).is_some() {
                    return Err(DomainError::invariant("more than one homepage"));
                }
            } else if !is_url_slug(&page.slug) {
                return Err(DomainError::invariant(format!(
                    "page `{}` has invalid slug `{}`",
                    page.id, page.slug
                )));
            }
        }

        let mut children: HashMap<Option<Uuid>, Vec<usize>> = HashMap::new();
        for (index, page) in pages.iter().enumerate() {
            if let Some(parent) = page.parent_id
                && !by_id.contains_key(&parent)
            {
                return Err(DomainError::invariant(format!(
                    "page `{}` references missing parent `{parent}`",
                    page.id
                )));
            }
            children.entry(page.parent_id).or_default().push(index);
        }

        for (parent, siblings) in children.iter_mut() {
            siblings.sort_by(|&a, &b| {
                pages[a]
                    .order_index
                    .cmp(&pages[b].order_index)
                    .then_with(|| pages[a].title.cmp(&pages[b].title))
            });

            if parent.is_some() {
                let mut seen = HashSet::new();
                for &index in siblings.iter() {
                    if !seen.insert(pages[index].slug.as_str()) {
                        return Err(DomainError::invariant(format!(
                            "duplicate sibling slug `{}`",
                            pages[index].slug
                        )));
                    }
                }
            }
        }

        let tree = Self {
            pages,
            by_id,
            children,
            homepage,
        };
        tree.ensure_acyclic()?;
        Ok(tree)
    }

    fn ensure_acyclic(&self) -> Result<(), DomainError> {
        for page in &self.pages {
            let mut steps = 0;
            let mut current = page.parent_id;
            while let Some(parent) = current {
                steps += 1;
                if steps > self.pages.len() {
                    return Err(DomainError::invariant(format!(
                        "page `{}` is part of a parent cycle",
                        page.id
                    )));
                }
                current = self.get(parent).and_then(|parent| parent.parent_id);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&PageRecord> {
        self.by_id.get(&id).map(|&index| &self.pages[index])
    }

    pub fn homepage(&self) -> Option<&PageRecord> {
        self.homepage.map(|index| &self.pages[index])
    }

    pub fn children(&self, id: Uuid) -> impl Iterator<Item = &PageRecord> {
        self.children
            .get(&Some(id))
            .into_iter()
            .flatten()
            .map(|&index| &self.pages[index])
    }

    pub fn child_by_slug(&self, parent: Uuid, slug: &str) -> Option<&PageRecord> {
        self.children(parent).find(|child| child.slug == slug)
    }

    /// Ancestors of `id`, outermost first, excluding the page itself.
    pub fn ancestors(&self, id: Uuid) -> Vec<&PageRecord> {
        let mut chain = Vec::new();
        let mut current = self.get(id).and_then(|page| page.parent_id);
        while let Some(parent_id) = current {
            let Some(parent) = self.get(parent_id) else {
                break;
            };
            chain.push(parent);
            current = parent.parent_id;
        }
        chain.reverse();
        chain
    }

    /// All pages below `id`, parents before children.
    pub fn descendants(&self, id: Uuid) -> Vec<&PageRecord> {
        let mut found = Vec::new();
        let mut pending: Vec<Uuid> = vec![id];
        while let Some(current) = pending.pop() {
            for child in self.children(current) {
                found.push(child);
                pending.push(child.id);
            }
        }
        found
    }

    /// Public URL of a page: `/` for the homepage, `/a/b/` below it.
    ///
    /// Pages outside the homepage's subtree have no URL.
    pub fn url(&self, id: Uuid) -> Option<String> {
        let page = self.get(id)?;
        if page.is_homepage {
            return Some("/".to_string());
        }

        let ancestors = self.ancestors(id);
        let (root, below_root) = ancestors.split_first()?;
        if !root.is_homepage {
            return None;
        }

        let mut url = String::from("/");
        for ancestor in below_root {
            url.push_str(&ancestor.slug);
            url.push('/');
        }
        url.push_str(&page.slug);
        url.push('/');
        Some(url)
    }

    /// Whether the page and all of its ancestors are online.
    pub fn is_visible(&self, id: Uuid) -> bool {
        match self.get(id) {
            Some(page) if page.is_online => self
                .ancestors(id)
                .iter()
                .all(|ancestor| ancestor.is_online),
            _ => false,
        }
    }

    /// Pages with the given content type, in tree order.
    pub fn with_content_type<'a>(
        &'a self,
        content_type: &'a str,
    ) -> impl Iterator<Item = &'a PageRecord> + 'a {
        self.pages
            .iter()
            .filter(move |page| page.content_type == content_type)
    }
}
