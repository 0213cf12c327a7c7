//! The listing pipeline: select, sort, then render one line per ref.

use refdb_refs::names::check_refname_format;
use refdb_refs::{RefRecord, RefTarget, RefView};
use refdb_store::{ObjectStore, StoreError};
use tracing::{debug, warn};

use crate::error::{FilterError, Result};
use crate::filter::{NameMatcher, ObjectFilter, RefKinds};
use crate::format::Template;
use crate::item::RefItem;
use crate::quote::QuoteStyle;
use crate::sort::{self, SortKey};

/// Everything a caller can ask of a listing.
#[derive(Clone, Debug, Default)]
pub struct ListRequest {
    pub patterns: Vec<String>,
    /// Patterns read from standard input. Mutually exclusive with
    /// `patterns`.
    pub stdin_patterns: Option<Vec<String>>,
    pub exclude: Vec<String>,
    pub kinds: RefKinds,
    pub include_root_refs: bool,
    pub objects: ObjectFilter,
    pub ignore_case: bool,
    pub sort: Vec<String>,
    pub format: Option<String>,
    pub quote: Vec<QuoteStyle>,
    pub omit_empty: bool,
    /// Maximum number of refs to show; 0 shows all.
    pub count: i64,
}

/// A request that passed validation.
#[derive(Debug)]
struct Plan {
    matcher: NameMatcher,
    exclude: NameMatcher,
    keys: Vec<SortKey>,
    template: Template,
    quote: QuoteStyle,
    limit: Option<usize>,
}

impl ListRequest {
    /// Check every request-level setting without reading any ref.
    pub fn validate(&self) -> Result<()> {
        self.plan().map(drop)
    }

    fn plan(&self) -> Result<Plan> {
        let quote = QuoteStyle::from_requested(&self.quote)?;
        let patterns = match &self.stdin_patterns {
            Some(_) if !self.patterns.is_empty() => return Err(FilterError::ConflictingPatternSources),
            Some(stdin) => stdin,
            None => &self.patterns,
        };
        let template = match &self.format {
            Some(format) => Template::parse(format)?,
            None => Template::default(),
        };
        let keys = sort::parse_keys(&self.sort, self.ignore_case)?;
        let limit = match self.count {
            n if n < 0 => return Err(FilterError::InvalidCount(n)),
            0 => None,
            n => Some(usize::try_from(n).unwrap_or(usize::MAX)),
        };
        Ok(Plan {
            matcher: NameMatcher::new(patterns, self.ignore_case),
            exclude: NameMatcher::new(&self.exclude, self.ignore_case),
            keys,
            template,
            quote,
            limit,
        })
    }
}

/// List the refs visible through `view` that match `request`.
///
/// The request is validated in full before any ref is read. Refs with
/// malformed names, broken symbolic chains, or missing objects are skipped
/// with a warning.
pub fn list<'s, S: ObjectStore + ?Sized>(
    view: &RefView<'_>,
    store: &'s S,
    request: &ListRequest,
) -> Result<Listing<'s, S>> {
    let plan = request.plan()?;
    let objects = request.objects.prepare(store)?;
    let head = view.head_ref();

    let mut items = Vec::new();
    for record in view.enumerate()? {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable ref");
                continue;
            }
        };
        if !selects_name(request, &plan, &record.name) {
            continue;
        }
        let Some(id) = resolve(view, &record)? else {
            continue;
        };
        if !objects.admits(&id)? {
            continue;
        }
        items.push(RefItem::new(record.name, record.target, id));
    }

    let needs_object = plan.template.needs_object();
    if sort::needs_object(&plan.keys) {
        let mut loaded = Vec::with_capacity(items.len());
        for mut item in items {
            match item.load_object(store) {
                Ok(_) => loaded.push(item),
                Err(FilterError::Store(StoreError::NotFound(id))) => {
                    warn!(name = %item.name, %id, "ignoring ref with missing object");
                }
                Err(e) => return Err(e),
            }
        }
        items = loaded;
    } else if needs_object && plan.limit.is_some() {
        // Unlistable refs must not take a slot under the cap.
        let mut present = Vec::with_capacity(items.len());
        for item in items {
            if store.exists(&item.id)? {
                present.push(item);
            } else {
                warn!(name = %item.name, id = %item.id, "ignoring ref with missing object");
            }
        }
        items = present;
    }
    sort::sort_items(&mut items, &plan.keys, head.as_deref());

    if let Some(limit) = plan.limit {
        items.truncate(limit);
    }
    debug!(refs = items.len(), "listing selected refs");

    Ok(Listing {
        items: items.into_iter(),
        store,
        needs_object,
        template: plan.template,
        head,
        quote: plan.quote,
        omit_empty: request.omit_empty,
    })
}

fn selects_name(request: &ListRequest, plan: &Plan, name: &str) -> bool {
    if let Err(e) = check_refname_format(name) {
        warn!(name, error = %e, "ignoring ref with broken name");
        return false;
    }
    request.kinds.admits(name, request.include_root_refs)
        && (plan.matcher.is_empty() || plan.matcher.matches(name))
        && !plan.exclude.matches(name)
}

/// The object `record` finally points at, or `None` if the ref is broken
/// or unborn.
fn resolve(view: &RefView<'_>, record: &RefRecord) -> Result<Option<refdb_types::ObjectId>> {
    let id = match &record.target {
        RefTarget::Direct(id) => Some(*id),
        RefTarget::Unborn => None,
        RefTarget::Symbolic(_) => match view.resolve(&record.name) {
            Ok(resolved) => resolved.id,
            Err(e) if e.is_not_found() => None,
            Err(refdb_refs::RefError::SymbolicCycle { .. }) => {
                warn!(name = %record.name, "ignoring symbolic ref that loops");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        },
    };
    match id {
        Some(id) if id.is_null() => {
            warn!(name = %record.name, "ignoring broken ref");
            Ok(None)
        }
        Some(id) => Ok(Some(id)),
        None => {
            debug!(name = %record.name, "skipping ref without a value");
            Ok(None)
        }
    }
}

/// Rendered lines of a listing, in order.
///
/// Object facts the template needs but sorting did not are read as each
/// line is produced.
pub struct Listing<'s, S: ObjectStore + ?Sized> {
    items: std::vec::IntoIter<RefItem>,
    store: &'s S,
    template: Template,
    needs_object: bool,
    head: Option<String>,
    quote: QuoteStyle,
    omit_empty: bool,
}

impl<S: ObjectStore + ?Sized> Iterator for Listing<'_, S> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut item = self.items.next()?;
            if self.needs_object {
                match item.load_object(self.store) {
                    Ok(_) => {}
                    Err(FilterError::Store(StoreError::NotFound(id))) => {
                        warn!(name = %item.name, %id, "ignoring ref with missing object");
                        continue;
                    }
                    Err(e) => return Some(Err(e)),
                }
            }
            let line = self.template.render(&item, self.head.as_deref(), self.quote);
            if self.omit_empty && line.is_empty() {
                continue;
            }
            return Some(Ok(line));
        }
    }
}
