//! Query evaluation against attributes
//!
//! A search context binds one query term to one attribute (or imported
//! attribute read guard). It estimates hits, optionally prepares postings
//! ahead of iteration, and hands out iterators over matching lids.

use attrstore_core::{BasicType, DocId, FloatRange, QueryTerm};

use crate::attribute::ReadableAttribute;

pub mod iterator;

pub use iterator::{
    collect_hits, for_each_hit, ArrayPostingIterator, BitVectorIterator, EmptyIterator,
    ProbeIterator, SearchIterator,
};

/// Per-query search options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchParams {
    /// Prefer a bit vector result even for ranked searches
    pub use_bit_vector: bool,
}

/// How the query planner intends to execute a search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecuteInfo {
    /// The iterator will drive the query (visits every hit)
    pub strict: bool,
    /// Expected fraction of documents reaching this iterator
    pub hit_rate: f64,
}

impl ExecuteInfo {
    /// Strict execution over every document
    pub const FULL: ExecuteInfo = ExecuteInfo {
        strict: true,
        hit_rate: 1.0,
    };

    /// Execution info with an explicit hit rate
    pub fn new(strict: bool, hit_rate: f64) -> Self {
        ExecuteInfo { strict, hit_rate }
    }
}

/// Query term interpreted for one basic type
#[derive(Debug, Clone, PartialEq)]
pub enum TermMatcher {
    /// Inclusive integer interval
    IntRange(i64, i64),
    /// Float interval
    FloatRange(FloatRange),
    /// Exact or prefix string term
    String(QueryTerm),
    /// Term that cannot match this type
    Never,
}

impl TermMatcher {
    /// Interpret `term` for attributes of `basic_type`
    pub fn new(term: &QueryTerm, basic_type: BasicType) -> Self {
        match basic_type {
            BasicType::Bool
            | BasicType::Int8
            | BasicType::Int16
            | BasicType::Int32
            | BasicType::Int64 => term
                .int_range()
                .map_or(TermMatcher::Never, |(lo, hi)| TermMatcher::IntRange(lo, hi)),
            BasicType::Float | BasicType::Double => term
                .float_range()
                .map_or(TermMatcher::Never, TermMatcher::FloatRange),
            BasicType::String => TermMatcher::String(term.clone()),
            BasicType::Reference => TermMatcher::Never,
        }
    }

    /// Whether an integer matches
    pub fn matches_int(&self, v: i64) -> bool {
        match self {
            TermMatcher::IntRange(lo, hi) => *lo <= v && v <= *hi,
            TermMatcher::FloatRange(range) => range.contains(v as f64),
            _ => false,
        }
    }

    /// Whether a float matches
    pub fn matches_float(&self, v: f64) -> bool {
        match self {
            TermMatcher::FloatRange(range) => range.contains(v),
            TermMatcher::IntRange(lo, hi) => !v.is_nan() && *lo as f64 <= v && v <= *hi as f64,
            _ => false,
        }
    }

    /// Whether a string matches
    pub fn matches_str(&self, v: &str) -> bool {
        match self {
            TermMatcher::String(term) => term.matches_str(v),
            _ => false,
        }
    }

    /// Whether nothing can match
    pub fn is_never(&self) -> bool {
        matches!(self, TermMatcher::Never)
    }
}

/// One query term bound to one attribute
pub trait SearchContext: Send + Sync {
    /// Upper-bound hit estimate; 0 only when there are certainly no hits
    fn approximate_hits(&self) -> u32;

    /// Prepare postings ahead of iteration
    fn fetch_postings(&mut self, exec_info: &ExecuteInfo);

    /// Iterator over matching lids
    fn create_iterator(&self, strict: bool) -> Box<dyn SearchIterator + '_>;

    /// Weight of the match if `lid` matches
    fn matches(&self, lid: DocId) -> Option<i32>;

    /// Lid limit the context searches below
    fn doc_id_limit(&self) -> DocId;

    /// The query term
    fn term(&self) -> &QueryTerm;
}

/// Search context over an owned attribute
///
/// Fast-search attributes get a posting snapshot computed when the context
/// is created, so their hit estimate is exact. Other attributes estimate
/// every committed document and probe per lid.
pub struct AttributeSearchContext<'a> {
    attribute: &'a dyn ReadableAttribute,
    term: QueryTerm,
    matcher: TermMatcher,
    doc_id_limit: DocId,
    postings: Option<Vec<(DocId, i32)>>,
}

impl<'a> AttributeSearchContext<'a> {
    /// Bind `term` to `attribute`
    pub fn new(attribute: &'a dyn ReadableAttribute, term: &QueryTerm, _params: &SearchParams) -> Self {
        let matcher = TermMatcher::new(term, attribute.basic_type());
        let doc_id_limit = attribute.committed_doc_id_limit();
        let postings = attribute.fast_search().then(|| {
            if matcher.is_never() {
                return Vec::new();
            }
            (1..doc_id_limit)
                .filter_map(|lid| attribute.match_doc(lid, &matcher).map(|w| (lid, w)))
                .collect()
        });
        AttributeSearchContext {
            attribute,
            term: term.clone(),
            matcher,
            doc_id_limit,
            postings,
        }
    }

    /// Interpreted term
    pub fn matcher(&self) -> &TermMatcher {
        &self.matcher
    }
}

impl SearchContext for AttributeSearchContext<'_> {
    fn approximate_hits(&self) -> u32 {
        match &self.postings {
            Some(postings) => postings.len() as u32,
            None if self.matcher.is_never() => 0,
            None => self.doc_id_limit,
        }
    }

    fn fetch_postings(&mut self, _exec_info: &ExecuteInfo) {}

    fn create_iterator(&self, strict: bool) -> Box<dyn SearchIterator + '_> {
        if self.matcher.is_never() {
            return Box::new(EmptyIterator::new());
        }
        match &self.postings {
            Some(postings) => Box::new(ArrayPostingIterator::new(postings)),
            None => Box::new(ProbeIterator::new(self, strict)),
        }
    }

    fn matches(&self, lid: DocId) -> Option<i32> {
        if lid == 0 || lid >= self.doc_id_limit {
            return None;
        }
        self.attribute.match_doc(lid, &self.matcher)
    }

    fn doc_id_limit(&self) -> DocId {
        self.doc_id_limit
    }

    fn term(&self) -> &QueryTerm {
        &self.term
    }
}
