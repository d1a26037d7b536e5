//! Tag query parsing and compilation to set-membership predicates.
//!
//! # Responsibility
//! - Parse the textual tag expression language (AND/NOT over tag and
//!   face-cluster selectors) into an AST.
//! - Compile the AST into engine-agnostic membership clauses a repository
//!   can join against its index tables.
//!
//! # Invariants
//! - Parsing never fails: every token is a valid term, unknown tags simply
//!   match zero documents.
//! - An empty query compiles to no constraint (matches everything).

use rusqlite::types::Value;
use std::fmt::{Display, Formatter};

/// What a single term selects document ids by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagSelector {
    /// Literal tag name, matched against the tag index.
    Tag(String),
    /// `face:<id>` — membership in a face cluster.
    FaceCluster(String),
}

impl Display for TagSelector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tag(tag) => write!(f, "{tag}"),
            Self::FaceCluster(id) => write!(f, "face:{id}"),
        }
    }
}

/// One conjunct of a tag query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagQueryTerm {
    pub negated: bool,
    pub selector: TagSelector,
}

impl Display for TagQueryTerm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.negated {
            write!(f, "-")?;
        }
        write!(f, "{}", self.selector)
    }
}

/// Conjunction of terms; built fresh from text on every filtered read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagQuery {
    pub terms: Vec<TagQueryTerm>,
}

impl TagQuery {
    /// Parses the whitespace-separated query syntax.
    ///
    /// # Contract (bit-exact wire syntax)
    /// - Tokens are separated by whitespace.
    /// - A leading `-` negates the term.
    /// - `face:<id>` selects by face-cluster membership; every other token
    ///   is a literal tag name.
    /// - Case-sensitive; no quoting or escaping; never errors.
    pub fn parse(text: &str) -> Self {
        let mut terms = Vec::new();
        for token in text.split_whitespace() {
            let (negated, body) = match token.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, token),
            };
            let selector = match body.strip_prefix("face:") {
                Some(id) => TagSelector::FaceCluster(id.to_string()),
                None => TagSelector::Tag(body.to_string()),
            };
            terms.push(TagQueryTerm { negated, selector });
        }
        Self { terms }
    }

    /// True when the query constrains nothing.
    pub fn is_unconstrained(&self) -> bool {
        self.terms.is_empty()
    }

    /// Compiles this query against concrete membership sources.
    pub fn compile(&self, binding: &TagQueryBinding) -> CompiledPredicate {
        let clauses = self
            .terms
            .iter()
            .map(|term| {
                let (source, value) = match &term.selector {
                    TagSelector::Tag(tag) => (binding.tags.clone(), tag.clone()),
                    TagSelector::FaceCluster(id) => (binding.faces.clone(), id.clone()),
                };
                MembershipClause {
                    negated: term.negated,
                    source,
                    value,
                }
            })
            .collect();
        CompiledPredicate { clauses }
    }
}

impl Display for TagQuery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{term}")?;
        }
        Ok(())
    }
}

/// A set of document ids described as rows of an index table:
/// select `id_column` from `table` where `match_column` equals some value.
///
/// For tag terms the id column is the index's `id` foreign key; for face
/// terms the document ids live in a field column (`image_id`) and the match
/// column is the cluster's own `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipSource {
    table: String,
    match_column: String,
    id_column: String,
}

impl MembershipSource {
    pub fn new(
        table: impl Into<String>,
        match_column: impl Into<String>,
        id_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            match_column: match_column.into(),
            id_column: id_column.into(),
        }
    }
}

/// The two membership sources a query can select from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagQueryBinding {
    pub tags: MembershipSource,
    pub faces: MembershipSource,
}

/// One compiled conjunct: document id ∈ (or ∉) a membership source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipClause {
    negated: bool,
    source: MembershipSource,
    value: String,
}

/// Conjunction of membership clauses, ready to embed in a WHERE clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPredicate {
    clauses: Vec<MembershipClause>,
}

impl CompiledPredicate {
    /// Predicate that matches every document.
    pub fn unconstrained() -> Self {
        Self {
            clauses: Vec::new(),
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Renders the predicate as SQL over the given document-id expression.
    ///
    /// Returns the clause text (`1 = 1` when unconstrained, so call sites
    /// can always prefix `WHERE`) plus positional bind values in order.
    pub fn where_sql(&self, doc_id_expr: &str) -> (String, Vec<Value>) {
        if self.clauses.is_empty() {
            return ("1 = 1".to_string(), Vec::new());
        }

        let mut binds = Vec::with_capacity(self.clauses.len());
        let clauses = self
            .clauses
            .iter()
            .map(|clause| {
                binds.push(Value::Text(clause.value.clone()));
                let op = if clause.negated { "NOT IN" } else { "IN" };
                format!(
                    "{doc_id_expr} {op} (SELECT {id} FROM {table} WHERE {col} = ?)",
                    id = clause.source.id_column,
                    table = clause.source.table,
                    col = clause.source.match_column,
                )
            })
            .collect::<Vec<_>>()
            .join(" AND ");
        (clauses, binds)
    }
}
