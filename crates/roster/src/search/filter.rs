use polars::prelude::*;
use roster_data::{phone, schema::riders};

use super::SearchOptions;

/// One way a query can match a rider.
///
/// Each variant carries the query already normalised for its column: lowercase
/// text for name and email, bare digits for phone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchClause {
    Name(String),
    Email(String),
    Phone(String),
}

impl SearchClause {
    /// Literal substring match, never a regex.
    pub fn to_expr(&self) -> Expr {
        match self {
            Self::Name(needle) => lowercase_contains(riders::NAME, needle),
            Self::Email(needle) => lowercase_contains(riders::EMAIL, needle),
            Self::Phone(digits) => col(riders::PHONE)
                .str()
                .contains_literal(lit(digits.clone())),
        }
    }
}

fn lowercase_contains(column: &str, needle: &str) -> Expr {
    col(column)
        .str()
        .to_lowercase()
        .str()
        .contains_literal(lit(needle.to_string()))
}

/// Accumulates [`SearchClause`]s and folds them into a single OR predicate.
///
/// With no clauses the predicate is `false`, so nothing matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterBuilder {
    clauses: Vec<SearchClause>,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clauses for every mode `options` enables, in name, email, phone order.
    pub fn from_options(query: &str, options: &SearchOptions) -> Self {
        let mut builder = Self::new();
        if options.name_search {
            builder = builder.name(query);
        }
        if options.email_search {
            builder = builder.email(query);
        }
        if options.phone_search {
            builder = builder.phone(query);
        }
        builder
    }

    pub fn name(mut self, query: &str) -> Self {
        self.clauses.push(SearchClause::Name(query.to_lowercase()));
        self
    }

    pub fn email(mut self, query: &str) -> Self {
        self.clauses.push(SearchClause::Email(query.to_lowercase()));
        self
    }

    /// Adds a phone clause only when `query` contains a digit.
    pub fn phone(mut self, query: &str) -> Self {
        if phone::has_digit(query) {
            self.clauses
                .push(SearchClause::Phone(phone::strip_non_digits(query)));
        }
        self
    }

    pub fn clauses(&self) -> &[SearchClause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn build(&self) -> Expr {
        self.clauses
            .iter()
            .fold(lit(false), |acc, clause| acc.or(clause.to_expr()))
    }
}
