use crate::{error::RosterError, search::SearchOptions};

/// Builder for search options with ergonomic defaults
#[derive(Debug, Clone, Default)]
pub struct SearchOptionsBuilder {
    options: SearchOptions,
}

impl SearchOptionsBuilder {
    /// Start from the defaults: name matching only, at most 100 riders
    pub fn new() -> Self {
        Self {
            options: SearchOptions::default(),
        }
    }

    /// Match on name and nothing else
    pub fn name_only() -> Self {
        Self::new().name(true).email(false).phone(false)
    }

    /// Match on contact details (email and phone) but not name
    pub fn contact() -> Self {
        Self::new().name(false).email(true).phone(true)
    }

    /// Match on every searchable field
    pub fn all_fields() -> Self {
        Self::new().name(true).email(true).phone(true)
    }

    /// Set the maximum number of riders to return
    pub fn limit(mut self, limit: usize) -> Self {
        self.options.limit = limit;
        self
    }

    /// Like [`limit`](Self::limit), but rejects a limit of zero
    pub fn try_limit(self, limit: usize) -> Result<Self, RosterError> {
        if limit == 0 {
            return Err(RosterError::Config(
                "Search limit must be at least 1".to_string(),
            ));
        }
        Ok(self.limit(limit))
    }

    pub fn name(mut self, enabled: bool) -> Self {
        self.options.name_search = enabled;
        self
    }

    pub fn email(mut self, enabled: bool) -> Self {
        self.options.email_search = enabled;
        self
    }

    pub fn phone(mut self, enabled: bool) -> Self {
        self.options.phone_search = enabled;
        self
    }

    /// Build the final options
    pub fn build(self) -> SearchOptions {
        self.options
    }
}
