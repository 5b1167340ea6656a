//! Column names and empty frame constructors for the four roster tables.
use polars::prelude::*;

pub mod riders {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const EMAIL: &str = "email";
    pub const PHONE: &str = "phone";

    pub const COLUMNS: [&str; 4] = [ID, NAME, EMAIL, PHONE];
}

pub mod tags {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";

    pub const COLUMNS: [&str; 2] = [ID, NAME];
}

pub mod rider_tags {
    pub const RIDER_ID: &str = "rider_id";
    pub const TAG_ID: &str = "tag_id";

    pub const COLUMNS: [&str; 2] = [RIDER_ID, TAG_ID];
}

pub mod participations {
    pub const ID: &str = "id";
    pub const RIDER_ID: &str = "rider_id";
    pub const CAMPAIGN: &str = "campaign";

    pub const COLUMNS: [&str; 3] = [ID, RIDER_ID, CAMPAIGN];
}

/// Derived column produced by ranking; never stored.
pub const PARTICIPATION_COUNT: &str = "participation_count";

/// The tables a store persists, in snapshot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Riders,
    Tags,
    RiderTags,
    Participations,
}

impl Table {
    pub const ALL: [Self; 4] = [Self::Riders, Self::Tags, Self::RiderTags, Self::Participations];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Riders => "riders",
            Self::Tags => "tags",
            Self::RiderTags => "rider_tags",
            Self::Participations => "participations",
        }
    }

    #[must_use]
    pub fn parquet_file(self) -> String {
        format!("{}.parquet", self.name())
    }

    #[must_use]
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Riders => &riders::COLUMNS,
            Self::Tags => &tags::COLUMNS,
            Self::RiderTags => &rider_tags::COLUMNS,
            Self::Participations => &participations::COLUMNS,
        }
    }

    /// A zero-row frame with this table's columns and dtypes.
    pub fn empty_frame(self) -> PolarsResult<DataFrame> {
        match self {
            Self::Riders => df!(
                riders::ID => Vec::<u64>::new(),
                riders::NAME => Vec::<&str>::new(),
                riders::EMAIL => Vec::<&str>::new(),
                riders::PHONE => Vec::<&str>::new()
            ),
            Self::Tags => df!(
                tags::ID => Vec::<u64>::new(),
                tags::NAME => Vec::<&str>::new()
            ),
            Self::RiderTags => df!(
                rider_tags::RIDER_ID => Vec::<u64>::new(),
                rider_tags::TAG_ID => Vec::<u64>::new()
            ),
            Self::Participations => df!(
                participations::ID => Vec::<u64>::new(),
                participations::RIDER_ID => Vec::<u64>::new(),
                participations::CAMPAIGN => Vec::<&str>::new()
            ),
        }
    }
}
