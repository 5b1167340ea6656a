use std::fmt;

use itertools::izip;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    StoreError,
    error::Result,
    schema::{participations, riders, tags},
};

/// A volunteer in the directory.
///
/// `email` is always lowercase and `phone` always in canonical digit form;
/// the store never persists anything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rider {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl Rider {
    /// Build riders from a frame carrying at least the riders table columns.
    pub fn from_df(df: &DataFrame) -> Result<Vec<Self>> {
        let cols = df.select(riders::COLUMNS)?.take_columns();

        izip!(cols[0].u64()?, cols[1].str()?, cols[2].str()?, cols[3].str()?)
            .map(|row| match row {
                (Some(id), Some(name), Some(email), Some(phone)) => Ok(Self {
                    id,
                    name: name.to_string(),
                    email: email.to_string(),
                    phone: phone.to_string(),
                }),
                _ => Err(StoreError::Corrupt("riders")),
            })
            .collect()
    }

    /// Single-row frame for appending to the riders table.
    pub(crate) fn to_df(&self) -> PolarsResult<DataFrame> {
        df!(
            riders::ID => [self.id],
            riders::NAME => [self.name.as_str()],
            riders::EMAIL => [self.email.as_str()],
            riders::PHONE => [self.phone.as_str()]
        )
    }
}

impl fmt::Display for Rider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rider {{ id: {}, name: \"{}\" }}", self.id, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub id: u64,
    pub name: String,
}

impl Tag {
    pub fn from_df(df: &DataFrame) -> Result<Vec<Self>> {
        let cols = df.select(tags::COLUMNS)?.take_columns();

        izip!(cols[0].u64()?, cols[1].str()?)
            .map(|row| match row {
                (Some(id), Some(name)) => Ok(Self {
                    id,
                    name: name.to_string(),
                }),
                _ => Err(StoreError::Corrupt("tags")),
            })
            .collect()
    }
}

/// A rider's attendance at one campaign. Only ever counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participation {
    pub id: u64,
    pub rider_id: u64,
    pub campaign: String,
}

impl Participation {
    pub fn from_df(df: &DataFrame) -> Result<Vec<Self>> {
        let cols = df.select(participations::COLUMNS)?.take_columns();

        izip!(cols[0].u64()?, cols[1].u64()?, cols[2].str()?)
            .map(|row| match row {
                (Some(id), Some(rider_id), Some(campaign)) => Ok(Self {
                    id,
                    rider_id,
                    campaign: campaign.to_string(),
                }),
                _ => Err(StoreError::Corrupt("participations")),
            })
            .collect()
    }
}
