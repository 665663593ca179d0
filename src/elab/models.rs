//! Wire types of the eLabFTW v2 API.
//!
//! Only the fields elablog reads are modelled. The service sends `null` for many absent
//! values, so every field tolerates `null` and falls back to its default.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

fn null_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

/// The two kinds of notebook entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// Experiments.
    #[default]
    Experiments,

    /// Resources (database items), e.g. samples.
    #[serde(alias = "resources")]
    #[cfg_attr(feature = "cli", value(alias = "resources"))]
    Items,
}

impl EntityType {
    /// Path segment of the API collection.
    pub fn path(self) -> &'static str {
        match self {
            EntityType::Experiments => "experiments",
            EntityType::Items => "items",
        }
    }

    /// Page of the web UI that shows this kind of entry.
    pub fn web_page(self) -> &'static str {
        match self {
            EntityType::Experiments => "experiments.php",
            EntityType::Items => "database.php",
        }
    }

    pub fn noun(self) -> &'static str {
        match self {
            EntityType::Experiments => "experiment",
            EntityType::Items => "resource",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.noun())
    }
}

/// An experiment or resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: i64,

    #[serde(default, deserialize_with = "null_default")]
    pub title: String,

    /// Rich-text HTML body.
    #[serde(default, deserialize_with = "null_default")]
    pub body: String,

    #[serde(default, deserialize_with = "null_default")]
    pub category: i64,

    #[serde(default, deserialize_with = "null_default")]
    pub category_title: String,

    #[serde(default, deserialize_with = "null_default")]
    pub created_at: String,

    #[serde(default, deserialize_with = "null_default")]
    pub modified_at: String,

    /// Author.
    #[serde(default, deserialize_with = "null_default")]
    pub fullname: String,

    /// User id of the last editor.
    #[serde(default, deserialize_with = "null_default")]
    pub lastchangeby: i64,

    #[serde(default, deserialize_with = "null_default")]
    pub items_links: Vec<ItemLink>,
}

impl Entry {
    /// 1-based position of `item_id` among the linked items.
    pub fn link_index(&self, item_id: i64) -> Option<usize> {
        self.items_links
            .iter()
            .position(|l| l.entityid == item_id)
            .map(|i| i + 1)
    }
}

/// A resource linked to an experiment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemLink {
    #[serde(alias = "itemid")]
    pub entityid: i64,

    #[serde(default, deserialize_with = "null_default")]
    pub title: String,

    #[serde(default, deserialize_with = "null_default")]
    pub category_title: String,
}

/// A file attached to an entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Upload {
    pub id: i64,

    #[serde(default, deserialize_with = "null_default")]
    pub real_name: String,

    #[serde(default, deserialize_with = "null_default")]
    pub long_name: String,

    #[serde(default, deserialize_with = "null_default")]
    pub storage: i64,

    /// For images uploaded by elablog, `"W:H"`.
    #[serde(default, deserialize_with = "null_default")]
    pub comment: String,
}

impl Upload {
    /// Width and height recorded in the comment, if it has the `"W:H"` shape.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let (w, h) = self.comment.trim().split_once(':')?;
        Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub userid: i64,

    #[serde(default, deserialize_with = "null_default")]
    pub firstname: String,

    #[serde(default, deserialize_with = "null_default")]
    pub lastname: String,

    #[serde(default, deserialize_with = "null_default")]
    pub fullname: String,

    #[serde(default, deserialize_with = "null_default")]
    pub teams: Vec<Team>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,

    #[serde(default, deserialize_with = "null_default")]
    pub name: String,
}

/// An experiment category or a resource type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,

    #[serde(default, deserialize_with = "null_default")]
    pub title: String,

    #[serde(default, deserialize_with = "null_default")]
    pub color: String,
}

/// A partial update of an entry; absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<i64>,
}

impl EntryPatch {
    pub fn body(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            ..Default::default()
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn category(category: i64) -> Self {
        Self {
            category: Some(category),
            ..Default::default()
        }
    }
}
